// Error types for job building and engine invocation

use std::path::PathBuf;

use thiserror::Error;

use super::extractors::diagnostics;
use super::models::FailureKind;

/// Problems with the caller's input. Raised before a job is queued, so they
/// never reach the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("URL is empty")]
    EmptyUrl,

    /// DRM-protected source; refused by policy
    #[error("{platform} content is DRM-protected and cannot be downloaded")]
    BlockedPlatform { platform: String },

    #[error("Invalid value {value:?} for option `{field}`")]
    InvalidOption { field: &'static str, value: String },

    #[error("Destination {} is not usable: {reason}", path.display())]
    Path { path: PathBuf, reason: String },

    /// The metadata-only listing call failed; nothing was expanded
    #[error("Could not list collection {url}: {reason}")]
    CollectionExpansion { url: String, reason: String },
}

impl BuildError {
    pub fn invalid_option(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidOption {
            field,
            value: value.into(),
        }
    }
}

/// Failure of a single engine invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Network-class failure, eligible for retry
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Content-class failure (private, removed, unsupported)
    #[error("Permanent failure: {0}")]
    Permanent(String),

    /// Required external tool is absent; the whole batch is unusable
    #[error("Engine not available: {0}")]
    EngineMissing(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("Cancelled")]
    Cancelled,
}

impl EngineError {
    /// Failure kind recorded in the job result. `None` for cancellation,
    /// which is not a failure.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            Self::Transient(_) => Some(FailureKind::Transient),
            Self::Permanent(_) => Some(FailureKind::Permanent),
            Self::EngineMissing(_) => Some(FailureKind::EngineMissing),
            Self::Timeout(_) => Some(FailureKind::Timeout),
            Self::Cancelled => None,
        }
    }

    pub fn is_engine_missing(&self) -> bool {
        matches!(self, Self::EngineMissing(_))
    }
}

// Engine stderr goes through the same diagnostics used for status lines
impl From<String> for EngineError {
    fn from(stderr: String) -> Self {
        diagnostics::classify(&stderr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_has_no_failure_kind() {
        assert_eq!(EngineError::Cancelled.kind(), None);
        assert_eq!(
            EngineError::Timeout(30).kind(),
            Some(FailureKind::Timeout)
        );
    }

    #[test]
    fn stderr_conversion_uses_diagnostics() {
        let err = EngineError::from("ERROR: [youtube] abc: Private video".to_string());
        assert!(matches!(err, EngineError::Permanent(_)));

        let err = EngineError::from("ERROR: Unable to download webpage: timed out".to_string());
        assert!(matches!(err, EngineError::Transient(_)));
    }

    #[test]
    fn blocked_platform_message_names_platform() {
        let err = BuildError::BlockedPlatform {
            platform: "Spotify".to_string(),
        };
        assert!(err.to_string().contains("Spotify"));
    }
}
