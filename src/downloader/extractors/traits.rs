// InvocationStrategy trait - how the engine is invoked for a platform

use std::fmt;

/// Execution route selected from a job's platform verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// Default engine identity
    Standard,
    /// Engine poses as a browser client
    Impersonate,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::Impersonate => write!(f, "impersonate"),
        }
    }
}

/// Invocation strategy. Contributes the identity-related engine arguments;
/// everything else about the call is shared.
pub trait InvocationStrategy: Send + Sync {
    /// Name of the strategy (for logging)
    fn name(&self) -> &'static str;

    fn kind(&self) -> StrategyKind;

    /// Arguments placed before the format selection
    fn identity_args(&self) -> Vec<String>;
}
