// Failure diagnostics - classifies engine stderr
//
// Analyzes error output to determine:
// - What went wrong (private, removed, rate limited, etc.)
// - Whether the failure is content-class (permanent) or network-class (transient)

use serde::{Deserialize, Serialize};

use crate::downloader::errors::EngineError;

/// Longest reason kept from engine output
const MAX_REASON_LEN: usize = 300;

/// Recognised causes of an engine failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureCause {
    /// DRM-protected or paid content
    DrmProtected,

    /// Requires a channel membership
    MembersOnly,

    PrivateContent,

    /// Deleted, removed or otherwise gone
    Unavailable,

    AgeRestricted,

    GeoBlocked,

    /// The engine has no extractor for this URL
    UnsupportedUrl,

    /// 429 or similar
    RateLimited,

    /// HTTP 403 Forbidden
    Forbidden,

    /// 5xx from the remote side
    ServerError,

    /// Address blocked or bot check triggered
    IpBlocked,

    NetworkTimeout,

    /// Refused, reset or unreachable
    ConnectionFailed,

    Unknown,
}

impl FailureCause {
    /// Content-class failures; retrying cannot help
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::DrmProtected
                | Self::MembersOnly
                | Self::PrivateContent
                | Self::Unavailable
                | Self::AgeRestricted
                | Self::GeoBlocked
                | Self::UnsupportedUrl
        )
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::DrmProtected => "DRM-protected content",
            Self::MembersOnly => "Members-only content",
            Self::PrivateContent => "Private content",
            Self::Unavailable => "Content unavailable or removed",
            Self::AgeRestricted => "Age-restricted content",
            Self::GeoBlocked => "Geographic restriction",
            Self::UnsupportedUrl => "Unsupported URL",
            Self::RateLimited => "Rate limited",
            Self::Forbidden => "Access denied (HTTP 403)",
            Self::ServerError => "Server error",
            Self::IpBlocked => "Address blocked or bot check",
            Self::NetworkTimeout => "Network timeout",
            Self::ConnectionFailed => "Connection failed",
            Self::Unknown => "Unknown error",
        }
    }
}

/// Analyze error output and return the most specific cause
pub fn diagnose(stderr: &str) -> Option<FailureCause> {
    if stderr.trim().is_empty() {
        return None;
    }
    let lower = stderr.to_lowercase();
    let has = |patterns: &[&str]| patterns.iter().any(|p| lower.contains(p));

    // Content-class first: an unavailable video often also mentions HTTP codes

    if has(&[
        "drm protected",
        "drm-protected",
        "is drm",
        "drm protection",
        "uses drm",
        "widevine",
        "playready",
        "fairplay",
        "encrypted media",
        "requires purchase",
        "this video requires payment",
    ]) {
        return Some(FailureCause::DrmProtected);
    }

    if has(&[
        "members only",
        "members-only",
        "join this channel",
        "available to members",
    ]) {
        return Some(FailureCause::MembersOnly);
    }

    if has(&[
        "private video",
        "video is private",
        "this account is private",
        "sign in if you've been granted access",
    ]) {
        return Some(FailureCause::PrivateContent);
    }

    if has(&[
        "video unavailable",
        "video is unavailable",
        "has been removed",
        "no longer available",
        "does not exist",
        "http error 404",
        "not found (404)",
    ]) {
        return Some(FailureCause::Unavailable);
    }

    if has(&[
        "age-restricted",
        "age restricted",
        "sign in to confirm your age",
        "inappropriate for some users",
    ]) {
        return Some(FailureCause::AgeRestricted);
    }

    if has(&[
        "not available in your country",
        "blocked in your country",
        "geo restricted",
        "geo-restricted",
        "geographic restriction",
    ]) {
        return Some(FailureCause::GeoBlocked);
    }

    if has(&["unsupported url", "is not a valid url", "no video formats found"]) {
        return Some(FailureCause::UnsupportedUrl);
    }

    // Network-class

    if has(&["429", "too many requests", "rate limit", "rate-limit"]) {
        return Some(FailureCause::RateLimited);
    }

    if has(&[
        "ip address is blocked",
        "ip blocked",
        "not a bot",
        "captcha",
        "unusual traffic",
    ]) {
        return Some(FailureCause::IpBlocked);
    }

    if has(&["403", "forbidden"]) {
        return Some(FailureCause::Forbidden);
    }

    if has(&[
        "http error 500",
        "http error 502",
        "http error 503",
        "http error 504",
        "internal server error",
        "bad gateway",
        "service unavailable",
    ]) {
        return Some(FailureCause::ServerError);
    }

    if has(&["timed out", "timeout"]) {
        return Some(FailureCause::NetworkTimeout);
    }

    if has(&[
        "connection refused",
        "connection reset",
        "connection aborted",
        "network is unreachable",
        "network unreachable",
        "name or service not known",
        "temporary failure in name resolution",
        "getaddrinfo failed",
        "unable to download webpage",
    ]) {
        return Some(FailureCause::ConnectionFailed);
    }

    Some(FailureCause::Unknown)
}

/// Most useful line of engine output, used as the failure reason
pub fn extract_reason(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let line = lines
        .iter()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| lines.last())
        .map(|l| l.trim_start_matches("ERROR:").trim())
        .unwrap_or("engine exited with an error");

    if line.chars().count() > MAX_REASON_LEN {
        let truncated: String = line.chars().take(MAX_REASON_LEN).collect();
        format!("{}...", truncated)
    } else {
        line.to_string()
    }
}

/// Classify engine stderr into a per-job error.
/// Unrecognised failures count as transient so a configured retry still applies.
pub fn classify(stderr: &str) -> EngineError {
    let reason = extract_reason(stderr);
    match diagnose(stderr) {
        Some(cause) if cause.is_permanent() => {
            EngineError::Permanent(format!("{}: {}", cause.description(), reason))
        }
        Some(FailureCause::Unknown) | None => EngineError::Transient(reason),
        Some(cause) => EngineError::Transient(format!("{}: {}", cause.description(), reason)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_detection() {
        let error = "ERROR: [youtube] dQw4w9WgXcQ: Private video. Sign in if you've been granted access";
        assert_eq!(diagnose(error), Some(FailureCause::PrivateContent));
        assert!(matches!(classify(error), EngineError::Permanent(_)));
    }

    #[test]
    fn test_drm_detection() {
        let error = "ERROR: [spotify] 4uLU6h: This video is DRM protected";
        assert_eq!(diagnose(error), Some(FailureCause::DrmProtected));
        assert!(matches!(classify(error), EngineError::Permanent(_)));
    }

    #[test]
    fn test_drm_letters_in_id_do_not_count() {
        let error = "ERROR: [youtube] xdrmQ9z: Unable to download webpage: The read operation timed out";
        assert_eq!(diagnose(error), Some(FailureCause::NetworkTimeout));
        assert!(matches!(classify(error), EngineError::Transient(_)));
    }

    #[test]
    fn test_unavailable_wins_over_http_code() {
        let error = "ERROR: HTTP Error 404: Not Found\nERROR: Video unavailable";
        assert_eq!(diagnose(error), Some(FailureCause::Unavailable));
    }

    #[test]
    fn test_unsupported_url_is_permanent() {
        let error = "ERROR: Unsupported URL: https://example.org/page";
        assert!(matches!(classify(error), EngineError::Permanent(_)));
    }

    #[test]
    fn test_403_detection() {
        let error = "ERROR: unable to download video data: HTTP Error 403: Forbidden";
        assert_eq!(diagnose(error), Some(FailureCause::Forbidden));
        assert!(matches!(classify(error), EngineError::Transient(_)));
    }

    #[test]
    fn test_rate_limit_detection() {
        let error = "ERROR: HTTP Error 429: Too Many Requests";
        assert_eq!(diagnose(error), Some(FailureCause::RateLimited));
    }

    #[test]
    fn test_timeout_detection() {
        let error = "ERROR: Unable to download webpage: The read operation timed out";
        assert_eq!(diagnose(error), Some(FailureCause::NetworkTimeout));
    }

    #[test]
    fn test_server_error_detection() {
        assert_eq!(
            diagnose("ERROR: HTTP Error 503: Service Unavailable"),
            Some(FailureCause::ServerError)
        );
    }

    #[test]
    fn test_unknown_is_transient() {
        let err = classify("something odd happened");
        assert_eq!(err, EngineError::Transient("something odd happened".into()));
        assert_eq!(diagnose("   "), None);
    }

    #[test]
    fn test_reason_prefers_error_line() {
        let stderr = "WARNING: falling back\nERROR: [tiktok] 7234: Video not available\nsome trailer";
        assert_eq!(extract_reason(stderr), "[tiktok] 7234: Video not available");
        assert_eq!(extract_reason(""), "engine exited with an error");
    }

    #[test]
    fn test_long_reason_truncated() {
        let stderr = format!("ERROR: {}", "x".repeat(1000));
        assert!(extract_reason(&stderr).len() <= MAX_REASON_LEN + 3);
    }
}
