// Invocation strategies for the extraction engine
//
// Provides two routes behind one interface:
// - Standard: default engine identity
// - Impersonate: engine poses as a browser (platforms flagged needs-special-path)
//
// The route is chosen once from the job's platform verdict.

pub mod diagnostics;
mod impersonate;
mod standard;
mod traits;

pub use diagnostics::{diagnose, FailureCause};
pub use impersonate::ImpersonateStrategy;
pub use standard::StandardStrategy;
pub use traits::{InvocationStrategy, StrategyKind};

use crate::downloader::platform::PlatformVerdict;

static STANDARD: StandardStrategy = StandardStrategy;
static IMPERSONATE: ImpersonateStrategy = ImpersonateStrategy::new(impersonate::DEFAULT_CLIENT);

/// Strategy for a job, selected by its needs-special-path flag
pub fn strategy_for(verdict: &PlatformVerdict) -> &'static dyn InvocationStrategy {
    if verdict.needs_special_path {
        &IMPERSONATE
    } else {
        &STANDARD
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::platform::classify;

    #[test]
    fn selection_follows_verdict_flag() {
        let tiktok = classify("https://www.tiktok.com/@a/video/1");
        assert_eq!(strategy_for(&tiktok).kind(), StrategyKind::Impersonate);

        let youtube = classify("https://youtu.be/abc");
        assert_eq!(strategy_for(&youtube).kind(), StrategyKind::Standard);

        let generic = classify("https://example.org/clip");
        assert_eq!(strategy_for(&generic).kind(), StrategyKind::Standard);
    }
}
