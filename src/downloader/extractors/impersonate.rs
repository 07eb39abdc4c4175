// Impersonation invocation - for platforms that answer 403 to the default
// engine identity (TikTok)

use super::traits::{InvocationStrategy, StrategyKind};

/// Browser client the engine pretends to be
pub const DEFAULT_CLIENT: &str = "chrome";

pub struct ImpersonateStrategy {
    client: &'static str,
}

impl ImpersonateStrategy {
    pub const fn new(client: &'static str) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &'static str {
        self.client
    }
}

impl Default for ImpersonateStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_CLIENT)
    }
}

impl InvocationStrategy for ImpersonateStrategy {
    fn name(&self) -> &'static str {
        "impersonate"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Impersonate
    }

    fn identity_args(&self) -> Vec<String> {
        vec!["--impersonate".to_string(), self.client.to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impersonates_chrome_by_default() {
        let strategy = ImpersonateStrategy::default();
        assert_eq!(strategy.identity_args(), vec!["--impersonate", "chrome"]);
        assert_eq!(strategy.kind(), StrategyKind::Impersonate);
    }
}
