// Standard invocation - the engine's default identity

use super::traits::{InvocationStrategy, StrategyKind};

pub struct StandardStrategy;

impl InvocationStrategy for StandardStrategy {
    fn name(&self) -> &'static str {
        "standard"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Standard
    }

    fn identity_args(&self) -> Vec<String> {
        Vec::new()
    }
}
