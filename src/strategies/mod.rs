// 策略模块
pub mod common;
pub mod reversal_options;

pub use common::{Strategy, StrategyInstance, StrategyStatus};
pub use reversal_options::{ReversalOptionsConfig, ReversalOptionsStrategy};
