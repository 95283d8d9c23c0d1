pub mod deps;
pub mod status;
pub mod strategy;

pub use deps::{StrategyDeps, StrategyDepsBuilder};
pub use status::{RiskLevel, StrategyPosition, StrategyState, StrategyStatus};
pub use strategy::{Strategy, StrategyInstance};
