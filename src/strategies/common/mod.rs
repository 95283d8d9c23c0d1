pub mod application;

pub use application::{
    RiskLevel, Strategy, StrategyDeps, StrategyDepsBuilder, StrategyInstance, StrategyPosition,
    StrategyState, StrategyStatus,
};
