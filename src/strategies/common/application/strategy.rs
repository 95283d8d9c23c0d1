use anyhow::Result;
use async_trait::async_trait;

use super::{deps::StrategyDeps, status::StrategyStatus};

/// 策略生命周期：启动时载入状态并开始调度，停止时落盘
#[async_trait]
pub trait StrategyInstance: Send + Sync {
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    async fn status(&self) -> Result<StrategyStatus>;
}

pub trait Strategy: StrategyInstance + Sized {
    type Config: Send + Sync + 'static;

    fn create(config: Self::Config, deps: StrategyDeps) -> Result<Self>
    where
        Self: Sized;
}
