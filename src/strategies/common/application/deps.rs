use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::core::exchange::{Broker, OrderGateway, QuoteSource};

/// 统一的策略依赖容器
///
/// 同一个券商实例同时以三种接口暴露，策略按需取用。
#[derive(Clone)]
pub struct StrategyDeps {
    pub broker: Arc<dyn Broker>,
    pub quotes: Arc<dyn QuoteSource>,
    pub orders: Arc<dyn OrderGateway>,
}

impl StrategyDeps {
    pub fn builder() -> StrategyDepsBuilder {
        StrategyDepsBuilder::default()
    }
}

/// 构建策略依赖的辅助结构
#[derive(Default)]
pub struct StrategyDepsBuilder {
    broker: Option<Arc<dyn Broker>>,
    quotes: Option<Arc<dyn QuoteSource>>,
    orders: Option<Arc<dyn OrderGateway>>,
}

impl StrategyDepsBuilder {
    pub fn with_broker<B>(mut self, broker: Arc<B>) -> Self
    where
        B: Broker + 'static,
    {
        self.quotes = Some(broker.clone());
        self.orders = Some(broker.clone());
        self.broker = Some(broker);
        self
    }

    pub fn build(self) -> Result<StrategyDeps> {
        Ok(StrategyDeps {
            broker: self.broker.ok_or_else(|| anyhow!("StrategyDeps 缺少 broker"))?,
            quotes: self.quotes.ok_or_else(|| anyhow!("StrategyDeps 缺少 quotes"))?,
            orders: self.orders.ok_or_else(|| anyhow!("StrategyDeps 缺少 orders"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_requires_broker() {
        assert!(StrategyDeps::builder().build().is_err());
    }
}
