use crate::core::types::{Candle, ExchangeSegment, OrderAck, OrderRequest, Quote, Result};
use async_trait::async_trait;

/// 历史K线来源
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// 获取最近 `lookback_days` 天的K线，按时间升序
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        lookback_days: u32,
    ) -> Result<Vec<Candle>>;
}

/// 报价来源
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// 获取报价；合约无报价时返回 `Ok(None)`
    async fn fetch_quote(&self, exchange: ExchangeSegment, symbol: &str) -> Result<Option<Quote>>;

    /// 最新成交价，无可用价格时返回 `None`
    async fn last_price(&self, exchange: ExchangeSegment, symbol: &str) -> Result<Option<f64>> {
        Ok(self
            .fetch_quote(exchange, symbol)
            .await?
            .and_then(|q| q.usable_price()))
    }
}

/// 下单网关
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn place_order(&self, request: OrderRequest) -> Result<OrderAck>;
}

/// 券商通用接口
#[async_trait]
pub trait Broker: CandleSource + QuoteSource + OrderGateway {
    /// 获取券商名称
    fn name(&self) -> &str;

    /// 查找合约所在的交易所
    async fn find_exchange(&self, symbol: &str) -> Result<Option<ExchangeSegment>>;

    /// 触发限流后重新建立会话
    async fn reconnect(&self) -> Result<()>;
}
