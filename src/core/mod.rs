// 核心模块 - 错误、类型、协作方接口
pub mod config;
pub mod error;
pub mod exchange;
pub mod retry_policy;
pub mod types;

pub use config::*;
pub use error::*;
pub use exchange::*;
pub use types::{
    normalize_candles, Candle, ExchangeSegment, OptionKind, OrderAck, OrderRequest, OrderSide,
    OrderType, ProductType, Quote,
};
