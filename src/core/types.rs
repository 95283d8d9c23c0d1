use chrono::NaiveDateTime;
/// 统一的类型定义模块
/// 行情、报价与订单相关的数据结构
use serde::{Deserialize, Serialize};

// ============= 基础类型定义 =============

/// 结果类型别名
pub type Result<T> = std::result::Result<T, crate::core::error::TradingError>;

/// 交易所分段
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExchangeSegment {
    Nse,
    Bse,
    Nfo,
    Bfo,
    Mcx,
}

impl ExchangeSegment {
    /// 标的所在交易所对应的期权交易所：MCX商品期权在MCX，其余在NFO
    pub fn option_segment_for(underlying: ExchangeSegment) -> ExchangeSegment {
        match underlying {
            ExchangeSegment::Mcx => ExchangeSegment::Mcx,
            _ => ExchangeSegment::Nfo,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "NSE" => Some(ExchangeSegment::Nse),
            "BSE" => Some(ExchangeSegment::Bse),
            "NFO" => Some(ExchangeSegment::Nfo),
            "BFO" => Some(ExchangeSegment::Bfo),
            "MCX" => Some(ExchangeSegment::Mcx),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExchangeSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            ExchangeSegment::Nse => "NSE",
            ExchangeSegment::Bse => "BSE",
            ExchangeSegment::Nfo => "NFO",
            ExchangeSegment::Bfo => "BFO",
            ExchangeSegment::Mcx => "MCX",
        };
        write!(f, "{}", name)
    }
}

// ============= 行情数据 =============

/// 已收盘的K线
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(
        timestamp: NaiveDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// 按时间升序排列并按时间戳去重（保留同一时间戳最后一根）
pub fn normalize_candles(mut candles: Vec<Candle>) -> Vec<Candle> {
    candles.sort_by_key(|c| c.timestamp);
    let mut result: Vec<Candle> = Vec::with_capacity(candles.len());
    for candle in candles {
        match result.last_mut() {
            Some(last) if last.timestamp == candle.timestamp => *last = candle,
            _ => result.push(candle),
        }
    }
    result
}

/// 报价快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub exchange: ExchangeSegment,
    pub symbol: String,
    pub last_price: Option<f64>,
    pub timestamp: NaiveDateTime,
}

impl Quote {
    /// 仅返回可交易的正价格
    pub fn usable_price(&self) -> Option<f64> {
        self.last_price.filter(|p| p.is_finite() && *p > 0.0)
    }
}

// ============= 订单相关 =============

/// 订单方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// 订单类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
    Limit,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
        }
    }
}

/// 产品类型（NRML 隔夜持仓 / MIS 日内）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProductType {
    Nrml,
    Mis,
}

impl std::fmt::Display for ProductType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ProductType::Nrml => write!(f, "NRML"),
            ProductType::Mis => write!(f, "MIS"),
        }
    }
}

/// 期权类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionKind {
    Call,
    Put,
}

impl OptionKind {
    /// 合约代码后缀
    pub fn suffix(&self) -> &'static str {
        match self {
            OptionKind::Call => "CE",
            OptionKind::Put => "PE",
        }
    }
}

/// 订单请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub exchange: ExchangeSegment,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub product: ProductType,
    pub quantity: u32,
    pub price: Option<f64>,
    #[serde(default)]
    pub client_order_id: Option<String>,
}

impl OrderRequest {
    /// 期权限价单，价格保留两位小数
    pub fn limit(
        exchange: ExchangeSegment,
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: u32,
        price: Option<f64>,
    ) -> Self {
        Self {
            exchange,
            symbol: symbol.into(),
            side,
            order_type: OrderType::Limit,
            product: ProductType::Nrml,
            quantity,
            price: price.map(|p| (p * 100.0).round() / 100.0),
            client_order_id: None,
        }
    }

    pub fn with_client_order_id(mut self, id: impl Into<String>) -> Self {
        self.client_order_id = Some(id.into());
        self
    }

    /// 下单前的本地校验
    pub fn validate(&self) -> Result<()> {
        if self.quantity == 0 {
            return Err(crate::core::error::TradingError::validation(
                "quantity",
                "数量必须大于0",
            ));
        }
        if self.order_type == OrderType::Limit {
            match self.price {
                Some(p) if p.is_finite() && p > 0.0 => {}
                _ => {
                    return Err(crate::core::error::TradingError::validation(
                        "price",
                        "LIMIT 订单必须提供有效价格",
                    ))
                }
            }
        }
        Ok(())
    }
}

/// 下单回执
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
}
