//! 测试用的行情、下单与存储替身

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Local, NaiveDate};

use crate::core::error::TradingError;
use crate::core::exchange::{OrderGateway, QuoteSource};
use crate::core::types::{Candle, ExchangeSegment, OrderAck, OrderRequest, Quote, Result};
use crate::utils::indicators::{ChannelPoint, HeikinAshi, SupertrendPoint};

use super::config::{
    ChannelConfig, EngineSettings, InstrumentConfig, PyramidingConfig, StopLossConfig, SupertrendConfig,
};
use super::indicators::SignalBar;
use super::ledger::{SignalLedger, SignalRecord};
use super::model::TradingState;
use super::state_store::StateStore;

/// 按合约逐次弹出报价，队列只剩一个时重复返回；未登记的合约没有报价
#[derive(Default)]
pub struct ScriptedQuotes {
    scripts: Mutex<HashMap<String, Vec<Option<f64>>>>,
    fetches: Mutex<HashMap<String, u32>>,
    rate_limited: AtomicBool,
}

impl ScriptedQuotes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, symbol: &str, prices: Vec<Option<f64>>) {
        self.scripts.lock().unwrap().insert(symbol.to_string(), prices);
    }

    pub fn fetch_count(&self, symbol: &str) -> u32 {
        self.fetches.lock().unwrap().get(symbol).copied().unwrap_or(0)
    }

    pub fn rate_limit(&self, on: bool) {
        self.rate_limited.store(on, Ordering::SeqCst);
    }
}

#[async_trait]
impl QuoteSource for ScriptedQuotes {
    async fn fetch_quote(&self, exchange: ExchangeSegment, symbol: &str) -> Result<Option<Quote>> {
        if self.rate_limited.load(Ordering::SeqCst) {
            return Err(TradingError::RateLimitError("Too many requests".to_string(), Some(1)));
        }
        *self.fetches.lock().unwrap().entry(symbol.to_string()).or_insert(0) += 1;

        let mut scripts = self.scripts.lock().unwrap();
        let Some(queue) = scripts.get_mut(symbol) else {
            return Ok(None);
        };
        let price = if queue.len() > 1 { queue.remove(0) } else { queue.first().copied().flatten() };
        Ok(Some(Quote {
            exchange,
            symbol: symbol.to_string(),
            last_price: price,
            timestamp: Local::now().naive_local(),
        }))
    }
}

/// 记录所有下单请求，可切换为全部失败
#[derive(Default)]
pub struct RecordingGateway {
    orders: Mutex<Vec<OrderRequest>>,
    attempts: AtomicU32,
    fail: AtomicBool,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_all(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// 成功受理的订单
    pub fn orders(&self) -> Vec<OrderRequest> {
        self.orders.lock().unwrap().clone()
    }

    /// 到达网关的请求数（含失败）
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderGateway for RecordingGateway {
    async fn place_order(&self, request: OrderRequest) -> Result<OrderAck> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail.load(Ordering::SeqCst) {
            return Err(TradingError::OrderError("rejected by broker".to_string()));
        }
        self.orders.lock().unwrap().push(request);
        Ok(OrderAck {
            order_id: format!("ORD{:04}", n),
        })
    }
}

#[derive(Default)]
pub struct MemoryLedger {
    records: Mutex<Vec<SignalRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<SignalRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.records().iter().map(|r| r.action.to_string()).collect()
    }
}

impl SignalLedger for MemoryLedger {
    fn record(&self, record: &SignalRecord) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStateStore {
    states: Mutex<HashMap<String, TradingState>>,
    saves: AtomicU32,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saves(&self) -> u32 {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> HashMap<String, TradingState> {
        self.states.lock().unwrap().clone()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<HashMap<String, TradingState>> {
        Ok(self.snapshot())
    }

    fn save(&self, states: &HashMap<String, TradingState>) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.states.lock().unwrap() = states.clone();
        Ok(())
    }
}

/// 短周期的 CRUDEOIL 标的，加仓间距 25，最多加仓 2 次
pub fn instrument() -> InstrumentConfig {
    InstrumentConfig {
        symbol: "CRUDEOIL".to_string(),
        expiry: "19-11-2025".to_string(),
        timeframe: "5minute".to_string(),
        strike_step: 50.0,
        strike_count: 2,
        lot_size: 1,
        volume_ma: 3,
        supertrend: SupertrendConfig {
            period: 3,
            multiplier: 2.0,
        },
        outer_channel: ChannelConfig {
            length: 3,
            multiplier: 2.0,
            atr_period: 3,
        },
        inner_channel: ChannelConfig {
            length: 4,
            multiplier: 3.0,
            atr_period: 3,
        },
        pyramiding: PyramidingConfig {
            distance: 25.0,
            max_adds: 2,
        },
        stop_loss: StopLossConfig {
            atr_period: 3,
            atr_multiplier: 2.0,
        },
        enabled: true,
    }
}

pub fn engine_settings() -> EngineSettings {
    EngineSettings {
        risk_free: super::config::RiskFreeRates {
            default: 0.06,
            mcx: 0.10,
        },
        ..EngineSettings::default()
    }
}

/// 固定通道的信号K线：外轨 5200/5400，内轨 5150/5450，量均线 1000，上升趋势
pub fn bar(open: f64, close: f64, high: f64, low: f64, volume: f64) -> SignalBar {
    let timestamp = NaiveDate::from_ymd_opt(2025, 11, 3)
        .and_then(|d| d.and_hms_opt(9, 55, 0))
        .unwrap();
    SignalBar {
        candle: Candle::new(timestamp, open, high, low, close, volume),
        ha: HeikinAshi {
            open,
            high,
            low,
            close,
        },
        volume_ma: 1000.0,
        outer: ChannelPoint {
            middle: 5300.0,
            upper: 5400.0,
            lower: 5200.0,
        },
        inner: ChannelPoint {
            middle: 5300.0,
            upper: 5450.0,
            lower: 5150.0,
        },
        supertrend: SupertrendPoint {
            value: 5100.0,
            trend: 1,
            final_upper: 5500.0,
            final_lower: 5100.0,
        },
    }
}
