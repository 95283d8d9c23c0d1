use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::error::TradingError;
use crate::core::types::ExchangeSegment;
use crate::utils::contract;
use crate::utils::schedule;

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_state_file() -> String {
    "state.json".to_string()
}

fn default_signal_file() -> String {
    "signal.csv".to_string()
}

fn default_order_log_file() -> String {
    "OrderLog.txt".to_string()
}

fn default_lookback_days() -> u32 {
    10
}

fn default_charges() -> f64 {
    63.0
}

fn default_contract_multiplier() -> f64 {
    100.0
}

fn default_delta_cap() -> f64 {
    0.80
}

fn default_rate() -> f64 {
    0.06
}

fn default_mcx_rate() -> f64 {
    0.10
}

fn default_rate_limit_wait_secs() -> u64 {
    60
}

fn default_candle_settle_secs() -> u64 {
    2
}

fn default_timeframe() -> String {
    "5minute".to_string()
}

fn default_strike_step() -> f64 {
    50.0
}

fn default_strike_count() -> u32 {
    6
}

fn default_lot_size() -> u32 {
    1
}

fn default_volume_ma() -> usize {
    20
}

fn default_sl_atr_period() -> usize {
    14
}

fn default_sl_multiplier() -> f64 {
    2.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReversalOptionsConfig {
    pub strategy: StrategyInfo,
    #[serde(default)]
    pub engine: EngineSettings,
    pub instruments: Vec<InstrumentConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// 无风险利率，按交易所区分
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFreeRates {
    #[serde(default = "default_rate")]
    pub default: f64,
    #[serde(default = "default_mcx_rate")]
    pub mcx: f64,
}

impl Default for RiskFreeRates {
    fn default() -> Self {
        Self {
            default: default_rate(),
            mcx: default_mcx_rate(),
        }
    }
}

impl RiskFreeRates {
    pub fn for_segment(&self, segment: ExchangeSegment) -> f64 {
        match segment {
            ExchangeSegment::Mcx => self.mcx,
            _ => self.default,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_state_file")]
    pub state_file: String,
    #[serde(default = "default_signal_file")]
    pub signal_file: String,
    #[serde(default = "default_order_log_file")]
    pub order_log_file: String,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    /// 每条平仓记录扣除的费用
    #[serde(default = "default_charges")]
    pub charges_per_exit: f64,
    /// 保证金与盈亏计算使用的合约乘数
    #[serde(default = "default_contract_multiplier")]
    pub contract_multiplier: f64,
    #[serde(default = "default_delta_cap")]
    pub delta_cap: f64,
    #[serde(default)]
    pub risk_free: RiskFreeRates,
    #[serde(default = "default_rate_limit_wait_secs")]
    pub rate_limit_wait_secs: u64,
    /// K线边界之后额外等待的秒数，等待券商生成最新K线
    #[serde(default = "default_candle_settle_secs")]
    pub candle_settle_secs: u64,
    #[serde(default)]
    pub run_once: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            signal_file: default_signal_file(),
            order_log_file: default_order_log_file(),
            lookback_days: default_lookback_days(),
            charges_per_exit: default_charges(),
            contract_multiplier: default_contract_multiplier(),
            delta_cap: default_delta_cap(),
            risk_free: RiskFreeRates::default(),
            rate_limit_wait_secs: default_rate_limit_wait_secs(),
            candle_settle_secs: default_candle_settle_secs(),
            run_once: false,
        }
    }
}

/// Keltner 通道参数
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub length: usize,
    pub multiplier: f64,
    pub atr_period: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SupertrendConfig {
    pub period: usize,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PyramidingConfig {
    /// 加仓间距（标的价格），0 表示关闭
    #[serde(default)]
    pub distance: f64,
    /// 最多加仓次数，不含首仓
    #[serde(default)]
    pub max_adds: u32,
}

impl PyramidingConfig {
    pub fn enabled(&self) -> bool {
        self.distance > 0.0 && self.max_adds > 0
    }

    /// 首仓 + 加仓
    pub fn max_legs(&self) -> u32 {
        self.max_adds + 1
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StopLossConfig {
    #[serde(default = "default_sl_atr_period")]
    pub atr_period: usize,
    #[serde(default = "default_sl_multiplier")]
    pub atr_multiplier: f64,
}

impl Default for StopLossConfig {
    fn default() -> Self {
        Self {
            atr_period: default_sl_atr_period(),
            atr_multiplier: default_sl_multiplier(),
        }
    }
}

/// 单个交易标的配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub symbol: String,
    /// DD-MM-YYYY
    pub expiry: String,
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    #[serde(default = "default_strike_step")]
    pub strike_step: f64,
    #[serde(default = "default_strike_count")]
    pub strike_count: u32,
    #[serde(default = "default_lot_size")]
    pub lot_size: u32,
    #[serde(default = "default_volume_ma")]
    pub volume_ma: usize,
    pub supertrend: SupertrendConfig,
    pub outer_channel: ChannelConfig,
    pub inner_channel: ChannelConfig,
    #[serde(default)]
    pub pyramiding: PyramidingConfig,
    #[serde(default)]
    pub stop_loss: StopLossConfig,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl InstrumentConfig {
    /// 状态键：`{symbol}_{expiry}`
    pub fn unique_key(&self) -> String {
        format!("{}_{}", self.symbol, self.expiry)
    }

    pub fn expiry_date(&self) -> Result<NaiveDate, TradingError> {
        contract::parse_expiry(&self.expiry)
    }

    pub fn future_symbol(&self) -> Result<String, TradingError> {
        Ok(contract::future_symbol(&self.symbol, self.expiry_date()?))
    }

    pub fn timeframe_minutes(&self) -> u32 {
        schedule::timeframe_minutes(&self.timeframe)
    }

    pub fn validate(&self) -> Result<(), TradingError> {
        let field = |name: &str| format!("instruments[{}].{}", self.symbol, name);

        if self.symbol.trim().is_empty() {
            return Err(TradingError::validation("instruments.symbol", "不能为空"));
        }
        self.expiry_date()?;
        if !(self.strike_step > 0.0) {
            return Err(TradingError::validation(field("strike_step"), "必须大于0"));
        }
        if self.lot_size == 0 {
            return Err(TradingError::validation(field("lot_size"), "必须大于0"));
        }
        if self.volume_ma == 0 {
            return Err(TradingError::validation(field("volume_ma"), "必须大于0"));
        }
        for (name, channel) in [
            ("outer_channel", &self.outer_channel),
            ("inner_channel", &self.inner_channel),
        ] {
            if channel.length == 0 || channel.atr_period == 0 {
                return Err(TradingError::validation(field(name), "周期必须大于0"));
            }
            if !(channel.multiplier > 0.0) {
                return Err(TradingError::validation(field(name), "乘数必须大于0"));
            }
        }
        if self.supertrend.period == 0 || !(self.supertrend.multiplier > 0.0) {
            return Err(TradingError::validation(
                field("supertrend"),
                "周期与乘数必须大于0",
            ));
        }
        if self.stop_loss.atr_period == 0 {
            return Err(TradingError::validation(field("stop_loss.atr_period"), "必须大于0"));
        }
        if self.pyramiding.distance < 0.0 {
            return Err(TradingError::validation(field("pyramiding.distance"), "不能为负"));
        }
        Ok(())
    }
}

impl ReversalOptionsConfig {
    pub fn from_file(path: &str) -> Result<Self, TradingError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| TradingError::ConfigError(format!("读取策略配置失败: {}", e)))?;
        let config: ReversalOptionsConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TradingError> {
        if self.instruments.iter().filter(|i| i.enabled).count() == 0 {
            return Err(TradingError::validation("instruments", "至少需要一个启用的标的"));
        }
        let mut keys = std::collections::HashSet::new();
        for instrument in &self.instruments {
            instrument.validate()?;
            if !keys.insert(instrument.unique_key()) {
                return Err(TradingError::validation(
                    "instruments",
                    format!("重复的标的: {}", instrument.unique_key()),
                ));
            }
        }
        if !(self.engine.delta_cap > 0.0 && self.engine.delta_cap <= 1.0) {
            return Err(TradingError::validation("engine.delta_cap", "必须在 (0, 1] 之间"));
        }
        Ok(())
    }

    pub fn enabled_instruments(&self) -> impl Iterator<Item = &InstrumentConfig> {
        self.instruments.iter().filter(|i| i.enabled)
    }
}
