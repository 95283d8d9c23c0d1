use crate::core::error::TradingError;
use crate::utils::unified_logger::LogConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn default_broker_kind() -> BrokerKind {
    BrokerKind::Paper
}

fn default_data_dir() -> String {
    "data/candles".to_string()
}

fn default_paper_volatility() -> f64 {
    0.25
}

fn default_paper_rate() -> f64 {
    0.06
}

fn default_mcx_underlyings() -> Vec<String> {
    ["CRUDEOIL", "NATURALGAS", "GOLD", "GOLDM", "SILVER", "SILVERM", "COPPER", "ZINC"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerKind {
    Paper,
}

/// 纸面交易券商配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperBrokerConfig {
    /// K线文件目录，每个合约一个 `<SYMBOL>.csv`
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// 期权模拟报价使用的年化波动率
    #[serde(default = "default_paper_volatility")]
    pub volatility: f64,
    #[serde(default = "default_paper_rate")]
    pub risk_free_rate: f64,
    /// 在MCX交易的标的前缀
    #[serde(default = "default_mcx_underlyings")]
    pub mcx_underlyings: Vec<String>,
}

impl Default for PaperBrokerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            volatility: default_paper_volatility(),
            risk_free_rate: default_paper_rate(),
            mcx_underlyings: default_mcx_underlyings(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_kind")]
    pub kind: BrokerKind,
    #[serde(default)]
    pub paper: PaperBrokerConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            kind: default_broker_kind(),
            paper: PaperBrokerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl GlobalConfig {
    /// 从YAML文件加载配置
    pub fn from_file(path: &str) -> Result<Self, TradingError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| TradingError::ConfigError(format!("读取配置文件失败: {}", e)))?;

        let config: GlobalConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// 文件不存在时使用默认配置
    pub fn from_file_or_default(path: &str) -> Result<Self, TradingError> {
        if Path::new(path).exists() {
            Self::from_file(path)
        } else {
            log::warn!("⚠️ 全局配置 {} 不存在，使用默认配置", path);
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), TradingError> {
        if !(self.broker.paper.volatility > 0.0) {
            return Err(TradingError::validation(
                "broker.paper.volatility",
                "波动率必须大于0",
            ));
        }
        Ok(())
    }
}
