use serde::{Deserialize, Serialize};

use crate::core::types::{ExchangeSegment, OptionKind};

/// 持仓方向：买入看涨（BUY）或买入看跌（SELL）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Position {
    #[serde(rename = "BUY")]
    LongCall,
    #[serde(rename = "SELL")]
    LongPut,
}

impl Position {
    pub fn option_kind(&self) -> OptionKind {
        match self {
            Position::LongCall => OptionKind::Call,
            Position::LongPut => OptionKind::Put,
        }
    }

    /// 记录中使用的小写方向："buy" / "sell"
    pub fn tag(&self) -> &'static str {
        match self {
            Position::LongCall => "buy",
            Position::LongPut => "sell",
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Position::LongCall => write!(f, "BUY"),
            Position::LongPut => write!(f, "SELL"),
        }
    }
}

/// 加仓腿（不含首仓）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PyramidLeg {
    /// 为空时平仓使用首仓合约
    #[serde(default)]
    pub option_symbol: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    /// 加仓时标的（平均K线收盘）价格
    pub entry_price: f64,
    #[serde(default)]
    pub entry_option_price: Option<f64>,
}

/// 单个标的的交易状态，持久化单元
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradingState {
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub armed_buy: bool,
    #[serde(default)]
    pub armed_sell: bool,
    #[serde(default)]
    pub initial_sl: Option<f64>,
    #[serde(default)]
    pub current_sl: Option<f64>,
    #[serde(default)]
    pub entry_prices: Vec<f64>,
    #[serde(default)]
    pub pyramiding_count: u32,
    #[serde(default)]
    pub first_entry_price: Option<f64>,
    #[serde(default)]
    pub last_pyramiding_price: Option<f64>,
    #[serde(default)]
    pub pyramiding_positions: Vec<PyramidLeg>,
    /// 首仓期权成交参考价
    #[serde(default)]
    pub entry_option_price: Option<f64>,
    #[serde(default)]
    pub option_symbol: Option<String>,
    #[serde(default)]
    pub option_exchange: Option<ExchangeSegment>,
    #[serde(default)]
    pub option_order_id: Option<String>,
}

impl TradingState {
    pub fn is_flat(&self) -> bool {
        self.position.is_none()
    }

    /// 平仓后清空所有持仓相关字段；布防标志保持不变
    pub fn reset_position(&mut self) {
        self.position = None;
        self.initial_sl = None;
        self.current_sl = None;
        self.entry_prices.clear();
        self.pyramiding_count = 0;
        self.first_entry_price = None;
        self.last_pyramiding_price = None;
        self.pyramiding_positions.clear();
        self.entry_option_price = None;
        self.option_symbol = None;
        self.option_exchange = None;
        self.option_order_id = None;
    }

    /// 首仓之后每条加仓腿的合约；缺失时回退到首仓合约
    pub fn leg_symbol<'a>(&'a self, leg: &'a PyramidLeg) -> Option<&'a str> {
        leg.option_symbol
            .as_deref()
            .or(self.option_symbol.as_deref())
    }

    /// 校验持仓字段的一致性，返回违反的约束描述
    pub fn check_invariants(&self) -> Result<(), String> {
        match self.position {
            None => {
                if self.pyramiding_count != 0 {
                    return Err(format!(
                        "空仓但 pyramiding_count = {}",
                        self.pyramiding_count
                    ));
                }
                if !self.pyramiding_positions.is_empty() || !self.entry_prices.is_empty() {
                    return Err("空仓但仍有入场记录".to_string());
                }
                if self.initial_sl.is_some() || self.current_sl.is_some() {
                    return Err("空仓但止损价仍存在".to_string());
                }
            }
            Some(_) => {
                if self.pyramiding_count as usize != 1 + self.pyramiding_positions.len() {
                    return Err(format!(
                        "pyramiding_count = {} 与加仓腿数量 {} 不一致",
                        self.pyramiding_count,
                        self.pyramiding_positions.len()
                    ));
                }
                if self.entry_prices.len() != self.pyramiding_count as usize {
                    return Err(format!(
                        "entry_prices 数量 {} 与 pyramiding_count = {} 不一致",
                        self.entry_prices.len(),
                        self.pyramiding_count
                    ));
                }
                if self.initial_sl.is_none() || self.current_sl.is_none() {
                    return Err("持仓但止损价缺失".to_string());
                }
            }
        }
        Ok(())
    }
}

/// 期权候选，每次选择时临时构建
#[derive(Debug, Clone, PartialEq)]
pub struct OptionCandidate {
    pub strike: i64,
    pub contract_symbol: String,
    pub quoted_price: f64,
    pub implied_volatility: f64,
    pub delta: f64,
    /// 在行权价梯度中的评估顺序
    pub evaluation_order: usize,
}
