use chrono::{DateTime, Utc};
use std::time::Duration;

/// 策略运行状态
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyState {
    Initializing,
    Running,
    Stopped,
    Error,
}

/// 运行健康度：某个标的评估失败时降为 Warning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskLevel {
    Normal,
    Warning,
    Halt,
}

/// 单个标的的持仓概况
#[derive(Debug, Clone, Default)]
pub struct StrategyPosition {
    /// 持仓的期权合约（无合约时为标的键）
    pub symbol: String,
    /// 已开仓的手数（首仓 + 加仓）
    pub lots: f64,
    /// 首仓权利金占用
    pub premium: f64,
}

/// 统一的策略状态结构
#[derive(Debug, Clone)]
pub struct StrategyStatus {
    pub name: String,
    pub state: StrategyState,
    pub uptime: Option<Duration>,
    pub risk_level: RiskLevel,
    pub positions: Vec<StrategyPosition>,
    pub updated_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl StrategyStatus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: StrategyState::Initializing,
            uptime: None,
            risk_level: RiskLevel::Normal,
            positions: Vec::new(),
            updated_at: Utc::now(),
            last_error: None,
        }
    }

    pub fn with_state(mut self, state: StrategyState) -> Self {
        self.state = state;
        self
    }

    /// 记录一次失败并降级健康度
    pub fn record_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
        if self.risk_level == RiskLevel::Normal {
            self.risk_level = RiskLevel::Warning;
        }
        self.updated_at = Utc::now();
    }

    pub fn transition(&mut self, state: StrategyState) {
        self.state = state;
        self.updated_at = Utc::now();
    }

    pub fn total_lots(&self) -> f64 {
        self.positions.iter().map(|p| p.lots).sum()
    }
}
