// 工具模块 - 通用工具函数
pub mod black_scholes;
pub mod contract;
pub mod indicators;
pub mod order_id;
pub mod schedule;
pub mod unified_logger;

pub use contract::{future_symbol, option_symbol, parse_expiry};
pub use order_id::OrderIdGenerator;
pub use schedule::{next_candle_time, timeframe_minutes};
pub use unified_logger::{get_strategy_log_path, init_logger, LogConfig};
