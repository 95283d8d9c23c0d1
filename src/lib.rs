pub mod core;
pub mod exchanges;
pub mod strategies;
pub mod utils;

// 选择性导出，避免命名冲突
pub use core::*;
pub use exchanges::PaperBroker;
pub use strategies::*;
