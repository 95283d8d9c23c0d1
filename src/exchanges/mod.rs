// 券商实现
pub mod paper;

pub use paper::PaperBroker;
