pub mod config;
pub mod engine;
pub mod indicators;
pub mod ledger;
mod logging;
pub mod model;
pub mod option_selector;
pub mod pyramiding;
pub mod state_store;
pub mod stop_loss;
mod strategy;
mod summary;
#[cfg(test)]
pub(crate) mod testing;

pub use config::ReversalOptionsConfig;
pub use logging::OrderLog;
pub use strategy::ReversalOptionsStrategy;
