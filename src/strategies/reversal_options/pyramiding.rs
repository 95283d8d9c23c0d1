use super::config::PyramidingConfig;
use super::model::{Position, PyramidLeg, TradingState};
use super::stop_loss;

/// 加仓基准价：已有加仓时取最近一次加仓价，否则取首仓价
pub fn reference_price(state: &TradingState) -> Option<f64> {
    state.last_pyramiding_price.or(state.first_entry_price)
}

/// 下一次加仓的触发价
pub fn next_level(state: &TradingState, config: &PyramidingConfig) -> Option<f64> {
    let position = state.position?;
    if !can_add(state, config) {
        return None;
    }
    let reference = reference_price(state)?;
    Some(match position {
        Position::LongCall => reference + config.distance,
        Position::LongPut => reference - config.distance,
    })
}

/// 是否还允许加仓
pub fn can_add(state: &TradingState, config: &PyramidingConfig) -> bool {
    state.position.is_some() && config.enabled() && state.pyramiding_count < config.max_legs()
}

/// 当前平均K线收盘价是否触发加仓
pub fn should_add(state: &TradingState, config: &PyramidingConfig, close: f64) -> bool {
    let (Some(position), Some(level)) = (state.position, next_level(state, config)) else {
        return false;
    };
    match position {
        Position::LongCall => close >= level,
        Position::LongPut => close <= level,
    }
}

/// 记录一次加仓并把止损重置为入场均价，返回新的止损价
pub fn record_add(state: &mut TradingState, leg: PyramidLeg) -> Option<f64> {
    let price = leg.entry_price;
    state.pyramiding_count += 1;
    state.last_pyramiding_price = Some(price);
    state.pyramiding_positions.push(leg);
    state.entry_prices.push(price);
    if let Some(sl) = stop_loss::rebase_after_pyramid(&state.entry_prices) {
        state.current_sl = Some(sl);
    }
    state.current_sl
}
