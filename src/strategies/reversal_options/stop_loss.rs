use crate::utils::indicators::{round_to, PRICE_DECIMALS};

use super::indicators::IndicatorFrame;
use super::model::Position;

/// 参与初始止损的历史K线数（不含入场K线）
pub const STOP_LOOKBACK: usize = 5;

/// 初始止损计算结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InitialStop {
    pub level: f64,
    pub atr: Option<f64>,
    /// ATR 不可用，止损退化为原始极值
    pub degraded: bool,
}

/// 初始止损：入场K线之前最近5根平均K线的极值 ∓ 乘数 × ATR
///
/// ATR 取共享序列在入场K线上的值。不足6根时使用入场K线之前的全部K线；
/// 只有一根K线时退化为使用它本身。
pub fn compute_initial(
    position: Position,
    frame: &IndicatorFrame,
    atr_period: usize,
    atr_multiplier: f64,
) -> Option<InitialStop> {
    let rows = frame.rows();
    let window = match rows.len() {
        0 => return None,
        1 => rows,
        n if n < STOP_LOOKBACK + 1 => &rows[..n - 1],
        n => &rows[n - 1 - STOP_LOOKBACK..n - 1],
    };

    let extreme = match position {
        Position::LongCall => window.iter().map(|r| r.ha.low).fold(f64::INFINITY, f64::min),
        Position::LongPut => window
            .iter()
            .map(|r| r.ha.high)
            .fold(f64::NEG_INFINITY, f64::max),
    };
    if !extreme.is_finite() {
        return None;
    }

    let atr = frame.atr_at(atr_period, rows.len() - 1);
    let level = match (position, atr) {
        (Position::LongCall, Some(atr)) => extreme - atr_multiplier * atr,
        (Position::LongPut, Some(atr)) => extreme + atr_multiplier * atr,
        (_, None) => extreme,
    };

    Some(InitialStop {
        level: round_to(level, PRICE_DECIMALS),
        atr,
        degraded: atr.is_none(),
    })
}

/// 加仓后止损重置为全部入场价的算术平均，不叠加 ATR
pub fn rebase_after_pyramid(entry_prices: &[f64]) -> Option<f64> {
    if entry_prices.is_empty() {
        return None;
    }
    Some(entry_prices.iter().sum::<f64>() / entry_prices.len() as f64)
}
