use super::config::InstrumentConfig;
use super::indicators::SignalBar;
use super::logging;
use super::model::TradingState;
use super::pyramiding;

fn price(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "N/A".to_string())
}

/// 每个标的评估后的运行摘要
pub fn render(instrument: &InstrumentConfig, future_symbol: &str, state: &TradingState, bar: &SignalBar) -> Vec<String> {
    let ha = bar.ha;
    let trend = if bar.trend() == 1 { "UP" } else { "DOWN" };
    let position = state
        .position
        .map(|p| p.to_string())
        .unwrap_or_else(|| "FLAT".to_string());

    let mut lines = vec![
        format!("📊 {} | 最新K线 {}", future_symbol, bar.candle.timestamp.format("%Y-%m-%d %H:%M")),
        format!(
            "  HA  O {:.2} H {:.2} L {:.2} C {:.2} | Volume {:.0} / MA {:.0}",
            ha.open, ha.high, ha.low, ha.close, bar.candle.volume, bar.volume_ma
        ),
        format!(
            "  外轨 {:.2} / {:.2} / {:.2} | 内轨 {:.2} / {:.2} / {:.2}",
            bar.outer.lower, bar.outer.middle, bar.outer.upper, bar.inner.lower, bar.inner.middle, bar.inner.upper
        ),
        format!("  Supertrend {:.2} ({})", bar.supertrend.value, trend),
        format!(
            "  Armed BUY {} | Armed SELL {} | Position {}",
            state.armed_buy, state.armed_sell, position
        ),
    ];

    if !state.is_flat() {
        lines.push(format!(
            "  合约 {} | SL 初始 {} 当前 {}",
            state.option_symbol.as_deref().unwrap_or("N/A"),
            price(state.initial_sl),
            price(state.current_sl)
        ));
        lines.push(format!(
            "  加仓 {}/{} | 下一加仓价 {}",
            state.pyramiding_count,
            instrument.pyramiding.max_legs(),
            price(pyramiding::next_level(state, &instrument.pyramiding))
        ));
    }
    lines
}

pub fn log_summary(instrument: &InstrumentConfig, future_symbol: &str, state: &TradingState, bar: &SignalBar) {
    for line in render(instrument, future_symbol, state, bar) {
        logging::info(Some(future_symbol), line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::reversal_options::model::Position;
    use crate::strategies::reversal_options::testing::{bar, instrument};

    #[test]
    fn test_flat_summary_omits_position_detail() {
        let lines = render(&instrument(), "CRUDEOIL25NOVFUT", &TradingState::default(), &bar(1.0, 2.0, 3.0, 0.5, 10.0));
        assert_eq!(lines.len(), 5);
        assert!(lines[4].contains("FLAT"));
        assert!(lines[3].contains("UP"));
    }

    #[test]
    fn test_open_summary_shows_next_level() {
        let state = TradingState {
            position: Some(Position::LongCall),
            initial_sl: Some(5250.0),
            current_sl: Some(5250.0),
            entry_prices: vec![5300.0],
            pyramiding_count: 1,
            first_entry_price: Some(5300.0),
            last_pyramiding_price: Some(5300.0),
            option_symbol: Some("CRUDEOIL25NOV5300CE".to_string()),
            ..TradingState::default()
        };
        let lines = render(&instrument(), "CRUDEOIL25NOVFUT", &state, &bar(1.0, 2.0, 3.0, 0.5, 10.0));
        assert_eq!(lines.len(), 7);
        assert!(lines[5].contains("CRUDEOIL25NOV5300CE"));
        assert!(lines[6].contains("1/3") && lines[6].contains("5325.00"));
    }
}
