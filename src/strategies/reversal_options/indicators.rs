use std::collections::HashMap;

use anyhow::Result;

use crate::core::error::TradingError;
use crate::core::types::Candle;
use crate::utils::indicators::{
    self, round_to, series, ChannelPoint, HeikinAshi, SupertrendPoint, PRICE_DECIMALS,
};

use super::config::InstrumentConfig;

fn round(value: f64) -> f64 {
    round_to(value, PRICE_DECIMALS)
}

fn round_channel(point: ChannelPoint) -> ChannelPoint {
    ChannelPoint {
        middle: round(point.middle),
        upper: round(point.upper),
        lower: round(point.lower),
    }
}

/// 单根K线及其附带的全部指标（冷启动段为 None）
#[derive(Debug, Clone)]
pub struct IndicatorRow {
    pub candle: Candle,
    pub ha: HeikinAshi,
    pub volume_ma: Option<f64>,
    pub outer: Option<ChannelPoint>,
    pub inner: Option<ChannelPoint>,
    pub supertrend: Option<SupertrendPoint>,
}

impl IndicatorRow {
    /// 所有指标均已有效时返回完整快照
    pub fn complete(&self) -> Option<SignalBar> {
        Some(SignalBar {
            candle: self.candle.clone(),
            ha: self.ha,
            volume_ma: self.volume_ma?,
            outer: self.outer?,
            inner: self.inner?,
            supertrend: self.supertrend?,
        })
    }
}

/// 可用于信号判断的完整K线快照
#[derive(Debug, Clone)]
pub struct SignalBar {
    pub candle: Candle,
    pub ha: HeikinAshi,
    pub volume_ma: f64,
    pub outer: ChannelPoint,
    pub inner: ChannelPoint,
    pub supertrend: SupertrendPoint,
}

impl SignalBar {
    pub fn trend(&self) -> i8 {
        self.supertrend.trend
    }
}

/// 指标计算参数
#[derive(Debug, Clone, Copy)]
pub struct PipelineParams {
    pub volume_ma: usize,
    pub outer_length: usize,
    pub outer_multiplier: f64,
    pub outer_atr: usize,
    pub inner_length: usize,
    pub inner_multiplier: f64,
    pub inner_atr: usize,
    pub supertrend_period: usize,
    pub supertrend_multiplier: f64,
    pub stop_loss_atr: usize,
}

impl From<&InstrumentConfig> for PipelineParams {
    fn from(config: &InstrumentConfig) -> Self {
        Self {
            volume_ma: config.volume_ma,
            outer_length: config.outer_channel.length,
            outer_multiplier: config.outer_channel.multiplier,
            outer_atr: config.outer_channel.atr_period,
            inner_length: config.inner_channel.length,
            inner_multiplier: config.inner_channel.multiplier,
            inner_atr: config.inner_channel.atr_period,
            supertrend_period: config.supertrend.period,
            supertrend_multiplier: config.supertrend.multiplier,
            stop_loss_atr: config.stop_loss.atr_period,
        }
    }
}

/// 整段K线的指标结果
///
/// 同一周期的 ATR 只在平均K线序列上计算一次，通道、超级趋势与止损共用同一份结果。
#[derive(Debug, Clone)]
pub struct IndicatorFrame {
    rows: Vec<IndicatorRow>,
    atr: HashMap<usize, Vec<Option<f64>>>,
}

impl IndicatorFrame {
    pub fn compute(candles: &[Candle], params: &PipelineParams) -> Self {
        let ha = indicators::heikin_ashi(candles);
        let highs: Vec<f64> = ha.iter().map(|c| c.high).collect();
        let lows: Vec<f64> = ha.iter().map(|c| c.low).collect();
        let closes: Vec<f64> = ha.iter().map(|c| c.close).collect();
        let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();

        let mut atr: HashMap<usize, Vec<Option<f64>>> = HashMap::new();
        for period in [
            params.outer_atr,
            params.inner_atr,
            params.supertrend_period,
            params.stop_loss_atr,
        ] {
            atr.entry(period)
                .or_insert_with(|| series::atr(&highs, &lows, &closes, period));
        }
        let atr_for = |period: usize| atr.get(&period).cloned().unwrap_or_default();

        let volume_ma = series::rolling_sma(&volumes, params.volume_ma);
        let outer = indicators::keltner_channel(
            &closes,
            &atr_for(params.outer_atr),
            params.outer_length,
            params.outer_multiplier,
        );
        let inner = indicators::keltner_channel(
            &closes,
            &atr_for(params.inner_atr),
            params.inner_length,
            params.inner_multiplier,
        );
        let trend = indicators::supertrend(
            &highs,
            &lows,
            &closes,
            &atr_for(params.supertrend_period),
            params.supertrend_multiplier,
        );

        let rows = candles
            .iter()
            .enumerate()
            .map(|(i, candle)| IndicatorRow {
                candle: candle.clone(),
                ha: HeikinAshi {
                    open: round(ha[i].open),
                    high: round(ha[i].high),
                    low: round(ha[i].low),
                    close: round(ha[i].close),
                },
                volume_ma: volume_ma.get(i).copied().flatten().map(round),
                outer: outer.get(i).copied().flatten().map(round_channel),
                inner: inner.get(i).copied().flatten().map(round_channel),
                supertrend: trend.get(i).copied().flatten().map(|p| SupertrendPoint {
                    value: round(p.value),
                    trend: p.trend,
                    final_upper: round(p.final_upper),
                    final_lower: round(p.final_lower),
                }),
            })
            .collect();

        let atr = atr
            .into_iter()
            .map(|(period, values)| (period, values.into_iter().map(|v| v.map(round)).collect()))
            .collect();

        Self { rows, atr }
    }

    pub fn rows(&self) -> &[IndicatorRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn last(&self) -> Option<&IndicatorRow> {
        self.rows.last()
    }

    /// 共享的 ATR 序列
    pub fn atr_series(&self, period: usize) -> Option<&[Option<f64>]> {
        self.atr.get(&period).map(|v| v.as_slice())
    }

    /// 指定周期在第 `index` 根上的 ATR
    pub fn atr_at(&self, period: usize, index: usize) -> Option<f64> {
        self.atr_series(period)
            .and_then(|values| values.get(index).copied().flatten())
    }

    /// 当前（最后一根）与前一根的完整快照，任一不完整时返回历史不足
    pub fn signal_pair(&self) -> Result<(SignalBar, SignalBar), TradingError> {
        let len = self.rows.len();
        let insufficient = || TradingError::InsufficientHistory {
            required: self.first_complete_index().map(|i| i + 2).unwrap_or(len + 1),
            available: len,
        };
        if len < 2 {
            return Err(insufficient());
        }
        let prev = self.rows[len - 2].complete().ok_or_else(insufficient)?;
        let current = self.rows[len - 1].complete().ok_or_else(insufficient)?;
        Ok((prev, current))
    }

    fn first_complete_index(&self) -> Option<usize> {
        self.rows.iter().position(|row| row.complete().is_some())
    }
}

/// 运行完整指标计算，并校验可用历史长度
pub fn build_frame(candles: &[Candle], config: &InstrumentConfig) -> Result<IndicatorFrame> {
    let frame = IndicatorFrame::compute(candles, &PipelineParams::from(config));
    frame.signal_pair()?;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn params() -> PipelineParams {
        PipelineParams {
            volume_ma: 3,
            outer_length: 3,
            outer_multiplier: 2.0,
            outer_atr: 3,
            inner_length: 4,
            inner_multiplier: 3.0,
            inner_atr: 3,
            supertrend_period: 3,
            supertrend_multiplier: 2.0,
            stop_loss_atr: 3,
        }
    }

    fn candles(n: usize) -> Vec<Candle> {
        let start = NaiveDate::from_ymd_opt(2025, 11, 3)
            .and_then(|d| d.and_hms_opt(9, 15, 0))
            .unwrap();
        (0..n)
            .map(|i| {
                let base = 100.0 + (i as f64 * 0.7).sin() * 5.0;
                Candle::new(
                    start + Duration::minutes(5 * i as i64),
                    base,
                    base + 2.0,
                    base - 2.0,
                    base + 0.5,
                    1000.0 + i as f64,
                )
            })
            .collect()
    }

    #[test]
    fn test_atr_shared_between_consumers() {
        let frame = IndicatorFrame::compute(&candles(20), &params());
        // 四个消费者使用同一周期，只应有一份 ATR
        assert_eq!(frame.atr.len(), 1);
        let row = &frame.rows()[10];
        let outer = row.outer.unwrap();
        let atr = frame.atr_at(3, 10).unwrap();
        assert!(((outer.upper - outer.middle) - 2.0 * atr).abs() < 0.03);
    }

    #[test]
    fn test_derived_candle_body_inside_range() {
        let frame = IndicatorFrame::compute(&candles(30), &params());
        for row in frame.rows() {
            let ha = row.ha;
            assert!(ha.low <= ha.open.min(ha.close));
            assert!(ha.open.max(ha.close) <= ha.high);
        }
    }

    #[test]
    fn test_outputs_are_rounded() {
        let frame = IndicatorFrame::compute(&candles(20), &params());
        let bar = frame.rows()[15].complete().unwrap();
        for value in [bar.ha.close, bar.outer.upper, bar.inner.lower, bar.supertrend.value, bar.volume_ma] {
            assert!((value * 100.0 - (value * 100.0).round()).abs() < 1e-6);
        }
    }

    #[test]
    fn test_cold_start_is_insufficient_history() {
        let frame = IndicatorFrame::compute(&candles(4), &params());
        match frame.signal_pair() {
            Err(TradingError::InsufficientHistory { available, .. }) => assert_eq!(available, 4),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }

        let frame = IndicatorFrame::compute(&candles(10), &params());
        assert!(frame.signal_pair().is_ok());
    }
}
