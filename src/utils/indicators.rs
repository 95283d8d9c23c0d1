//! 统一的技术指标模块
//! 所有函数均为无状态纯函数，输入完整序列，输出与输入等长的序列（冷启动段为 None）

use crate::core::types::Candle;

/// 指标输出统一保留的小数位数
pub const PRICE_DECIMALS: u32 = 2;

/// 四舍五入到指定小数位
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// 序列指标
pub mod series {
    /// 滚动简单均值，窗口未满时为 None
    pub fn rolling_sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
        let mut out = vec![None; values.len()];
        if period == 0 || values.len() < period {
            return out;
        }
        let mut sum: f64 = values[..period].iter().sum();
        out[period - 1] = Some(sum / period as f64);
        for i in period..values.len() {
            sum += values[i] - values[i - period];
            out[i] = Some(sum / period as f64);
        }
        out
    }

    /// EMA 序列：第 period-1 根取前 period 根的 SMA，之后 alpha = 2/(period+1)
    pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
        let mut out = vec![None; values.len()];
        if period == 0 || values.len() < period {
            return out;
        }
        let multiplier = 2.0 / (period as f64 + 1.0);
        let mut ema = values[..period].iter().sum::<f64>() / period as f64;
        out[period - 1] = Some(ema);
        for i in period..values.len() {
            ema = (values[i] - ema) * multiplier + ema;
            out[i] = Some(ema);
        }
        out
    }

    /// 真实波幅，首根为 high - low
    pub fn true_range(highs: &[f64], lows: &[f64], closes: &[f64]) -> Vec<f64> {
        let len = highs.len().min(lows.len()).min(closes.len());
        let mut tr = Vec::with_capacity(len);
        for i in 0..len {
            let high_low = highs[i] - lows[i];
            if i == 0 {
                tr.push(high_low);
                continue;
            }
            let high_close = (highs[i] - closes[i - 1]).abs();
            let low_close = (lows[i] - closes[i - 1]).abs();
            tr.push(high_low.max(high_close).max(low_close));
        }
        tr
    }

    /// Wilder ATR：第 period 根为 TR[1..=period] 的均值，之后
    /// atr = (prev * (period - 1) + tr) / period
    pub fn atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<Option<f64>> {
        let tr = true_range(highs, lows, closes);
        let mut out = vec![None; tr.len()];
        if period == 0 || tr.len() < period + 1 {
            return out;
        }
        let mut atr = tr[1..=period].iter().sum::<f64>() / period as f64;
        out[period] = Some(atr);
        for i in (period + 1)..tr.len() {
            atr = (atr * (period as f64 - 1.0) + tr[i]) / period as f64;
            out[i] = Some(atr);
        }
        out
    }
}

/// 平均K线（Heikin-Ashi）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeikinAshi {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl HeikinAshi {
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

/// 将原始K线转换为平均K线，每根依赖上一根的结果
pub fn heikin_ashi(candles: &[Candle]) -> Vec<HeikinAshi> {
    let mut out: Vec<HeikinAshi> = Vec::with_capacity(candles.len());
    for candle in candles {
        let close = (candle.open + candle.high + candle.low + candle.close) / 4.0;
        let open = match out.last() {
            Some(prev) => (prev.open + prev.close) / 2.0,
            None => (candle.open + candle.close) / 2.0,
        };
        let high = candle.high.max(open).max(close);
        let low = candle.low.min(open).min(close);
        out.push(HeikinAshi {
            open,
            high,
            low,
            close,
        });
    }
    out
}

/// 通道（Keltner）单点
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelPoint {
    pub middle: f64,
    pub upper: f64,
    pub lower: f64,
}

/// Keltner 通道：middle = EMA(close, length)，带宽 = multiplier × ATR
///
/// ATR 由调用方传入，保证与其它消费者使用同一份计算结果。
pub fn keltner_channel(
    closes: &[f64],
    atr: &[Option<f64>],
    length: usize,
    multiplier: f64,
) -> Vec<Option<ChannelPoint>> {
    let middle = series::ema(closes, length);
    middle
        .iter()
        .zip(atr.iter())
        .map(|(mid, atr)| match (mid, atr) {
            (Some(mid), Some(atr)) => {
                let width = multiplier * atr;
                Some(ChannelPoint {
                    middle: *mid,
                    upper: mid + width,
                    lower: mid - width,
                })
            }
            _ => None,
        })
        .collect()
}

/// 超级趋势单点
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupertrendPoint {
    pub value: f64,
    /// +1 上升，-1 下降
    pub trend: i8,
    pub final_upper: f64,
    pub final_lower: f64,
}

/// 超级趋势（Supertrend）
///
/// 基础带 = (high + low) / 2 ± multiplier × ATR。最终上轨只下移、最终下轨只上移，
/// 上一根收盘价突破旧带时才重置为基础带。上升趋势中收盘价 ≤ 最终下轨翻转为下降，
/// 下降趋势中收盘价 ≥ 最终上轨翻转为上升。首个有效点趋势为 +1。
pub fn supertrend(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    atr: &[Option<f64>],
    multiplier: f64,
) -> Vec<Option<SupertrendPoint>> {
    let len = highs.len().min(lows.len()).min(closes.len()).min(atr.len());
    let mut out: Vec<Option<SupertrendPoint>> = vec![None; len];
    let mut prev: Option<SupertrendPoint> = None;

    for i in 0..len {
        let Some(atr_value) = atr[i] else {
            prev = None;
            continue;
        };
        let hl2 = (highs[i] + lows[i]) / 2.0;
        let basic_upper = hl2 + multiplier * atr_value;
        let basic_lower = hl2 - multiplier * atr_value;

        let point = match prev {
            None => SupertrendPoint {
                value: basic_lower,
                trend: 1,
                final_upper: basic_upper,
                final_lower: basic_lower,
            },
            Some(p) => {
                let prev_close = closes[i - 1];
                let final_upper = if basic_upper < p.final_upper || prev_close > p.final_upper {
                    basic_upper
                } else {
                    p.final_upper
                };
                let final_lower = if basic_lower > p.final_lower || prev_close < p.final_lower {
                    basic_lower
                } else {
                    p.final_lower
                };

                let trend = if p.trend > 0 {
                    if closes[i] <= final_lower {
                        -1
                    } else {
                        1
                    }
                } else if closes[i] >= final_upper {
                    1
                } else {
                    -1
                };

                SupertrendPoint {
                    value: if trend > 0 { final_lower } else { final_upper },
                    trend,
                    final_upper,
                    final_lower,
                }
            }
        };

        out[i] = Some(point);
        prev = Some(point);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn candle(i: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        let base = NaiveDate::from_ymd_opt(2025, 11, 3)
            .and_then(|d| d.and_hms_opt(9, 15, 0))
            .unwrap();
        Candle::new(
            base + chrono::Duration::minutes(5 * i),
            open,
            high,
            low,
            close,
            1000.0,
        )
    }

    #[test]
    fn test_sma() {
        let prices = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let sma = series::rolling_sma(&prices, 3);
        assert!((sma[4].unwrap() - 4.0).abs() < 0.001);
    }

    #[test]
    fn test_rolling_sma_prefix_is_none() {
        let values = vec![10.0, 20.0, 30.0, 40.0];
        let out = series::rolling_sma(&values, 3);
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert!((out[2].unwrap() - 20.0).abs() < 1e-9);
        assert!((out[3].unwrap() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_ema_seeded_with_sma() {
        let prices = vec![22.27, 22.19, 22.08, 22.17, 22.18, 22.13, 22.23, 22.43];
        let out = series::ema(&prices, 5);
        let seed = (22.27 + 22.19 + 22.08 + 22.17 + 22.18) / 5.0;
        assert!(out[3].is_none());
        assert!((out[4].unwrap() - seed).abs() < 1e-9);
        let next = (22.13 - seed) * (2.0 / 6.0) + seed;
        assert!((out[5].unwrap() - next).abs() < 1e-9);
    }

    #[test]
    fn test_atr_wilder_smoothing() {
        let highs = vec![10.0, 12.0, 13.0, 12.5, 14.0];
        let lows = vec![9.0, 10.0, 11.0, 11.5, 12.0];
        let closes = vec![9.5, 11.0, 12.5, 12.0, 13.5];
        let out = series::atr(&highs, &lows, &closes, 3);
        // TR = [1.0, 2.5, 2.0, 1.0, 2.0]
        assert!(out[2].is_none());
        let first = (2.5 + 2.0 + 1.0) / 3.0;
        assert!((out[3].unwrap() - first).abs() < 1e-9);
        let second = (first * 2.0 + 2.0) / 3.0;
        assert!((out[4].unwrap() - second).abs() < 1e-9);
    }

    #[test]
    fn test_heikin_ashi_seed_and_recursion() {
        let candles = vec![
            candle(0, 100.0, 110.0, 95.0, 105.0),
            candle(1, 105.0, 112.0, 101.0, 108.0),
        ];
        let ha = heikin_ashi(&candles);
        assert!((ha[0].open - 102.5).abs() < 1e-9);
        assert!((ha[0].close - 102.5).abs() < 1e-9);
        assert!((ha[1].open - 102.5).abs() < 1e-9);
        assert!((ha[1].close - 106.5).abs() < 1e-9);
        assert!((ha[1].high - 112.0).abs() < 1e-9);
        assert!((ha[1].low - 101.0).abs() < 1e-9);
    }

    #[test]
    fn test_heikin_ashi_body_inside_range() {
        let mut candles = Vec::new();
        let mut price = 100.0;
        for i in 0..60 {
            let swing = ((i * 7) % 11) as f64 - 5.0;
            let open = price;
            let close = price + swing;
            let high = open.max(close) + 1.5;
            let low = open.min(close) - 1.0;
            candles.push(candle(i, open, high, low, close));
            price = close;
        }
        for ha in heikin_ashi(&candles) {
            assert!(ha.low <= ha.open.min(ha.close));
            assert!(ha.open.max(ha.close) <= ha.high);
        }
    }

    #[test]
    fn test_keltner_requires_both_inputs() {
        let closes = vec![10.0, 11.0, 12.0, 13.0];
        let atr = vec![None, Some(1.0), Some(1.0), Some(2.0)];
        let out = keltner_channel(&closes, &atr, 2, 2.0);
        assert!(out[0].is_none());
        let p = out[1].unwrap();
        assert!((p.middle - 10.5).abs() < 1e-9);
        assert!((p.upper - 12.5).abs() < 1e-9);
        assert!((p.lower - 8.5).abs() < 1e-9);
        let last = out[3].unwrap();
        assert!((last.upper - last.middle - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_supertrend_lower_band_ratchets_and_flips() {
        let highs = vec![101.0, 103.0, 105.0, 104.0, 96.0];
        let lows = vec![99.0, 101.0, 103.0, 102.0, 90.0];
        let closes = vec![100.0, 102.0, 104.0, 103.0, 91.0];
        let atr = vec![Some(1.0); 5];
        let out = supertrend(&highs, &lows, &closes, &atr, 2.0);

        let p0 = out[0].unwrap();
        assert_eq!(p0.trend, 1);
        assert!((p0.final_lower - 98.0).abs() < 1e-9);

        // 下轨只上移
        let p2 = out[2].unwrap();
        let p3 = out[3].unwrap();
        assert!((p2.final_lower - 102.0).abs() < 1e-9);
        assert!((p3.final_lower - 102.0).abs() < 1e-9);
        assert_eq!(p3.trend, 1);
        assert!((p3.value - p3.final_lower).abs() < 1e-9);

        // 收盘跌破下轨翻转为下降趋势
        let p4 = out[4].unwrap();
        assert_eq!(p4.trend, -1);
        assert!((p4.value - p4.final_upper).abs() < 1e-9);
    }

    #[test]
    fn test_supertrend_upper_band_only_moves_down() {
        let highs = vec![101.0, 99.0, 97.0, 98.0];
        let lows = vec![99.0, 97.0, 95.0, 96.0];
        let closes = vec![100.0, 96.0, 94.0, 95.0];
        let atr = vec![Some(1.0); 4];
        let out = supertrend(&highs, &lows, &closes, &atr, 1.0);
        // 第二根收盘 96 ≤ 下轨 99，翻转为下降
        assert_eq!(out[1].unwrap().trend, -1);
        let p2 = out[2].unwrap();
        let p3 = out[3].unwrap();
        assert!(p3.final_upper <= p2.final_upper);
        assert_eq!(p3.trend, -1);
    }

    #[test]
    fn test_round_to() {
        assert!((round_to(5319.456, 2) - 5319.46).abs() < 1e-9);
        assert!((round_to(-1.005, 1) + 1.0).abs() < 1e-9);
    }
}
