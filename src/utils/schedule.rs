//! K线周期与调度时间计算

use chrono::{Duration, NaiveDateTime, Timelike};

/// 无法识别的周期默认按5分钟处理
pub const DEFAULT_TIMEFRAME_MINUTES: u32 = 5;

/// 周期字符串转分钟数："5minute" -> 5, "minute" -> 1, "2hour" -> 120, "day" -> 1440
pub fn timeframe_minutes(timeframe: &str) -> u32 {
    let lower = timeframe.trim().to_lowercase();
    let number: Option<u32> = {
        let digits: String = lower.chars().filter(|c| c.is_ascii_digit()).collect();
        digits.parse().ok().filter(|n| *n > 0)
    };

    if lower.contains("min") {
        number.unwrap_or(1)
    } else if lower.contains("hour") || lower.contains("hr") {
        number.unwrap_or(1) * 60
    } else if lower.contains("day") {
        1440
    } else {
        log::warn!(
            "⚠️ 无法识别的K线周期 '{}'，按{}分钟处理",
            timeframe,
            DEFAULT_TIMEFRAME_MINUTES
        );
        DEFAULT_TIMEFRAME_MINUTES
    }
}

/// 下一个K线边界，例如 14:26 + 5分钟周期 -> 14:30；正好在边界上时取下一个边界
pub fn next_candle_time(now: NaiveDateTime, timeframe_minutes: u32) -> NaiveDateTime {
    let tf = timeframe_minutes.max(1) as i64;
    let minute_of_day = (now.hour() * 60 + now.minute()) as i64;
    let minutes_to_add = tf - (minute_of_day % tf);
    let floored = now
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    floored + Duration::minutes(minutes_to_add)
}

/// 以 `open_time` 开始的K线在 `now` 是否已收盘
pub fn is_candle_closed(open_time: NaiveDateTime, timeframe_minutes: u32, now: NaiveDateTime) -> bool {
    open_time + Duration::minutes(timeframe_minutes.max(1) as i64) <= now
}
