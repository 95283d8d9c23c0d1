//! 衍生品合约代码工具
//!
//! 期货: `{SYMBOL}{YY}{MON}FUT`，期权: `{SYMBOL}{YY}{MON}{STRIKE}{CE|PE}`

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};

use crate::core::error::TradingError;
use crate::core::types::{OptionKind, Result};

const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

/// 解析 `DD-MM-YYYY` 格式的到期日
pub fn parse_expiry(expiry: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(expiry.trim(), "%d-%m-%Y").map_err(|e| {
        TradingError::SymbolError(format!(
            "到期日格式错误: {} (应为 DD-MM-YYYY): {}",
            expiry, e
        ))
    })
}

/// 到期时刻：到期日 15:30 收盘
pub fn expiry_close(expiry: NaiveDate) -> NaiveDateTime {
    let close = NaiveTime::from_hms_opt(15, 30, 0).unwrap_or(NaiveTime::MIN);
    expiry.and_time(close)
}

fn series_code(symbol: &str, expiry: NaiveDate) -> String {
    let year_short = expiry.year() % 100;
    let month = MONTHS[expiry.month0() as usize];
    format!("{}{:02}{}", symbol.trim().to_uppercase(), year_short, month)
}

/// 构造期货合约代码，例如 CRUDEOIL + 19-11-2025 -> CRUDEOIL25NOVFUT
pub fn future_symbol(symbol: &str, expiry: NaiveDate) -> String {
    format!("{}FUT", series_code(symbol, expiry))
}

/// 构造期权合约代码，例如 CRUDEOIL + 19-11-2025 + 5300 + CE -> CRUDEOIL25NOV5300CE
pub fn option_symbol(symbol: &str, expiry: NaiveDate, strike: i64, kind: OptionKind) -> String {
    format!("{}{}{}", series_code(symbol, expiry), strike, kind.suffix())
}

/// 解析期权合约代码，返回 (系列代码, 行权价, 类型)
///
/// `CRUDEOIL25NOV5300CE` -> (`CRUDEOIL25NOV`, 5300, Call)
pub fn parse_option_symbol(symbol: &str) -> Option<(String, i64, OptionKind)> {
    let upper = symbol.trim().to_uppercase();
    let kind = if upper.ends_with("CE") {
        OptionKind::Call
    } else if upper.ends_with("PE") {
        OptionKind::Put
    } else {
        return None;
    };
    let body = &upper[..upper.len() - 2];
    let digits = body.len() - body.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    let (series, strike) = body.split_at(body.len() - digits);
    let strike: i64 = strike.parse().ok()?;
    series_month(series)?;
    Some((series.to_string(), strike, kind))
}

/// 系列代码对应的年月：`CRUDEOIL25NOV` -> (2025, 11)
pub fn series_month(series: &str) -> Option<(i32, u32)> {
    if series.len() < 5 || !series.is_ascii() {
        return None;
    }
    let (head, month) = series.split_at(series.len() - 3);
    let month = MONTHS.iter().position(|m| *m == month)? as u32 + 1;
    let year: i32 = head.get(head.len() - 2..)?.parse().ok()?;
    Some((2000 + year, month))
}

/// 系列当月最后一天
pub fn series_last_day(series: &str) -> Option<NaiveDate> {
    let (year, month) = series_month(series)?;
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

/// 标的名称是否以给定前缀之一开头（用于判断商品期货）
pub fn matches_underlying(symbol: &str, underlyings: &[String]) -> bool {
    let upper = symbol.to_uppercase();
    underlyings
        .iter()
        .any(|u| upper.starts_with(&u.to_uppercase()))
}
