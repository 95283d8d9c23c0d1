//! 期权选择：ATM 行权价梯度 + 隐含波动率反解 + Delta 排序
//!
//! 报价缺失或隐含波动率无法收敛的行权价直接跳过，不使用任何默认波动率。

use chrono::{NaiveDate, NaiveDateTime};

use crate::core::error::TradingError;
use crate::core::exchange::QuoteSource;
use crate::core::types::{ExchangeSegment, OptionKind, Result};
use crate::utils::{black_scholes, contract};

use super::logging;
use super::model::OptionCandidate;

pub use crate::utils::black_scholes::{bs_price, delta, implied_volatility, norm_cdf};

/// 浮点误差容限：恰好落在上限上的 Delta 仍视为满足上限
const DELTA_CAP_TOLERANCE: f64 = 1e-12;

/// 距到期的年数（按 365.25 天计），已到期返回 None
pub fn time_to_expiry_years(expiry: NaiveDate, now: NaiveDateTime) -> Option<f64> {
    black_scholes::year_fraction(now, contract::expiry_close(expiry))
}

/// 最接近标的价格的行权价（银行家舍入）
pub fn normalize_strike(price: f64, strike_step: f64) -> i64 {
    ((price / strike_step).round_ties_even() * strike_step).round() as i64
}

/// 以 ATM 为中心的 2n+1 个行权价，升序
pub fn strike_ladder(atm: i64, strike_step: f64, strike_count: u32) -> Vec<i64> {
    let n = strike_count as i64;
    (-n..=n)
        .map(|i| (atm as f64 + i as f64 * strike_step).round() as i64)
        .filter(|strike| *strike > 0)
        .collect()
}

/// 看涨只取 ≤ ATM（实值侧），看跌只取 ≥ ATM
pub fn candidate_strikes(atm: i64, strike_step: f64, strike_count: u32, kind: OptionKind) -> Vec<i64> {
    strike_ladder(atm, strike_step, strike_count)
        .into_iter()
        .filter(|strike| match kind {
            OptionKind::Call => *strike <= atm,
            OptionKind::Put => *strike >= atm,
        })
        .collect()
}

/// 按 Delta 选出最优候选；超过上限的候选直接排除，同值取先评估者
pub fn pick_best(candidates: &[OptionCandidate], kind: OptionKind, delta_cap: f64) -> Option<&OptionCandidate> {
    let cap = delta_cap + DELTA_CAP_TOLERANCE;
    let mut best: Option<&OptionCandidate> = None;
    for candidate in candidates {
        let better = match kind {
            OptionKind::Call => {
                candidate.delta <= cap
                    && best.map_or(true, |b| candidate.delta > b.delta)
            }
            OptionKind::Put => {
                candidate.delta >= -cap
                    && best.map_or(true, |b| candidate.delta < b.delta)
            }
        };
        if better {
            best = Some(candidate);
        }
    }
    best
}

/// 一次期权选择所需的市场参数
#[derive(Debug, Clone)]
pub struct SelectionRequest {
    pub underlying: String,
    pub expiry: NaiveDate,
    pub kind: OptionKind,
    pub exchange: ExchangeSegment,
    pub underlying_price: f64,
    pub strike_step: f64,
    pub strike_count: u32,
    pub risk_free_rate: f64,
    pub delta_cap: f64,
    pub now: NaiveDateTime,
}

async fn fetch_price(
    quotes: &dyn QuoteSource,
    exchange: ExchangeSegment,
    symbol: &str,
) -> Result<Option<f64>> {
    match quotes.last_price(exchange, symbol).await {
        Ok(price) => Ok(price),
        Err(e @ TradingError::RateLimitError(..)) => Err(e),
        Err(e) => {
            logging::warn(Some(symbol), format!("获取报价失败，跳过该合约: {}", e));
            Ok(None)
        }
    }
}

/// 评估所有候选行权价并返回 Delta 最优的期权
///
/// 报价不可用的行权价跳过；隐含波动率反解失败时重新获取一次报价再试，仍失败则跳过。
pub async fn select_option(
    quotes: &dyn QuoteSource,
    request: &SelectionRequest,
) -> Result<Option<OptionCandidate>> {
    let tag = request.underlying.as_str();
    let Some(t) = time_to_expiry_years(request.expiry, request.now) else {
        logging::warn(Some(tag), format!("⚠️ 合约已到期 ({})，不选择期权", request.expiry));
        return Ok(None);
    };
    if !(request.underlying_price > 0.0 && request.strike_step > 0.0) {
        return Ok(None);
    }

    let spot = request.underlying_price;
    let atm = normalize_strike(spot, request.strike_step);
    let strikes = candidate_strikes(atm, request.strike_step, request.strike_count, request.kind);
    logging::debug(
        Some(tag),
        format!(
            "Delta 计算: {} 标的价 {:.2} ATM {} 剩余 {:.4} 年 利率 {:.2}%",
            request.kind.suffix(),
            spot,
            atm,
            t,
            request.risk_free_rate * 100.0
        ),
    );

    let mut candidates = Vec::with_capacity(strikes.len());
    for (order, strike) in strikes.into_iter().enumerate() {
        let symbol = contract::option_symbol(&request.underlying, request.expiry, strike, request.kind);

        let Some(mut price) = fetch_price(quotes, request.exchange, &symbol).await? else {
            logging::debug(Some(tag), format!("{} 无有效报价，跳过", symbol));
            continue;
        };

        let strike_f = strike as f64;
        let mut iv = implied_volatility(price, spot, strike_f, t, request.risk_free_rate, request.kind);
        if iv.is_none() {
            logging::debug(Some(tag), format!("{} IV 反解失败 (价格 {:.2})，重新获取报价", symbol, price));
            if let Some(refreshed) = fetch_price(quotes, request.exchange, &symbol).await? {
                price = refreshed;
                iv = implied_volatility(price, spot, strike_f, t, request.risk_free_rate, request.kind);
            }
        }
        let Some(sigma) = iv else {
            logging::debug(Some(tag), format!("{} IV 仍无法反解，跳过", symbol));
            continue;
        };

        let candidate = OptionCandidate {
            strike,
            contract_symbol: symbol,
            quoted_price: price,
            implied_volatility: sigma,
            delta: delta(spot, strike_f, t, request.risk_free_rate, sigma, request.kind),
            evaluation_order: order,
        };
        logging::debug(
            Some(tag),
            format!(
                "{:<8} {:<24} delta {:>8.4} iv {:>6.2}% ltp {:>10.2}",
                candidate.strike,
                candidate.contract_symbol,
                candidate.delta,
                candidate.implied_volatility * 100.0,
                candidate.quoted_price
            ),
        );
        candidates.push(candidate);
    }

    let best = pick_best(&candidates, request.kind, request.delta_cap).cloned();
    match &best {
        Some(c) => logging::info(
            Some(tag),
            format!(
                "✅ 选中期权 {} 行权价 {} delta {:.4} iv {:.2}% 价格 {:.2}",
                c.contract_symbol,
                c.strike,
                c.delta,
                c.implied_volatility * 100.0,
                c.quoted_price
            ),
        ),
        None => logging::warn(
            Some(tag),
            format!("⚠️ {} 个候选中没有满足 Delta 上限 {:.2} 的期权", candidates.len(), request.delta_cap),
        ),
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::reversal_options::testing::ScriptedQuotes;

    fn candidate(strike: i64, delta: f64, order: usize) -> OptionCandidate {
        OptionCandidate {
            strike,
            contract_symbol: format!("X{}", strike),
            quoted_price: 10.0,
            implied_volatility: 0.2,
            delta,
            evaluation_order: order,
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 11, 3)
            .and_then(|d| d.and_hms_opt(10, 0, 0))
            .unwrap()
    }

    fn request(kind: OptionKind) -> SelectionRequest {
        SelectionRequest {
            underlying: "CRUDEOIL".to_string(),
            expiry: NaiveDate::from_ymd_opt(2025, 11, 19).unwrap(),
            kind,
            exchange: ExchangeSegment::Mcx,
            underlying_price: 5319.0,
            strike_step: 50.0,
            strike_count: 2,
            risk_free_rate: 0.10,
            delta_cap: 0.80,
            now: now(),
        }
    }

    fn model_price(req: &SelectionRequest, strike: i64, sigma: f64) -> f64 {
        let t = time_to_expiry_years(req.expiry, req.now).unwrap();
        bs_price(req.underlying_price, strike as f64, t, req.risk_free_rate, sigma, req.kind)
    }

    #[test]
    fn test_atm_strike() {
        assert_eq!(normalize_strike(5319.0, 50.0), 5300);
        assert_eq!(normalize_strike(5326.0, 50.0), 5350);
        // 恰好在中点时取偶数倍
        assert_eq!(normalize_strike(5325.0, 50.0), 5300);
        assert_eq!(normalize_strike(5375.0, 50.0), 5400);
    }

    #[test]
    fn test_strike_ladder_and_side_filter() {
        assert_eq!(strike_ladder(5300, 50.0, 2), vec![5200, 5250, 5300, 5350, 5400]);
        assert_eq!(candidate_strikes(5300, 50.0, 2, OptionKind::Call), vec![5200, 5250, 5300]);
        assert_eq!(candidate_strikes(5300, 50.0, 2, OptionKind::Put), vec![5300, 5350, 5400]);
    }

    #[test]
    fn test_cap_excludes_high_delta_call() {
        let candidates = vec![candidate(5200, 0.62, 0), candidate(5150, 0.79, 1), candidate(5100, 0.83, 2)];
        let best = pick_best(&candidates, OptionKind::Call, 0.80).unwrap();
        assert!((best.delta - 0.79).abs() < 1e-12);

        let only_high = vec![candidate(5100, 0.83, 0)];
        assert!(pick_best(&only_high, OptionKind::Call, 0.80).is_none());
    }

    #[test]
    fn test_delta_exactly_at_cap_is_kept() {
        // d1 = Φ⁻¹(0.80)：看涨 Delta 恰为 0.80，对称的看跌为 -0.80
        let d1 = 0.8416212335729143;
        let at_cap = candidate(5150, norm_cdf(d1), 0);
        let best = pick_best(std::slice::from_ref(&at_cap), OptionKind::Call, 0.80).unwrap();
        assert_eq!(best.strike, 5150);

        let put_at_cap = candidate(5450, -norm_cdf(d1), 0);
        assert!(pick_best(std::slice::from_ref(&put_at_cap), OptionKind::Put, 0.80).is_some());

        let just_above = candidate(5100, 0.8000001, 0);
        assert!(pick_best(std::slice::from_ref(&just_above), OptionKind::Call, 0.80).is_none());
    }

    #[test]
    fn test_put_takes_most_negative_within_cap() {
        let candidates = vec![candidate(5300, -0.45, 0), candidate(5350, -0.78, 1), candidate(5400, -0.85, 2)];
        let best = pick_best(&candidates, OptionKind::Put, 0.80).unwrap();
        assert_eq!(best.strike, 5350);
    }

    #[test]
    fn test_expired_contract_has_no_time() {
        let expiry = NaiveDate::from_ymd_opt(2025, 11, 3).unwrap();
        let after_close = expiry.and_hms_opt(15, 31, 0).unwrap();
        assert!(time_to_expiry_years(expiry, after_close).is_none());
        assert!(time_to_expiry_years(expiry, now()).is_some());
    }

    #[tokio::test]
    async fn test_select_skips_missing_quotes_and_respects_cap() {
        let req = request(OptionKind::Call);
        let quotes = ScriptedQuotes::new();
        // 5200 深度实值 delta 高于上限；5250 报价缺失；5300 正常
        quotes.set("CRUDEOIL25NOV5200CE", vec![Some(model_price(&req, 5200, 0.05))]);
        quotes.set("CRUDEOIL25NOV5250CE", vec![None]);
        quotes.set("CRUDEOIL25NOV5300CE", vec![Some(model_price(&req, 5300, 0.30))]);

        let best = select_option(&quotes, &req).await.unwrap().unwrap();
        assert_eq!(best.strike, 5300);
        assert!(best.delta <= 0.80);
        assert!((best.implied_volatility - 0.30).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_iv_failure_refetches_exactly_once() {
        let req = request(OptionKind::Call);
        let quotes = ScriptedQuotes::new();
        let good = model_price(&req, 5300, 0.30);
        // 第一次报价低于内在价值导致反解失败，第二次正常
        quotes.set("CRUDEOIL25NOV5300CE", vec![Some(1.0), Some(good)]);
        // 两次都失败的合约只会被请求两次
        quotes.set("CRUDEOIL25NOV5250CE", vec![Some(1.0), Some(1.0), Some(good)]);

        let best = select_option(&quotes, &req).await.unwrap().unwrap();
        assert_eq!(best.strike, 5300);
        assert!((best.quoted_price - good).abs() < 1e-9);
        assert_eq!(quotes.fetch_count("CRUDEOIL25NOV5300CE"), 2);
        assert_eq!(quotes.fetch_count("CRUDEOIL25NOV5250CE"), 2);
    }

    #[tokio::test]
    async fn test_no_candidates_returns_none() {
        let req = request(OptionKind::Put);
        let quotes = ScriptedQuotes::new();
        assert!(select_option(&quotes, &req).await.unwrap().is_none());
    }
}
