//! Black-Scholes 定价、Delta 与隐含波动率反解（欧式期权，无分红）

use chrono::NaiveDateTime;
use statrs::distribution::{Continuous, ContinuousCDF, Normal};

use crate::core::types::OptionKind;

const SECONDS_PER_YEAR: f64 = 365.25 * 24.0 * 3600.0;
const IV_LOWER: f64 = 1e-4;
const IV_UPPER: f64 = 5.0;
const IV_PRICE_TOLERANCE: f64 = 1e-6;
const IV_MAX_ITERATIONS: usize = 100;

/// `from` 到 `to` 的年数（按 365.25 天计），不为正时返回 None
pub fn year_fraction(from: NaiveDateTime, to: NaiveDateTime) -> Option<f64> {
    let seconds = (to - from).num_seconds() as f64;
    (seconds > 0.0).then(|| seconds / SECONDS_PER_YEAR)
}

/// 标准正态分布累积函数
pub fn norm_cdf(x: f64) -> f64 {
    Normal::standard().cdf(x)
}

fn norm_pdf(x: f64) -> f64 {
    Normal::standard().pdf(x)
}

fn d1(spot: f64, strike: f64, t: f64, rate: f64, sigma: f64) -> f64 {
    ((spot / strike).ln() + (rate + 0.5 * sigma * sigma) * t) / (sigma * t.sqrt())
}

/// Black-Scholes 理论价格
pub fn bs_price(spot: f64, strike: f64, t: f64, rate: f64, sigma: f64, kind: OptionKind) -> f64 {
    let d1 = d1(spot, strike, t, rate, sigma);
    let d2 = d1 - sigma * t.sqrt();
    let discount = (-rate * t).exp();
    match kind {
        OptionKind::Call => spot * norm_cdf(d1) - strike * discount * norm_cdf(d2),
        OptionKind::Put => strike * discount * norm_cdf(-d2) - spot * norm_cdf(-d1),
    }
}

/// Delta：看涨 Φ(d1)，看跌 Φ(d1) - 1
pub fn delta(spot: f64, strike: f64, t: f64, rate: f64, sigma: f64, kind: OptionKind) -> f64 {
    let cdf = norm_cdf(d1(spot, strike, t, rate, sigma));
    match kind {
        OptionKind::Call => cdf,
        OptionKind::Put => cdf - 1.0,
    }
}

/// 反解隐含波动率；价格超出无套利区间或不收敛时返回 None
///
/// Newton 迭代，跳出 [lo, hi] 区间或 vega 过小时改用二分。
pub fn implied_volatility(
    price: f64,
    spot: f64,
    strike: f64,
    t: f64,
    rate: f64,
    kind: OptionKind,
) -> Option<f64> {
    if !(price.is_finite() && price > 0.0 && spot > 0.0 && strike > 0.0 && t > 0.0) {
        return None;
    }

    let objective = |sigma: f64| bs_price(spot, strike, t, rate, sigma, kind) - price;
    let mut lo = IV_LOWER;
    let mut hi = IV_UPPER;
    if objective(lo) > 0.0 || objective(hi) < 0.0 {
        return None;
    }

    let mut sigma = 0.3;
    for _ in 0..IV_MAX_ITERATIONS {
        let diff = objective(sigma);
        if diff.abs() < IV_PRICE_TOLERANCE {
            return Some(sigma);
        }
        if diff > 0.0 {
            hi = sigma;
        } else {
            lo = sigma;
        }

        let vega = spot * norm_pdf(d1(spot, strike, t, rate, sigma)) * t.sqrt();
        let newton = sigma - diff / vega;
        sigma = if vega > 1e-8 && newton > lo && newton < hi {
            newton
        } else {
            0.5 * (lo + hi)
        };
    }

    if hi - lo < 1e-8 {
        Some(sigma)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iv_inversion_recovers_sigma() {
        let t = 16.0 / 365.25;
        for kind in [OptionKind::Call, OptionKind::Put] {
            let price = bs_price(5319.0, 5300.0, t, 0.1, 0.35, kind);
            let iv = implied_volatility(price, 5319.0, 5300.0, t, 0.1, kind).unwrap();
            assert!((iv - 0.35).abs() < 1e-4);
        }
    }

    #[test]
    fn test_iv_rejects_price_below_intrinsic() {
        let t = 16.0 / 365.25;
        // 深度实值看涨，报价低于内在价值
        assert!(implied_volatility(10.0, 5319.0, 5000.0, t, 0.1, OptionKind::Call).is_none());
        assert!(implied_volatility(0.0, 5319.0, 5000.0, t, 0.1, OptionKind::Call).is_none());
    }

    #[test]
    fn test_delta_signs() {
        let t = 0.05;
        let call = delta(100.0, 100.0, t, 0.06, 0.3, OptionKind::Call);
        let put = delta(100.0, 100.0, t, 0.06, 0.3, OptionKind::Put);
        assert!(call > 0.5 && call < 0.6);
        assert!((call - put - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_norm_cdf_reference_points() {
        assert!((norm_cdf(0.0) - 0.5).abs() < 1e-15);
        assert!((norm_cdf(1.959963984540054) - 0.975).abs() < 1e-12);
        assert!((norm_cdf(-1.0) + norm_cdf(1.0) - 1.0).abs() < 1e-15);
    }

    #[test]
    fn test_norm_cdf_at_delta_cap_quantile() {
        // Φ⁻¹(0.80)
        let z = 0.8416212335729143;
        assert!((norm_cdf(z) - 0.80).abs() < 1e-12);
    }

    #[test]
    fn test_put_call_parity() {
        let (s, k, t, r, v) = (5319.0, 5300.0, 0.05, 0.1, 0.3);
        let call = bs_price(s, k, t, r, v, OptionKind::Call);
        let put = bs_price(s, k, t, r, v, OptionKind::Put);
        assert!((call - put - (s - k * (-r * t).exp())).abs() < 1e-6);
    }
}
