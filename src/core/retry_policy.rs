//! 券商调用的退避重试
//!
//! 只重试瞬时故障（IO、超时、5xx）。限流直接返回，由策略层等待并重新登录；
//! 数据缺失也不重试，调用方按跳过处理。

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;

use crate::core::error::TradingError;

#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub factor: f64,
    /// 在延迟上叠加 `[0, ratio]` 比例的随机抖动
    pub jitter_ratio: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            factor: 2.0,
            jitter_ratio: 0.25,
        }
    }
}

pub struct Backoff {
    config: BackoffConfig,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    fn retryable(&self, error: &TradingError, attempt: u32) -> bool {
        attempt < self.config.max_retries
            && !matches!(error, TradingError::RateLimitError(..) | TradingError::DataUnavailable(_))
            && error.is_retryable()
    }

    /// 第 `attempt` 次失败后的等待时间；错误自带的建议等待优先，但不超过上限
    pub fn delay(&self, attempt: u32, error: &TradingError) -> Duration {
        let exp = self.config.base_delay_ms as f64 * self.config.factor.powi(attempt as i32);
        let hinted = error.retry_after().map(|s| s as f64 * 1000.0).unwrap_or(0.0);
        let mut ms = exp.max(hinted).min(self.config.max_delay_ms as f64);

        if self.config.jitter_ratio > 0.0 && ms > 0.0 {
            ms += rand::thread_rng().gen_range(0.0..=ms * self.config.jitter_ratio);
        }
        Duration::from_millis(ms as u64)
    }

    /// 执行 `operation`，失败时按退避重试；`label` 用于日志
    pub async fn run<F, Fut, T>(&self, label: &str, operation: F) -> Result<T, TradingError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, TradingError>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        log::info!("✅ {} 第{}次尝试成功", label, attempt + 1);
                    }
                    return Ok(value);
                }
                Err(error) if self.retryable(&error, attempt) => {
                    let wait = self.delay(attempt, &error);
                    attempt += 1;
                    log::warn!(
                        "⚠️ {} 失败，{:.1}秒后重试 ({}/{}): {}",
                        label,
                        wait.as_secs_f64(),
                        attempt,
                        self.config.max_retries,
                        error
                    );
                    sleep(wait).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// 默认退避参数下最多重试 `max_retries` 次
pub async fn retry_async<F, Fut, T>(label: &str, max_retries: u32, operation: F) -> Result<T, TradingError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, TradingError>>,
{
    Backoff::new(BackoffConfig {
        max_retries,
        ..BackoffConfig::default()
    })
    .run(label, operation)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick(max_retries: u32) -> Backoff {
        Backoff::new(BackoffConfig {
            max_retries,
            base_delay_ms: 1,
            max_delay_ms: 5,
            factor: 1.0,
            jitter_ratio: 0.0,
        })
    }

    fn timeout() -> TradingError {
        TradingError::TimeoutError {
            operation: "fetch_candles".to_string(),
            timeout_seconds: 0,
        }
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let result = quick(3)
            .run("CRUDEOIL25NOVFUT", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(timeout())
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), TradingError> = quick(2)
            .run("x", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(timeout())
            })
            .await;
        assert!(matches!(result, Err(TradingError::TimeoutError { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rate_limit_and_missing_data_return_immediately() {
        let makers: [fn() -> TradingError; 2] = [
            || TradingError::RateLimitError("Too many requests".to_string(), None),
            || TradingError::DataUnavailable("no file".to_string()),
        ];
        for make in makers {
            let calls = AtomicU32::new(0);
            let result: Result<(), TradingError> = quick(3)
                .run("x", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(make())
                })
                .await;
            assert!(result.is_err());
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_delay_is_capped() {
        let backoff = quick(3);
        assert_eq!(backoff.delay(10, &timeout()), Duration::from_millis(5));
    }
}
