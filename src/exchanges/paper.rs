use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime, Timelike};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Deserialize;

use crate::core::config::PaperBrokerConfig;
use crate::core::error::TradingError;
use crate::core::exchange::{Broker, CandleSource, OrderGateway, QuoteSource};
use crate::core::types::*;
use crate::utils::{black_scholes, contract, schedule};

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"];

fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value.trim(), fmt).ok())
}

/// 行情文件一行中时间之后的数值列
#[derive(Debug, Deserialize)]
struct CandleRow {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

const CANDLE_COLUMNS: usize = 6;

/// 解析 `timestamp,open,high,low,close,volume` 格式的K线文件；表头行可选，字段可以带引号，多余的列忽略
pub fn parse_candle_csv(contents: &str) -> Result<Vec<Candle>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(contents.as_bytes());

    let mut candles = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|e| TradingError::ParseError(format!("第{}行读取失败: {}", idx + 1, e)))?;
        let line_no = record.position().map(|p| p.line()).unwrap_or(idx as u64 + 1);
        if record.len() < CANDLE_COLUMNS {
            return Err(TradingError::ParseError(format!("第{}行字段不足: {:?}", line_no, record)));
        }

        let Some(timestamp) = parse_timestamp(&record[0]) else {
            if idx == 0 {
                continue;
            }
            return Err(TradingError::ParseError(format!("第{}行时间格式错误: {}", line_no, &record[0])));
        };
        let values: StringRecord = record.iter().skip(1).take(CANDLE_COLUMNS - 1).collect();
        let parsed: CandleRow = values
            .deserialize(None)
            .map_err(|e| TradingError::ParseError(format!("第{}行数值错误: {}", line_no, e)))?;
        candles.push(Candle::new(timestamp, parsed.open, parsed.high, parsed.low, parsed.close, parsed.volume));
    }
    Ok(normalize_candles(candles))
}

/// 把细粒度K线合成为 `timeframe_minutes` 周期（日内按自然分钟对齐）
pub fn resample(candles: &[Candle], timeframe_minutes: u32) -> Vec<Candle> {
    let tf = timeframe_minutes.max(1);
    let bucket = |ts: NaiveDateTime| -> NaiveDateTime {
        let minute_of_day = ts.hour() * 60 + ts.minute();
        let start = if tf >= 1440 { 0 } else { minute_of_day - minute_of_day % tf };
        ts.date().and_hms_opt(start / 60, start % 60, 0).unwrap_or(ts)
    };

    let mut result: Vec<Candle> = Vec::new();
    for candle in candles {
        let start = bucket(candle.timestamp);
        match result.last_mut() {
            Some(last) if last.timestamp == start => {
                last.high = last.high.max(candle.high);
                last.low = last.low.min(candle.low);
                last.close = candle.close;
                last.volume += candle.volume;
            }
            _ => {
                let mut merged = candle.clone();
                merged.timestamp = start;
                result.push(merged);
            }
        }
    }
    result
}

/// 纸面交易券商
///
/// K线来自 `data_dir/<SYMBOL>.csv`，期权报价由 Black-Scholes 按配置的波动率计算，
/// 订单在本地直接确认。时钟取标的文件中的最后一根K线。
pub struct PaperBroker {
    config: PaperBrokerConfig,
    sequence: AtomicU64,
    orders: Mutex<Vec<OrderRequest>>,
}

impl PaperBroker {
    pub fn new(config: PaperBrokerConfig) -> Self {
        Self {
            config,
            sequence: AtomicU64::new(0),
            orders: Mutex::new(Vec::new()),
        }
    }

    fn data_path(&self, symbol: &str) -> PathBuf {
        PathBuf::from(&self.config.data_dir).join(format!("{}.csv", symbol.to_uppercase()))
    }

    async fn load_candles(&self, symbol: &str) -> Result<Vec<Candle>> {
        let path = self.data_path(symbol);
        let contents = tokio::fs::read_to_string(&path).await.map_err(|e| {
            TradingError::DataUnavailable(format!("读取K线文件 {} 失败: {}", path.display(), e))
        })?;
        parse_candle_csv(&contents)
    }

    /// 已受理的订单
    pub fn orders(&self) -> Vec<OrderRequest> {
        self.orders.lock().map(|o| o.clone()).unwrap_or_default()
    }

    async fn option_price(&self, symbol: &str) -> Result<Option<(f64, NaiveDateTime)>> {
        let Some((series, strike, kind)) = contract::parse_option_symbol(symbol) else {
            return Ok(None);
        };
        let underlying = format!("{}FUT", series);
        let candles = match self.load_candles(&underlying).await {
            Ok(candles) => candles,
            Err(TradingError::DataUnavailable(msg)) => {
                log::debug!("{} 无标的数据: {}", symbol, msg);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let Some(last) = candles.last() else {
            return Ok(None);
        };
        let Some(expiry) = contract::series_last_day(&series) else {
            return Ok(None);
        };
        let Some(t) = black_scholes::year_fraction(last.timestamp, contract::expiry_close(expiry)) else {
            return Ok(None);
        };
        let price = black_scholes::bs_price(
            last.close,
            strike as f64,
            t,
            self.config.risk_free_rate,
            self.config.volatility,
            kind,
        );
        Ok(Some(((price * 100.0).round() / 100.0, last.timestamp)))
    }
}

#[async_trait]
impl CandleSource for PaperBroker {
    async fn fetch_candles(&self, symbol: &str, timeframe: &str, lookback_days: u32) -> Result<Vec<Candle>> {
        let candles = resample(&self.load_candles(symbol).await?, schedule::timeframe_minutes(timeframe));
        let Some(last) = candles.last().map(|c| c.timestamp) else {
            return Ok(candles);
        };
        let from = last - Duration::days(lookback_days as i64);
        Ok(candles.into_iter().filter(|c| c.timestamp >= from).collect())
    }
}

#[async_trait]
impl QuoteSource for PaperBroker {
    async fn fetch_quote(&self, exchange: ExchangeSegment, symbol: &str) -> Result<Option<Quote>> {
        let priced = if symbol.to_uppercase().ends_with("FUT") {
            match self.load_candles(symbol).await {
                Ok(candles) => candles.last().map(|c| (c.close, c.timestamp)),
                Err(TradingError::DataUnavailable(_)) => None,
                Err(e) => return Err(e),
            }
        } else {
            self.option_price(symbol).await?
        };

        Ok(priced.map(|(price, timestamp)| Quote {
            exchange,
            symbol: symbol.to_string(),
            last_price: Some(price),
            timestamp,
        }))
    }
}

#[async_trait]
impl OrderGateway for PaperBroker {
    async fn place_order(&self, request: OrderRequest) -> Result<OrderAck> {
        request.validate()?;
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let order_id = format!("PAPER{:08}", seq);
        log::info!(
            "📝 纸面订单 {} {} {} x{} @ {:?} [{}]",
            order_id,
            request.side,
            request.symbol,
            request.quantity,
            request.price,
            request.client_order_id.as_deref().unwrap_or("-")
        );
        self.orders
            .lock()
            .map_err(|_| TradingError::Other("订单记录锁已损坏".to_string()))?
            .push(request);
        Ok(OrderAck { order_id })
    }
}

#[async_trait]
impl Broker for PaperBroker {
    fn name(&self) -> &str {
        "paper"
    }

    async fn find_exchange(&self, symbol: &str) -> Result<Option<ExchangeSegment>> {
        if contract::matches_underlying(symbol, &self.config.mcx_underlyings) {
            return Ok(Some(ExchangeSegment::Mcx));
        }
        if tokio::fs::metadata(self.data_path(symbol)).await.is_ok() {
            return Ok(Some(ExchangeSegment::Nfo));
        }
        Ok(None)
    }

    async fn reconnect(&self) -> Result<()> {
        log::info!("纸面券商无需重新连接");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "timestamp,open,high,low,close,volume\n\
        2025-11-03 09:00:00,5300,5310,5295,5305,100\n\
        2025-11-03 09:01:00,5305,5320,5300,5318,150\n\
        2025-11-03 09:05:00,5318,5319,5290,5292,80\n";

    fn broker(dir: &std::path::Path) -> PaperBroker {
        PaperBroker::new(PaperBrokerConfig {
            data_dir: dir.to_string_lossy().to_string(),
            ..PaperBrokerConfig::default()
        })
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rustopt-paper-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_parse_and_resample() {
        let candles = parse_candle_csv(SAMPLE).unwrap();
        assert_eq!(candles.len(), 3);

        let five = resample(&candles, 5);
        assert_eq!(five.len(), 2);
        assert_eq!(five[0].open, 5300.0);
        assert_eq!(five[0].high, 5320.0);
        assert_eq!(five[0].close, 5318.0);
        assert_eq!(five[0].volume, 250.0);
        assert_eq!(five[1].timestamp.format("%H:%M").to_string(), "09:05");
    }

    #[test]
    fn test_bad_row_is_parse_error() {
        let bad = "2025-11-03 09:00:00,5300,abc,5295,5305,100\n";
        assert!(matches!(parse_candle_csv(bad), Err(TradingError::ParseError(_))));

        let short = "2025-11-03 09:00:00,5300,5310\n";
        assert!(matches!(parse_candle_csv(short), Err(TradingError::ParseError(_))));
    }

    #[test]
    fn test_quoted_fields_and_extra_columns() {
        let quoted = "\"timestamp\",\"open\",\"high\",\"low\",\"close\",\"volume\",\"oi\"\n\
            \"2025-11-03 09:15:00\",\"5300\",\"5312.5\",\"5296\",\"5308\",\"1200\",\"88\"\n\
            \n\
            \"2025-11-03 09:20:00\",5308,5315,5301,5303,900,91\n";
        let candles = parse_candle_csv(quoted).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].timestamp.format("%H:%M").to_string(), "09:15");
        assert_eq!(candles[0].high, 5312.5);
        assert_eq!(candles[0].volume, 1200.0);
        assert_eq!(candles[1].open, 5308.0);
        assert_eq!(candles[1].close, 5303.0);
    }

    #[tokio::test]
    async fn test_quotes_and_orders() {
        let dir = temp_dir("quotes");
        std::fs::write(dir.join("CRUDEOIL25NOVFUT.csv"), SAMPLE).unwrap();
        let broker = broker(&dir);

        let future = broker.last_price(ExchangeSegment::Mcx, "CRUDEOIL25NOVFUT").await.unwrap();
        assert_eq!(future, Some(5292.0));

        let call = broker.last_price(ExchangeSegment::Mcx, "CRUDEOIL25NOV5300CE").await.unwrap().unwrap();
        let put = broker.last_price(ExchangeSegment::Mcx, "CRUDEOIL25NOV5300PE").await.unwrap().unwrap();
        assert!(call > 0.0 && put > 0.0);
        // 折现后的行权价低于标的价，看涨更贵
        assert!(call > put);

        assert!(broker.last_price(ExchangeSegment::Mcx, "GOLD25NOV5300CE").await.unwrap().is_none());

        let ack = broker
            .place_order(OrderRequest::limit(ExchangeSegment::Mcx, "CRUDEOIL25NOV5300CE", OrderSide::Buy, 1, Some(call)))
            .await
            .unwrap();
        assert_eq!(ack.order_id, "PAPER00000001");
        assert!(broker
            .place_order(OrderRequest::limit(ExchangeSegment::Mcx, "X", OrderSide::Sell, 1, None))
            .await
            .is_err());
        assert_eq!(broker.orders().len(), 1);

        assert_eq!(broker.find_exchange("CRUDEOIL25NOVFUT").await.unwrap(), Some(ExchangeSegment::Mcx));
        assert_eq!(broker.find_exchange("NIFTY25NOVFUT").await.unwrap(), None);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
