use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use tokio::sync::{Mutex, RwLock};
use tokio::time::{sleep, Duration};

use crate::core::error::{ErrorSeverity, TradingError};
use crate::core::exchange::{Broker, OrderGateway, QuoteSource};
use crate::core::retry_policy::retry_async;
use crate::core::types::{normalize_candles, Candle};
use crate::strategies::common::{
    Strategy, StrategyDeps, StrategyInstance, StrategyPosition, StrategyState, StrategyStatus,
};
use crate::utils::order_id::OrderIdGenerator;
use crate::utils::schedule;

use super::config::ReversalOptionsConfig;
use super::engine::{self, DecisionEngine, EngineContext, EngineEvent};
use super::indicators::build_frame;
use super::ledger::{CsvSignalLedger, SignalLedger};
use super::logging::{self, OrderLog};
use super::model::TradingState;
use super::state_store::{JsonStateStore, StateStore};
use super::summary;

const CANDLE_FETCH_RETRIES: u32 = 3;

/// 只保留在 `now` 之前已经收盘的K线
pub fn closed_candles(candles: Vec<Candle>, timeframe_minutes: u32, now: NaiveDateTime) -> Vec<Candle> {
    let mut candles = normalize_candles(candles);
    candles.retain(|c| schedule::is_candle_closed(c.timestamp, timeframe_minutes, now));
    candles
}

/// 本轮失败的严重程度；非 `TradingError` 的失败按 Error 处理
pub fn failure_severity(error: &anyhow::Error) -> ErrorSeverity {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<TradingError>())
        .map(TradingError::severity)
        .unwrap_or(ErrorSeverity::Error)
}

#[derive(Clone)]
pub struct ReversalOptionsStrategy {
    config: ReversalOptionsConfig,
    broker: Arc<dyn Broker>,
    quotes: Arc<dyn QuoteSource>,
    orders: Arc<dyn OrderGateway>,
    state_store: Arc<dyn StateStore>,
    ledger: Arc<dyn SignalLedger>,
    order_log: Arc<OrderLog>,
    order_ids: Arc<OrderIdGenerator>,
    running: Arc<RwLock<bool>>,
    status: Arc<RwLock<StrategyStatus>>,
    states: Arc<RwLock<HashMap<String, TradingState>>>,
    engines: Arc<RwLock<Vec<DecisionEngine>>>,
    started_at: Arc<RwLock<Option<Instant>>>,
    task_handles: Arc<Mutex<Vec<tokio::task::JoinHandle<()>>>>,
}

impl ReversalOptionsStrategy {
    fn new(config: ReversalOptionsConfig, deps: StrategyDeps) -> Result<Self> {
        config.validate()?;

        let ledger = CsvSignalLedger::new(&config.engine.signal_file);
        if let Err(e) = ledger.initialize() {
            logging::warn(None, format!("⚠️ 信号台账初始化失败: {}", e));
        }

        let status = StrategyStatus::new(config.strategy.name.clone()).with_state(StrategyState::Initializing);

        Ok(Self {
            broker: deps.broker,
            quotes: deps.quotes,
            orders: deps.orders,
            state_store: Arc::new(JsonStateStore::new(&config.engine.state_file)),
            ledger: Arc::new(ledger),
            order_log: Arc::new(OrderLog::new(&config.engine.order_log_file)),
            order_ids: Arc::new(OrderIdGenerator::new(&config.strategy.name)),
            running: Arc::new(RwLock::new(false)),
            status: Arc::new(RwLock::new(status)),
            states: Arc::new(RwLock::new(HashMap::new())),
            engines: Arc::new(RwLock::new(Vec::new())),
            started_at: Arc::new(RwLock::new(None)),
            task_handles: Arc::new(Mutex::new(Vec::new())),
            config,
        })
    }

    /// 替换持久化与台账实现
    pub fn with_persistence(
        mut self,
        state_store: Arc<dyn StateStore>,
        ledger: Arc<dyn SignalLedger>,
        order_log: OrderLog,
    ) -> Self {
        self.state_store = state_store;
        self.ledger = ledger;
        self.order_log = Arc::new(order_log);
        self
    }

    pub async fn states(&self) -> HashMap<String, TradingState> {
        self.states.read().await.clone()
    }

    async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// 载入状态并为每个启用的标的建立决策引擎；必须在第一次评估前完成
    pub async fn initialize(&self) -> Result<()> {
        let mut states = self
            .state_store
            .load()
            .context("载入交易状态失败")?;

        let mut engines = Vec::new();
        for instrument in self.config.enabled_instruments() {
            let key = instrument.unique_key();
            let future_symbol = instrument.future_symbol()?;
            let exchange = match self.broker.find_exchange(&future_symbol).await {
                Ok(Some(exchange)) => exchange,
                Ok(None) => {
                    logging::error(Some(&future_symbol), "❌ 券商找不到该合约，跳过此标的");
                    continue;
                }
                Err(e) => {
                    logging::error(Some(&future_symbol), format!("❌ 查询合约交易所失败，跳过此标的: {}", e));
                    continue;
                }
            };

            let engine = DecisionEngine::new(instrument.clone(), self.config.engine.clone(), exchange)
                .with_context(|| format!("标的 {} 初始化失败", key))?;
            logging::info(
                Some(&future_symbol),
                format!(
                    "✅ 标的 {} 已就绪: 标的交易所 {} 期权交易所 {} 周期 {}",
                    key,
                    engine.underlying_exchange(),
                    engine.option_exchange(),
                    instrument.timeframe
                ),
            );
            states.entry(key).or_default();
            engines.push(engine);
        }

        if engines.is_empty() {
            anyhow::bail!("没有可运行的标的");
        }

        *self.states.write().await = states;
        *self.engines.write().await = engines;
        Ok(())
    }

    /// 触发限流：等待后重新登录，本轮跳过该标的
    async fn handle_rate_limit(&self, key: &str, hint: Option<u64>) {
        let wait = hint.unwrap_or(self.config.engine.rate_limit_wait_secs);
        logging::warn(Some(key), format!("⚠️ 触发限流，等待 {} 秒后重新连接", wait));
        sleep(Duration::from_secs(wait)).await;
        match self.broker.reconnect().await {
            Ok(()) => logging::info(Some(key), "✅ 已重新建立券商会话"),
            Err(e) => logging::error(Some(key), format!("❌ 重新连接失败: {}", e)),
        }
    }

    async fn save_states(&self) -> Result<()> {
        let states = self.states.read().await;
        self.state_store.save(&states).context("保存交易状态失败")
    }

    /// 对单个标的执行一次完整评估，并在结束后整体保存状态
    pub async fn process_instrument(&self, engine: &DecisionEngine, now: NaiveDateTime) -> Result<Vec<EngineEvent>> {
        let key = engine.key();
        let instrument = engine.instrument();
        let future_symbol = engine.future_symbol();

        let fetched = retry_async(future_symbol, CANDLE_FETCH_RETRIES, || {
            self.broker
                .fetch_candles(future_symbol, &instrument.timeframe, self.config.engine.lookback_days)
        })
        .await;
        let candles = match fetched {
            Ok(candles) => candles,
            Err(TradingError::RateLimitError(_, hint)) => {
                self.handle_rate_limit(&key, hint).await;
                return Ok(Vec::new());
            }
            Err(e) => return Err(e).with_context(|| format!("{} 获取K线失败", future_symbol)),
        };

        let candles = closed_candles(candles, instrument.timeframe_minutes(), now);
        let frame = match build_frame(&candles, instrument) {
            Ok(frame) => frame,
            Err(e) if engine::is_insufficient_history(&e) => {
                logging::warn(Some(future_symbol), format!("⚠️ 历史K线不足，跳过本轮: {}", e));
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let snapshot = std::sync::Mutex::new(self.states.read().await.clone());
        let mut state = snapshot
            .lock()
            .map(|states| states.get(&key).cloned().unwrap_or_default())
            .unwrap_or_default();

        let store = self.state_store.clone();
        let checkpoint_key = key.clone();
        let checkpoint = move |state: &TradingState| {
            let Ok(mut states) = snapshot.lock() else {
                return;
            };
            states.insert(checkpoint_key.clone(), state.clone());
            if let Err(e) = store.save(&states) {
                log::error!("❌ 保存交易状态失败: {}", e);
            }
        };

        let ctx = EngineContext {
            quotes: self.quotes.as_ref(),
            orders: self.orders.as_ref(),
            ledger: self.ledger.as_ref(),
            order_log: self.order_log.as_ref(),
            order_ids: self.order_ids.as_ref(),
            checkpoint: Some(&checkpoint),
            now,
        };
        let events = engine.tick(&mut state, &frame, &ctx).await?;

        if let Some(bar) = frame.last().and_then(|row| row.complete()) {
            summary::log_summary(instrument, future_symbol, &state, &bar);
        }

        self.states.write().await.insert(key, state);
        self.save_states().await?;
        Ok(events)
    }

    /// 依次评估所有标的；单个标的失败不影响其它标的
    pub async fn run_once(&self) -> Result<()> {
        let engines = self.engines.read().await.clone();
        let now = Local::now().naive_local();
        for engine in &engines {
            self.tick_engine(engine, now).await;
        }
        Ok(())
    }

    async fn tick_engine(&self, engine: &DecisionEngine, now: NaiveDateTime) {
        match self.process_instrument(engine, now).await {
            Ok(events) if !events.is_empty() => {
                logging::debug(Some(engine.future_symbol()), format!("本轮事件: {:?}", events));
            }
            Ok(_) => {}
            Err(e) => {
                let symbol = Some(engine.future_symbol());
                match failure_severity(&e) {
                    ErrorSeverity::Info => logging::info(symbol, format!("本轮跳过: {:#}", e)),
                    ErrorSeverity::Warning => logging::warn(symbol, format!("⚠️ 本轮评估失败: {:#}", e)),
                    ErrorSeverity::Error => logging::error(symbol, format!("❌ 本轮评估失败: {:#}", e)),
                    ErrorSeverity::Critical => logging::error(symbol, format!("🚨 本轮评估严重失败: {:#}", e)),
                }
                self.status
                    .write()
                    .await
                    .record_error(format!("{}: {:#}", engine.key(), e));
            }
        }
    }

    /// 按各标的的K线边界调度评估，直到策略停止
    async fn run_loop(self) {
        let engines = self.engines.read().await.clone();
        let now = Local::now().naive_local();
        let mut next_due: Vec<NaiveDateTime> = engines
            .iter()
            .map(|e| schedule::next_candle_time(now, e.instrument().timeframe_minutes()))
            .collect();
        let settle = chrono::Duration::seconds(self.config.engine.candle_settle_secs as i64);

        while self.is_running().await {
            let Some(earliest) = next_due.iter().min().copied() else {
                break;
            };
            let wake_at = earliest + settle;
            let wait = (wake_at - Local::now().naive_local())
                .to_std()
                .unwrap_or_default();
            logging::debug(None, format!("下一次评估时间 {} (等待 {:?})", wake_at, wait));
            sleep(wait).await;

            if !self.is_running().await {
                break;
            }

            let now = Local::now().naive_local();
            for (engine, due) in engines.iter().zip(next_due.iter_mut()) {
                if *due > now {
                    continue;
                }
                self.tick_engine(engine, now).await;
                *due = schedule::next_candle_time(now, engine.instrument().timeframe_minutes());
            }
        }
    }

    fn positions(&self, states: &HashMap<String, TradingState>) -> Vec<StrategyPosition> {
        self.config
            .enabled_instruments()
            .filter_map(|instrument| {
                let state = states.get(&instrument.unique_key())?;
                let position = state.position?;
                let lots = state.pyramiding_count as f64 * instrument.lot_size as f64;
                let premium = state.entry_option_price.unwrap_or_default()
                    * instrument.lot_size as f64
                    * self.config.engine.contract_multiplier;
                Some(StrategyPosition {
                    symbol: state
                        .option_symbol
                        .clone()
                        .unwrap_or_else(|| format!("{} {}", instrument.unique_key(), position)),
                    lots,
                    premium,
                })
            })
            .collect()
    }
}

impl Strategy for ReversalOptionsStrategy {
    type Config = ReversalOptionsConfig;

    fn create(config: Self::Config, deps: StrategyDeps) -> Result<Self>
    where
        Self: Sized,
    {
        Self::new(config, deps)
    }
}

#[async_trait]
impl StrategyInstance for ReversalOptionsStrategy {
    async fn start(&self) -> Result<()> {
        let mut running_guard = self.running.write().await;
        if *running_guard {
            return Ok(());
        }
        *running_guard = true;
        drop(running_guard);

        self.initialize().await?;
        *self.started_at.write().await = Some(Instant::now());
        self.status.write().await.transition(StrategyState::Running);

        let engines = self.engines.read().await.len();
        logging::info(
            None,
            format!(
                "🚀 期权反转策略启动，券商={} 标的数量={}",
                self.broker.name(),
                engines
            ),
        );

        if self.config.engine.run_once {
            self.run_once().await?;
            return Ok(());
        }

        let strategy = self.clone();
        let handle = tokio::spawn(async move {
            strategy.run_loop().await;
        });
        self.task_handles.lock().await.push(handle);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        *self.running.write().await = false;

        let mut handles = self.task_handles.lock().await;
        for handle in handles.drain(..) {
            handle.abort();
        }
        drop(handles);

        if !self.engines.read().await.is_empty() {
            self.save_states().await?;
        }

        self.status.write().await.transition(StrategyState::Stopped);
        logging::info(None, "期权反转策略已停止，状态已保存");
        Ok(())
    }

    async fn status(&self) -> Result<StrategyStatus> {
        let states = self.states.read().await;
        let mut status = self.status.read().await.clone();
        status.positions = self.positions(&states);
        if let Some(started) = *self.started_at.read().await {
            status.uptime = Some(started.elapsed());
        }
        Ok(status)
    }
}
