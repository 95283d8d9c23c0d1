//! 单标的决策引擎
//!
//! 每根收盘K线按固定顺序评估：平仓（止损优先，其次趋势翻转）→ 布防/重置 → 开仓 → 加仓。
//! 条件满足后逻辑状态无条件推进，下单结果只写入订单日志，不回滚状态。

use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};

use crate::core::error::TradingError;
use crate::core::exchange::{OrderGateway, QuoteSource};
use crate::core::types::{ExchangeSegment, OrderRequest, OrderSide};
use crate::utils::order_id::OrderIdGenerator;

use super::config::{EngineSettings, InstrumentConfig};
use super::indicators::{IndicatorFrame, SignalBar};
use super::ledger::{exit_pnl, PnlParams, SignalAction, SignalLedger, SignalRecord};
use super::logging::{self, OrderLog};
use super::model::{OptionCandidate, Position, PyramidLeg, TradingState};
use super::option_selector::{self, SelectionRequest};
use super::pyramiding;
use super::stop_loss;

/// 平仓原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TrendFlip,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "STOP LOSS"),
            ExitReason::TrendFlip => write!(f, "SUPERTREND FLIP"),
        }
    }
}

/// 一次评估产生的事件
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Armed(Position),
    ArmReset(Position),
    Entry {
        position: Position,
        option_symbol: Option<String>,
        order_id: Option<String>,
    },
    PyramidAdd {
        position: Position,
        number: u32,
        option_symbol: Option<String>,
        order_id: Option<String>,
    },
    Exit {
        position: Position,
        reason: ExitReason,
        legs: usize,
    },
}

/// 状态变更后的持久化回调
pub type Checkpoint<'a> = &'a (dyn Fn(&TradingState) + Send + Sync);

/// 一次评估所需的外部协作者
pub struct EngineContext<'a> {
    pub quotes: &'a dyn QuoteSource,
    pub orders: &'a dyn OrderGateway,
    pub ledger: &'a dyn SignalLedger,
    pub order_log: &'a OrderLog,
    pub order_ids: &'a OrderIdGenerator,
    pub checkpoint: Option<Checkpoint<'a>>,
    pub now: NaiveDateTime,
}

impl EngineContext<'_> {
    fn persist(&self, state: &TradingState) {
        if let Some(checkpoint) = self.checkpoint {
            checkpoint(state);
        }
    }

    fn record(&self, record: SignalRecord) {
        if let Err(e) = self.ledger.record(&record) {
            logging::error(
                Some(&record.future_contract),
                format!("❌ 写入信号台账失败 ({}): {}", record.action, e),
            );
        }
    }
}

/// 绑定到单个标的的决策引擎
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    instrument: InstrumentConfig,
    settings: EngineSettings,
    expiry: NaiveDate,
    future_symbol: String,
    underlying_exchange: ExchangeSegment,
    option_exchange: ExchangeSegment,
}

impl DecisionEngine {
    pub fn new(
        instrument: InstrumentConfig,
        settings: EngineSettings,
        underlying_exchange: ExchangeSegment,
    ) -> Result<Self> {
        let expiry = instrument.expiry_date()?;
        let future_symbol = instrument.future_symbol()?;
        Ok(Self {
            option_exchange: ExchangeSegment::option_segment_for(underlying_exchange),
            instrument,
            settings,
            expiry,
            future_symbol,
            underlying_exchange,
        })
    }

    pub fn key(&self) -> String {
        self.instrument.unique_key()
    }

    pub fn instrument(&self) -> &InstrumentConfig {
        &self.instrument
    }

    pub fn future_symbol(&self) -> &str {
        &self.future_symbol
    }

    pub fn underlying_exchange(&self) -> ExchangeSegment {
        self.underlying_exchange
    }

    pub fn option_exchange(&self) -> ExchangeSegment {
        self.option_exchange
    }

    fn pnl_params(&self) -> PnlParams {
        PnlParams {
            lot_size: self.instrument.lot_size,
            multiplier: self.settings.contract_multiplier,
            charges: self.settings.charges_per_exit,
        }
    }

    fn tag(&self) -> Option<&str> {
        Some(self.future_symbol.as_str())
    }

    /// 在最新收盘K线上评估一次；指标历史不足时返回错误，状态不变
    pub async fn tick(
        &self,
        state: &mut TradingState,
        frame: &IndicatorFrame,
        ctx: &EngineContext<'_>,
    ) -> Result<Vec<EngineEvent>> {
        let (prev, current) = frame.signal_pair()?;
        Ok(self.evaluate(state, &prev, &current, frame, ctx).await)
    }

    /// 按固定顺序评估前一根与当前K线
    pub async fn evaluate(
        &self,
        state: &mut TradingState,
        prev: &SignalBar,
        current: &SignalBar,
        frame: &IndicatorFrame,
        ctx: &EngineContext<'_>,
    ) -> Vec<EngineEvent> {
        let mut events = Vec::new();

        if let Some(event) = self.evaluate_exit(state, prev, current, ctx).await {
            events.push(event);
        }

        events.extend(self.update_arming(state, current, ctx));

        if state.is_flat() {
            if let Some(position) = self.entry_signal(state, prev, current) {
                events.extend(self.enter(state, position, current, frame, ctx).await);
            }
        } else if pyramiding::should_add(state, &self.instrument.pyramiding, current.ha.close) {
            if let Some(event) = self.add_pyramid(state, current, ctx).await {
                events.push(event);
            }
        }

        events
    }

    // ============= 平仓 =============

    /// 止损优先于趋势翻转；空仓时不做任何事
    pub fn exit_reason(state: &TradingState, prev: &SignalBar, current: &SignalBar) -> Option<ExitReason> {
        let position = state.position?;
        if let Some(sl) = state.current_sl {
            let hit = match position {
                Position::LongCall => prev.ha.low < sl,
                Position::LongPut => prev.ha.high > sl,
            };
            if hit {
                return Some(ExitReason::StopLoss);
            }
        }
        let flipped = match position {
            Position::LongCall => prev.trend() == 1 && current.trend() == -1,
            Position::LongPut => prev.trend() == -1 && current.trend() == 1,
        };
        flipped.then_some(ExitReason::TrendFlip)
    }

    async fn evaluate_exit(
        &self,
        state: &mut TradingState,
        prev: &SignalBar,
        current: &SignalBar,
        ctx: &EngineContext<'_>,
    ) -> Option<EngineEvent> {
        let position = state.position?;
        let reason = Self::exit_reason(state, prev, current)?;

        let trigger = match reason {
            ExitReason::StopLoss => match position {
                Position::LongCall => format!("前一根 HA_Low {:.2} < SL {:.2}", prev.ha.low, state.current_sl.unwrap_or_default()),
                Position::LongPut => format!("前一根 HA_High {:.2} > SL {:.2}", prev.ha.high, state.current_sl.unwrap_or_default()),
            },
            ExitReason::TrendFlip => format!("Supertrend {} -> {}", prev.trend(), current.trend()),
        };
        logging::info(
            self.tag(),
            format!("🔔 {} 平仓 {} 持仓 ({}): {}", reason, position, state.pyramiding_count, trigger),
        );

        let legs = self.close_all_legs(state, position, reason, current, ctx).await;
        state.reset_position();
        ctx.persist(state);

        Some(EngineEvent::Exit {
            position,
            reason,
            legs,
        })
    }

    /// 每条腿单独平仓并写一行台账，返回腿数
    async fn close_all_legs(
        &self,
        state: &TradingState,
        position: Position,
        reason: ExitReason,
        current: &SignalBar,
        ctx: &EngineContext<'_>,
    ) -> usize {
        let exchange = state.option_exchange.unwrap_or(self.option_exchange);
        let exit_underlying = current.ha.close;
        let params = self.pnl_params();

        struct Leg {
            action: SignalAction,
            symbol: Option<String>,
            entry_underlying: Option<f64>,
            entry_option: Option<f64>,
        }

        let mut legs = vec![Leg {
            action: SignalAction::Exit(position),
            symbol: state.option_symbol.clone(),
            entry_underlying: state.first_entry_price,
            entry_option: state.entry_option_price,
        }];
        for (idx, leg) in state.pyramiding_positions.iter().enumerate() {
            legs.push(Leg {
                action: SignalAction::PyramidExit(position, idx as u32 + 1),
                symbol: state.leg_symbol(leg).map(str::to_string),
                entry_underlying: Some(leg.entry_price),
                entry_option: leg.entry_option_price,
            });
        }

        let mut block = vec![format!(
            "{} EXIT ({}) | {} | Exit Price: {:.2} | SL: {:?} | Legs: {}",
            position,
            reason,
            self.future_symbol,
            exit_underlying,
            state.current_sl,
            legs.len()
        )];

        for leg in &legs {
            let exit_option = match &leg.symbol {
                Some(symbol) => {
                    let price = self.option_price(ctx, exchange, symbol).await;
                    let request = OrderRequest::limit(exchange, symbol.clone(), OrderSide::Sell, self.instrument.lot_size, price)
                        .with_client_order_id(ctx.order_ids.generate_with_tag("EXT"));
                    self.place(ctx, request).await;
                    price
                }
                None => {
                    logging::warn(self.tag(), format!("⚠️ {} 没有合约代码，跳过平仓下单", leg.action));
                    None
                }
            };

            let pnl = exit_pnl(position, leg.entry_underlying, exit_underlying, leg.entry_option, exit_option, &params);
            block.push(format!(
                "  {} | {} | Entry: {:?} Exit: {:.2} | Option {:?} -> {:?} | P&L: {:?}",
                leg.action,
                leg.symbol.as_deref().unwrap_or("N/A"),
                leg.entry_underlying,
                exit_underlying,
                leg.entry_option,
                exit_option,
                pnl.abs
            ));
            ctx.record(SignalRecord::exit(
                ctx.now,
                leg.action,
                leg.symbol.clone(),
                exit_option,
                self.future_symbol.clone(),
                exit_underlying,
                state.current_sl,
                pnl,
                &params,
            ));
        }
        ctx.order_log.block(block);

        legs.len()
    }

    // ============= 布防 =============

    fn update_arming(&self, state: &mut TradingState, bar: &SignalBar, ctx: &EngineContext<'_>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        let ha = bar.ha;
        let (outer, inner) = (bar.outer, bar.inner);

        if ha.low < outer.lower && !state.armed_buy {
            state.armed_buy = true;
            ctx.order_log.write(format!(
                "ARMED BUY | {} | HA_Low: {:.2} < Outer_Lower: {:.2} | HA_Close: {:.2}",
                self.future_symbol, ha.low, outer.lower, ha.close
            ));
            ctx.record(SignalRecord::arming(ctx.now, SignalAction::ArmedBuy, self.future_symbol.clone(), ha.close));
            events.push(EngineEvent::Armed(Position::LongCall));
        }

        if ha.high >= outer.upper && !state.armed_sell {
            state.armed_sell = true;
            ctx.order_log.write(format!(
                "ARMED SELL | {} | HA_High: {:.2} >= Outer_Upper: {:.2} | HA_Close: {:.2}",
                self.future_symbol, ha.high, outer.upper, ha.close
            ));
            ctx.record(SignalRecord::arming(ctx.now, SignalAction::ArmedSell, self.future_symbol.clone(), ha.close));
            events.push(EngineEvent::Armed(Position::LongPut));
        }

        if ha.high > outer.upper && ha.high > inner.upper && state.armed_buy {
            state.armed_buy = false;
            ctx.order_log.write(format!(
                "ARMED BUY RESET | {} | HA_High: {:.2} > Outer_Upper: {:.2} AND Inner_Upper: {:.2}",
                self.future_symbol, ha.high, outer.upper, inner.upper
            ));
            ctx.record(SignalRecord::arming(ctx.now, SignalAction::ArmedBuyReset, self.future_symbol.clone(), ha.close));
            events.push(EngineEvent::ArmReset(Position::LongCall));
        }

        if ha.low < outer.lower && ha.low < inner.lower && state.armed_sell {
            state.armed_sell = false;
            ctx.order_log.write(format!(
                "ARMED SELL RESET | {} | HA_Low: {:.2} < Outer_Lower: {:.2} AND Inner_Lower: {:.2}",
                self.future_symbol, ha.low, outer.lower, inner.lower
            ));
            ctx.record(SignalRecord::arming(ctx.now, SignalAction::ArmedSellReset, self.future_symbol.clone(), ha.close));
            events.push(EngineEvent::ArmReset(Position::LongPut));
        }

        for event in &events {
            logging::info(self.tag(), format!("🎯 {:?}", event));
        }
        events
    }

    // ============= 开仓 =============

    /// 开仓条件；看涨优先
    pub fn entry_signal(&self, state: &TradingState, prev: &SignalBar, current: &SignalBar) -> Option<Position> {
        if !state.is_flat() {
            return None;
        }
        let volume_ok = current.candle.volume > current.volume_ma;

        if state.armed_buy && current.ha.close > current.inner.lower && volume_ok && prev.ha.is_bullish() {
            return Some(Position::LongCall);
        }
        if state.armed_sell && current.ha.close < current.inner.upper && volume_ok && prev.ha.is_bearish() {
            return Some(Position::LongPut);
        }
        None
    }

    async fn enter(
        &self,
        state: &mut TradingState,
        position: Position,
        current: &SignalBar,
        frame: &IndicatorFrame,
        ctx: &EngineContext<'_>,
    ) -> Option<EngineEvent> {
        let ha_close = current.ha.close;
        let Some(stop) = stop_loss::compute_initial(
            position,
            frame,
            self.instrument.stop_loss.atr_period,
            self.instrument.stop_loss.atr_multiplier,
        ) else {
            logging::error(self.tag(), format!("❌ 无法计算初始止损，放弃 {} 开仓", position));
            ctx.order_log.write(format!(
                "{} ENTRY SKIPPED | {} | Price: {:.2} | 没有可用于止损的K线",
                position, self.future_symbol, ha_close
            ));
            return None;
        };
        let selected = self.select(position, ha_close, ctx).await;

        let mut order_id = None;
        match &selected {
            Some(option) => {
                let request = OrderRequest::limit(
                    self.option_exchange,
                    option.contract_symbol.clone(),
                    OrderSide::Buy,
                    self.instrument.lot_size,
                    Some(option.quoted_price),
                )
                .with_client_order_id(ctx.order_ids.generate_with_tag("ENT"));
                order_id = self.place(ctx, request).await;
            }
            None => logging::warn(
                self.tag(),
                format!("⚠️ 没有可用期权，{} 仓位仅做逻辑记录，不下单", position),
            ),
        }

        state.position = Some(position);
        state.option_symbol = selected.as_ref().map(|o| o.contract_symbol.clone());
        state.option_exchange = Some(self.option_exchange);
        state.option_order_id = order_id.clone();
        state.entry_option_price = selected.as_ref().map(|o| o.quoted_price);
        state.pyramiding_count = 1;
        state.first_entry_price = Some(ha_close);
        state.last_pyramiding_price = Some(ha_close);
        state.pyramiding_positions.clear();
        state.entry_prices = vec![ha_close];
        state.initial_sl = Some(stop.level);
        state.current_sl = Some(stop.level);
        ctx.persist(state);

        let mut block = vec![
            format!("{} ENTRY | {} | Price: {:.2} | Volume: {:.0} > VolumeMA: {:.0}", position, self.future_symbol, ha_close, current.candle.volume, current.volume_ma),
            format!("  Inner: {:.2}/{:.2} | Outer: {:.2}/{:.2} | Supertrend: {} ({:.2})", current.inner.lower, current.inner.upper, current.outer.lower, current.outer.upper, current.trend(), current.supertrend.value),
        ];
        if let Some(option) = &selected {
            block.push(format!(
                "  Option: {} | Strike: {} | Delta: {:.4} | IV: {:.2}% | LTP: {:.2} | Order ID: {}",
                option.contract_symbol,
                option.strike,
                option.delta,
                option.implied_volatility * 100.0,
                option.quoted_price,
                order_id.as_deref().unwrap_or("N/A")
            ));
        }
        if stop.degraded {
            block.push(format!("  INITIAL SL (ATR 不可用，退化为极值): {:.2}", stop.level));
        } else {
            block.push(format!(
                "  INITIAL SL: {:.2} (ATR {} × {} = {:.2})",
                stop.level,
                self.instrument.stop_loss.atr_period,
                self.instrument.stop_loss.atr_multiplier,
                stop.atr.unwrap_or_default() * self.instrument.stop_loss.atr_multiplier
            ));
        }
        ctx.order_log.block(block);

        ctx.record(SignalRecord::entry(
            ctx.now,
            SignalAction::Entry(position),
            state.option_symbol.clone(),
            state.entry_option_price,
            self.future_symbol.clone(),
            ha_close,
            &self.pnl_params(),
        ));
        logging::info(
            self.tag(),
            format!(
                "✅ {} 开仓 @ {:.2} 合约 {} 止损 {:.2}",
                position,
                ha_close,
                state.option_symbol.as_deref().unwrap_or("N/A"),
                stop.level
            ),
        );

        Some(EngineEvent::Entry {
            position,
            option_symbol: state.option_symbol.clone(),
            order_id,
        })
    }

    // ============= 加仓 =============

    async fn add_pyramid(&self, state: &mut TradingState, current: &SignalBar, ctx: &EngineContext<'_>) -> Option<EngineEvent> {
        let position = state.position?;
        let ha_close = current.ha.close;
        let level = pyramiding::next_level(state, &self.instrument.pyramiding)?;
        let exchange = state.option_exchange.unwrap_or(self.option_exchange);

        let (symbol, option_price) = match self.select(position, ha_close, ctx).await {
            Some(option) => (Some(option.contract_symbol), Some(option.quoted_price)),
            None => {
                logging::warn(self.tag(), "⚠️ 加仓选择期权失败，沿用首仓合约");
                match state.option_symbol.clone() {
                    Some(symbol) => {
                        let price = self.option_price(ctx, exchange, &symbol).await;
                        (Some(symbol), price)
                    }
                    None => (None, None),
                }
            }
        };

        let order_id = match &symbol {
            Some(symbol) => {
                let request = OrderRequest::limit(exchange, symbol.clone(), OrderSide::Buy, self.instrument.lot_size, option_price)
                    .with_client_order_id(ctx.order_ids.generate_with_tag("PYR"));
                self.place(ctx, request).await
            }
            None => None,
        };

        let previous_sl = state.current_sl;
        let new_sl = pyramiding::record_add(
            state,
            PyramidLeg {
                option_symbol: symbol.clone(),
                order_id: order_id.clone(),
                entry_price: ha_close,
                entry_option_price: option_price,
            },
        );
        ctx.persist(state);
        let number = state.pyramiding_count.saturating_sub(1);

        ctx.order_log.block([
            format!(
                "PYRAMIDING {} ({}) | {} | Trigger: {:.2} >= Level: {:.2}",
                position, number, self.future_symbol, ha_close, level
            ),
            format!(
                "  Option: {} | LTP: {:?} | Order ID: {}",
                symbol.as_deref().unwrap_or("N/A"),
                option_price,
                order_id.as_deref().unwrap_or("N/A")
            ),
            format!("  SL UPDATED: {:?} -> {:?} (入场均价 {:?})", previous_sl, new_sl, state.entry_prices),
            format!(
                "  Total Positions Now: {} / {}",
                state.pyramiding_count,
                self.instrument.pyramiding.max_legs()
            ),
        ]);
        ctx.record(SignalRecord::entry(
            ctx.now,
            SignalAction::PyramidAdd(position, number),
            symbol.clone(),
            option_price,
            self.future_symbol.clone(),
            ha_close,
            &self.pnl_params(),
        ));
        logging::info(
            self.tag(),
            format!("📈 第 {} 次加仓 @ {:.2}，止损更新为 {:?}", number, ha_close, new_sl),
        );

        Some(EngineEvent::PyramidAdd {
            position,
            number,
            option_symbol: symbol,
            order_id,
        })
    }

    // ============= 协作者调用 =============

    /// 以新鲜的标的 LTP 为中心选择期权，LTP 不可用时退回平均K线收盘价
    async fn select(&self, position: Position, ha_close: f64, ctx: &EngineContext<'_>) -> Option<OptionCandidate> {
        let underlying_price = match ctx.quotes.last_price(self.underlying_exchange, &self.future_symbol).await {
            Ok(Some(ltp)) => ltp,
            Ok(None) => {
                logging::warn(self.tag(), format!("⚠️ 标的 LTP 不可用，使用 HA_Close {:.2}", ha_close));
                ha_close
            }
            Err(e) => {
                logging::warn(self.tag(), format!("⚠️ 获取标的 LTP 失败 ({})，使用 HA_Close {:.2}", e, ha_close));
                ha_close
            }
        };

        let request = SelectionRequest {
            underlying: self.instrument.symbol.clone(),
            expiry: self.expiry,
            kind: position.option_kind(),
            exchange: self.option_exchange,
            underlying_price,
            strike_step: self.instrument.strike_step,
            strike_count: self.instrument.strike_count,
            risk_free_rate: self.settings.risk_free.for_segment(self.option_exchange),
            delta_cap: self.settings.delta_cap,
            now: ctx.now,
        };
        match option_selector::select_option(ctx.quotes, &request).await {
            Ok(selected) => selected,
            Err(e) => {
                logging::error(self.tag(), format!("❌ 期权选择失败: {}", e));
                None
            }
        }
    }

    async fn option_price(&self, ctx: &EngineContext<'_>, exchange: ExchangeSegment, symbol: &str) -> Option<f64> {
        match ctx.quotes.last_price(exchange, symbol).await {
            Ok(price) => price,
            Err(e) => {
                logging::warn(self.tag(), format!("⚠️ 获取 {} 报价失败: {}", symbol, e));
                None
            }
        }
    }

    /// 下单并记录结果；失败只写日志，返回券商订单号
    async fn place(&self, ctx: &EngineContext<'_>, request: OrderRequest) -> Option<String> {
        let summary = format!(
            "{} {} {} x{} @ {:?} ({}, {})",
            request.side,
            request.exchange,
            request.symbol,
            request.quantity,
            request.price,
            request.order_type,
            request.product
        );
        ctx.order_log.write(format!("ORDER REQUEST | {}", summary));

        let result = match request.validate() {
            Ok(()) => ctx.orders.place_order(request).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(ack) => {
                ctx.order_log.write(format!("ORDER PLACED | {} | Order ID: {}", summary, ack.order_id));
                Some(ack.order_id)
            }
            Err(e) => {
                ctx.order_log.write(format!("ORDER FAILED | {} | {}", summary, e));
                logging::error(self.tag(), format!("❌ 下单失败 {}: {}", summary, e));
                None
            }
        }
    }
}

/// 历史不足只跳过当前标的，不视为故障
pub fn is_insufficient_history(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<TradingError>(),
        Some(TradingError::InsufficientHistory { .. })
    )
}
