//! Paper-trading execution: signal validation, slippage fills, stop/target
//! monitoring, portfolio accounting and the end-of-day square-off.
//!
//! The executor is the single writer of the portfolio. Position writes are
//! retried with bounded backoff; when they keep failing, new signal
//! execution halts (losing a position row is not acceptable, losing a tick
//! snapshot is).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::events::EngineEvents;
use crate::services::sqlite_store::SqliteStore;
use crate::types::{
    CloseReason, EnrichedTick, EquityPoint, OrderStatus, PaperOrder, Portfolio, Position,
    PositionSide, PositionStatus, RejectionReason, Signal, SignalSide, SignalStatus,
};

/// Base slippage applied to every fill, basis points.
const BASE_SLIPPAGE_BPS: f64 = 5.0;
/// Random jitter half-width, basis points.
const JITTER_BPS: f64 = 0.5;
/// Attempts for a position write before execution halts.
const POSITION_WRITE_ATTEMPTS: u32 = 3;
/// Backoff between position write attempts.
const POSITION_WRITE_BACKOFF_MS: u64 = 200;

pub struct PaperExecutor {
    portfolio: RwLock<Option<Portfolio>>,
    positions: DashMap<String, Position>,
    store: Option<Arc<SqliteStore>>,
    events: EngineEvents,
    rng: Mutex<StdRng>,
    lot_size: u32,
    halted: AtomicBool,
}

impl PaperExecutor {
    pub fn new(config: &Config, events: EngineEvents, store: Option<Arc<SqliteStore>>) -> Arc<Self> {
        let portfolio = Portfolio::new("paper", config.total_capital, config.max_daily_loss());
        Arc::new(Self {
            portfolio: RwLock::new(Some(portfolio)),
            positions: DashMap::new(),
            store,
            events,
            rng: Mutex::new(StdRng::from_entropy()),
            lot_size: config.lot_size,
            halted: AtomicBool::new(false),
        })
    }

    /// Deterministic jitter for replay and tests.
    pub fn seed_rng(&self, seed: u64) {
        *self.rng.lock().unwrap() = StdRng::seed_from_u64(seed);
    }

    /// Drop the portfolio; subsequent signals are rejected `noPortfolio`.
    pub fn clear_portfolio(&self) {
        *self.portfolio.write().unwrap() = None;
    }

    /// Replace the portfolio (restore-from-store path).
    pub fn restore_portfolio(&self, portfolio: Portfolio) {
        *self.portfolio.write().unwrap() = Some(portfolio);
    }

    /// Re-adopt open positions loaded from the store at startup.
    pub fn restore_positions(&self, positions: Vec<Position>) {
        for position in positions {
            if position.status == PositionStatus::Open {
                self.positions.insert(position.id.clone(), position);
            }
        }
    }

    pub fn portfolio(&self) -> Option<Portfolio> {
        self.portfolio.read().unwrap().clone()
    }

    pub fn open_positions(&self) -> Vec<Position> {
        self.positions.iter().map(|p| p.value().clone()).collect()
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Relaxed)
    }

    fn slippage_bps(&self, liquidity_score: f64, quantity: u32) -> f64 {
        let mut bps = BASE_SLIPPAGE_BPS;
        if liquidity_score < 70.0 {
            bps += (70.0 - liquidity_score) / 70.0 * 2.0;
        }
        let lots = (quantity / self.lot_size.max(1)).max(1);
        bps += 0.5 * (lots - 1) as f64;
        bps += self.rng.lock().unwrap().gen_range(-JITTER_BPS..=JITTER_BPS);
        bps
    }

    /// Simulated fill, adverse to the trade direction, rounded to paise.
    fn fill_price(&self, signal: &Signal) -> f64 {
        let bps = self.slippage_bps(signal.depth_snapshot.liquidity_score, signal.quantity);
        let factor = match signal.side {
            SignalSide::Buy => 1.0 + bps / 10_000.0,
            SignalSide::Sell => 1.0 - bps / 10_000.0,
        };
        (signal.price * factor * 100.0).round() / 100.0
    }

    /// Validate and execute one signal.
    pub async fn handle_signal(&self, mut signal: Signal) {
        let now = chrono::Utc::now().timestamp_millis();

        if self.is_halted() {
            self.reject(&mut signal, RejectionReason::ExecutionHalted, now);
            return;
        }

        let required = signal.price * signal.quantity as f64;
        {
            let guard = self.portfolio.read().unwrap();
            let portfolio = match guard.as_ref() {
                Some(p) => p,
                None => {
                    drop(guard);
                    self.reject(&mut signal, RejectionReason::NoPortfolio, now);
                    return;
                }
            };
            if portfolio.current_daily_loss >= portfolio.max_daily_loss {
                drop(guard);
                self.reject(&mut signal, RejectionReason::DailyLossLimit, now);
                return;
            }
            if portfolio.available_capital < required {
                drop(guard);
                self.reject(&mut signal, RejectionReason::InsufficientCapital, now);
                return;
            }
        }

        let duplicate = self.positions.iter().any(|p| {
            p.strategy_name == signal.strategy_name && p.security_id == signal.security_id
        });
        if duplicate {
            self.reject(&mut signal, RejectionReason::DuplicateOpenPosition, now);
            return;
        }

        let fill = self.fill_price(&signal);
        let order = PaperOrder {
            id: uuid::Uuid::new_v4().to_string(),
            signal_id: signal.id.clone(),
            security_id: signal.security_id.clone(),
            side: signal.side,
            quantity: signal.quantity,
            requested_price: signal.price,
            fill_price: fill,
            status: OrderStatus::Executed,
            created_at: now,
            filled_at: Some(now),
        };

        let mut position = Position {
            id: uuid::Uuid::new_v4().to_string(),
            security_id: signal.security_id.clone(),
            strategy_name: signal.strategy_name.clone(),
            side: PositionSide::from_signal(signal.side),
            quantity: signal.quantity,
            entry_price: fill,
            current_price: fill,
            stop_loss: signal.stop_loss,
            target: signal.target,
            unrealized_pnl: 0.0,
            realized_pnl: 0.0,
            status: PositionStatus::Open,
            opened_at: now,
            closed_at: None,
            close_reason: None,
        };
        position.mark(fill);

        // Margin is booked at the fill so the accounting identity holds
        // exactly through the close.
        let notional = fill * signal.quantity as f64;
        let updated = {
            let mut guard = self.portfolio.write().unwrap();
            let portfolio = guard.as_mut().expect("portfolio checked above");
            portfolio.available_capital -= notional;
            portfolio.used_margin += notional;
            portfolio.clone()
        };

        signal.status = SignalStatus::Executed;
        signal.decided_at = Some(now);
        signal.fill_price = Some(fill);

        info!(
            signal = %signal.id,
            side = %signal.side,
            quantity = signal.quantity,
            requested = signal.price,
            fill,
            "signal executed"
        );

        self.positions.insert(position.id.clone(), position.clone());

        if let Some(store) = &self.store {
            if let Err(e) = store.save_order(&order) {
                warn!("order write failed: {e}");
            }
            if let Err(e) = store.save_signal(&signal) {
                warn!("signal write failed: {e}");
            }
            if let Err(e) = store.save_portfolio(&updated) {
                warn!("portfolio write failed: {e}");
            }
            self.persist_position_with_retry(&position).await;
        }

        let _ = self.events.signals.send(signal);
        let _ = self.events.position_updates.send(position);
        let _ = self.events.portfolio_updates.send(updated);
    }

    fn reject(&self, signal: &mut Signal, reason: RejectionReason, now: i64) {
        signal.status = SignalStatus::Rejected;
        signal.decided_at = Some(now);
        signal.rejection_reason = Some(reason);
        warn!(signal = %signal.id, strategy = %signal.strategy_name, %reason, "signal rejected");
        if let Some(store) = &self.store {
            if let Err(e) = store.save_signal(signal) {
                warn!("signal write failed: {e}");
            }
        }
        let _ = self.events.signals.send(signal.clone());
    }

    /// Mark-to-market every open position for the tick's security, closing
    /// those whose stop or target is breached. Stop checks take priority.
    pub async fn on_tick(&self, tick: &EnrichedTick) {
        let ids: Vec<String> = self
            .positions
            .iter()
            .filter(|p| p.security_id == tick.security_id)
            .map(|p| p.id.clone())
            .collect();

        for id in ids {
            let (stop, target) = match self.positions.get(&id) {
                Some(p) => (p.stop_hit(tick.ltp), p.target_hit(tick.ltp)),
                None => continue,
            };

            if stop {
                self.close_position(&id, tick.ltp, CloseReason::Stop, tick.captured_at)
                    .await;
            } else if target {
                self.close_position(&id, tick.ltp, CloseReason::Target, tick.captured_at)
                    .await;
            } else {
                let updated = match self.positions.get_mut(&id) {
                    Some(mut p) => {
                        p.mark(tick.ltp);
                        p.clone()
                    }
                    None => continue,
                };
                if let Some(store) = &self.store {
                    // Price snapshots are best-effort; a lost write is fine.
                    if let Err(e) = store.save_position(&updated) {
                        debug!("position snapshot write failed: {e}");
                    }
                }
                let _ = self.events.position_updates.send(updated);
            }
        }
    }

    /// Close one position at `exit_price`. Removing the map entry first
    /// makes concurrent closes (tick loop vs EOD sweep) race-free: only
    /// one caller wins the removal.
    pub async fn close_position(
        &self,
        position_id: &str,
        exit_price: f64,
        reason: CloseReason,
        now: i64,
    ) {
        let mut position = match self.positions.remove(position_id) {
            Some((_, p)) => p,
            None => return,
        };

        let realized =
            position.side.sign() * (exit_price - position.entry_price) * position.quantity as f64;

        position.current_price = exit_price;
        position.unrealized_pnl = 0.0;
        position.realized_pnl = realized;
        position.status = PositionStatus::Closed;
        position.closed_at = Some(now);
        position.close_reason = Some(reason);

        let exit_order = PaperOrder {
            id: uuid::Uuid::new_v4().to_string(),
            signal_id: String::new(),
            security_id: position.security_id.clone(),
            side: match position.side {
                PositionSide::Long => SignalSide::Sell,
                PositionSide::Short => SignalSide::Buy,
            },
            quantity: position.quantity,
            requested_price: exit_price,
            fill_price: exit_price,
            status: OrderStatus::Executed,
            created_at: now,
            filled_at: Some(now),
        };

        let entry_notional = position.entry_price * position.quantity as f64;
        let updated = {
            let mut guard = self.portfolio.write().unwrap();
            let portfolio = match guard.as_mut() {
                Some(p) => p,
                None => return,
            };
            portfolio.available_capital += entry_notional + realized;
            portfolio.used_margin -= entry_notional;
            portfolio.total_pnl += realized;
            portfolio.today_pnl += realized;
            portfolio.total_trades += 1;
            if realized > 0.0 {
                portfolio.winning_trades += 1;
            } else {
                portfolio.losing_trades += 1;
                portfolio.current_daily_loss += realized.abs();
            }
            portfolio.recalculate_win_rate();
            portfolio.clone()
        };

        info!(
            position = position_id,
            %reason,
            exit_price,
            realized,
            "position closed"
        );

        if let Some(store) = &self.store {
            if let Err(e) = store.save_order(&exit_order) {
                warn!("exit order write failed: {e}");
            }
            if let Err(e) = store.save_portfolio(&updated) {
                warn!("portfolio write failed: {e}");
            }
            let equity = EquityPoint {
                timestamp: now,
                equity: updated.total_capital + updated.total_pnl,
                today_pnl: updated.today_pnl,
                open_positions: self.positions.len() as u32,
            };
            if let Err(e) = store.save_equity_point("paper", &equity) {
                debug!("equity snapshot write failed: {e}");
            }
            self.persist_position_with_retry(&position).await;
        }

        let _ = self.events.position_closes.send(position);
        let _ = self.events.portfolio_updates.send(updated);
    }

    /// End-of-day sweep: close every open intraday position at its current
    /// price. Idempotent; a second sweep finds nothing open.
    pub async fn square_off_all(&self, now: i64) {
        let open: Vec<(String, f64)> = self
            .positions
            .iter()
            .map(|p| (p.id.clone(), p.current_price))
            .collect();
        if open.is_empty() {
            return;
        }
        info!(count = open.len(), "end-of-day square-off");
        for (id, price) in open {
            self.close_position(&id, price, CloseReason::Eod, now).await;
        }
    }

    /// Zero the per-day portfolio counters at the daily reset.
    pub fn daily_reset(&self) {
        let updated = {
            let mut guard = self.portfolio.write().unwrap();
            match guard.as_mut() {
                Some(portfolio) => {
                    portfolio.daily_reset();
                    Some(portfolio.clone())
                }
                None => None,
            }
        };
        if let Some(portfolio) = updated {
            info!("portfolio daily reset");
            if let Some(store) = &self.store {
                if let Err(e) = store.save_portfolio(&portfolio) {
                    warn!("portfolio write failed: {e}");
                }
            }
            let _ = self.events.portfolio_updates.send(portfolio);
        }
    }

    async fn persist_position_with_retry(&self, position: &Position) {
        let store = match &self.store {
            Some(store) => store,
            None => return,
        };
        for attempt in 1..=POSITION_WRITE_ATTEMPTS {
            match store.save_position(position) {
                Ok(()) => return,
                Err(e) if attempt < POSITION_WRITE_ATTEMPTS => {
                    warn!(attempt, "position write failed, retrying: {e}");
                    tokio::time::sleep(std::time::Duration::from_millis(
                        POSITION_WRITE_BACKOFF_MS * attempt as u64,
                    ))
                    .await;
                }
                Err(e) => {
                    error!("position write failed permanently, halting execution: {e}");
                    self.halted.store(true, Ordering::Relaxed);
                }
            }
        }
    }

    /// Executor task: serialize signal handling and tick updates.
    pub async fn run(
        self: Arc<Self>,
        mut signal_rx: broadcast::Receiver<Signal>,
        mut tick_rx: broadcast::Receiver<EnrichedTick>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                signal = signal_rx.recv() => match signal {
                    Ok(signal) if signal.status == SignalStatus::Pending => {
                        self.handle_signal(signal).await;
                    }
                    Ok(_) => {} // our own decided signals echoed back
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, "executor lagged on signals");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                tick = tick_rx.recv() => match tick {
                    Ok(tick) => self.on_tick(&tick).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, "executor lagged on ticks");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = shutdown.changed() => break,
            }
        }

        // Persist open positions on the way out.
        for position in self.open_positions() {
            self.persist_position_with_retry(&position).await;
        }
        info!("executor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DepthMetrics;
    use chrono::{FixedOffset, NaiveTime};

    fn config() -> Config {
        Config {
            host: "127.0.0.1".into(),
            port: 0,
            feed_endpoint: String::new(),
            feed_token: String::new(),
            feed_client_id: String::new(),
            subscription_set: vec![crate::types::SubscriptionInstrument {
                segment: crate::types::ExchangeSegment::Index,
                security_id: "13".into(),
            }],
            candle_intervals: vec![crate::types::CandleInterval::OneMinute],
            total_capital: 20_000_000.0,
            max_daily_loss_pct: 0.03,
            risk_pct: 0.01,
            stop_loss_pct: 0.01,
            target_pct: 0.03,
            lot_size: 75,
            market_open: NaiveTime::from_hms_opt(9, 15, 0).unwrap(),
            market_close: NaiveTime::from_hms_opt(15, 30, 0).unwrap(),
            eod_square_off: NaiveTime::from_hms_opt(15, 20, 0).unwrap(),
            daily_reset_at: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            exchange_tz: FixedOffset::east_opt(5 * 3600 + 1800).unwrap(),
            reconnect_initial_delay_ms: 5000,
            reconnect_max_attempts: 5,
            keepalive_interval_secs: 30,
            redis_url: None,
            sqlite_path: ":memory:".into(),
        }
    }

    fn executor() -> (Arc<PaperExecutor>, EngineEvents) {
        let events = EngineEvents::new();
        let exec = PaperExecutor::new(&config(), events.clone(), None);
        exec.seed_rng(7);
        (exec, events)
    }

    fn signal(side: SignalSide, price: f64, stop: f64, target: f64) -> Signal {
        Signal::new(
            "test",
            "13",
            side,
            price,
            stop,
            target,
            75,
            "test",
            DepthMetrics {
                bid_ask_imbalance: 1.4,
                depth_spread: 0.0002,
                order_book_strength: 2_000.0,
                volume_delta: 0.0,
                liquidity_score: 80.0,
            },
            70.0,
            0,
        )
    }

    fn tick(ltp: f64) -> EnrichedTick {
        EnrichedTick {
            security_id: "13".into(),
            ltp,
            ltq: 1,
            ltt: 0,
            open: 0.0,
            high: 0.0,
            low: 0.0,
            close: 0.0,
            atp: 0.0,
            volume: 0,
            total_buy_qty: 0,
            total_sell_qty: 0,
            depth: Default::default(),
            depth_metrics: Default::default(),
            captured_at: 0,
        }
    }

    fn long_position(entry: f64, stop: f64, target: f64) -> Position {
        Position {
            id: "p1".into(),
            security_id: "13".into(),
            strategy_name: "test".into(),
            side: PositionSide::Long,
            quantity: 75,
            entry_price: entry,
            current_price: entry,
            stop_loss: stop,
            target,
            unrealized_pnl: 0.0,
            realized_pnl: 0.0,
            status: PositionStatus::Open,
            opened_at: 0,
            closed_at: None,
            close_reason: None,
        }
    }

    #[tokio::test]
    async fn executed_signal_opens_position_with_adverse_fill() {
        let (exec, _events) = executor();
        exec.handle_signal(signal(SignalSide::Buy, 20_000.0, 19_800.0, 20_600.0)).await;

        let positions = exec.open_positions();
        assert_eq!(positions.len(), 1);
        let p = &positions[0];
        // BUY fills above the signal price (5 bps +/- 0.5 jitter).
        assert!(p.entry_price > 20_000.0);
        assert!(p.entry_price < 20_000.0 * 1.0011);

        let portfolio = exec.portfolio().unwrap();
        assert!(portfolio.accounting_balanced());
        assert!(portfolio.used_margin > 0.0);
    }

    #[tokio::test]
    async fn stop_loss_closes_at_ltp() {
        let (exec, events) = executor();
        let mut closes = events.position_closes.subscribe();
        exec.restore_positions(vec![long_position(20_000.0, 19_800.0, 20_600.0)]);

        let before = exec.portfolio().unwrap();
        exec.on_tick(&tick(20_050.0)).await;
        exec.on_tick(&tick(19_900.0)).await;
        assert_eq!(exec.open_positions().len(), 1);

        // Exact stop price triggers.
        exec.on_tick(&tick(19_800.0)).await;
        assert!(exec.open_positions().is_empty());

        let closed = closes.try_recv().unwrap();
        assert_eq!(closed.close_reason, Some(CloseReason::Stop));
        assert_eq!(closed.realized_pnl, -15_000.0);

        let after = exec.portfolio().unwrap();
        assert_eq!(after.current_daily_loss, 15_000.0);
        assert_eq!(after.losing_trades, 1);
        assert_eq!(after.total_trades, 1);
        assert_eq!(after.total_pnl, before.total_pnl - 15_000.0);
        assert!(after.accounting_balanced());
    }

    #[tokio::test]
    async fn target_closes_long_position() {
        let (exec, events) = executor();
        let mut closes = events.position_closes.subscribe();
        exec.restore_positions(vec![long_position(20_000.0, 19_800.0, 20_600.0)]);

        exec.on_tick(&tick(20_600.0)).await;
        let closed = closes.try_recv().unwrap();
        assert_eq!(closed.close_reason, Some(CloseReason::Target));
        assert_eq!(closed.realized_pnl, 45_000.0);
        assert_eq!(exec.portfolio().unwrap().winning_trades, 1);
    }

    #[tokio::test]
    async fn daily_loss_limit_rejects_signal() {
        let (exec, events) = executor();
        let mut signals = events.signals.subscribe();

        let mut portfolio = Portfolio::new("paper", 20_000.0, 600.0);
        portfolio.current_daily_loss = 610.0;
        exec.restore_portfolio(portfolio);

        exec.handle_signal(signal(SignalSide::Buy, 100.0, 99.0, 103.0)).await;
        let decided = signals.try_recv().unwrap();
        assert_eq!(decided.status, SignalStatus::Rejected);
        assert_eq!(decided.rejection_reason, Some(RejectionReason::DailyLossLimit));
        assert!(exec.open_positions().is_empty());
    }

    #[tokio::test]
    async fn insufficient_capital_rejects_not_partially_fills() {
        let (exec, events) = executor();
        let mut signals = events.signals.subscribe();
        exec.restore_portfolio(Portfolio::new("paper", 1_000.0, 600.0));

        exec.handle_signal(signal(SignalSide::Buy, 20_000.0, 19_800.0, 20_600.0)).await;
        let decided = signals.try_recv().unwrap();
        assert_eq!(decided.rejection_reason, Some(RejectionReason::InsufficientCapital));
        assert!(exec.open_positions().is_empty());
        // Nothing was debited.
        assert_eq!(exec.portfolio().unwrap().available_capital, 1_000.0);
    }

    #[tokio::test]
    async fn duplicate_open_position_is_rejected() {
        let (exec, events) = executor();
        let mut signals = events.signals.subscribe();

        exec.handle_signal(signal(SignalSide::Buy, 100.0, 99.0, 103.0)).await;
        let first = signals.try_recv().unwrap();
        assert_eq!(first.status, SignalStatus::Executed);

        exec.handle_signal(signal(SignalSide::Buy, 101.0, 100.0, 104.0)).await;
        let second = signals.try_recv().unwrap();
        assert_eq!(second.rejection_reason, Some(RejectionReason::DuplicateOpenPosition));
    }

    #[tokio::test]
    async fn missing_portfolio_rejects() {
        let (exec, events) = executor();
        let mut signals = events.signals.subscribe();
        exec.clear_portfolio();

        exec.handle_signal(signal(SignalSide::Buy, 100.0, 99.0, 103.0)).await;
        let decided = signals.try_recv().unwrap();
        assert_eq!(decided.rejection_reason, Some(RejectionReason::NoPortfolio));
    }

    #[tokio::test]
    async fn eod_square_off_closes_short_at_current_price() {
        let (exec, events) = executor();
        let mut closes = events.position_closes.subscribe();

        let mut short = long_position(19_500.0, 19_700.0, 18_900.0);
        short.side = PositionSide::Short;
        exec.restore_positions(vec![short]);

        // Mark to 19650 without touching stop (19700) or target (18900).
        exec.on_tick(&tick(19_650.0)).await;
        exec.square_off_all(1_000).await;

        let closed = closes.try_recv().expect("expected an EOD close");
        assert_eq!(closed.close_reason, Some(CloseReason::Eod));
        assert_eq!(closed.realized_pnl, (19_500.0 - 19_650.0) * 75.0);

        // Second sweep is a no-op.
        exec.square_off_all(2_000).await;
        assert!(closes.try_recv().is_err());
        assert_eq!(exec.portfolio().unwrap().total_trades, 1);
    }

    #[tokio::test]
    async fn close_accounting_preserves_identity() {
        let (exec, _events) = executor();
        let before = exec.portfolio().unwrap();

        exec.handle_signal(signal(SignalSide::Buy, 20_000.0, 19_800.0, 20_600.0)).await;
        let entry = exec.open_positions()[0].entry_price;
        exec.on_tick(&tick(20_600.0)).await;

        let after = exec.portfolio().unwrap();
        let realized = (20_600.0 - entry) * 75.0;
        assert!((after.available_capital - (before.available_capital + realized)).abs() < 1e-6);
        assert!(after.accounting_balanced());
        assert_eq!(after.used_margin, 0.0);
    }

    #[tokio::test]
    async fn daily_reset_zeroes_day_counters() {
        let (exec, _events) = executor();
        exec.restore_positions(vec![long_position(20_000.0, 19_800.0, 20_600.0)]);
        exec.on_tick(&tick(19_800.0)).await;

        let portfolio = exec.portfolio().unwrap();
        assert!(portfolio.current_daily_loss > 0.0);
        assert!(portfolio.today_pnl < 0.0);

        exec.daily_reset();
        let portfolio = exec.portfolio().unwrap();
        assert_eq!(portfolio.current_daily_loss, 0.0);
        assert_eq!(portfolio.today_pnl, 0.0);
        // Lifetime stats survive the reset.
        assert_eq!(portfolio.total_trades, 1);
    }

    #[test]
    fn slippage_grows_with_size_and_illiquidity() {
        let (exec, _events) = executor();
        // Average out the +/-0.5 bps jitter over many samples.
        let avg = |liquidity: f64, qty: u32| {
            (0..200).map(|_| exec.slippage_bps(liquidity, qty)).sum::<f64>() / 200.0
        };

        let thin = avg(40.0, 75);
        let deep = avg(90.0, 75);
        assert!(thin > deep + 0.5, "thin {thin} vs deep {deep}");

        let big = avg(80.0, 375); // 5 lots
        let small = avg(80.0, 75);
        assert!(big > small + 1.5, "big {big} vs small {small}");
    }

    #[tokio::test]
    async fn sell_fills_below_signal_price() {
        let (exec, _events) = executor();
        exec.handle_signal(signal(SignalSide::Sell, 20_000.0, 20_200.0, 19_400.0)).await;
        let p = &exec.open_positions()[0];
        assert_eq!(p.side, PositionSide::Short);
        assert!(p.entry_price < 20_000.0);
    }
}
