//! Strategy hosting: the `Strategy` trait, the shared signal gate and the
//! engine that routes candle closes.

pub mod common;
mod confluence;
mod ema_crossover;
mod orb;

pub use common::{depth_filter, SignalDraft, StrategyContext};
pub use confluence::MultiConfluenceStrategy;
pub use ema_crossover::EmaCrossoverStrategy;
pub use orb::OpeningRangeBreakout;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::events::EngineEvents;
use crate::services::sqlite_store::SqliteStore;
use crate::types::{
    AvgDepthMetrics, Candle, CandleInterval, ClosedCandle, DepthAnalytics, DepthMetrics,
    OptionChainAnalytics, Signal, StrategyStatus,
};

/// A systematic trading strategy evaluated on candle closes.
///
/// Strategies see every close on their timeframe (including bars outside
/// the signal window, which they may need for state); the engine's shared
/// gate decides whether a draft becomes a signal.
pub trait Strategy: Send {
    fn name(&self) -> &'static str;
    fn timeframe(&self) -> CandleInterval;

    /// Daily signal cap; 0 means unlimited.
    fn max_trades_per_day(&self) -> u32 {
        0
    }

    /// Whether the intraday window applies. Swing strategies return false.
    fn is_intraday(&self) -> bool {
        true
    }

    fn on_candle(
        &mut self,
        candle: &Candle,
        metrics: &AvgDepthMetrics,
        ctx: &StrategyContext,
    ) -> Option<SignalDraft>;

    /// Clear per-day state at the daily reset.
    fn reset_daily(&mut self);

    /// Latest 20-level book analytics for a security.
    fn on_depth_analytics(&mut self, _analytics: &DepthAnalytics) {}

    /// Latest option-chain sentiment for a security.
    fn on_option_chain(&mut self, _analytics: &OptionChainAnalytics) {}
}

struct HostedStrategy {
    strategy: Box<dyn Strategy>,
    active: bool,
    signals_generated: u64,
    trades_today: u32,
}

/// Routes closed candles to strategies, applies the shared gate and emits
/// accepted signals on the bus.
pub struct StrategyEngine {
    strategies: Vec<HostedStrategy>,
    ctx: StrategyContext,
    events: EngineEvents,
    store: Option<Arc<SqliteStore>>,
    statuses: Arc<DashMap<String, StrategyStatus>>,
}

impl StrategyEngine {
    pub fn new(ctx: StrategyContext, events: EngineEvents, store: Option<Arc<SqliteStore>>) -> Self {
        Self {
            strategies: Vec::new(),
            ctx,
            events,
            store,
            statuses: Arc::new(DashMap::new()),
        }
    }

    pub fn register(&mut self, strategy: Box<dyn Strategy>) {
        let status = StrategyStatus {
            name: strategy.name().to_string(),
            timeframe: strategy.timeframe(),
            active: true,
            signals_generated: 0,
            trades_today: 0,
            max_trades_per_day: strategy.max_trades_per_day(),
        };
        self.statuses.insert(status.name.clone(), status);
        self.strategies.push(HostedStrategy {
            strategy,
            active: true,
            signals_generated: 0,
            trades_today: 0,
        });
    }

    /// Shared view of strategy statuses for the hub.
    pub fn statuses_handle(&self) -> Arc<DashMap<String, StrategyStatus>> {
        self.statuses.clone()
    }

    /// Dispatch one candle close to every matching strategy.
    pub fn on_candle_close(&mut self, closed: &ClosedCandle) {
        let candle = &closed.candle;
        for hosted in &mut self.strategies {
            if !hosted.active || hosted.strategy.timeframe() != candle.interval {
                continue;
            }

            let draft = match hosted.strategy.on_candle(candle, &closed.metrics, &self.ctx) {
                Some(draft) => draft,
                None => continue,
            };
            let name = hosted.strategy.name();

            if hosted.strategy.is_intraday() && !self.ctx.within_intraday_window(candle.timestamp) {
                debug!(strategy = name, "draft outside intraday window, dropped");
                continue;
            }

            let cap = hosted.strategy.max_trades_per_day();
            if cap > 0 && hosted.trades_today >= cap {
                debug!(strategy = name, cap, "daily trade cap reached, draft dropped");
                continue;
            }

            if let Err(reason) = depth_filter(draft.side, &closed.metrics) {
                debug!(strategy = name, side = %draft.side, reason, "draft rejected by depth filter");
                continue;
            }

            let (default_stop, default_target) = self.ctx.default_levels(draft.side, draft.price);
            let signal = Signal::new(
                name,
                candle.security_id.clone(),
                draft.side,
                draft.price,
                draft.stop_loss.unwrap_or(default_stop),
                draft.target.unwrap_or(default_target),
                self.ctx.position_size(draft.price),
                draft.reason,
                DepthMetrics {
                    bid_ask_imbalance: closed.metrics.imbalance,
                    depth_spread: closed.metrics.spread,
                    order_book_strength: closed.metrics.strength,
                    volume_delta: 0.0,
                    liquidity_score: closed.metrics.liquidity_score,
                },
                draft.quality_score,
                candle.timestamp + candle.interval.millis(),
            );

            hosted.signals_generated += 1;
            hosted.trades_today += 1;
            if let Some(mut status) = self.statuses.get_mut(name) {
                status.signals_generated = hosted.signals_generated;
                status.trades_today = hosted.trades_today;
            }

            info!(
                strategy = name,
                security_id = %signal.security_id,
                side = %signal.side,
                price = signal.price,
                quantity = signal.quantity,
                "signal generated"
            );

            if let Some(store) = &self.store {
                if let Err(e) = store.save_signal(&signal) {
                    warn!("failed to persist signal {}: {e}", signal.id);
                }
            }
            let _ = self.events.signals.send(signal);
        }
    }

    /// Daily reset: clear per-strategy trade counters and daily state.
    pub fn daily_reset(&mut self) {
        info!("strategy daily reset");
        for hosted in &mut self.strategies {
            hosted.trades_today = 0;
            hosted.strategy.reset_daily();
            if let Some(mut status) = self.statuses.get_mut(hosted.strategy.name()) {
                status.trades_today = 0;
            }
        }
    }

    pub fn on_depth_analytics(&mut self, analytics: &DepthAnalytics) {
        for hosted in &mut self.strategies {
            hosted.strategy.on_depth_analytics(analytics);
        }
    }

    pub fn on_option_chain(&mut self, analytics: &OptionChainAnalytics) {
        for hosted in &mut self.strategies {
            hosted.strategy.on_option_chain(analytics);
        }
    }

    /// Engine task: one candle close at a time per strategy, no
    /// intra-strategy concurrency.
    pub async fn run(
        mut self,
        mut candle_rx: broadcast::Receiver<ClosedCandle>,
        mut depth_rx: broadcast::Receiver<DepthAnalytics>,
        mut option_rx: broadcast::Receiver<OptionChainAnalytics>,
        mut reset_rx: mpsc::Receiver<()>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                closed = candle_rx.recv() => match closed {
                    Ok(closed) => self.on_candle_close(&closed),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, "strategy engine lagged on candle closes");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                analytics = depth_rx.recv() => {
                    if let Ok(analytics) = analytics {
                        self.on_depth_analytics(&analytics);
                    }
                }
                analytics = option_rx.recv() => {
                    if let Ok(analytics) = analytics {
                        self.on_option_chain(&analytics);
                    }
                }
                reset = reset_rx.recv() => match reset {
                    Some(()) => self.daily_reset(),
                    None => break,
                },
                _ = shutdown.changed() => break,
            }
        }
        info!("strategy engine stopped");
    }
}
