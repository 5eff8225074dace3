//! Shared fixtures for the integration suites.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{FixedOffset, NaiveTime, TimeZone};

use paperbull::config::Config;
use paperbull::events::EngineEvents;
use paperbull::services::strategies::{
    EmaCrossoverStrategy, MultiConfluenceStrategy, OpeningRangeBreakout, StrategyContext,
};
use paperbull::services::{
    CandleAggregator, PaperExecutor, SqliteStore, StrategyEngine, TimeframeConfirmer,
};
use paperbull::types::{CandleInterval, DepthMetrics, EnrichedTick, ExchangeSegment, SubscriptionInstrument};

pub fn ist() -> FixedOffset {
    FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap()
}

/// Epoch ms for an IST wall-clock instant on 2024-01-15.
pub fn ist_ms(h: u32, m: u32, s: u32) -> i64 {
    ist()
        .with_ymd_and_hms(2024, 1, 15, h, m, s)
        .unwrap()
        .timestamp_millis()
}

pub fn test_config() -> Arc<Config> {
    Arc::new(Config {
        host: "127.0.0.1".into(),
        port: 0,
        feed_endpoint: String::new(),
        feed_token: "token".into(),
        feed_client_id: "client".into(),
        subscription_set: vec![SubscriptionInstrument {
            segment: ExchangeSegment::Index,
            security_id: "13".into(),
        }],
        candle_intervals: vec![CandleInterval::OneMinute, CandleInterval::FiveMinute],
        total_capital: 20_000.0,
        max_daily_loss_pct: 0.03,
        risk_pct: 0.01,
        stop_loss_pct: 0.01,
        target_pct: 0.03,
        lot_size: 75,
        market_open: NaiveTime::from_hms_opt(9, 15, 0).unwrap(),
        market_close: NaiveTime::from_hms_opt(15, 30, 0).unwrap(),
        eod_square_off: NaiveTime::from_hms_opt(15, 20, 0).unwrap(),
        daily_reset_at: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        exchange_tz: ist(),
        reconnect_initial_delay_ms: 10,
        reconnect_max_attempts: 5,
        keepalive_interval_secs: 30,
        redis_url: None,
        sqlite_path: ":memory:".into(),
    })
}

/// A tick carrying pre-enriched depth metrics (the binary layer has its
/// own tests).
pub fn tick(
    security_id: &str,
    ltp: f64,
    volume: i64,
    captured_at: i64,
    metrics: DepthMetrics,
) -> EnrichedTick {
    EnrichedTick {
        security_id: security_id.into(),
        ltp,
        ltq: 1,
        ltt: captured_at / 1000,
        open: ltp,
        high: ltp,
        low: ltp,
        close: ltp,
        atp: ltp,
        volume,
        total_buy_qty: 0,
        total_sell_qty: 0,
        depth: Default::default(),
        depth_metrics: metrics,
        captured_at,
    }
}

pub fn healthy_metrics() -> DepthMetrics {
    DepthMetrics {
        bid_ask_imbalance: 1.4,
        depth_spread: 0.0002,
        order_book_strength: 2_000.0,
        volume_delta: 0.0,
        liquidity_score: 80.0,
    }
}

pub struct TestPipeline {
    pub events: EngineEvents,
    pub aggregator: Arc<CandleAggregator>,
    pub engine: StrategyEngine,
    pub executor: Arc<PaperExecutor>,
    pub sqlite: Arc<SqliteStore>,
    /// Subscribed at build time so no close is ever missed.
    pub candle_rx: tokio::sync::broadcast::Receiver<paperbull::types::ClosedCandle>,
    pub signal_rx: tokio::sync::broadcast::Receiver<paperbull::types::Signal>,
    pub position_close_rx: tokio::sync::broadcast::Receiver<paperbull::types::Position>,
}

impl TestPipeline {
    /// Drain pending candle closes into the engine and return the signals
    /// it produced.
    pub fn pump_engine(&mut self) -> Vec<paperbull::types::Signal> {
        while let Ok(closed) = self.candle_rx.try_recv() {
            self.engine.on_candle_close(&closed);
        }
        let mut signals = Vec::new();
        while let Ok(signal) = self.signal_rx.try_recv() {
            signals.push(signal);
        }
        signals
    }
}

/// Build the full in-memory pipeline with a seeded executor RNG.
pub fn build_pipeline(config: &Arc<Config>) -> TestPipeline {
    let events = EngineEvents::new();
    let sqlite = Arc::new(SqliteStore::new_in_memory().unwrap());
    let aggregator = Arc::new(CandleAggregator::new(
        config.candle_intervals.clone(),
        config.exchange_tz,
        events.clone(),
    ));
    let confirmer = Arc::new(TimeframeConfirmer::new(aggregator.clone()));

    let mut engine = StrategyEngine::new(
        StrategyContext::from_config(config),
        events.clone(),
        Some(sqlite.clone()),
    );
    engine.register(Box::new(EmaCrossoverStrategy::new()));
    engine.register(Box::new(OpeningRangeBreakout::new()));
    engine.register(Box::new(
        MultiConfluenceStrategy::new(Some(confirmer)).with_events(events.clone()),
    ));

    let executor = PaperExecutor::new(config, events.clone(), Some(sqlite.clone()));
    executor.seed_rng(0x5EED);

    TestPipeline {
        candle_rx: events.candle_closes.subscribe(),
        signal_rx: events.signals.subscribe(),
        position_close_rx: events.position_closes.subscribe(),
        events,
        aggregator,
        engine,
        executor,
        sqlite,
    }
}
