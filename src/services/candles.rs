//! Tick-to-OHLC aggregation over multiple intervals.
//!
//! One open (building) candle per `(security, interval)` key. A tick whose
//! floor-aligned bar start differs from the open candle's closes that
//! candle, emits it on the bus and starts the next one. Ticks exactly on a
//! boundary belong to the new candle.

use std::collections::VecDeque;

use chrono::{FixedOffset, TimeZone, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::events::EngineEvents;
use crate::types::{AvgDepthMetrics, Candle, CandleInterval, ClosedCandle, EnrichedTick};

/// Closed candles retained in memory per key for the strategy layer.
const HISTORY_LEN: usize = 100;

#[derive(Debug, Clone)]
struct BuildingCandle {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: i64,
    timestamp: i64,
    imbalance_acc: f64,
    spread_acc: f64,
    strength_acc: f64,
    liquidity_acc: f64,
    tick_count: u64,
}

impl BuildingCandle {
    fn new(timestamp: i64, ltp: f64) -> Self {
        Self {
            open: ltp,
            high: ltp,
            low: ltp,
            close: ltp,
            volume: 0,
            timestamp,
            imbalance_acc: 0.0,
            spread_acc: 0.0,
            strength_acc: 0.0,
            liquidity_acc: 0.0,
            tick_count: 0,
        }
    }

    fn apply(&mut self, tick: &EnrichedTick) {
        self.high = self.high.max(tick.ltp);
        self.low = self.low.min(tick.ltp);
        self.close = tick.ltp;
        // Vendor volume is cumulative for the session; the latest value wins.
        self.volume = tick.volume;
        self.imbalance_acc += tick.depth_metrics.bid_ask_imbalance;
        self.spread_acc += tick.depth_metrics.depth_spread;
        self.strength_acc += tick.depth_metrics.order_book_strength;
        self.liquidity_acc += tick.depth_metrics.liquidity_score;
        self.tick_count += 1;
    }

    fn finalize(self, security_id: &str, interval: CandleInterval) -> ClosedCandle {
        let metrics = if self.tick_count == 0 {
            AvgDepthMetrics::default()
        } else {
            let n = self.tick_count as f64;
            AvgDepthMetrics {
                imbalance: self.imbalance_acc / n,
                spread: self.spread_acc / n,
                strength: self.strength_acc / n,
                liquidity_score: self.liquidity_acc / n,
            }
        };
        let candle = Candle {
            security_id: security_id.to_string(),
            interval,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            avg_imbalance: metrics.imbalance,
            avg_spread: metrics.spread,
            avg_strength: metrics.strength,
            timestamp: self.timestamp,
            is_closed: true,
        };
        ClosedCandle { candle, metrics }
    }

    fn snapshot(&self, security_id: &str, interval: CandleInterval) -> Candle {
        let n = self.tick_count.max(1) as f64;
        Candle {
            security_id: security_id.to_string(),
            interval,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            avg_imbalance: self.imbalance_acc / n,
            avg_spread: self.spread_acc / n,
            avg_strength: self.strength_acc / n,
            timestamp: self.timestamp,
            is_closed: false,
        }
    }
}

/// Folds enriched ticks into OHLC bars and keeps a bounded history of
/// closed candles per key. Single writer per key: only the aggregator task
/// calls `on_tick`.
pub struct CandleAggregator {
    intervals: Vec<CandleInterval>,
    exchange_tz: FixedOffset,
    open: DashMap<(String, CandleInterval), BuildingCandle>,
    history: DashMap<(String, CandleInterval), VecDeque<Candle>>,
    events: EngineEvents,
}

impl CandleAggregator {
    pub fn new(
        intervals: Vec<CandleInterval>,
        exchange_tz: FixedOffset,
        events: EngineEvents,
    ) -> Self {
        Self {
            intervals,
            exchange_tz,
            open: DashMap::new(),
            history: DashMap::new(),
            events,
        }
    }

    /// Floor a capture instant to its bar start. Day bars truncate to
    /// exchange-local midnight, everything else to the interval length.
    pub fn bar_start(&self, captured_at: i64, interval: CandleInterval) -> i64 {
        match interval {
            CandleInterval::OneDay => {
                let local = Utc
                    .timestamp_millis_opt(captured_at)
                    .single()
                    .unwrap_or_default()
                    .with_timezone(&self.exchange_tz);
                let midnight = local
                    .date_naive()
                    .and_hms_opt(0, 0, 0)
                    .unwrap()
                    .and_local_timezone(self.exchange_tz)
                    .single()
                    .unwrap_or_default();
                midnight.timestamp_millis()
            }
            _ => {
                let ms = interval.millis();
                captured_at.div_euclid(ms) * ms
            }
        }
    }

    /// Fold one tick into every tracked interval.
    pub fn on_tick(&self, tick: &EnrichedTick) {
        for &interval in &self.intervals {
            let key = (tick.security_id.clone(), interval);
            let bar_start = self.bar_start(tick.captured_at, interval);

            // Close a stale candle before touching the new bar.
            let closed = match self.open.get(&key) {
                Some(open) if open.timestamp != bar_start => {
                    self.open.remove(&key).map(|(_, building)| building)
                }
                _ => None,
            };
            if let Some(building) = closed {
                self.emit_close(&key.0, interval, building);
            }

            let mut entry = self
                .open
                .entry(key)
                .or_insert_with(|| BuildingCandle::new(bar_start, tick.ltp));
            entry.apply(tick);
            let snapshot = entry.snapshot(&tick.security_id, interval);
            drop(entry);
            let _ = self.events.candle_updates.send(snapshot);
        }
    }

    fn emit_close(&self, security_id: &str, interval: CandleInterval, building: BuildingCandle) {
        let closed = building.finalize(security_id, interval);
        debug!(
            security_id,
            interval = %interval,
            close = closed.candle.close,
            "closed candle"
        );
        let mut history = self
            .history
            .entry((security_id.to_string(), interval))
            .or_insert_with(VecDeque::new);
        history.push_back(closed.candle.clone());
        while history.len() > HISTORY_LEN {
            history.pop_front();
        }
        drop(history);
        let _ = self.events.candle_closes.send(closed);
    }

    /// Close every open candle (shutdown path).
    pub fn close_all(&self) {
        let keys: Vec<_> = self.open.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((_, building)) = self.open.remove(&key) {
                self.emit_close(&key.0, key.1, building);
            }
        }
    }

    /// Last `n` closed candles for a key, oldest first.
    pub fn recent_closed(
        &self,
        security_id: &str,
        interval: CandleInterval,
        n: usize,
    ) -> Vec<Candle> {
        self.history
            .get(&(security_id.to_string(), interval))
            .map(|h| h.iter().rev().take(n).rev().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of open (building) candles, for the status snapshot.
    pub fn open_candle_count(&self) -> usize {
        self.open.len()
    }
}

/// Aggregator task: folds the tick stream until shutdown, then closes
/// every open candle.
pub async fn run_aggregator(
    aggregator: std::sync::Arc<CandleAggregator>,
    mut tick_rx: tokio::sync::broadcast::Receiver<EnrichedTick>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            tick = tick_rx.recv() => match tick {
                Ok(tick) => aggregator.on_tick(&tick),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(missed = n, "aggregator lagged on ticks");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown.changed() => break,
        }
    }
    aggregator.close_all();
    tracing::info!("candle aggregator stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DepthMetrics, QuoteDepth};

    fn tz() -> FixedOffset {
        FixedOffset::east_opt(5 * 3600 + 1800).unwrap()
    }

    fn tick(security_id: &str, ltp: f64, volume: i64, captured_at: i64) -> EnrichedTick {
        EnrichedTick {
            security_id: security_id.into(),
            ltp,
            ltq: 1,
            ltt: captured_at / 1000,
            open: 0.0,
            high: 0.0,
            low: 0.0,
            close: 0.0,
            atp: ltp,
            volume,
            total_buy_qty: 0,
            total_sell_qty: 0,
            depth: QuoteDepth::default(),
            depth_metrics: DepthMetrics {
                bid_ask_imbalance: 1.4,
                depth_spread: 0.0004,
                order_book_strength: 2_000.0,
                volume_delta: 0.0,
                liquidity_score: 80.0,
            },
            captured_at,
        }
    }

    fn aggregator(intervals: Vec<CandleInterval>) -> (CandleAggregator, EngineEvents) {
        let events = EngineEvents::new();
        (CandleAggregator::new(intervals, tz(), events.clone()), events)
    }

    #[test]
    fn boundary_tick_starts_new_candle() {
        let (agg, events) = aggregator(vec![CandleInterval::OneMinute]);
        let mut closes = events.candle_closes.subscribe();

        agg.on_tick(&tick("13", 100.0, 10, 59_000));
        // Exactly on the minute boundary: belongs to the next bar.
        agg.on_tick(&tick("13", 101.0, 20, 60_000));

        let closed = closes.try_recv().unwrap();
        assert_eq!(closed.candle.timestamp, 0);
        assert_eq!(closed.candle.close, 100.0);

        agg.close_all();
        let last = closes.try_recv().unwrap();
        assert_eq!(last.candle.timestamp, 60_000);
        assert_eq!(last.candle.open, 101.0);
    }

    #[test]
    fn closed_candle_count_matches_boundaries_crossed() {
        let (agg, events) = aggregator(vec![CandleInterval::OneMinute]);
        let mut closes = events.candle_closes.subscribe();

        // 10 ticks, one every 30 s: 5 minutes, 4 closed candles before close_all.
        for i in 0..10 {
            agg.on_tick(&tick("13", 100.0 + i as f64, 10 * i, i * 30_000));
        }
        agg.close_all();

        let mut count = 0;
        while closes.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 5);
    }

    #[test]
    fn candle_close_is_last_tick_ltp() {
        let (agg, events) = aggregator(vec![CandleInterval::OneMinute]);
        let mut closes = events.candle_closes.subscribe();

        agg.on_tick(&tick("13", 100.0, 10, 1_000));
        agg.on_tick(&tick("13", 105.0, 20, 2_000));
        agg.on_tick(&tick("13", 99.0, 30, 3_000));
        agg.on_tick(&tick("13", 200.0, 40, 61_000));

        let closed = closes.try_recv().unwrap();
        assert_eq!(closed.candle.open, 100.0);
        assert_eq!(closed.candle.high, 105.0);
        assert_eq!(closed.candle.low, 99.0);
        assert_eq!(closed.candle.close, 99.0);
        assert_eq!(closed.candle.volume, 30);
        assert!(closed.candle.is_closed);
        assert!(closed.candle.low <= closed.candle.open && closed.candle.open <= closed.candle.high);
    }

    #[test]
    fn metrics_average_over_ticks() {
        let (agg, events) = aggregator(vec![CandleInterval::OneMinute]);
        let mut closes = events.candle_closes.subscribe();

        let mut t1 = tick("13", 100.0, 10, 1_000);
        t1.depth_metrics.bid_ask_imbalance = 1.0;
        let mut t2 = tick("13", 100.0, 20, 2_000);
        t2.depth_metrics.bid_ask_imbalance = 2.0;
        agg.on_tick(&t1);
        agg.on_tick(&t2);
        agg.close_all();

        let closed = closes.try_recv().unwrap();
        assert!((closed.metrics.imbalance - 1.5).abs() < f64::EPSILON);
        assert!((closed.candle.avg_imbalance - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn intervals_are_independent() {
        let (agg, events) =
            aggregator(vec![CandleInterval::OneMinute, CandleInterval::FiveMinute]);
        let mut closes = events.candle_closes.subscribe();

        // Crosses four 1m boundaries but no 5m boundary.
        for i in 0..5 {
            agg.on_tick(&tick("13", 100.0, 0, i * 60_000));
        }

        let mut one_minute = 0;
        let mut five_minute = 0;
        while let Ok(closed) = closes.try_recv() {
            match closed.candle.interval {
                CandleInterval::OneMinute => one_minute += 1,
                CandleInterval::FiveMinute => five_minute += 1,
                _ => {}
            }
        }
        assert_eq!(one_minute, 4);
        assert_eq!(five_minute, 0);
    }

    #[test]
    fn day_bars_truncate_to_exchange_midnight() {
        let (agg, _events) = aggregator(vec![CandleInterval::OneDay]);
        // 2024-01-15 10:00 IST = 04:30 UTC.
        let captured_at = chrono::DateTime::parse_from_rfc3339("2024-01-15T04:30:00+00:00")
            .unwrap()
            .timestamp_millis();
        let start = agg.bar_start(captured_at, CandleInterval::OneDay);
        // Midnight IST on 2024-01-15 = 2024-01-14T18:30Z.
        let expected = chrono::DateTime::parse_from_rfc3339("2024-01-14T18:30:00+00:00")
            .unwrap()
            .timestamp_millis();
        assert_eq!(start, expected);
    }

    #[test]
    fn history_is_bounded_and_ordered() {
        let (agg, _events) = aggregator(vec![CandleInterval::OneMinute]);
        for i in 0..150 {
            agg.on_tick(&tick("13", 100.0 + i as f64, 0, i * 60_000));
        }
        let recent = agg.recent_closed("13", CandleInterval::OneMinute, 200);
        assert_eq!(recent.len(), 100);
        assert!(recent.windows(2).all(|w| w[0].timestamp < w[1].timestamp));

        let last_three = agg.recent_closed("13", CandleInterval::OneMinute, 3);
        assert_eq!(last_three.len(), 3);
        assert_eq!(last_three[2].timestamp, recent[99].timestamp);
    }
}
