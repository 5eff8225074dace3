//! Redis persistence for high-churn market data.
//!
//! Ticks are append-only sorted sets trimmed to a 24-hour window; candles
//! are hashes keyed by bar start, with a 7-day expiry on 1-minute data.
//! Every write is best-effort: failures are logged and counted, the
//! pipeline never sees them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::types::{Candle, CandleInterval, ClosedCandle, EnrichedTick};

/// Tick retention window, seconds.
const TICK_TTL_SECS: i64 = 24 * 3600;
/// 1-minute candle retention, seconds.
const MINUTE_CANDLE_TTL_SECS: i64 = 7 * 24 * 3600;

fn tick_key(security_id: &str) -> String {
    format!("ticks:{security_id}")
}

fn candle_key(security_id: &str, interval: CandleInterval) -> String {
    format!("candles:{security_id}:{interval}")
}

pub struct RedisStore {
    conn: ConnectionManager,
    write_errors: AtomicU64,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("Redis store connected at {url}");
        Ok(Self {
            conn,
            write_errors: AtomicU64::new(0),
        })
    }

    pub fn write_error_count(&self) -> u64 {
        self.write_errors.load(Ordering::Relaxed)
    }

    fn note_error(&self, what: &str, err: &redis::RedisError) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
        warn!("redis {what} failed: {err}");
    }

    /// Append a tick and trim everything past the retention window.
    pub async fn save_tick(&self, tick: &EnrichedTick) {
        let json = match serde_json::to_string(tick) {
            Ok(json) => json,
            Err(e) => {
                warn!("tick serialization failed: {e}");
                return;
            }
        };
        let key = tick_key(&tick.security_id);
        let cutoff = tick.captured_at - TICK_TTL_SECS * 1000;
        let mut conn = self.conn.clone();

        let result: redis::RedisResult<()> = redis::pipe()
            .zadd(&key, json, tick.captured_at)
            .cmd("ZREMRANGEBYSCORE")
            .arg(&key)
            .arg("-inf")
            .arg(cutoff)
            .expire(&key, TICK_TTL_SECS)
            .query_async(&mut conn)
            .await;
        if let Err(e) = result {
            self.note_error("tick write", &e);
        }
    }

    /// Latest ticks for a security, newest first.
    pub async fn recent_ticks(&self, security_id: &str, limit: isize) -> Vec<EnrichedTick> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = match conn
            .zrevrange(tick_key(security_id), 0, limit - 1)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                debug!("tick read failed: {e}");
                return Vec::new();
            }
        };
        raw.iter()
            .filter_map(|json| serde_json::from_str(json).ok())
            .collect()
    }

    /// Idempotent upsert keyed by `(security, interval, timestamp)`.
    pub async fn upsert_candle(&self, candle: &Candle) {
        let json = match serde_json::to_string(candle) {
            Ok(json) => json,
            Err(e) => {
                warn!("candle serialization failed: {e}");
                return;
            }
        };
        let key = candle_key(&candle.security_id, candle.interval);
        let mut conn = self.conn.clone();

        let result: redis::RedisResult<()> =
            conn.hset(&key, candle.timestamp, json).await;
        if let Err(e) = result {
            self.note_error("candle write", &e);
            return;
        }
        if candle.interval == CandleInterval::OneMinute {
            let result: redis::RedisResult<()> =
                conn.expire(&key, MINUTE_CANDLE_TTL_SECS).await;
            if let Err(e) = result {
                self.note_error("candle expire", &e);
            }
        }
    }

    /// All stored candles for a key, ordered by bar start.
    pub async fn load_candles(
        &self,
        security_id: &str,
        interval: CandleInterval,
    ) -> Vec<Candle> {
        let mut conn = self.conn.clone();
        let raw: Vec<(String, String)> =
            match conn.hgetall(candle_key(security_id, interval)).await {
                Ok(raw) => raw,
                Err(e) => {
                    debug!("candle read failed: {e}");
                    return Vec::new();
                }
            };
        let mut candles: Vec<Candle> = raw
            .iter()
            .filter_map(|(_, json)| serde_json::from_str(json).ok())
            .collect();
        candles.sort_by_key(|c| c.timestamp);
        candles
    }
}

/// Persistence task: drains tick and candle-close streams into Redis.
/// Lives on its own task so store latency never backpressures the feed.
pub async fn run_persistence(
    store: Arc<RedisStore>,
    mut tick_rx: broadcast::Receiver<EnrichedTick>,
    mut candle_rx: broadcast::Receiver<ClosedCandle>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            tick = tick_rx.recv() => match tick {
                Ok(tick) => store.save_tick(&tick).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(missed = n, "persistence lagged on ticks");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            closed = candle_rx.recv() => match closed {
                Ok(closed) => store.upsert_candle(&closed.candle).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(missed = n, "persistence lagged on candles");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown.changed() => break,
        }
    }
    info!("persistence task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_formats() {
        assert_eq!(tick_key("13"), "ticks:13");
        assert_eq!(
            candle_key("13", CandleInterval::FiveMinute),
            "candles:13:5m"
        );
    }
}
