//! Opening-Range Breakout on 1-minute candles.
//!
//! Phase 1 sweeps the 09:15-09:30 range; phase 2 trades closes beyond the
//! frozen range until 14:00, one entry per direction per session.

use std::collections::{HashMap, VecDeque};

use chrono::NaiveTime;
use tracing::debug;

use crate::types::{AvgDepthMetrics, Candle, CandleInterval, SignalSide};

use super::common::{SignalDraft, StrategyContext};
use super::Strategy;

/// Trailing 1m volumes for the breakout confirmation average.
const VOLUME_LOOKBACK: usize = 20;
const VOLUME_FACTOR: f64 = 2.0;
/// Minimum absolute order-book strength behind a breakout.
const STRENGTH_FLOOR: f64 = 1_000.0;

#[derive(Debug, Default)]
struct SessionState {
    or_high: Option<f64>,
    or_low: Option<f64>,
    frozen: bool,
    has_traded_bullish: bool,
    has_traded_bearish: bool,
    volumes: VecDeque<i64>,
}

impl SessionState {
    fn or_height(&self) -> Option<f64> {
        match (self.or_high, self.or_low) {
            (Some(high), Some(low)) => Some(high - low),
            _ => None,
        }
    }
}

pub struct OpeningRangeBreakout {
    range_start: NaiveTime,
    range_end: NaiveTime,
    entry_cutoff: NaiveTime,
    state: HashMap<String, SessionState>,
}

impl OpeningRangeBreakout {
    pub fn new() -> Self {
        Self {
            range_start: NaiveTime::from_hms_opt(9, 15, 0).unwrap(),
            range_end: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            entry_cutoff: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
            state: HashMap::new(),
        }
    }

    /// The frozen range for a security, if phase 1 has completed.
    #[cfg(test)]
    pub fn opening_range(&self, security_id: &str) -> Option<(f64, f64)> {
        let state = self.state.get(security_id)?;
        if !state.frozen {
            return None;
        }
        Some((state.or_low?, state.or_high?))
    }

    #[cfg(test)]
    pub fn has_traded_bullish(&self, security_id: &str) -> bool {
        self.state
            .get(security_id)
            .map(|s| s.has_traded_bullish)
            .unwrap_or(false)
    }
}

impl Default for OpeningRangeBreakout {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for OpeningRangeBreakout {
    fn name(&self) -> &'static str {
        "opening_range_breakout"
    }

    fn timeframe(&self) -> CandleInterval {
        CandleInterval::OneMinute
    }

    fn max_trades_per_day(&self) -> u32 {
        2
    }

    fn on_candle(
        &mut self,
        candle: &Candle,
        metrics: &AvgDepthMetrics,
        ctx: &StrategyContext,
    ) -> Option<SignalDraft> {
        let bar_time = ctx.local_time(candle.timestamp);
        let state = self.state.entry(candle.security_id.clone()).or_default();

        // Phase 1: sweep the opening range.
        if bar_time >= self.range_start && bar_time < self.range_end {
            state.or_high = Some(state.or_high.map_or(candle.high, |h| h.max(candle.high)));
            state.or_low = Some(state.or_low.map_or(candle.low, |l| l.min(candle.low)));
            state.volumes.push_back(candle.volume);
            while state.volumes.len() > VOLUME_LOOKBACK {
                state.volumes.pop_front();
            }
            return None;
        }

        if !state.frozen && bar_time >= self.range_end && state.or_height().is_some() {
            state.frozen = true;
            debug!(
                security_id = %candle.security_id,
                or_low = state.or_low.unwrap(),
                or_high = state.or_high.unwrap(),
                "opening range frozen"
            );
        }

        let draft = (|| {
            if !state.frozen || bar_time >= self.entry_cutoff {
                return None;
            }
            let (or_high, or_low) = (state.or_high?, state.or_low?);
            let or_height = or_high - or_low;

            let side = if candle.close > or_high && !state.has_traded_bullish {
                SignalSide::Buy
            } else if candle.close < or_low && !state.has_traded_bearish {
                SignalSide::Sell
            } else {
                return None;
            };

            if state.volumes.is_empty() {
                return None;
            }
            let volume_avg =
                state.volumes.iter().sum::<i64>() as f64 / state.volumes.len() as f64;
            if volume_avg <= 0.0 || (candle.volume as f64) < VOLUME_FACTOR * volume_avg {
                return None;
            }

            // The book must lean into the breakout.
            let strength_ok = match side {
                SignalSide::Buy => metrics.strength >= STRENGTH_FLOOR,
                SignalSide::Sell => metrics.strength <= -STRENGTH_FLOOR,
            };
            if !strength_ok {
                return None;
            }

            let (stop_loss, target) = match side {
                SignalSide::Buy => (or_low, candle.close + 2.0 * or_height),
                SignalSide::Sell => (or_high, candle.close - 2.0 * or_height),
            };

            Some(SignalDraft {
                side,
                price: candle.close,
                stop_loss: Some(stop_loss),
                target: Some(target),
                reason: format!(
                    "opening range {} breakout past {:.2} (range {:.2}-{:.2})",
                    match side {
                        SignalSide::Buy => "bullish",
                        SignalSide::Sell => "bearish",
                    },
                    match side {
                        SignalSide::Buy => or_high,
                        SignalSide::Sell => or_low,
                    },
                    or_low,
                    or_high,
                ),
                quality_score: (50.0 + (metrics.strength.abs() / STRENGTH_FLOOR) * 10.0).min(100.0),
            })
        })();

        if let Some(draft) = &draft {
            match draft.side {
                SignalSide::Buy => state.has_traded_bullish = true,
                SignalSide::Sell => state.has_traded_bearish = true,
            }
        }

        // Post-range bars still feed the trailing volume average.
        state.volumes.push_back(candle.volume);
        while state.volumes.len() > VOLUME_LOOKBACK {
            state.volumes.pop_front();
        }

        draft
    }

    fn reset_daily(&mut self) {
        self.state.clear();
    }
}
