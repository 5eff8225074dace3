//! EMA(9/21) crossover strategy on 5-minute candles.

use std::collections::{HashMap, VecDeque};

use crate::services::indicators::{detect_ema_crossover, ema, Crossover};
use crate::types::{AvgDepthMetrics, Candle, CandleInterval, SignalSide};

use super::common::{SignalDraft, StrategyContext};
use super::Strategy;

const FAST_PERIOD: usize = 9;
const SLOW_PERIOD: usize = 21;
/// Closes retained per security; enough for stable EMAs plus detection.
const CLOSE_HISTORY: usize = 60;
/// Trailing volumes used for the confirmation average.
const VOLUME_LOOKBACK: usize = 10;
const VOLUME_FACTOR: f64 = 1.2;

#[derive(Default)]
struct SecurityState {
    closes: VecDeque<f64>,
    volumes: VecDeque<i64>,
}

pub struct EmaCrossoverStrategy {
    state: HashMap<String, SecurityState>,
}

impl EmaCrossoverStrategy {
    pub fn new() -> Self {
        Self {
            state: HashMap::new(),
        }
    }
}

impl Default for EmaCrossoverStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for EmaCrossoverStrategy {
    fn name(&self) -> &'static str {
        "ema_crossover"
    }

    fn timeframe(&self) -> CandleInterval {
        CandleInterval::FiveMinute
    }

    fn max_trades_per_day(&self) -> u32 {
        3
    }

    fn on_candle(
        &mut self,
        candle: &Candle,
        _metrics: &AvgDepthMetrics,
        _ctx: &StrategyContext,
    ) -> Option<SignalDraft> {
        let state = self.state.entry(candle.security_id.clone()).or_default();

        state.closes.push_back(candle.close);
        while state.closes.len() > CLOSE_HISTORY {
            state.closes.pop_front();
        }

        // Trailing average excludes the bar being evaluated.
        let volume_avg = if state.volumes.is_empty() {
            None
        } else {
            Some(state.volumes.iter().sum::<i64>() as f64 / state.volumes.len() as f64)
        };
        state.volumes.push_back(candle.volume);
        while state.volumes.len() > VOLUME_LOOKBACK {
            state.volumes.pop_front();
        }

        if state.closes.len() < SLOW_PERIOD + 1 {
            return None;
        }

        let closes: Vec<f64> = state.closes.iter().copied().collect();
        let fast = ema(&closes, FAST_PERIOD);
        let slow = ema(&closes, SLOW_PERIOD);
        let crossover = detect_ema_crossover(&fast, &slow)?;

        let volume_avg = volume_avg?;
        let volume_ratio = if volume_avg > 0.0 {
            candle.volume as f64 / volume_avg
        } else {
            0.0
        };
        if volume_ratio < VOLUME_FACTOR {
            return None;
        }

        let side = match crossover {
            Crossover::Bullish => SignalSide::Buy,
            Crossover::Bearish => SignalSide::Sell,
        };

        Some(SignalDraft {
            side,
            price: candle.close,
            stop_loss: None,
            target: None,
            reason: format!(
                "EMA{FAST_PERIOD}/{SLOW_PERIOD} {} crossover, volume {volume_ratio:.1}x",
                match crossover {
                    Crossover::Bullish => "bullish",
                    Crossover::Bearish => "bearish",
                }
            ),
            quality_score: (60.0 + 20.0 * (volume_ratio / VOLUME_FACTOR).min(2.0)).min(100.0),
        })
    }

    fn reset_daily(&mut self) {
        // Candle history carries across sessions; the engine owns the
        // daily trade counter.
    }
}
