//! Multi-confluence strategy on 5-minute candles.
//!
//! Requires at least four of five independent confirmations (breakout
//! candle, volume expansion, book absorption, option-chain sentiment,
//! prior accumulation) plus multi-timeframe alignment. The option-chain
//! input is optional; when it has never arrived that confluence is simply
//! unavailable.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tracing::debug;

use crate::events::EngineEvents;
use crate::services::timeframes::TimeframeConfirmer;
use crate::types::{
    AccumulationReport, AvgDepthMetrics, Candle, CandleInterval, DepthAnalytics,
    OptionChainAnalytics, OptionSentiment, SignalSide, TrendRecommendation,
};

use super::common::{SignalDraft, StrategyContext};
use super::Strategy;

/// Candles retained per security.
const CANDLE_HISTORY: usize = 20;
/// Confirmations required to trade.
const REQUIRED_CONFLUENCES: usize = 4;
const VOLUME_FACTOR: f64 = 1.3;
/// Absorption edge (percentage points) treated as directional.
const ABSORPTION_EDGE: f64 = 20.0;
/// Price proximity to the strongest level, fractional.
const LEVEL_PROXIMITY: f64 = 0.005;
/// Option sentiment conviction floor, percent.
const OPTION_STRENGTH_MIN: f64 = 60.0;
/// Accumulation tolerance around the mean close, fractional.
const ACCUMULATION_BAND: f64 = 0.01;

#[derive(Default)]
struct SecurityState {
    candles: VecDeque<Candle>,
}

pub struct MultiConfluenceStrategy {
    confirmer: Option<Arc<TimeframeConfirmer>>,
    /// When set, detected consolidations are broadcast as
    /// `accumulation:report` messages.
    events: Option<EngineEvents>,
    state: HashMap<String, SecurityState>,
    depth_cache: HashMap<String, DepthAnalytics>,
    option_cache: HashMap<String, OptionChainAnalytics>,
}

/// Mean close of the last five candles when they all sit within the
/// accumulation band around it.
fn accumulation_mean(history: &[Candle]) -> Option<f64> {
    if history.len() < 5 {
        return None;
    }
    let window = &history[history.len() - 5..];
    let mean = window.iter().map(|c| c.close).sum::<f64>() / window.len() as f64;
    if mean > 0.0
        && window
            .iter()
            .all(|c| (c.close - mean).abs() / mean <= ACCUMULATION_BAND)
    {
        Some(mean)
    } else {
        None
    }
}

impl MultiConfluenceStrategy {
    pub fn new(confirmer: Option<Arc<TimeframeConfirmer>>) -> Self {
        Self {
            confirmer,
            events: None,
            state: HashMap::new(),
            depth_cache: HashMap::new(),
            option_cache: HashMap::new(),
        }
    }

    /// Attach the engine bus for accumulation-report broadcasts.
    pub fn with_events(mut self, events: EngineEvents) -> Self {
        self.events = Some(events);
        self
    }

    fn count_confluences(
        &self,
        side: SignalSide,
        candle: &Candle,
        history: &[Candle],
    ) -> (usize, Vec<&'static str>) {
        let mut hits = Vec::new();

        // 1. Breakout candle beyond the previous extreme, closing in the
        //    leading quartile of its own range.
        if let Some(prev) = history.last() {
            let range = candle.high - candle.low;
            let breakout = match side {
                SignalSide::Buy => {
                    candle.close > candle.open
                        && (range <= 0.0 || candle.close >= candle.low + 0.75 * range)
                        && candle.close > prev.high
                }
                SignalSide::Sell => {
                    candle.close < candle.open
                        && (range <= 0.0 || candle.close <= candle.high - 0.75 * range)
                        && candle.close < prev.low
                }
            };
            if breakout {
                hits.push("breakout");
            }
        }

        // 2. Volume expansion over the trailing average.
        if !history.is_empty() {
            let avg = history.iter().map(|c| c.volume).sum::<i64>() as f64 / history.len() as f64;
            if avg > 0.0 && candle.volume as f64 >= VOLUME_FACTOR * avg {
                hits.push("volume");
            }
        }

        // 3. 20-level book absorption in the trade direction, or price
        //    parked at the strongest level.
        if let Some(analytics) = self.depth_cache.get(&candle.security_id) {
            let absorption = match side {
                SignalSide::Buy => {
                    analytics.buy_absorption_pct - analytics.sell_absorption_pct >= ABSORPTION_EDGE
                }
                SignalSide::Sell => {
                    analytics.sell_absorption_pct - analytics.buy_absorption_pct >= ABSORPTION_EDGE
                }
            };
            let near_level = match side {
                SignalSide::Buy => analytics
                    .strongest_bid
                    .map(|l| (candle.close - l.price).abs() / candle.close <= LEVEL_PROXIMITY)
                    .unwrap_or(false),
                SignalSide::Sell => analytics
                    .strongest_ask
                    .map(|l| (candle.close - l.price).abs() / candle.close <= LEVEL_PROXIMITY)
                    .unwrap_or(false),
            };
            if absorption || near_level {
                hits.push("depth");
            }
        }

        // 4. Option-chain sentiment, when the optional stream has data.
        if let Some(analytics) = self.option_cache.get(&candle.security_id) {
            let wanted = match side {
                SignalSide::Buy => OptionSentiment::Bullish,
                SignalSide::Sell => OptionSentiment::Bearish,
            };
            if analytics.sentiment == wanted && analytics.strength_pct >= OPTION_STRENGTH_MIN {
                hits.push("options");
            }
        }

        // 5. Tight accumulation over the five candles before this one.
        if accumulation_mean(history).is_some() {
            hits.push("accumulation");
        }

        (hits.len(), hits)
    }
}

impl Strategy for MultiConfluenceStrategy {
    fn name(&self) -> &'static str {
        "multi_confluence"
    }

    fn timeframe(&self) -> CandleInterval {
        CandleInterval::FiveMinute
    }

    fn on_candle(
        &mut self,
        candle: &Candle,
        _metrics: &AvgDepthMetrics,
        _ctx: &StrategyContext,
    ) -> Option<SignalDraft> {
        let history: Vec<Candle> = self
            .state
            .get(&candle.security_id)
            .map(|s| s.candles.iter().cloned().collect())
            .unwrap_or_default();

        if let (Some(events), Some(mean_price)) = (&self.events, accumulation_mean(&history)) {
            let _ = events.accumulation.send(AccumulationReport {
                security_id: candle.security_id.clone(),
                interval: candle.interval,
                mean_price,
                band_pct: ACCUMULATION_BAND * 100.0,
                candle_count: 5,
                detected_at: candle.timestamp + candle.interval.millis(),
            });
        }

        let draft = [SignalSide::Buy, SignalSide::Sell].into_iter().find_map(|side| {
            let (count, hits) = self.count_confluences(side, candle, &history);
            if count < REQUIRED_CONFLUENCES {
                return None;
            }

            // Multi-timeframe gate: absence of analysis passes, explicit
            // disalignment blocks.
            if let Some(confirmer) = &self.confirmer {
                if let Some(alignment) = confirmer.confirm(&candle.security_id, self.timeframe()) {
                    let wanted = match side {
                        SignalSide::Buy => TrendRecommendation::Buy,
                        SignalSide::Sell => TrendRecommendation::Sell,
                    };
                    if !alignment.is_aligned || alignment.recommendation != wanted {
                        debug!(
                            security_id = %candle.security_id,
                            side = %side,
                            score = alignment.alignment_score,
                            "confluence blocked by timeframe alignment"
                        );
                        return None;
                    }
                }
            }

            Some(SignalDraft {
                side,
                price: candle.close,
                stop_loss: None,
                target: None,
                reason: format!("confluences: {}", hits.join("+")),
                quality_score: (count as f64 * 20.0).min(100.0),
            })
        });

        let state = self.state.entry(candle.security_id.clone()).or_default();
        state.candles.push_back(candle.clone());
        while state.candles.len() > CANDLE_HISTORY {
            state.candles.pop_front();
        }

        draft
    }

    fn reset_daily(&mut self) {
        self.state.clear();
    }

    fn on_depth_analytics(&mut self, analytics: &DepthAnalytics) {
        self.depth_cache
            .insert(analytics.security_id.clone(), analytics.clone());
    }

    fn on_option_chain(&mut self, analytics: &OptionChainAnalytics) {
        self.option_cache
            .insert(analytics.security_id.clone(), analytics.clone());
    }
}
