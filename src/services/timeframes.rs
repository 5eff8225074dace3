//! Multi-timeframe trend confirmation.
//!
//! For a primary interval, reads the last 50 closed candles on the
//! primary, mid and higher timeframes, classifies each with EMA(9)/EMA(21)
//! and scores their alignment. Absent data yields `None` and callers treat
//! the check as passing; explicit disalignment blocks.

use std::sync::Arc;

use crate::services::candles::CandleAggregator;
use crate::services::indicators::ema;
use crate::types::{
    Candle, CandleInterval, TimeframeAlignment, TrendDirection, TrendRecommendation,
};

/// Candles inspected per timeframe.
const LOOKBACK: usize = 50;
/// Minimum closed candles needed to classify a timeframe.
const MIN_CANDLES: usize = 21;

/// Read access to closed-candle history. Implemented by the aggregator;
/// tests substitute a fixture.
pub trait CandleHistory: Send + Sync {
    fn recent_closed(&self, security_id: &str, interval: CandleInterval, n: usize) -> Vec<Candle>;
}

impl CandleHistory for CandleAggregator {
    fn recent_closed(&self, security_id: &str, interval: CandleInterval, n: usize) -> Vec<Candle> {
        CandleAggregator::recent_closed(self, security_id, interval, n)
    }
}

/// Classify one timeframe from its closed candles.
///
/// BULLISH when EMA9 is above EMA21 and still rising; BEARISH mirrored;
/// NEUTRAL otherwise. `None` with fewer than 21 candles.
pub fn classify_trend(candles: &[Candle]) -> Option<TrendDirection> {
    if candles.len() < MIN_CANDLES {
        return None;
    }
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let fast = ema(&closes, 9);
    let slow = ema(&closes, 21);
    if fast.len() < 2 || slow.is_empty() {
        return None;
    }
    let fast_last = fast[fast.len() - 1];
    let fast_prev = fast[fast.len() - 2];
    let slow_last = slow[slow.len() - 1];

    if fast_last > slow_last && fast_last > fast_prev {
        Some(TrendDirection::Bullish)
    } else if fast_last < slow_last && fast_last < fast_prev {
        Some(TrendDirection::Bearish)
    } else {
        Some(TrendDirection::Neutral)
    }
}

pub struct TimeframeConfirmer {
    history: Arc<dyn CandleHistory>,
}

impl TimeframeConfirmer {
    pub fn new(history: Arc<dyn CandleHistory>) -> Self {
        Self { history }
    }

    /// Confirm the trend around `primary`. `None` when any timeframe lacks
    /// history.
    pub fn confirm(&self, security_id: &str, primary: CandleInterval) -> Option<TimeframeAlignment> {
        let (mid_interval, higher_interval) = primary.confirmation_pair();

        let classify = |interval: CandleInterval| {
            let candles = self.history.recent_closed(security_id, interval, LOOKBACK);
            classify_trend(&candles)
        };

        let primary_trend = classify(primary)?;
        let mid = classify(mid_interval)?;
        let higher = classify(higher_interval)?;

        Some(score_alignment(primary_trend, mid, higher))
    }
}

/// Score the three-timeframe combination.
pub fn score_alignment(
    primary: TrendDirection,
    mid: TrendDirection,
    higher: TrendDirection,
) -> TimeframeAlignment {
    let all_same = primary == mid && mid == higher && higher != TrendDirection::Neutral;
    let upper_agree = mid == higher && higher != TrendDirection::Neutral;

    let is_aligned = all_same || (upper_agree && primary == TrendDirection::Neutral);

    let mut score: u32 = if all_same {
        100
    } else if upper_agree && primary == TrendDirection::Neutral {
        75
    } else if upper_agree
        || (primary == mid && primary != TrendDirection::Neutral)
        || (primary == higher && primary != TrendDirection::Neutral)
    {
        50
    } else {
        0
    };
    if higher != TrendDirection::Neutral {
        score = (score + 15).min(100);
    }

    let recommendation = if is_aligned {
        match higher {
            TrendDirection::Bullish => TrendRecommendation::Buy,
            TrendDirection::Bearish => TrendRecommendation::Sell,
            TrendDirection::Neutral => TrendRecommendation::Wait,
        }
    } else {
        TrendRecommendation::Wait
    };

    TimeframeAlignment {
        primary,
        mid,
        higher,
        is_aligned,
        alignment_score: score,
        recommendation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn candles_from_closes(closes: &[f64], interval: CandleInterval) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                security_id: "13".into(),
                interval,
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1_000,
                avg_imbalance: 1.0,
                avg_spread: 0.0,
                avg_strength: 0.0,
                timestamp: i as i64 * interval.millis(),
                is_closed: true,
            })
            .collect()
    }

    fn rising(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64).collect()
    }

    fn falling(n: usize) -> Vec<f64> {
        (0..n).map(|i| 200.0 - i as f64).collect()
    }

    struct FixtureHistory {
        data: HashMap<CandleInterval, Vec<Candle>>,
    }

    impl CandleHistory for FixtureHistory {
        fn recent_closed(
            &self,
            _security_id: &str,
            interval: CandleInterval,
            n: usize,
        ) -> Vec<Candle> {
            let candles = self.data.get(&interval).cloned().unwrap_or_default();
            let skip = candles.len().saturating_sub(n);
            candles[skip..].to_vec()
        }
    }

    #[test]
    fn rising_closes_classify_bullish() {
        let candles = candles_from_closes(&rising(30), CandleInterval::FiveMinute);
        assert_eq!(classify_trend(&candles), Some(TrendDirection::Bullish));
    }

    #[test]
    fn falling_closes_classify_bearish() {
        let candles = candles_from_closes(&falling(30), CandleInterval::FiveMinute);
        assert_eq!(classify_trend(&candles), Some(TrendDirection::Bearish));
    }

    #[test]
    fn flat_closes_classify_neutral() {
        let candles = candles_from_closes(&[100.0; 30], CandleInterval::FiveMinute);
        assert_eq!(classify_trend(&candles), Some(TrendDirection::Neutral));
    }

    #[test]
    fn short_history_is_insufficient() {
        let candles = candles_from_closes(&rising(10), CandleInterval::FiveMinute);
        assert_eq!(classify_trend(&candles), None);
    }

    #[test]
    fn fully_aligned_bullish_recommends_buy() {
        let alignment = score_alignment(
            TrendDirection::Bullish,
            TrendDirection::Bullish,
            TrendDirection::Bullish,
        );
        assert!(alignment.is_aligned);
        assert_eq!(alignment.alignment_score, 100);
        assert_eq!(alignment.recommendation, TrendRecommendation::Buy);
    }

    #[test]
    fn neutral_primary_with_agreeing_upper_is_aligned() {
        let alignment = score_alignment(
            TrendDirection::Neutral,
            TrendDirection::Bearish,
            TrendDirection::Bearish,
        );
        assert!(alignment.is_aligned);
        assert_eq!(alignment.alignment_score, 90);
        assert_eq!(alignment.recommendation, TrendRecommendation::Sell);
    }

    #[test]
    fn opposing_primary_blocks_alignment() {
        let alignment = score_alignment(
            TrendDirection::Bearish,
            TrendDirection::Bullish,
            TrendDirection::Bullish,
        );
        assert!(!alignment.is_aligned);
        assert_eq!(alignment.recommendation, TrendRecommendation::Wait);
    }

    #[test]
    fn neutral_everything_scores_zero() {
        let alignment = score_alignment(
            TrendDirection::Neutral,
            TrendDirection::Neutral,
            TrendDirection::Neutral,
        );
        assert!(!alignment.is_aligned);
        assert_eq!(alignment.alignment_score, 0);
    }

    #[test]
    fn confirmer_uses_hierarchy() {
        let mut data = HashMap::new();
        data.insert(
            CandleInterval::FiveMinute,
            candles_from_closes(&rising(50), CandleInterval::FiveMinute),
        );
        data.insert(
            CandleInterval::FifteenMinute,
            candles_from_closes(&rising(50), CandleInterval::FifteenMinute),
        );
        data.insert(
            CandleInterval::OneHour,
            candles_from_closes(&rising(50), CandleInterval::OneHour),
        );
        let confirmer = TimeframeConfirmer::new(Arc::new(FixtureHistory { data }));

        let alignment = confirmer.confirm("13", CandleInterval::FiveMinute).unwrap();
        assert!(alignment.is_aligned);
        assert_eq!(alignment.recommendation, TrendRecommendation::Buy);
    }

    #[test]
    fn confirmer_returns_none_without_history() {
        let confirmer = TimeframeConfirmer::new(Arc::new(FixtureHistory {
            data: HashMap::new(),
        }));
        assert!(confirmer.confirm("13", CandleInterval::FiveMinute).is_none());
    }
}
