use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Candle interval tracked by the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CandleInterval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinute,
    #[serde(rename = "15m")]
    FifteenMinute,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "1d")]
    OneDay,
}

impl CandleInterval {
    /// Interval length in milliseconds.
    pub fn millis(&self) -> i64 {
        match self {
            CandleInterval::OneMinute => 60_000,
            CandleInterval::FiveMinute => 300_000,
            CandleInterval::FifteenMinute => 900_000,
            CandleInterval::OneHour => 3_600_000,
            CandleInterval::OneDay => 86_400_000,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CandleInterval::OneMinute => "1m",
            CandleInterval::FiveMinute => "5m",
            CandleInterval::FifteenMinute => "15m",
            CandleInterval::OneHour => "1h",
            CandleInterval::OneDay => "1d",
        }
    }

    /// The (mid, higher) confirmation pair for a primary interval.
    pub fn confirmation_pair(&self) -> (CandleInterval, CandleInterval) {
        match self {
            CandleInterval::OneMinute => (CandleInterval::FiveMinute, CandleInterval::FifteenMinute),
            CandleInterval::FiveMinute => (CandleInterval::FifteenMinute, CandleInterval::OneHour),
            CandleInterval::FifteenMinute => (CandleInterval::OneHour, CandleInterval::OneDay),
            CandleInterval::OneHour | CandleInterval::OneDay => {
                (CandleInterval::OneDay, CandleInterval::OneDay)
            }
        }
    }
}

impl fmt::Display for CandleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CandleInterval {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(CandleInterval::OneMinute),
            "5m" => Ok(CandleInterval::FiveMinute),
            "15m" => Ok(CandleInterval::FifteenMinute),
            "1h" => Ok(CandleInterval::OneHour),
            "1d" => Ok(CandleInterval::OneDay),
            _ => Err(()),
        }
    }
}

/// An OHLC bar with averaged depth metrics, keyed by
/// `(security_id, interval, timestamp)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub security_id: String,
    pub interval: CandleInterval,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Cumulative session volume as of the last tick in the bar.
    pub volume: i64,
    pub avg_imbalance: f64,
    pub avg_spread: f64,
    pub avg_strength: f64,
    /// Bar start, epoch milliseconds UTC, floor-aligned to the interval.
    pub timestamp: i64,
    pub is_closed: bool,
}

/// Averaged depth metrics attached to a closed candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AvgDepthMetrics {
    pub imbalance: f64,
    pub spread: f64,
    pub strength: f64,
    pub liquidity_score: f64,
}

impl Default for AvgDepthMetrics {
    /// Neutral defaults used when a bar closed without any ticks.
    fn default() -> Self {
        Self {
            imbalance: 1.0,
            spread: 0.0,
            strength: 0.0,
            liquidity_score: 0.0,
        }
    }
}

/// A candle close event published by the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedCandle {
    pub candle: Candle,
    pub metrics: AvgDepthMetrics,
}

/// A detected consolidation: the last few closes all sit within a tight
/// band around their mean. Broadcast to subscribers as a breakout
/// precursor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccumulationReport {
    pub security_id: String,
    pub interval: CandleInterval,
    /// Mean close of the consolidation window.
    pub mean_price: f64,
    /// Band half-width around the mean, percent.
    pub band_pct: f64,
    /// Candles in the window.
    pub candle_count: u32,
    /// Close instant of the bar that completed the window, epoch ms UTC.
    pub detected_at: i64,
}
