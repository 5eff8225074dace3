use serde::{Deserialize, Serialize};
use std::fmt;

use super::DepthMetrics;

/// Trade direction of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalSide {
    Buy,
    Sell,
}

impl fmt::Display for SignalSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalSide::Buy => f.write_str("BUY"),
            SignalSide::Sell => f.write_str("SELL"),
        }
    }
}

/// Signal lifecycle state. A signal is terminal as soon as the executor
/// decides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStatus {
    Pending,
    Executed,
    Rejected,
    Expired,
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalStatus::Pending => "pending",
            SignalStatus::Executed => "executed",
            SignalStatus::Rejected => "rejected",
            SignalStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// Why the executor refused a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RejectionReason {
    NoPortfolio,
    DailyLossLimit,
    InsufficientCapital,
    DuplicateOpenPosition,
    ExecutionHalted,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectionReason::NoPortfolio => "noPortfolio",
            RejectionReason::DailyLossLimit => "dailyLossLimit",
            RejectionReason::InsufficientCapital => "insufficientCapital",
            RejectionReason::DuplicateOpenPosition => "duplicateOpenPosition",
            RejectionReason::ExecutionHalted => "executionHalted",
        };
        f.write_str(s)
    }
}

/// A trade signal emitted by a strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub strategy_name: String,
    pub security_id: String,
    pub side: SignalSide,
    /// Reference price at signal time (last close).
    pub price: f64,
    pub stop_loss: f64,
    pub target: f64,
    pub quantity: u32,
    /// Human-readable trigger description.
    pub reason: String,
    /// Depth metrics at signal time.
    pub depth_snapshot: DepthMetrics,
    /// 0-100 confidence score assigned by the strategy.
    pub quality_score: f64,
    pub status: SignalStatus,
    /// Creation instant, epoch milliseconds UTC.
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<RejectionReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_price: Option<f64>,
}

impl Signal {
    pub fn new(
        strategy_name: impl Into<String>,
        security_id: impl Into<String>,
        side: SignalSide,
        price: f64,
        stop_loss: f64,
        target: f64,
        quantity: u32,
        reason: impl Into<String>,
        depth_snapshot: DepthMetrics,
        quality_score: f64,
        created_at: i64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            strategy_name: strategy_name.into(),
            security_id: security_id.into(),
            side,
            price,
            stop_loss,
            target,
            quantity,
            reason: reason.into(),
            depth_snapshot,
            quality_score,
            status: SignalStatus::Pending,
            created_at,
            decided_at: None,
            rejection_reason: None,
            fill_price: None,
        }
    }
}

/// Trend direction on a single timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrendDirection {
    Bullish,
    Bearish,
    Neutral,
}

/// Multi-timeframe trend recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrendRecommendation {
    Buy,
    Sell,
    Wait,
}

/// Result of the multi-timeframe confirmation check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeframeAlignment {
    pub primary: TrendDirection,
    pub mid: TrendDirection,
    pub higher: TrendDirection,
    pub is_aligned: bool,
    /// 0, 50, 75 or 100, plus a higher-timeframe bonus, capped at 100.
    pub alignment_score: u32,
    pub recommendation: TrendRecommendation,
}

/// Live status of a hosted strategy, reported to the hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyStatus {
    pub name: String,
    pub timeframe: super::CandleInterval,
    pub active: bool,
    pub signals_generated: u64,
    pub trades_today: u32,
    /// 0 means unlimited.
    pub max_trades_per_day: u32,
}
