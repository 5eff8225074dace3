use serde::{Deserialize, Serialize};
use std::fmt;

use super::SignalSide;

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn from_signal(side: SignalSide) -> Self {
        match side {
            SignalSide::Buy => PositionSide::Long,
            SignalSide::Sell => PositionSide::Short,
        }
    }

    /// +1 for long, -1 for short; multiplies price moves into PnL.
    pub fn sign(&self) -> f64 {
        match self {
            PositionSide::Long => 1.0,
            PositionSide::Short => -1.0,
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSide::Long => f.write_str("LONG"),
            PositionSide::Short => f.write_str("SHORT"),
        }
    }
}

/// Lifecycle state of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Closed,
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloseReason {
    Stop,
    Target,
    Eod,
    Manual,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloseReason::Stop => "stop",
            CloseReason::Target => "target",
            CloseReason::Eod => "eod",
            CloseReason::Manual => "manual",
        };
        f.write_str(s)
    }
}

/// Execution state of a paper order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Executed,
    Rejected,
}

/// A simulated order. Entry orders are one-to-one with an executed signal;
/// exits synthesize a second order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperOrder {
    pub id: String,
    pub signal_id: String,
    pub security_id: String,
    pub side: SignalSide,
    pub quantity: u32,
    pub requested_price: f64,
    pub fill_price: f64,
    pub status: OrderStatus,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filled_at: Option<i64>,
}

/// An open or closed paper position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub security_id: String,
    pub strategy_name: String,
    pub side: PositionSide,
    pub quantity: u32,
    pub entry_price: f64,
    pub current_price: f64,
    pub stop_loss: f64,
    pub target: f64,
    pub unrealized_pnl: f64,
    pub realized_pnl: f64,
    pub status: PositionStatus,
    pub opened_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<CloseReason>,
}

impl Position {
    /// Apply a new mark price and recompute unrealized PnL.
    pub fn mark(&mut self, price: f64) {
        self.current_price = price;
        self.unrealized_pnl = self.side.sign() * (price - self.entry_price) * self.quantity as f64;
    }

    /// Whether the stop level has been breached at `ltp`. Equality triggers.
    pub fn stop_hit(&self, ltp: f64) -> bool {
        match self.side {
            PositionSide::Long => ltp <= self.stop_loss,
            PositionSide::Short => ltp >= self.stop_loss,
        }
    }

    /// Whether the target level has been reached at `ltp`.
    pub fn target_hit(&self, ltp: f64) -> bool {
        match self.side {
            PositionSide::Long => ltp >= self.target,
            PositionSide::Short => ltp <= self.target,
        }
    }
}

/// Per-user virtual portfolio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub user_id: String,
    pub total_capital: f64,
    pub available_capital: f64,
    pub used_margin: f64,
    pub today_pnl: f64,
    pub total_pnl: f64,
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub win_rate: f64,
    pub max_daily_loss: f64,
    pub current_daily_loss: f64,
}

impl Portfolio {
    pub fn new(user_id: impl Into<String>, total_capital: f64, max_daily_loss: f64) -> Self {
        Self {
            user_id: user_id.into(),
            total_capital,
            available_capital: total_capital,
            used_margin: 0.0,
            today_pnl: 0.0,
            total_pnl: 0.0,
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate: 0.0,
            max_daily_loss,
            current_daily_loss: 0.0,
        }
    }

    /// Recompute the win rate from trade counters.
    pub fn recalculate_win_rate(&mut self) {
        self.win_rate = if self.total_trades > 0 {
            self.winning_trades as f64 / self.total_trades as f64
        } else {
            0.0
        };
    }

    /// Zero the per-day fields at the daily reset.
    pub fn daily_reset(&mut self) {
        self.today_pnl = 0.0;
        self.current_daily_loss = 0.0;
    }

    /// The accounting identity that must hold after every commit.
    pub fn accounting_balanced(&self) -> bool {
        let lhs = self.available_capital + self.used_margin;
        let rhs = self.total_capital + self.total_pnl;
        (lhs - rhs).abs() < 1e-6
    }
}

/// A point on the portfolio equity curve, persisted after every close.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: i64,
    pub equity: f64,
    pub today_pnl: f64,
    pub open_positions: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_position() -> Position {
        Position {
            id: "p1".into(),
            security_id: "13".into(),
            strategy_name: "test".into(),
            side: PositionSide::Long,
            quantity: 75,
            entry_price: 20_000.0,
            current_price: 20_000.0,
            stop_loss: 19_800.0,
            target: 20_600.0,
            unrealized_pnl: 0.0,
            realized_pnl: 0.0,
            status: PositionStatus::Open,
            opened_at: 0,
            closed_at: None,
            close_reason: None,
        }
    }

    #[test]
    fn mark_updates_unrealized_pnl() {
        let mut p = long_position();
        p.mark(20_100.0);
        assert_eq!(p.unrealized_pnl, 100.0 * 75.0);

        p.side = PositionSide::Short;
        p.mark(20_100.0);
        assert_eq!(p.unrealized_pnl, -100.0 * 75.0);
    }

    #[test]
    fn stop_triggers_on_equality() {
        let p = long_position();
        assert!(!p.stop_hit(19_800.01));
        assert!(p.stop_hit(19_800.0));
        assert!(p.stop_hit(19_750.0));
    }

    #[test]
    fn target_triggers_on_equality() {
        let p = long_position();
        assert!(!p.target_hit(20_599.99));
        assert!(p.target_hit(20_600.0));
    }

    #[test]
    fn fresh_portfolio_is_balanced() {
        let p = Portfolio::new("u1", 20_000.0, 600.0);
        assert!(p.accounting_balanced());
        assert_eq!(p.win_rate, 0.0);
    }
}
