//! Shared strategy plumbing: the intraday window, depth filters, position
//! sizing and default stop/target levels.

use chrono::{FixedOffset, NaiveTime, TimeZone, Utc};

use crate::config::Config;
use crate::types::{AvgDepthMetrics, SignalSide};

/// Minimum average-imbalance for a BUY.
const BUY_IMBALANCE_MIN: f64 = 1.3;
/// Maximum average-imbalance for a SELL (1 / 1.3).
const SELL_IMBALANCE_MAX: f64 = 0.77;
/// Liquidity floor for any side.
const LIQUIDITY_MIN: f64 = 60.0;

/// A strategy's proposed trade before the shared gate fills in sizing and
/// default levels.
#[derive(Debug, Clone)]
pub struct SignalDraft {
    pub side: SignalSide,
    pub price: f64,
    /// Strategy-specific stop; `None` takes the configured default.
    pub stop_loss: Option<f64>,
    /// Strategy-specific target; `None` takes the configured default.
    pub target: Option<f64>,
    pub reason: String,
    pub quality_score: f64,
}

/// Configuration shared by every strategy and the engine gate.
#[derive(Debug, Clone)]
pub struct StrategyContext {
    pub total_capital: f64,
    pub risk_pct: f64,
    pub stop_loss_pct: f64,
    pub target_pct: f64,
    pub lot_size: u32,
    pub exchange_tz: FixedOffset,
    /// Intraday signal window start (exchange-local).
    pub window_start: NaiveTime,
    /// Intraday signal window end (exchange-local).
    pub window_end: NaiveTime,
}

impl StrategyContext {
    pub fn from_config(config: &Config) -> Self {
        Self {
            total_capital: config.total_capital,
            risk_pct: config.risk_pct,
            stop_loss_pct: config.stop_loss_pct,
            target_pct: config.target_pct,
            lot_size: config.lot_size,
            exchange_tz: config.exchange_tz,
            window_start: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            window_end: NaiveTime::from_hms_opt(15, 15, 0).unwrap(),
        }
    }

    /// Exchange-local wall-clock time of an epoch-ms instant.
    pub fn local_time(&self, epoch_ms: i64) -> NaiveTime {
        Utc.timestamp_millis_opt(epoch_ms)
            .single()
            .unwrap_or_default()
            .with_timezone(&self.exchange_tz)
            .time()
    }

    /// Whether an instant falls inside the intraday signal window.
    pub fn within_intraday_window(&self, epoch_ms: i64) -> bool {
        let t = self.local_time(epoch_ms);
        t >= self.window_start && t <= self.window_end
    }

    /// Lot-rounded position size for an entry price.
    ///
    /// Risk capital is `total_capital * risk_pct`; the raw unit count is
    /// floored to whole lots with a one-lot minimum, so index-sized prices
    /// trade a single lot until capital warrants more.
    pub fn position_size(&self, entry_price: f64) -> u32 {
        if entry_price <= 0.0 {
            return self.lot_size;
        }
        let risk = self.total_capital * self.risk_pct;
        let raw_units = risk / entry_price;
        let lots = ((raw_units / self.lot_size as f64).floor() as u32).max(1);
        lots * self.lot_size
    }

    /// Default stop/target around an entry, adverse side first.
    pub fn default_levels(&self, side: SignalSide, entry_price: f64) -> (f64, f64) {
        match side {
            SignalSide::Buy => (
                entry_price * (1.0 - self.stop_loss_pct),
                entry_price * (1.0 + self.target_pct),
            ),
            SignalSide::Sell => (
                entry_price * (1.0 + self.stop_loss_pct),
                entry_price * (1.0 - self.target_pct),
            ),
        }
    }
}

/// Depth filter applied to every draft. Returns the rejection reason when
/// the order book does not support the trade.
pub fn depth_filter(side: SignalSide, metrics: &AvgDepthMetrics) -> Result<(), &'static str> {
    if metrics.liquidity_score < LIQUIDITY_MIN {
        return Err("liquidity score below 60");
    }
    match side {
        SignalSide::Buy => {
            if metrics.imbalance < BUY_IMBALANCE_MIN {
                return Err("bid/ask imbalance below 1.3");
            }
            if metrics.strength <= 0.0 {
                return Err("order book strength not positive");
            }
        }
        SignalSide::Sell => {
            if metrics.imbalance > SELL_IMBALANCE_MAX {
                return Err("bid/ask imbalance above 0.77");
            }
            if metrics.strength >= 0.0 {
                return Err("order book strength not negative");
            }
        }
    }
    Ok(())
}
