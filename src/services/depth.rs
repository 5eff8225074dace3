//! Order-book metrics derived from quote depth.
//!
//! Pure computation apart from the per-security volume-delta ring. The
//! numeric thresholds here are contract values consumed by the strategy
//! filters; depth math never errors, it falls back to sentinels.

use std::collections::VecDeque;

use dashmap::DashMap;

use crate::types::{DepthAnalytics, DepthLevel, DepthMetrics, EnrichedTick, MarketDepth};

/// Sentinel imbalance when the ask side is empty (extreme buy pressure).
const EMPTY_ASK_IMBALANCE: f64 = 10.0;
/// Level weights for order-book strength, best level first.
const STRENGTH_WEIGHTS: [f64; 5] = [5.0, 4.0, 3.0, 2.0, 1.0];
/// Samples kept per security for the rolling volume delta.
const VOLUME_RING_LEN: usize = 5;

/// Computes depth metrics per tick, keeping a bounded ring of cumulative
/// buy/sell totals per security for the rolling volume delta.
pub struct DepthCalculator {
    volume_rings: DashMap<String, VecDeque<(i64, i64)>>,
}

impl DepthCalculator {
    pub fn new() -> Self {
        Self {
            volume_rings: DashMap::new(),
        }
    }

    /// Compute metrics for a tick and record its buy/sell totals.
    pub fn compute(&self, tick: &EnrichedTick) -> DepthMetrics {
        let volume_delta = self.roll_volume(
            &tick.security_id,
            tick.total_buy_qty,
            tick.total_sell_qty,
        );

        let bids = &tick.depth.bids;
        let asks = &tick.depth.asks;

        let sum_bid: u64 = bids.iter().map(|l| l.quantity as u64).sum();
        let sum_ask: u64 = asks.iter().map(|l| l.quantity as u64).sum();

        let bid_ask_imbalance = if sum_bid == 0 {
            0.0
        } else if sum_ask == 0 {
            EMPTY_ASK_IMBALANCE
        } else {
            sum_bid as f64 / sum_ask as f64
        };

        let depth_spread = match (bids.first(), asks.first()) {
            (Some(best_bid), Some(best_ask)) if tick.ltp > 0.0 => {
                (best_ask.price - best_bid.price) / tick.ltp
            }
            _ => 0.0,
        };

        let order_book_strength = STRENGTH_WEIGHTS
            .iter()
            .enumerate()
            .map(|(i, w)| {
                let bid = bids.get(i).map_or(0.0, |l| l.quantity as f64);
                let ask = asks.get(i).map_or(0.0, |l| l.quantity as f64);
                w * (bid - ask)
            })
            .sum();

        let liquidity_score = liquidity_score(depth_spread, sum_bid + sum_ask, bids, asks);

        DepthMetrics {
            bid_ask_imbalance,
            depth_spread,
            order_book_strength,
            volume_delta,
            liquidity_score,
        }
    }

    fn roll_volume(&self, security_id: &str, buy: i64, sell: i64) -> f64 {
        let mut ring = self
            .volume_rings
            .entry(security_id.to_string())
            .or_insert_with(VecDeque::new);
        ring.push_back((buy, sell));
        while ring.len() > VOLUME_RING_LEN {
            ring.pop_front();
        }
        if ring.len() < 2 {
            return 0.0;
        }
        let (old_buy, old_sell) = *ring.front().unwrap();
        ((buy - old_buy) - (sell - old_sell)) as f64
    }
}

impl Default for DepthCalculator {
    fn default() -> Self {
        Self::new()
    }
}

fn liquidity_score(spread: f64, total_qty: u64, bids: &[DepthLevel], asks: &[DepthLevel]) -> f64 {
    let mut score: f64 = 100.0;

    // Fractional spread tiers: 0.15%, 0.10%, 0.05%.
    if spread > 0.0015 {
        score -= 30.0;
    } else if spread > 0.0010 {
        score -= 20.0;
    } else if spread > 0.0005 {
        score -= 10.0;
    }

    if total_qty < 10_000 {
        score -= 25.0;
    } else if total_qty < 50_000 {
        score -= 10.0;
    }

    let level_count = bids.len() + asks.len();
    if level_count > 0 {
        let total_orders: u64 = bids
            .iter()
            .chain(asks.iter())
            .map(|l| l.orders as u64)
            .sum();
        let avg_orders = total_orders as f64 / level_count as f64;
        if avg_orders < 10.0 {
            score -= 15.0;
        } else if avg_orders < 20.0 {
            score -= 5.0;
        }
    }

    score.clamp(0.0, 100.0)
}

/// Derive analytics from a 20-level book refresh.
pub fn analyze_book(depth: &MarketDepth) -> DepthAnalytics {
    let total_bid_qty: u64 = depth.bids.iter().map(|l| l.quantity as u64).sum();
    let total_ask_qty: u64 = depth.asks.iter().map(|l| l.quantity as u64).sum();
    let total = total_bid_qty + total_ask_qty;

    let (buy_absorption_pct, sell_absorption_pct) = if total > 0 {
        (
            total_bid_qty as f64 / total as f64 * 100.0,
            total_ask_qty as f64 / total as f64 * 100.0,
        )
    } else {
        (0.0, 0.0)
    };

    let strongest = |levels: &[DepthLevel]| {
        levels
            .iter()
            .max_by_key(|l| l.quantity)
            .copied()
    };

    DepthAnalytics {
        security_id: depth.security_id.clone(),
        total_bid_qty,
        total_ask_qty,
        buy_absorption_pct,
        sell_absorption_pct,
        strongest_bid: strongest(&depth.bids),
        strongest_ask: strongest(&depth.asks),
        captured_at: depth.captured_at,
    }
}
