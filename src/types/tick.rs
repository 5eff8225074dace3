use serde::{Deserialize, Serialize};

/// A single price level in the order book.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: f64,
    pub quantity: u32,
    pub orders: u32,
}

/// Five-level depth carried on a Full quote packet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteDepth {
    /// Bid levels, best (highest price) first.
    pub bids: Vec<DepthLevel>,
    /// Ask levels, best (lowest price) first.
    pub asks: Vec<DepthLevel>,
}

/// Order-book metrics derived from a Full packet. Recomputed per tick and
/// averaged per candle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DepthMetrics {
    /// Total bid quantity over total ask quantity; 10.0 sentinel on an
    /// empty ask side.
    pub bid_ask_imbalance: f64,
    /// (best ask - best bid) / ltp, fractional.
    pub depth_spread: f64,
    /// Level-weighted bid minus ask quantity, weights 5..1.
    pub order_book_strength: f64,
    /// Rolling buy-minus-sell volume delta over the last 5 samples.
    pub volume_delta: f64,
    /// Bounded liquidity score in [0, 100].
    pub liquidity_score: f64,
}

/// An enriched market tick, created from every Full quote packet.
///
/// Quote packets (code 4) produce a tick without depth; Ticker packets
/// (code 2) produce a price-only tick with zeroed fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedTick {
    pub security_id: String,
    /// Last traded price.
    pub ltp: f64,
    /// Last traded quantity.
    pub ltq: i32,
    /// Last trade time, epoch seconds.
    pub ltt: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Average traded price for the session.
    pub atp: f64,
    /// Cumulative session volume.
    pub volume: i64,
    pub total_buy_qty: i64,
    pub total_sell_qty: i64,
    pub depth: QuoteDepth,
    pub depth_metrics: DepthMetrics,
    /// Capture instant, epoch milliseconds UTC.
    pub captured_at: i64,
}

/// Previous-close packet payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PrevClose {
    pub prev_close: f64,
    pub prev_open_interest: i32,
}

/// A 20-level order book assembled from the depth connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketDepth {
    pub security_id: String,
    /// Bid ladder, strictly price-descending, at most 20 levels.
    pub bids: Vec<DepthLevel>,
    /// Ask ladder, strictly price-ascending, at most 20 levels.
    pub asks: Vec<DepthLevel>,
    /// Capture instant, epoch milliseconds UTC.
    pub captured_at: i64,
}

/// Analytics derived from a 20-level book refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthAnalytics {
    pub security_id: String,
    pub total_bid_qty: u64,
    pub total_ask_qty: u64,
    /// Bid share of total resting quantity, percent.
    pub buy_absorption_pct: f64,
    /// Ask share of total resting quantity, percent.
    pub sell_absorption_pct: f64,
    /// Level with the largest resting bid quantity.
    pub strongest_bid: Option<DepthLevel>,
    /// Level with the largest resting ask quantity.
    pub strongest_ask: Option<DepthLevel>,
    pub captured_at: i64,
}

/// Option-chain sentiment, supplied by the external option-chain
/// collaborator. Optional input to the multi-confluence strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionChainAnalytics {
    pub security_id: String,
    pub sentiment: OptionSentiment,
    /// Conviction of the sentiment, percent.
    pub strength_pct: f64,
    /// Put/call ratio.
    pub pcr: f64,
    pub captured_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionSentiment {
    Bullish,
    Bearish,
    Neutral,
}

/// Feed connection status broadcast to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub subscribed_instruments: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Feed client counters, surfaced in the hub status snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FeedStats {
    pub packets: u64,
    pub malformed: u64,
    pub reconnects: u64,
    pub last_packet_at: i64,
}
