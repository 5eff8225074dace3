//! One-way event bus connecting the pipeline components.
//!
//! Each topic is an independent `tokio::sync::broadcast` channel. Producers
//! never hold references to consumers; a lagging consumer loses old
//! messages rather than backpressuring the feed.

use tokio::sync::broadcast;

use crate::types::{
    AccumulationReport, Candle, ClosedCandle, ConnectionStatus, DepthAnalytics, EnrichedTick,
    MarketDepth, OptionChainAnalytics, Portfolio, Position, PrevClose, Signal,
};

const CHANNEL_CAPACITY: usize = 1024;

/// Broadcast channels for every internal topic.
#[derive(Clone)]
pub struct EngineEvents {
    pub ticks: broadcast::Sender<EnrichedTick>,
    pub depth: broadcast::Sender<MarketDepth>,
    pub depth_analytics: broadcast::Sender<DepthAnalytics>,
    pub candle_closes: broadcast::Sender<ClosedCandle>,
    pub candle_updates: broadcast::Sender<Candle>,
    pub signals: broadcast::Sender<Signal>,
    pub position_updates: broadcast::Sender<Position>,
    pub position_closes: broadcast::Sender<Position>,
    pub portfolio_updates: broadcast::Sender<Portfolio>,
    pub connection: broadcast::Sender<ConnectionStatus>,
    pub option_chain: broadcast::Sender<OptionChainAnalytics>,
    pub prev_closes: broadcast::Sender<(String, PrevClose)>,
    pub accumulation: broadcast::Sender<AccumulationReport>,
}

impl EngineEvents {
    pub fn new() -> Self {
        Self {
            ticks: broadcast::channel(CHANNEL_CAPACITY).0,
            depth: broadcast::channel(CHANNEL_CAPACITY).0,
            depth_analytics: broadcast::channel(CHANNEL_CAPACITY).0,
            candle_closes: broadcast::channel(CHANNEL_CAPACITY).0,
            candle_updates: broadcast::channel(CHANNEL_CAPACITY).0,
            signals: broadcast::channel(CHANNEL_CAPACITY).0,
            position_updates: broadcast::channel(CHANNEL_CAPACITY).0,
            position_closes: broadcast::channel(CHANNEL_CAPACITY).0,
            portfolio_updates: broadcast::channel(CHANNEL_CAPACITY).0,
            connection: broadcast::channel(16).0,
            option_chain: broadcast::channel(64).0,
            prev_closes: broadcast::channel(64).0,
            accumulation: broadcast::channel(64).0,
        }
    }
}

impl Default for EngineEvents {
    fn default() -> Self {
        Self::new()
    }
}
