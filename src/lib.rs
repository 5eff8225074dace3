//! paperbull - real-time paper-trading engine for an Indian equity-index
//! market feed.

pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod feed;
pub mod services;
pub mod types;
pub mod websocket;

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::Config;
use crate::events::EngineEvents;
use crate::feed::FeedHandle;
use crate::services::{CandleAggregator, PaperExecutor, SqliteStore};
use crate::types::{StatusSnapshot, StrategyStatus};
use crate::websocket::Hub;

pub use error::{AppError, Result};

/// Application state shared across hub handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub events: EngineEvents,
    pub hub: Arc<Hub>,
    pub feed: Option<FeedHandle>,
    pub aggregator: Arc<CandleAggregator>,
    pub executor: Arc<PaperExecutor>,
    pub strategy_statuses: Arc<DashMap<String, StrategyStatus>>,
    pub sqlite: Option<Arc<SqliteStore>>,
}

impl AppState {
    /// Assemble the status snapshot sent to every subscriber on connect
    /// and served on `GET /status`.
    pub async fn status_snapshot(&self) -> StatusSnapshot {
        let (feed_connected, feed_state, feed_stats, subscribed_instruments) = match &self.feed {
            Some(feed) => (
                feed.is_connected(),
                feed.state_name().to_string(),
                feed.stats(),
                feed.subscriptions().await,
            ),
            None => (
                false,
                "disconnected".to_string(),
                Default::default(),
                self.config.subscription_set.clone(),
            ),
        };
        StatusSnapshot {
            feed_connected,
            feed_state,
            feed_stats,
            subscribed_instruments,
            open_candles: self.aggregator.open_candle_count(),
            strategies: self
                .strategy_statuses
                .iter()
                .map(|s| s.value().clone())
                .collect(),
            execution_halted: self.executor.is_halted(),
            portfolio: self.executor.portfolio(),
            open_positions: self.executor.open_positions(),
        }
    }
}
