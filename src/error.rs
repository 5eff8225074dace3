use thiserror::Error;

use crate::feed::DisconnectReason;

/// Errors raised by the vendor feed client.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("WebSocket error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("feed unavailable after {attempts} reconnect attempts")]
    Unavailable { attempts: u32 },

    #[error("server terminated session: {0}")]
    ServerDisconnect(DisconnectReason),

    #[error("subscription limit exceeded: {requested} instruments (max {max})")]
    SubscriptionLimit { requested: usize, max: usize },

    #[error("control message encoding failed: {0}")]
    Control(#[from] serde_json::Error),
}

impl FeedError {
    /// Auth-class failures are terminal: the client must not reconnect.
    pub fn is_fatal(&self) -> bool {
        match self {
            FeedError::ServerDisconnect(reason) => reason.is_auth_failure(),
            FeedError::SubscriptionLimit { .. } => true,
            _ => false,
        }
    }
}

/// Errors raised by the persistence adapters.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),
}

/// Top-level application error.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
