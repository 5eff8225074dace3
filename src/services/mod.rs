//! Core pipeline services.

pub mod candles;
pub mod depth;
pub mod executor;
pub mod indicators;
pub mod option_chain;
pub mod redis_store;
pub mod scheduler;
pub mod sqlite_store;
pub mod strategies;
pub mod timeframes;

pub use candles::CandleAggregator;
pub use depth::DepthCalculator;
pub use executor::PaperExecutor;
pub use option_chain::OptionChainFeed;
pub use redis_store::RedisStore;
pub use scheduler::Scheduler;
pub use sqlite_store::SqliteStore;
pub use strategies::{Strategy, StrategyEngine};
pub use timeframes::TimeframeConfirmer;
