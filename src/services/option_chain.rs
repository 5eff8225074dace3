//! Option-chain sentiment input.
//!
//! The REST poller itself is an external collaborator; this adapter is the
//! seam it pushes through. It rate-limits per security and forwards onto
//! the engine bus, where the multi-confluence strategy caches the latest
//! reading. Absence of data never blocks a signal.

use dashmap::DashMap;

use crate::events::EngineEvents;
use crate::types::OptionChainAnalytics;

/// Poll cadence expected from the collaborator, seconds.
pub const POLL_CADENCE_SECS: u64 = 300;
/// Minimum spacing between accepted updates per security, milliseconds.
const MIN_UPDATE_SPACING_MS: i64 = 3_000;

pub struct OptionChainFeed {
    events: EngineEvents,
    last_accepted: DashMap<String, i64>,
}

impl OptionChainFeed {
    pub fn new(events: EngineEvents) -> Self {
        Self {
            events,
            last_accepted: DashMap::new(),
        }
    }

    /// Accept one analytics reading. Returns false when the reading was
    /// dropped by the per-security rate limit.
    pub fn publish(&self, analytics: OptionChainAnalytics) -> bool {
        let mut entry = self
            .last_accepted
            .entry(analytics.security_id.clone())
            .or_insert(i64::MIN);
        if analytics.captured_at - *entry < MIN_UPDATE_SPACING_MS {
            return false;
        }
        *entry = analytics.captured_at;
        drop(entry);
        let _ = self.events.option_chain.send(analytics);
        true
    }
}
