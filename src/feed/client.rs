//! Vendor feed connection with reconnect, keepalive and subscription
//! management.
//!
//! One client instance owns one socket. The quote connection carries
//! Ticker/Quote/Full/PrevClose/OI packets; a second, optional client in
//! `FeedMode::Depth` carries the 20-level ladders. Parsed packets are
//! published on the engine bus in arrival order.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{watch, RwLock};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::FeedError;
use crate::events::EngineEvents;
use crate::services::depth::{analyze_book, DepthCalculator};
use crate::types::{
    ConnectionStatus, DepthLevel, FeedStats, MarketDepth, SubscriptionInstrument,
};

use super::control::ControlRequest;
use super::packet::{decode_frame, FeedPacket};

/// Which vendor connection this client drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedMode {
    /// Ticker/Quote/Full packets (RequestCode 15).
    Quote,
    /// 20-level depth ladders (RequestCode 23).
    Depth,
}

/// Feed connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedState {
    Disconnected,
    Connecting,
    Connected,
    Subscribed,
    Degraded,
    Closing,
}

#[derive(Default)]
struct StatsInner {
    packets: AtomicU64,
    malformed: AtomicU64,
    reconnects: AtomicU64,
    last_packet_at: AtomicI64,
}

enum SessionEnd {
    Shutdown,
    Closed(Option<String>),
}

pub type FeedHandle = Arc<FeedClient>;

pub struct FeedClient {
    config: Arc<Config>,
    events: EngineEvents,
    mode: FeedMode,
    calculator: Arc<DepthCalculator>,
    subscriptions: RwLock<Vec<SubscriptionInstrument>>,
    pending_subscribe: RwLock<Vec<SubscriptionInstrument>>,
    pending_unsubscribe: RwLock<Vec<SubscriptionInstrument>>,
    state: std::sync::Mutex<FeedState>,
    connected: AtomicBool,
    stats: StatsInner,
    shutdown: watch::Receiver<bool>,
    bid_books: DashMap<String, Vec<DepthLevel>>,
    ask_books: DashMap<String, Vec<DepthLevel>>,
}

impl FeedClient {
    pub fn new(
        config: Arc<Config>,
        events: EngineEvents,
        calculator: Arc<DepthCalculator>,
        mode: FeedMode,
        shutdown: watch::Receiver<bool>,
    ) -> FeedHandle {
        let subscriptions = config.subscription_set.clone();
        Arc::new(Self {
            config,
            events,
            mode,
            calculator,
            subscriptions: RwLock::new(subscriptions),
            pending_subscribe: RwLock::new(Vec::new()),
            pending_unsubscribe: RwLock::new(Vec::new()),
            state: std::sync::Mutex::new(FeedState::Disconnected),
            connected: AtomicBool::new(false),
            stats: StatsInner::default(),
            shutdown,
            bid_books: DashMap::new(),
            ask_books: DashMap::new(),
        })
    }

    /// Whether the socket is currently up.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Human-readable connection state, for logs and diagnostics.
    pub fn state_name(&self) -> &'static str {
        match *self.state.lock().unwrap() {
            FeedState::Disconnected => "disconnected",
            FeedState::Connecting => "connecting",
            FeedState::Connected => "connected",
            FeedState::Subscribed => "subscribed",
            FeedState::Degraded => "degraded",
            FeedState::Closing => "closing",
        }
    }

    /// Counter snapshot for the status endpoint.
    pub fn stats(&self) -> FeedStats {
        FeedStats {
            packets: self.stats.packets.load(Ordering::Relaxed),
            malformed: self.stats.malformed.load(Ordering::Relaxed),
            reconnects: self.stats.reconnects.load(Ordering::Relaxed),
            last_packet_at: self.stats.last_packet_at.load(Ordering::Relaxed),
        }
    }

    /// Current subscription set.
    pub async fn subscriptions(&self) -> Vec<SubscriptionInstrument> {
        self.subscriptions.read().await.clone()
    }

    /// Queue additional instruments for subscription. Duplicates are
    /// ignored so a resubscribe never inflates the set.
    pub async fn subscribe(&self, instruments: Vec<SubscriptionInstrument>) {
        let mut set = self.subscriptions.write().await;
        let mut pending = self.pending_subscribe.write().await;
        for instrument in instruments {
            if !set.contains(&instrument) {
                set.push(instrument.clone());
                pending.push(instrument);
            }
        }
    }

    /// Queue instruments for unsubscription.
    pub async fn unsubscribe(&self, instruments: Vec<SubscriptionInstrument>) {
        let mut set = self.subscriptions.write().await;
        let mut pending = self.pending_unsubscribe.write().await;
        for instrument in instruments {
            if let Some(pos) = set.iter().position(|i| i == &instrument) {
                set.remove(pos);
                pending.push(instrument);
            }
        }
    }

    fn set_state(&self, state: FeedState) {
        *self.state.lock().unwrap() = state;
    }

    fn feed_url(&self) -> String {
        let base = self.config.feed_endpoint.trim_end_matches('/');
        let path = match self.mode {
            FeedMode::Quote => String::new(),
            FeedMode::Depth => "/twentydepth".to_string(),
        };
        format!(
            "{base}{path}?version=2&token={}&clientId={}&authType=2",
            self.config.feed_token, self.config.feed_client_id
        )
    }

    fn emit_connection(&self, connected: bool, reason: Option<String>, subscribed: usize) {
        let _ = self.events.connection.send(ConnectionStatus {
            connected,
            subscribed_instruments: subscribed,
            reason,
        });
    }

    /// Drive the connection until shutdown or a fatal error.
    ///
    /// Transient closures reconnect with exponential backoff up to the
    /// configured attempt cap; auth-class server disconnects are terminal.
    pub async fn run(self: Arc<Self>) -> Result<(), FeedError> {
        let mut attempt: u32 = 0;
        loop {
            if *self.shutdown.borrow() {
                self.set_state(FeedState::Disconnected);
                return Ok(());
            }

            self.set_state(FeedState::Connecting);
            let end = self.run_connection(&mut attempt).await;
            self.connected.store(false, Ordering::Relaxed);

            match end {
                Ok(SessionEnd::Shutdown) => {
                    self.set_state(FeedState::Disconnected);
                    return Ok(());
                }
                Ok(SessionEnd::Closed(reason)) => {
                    self.set_state(FeedState::Degraded);
                    let subscribed = self.subscriptions.read().await.len();
                    self.emit_connection(false, reason.clone(), subscribed);
                    warn!(
                        mode = ?self.mode,
                        reason = reason.as_deref().unwrap_or("connection closed"),
                        "feed disconnected, scheduling reconnect"
                    );
                }
                Err(err) if err.is_fatal() => {
                    self.set_state(FeedState::Disconnected);
                    let subscribed = self.subscriptions.read().await.len();
                    self.emit_connection(false, Some(err.to_string()), subscribed);
                    error!(mode = ?self.mode, "fatal feed error: {err}");
                    return Err(err);
                }
                Err(err) => {
                    self.set_state(FeedState::Degraded);
                    let subscribed = self.subscriptions.read().await.len();
                    self.emit_connection(false, Some(err.to_string()), subscribed);
                    warn!(mode = ?self.mode, "feed error: {err}, scheduling reconnect");
                }
            }

            attempt += 1;
            if attempt > self.config.reconnect_max_attempts {
                error!(
                    mode = ?self.mode,
                    attempts = attempt - 1,
                    "feed unavailable, giving up"
                );
                return Err(FeedError::Unavailable { attempts: attempt - 1 });
            }

            self.stats.reconnects.fetch_add(1, Ordering::Relaxed);
            let delay_ms = self
                .config
                .reconnect_initial_delay_ms
                .saturating_mul(1u64 << (attempt - 1).min(6));
            info!(mode = ?self.mode, attempt, delay_ms, "reconnecting");

            let mut shutdown = self.shutdown.clone();
            tokio::select! {
                _ = tokio::time::sleep(std::time::Duration::from_millis(delay_ms)) => {}
                _ = shutdown.changed() => {
                    self.set_state(FeedState::Disconnected);
                    return Ok(());
                }
            }
        }
    }

    async fn run_connection(&self, attempt: &mut u32) -> Result<SessionEnd, FeedError> {
        let url = self.feed_url();
        info!(mode = ?self.mode, "connecting to feed");
        let (ws_stream, _) = connect_async(&url).await?;
        let (mut write, mut read) = ws_stream.split();

        self.set_state(FeedState::Connected);
        self.connected.store(true, Ordering::Relaxed);
        *attempt = 0;

        // Resubscribe the full set on every (re)connect.
        let instruments = self.subscriptions.read().await.clone();
        for frame in self.subscription_frames(&instruments)? {
            write.send(Message::Text(frame)).await?;
        }
        self.set_state(FeedState::Subscribed);
        self.emit_connection(true, None, instruments.len());
        info!(mode = ?self.mode, instruments = instruments.len(), "feed subscribed");

        let mut keepalive = tokio::time::interval(std::time::Duration::from_secs(
            self.config.keepalive_interval_secs,
        ));
        keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut control_tick = tokio::time::interval(std::time::Duration::from_millis(500));
        let mut shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Binary(data))) => {
                            if let Some(reason) = self.handle_frame(&data) {
                                if reason.is_auth_failure() {
                                    return Err(FeedError::ServerDisconnect(reason));
                                }
                                return Ok(SessionEnd::Closed(Some(reason.to_string())));
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let reason = frame.map(|f| f.reason.to_string());
                            return Ok(SessionEnd::Closed(reason));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(SessionEnd::Closed(None)),
                    }
                }
                _ = keepalive.tick() => {
                    // Vendor drops sessions silent for 40 s.
                    if write.send(Message::Ping(Vec::new())).await.is_err() {
                        return Ok(SessionEnd::Closed(Some("ping failed".into())));
                    }
                }
                _ = control_tick.tick() => {
                    self.flush_pending(&mut write).await?;
                }
                _ = shutdown.changed() => {
                    self.set_state(FeedState::Closing);
                    let instruments = self.subscriptions.read().await.clone();
                    if !instruments.is_empty() {
                        for frame in ControlRequest::unsubscribe(&instruments)? {
                            let _ = write.send(Message::Text(frame)).await;
                        }
                    }
                    let _ = write.send(Message::Close(None)).await;
                    info!(mode = ?self.mode, "feed closed on shutdown");
                    return Ok(SessionEnd::Shutdown);
                }
            }
        }
    }

    fn subscription_frames(
        &self,
        instruments: &[SubscriptionInstrument],
    ) -> Result<Vec<String>, FeedError> {
        if instruments.is_empty() {
            return Ok(Vec::new());
        }
        match self.mode {
            FeedMode::Quote => ControlRequest::subscribe_full(instruments),
            FeedMode::Depth => ControlRequest::subscribe_depth(instruments),
        }
    }

    async fn flush_pending<S>(&self, write: &mut S) -> Result<(), FeedError>
    where
        S: SinkExt<Message> + Unpin,
    {
        let to_subscribe: Vec<_> = self.pending_subscribe.write().await.drain(..).collect();
        if !to_subscribe.is_empty() {
            for frame in self.subscription_frames(&to_subscribe)? {
                if write.send(Message::Text(frame)).await.is_err() {
                    return Ok(());
                }
            }
        }
        let to_unsubscribe: Vec<_> = self.pending_unsubscribe.write().await.drain(..).collect();
        if !to_unsubscribe.is_empty() {
            for frame in ControlRequest::unsubscribe(&to_unsubscribe)? {
                if write.send(Message::Text(frame)).await.is_err() {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Decode and dispatch every packet in a frame. Returns a disconnect
    /// reason if the server terminated the session.
    pub fn handle_frame(&self, data: &[u8]) -> Option<super::packet::DisconnectReason> {
        self.handle_frame_at(data, chrono::Utc::now().timestamp_millis())
    }

    /// Frame dispatch with an explicit capture instant; replay mode feeds
    /// recorded timestamps through here for deterministic runs.
    pub fn handle_frame_at(
        &self,
        data: &[u8],
        now: i64,
    ) -> Option<super::packet::DisconnectReason> {
        let (packets, malformed) = decode_frame(data, now);
        if malformed > 0 {
            self.stats.malformed.fetch_add(malformed, Ordering::Relaxed);
            debug!(malformed, "dropped malformed feed data");
        }
        for packet in packets {
            self.stats.packets.fetch_add(1, Ordering::Relaxed);
            self.stats.last_packet_at.store(now, Ordering::Relaxed);
            if let Some(reason) = self.handle_packet(packet) {
                return Some(reason);
            }
        }
        None
    }

    fn handle_packet(&self, packet: FeedPacket) -> Option<super::packet::DisconnectReason> {
        match packet {
            FeedPacket::Full(mut tick) => {
                tick.depth_metrics = self.calculator.compute(&tick);
                let _ = self.events.ticks.send(tick);
            }
            FeedPacket::Quote(mut tick) => {
                tick.depth_metrics = self.calculator.compute(&tick);
                let _ = self.events.ticks.send(tick);
            }
            FeedPacket::Ticker(tick) => {
                // Price-only: no totals, keep zeroed metrics.
                let _ = self.events.ticks.send(tick);
            }
            FeedPacket::PrevClose { security_id, data } => {
                let _ = self.events.prev_closes.send((security_id, data));
            }
            FeedPacket::OpenInterest { security_id, oi } => {
                debug!(security_id = %security_id, oi, "open interest update");
            }
            FeedPacket::BidDepth { security_id, levels } => {
                if ladder_sorted(&levels, false) {
                    self.bid_books.insert(security_id.clone(), levels);
                    self.publish_depth(&security_id);
                } else {
                    self.stats.malformed.fetch_add(1, Ordering::Relaxed);
                }
            }
            FeedPacket::AskDepth { security_id, levels } => {
                if ladder_sorted(&levels, true) {
                    self.ask_books.insert(security_id.clone(), levels);
                    self.publish_depth(&security_id);
                } else {
                    self.stats.malformed.fetch_add(1, Ordering::Relaxed);
                }
            }
            FeedPacket::Disconnect(reason) => {
                warn!("server disconnect: {reason}");
                return Some(reason);
            }
        }
        None
    }

    fn publish_depth(&self, security_id: &str) {
        let bids = match self.bid_books.get(security_id) {
            Some(levels) => levels.clone(),
            None => return,
        };
        let asks = match self.ask_books.get(security_id) {
            Some(levels) => levels.clone(),
            None => return,
        };
        let depth = MarketDepth {
            security_id: security_id.to_string(),
            bids,
            asks,
            captured_at: chrono::Utc::now().timestamp_millis(),
        };
        let analytics = analyze_book(&depth);
        let _ = self.events.depth.send(depth);
        let _ = self.events.depth_analytics.send(analytics);
    }
}

/// Bid ladders must be strictly price-descending, ask ladders strictly
/// ascending.
fn ladder_sorted(levels: &[DepthLevel], ascending: bool) -> bool {
    levels.windows(2).all(|w| {
        if ascending {
            w[0].price < w[1].price
        } else {
            w[0].price > w[1].price
        }
    })
}
