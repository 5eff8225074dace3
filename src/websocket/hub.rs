//! Topic-based subscriber hub.
//!
//! Each UI subscriber owns a bounded outbound queue. Broadcast never
//! blocks: a queue at its high-water mark gets the subscriber dropped,
//! never the pipeline stalled.

use std::collections::HashSet;
use std::sync::RwLock;

use dashmap::DashMap;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use uuid::Uuid;

use crate::events::EngineEvents;
use crate::types::{ServerMessage, Topic};

/// Outbound queue high-water mark per subscriber.
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 1000;

pub struct SubscriberSession {
    topics: RwLock<HashSet<Topic>>,
    tx: mpsc::Sender<String>,
}

pub struct Hub {
    clients: DashMap<Uuid, SubscriberSession>,
}

impl Hub {
    pub fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            clients: DashMap::new(),
        })
    }

    /// Register a subscriber; the returned id keys all later calls.
    pub fn register(&self, tx: mpsc::Sender<String>) -> Uuid {
        let client_id = Uuid::new_v4();
        self.clients.insert(
            client_id,
            SubscriberSession {
                topics: RwLock::new(HashSet::new()),
                tx,
            },
        );
        info!(%client_id, "subscriber connected");
        client_id
    }

    pub fn unregister(&self, client_id: Uuid) {
        if self.clients.remove(&client_id).is_some() {
            info!(%client_id, "subscriber disconnected");
        }
    }

    pub fn subscribe(&self, client_id: Uuid, topic: Topic) -> bool {
        match self.clients.get(&client_id) {
            Some(client) => {
                client.topics.write().unwrap().insert(topic);
                true
            }
            None => false,
        }
    }

    pub fn unsubscribe(&self, client_id: Uuid, topic: Topic) -> bool {
        match self.clients.get(&client_id) {
            Some(client) => client.topics.write().unwrap().remove(&topic),
            None => false,
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Send one message to one subscriber; drops them when their queue is
    /// full.
    pub fn send_to(&self, client_id: Uuid, message: &ServerMessage) {
        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(e) => {
                warn!("message serialization failed: {e}");
                return;
            }
        };
        if let Some(client) = self.clients.get(&client_id) {
            if let Err(mpsc::error::TrySendError::Full(_)) = client.tx.try_send(json) {
                drop(client);
                warn!(%client_id, "subscriber queue full, dropping");
                self.unregister(client_id);
            }
        }
    }

    /// Fan one message out to a topic. Slow or dead subscribers are
    /// removed along the way.
    pub fn broadcast(&self, topic: Topic, message: &ServerMessage) {
        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(e) => {
                warn!("message serialization failed: {e}");
                return;
            }
        };
        self.dispatch(|session| session.topics.read().unwrap().contains(&topic), &json);
    }

    /// Fan a message out to every connected subscriber.
    pub fn broadcast_all(&self, message: &ServerMessage) {
        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(e) => {
                warn!("message serialization failed: {e}");
                return;
            }
        };
        self.dispatch(|_| true, &json);
    }

    fn dispatch<F: Fn(&SubscriberSession) -> bool>(&self, want: F, json: &str) {
        let mut to_drop = Vec::new();
        for client in self.clients.iter() {
            if !want(client.value()) {
                continue;
            }
            match client.tx.try_send(json.to_string()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(client_id = %client.key(), "subscriber queue full, dropping");
                    to_drop.push(*client.key());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    to_drop.push(*client.key());
                }
            }
        }
        for client_id in to_drop {
            self.unregister(client_id);
        }
    }
}

/// Hub fan-out task: maps bus events onto subscriber topics.
pub async fn run_fanout(
    hub: std::sync::Arc<Hub>,
    events: EngineEvents,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticks = events.ticks.subscribe();
    let mut candle_closes = events.candle_closes.subscribe();
    let mut candle_updates = events.candle_updates.subscribe();
    let mut signals = events.signals.subscribe();
    let mut position_updates = events.position_updates.subscribe();
    let mut position_closes = events.position_closes.subscribe();
    let mut portfolio_updates = events.portfolio_updates.subscribe();
    let mut connection = events.connection.subscribe();
    let mut accumulation = events.accumulation.subscribe();

    loop {
        tokio::select! {
            event = ticks.recv() => {
                if let Ok(tick) = event {
                    hub.broadcast(Topic::Ticks, &ServerMessage::Tick { data: tick });
                }
            }
            event = candle_closes.recv() => {
                if let Ok(closed) = event {
                    hub.broadcast(Topic::Candles, &ServerMessage::Candle { data: closed });
                }
            }
            event = candle_updates.recv() => {
                if let Ok(candle) = event {
                    hub.broadcast(Topic::Candles, &ServerMessage::CandleUpdate { data: candle });
                }
            }
            event = signals.recv() => {
                if let Ok(signal) = event {
                    hub.broadcast(Topic::Signals, &ServerMessage::Signal { data: signal });
                }
            }
            event = position_updates.recv() => {
                if let Ok(position) = event {
                    hub.broadcast(Topic::Positions, &ServerMessage::PositionUpdate { data: position });
                }
            }
            event = position_closes.recv() => {
                if let Ok(position) = event {
                    hub.broadcast(Topic::Positions, &ServerMessage::PositionClosed { data: position });
                }
            }
            event = portfolio_updates.recv() => {
                if let Ok(portfolio) = event {
                    hub.broadcast(Topic::Portfolio, &ServerMessage::PortfolioUpdate { data: portfolio });
                }
            }
            event = connection.recv() => {
                if let Ok(status) = event {
                    hub.broadcast_all(&ServerMessage::ConnectionStatus { data: status });
                }
            }
            event = accumulation.recv() => {
                if let Ok(report) = event {
                    hub.broadcast(Topic::Signals, &ServerMessage::AccumulationReport { data: report });
                }
            }
            _ = shutdown.changed() => break,
        }
    }

    // Drain: let subscriber tasks observe channel closure.
    info!("hub fan-out stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConnectionStatus;

    fn status_message() -> ServerMessage {
        ServerMessage::ConnectionStatus {
            data: ConnectionStatus {
                connected: true,
                subscribed_instruments: 1,
                reason: None,
            },
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_only_topic_subscribers() {
        let hub = Hub::new();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let a = hub.register(tx_a);
        let _b = hub.register(tx_b);

        hub.subscribe(a, Topic::Portfolio);
        hub.broadcast(
            Topic::Portfolio,
            &ServerMessage::PortfolioUpdate {
                data: crate::types::Portfolio::new("paper", 20_000.0, 600.0),
            },
        );

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_drops_subscriber() {
        let hub = Hub::new();
        let (tx, _rx) = mpsc::channel(2);
        let id = hub.register(tx);
        hub.subscribe(id, Topic::Ticks);

        // Fill the queue, then overflow it.
        for _ in 0..3 {
            hub.broadcast_all(&status_message());
        }
        assert_eq!(hub.client_count(), 0);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let hub = Hub::new();
        let (tx, mut rx) = mpsc::channel(8);
        let id = hub.register(tx);

        hub.subscribe(id, Topic::Ticks);
        hub.unsubscribe(id, Topic::Ticks);
        hub.broadcast(Topic::Ticks, &status_message());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let hub = Hub::new();
        let (tx, _rx) = mpsc::channel(8);
        let id = hub.register(tx);
        hub.unregister(id);
        hub.unregister(id);
        assert_eq!(hub.client_count(), 0);
    }
}
