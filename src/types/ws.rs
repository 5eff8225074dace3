use serde::{Deserialize, Serialize};

use super::{
    AccumulationReport, Candle, ClosedCandle, ConnectionStatus, EnrichedTick, FeedStats,
    Portfolio, Position, Signal, StrategyStatus, SubscriptionInstrument,
};

/// Hub topic a UI client can join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Ticks,
    Candles,
    Signals,
    Positions,
    Portfolio,
}

/// State a UI client can pull on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestResource {
    Portfolio,
    Positions,
    Strategies,
}

/// Incoming WebSocket message from a UI subscriber.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { topic: Topic },
    Unsubscribe { topic: Topic },
    Request { resource: RequestResource },
}

/// Initial snapshot sent to every subscriber on connect.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub feed_connected: bool,
    pub feed_state: String,
    pub feed_stats: FeedStats,
    pub subscribed_instruments: Vec<SubscriptionInstrument>,
    /// Open (building) candle count per interval.
    pub open_candles: usize,
    pub strategies: Vec<StrategyStatus>,
    pub execution_halted: bool,
    pub portfolio: Option<Portfolio>,
    pub open_positions: Vec<Position>,
}

/// Outgoing WebSocket message to a UI subscriber.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "status")]
    Status { data: StatusSnapshot },
    #[serde(rename = "tick")]
    Tick { data: EnrichedTick },
    #[serde(rename = "candle")]
    Candle { data: ClosedCandle },
    #[serde(rename = "candle:update")]
    CandleUpdate { data: Candle },
    #[serde(rename = "signal")]
    Signal { data: Signal },
    #[serde(rename = "strategies:status")]
    StrategiesStatus { data: Vec<StrategyStatus> },
    #[serde(rename = "position:update")]
    PositionUpdate { data: Position },
    #[serde(rename = "position:closed")]
    PositionClosed { data: Position },
    #[serde(rename = "positions:list")]
    PositionsList { data: Vec<Position> },
    #[serde(rename = "portfolio:update")]
    PortfolioUpdate { data: Portfolio },
    #[serde(rename = "accumulation:report")]
    AccumulationReport { data: AccumulationReport },
    #[serde(rename = "connection:status")]
    ConnectionStatus { data: ConnectionStatus },
    #[serde(rename = "error")]
    Error { error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_parses_subscribe() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe","topic":"ticks"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Subscribe { topic: Topic::Ticks }));
    }

    #[test]
    fn client_message_parses_request() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"request","resource":"portfolio"}"#).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::Request { resource: RequestResource::Portfolio }
        ));
    }

    #[test]
    fn server_message_uses_colon_tags() {
        let msg = ServerMessage::ConnectionStatus {
            data: ConnectionStatus {
                connected: true,
                subscribed_instruments: 1,
                reason: None,
            },
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"connection:status""#));
    }
}
