//! axum WebSocket endpoint for UI subscribers, plus the small REST
//! surface (`/health`, `/status`).

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::types::{ClientMessage, RequestResource, ServerMessage, Topic};
use crate::AppState;

use super::hub::SUBSCRIBER_QUEUE_CAPACITY;

/// Build the hub router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.status_snapshot().await;
    Json(serde_json::to_value(&snapshot).unwrap_or_default())
}

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let (tx, mut rx) = mpsc::channel::<String>(SUBSCRIBER_QUEUE_CAPACITY);
    let client_id = state.hub.register(tx);

    // Initial snapshot before anything else.
    let snapshot = state.status_snapshot().await;
    state
        .hub
        .send_to(client_id, &ServerMessage::Status { data: snapshot });

    // Forward queued messages to the socket.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                handle_message(&state, client_id, &text).await;
            }
            Ok(Message::Close(_)) => {
                debug!(%client_id, "subscriber closing");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!(%client_id, "subscriber socket error: {e}");
                break;
            }
        }
    }

    state.hub.unregister(client_id);
    send_task.abort();
    info!(%client_id, "subscriber session ended");
}

async fn handle_message(state: &AppState, client_id: Uuid, text: &str) {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            state.hub.send_to(
                client_id,
                &ServerMessage::Error {
                    error: format!("invalid message: {e}"),
                },
            );
            return;
        }
    };

    match msg {
        ClientMessage::Subscribe { topic } => {
            state.hub.subscribe(client_id, topic);
            debug!(%client_id, ?topic, "subscribed");
            // Prime the new topic with current state where it exists.
            match topic {
                Topic::Positions => send_positions(state, client_id),
                Topic::Portfolio => send_portfolio(state, client_id),
                _ => {}
            }
        }
        ClientMessage::Unsubscribe { topic } => {
            state.hub.unsubscribe(client_id, topic);
            debug!(%client_id, ?topic, "unsubscribed");
        }
        ClientMessage::Request { resource } => match resource {
            RequestResource::Portfolio => send_portfolio(state, client_id),
            RequestResource::Positions => send_positions(state, client_id),
            RequestResource::Strategies => {
                let strategies = state
                    .strategy_statuses
                    .iter()
                    .map(|s| s.value().clone())
                    .collect();
                state.hub.send_to(
                    client_id,
                    &ServerMessage::StrategiesStatus { data: strategies },
                );
            }
        },
    }
}

fn send_portfolio(state: &AppState, client_id: Uuid) {
    if let Some(portfolio) = state.executor.portfolio() {
        state
            .hub
            .send_to(client_id, &ServerMessage::PortfolioUpdate { data: portfolio });
    }
}

fn send_positions(state: &AppState, client_id: Uuid) {
    state.hub.send_to(
        client_id,
        &ServerMessage::PositionsList {
            data: state.executor.open_positions(),
        },
    );
}
