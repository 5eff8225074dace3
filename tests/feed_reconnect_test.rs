//! Feed client behavior against a local WebSocket server: reconnect with
//! resubscription, and terminal auth-class disconnects.

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use common::test_config;
use paperbull::error::FeedError;
use paperbull::events::EngineEvents;
use paperbull::feed::{FeedClient, FeedMode};
use paperbull::services::DepthCalculator;

/// Code-50 disconnection packet with the given reason code.
fn disconnect_packet(code: u16) -> Vec<u8> {
    let mut buf = vec![50u8];
    buf.extend_from_slice(&10u16.to_le_bytes());
    buf.push(0);
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.extend_from_slice(&code.to_le_bytes());
    buf
}

fn client_for(
    endpoint: String,
    events: EngineEvents,
) -> (Arc<FeedClient>, watch::Sender<bool>) {
    let mut config = (*test_config()).clone();
    config.feed_endpoint = endpoint;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let client = FeedClient::new(
        Arc::new(config),
        events,
        Arc::new(DepthCalculator::new()),
        FeedMode::Quote,
        shutdown_rx,
    );
    (client, shutdown_tx)
}

#[tokio::test]
async fn reconnect_resends_the_identical_subscription() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // Accept two sessions; capture the first text frame of each, then
    // drop the connection.
    let server = tokio::spawn(async move {
        let mut frames = Vec::new();
        for _ in 0..2 {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Text(text) = msg {
                    frames.push(text);
                    break;
                }
            }
            let _ = ws.close(None).await;
        }
        frames
    });

    let events = EngineEvents::new();
    let mut connection_rx = events.connection.subscribe();
    let (client, _shutdown_tx) = client_for(format!("ws://{addr}"), events.clone());
    let client_task = tokio::spawn(client.clone().run());

    let frames = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server timed out")
        .unwrap();

    // Same control frame both times, no duplicate instruments.
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0], frames[1]);
    let parsed: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
    assert_eq!(parsed["RequestCode"], 15);
    assert_eq!(parsed["InstrumentCount"], 1);
    assert_eq!(parsed["InstrumentList"][0]["SecurityId"], "13");
    assert_eq!(client.subscriptions().await.len(), 1);

    // connected -> disconnected -> connected again.
    let mut observed = Vec::new();
    for _ in 0..3 {
        let status = tokio::time::timeout(Duration::from_secs(2), connection_rx.recv())
            .await
            .expect("missing connection event")
            .unwrap();
        observed.push(status.connected);
    }
    assert_eq!(observed, vec![true, false, true]);

    client_task.abort();
}

#[tokio::test]
async fn auth_disconnect_is_terminal() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        // Swallow the subscription, then terminate with "token expired".
        let _ = ws.next().await;
        let _ = ws.send(Message::Binary(disconnect_packet(807))).await;
        // Keep the socket open so only packet 50 ends the session.
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let events = EngineEvents::new();
    let (client, _shutdown_tx) = client_for(format!("ws://{addr}"), events);
    let result = tokio::time::timeout(Duration::from_secs(5), client.run())
        .await
        .expect("client timed out");

    match result {
        Err(FeedError::ServerDisconnect(reason)) => assert!(reason.is_auth_failure()),
        other => panic!("expected terminal auth error, got {other:?}"),
    }
    server.abort();
}

#[tokio::test]
async fn shutdown_sends_unsubscribe_and_close() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let mut frames = Vec::new();
        while let Some(Ok(msg)) = ws.next().await {
            match msg {
                Message::Text(text) => frames.push(text),
                Message::Close(_) => break,
                _ => {}
            }
        }
        frames
    });

    let events = EngineEvents::new();
    let (client, shutdown_tx) = client_for(format!("ws://{addr}"), events);
    let client_task = tokio::spawn(client.clone().run());

    // Give the client a moment to connect and subscribe, then shut down.
    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown_tx.send(true).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), client_task)
        .await
        .expect("client did not unwind")
        .unwrap();
    assert!(result.is_ok());

    let frames = tokio::time::timeout(Duration::from_secs(2), server)
        .await
        .expect("server timed out")
        .unwrap();
    // Subscribe first, unsubscribe last.
    assert!(frames.len() >= 2);
    let first: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
    let last: serde_json::Value = serde_json::from_str(frames.last().unwrap()).unwrap();
    assert_eq!(first["RequestCode"], 15);
    assert_eq!(last["RequestCode"], 12);
}
