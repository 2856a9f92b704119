//! Binance Feed Integration Tests
//!
//! Runs the connector against a local WebSocket server standing in for the
//! exchange.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pairs_engine::application::ports::{FeedConnector, TickDecoder};
use pairs_engine::infrastructure::binance::{
    BinanceConnector, BinanceConnectorConfig, BinanceTradeCodec, HeartbeatConfig,
};
use pairs_engine::ConnectionError;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

const TRADE: &str =
    r#"{"e":"trade","E":1700000000123,"s":"BTCUSDT","t":1,"p":"37000.10","q":"0.005","T":1700000000120,"m":true}"#;

/// Accept one client and hand its socket to `script`.
async fn serve_once<F, Fut>(script: F) -> SocketAddr
where
    F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        script(ws).await;
    });
    addr
}

fn connector(addr: SocketAddr, heartbeat: HeartbeatConfig) -> BinanceConnector {
    BinanceConnector::new(BinanceConnectorConfig {
        base_url: format!("ws://{addr}/ws"),
        heartbeat,
    })
}

#[tokio::test]
async fn yields_data_frames_and_reports_close() {
    let addr = serve_once(|mut ws| async move {
        ws.send(Message::text(TRADE)).await.unwrap();
        ws.send(Message::Ping(b"hi".to_vec().into())).await.unwrap();
        ws.send(Message::text(r#"{"result":null,"id":1}"#)).await.unwrap();
        ws.close(None).await.unwrap();
        // Drain until the client finishes the close handshake.
        while ws.next().await.is_some() {}
    })
    .await;

    let mut session = connector(addr, HeartbeatConfig::default())
        .connect("BTCUSDT")
        .await
        .unwrap();

    let payload = session.next_payload().await.unwrap();
    let tick = BinanceTradeCodec::new().decode(&payload, "BTCUSDT").unwrap();
    assert_eq!(tick.timestamp_ms(), 1_700_000_000_123);

    // The ping is answered internally; the ack is handed on for the codec to reject.
    let ack = session.next_payload().await.unwrap();
    assert!(BinanceTradeCodec::new().decode(&ack, "BTCUSDT").is_err());

    assert!(matches!(
        session.next_payload().await,
        Err(ConnectionError::Closed)
    ));
}

#[tokio::test]
async fn silent_server_fails_heartbeat() {
    let addr = serve_once(|ws| async move {
        // Hold the socket open without ever reading, so pings go unanswered.
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(ws);
    })
    .await;

    let mut session = connector(
        addr,
        HeartbeatConfig::new(Duration::from_millis(50), Duration::from_millis(50)),
    )
    .connect("btcusdt")
    .await
    .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), session.next_payload())
        .await
        .expect("heartbeat should fail well before the test timeout");
    assert!(matches!(result, Err(ConnectionError::HeartbeatTimeout(_))));
}
