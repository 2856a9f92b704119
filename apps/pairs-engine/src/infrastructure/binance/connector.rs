//! Trade Stream Connector
//!
//! Opens one WebSocket per symbol at `<base_url>/<symbol>@trade` and wraps
//! it in a [`FeedSession`] that answers server pings, runs the client
//! heartbeat and yields only data frames.
//!
//! # Stream URL
//!
//! - USD-M futures: `wss://fstream.binance.com/ws/btcusdt@trade`

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::heartbeat::{Heartbeat, HeartbeatAction, HeartbeatConfig};
use crate::application::ports::{FeedConnector, FeedSession};
use crate::error::ConnectionError;

/// Default futures trade stream endpoint.
pub const DEFAULT_STREAM_URL: &str = "wss://fstream.binance.com/ws";

/// Configuration for the connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinanceConnectorConfig {
    /// Base WebSocket URL without trailing slash.
    pub base_url: String,
    /// Heartbeat configuration.
    pub heartbeat: HeartbeatConfig,
}

impl Default for BinanceConnectorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_STREAM_URL.to_string(),
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

/// Stream URL for `symbol`'s trade events.
#[must_use]
pub fn stream_url(base_url: &str, symbol: &str) -> String {
    format!(
        "{}/{}@trade",
        base_url.trim_end_matches('/'),
        symbol.trim().to_lowercase()
    )
}

/// Opens Binance trade streams.
#[derive(Debug, Clone, Default)]
pub struct BinanceConnector {
    config: BinanceConnectorConfig,
}

impl BinanceConnector {
    /// Create a connector.
    #[must_use]
    pub const fn new(config: BinanceConnectorConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl FeedConnector for BinanceConnector {
    async fn connect(&self, symbol: &str) -> Result<Box<dyn FeedSession>, ConnectionError> {
        let url = stream_url(&self.config.base_url, symbol);
        tracing::info!(url = %url, "connecting to trade stream");

        let (ws, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| ConnectionError::ConnectFailed(e.to_string()))?;

        Ok(Box::new(BinanceSession {
            ws,
            heartbeat: Heartbeat::new(self.config.heartbeat.clone(), tokio::time::Instant::now()),
        }))
    }
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One open trade stream.
struct BinanceSession {
    ws: Socket,
    heartbeat: Heartbeat,
}

enum Wake {
    Frame(Option<Result<Message, tokio_tungstenite::tungstenite::Error>>),
    Heartbeat,
}

#[async_trait]
impl FeedSession for BinanceSession {
    async fn next_payload(&mut self) -> Result<String, ConnectionError> {
        loop {
            let deadline = self.heartbeat.next_deadline();
            let wake = tokio::select! {
                frame = self.ws.next() => Wake::Frame(frame),
                () = tokio::time::sleep_until(deadline) => Wake::Heartbeat,
            };

            let frame = match wake {
                Wake::Heartbeat => {
                    match self.heartbeat.poll(tokio::time::Instant::now()) {
                        HeartbeatAction::Idle => {}
                        HeartbeatAction::SendPing => {
                            tracing::trace!("sending heartbeat ping");
                            self.ws.send(Message::Ping(Vec::new().into())).await?;
                        }
                        HeartbeatAction::TimedOut => {
                            return Err(ConnectionError::HeartbeatTimeout(
                                self.heartbeat.pong_timeout(),
                            ));
                        }
                    }
                    continue;
                }
                Wake::Frame(frame) => frame,
            };

            self.heartbeat.record_activity(tokio::time::Instant::now());
            match frame {
                Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
                Some(Ok(Message::Binary(data))) => {
                    return Ok(String::from_utf8_lossy(&data).into_owned());
                }
                Some(Ok(Message::Ping(data))) => {
                    self.ws.send(Message::Pong(data)).await?;
                }
                Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "server sent close frame");
                    return Err(ConnectionError::Closed);
                }
                Some(Err(e)) => return Err(e.into()),
                None => return Err(ConnectionError::Closed),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.ws.close(None).await {
            tracing::debug!(error = %e, "error closing trade stream");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_trade_stream_url() {
        assert_eq!(
            stream_url(DEFAULT_STREAM_URL, "BTCUSDT"),
            "wss://fstream.binance.com/ws/btcusdt@trade"
        );
        assert_eq!(
            stream_url("ws://127.0.0.1:9000/ws/", " ethusdt "),
            "ws://127.0.0.1:9000/ws/ethusdt@trade"
        );
    }

    #[test]
    fn default_config_targets_futures_stream() {
        let config = BinanceConnectorConfig::default();
        assert_eq!(config.base_url, DEFAULT_STREAM_URL);
        assert_eq!(config.heartbeat, HeartbeatConfig::default());
    }

    #[tokio::test]
    async fn unreachable_host_fails_to_connect() {
        let connector = BinanceConnector::new(BinanceConnectorConfig {
            base_url: "ws://127.0.0.1:1".to_string(),
            ..BinanceConnectorConfig::default()
        });
        let result = connector.connect("btcusdt").await;
        assert!(matches!(result, Err(ConnectionError::ConnectFailed(_))));
    }
}
