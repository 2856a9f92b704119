//! Binance Trade Stream Integration
//!
//! WebSocket connector, trade codec, heartbeat and reconnect policy for
//! Binance `<symbol>@trade` streams.

pub mod codec;
pub mod connector;
pub mod heartbeat;
pub mod reconnect;

pub use codec::BinanceTradeCodec;
pub use connector::{BinanceConnector, BinanceConnectorConfig, DEFAULT_STREAM_URL, stream_url};
pub use heartbeat::{Heartbeat, HeartbeatAction, HeartbeatConfig};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
