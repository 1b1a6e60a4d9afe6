//! Realtime WebSocket connection: transport capability trait plus the
//! reconnecting client built on top of it.

pub mod connection;
pub mod transport;

pub use connection::{AuthScheme, ConnectionState, ListenerId, RealtimeClient, ReconnectPolicy};
pub use transport::{FrameSink, Transport, TransportEvent, TransportLink, WsTransport};
