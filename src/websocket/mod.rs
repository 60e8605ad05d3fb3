//! WebSocket transport for the WOO X public and private channels

mod client;
mod transport;

pub use client::WebSocketClient;
pub use transport::WsTransport;
