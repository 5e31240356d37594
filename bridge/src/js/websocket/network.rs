//! Network Library Contract
//!
//! The narrow interface the bridge consumes from a WebSocket client
//! implementation. Handshake, framing, ping/pong and close negotiation all
//! live behind it.

use std::sync::Arc;

use crate::js::websocket::NetworkError;

/// Receives lifecycle and message events for one connection.
///
/// Called from the network library's own threads, in the order the library
/// observes them.
pub trait WebSocketListener: Send + Sync {
    fn on_open(&self);
    fn on_failure(&self, error: NetworkError);
    fn on_message(&self, text: String);
    fn on_closing(&self, code: u16, reason: String);
    fn on_closed(&self, code: u16, reason: String);
}

/// Handle to one connection owned by the network library.
pub trait NetworkSocket: Send + Sync {
    /// Queue a text frame. Returns `false` if the connection can no longer
    /// accept data.
    fn send(&self, text: String) -> bool;

    /// Start a graceful close handshake.
    fn close(&self, code: u16, reason: Option<String>) -> bool;

    /// Bytes queued for sending and not yet written.
    fn queue_size(&self) -> u64;
}

/// A WebSocket client implementation.
pub trait NetworkClient: Send + Sync + 'static {
    /// Start opening `url`, reporting events to `listener`. Never blocks;
    /// failures, including an invalid URL, arrive through
    /// [`WebSocketListener::on_failure`].
    fn open(&self, url: &str, listener: Arc<dyn WebSocketListener>) -> Box<dyn NetworkSocket>;
}
