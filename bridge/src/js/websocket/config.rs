//! WebSocket Configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the websocket module and its network adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Name of the global object holding `create`; also the builtin
    /// ES module specifier.
    pub global_name: String,
    /// `Origin` header sent with the handshake.
    pub origin: Option<String>,
    /// Subprotocols offered in `Sec-WebSocket-Protocol`.
    pub protocols: Vec<String>,
    pub connect_timeout_ms: u64,
    /// How long to wait for the peer to finish a close handshake before
    /// dropping the connection.
    pub close_timeout_ms: u64,
    /// Tokio worker threads for the network runtime.
    pub worker_threads: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            global_name: "websocket".to_string(),
            origin: None,
            protocols: Vec::new(),
            connect_timeout_ms: 10_000,
            close_timeout_ms: 60_000,
            worker_threads: 2,
        }
    }
}

impl WebSocketConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON configuration; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_global_name(mut self, name: impl Into<String>) -> Self {
        self.global_name = name.into();
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocols.push(protocol.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}
