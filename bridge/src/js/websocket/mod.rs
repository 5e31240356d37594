//! WebSocket Implementation for Boa JS Engine
//!
//! Exposes `create(url)` to scripts and delivers connection events from the
//! network library's threads onto the single JS engine thread.
//!
//! Events are pushed into a per-connection channel and drained by tasks on
//! the engine's command queue, so handlers run one at a time and in the
//! order the network library produced the events.

mod bridge;
mod config;
mod error;
mod extension;
mod manager;
mod network;
mod state;
mod tungstenite;

pub use bridge::EventBridge;
pub use config::WebSocketConfig;
pub use error::{NetworkError, WebSocketError};
pub use extension::WebSocketExtension;
pub use manager::{
    MAX_CLOSE_REASON_BYTES, NORMAL_CLOSURE, WebSocketManager, check_close, is_sendable_close_code,
};
pub use network::{NetworkClient, NetworkSocket, WebSocketListener};
pub use state::{CloseInfo, ConnectionState, Delivery, NetworkEvent, ReadyState};
pub use tungstenite::TungsteniteNetwork;
