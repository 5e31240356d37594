//! WebSocket Errors
//!
//! Call-site errors raised synchronously into script, and transport errors
//! reported asynchronously through `onerror`.

use std::time::Duration;

use boa_engine::{JsError, JsNativeError};
use thiserror::Error;
use tokio_tungstenite::tungstenite;

use crate::js::websocket::ReadyState;

/// Errors raised synchronously at the script call site.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebSocketError {
    /// A call-site argument failed a type or arity constraint.
    #[error("{0}")]
    Argument(&'static str),

    /// `send` was called while the connection was not open.
    #[error("InvalidStateError: WebSocket is in {0} state")]
    InvalidState(ReadyState),

    /// `close` was given a code that may not be sent on the wire.
    #[error("close code must be 1000, 1001-1014 except 1004-1006, or 3000-4999 (got {0})")]
    InvalidCloseCode(String),

    /// `close` was given a reason longer than a close frame can carry.
    #[error("close reason must be at most 123 bytes of UTF-8 (got {0})")]
    CloseReasonTooLong(usize),
}

impl From<WebSocketError> for JsError {
    fn from(error: WebSocketError) -> Self {
        let native = match error {
            WebSocketError::Argument(_) | WebSocketError::InvalidCloseCode(_) => {
                JsNativeError::typ()
            }
            WebSocketError::CloseReasonTooLong(_) => JsNativeError::syntax(),
            WebSocketError::InvalidState(_) => JsNativeError::error(),
        };
        native.with_message(error.to_string()).into()
    }
}

/// Transport failures reported by the network library.
///
/// These never cross into script as exceptions; the bridge turns them into
/// an `onerror` delivery followed by the CLOSED state.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    #[error("Handshake failed: {0}")]
    Handshake(#[source] tungstenite::Error),

    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection error: {0}")]
    Transport(#[source] tungstenite::Error),

    #[error("Connection closed without a close handshake")]
    Abnormal,

    #[error("{0}")]
    Other(String),
}
