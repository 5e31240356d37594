//! tokio-tungstenite network library
//!
//! Runs one driver task per connection on a dedicated tokio runtime. The
//! driver multiplexes outbound commands from the socket handle with inbound
//! frames and reports lifecycle events to the connection's listener.

use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::{self, Runtime};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::js::websocket::{
    NetworkClient, NetworkError, NetworkSocket, WebSocketConfig, WebSocketListener,
};

/// Close status reported when the peer's close frame carries no code.
const NO_STATUS_RECEIVED: u16 = 1005;
/// Close status reported when the close handshake never completed.
const ABNORMAL_CLOSURE: u16 = 1006;

/// Outbound command for a connection's driver task
#[derive(Debug)]
enum Outbound {
    Text(String),
    Close(u16, Option<String>),
}

/// Network library backed by tokio-tungstenite.
pub struct TungsteniteNetwork {
    runtime: Runtime,
    config: WebSocketConfig,
}

impl TungsteniteNetwork {
    pub fn new(config: WebSocketConfig) -> std::io::Result<Self> {
        let runtime = runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .thread_name("websocket-network")
            .enable_all()
            .build()?;
        Ok(Self { runtime, config })
    }
}

impl NetworkClient for TungsteniteNetwork {
    fn open(&self, url: &str, listener: Arc<dyn WebSocketListener>) -> Box<dyn NetworkSocket> {
        let (tx, rx) = mpsc::unbounded_channel();
        let queued = Arc::new(AtomicU64::new(0));

        let request = build_request(url, &self.config);
        self.runtime.spawn(run_connection(
            request,
            self.config.connect_timeout(),
            self.config.close_timeout(),
            listener,
            rx,
            queued.clone(),
        ));

        Box::new(TungsteniteSocket {
            commands: tx,
            queued,
        })
    }
}

/// Handle to a connection's driver task
struct TungsteniteSocket {
    commands: mpsc::UnboundedSender<Outbound>,
    queued: Arc<AtomicU64>,
}

impl NetworkSocket for TungsteniteSocket {
    fn send(&self, text: String) -> bool {
        let len = text.len() as u64;
        self.queued.fetch_add(len, Ordering::SeqCst);
        if self.commands.send(Outbound::Text(text)).is_err() {
            self.queued.fetch_sub(len, Ordering::SeqCst);
            return false;
        }
        true
    }

    fn close(&self, code: u16, reason: Option<String>) -> bool {
        self.commands.send(Outbound::Close(code, reason)).is_ok()
    }

    fn queue_size(&self) -> u64 {
        self.queued.load(Ordering::SeqCst)
    }
}

/// Validate the URL and build the handshake request.
fn build_request(url: &str, config: &WebSocketConfig) -> Result<Request, NetworkError> {
    let parsed = url::Url::parse(url)?;
    match parsed.scheme() {
        "ws" | "wss" => {}
        other => return Err(NetworkError::UnsupportedScheme(other.to_string())),
    }

    let mut request = parsed
        .as_str()
        .into_client_request()
        .map_err(NetworkError::Handshake)?;

    if let Some(origin) = &config.origin {
        let value = HeaderValue::from_str(origin)
            .map_err(|e| NetworkError::InvalidHeader(e.to_string()))?;
        request.headers_mut().insert("Origin", value);
    }

    if !config.protocols.is_empty() {
        let value = HeaderValue::from_str(&config.protocols.join(", "))
            .map_err(|e| NetworkError::InvalidHeader(e.to_string()))?;
        request.headers_mut().insert("Sec-WebSocket-Protocol", value);
    }

    Ok(request)
}

async fn run_connection(
    request: Result<Request, NetworkError>,
    connect_timeout: Duration,
    close_timeout: Duration,
    listener: Arc<dyn WebSocketListener>,
    mut commands: mpsc::UnboundedReceiver<Outbound>,
    queued: Arc<AtomicU64>,
) {
    let request = match request {
        Ok(request) => request,
        Err(e) => {
            listener.on_failure(e);
            return;
        }
    };
    let uri = request.uri().to_string();

    log::info!("[WebSocket] Performing handshake with {}", uri);

    let ws_stream =
        match tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(request)).await {
            Ok(Ok((stream, response))) => {
                log::info!(
                    "[WebSocket] Connected to {} (status: {})",
                    uri,
                    response.status()
                );
                stream
            }
            Ok(Err(e)) => {
                listener.on_failure(NetworkError::Handshake(e));
                return;
            }
            Err(_) => {
                listener.on_failure(NetworkError::Timeout(connect_timeout));
                return;
            }
        };

    listener.on_open();

    let (mut write, mut read) = ws_stream.split();

    // Code and reason of the close handshake in progress, if any. The
    // peer's close frame replaces what we sent.
    let mut closing: Option<(u16, String)> = None;
    // Set once closing starts; the connection is dropped if the peer has not
    // finished the handshake by then.
    let mut close_deadline: Option<Instant> = None;
    let mut commands_open = true;

    loop {
        tokio::select! {
            command = commands.recv(), if commands_open => match command {
                Some(Outbound::Text(text)) => {
                    let len = text.len() as u64;
                    if closing.is_some() {
                        log::debug!("[WebSocket] Dropping send after close started ({})", uri);
                        queued.fetch_sub(len, Ordering::SeqCst);
                        continue;
                    }
                    let result = write.send(Message::Text(text.into())).await;
                    queued.fetch_sub(len, Ordering::SeqCst);
                    if let Err(e) = result {
                        listener.on_failure(NetworkError::Transport(e));
                        return;
                    }
                }
                Some(Outbound::Close(code, reason)) => {
                    if closing.is_some() {
                        continue;
                    }
                    let reason = reason.unwrap_or_default();
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.clone().into(),
                    };
                    if let Err(e) = write.send(Message::Close(Some(frame))).await {
                        listener.on_failure(NetworkError::Transport(e));
                        return;
                    }
                    listener.on_closing(code, reason.clone());
                    closing = Some((code, reason));
                    close_deadline = Some(Instant::now() + close_timeout);
                }
                None => {
                    // Socket handle dropped: the connection was abandoned.
                    commands_open = false;
                    if closing.is_none() {
                        let frame = CloseFrame {
                            code: CloseCode::Away,
                            reason: "".into(),
                        };
                        if let Err(e) = write.send(Message::Close(Some(frame))).await {
                            log::debug!("[WebSocket] Failed to send close for abandoned connection {}: {}", uri, e);
                        }
                        closing = Some((u16::from(CloseCode::Away), String::new()));
                        close_deadline = Some(Instant::now() + close_timeout);
                    }
                }
            },
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    listener.on_message(text.to_string());
                }
                Some(Ok(Message::Binary(data))) => {
                    log::debug!("[WebSocket] Ignoring binary message ({} bytes)", data.len());
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {
                    // Handled by tungstenite
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.to_string()))
                        .unwrap_or((NO_STATUS_RECEIVED, String::new()));
                    if closing.is_none() {
                        listener.on_closing(code, reason.clone());
                    }
                    closing = Some((code, reason));
                    close_deadline.get_or_insert_with(|| Instant::now() + close_timeout);
                }
                Some(Err(tungstenite::Error::ConnectionClosed)) | None => {
                    match closing.take() {
                        Some((code, reason)) => listener.on_closed(code, reason),
                        None => listener.on_failure(NetworkError::Abnormal),
                    }
                    break;
                }
                Some(Err(e)) => {
                    match closing.take() {
                        Some((code, reason)) => {
                            log::debug!("[WebSocket] Error after close handshake started: {}", e);
                            listener.on_closed(code, reason);
                        }
                        None => listener.on_failure(NetworkError::Transport(e)),
                    }
                    break;
                }
            },
            _ = tokio::time::sleep_until(close_deadline.unwrap_or_else(Instant::now)), if close_deadline.is_some() => {
                log::warn!(
                    "[WebSocket] Close handshake with {} timed out after {:?}",
                    uri,
                    close_timeout
                );
                listener.on_closed(ABNORMAL_CLOSURE, "Close handshake timed out".to_string());
                break;
            }
        }
    }

    log::info!("[WebSocket] Connection to {} ended", uri);
}
