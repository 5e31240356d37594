//! Connection State Machine
//!
//! Ready states, the events the network library reports, and the
//! transitions applied to a connection when those events are delivered.

use std::fmt;

/// WebSocket ready states (matching the browser API ordinals)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ReadyState {
    /// The ordinal exposed to scripts as `readyState`.
    pub const fn ordinal(self) -> u32 {
        match self {
            ReadyState::Connecting => 0,
            ReadyState::Open => 1,
            ReadyState::Closing => 2,
            ReadyState::Closed => 3,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            ReadyState::Connecting => "CONNECTING",
            ReadyState::Open => "OPEN",
            ReadyState::Closing => "CLOSING",
            ReadyState::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Payload handed to a single `onclose` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

/// An event reported by the network library, captured at arrival time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    Open,
    Failure(String),
    Message(String),
    Closing { code: u16, reason: String },
    Closed { code: u16, reason: String },
}

impl NetworkEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            NetworkEvent::Open => "open",
            NetworkEvent::Failure(_) => "failure",
            NetworkEvent::Message(_) => "message",
            NetworkEvent::Closing { .. } => "closing",
            NetworkEvent::Closed { .. } => "closed",
        }
    }
}

/// A script-visible handler invocation produced by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Open,
    Error,
    Message(String),
    Close(CloseInfo),
}

impl Delivery {
    /// Name of the handler slot on the script object.
    pub fn handler_name(&self) -> &'static str {
        match self {
            Delivery::Open => "onopen",
            Delivery::Error => "onerror",
            Delivery::Message(_) => "onmessage",
            Delivery::Close(_) => "onclose",
        }
    }
}

/// Mutable half of a connection: ready state plus the socket handle.
///
/// A handle returned while connecting is held as `pending` and only becomes
/// the underlying socket once the handshake succeeds, so `socket()` is
/// `Some` exactly while the state is `Open` or `Closing`.
#[derive(Debug)]
pub struct ConnectionState<S> {
    ready_state: ReadyState,
    pending: Option<S>,
    socket: Option<S>,
}

impl<S> Default for ConnectionState<S> {
    fn default() -> Self {
        Self {
            ready_state: ReadyState::Connecting,
            pending: None,
            socket: None,
        }
    }
}

impl<S> ConnectionState<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ready_state(&self) -> ReadyState {
        self.ready_state
    }

    pub fn socket(&self) -> Option<&S> {
        self.socket.as_ref()
    }

    /// Hold the handle returned by the network library until the handshake
    /// completes. Returns the handle back if the connection already left
    /// `Connecting`.
    pub fn attach_pending(&mut self, socket: S) -> Result<(), S> {
        if self.ready_state != ReadyState::Connecting {
            return Err(socket);
        }
        self.pending = Some(socket);
        Ok(())
    }

    /// Apply one network event and return the handler invocation it calls
    /// for, if any.
    pub fn apply(&mut self, event: NetworkEvent) -> Option<Delivery> {
        use NetworkEvent as E;
        use ReadyState as R;

        match (self.ready_state, event) {
            (R::Connecting, E::Open) => {
                self.ready_state = R::Open;
                self.socket = self.pending.take();
                Some(Delivery::Open)
            }
            (R::Connecting | R::Open | R::Closing, E::Failure(message)) => {
                log::debug!("Transport failure in {}: {}", self.ready_state, message);
                self.release();
                Some(Delivery::Error)
            }
            (R::Open | R::Closing, E::Message(text)) => Some(Delivery::Message(text)),
            (R::Open, E::Closing { .. }) => {
                self.ready_state = R::Closing;
                None
            }
            (R::Open | R::Closing, E::Closed { code, reason }) => {
                self.release();
                Some(Delivery::Close(CloseInfo { code, reason }))
            }
            (R::Closed, event) => {
                log::debug!("Discarding {} event on a closed connection", event.kind());
                None
            }
            (state, event) => {
                log::warn!("Ignoring {} event in state {}", event.kind(), state);
                None
            }
        }
    }

    fn release(&mut self) {
        self.ready_state = ReadyState::Closed;
        self.pending = None;
        self.socket = None;
    }
}
