//! WebSocket Connection Registry
//!
//! Owns every live connection and implements the operations the script
//! object exposes. All methods are called on the JS engine thread; the
//! mutexes make the registry shareable with the `Send` tasks that deliver
//! events, while ordering comes from the engine's command queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

use crate::js::JsEngineClient;
use crate::js::websocket::bridge::EventBridge;
use crate::js::websocket::state::{ConnectionState, Delivery, NetworkEvent};
use crate::js::websocket::{NetworkClient, NetworkSocket, ReadyState, WebSocketError};

/// Default close code (normal closure)
pub const NORMAL_CLOSURE: u16 = 1000;

/// Largest close reason that fits a close frame next to its code.
pub const MAX_CLOSE_REASON_BYTES: usize = 123;

/// Whether a script may send `code` in a close frame.
///
/// 1004-1006 and 1015 are reserved for reporting and never sent; 1016-2999
/// is held for future protocol use.
pub fn is_sendable_close_code(code: u16) -> bool {
    matches!(code, 1000..=1003 | 1007..=1014 | 3000..=4999)
}

/// Validate the arguments of a script `close` call.
pub fn check_close(code: u16, reason: Option<&str>) -> Result<(), WebSocketError> {
    if !is_sendable_close_code(code) {
        return Err(WebSocketError::InvalidCloseCode(code.to_string()));
    }
    match reason {
        Some(reason) if reason.len() > MAX_CLOSE_REASON_BYTES => {
            Err(WebSocketError::CloseReasonTooLong(reason.len()))
        }
        _ => Ok(()),
    }
}

/// One logical WebSocket session
pub(crate) struct Connection {
    id: u32,
    url: String,
    state: Mutex<ConnectionState<Box<dyn NetworkSocket>>>,
    events: Mutex<mpsc::UnboundedReceiver<NetworkEvent>>,
    bridge: Arc<EventBridge>,
    connect_started: AtomicBool,
}

impl Connection {
    fn state(&self) -> MutexGuard<'_, ConnectionState<Box<dyn NetworkSocket>>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn ready_state(&self) -> ReadyState {
        self.state().ready_state()
    }

    /// Pop the next arrived event and apply it, returning the handler
    /// invocation it produced. `None` once the channel is empty.
    fn next_delivery(&self) -> Option<Option<Delivery>> {
        let event = self
            .events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .try_recv()
            .ok()?;

        log::debug!("[WebSocket {}] Applying {} event", self.id, event.kind());
        Some(self.state().apply(event))
    }

    fn send(&self, payload: String) -> Result<bool, WebSocketError> {
        let state = self.state();
        if state.ready_state() != ReadyState::Open {
            return Err(WebSocketError::InvalidState(state.ready_state()));
        }

        match state.socket() {
            Some(socket) => {
                log::debug!("[WebSocket {}] Sending {} bytes", self.id, payload.len());
                Ok(socket.send(payload))
            }
            None => {
                log::warn!("[WebSocket {}] Open without a socket, dropping send", self.id);
                Ok(false)
            }
        }
    }

    fn close(&self, code: u16, reason: Option<String>) {
        let state = self.state();
        if let Some(socket) = state.socket() {
            log::info!("[WebSocket {}] Closing ({} {:?})", self.id, code, reason);
            socket.close(code, reason);
        }
    }

    fn buffered_amount(&self) -> u64 {
        self.state().socket().map(|socket| socket.queue_size()).unwrap_or(0)
    }
}

/// Manages all WebSocket connections created from one engine
pub struct WebSocketManager {
    network: Arc<dyn NetworkClient>,
    client: JsEngineClient,
    connections: Mutex<HashMap<u32, Arc<Connection>>>,
    next_id: AtomicU32,
}

impl WebSocketManager {
    pub fn new(network: Arc<dyn NetworkClient>, client: JsEngineClient) -> Arc<Self> {
        Arc::new(Self {
            network,
            client,
            connections: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(1),
        })
    }

    fn connections(&self) -> MutexGuard<'_, HashMap<u32, Arc<Connection>>> {
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn get(&self, id: u32) -> Option<Arc<Connection>> {
        self.connections().get(&id).cloned()
    }

    /// Create a connection in CONNECTING and queue its connect step.
    ///
    /// The connect step runs as a later engine task, so the caller holds the
    /// new id (and can register handlers) before any event can fire.
    pub fn create(self: &Arc<Self>, url: String) -> u32 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();

        let connection = Arc::new(Connection {
            id,
            url,
            state: Mutex::new(ConnectionState::new()),
            events: Mutex::new(rx),
            bridge: Arc::new(EventBridge::new(id, tx, Arc::downgrade(self), self.client.clone())),
            connect_started: AtomicBool::new(false),
        });
        self.connections().insert(id, connection);

        let manager = Arc::downgrade(self);
        let scheduled = self.client.schedule(move |_context| {
            if let Some(manager) = manager.upgrade() {
                manager.connect(id);
            }
        });
        if !scheduled {
            log::warn!("[WebSocket {}] JS engine stopped before connect could be scheduled", id);
        }

        id
    }

    /// Ask the network library to open the connection. Runs at most once.
    pub(crate) fn connect(&self, id: u32) {
        let Some(connection) = self.get(id) else {
            log::debug!("[WebSocket {}] Connection disposed before connect", id);
            return;
        };
        if connection.connect_started.swap(true, Ordering::SeqCst) {
            log::warn!("[WebSocket {}] Connect already started", id);
            return;
        }

        log::info!("[WebSocket {}] Connecting to {}", id, connection.url);
        let socket = self.network.open(&connection.url, connection.bridge.clone());

        if connection.state().attach_pending(socket).is_err() {
            log::warn!("[WebSocket {}] Connection left CONNECTING before the socket was attached", id);
        }
    }

    /// Send a text payload. `None` means the argument was missing or not a
    /// string.
    pub fn send(&self, id: u32, payload: Option<String>) -> Result<bool, WebSocketError> {
        let payload = payload.ok_or(WebSocketError::Argument("send needs one argument of type string"))?;
        match self.get(id) {
            Some(connection) => connection.send(payload),
            None => Err(WebSocketError::InvalidState(ReadyState::Closed)),
        }
    }

    /// Start a graceful close. Arguments are checked in every state; the
    /// call is a no-op without an underlying socket.
    pub fn close(&self, id: u32, code: u16, reason: Option<String>) -> Result<(), WebSocketError> {
        check_close(code, reason.as_deref())?;
        if let Some(connection) = self.get(id) {
            connection.close(code, reason);
        }
        Ok(())
    }

    /// Get the ready state of a connection. Disposed connections are CLOSED.
    pub fn ready_state(&self, id: u32) -> ReadyState {
        self.get(id)
            .map(|connection| connection.ready_state())
            .unwrap_or(ReadyState::Closed)
    }

    pub fn buffered_amount(&self, id: u32) -> u64 {
        self.get(id)
            .map(|connection| connection.buffered_amount())
            .unwrap_or(0)
    }

    /// Apply the next arrived event of a connection.
    ///
    /// Returns `None` when nothing is pending (or the connection is gone),
    /// and `Some(None)` when the event changed state without a handler call.
    pub(crate) fn next_delivery(&self, id: u32) -> Option<Option<Delivery>> {
        self.get(id)?.next_delivery()
    }

    /// Drop a CLOSED connection from the registry. Returns `true` if it was
    /// removed.
    pub(crate) fn dispose_if_closed(&self, id: u32) -> bool {
        let mut connections = self.connections();
        let closed = connections
            .get(&id)
            .is_some_and(|connection| connection.ready_state() == ReadyState::Closed);
        if closed {
            connections.remove(&id);
            log::info!("[WebSocket {}] Disposed", id);
        }
        closed
    }

    pub fn len(&self) -> usize {
        self.connections().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::js::JsCommand;
    use crate::js::websocket::WebSocketListener;
    use boa_engine::Context;
    use std::sync::mpsc as std_mpsc;

    struct NullSocket;

    impl NetworkSocket for NullSocket {
        fn send(&self, _text: String) -> bool {
            true
        }

        fn close(&self, _code: u16, _reason: Option<String>) -> bool {
            true
        }

        fn queue_size(&self) -> u64 {
            0
        }
    }

    #[derive(Default)]
    struct RecordingNetwork {
        listeners: Mutex<Vec<Arc<dyn WebSocketListener>>>,
    }

    impl RecordingNetwork {
        fn opened(&self) -> usize {
            self.listeners.lock().unwrap().len()
        }

        fn listener(&self, index: usize) -> Arc<dyn WebSocketListener> {
            self.listeners.lock().unwrap()[index].clone()
        }
    }

    impl NetworkClient for RecordingNetwork {
        fn open(&self, _url: &str, listener: Arc<dyn WebSocketListener>) -> Box<dyn NetworkSocket> {
            self.listeners.lock().unwrap().push(listener);
            Box::new(NullSocket)
        }
    }

    /// A manager whose engine tasks are run by hand on a bare context.
    fn manager_with_queue() -> (
        Arc<RecordingNetwork>,
        Arc<WebSocketManager>,
        std_mpsc::Receiver<JsCommand>,
    ) {
        let network = Arc::new(RecordingNetwork::default());
        let (sender, receiver) = std_mpsc::channel();
        let manager = WebSocketManager::new(network.clone(), JsEngineClient { sender });
        (network, manager, receiver)
    }

    fn run_tasks(receiver: &std_mpsc::Receiver<JsCommand>, context: &mut Context) -> usize {
        let mut ran = 0;
        while let Ok(command) = receiver.try_recv() {
            if let JsCommand::RunTask(task) = command {
                task(context);
                ran += 1;
            }
        }
        ran
    }

    #[test]
    fn connect_opens_the_network_once() {
        let (network, manager, receiver) = manager_with_queue();
        let mut context = Context::default();

        let id = manager.create("ws://example/once".to_string());
        assert_eq!(network.opened(), 0);
        assert_eq!(run_tasks(&receiver, &mut context), 1);
        assert_eq!(network.opened(), 1);

        manager.connect(id);
        assert_eq!(network.opened(), 1);
        assert_eq!(manager.ready_state(id), ReadyState::Connecting);
    }

    #[test]
    fn closed_connections_leave_the_registry() {
        let (network, manager, receiver) = manager_with_queue();
        let mut context = Context::default();

        let first = manager.create("ws://example/a".to_string());
        let second = manager.create("ws://example/b".to_string());
        run_tasks(&receiver, &mut context);
        assert_eq!(manager.len(), 2);

        let listener = network.listener(0);
        listener.on_open();
        listener.on_closed(NORMAL_CLOSURE, String::new());
        run_tasks(&receiver, &mut context);

        assert_eq!(manager.len(), 1);
        assert!(manager.get(first).is_none());
        assert_eq!(manager.ready_state(first), ReadyState::Closed);
        assert_eq!(manager.ready_state(second), ReadyState::Connecting);

        network.listener(1).on_failure(crate::js::websocket::NetworkError::Abnormal);
        run_tasks(&receiver, &mut context);
        assert!(manager.is_empty());

        // Late events for a disposed connection are dropped.
        listener.on_message("late".to_string());
        assert_eq!(run_tasks(&receiver, &mut context), 0);
    }

    #[test]
    fn close_arguments_are_checked() {
        for code in [1000, 1001, 1003, 1007, 1014, 3000, 4999] {
            assert_eq!(check_close(code, None), Ok(()), "code {code}");
        }
        for code in [0, 999, 1004, 1005, 1006, 1015, 2999, 5000, u16::MAX] {
            assert_eq!(
                check_close(code, None),
                Err(WebSocketError::InvalidCloseCode(code.to_string()))
            );
        }

        let longest = "x".repeat(MAX_CLOSE_REASON_BYTES);
        assert_eq!(check_close(NORMAL_CLOSURE, Some(&longest)), Ok(()));
        assert_eq!(
            check_close(NORMAL_CLOSURE, Some(&"é".repeat(62))),
            Err(WebSocketError::CloseReasonTooLong(124))
        );
    }

    #[test]
    fn close_is_checked_before_the_socket_exists() {
        let (_network, manager, _receiver) = manager_with_queue();
        let id = manager.create("ws://example/early".to_string());

        assert!(manager.close(id, 1005, None).is_err());
        assert_eq!(manager.close(id, NORMAL_CLOSURE, None), Ok(()));
    }
}
