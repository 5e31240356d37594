#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use boa_ws_bridge::js::websocket::{
    NetworkClient, NetworkError, NetworkSocket, WebSocketConfig, WebSocketExtension,
    WebSocketListener,
};
use boa_ws_bridge::js::{JsEngineBuilder, JsEngineClient, JsEngineHandle};

/// What the network library saw for one opened connection.
pub struct MockConnection {
    pub url: String,
    pub listener: Arc<dyn WebSocketListener>,
    pub sent: Mutex<Vec<String>>,
    pub closes: Mutex<Vec<(u16, Option<String>)>>,
    pub queued: AtomicU64,
}

impl MockConnection {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn closes(&self) -> Vec<(u16, Option<String>)> {
        self.closes.lock().unwrap().clone()
    }
}

struct MockSocket(Arc<MockConnection>);

impl NetworkSocket for MockSocket {
    fn send(&self, text: String) -> bool {
        self.0.sent.lock().unwrap().push(text);
        true
    }

    fn close(&self, code: u16, reason: Option<String>) -> bool {
        self.0.closes.lock().unwrap().push((code, reason));
        true
    }

    fn queue_size(&self) -> u64 {
        self.0.queued.load(Ordering::SeqCst)
    }
}

/// Network library whose events are fired by the test.
#[derive(Default)]
pub struct MockNetwork {
    opened: Mutex<Vec<Arc<MockConnection>>>,
}

impl MockNetwork {
    pub fn opened(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    pub fn connection(&self, index: usize) -> Arc<MockConnection> {
        self.opened.lock().unwrap()[index].clone()
    }
}

impl NetworkClient for MockNetwork {
    fn open(&self, url: &str, listener: Arc<dyn WebSocketListener>) -> Box<dyn NetworkSocket> {
        let connection = Arc::new(MockConnection {
            url: url.to_string(),
            listener,
            sent: Mutex::new(Vec::new()),
            closes: Mutex::new(Vec::new()),
            queued: AtomicU64::new(0),
        });
        self.opened.lock().unwrap().push(connection.clone());
        Box::new(MockSocket(connection))
    }
}

pub struct Harness {
    pub network: Arc<MockNetwork>,
    engine: JsEngineHandle,
}

impl Harness {
    pub fn start() -> Self {
        Self::with_config(WebSocketConfig::default())
    }

    pub fn with_config(config: WebSocketConfig) -> Self {
        init_logging();
        let network = Arc::new(MockNetwork::default());
        let engine = JsEngineBuilder::new()
            .with_extension(WebSocketExtension::new(network.clone()).with_config(config))
            .build()
            .expect("engine builds")
            .spawn()
            .expect("engine starts");
        Self { network, engine }
    }

    pub fn client(&self) -> JsEngineClient {
        self.engine.client()
    }

    /// Evaluate a script; every task queued before it has already run.
    pub fn eval(&self, source: &str) -> String {
        self.client()
            .evaluate(source)
            .unwrap_or_else(|e| panic!("script failed: {e}\n{source}"))
    }

    /// Create `var ws` with handlers recording into `var log`, and wait for
    /// its connect step to reach the network library.
    pub fn create_recorded(&self, url: &str) -> Arc<MockConnection> {
        let index = self.network.opened();
        self.eval(&format!(
            r#"
            var log = [];
            var ws = websocket.create({url:?});
            ws.onopen = function() {{ log.push('open:' + arguments.length + ':' + ws.readyState); }};
            ws.onerror = function() {{ log.push('error:' + arguments.length + ':' + ws.readyState); }};
            ws.onmessage = function(text) {{ log.push('message:' + text); }};
            ws.onclose = function(info) {{ log.push('close:' + JSON.stringify(info) + ':' + ws.readyState); }};
            "#
        ));
        self.eval("undefined");
        assert_eq!(self.network.opened(), index + 1, "connect step should have run");
        self.network.connection(index)
    }

    pub fn log(&self) -> String {
        self.eval("log.join('|')")
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn failure(message: &str) -> NetworkError {
    NetworkError::Other(message.to_string())
}
