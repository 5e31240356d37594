//! # WebSocket bridge for Boa
//!
//! Lets scripts running on a single-threaded Boa engine open WebSocket
//! connections whose I/O happens on tokio worker threads.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use boa_ws_bridge::js::JsEngineBuilder;
//! use boa_ws_bridge::js::websocket::{TungsteniteNetwork, WebSocketConfig, WebSocketExtension};
//!
//! let config = WebSocketConfig::default();
//! let network = Arc::new(TungsteniteNetwork::new(config.clone()).unwrap());
//! let engine = JsEngineBuilder::new()
//!     .with_extension(WebSocketExtension::new(network).with_config(config))
//!     .build()
//!     .unwrap()
//!     .spawn()
//!     .unwrap();
//!
//! engine.client().execute(r#"
//!     var ws = websocket.create("ws://127.0.0.1:9000");
//!     ws.onopen = function() { ws.send("hello"); };
//!     ws.onmessage = function(text) { console.log(text); ws.close(); };
//! "#);
//! ```

pub mod js;

pub use js::websocket::{WebSocketConfig, WebSocketExtension};
pub use js::{JsEngine, JsEngineBuilder, JsEngineClient};
