//! JavaScript Engine Module
//!
//! A Boa JS engine running on its own thread behind a command channel,
//! plus the extensions installed into it.

mod builder;
mod client;
mod engine;
mod esm;
pub mod websocket;

pub use builder::{JsEngineBuilder, JsEngineExtension};
pub use client::JsEngineClient;
pub use engine::{EngineError, JsCommand, JsEngine, JsEngineHandle, JsTask};
