use boa_engine::Context;
use std::path::PathBuf;
use std::sync::mpsc;

use crate::js::{EngineError, JsCommand};

/// Client handle for communicating with the JS engine thread.
///
/// Cheap to clone and safe to share across threads. Commands from one
/// client are executed in the order they were sent.
#[derive(Clone)]
pub struct JsEngineClient {
    pub(crate) sender: mpsc::Sender<JsCommand>,
}

impl JsEngineClient {
    /// Run pending jobs on the JS event loop.
    pub fn flush_event_loop(&self) {
        if let Err(e) = self.sender.send(JsCommand::FlushEventLoop) {
            log::warn!("Failed to send flush event loop command: {}", e);
        }
    }

    /// Load an ES module.
    pub fn load_esm_module(&self, name: impl Into<String>, source: impl Into<String>) {
        if let Err(e) = self.sender.send(JsCommand::LoadEsmModule {
            name: name.into(),
            source: source.into(),
            path: None,
        }) {
            log::error!("Failed to send load ESM module command: {}", e);
        }
    }

    /// Load an ES module read from `path`; its relative imports resolve
    /// against the file's directory.
    pub fn load_esm_file(&self, path: impl Into<PathBuf>, source: impl Into<String>) {
        let path = path.into();
        if let Err(e) = self.sender.send(JsCommand::LoadEsmModule {
            name: path.to_string_lossy().to_string(),
            source: source.into(),
            path: Some(path),
        }) {
            log::error!("Failed to send load ESM module command: {}", e);
        }
    }

    /// Execute a script.
    pub fn execute(&self, source: impl Into<String>) {
        if let Err(e) = self.sender.send(JsCommand::Execute {
            source: source.into(),
        }) {
            log::error!("Failed to send execute command: {}", e);
        }
    }

    /// Execute a script and wait for its completion value, converted with
    /// `ToString`. Must not be called from the engine thread itself.
    pub fn evaluate(&self, source: impl Into<String>) -> Result<String, EngineError> {
        let (reply, result) = mpsc::channel();
        self.sender
            .send(JsCommand::Evaluate {
                source: source.into(),
                reply,
            })
            .map_err(|_| EngineError::Disconnected)?;

        result
            .recv()
            .map_err(|_| EngineError::Disconnected)?
            .map_err(EngineError::Script)
    }

    /// Queue a task on the engine thread. Tasks run one at a time, in
    /// submission order, after everything queued before them.
    ///
    /// Returns `false` if the engine has shut down.
    pub fn schedule<F>(&self, task: F) -> bool
    where
        F: FnOnce(&mut Context) + Send + 'static,
    {
        self.sender.send(JsCommand::RunTask(Box::new(task))).is_ok()
    }

    /// Shutdown the JS engine.
    pub fn shutdown(&self) {
        let _ = self.sender.send(JsCommand::Shutdown);
    }
}
