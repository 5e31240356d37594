//! JavaScript Engine
//!
//! Runs the Boa JavaScript runtime on a dedicated worker thread. Every
//! piece of script execution, including WebSocket event delivery, arrives
//! as a command on one channel and runs to completion before the next.

use boa_engine::{Context, JsError, Module, Source};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use thiserror::Error;

use crate::js::JsEngineClient;
use crate::js::esm::BuiltinModuleLoader;

/// A unit of work run on the engine thread with exclusive access to the context.
pub type JsTask = Box<dyn FnOnce(&mut Context) + Send + 'static>;

/// Commands that can be sent to the JS engine thread.
pub enum JsCommand {
    /// Load an ESM module with the given name and source. Relative imports
    /// resolve against `path` when it is set.
    LoadEsmModule {
        name: String,
        source: String,
        path: Option<PathBuf>,
    },
    /// Execute a JS script (non-module).
    Execute { source: String },
    /// Execute a JS script and reply with its completion value as a string.
    Evaluate {
        source: String,
        reply: mpsc::Sender<Result<String, String>>,
    },
    /// Run a native task on the engine thread.
    RunTask(JsTask),
    /// Run pending jobs (promises, timers).
    FlushEventLoop,
    /// Shutdown the JS engine.
    Shutdown,
}

impl fmt::Debug for JsCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsCommand::LoadEsmModule { name, source, path } => f
                .debug_struct("LoadEsmModule")
                .field("name", name)
                .field("bytes", &source.len())
                .field("path", path)
                .finish(),
            JsCommand::Execute { source } => {
                f.debug_struct("Execute").field("bytes", &source.len()).finish()
            }
            JsCommand::Evaluate { source, .. } => {
                f.debug_struct("Evaluate").field("bytes", &source.len()).finish()
            }
            JsCommand::RunTask(_) => f.write_str("RunTask"),
            JsCommand::FlushEventLoop => f.write_str("FlushEventLoop"),
            JsCommand::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Errors from starting or talking to the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to build JS context: {0}")]
    Context(String),
    #[error("Failed to spawn JS engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("JS engine is not running")]
    Disconnected,
    #[error("Script error: {0}")]
    Script(String),
}

pub(crate) type ContextBuilder = Box<dyn FnOnce() -> Result<Context, JsError> + Send>;

/// JavaScript engine, not yet started.
///
/// The context is built on the thread that runs the engine, since a Boa
/// `Context` cannot move between threads.
pub struct JsEngine {
    pub(crate) client: JsEngineClient,
    pub(crate) context_builder: ContextBuilder,
    pub(crate) receiver: Receiver<JsCommand>,
}

impl JsEngine {
    /// Get a client handle for communicating with the engine.
    pub fn client(&self) -> JsEngineClient {
        self.client.clone()
    }

    /// Run the engine on the current thread until shutdown.
    pub fn run(self) -> Result<(), EngineError> {
        let context = (self.context_builder)().map_err(|e| EngineError::Context(e.to_string()))?;
        run_js_loop(context, self.receiver);
        Ok(())
    }

    /// Run the engine on a dedicated worker thread.
    pub fn spawn(self) -> Result<JsEngineHandle, EngineError> {
        let client = self.client.clone();
        let handle = thread::Builder::new()
            .name("js-engine".to_string())
            .spawn(move || {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| self.run()));
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => log::error!("JS engine failed to start: {}", e),
                    Err(e) => log::error!("JS engine panicked: {:?}", e),
                }
            })?;

        Ok(JsEngineHandle {
            client,
            handle: Some(handle),
        })
    }
}

/// A running engine thread. Shuts the engine down when dropped.
pub struct JsEngineHandle {
    client: JsEngineClient,
    handle: Option<JoinHandle<()>>,
}

impl JsEngineHandle {
    pub fn client(&self) -> JsEngineClient {
        self.client.clone()
    }

    /// Ask the engine to stop and wait for its thread to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.client.shutdown();
            if handle.join().is_err() {
                log::warn!("JS engine thread exited with a panic");
            }
        }
    }
}

impl Drop for JsEngineHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Main loop for the JS engine thread.
fn run_js_loop(mut context: Context, receiver: Receiver<JsCommand>) {
    log::info!("JS engine thread started");

    loop {
        match receiver.recv() {
            Ok(JsCommand::Execute { source }) => {
                log::debug!("Executing script ({} bytes)...", source.len());

                if let Err(e) = context.eval(Source::from_bytes(source.as_bytes())) {
                    log::error!("Failed to execute script: {}", e);
                }

                flush_event_loop(&mut context);
            }
            Ok(JsCommand::Evaluate { source, reply }) => {
                let result = context
                    .eval(Source::from_bytes(source.as_bytes()))
                    .and_then(|value| {
                        flush_event_loop(&mut context);
                        value.to_string(&mut context)
                    })
                    .map(|value| value.to_std_string_escaped())
                    .map_err(|e| e.to_string());

                if reply.send(result).is_err() {
                    log::warn!("Evaluate caller went away before the result was ready");
                }
            }
            Ok(JsCommand::LoadEsmModule { name, source, path }) => {
                log::info!("Loading ES module {} ({} bytes)...", name, source.len());
                load_esm_module(&mut context, name, &source, path.as_deref());
                flush_event_loop(&mut context);
            }
            Ok(JsCommand::RunTask(task)) => {
                task(&mut context);
                flush_event_loop(&mut context);
            }
            Ok(JsCommand::FlushEventLoop) => {
                flush_event_loop(&mut context);
            }
            Ok(JsCommand::Shutdown) => {
                log::info!("JS engine shutting down");
                break;
            }
            Err(_) => {
                log::info!("All JS engine clients dropped");
                break;
            }
        }
    }

    log::info!("JS engine thread stopped");
}

fn load_esm_module(context: &mut Context, name: String, source: &str, path: Option<&Path>) {
    let source = Source::from_bytes(source.as_bytes());
    let parsed = match path {
        Some(path) => Module::parse(source.with_path(path), None, context),
        None => Module::parse(source, None, context),
    };
    let module = match parsed {
        Ok(module) => module,
        Err(e) => {
            log::error!("Failed to parse ES module {}: {}", name, e);
            return;
        }
    };

    if let Some(loader) = context.downcast_module_loader::<BuiltinModuleLoader>() {
        loader.insert(name, module.clone());
    }

    let _promise = module.load_link_evaluate(context);
}

/// Flush the event loop: run pending microtasks (jobs) and due timers.
fn flush_event_loop(context: &mut Context) {
    if let Err(e) = context.run_jobs() {
        log::error!("Error running Boa jobs: {}", e);
    }
}
