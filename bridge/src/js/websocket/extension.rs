use boa_engine::{Context, JsError, JsResult, JsString, JsValue, Module, NativeFunction, Source};
use boa_gc::{Finalize, Trace, empty_trace};
use std::sync::Arc;

use crate::js::JsEngineClient;
use crate::js::JsEngineExtension;
use crate::js::esm::BuiltinModuleLoader;
use crate::js::websocket::bridge::{INSTANCE_FN, RELEASE_FN};
use crate::js::websocket::manager::{NORMAL_CLOSURE, WebSocketManager};
use crate::js::websocket::{NetworkClient, WebSocketConfig, WebSocketError};

/// Installs the websocket module: a global `websocket.create(url)` factory
/// and a builtin ES module of the same name.
pub struct WebSocketExtension {
    network: Arc<dyn NetworkClient>,
    config: WebSocketConfig,
}

impl WebSocketExtension {
    pub fn new(network: Arc<dyn NetworkClient>) -> Self {
        Self {
            network,
            config: WebSocketConfig::default(),
        }
    }

    pub fn with_config(mut self, config: WebSocketConfig) -> Self {
        self.config = config;
        self
    }
}

impl JsEngineExtension for WebSocketExtension {
    fn register(&self, context: &mut Context, client: JsEngineClient) -> Result<(), JsError> {
        let manager = WebSocketManager::new(self.network.clone(), client);
        register_websocket_functions(context, ManagerRef(manager))?;
        register_websocket_shim(context, &self.config.global_name)?;
        register_builtin_module(context, &self.config.global_name)?;
        log::info!("Registered websocket module as '{}'", self.config.global_name);
        Ok(())
    }
}

/// Registry handle captured by the native functions.
#[derive(Clone, Finalize)]
struct ManagerRef(Arc<WebSocketManager>);

unsafe impl Trace for ManagerRef {
    empty_trace!();
}

/// Register WebSocket native functions
fn register_websocket_functions(context: &mut Context, manager: ManagerRef) -> JsResult<()> {
    // __ws_create(url: string) -> number
    context.register_global_callable(
        JsString::from("__ws_create"),
        1,
        NativeFunction::from_copy_closure_with_captures(
            move |_this: &JsValue, args: &[JsValue], manager: &ManagerRef, _ctx: &mut Context| {
                create_fn(args, manager)
            },
            manager.clone(),
        ),
    )?;

    // __ws_send(id: number, data: string) -> boolean
    context.register_global_callable(
        JsString::from("__ws_send"),
        2,
        NativeFunction::from_copy_closure_with_captures(
            move |_this: &JsValue, args: &[JsValue], manager: &ManagerRef, _ctx: &mut Context| {
                send_fn(args, manager)
            },
            manager.clone(),
        ),
    )?;

    // __ws_close(id: number, code?: number, reason?: string) -> void
    context.register_global_callable(
        JsString::from("__ws_close"),
        3,
        NativeFunction::from_copy_closure_with_captures(
            move |_this: &JsValue, args: &[JsValue], manager: &ManagerRef, _ctx: &mut Context| {
                close_fn(args, manager)
            },
            manager.clone(),
        ),
    )?;

    // __ws_ready_state(id: number) -> number
    context.register_global_callable(
        JsString::from("__ws_ready_state"),
        1,
        NativeFunction::from_copy_closure_with_captures(
            move |_this: &JsValue, args: &[JsValue], manager: &ManagerRef, _ctx: &mut Context| {
                let state = manager.0.ready_state(connection_id(args));
                Ok(JsValue::from(state.ordinal()))
            },
            manager.clone(),
        ),
    )?;

    // __ws_buffered_amount(id: number) -> number
    context.register_global_callable(
        JsString::from("__ws_buffered_amount"),
        1,
        NativeFunction::from_copy_closure_with_captures(
            move |_this: &JsValue, args: &[JsValue], manager: &ManagerRef, _ctx: &mut Context| {
                let amount = manager.0.buffered_amount(connection_id(args));
                Ok(JsValue::from(amount as f64))
            },
            manager,
        ),
    )?;

    log::debug!("Registered WebSocket native functions");
    Ok(())
}

fn connection_id(args: &[JsValue]) -> u32 {
    args.first()
        .and_then(|v| v.as_number())
        .map(|n| n as u32)
        .unwrap_or(0)
}

fn string_arg(args: &[JsValue], index: usize) -> Option<String> {
    args.get(index)
        .and_then(|v| v.as_string())
        .map(|s| s.to_std_string_escaped())
}

/// __ws_create(url) -> connection id
fn create_fn(args: &[JsValue], manager: &ManagerRef) -> JsResult<JsValue> {
    let url = string_arg(args, 0).ok_or(WebSocketError::Argument("create needs one string argument (url)"))?;
    let id = manager.0.create(url);
    Ok(JsValue::from(id))
}

/// __ws_send(id, data) -> boolean
fn send_fn(args: &[JsValue], manager: &ManagerRef) -> JsResult<JsValue> {
    let sent = manager.0.send(connection_id(args), string_arg(args, 1))?;
    Ok(JsValue::from(sent))
}

/// __ws_close(id, code, reason)
fn close_fn(args: &[JsValue], manager: &ManagerRef) -> JsResult<JsValue> {
    let code = match args.get(1).and_then(|v| v.as_number()) {
        Some(number) => close_code(number)?,
        None => NORMAL_CLOSURE,
    };
    let reason = string_arg(args, 2);

    manager.0.close(connection_id(args), code, reason)?;
    Ok(JsValue::undefined())
}

/// A numeric close code must be an integer that fits the frame's u16.
fn close_code(number: f64) -> Result<u16, WebSocketError> {
    if number.fract() == 0.0 && (0.0..=f64::from(u16::MAX)).contains(&number) {
        Ok(number as u16)
    } else {
        Err(WebSocketError::InvalidCloseCode(number.to_string()))
    }
}

/// Register the script-side connection object and factory
fn register_websocket_shim(context: &mut Context, global_name: &str) -> JsResult<()> {
    let shim = r#"
(function(globalName) {
    // Connection objects by id, until the connection is disposed
    var instances = {};

    function WebSocketConnection(id, url) {
        Object.defineProperty(this, '_id', { value: id });
        Object.defineProperty(this, 'url', { value: url, enumerable: true });
        this.onopen = null;
        this.onerror = null;
        this.onmessage = null;
        this.onclose = null;
    }

    Object.defineProperties(WebSocketConnection.prototype, {
        readyState: { get: function() { return __ws_ready_state(this._id); } },
        bufferedAmount: { get: function() { return __ws_buffered_amount(this._id); } }
    });

    WebSocketConnection.prototype.send = function(data) {
        return __ws_send(this._id, data);
    };

    WebSocketConnection.prototype.close = function(code, reason) {
        __ws_close(this._id, code, reason);
    };

    WebSocketConnection.CONNECTING = 0;
    WebSocketConnection.OPEN = 1;
    WebSocketConnection.CLOSING = 2;
    WebSocketConnection.CLOSED = 3;

    Object.defineProperty(globalThis, '__INSTANCE_FN__', {
        value: function(id) { return instances[id]; }
    });
    Object.defineProperty(globalThis, '__RELEASE_FN__', {
        value: function(id) { delete instances[id]; }
    });

    globalThis[globalName] = {
        CONNECTING: 0,
        OPEN: 1,
        CLOSING: 2,
        CLOSED: 3,
        create: function create(url) {
            var id = __ws_create(url);
            var ws = new WebSocketConnection(id, url);
            instances[id] = ws;
            return ws;
        }
    };
})(__GLOBAL_NAME__);
"#
    .replace("__INSTANCE_FN__", INSTANCE_FN)
    .replace("__RELEASE_FN__", RELEASE_FN)
    .replace("__GLOBAL_NAME__", &js_string_literal(global_name));

    context.eval(Source::from_bytes(shim.as_bytes()))?;
    Ok(())
}

/// Make the module importable: `import { create } from 'websocket'`.
fn register_builtin_module(context: &mut Context, global_name: &str) -> JsResult<()> {
    let source = format!(
        r#"
const ws = globalThis[{name}];
export const create = ws.create;
export const CONNECTING = ws.CONNECTING;
export const OPEN = ws.OPEN;
export const CLOSING = ws.CLOSING;
export const CLOSED = ws.CLOSED;
export default ws;
"#,
        name = js_string_literal(global_name)
    );

    let module = Module::parse(Source::from_bytes(source.as_bytes()), None, context)?;
    match context.downcast_module_loader::<BuiltinModuleLoader>() {
        Some(loader) => loader.insert(global_name, module),
        None => log::warn!("Module loader does not accept builtin modules; '{}' is only global", global_name),
    }
    Ok(())
}

/// Quote a string for embedding in generated script source.
fn js_string_literal(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}
