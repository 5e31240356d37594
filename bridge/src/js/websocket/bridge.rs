//! Event Bridge
//!
//! Moves events observed on network-library threads onto the JS engine
//! thread. Each connection has an unbounded channel: the network side pushes
//! the captured event and posts a drain task to the engine queue; the drain
//! task applies events in arrival order and invokes the handler each one
//! calls for. Since drain tasks are engine commands, delivery never overlaps
//! any other script execution.

use boa_engine::object::ObjectInitializer;
use boa_engine::property::Attribute;
use boa_engine::{Context, JsNativeError, JsObject, JsResult, JsString, JsValue, js_string};
use std::sync::Weak;
use tokio::sync::mpsc;

use crate::js::JsEngineClient;
use crate::js::websocket::manager::WebSocketManager;
use crate::js::websocket::state::{CloseInfo, Delivery, NetworkEvent};
use crate::js::websocket::{NetworkError, WebSocketListener};

/// Script function returning the object created for a connection id.
pub(crate) const INSTANCE_FN: &str = "__ws_instance";
/// Script function forgetting the object for a disposed connection.
pub(crate) const RELEASE_FN: &str = "__ws_release";

/// Event sink handed to the network library for one connection
pub struct EventBridge {
    id: u32,
    events: mpsc::UnboundedSender<NetworkEvent>,
    manager: Weak<WebSocketManager>,
    client: JsEngineClient,
}

impl EventBridge {
    pub(crate) fn new(
        id: u32,
        events: mpsc::UnboundedSender<NetworkEvent>,
        manager: Weak<WebSocketManager>,
        client: JsEngineClient,
    ) -> Self {
        Self {
            id,
            events,
            manager,
            client,
        }
    }

    fn push(&self, event: NetworkEvent) {
        let kind = event.kind();
        if self.events.send(event).is_err() {
            log::debug!("[WebSocket {}] Connection disposed, dropping {} event", self.id, kind);
            return;
        }

        let id = self.id;
        let manager = self.manager.clone();
        let scheduled = self.client.schedule(move |context| {
            if let Some(manager) = manager.upgrade() {
                drain(&manager, id, context);
            }
        });
        if !scheduled {
            log::warn!("[WebSocket {}] JS engine stopped, dropping {} event", id, kind);
        }
    }
}

impl WebSocketListener for EventBridge {
    fn on_open(&self) {
        self.push(NetworkEvent::Open);
    }

    fn on_failure(&self, error: NetworkError) {
        log::error!("[WebSocket {}] {}", self.id, error);
        self.push(NetworkEvent::Failure(error.to_string()));
    }

    fn on_message(&self, text: String) {
        log::debug!("[WebSocket {}] Received: {}", self.id, truncate(&text, 100));
        self.push(NetworkEvent::Message(text));
    }

    fn on_closing(&self, code: u16, reason: String) {
        log::info!("[WebSocket {}] Closing: {} {}", self.id, code, reason);
        self.push(NetworkEvent::Closing { code, reason });
    }

    fn on_closed(&self, code: u16, reason: String) {
        log::info!("[WebSocket {}] Closed: {} {}", self.id, code, reason);
        self.push(NetworkEvent::Closed { code, reason });
    }
}

/// Deliver every event that has arrived for a connection, then dispose of
/// the connection if it reached CLOSED.
pub(crate) fn drain(manager: &WebSocketManager, id: u32, context: &mut Context) {
    while let Some(delivery) = manager.next_delivery(id) {
        let Some(delivery) = delivery else {
            continue;
        };
        log::debug!("[WebSocket {}] Dispatching {} to JS", id, delivery.handler_name());
        if let Err(e) = dispatch(id, delivery, context) {
            log::error!("[WebSocket {}] Handler threw: {}", id, e);
        }
    }

    if manager.dispose_if_closed(id) {
        if let Err(e) = call_global(RELEASE_FN, &[JsValue::from(id)], context) {
            log::warn!("[WebSocket {}] Failed to release script object: {}", id, e);
        }
    }
}

/// Invoke the handler slot a delivery targets. An empty or non-callable slot
/// drops the event.
fn dispatch(id: u32, delivery: Delivery, context: &mut Context) -> JsResult<()> {
    let instance = call_global(INSTANCE_FN, &[JsValue::from(id)], context)?;
    let Some(instance) = instance.as_object().map(|object| object.clone()) else {
        log::warn!("[WebSocket {}] No script object, dropping {}", id, delivery.handler_name());
        return Ok(());
    };

    let handler = instance.get(JsString::from(delivery.handler_name()), context)?;
    let Some(handler) = handler.as_callable().map(|function| function.clone()) else {
        log::debug!("[WebSocket {}] No {} handler, dropping event", id, delivery.handler_name());
        return Ok(());
    };

    let args = match delivery {
        Delivery::Open | Delivery::Error => vec![],
        Delivery::Message(text) => vec![JsValue::from(JsString::from(text.as_str()))],
        Delivery::Close(info) => vec![JsValue::from(close_info_object(&info, context))],
    };

    handler.call(&JsValue::from(instance), &args, context)?;
    Ok(())
}

/// Build the `{ code, reason }` object passed to `onclose`.
fn close_info_object(info: &CloseInfo, context: &mut Context) -> JsObject {
    ObjectInitializer::new(context)
        .property(js_string!("code"), JsValue::from(u32::from(info.code)), Attribute::all())
        .property(
            js_string!("reason"),
            JsString::from(info.reason.as_str()),
            Attribute::all(),
        )
        .build()
}

fn call_global(name: &str, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let function = context.global_object().get(JsString::from(name), context)?;
    let Some(function) = function.as_callable().map(|function| function.clone()) else {
        return Err(JsNativeError::typ()
            .with_message(format!("{} is not a function", name))
            .into());
    };
    function.call(&JsValue::undefined(), args, context)
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
