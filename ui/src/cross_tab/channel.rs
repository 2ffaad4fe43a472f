//! `BroadcastChannel` transport.

use super::platform::describe_js_error;
use hamtab_xtab_core::error::TransportError;
use hamtab_xtab_core::transport::{ChannelOpener, Transport};
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{BroadcastChannel, MessageEvent};

pub struct BroadcastTransport {
    channel: BroadcastChannel,
    // Kept alive for as long as the channel holds them as handlers
    _onmessage: Closure<dyn FnMut(MessageEvent)>,
    _onmessageerror: Closure<dyn FnMut(MessageEvent)>,
}

impl Transport for BroadcastTransport {
    fn post(&self, payload: &str) -> Result<(), TransportError> {
        // Posted as a structured object; tabs still on the script build drop
        // anything that is not one.
        let message = js_sys::JSON::parse(payload)
            .map_err(|e| TransportError::Send(describe_js_error(&e)))?;
        self.channel
            .post_message(&message)
            .map_err(|e| TransportError::Send(describe_js_error(&e)))
    }

    fn close(&self) {
        self.channel.set_onmessage(None);
        self.channel.set_onmessageerror(None);
        self.channel.close();
    }
}

/// Opens a `BroadcastChannel` and routes its inbound traffic to the given
/// handlers. Handlers are attached before the channel is handed out, so
/// nothing the coordinator sends can race an unwired receiver.
pub struct BroadcastOpener {
    on_message: Rc<dyn Fn(String)>,
    on_error: Rc<dyn Fn()>,
}

impl BroadcastOpener {
    pub fn new(on_message: impl Fn(String) + 'static, on_error: impl Fn() + 'static) -> Self {
        Self {
            on_message: Rc::new(on_message),
            on_error: Rc::new(on_error),
        }
    }
}

impl ChannelOpener for BroadcastOpener {
    fn open(&self, channel_name: &str) -> Result<Box<dyn Transport>, TransportError> {
        // Throws a ReferenceError where the API does not exist.
        let channel = BroadcastChannel::new(channel_name)
            .map_err(|e| TransportError::Unsupported(describe_js_error(&e)))?;

        let on_message = self.on_message.clone();
        let onmessage = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
            if let Some(raw) = payload_text(&event.data()) {
                on_message(raw);
            }
        });
        let on_error = self.on_error.clone();
        let onmessageerror =
            Closure::<dyn FnMut(MessageEvent)>::new(move |_event: MessageEvent| on_error());

        channel.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
        channel.set_onmessageerror(Some(onmessageerror.as_ref().unchecked_ref()));

        Ok(Box::new(BroadcastTransport {
            channel,
            _onmessage: onmessage,
            _onmessageerror: onmessageerror,
        }))
    }
}

/// Messages arrive as structured objects; bare JSON text is accepted too.
/// Either way the decoder sees the same text.
fn payload_text(data: &JsValue) -> Option<String> {
    if let Some(text) = data.as_string() {
        return Some(text);
    }
    if data.is_null() || data.is_undefined() {
        return None;
    }
    js_sys::JSON::stringify(data)
        .ok()
        .and_then(|text| text.as_string())
}
