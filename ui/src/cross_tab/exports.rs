//! Functions exported to page JavaScript and the browser console.

use super::driver;
use dioxus::logger::tracing::warn;
use serde_json::Value;
use wasm_bindgen::prelude::*;

/// Console helper: `__xtab()` returns this tab's coordination state, or
/// `null` when coordination is not running.
#[wasm_bindgen(js_name = "__xtab")]
pub fn xtab_snapshot() -> JsValue {
    driver::snapshot()
        .and_then(|snapshot| js_sys::JSON::parse(&snapshot.to_json()).ok())
        .unwrap_or(JsValue::NULL)
}

/// Console helper: `__hamtab_debug()` toggles protocol debug logging and
/// returns the new state.
#[wasm_bindgen(js_name = "__hamtab_debug")]
pub fn hamtab_debug() -> bool {
    driver::toggle_debug()
}

/// Page hook: share a spot selection with every other tab. `null` or
/// `undefined` clears the selection.
#[wasm_bindgen(js_name = "hamtabBroadcastSpotSelection")]
pub fn hamtab_broadcast_spot_selection(spot: JsValue) {
    if spot.is_null() || spot.is_undefined() {
        driver::broadcast_spot_selection(None);
        return;
    }
    match spot_from_js(&spot) {
        Some(spot) => driver::broadcast_spot_selection(Some(spot)),
        None => warn!("Ignoring spot selection that cannot be serialized"),
    }
}

fn spot_from_js(spot: &JsValue) -> Option<Value> {
    let json = js_sys::JSON::stringify(spot).ok()?.as_string()?;
    serde_json::from_str(&json).ok()
}
