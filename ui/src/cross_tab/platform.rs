//! Browser implementations of the coordinator's shared store and clock.

use dioxus::logger::tracing::warn;
use hamtab_xtab_core::clock::Clock;
use hamtab_xtab_core::error::StoreError;
use hamtab_xtab_core::store::SharedStore;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::Storage;

/// `localStorage` of the page's origin. Storage may be missing (private
/// browsing, sandboxed frames); every access then fails with
/// [`StoreError::Unavailable`] and the coordinator treats the lease as absent.
pub struct LocalStorageStore {
    storage: Option<Storage>,
}

impl LocalStorageStore {
    pub fn open() -> Self {
        let storage = match web_sys::window().map(|w| w.local_storage()) {
            Some(Ok(Some(storage))) => Some(storage),
            _ => {
                warn!("localStorage is not available, lease coordination is degraded");
                None
            }
        };
        Self { storage }
    }

    fn storage(&self) -> Result<&Storage, StoreError> {
        self.storage
            .as_ref()
            .ok_or_else(|| StoreError::Unavailable("localStorage is not available".to_string()))
    }
}

impl SharedStore for LocalStorageStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.storage()?
            .get_item(key)
            .map_err(|e| StoreError::Unavailable(describe_js_error(&e)))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.storage()?
            .set_item(key, value)
            .map_err(|e| StoreError::Write {
                key: key.to_string(),
                reason: describe_js_error(&e),
            })
    }

    fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        self.storage()?
            .remove_item(key)
            .map_err(|e| StoreError::Remove {
                key: key.to_string(),
                reason: describe_js_error(&e),
            })
    }
}

/// Wall clock in epoch milliseconds
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserClock;

impl Clock for BrowserClock {
    fn now_ms(&self) -> u64 {
        js_sys::Date::now().max(0.0) as u64
    }
}

/// Human-readable text for a thrown JS value (DOMException, Error or other).
pub fn describe_js_error(value: &JsValue) -> String {
    if let Some(error) = value.dyn_ref::<js_sys::Error>() {
        return String::from(error.message());
    }
    value
        .as_string()
        .unwrap_or_else(|| format!("{:?}", value))
}
