//! The leadership lease: a single `{tabId, leaseUntil}` record in shared
//! storage. It is the only durable cross-tab state and the fallback signal
//! when broadcasts are lost.

use crate::error::StoreError;
use crate::store::SharedStore;
use crate::tab_id::TabId;
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lease {
    pub tab_id: TabId,
    pub lease_until: u64,
}

// `leaseUntil` is a JS number, so accept any numeric form on the way in.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLease {
    tab_id: String,
    lease_until: f64,
}

impl Lease {
    /// Parse a stored record. Anything that isn't a well-formed lease is `None`.
    pub fn parse(raw: &str) -> Option<Lease> {
        let raw: RawLease = serde_json::from_str(raw).ok()?;
        if !raw.lease_until.is_finite() {
            return None;
        }
        Some(Lease {
            tab_id: TabId::from(raw.tab_id),
            lease_until: raw.lease_until.max(0.0) as u64,
        })
    }

    pub fn to_json(&self) -> String {
        // A struct of a string and an integer always serializes.
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn is_valid(&self, now_ms: u64) -> bool {
        self.lease_until > now_ms
    }

    pub fn is_held_by(&self, tab_id: &TabId) -> bool {
        &self.tab_id == tab_id
    }
}

/// `lease && lease.leaseUntil > now`
pub fn is_lease_valid(lease: Option<&Lease>, now_ms: u64) -> bool {
    lease.is_some_and(|l| l.is_valid(now_ms))
}

/// Reads and writes the lease record under one key.
#[derive(Clone)]
pub struct LeaseManager {
    store: Rc<dyn SharedStore>,
    key: String,
    lease_ms: u64,
}

impl LeaseManager {
    pub fn new(store: Rc<dyn SharedStore>, key: impl Into<String>, lease_ms: u64) -> Self {
        Self {
            store,
            key: key.into(),
            lease_ms,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn read(&self) -> Option<Lease> {
        match self.store.get_item(&self.key) {
            Ok(Some(raw)) => Lease::parse(&raw),
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read lease: {}", e);
                None
            }
        }
    }

    /// Claim or renew. Unconditional overwrite; callers confirm ownership by
    /// reading back.
    pub fn write(&self, tab_id: &TabId, now_ms: u64) -> Result<Lease, StoreError> {
        let lease = Lease {
            tab_id: tab_id.clone(),
            lease_until: now_ms + self.lease_ms,
        };
        self.store.set_item(&self.key, &lease.to_json())?;
        Ok(lease)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.remove_item(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn manager() -> (Rc<MemoryStore>, LeaseManager) {
        let store = Rc::new(MemoryStore::new());
        let manager = LeaseManager::new(store.clone(), "lease", 6_000);
        (store, manager)
    }

    #[test]
    fn test_write_then_read() {
        let (_, leases) = manager();
        let tab = TabId::from("aaaa");
        let written = leases.write(&tab, 1_000).unwrap();
        assert_eq!(written.lease_until, 7_000);
        assert_eq!(leases.read(), Some(written));
    }

    #[test]
    fn test_stored_format_is_camel_case_json() {
        let (store, leases) = manager();
        leases.write(&TabId::from("abc"), 10).unwrap();
        let raw = store.get_item("lease").unwrap().unwrap();
        assert_eq!(raw, r#"{"tabId":"abc","leaseUntil":6010}"#);
    }

    #[test]
    fn test_missing_or_malformed_reads_as_none() {
        let (store, leases) = manager();
        assert_eq!(leases.read(), None);

        for bad in [
            "not json",
            "null",
            "42",
            r#"{"tabId": 5, "leaseUntil": 100}"#,
            r#"{"tabId": "x"}"#,
            r#"{"leaseUntil": 100}"#,
            r#"{"tabId": "x", "leaseUntil": "soon"}"#,
        ] {
            store.set_item("lease", bad).unwrap();
            assert_eq!(leases.read(), None, "input {bad:?} should not parse");
        }
    }

    #[test]
    fn test_fractional_lease_until_accepted() {
        let lease = Lease::parse(r#"{"tabId":"x","leaseUntil":1700000000123.5}"#).unwrap();
        assert_eq!(lease.lease_until, 1_700_000_000_123);
    }

    #[test]
    fn test_validity_is_strict() {
        let lease = Lease {
            tab_id: TabId::from("x"),
            lease_until: 500,
        };
        assert!(lease.is_valid(499));
        assert!(!lease.is_valid(500));
        assert!(is_lease_valid(Some(&lease), 0));
        assert!(!is_lease_valid(None, 0));
    }

    #[test]
    fn test_clear_removes_record() {
        let (store, leases) = manager();
        leases.write(&TabId::from("x"), 0).unwrap();
        leases.clear().unwrap();
        assert!(store.is_empty());
        assert_eq!(leases.read(), None);
    }
}
