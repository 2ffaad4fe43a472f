//! Live view of this tab's coordination state, the same data `__xtab()`
//! returns in the console.

use super::app::{ROLE_LOG, XTAB_ERROR, XTAB_SNAPSHOT};
use crate::constants::BUILD_TIMESTAMP_ISO;
use dioxus::prelude::*;
use hamtab_xtab_core::{Role, Snapshot};

#[component]
pub fn XtabDiagnostics() -> Element {
    let snapshot = XTAB_SNAPSHOT.read().clone();
    let error = XTAB_ERROR.read().clone();

    rsx! {
        div {
            style: "border: 1px solid #ccc; border-radius: 6px; padding: 0.75rem; margin-bottom: 1rem;",
            h2 { "This tab" }
            if let Some(error) = error {
                p { style: "color: #f14668;", "{error}" }
            }
            match snapshot {
                Some(snapshot) => rsx! { SnapshotTable { snapshot } },
                None => rsx! { p { "Not coordinating" } },
            }
            RoleLog {}
            p { style: "font-size: 0.75rem; color: #888;", "Built {BUILD_TIMESTAMP_ISO}" }
        }
    }
}

#[component]
fn SnapshotTable(snapshot: Snapshot) -> Element {
    let now = js_sys::Date::now().max(0.0) as u64;
    let lease = match snapshot.lease_until {
        Some(until) if until > now => format!("{:.1}s left", (until - now) as f64 / 1000.0),
        Some(_) => "expired".to_string(),
        None => "none".to_string(),
    };
    let heartbeat = snapshot
        .last_heartbeat
        .map(|at| format!("{:.1}s ago", now.saturating_sub(at) as f64 / 1000.0))
        .unwrap_or_else(|| "never".to_string());
    let leader = snapshot
        .leader_id
        .as_ref()
        .map(|id| id.short().to_string())
        .unwrap_or_else(|| "-".to_string());
    let tab = snapshot.tab_id.short().to_string();
    let role = snapshot.role;
    let peers = snapshot.peer_count;
    let role_color = match snapshot.role {
        Role::Leader => "#48c774",
        Role::Follower => "#3e8ed0",
        Role::Solo => "#888",
    };
    let interests: Vec<(String, String)> = snapshot
        .interests
        .iter()
        .map(|(tab, widgets)| (tab.short().to_string(), widgets.join(", ")))
        .collect();

    rsx! {
        table {
            tr { th { "Tab" } td { "{tab}" } }
            tr {
                th { "Role" }
                td { style: "color: {role_color}; font-weight: bold;", "{role}" }
            }
            tr { th { "Leader" } td { "{leader}" } }
            tr { th { "Lease" } td { "{lease}" } }
            tr { th { "Last heartbeat" } td { "{heartbeat}" } }
            tr { th { "Peers" } td { "{peers}" } }
            tr {
                th { "Channel" }
                td { if snapshot.channel_ready { "OK" } else { "N/A" } }
            }
        }
        h3 { "Interests" }
        if interests.is_empty() {
            p { "(none recorded)" }
        }
        ul {
            for (tab, widgets) in interests {
                li { key: "{tab}", code { "{tab}" } ": {widgets}" }
            }
        }
    }
}

#[component]
fn RoleLog() -> Element {
    let log = ROLE_LOG.read().clone();
    rsx! {
        h3 { "Role changes" }
        ul {
            for (i, line) in log.into_iter().enumerate().rev() {
                li { key: "{i}", "{line}" }
            }
        }
    }
}
