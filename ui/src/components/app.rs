use super::{diagnostics::XtabDiagnostics, spot_picker::SpotPicker, widget_panel::WidgetPanel};
use crate::cross_tab;
use dioxus::logger::tracing::{error, info};
use dioxus::prelude::*;
use futures::StreamExt;
use hamtab_xtab_core::coordinator::CoordinatorEvent;
use hamtab_xtab_core::{Snapshot, XtabConfig};
use serde_json::Value;
use std::time::Duration;

/// Most recent role transitions, newest last
const ROLE_LOG_LEN: usize = 20;
const SNAPSHOT_REFRESH: Duration = Duration::from_secs(1);

pub static XTAB_SNAPSHOT: GlobalSignal<Option<Snapshot>> = Global::new(|| None);
pub static XTAB_ERROR: GlobalSignal<Option<String>> = Global::new(|| None);
pub static ROLE_LOG: GlobalSignal<Vec<String>> = Global::new(Vec::new);
pub static SELECTED_SPOT: GlobalSignal<SpotSelection> = Global::new(|| SpotSelection::None);

#[derive(Debug, Clone, PartialEq)]
pub enum SpotSelection {
    None,
    Local(Value),
    Remote(Value),
}

#[component]
pub fn App() -> Element {
    info!("App component loaded");

    // Coordinator callbacks run outside the component runtime, so events
    // are forwarded here before touching any signal.
    let events = use_coroutine(move |mut rx: UnboundedReceiver<CoordinatorEvent>| async move {
        while let Some(event) = rx.next().await {
            apply_event(event);
            refresh_snapshot();
        }
    });

    use_hook(move || {
        let tx = events.tx();
        let started = cross_tab::start(XtabConfig::default(), move |event| {
            let _ = tx.unbounded_send(event.clone());
        });
        if let Err(e) = started {
            error!("Cross-tab coordination unavailable: {}", e);
            *XTAB_ERROR.write() = Some(e.to_string());
        }
        refresh_snapshot();
    });

    use_drop(cross_tab::stop);

    use_future(|| async {
        loop {
            futures_timer::Delay::new(SNAPSHOT_REFRESH).await;
            refresh_snapshot();
        }
    });

    rsx! {
        div {
            style: "font-family: sans-serif; max-width: 960px; margin: 0 auto; padding: 1rem;",
            h1 { "HamTab cross-tab coordination" }
            XtabDiagnostics {}
            div {
                style: "display: flex; gap: 1rem; flex-wrap: wrap;",
                WidgetPanel {}
                SpotPicker {}
            }
        }
    }
}

fn apply_event(event: CoordinatorEvent) {
    match event {
        CoordinatorEvent::RoleChanged {
            from,
            to,
            leader_id,
        } => {
            let time = String::from(js_sys::Date::new_0().to_locale_time_string("en-US"));
            let leader = leader_id
                .as_ref()
                .map(|id| id.short().to_string())
                .unwrap_or_else(|| "-".to_string());
            let mut log = ROLE_LOG.write();
            log.push(format!("{} {} -> {} (leader {})", time, from, to, leader));
            if log.len() > ROLE_LOG_LEN {
                let excess = log.len() - ROLE_LOG_LEN;
                log.drain(..excess);
            }
        }
        CoordinatorEvent::RemoteSpotSelected { spot } => {
            *SELECTED_SPOT.write() = match spot {
                Some(spot) => SpotSelection::Remote(spot),
                None => SpotSelection::None,
            };
        }
    }
}

pub fn refresh_snapshot() {
    let snapshot = cross_tab::snapshot();
    if *XTAB_SNAPSHOT.peek() != snapshot {
        *XTAB_SNAPSHOT.write() = snapshot;
    }
}
