//! Hosts the tab's [`TabCoordinator`] in the page.
//!
//! The coordinator only knows deadlines; this driver owns the real
//! `setTimeout`, DOM listeners and `BroadcastChannel`. Every entry point goes
//! through [`with_coordinator`], which re-arms the single timer for the next
//! deadline and then delivers queued coordinator events once the coordinator
//! is no longer borrowed, so page code reacting to an event may call straight
//! back in.

use super::channel::BroadcastOpener;
use super::error::DriverError;
use super::listeners::EventListener;
use super::platform::{describe_js_error, BrowserClock, LocalStorageStore};
use crate::widgets::visible_widget_ids;
use dioxus::logger::tracing::{debug, info, warn};
use hamtab_xtab_core::coordinator::{CoordinatorEvent, REMOTE_SPOT_EVENT};
use hamtab_xtab_core::{Collaborators, Snapshot, TabCoordinator, XtabConfig};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{CustomEvent, CustomEventInit, Event, PageTransitionEvent, StorageEvent, VisibilityState};

/// Custom DOM event the page raises whenever a widget is shown or hidden
pub const WIDGET_VISIBILITY_EVENT: &str = "hamtab:widget-vis-changed";

type Observer = Box<dyn Fn(&CoordinatorEvent)>;

struct Driver {
    coordinator: RefCell<TabCoordinator>,
    events: Rc<RefCell<VecDeque<CoordinatorEvent>>>,
    observer: Observer,
    timer: Cell<Option<i32>>,
    timer_callback: Closure<dyn FnMut()>,
    listeners: RefCell<Vec<EventListener>>,
}

// The one coordinator of this tab
thread_local! {
    static ACTIVE: RefCell<Option<Rc<Driver>>> = const { RefCell::new(None) };
    // Console debug toggle; outlives stop/start
    static DEBUG_MODE: Cell<bool> = const { Cell::new(false) };
}

/// Start cross-tab coordination for this page. `observer` sees every
/// coordinator event after the driver has handled it (remote spot selections
/// are also dispatched as a `hamtab:remote-spot-selected` DOM event).
pub fn start(
    mut config: XtabConfig,
    observer: impl Fn(&CoordinatorEvent) + 'static,
) -> Result<(), DriverError> {
    if is_running() {
        return Err(DriverError::AlreadyRunning);
    }
    let window = web_sys::window().ok_or(DriverError::NoWindow)?;
    let document = window.document().ok_or(DriverError::NoDocument)?;

    config.debug |= DEBUG_MODE.with(Cell::get);

    let events = Rc::new(RefCell::new(VecDeque::new()));
    let sink = events.clone();
    let collaborators = Collaborators::new(Rc::new(LocalStorageStore::open()), Rc::new(BrowserClock))
        .with_visible_widgets(visible_widget_ids)
        .with_observer(move |event| sink.borrow_mut().push_back(event));
    let coordinator = TabCoordinator::new(config, collaborators)?;

    let driver = Rc::new(Driver {
        coordinator: RefCell::new(coordinator),
        events,
        observer: Box::new(observer),
        timer: Cell::new(None),
        timer_callback: Closure::<dyn FnMut()>::new(|| {
            with_coordinator(|coordinator| coordinator.on_timer());
        }),
        listeners: RefCell::new(Vec::new()),
    });
    ACTIVE.with(|active| *active.borrow_mut() = Some(driver.clone()));

    match install_listeners(&window, &document) {
        Ok(listeners) => *driver.listeners.borrow_mut() = listeners,
        Err(e) => {
            ACTIVE.with(|active| active.borrow_mut().take());
            return Err(e);
        }
    }

    let opener = BroadcastOpener::new(
        |raw| {
            with_coordinator(|coordinator| coordinator.handle_message(&raw));
        },
        || {
            with_coordinator(|coordinator| coordinator.handle_message_error());
        },
    );
    with_coordinator(|coordinator| coordinator.init(&opener));
    info!("Cross-tab coordination started");
    Ok(())
}

/// Tear down: announce departure, stop timers, remove listeners, close the
/// channel. Safe to call when not running.
pub fn stop() {
    let Some(driver) = ACTIVE.with(|active| active.borrow_mut().take()) else {
        return;
    };
    match driver.coordinator.try_borrow_mut() {
        Ok(mut coordinator) => coordinator.destroy(),
        Err(_) => warn!("Cross-tab coordinator busy during stop, skipping departure notice"),
    }
    driver.clear_timer();
    driver.listeners.borrow_mut().clear();
    driver.drain_events();
    info!("Cross-tab coordination stopped");
}

pub fn is_running() -> bool {
    ACTIVE.with(|active| active.borrow().is_some())
}

pub fn snapshot() -> Option<Snapshot> {
    let driver = active()?;
    let coordinator = driver.coordinator.try_borrow().ok()?;
    Some(coordinator.snapshot())
}

/// Share a spot selection with the other tabs (`None` deselects).
pub fn broadcast_spot_selection(spot: Option<Value>) {
    with_coordinator(|coordinator| coordinator.broadcast_spot_selection(spot));
}

/// Tell the coordinator the visible widget set changed.
pub fn notify_widget_visibility_changed() {
    with_coordinator(|coordinator| coordinator.notify_widget_visibility_changed());
}

/// Flip protocol debug logging for this tab. Returns the new state.
pub fn toggle_debug() -> bool {
    let debug = !DEBUG_MODE.with(Cell::get);
    DEBUG_MODE.with(|mode| mode.set(debug));
    if with_coordinator(|coordinator| coordinator.set_debug(debug)).is_none() {
        let state = if debug { "ON" } else { "OFF" };
        info!("[xtab] Debug mode: {}", state);
    }
    debug
}

fn active() -> Option<Rc<Driver>> {
    ACTIVE.with(|active| active.borrow().clone())
}

/// Run `f` against the coordinator, then re-arm the timer and flush events.
/// Returns `None` when coordination is not running or the call re-entered
/// an in-progress one.
fn with_coordinator<R>(f: impl FnOnce(&mut TabCoordinator) -> R) -> Option<R> {
    let driver = active()?;
    let result = {
        let Ok(mut coordinator) = driver.coordinator.try_borrow_mut() else {
            warn!("Cross-tab coordinator re-entered, dropping nested call");
            return None;
        };
        f(&mut coordinator)
    };
    driver.rearm_timer();
    driver.drain_events();
    Some(result)
}

impl Driver {
    fn rearm_timer(&self) {
        self.clear_timer();
        let Ok(coordinator) = self.coordinator.try_borrow() else {
            return;
        };
        let Some(deadline) = coordinator.next_deadline() else {
            return;
        };
        let now = js_sys::Date::now().max(0.0) as u64;
        let delay = deadline.saturating_sub(now).min(i32::MAX as u64) as i32;

        let Some(window) = web_sys::window() else {
            return;
        };
        match window.set_timeout_with_callback_and_timeout_and_arguments_0(
            self.timer_callback.as_ref().unchecked_ref(),
            delay,
        ) {
            Ok(handle) => self.timer.set(Some(handle)),
            Err(e) => warn!("Failed to arm cross-tab timer: {:?}", e),
        }
    }

    fn clear_timer(&self) {
        if let (Some(handle), Some(window)) = (self.timer.take(), web_sys::window()) {
            window.clear_timeout_with_handle(handle);
        }
    }

    fn drain_events(&self) {
        loop {
            let next = self.events.borrow_mut().pop_front();
            let Some(event) = next else {
                break;
            };
            if let Some(detail) = event.spot_detail() {
                dispatch_remote_spot_event(&detail);
            }
            (self.observer)(&event);
        }
    }
}

fn dispatch_remote_spot_event(detail: &impl serde::Serialize) {
    let Some(document) = web_sys::window().and_then(|w| w.document()) else {
        return;
    };
    let detail = match serde_json::to_string(detail)
        .ok()
        .and_then(|json| js_sys::JSON::parse(&json).ok())
    {
        Some(detail) => detail,
        None => {
            warn!("Failed to convert spot selection for the page");
            return;
        }
    };
    let init = CustomEventInit::new();
    init.set_detail(&detail);
    match CustomEvent::new_with_event_init_dict(REMOTE_SPOT_EVENT, &init) {
        Ok(event) => {
            if let Err(e) = document.dispatch_event(&event) {
                warn!(
                    "Failed to dispatch {}: {}",
                    REMOTE_SPOT_EVENT,
                    describe_js_error(&e)
                );
            }
        }
        Err(e) => warn!("Failed to create {} event: {:?}", REMOTE_SPOT_EVENT, e),
    }
}

fn install_listeners(
    window: &web_sys::Window,
    document: &web_sys::Document,
) -> Result<Vec<EventListener>, DriverError> {
    let visibility_document = document.clone();
    Ok(vec![
        EventListener::new(window, "storage", |event: Event| {
            let Some(event) = event.dyn_ref::<StorageEvent>() else {
                return;
            };
            let key = event.key();
            with_coordinator(|coordinator| coordinator.handle_storage_change(key.as_deref()));
        })?,
        EventListener::new(document, "visibilitychange", move |_: Event| {
            let visible = visibility_document.visibility_state() == VisibilityState::Visible;
            debug!("Visibility changed: {}", visible);
            with_coordinator(|coordinator| coordinator.handle_visibility_change(visible));
        })?,
        EventListener::new(window, "beforeunload", |_: Event| {
            with_coordinator(|coordinator| coordinator.handle_unload());
        })?,
        EventListener::new(window, "pagehide", |_: Event| {
            with_coordinator(|coordinator| coordinator.handle_unload());
        })?,
        EventListener::new(window, "pageshow", |event: Event| {
            let restored = event
                .dyn_ref::<PageTransitionEvent>()
                .is_some_and(|event| event.persisted());
            if restored {
                with_coordinator(|coordinator| coordinator.handle_page_restored());
            }
        })?,
        EventListener::new(document, WIDGET_VISIBILITY_EVENT, |_: Event| {
            notify_widget_visibility_changed();
        })?,
    ])
}
