//! Deterministic multi-tab simulation.
//!
//! Hosts several coordinators on one manual clock with a shared in-memory
//! store and an in-memory broadcast bus. Delivery mirrors the browser: a
//! post reaches every *other* open endpoint, later, in per-sender order, and
//! store writes raise a storage-change signal in every other tab.

use crate::clock::{Clock, ManualClock};
use crate::config::XtabConfig;
use crate::coordinator::{Collaborators, CoordinatorEvent, Role, TabCoordinator};
use crate::error::{ConfigError, StoreError, TransportError};
use crate::lease::Lease;
use crate::message::{self, Inbound, WidgetId};
use crate::store::{MemoryStore, SharedStore};
use crate::transport::{Transport, Unsupported};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;
use tracing::warn;

/// Guard against message storms in a misbehaving scenario
const MAX_DELIVERIES_PER_FLUSH: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TabHandle(pub usize);

/// A message as it left its sender
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub from: TabHandle,
    pub at: u64,
    pub kind: String,
    pub payload: String,
    pub dropped: bool,
}

/// A coordinator event stamped with when and where it happened
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub at: u64,
    pub tab: TabHandle,
    pub event: CoordinatorEvent,
}

enum Delivery {
    Message { from: usize, payload: String },
    StorageChange { from: usize, key: Option<String> },
}

#[derive(Default)]
struct Bus {
    open: Vec<bool>,
    queue: VecDeque<Delivery>,
    history: Vec<SentMessage>,
    partitioned: HashSet<usize>,
}

struct SimTransport {
    bus: Rc<RefCell<Bus>>,
    clock: Rc<ManualClock>,
    endpoint: usize,
}

impl Transport for SimTransport {
    fn post(&self, payload: &str) -> Result<(), TransportError> {
        let mut bus = self.bus.borrow_mut();
        if !bus.open[self.endpoint] {
            return Err(TransportError::Closed);
        }
        let kind = match message::decode(payload) {
            Ok(Inbound::Message(envelope)) => envelope.body.kind().to_string(),
            Ok(Inbound::Unknown { kind, .. }) => kind,
            Err(_) => "invalid".to_string(),
        };
        let dropped = bus.partitioned.contains(&self.endpoint);
        bus.history.push(SentMessage {
            from: TabHandle(self.endpoint),
            at: self.clock.now_ms(),
            kind,
            payload: payload.to_string(),
            dropped,
        });
        if !dropped {
            bus.queue.push_back(Delivery::Message {
                from: self.endpoint,
                payload: payload.to_string(),
            });
        }
        Ok(())
    }

    fn close(&self) {
        self.bus.borrow_mut().open[self.endpoint] = false;
    }
}

/// One tab's view of the shared store; writes notify the other tabs.
struct SimStore {
    shared: Rc<MemoryStore>,
    bus: Rc<RefCell<Bus>>,
    endpoint: usize,
}

impl SimStore {
    fn notify(&self, key: &str) {
        self.bus
            .borrow_mut()
            .queue
            .push_back(Delivery::StorageChange {
                from: self.endpoint,
                key: Some(key.to_string()),
            });
    }
}

impl SharedStore for SimStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.shared.get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let previous = self.shared.get_item(key)?;
        self.shared.set_item(key, value)?;
        if previous.as_deref() != Some(value) {
            self.notify(key);
        }
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        let existed = self.shared.get_item(key)?.is_some();
        self.shared.remove_item(key)?;
        if existed {
            self.notify(key);
        }
        Ok(())
    }
}

struct SimTab {
    coordinator: TabCoordinator,
    alive: bool,
    widgets: Rc<RefCell<Vec<WidgetId>>>,
    events: Rc<RefCell<Vec<CoordinatorEvent>>>,
}

pub struct SimNetwork {
    config: XtabConfig,
    seed: u64,
    clock: Rc<ManualClock>,
    store: Rc<MemoryStore>,
    bus: Rc<RefCell<Bus>>,
    timeline: Rc<RefCell<Vec<TimelineEntry>>>,
    tabs: Vec<SimTab>,
}

impl SimNetwork {
    pub fn new(config: XtabConfig, seed: u64) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            seed,
            // Anything non-zero; a zero clock would make "never heard a
            // heartbeat" indistinguishable from "heard one at t=0".
            clock: Rc::new(ManualClock::new(1_700_000_000_000)),
            store: Rc::new(MemoryStore::new()),
            bus: Rc::new(RefCell::new(Bus::default())),
            timeline: Rc::new(RefCell::new(Vec::new())),
            tabs: Vec::new(),
        })
    }

    pub fn config(&self) -> &XtabConfig {
        &self.config
    }

    pub fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Open a tab with a working transport and run its first election.
    pub fn spawn_tab(&mut self) -> TabHandle {
        self.spawn(true, Vec::new())
    }

    pub fn spawn_tab_with_widgets(&mut self, widgets: Vec<WidgetId>) -> TabHandle {
        self.spawn(true, widgets)
    }

    /// Open a tab whose platform has no broadcast support.
    pub fn spawn_solo_tab(&mut self) -> TabHandle {
        self.spawn(false, Vec::new())
    }

    fn spawn(&mut self, with_transport: bool, widgets: Vec<WidgetId>) -> TabHandle {
        let endpoint = self.tabs.len();
        self.bus.borrow_mut().open.push(with_transport);

        let widgets = Rc::new(RefCell::new(widgets));
        let events = Rc::new(RefCell::new(Vec::new()));
        let store: Rc<dyn SharedStore> = Rc::new(SimStore {
            shared: self.store.clone(),
            bus: self.bus.clone(),
            endpoint,
        });
        let clock: Rc<dyn Clock> = self.clock.clone();
        let rng = StdRng::seed_from_u64(
            self.seed
                .wrapping_mul(31)
                .wrapping_add(endpoint as u64 * 7_919 + 1),
        );

        let widgets_source = widgets.clone();
        let events_sink = events.clone();
        let timeline = self.timeline.clone();
        let stamp_clock = self.clock.clone();
        let collaborators = Collaborators::new(store, clock)
            .with_rng(rng)
            .with_visible_widgets(move || widgets_source.borrow().clone())
            .with_observer(move |event: CoordinatorEvent| {
                timeline.borrow_mut().push(TimelineEntry {
                    at: stamp_clock.now_ms(),
                    tab: TabHandle(endpoint),
                    event: event.clone(),
                });
                events_sink.borrow_mut().push(event);
            });

        // The config was validated in `new`.
        let mut coordinator = match TabCoordinator::new(self.config.clone(), collaborators) {
            Ok(coordinator) => coordinator,
            Err(e) => unreachable!("validated config rejected: {e}"),
        };

        if with_transport {
            let bus = self.bus.clone();
            let clock = self.clock.clone();
            coordinator.init(&move |_: &str| -> Result<Box<dyn Transport>, TransportError> {
                Ok(Box::new(SimTransport {
                    bus: bus.clone(),
                    clock: clock.clone(),
                    endpoint,
                }))
            });
        } else {
            coordinator.init(&Unsupported);
        }

        self.tabs.push(SimTab {
            coordinator,
            alive: true,
            widgets,
            events,
        });
        self.deliver_pending();
        TabHandle(endpoint)
    }

    pub fn tab(&self, handle: TabHandle) -> &TabCoordinator {
        &self.tabs[handle.0].coordinator
    }

    /// Run `f` against one tab, then flush whatever it sent.
    pub fn with_tab<R>(&mut self, handle: TabHandle, f: impl FnOnce(&mut TabCoordinator) -> R) -> R {
        let result = f(&mut self.tabs[handle.0].coordinator);
        self.deliver_pending();
        result
    }

    pub fn handles(&self) -> impl Iterator<Item = TabHandle> + '_ {
        (0..self.tabs.len()).map(TabHandle)
    }

    pub fn live_handles(&self) -> Vec<TabHandle> {
        self.handles().filter(|h| self.is_alive(*h)).collect()
    }

    pub fn is_alive(&self, handle: TabHandle) -> bool {
        self.tabs[handle.0].alive
    }

    pub fn role(&self, handle: TabHandle) -> Role {
        self.tab(handle).role()
    }

    pub fn leaders(&self) -> Vec<TabHandle> {
        self.live_handles()
            .into_iter()
            .filter(|h| self.role(*h) == Role::Leader)
            .collect()
    }

    pub fn handle_of(&self, tab_id: &crate::tab_id::TabId) -> Option<TabHandle> {
        self.handles().find(|h| self.tab(*h).tab_id() == tab_id)
    }

    pub fn events(&self, handle: TabHandle) -> Vec<CoordinatorEvent> {
        self.tabs[handle.0].events.borrow().clone()
    }

    pub fn clear_events(&mut self, handle: TabHandle) {
        self.tabs[handle.0].events.borrow_mut().clear();
    }

    /// Change which widgets a tab shows and fire its visibility hook.
    pub fn set_visible_widgets(&mut self, handle: TabHandle, widgets: Vec<WidgetId>) {
        *self.tabs[handle.0].widgets.borrow_mut() = widgets;
        self.with_tab(handle, |tab| tab.notify_widget_visibility_changed());
    }

    /// Stop a tab dead: no unload notice, no more timers, no more messages.
    pub fn crash(&mut self, handle: TabHandle) {
        self.tabs[handle.0].alive = false;
        self.bus.borrow_mut().open[handle.0] = false;
    }

    /// Close a tab cleanly through `destroy`.
    pub fn destroy(&mut self, handle: TabHandle) {
        self.with_tab(handle, |tab| tab.destroy());
        self.tabs[handle.0].alive = false;
    }

    /// Drop every broadcast to or from this tab (store access still works).
    pub fn partition(&mut self, handle: TabHandle, partitioned: bool) {
        let mut bus = self.bus.borrow_mut();
        if partitioned {
            bus.partitioned.insert(handle.0);
        } else {
            bus.partitioned.remove(&handle.0);
        }
    }

    pub fn lease(&self) -> Option<Lease> {
        self.raw_lease().and_then(|raw| Lease::parse(&raw))
    }

    pub fn raw_lease(&self) -> Option<String> {
        self.store
            .get_item(&self.config.leader_key)
            .ok()
            .flatten()
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Every coordinator event across all tabs, in the order they happened
    pub fn timeline(&self) -> Vec<TimelineEntry> {
        self.timeline.borrow().clone()
    }

    pub fn history(&self) -> Vec<SentMessage> {
        self.bus.borrow().history.clone()
    }

    /// Count messages of `kind` sent by `handle` at or after `since`.
    pub fn count_sent(&self, handle: TabHandle, kind: &str, since: u64) -> usize {
        self.bus
            .borrow()
            .history
            .iter()
            .filter(|m| m.from == handle && m.kind == kind && m.at >= since)
            .count()
    }

    /// Deliver queued broadcasts and storage changes until quiet.
    pub fn deliver_pending(&mut self) {
        for _ in 0..MAX_DELIVERIES_PER_FLUSH {
            let next = self.bus.borrow_mut().queue.pop_front();
            let Some(delivery) = next else {
                return;
            };
            match delivery {
                Delivery::Message { from, payload } => {
                    for idx in 0..self.tabs.len() {
                        if idx == from || !self.tabs[idx].alive {
                            continue;
                        }
                        let reachable = {
                            let bus = self.bus.borrow();
                            bus.open[idx] && !bus.partitioned.contains(&idx)
                        };
                        if reachable {
                            self.tabs[idx].coordinator.handle_message(&payload);
                        }
                    }
                }
                Delivery::StorageChange { from, key } => {
                    for idx in 0..self.tabs.len() {
                        if idx != from && self.tabs[idx].alive {
                            self.tabs[idx]
                                .coordinator
                                .handle_storage_change(key.as_deref());
                        }
                    }
                }
            }
        }
        warn!("Simulation delivery limit reached; dropping the rest of the queue");
        self.bus.borrow_mut().queue.clear();
    }

    /// Move the clock forward by `ms`, firing every timer on the way.
    pub fn advance(&mut self, ms: u64) {
        let target = self.now() + ms;
        self.run_until(target, |_| false);
    }

    /// Advance until `done` holds or `limit_ms` elapses. Returns whether the
    /// condition was met.
    pub fn advance_until(&mut self, limit_ms: u64, done: impl Fn(&SimNetwork) -> bool) -> bool {
        let target = self.now() + limit_ms;
        self.run_until(target, done)
    }

    fn run_until(&mut self, target: u64, done: impl Fn(&SimNetwork) -> bool) -> bool {
        self.deliver_pending();
        if done(self) {
            return true;
        }
        loop {
            let next = self
                .tabs
                .iter()
                .filter(|tab| tab.alive)
                .filter_map(|tab| tab.coordinator.next_deadline())
                .min();
            let Some(deadline) = next.filter(|d| *d <= target) else {
                break;
            };
            self.clock.set(deadline.max(self.now()));
            let now = self.now();

            for idx in 0..self.tabs.len() {
                let due = self.tabs[idx].alive
                    && self.tabs[idx]
                        .coordinator
                        .next_deadline()
                        .is_some_and(|d| d <= now);
                if due {
                    self.tabs[idx].coordinator.on_timer();
                    self.deliver_pending();
                }
            }
            if done(self) {
                return true;
            }
        }
        self.clock.set(target.max(self.now()));
        done(self)
    }
}
