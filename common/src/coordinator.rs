//! Per-tab coordinator: leader election over a shared lease plus broadcast
//! heartbeats, widget-interest aggregation and spot-selection relay.
//!
//! The coordinator owns no real timers or sockets. The host feeds it inbound
//! messages and DOM signals, asks [`TabCoordinator::next_deadline`] when to
//! call back, and calls [`TabCoordinator::on_timer`] once that time passes.

/// Protocol chatter, logged only while the coordinator's debug mode is on.
macro_rules! chatter {
    ($coordinator:expr, $($arg:tt)+) => {
        if $coordinator.debug {
            tracing::debug!($($arg)+);
        }
    };
}

mod dispatch;
mod election;
mod heartbeat;

use crate::clock::Clock;
use crate::config::XtabConfig;
use crate::error::ConfigError;
use crate::interests::InterestRegistry;
use crate::lease::LeaseManager;
use crate::message::{self, MessageBody, WidgetId};
use crate::snapshot::Snapshot;
use crate::store::SharedStore;
use crate::tab_id::TabId;
use crate::timers::{Debouncer, Interval, OneShot};
use crate::transport::{ChannelOpener, Transport};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::rc::Rc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Leader,
    Follower,
    /// No coordination: transport unavailable, torn down, or not yet elected
    Solo,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Leader => "leader",
            Role::Follower => "follower",
            Role::Solo => "solo",
        })
    }
}

/// Notifications for the embedding UI
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent {
    RoleChanged {
        from: Role,
        to: Role,
        leader_id: Option<TabId>,
    },
    /// Another tab selected a spot (`None` clears the selection)
    RemoteSpotSelected { spot: Option<Value> },
}

/// DOM event raised in the page when another tab selects a spot
pub const REMOTE_SPOT_EVENT: &str = "hamtab:remote-spot-selected";

/// `detail` of a [`REMOTE_SPOT_EVENT`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotSelectedDetail {
    pub spot: Option<Value>,
}

impl CoordinatorEvent {
    /// The DOM event detail for a remote spot selection, if this is one.
    pub fn spot_detail(&self) -> Option<SpotSelectedDetail> {
        match self {
            CoordinatorEvent::RemoteSpotSelected { spot } => Some(SpotSelectedDetail {
                spot: spot.clone(),
            }),
            CoordinatorEvent::RoleChanged { .. } => None,
        }
    }
}

/// Everything the coordinator needs from its host
pub struct Collaborators {
    pub store: Rc<dyn SharedStore>,
    pub clock: Rc<dyn Clock>,
    pub rng: Box<dyn RngCore>,
    pub visible_widgets: Box<dyn Fn() -> Vec<WidgetId>>,
    pub observer: Box<dyn FnMut(CoordinatorEvent)>,
}

impl Collaborators {
    pub fn new(store: Rc<dyn SharedStore>, clock: Rc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            rng: Box::new(StdRng::from_entropy()),
            visible_widgets: Box::new(Vec::<WidgetId>::new),
            observer: Box::new(|_| {}),
        }
    }

    pub fn with_rng(mut self, rng: impl RngCore + 'static) -> Self {
        self.rng = Box::new(rng);
        self
    }

    pub fn with_visible_widgets(mut self, widgets: impl Fn() -> Vec<WidgetId> + 'static) -> Self {
        self.visible_widgets = Box::new(widgets);
        self
    }

    pub fn with_observer(mut self, observer: impl FnMut(CoordinatorEvent) + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    /// Transport unavailable or destroyed; nothing changes any more
    Terminal,
}

/// At most one role timer runs at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoleTimer {
    Idle,
    Heartbeat(Interval),
    MissDetection(Interval),
}

impl RoleTimer {
    fn deadline(&self) -> Option<u64> {
        match self {
            RoleTimer::Idle => None,
            RoleTimer::Heartbeat(interval) | RoleTimer::MissDetection(interval) => {
                Some(interval.deadline())
            }
        }
    }
}

pub struct TabCoordinator {
    config: XtabConfig,
    tab_id: TabId,
    role: Role,
    leader_id: Option<TabId>,
    last_heartbeat: Option<u64>,
    peer_count: usize,
    interests: InterestRegistry,
    leases: LeaseManager,
    clock: Rc<dyn Clock>,
    rng: Box<dyn RngCore>,
    visible_widgets: Box<dyn Fn() -> Vec<WidgetId>>,
    observer: Box<dyn FnMut(CoordinatorEvent)>,
    transport: Option<Box<dyn Transport>>,
    lifecycle: Lifecycle,
    role_timer: RoleTimer,
    election: OneShot,
    interest_debounce: Debouncer,
    departure_sent: bool,
    debug: bool,
}

impl TabCoordinator {
    /// Build a coordinator with a fresh tab id. Nothing is sent or stored
    /// until [`init`](Self::init).
    pub fn new(config: XtabConfig, collaborators: Collaborators) -> Result<Self, ConfigError> {
        config.validate()?;
        let Collaborators {
            store,
            clock,
            mut rng,
            visible_widgets,
            observer,
        } = collaborators;

        let tab_id = TabId::generate(rng.as_mut());
        let leases = LeaseManager::new(store, config.leader_key.clone(), config.lease_ms);
        let interest_debounce = Debouncer::new(config.interest_debounce_ms);
        let debug = config.debug;

        Ok(Self {
            config,
            tab_id,
            role: Role::Solo,
            leader_id: None,
            last_heartbeat: None,
            peer_count: 0,
            interests: InterestRegistry::new(),
            leases,
            clock,
            rng,
            visible_widgets,
            observer,
            transport: None,
            lifecycle: Lifecycle::Created,
            role_timer: RoleTimer::Idle,
            election: OneShot::default(),
            interest_debounce,
            departure_sent: false,
            debug,
        })
    }

    pub fn tab_id(&self) -> &TabId {
        &self.tab_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn leader_id(&self) -> Option<&TabId> {
        self.leader_id.as_ref()
    }

    pub fn peer_count(&self) -> usize {
        self.peer_count
    }

    pub fn last_heartbeat(&self) -> Option<u64> {
        self.last_heartbeat
    }

    pub fn interests(&self) -> &InterestRegistry {
        &self.interests
    }

    pub fn config(&self) -> &XtabConfig {
        &self.config
    }

    pub fn is_channel_ready(&self) -> bool {
        self.transport.is_some()
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Switch protocol chatter on or off at runtime.
    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
        let state = if debug { "ON" } else { "OFF" };
        info!("[xtab {}] Debug mode: {}", self.tag(), state);
    }

    pub fn is_election_pending(&self) -> bool {
        self.election.is_armed()
    }

    /// Open the transport and run the first election. Without a transport
    /// the tab stays solo for good.
    pub fn init<O: ChannelOpener + ?Sized>(&mut self, opener: &O) {
        if self.lifecycle != Lifecycle::Created {
            warn!("[xtab {}] init called twice, ignoring", self.tag());
            return;
        }
        info!("[xtab {}] Initializing tab", self.tag());

        match opener.open(&self.config.channel_name) {
            Ok(transport) => {
                self.transport = Some(transport);
                self.lifecycle = Lifecycle::Running;
                self.attempt_election();
            }
            Err(e) => {
                info!("[xtab {}] {} - staying solo", self.tag(), e);
                self.lifecycle = Lifecycle::Terminal;
                self.become_solo("broadcast transport unavailable");
            }
        }
    }

    /// Announce departure, stop every timer, close the transport and drop to
    /// solo. The coordinator is inert afterwards.
    pub fn destroy(&mut self) {
        if self.lifecycle == Lifecycle::Terminal && self.transport.is_none() {
            return;
        }
        // An earlier unload notice may belong to a navigation that never
        // happened; the real close always says goodbye.
        self.departure_sent = false;
        self.handle_unload();
        if let Some(transport) = self.transport.take() {
            transport.close();
        }
        self.lifecycle = Lifecycle::Terminal;
        self.become_solo("destroyed");
    }

    /// Earliest pending timer deadline, in clock milliseconds
    pub fn next_deadline(&self) -> Option<u64> {
        [
            self.election.deadline(),
            self.interest_debounce.deadline(),
            self.role_timer.deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Fire every timer that is due at the current clock time.
    pub fn on_timer(&mut self) {
        if !self.is_running() {
            return;
        }
        if self.departure_sent {
            self.resume_after_cancelled_unload();
        }
        let now = self.now();

        if self.election.take_if_due(now) {
            self.attempt_election();
        }

        let tick = match &mut self.role_timer {
            RoleTimer::Heartbeat(interval) => interval.take_if_due(now).then_some(Role::Leader),
            RoleTimer::MissDetection(interval) => {
                interval.take_if_due(now).then_some(Role::Follower)
            }
            RoleTimer::Idle => None,
        };
        match tick {
            Some(Role::Leader) => self.leader_heartbeat_tick(),
            Some(Role::Follower) => self.follower_miss_detection_tick(),
            _ => {}
        }

        if self.interest_debounce.take_if_due(now) {
            self.broadcast_interests();
        }
    }

    /// The set of visible widgets changed somewhere in this tab.
    pub fn notify_widget_visibility_changed(&mut self) {
        self.schedule_broadcast_interests();
    }

    /// Record this tab's visible widgets and announce them to the leader.
    pub fn broadcast_interests(&mut self) {
        let widgets = (self.visible_widgets)();
        self.interests.record(self.tab_id.clone(), widgets);
        let widgets: Vec<WidgetId> = self
            .interests
            .get(&self.tab_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        chatter!(self, "[xtab {}] Announced interests: [{}]", self.tag(), widgets.join(", "));
        self.broadcast(MessageBody::InterestAnnounce { widgets });
    }

    /// Share a local spot selection with every other tab; `None` deselects.
    pub fn broadcast_spot_selection(&mut self, spot: Option<Value>) {
        if self.transport.is_none() {
            return;
        }
        self.broadcast(MessageBody::SpotSelected { spot });
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            tab_id: self.tab_id.clone(),
            role: self.role,
            leader_id: self.leader_id.clone(),
            lease_until: self.leases.read().map(|lease| lease.lease_until),
            last_heartbeat: self.last_heartbeat,
            peer_count: self.peer_count,
            channel_ready: self.is_channel_ready(),
            interests: self.interests.serialize(),
        }
    }

    /// Timers still run after an unload notice, so the page stayed. Re-arm
    /// the notice and re-announce interests the leader has dropped.
    fn resume_after_cancelled_unload(&mut self) {
        info!("[xtab {}] Unload was cancelled, still here", self.tag());
        self.departure_sent = false;
        self.schedule_broadcast_interests();
    }

    fn schedule_broadcast_interests(&mut self) {
        if !self.is_running() {
            return;
        }
        let now = self.now();
        self.interest_debounce.trigger(now);
    }

    fn broadcast(&self, body: MessageBody) {
        let Some(transport) = self.transport.as_ref() else {
            chatter!(self, "[xtab {}] No transport, dropping {}", self.tag(), body.kind());
            return;
        };
        let payload = match message::encode(&body, &self.tab_id, self.now()) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("[xtab {}] Failed to encode {}: {}", self.tag(), body.kind(), e);
                return;
            }
        };
        if let Err(e) = transport.post(&payload) {
            warn!("[xtab {}] Broadcast failed: {}", self.tag(), e);
        }
    }

    fn set_role(&mut self, role: Role) {
        let from = self.role;
        self.role = role;
        if from != role {
            info!(
                "[xtab {}] Role: {} -> {} (leader: {})",
                self.tag(),
                from,
                role,
                self.leader_id.as_ref().map(TabId::short).unwrap_or("?")
            );
            let leader_id = self.leader_id.clone();
            (self.observer)(CoordinatorEvent::RoleChanged {
                from,
                to: role,
                leader_id,
            });
        }
    }

    fn emit(&mut self, event: CoordinatorEvent) {
        (self.observer)(event);
    }

    fn stop_timers(&mut self) {
        self.role_timer = RoleTimer::Idle;
        self.election.cancel();
    }

    fn is_running(&self) -> bool {
        self.lifecycle == Lifecycle::Running
    }

    fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    fn tag(&self) -> &str {
        self.tab_id.short()
    }
}
