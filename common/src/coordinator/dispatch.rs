use super::{CoordinatorEvent, Role, RoleTimer, TabCoordinator};
use crate::message::{self, Envelope, Inbound, MessageBody, SerializedInterests, WidgetId};
use crate::lease::is_lease_valid;
use crate::tab_id::TabId;
use serde_json::Value;
use tracing::{info, warn};

impl TabCoordinator {
    /// Handle one raw payload from the broadcast transport.
    pub fn handle_message(&mut self, raw: &str) {
        if !self.is_running() {
            return;
        }
        let inbound = match message::decode(raw) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!("[xtab {}] Dropping undecodable message: {}", self.tag(), e);
                return;
            }
        };
        if inbound.sender_id() == &self.tab_id {
            return;
        }

        match inbound {
            Inbound::Message(envelope) => self.dispatch(envelope),
            Inbound::Unknown { sender_id, kind } => {
                chatter!(
                    self,
                    "[xtab {}] Unknown message type {:?} from {}",
                    self.tag(),
                    kind,
                    sender_id.short()
                );
            }
        }
    }

    /// The transport could not deserialize an inbound message.
    pub fn handle_message_error(&self) {
        warn!("[xtab {}] Message deserialization error", self.tag());
    }

    fn dispatch(&mut self, envelope: Envelope) {
        let Envelope {
            body, sender_id, ..
        } = envelope;

        match body {
            MessageBody::LeaderHeartbeat {
                interests,
                peer_count,
            } => self.on_leader_heartbeat(sender_id, &interests, peer_count),
            MessageBody::LeaderResign => {
                info!("[xtab {}] Leader {} resigned", self.tag(), sender_id.short());
                self.interests.remove(&sender_id);
                if self.role == Role::Follower {
                    self.abandon_leader("Leader resigned");
                }
            }
            MessageBody::InterestAnnounce { widgets } => {
                self.on_interest_announce(sender_id, widgets);
            }
            MessageBody::SpotSelected { spot } => self.on_spot_selected(&sender_id, spot),
            MessageBody::TabClosing => {
                self.interests.remove(&sender_id);
                if self.role == Role::Follower && self.leader_id.as_ref() == Some(&sender_id) {
                    self.abandon_leader("Leader tab closing");
                }
            }
            MessageBody::Unknown => {}
        }
    }

    fn on_leader_heartbeat(
        &mut self,
        sender_id: TabId,
        interests: &SerializedInterests,
        peer_count: usize,
    ) {
        let now = self.now();
        if self.role == Role::Leader && !self.yield_to_foreign_lease(now) {
            return;
        }

        // A heartbeat supersedes a pending election and restarts
        // miss-detection under the sender.
        let following_sender = self.role == Role::Follower
            && self.leader_id.as_ref() == Some(&sender_id)
            && !self.election.is_armed()
            && matches!(self.role_timer, RoleTimer::MissDetection(_));
        if !following_sender {
            self.become_follower(Some(sender_id.clone()));
        }

        self.last_heartbeat = Some(now);
        self.leader_id = Some(sender_id);
        self.peer_count = peer_count;
        self.interests.mirror_from_leader(&self.tab_id, interests);
    }

    fn on_interest_announce(&mut self, sender_id: TabId, widgets: Vec<WidgetId>) {
        if self.role != Role::Leader {
            return;
        }
        chatter!(
            self,
            "[xtab {}] Interests from {}: [{}]",
            self.tag(),
            sender_id.short(),
            widgets.join(", ")
        );
        self.interests.record(sender_id, widgets);
    }

    fn on_spot_selected(&mut self, sender_id: &TabId, spot: Option<Value>) {
        let label = spot
            .as_ref()
            .and_then(|s| s.get("callsign").or_else(|| s.get("activator")))
            .and_then(Value::as_str)
            .unwrap_or("(deselect)");
        chatter!(
            self,
            "[xtab {}] Remote spot selection from {}: {}",
            self.tag(),
            sender_id.short(),
            label
        );
        self.emit(CoordinatorEvent::RemoteSpotSelected { spot });
    }

    /// The shared store changed in another tab. `None` means the whole store
    /// was cleared.
    pub fn handle_storage_change(&mut self, key: Option<&str>) {
        if !self.is_running() {
            return;
        }
        if key.is_some_and(|key| key != self.leases.key()) {
            return;
        }
        let now = self.now();

        match self.role {
            Role::Follower => self.revalidate_lease(now, "Storage event"),
            Role::Leader => {
                self.yield_to_foreign_lease(now);
            }
            Role::Solo => {
                if let Some(lease) = self.leases.read() {
                    if lease.is_valid(now) && !lease.is_held_by(&self.tab_id) {
                        self.become_follower(Some(lease.tab_id));
                    }
                }
            }
        }
    }

    /// Page visibility changed. Waking up re-announces interests and makes
    /// sure the leader didn't disappear while this tab was throttled.
    pub fn handle_visibility_change(&mut self, visible: bool) {
        if !visible || !self.is_running() {
            return;
        }
        if self.departure_sent {
            self.resume_after_cancelled_unload();
        }
        self.schedule_broadcast_interests();

        let now = self.now();
        match self.role {
            Role::Follower => {
                if !is_lease_valid(self.leases.read().as_ref(), now) {
                    self.abandon_leader("Tab woke up with a stale lease");
                }
            }
            Role::Leader => {
                self.yield_to_foreign_lease(now);
            }
            Role::Solo => {}
        }
    }

    /// Page is going away (`beforeunload` or `pagehide`). A leader resigns
    /// and clears its lease; anyone else says goodbye. Sent once even when
    /// both events fire, until a timer or wake-up shows the page stayed.
    pub fn handle_unload(&mut self) {
        if self.departure_sent || self.transport.is_none() {
            return;
        }
        self.departure_sent = true;

        if self.role == Role::Leader {
            self.broadcast(MessageBody::LeaderResign);
            // Only clear a lease that is still ours.
            if self
                .leases
                .read()
                .is_some_and(|lease| lease.is_held_by(&self.tab_id))
            {
                if let Err(e) = self.leases.clear() {
                    warn!("[xtab {}] Failed to clear lease: {}", self.tag(), e);
                }
            }
        } else {
            self.broadcast(MessageBody::TabClosing);
        }
    }

    /// The page came back from the back/forward cache.
    pub fn handle_page_restored(&mut self) {
        if !self.is_running() {
            return;
        }
        info!("[xtab {}] Page restored, rejoining", self.tag());
        self.departure_sent = false;
        self.attempt_election();
    }

    fn revalidate_lease(&mut self, now: u64, source: &str) {
        match self.leases.read() {
            Some(lease) if lease.is_valid(now) => {
                if !lease.is_held_by(&self.tab_id) && self.leader_id.as_ref() != Some(&lease.tab_id)
                {
                    info!(
                        "[xtab {}] {}: new leader {}",
                        self.tag(),
                        source,
                        lease.tab_id.short()
                    );
                    self.become_follower(Some(lease.tab_id));
                }
            }
            _ => self.abandon_leader(&format!("{}: lease cleared or expired", source)),
        }
    }
}
