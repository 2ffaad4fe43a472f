use super::{Role, RoleTimer, TabCoordinator};
use crate::tab_id::TabId;
use crate::timers::Interval;
use rand::Rng;
use tracing::{info, warn};

impl TabCoordinator {
    /// Claim leadership unless another tab holds a valid lease.
    ///
    /// The lease write is an unconditional overwrite, so the claim is only
    /// trusted if reading it straight back still names this tab. Two tabs in
    /// separate processes can both pass the read-back; the loser finds the
    /// other's lease on its next heartbeat and steps down.
    pub(super) fn attempt_election(&mut self) {
        if !self.is_running() {
            return;
        }
        let now = self.now();

        if let Some(lease) = self.leases.read() {
            if lease.is_valid(now) && !lease.is_held_by(&self.tab_id) {
                self.become_follower(Some(lease.tab_id));
                return;
            }
        }

        if let Err(e) = self.leases.write(&self.tab_id, now) {
            warn!("[xtab {}] Failed to write lease: {}", self.tag(), e);
        }

        match self.leases.read() {
            Some(lease) if lease.is_held_by(&self.tab_id) => self.become_leader(),
            other => {
                chatter!(self, "[xtab {}] Lost the election race", self.tag());
                self.become_follower(other.map(|lease| lease.tab_id));
            }
        }
    }

    /// Run an election after a random jitter so tabs orphaned by the same
    /// leader don't all claim at once. Replaces any pending election.
    pub(super) fn schedule_election(&mut self) {
        if !self.is_running() {
            return;
        }
        let jitter = self.rng.gen_range(
            self.config.election_jitter_min_ms..=self.config.election_jitter_max_ms,
        );
        let now = self.now();
        self.election.arm(now, jitter);
        chatter!(self, "[xtab {}] Election scheduled in {}ms", self.tag(), jitter);
    }

    /// Stop following and wait for the jittered election.
    pub(super) fn abandon_leader(&mut self, reason: &str) {
        info!("[xtab {}] {} - scheduling election", self.tag(), reason);
        self.role_timer = RoleTimer::Idle;
        self.schedule_election();
    }

    pub(super) fn become_leader(&mut self) {
        self.stop_timers();
        self.leader_id = Some(self.tab_id.clone());
        self.departure_sent = false;
        self.set_role(Role::Leader);

        let now = self.now();
        self.role_timer = RoleTimer::Heartbeat(Interval::start(now, self.config.heartbeat_ms));
        // First heartbeat goes out right away rather than after one interval.
        self.leader_heartbeat_tick();
        self.schedule_broadcast_interests();
    }

    pub(super) fn become_follower(&mut self, leader_id: Option<TabId>) {
        self.stop_timers();
        let now = self.now();
        self.leader_id = leader_id;
        self.last_heartbeat = Some(now);
        self.departure_sent = false;
        self.set_role(Role::Follower);

        self.role_timer =
            RoleTimer::MissDetection(Interval::start(now, self.config.heartbeat_ms));
        self.schedule_broadcast_interests();
    }

    pub(super) fn become_solo(&mut self, reason: &str) {
        self.stop_timers();
        self.interest_debounce.cancel();
        self.leader_id = None;
        self.peer_count = 0;
        self.interests.clear();
        if self.role != Role::Solo {
            chatter!(self, "[xtab {}] Going solo: {}", self.tag(), reason);
        }
        self.set_role(Role::Solo);
    }
}
