use super::{Role, TabCoordinator};
use crate::message::MessageBody;
use tracing::{info, warn};

impl TabCoordinator {
    /// Leader: renew the lease, then broadcast the aggregate interests.
    pub(super) fn leader_heartbeat_tick(&mut self) {
        let now = self.now();
        if self.yield_to_foreign_lease(now) {
            return;
        }

        if let Err(e) = self.leases.write(&self.tab_id, now) {
            warn!("[xtab {}] Failed to renew lease: {}", self.tag(), e);
        }

        self.peer_count = self.interests.len();
        let body = MessageBody::LeaderHeartbeat {
            interests: self.interests.serialize(),
            peer_count: self.peer_count,
        };
        self.broadcast(body);
    }

    /// Follower: re-elect only when the heartbeat is overdue *and* the lease
    /// is stale. A dropped broadcast alone never triggers an election while
    /// the lease is fresh.
    pub(super) fn follower_miss_detection_tick(&mut self) {
        let now = self.now();
        let elapsed = now.saturating_sub(self.last_heartbeat.unwrap_or(0));

        match self.leases.read() {
            Some(lease) if lease.is_valid(now) => {
                if !lease.is_held_by(&self.tab_id) && self.leader_id.as_ref() != Some(&lease.tab_id)
                {
                    info!(
                        "[xtab {}] Lease now held by {}, following it",
                        self.tag(),
                        lease.tab_id.short()
                    );
                    self.become_follower(Some(lease.tab_id));
                }
            }
            _ if elapsed > self.config.leader_miss_grace_ms => {
                self.abandon_leader(&format!(
                    "Leader miss detected ({}ms since last heartbeat, lease stale)",
                    elapsed
                ));
            }
            _ => {}
        }
    }

    /// A leader that finds a valid lease naming another tab has lost a
    /// claim race (or was suspended while someone else took over) and steps
    /// down. Returns true if it stepped down.
    pub(super) fn yield_to_foreign_lease(&mut self, now: u64) -> bool {
        if self.role != Role::Leader {
            return false;
        }
        match self.leases.read() {
            Some(lease) if lease.is_valid(now) && !lease.is_held_by(&self.tab_id) => {
                info!(
                    "[xtab {}] Lease held by {}, stepping down",
                    self.tag(),
                    lease.tab_id.short()
                );
                self.become_follower(Some(lease.tab_id));
                true
            }
            _ => false,
        }
    }
}
