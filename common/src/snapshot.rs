use crate::coordinator::Role;
use crate::message::SerializedInterests;
use crate::tab_id::TabId;
use serde::Serialize;

/// Point-in-time view of a coordinator for console inspection. Not a stable
/// API.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub tab_id: TabId,
    pub role: Role,
    pub leader_id: Option<TabId>,
    /// Expiry of the lease record currently in the shared store
    pub lease_until: Option<u64>,
    pub last_heartbeat: Option<u64>,
    pub peer_count: usize,
    pub channel_ready: bool,
    pub interests: SerializedInterests,
}

impl Snapshot {
    /// One-line summary like `a1b2c3d4 leader leader=- peers=2 channel=OK interests=2 tabs`
    pub fn summary(&self) -> String {
        format!(
            "{} {} leader={} peers={} channel={} interests={} tabs",
            self.tab_id.short(),
            self.role,
            self.leader_id.as_ref().map(TabId::short).unwrap_or("-"),
            self.peer_count,
            if self.channel_ready { "OK" } else { "N/A" },
            self.interests.len()
        )
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
