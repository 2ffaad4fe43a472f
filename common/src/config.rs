use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CHANNEL_NAME: &str = "hamtab-xtab";
pub const DEFAULT_LEADER_KEY: &str = "hamtab_xtab_leader";

/// Timing and naming knobs for the cross-tab protocol.
///
/// All durations are milliseconds. Missing fields in a serialized config fall
/// back to the defaults, so a TOML file only needs the values it overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct XtabConfig {
    pub channel_name: String,
    pub leader_key: String,
    pub heartbeat_ms: u64,
    pub lease_ms: u64,
    pub election_jitter_min_ms: u64,
    pub election_jitter_max_ms: u64,
    pub leader_miss_grace_ms: u64,
    pub interest_debounce_ms: u64,
    /// Log protocol chatter (elections, announces, relayed spots)
    pub debug: bool,
}

impl Default for XtabConfig {
    fn default() -> Self {
        Self {
            channel_name: DEFAULT_CHANNEL_NAME.to_string(),
            leader_key: DEFAULT_LEADER_KEY.to_string(),
            heartbeat_ms: 2_000,
            lease_ms: 4_500,
            election_jitter_min_ms: 50,
            election_jitter_max_ms: 300,
            leader_miss_grace_ms: 5_000,
            interest_debounce_ms: 300,
            debug: false,
        }
    }
}

impl XtabConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_name.is_empty() {
            return Err(ConfigError::EmptyName("channel_name"));
        }
        if self.leader_key.is_empty() {
            return Err(ConfigError::EmptyName("leader_key"));
        }
        if self.heartbeat_ms == 0 {
            return Err(ConfigError::Zero("heartbeat_ms"));
        }
        if self.interest_debounce_ms == 0 {
            return Err(ConfigError::Zero("interest_debounce_ms"));
        }
        // Leaders renew once per heartbeat, so a shorter lease would lapse
        // between renewals.
        if self.lease_ms <= self.heartbeat_ms {
            return Err(ConfigError::LeaseTooShort {
                lease_ms: self.lease_ms,
                heartbeat_ms: self.heartbeat_ms,
            });
        }
        if self.election_jitter_min_ms > self.election_jitter_max_ms {
            return Err(ConfigError::JitterRange {
                min: self.election_jitter_min_ms,
                max: self.election_jitter_max_ms,
            });
        }
        if self.leader_miss_grace_ms < self.heartbeat_ms {
            return Err(ConfigError::GraceTooShort {
                grace_ms: self.leader_miss_grace_ms,
                heartbeat_ms: self.heartbeat_ms,
            });
        }
        // Miss detection also waits for the lease to lapse, so a lease
        // outliving the grace period stretches recovery past the bound.
        if self.lease_ms > self.leader_miss_grace_ms {
            return Err(ConfigError::LeaseExceedsGrace {
                lease_ms: self.lease_ms,
                grace_ms: self.leader_miss_grace_ms,
            });
        }
        Ok(())
    }

    /// Upper bound on how long followers need to replace a crashed leader:
    /// the grace period, one miss-detection interval and the election jitter.
    pub fn recovery_bound_ms(&self) -> u64 {
        self.leader_miss_grace_ms + self.election_jitter_max_ms + self.heartbeat_ms
    }
}
