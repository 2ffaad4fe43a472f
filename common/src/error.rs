use thiserror::Error;

/// Failures of the shared key-value store holding the lease
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("shared storage is not available: {0}")]
    Unavailable(String),

    #[error("failed to write key {key}: {reason}")]
    Write { key: String, reason: String },

    #[error("failed to remove key {key}: {reason}")]
    Remove { key: String, reason: String },
}

/// Failures of the broadcast transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("broadcast transport is not supported: {0}")]
    Unsupported(String),

    #[error("failed to post message: {0}")]
    Send(String),

    #[error("transport is closed")]
    Closed,
}

/// Failures decoding or encoding a cross-tab message
#[derive(Error, Debug)]
pub enum MessageError {
    #[error("message is not a JSON object")]
    NotAnObject,

    #[error("message has no senderId")]
    MissingSender,

    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("lease duration ({lease_ms}ms) must exceed the heartbeat interval ({heartbeat_ms}ms)")]
    LeaseTooShort { lease_ms: u64, heartbeat_ms: u64 },

    #[error("election jitter minimum ({min}ms) exceeds maximum ({max}ms)")]
    JitterRange { min: u64, max: u64 },

    #[error("leader miss grace ({grace_ms}ms) is shorter than one heartbeat ({heartbeat_ms}ms)")]
    GraceTooShort { grace_ms: u64, heartbeat_ms: u64 },

    #[error("lease duration ({lease_ms}ms) exceeds the leader miss grace ({grace_ms}ms)")]
    LeaseExceedsGrace { lease_ms: u64, grace_ms: u64 },

    #[error("{0} must not be empty")]
    EmptyName(&'static str),
}
