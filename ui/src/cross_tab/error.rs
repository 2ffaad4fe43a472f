use hamtab_xtab_core::error::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("no window object available")]
    NoWindow,

    #[error("no document available")]
    NoDocument,

    #[error("cross-tab coordination is already running in this tab")]
    AlreadyRunning,

    #[error("failed to listen for {event}: {reason}")]
    Listener { event: &'static str, reason: String },

    #[error("invalid cross-tab configuration: {0}")]
    Config(#[from] ConfigError),
}
