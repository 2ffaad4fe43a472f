//! Cross-tab coordination for the HamTab dashboard.
//!
//! Every open tab runs one [`TabCoordinator`]. Tabs elect a leader through a
//! lease record in shared storage, backed by best-effort broadcast
//! heartbeats; the leader aggregates which widgets each tab has visible, and
//! spot selections are relayed to every tab.

pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod interests;
pub mod lease;
pub mod message;
pub mod sim;
pub mod snapshot;
pub mod store;
pub mod tab_id;
pub mod timers;
pub mod transport;

pub use config::XtabConfig;
pub use coordinator::{Collaborators, CoordinatorEvent, Role, TabCoordinator};
pub use lease::Lease;
pub use message::WidgetId;
pub use snapshot::Snapshot;
pub use tab_id::TabId;

#[cfg(test)]
mod tests {
    mod proptest_tests;
}
