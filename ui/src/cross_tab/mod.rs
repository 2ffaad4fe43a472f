//! Browser side of cross-tab coordination.

mod channel;
mod driver;
mod error;
mod exports;
mod listeners;
mod platform;

pub use driver::{
    broadcast_spot_selection, is_running, snapshot, start, stop, WIDGET_VISIBILITY_EVENT,
};
pub use error::DriverError;
