use crate::error::CliError;
use crate::output::{print_output, OutputFormat};
use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use hamtab_xtab_core::clock::{Clock, SystemClock};
use hamtab_xtab_core::{Lease, TabId};
use serde::Serialize;
use std::fmt;

#[derive(Args)]
pub struct LeaseArgs {
    /// Lease record as stored, e.g. '{"tabId":"...","leaseUntil":1700000006000}'
    pub record: String,

    /// Evaluate validity at this epoch-millisecond time instead of now
    #[arg(long)]
    pub now: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct LeaseReport {
    pub tab_id: TabId,
    pub lease_until: u64,
    pub lease_until_utc: Option<DateTime<Utc>>,
    pub now: u64,
    pub valid: bool,
    /// Milliseconds until expiry; negative once expired
    pub remaining_ms: i64,
}

impl LeaseReport {
    pub fn new(lease: &Lease, now: u64) -> Self {
        Self {
            tab_id: lease.tab_id.clone(),
            lease_until: lease.lease_until,
            lease_until_utc: i64::try_from(lease.lease_until)
                .ok()
                .and_then(DateTime::from_timestamp_millis),
            now,
            valid: lease.is_valid(now),
            remaining_ms: millis_i64(lease.lease_until).saturating_sub(millis_i64(now)),
        }
    }
}

impl fmt::Display for LeaseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Owner:       {}", self.tab_id.as_str())?;
        match self.lease_until_utc {
            Some(at) => writeln!(f, "Lease until: {} ({})", self.lease_until, at.to_rfc3339())?,
            None => writeln!(f, "Lease until: {}", self.lease_until)?,
        }
        if self.valid {
            write!(f, "Status:      {} ({}ms left)", "valid".green(), self.remaining_ms)
        } else {
            write!(
                f,
                "Status:      {} ({}ms ago)",
                "expired".red(),
                -self.remaining_ms
            )
        }
    }
}

pub fn execute(args: LeaseArgs, format: OutputFormat) -> Result<()> {
    let lease = Lease::parse(&args.record).ok_or_else(|| {
        CliError::InvalidInput("not a lease record (expected {\"tabId\", \"leaseUntil\"})".into())
    })?;
    let now = args.now.unwrap_or_else(|| SystemClock.now_ms());
    print_output(&LeaseReport::new(&lease, now), format)
}

fn millis_i64(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_for_live_and_expired_lease() {
        let lease = Lease::parse(r#"{"tabId":"abc","leaseUntil":6010}"#).unwrap();

        let live = LeaseReport::new(&lease, 6000);
        assert!(live.valid);
        assert_eq!(live.remaining_ms, 10);

        let expired = LeaseReport::new(&lease, 6010);
        assert!(!expired.valid);
        assert_eq!(expired.remaining_ms, 0);
    }

    #[test]
    fn test_far_future_lease_does_not_wrap() {
        let lease = Lease::parse(r#"{"tabId":"abc","leaseUntil":1e30}"#).unwrap();
        let report = LeaseReport::new(&lease, 6000);
        assert!(report.valid);
        assert!(report.remaining_ms > 0);
        assert_eq!(report.lease_until_utc, None);
    }
}
