//! Run a multi-tab scenario on the in-memory simulator and report what
//! happened.

use crate::error::CliError;
use crate::output::{print_output, OutputFormat};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use hamtab_xtab_core::coordinator::CoordinatorEvent;
use hamtab_xtab_core::sim::{SimNetwork, TabHandle};
use hamtab_xtab_core::{Role, Snapshot, XtabConfig};
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

/// Gap between tab openings, like a user restoring a session
const SPAWN_STAGGER_MS: u64 = 25;

#[derive(Args)]
pub struct SimulateArgs {
    /// Number of tabs to open
    #[arg(long, default_value_t = 3)]
    pub tabs: usize,

    /// Simulated time to run, in milliseconds
    #[arg(long, default_value_t = 20_000)]
    pub duration_ms: u64,

    /// Kill the current leader without a goodbye at this time
    #[arg(long)]
    pub crash_leader_at: Option<u64>,

    /// Close the current leader cleanly at this time
    #[arg(long)]
    pub resign_leader_at: Option<u64>,

    /// Seed for election jitter and tab ids
    #[arg(long, default_value_t = 1)]
    pub seed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Action {
    Spawn,
    CrashLeader,
    ResignLeader,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineRow {
    pub at_ms: u64,
    pub tab: usize,
    pub tab_id: String,
    pub event: String,
    pub detail: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabReport {
    pub tab: usize,
    pub alive: bool,
    pub snapshot: Snapshot,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    pub seed: u64,
    pub duration_ms: u64,
    pub config: XtabConfig,
    pub timeline: Vec<TimelineRow>,
    pub tabs: Vec<TabReport>,
    pub leader_count: usize,
    pub converged: bool,
    pub messages_sent: usize,
    pub messages_dropped: usize,
}

pub fn execute(args: SimulateArgs, config: XtabConfig, format: OutputFormat) -> Result<()> {
    let report = run(&args, config)?;
    print_output(&report, format)
}

pub fn run(args: &SimulateArgs, config: XtabConfig) -> Result<SimulationReport, CliError> {
    if args.tabs == 0 {
        return Err(CliError::InvalidInput("--tabs must be at least 1".into()));
    }

    let mut actions: Vec<(u64, Action)> = (0..args.tabs)
        .map(|i| (i as u64 * SPAWN_STAGGER_MS, Action::Spawn))
        .collect();
    actions.extend(args.crash_leader_at.map(|at| (at, Action::CrashLeader)));
    actions.extend(args.resign_leader_at.map(|at| (at, Action::ResignLeader)));
    actions.retain(|(at, action)| *action == Action::Spawn || *at <= args.duration_ms);
    actions.sort();

    let mut net = SimNetwork::new(config.clone(), args.seed)?;
    let start = net.now();
    info!(
        "Simulating {} tabs for {}ms (seed {})",
        args.tabs, args.duration_ms, args.seed
    );

    for (at, action) in actions {
        let elapsed = net.now() - start;
        if at > elapsed {
            net.advance(at - elapsed);
        }
        match action {
            Action::Spawn => {
                net.spawn_tab();
            }
            Action::CrashLeader | Action::ResignLeader => {
                let leaders = net.leaders();
                let [leader] = leaders.as_slice() else {
                    warn!(
                        "No single leader at {}ms ({} leaders), skipping {:?}",
                        at,
                        leaders.len(),
                        action
                    );
                    continue;
                };
                info!("{:?} on tab {} at {}ms", action, leader.0, at);
                if action == Action::CrashLeader {
                    net.crash(*leader);
                } else {
                    net.destroy(*leader);
                }
            }
        }
    }

    let elapsed = net.now() - start;
    if args.duration_ms > elapsed {
        net.advance(args.duration_ms - elapsed);
    }

    Ok(report(&net, args, config, start))
}

fn report(net: &SimNetwork, args: &SimulateArgs, config: XtabConfig, start: u64) -> SimulationReport {
    let timeline = net
        .timeline()
        .into_iter()
        .map(|entry| {
            let (event, detail) = describe(&entry.event);
            TimelineRow {
                at_ms: entry.at - start,
                tab: entry.tab.0,
                tab_id: net.tab(entry.tab).tab_id().short().to_string(),
                event,
                detail,
            }
        })
        .collect();

    let tabs: Vec<TabReport> = net
        .handles()
        .map(|handle: TabHandle| TabReport {
            tab: handle.0,
            alive: net.is_alive(handle),
            snapshot: net.tab(handle).snapshot(),
        })
        .collect();

    let leaders = net.leaders();
    let converged = match leaders.as_slice() {
        [leader] => {
            let leader_id = net.tab(*leader).tab_id();
            net.live_handles()
                .into_iter()
                .filter(|handle| handle != leader)
                .all(|handle| {
                    net.role(handle) == Role::Follower
                        && net.tab(handle).leader_id() == Some(leader_id)
                })
        }
        _ => false,
    };

    let history = net.history();
    SimulationReport {
        seed: args.seed,
        duration_ms: args.duration_ms,
        config,
        timeline,
        tabs,
        leader_count: leaders.len(),
        converged,
        messages_sent: history.len(),
        messages_dropped: history.iter().filter(|m| m.dropped).count(),
    }
}

fn describe(event: &CoordinatorEvent) -> (String, String) {
    match event {
        CoordinatorEvent::RoleChanged {
            from,
            to,
            leader_id,
        } => (
            "role".to_string(),
            format!(
                "{} -> {} (leader {})",
                from,
                to,
                leader_id.as_ref().map(|id| id.short()).unwrap_or("-")
            ),
        ),
        CoordinatorEvent::RemoteSpotSelected { spot } => (
            "spot".to_string(),
            spot.as_ref()
                .map(|spot| spot.to_string())
                .unwrap_or_else(|| "(deselect)".to_string()),
        ),
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} {} tabs, {}ms, seed {}",
            "Simulation:".bold(),
            self.tabs.len(),
            self.duration_ms,
            self.seed
        )?;
        writeln!(f)?;
        writeln!(f, "{}", "Timeline".bold())?;
        for row in &self.timeline {
            writeln!(
                f,
                "  {:>7}ms  tab {} ({})  {}",
                row.at_ms, row.tab, row.tab_id, row.detail
            )?;
        }
        writeln!(f)?;
        writeln!(f, "{}", "Final state".bold())?;
        for tab in &self.tabs {
            let state = if tab.alive {
                match tab.snapshot.role {
                    Role::Leader => "leader".green().to_string(),
                    Role::Follower => "follower".blue().to_string(),
                    Role::Solo => "solo".yellow().to_string(),
                }
            } else {
                "closed".dimmed().to_string()
            };
            writeln!(f, "  tab {} {:<10} {}", tab.tab, state, tab.snapshot.summary())?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "Messages: {} sent, {} dropped",
            self.messages_sent, self.messages_dropped
        )?;
        if self.converged {
            write!(f, "{}", "Converged on a single leader".green())
        } else {
            write!(
                f,
                "{}",
                format!("Not converged ({} leaders)", self.leader_count).red()
            )
        }
    }
}
