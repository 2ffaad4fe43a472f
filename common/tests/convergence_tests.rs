//! Multi-tab behaviour of the coordinator, driven through the in-memory
//! simulator.
//!
//! Each test starts tabs on a shared manual clock, moves time forward and
//! checks the group converges: one leader, everyone else following it, and
//! the lease record pointing at that leader.

use hamtab_xtab_core::coordinator::{CoordinatorEvent, Role};
use hamtab_xtab_core::sim::{SimNetwork, TabHandle};
use hamtab_xtab_core::store::SharedStore;
use hamtab_xtab_core::{Lease, XtabConfig};
use serde_json::json;

fn widgets(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

fn assert_converged(net: &SimNetwork) -> TabHandle {
    let leaders = net.leaders();
    assert_eq!(leaders.len(), 1, "expected exactly one leader, got {leaders:?}");
    let leader = leaders[0];
    let leader_id = net.tab(leader).tab_id().clone();

    for handle in net.live_handles() {
        if handle == leader || !net.tab(handle).is_channel_ready() {
            continue;
        }
        assert_eq!(net.role(handle), Role::Follower, "{handle:?} should follow");
        assert_eq!(net.tab(handle).leader_id(), Some(&leader_id));
    }
    let lease = net.lease().expect("lease present");
    assert_eq!(lease.tab_id, leader_id);
    assert!(lease.is_valid(net.now()));
    leader
}

fn converged(net: &SimNetwork) -> bool {
    let leaders = net.leaders();
    if leaders.len() != 1 {
        return false;
    }
    let leader_id = net.tab(leaders[0]).tab_id();
    net.live_handles()
        .into_iter()
        .filter(|h| *h != leaders[0] && net.tab(*h).is_channel_ready())
        .all(|h| net.role(h) == Role::Follower && net.tab(h).leader_id() == Some(leader_id))
        && net.lease().is_some_and(|l| &l.tab_id == leader_id)
}

// =============================================================================
// STARTUP
// =============================================================================

#[test]
fn test_single_tab_becomes_leader() {
    let mut net = SimNetwork::new(XtabConfig::default(), 1).unwrap();
    let a = net.spawn_tab();

    assert_eq!(net.role(a), Role::Leader);
    let lease = net.lease().unwrap();
    assert_eq!(&lease.tab_id, net.tab(a).tab_id());
    assert!(lease.lease_until > net.now());
}

#[test]
fn test_second_tab_follows_and_is_aggregated() {
    let config = XtabConfig::default();
    let mut net = SimNetwork::new(config.clone(), 2).unwrap();
    let a = net.spawn_tab_with_widgets(widgets(&["widget-map"]));
    let b = net.spawn_tab_with_widgets(widgets(&["widget-solar", "widget-lunar"]));

    net.advance(config.heartbeat_ms);
    assert_eq!(net.role(b), Role::Follower);
    assert_eq!(net.tab(b).leader_id(), Some(net.tab(a).tab_id()));

    let b_id = net.tab(b).tab_id().clone();
    let stored = net
        .tab(a)
        .interests()
        .get(&b_id)
        .expect("leader holds B's interests");
    assert_eq!(
        stored.iter().cloned().collect::<Vec<_>>(),
        widgets(&["widget-lunar", "widget-solar"])
    );

    // B sees the leader's aggregate after the next heartbeat.
    net.advance(config.heartbeat_ms);
    let a_id = net.tab(a).tab_id().clone();
    assert!(net.tab(b).interests().contains(&a_id));
    assert_eq!(net.tab(b).peer_count(), 2);
}

#[test]
fn test_many_tabs_converge_on_one_leader() {
    let config = XtabConfig::default();
    for seed in 0..20 {
        let mut net = SimNetwork::new(config.clone(), seed).unwrap();
        for _ in 0..6 {
            net.spawn_tab();
            net.advance(37);
        }
        net.advance(config.heartbeat_ms + config.election_jitter_max_ms);
        assert_converged(&net);
    }
}

#[test]
fn test_tabs_without_transport_stay_solo() {
    let config = XtabConfig::default();
    let mut net = SimNetwork::new(config.clone(), 3).unwrap();
    let a = net.spawn_tab();
    let s = net.spawn_solo_tab();
    let b = net.spawn_tab();

    net.advance(config.heartbeat_ms * 5);
    assert_eq!(net.role(s), Role::Solo);
    assert!(!net.tab(s).is_channel_ready());
    assert_eq!(net.role(a), Role::Leader);
    assert_eq!(net.role(b), Role::Follower);
    assert_converged(&net);
}

#[test]
fn test_lease_record_is_always_well_formed() {
    let config = XtabConfig::default();
    let mut net = SimNetwork::new(config.clone(), 4).unwrap();
    let a = net.spawn_tab();
    net.spawn_tab();
    net.spawn_tab();

    for step in 0..60 {
        if step == 20 {
            net.crash(a);
        }
        net.advance(config.heartbeat_ms / 2);
        if let Some(raw) = net.raw_lease() {
            assert!(Lease::parse(&raw).is_some(), "malformed lease {raw}");
        }
        assert!(net.store().len() <= 1, "only the lease key is ever stored");
    }
}

// =============================================================================
// LEADER LOSS
// =============================================================================

#[test]
fn test_crashed_leader_is_replaced_within_bound() {
    let config = XtabConfig::default();
    let mut net = SimNetwork::new(config.clone(), 5).unwrap();
    let a = net.spawn_tab();
    let b = net.spawn_tab();
    let c = net.spawn_tab();
    net.advance(config.heartbeat_ms);
    assert_eq!(assert_converged(&net), a);

    net.crash(a);
    let recovered = net.advance_until(config.recovery_bound_ms(), converged);
    assert!(recovered, "no new leader within {}ms", config.recovery_bound_ms());

    let new_leader = assert_converged(&net);
    assert!(new_leader == b || new_leader == c);
}

#[test]
fn test_crash_recovery_bound_when_checks_trail_renewals() {
    let config = XtabConfig::default();
    let bound = config.leader_miss_grace_ms + config.election_jitter_max_ms + config.heartbeat_ms;
    assert_eq!(config.recovery_bound_ms(), bound);

    let mut net = SimNetwork::new(config.clone(), 13).unwrap();
    let a = net.spawn_tab();
    // B's miss checks run just before each of A's renewals.
    net.advance(config.heartbeat_ms - 1);
    let b = net.spawn_tab();
    net.advance(config.heartbeat_ms + 2);
    assert_eq!(assert_converged(&net), a);

    let crashed_at = net.now();
    net.crash(a);
    let recovered = net.advance_until(bound, converged);
    assert!(recovered, "no new leader within {bound}ms");
    assert_eq!(net.role(b), Role::Leader);
    assert!(net.now() - crashed_at <= bound);
}

#[test]
fn test_clean_resignation_skips_grace_period() {
    let config = XtabConfig::default();
    let mut net = SimNetwork::new(config.clone(), 6).unwrap();
    let a = net.spawn_tab();
    let b = net.spawn_tab();
    net.advance(config.heartbeat_ms);

    net.destroy(a);
    assert!(net.lease().is_none(), "resigning leader clears its lease");
    assert!(net.tab(b).is_election_pending());

    let recovered = net.advance_until(config.election_jitter_max_ms, converged);
    assert!(recovered, "follower should re-elect within one jitter window");
    assert_eq!(net.role(b), Role::Leader);
}

#[test]
fn test_follower_closed_after_cancelled_unload_leaves_aggregate() {
    let config = XtabConfig::default();
    let mut net = SimNetwork::new(config.clone(), 12).unwrap();
    let a = net.spawn_tab();
    let b = net.spawn_tab_with_widgets(widgets(&["widget-map"]));
    net.advance(config.heartbeat_ms);
    let b_id = net.tab(b).tab_id().clone();

    // beforeunload fires but the user stays on the page.
    net.with_tab(b, |tab| tab.handle_unload());
    assert!(!net.tab(a).interests().contains(&b_id));
    net.advance(2 * config.heartbeat_ms);
    assert!(net.tab(a).interests().contains(&b_id), "b re-announces");

    let closed_at = net.now();
    net.destroy(b);
    assert_eq!(net.count_sent(b, "tab-closing", closed_at), 1);
    assert!(!net.tab(a).interests().contains(&b_id));
    net.advance(10 * config.heartbeat_ms);
    assert!(!net.tab(a).interests().contains(&b_id));
}

#[test]
fn test_closing_follower_leaves_aggregate() {
    let config = XtabConfig::default();
    let mut net = SimNetwork::new(config.clone(), 7).unwrap();
    let a = net.spawn_tab();
    let b = net.spawn_tab_with_widgets(widgets(&["widget-map"]));
    let c = net.spawn_tab();
    net.advance(config.heartbeat_ms);
    let b_id = net.tab(b).tab_id().clone();
    assert!(net.tab(a).interests().contains(&b_id));

    net.destroy(b);
    assert!(!net.tab(a).interests().contains(&b_id));
    net.advance(config.heartbeat_ms);
    assert!(!net.tab(c).interests().contains(&b_id));
    assert_eq!(net.role(a), Role::Leader);
}

#[test]
fn test_dropped_heartbeats_with_fresh_lease_do_not_reelect() {
    let config = XtabConfig::default();
    let mut net = SimNetwork::new(config.clone(), 8).unwrap();
    let a = net.spawn_tab();
    let b = net.spawn_tab();
    net.advance(config.heartbeat_ms);

    // A keeps renewing the lease but none of its broadcasts get through.
    net.partition(a, true);
    net.advance(config.leader_miss_grace_ms * 3);
    assert_eq!(net.role(a), Role::Leader);
    assert_eq!(net.role(b), Role::Follower);
    assert!(!net.tab(b).is_election_pending());
    assert_eq!(net.count_sent(b, "leader-heartbeat", 0), 0);
}

// =============================================================================
// SPLIT BRAIN
// =============================================================================

#[test]
fn test_overlapping_claims_collapse_to_one_leader() {
    let config = XtabConfig::default();
    let mut net = SimNetwork::new(config.clone(), 9).unwrap();
    let a = net.spawn_tab();
    net.advance(config.heartbeat_ms / 2);
    // Hide A's broadcasts and wipe the lease so B wins an election of its
    // own, as if both claimed at the same instant.
    net.partition(a, true);
    net.store().remove_item(&config.leader_key).unwrap();
    let window_start = net.now();
    let b = net.spawn_tab();
    net.partition(a, false);

    net.advance(config.heartbeat_ms);
    assert_eq!(assert_converged(&net), b);

    // A stopped heartbeating the moment it saw B's lease; B sent its
    // opening heartbeat plus at most one tick per interval.
    let heartbeats = |tab| {
        net.history()
            .into_iter()
            .filter(|m| m.from == tab && m.kind == "leader-heartbeat")
            .filter(|m| m.at >= window_start && m.at < window_start + config.heartbeat_ms)
            .count()
    };
    assert_eq!(heartbeats(a), 0);
    assert_eq!(heartbeats(b), 1);
}

// =============================================================================
// INTERESTS AND SPOTS
// =============================================================================

#[test]
fn test_visibility_bursts_announce_once() {
    let config = XtabConfig::default();
    let mut net = SimNetwork::new(config.clone(), 10).unwrap();
    let _a = net.spawn_tab();
    let b = net.spawn_tab();
    net.advance(config.heartbeat_ms);

    let start = net.now();
    for _ in 0..10 {
        net.set_visible_widgets(b, widgets(&["widget-map", "widget-rst"]));
        net.advance(config.interest_debounce_ms / 4);
    }
    net.advance(config.interest_debounce_ms);
    assert_eq!(net.count_sent(b, "interest-announce", start), 1);
}

#[test]
fn test_spot_selection_reaches_every_other_tab() {
    let config = XtabConfig::default();
    let mut net = SimNetwork::new(config.clone(), 11).unwrap();
    let a = net.spawn_tab();
    let b = net.spawn_tab();
    let c = net.spawn_tab();
    net.advance(config.heartbeat_ms);
    for handle in [a, b, c] {
        net.clear_events(handle);
    }

    let spot = json!({"callsign": "W1AW", "frequency": "14.074"});
    net.with_tab(a, |tab| tab.broadcast_spot_selection(Some(spot.clone())));

    let expected = CoordinatorEvent::RemoteSpotSelected { spot: Some(spot) };
    assert_eq!(net.events(b), vec![expected.clone()]);
    assert_eq!(net.events(c), vec![expected]);
    assert!(net.events(a).is_empty());

    let detail = net.events(b)[0].spot_detail().unwrap();
    assert_eq!(
        serde_json::to_value(detail).unwrap(),
        json!({"spot": {"callsign": "W1AW", "frequency": "14.074"}})
    );

    net.with_tab(b, |tab| tab.broadcast_spot_selection(None));
    assert_eq!(
        net.events(a),
        vec![CoordinatorEvent::RemoteSpotSelected { spot: None }]
    );
}

#[test]
fn test_role_change_events_follow_transitions() {
    let config = XtabConfig::default();
    let mut net = SimNetwork::new(config.clone(), 12).unwrap();
    let a = net.spawn_tab();
    let b = net.spawn_tab();
    net.advance(config.heartbeat_ms);
    net.destroy(a);
    net.advance(config.election_jitter_max_ms);

    let roles: Vec<(Role, Role)> = net
        .events(b)
        .into_iter()
        .filter_map(|event| match event {
            CoordinatorEvent::RoleChanged { from, to, .. } => Some((from, to)),
            _ => None,
        })
        .collect();
    assert_eq!(
        roles,
        vec![(Role::Solo, Role::Follower), (Role::Follower, Role::Leader)]
    );
}
