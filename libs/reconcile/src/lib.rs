//! Route set reconciliation primitives.
//!
//! Turns a list of discovered peers into the ordered list of cluster routes
//! the broker should dial, and decides whether that list differs from the
//! one that was last applied. Key concepts:
//!
//! - **Desired routes**: computed from the latest discovery result.
//! - **Applied routes**: what the broker was last told to reload with.
//! - **Diff policy**: how two route lists are compared.
//!
//! # Invariants
//!
//! - A computed route set never contains the local address.
//! - A computed route set never contains a peer without an address.
//! - Route order follows discovery order; nothing is sorted.
//! - Decisions are deterministic given the same inputs.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// URL scheme the broker uses for cluster routes.
pub const ROUTE_SCHEME: &str = "nats";

/// Default port for cluster route traffic between brokers.
pub const DEFAULT_CLUSTER_PORT: u16 = 6222;

/// A peer candidate returned by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    /// Pod name.
    pub name: String,

    /// Pod address, `None` while the platform has not assigned one yet.
    pub address: Option<String>,
}

impl PeerRecord {
    /// Create a peer with an assigned address.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: Some(address.into()),
        }
    }

    /// Create a peer that has no address yet.
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: None,
        }
    }

    /// The assigned address, treating an empty string as unassigned.
    pub fn assigned_address(&self) -> Option<&str> {
        self.address.as_deref().filter(|a| !a.is_empty())
    }
}

/// Ordered list of cluster route URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteSet(Vec<String>);

impl RouteSet {
    /// An empty route set.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl From<Vec<String>> for RouteSet {
    fn from(routes: Vec<String>) -> Self {
        Self(routes)
    }
}

impl<'a> IntoIterator for &'a RouteSet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for RouteSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// How a freshly computed route set is compared to the applied one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DiffPolicy {
    /// Exact sequence equality. Reordered members count as a change.
    #[default]
    Exact,

    /// Same members regardless of order.
    Unordered,
}

impl DiffPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Unordered => "unordered",
        }
    }
}

impl fmt::Display for DiffPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiffPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "unordered" => Ok(Self::Unordered),
            other => Err(format!(
                "unknown route diff policy '{other}' (expected 'exact' or 'unordered')"
            )),
        }
    }
}

/// Format a single route URL for `address` on `port`.
///
/// IPv6 literals are bracketed; anything else is used verbatim.
pub fn route_url(address: &str, port: u16) -> String {
    match address.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) => format!("{ROUTE_SCHEME}://[{v6}]:{port}"),
        _ => format!("{ROUTE_SCHEME}://{address}:{port}"),
    }
}

/// Compute the desired route set from a discovery result.
///
/// Peers without an address and the peer at `self_address` are skipped.
/// The remaining peers keep the order discovery returned them in.
pub fn compute_routes(self_address: &str, peers: &[PeerRecord], cluster_port: u16) -> RouteSet {
    peers
        .iter()
        .filter_map(PeerRecord::assigned_address)
        .filter(|address| *address != self_address)
        .map(|address| route_url(address, cluster_port))
        .collect::<Vec<_>>()
        .into()
}

/// Returns true when `current` must be applied over `previous`.
pub fn routes_changed(previous: &RouteSet, current: &RouteSet, policy: DiffPolicy) -> bool {
    match policy {
        DiffPolicy::Exact => previous != current,
        DiffPolicy::Unordered => {
            if previous.len() != current.len() {
                return true;
            }
            let mut a: Vec<&String> = previous.iter().collect();
            let mut b: Vec<&String> = current.iter().collect();
            a.sort_unstable();
            b.sort_unstable();
            a != b
        }
    }
}

/// The route set most recently pushed to the broker.
///
/// Starts empty and only moves forward through [`ReconcileState::commit`],
/// which callers invoke after the configuration was written and the broker
/// was signalled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileState {
    applied: RouteSet,
    generation: u64,
}

impl ReconcileState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes currently applied.
    pub fn applied(&self) -> &RouteSet {
        &self.applied
    }

    /// Number of successful applies so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether `desired` differs from the applied routes under `policy`.
    pub fn needs_apply(&self, desired: &RouteSet, policy: DiffPolicy) -> bool {
        routes_changed(&self.applied, desired, policy)
    }

    /// Record `routes` as applied.
    pub fn commit(&mut self, routes: RouteSet) {
        self.applied = routes;
        self.generation += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn routes(items: &[&str]) -> RouteSet {
        items
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .into()
    }

    #[test]
    fn test_compute_routes_skips_self_and_pending() {
        let peers = vec![
            PeerRecord::new("n0", "10.0.0.1"),
            PeerRecord::new("n1", "10.0.0.2"),
            PeerRecord::pending("n2"),
            PeerRecord::new("n3", ""),
            PeerRecord::new("n4", "10.0.0.3"),
        ];

        let computed = compute_routes("10.0.0.1", &peers, 6222);

        assert_eq!(
            computed,
            routes(&["nats://10.0.0.2:6222", "nats://10.0.0.3:6222"])
        );
    }

    #[test]
    fn test_compute_routes_keeps_discovery_order() {
        let peers = vec![
            PeerRecord::new("b", "10.0.0.9"),
            PeerRecord::new("a", "10.0.0.2"),
        ];

        let computed = compute_routes("10.0.0.1", &peers, 7000);

        assert_eq!(
            computed,
            routes(&["nats://10.0.0.9:7000", "nats://10.0.0.2:7000"])
        );
    }

    #[rstest]
    #[case("10.1.2.3", 6222, "nats://10.1.2.3:6222")]
    #[case("fd00::1", 6222, "nats://[fd00::1]:6222")]
    #[case("nats-0.nats.svc", 4248, "nats://nats-0.nats.svc:4248")]
    fn test_route_url(#[case] address: &str, #[case] port: u16, #[case] expected: &str) {
        assert_eq!(route_url(address, port), expected);
    }

    #[test]
    fn test_exact_policy_treats_reorder_as_change() {
        let a = routes(&["nats://10.0.0.2:6222", "nats://10.0.0.3:6222"]);
        let b = routes(&["nats://10.0.0.3:6222", "nats://10.0.0.2:6222"]);

        assert!(routes_changed(&a, &b, DiffPolicy::Exact));
        assert!(!routes_changed(&a, &a.clone(), DiffPolicy::Exact));
    }

    #[test]
    fn test_unordered_policy_ignores_reorder() {
        let a = routes(&["nats://10.0.0.2:6222", "nats://10.0.0.3:6222"]);
        let b = routes(&["nats://10.0.0.3:6222", "nats://10.0.0.2:6222"]);
        let c = routes(&["nats://10.0.0.3:6222", "nats://10.0.0.3:6222"]);

        assert!(!routes_changed(&a, &b, DiffPolicy::Unordered));
        assert!(routes_changed(&a, &c, DiffPolicy::Unordered));
        assert!(routes_changed(&a, &RouteSet::new(), DiffPolicy::Unordered));
    }

    #[rstest]
    #[case("exact", DiffPolicy::Exact)]
    #[case("Unordered", DiffPolicy::Unordered)]
    #[case(" exact ", DiffPolicy::Exact)]
    fn test_diff_policy_parse(#[case] raw: &str, #[case] expected: DiffPolicy) {
        assert_eq!(raw.parse::<DiffPolicy>().unwrap(), expected);
    }

    #[test]
    fn test_diff_policy_rejects_unknown() {
        assert!("sorted".parse::<DiffPolicy>().is_err());
    }

    #[test]
    fn test_reconcile_state_commit() {
        let mut state = ReconcileState::new();
        let desired = routes(&["nats://10.0.0.2:6222"]);

        assert!(state.applied().is_empty());
        assert!(state.needs_apply(&desired, DiffPolicy::Exact));

        state.commit(desired.clone());
        assert_eq!(state.generation(), 1);
        assert!(!state.needs_apply(&desired, DiffPolicy::Exact));
    }

    #[test]
    fn test_empty_discovery_matches_initial_state() {
        let state = ReconcileState::new();
        let desired = compute_routes("10.0.0.1", &[PeerRecord::new("self", "10.0.0.1")], 6222);

        assert!(!state.needs_apply(&desired, DiffPolicy::Exact));
    }

    fn peer_strategy() -> impl Strategy<Value = PeerRecord> {
        (
            "[a-z]{1,6}",
            prop_oneof![
                Just(None),
                Just(Some(String::new())),
                Just(Some("10.0.0.1".to_string())),
                (1u8..=254).prop_map(|n| Some(format!("10.0.0.{n}"))),
            ],
        )
            .prop_map(|(name, address)| PeerRecord { name, address })
    }

    proptest! {
        #[test]
        fn prop_routes_exclude_self_and_empty(
            peers in proptest::collection::vec(peer_strategy(), 0..16),
        ) {
            let computed = compute_routes("10.0.0.1", &peers, 6222);

            for route in &computed {
                prop_assert_ne!(route.as_str(), "nats://10.0.0.1:6222");
                prop_assert_ne!(route.as_str(), "nats://:6222");
            }
        }

        #[test]
        fn prop_reversed_distinct_routes_are_changed(
            hosts in proptest::collection::btree_set(2u8..=254, 2..8),
        ) {
            let peers: Vec<PeerRecord> = hosts
                .iter()
                .map(|n| PeerRecord::new(format!("n{n}"), format!("10.0.0.{n}")))
                .collect();
            let mut reversed = peers.clone();
            reversed.reverse();

            let a = compute_routes("10.0.0.1", &peers, 6222);
            let b = compute_routes("10.0.0.1", &reversed, 6222);

            prop_assert!(routes_changed(&a, &b, DiffPolicy::Exact));
            prop_assert!(!routes_changed(&a, &b, DiffPolicy::Unordered));
        }
    }
}
