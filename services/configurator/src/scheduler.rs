//! Reconciliation loop.
//!
//! The scheduler owns the configuration document and the last applied route
//! set. On every tick it:
//! - Reads the broker pid (skips the cycle on failure)
//! - Lists peers (skips the cycle on failure)
//! - Computes the route set and compares it with the applied one
//! - On change, writes the configuration and signals the broker
//!
//! Write and signal failures stop the loop. Cycles never overlap; a shutdown
//! request is only observed between cycles.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use nats_configurator_reconcile::{compute_routes, DiffPolicy, ReconcileState, RouteSet};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::discovery::PeerDiscovery;
use crate::document::ConfigDocument;
use crate::error::Result;
use crate::reload::ReloadCoordinator;

/// Loop settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// This pod's address, excluded from routes.
    pub self_address: String,

    /// Port appended to every route.
    pub cluster_port: u16,

    /// Time between cycles.
    pub poll_interval: Duration,

    /// Route comparison policy.
    pub diff_policy: DiffPolicy,
}

impl From<&Config> for SchedulerConfig {
    fn from(config: &Config) -> Self {
        Self {
            self_address: config.pod_ip.clone(),
            cluster_port: config.nats_routes_port,
            poll_interval: config.refresh_interval,
            diff_policy: config.route_diff,
        }
    }
}

/// Result of one reconciliation cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A recoverable error prevented the cycle from running.
    Skipped { reason: &'static str },

    /// Discovered routes match the applied ones.
    Unchanged,

    /// New routes were written and the broker was signalled.
    Applied { routes: RouteSet },
}

/// Load the template, stamp the identity and write the initial config.
pub fn prepare_document(template: &Path, output: &Path, server_name: &str) -> Result<ConfigDocument> {
    let mut document = ConfigDocument::load(template)?;
    document.set_identity(server_name);
    document.persist(output)?;

    info!(
        template = %template.display(),
        output = %output.display(),
        server_name = %server_name,
        "Initial configuration written"
    );

    Ok(document)
}

/// Drives reconciliation cycles until shutdown or a fatal error.
pub struct Scheduler {
    config: SchedulerConfig,
    document: ConfigDocument,
    discovery: Arc<dyn PeerDiscovery>,
    coordinator: ReloadCoordinator,
    state: ReconcileState,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        document: ConfigDocument,
        discovery: Arc<dyn PeerDiscovery>,
        coordinator: ReloadCoordinator,
    ) -> Self {
        Self {
            config,
            document,
            discovery,
            coordinator,
            state: ReconcileState::new(),
        }
    }

    pub fn state(&self) -> &ReconcileState {
        &self.state
    }

    pub fn document(&self) -> &ConfigDocument {
        &self.document
    }

    /// Run one reconciliation cycle.
    ///
    /// Recoverable failures come back as [`CycleOutcome::Skipped`]; any
    /// `Err` is fatal.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let pid = match self.coordinator.read_broker_pid() {
            Ok(pid) => pid,
            Err(e) => {
                warn!(error = %e, "Broker pid unavailable, skipping cycle");
                return Ok(CycleOutcome::Skipped {
                    reason: e.reason_code(),
                });
            }
        };

        let peers = match self.discovery.list_peers().await {
            Ok(peers) => peers,
            Err(e) => {
                warn!(error = %e, "Peer discovery failed, skipping cycle");
                return Ok(CycleOutcome::Skipped {
                    reason: e.reason_code(),
                });
            }
        };

        let desired = compute_routes(&self.config.self_address, &peers, self.config.cluster_port);

        if !self.state.needs_apply(&desired, self.config.diff_policy) {
            debug!(route_count = desired.len(), "Routes unchanged");
            return Ok(CycleOutcome::Unchanged);
        }

        info!(
            routes = %desired,
            previous = %self.state.applied(),
            peer_count = peers.len(),
            pid,
            "Updating routes"
        );

        self.document.set_routes(&desired)?;
        self.coordinator.apply_and_reload(&self.document, pid)?;
        self.state.commit(desired.clone());

        Ok(CycleOutcome::Applied { routes: desired })
    }

    /// Run cycles on the poll interval until `shutdown` flips to true.
    ///
    /// The first cycle runs one interval after the call.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            cluster_port = self.config.cluster_port,
            self_address = %self.config.self_address,
            diff_policy = %self.config.diff_policy,
            "Starting reconciliation loop"
        );

        let period = self.config.poll_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.run_cycle().await {
                        Ok(outcome) => debug!(?outcome, "Cycle finished"),
                        Err(e) => {
                            error!(
                                error = %e,
                                reason = e.reason_code(),
                                "Reconciliation failed, stopping"
                            );
                            return Err(e);
                        }
                    }
                }
            }
        }

        info!(
            applied_generation = self.state.generation(),
            route_count = self.state.applied().len(),
            "Reconciliation loop stopped"
        );
        Ok(())
    }
}
