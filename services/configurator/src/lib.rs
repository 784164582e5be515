//! NATS cluster configurator.
//!
//! Sidecar that keeps a NATS server's `cluster.routes` in sync with the pods
//! of its Kubernetes workload and asks the server to reload with SIGHUP when
//! the route list changes.

pub mod build_info;
pub mod config;
pub mod discovery;
pub mod document;
pub mod error;
pub mod reload;
pub mod scheduler;
pub mod signals;

pub use config::Config;
pub use discovery::{KubePeerDiscovery, PeerDiscovery};
pub use document::ConfigDocument;
pub use error::ConfiguratorError;
pub use reload::{ReloadCoordinator, ReloadSignaler, SighupSignaler};
pub use scheduler::{CycleOutcome, Scheduler, SchedulerConfig};
