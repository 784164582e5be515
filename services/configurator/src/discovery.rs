//! Peer discovery.
//!
//! The reconciler depends on the [`PeerDiscovery`] trait only. The production
//! implementation lists pods through the Kubernetes API using the pod's
//! service account; tests substitute an in-memory implementation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::{Client, Config as KubeConfig};
use nats_configurator_reconcile::PeerRecord;
use tracing::{debug, info};

use crate::error::{ConfiguratorError, Result};

/// Source of peer candidates.
#[async_trait]
pub trait PeerDiscovery: Send + Sync {
    /// List the current peers. Order is whatever the backend returns.
    async fn list_peers(&self) -> Result<Vec<PeerRecord>>;
}

/// Lists sibling pods matching a label selector in one namespace.
pub struct KubePeerDiscovery {
    pods: Api<Pod>,
    namespace: String,
    label_selector: String,
}

impl KubePeerDiscovery {
    /// Build a client from the in-cluster service account.
    ///
    /// Called once at startup; failure here is fatal.
    pub fn connect(namespace: &str, label_selector: &str) -> Result<Self> {
        let config = KubeConfig::incluster()
            .map_err(|e| ConfiguratorError::DiscoverySetup(format!("in-cluster config: {e}")))?;
        let client = Client::try_from(config)
            .map_err(|e| ConfiguratorError::DiscoverySetup(format!("kube client: {e}")))?;

        info!(
            namespace = %namespace,
            label_selector = %label_selector,
            "Kubernetes discovery session established"
        );

        Ok(Self::with_client(client, namespace, label_selector))
    }

    /// Wrap an existing client.
    pub fn with_client(client: Client, namespace: &str, label_selector: &str) -> Self {
        Self {
            pods: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
            label_selector: label_selector.to_string(),
        }
    }

    fn list_params(&self) -> ListParams {
        let params = ListParams::default();
        if self.label_selector.is_empty() {
            params
        } else {
            params.labels(&self.label_selector)
        }
    }
}

#[async_trait]
impl PeerDiscovery for KubePeerDiscovery {
    async fn list_peers(&self) -> Result<Vec<PeerRecord>> {
        let list = self.pods.list(&self.list_params()).await.map_err(|e| {
            ConfiguratorError::Discovery(format!(
                "list pods in {} ({}): {e}",
                self.namespace, self.label_selector
            ))
        })?;

        let peers: Vec<PeerRecord> = list.items.into_iter().map(peer_from_pod).collect();
        debug!(peer_count = peers.len(), "pods listed");
        Ok(peers)
    }
}

fn peer_from_pod(pod: Pod) -> PeerRecord {
    PeerRecord {
        name: pod.metadata.name.unwrap_or_default(),
        address: pod.status.and_then(|status| status.pod_ip),
    }
}
