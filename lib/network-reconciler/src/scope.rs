//! Per-cluster context shared by the reconcilers

use std::sync::Arc;

use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::EventType;
use kube::Resource;
use network_api::{ClusterNetwork, Tags};
use network_core::{EventPublisher, NetworkConfig, NetworkProvider, RetryConfig};

/// ClusterScope carries everything one reconciliation pass needs: the
/// cluster identity used in ownership tags, the provider, and where to
/// publish events.
pub struct ClusterScope {
    cluster_name: String,
    config: NetworkConfig,
    additional_tags: Tags,
    provider: Arc<dyn NetworkProvider>,
    events: Arc<dyn EventPublisher>,
    object_ref: ObjectReference,
}

impl ClusterScope {
    pub fn new(
        cluster_name: impl Into<String>,
        config: NetworkConfig,
        provider: Arc<dyn NetworkProvider>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        let additional_tags = config.additional_tags.clone();
        Self {
            cluster_name: cluster_name.into(),
            config,
            additional_tags,
            provider,
            events,
            object_ref: ObjectReference::default(),
        }
    }

    /// Scope for a ClusterNetwork object. Its additional tags are layered
    /// over the ones from the controller configuration.
    pub fn for_cluster_network(
        network: &ClusterNetwork,
        config: NetworkConfig,
        provider: Arc<dyn NetworkProvider>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        let mut scope = Self::new(network.cluster_name(), config, provider, events);
        scope.additional_tags.merge(&network.spec.additional_tags);
        scope.object_ref = network.object_ref(&());
        scope
    }

    /// Cluster name used in ownership tags and describe filters
    pub fn name(&self) -> &str {
        &self.cluster_name
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn retry(&self) -> RetryConfig {
        self.config.retry()
    }

    pub fn additional_tags(&self) -> &Tags {
        &self.additional_tags
    }

    pub fn provider(&self) -> &dyn NetworkProvider {
        self.provider.as_ref()
    }

    pub fn object_ref(&self) -> &ObjectReference {
        &self.object_ref
    }

    /// Publish a Normal event on the reconciled object
    pub async fn event(&self, reason: &str, action: &str, note: String) {
        self.events
            .publish(&self.object_ref, EventType::Normal, reason, action, Some(note))
            .await;
    }

    /// Publish a Warning event on the reconciled object
    pub async fn warning(&self, reason: &str, action: &str, note: String) {
        self.events
            .publish(&self.object_ref, EventType::Warning, reason, action, Some(note))
            .await;
    }
}
