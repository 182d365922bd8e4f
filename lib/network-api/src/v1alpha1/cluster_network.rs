use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::network::NetworkSpec;
use super::tags::Tags;

/// ClusterNetwork declares the VPC and subnets a cluster should run in.
/// The reconciler mirrors the observed topology back into its status.
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "network.datum.net",
    version = "v1alpha1",
    kind = "ClusterNetwork",
    plural = "clusternetworks",
    namespaced,
    derive = "Default",
    status = "ClusterNetworkStatus",
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"VPC","type":"string","jsonPath":".status.vpcId"}"#,
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNetworkSpec {
    /// Name used in ownership tags; defaults to the object name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,

    /// Desired network topology
    #[serde(default)]
    pub network: NetworkSpec,

    /// Extra tags applied to every managed resource
    #[serde(default)]
    pub additional_tags: Tags,
}

impl ClusterNetwork {
    /// Name of the cluster owning this network
    pub fn cluster_name(&self) -> &str {
        self.spec
            .cluster_name
            .as_deref()
            .or(self.metadata.name.as_deref())
            .unwrap_or_default()
    }
}

/// Status of a ClusterNetwork
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNetworkStatus {
    /// Whether the last reconciliation pass converged
    #[serde(default)]
    pub ready: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,

    #[serde(default)]
    pub subnet_ids: Vec<String>,

    #[serde(default)]
    pub nat_gateway_ids: Vec<String>,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ClusterNetworkStatus {
    /// Status for a converged network
    pub fn converged(network: &NetworkSpec) -> Self {
        let vpc_id = (!network.vpc.id.is_empty()).then(|| network.vpc.id.clone());
        let subnet_ids = network.subnets.iter().map(|sn| sn.id.clone()).collect();
        let nat_gateway_ids = network
            .subnets
            .iter()
            .filter_map(|sn| sn.nat_gateway_id.clone())
            .collect();

        Self {
            ready: true,
            vpc_id,
            subnet_ids,
            nat_gateway_ids,
            conditions: vec![Condition::new(
                CONDITION_NETWORK_READY,
                "True",
                "Reconciled",
                None,
            )],
        }
    }

    /// Status for a pass that failed; previously observed IDs are kept
    pub fn failed(previous: Option<&ClusterNetworkStatus>, reason: &str, message: String) -> Self {
        let mut status = previous.cloned().unwrap_or_default();
        status.ready = false;
        status.conditions = vec![Condition::new(
            CONDITION_NETWORK_READY,
            "False",
            reason,
            Some(message),
        )];
        status
    }
}

/// Condition type reported on every reconciliation pass
pub const CONDITION_NETWORK_READY: &str = "NetworkReady";

/// Condition for ClusterNetwork status
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
#[derive(Default)]
pub struct Condition {
    /// Type of condition
    pub condition_type: String,

    /// Status: "True", "False", "Unknown"
    pub status: String,

    /// Reason for the condition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last update time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<String>,
}

impl Condition {
    pub fn new(condition_type: &str, status: &str, reason: &str, message: Option<String>) -> Self {
        Self {
            condition_type: condition_type.to_string(),
            status: status.to_string(),
            reason: Some(reason.to_string()),
            message,
            last_update_time: Some(chrono::Utc::now().to_rfc3339()),
        }
    }
}
