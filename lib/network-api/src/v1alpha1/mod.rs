/// API version v1alpha1 for Datum network CRDs

pub mod cluster_network;
pub mod network;
pub mod tags;

pub use cluster_network::{
    ClusterNetwork, ClusterNetworkSpec, ClusterNetworkStatus, Condition, CONDITION_NETWORK_READY,
};
pub use network::{NetworkSpec, SubnetSpec, VpcSpec};
pub use tags::{build as build_tags, BuildParams, ResourceLifecycle, Tags};
