//! Datum network API types and CRDs
//!
//! This library defines the desired-state model for cluster networking:
//! - NetworkSpec: one VPC and its subnets
//! - Tags: ownership and role markers carried by cloud resources
//! - ClusterNetwork: the custom resource that stores a NetworkSpec

pub mod v1alpha1;

pub use v1alpha1::{
    build_tags, BuildParams, ClusterNetwork, ClusterNetworkSpec, ClusterNetworkStatus,
    NetworkSpec, ResourceLifecycle, SubnetSpec, Tags, VpcSpec,
};
