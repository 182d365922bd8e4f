//! VPC and subnet reconciliation
//!
//! This library provides:
//! - VpcReconciler: finds, creates, adopts and deletes the cluster VPC
//! - SubnetReconciler: discovers, classifies and converges subnets
//! - NetworkService: one full pass over a NetworkSpec

pub mod cidr;
pub mod natgateways;
pub mod routetables;
pub mod scope;
pub mod service;
pub mod subnets;
pub mod tags;
pub mod vpc;
pub mod zones;

#[cfg(test)]
mod fake;

pub use natgateways::NatGatewayInventory;
pub use scope::ClusterScope;
pub use service::{apply_outcome, NetworkOutcome, NetworkService};
pub use subnets::SubnetReconciler;
pub use vpc::VpcReconciler;
