//! NetworkService runs a full network pass for one cluster

use network_api::{ClusterNetwork, ClusterNetworkStatus, NetworkSpec};
use network_core::Result;
use tracing::info;

use crate::natgateways::NatGatewayInventory;
use crate::scope::ClusterScope;
use crate::subnets::SubnetReconciler;
use crate::vpc::VpcReconciler;

/// Observed network after a successful pass
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NetworkOutcome {
    pub network: NetworkSpec,
    pub nat_gateways: NatGatewayInventory,
    /// Subnets created by the pass
    pub created_subnets: Vec<String>,
}

impl NetworkOutcome {
    pub fn status(&self) -> ClusterNetworkStatus {
        let mut status = ClusterNetworkStatus::converged(&self.network);
        status.nat_gateway_ids = self.nat_gateways.ids();
        status
    }
}

pub struct NetworkService {
    scope: ClusterScope,
}

impl NetworkService {
    pub fn new(scope: ClusterScope) -> Self {
        Self { scope }
    }

    pub fn scope(&self) -> &ClusterScope {
        &self.scope
    }

    /// Converge the VPC, then its subnets. `desired` is never modified; the
    /// observed network is returned instead.
    pub async fn reconcile_network(&self, desired: &NetworkSpec) -> Result<NetworkOutcome> {
        info!("Reconciling network for cluster {}", self.scope.name());

        let vpc = VpcReconciler::new(&self.scope)
            .reconcile_vpc(&desired.vpc)
            .await?;
        let subnets = SubnetReconciler::new(&self.scope)
            .reconcile_subnets(&vpc, &desired.subnets)
            .await?;

        info!(
            "Reconciled network for cluster {}: vpc {}, {} subnets, {} created",
            self.scope.name(),
            vpc.id,
            subnets.subnets.len(),
            subnets.created.len()
        );

        Ok(NetworkOutcome {
            network: NetworkSpec {
                vpc,
                subnets: subnets.subnets,
            },
            nat_gateways: subnets.nat_gateways,
            created_subnets: subnets.created,
        })
    }

    /// Delete the cluster VPC. Subnets, gateways and route tables must be
    /// gone already.
    pub async fn delete_network(&self, desired: &NetworkSpec) -> Result<()> {
        info!("Deleting network for cluster {}", self.scope.name());
        VpcReconciler::new(&self.scope)
            .delete_vpc(&desired.vpc)
            .await
    }
}

/// Record the result of a pass in the status of `network`. A failed pass
/// keeps the IDs reported by the last successful one.
pub fn apply_outcome(network: &mut ClusterNetwork, result: &Result<NetworkOutcome>) {
    let status = match result {
        Ok(outcome) => outcome.status(),
        Err(e) => ClusterNetworkStatus::failed(network.status.as_ref(), e.reason(), e.to_string()),
    };
    network.status = Some(status);
}
