//! NAT gateway inventory per subnet

use std::collections::BTreeMap;

use network_core::filter;
use network_core::provider::{STATE_AVAILABLE, STATE_PENDING};
use network_core::{NetworkProvider, Result};
use tracing::debug;

/// NAT gateway IDs grouped by the subnet they are placed in
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NatGatewayInventory {
    by_subnet: BTreeMap<String, Vec<String>>,
}

impl NatGatewayInventory {
    pub fn insert(&mut self, subnet_id: impl Into<String>, nat_gateway_id: impl Into<String>) {
        self.by_subnet
            .entry(subnet_id.into())
            .or_default()
            .push(nat_gateway_id.into());
    }

    pub fn gateways_in(&self, subnet_id: &str) -> &[String] {
        self.by_subnet
            .get(subnet_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The gateway reported on the subnet itself
    pub fn first_in(&self, subnet_id: &str) -> Option<&str> {
        self.gateways_in(subnet_id).first().map(String::as_str)
    }

    /// Every gateway ID, grouped by subnet in subnet order
    pub fn ids(&self) -> Vec<String> {
        self.by_subnet.values().flatten().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.by_subnet.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_subnet.is_empty()
    }
}

/// Walk every page of pending or available NAT gateways in `vpc_id`. An
/// empty result is a valid inventory.
pub async fn describe_nat_gateways_by_subnet(
    provider: &dyn NetworkProvider,
    vpc_id: &str,
) -> Result<NatGatewayInventory> {
    let mut inventory = NatGatewayInventory::default();
    let mut next_token = None;

    loop {
        let filters = vec![
            filter::vpc_id(vpc_id),
            filter::states(&[STATE_PENDING, STATE_AVAILABLE]),
        ];
        let page = provider
            .describe_nat_gateways(filters, next_token.take())
            .await
            .map_err(|e| e.context(format!("failed to describe NAT gateways in vpc {}", vpc_id)))?;

        for gateway in page.items {
            inventory.insert(gateway.subnet_id, gateway.nat_gateway_id);
        }

        match page.next_token {
            Some(token) if !token.is_empty() => next_token = Some(token),
            _ => break,
        }
    }

    debug!("Found {} NAT gateways in vpc {}", inventory.len(), vpc_id);
    Ok(inventory)
}
