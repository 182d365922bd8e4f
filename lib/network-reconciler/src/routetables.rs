//! Route table inspection used to classify subnets as public or private

use std::collections::HashMap;

use network_core::filter;
use network_core::provider::{Route, RouteTable};
use network_core::{NetworkProvider, Result};
use tracing::debug;

pub const ANY_IPV4_CIDR: &str = "0.0.0.0/0";
pub const ANY_IPV6_CIDR: &str = "::/0";

/// Prefix of internet gateway IDs
pub const INTERNET_GATEWAY_PREFIX: &str = "igw-";

/// True for a default route through an internet gateway
pub fn is_internet_route(route: &Route) -> bool {
    let default_destination = route.destination_cidr_block.as_deref() == Some(ANY_IPV4_CIDR)
        || route.destination_ipv6_cidr_block.as_deref() == Some(ANY_IPV6_CIDR);
    let via_internet_gateway = route
        .gateway_id
        .as_deref()
        .is_some_and(|gw| gw.starts_with(INTERNET_GATEWAY_PREFIX));

    default_destination && via_internet_gateway
}

pub fn has_internet_route(route_table: &RouteTable) -> bool {
    route_table.routes.iter().any(is_internet_route)
}

/// Route tables of `vpc_id` keyed by the subnets explicitly associated with
/// them. Subnets relying on the main route table's implicit association are
/// absent from the map.
pub async fn describe_route_tables_by_subnet(
    provider: &dyn NetworkProvider,
    vpc_id: &str,
) -> Result<HashMap<String, RouteTable>> {
    let route_tables = provider
        .describe_route_tables(vec![filter::vpc_id(vpc_id)])
        .await
        .map_err(|e| e.context(format!("failed to describe route tables in vpc {}", vpc_id)))?;

    let mut by_subnet = HashMap::new();
    for route_table in route_tables {
        for subnet_id in route_table
            .associations
            .iter()
            .filter_map(|assoc| assoc.subnet_id.clone())
        {
            by_subnet.insert(subnet_id, route_table.clone());
        }
    }

    debug!(
        "Found route table associations for {} subnets in vpc {}",
        by_subnet.len(),
        vpc_id
    );
    Ok(by_subnet)
}
