//! IPv6 block arithmetic for subnets
//!
//! A VPC gets a /56 from the provider. Each IPv6 subnet takes the /64 whose
//! eighth octet equals its index, so index 10 of `2001:10:10:10::/56` is
//! `2001:10:10:a::/64`.

use std::collections::BTreeMap;
use std::net::Ipv6Addr;

use ipnetwork::Ipv6Network;
use network_api::SubnetSpec;
use network_core::{NetworkError, Result};

/// Prefix length of the block a VPC receives
pub const VPC_IPV6_PREFIX: u8 = 56;

/// Prefix length of every subnet block
pub const SUBNET_IPV6_PREFIX: u8 = 64;

/// The /64 at `index` within the VPC block `vpc_block`
pub fn subnet_ipv6_block(vpc_block: &str, index: u8) -> Result<Ipv6Network> {
    let vpc: Ipv6Network = vpc_block.trim().parse()?;
    if vpc.prefix() != VPC_IPV6_PREFIX {
        return Err(NetworkError::InvalidConfiguration(format!(
            "vpc IPv6 block {} must be a /{}",
            vpc_block, VPC_IPV6_PREFIX
        )));
    }

    let mut octets = vpc.network().octets();
    octets[7] = index;
    Ok(Ipv6Network::new(Ipv6Addr::from(octets), SUBNET_IPV6_PREFIX)?)
}

/// Index of the /64 `subnet_block` within `vpc_block`, or `None` when it is
/// not a /64 carved from that /56
pub fn ipv6_block_index(vpc_block: &str, subnet_block: &str) -> Option<u8> {
    let vpc: Ipv6Network = vpc_block.trim().parse().ok()?;
    let subnet: Ipv6Network = subnet_block.trim().parse().ok()?;
    if vpc.prefix() != VPC_IPV6_PREFIX
        || subnet.prefix() != SUBNET_IPV6_PREFIX
        || !vpc.contains(subnet.network())
    {
        return None;
    }
    Some(subnet.network().octets()[7])
}

/// Reject subnets that would carve the same /64 out of `vpc_block`. A subnet
/// that already holds a block occupies the index of that block; the others
/// occupy their requested index. Must run before any subnet is created so a
/// bad list never half-applies.
pub fn validate_ipv6_indices(subnets: &[SubnetSpec], vpc_block: Option<&str>) -> Result<()> {
    let mut seen: BTreeMap<u8, &SubnetSpec> = BTreeMap::new();

    for subnet in subnets.iter().filter(|sn| sn.is_ipv6) {
        let occupied = vpc_block
            .zip(subnet.ipv6_cidr_block.as_deref())
            .and_then(|(vpc, block)| ipv6_block_index(vpc, block));
        let Some(index) = occupied.or(subnet.ipv6_cidr_block_id) else {
            continue;
        };
        if let Some(previous) = seen.insert(index, subnet) {
            return Err(NetworkError::InvalidConfiguration(format!(
                "subnets {} and {} both use IPv6 block index {}",
                describe(previous),
                describe(subnet),
                index
            )));
        }
    }

    Ok(())
}

fn describe(subnet: &SubnetSpec) -> &str {
    if subnet.id.is_empty() {
        &subnet.cidr_block
    } else {
        &subnet.id
    }
}
