//! Availability zone selection for default subnets

use network_core::filter::{self, Filter};
use network_core::provider::STATE_AVAILABLE;
use network_core::{NetworkError, NetworkProvider, Result};
use tracing::debug;

/// Zone type of regular availability zones, as opposed to local or
/// wavelength zones
pub const ZONE_TYPE_AVAILABILITY_ZONE: &str = "availability-zone";

/// Up to `max` available zones of the region, in lexicographic order so that
/// repeated passes pick the same zones
pub async fn select_zones(provider: &dyn NetworkProvider, max: usize) -> Result<Vec<String>> {
    let filters: Vec<Filter> = vec![
        filter::states(&[STATE_AVAILABLE]),
        filter::zone_type(ZONE_TYPE_AVAILABILITY_ZONE),
    ];
    let zones = provider
        .describe_availability_zones(filters)
        .await
        .map_err(|e| e.context("failed to describe availability zones"))?;

    let mut names: Vec<String> = zones.into_iter().map(|zone| zone.zone_name).collect();
    names.sort();
    names.dedup();
    names.truncate(max);

    if names.is_empty() {
        return Err(NetworkError::not_found(
            "availability zones",
            "no available zones in the region",
        ));
    }

    debug!("Selected availability zones: {:?}", names);
    Ok(names)
}
