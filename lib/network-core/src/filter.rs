//! Describe filters shared by the reconcilers

use network_api::v1alpha1::tags::{cluster_tag_key, ResourceLifecycle};

use crate::provider::{CIDR_BLOCK_STATE_ASSOCIATED, STATE_AVAILABLE, STATE_PENDING};

/// A named filter matching any of `values`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Filter {
    pub name: String,
    pub values: Vec<String>,
}

impl Filter {
    pub fn new(name: impl Into<String>, values: &[&str]) -> Self {
        Self {
            name: name.into(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    /// True when `value` is one of the accepted values
    pub fn accepts(&self, value: &str) -> bool {
        self.values.iter().any(|v| v == value)
    }
}

/// Resources owned by `cluster_name`
pub fn cluster(cluster_name: &str) -> Filter {
    Filter::new(
        format!("tag:{}", cluster_tag_key(cluster_name)),
        &[ResourceLifecycle::Owned.as_str()],
    )
}

pub fn vpc_id(vpc_id: &str) -> Filter {
    Filter::new("vpc-id", &[vpc_id])
}

pub fn states(states: &[&str]) -> Filter {
    Filter::new("state", states)
}

/// Resources that are being created or exist; terminating ones are invisible
pub fn pending_or_available() -> Filter {
    states(&[STATE_PENDING, STATE_AVAILABLE])
}

/// VPCs whose IPv6 block association has completed
pub fn ipv6_block_associated() -> Filter {
    Filter::new(
        "ipv6-cidr-block-association.state",
        &[CIDR_BLOCK_STATE_ASSOCIATED],
    )
}

pub fn zone_type(zone_type: &str) -> Filter {
    Filter::new("zone-type", &[zone_type])
}
