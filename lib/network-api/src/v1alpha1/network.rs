use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::tags::Tags;

/// NetworkSpec describes the network topology of a cluster: exactly one VPC
/// and an ordered list of subnets inside it
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    /// The VPC the cluster runs in
    #[serde(default)]
    pub vpc: VpcSpec,

    /// Subnets of the VPC, in declaration order
    #[serde(default)]
    pub subnets: Vec<SubnetSpec>,
}

impl NetworkSpec {
    pub fn find_subnet(&self, id: &str) -> Option<&SubnetSpec> {
        self.subnets.iter().find(|sn| sn.id == id)
    }

    pub fn private_subnets(&self) -> impl Iterator<Item = &SubnetSpec> {
        self.subnets.iter().filter(|sn| !sn.is_public)
    }

    pub fn public_subnets(&self) -> impl Iterator<Item = &SubnetSpec> {
        self.subnets.iter().filter(|sn| sn.is_public)
    }
}

/// VPC configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VpcSpec {
    /// Provider ID of the VPC, empty until resolved or created
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    /// IPv4 CIDR block of the VPC
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cidr_block: String,

    /// Request a provider assigned IPv6 block for the VPC
    #[serde(default, rename = "enableIPv6")]
    pub enable_ipv6: bool,

    /// Associated IPv6 block, set once the association is complete
    #[serde(default, rename = "ipv6CidrBlock", skip_serializing_if = "Option::is_none")]
    pub ipv6_cidr_block: Option<String>,

    /// Tags observed on the VPC
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
}

impl VpcSpec {
    /// True iff the VPC carries this cluster's `owned` marker
    pub fn is_managed(&self, cluster_name: &str) -> bool {
        self.tags.is_managed(cluster_name)
    }

    /// A VPC is unmanaged when it names an existing resource that this
    /// cluster does not own
    pub fn is_unmanaged(&self, cluster_name: &str) -> bool {
        !self.id.is_empty() && !self.is_managed(cluster_name)
    }
}

/// Subnet configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubnetSpec {
    /// Provider ID of the subnet, empty until created
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub availability_zone: String,

    /// IPv4 CIDR block of the subnet
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cidr_block: String,

    /// Whether the subnet routes to the internet through an internet gateway
    #[serde(default)]
    pub is_public: bool,

    /// Whether the subnet gets an IPv6 block carved from the VPC block
    #[serde(default, rename = "isIPv6")]
    pub is_ipv6: bool,

    /// Index of the /64 block within the VPC /56 block
    #[serde(default, rename = "ipv6CidrBlockID", skip_serializing_if = "Option::is_none")]
    pub ipv6_cidr_block_id: Option<u8>,

    /// Observed IPv6 block of the subnet
    #[serde(default, rename = "ipv6CidrBlock", skip_serializing_if = "Option::is_none")]
    pub ipv6_cidr_block: Option<String>,

    /// Route table associated with the subnet
    #[serde(default, rename = "routeTableID", skip_serializing_if = "Option::is_none")]
    pub route_table_id: Option<String>,

    /// NAT gateway placed in the subnet
    #[serde(default, rename = "natGatewayID", skip_serializing_if = "Option::is_none")]
    pub nat_gateway_id: Option<String>,

    /// Tags observed on the subnet
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
}

impl SubnetSpec {
    pub fn role(&self) -> &'static str {
        if self.is_public {
            super::tags::PUBLIC_ROLE_TAG_VALUE
        } else {
            super::tags::PRIVATE_ROLE_TAG_VALUE
        }
    }
}
