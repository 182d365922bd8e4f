//! Cloud networking provider boundary
//!
//! The reconcilers only talk to the provider through [`NetworkProvider`].
//! Implementations wrap an SDK client and map its failures onto
//! [`NetworkError`](crate::NetworkError): absent resources become `NotFound`
//! carrying the provider code, everything else `ProviderRejected`.

use async_trait::async_trait;
use network_api::Tags;

use crate::filter::Filter;
use crate::Result;

pub const STATE_PENDING: &str = "pending";
pub const STATE_AVAILABLE: &str = "available";
pub const CIDR_BLOCK_STATE_ASSOCIATED: &str = "associated";

/// A VPC as the provider reports it
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Vpc {
    pub vpc_id: String,
    pub cidr_block: String,
    pub state: String,
    pub ipv6_cidr_block_associations: Vec<Ipv6CidrBlockAssociation>,
    pub tags: Tags,
}

impl Vpc {
    /// First IPv6 block whose association completed
    pub fn associated_ipv6_block(&self) -> Option<&str> {
        self.ipv6_cidr_block_associations
            .iter()
            .find(|assoc| assoc.state == CIDR_BLOCK_STATE_ASSOCIATED)
            .map(|assoc| assoc.ipv6_cidr_block.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Ipv6CidrBlockAssociation {
    pub ipv6_cidr_block: String,
    pub state: String,
}

/// A subnet as the provider reports it
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Subnet {
    pub subnet_id: String,
    pub vpc_id: String,
    pub availability_zone: String,
    pub cidr_block: String,
    pub ipv6_cidr_block_associations: Vec<Ipv6CidrBlockAssociation>,
    pub map_public_ip_on_launch: bool,
    pub assign_ipv6_address_on_creation: bool,
    pub state: String,
    pub tags: Tags,
}

impl Subnet {
    pub fn associated_ipv6_block(&self) -> Option<&str> {
        self.ipv6_cidr_block_associations
            .iter()
            .find(|assoc| assoc.state == CIDR_BLOCK_STATE_ASSOCIATED)
            .map(|assoc| assoc.ipv6_cidr_block.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RouteTable {
    pub route_table_id: String,
    pub vpc_id: String,
    pub associations: Vec<RouteTableAssociation>,
    pub routes: Vec<Route>,
    pub tags: Tags,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RouteTableAssociation {
    /// Set for explicit subnet associations, unset for the main route
    /// table's implicit one
    pub subnet_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Route {
    pub destination_cidr_block: Option<String>,
    pub destination_ipv6_cidr_block: Option<String>,
    /// Internet gateway ID, or "local"
    pub gateway_id: Option<String>,
    pub nat_gateway_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NatGateway {
    pub nat_gateway_id: String,
    pub subnet_id: String,
    pub vpc_id: String,
    pub state: String,
}

/// One page of a paginated describe call
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AvailabilityZone {
    pub zone_name: String,
    pub region_name: String,
    pub state: String,
    /// "availability-zone", "local-zone" or "wavelength-zone"
    pub zone_type: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DescribeVpcsInput {
    pub vpc_ids: Vec<String>,
    pub filters: Vec<Filter>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CreateVpcInput {
    pub cidr_block: String,
    pub amazon_provided_ipv6_cidr_block: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CreateSubnetInput {
    pub vpc_id: String,
    pub cidr_block: String,
    pub ipv6_cidr_block: Option<String>,
    pub availability_zone: Option<String>,
}

/// Boolean VPC attributes. The provider reads and writes them one at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VpcAttribute {
    EnableDnsHostnames,
    EnableDnsSupport,
}

impl VpcAttribute {
    pub fn as_str(&self) -> &'static str {
        match self {
            VpcAttribute::EnableDnsHostnames => "enableDnsHostnames",
            VpcAttribute::EnableDnsSupport => "enableDnsSupport",
        }
    }
}

/// Boolean subnet attributes controlling address assignment on launch
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubnetAttribute {
    MapPublicIpOnLaunch,
    AssignIpv6AddressOnCreation,
}

impl SubnetAttribute {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubnetAttribute::MapPublicIpOnLaunch => "mapPublicIpOnLaunch",
            SubnetAttribute::AssignIpv6AddressOnCreation => "assignIpv6AddressOnCreation",
        }
    }
}

/// Networking API of the cloud provider
#[async_trait]
pub trait NetworkProvider: Send + Sync {
    async fn describe_vpcs(&self, input: DescribeVpcsInput) -> Result<Vec<Vpc>>;

    async fn create_vpc(&self, input: CreateVpcInput) -> Result<Vpc>;

    async fn delete_vpc(&self, vpc_id: &str) -> Result<()>;

    async fn describe_vpc_attribute(&self, vpc_id: &str, attribute: VpcAttribute) -> Result<bool>;

    async fn modify_vpc_attribute(
        &self,
        vpc_id: &str,
        attribute: VpcAttribute,
        value: bool,
    ) -> Result<()>;

    /// Block until the VPC is available, and its IPv6 block associated when
    /// `require_ipv6` is set. Fails with `WaitTimeout` past the provider's
    /// own ceiling.
    async fn wait_until_vpc_available(&self, vpc_id: &str, require_ipv6: bool) -> Result<()>;

    async fn describe_subnets(&self, filters: Vec<Filter>) -> Result<Vec<Subnet>>;

    async fn create_subnet(&self, input: CreateSubnetInput) -> Result<Subnet>;

    async fn modify_subnet_attribute(
        &self,
        subnet_id: &str,
        attribute: SubnetAttribute,
        value: bool,
    ) -> Result<()>;

    async fn wait_until_subnet_available(&self, subnet_id: &str) -> Result<()>;

    async fn describe_route_tables(&self, filters: Vec<Filter>) -> Result<Vec<RouteTable>>;

    async fn describe_nat_gateways(
        &self,
        filters: Vec<Filter>,
        next_token: Option<String>,
    ) -> Result<Page<NatGateway>>;

    async fn describe_availability_zones(&self, filters: Vec<Filter>)
        -> Result<Vec<AvailabilityZone>>;

    async fn create_tags(&self, resource_id: &str, tags: &Tags) -> Result<()>;
}
