//! In-memory provider for tests. Interprets describe filters, records every
//! call in order, and fails calls on demand.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use network_api::Tags;
use network_core::codes;
use network_core::config::NetworkConfig;
use network_core::events::RecordingEventPublisher;
use network_core::filter::Filter;
use network_core::provider::{
    AvailabilityZone, CreateSubnetInput, CreateVpcInput, DescribeVpcsInput,
    Ipv6CidrBlockAssociation, NatGateway, Page, Route, RouteTable, RouteTableAssociation, Subnet,
    SubnetAttribute, Vpc, VpcAttribute, CIDR_BLOCK_STATE_ASSOCIATED, STATE_AVAILABLE,
};
use network_core::{NetworkError, NetworkProvider, Result};

use crate::scope::ClusterScope;

pub const CLUSTER_NAME: &str = "test-cluster";

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    DescribeVpcs(DescribeVpcsInput),
    CreateVpc(CreateVpcInput),
    DeleteVpc(String),
    DescribeVpcAttribute(String, VpcAttribute),
    ModifyVpcAttribute(String, VpcAttribute, bool),
    WaitUntilVpcAvailable(String, bool),
    DescribeSubnets(Vec<Filter>),
    CreateSubnet(CreateSubnetInput),
    ModifySubnetAttribute(String, SubnetAttribute, bool),
    WaitUntilSubnetAvailable(String),
    DescribeRouteTables(Vec<Filter>),
    DescribeNatGateways(Option<String>),
    DescribeAvailabilityZones(Vec<Filter>),
    CreateTags(String, Tags),
}

impl Call {
    pub fn name(&self) -> &'static str {
        match self {
            Call::DescribeVpcs(_) => "DescribeVpcs",
            Call::CreateVpc(_) => "CreateVpc",
            Call::DeleteVpc(_) => "DeleteVpc",
            Call::DescribeVpcAttribute(..) => "DescribeVpcAttribute",
            Call::ModifyVpcAttribute(..) => "ModifyVpcAttribute",
            Call::WaitUntilVpcAvailable(..) => "WaitUntilVpcAvailable",
            Call::DescribeSubnets(_) => "DescribeSubnets",
            Call::CreateSubnet(_) => "CreateSubnet",
            Call::ModifySubnetAttribute(..) => "ModifySubnetAttribute",
            Call::WaitUntilSubnetAvailable(_) => "WaitUntilSubnetAvailable",
            Call::DescribeRouteTables(_) => "DescribeRouteTables",
            Call::DescribeNatGateways(_) => "DescribeNatGateways",
            Call::DescribeAvailabilityZones(_) => "DescribeAvailabilityZones",
            Call::CreateTags(..) => "CreateTags",
        }
    }

    /// True for calls that change provider state
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Call::CreateVpc(_)
                | Call::DeleteVpc(_)
                | Call::ModifyVpcAttribute(..)
                | Call::CreateSubnet(_)
                | Call::ModifySubnetAttribute(..)
                | Call::CreateTags(..)
        )
    }
}

#[derive(Default)]
struct FakeState {
    vpcs: Vec<Vpc>,
    subnets: Vec<Subnet>,
    route_tables: Vec<RouteTable>,
    nat_gateways: Vec<NatGateway>,
    zones: Vec<AvailabilityZone>,
    vpc_attributes: HashMap<(String, &'static str), bool>,
    ipv6_pool: Option<String>,
    nat_page_size: usize,
    failures: HashMap<&'static str, VecDeque<NetworkError>>,
    calls: Vec<Call>,
    next_id: u32,
}

impl FakeState {
    fn record(&mut self, call: Call) -> Result<()> {
        let name = call.name();
        self.calls.push(call);
        match self.failures.get_mut(name).and_then(|queue| queue.pop_front()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{:04}", prefix, self.next_id)
    }

    fn vpc_mut(&mut self, vpc_id: &str) -> Result<&mut Vpc> {
        self.vpcs
            .iter_mut()
            .find(|vpc| vpc.vpc_id == vpc_id)
            .ok_or_else(|| vpc_not_found(vpc_id))
    }

    fn subnet_mut(&mut self, subnet_id: &str) -> Result<&mut Subnet> {
        self.subnets
            .iter_mut()
            .find(|sn| sn.subnet_id == subnet_id)
            .ok_or_else(|| subnet_not_found(subnet_id))
    }
}

pub struct FakeProvider {
    state: Mutex<FakeState>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                ipv6_pool: Some("2001:db8:1234:1a00::/56".to_string()),
                nat_page_size: 100,
                ..Default::default()
            }),
        }
    }

    pub fn with_vpc(self, vpc: Vpc) -> Self {
        self.state.lock().unwrap().vpcs.push(vpc);
        self
    }

    pub fn with_subnet(self, subnet: Subnet) -> Self {
        self.state.lock().unwrap().subnets.push(subnet);
        self
    }

    pub fn with_route_table(self, route_table: RouteTable) -> Self {
        self.state.lock().unwrap().route_tables.push(route_table);
        self
    }

    /// Route tables usually appear after the subnets they serve
    pub fn add_route_table(&self, route_table: RouteTable) {
        self.state.lock().unwrap().route_tables.push(route_table);
    }

    pub fn with_nat_gateway(self, nat_gateway: NatGateway) -> Self {
        self.state.lock().unwrap().nat_gateways.push(nat_gateway);
        self
    }

    pub fn with_zone(self, zone_name: &str) -> Self {
        self.with_zone_details(zone_name, STATE_AVAILABLE, "availability-zone")
    }

    pub fn with_zone_details(self, zone_name: &str, state: &str, zone_type: &str) -> Self {
        self.state.lock().unwrap().zones.push(AvailabilityZone {
            zone_name: zone_name.to_string(),
            region_name: "us-east-1".to_string(),
            state: state.to_string(),
            zone_type: zone_type.to_string(),
        });
        self
    }

    pub fn with_vpc_attribute(self, vpc_id: &str, attribute: VpcAttribute, value: bool) -> Self {
        self.state
            .lock()
            .unwrap()
            .vpc_attributes
            .insert((vpc_id.to_string(), attribute.as_str()), value);
        self
    }

    /// New VPCs come back without an associated IPv6 block
    pub fn without_ipv6_pool(self) -> Self {
        self.state.lock().unwrap().ipv6_pool = None;
        self
    }

    pub fn with_nat_page_size(self, size: usize) -> Self {
        self.state.lock().unwrap().nat_page_size = size.max(1);
        self
    }

    /// Fail the next call to `operation` with `err`. Queued failures are
    /// consumed in order.
    pub fn fail_next(&self, operation: &'static str, err: NetworkError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(operation)
            .or_default()
            .push_back(err);
    }

    pub fn fail_times<F>(&self, operation: &'static str, times: usize, err: F)
    where
        F: Fn() -> NetworkError,
    {
        for _ in 0..times {
            self.fail_next(operation, err());
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_named(&self, name: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.name() == name).collect()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn vpc(&self, vpc_id: &str) -> Option<Vpc> {
        let state = self.state.lock().unwrap();
        state.vpcs.iter().find(|vpc| vpc.vpc_id == vpc_id).cloned()
    }

    pub fn vpcs(&self) -> Vec<Vpc> {
        self.state.lock().unwrap().vpcs.clone()
    }

    pub fn subnet(&self, subnet_id: &str) -> Option<Subnet> {
        let state = self.state.lock().unwrap();
        state
            .subnets
            .iter()
            .find(|sn| sn.subnet_id == subnet_id)
            .cloned()
    }

    pub fn subnets(&self) -> Vec<Subnet> {
        self.state.lock().unwrap().subnets.clone()
    }

    pub fn vpc_attribute(&self, vpc_id: &str, attribute: VpcAttribute) -> bool {
        let state = self.state.lock().unwrap();
        state
            .vpc_attributes
            .get(&(vpc_id.to_string(), attribute.as_str()))
            .copied()
            .unwrap_or(false)
    }
}

fn vpc_not_found(vpc_id: &str) -> NetworkError {
    NetworkError::not_found_code(
        format!("vpc {}", vpc_id),
        codes::VPC_NOT_FOUND,
        format!("The vpc ID '{}' does not exist", vpc_id),
    )
}

fn subnet_not_found(subnet_id: &str) -> NetworkError {
    NetworkError::not_found_code(
        format!("subnet {}", subnet_id),
        codes::SUBNET_NOT_FOUND,
        format!("The subnet ID '{}' does not exist", subnet_id),
    )
}

fn matches_all<F>(filters: &[Filter], lookup: F) -> bool
where
    F: Fn(&str) -> Vec<String>,
{
    filters
        .iter()
        .all(|f| lookup(&f.name).iter().any(|value| f.accepts(value)))
}

fn tag_lookup(tags: &Tags, name: &str) -> Vec<String> {
    name.strip_prefix("tag:")
        .and_then(|key| tags.get(key))
        .map(|value| vec![value.to_string()])
        .unwrap_or_default()
}

fn associated(block: &str) -> Vec<Ipv6CidrBlockAssociation> {
    vec![Ipv6CidrBlockAssociation {
        ipv6_cidr_block: block.to_string(),
        state: CIDR_BLOCK_STATE_ASSOCIATED.to_string(),
    }]
}

#[async_trait]
impl NetworkProvider for FakeProvider {
    async fn describe_vpcs(&self, input: DescribeVpcsInput) -> Result<Vec<Vpc>> {
        let mut state = self.state.lock().unwrap();
        state.record(Call::DescribeVpcs(input.clone()))?;

        if let Some(missing) = input
            .vpc_ids
            .iter()
            .find(|id| !state.vpcs.iter().any(|vpc| &vpc.vpc_id == *id))
        {
            return Err(vpc_not_found(missing));
        }

        Ok(state
            .vpcs
            .iter()
            .filter(|vpc| input.vpc_ids.is_empty() || input.vpc_ids.contains(&vpc.vpc_id))
            .filter(|vpc| {
                matches_all(&input.filters, |name| match name {
                    "state" => vec![vpc.state.clone()],
                    "vpc-id" => vec![vpc.vpc_id.clone()],
                    "ipv6-cidr-block-association.state" => vpc
                        .ipv6_cidr_block_associations
                        .iter()
                        .map(|assoc| assoc.state.clone())
                        .collect(),
                    other => tag_lookup(&vpc.tags, other),
                })
            })
            .cloned()
            .collect())
    }

    async fn create_vpc(&self, input: CreateVpcInput) -> Result<Vpc> {
        let mut state = self.state.lock().unwrap();
        state.record(Call::CreateVpc(input.clone()))?;

        let vpc_id = state.next_id("vpc");
        let ipv6_cidr_block_associations =
            match (&state.ipv6_pool, input.amazon_provided_ipv6_cidr_block) {
                (Some(block), true) => associated(block),
                _ => Vec::new(),
            };
        let vpc = Vpc {
            vpc_id,
            cidr_block: input.cidr_block,
            state: STATE_AVAILABLE.to_string(),
            ipv6_cidr_block_associations,
            tags: Tags::new(),
        };
        state.vpcs.push(vpc.clone());
        Ok(vpc)
    }

    async fn delete_vpc(&self, vpc_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.record(Call::DeleteVpc(vpc_id.to_string()))?;

        let before = state.vpcs.len();
        state.vpcs.retain(|vpc| vpc.vpc_id != vpc_id);
        if state.vpcs.len() == before {
            return Err(vpc_not_found(vpc_id));
        }
        Ok(())
    }

    async fn describe_vpc_attribute(&self, vpc_id: &str, attribute: VpcAttribute) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        state.record(Call::DescribeVpcAttribute(vpc_id.to_string(), attribute))?;
        state.vpc_mut(vpc_id)?;

        Ok(state
            .vpc_attributes
            .get(&(vpc_id.to_string(), attribute.as_str()))
            .copied()
            .unwrap_or(false))
    }

    async fn modify_vpc_attribute(
        &self,
        vpc_id: &str,
        attribute: VpcAttribute,
        value: bool,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.record(Call::ModifyVpcAttribute(vpc_id.to_string(), attribute, value))?;
        state.vpc_mut(vpc_id)?;

        state
            .vpc_attributes
            .insert((vpc_id.to_string(), attribute.as_str()), value);
        Ok(())
    }

    async fn wait_until_vpc_available(&self, vpc_id: &str, require_ipv6: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.record(Call::WaitUntilVpcAvailable(vpc_id.to_string(), require_ipv6))?;
        state.vpc_mut(vpc_id).map(|_| ())
    }

    async fn describe_subnets(&self, filters: Vec<Filter>) -> Result<Vec<Subnet>> {
        let mut state = self.state.lock().unwrap();
        state.record(Call::DescribeSubnets(filters.clone()))?;

        Ok(state
            .subnets
            .iter()
            .filter(|sn| {
                matches_all(&filters, |name| match name {
                    "state" => vec![sn.state.clone()],
                    "vpc-id" => vec![sn.vpc_id.clone()],
                    "subnet-id" => vec![sn.subnet_id.clone()],
                    other => tag_lookup(&sn.tags, other),
                })
            })
            .cloned()
            .collect())
    }

    async fn create_subnet(&self, input: CreateSubnetInput) -> Result<Subnet> {
        let mut state = self.state.lock().unwrap();
        state.record(Call::CreateSubnet(input.clone()))?;
        state.vpc_mut(&input.vpc_id)?;

        if state
            .subnets
            .iter()
            .any(|sn| sn.vpc_id == input.vpc_id && sn.cidr_block == input.cidr_block)
        {
            return Err(NetworkError::rejected(
                "CreateSubnet",
                codes::SUBNET_CONFLICT,
                format!("The CIDR '{}' conflicts with another subnet", input.cidr_block),
            ));
        }

        let subnet = Subnet {
            subnet_id: state.next_id("subnet"),
            vpc_id: input.vpc_id,
            availability_zone: input
                .availability_zone
                .unwrap_or_else(|| "us-east-1a".to_string()),
            cidr_block: input.cidr_block,
            ipv6_cidr_block_associations: input
                .ipv6_cidr_block
                .as_deref()
                .map(associated)
                .unwrap_or_default(),
            map_public_ip_on_launch: false,
            assign_ipv6_address_on_creation: false,
            state: STATE_AVAILABLE.to_string(),
            tags: Tags::new(),
        };
        state.subnets.push(subnet.clone());
        Ok(subnet)
    }

    async fn modify_subnet_attribute(
        &self,
        subnet_id: &str,
        attribute: SubnetAttribute,
        value: bool,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.record(Call::ModifySubnetAttribute(subnet_id.to_string(), attribute, value))?;

        let subnet = state.subnet_mut(subnet_id)?;
        match attribute {
            SubnetAttribute::MapPublicIpOnLaunch => subnet.map_public_ip_on_launch = value,
            SubnetAttribute::AssignIpv6AddressOnCreation => {
                subnet.assign_ipv6_address_on_creation = value
            }
        }
        Ok(())
    }

    async fn wait_until_subnet_available(&self, subnet_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.record(Call::WaitUntilSubnetAvailable(subnet_id.to_string()))?;
        state.subnet_mut(subnet_id).map(|_| ())
    }

    async fn describe_route_tables(&self, filters: Vec<Filter>) -> Result<Vec<RouteTable>> {
        let mut state = self.state.lock().unwrap();
        state.record(Call::DescribeRouteTables(filters.clone()))?;

        Ok(state
            .route_tables
            .iter()
            .filter(|rt| {
                matches_all(&filters, |name| match name {
                    "vpc-id" => vec![rt.vpc_id.clone()],
                    other => tag_lookup(&rt.tags, other),
                })
            })
            .cloned()
            .collect())
    }

    async fn describe_nat_gateways(
        &self,
        filters: Vec<Filter>,
        next_token: Option<String>,
    ) -> Result<Page<NatGateway>> {
        let mut state = self.state.lock().unwrap();
        state.record(Call::DescribeNatGateways(next_token.clone()))?;

        let matching: Vec<NatGateway> = state
            .nat_gateways
            .iter()
            .filter(|ngw| {
                matches_all(&filters, |name| match name {
                    "vpc-id" => vec![ngw.vpc_id.clone()],
                    "state" => vec![ngw.state.clone()],
                    _ => Vec::new(),
                })
            })
            .cloned()
            .collect();

        let start: usize = next_token.and_then(|t| t.parse().ok()).unwrap_or(0);
        let end = (start + state.nat_page_size).min(matching.len());
        Ok(Page {
            items: matching[start.min(end)..end].to_vec(),
            next_token: (end < matching.len()).then(|| end.to_string()),
        })
    }

    async fn describe_availability_zones(
        &self,
        filters: Vec<Filter>,
    ) -> Result<Vec<AvailabilityZone>> {
        let mut state = self.state.lock().unwrap();
        state.record(Call::DescribeAvailabilityZones(filters.clone()))?;

        Ok(state
            .zones
            .iter()
            .filter(|zone| {
                matches_all(&filters, |name| match name {
                    "state" => vec![zone.state.clone()],
                    "zone-type" => vec![zone.zone_type.clone()],
                    "zone-name" => vec![zone.zone_name.clone()],
                    _ => Vec::new(),
                })
            })
            .cloned()
            .collect())
    }

    async fn create_tags(&self, resource_id: &str, tags: &Tags) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.record(Call::CreateTags(resource_id.to_string(), tags.clone()))?;

        let current = if resource_id.starts_with("vpc-") {
            &mut state.vpc_mut(resource_id)?.tags
        } else if resource_id.starts_with("subnet-") {
            &mut state.subnet_mut(resource_id)?.tags
        } else {
            return Err(NetworkError::rejected(
                "CreateTags",
                codes::INVALID_PARAMETER,
                format!("unsupported resource {}", resource_id),
            ));
        };
        current.merge(tags);
        Ok(())
    }
}

/// Scope for `CLUSTER_NAME` with millisecond retries and recorded events
pub fn test_scope(provider: Arc<FakeProvider>) -> (ClusterScope, Arc<RecordingEventPublisher>) {
    let events = Arc::new(RecordingEventPublisher::new());
    let config = NetworkConfig {
        retry_max_attempts: 3,
        retry_initial_delay_ms: 1,
        retry_max_delay_ms: 5,
        retry_backoff_multiplier: 2.0,
        ..Default::default()
    };
    let scope = ClusterScope::new(CLUSTER_NAME, config, provider, events.clone());
    (scope, events)
}

pub fn tags(pairs: &[(&str, &str)]) -> Tags {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Tags marking a resource as owned by `CLUSTER_NAME`
pub fn owned_tags() -> Tags {
    tags(&[(
        "sigs.k8s.io/cluster-api-provider-aws/cluster/test-cluster",
        "owned",
    )])
}

pub fn vpc(vpc_id: &str, cidr_block: &str, tags: Tags) -> Vpc {
    Vpc {
        vpc_id: vpc_id.to_string(),
        cidr_block: cidr_block.to_string(),
        state: STATE_AVAILABLE.to_string(),
        ipv6_cidr_block_associations: Vec::new(),
        tags,
    }
}

pub fn ipv6_vpc(vpc_id: &str, cidr_block: &str, ipv6_block: &str, tags: Tags) -> Vpc {
    Vpc {
        ipv6_cidr_block_associations: associated(ipv6_block),
        ..vpc(vpc_id, cidr_block, tags)
    }
}

pub fn subnet(subnet_id: &str, vpc_id: &str, zone: &str, cidr_block: &str, tags: Tags) -> Subnet {
    Subnet {
        subnet_id: subnet_id.to_string(),
        vpc_id: vpc_id.to_string(),
        availability_zone: zone.to_string(),
        cidr_block: cidr_block.to_string(),
        ipv6_cidr_block_associations: Vec::new(),
        map_public_ip_on_launch: false,
        assign_ipv6_address_on_creation: false,
        state: STATE_AVAILABLE.to_string(),
        tags,
    }
}

pub fn ipv6_subnet(
    subnet_id: &str,
    vpc_id: &str,
    zone: &str,
    cidr_block: &str,
    ipv6_block: &str,
    tags: Tags,
) -> Subnet {
    Subnet {
        ipv6_cidr_block_associations: associated(ipv6_block),
        assign_ipv6_address_on_creation: true,
        ..subnet(subnet_id, vpc_id, zone, cidr_block, tags)
    }
}

/// Route table explicitly associated with `subnet_ids`, optionally carrying a
/// default route through `internet_gateway`
pub fn route_table(
    route_table_id: &str,
    vpc_id: &str,
    subnet_ids: &[&str],
    internet_gateway: Option<&str>,
) -> RouteTable {
    let mut routes = vec![Route {
        destination_cidr_block: Some("10.0.0.0/16".to_string()),
        gateway_id: Some("local".to_string()),
        ..Default::default()
    }];
    if let Some(igw) = internet_gateway {
        routes.push(Route {
            destination_cidr_block: Some("0.0.0.0/0".to_string()),
            gateway_id: Some(igw.to_string()),
            ..Default::default()
        });
    }

    RouteTable {
        route_table_id: route_table_id.to_string(),
        vpc_id: vpc_id.to_string(),
        associations: subnet_ids
            .iter()
            .map(|id| RouteTableAssociation {
                subnet_id: Some(id.to_string()),
            })
            .collect(),
        routes,
        tags: Tags::new(),
    }
}

pub fn nat_gateway(nat_gateway_id: &str, subnet_id: &str, vpc_id: &str) -> NatGateway {
    NatGateway {
        nat_gateway_id: nat_gateway_id.to_string(),
        subnet_id: subnet_id.to_string(),
        vpc_id: vpc_id.to_string(),
        state: STATE_AVAILABLE.to_string(),
    }
}
