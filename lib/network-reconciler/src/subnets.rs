//! Subnet reconciliation
//!
//! A pass runs in fixed phases. Availability zones are discovered first, and
//! only when a default subnet may be needed. Then the subnets of the VPC are
//! discovered, classified as public or private from their route tables, and
//! matched with the NAT gateways placed in them. Only after that does the
//! pass converge: the desired list is merged with what exists, missing
//! subnets are created one at a time, and existing ones have their tags and
//! launch attributes healed.
//!
//! Nothing in an unmanaged VPC is mutated. Its subnets are mirrored as
//! observed, and the pass fails unless at least one private and one public
//! subnet exist.

use network_api::v1alpha1::tags::PUBLIC_ROLE_TAG_VALUE;
use network_api::{build_tags, SubnetSpec, VpcSpec};
use network_core::codes;
use network_core::events::{actions, reasons};
use network_core::filter;
use network_core::provider::{CreateSubnetInput, Subnet, SubnetAttribute};
use network_core::{wait_for_with_retryable, NetworkError, Result};
use tracing::{debug, info, warn};

use crate::cidr::{subnet_ipv6_block, validate_ipv6_indices};
use crate::natgateways::{describe_nat_gateways_by_subnet, NatGatewayInventory};
use crate::routetables::{describe_route_tables_by_subnet, has_internet_route};
use crate::scope::ClusterScope;
use crate::tags::{apply_tags, ensure_tags, subnet_tag_params};
use crate::zones::select_zones;

pub const DEFAULT_PRIVATE_SUBNET_CIDR: &str = "10.0.0.0/24";
pub const DEFAULT_PUBLIC_SUBNET_CIDR: &str = "10.0.1.0/24";

/// IPv6 block indices of the default subnets
pub const DEFAULT_PRIVATE_IPV6_INDEX: u8 = 0;
pub const DEFAULT_PUBLIC_IPV6_INDEX: u8 = 1;

/// Phases of a subnet pass, in execution order
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SubnetPhase {
    DiscoverZones,
    DiscoverSubnets,
    Classify,
    InventoryNatGateways,
    Converge,
}

impl SubnetPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubnetPhase::DiscoverZones => "DiscoverZones",
            SubnetPhase::DiscoverSubnets => "DiscoverSubnets",
            SubnetPhase::Classify => "Classify",
            SubnetPhase::InventoryNatGateways => "InventoryNatGateways",
            SubnetPhase::Converge => "Converge",
        }
    }
}

/// Lifecycle of a subnet created during a pass
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SubnetState {
    Pending,
    Created,
    Available,
    Tagged,
    AttributesEnsured,
}

impl SubnetState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubnetState::Pending => "Pending",
            SubnetState::Created => "Created",
            SubnetState::Available => "Available",
            SubnetState::Tagged => "Tagged",
            SubnetState::AttributesEnsured => "AttributesEnsured",
        }
    }

    /// The only state a subnet may move to from this one
    pub fn next(&self) -> Option<SubnetState> {
        match self {
            SubnetState::Pending => Some(SubnetState::Created),
            SubnetState::Created => Some(SubnetState::Available),
            SubnetState::Available => Some(SubnetState::Tagged),
            SubnetState::Tagged => Some(SubnetState::AttributesEnsured),
            SubnetState::AttributesEnsured => None,
        }
    }
}

/// Result of a subnet pass
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubnetsOutcome {
    /// Desired subnets first, in order, then subnets only found by discovery.
    ///
    /// `is_public` of a discovered subnet reflects its route table only. A
    /// subnet created by this pass has no route table yet and reports the
    /// role it was created for; later passes report it as private until an
    /// internet route is associated. The role tag keeps later passes from
    /// provisioning a replacement in the meantime.
    pub subnets: Vec<SubnetSpec>,
    pub nat_gateways: NatGatewayInventory,
    /// IDs of subnets created by this pass
    pub created: Vec<String>,
}

/// Launch attributes as currently set on a subnet
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct LaunchAttributes {
    map_public_ip_on_launch: bool,
    assign_ipv6_address_on_creation: bool,
}

/// One entry of the converge plan
#[derive(Clone, Debug)]
struct Planned {
    spec: SubnetSpec,
    /// Role the subnet is meant to have
    public: bool,
    /// Set for subnets that already exist
    existing: Option<LaunchAttributes>,
}

/// Whether a subnet plays the public role: it routes through an internet
/// gateway, or carries the public role tag while its route table is not in
/// place yet
pub fn intended_public(spec: &SubnetSpec) -> bool {
    spec.is_public || spec.tags.role() == Some(PUBLIC_ROLE_TAG_VALUE)
}

pub struct SubnetReconciler<'a> {
    scope: &'a ClusterScope,
}

impl<'a> SubnetReconciler<'a> {
    pub fn new(scope: &'a ClusterScope) -> Self {
        Self { scope }
    }

    /// Converge the subnets of `vpc` towards `desired`
    pub async fn reconcile_subnets(
        &self,
        vpc: &VpcSpec,
        desired: &[SubnetSpec],
    ) -> Result<SubnetsOutcome> {
        let provider = self.scope.provider();
        let managed = !vpc.is_unmanaged(self.scope.name());
        debug!(
            "Reconciling {} desired subnets in {} vpc {}",
            desired.len(),
            if managed { "managed" } else { "unmanaged" },
            vpc.id
        );

        self.enter(SubnetPhase::DiscoverZones, vpc);
        let mut zones = None;
        if managed && !covers_both_roles(desired.iter().map(intended_public)) {
            zones = Some(select_zones(provider, 1).await?);
        }

        self.enter(SubnetPhase::DiscoverSubnets, vpc);
        let mut observed = self.describe_subnets(&vpc.id).await?;

        self.enter(SubnetPhase::Classify, vpc);
        let route_tables = describe_route_tables_by_subnet(provider, &vpc.id).await?;
        for (spec, _) in observed.iter_mut() {
            if let Some(route_table) = route_tables.get(&spec.id) {
                spec.route_table_id = Some(route_table.route_table_id.clone());
                spec.is_public = has_internet_route(route_table);
            }
        }

        self.enter(SubnetPhase::InventoryNatGateways, vpc);
        let nat_gateways = describe_nat_gateways_by_subnet(provider, &vpc.id).await?;
        for (spec, _) in observed.iter_mut() {
            spec.nat_gateway_id = nat_gateways.first_in(&spec.id).map(str::to_string);
        }

        self.enter(SubnetPhase::Converge, vpc);
        let mut plan = merge(desired, observed);

        if !managed {
            let subnets = self.mirror_unmanaged(vpc, plan).await?;
            return Ok(SubnetsOutcome {
                subnets,
                nat_gateways,
                created: Vec::new(),
            });
        }

        self.add_missing_defaults(vpc, &mut plan, &mut zones).await?;
        let specs: Vec<SubnetSpec> = plan.iter().map(|p| p.spec.clone()).collect();
        validate_ipv6_indices(&specs, vpc.ipv6_cidr_block.as_deref())?;

        let mut outcome = SubnetsOutcome {
            subnets: Vec::with_capacity(plan.len()),
            nat_gateways,
            created: Vec::new(),
        };
        for planned in plan {
            let subnet = match planned.existing {
                Some(attributes) => {
                    self.heal_existing(planned.spec, planned.public, attributes)
                        .await?
                }
                None => {
                    let subnet = self.create_subnet(vpc, &planned.spec, planned.public).await?;
                    outcome.created.push(subnet.id.clone());
                    subnet
                }
            };
            outcome.subnets.push(subnet);
        }

        Ok(outcome)
    }

    fn enter(&self, phase: SubnetPhase, vpc: &VpcSpec) {
        debug!("Subnet phase {} for vpc {}", phase.as_str(), vpc.id);
    }

    async fn describe_subnets(&self, vpc_id: &str) -> Result<Vec<(SubnetSpec, LaunchAttributes)>> {
        let filters = vec![filter::vpc_id(vpc_id), filter::pending_or_available()];
        let subnets = self
            .scope
            .provider()
            .describe_subnets(filters)
            .await
            .map_err(|e| e.context(format!("failed to describe subnets in vpc {}", vpc_id)))?;

        debug!("Found {} subnets in vpc {}", subnets.len(), vpc_id);
        Ok(subnets.into_iter().map(observe).collect())
    }

    async fn mirror_unmanaged(&self, vpc: &VpcSpec, plan: Vec<Planned>) -> Result<Vec<SubnetSpec>> {
        let mut subnets = Vec::with_capacity(plan.len());
        for planned in plan {
            if planned.existing.is_none() {
                return Err(NetworkError::InvalidConfiguration(format!(
                    "subnet {} does not exist in unmanaged vpc {}",
                    describe(&planned.spec),
                    vpc.id
                )));
            }
            subnets.push(planned.spec);
        }

        if !subnets.iter().any(|sn| !intended_public(sn)) {
            let message = format!(
                "expected at least 1 private subnet in vpc {:?} but got 0",
                vpc.id
            );
            self.scope
                .warning(reasons::FAILED_NO_PRIVATE_SUBNET, actions::RECONCILE, message.clone())
                .await;
            return Err(NetworkError::InvalidConfiguration(message));
        }
        if !subnets.iter().any(intended_public) {
            let message = format!(
                "expected at least 1 public subnet in vpc {:?} but got 0",
                vpc.id
            );
            self.scope
                .warning(reasons::FAILED_NO_PUBLIC_SUBNET, actions::RECONCILE, message.clone())
                .await;
            return Err(NetworkError::InvalidConfiguration(message));
        }

        Ok(subnets)
    }

    /// Append a default private and/or public subnet when the plan lacks
    /// that role
    async fn add_missing_defaults(
        &self,
        vpc: &VpcSpec,
        plan: &mut Vec<Planned>,
        zones: &mut Option<Vec<String>>,
    ) -> Result<()> {
        let has_private = plan.iter().any(|p| !p.public);
        let has_public = plan.iter().any(|p| p.public);
        if has_private && has_public {
            return Ok(());
        }

        let zone = match zones {
            Some(zones) => zones.first().cloned(),
            None => select_zones(self.scope.provider(), 1).await?.into_iter().next(),
        }
        .unwrap_or_default();

        if !has_private {
            info!("Adding default private subnet in {}", zone);
            plan.push(default_subnet(
                DEFAULT_PRIVATE_SUBNET_CIDR,
                false,
                &zone,
                vpc.enable_ipv6.then_some(DEFAULT_PRIVATE_IPV6_INDEX),
            ));
        }
        if !has_public {
            info!("Adding default public subnet in {}", zone);
            plan.push(default_subnet(
                DEFAULT_PUBLIC_SUBNET_CIDR,
                true,
                &zone,
                vpc.enable_ipv6.then_some(DEFAULT_PUBLIC_IPV6_INDEX),
            ));
        }

        Ok(())
    }

    /// Create one subnet and carry it through wait, tag and attributes
    /// before returning
    async fn create_subnet(
        &self,
        vpc: &VpcSpec,
        want: &SubnetSpec,
        public: bool,
    ) -> Result<SubnetSpec> {
        let provider = self.scope.provider();
        let mut state = SubnetState::Pending;

        if want.cidr_block.is_empty() {
            return Err(NetworkError::InvalidConfiguration(
                "subnet to create has no CIDR block".to_string(),
            ));
        }
        let ipv6_cidr_block = if want.is_ipv6 {
            Some(self.ipv6_block_for(vpc, want)?)
        } else {
            None
        };

        let input = CreateSubnetInput {
            vpc_id: vpc.id.clone(),
            cidr_block: want.cidr_block.clone(),
            ipv6_cidr_block: ipv6_cidr_block.clone(),
            availability_zone: (!want.availability_zone.is_empty())
                .then(|| want.availability_zone.clone()),
        };
        let created = match provider.create_subnet(input).await {
            Ok(subnet) => subnet,
            Err(e) => {
                self.scope
                    .warning(
                        reasons::FAILED_CREATE_SUBNET,
                        actions::CREATE,
                        format!("Failed creating new managed Subnet {}: {}", want.cidr_block, e),
                    )
                    .await;
                return Err(e.context(format!("failed to create subnet {}", want.cidr_block)));
            }
        };
        let subnet_id = created.subnet_id.clone();
        state = advance(&subnet_id, state, SubnetState::Created)?;
        self.scope
            .event(
                reasons::SUCCESSFUL_CREATE_SUBNET,
                actions::CREATE,
                format!("Created new managed Subnet {:?}", subnet_id),
            )
            .await;
        info!(
            "Created subnet {} ({}, public: {}) in {}",
            subnet_id, created.cidr_block, public, created.availability_zone
        );

        provider
            .wait_until_subnet_available(&subnet_id)
            .await
            .map_err(|e| e.context(format!("failed to wait for subnet {:?}", subnet_id)))?;
        state = advance(&subnet_id, state, SubnetState::Available)?;

        let params = subnet_tag_params(self.scope, &subnet_id, public);
        let tagged = {
            let params = &params;
            wait_for_with_retryable(
                &self.scope.retry(),
                &subnet_id,
                &[codes::SUBNET_NOT_FOUND],
                || async move { apply_tags(provider, params).await.map(|_| true) },
            )
            .await
        };
        if let Err(e) = tagged {
            self.scope
                .warning(
                    reasons::FAILED_TAG_SUBNET,
                    actions::TAG,
                    format!("Failed tagging managed Subnet {:?}: {}", subnet_id, e),
                )
                .await;
            return Err(e.context(format!("failed to tag subnet {:?}", subnet_id)));
        }
        self.scope
            .event(
                reasons::SUCCESSFUL_TAG_SUBNET,
                actions::TAG,
                format!("Tagged managed Subnet {:?}", subnet_id),
            )
            .await;
        state = advance(&subnet_id, state, SubnetState::Tagged)?;

        let subnet = SubnetSpec {
            id: subnet_id.clone(),
            availability_zone: created.availability_zone.clone(),
            cidr_block: created.cidr_block.clone(),
            is_public: public,
            is_ipv6: ipv6_cidr_block.is_some(),
            ipv6_cidr_block_id: want.ipv6_cidr_block_id.filter(|_| want.is_ipv6),
            ipv6_cidr_block: created
                .associated_ipv6_block()
                .map(str::to_string)
                .or(ipv6_cidr_block),
            route_table_id: None,
            nat_gateway_id: None,
            tags: build_tags(&params),
        };

        let mut attributes = Vec::new();
        if public {
            attributes.push(SubnetAttribute::MapPublicIpOnLaunch);
        }
        if subnet.is_ipv6 {
            attributes.push(SubnetAttribute::AssignIpv6AddressOnCreation);
        }
        self.set_launch_attributes(&subnet, &attributes).await?;
        advance(&subnet_id, state, SubnetState::AttributesEnsured)?;

        Ok(subnet)
    }

    fn ipv6_block_for(&self, vpc: &VpcSpec, want: &SubnetSpec) -> Result<String> {
        if !vpc.enable_ipv6 {
            return Err(NetworkError::InvalidConfiguration(format!(
                "subnet {} requests IPv6 but vpc {} has IPv6 disabled",
                describe(want),
                vpc.id
            )));
        }
        let vpc_block = vpc.ipv6_cidr_block.as_deref().ok_or_else(|| NetworkError::Ipv6 {
            vpc_id: vpc.id.clone(),
            source: Box::new(NetworkError::not_found(
                "ipv6 cidr block",
                "vpc has no associated IPv6 block",
            )),
        })?;
        let index = want.ipv6_cidr_block_id.ok_or_else(|| {
            NetworkError::InvalidConfiguration(format!(
                "IPv6 subnet {} has no ipv6CidrBlockID",
                describe(want)
            ))
        })?;

        Ok(subnet_ipv6_block(vpc_block, index)?.to_string())
    }

    /// Re-assert tags on an existing subnet of a managed VPC and turn on any
    /// launch attribute its role needs but lacks
    async fn heal_existing(
        &self,
        mut subnet: SubnetSpec,
        public: bool,
        current: LaunchAttributes,
    ) -> Result<SubnetSpec> {
        let params = subnet_tag_params(self.scope, &subnet.id, public);
        let desired = build_tags(&params);
        let changed = !desired.difference(&subnet.tags).is_empty();

        let result = {
            let provider = self.scope.provider();
            let (current_tags, params) = (&subnet.tags, &params);
            wait_for_with_retryable(
                &self.scope.retry(),
                &subnet.id,
                &[codes::SUBNET_NOT_FOUND],
                || async move { ensure_tags(provider, current_tags, params).await.map(|_| true) },
            )
            .await
        };
        if let Err(e) = result {
            self.scope
                .warning(
                    reasons::FAILED_TAG_SUBNET,
                    actions::TAG,
                    format!("Failed tagging managed Subnet {:?}: {}", subnet.id, e),
                )
                .await;
            return Err(e.context(format!("failed to tag subnet {:?}", subnet.id)));
        }
        if changed {
            self.scope
                .event(
                    reasons::SUCCESSFUL_TAG_SUBNET,
                    actions::TAG,
                    format!("Updated tags of managed Subnet {:?}", subnet.id),
                )
                .await;
        }
        subnet.tags.merge(&desired);

        let mut attributes = Vec::new();
        if public && !current.map_public_ip_on_launch {
            attributes.push(SubnetAttribute::MapPublicIpOnLaunch);
        }
        if subnet.is_ipv6 && !current.assign_ipv6_address_on_creation {
            attributes.push(SubnetAttribute::AssignIpv6AddressOnCreation);
        }
        self.set_launch_attributes(&subnet, &attributes).await?;

        Ok(subnet)
    }

    async fn set_launch_attributes(
        &self,
        subnet: &SubnetSpec,
        attributes: &[SubnetAttribute],
    ) -> Result<()> {
        if attributes.is_empty() {
            return Ok(());
        }
        if !subnet.tags.is_managed(self.scope.name()) {
            info!("Skipping attribute changes on unmanaged subnet {}", subnet.id);
            return Ok(());
        }

        let provider = self.scope.provider();
        for &attribute in attributes {
            let subnet_id = subnet.id.as_str();
            let result = wait_for_with_retryable(
                &self.scope.retry(),
                subnet_id,
                &[codes::SUBNET_NOT_FOUND],
                || async move {
                    provider
                        .modify_subnet_attribute(subnet_id, attribute, true)
                        .await
                        .map(|_| true)
                },
            )
            .await;

            if let Err(e) = result {
                self.scope
                    .warning(
                        reasons::FAILED_MODIFY_SUBNET_ATTRIBUTES,
                        actions::MODIFY,
                        format!(
                            "Failed modifying managed Subnet {:?} attribute {}: {}",
                            subnet.id,
                            attribute.as_str(),
                            e
                        ),
                    )
                    .await;
                return Err(e.context(format!(
                    "failed to set {} on subnet {:?}",
                    attribute.as_str(),
                    subnet.id
                )));
            }
        }

        let names: Vec<&str> = attributes.iter().map(SubnetAttribute::as_str).collect();
        self.scope
            .event(
                reasons::SUCCESSFUL_MODIFY_SUBNET_ATTRIBUTES,
                actions::MODIFY,
                format!("Modified managed Subnet {:?} attributes: {}", subnet.id, names.join(", ")),
            )
            .await;
        Ok(())
    }
}

fn observe(subnet: Subnet) -> (SubnetSpec, LaunchAttributes) {
    let ipv6_cidr_block = subnet.associated_ipv6_block().map(str::to_string);
    let attributes = LaunchAttributes {
        map_public_ip_on_launch: subnet.map_public_ip_on_launch,
        assign_ipv6_address_on_creation: subnet.assign_ipv6_address_on_creation,
    };
    let spec = SubnetSpec {
        id: subnet.subnet_id,
        availability_zone: subnet.availability_zone,
        cidr_block: subnet.cidr_block,
        is_public: false,
        is_ipv6: ipv6_cidr_block.is_some(),
        ipv6_cidr_block_id: None,
        ipv6_cidr_block,
        route_table_id: None,
        nat_gateway_id: None,
        tags: subnet.tags,
    };
    (spec, attributes)
}

/// Union of the desired list and discovered subnets.
///
/// A desired subnet matches a discovered one by ID, or by IPv4 CIDR when it
/// has no ID. Observed fields win for matches. Desired subnets without a
/// match are planned for creation, with any stale ID dropped. Discovered
/// subnets nobody asked for are kept at the end.
fn merge(desired: &[SubnetSpec], observed: Vec<(SubnetSpec, LaunchAttributes)>) -> Vec<Planned> {
    let mut remaining: Vec<Option<(SubnetSpec, LaunchAttributes)>> =
        observed.into_iter().map(Some).collect();
    let mut plan = Vec::with_capacity(desired.len() + remaining.len());

    for want in desired {
        let matched = remaining
            .iter()
            .position(|candidate| {
                candidate.as_ref().is_some_and(|(spec, _)| {
                    if want.id.is_empty() {
                        !want.cidr_block.is_empty() && spec.cidr_block == want.cidr_block
                    } else {
                        spec.id == want.id
                    }
                })
            })
            .and_then(|index| remaining[index].take());

        match matched {
            Some((mut spec, attributes)) => {
                spec.ipv6_cidr_block_id = want.ipv6_cidr_block_id.filter(|_| spec.is_ipv6);
                let public = want.is_public || intended_public(&spec);
                plan.push(Planned {
                    spec,
                    public,
                    existing: Some(attributes),
                });
            }
            None => {
                let mut spec = want.clone();
                if !spec.id.is_empty() {
                    warn!(
                        "Subnet {} was not found in the vpc, creating {} in its place",
                        spec.id, spec.cidr_block
                    );
                    spec.id.clear();
                }
                spec.route_table_id = None;
                spec.nat_gateway_id = None;
                spec.ipv6_cidr_block = None;
                let public = intended_public(&spec);
                plan.push(Planned {
                    spec,
                    public,
                    existing: None,
                });
            }
        }
    }

    for (spec, attributes) in remaining.into_iter().flatten() {
        let public = intended_public(&spec);
        plan.push(Planned {
            spec,
            public,
            existing: Some(attributes),
        });
    }

    plan
}

fn covers_both_roles(roles: impl Iterator<Item = bool>) -> bool {
    let (mut private, mut public) = (false, false);
    for is_public in roles {
        if is_public {
            public = true;
        } else {
            private = true;
        }
    }
    private && public
}

fn default_subnet(cidr_block: &str, public: bool, zone: &str, ipv6_index: Option<u8>) -> Planned {
    Planned {
        spec: SubnetSpec {
            availability_zone: zone.to_string(),
            cidr_block: cidr_block.to_string(),
            is_public: public,
            is_ipv6: ipv6_index.is_some(),
            ipv6_cidr_block_id: ipv6_index,
            ..Default::default()
        },
        public,
        existing: None,
    }
}

fn advance(subnet_id: &str, state: SubnetState, next: SubnetState) -> Result<SubnetState> {
    if state.next() != Some(next) {
        return Err(NetworkError::InvalidConfiguration(format!(
            "subnet {} cannot move from {} to {}",
            subnet_id,
            state.as_str(),
            next.as_str()
        )));
    }
    debug!("Subnet {} state {} -> {}", subnet_id, state.as_str(), next.as_str());
    Ok(next)
}

fn describe(subnet: &SubnetSpec) -> &str {
    if subnet.id.is_empty() {
        &subnet.cidr_block
    } else {
        &subnet.id
    }
}
