//! VPC reconciliation
//!
//! A pass resolves the cluster VPC (by ID, or by the cluster ownership tag
//! when no ID is known), creates it when absent, and then heals its tags and
//! DNS attributes. Unmanaged VPCs are mirrored without any mutation.

use network_api::{build_tags, VpcSpec};
use network_core::codes;
use network_core::events::{actions, reasons};
use network_core::filter;
use network_core::provider::{
    CreateVpcInput, DescribeVpcsInput, Vpc, VpcAttribute, STATE_AVAILABLE, STATE_PENDING,
};
use network_core::{wait_for_with_retryable, NetworkError, Result};
use tracing::{debug, info};

use crate::scope::ClusterScope;
use crate::tags::{apply_tags, ensure_tags, vpc_tag_params};

/// IPv4 block of a VPC created without an explicit one
pub const DEFAULT_VPC_CIDR: &str = "10.0.0.0/16";

/// Attributes every managed VPC must have enabled
const MANAGED_ATTRIBUTES: [VpcAttribute; 2] =
    [VpcAttribute::EnableDnsHostnames, VpcAttribute::EnableDnsSupport];

/// Progress of one VPC reconciliation pass
#[derive(Clone, Debug, PartialEq)]
pub enum VpcState {
    Unknown,
    NotFound,
    Found(VpcSpec),
    Created(VpcSpec),
    /// Unmanaged VPC, mirrored as observed
    Adopted(VpcSpec),
    Tagged(VpcSpec),
    AttributesEnsured(VpcSpec),
}

impl VpcState {
    pub fn as_str(&self) -> &'static str {
        match self {
            VpcState::Unknown => "Unknown",
            VpcState::NotFound => "NotFound",
            VpcState::Found(_) => "Found",
            VpcState::Created(_) => "Created",
            VpcState::Adopted(_) => "Adopted",
            VpcState::Tagged(_) => "Tagged",
            VpcState::AttributesEnsured(_) => "AttributesEnsured",
        }
    }

    pub fn can_transition_to(&self, next: &VpcState) -> bool {
        matches!(
            (self, next),
            (VpcState::Unknown, VpcState::Found(_))
                | (VpcState::Unknown, VpcState::NotFound)
                | (VpcState::NotFound, VpcState::Created(_))
                | (VpcState::Found(_), VpcState::Adopted(_))
                | (VpcState::Found(_), VpcState::Tagged(_))
                | (VpcState::Created(_), VpcState::Tagged(_))
                | (VpcState::Tagged(_), VpcState::AttributesEnsured(_))
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, VpcState::Adopted(_) | VpcState::AttributesEnsured(_))
    }
}

pub struct VpcReconciler<'a> {
    scope: &'a ClusterScope,
}

impl<'a> VpcReconciler<'a> {
    pub fn new(scope: &'a ClusterScope) -> Self {
        Self { scope }
    }

    /// Converge the cluster VPC and return it as observed
    pub async fn reconcile_vpc(&self, desired: &VpcSpec) -> Result<VpcSpec> {
        debug!("Reconciling VPC for cluster {}", self.scope.name());

        let mut state = VpcState::Unknown;
        loop {
            let next = match &state {
                VpcState::Unknown => match self.describe_vpc(desired).await {
                    Ok(vpc) => VpcState::Found(vpc),
                    Err(e) if e.is_not_found() => VpcState::NotFound,
                    Err(e) => return Err(e.context("failed to describe VPCs")),
                },
                VpcState::NotFound => VpcState::Created(
                    self.create_vpc(desired)
                        .await
                        .map_err(|e| e.context("failed to create new vpc"))?,
                ),
                VpcState::Found(vpc) if vpc.is_unmanaged(self.scope.name()) => {
                    info!("Working on unmanaged VPC {}", vpc.id);
                    VpcState::Adopted(vpc.clone())
                }
                VpcState::Found(vpc) | VpcState::Created(vpc) => {
                    VpcState::Tagged(self.ensure_vpc_tags(vpc).await?)
                }
                VpcState::Tagged(vpc) => {
                    self.ensure_attributes(&vpc.id).await?;
                    VpcState::AttributesEnsured(vpc.clone())
                }
                VpcState::Adopted(vpc) | VpcState::AttributesEnsured(vpc) => {
                    debug!("Reconciled VPC {}", vpc.id);
                    return Ok(vpc.clone());
                }
            };

            if !state.can_transition_to(&next) {
                return Err(NetworkError::InvalidConfiguration(format!(
                    "vpc reconciliation cannot move from {} to {}",
                    state.as_str(),
                    next.as_str()
                )));
            }
            debug!("VPC state {} -> {}", state.as_str(), next.as_str());
            state = next;
        }
    }

    /// Resolve the VPC by ID, or by the cluster ownership tag when `desired`
    /// has no ID.
    ///
    /// Zero matches, or a VPC that is not pending or available, is
    /// `NotFound`; more than one match is a `Conflict`. When IPv6 is enabled
    /// the VPC must carry an associated IPv6 block.
    pub async fn describe_vpc(&self, desired: &VpcSpec) -> Result<VpcSpec> {
        let mut input = DescribeVpcsInput {
            vpc_ids: Vec::new(),
            filters: vec![filter::pending_or_available()],
        };
        if desired.id.is_empty() {
            input.filters.push(filter::cluster(self.scope.name()));
        } else {
            input.vpc_ids.push(desired.id.clone());
        }
        if desired.enable_ipv6 {
            input.filters.push(filter::ipv6_block_associated());
        }

        let vpcs = self.scope.provider().describe_vpcs(input).await.map_err(|e| {
            if e.is_not_found() {
                e
            } else {
                e.context("failed to query for VPCs")
            }
        })?;

        let vpc = match vpcs.as_slice() {
            [] => {
                return Err(NetworkError::not_found(
                    format!("vpc {:?}", desired.id),
                    "could not find vpc",
                ))
            }
            [vpc] => vpc,
            many => {
                let ids: Vec<&str> = many.iter().map(|vpc| vpc.vpc_id.as_str()).collect();
                return Err(NetworkError::Conflict(format!(
                    "found {} VPCs with matching tags for cluster {}, \
                     please clean up extra VPCs: {}",
                    many.len(),
                    self.scope.name(),
                    ids.join(", ")
                )));
            }
        };

        if vpc.state != STATE_PENDING && vpc.state != STATE_AVAILABLE {
            return Err(NetworkError::not_found(
                format!("vpc {}", vpc.vpc_id),
                format!("vpc is in state {:?}", vpc.state),
            ));
        }

        let mut observed = Self::to_spec(vpc, desired.enable_ipv6);
        if desired.enable_ipv6 {
            match vpc.associated_ipv6_block() {
                Some(block) => observed.ipv6_cidr_block = Some(block.to_string()),
                None => return Err(Self::missing_ipv6(&vpc.vpc_id)),
            }
        }

        Ok(observed)
    }

    /// Create the VPC, wait for it, and tag it as owned by the cluster
    pub async fn create_vpc(&self, desired: &VpcSpec) -> Result<VpcSpec> {
        if desired.is_unmanaged(self.scope.name()) {
            return Err(NetworkError::Unmanaged(format!(
                "vpc {:?}: it does not exist and is not owned by cluster {}",
                desired.id,
                self.scope.name()
            )));
        }

        let provider = self.scope.provider();
        let input = CreateVpcInput {
            cidr_block: if desired.cidr_block.is_empty() {
                DEFAULT_VPC_CIDR.to_string()
            } else {
                desired.cidr_block.clone()
            },
            amazon_provided_ipv6_cidr_block: desired.enable_ipv6,
        };

        let created = match provider.create_vpc(input).await {
            Ok(vpc) => vpc,
            Err(e) => {
                self.scope
                    .warning(
                        reasons::FAILED_CREATE_VPC,
                        actions::CREATE,
                        format!("Failed to create new managed VPC: {}", e),
                    )
                    .await;
                return Err(e);
            }
        };
        self.scope
            .event(
                reasons::SUCCESSFUL_CREATE_VPC,
                actions::CREATE,
                format!("Created new managed VPC {:?}", created.vpc_id),
            )
            .await;
        info!("Created VPC {}", created.vpc_id);

        provider
            .wait_until_vpc_available(&created.vpc_id, desired.enable_ipv6)
            .await
            .map_err(|e| e.context(format!("failed to wait for vpc {:?}", created.vpc_id)))?;

        let params = vpc_tag_params(self.scope, &created.vpc_id);
        let tagged = {
            let params = &params;
            wait_for_with_retryable(
                &self.scope.retry(),
                &created.vpc_id,
                &[codes::VPC_NOT_FOUND],
                || async move { apply_tags(provider, params).await.map(|_| true) },
            )
            .await
        };
        if let Err(e) = tagged {
            self.scope
                .warning(
                    reasons::FAILED_TAG_VPC,
                    actions::TAG,
                    format!("Failed to tag managed VPC {:?}: {}", created.vpc_id, e),
                )
                .await;
            return Err(e.context(format!("failed to tag vpc {:?}", created.vpc_id)));
        }
        self.scope
            .event(
                reasons::SUCCESSFUL_TAG_VPC,
                actions::TAG,
                format!("Tagged managed VPC {:?}", created.vpc_id),
            )
            .await;

        let mut observed = Self::to_spec(&created, desired.enable_ipv6);
        observed.tags = build_tags(&params);
        if desired.enable_ipv6 {
            observed.ipv6_cidr_block = Some(self.created_ipv6_block(&created).await?);
        }

        Ok(observed)
    }

    /// The IPv6 block of a freshly created VPC. The create response may
    /// predate the association, in which case the VPC is read back once;
    /// a VPC still lacking the block is a hard failure.
    async fn created_ipv6_block(&self, created: &Vpc) -> Result<String> {
        if let Some(block) = created.associated_ipv6_block() {
            return Ok(block.to_string());
        }

        let input = DescribeVpcsInput {
            vpc_ids: vec![created.vpc_id.clone()],
            filters: Vec::new(),
        };
        let vpcs = self
            .scope
            .provider()
            .describe_vpcs(input)
            .await
            .map_err(|e| NetworkError::Ipv6 {
                vpc_id: created.vpc_id.clone(),
                source: Box::new(e),
            })?;

        vpcs.iter()
            .find_map(|vpc| vpc.associated_ipv6_block())
            .map(str::to_string)
            .ok_or_else(|| Self::missing_ipv6(&created.vpc_id))
    }

    /// Add whatever part of the canonical tag set the VPC is missing
    async fn ensure_vpc_tags(&self, vpc: &VpcSpec) -> Result<VpcSpec> {
        let params = vpc_tag_params(self.scope, &vpc.id);
        let desired = build_tags(&params);
        let changed = !desired.difference(&vpc.tags).is_empty();

        let result = {
            let provider = self.scope.provider();
            let (current, params) = (&vpc.tags, &params);
            wait_for_with_retryable(
                &self.scope.retry(),
                &vpc.id,
                &[codes::VPC_NOT_FOUND],
                || async move { ensure_tags(provider, current, params).await.map(|_| true) },
            )
            .await
        };
        if let Err(e) = result {
            self.scope
                .warning(
                    reasons::FAILED_TAG_VPC,
                    actions::TAG,
                    format!("Failed to tag managed VPC {:?}: {}", vpc.id, e),
                )
                .await;
            return Err(e.context(format!("failed to tag vpc {:?}", vpc.id)));
        }
        if changed {
            self.scope
                .event(
                    reasons::SUCCESSFUL_TAG_VPC,
                    actions::TAG,
                    format!("Updated tags of managed VPC {:?}", vpc.id),
                )
                .await;
        }

        let mut tagged = vpc.clone();
        tagged.tags.merge(&desired);
        Ok(tagged)
    }

    async fn ensure_attributes(&self, vpc_id: &str) -> Result<()> {
        let result = wait_for_with_retryable(
            &self.scope.retry(),
            vpc_id,
            &[codes::VPC_NOT_FOUND],
            || async move { self.ensure_managed_vpc_attributes(vpc_id).await.map(|_| true) },
        )
        .await;

        result.map_err(|e| e.context(format!("failed to set vpc attributes for {:?}", vpc_id)))
    }

    /// Turn on DNS hostnames and DNS support where they are off. Every
    /// attribute is attempted; failures are reported together. Returns
    /// whether anything changed.
    pub async fn ensure_managed_vpc_attributes(&self, vpc_id: &str) -> Result<bool> {
        let provider = self.scope.provider();
        let mut errors = Vec::new();
        let mut updated = Vec::new();

        for attribute in MANAGED_ATTRIBUTES {
            match provider.describe_vpc_attribute(vpc_id, attribute).await {
                Ok(true) => {}
                Ok(false) => match provider.modify_vpc_attribute(vpc_id, attribute, true).await {
                    Ok(()) => updated.push(attribute.as_str()),
                    Err(e) => errors.push(e.context(format!(
                        "failed to set {} vpc attribute",
                        attribute.as_str()
                    ))),
                },
                Err(e) => errors.push(e.context(format!(
                    "failed to describe {} vpc attribute",
                    attribute.as_str()
                ))),
            }
        }

        if !errors.is_empty() {
            let err = NetworkError::AggregateAttribute(errors);
            self.scope
                .warning(
                    reasons::FAILED_SET_VPC_ATTRIBUTES,
                    actions::MODIFY,
                    format!("Failed to set managed VPC attributes for {:?}: {}", vpc_id, err),
                )
                .await;
            return Err(err);
        }

        if updated.is_empty() {
            return Ok(false);
        }

        self.scope
            .event(
                reasons::SUCCESSFUL_SET_VPC_ATTRIBUTES,
                actions::MODIFY,
                format!("Set managed VPC attributes for {:?}: {}", vpc_id, updated.join(", ")),
            )
            .await;
        Ok(true)
    }

    /// Delete the cluster VPC. Unmanaged VPCs are left alone and an absent
    /// VPC counts as deleted.
    pub async fn delete_vpc(&self, desired: &VpcSpec) -> Result<()> {
        if desired.is_unmanaged(self.scope.name()) {
            info!("Skipping VPC deletion in unmanaged mode");
            return Ok(());
        }

        // The IPv6 association is irrelevant to deletion
        let lookup = VpcSpec {
            enable_ipv6: false,
            ..desired.clone()
        };
        let vpc = match self.describe_vpc(&lookup).await {
            Ok(vpc) => vpc,
            Err(e) if e.is_not_found() => {
                debug!("VPC {:?} already deleted", desired.id);
                return Ok(());
            }
            Err(e) => return Err(e.context("failed to describe vpc for deletion")),
        };

        if vpc.is_unmanaged(self.scope.name()) {
            info!("Skipping deletion of unmanaged VPC {}", vpc.id);
            return Ok(());
        }

        match self.scope.provider().delete_vpc(&vpc.id).await {
            Ok(()) => {}
            Err(e) if e.code() == Some(codes::VPC_NOT_FOUND) => {
                debug!("VPC {} already deleted", vpc.id);
                return Ok(());
            }
            Err(e) => {
                self.scope
                    .warning(
                        reasons::FAILED_DELETE_VPC,
                        actions::DELETE,
                        format!("Failed to delete managed VPC {:?}: {}", vpc.id, e),
                    )
                    .await;
                return Err(e.context(format!("failed to delete vpc {:?}", vpc.id)));
            }
        }

        self.scope
            .event(
                reasons::SUCCESSFUL_DELETE_VPC,
                actions::DELETE,
                format!("Deleted managed VPC {:?}", vpc.id),
            )
            .await;
        info!("Deleted VPC {}", vpc.id);
        Ok(())
    }

    fn to_spec(vpc: &Vpc, enable_ipv6: bool) -> VpcSpec {
        VpcSpec {
            id: vpc.vpc_id.clone(),
            cidr_block: vpc.cidr_block.clone(),
            enable_ipv6,
            ipv6_cidr_block: None,
            tags: vpc.tags.clone(),
        }
    }

    fn missing_ipv6(vpc_id: &str) -> NetworkError {
        NetworkError::Ipv6 {
            vpc_id: vpc_id.to_string(),
            source: Box::new(NetworkError::not_found(
                "ipv6 cidr block",
                "no associated IPv6 block on vpc",
            )),
        }
    }
}
