//! Writing tag sets to provider resources

use network_api::v1alpha1::tags::{
    cloud_provider_tag_key, BuildParams, ResourceLifecycle, COMMON_ROLE_TAG_VALUE,
    EXTERNAL_LOAD_BALANCER_TAG_KEY, INTERNAL_LOAD_BALANCER_TAG_KEY, PRIVATE_ROLE_TAG_VALUE,
    PUBLIC_ROLE_TAG_VALUE,
};
use network_api::{build_tags, Tags};
use network_core::{NetworkProvider, Result};
use tracing::debug;

use crate::scope::ClusterScope;

/// Write the full tag set described by `params`, regardless of what the
/// resource already carries
pub async fn apply_tags(provider: &dyn NetworkProvider, params: &BuildParams) -> Result<()> {
    let tags = build_tags(params);
    provider.create_tags(&params.resource_id, &tags).await
}

/// Write only the entries of the desired tag set that `current` lacks or
/// holds with another value. Returns whether a write was issued.
pub async fn ensure_tags(
    provider: &dyn NetworkProvider,
    current: &Tags,
    params: &BuildParams,
) -> Result<bool> {
    let missing = build_tags(params).difference(current);
    if missing.is_empty() {
        return Ok(false);
    }

    debug!(
        "Adding {} missing tags to {}",
        missing.len(),
        params.resource_id
    );
    provider.create_tags(&params.resource_id, &missing).await?;
    Ok(true)
}

/// Tag parameters for the cluster VPC
pub fn vpc_tag_params(scope: &ClusterScope, vpc_id: &str) -> BuildParams {
    BuildParams {
        cluster_name: scope.name().to_string(),
        resource_id: vpc_id.to_string(),
        lifecycle: ResourceLifecycle::Owned,
        name: Some(format!("{}-vpc", scope.name())),
        role: Some(COMMON_ROLE_TAG_VALUE.to_string()),
        additional: scope.additional_tags().clone(),
    }
}

/// Tag parameters for a subnet. Besides ownership and role, subnets carry the
/// cloud provider's cluster marker and the load balancer placement hint.
pub fn subnet_tag_params(scope: &ClusterScope, subnet_id: &str, public: bool) -> BuildParams {
    let (role, elb_key) = if public {
        (PUBLIC_ROLE_TAG_VALUE, EXTERNAL_LOAD_BALANCER_TAG_KEY)
    } else {
        (PRIVATE_ROLE_TAG_VALUE, INTERNAL_LOAD_BALANCER_TAG_KEY)
    };

    let mut additional = scope.additional_tags().clone();
    additional.insert(
        cloud_provider_tag_key(scope.name()),
        ResourceLifecycle::Shared.as_str(),
    );
    additional.insert(elb_key, "1");

    BuildParams {
        cluster_name: scope.name().to_string(),
        resource_id: subnet_id.to_string(),
        lifecycle: ResourceLifecycle::Owned,
        name: Some(format!("{}-subnet-{}", scope.name(), role)),
        role: Some(role.to_string()),
        additional,
    }
}
