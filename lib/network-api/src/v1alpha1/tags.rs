use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;

/// Tag key carrying the human readable name of a resource
pub const NAME_TAG_KEY: &str = "Name";

/// Prefix of the per-cluster ownership tag key
pub const CLUSTER_TAG_PREFIX: &str = "sigs.k8s.io/cluster-api-provider-aws/cluster/";

/// Tag key carrying the role of a resource
pub const ROLE_TAG_KEY: &str = "sigs.k8s.io/cluster-api-provider-aws/role";

/// Prefix of the tag the cloud provider integration uses to find cluster resources
pub const CLOUD_PROVIDER_TAG_PREFIX: &str = "kubernetes.io/cluster/";

/// Marks a subnet as a candidate for internet facing load balancers
pub const EXTERNAL_LOAD_BALANCER_TAG_KEY: &str = "kubernetes.io/role/elb";

/// Marks a subnet as a candidate for internal load balancers
pub const INTERNAL_LOAD_BALANCER_TAG_KEY: &str = "kubernetes.io/role/internal-elb";

pub const PUBLIC_ROLE_TAG_VALUE: &str = "public";
pub const PRIVATE_ROLE_TAG_VALUE: &str = "private";
pub const COMMON_ROLE_TAG_VALUE: &str = "common";

/// Ownership tag key for a cluster
pub fn cluster_tag_key(cluster_name: &str) -> String {
    format!("{}{}", CLUSTER_TAG_PREFIX, cluster_name)
}

/// Cloud provider tag key for a cluster
pub fn cloud_provider_tag_key(cluster_name: &str) -> String {
    format!("{}{}", CLOUD_PROVIDER_TAG_PREFIX, cluster_name)
}

/// Lifecycle recorded in the ownership tag of a resource
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResourceLifecycle {
    /// Created by and for this cluster; may be mutated and deleted
    Owned,
    /// Used by this cluster but owned elsewhere; never mutated
    Shared,
}

impl ResourceLifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceLifecycle::Owned => "owned",
            ResourceLifecycle::Shared => "shared",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "owned" => Some(ResourceLifecycle::Owned),
            "shared" => Some(ResourceLifecycle::Shared),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tags observed on, or desired for, a cloud resource.
///
/// Tags are the only record of which cluster owns a resource and what role
/// it plays, so every ownership decision goes through the accessors here.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.0.iter()
    }

    /// Lifecycle recorded for `cluster_name`, if the resource carries one
    pub fn lifecycle(&self, cluster_name: &str) -> Option<ResourceLifecycle> {
        self.get(&cluster_tag_key(cluster_name))
            .and_then(ResourceLifecycle::parse)
    }

    /// True iff the ownership tag for `cluster_name` is `owned`
    pub fn is_managed(&self, cluster_name: &str) -> bool {
        self.lifecycle(cluster_name) == Some(ResourceLifecycle::Owned)
    }

    pub fn role(&self) -> Option<&str> {
        self.get(ROLE_TAG_KEY)
    }

    pub fn name(&self) -> Option<&str> {
        self.get(NAME_TAG_KEY)
    }

    /// Entries of `self` that are missing from `other` or carry a different value
    pub fn difference(&self, other: &Tags) -> Tags {
        self.0
            .iter()
            .filter(|(k, v)| other.0.get(*k) != Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Copy every entry of `other` into `self`, overwriting existing keys
    pub fn merge(&mut self, other: &Tags) {
        for (k, v) in other.iter() {
            self.0.insert(k.clone(), v.clone());
        }
    }
}

impl FromIterator<(String, String)> for Tags {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<BTreeMap<String, String>> for Tags {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl<'a> IntoIterator for &'a Tags {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Inputs for deriving the canonical tag set of a resource. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildParams {
    pub cluster_name: String,
    pub resource_id: String,
    pub lifecycle: ResourceLifecycle,
    pub name: Option<String>,
    pub role: Option<String>,
    /// Operator supplied tags; ownership, role and name win over these
    pub additional: Tags,
}

/// Build the tag set described by `params`
pub fn build(params: &BuildParams) -> Tags {
    let mut tags = params.additional.clone();

    tags.insert(
        cluster_tag_key(&params.cluster_name),
        params.lifecycle.as_str(),
    );
    if let Some(role) = &params.role {
        tags.insert(ROLE_TAG_KEY, role.clone());
    }
    if let Some(name) = &params.name {
        tags.insert(NAME_TAG_KEY, name.clone());
    }

    tags
}
