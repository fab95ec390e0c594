//! Resolves which GitOpsConfig a Job belongs to.
//!
//! Owner references are walked breadth-first starting from the Job. Each
//! level is searched for the target kind before any intermediary object is
//! fetched, so directly owned Jobs never touch the API server. Intermediaries
//! are fetched one at a time and the walk stops at the first one owned by the
//! target kind. References
//! carry no namespace; every object on the walk is looked up in the Job's
//! namespace.

use std::collections::HashSet;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{
    api::{Api, ApiResource, DynamicObject},
    core::GroupVersion,
    Client, Resource, ResourceExt,
};
use serde::Serialize;
use tracing::debug;

use crate::{crd::GitOpsConfig, Error, Result};

pub const CRON_JOB_KIND: &str = "CronJob";

/// Which kinds the walk stops at and which it may pass through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipPolicy {
    pub target_kind: String,
    pub intermediary_kinds: Vec<String>,
    /// Number of intermediary objects that may be fetched along one chain.
    pub max_hops: usize,
}

impl OwnershipPolicy {
    fn is_intermediary(&self, kind: &str) -> bool {
        self.intermediary_kinds.iter().any(|k| k == kind)
    }
}

impl Default for OwnershipPolicy {
    fn default() -> Self {
        Self {
            target_kind: GitOpsConfig::kind(&()).into_owned(),
            intermediary_kinds: vec![CRON_JOB_KIND.to_string()],
            max_hops: 1,
        }
    }
}

/// The object a Job's completion is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicalOwner {
    pub kind: String,
    pub api_version: String,
    pub name: String,
    pub namespace: String,
}

impl LogicalOwner {
    /// The namespace always comes from the owned object, never the reference.
    pub fn from_reference(reference: &OwnerReference, namespace: &str) -> Self {
        Self {
            kind: reference.kind.clone(),
            api_version: reference.api_version.clone(),
            name: reference.name.clone(),
            namespace: namespace.to_string(),
        }
    }

    pub fn object_reference(&self) -> ObjectReference {
        ObjectReference {
            kind: Some(self.kind.clone()),
            api_version: Some(self.api_version.clone()),
            name: Some(self.name.clone()),
            namespace: Some(self.namespace.clone()),
            ..Default::default()
        }
    }
}

/// Returns the first direct owner of the given kind. When several match the
/// choice follows the order the API server returned them in.
pub fn find_owner<'a>(references: &'a [OwnerReference], kind: &str) -> Option<&'a OwnerReference> {
    references.iter().find(|r| r.kind == kind)
}

/// Read access to the owner references of intermediary objects.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OwnerLookup: Send + Sync {
    /// Fetches the object named by `reference` in `namespace` and returns its
    /// owner references.
    async fn owner_references(
        &self,
        namespace: &str,
        reference: &OwnerReference,
    ) -> Result<Vec<OwnerReference>>;
}

/// Looks intermediary objects up through the cluster API.
#[derive(Clone)]
pub struct KubeOwnerLookup {
    client: Client,
}

impl KubeOwnerLookup {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OwnerLookup for KubeOwnerLookup {
    async fn owner_references(
        &self,
        namespace: &str,
        reference: &OwnerReference,
    ) -> Result<Vec<OwnerReference>> {
        let metadata = if reference.kind == CRON_JOB_KIND {
            let api: Api<CronJob> = Api::namespaced(self.client.clone(), namespace);
            api.get(&reference.name)
                .await
                .map_err(|e| Error::Kubernetes(e.to_string()))?
                .metadata
        } else {
            let resource = dynamic_resource(reference)?;
            let api: Api<DynamicObject> =
                Api::namespaced_with(self.client.clone(), namespace, &resource);
            api.get(&reference.name)
                .await
                .map_err(|e| Error::Kubernetes(e.to_string()))?
                .metadata
        };
        Ok(metadata.owner_references.unwrap_or_default())
    }
}

/// API resource for an intermediary kind without a typed client.
///
/// The plural is guessed from the kind (`Deployment` → `deployments`) rather
/// than discovered, so kinds with irregular plurals are not reachable this way.
pub fn dynamic_resource(reference: &OwnerReference) -> Result<ApiResource> {
    let gv: GroupVersion = reference
        .api_version
        .parse()
        .map_err(|e| Error::Kubernetes(format!("invalid apiVersion {:?}: {}", reference.api_version, e)))?;
    Ok(ApiResource::from_gvk(&gv.with_kind(&reference.kind)))
}

pub struct OwnerResolver<L> {
    lookup: L,
    policy: OwnershipPolicy,
}

impl<L: OwnerLookup> OwnerResolver<L> {
    pub fn new(lookup: L) -> Self {
        Self::with_policy(lookup, OwnershipPolicy::default())
    }

    pub fn with_policy(lookup: L, policy: OwnershipPolicy) -> Self {
        Self { lookup, policy }
    }

    pub fn policy(&self) -> &OwnershipPolicy {
        &self.policy
    }

    /// Finds the Job's logical owner.
    ///
    /// `Ok(None)` means the Job is not owned by the target kind within the
    /// allowed number of hops. A failed intermediary fetch is an error, not
    /// an absent owner.
    pub async fn resolve(&self, job: &Job) -> Result<Option<LogicalOwner>> {
        let namespace = job.namespace().unwrap_or_default();
        let job_name = job.name_any();

        let mut visited: HashSet<(String, String)> = HashSet::new();
        visited.insert(("Job".to_string(), job_name.clone()));

        let mut level: Vec<OwnerReference> = job.owner_references().to_vec();
        let mut hops = 0;
        loop {
            if let Some(owner) = find_owner(&level, &self.policy.target_kind) {
                return Ok(Some(LogicalOwner::from_reference(owner, &namespace)));
            }
            if hops >= self.policy.max_hops {
                return Ok(None);
            }

            let intermediaries: Vec<&OwnerReference> = level
                .iter()
                .filter(|r| self.policy.is_intermediary(&r.kind))
                .filter(|r| visited.insert((r.kind.clone(), r.name.clone())))
                .collect();
            if intermediaries.is_empty() {
                return Ok(None);
            }

            // Each fetched owner list is searched before the next fetch, so a
            // later intermediary is only touched when earlier ones led nowhere.
            let mut next = Vec::new();
            for reference in intermediaries {
                debug!(
                    job = %job_name,
                    "looking up {} {}/{}", reference.kind, namespace, reference.name
                );
                let owners = self
                    .lookup
                    .owner_references(&namespace, reference)
                    .await
                    .map_err(|e| Error::OwnerLookup {
                        kind: reference.kind.clone(),
                        name: reference.name.clone(),
                        job: job_name.clone(),
                        reason: e.to_string(),
                    })?;
                if let Some(owner) = find_owner(&owners, &self.policy.target_kind) {
                    return Ok(Some(LogicalOwner::from_reference(owner, &namespace)));
                }
                next.extend(owners);
            }
            level = next;
            hops += 1;
        }
    }
}
