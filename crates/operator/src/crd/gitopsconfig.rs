use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Identity and desired state of a GitOps-managed application. Only the
/// identity matters to Job completion reporting; the spec is reconciled
/// elsewhere.
#[derive(CustomResource, Debug, Serialize, Deserialize, Clone, JsonSchema)]
#[kube(
    group = "eunomia.kohls.io",
    version = "v1alpha1",
    kind = "GitOpsConfig",
    namespaced,
    status = "GitOpsConfigStatus"
)]
pub struct GitOpsConfigSpec {
    /// Repository holding the templates to render
    #[serde(rename = "templateSource")]
    pub template_source: GitConfig,

    /// Repository holding the parameters for the templates
    #[serde(rename = "parameterSource")]
    pub parameter_source: GitConfig,

    /// Events that trigger a new deployment run
    #[serde(default)]
    pub triggers: Vec<Trigger>,

    /// Service account the deployment Job runs as
    #[serde(rename = "serviceAccountRef")]
    pub service_account_ref: String,

    /// Image used to render and apply the templates
    #[serde(rename = "templateProcessorImage")]
    pub template_processor_image: String,

    #[serde(rename = "resourceHandlingMode", default = "default_handling_mode")]
    pub resource_handling_mode: String,

    #[serde(rename = "resourceDeletionMode", default = "default_deletion_mode")]
    pub resource_deletion_mode: String,
}

fn default_handling_mode() -> String {
    "Apply".to_string()
}

fn default_deletion_mode() -> String {
    "Delete".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct GitConfig {
    pub uri: String,

    #[serde(rename = "ref", default)]
    pub git_ref: String,

    #[serde(rename = "contextDir", default)]
    pub context_dir: String,

    #[serde(rename = "secretRef", skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct Trigger {
    /// Change, Webhook or Periodic
    #[serde(rename = "type")]
    pub trigger_type: String,

    /// Cron schedule for Periodic triggers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, JsonSchema)]
pub struct GitOpsConfigStatus {
    #[serde(default)]
    pub state: String,

    #[serde(rename = "startTime", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,

    #[serde(rename = "completionTime", skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
