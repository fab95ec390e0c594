use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Event, EventSource};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::{
    api::{Api, PostParams},
    Client, ResourceExt,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::{completion::Outcome, metrics, owner::LogicalOwner, Error, Result};

/// Annotation key carrying the completed Job's name.
pub const JOB_ANNOTATION: &str = "job";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Normal,
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Normal => "Normal",
            Severity::Warning => "Warning",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Reason {
    JobSuccessful,
    JobFailed,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::JobSuccessful => "JobSuccessful",
            Reason::JobFailed => "JobFailed",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A Job completion, attributed to the Job's logical owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEvent {
    pub involved_object: LogicalOwner,
    pub severity: Severity,
    pub reason: Reason,
    pub message: String,
    pub annotations: BTreeMap<String, String>,
}

impl CompletionEvent {
    pub fn new(owner: &LogicalOwner, job: &Job, outcome: Outcome) -> Self {
        let job_name = job.name_any();
        let (severity, reason, message) = match outcome {
            Outcome::Success => (
                Severity::Normal,
                Reason::JobSuccessful,
                format!("Job finished successfully: {}", job_name),
            ),
            Outcome::Failure => (
                Severity::Warning,
                Reason::JobFailed,
                format!("Job failed: {}", job_name),
            ),
        };
        Self {
            involved_object: owner.clone(),
            severity,
            reason,
            message,
            annotations: BTreeMap::from([(JOB_ANNOTATION.to_string(), job_name)]),
        }
    }
}

/// Publishes completion events somewhere observable.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn record(&self, event: &CompletionEvent) -> Result<()>;
}

/// Writes completion events to the cluster as core/v1 Events in the owner's
/// namespace.
#[derive(Clone)]
pub struct KubeEventRecorder {
    client: Client,
    reporter: String,
}

impl KubeEventRecorder {
    pub fn new(client: Client, reporter: impl Into<String>) -> Self {
        Self {
            client,
            reporter: reporter.into(),
        }
    }
}

/// Builds the cluster Event object for a completion.
pub fn to_kube_event(event: &CompletionEvent, reporter: &str, now: DateTime<Utc>) -> Event {
    let owner = &event.involved_object;
    Event {
        metadata: ObjectMeta {
            generate_name: Some(format!("{}.", owner.name)),
            namespace: Some(owner.namespace.clone()),
            annotations: Some(event.annotations.clone()),
            ..Default::default()
        },
        involved_object: owner.object_reference(),
        type_: Some(event.severity.as_str().to_string()),
        reason: Some(event.reason.as_str().to_string()),
        message: Some(event.message.clone()),
        count: Some(1),
        first_timestamp: Some(Time(now)),
        last_timestamp: Some(Time(now)),
        source: Some(EventSource {
            component: Some(reporter.to_string()),
            ..Default::default()
        }),
        reporting_component: Some(reporter.to_string()),
        ..Default::default()
    }
}

#[async_trait]
impl EventRecorder for KubeEventRecorder {
    async fn record(&self, event: &CompletionEvent) -> Result<()> {
        let api: Api<Event> = Api::namespaced(self.client.clone(), &event.involved_object.namespace);
        let kube_event = to_kube_event(event, &self.reporter, Utc::now());
        api.create(&PostParams::default(), &kube_event)
            .await
            .map_err(|e| Error::Kubernetes(e.to_string()))?;
        Ok(())
    }
}

/// Emits completion events on a best-effort basis: publish failures are
/// logged and counted, never retried or returned.
pub struct EventEmitter<R> {
    recorder: R,
}

impl<R: EventRecorder> EventEmitter<R> {
    pub fn new(recorder: R) -> Self {
        Self { recorder }
    }

    pub async fn emit(&self, owner: &LogicalOwner, job: &Job, outcome: Outcome) {
        let event = CompletionEvent::new(owner, job, outcome);
        match self.recorder.record(&event).await {
            Ok(()) => {
                metrics::COMPLETION_EVENTS_TOTAL
                    .with_label_values(&[event.reason.as_str()])
                    .inc();
                info!(
                    job = %job.name_any(),
                    "Emitted {} for {} {}/{}",
                    event.reason, owner.kind, owner.namespace, owner.name
                );
            }
            Err(e) => {
                metrics::EVENT_PUBLISH_FAILURES_TOTAL.inc();
                warn!(
                    job = %job.name_any(),
                    "Failed to publish {} for {} {}/{}: {}",
                    event.reason, owner.kind, owner.namespace, owner.name, e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::tests::job;
    use chrono::TimeZone;

    fn owner() -> LogicalOwner {
        LogicalOwner {
            kind: "GitOpsConfig".to_string(),
            api_version: "eunomia.kohls.io/v1alpha1".to_string(),
            name: "app-config".to_string(),
            namespace: "team-a".to_string(),
        }
    }

    #[test]
    fn success_event_contents() {
        let event = CompletionEvent::new(&owner(), &job("build-42", 0, 1, 0), Outcome::Success);
        assert_eq!(event.severity, Severity::Normal);
        assert_eq!(event.reason, Reason::JobSuccessful);
        assert_eq!(event.message, "Job finished successfully: build-42");
        assert_eq!(event.annotations.get("job").map(String::as_str), Some("build-42"));
        assert_eq!(event.annotations.len(), 1);
        assert_eq!(event.involved_object, owner());
    }

    #[test]
    fn failure_event_contents() {
        let event = CompletionEvent::new(&owner(), &job("build-43", 0, 0, 2), Outcome::Failure);
        assert_eq!(event.severity, Severity::Warning);
        assert_eq!(event.reason, Reason::JobFailed);
        assert_eq!(event.message, "Job failed: build-43");
    }

    #[test]
    fn kube_event_shape() {
        let event = CompletionEvent::new(&owner(), &job("build-42", 0, 1, 0), Outcome::Success);
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let kube_event = to_kube_event(&event, "gitops-operator", now);

        assert_eq!(kube_event.metadata.generate_name.as_deref(), Some("app-config."));
        assert_eq!(kube_event.metadata.namespace.as_deref(), Some("team-a"));
        assert_eq!(
            kube_event.metadata.annotations.as_ref().and_then(|a| a.get("job")).map(String::as_str),
            Some("build-42")
        );
        assert_eq!(kube_event.involved_object.kind.as_deref(), Some("GitOpsConfig"));
        assert_eq!(kube_event.involved_object.name.as_deref(), Some("app-config"));
        assert_eq!(kube_event.involved_object.namespace.as_deref(), Some("team-a"));
        assert_eq!(kube_event.type_.as_deref(), Some("Normal"));
        assert_eq!(kube_event.reason.as_deref(), Some("JobSuccessful"));
        assert_eq!(kube_event.count, Some(1));
        assert_eq!(kube_event.first_timestamp, Some(Time(now)));
        assert_eq!(
            kube_event.source.and_then(|s| s.component).as_deref(),
            Some("gitops-operator")
        );
    }

    #[tokio::test]
    async fn emitter_publishes_once() {
        let mut recorder = MockEventRecorder::new();
        recorder
            .expect_record()
            .withf(|event| event.reason == Reason::JobFailed && event.involved_object.name == "app-config")
            .times(1)
            .returning(|_| Ok(()));
        let emitter = EventEmitter::new(recorder);
        emitter.emit(&owner(), &job("build-43", 0, 0, 2), Outcome::Failure).await;
    }

    #[tokio::test]
    async fn emitter_swallows_publish_failures() {
        let mut recorder = MockEventRecorder::new();
        recorder
            .expect_record()
            .times(1)
            .returning(|_| Err(Error::Kubernetes("events is forbidden".to_string())));
        let emitter = EventEmitter::new(recorder);
        let before = metrics::EVENT_PUBLISH_FAILURES_TOTAL.get();
        emitter.emit(&owner(), &job("build-42", 0, 1, 0), Outcome::Success).await;
        assert!(metrics::EVENT_PUBLISH_FAILURES_TOTAL.get() > before);
    }
}
