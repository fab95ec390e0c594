use async_trait::async_trait;
use kube::Client;
use tracing::{debug, error};

use crate::{
    completion,
    events::{EventEmitter, EventRecorder, KubeEventRecorder},
    metrics,
    owner::{KubeOwnerLookup, OwnerLookup, OwnerResolver},
    watch::{JobEventHandler, JobNotification},
    Result,
};

/// Turns Job watch notifications into completion events attributed to the
/// owning GitOpsConfig.
pub struct JobCompletionController<L, R> {
    resolver: OwnerResolver<L>,
    emitter: EventEmitter<R>,
}

pub type KubeJobCompletionController = JobCompletionController<KubeOwnerLookup, KubeEventRecorder>;

impl KubeJobCompletionController {
    pub fn for_cluster(client: Client, reporter: &str) -> Self {
        Self::new(
            OwnerResolver::new(KubeOwnerLookup::new(client.clone())),
            EventEmitter::new(KubeEventRecorder::new(client, reporter)),
        )
    }
}

impl<L: OwnerLookup, R: EventRecorder> JobCompletionController<L, R> {
    pub fn new(resolver: OwnerResolver<L>, emitter: EventEmitter<R>) -> Self {
        Self { resolver, emitter }
    }

    /// Runs one notification through detection, owner resolution and
    /// emission. Only owner lookup failures are returned.
    pub async fn process(&self, notification: &JobNotification) -> Result<()> {
        let Some((job, outcome)) = completion::detect(notification) else {
            return Ok(());
        };

        let Some(owner) = self.resolver.resolve(job).await? else {
            debug!(
                job = %notification.name(),
                "Job is not owned by a {}, ignoring", self.resolver.policy().target_kind
            );
            return Ok(());
        };

        self.emitter.emit(&owner, job, outcome).await;
        Ok(())
    }
}

#[async_trait]
impl<L, R> JobEventHandler for JobCompletionController<L, R>
where
    L: OwnerLookup + 'static,
    R: EventRecorder + 'static,
{
    async fn handle(&self, notification: JobNotification) {
        metrics::JOB_NOTIFICATIONS_TOTAL
            .with_label_values(&[notification.kind()])
            .inc();
        if let Err(e) = self.process(&notification).await {
            metrics::OWNER_LOOKUP_FAILURES_TOTAL.inc();
            error!(job = %notification.name(), "cannot find Job's owner: {}", e);
        }
    }
}
