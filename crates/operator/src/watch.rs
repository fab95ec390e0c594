//! Cluster-wide watch over Jobs.
//!
//! [`JobWatch::start`] subscribes to Job changes in every namespace and feeds
//! them, one at a time, to a [`JobEventHandler`]. Raw watch events only carry
//! the object's current state, so the watch keeps the last snapshot it saw
//! for each Job and pairs it with the next one to form a [`JobNotification`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use k8s_openapi::api::batch::v1::Job;
use kube::{
    api::{Api, ListParams},
    config::KubeConfigOptions,
    runtime::{reflector::ObjectRef, watcher, WatchStreamExt},
    Client, ResourceExt,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{config::KubeConfig, metrics, Error, Result};

/// A single change to a Job as seen by the watch.
#[derive(Debug, Clone)]
pub enum JobNotification {
    Added { new: Job },
    Updated { old: Job, new: Job },
    Deleted { old: Job },
}

impl JobNotification {
    /// Snapshot before the change. `None` for newly observed Jobs.
    pub fn prior(&self) -> Option<&Job> {
        match self {
            JobNotification::Added { .. } => None,
            JobNotification::Updated { old, .. } | JobNotification::Deleted { old } => Some(old),
        }
    }

    /// Snapshot after the change. `None` for deletions.
    pub fn current(&self) -> Option<&Job> {
        match self {
            JobNotification::Added { new } | JobNotification::Updated { new, .. } => Some(new),
            JobNotification::Deleted { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            JobNotification::Added { .. } => "Added",
            JobNotification::Updated { .. } => "Updated",
            JobNotification::Deleted { .. } => "Deleted",
        }
    }

    /// `namespace/name` of the Job this notification is about.
    pub fn name(&self) -> String {
        let job = match self {
            JobNotification::Added { new } | JobNotification::Updated { new, .. } => new,
            JobNotification::Deleted { old } => old,
        };
        format!("{}/{}", job.namespace().unwrap_or_default(), job.name_any())
    }
}

/// Receives Job notifications from a running watch.
///
/// The watch awaits each call before delivering the next notification.
#[async_trait]
pub trait JobEventHandler: Send + Sync + 'static {
    async fn handle(&self, notification: JobNotification);
}

/// Last observed state of every Job, used to pair old and new snapshots.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    jobs: HashMap<ObjectRef<Job>, Job>,
}

impl SnapshotCache {
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Turns one raw watch event into the notifications it implies.
    pub fn apply(&mut self, event: watcher::Event<Job>) -> Vec<JobNotification> {
        match event {
            watcher::Event::Applied(job) => vec![self.observe(job)],
            watcher::Event::Deleted(job) => {
                let old = self.jobs.remove(&ObjectRef::from_obj(&job)).unwrap_or(job);
                vec![JobNotification::Deleted { old }]
            }
            watcher::Event::Restarted(jobs) => {
                let mut previous = std::mem::take(&mut self.jobs);
                let mut notifications = Vec::with_capacity(jobs.len());
                for job in jobs {
                    let key = ObjectRef::from_obj(&job);
                    if let Some(old) = previous.remove(&key) {
                        self.jobs.insert(key, old);
                    }
                    notifications.push(self.observe(job));
                }
                // Jobs that vanished while the watch was disconnected
                notifications.extend(
                    previous
                        .into_values()
                        .map(|old| JobNotification::Deleted { old }),
                );
                notifications
            }
        }
    }

    fn observe(&mut self, job: Job) -> JobNotification {
        match self.jobs.insert(ObjectRef::from_obj(&job), job.clone()) {
            Some(old) => JobNotification::Updated { old, new: job },
            None => JobNotification::Added { new: job },
        }
    }
}

/// Establishes cluster-wide Job watches.
#[derive(Clone)]
pub struct JobWatch {
    client: Client,
}

impl JobWatch {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client from the given connection parameters.
    pub async fn connect(config: &KubeConfig) -> Result<Self> {
        let client = match &config.context {
            Some(context) => {
                let options = KubeConfigOptions {
                    context: Some(context.clone()),
                    ..Default::default()
                };
                let kube_config = kube::Config::from_kubeconfig(&options)
                    .await
                    .map_err(|e| Error::Kubernetes(format!("cannot load kubeconfig context {}: {}", context, e)))?;
                Client::try_from(kube_config)
                    .map_err(|e| Error::Kubernetes(format!("cannot create Job watcher client: {}", e)))?
            }
            None => Client::try_default()
                .await
                .map_err(|e| Error::Kubernetes(format!("cannot create Job watcher client: {}", e)))?,
        };
        Ok(Self::new(client))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Starts delivering notifications for Jobs in all namespaces.
    ///
    /// Fails only if the Job API cannot be reached at startup. Once running,
    /// connection errors are retried with backoff and never surface here.
    pub async fn start<H: JobEventHandler>(&self, handler: Arc<H>) -> Result<WatchHandle> {
        let jobs: Api<Job> = Api::all(self.client.clone());
        jobs.list(&ListParams::default().limit(1))
            .await
            .map_err(|e| Error::Watch(format!("cannot establish Job watch: {}", e)))?;

        info!("Starting cluster-wide Job watch");
        let stream = watcher(jobs, watcher::Config::default())
            .default_backoff()
            .boxed();
        Ok(WatchHandle::spawn(stream, handler))
    }
}

/// Stops a running watch. Dropping the handle aborts the watch task.
pub struct WatchHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl WatchHandle {
    pub fn spawn<S, H>(stream: S, handler: Arc<H>) -> Self
    where
        S: Stream<Item = std::result::Result<watcher::Event<Job>, watcher::Error>> + Unpin + Send + 'static,
        H: JobEventHandler,
    {
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(deliver(stream, handler, stop_rx));
        Self {
            stop_tx: Some(stop_tx),
            task: Some(task),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Stops delivery. A notification already being handled runs to completion.
    pub async fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Job watch task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn deliver<S, H>(mut stream: S, handler: Arc<H>, mut stop_rx: oneshot::Receiver<()>)
where
    S: Stream<Item = std::result::Result<watcher::Event<Job>, watcher::Error>> + Unpin,
    H: JobEventHandler,
{
    let mut cache = SnapshotCache::default();
    loop {
        tokio::select! {
            _ = &mut stop_rx => {
                info!("Job watch stopped");
                return;
            }
            next = stream.next() => match next {
                Some(Ok(event)) => {
                    for notification in cache.apply(event) {
                        debug!(job = %notification.name(), kind = notification.kind(), "Job notification");
                        handler.handle(notification).await;
                    }
                }
                Some(Err(e)) => {
                    metrics::WATCH_ERRORS_TOTAL.inc();
                    error!("Job watch error: {}", e);
                }
                None => {
                    warn!("Job watch stream ended");
                    return;
                }
            }
        }
    }
}
