//! Job completion detection.
//!
//! Each watch notification is classified on its own: the prior and new Job
//! snapshots it carries are the only inputs, so nothing is remembered between
//! notifications.

use std::fmt;

use k8s_openapi::api::batch::v1::Job;
use tracing::debug;

use crate::watch::JobNotification;

/// Pod counters copied out of a Job's status. Absent values read as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounts {
    pub active: i32,
    pub succeeded: i32,
    pub failed: i32,
}

impl JobCounts {
    pub fn of(job: &Job) -> Self {
        let status = job.status.as_ref();
        Self {
            active: status.and_then(|s| s.active).unwrap_or(0),
            succeeded: status.and_then(|s| s.succeeded).unwrap_or(0),
            failed: status.and_then(|s| s.failed).unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    /// At least one pod is still running.
    Active,
    /// No pods running and at least one completion recorded.
    Succeeded { completions: i32 },
    /// No pods running, no completions, at least one failure.
    Failed,
    /// No pods running and no outcome observed yet.
    Indeterminate,
}

impl JobPhase {
    pub fn from_counts(counts: JobCounts) -> Self {
        match counts {
            JobCounts { active, .. } if active > 0 => JobPhase::Active,
            JobCounts { succeeded, .. } if succeeded >= 1 => JobPhase::Succeeded {
                completions: succeeded,
            },
            JobCounts { failed, .. } if failed > 0 => JobPhase::Failed,
            _ => JobPhase::Indeterminate,
        }
    }

    pub fn of(job: &Job) -> Self {
        Self::from_counts(JobCounts::of(job))
    }

    /// True once the Job has stopped running and recorded some outcome.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobPhase::Succeeded { .. } | JobPhase::Failed)
    }

    /// The outcome worth reporting for this phase, if any.
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            JobPhase::Succeeded { completions: 1 } => Some(Outcome::Success),
            // Multi-completion Jobs are left unreported.
            JobPhase::Succeeded { .. } => None,
            JobPhase::Failed => Some(Outcome::Failure),
            JobPhase::Active | JobPhase::Indeterminate => None,
        }
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobPhase::Active => write!(f, "Active"),
            JobPhase::Succeeded { completions } => write!(f, "Succeeded({})", completions),
            JobPhase::Failed => write!(f, "Failed"),
            JobPhase::Indeterminate => write!(f, "Indeterminate"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "Success"),
            Outcome::Failure => write!(f, "Failure"),
        }
    }
}

/// Decides whether a notification carries a fresh terminal transition.
///
/// Returns the new Job snapshot together with its outcome when an event
/// should be emitted:
///  - deletions never report,
///  - Jobs with running pods never report,
///  - a prior snapshot that was already terminal means the completion was
///    seen before,
///  - otherwise the new snapshot's phase decides.
///
/// Added notifications have no prior snapshot, so an already-finished Job
/// observed for the first time is still reported.
pub fn detect(notification: &JobNotification) -> Option<(&Job, Outcome)> {
    let new = notification.current()?;
    let phase = JobPhase::of(new);
    if phase == JobPhase::Active {
        return None;
    }
    if let Some(old) = notification.prior() {
        if JobPhase::of(old).is_terminal() {
            debug!(job = %notification.name(), "Job completion already observed");
            return None;
        }
    }
    match phase.outcome() {
        Some(outcome) => Some((new, outcome)),
        None => {
            debug!(job = %notification.name(), %phase, "terminal Job phase not reported");
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use k8s_openapi::api::batch::v1::JobStatus;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    pub(crate) fn job(name: &str, active: i32, succeeded: i32, failed: i32) -> Job {
        Job {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("team-a".to_string()),
                ..Default::default()
            },
            status: Some(JobStatus {
                active: Some(active),
                succeeded: Some(succeeded),
                failed: Some(failed),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn updated(old: Job, new: Job) -> JobNotification {
        JobNotification::Updated { old, new }
    }

    #[test]
    fn phase_from_counts() {
        let phase = |a, s, f| JobPhase::from_counts(JobCounts { active: a, succeeded: s, failed: f });
        assert_eq!(phase(1, 0, 0), JobPhase::Active);
        assert_eq!(phase(2, 1, 3), JobPhase::Active);
        assert_eq!(phase(0, 1, 0), JobPhase::Succeeded { completions: 1 });
        assert_eq!(phase(0, 1, 4), JobPhase::Succeeded { completions: 1 });
        assert_eq!(phase(0, 0, 2), JobPhase::Failed);
        assert_eq!(phase(0, 0, 0), JobPhase::Indeterminate);
    }

    #[test]
    fn missing_status_is_indeterminate() {
        let job = Job::default();
        assert_eq!(JobCounts::of(&job), JobCounts::default());
        assert_eq!(JobPhase::of(&job), JobPhase::Indeterminate);
    }

    #[test]
    fn success_transition_is_detected() {
        let n = updated(job("build-42", 1, 0, 0), job("build-42", 0, 1, 0));
        let (new, outcome) = detect(&n).expect("completion");
        assert_eq!(outcome, Outcome::Success);
        assert_eq!(new.metadata.name.as_deref(), Some("build-42"));
    }

    #[test]
    fn failure_transition_is_detected() {
        let n = updated(job("build-43", 1, 0, 1), job("build-43", 0, 0, 2));
        assert_eq!(detect(&n).map(|(_, o)| o), Some(Outcome::Failure));
    }

    #[test]
    fn success_after_retries_counts_as_success() {
        let n = updated(job("flaky", 1, 0, 2), job("flaky", 0, 1, 2));
        assert_eq!(detect(&n).map(|(_, o)| o), Some(Outcome::Success));
    }

    #[test]
    fn still_active_is_ignored() {
        let n = updated(job("j", 1, 0, 0), job("j", 1, 0, 1));
        assert!(detect(&n).is_none());
    }

    #[test]
    fn redelivered_terminal_job_is_ignored() {
        let done = job("j", 0, 1, 0);
        assert!(detect(&updated(done.clone(), done)).is_none());

        let failed = job("j", 0, 0, 3);
        assert!(detect(&updated(failed.clone(), failed)).is_none());
    }

    #[test]
    fn deletion_is_ignored() {
        for old in [job("j", 1, 0, 0), job("j", 0, 1, 0), job("j", 0, 0, 0)] {
            assert!(detect(&JobNotification::Deleted { old }).is_none());
        }
    }

    #[test]
    fn added_terminal_job_is_reported() {
        let n = JobNotification::Added { new: job("j", 0, 0, 1) };
        assert_eq!(detect(&n).map(|(_, o)| o), Some(Outcome::Failure));
    }

    #[test]
    fn multiple_completions_are_not_reported() {
        let n = updated(job("parallel", 2, 1, 0), job("parallel", 0, 3, 0));
        assert!(detect(&n).is_none());
    }

    #[test]
    fn indeterminate_job_is_not_reported() {
        let n = updated(job("j", 1, 0, 0), job("j", 0, 0, 0));
        assert!(detect(&n).is_none());
    }
}
