pub mod config;
pub mod controllers;
pub mod completion;
pub mod crd;
pub mod events;
pub mod metrics;
pub mod owner;
pub mod server;
pub mod watch;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Kubernetes error: {0}")]
    Kubernetes(String),
    #[error("Watch error: {0}")]
    Watch(String),
    #[error("cannot load {kind} owner {name:?} of Job {job:?}: {reason}")]
    OwnerLookup {
        kind: String,
        name: String,
        job: String,
        reason: String,
    },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_lookup_error_names_object_and_job() {
        let err = Error::OwnerLookup {
            kind: "CronJob".to_string(),
            name: "nightly".to_string(),
            job: "build-43".to_string(),
            reason: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "cannot load CronJob owner \"nightly\" of Job \"build-43\": connection refused"
        );
    }
}
