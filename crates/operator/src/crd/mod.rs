pub mod gitopsconfig;

pub use gitopsconfig::{GitOpsConfig, GitOpsConfigSpec, GitOpsConfigStatus};
