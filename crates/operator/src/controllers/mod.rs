pub mod job_completion;

pub use job_completion::{JobCompletionController, KubeJobCompletionController};
