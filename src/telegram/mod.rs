//! Telegram integration: the application shell and its teloxide runtime

pub mod application;
pub mod jobs;
pub mod render;
pub mod runtime;
pub mod session;

pub use application::{Application, ApplicationBuilder, Dispatch, ErrorHandler, LogErrorHandler};
pub use jobs::{spawn_jobs, Job, JobContext};
pub use session::{ConversationStore, InMemoryStore, JsonFileStore};
