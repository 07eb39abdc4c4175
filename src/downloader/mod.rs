// Downloader module - job building, engine adaptation and batch orchestration

pub mod adapter;
pub mod builder;
pub mod errors;
pub mod extractors;
pub mod format_selector;
pub mod models;
pub mod orchestrator;
pub mod platform;
pub mod progress;
pub mod retry;
pub mod tools;
pub mod traits;
pub mod utils;

pub use adapter::EngineAdapter;
pub use builder::{build, JobBuilder};
pub use errors::{BuildError, EngineError};
pub use models::{
    CollectionEntry, CollectionListing, FailureKind, JobDescriptor, JobFailure, JobId,
    JobOptions, JobResult, JobState, MediaKind, Phase, ProgressEvent, RunSummary,
};
pub use orchestrator::{BatchHandle, Orchestrator};
pub use platform::{classify, Platform, PlatformVerdict};
pub use retry::RetryPolicy;
pub use traits::{ChannelSink, Engine, NullSink, ProgressReporter, ProgressSink, SinkEvent};
