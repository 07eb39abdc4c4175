// Engine and progress sink trait definitions

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::errors::EngineError;
use super::models::{CollectionListing, JobDescriptor, JobId, JobResult, Phase, ProgressEvent};

/// External extraction engine. One `invoke` is one engine call for one job.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Name of the engine (for logging)
    fn name(&self) -> &'static str;

    /// Fetch and convert a single job, returning the output file path.
    /// Implementations should stop promptly once `cancel` fires.
    async fn invoke(
        &self,
        job: &JobDescriptor,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, EngineError>;

    /// Metadata-only listing of a collection URL, at most `limit` members
    async fn list_collection(
        &self,
        url: &str,
        limit: usize,
    ) -> Result<CollectionListing, EngineError>;
}

/// Consumer of progress and completion events (usually a UI).
/// Called from worker tasks; implementations own their thread-safety.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);

    fn on_job_done(&self, result: &JobResult);
}

/// Sink that drops everything
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_progress(&self, _event: &ProgressEvent) {}

    fn on_job_done(&self, _result: &JobResult) {}
}

/// Event forwarded by [`ChannelSink`]
#[derive(Debug, Clone)]
pub enum SinkEvent {
    Progress(ProgressEvent),
    JobDone(JobResult),
}

/// Marshals events onto a channel so a single consumer can handle them on
/// its own task. Per-job order is kept because each job reports from one
/// worker at a time.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn on_progress(&self, event: &ProgressEvent) {
        let _ = self.tx.send(SinkEvent::Progress(event.clone()));
    }

    fn on_job_done(&self, result: &JobResult) {
        let _ = self.tx.send(SinkEvent::JobDone(result.clone()));
    }
}

/// Per-job progress helper handed to the engine.
/// Keeps the reported percentage non-decreasing for the job.
pub struct ProgressReporter {
    job_id: JobId,
    sink: Arc<dyn ProgressSink>,
    last_percent: Mutex<f32>,
}

impl ProgressReporter {
    pub fn new(job_id: JobId, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            job_id,
            sink,
            last_percent: Mutex::new(0.0),
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn emit(
        &self,
        percent: f32,
        downloaded_bytes: Option<u64>,
        phase: Phase,
        message: Option<String>,
    ) {
        let percent = {
            let mut last = self
                .last_percent
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let requested = if percent.is_finite() {
                percent.clamp(0.0, 100.0)
            } else {
                *last
            };
            *last = last.max(requested);
            *last
        };

        self.sink.on_progress(&ProgressEvent {
            job_id: self.job_id,
            percent,
            downloaded_bytes,
            phase,
            message,
        });
    }

    pub fn fetching(&self, percent: f32, downloaded_bytes: Option<u64>, message: Option<String>) {
        self.emit(percent, downloaded_bytes, Phase::Fetching, message);
    }

    /// Conversion happens after the fetch, so the current percentage is kept
    pub fn converting(&self, message: impl Into<String>) {
        let current = self.current();
        self.emit(current, None, Phase::Converting, Some(message.into()));
    }

    /// Status note without moving the percentage
    pub fn note(&self, phase: Phase, message: impl Into<String>) {
        let current = self.current();
        self.emit(current, None, phase, Some(message.into()));
    }

    pub fn done(&self) {
        self.emit(100.0, None, Phase::Done, None);
    }

    pub fn current(&self) -> f32 {
        *self
            .last_percent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ProgressEvent>>);

    impl ProgressSink for Recorder {
        fn on_progress(&self, event: &ProgressEvent) {
            self.0.lock().unwrap().push(event.clone());
        }

        fn on_job_done(&self, _result: &JobResult) {}
    }

    #[test]
    fn reporter_never_goes_backwards() {
        let recorder = Arc::new(Recorder::default());
        let reporter = ProgressReporter::new(JobId::new(), recorder.clone());

        reporter.fetching(40.0, None, None);
        // second stream (audio) restarts at 0
        reporter.fetching(5.0, None, None);
        reporter.fetching(70.0, None, None);
        reporter.fetching(f32::NAN, None, None);
        reporter.converting("Merging");
        reporter.fetching(250.0, None, None);
        reporter.done();

        let percents: Vec<f32> = recorder.0.lock().unwrap().iter().map(|e| e.percent).collect();
        assert_eq!(percents, vec![40.0, 40.0, 70.0, 70.0, 70.0, 100.0, 100.0]);
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn channel_sink_forwards_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        let sink: Arc<dyn ProgressSink> = Arc::new(sink);
        let reporter = ProgressReporter::new(JobId::new(), sink.clone());

        reporter.fetching(10.0, None, None);
        reporter.fetching(20.0, None, None);
        reporter.done();
        drop(reporter);
        drop(sink);

        let mut seen = Vec::new();
        while let Some(SinkEvent::Progress(event)) = rx.recv().await {
            seen.push(event.percent);
        }
        assert_eq!(seen, vec![10.0, 20.0, 100.0]);
    }
}
