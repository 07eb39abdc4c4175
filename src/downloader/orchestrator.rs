// Orchestrator - bounded worker pool over a FIFO job queue
//
// Workers pop one job at a time and run it end-to-end through the engine
// adapter. The queue lock is held only for the pop. Every submitted job
// reaches exactly one terminal state and one `on_job_done` call, including
// jobs drained after cancellation or an engine-missing abort.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::adapter::EngineAdapter;
use super::errors::EngineError;
use super::models::{FailureKind, JobDescriptor, JobId, JobResult, JobState, RunSummary};
use super::traits::{ProgressReporter, ProgressSink};

pub const DEFAULT_CONCURRENCY: usize = 3;
pub const MAX_CONCURRENCY: usize = 10;

/// Clamp a requested worker count to 1..=MAX_CONCURRENCY
pub fn clamp_concurrency(requested: usize) -> usize {
    requested.clamp(1, MAX_CONCURRENCY)
}

/// Caller-side view of a running batch: cancellation and state queries
#[derive(Clone, Default)]
pub struct BatchHandle {
    inner: Arc<BatchShared>,
}

#[derive(Default)]
struct BatchShared {
    cancel: CancellationToken,
    states: Mutex<HashMap<JobId, JobState>>,
    order: Mutex<Vec<JobId>>,
}

impl BatchHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop dispatching queued jobs and ask running ones to stop
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    pub fn token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    pub fn state(&self, id: JobId) -> Option<JobState> {
        lock(&self.inner.states).get(&id).copied()
    }

    /// States in submission order
    pub fn snapshot(&self) -> Vec<(JobId, JobState)> {
        let order = lock(&self.inner.order).clone();
        let states = lock(&self.inner.states);
        order
            .into_iter()
            .filter_map(|id| states.get(&id).map(|s| (id, *s)))
            .collect()
    }

    pub fn count(&self, state: JobState) -> usize {
        lock(&self.inner.states)
            .values()
            .filter(|s| **s == state)
            .count()
    }

    fn register(&self, jobs: &[JobDescriptor]) {
        let mut states = lock(&self.inner.states);
        let mut order = lock(&self.inner.order);
        for job in jobs {
            states.insert(job.id(), JobState::Queued);
            order.push(job.id());
        }
    }

    fn set_state(&self, id: JobId, state: JobState) {
        lock(&self.inner.states).insert(id, state);
    }
}

pub struct Orchestrator {
    adapter: EngineAdapter,
}

/// State shared by the workers of one batch
struct Batch {
    queue: Mutex<VecDeque<(usize, JobDescriptor)>>,
    results: Mutex<Vec<(usize, JobResult)>>,
    completed: AtomicUsize,
    aborted: AtomicBool,
    abort_reason: Mutex<Option<String>>,
}

impl Orchestrator {
    pub fn new(adapter: EngineAdapter) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &EngineAdapter {
        &self.adapter
    }

    /// Run a batch to completion. Returns once every worker has quiesced.
    pub async fn run_batch(
        &self,
        descriptors: Vec<JobDescriptor>,
        concurrency: usize,
        sink: Arc<dyn ProgressSink>,
        handle: &BatchHandle,
    ) -> RunSummary {
        let started = Instant::now();
        let total = descriptors.len();

        if total == 0 {
            return RunSummary::from_results(std::iter::empty(), None, started.elapsed());
        }

        let workers = clamp_concurrency(concurrency).min(total);
        if workers != concurrency.min(total) {
            debug!(requested = concurrency, workers, "Concurrency clamped");
        }
        info!(
            jobs = total,
            workers,
            engine = self.adapter.engine().name(),
            "Starting batch"
        );

        handle.register(&descriptors);

        let batch = Arc::new(Batch {
            queue: Mutex::new(descriptors.into_iter().enumerate().collect()),
            results: Mutex::new(Vec::with_capacity(total)),
            completed: AtomicUsize::new(0),
            aborted: AtomicBool::new(false),
            abort_reason: Mutex::new(None),
        });

        let mut set = JoinSet::new();
        for worker_id in 0..workers {
            let batch = batch.clone();
            let adapter = self.adapter.clone();
            let sink = sink.clone();
            let handle = handle.clone();
            set.spawn(async move {
                worker(worker_id, batch, adapter, sink, handle).await;
            });
        }

        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Worker task ended abnormally");
            }
        }

        // Only reachable if every worker died; keeps the exactly-once guarantee
        loop {
            let Some((index, job)) = lock(&batch.queue).pop_front() else {
                break;
            };
            finish(&batch, &sink, handle, index, JobResult::cancelled(&job, 0));
        }

        let mut results = std::mem::take(&mut *lock(&batch.results));
        results.sort_by_key(|(index, _)| *index);

        let aborted = lock(&batch.abort_reason).clone();
        let summary = RunSummary::from_results(
            results.iter().map(|(_, r)| r),
            aborted,
            started.elapsed(),
        );

        debug_assert_eq!(batch.completed.load(Ordering::SeqCst), total);
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "Batch finished"
        );
        summary
    }
}

async fn worker(
    worker_id: usize,
    batch: Arc<Batch>,
    adapter: EngineAdapter,
    sink: Arc<dyn ProgressSink>,
    handle: BatchHandle,
) {
    let cancel = handle.token();

    loop {
        let Some((index, job)) = lock(&batch.queue).pop_front() else {
            break;
        };

        if cancel.is_cancelled() || batch.aborted.load(Ordering::SeqCst) {
            finish(&batch, &sink, &handle, index, JobResult::cancelled(&job, 0));
            continue;
        }

        debug!(
            worker = worker_id,
            job_id = %job.id().short(),
            platform = %job.platform().platform,
            "Job started"
        );
        handle.set_state(job.id(), JobState::Running);

        let result = run_isolated(&adapter, job, sink.clone(), cancel.clone()).await;

        if is_engine_missing(&result) && !batch.aborted.swap(true, Ordering::SeqCst) {
            let reason = result
                .error
                .as_ref()
                .map(|f| f.reason.clone())
                .unwrap_or_else(|| "engine missing".to_string());
            error!(
                reason = %reason,
                "Extraction engine is unavailable; cancelling remaining jobs"
            );
            *lock(&batch.abort_reason) = Some(reason);
        }

        finish(&batch, &sink, &handle, index, result);
    }
}

/// Runs the job on its own task so a panic inside the engine becomes a
/// failed result for that job only
async fn run_isolated(
    adapter: &EngineAdapter,
    job: JobDescriptor,
    sink: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
) -> JobResult {
    let adapter = adapter.clone();
    let task_job = job.clone();
    let task = tokio::spawn(async move {
        let reporter = ProgressReporter::new(task_job.id(), sink);
        adapter.run(&task_job, &reporter, &cancel).await
    });

    match task.await {
        Ok(result) => result,
        Err(e) => {
            warn!(job_id = %job.id().short(), error = %e, "Job task panicked");
            JobResult::from_error(
                &job,
                &EngineError::Permanent(format!("job task failed: {}", e)),
                1,
            )
        }
    }
}

fn finish(
    batch: &Batch,
    sink: &Arc<dyn ProgressSink>,
    handle: &BatchHandle,
    index: usize,
    result: JobResult,
) {
    handle.set_state(result.job_id, result.state);
    info!(job_id = %result.job_id.short(), "{}", result.status_line());
    sink.on_job_done(&result);
    batch.completed.fetch_add(1, Ordering::SeqCst);
    lock(&batch.results).push((index, result));
}

fn is_engine_missing(result: &JobResult) -> bool {
    result
        .error
        .as_ref()
        .map(|f| f.kind == FailureKind::EngineMissing)
        .unwrap_or(false)
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::downloader::models::{
        AudioFormat, AudioQuality, CollectionListing, MediaTarget, MetadataFlags, ProgressEvent,
    };
    use crate::downloader::platform::classify;
    use crate::downloader::traits::{Engine, NullSink};

    #[derive(Default)]
    struct CountingEngine {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
        delay_ms: u64,
    }

    #[async_trait]
    impl Engine for CountingEngine {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn invoke(
            &self,
            job: &JobDescriptor,
            progress: &ProgressReporter,
            cancel: &CancellationToken,
        ) -> Result<PathBuf, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            progress.fetching(10.0, None, None);
            let outcome = tokio::select! {
                _ = cancel.cancelled() => Err(EngineError::Cancelled),
                _ = tokio::time::sleep(Duration::from_millis(self.delay_ms)) => {
                    progress.fetching(90.0, None, None);
                    Ok(PathBuf::from(format!("/tmp/{}.mp3", job.id().short())))
                }
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            outcome
        }

        async fn list_collection(
            &self,
            _url: &str,
            _limit: usize,
        ) -> Result<CollectionListing, EngineError> {
            Ok(CollectionListing::default())
        }
    }

    #[derive(Default)]
    struct DoneCounter(Mutex<Vec<JobId>>);

    impl ProgressSink for DoneCounter {
        fn on_progress(&self, _event: &ProgressEvent) {}

        fn on_job_done(&self, result: &JobResult) {
            self.0.lock().unwrap().push(result.job_id);
        }
    }

    fn jobs(n: usize) -> Vec<JobDescriptor> {
        (0..n)
            .map(|i| {
                let url = format!("https://youtu.be/video{}", i);
                JobDescriptor::new(
                    url.clone(),
                    classify(&url),
                    MediaTarget::Audio {
                        format: AudioFormat::Mp3,
                        quality: AudioQuality::Kbps320,
                    },
                    PathBuf::from("/tmp"),
                    false,
                    MetadataFlags::default(),
                    None,
                )
            })
            .collect()
    }

    fn orchestrator(engine: Arc<CountingEngine>) -> Orchestrator {
        Orchestrator::new(EngineAdapter::new(engine))
    }

    #[test]
    fn concurrency_is_clamped() {
        assert_eq!(clamp_concurrency(0), 1);
        assert_eq!(clamp_concurrency(4), 4);
        assert_eq!(clamp_concurrency(64), MAX_CONCURRENCY);
    }

    #[tokio::test]
    async fn empty_batch_returns_empty_summary() {
        let engine = Arc::new(CountingEngine::default());
        let summary = orchestrator(engine.clone())
            .run_batch(Vec::new(), 3, Arc::new(NullSink), &BatchHandle::new())
            .await;
        assert_eq!(summary.total, 0);
        assert!(summary.is_clean());
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn never_exceeds_concurrency() {
        let engine = Arc::new(CountingEngine {
            delay_ms: 20,
            ..Default::default()
        });
        let sink = Arc::new(DoneCounter::default());
        let batch = jobs(7);
        let ids: Vec<JobId> = batch.iter().map(|j| j.id()).collect();
        let handle = BatchHandle::new();

        let summary = orchestrator(engine.clone())
            .run_batch(batch, 2, sink.clone(), &handle)
            .await;

        assert_eq!(summary.succeeded, 7);
        assert!(engine.peak.load(Ordering::SeqCst) <= 2);

        let mut done = sink.0.lock().unwrap().clone();
        done.sort_by_key(|id| ids.iter().position(|x| x == id));
        assert_eq!(done, ids);
        assert_eq!(handle.count(JobState::Succeeded), 7);
        assert_eq!(
            handle.snapshot().iter().map(|(id, _)| *id).collect::<Vec<_>>(),
            ids
        );
    }

    #[tokio::test]
    async fn cancel_before_start_marks_everything_cancelled() {
        let engine = Arc::new(CountingEngine::default());
        let sink = Arc::new(DoneCounter::default());
        let handle = BatchHandle::new();
        handle.cancel();

        let summary = orchestrator(engine.clone())
            .run_batch(jobs(4), 2, sink.clone(), &handle)
            .await;

        assert_eq!(summary.cancelled, 4);
        assert_eq!(sink.0.lock().unwrap().len(), 4);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancel_mid_batch_stops_in_flight_and_queued() {
        let engine = Arc::new(CountingEngine {
            delay_ms: 10_000,
            ..Default::default()
        });
        let sink = Arc::new(DoneCounter::default());
        let handle = BatchHandle::new();

        let canceller = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let summary = orchestrator(engine.clone())
            .run_batch(jobs(5), 2, sink.clone(), &handle)
            .await;

        assert_eq!(summary.total, 5);
        assert_eq!(summary.cancelled, 5);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
        assert_eq!(sink.0.lock().unwrap().len(), 5);
    }
}
