// EngineAdapter - one job through the engine with timeout and retry
//
// Every engine call runs under a hard timeout. Dropping the timed-out call
// drops the engine's child handle, which kills the process.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::errors::EngineError;
use super::models::{JobDescriptor, JobResult};
use super::retry::{RetryDecision, RetryPolicy};
use super::traits::{Engine, ProgressReporter};

/// Per-invocation hard timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Clone)]
pub struct EngineAdapter {
    engine: Arc<dyn Engine>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl EngineAdapter {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            retry: RetryPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run a job to its terminal result. Never panics on engine failure;
    /// every error is folded into the returned `JobResult`.
    pub async fn run(
        &self,
        job: &JobDescriptor,
        reporter: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> JobResult {
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return JobResult::cancelled(job, attempt);
            }
            attempt += 1;

            debug!(
                job_id = %job.id().short(),
                engine = self.engine.name(),
                attempt,
                "Invoking engine"
            );

            let err = match self.invoke_once(job, reporter, cancel).await {
                Ok(path) => {
                    reporter.done();
                    info!(job_id = %job.id().short(), path = %path.display(), "Job finished");
                    return JobResult::succeeded(job, path, attempt);
                }
                Err(err) => err,
            };

            let Some(kind) = err.kind() else {
                return JobResult::cancelled(job, attempt);
            };

            match self.retry.decide(attempt, kind) {
                RetryDecision::NoRetry => {
                    warn!(job_id = %job.id().short(), attempt, error = %err, "Job failed");
                    return JobResult::from_error(job, &err, attempt);
                }
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        job_id = %job.id().short(),
                        attempt,
                        delay_secs = delay.as_secs(),
                        error = %err,
                        "Retrying after failure"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return JobResult::cancelled(job, attempt),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    async fn invoke_once(
        &self,
        job: &JobDescriptor,
        reporter: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<std::path::PathBuf, EngineError> {
        match tokio::time::timeout(self.timeout, self.engine.invoke(job, reporter, cancel)).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout(self.timeout.as_secs())),
        }
    }
}
