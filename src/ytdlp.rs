// yt-dlp engine - the concrete Engine over the yt-dlp executable
//
// One job = one yt-dlp process. Progress is read line by line from stdout
// (`--newline`), stderr is collected for failure classification, and the
// child is killed on cancellation or when the adapter's timeout drops it.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as TokioCommand;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::downloader::errors::EngineError;
use crate::downloader::extractors::{strategy_for, InvocationStrategy};
use crate::downloader::format_selector::FormatSelector;
use crate::downloader::models::{CollectionEntry, CollectionListing, JobDescriptor, Phase};
use crate::downloader::platform;
use crate::downloader::progress::{self, EngineLine};
use crate::downloader::traits::{Engine, ProgressReporter};
use crate::downloader::utils::{self, run_output_with_timeout, CommandError};

/// Output template under the destination directory
pub const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

#[derive(Debug, Clone)]
pub struct YtDlpConfig {
    pub binary: PathBuf,
    pub ffmpeg_location: Option<PathBuf>,
    /// Seconds yt-dlp waits on a stalled socket
    pub socket_timeout: u32,
    /// Hard limit for the metadata-only listing call
    pub listing_timeout_secs: u64,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            binary: utils::find_binary("yt-dlp", "YTDLP_PATH"),
            ffmpeg_location: std::env::var_os("FFMPEG_PATH")
                .map(PathBuf::from)
                .filter(|p| p.exists()),
            socket_timeout: 30,
            listing_timeout_secs: 300,
        }
    }
}

pub struct YtDlp {
    config: YtDlpConfig,
}

impl YtDlp {
    pub fn new(config: YtDlpConfig) -> Self {
        Self { config }
    }

    pub fn binary(&self) -> &Path {
        &self.config.binary
    }

    /// Full argument list for one job
    pub fn build_args(&self, job: &JobDescriptor, strategy: &dyn InvocationStrategy) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--newline".to_string(),
            if job.expand_playlist() {
                "--yes-playlist".to_string()
            } else {
                "--no-playlist".to_string()
            },
            "--no-warnings".to_string(),
            "--continue".to_string(),
            "--force-overwrites".to_string(),
            "--socket-timeout".to_string(),
            self.config.socket_timeout.to_string(),
            "--retries".to_string(),
            "10".to_string(),
            "--fragment-retries".to_string(),
            "10".to_string(),
            "-P".to_string(),
            job.destination().to_string_lossy().into_owned(),
            "-o".to_string(),
            OUTPUT_TEMPLATE.to_string(),
        ];

        args.extend(strategy.identity_args());
        args.extend(FormatSelector::engine_args(job));

        if let Some(ffmpeg) = &self.config.ffmpeg_location {
            args.push("--ffmpeg-location".to_string());
            args.push(ffmpeg.to_string_lossy().into_owned());
        }

        // "--" keeps a URL starting with '-' from being read as an option
        args.push("--".to_string());
        args.push(job.url().to_string());
        args
    }

    /// Arguments for the metadata-only listing call
    pub fn listing_args(&self, url: &str, limit: usize) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--flat-playlist".to_string(),
            "--dump-single-json".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            self.config.socket_timeout.to_string(),
            "--playlist-end".to_string(),
            limit.to_string(),
        ];
        args.extend(strategy_for(&platform::classify(url)).identity_args());
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }

    fn spawn_error(&self, e: std::io::Error) -> EngineError {
        match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                EngineError::EngineMissing(format!(
                    "yt-dlp not found at {} ({}). Install it or set YTDLP_PATH",
                    self.config.binary.display(),
                    e
                ))
            }
            _ => EngineError::Transient(format!("Failed to start yt-dlp: {}", e)),
        }
    }
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new(YtDlpConfig::default())
    }
}

#[async_trait]
impl Engine for YtDlp {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn invoke(
        &self,
        job: &JobDescriptor,
        reporter: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, EngineError> {
        let strategy = strategy_for(job.platform());
        let args = self.build_args(job, strategy);
        debug!(
            job_id = %job.id().short(),
            strategy = strategy.name(),
            "yt-dlp {}",
            args.join(" ")
        );

        let mut child = TokioCommand::new(&self.config.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Transient("Failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::Transient("Failed to capture stderr".to_string()))?;

        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut collected = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                collected.push(line);
            }
            collected.join("\n")
        });

        reporter.note(Phase::Fetching, format!("Starting {}", job.display_name()));

        let mut output: Option<PathBuf> = None;
        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = child.kill().await;
                    stderr_task.abort();
                    info!(job_id = %job.id().short(), "yt-dlp stopped on cancellation");
                    return Err(EngineError::Cancelled);
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => handle_line(&line, reporter, &mut output),
                    Ok(None) => break,
                    Err(e) => {
                        warn!(job_id = %job.id().short(), error = %e, "Failed to read yt-dlp output");
                        break;
                    }
                },
            }
        }

        let waited = tokio::select! {
            _ = cancel.cancelled() => None,
            status = child.wait() => Some(status),
        };
        let Some(status) = waited else {
            let _ = child.kill().await;
            stderr_task.abort();
            return Err(EngineError::Cancelled);
        };
        let status =
            status.map_err(|e| EngineError::Transient(format!("Process error: {}", e)))?;
        let stderr_output = stderr_task.await.unwrap_or_default();

        if !status.success() {
            debug!(job_id = %job.id().short(), code = ?status.code(), "yt-dlp failed");
            return Err(EngineError::from(stderr_output));
        }

        match output {
            Some(path) => Ok(path),
            None => {
                warn!(
                    job_id = %job.id().short(),
                    "yt-dlp succeeded without naming an output file"
                );
                Ok(job.destination().to_path_buf())
            }
        }
    }

    async fn list_collection(
        &self,
        url: &str,
        limit: usize,
    ) -> Result<CollectionListing, EngineError> {
        let args = self.listing_args(url, limit);
        let output = run_output_with_timeout(
            &self.config.binary,
            &args,
            self.config.listing_timeout_secs,
        )
        .await
        .map_err(|e| match e {
            e if e.is_not_found() => EngineError::EngineMissing(e.to_string()),
            CommandError::Timeout { secs, .. } => EngineError::Timeout(secs),
            other => EngineError::Transient(other.to_string()),
        })?;

        if !output.status.success() {
            return Err(EngineError::from(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }

        parse_listing(&output.stdout, limit)
    }
}

fn handle_line(line: &str, reporter: &ProgressReporter, output: &mut Option<PathBuf>) {
    let Some(parsed) = progress::parse_line(line) else {
        trace!("[yt-dlp] {}", line);
        return;
    };

    if let Some(path) = parsed.output_path() {
        *output = Some(path.clone());
    }

    match parsed {
        EngineLine::Progress {
            percent,
            total_bytes,
            speed,
            eta,
        } => {
            let downloaded = total_bytes.map(|total| (total as f64 * percent as f64 / 100.0) as u64);
            let message = progress::describe_progress(percent, speed.as_deref(), eta.as_deref());
            reporter.fetching(percent, downloaded, Some(message));
        }
        EngineLine::Destination(path) => {
            debug!("[yt-dlp] Destination: {}", path.display());
            reporter.note(Phase::Fetching, format!("Downloading {}", file_label(&path)));
        }
        EngineLine::AlreadyDownloaded(path) => {
            reporter.fetching(100.0, None, Some(format!("{} already downloaded", file_label(&path))));
        }
        EngineLine::Converting { step, message, .. } => {
            debug!("[yt-dlp] [{}] {}", step, message);
            reporter.converting(format!("{}: {}", step, message));
        }
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[derive(Debug, Deserialize)]
struct FlatListing {
    title: Option<String>,
    uploader: Option<String>,
    channel: Option<String>,
    duration: Option<f64>,
    webpage_url: Option<String>,
    entries: Option<Vec<FlatEntry>>,
}

#[derive(Debug, Deserialize)]
struct FlatEntry {
    id: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    title: Option<String>,
    ie_key: Option<String>,
}

impl FlatEntry {
    fn resolve_url(&self) -> Option<String> {
        if let Some(url) = &self.webpage_url {
            return Some(url.clone());
        }
        match (&self.url, &self.id, self.ie_key.as_deref()) {
            (Some(url), _, _) if url.starts_with("http://") || url.starts_with("https://") => {
                Some(url.clone())
            }
            (_, Some(id), Some("Youtube")) => Some(format!("https://www.youtube.com/watch?v={}", id)),
            (Some(url), _, _) => Some(url.clone()),
            _ => None,
        }
    }
}

/// Parse `--dump-single-json` output. A single item (no `entries`) lists
/// as a collection of one.
fn parse_listing(stdout: &[u8], limit: usize) -> Result<CollectionListing, EngineError> {
    let flat: FlatListing = serde_json::from_slice(stdout)
        .map_err(|e| EngineError::Permanent(format!("Unreadable listing output: {}", e)))?;

    let entries = match flat.entries {
        Some(entries) => entries
            .iter()
            .filter_map(|entry| {
                entry.resolve_url().map(|url| CollectionEntry {
                    url,
                    title: entry.title.clone(),
                })
            })
            .take(limit)
            .collect(),
        None => flat
            .webpage_url
            .map(|url| CollectionEntry {
                url,
                title: flat.title.clone(),
            })
            .into_iter()
            .collect(),
    };

    Ok(CollectionListing {
        title: flat.title,
        uploader: flat.uploader.or(flat.channel),
        duration_secs: flat
            .duration
            .filter(|d| d.is_finite() && *d >= 0.0)
            .map(|d| d.round() as u64),
        entries,
    })
}
