// Command-line front end. Plays the progress-sink role: events arrive on a
// channel and are printed by a single task.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::downloader::builder::JobBuilder;
use crate::downloader::models::{JobDescriptor, JobId, Phase, ProgressEvent};
use crate::downloader::orchestrator::{BatchHandle, Orchestrator};
use crate::downloader::platform::{self, classify};
use crate::downloader::tools::{ToolManager, ToolType};
use crate::downloader::traits::{ChannelSink, Engine, SinkEvent};
use crate::downloader::{EngineAdapter, RetryPolicy};
use crate::settings::{self, Settings};
use crate::ytdlp::YtDlp;

/// Top-level CLI
#[derive(Debug, Parser)]
#[command(name = "rev-downloader")]
#[command(version, about = "Batch audio/video downloader built on yt-dlp", long_about = None)]
pub struct Cli {
    /// More detailed logs
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Settings file (default: per-user config dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download one or more URLs
    Download(DownloadArgs),

    /// Show title and members of a URL without downloading
    Preview {
        url: String,

        /// Maximum members to list
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Show how a URL is classified
    Classify { url: String },

    /// Check yt-dlp and ffmpeg
    Tools,

    /// Show or change saved settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum SettingsAction {
    /// Print current settings
    Show,
    /// Change one setting and save
    Set { key: String, value: String },
    /// Print the settings file location
    Path,
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Media URLs
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// Extract audio
    #[arg(long, conflicts_with = "video")]
    pub audio: bool,

    /// Keep video
    #[arg(long)]
    pub video: bool,

    /// Audio format (mp3, m4a, aac, wav, flac, ogg, opus, wma, aiff, webm)
    #[arg(long)]
    pub format: Option<String>,

    /// Audio quality in kbps (128, 192, 256, 320, lossless)
    #[arg(long)]
    pub quality: Option<String>,

    /// Video resolution cap (144p .. 4320p, best)
    #[arg(long)]
    pub resolution: Option<String>,

    /// Video container (mp4, mkv, webm, mov, avi, flv, 3gp, ts)
    #[arg(long)]
    pub container: Option<String>,

    /// Destination directory
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Parallel downloads (1-10)
    #[arg(short = 'j', long = "jobs")]
    pub jobs: Option<usize>,

    /// Treat playlist URLs as single items
    #[arg(long)]
    pub no_playlist: bool,

    /// Maximum playlist members (0 = no cap)
    #[arg(long)]
    pub limit: Option<usize>,

    /// Retries for network failures
    #[arg(long)]
    pub retries: Option<u32>,

    /// Per-download timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Download subtitles in this language (video only)
    #[arg(long, value_name = "LANG")]
    pub subtitles: Option<String>,

    /// Remove sponsor segments
    #[arg(long)]
    pub sponsorblock: bool,

    /// Persist these options as the new defaults
    #[arg(long)]
    pub save: bool,
}

impl DownloadArgs {
    /// Overlay command-line choices on the loaded settings
    fn apply(&self, settings: &mut Settings) {
        if self.audio {
            settings.download_type = "audio".to_string();
        }
        if self.video {
            settings.download_type = "video".to_string();
        }
        if let Some(v) = &self.format {
            settings.audio_format = v.clone();
        }
        if let Some(v) = &self.quality {
            settings.audio_quality = v.clone();
        }
        if let Some(v) = &self.resolution {
            settings.video_resolution = v.clone();
        }
        if let Some(v) = &self.container {
            settings.video_format = v.clone();
        }
        if let Some(v) = &self.output {
            settings.download_path = v.clone();
        }
        if let Some(v) = self.jobs {
            settings.concurrent = v;
        }
        if self.no_playlist {
            settings.playlist = false;
        }
        if let Some(v) = self.limit {
            settings.playlist_limit = v;
        }
        if let Some(v) = self.retries {
            settings.max_retries = v;
        }
        if let Some(v) = self.timeout {
            settings.timeout_secs = v.max(1);
        }
        if let Some(lang) = &self.subtitles {
            settings.subtitle = true;
            settings.subtitle_lang = lang.clone();
        }
        if self.sponsorblock {
            settings.sponsorblock = true;
        }
    }
}

impl Cli {
    pub async fn run(self) -> Result<ExitCode> {
        let settings_path = match &self.settings {
            Some(path) => path.clone(),
            None => settings::default_path()?,
        };

        match self.command {
            Command::Download(args) => download(args, &settings_path).await,
            Command::Preview { url, limit } => preview(&url, limit).await,
            Command::Classify { url } => Ok(classify_url(&url)),
            Command::Tools => tools().await,
            Command::Settings { action } => settings_command(action, &settings_path),
        }
    }
}

async fn download(args: DownloadArgs, settings_path: &Path) -> Result<ExitCode> {
    let mut settings = Settings::load(settings_path)?;
    args.apply(&mut settings);
    if args.save {
        settings.save(settings_path)?;
    }

    let builder = JobBuilder::new(&settings.to_job_options()).context("Invalid options")?;
    println!(
        "{} -> {}",
        builder.target().label(),
        builder.destination().display()
    );

    let tools = ToolManager::new().check_environment().await;
    if tools
        .iter()
        .any(|t| t.tool_type == ToolType::Ffmpeg && !t.is_available)
    {
        eprintln!("warning: ffmpeg not found; conversion and merging may fail");
    }

    let engine = Arc::new(YtDlp::default());

    let mut jobs: Vec<JobDescriptor> = Vec::new();
    let mut rejected = 0usize;
    for url in &args.urls {
        match builder.build_all(url, engine.as_ref()).await {
            Ok(built) => {
                if built.len() > 1 {
                    println!("Expanded {} into {} items", url, built.len());
                }
                jobs.extend(built);
            }
            Err(e) => {
                rejected += 1;
                warn!(url = %url, error = %e, "URL rejected");
                println!("✗ {}: {}", url, e);
            }
        }
    }

    if jobs.is_empty() {
        println!("Nothing to download");
        return Ok(if rejected > 0 {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        });
    }

    let handle = BatchHandle::new();
    let interrupt = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling... (running downloads are stopped, queued ones skipped)");
            info!("Cancellation requested");
            interrupt.cancel();
        }
    });

    let names: HashMap<JobId, String> = jobs
        .iter()
        .map(|j| (j.id(), j.display_name().to_string()))
        .collect();
    let (sink, rx) = ChannelSink::new();
    let printer = tokio::spawn(print_events(rx, names));

    let adapter = EngineAdapter::new(engine)
        .with_retry(RetryPolicy::with_retries(settings.max_retries))
        .with_timeout(Duration::from_secs(settings.timeout_secs.max(1)));
    let summary = Orchestrator::new(adapter)
        .run_batch(jobs, settings.concurrent, Arc::new(sink), &handle)
        .await;

    // the sink was dropped with the batch, so the printer sees the channel close
    if let Err(e) = printer.await {
        debug!(error = %e, "Printer task ended abnormally");
    }

    if let Some(reason) = &summary.aborted {
        println!("Batch aborted: {}", reason);
    }
    println!("{}", summary);
    if rejected > 0 {
        println!("{} URL(s) rejected before download", rejected);
    }

    Ok(if summary.is_clean() && rejected == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Console consumer: one line per phase change or 25% step, one status
/// line per finished job
async fn print_events(mut rx: mpsc::UnboundedReceiver<SinkEvent>, names: HashMap<JobId, String>) {
    let mut last: HashMap<JobId, (Phase, u8)> = HashMap::new();

    while let Some(event) = rx.recv().await {
        match event {
            SinkEvent::Progress(event) => {
                if let Some(line) = progress_line(&mut last, &names, &event) {
                    println!("{}", line);
                }
            }
            SinkEvent::JobDone(result) => {
                last.remove(&result.job_id);
                println!("{}", result.status_line());
            }
        }
    }
}

fn progress_line(
    last: &mut HashMap<JobId, (Phase, u8)>,
    names: &HashMap<JobId, String>,
    event: &ProgressEvent,
) -> Option<String> {
    let step = (event.percent / 25.0).floor() as u8;
    let changed = match last.get(&event.job_id) {
        Some((phase, prev_step)) => *phase != event.phase || step > *prev_step,
        None => true,
    };
    if !changed || event.phase == Phase::Done {
        return None;
    }
    last.insert(event.job_id, (event.phase, step));

    let name = names
        .get(&event.job_id)
        .map(String::as_str)
        .unwrap_or("?");
    Some(format!(
        "[{}] {:>5.1}% {:<10} {}",
        event.job_id.short(),
        event.percent,
        event.phase,
        name
    ))
}

async fn preview(url: &str, limit: usize) -> Result<ExitCode> {
    let url = platform::normalize_url(url);
    let verdict = classify(&url);
    if !verdict.allowed {
        println!(
            "✗ {} content is DRM-protected and cannot be downloaded",
            verdict.platform
        );
        return Ok(ExitCode::FAILURE);
    }

    let engine = YtDlp::default();
    let listing = engine
        .list_collection(&url, limit.max(1))
        .await
        .with_context(|| format!("Could not fetch metadata for {}", url))?;

    println!(
        "{} [{}]",
        listing.title.as_deref().unwrap_or("(untitled)"),
        verdict.platform
    );
    if let Some(uploader) = &listing.uploader {
        println!("uploader: {}", uploader);
    }
    if let Some(secs) = listing.duration_secs {
        println!("duration: {}", format_duration(secs));
    }
    for (i, entry) in listing.entries.iter().enumerate() {
        println!(
            "{:>3}. {}  {}",
            i + 1,
            entry.title.as_deref().unwrap_or("-"),
            entry.url
        );
    }
    Ok(ExitCode::SUCCESS)
}

/// `m:ss`, or `h:mm:ss` from one hour up
fn format_duration(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

fn classify_url(url: &str) -> ExitCode {
    let normalized = platform::normalize_url(url);
    let verdict = classify(&normalized);
    println!("platform:     {}", verdict.platform);
    println!("allowed:      {}", verdict.allowed);
    println!("special path: {}", verdict.needs_special_path);
    println!("collection:   {}", platform::is_collection_url(&normalized));
    if verdict.allowed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn tools() -> Result<ExitCode> {
    let tools = ToolManager::new().get_all_tools().await;
    for tool in &tools {
        println!("{}", tool.status_line());
    }
    let engine_ok = tools
        .iter()
        .all(|t| t.is_available || !t.tool_type.is_required());
    Ok(if engine_ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn settings_command(action: SettingsAction, path: &Path) -> Result<ExitCode> {
    match action {
        SettingsAction::Show => {
            let settings = Settings::load(path)?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        SettingsAction::Set { key, value } => {
            let mut settings = Settings::load(path)?;
            settings.set(&key, &value)?;
            // reject option names the builder would refuse, without touching the disk
            crate::downloader::builder::validate_options(&settings.to_job_options())
                .with_context(|| format!("Refusing to save {} = {}", key, value))?;
            settings.save(path)?;
            println!("{} = {}", key, value);
        }
        SettingsAction::Path => println!("{}", path.display()),
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_download_flags() {
        let cli = Cli::try_parse_from([
            "rev-downloader",
            "download",
            "https://youtu.be/a",
            "https://youtu.be/b",
            "--video",
            "--resolution",
            "720p",
            "-j",
            "4",
            "--no-playlist",
        ])
        .unwrap();

        let Command::Download(args) = cli.command else {
            panic!("expected download");
        };
        assert_eq!(args.urls.len(), 2);

        let mut settings = Settings::default();
        args.apply(&mut settings);
        assert_eq!(settings.download_type, "video");
        assert_eq!(settings.video_resolution, "720p");
        assert_eq!(settings.concurrent, 4);
        assert!(!settings.playlist);
    }

    #[test]
    fn audio_and_video_conflict() {
        assert!(Cli::try_parse_from([
            "rev-downloader",
            "download",
            "https://youtu.be/a",
            "--audio",
            "--video"
        ])
        .is_err());
    }

    #[test]
    fn durations_are_clock_style() {
        assert_eq!(format_duration(59), "0:59");
        assert_eq!(format_duration(213), "3:33");
        assert_eq!(format_duration(3723), "1:02:03");
    }

    #[test]
    fn download_requires_url() {
        assert!(Cli::try_parse_from(["rev-downloader", "download"]).is_err());
    }

    #[test]
    fn progress_lines_are_throttled() {
        let id = JobId::new();
        let names = HashMap::from([(id, "clip".to_string())]);
        let mut last = HashMap::new();
        let event = |percent: f32, phase: Phase| ProgressEvent {
            job_id: id,
            percent,
            downloaded_bytes: None,
            phase,
            message: None,
        };

        assert!(progress_line(&mut last, &names, &event(1.0, Phase::Fetching)).is_some());
        assert!(progress_line(&mut last, &names, &event(10.0, Phase::Fetching)).is_none());
        assert!(progress_line(&mut last, &names, &event(26.0, Phase::Fetching)).is_some());
        assert!(progress_line(&mut last, &names, &event(26.0, Phase::Converting)).is_some());
        assert!(progress_line(&mut last, &names, &event(100.0, Phase::Done)).is_none());
    }
}
