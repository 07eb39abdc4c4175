// Common data models for the download orchestrator

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::EngineError;
use super::platform::PlatformVerdict;

/// Unique id of one submitted job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight hex digits, enough to tell jobs apart in a status line
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub const ALL: [Self; 2] = [Self::Audio, Self::Video];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    M4a,
    Aac,
    Wav,
    Flac,
    Ogg,
    Opus,
    Wma,
    Aiff,
    Webm,
}

impl AudioFormat {
    pub const ALL: [Self; 10] = [
        Self::Mp3,
        Self::M4a,
        Self::Aac,
        Self::Wav,
        Self::Flac,
        Self::Ogg,
        Self::Opus,
        Self::Wma,
        Self::Aiff,
        Self::Webm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::M4a => "m4a",
            Self::Aac => "aac",
            Self::Wav => "wav",
            Self::Flac => "flac",
            Self::Ogg => "ogg",
            Self::Opus => "opus",
            Self::Wma => "wma",
            Self::Aiff => "aiff",
            Self::Webm => "webm",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str().eq_ignore_ascii_case(s.trim()))
    }

    /// Lossless formats take no bitrate target
    pub fn is_lossless(&self) -> bool {
        matches!(self, Self::Wav | Self::Flac | Self::Aiff)
    }

    /// Output files the engine can embed cover art into. `webm` is
    /// extracted as opus, so it qualifies.
    pub fn supports_thumbnail_embed(&self) -> bool {
        matches!(
            self,
            Self::Mp3 | Self::M4a | Self::Flac | Self::Ogg | Self::Opus | Self::Webm
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioQuality {
    Kbps128,
    Kbps192,
    Kbps256,
    Kbps320,
    Lossless,
}

impl AudioQuality {
    pub const ALL: [Self; 5] = [
        Self::Kbps128,
        Self::Kbps192,
        Self::Kbps256,
        Self::Kbps320,
        Self::Lossless,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kbps128 => "128",
            Self::Kbps192 => "192",
            Self::Kbps256 => "256",
            Self::Kbps320 => "320",
            Self::Lossless => "lossless",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().trim_end_matches(['k', 'K']);
        Self::ALL.into_iter().find(|q| q.as_str().eq_ignore_ascii_case(s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoResolution {
    P144,
    P240,
    P360,
    P480,
    P720,
    P1080,
    P1440,
    P2160,
    P4320,
    Best,
}

impl VideoResolution {
    pub const ALL: [Self; 10] = [
        Self::P144,
        Self::P240,
        Self::P360,
        Self::P480,
        Self::P720,
        Self::P1080,
        Self::P1440,
        Self::P2160,
        Self::P4320,
        Self::Best,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::P144 => "144p",
            Self::P240 => "240p",
            Self::P360 => "360p",
            Self::P480 => "480p",
            Self::P720 => "720p",
            Self::P1080 => "1080p",
            Self::P1440 => "1440p",
            Self::P2160 => "2160p",
            Self::P4320 => "4320p",
            Self::Best => "best",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        // accept "4k"/"8k" spellings
        let s = match s.to_ascii_lowercase().as_str() {
            "4k" => "2160p",
            "8k" => "4320p",
            _ => s,
        };
        Self::ALL.into_iter().find(|r| r.as_str().eq_ignore_ascii_case(s))
    }

    /// Height cap in pixels, `None` for best available
    pub fn max_height(&self) -> Option<u32> {
        match self {
            Self::P144 => Some(144),
            Self::P240 => Some(240),
            Self::P360 => Some(360),
            Self::P480 => Some(480),
            Self::P720 => Some(720),
            Self::P1080 => Some(1080),
            Self::P1440 => Some(1440),
            Self::P2160 => Some(2160),
            Self::P4320 => Some(4320),
            Self::Best => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoContainer {
    Mp4,
    Mkv,
    Webm,
    Mov,
    Avi,
    Flv,
    ThreeGp,
    Ts,
}

impl VideoContainer {
    pub const ALL: [Self; 8] = [
        Self::Mp4,
        Self::Mkv,
        Self::Webm,
        Self::Mov,
        Self::Avi,
        Self::Flv,
        Self::ThreeGp,
        Self::Ts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mkv => "mkv",
            Self::Webm => "webm",
            Self::Mov => "mov",
            Self::Avi => "avi",
            Self::Flv => "flv",
            Self::ThreeGp => "3gp",
            Self::Ts => "ts",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
    }

    /// Containers the engine can merge streams into directly.
    /// The rest need a remux pass after merging.
    pub fn is_mergeable(&self) -> bool {
        matches!(
            self,
            Self::Mp4 | Self::Mkv | Self::Webm | Self::Mov | Self::Avi | Self::Flv
        )
    }

    /// Containers that accept an embedded thumbnail
    pub fn supports_thumbnail_embed(&self) -> bool {
        matches!(self, Self::Mp4 | Self::Mkv | Self::Mov)
    }
}

/// Resolved output target of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaTarget {
    Audio {
        format: AudioFormat,
        quality: AudioQuality,
    },
    Video {
        resolution: VideoResolution,
        container: VideoContainer,
    },
}

impl MediaTarget {
    pub fn kind(&self) -> MediaKind {
        match self {
            Self::Audio { .. } => MediaKind::Audio,
            Self::Video { .. } => MediaKind::Video,
        }
    }

    /// Short label for logs, e.g. "audio mp3 320" or "video 1080p mp4"
    pub fn label(&self) -> String {
        match self {
            Self::Audio { format, quality } => {
                format!("audio {} {}", format.as_str(), quality.as_str())
            }
            Self::Video {
                resolution,
                container,
            } => format!("video {} {}", resolution.as_str(), container.as_str()),
        }
    }
}

/// Subtitle request for video jobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleOptions {
    pub lang: String,
    pub embed: bool,
}

/// Post-processing flags carried by a job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFlags {
    pub embed_metadata: bool,
    pub embed_thumbnail: bool,
    pub subtitles: Option<SubtitleOptions>,
    pub sponsorblock: bool,
}

/// User-chosen option set, as supplied by settings or the command line.
/// Values are validated when a job is built.
#[derive(Debug, Clone)]
pub struct JobOptions {
    pub media_kind: String,
    pub audio_format: String,
    pub audio_quality: String,
    pub video_resolution: String,
    pub video_container: String,
    pub destination: PathBuf,
    pub expand_playlists: bool,
    /// Maximum members taken from a collection; 0 means the engine ceiling
    pub playlist_limit: usize,
    pub embed_metadata: bool,
    pub embed_thumbnail: bool,
    pub subtitles: bool,
    pub subtitle_lang: String,
    pub embed_subtitles: bool,
    pub sponsorblock: bool,
    /// Refuse to start with less free space than this at the destination
    pub min_free_mb: u64,
}

/// Free space required at the destination before any job is built
pub const DEFAULT_MIN_FREE_MB: u64 = 500;

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            media_kind: "audio".to_string(),
            audio_format: "mp3".to_string(),
            audio_quality: "320".to_string(),
            video_resolution: "1080p".to_string(),
            video_container: "mp4".to_string(),
            destination: default_destination(),
            expand_playlists: true,
            playlist_limit: 50,
            embed_metadata: true,
            embed_thumbnail: true,
            subtitles: false,
            subtitle_lang: "en".to_string(),
            embed_subtitles: true,
            sponsorblock: false,
            min_free_mb: DEFAULT_MIN_FREE_MB,
        }
    }
}

/// `<Downloads>/REVMusic`, or `./REVMusic` when no download dir is known
pub fn default_destination() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("REVMusic")
}

/// Immutable description of one URL-to-file work item
#[derive(Debug, Clone)]
pub struct JobDescriptor {
    id: JobId,
    url: String,
    platform: PlatformVerdict,
    target: MediaTarget,
    destination: PathBuf,
    expand_playlist: bool,
    flags: MetadataFlags,
    title: Option<String>,
}

impl JobDescriptor {
    pub(crate) fn new(
        url: String,
        platform: PlatformVerdict,
        target: MediaTarget,
        destination: PathBuf,
        expand_playlist: bool,
        flags: MetadataFlags,
        title: Option<String>,
    ) -> Self {
        Self {
            id: JobId::new(),
            url,
            platform,
            target,
            destination,
            expand_playlist,
            flags,
            title,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn platform(&self) -> &PlatformVerdict {
        &self.platform
    }

    pub fn media_kind(&self) -> MediaKind {
        self.target.kind()
    }

    pub fn target(&self) -> &MediaTarget {
        &self.target
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn expand_playlist(&self) -> bool {
        self.expand_playlist
    }

    pub fn flags(&self) -> &MetadataFlags {
        &self.flags
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Title when known, URL otherwise
    pub fn display_name(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.url)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Fetching,
    Converting,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fetching => "fetching",
            Self::Converting => "converting",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

/// Progress notification for one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: JobId,
    /// 0.0..=100.0, non-decreasing within a job
    pub percent: f32,
    pub downloaded_bytes: Option<u64>,
    pub phase: Phase,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transient,
    Permanent,
    EngineMissing,
    Timeout,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::EngineMissing => "engine-missing",
            Self::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub reason: String,
}

/// Terminal outcome of one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: JobId,
    pub name: String,
    pub state: JobState,
    pub output_path: Option<PathBuf>,
    pub error: Option<JobFailure>,
    /// Engine invocations made; 0 when the job never ran
    pub attempts: u32,
}

impl JobResult {
    pub fn succeeded(job: &JobDescriptor, output_path: PathBuf, attempts: u32) -> Self {
        Self {
            job_id: job.id(),
            name: job.display_name().to_string(),
            state: JobState::Succeeded,
            output_path: Some(output_path),
            error: None,
            attempts,
        }
    }

    /// Failed or cancelled, depending on the error
    pub fn from_error(job: &JobDescriptor, err: &EngineError, attempts: u32) -> Self {
        match err.kind() {
            Some(kind) => Self {
                job_id: job.id(),
                name: job.display_name().to_string(),
                state: JobState::Failed,
                output_path: None,
                error: Some(JobFailure {
                    kind,
                    reason: err.to_string(),
                }),
                attempts,
            },
            None => Self::cancelled(job, attempts),
        }
    }

    pub fn cancelled(job: &JobDescriptor, attempts: u32) -> Self {
        Self {
            job_id: job.id(),
            name: job.display_name().to_string(),
            state: JobState::Cancelled,
            output_path: None,
            error: None,
            attempts,
        }
    }

    pub fn success(&self) -> bool {
        self.state == JobState::Succeeded
    }

    /// One human-readable line per terminal job
    pub fn status_line(&self) -> String {
        match (&self.state, &self.error) {
            (JobState::Succeeded, _) => match &self.output_path {
                Some(path) => format!("✓ {} -> {}", self.name, path.display()),
                None => format!("✓ {}", self.name),
            },
            (JobState::Failed, Some(failure)) => {
                format!("✗ {} [{}] {}", self.name, failure.kind, failure.reason)
            }
            (JobState::Cancelled, _) => format!("⊘ {} cancelled", self.name),
            (state, _) => format!("? {} {}", self.name, state),
        }
    }
}

/// Outcome of one batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub failures: Vec<(JobId, JobFailure)>,
    /// Set when the batch stopped early because the environment is unusable
    pub aborted: Option<String>,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn from_results<'a>(
        results: impl IntoIterator<Item = &'a JobResult>,
        aborted: Option<String>,
        elapsed: Duration,
    ) -> Self {
        let mut summary = Self {
            aborted,
            elapsed,
            ..Self::default()
        };

        for result in results {
            summary.total += 1;
            match result.state {
                JobState::Succeeded => summary.succeeded += 1,
                JobState::Cancelled => summary.cancelled += 1,
                _ => {
                    summary.failed += 1;
                    if let Some(failure) = &result.error {
                        summary.failures.push((result.job_id, failure.clone()));
                    }
                }
            }
        }

        summary
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.cancelled == 0 && self.aborted.is_none()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} jobs: {} succeeded, {} failed, {} cancelled in {:.1}s",
            self.total,
            self.succeeded,
            self.failed,
            self.cancelled,
            self.elapsed.as_secs_f64()
        )
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}

/// Collection members returned by the engine's metadata-only listing call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionListing {
    pub title: Option<String>,
    /// Uploader or channel, when the engine reports one
    pub uploader: Option<String>,
    /// Whole seconds; set for single items
    pub duration_secs: Option<u64>,
    pub entries: Vec<CollectionEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionEntry {
    pub url: String,
    pub title: Option<String>,
}
