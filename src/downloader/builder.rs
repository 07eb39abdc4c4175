// Job descriptor builder - validated options + URL -> immutable job
//
// Validation happens here so nothing invalid ever reaches the orchestrator.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::errors::BuildError;
use super::models::{
    AudioFormat, AudioQuality, JobDescriptor, JobOptions, MediaKind, MediaTarget, MetadataFlags,
    SubtitleOptions, VideoContainer, VideoResolution,
};
use super::platform::{self, PlatformVerdict};
use super::traits::Engine;

/// Members listed when no explicit cap is configured
pub const ENGINE_LISTING_CEILING: usize = 500;

/// Options resolved once, shared by every descriptor built from them
#[derive(Debug, Clone)]
pub struct JobBuilder {
    target: MediaTarget,
    destination: PathBuf,
    expand_playlists: bool,
    playlist_limit: usize,
    flags: MetadataFlags,
}

impl JobBuilder {
    /// Validate an option set. Fails on the first unrecognised value or an
    /// unusable destination.
    pub fn new(options: &JobOptions) -> Result<Self, BuildError> {
        let (target, subtitles) = resolve(options)?;
        let destination = ensure_writable_dir(&options.destination)?;
        ensure_free_space(&destination, options.min_free_mb)?;

        Ok(Self {
            target,
            destination,
            expand_playlists: options.expand_playlists,
            playlist_limit: options.playlist_limit,
            flags: MetadataFlags {
                embed_metadata: options.embed_metadata,
                embed_thumbnail: options.embed_thumbnail,
                subtitles,
                sponsorblock: options.sponsorblock,
            },
        })
    }

    pub fn target(&self) -> &MediaTarget {
        &self.target
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Effective member cap for collection listings
    pub fn listing_limit(&self) -> usize {
        if self.playlist_limit == 0 {
            ENGINE_LISTING_CEILING
        } else {
            self.playlist_limit.min(ENGINE_LISTING_CEILING)
        }
    }

    /// Build one descriptor for a single URL
    pub fn build(&self, url: &str) -> Result<JobDescriptor, BuildError> {
        let (url, verdict) = check_url(url)?;
        Ok(self.single(url, verdict))
    }

    fn single(&self, url: String, verdict: PlatformVerdict) -> JobDescriptor {
        let expand = self.expand_playlists && platform::is_collection_url(&url);
        self.descriptor(url, verdict, expand, None)
    }

    /// Build descriptors for a URL, expanding collections through the
    /// engine's metadata-only listing when enabled. A failed listing
    /// yields an error and no descriptors.
    pub async fn build_all(
        &self,
        url: &str,
        engine: &dyn Engine,
    ) -> Result<Vec<JobDescriptor>, BuildError> {
        let (url, verdict) = check_url(url)?;

        if !(self.expand_playlists && platform::is_collection_url(&url)) {
            return Ok(vec![self.descriptor(url, verdict, false, None)]);
        }

        let limit = self.listing_limit();
        debug!(url = %url, limit, "Listing collection");

        let listing = engine
            .list_collection(&url, limit)
            .await
            .map_err(|e| BuildError::CollectionExpansion {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let mut jobs = Vec::new();
        for entry in listing.entries {
            if jobs.len() >= limit {
                break;
            }
            match check_url(&entry.url) {
                Ok((member_url, member_verdict)) => {
                    jobs.push(self.descriptor(member_url, member_verdict, false, entry.title));
                }
                Err(e) => {
                    warn!(url = %entry.url, error = %e, "Skipping collection member");
                }
            }
        }

        info!(
            url = %url,
            title = listing.title.as_deref().unwrap_or("-"),
            jobs = jobs.len(),
            "Expanded collection"
        );
        Ok(jobs)
    }

    fn descriptor(
        &self,
        url: String,
        verdict: PlatformVerdict,
        expand: bool,
        title: Option<String>,
    ) -> JobDescriptor {
        JobDescriptor::new(
            url,
            verdict,
            self.target,
            self.destination.clone(),
            expand,
            self.flags.clone(),
            title,
        )
    }
}

/// `build(url, options)`: validate the URL first, then the option set
pub fn build(url: &str, options: &JobOptions) -> Result<JobDescriptor, BuildError> {
    let (url, verdict) = check_url(url)?;
    Ok(JobBuilder::new(options)?.single(url, verdict))
}

/// Check option names without touching the destination directory
pub fn validate_options(options: &JobOptions) -> Result<(), BuildError> {
    resolve(options).map(|_| ())
}

fn resolve(options: &JobOptions) -> Result<(MediaTarget, Option<SubtitleOptions>), BuildError> {
    let target = resolve_target(options)?;

    let subtitles = options.subtitles.then(|| SubtitleOptions {
        lang: options.subtitle_lang.trim().to_string(),
        embed: options.embed_subtitles,
    });
    if let Some(subs) = &subtitles {
        if subs.lang.is_empty() {
            return Err(BuildError::invalid_option(
                "subtitle_lang",
                options.subtitle_lang.clone(),
            ));
        }
    }
    Ok((target, subtitles))
}

/// Non-empty, normalised and not on the deny-list
fn check_url(url: &str) -> Result<(String, PlatformVerdict), BuildError> {
    let url = platform::normalize_url(url);
    if url.is_empty() {
        return Err(BuildError::EmptyUrl);
    }

    let verdict = platform::classify(&url);
    if !verdict.allowed {
        return Err(BuildError::BlockedPlatform {
            platform: verdict.platform.name().to_string(),
        });
    }
    Ok((url, verdict))
}

fn resolve_target(options: &JobOptions) -> Result<MediaTarget, BuildError> {
    let kind = MediaKind::parse(&options.media_kind)
        .ok_or_else(|| BuildError::invalid_option("media_kind", options.media_kind.clone()))?;

    // Both option groups are validated even though only one is used
    let format = AudioFormat::parse(&options.audio_format)
        .ok_or_else(|| BuildError::invalid_option("audio_format", options.audio_format.clone()))?;
    let quality = AudioQuality::parse(&options.audio_quality).ok_or_else(|| {
        BuildError::invalid_option("audio_quality", options.audio_quality.clone())
    })?;
    let resolution = VideoResolution::parse(&options.video_resolution).ok_or_else(|| {
        BuildError::invalid_option("video_resolution", options.video_resolution.clone())
    })?;
    let container = VideoContainer::parse(&options.video_container).ok_or_else(|| {
        BuildError::invalid_option("video_container", options.video_container.clone())
    })?;

    Ok(match kind {
        MediaKind::Audio => MediaTarget::Audio { format, quality },
        MediaKind::Video => MediaTarget::Video {
            resolution,
            container,
        },
    })
}

fn ensure_writable_dir(path: &Path) -> Result<PathBuf, BuildError> {
    let path_error = |reason: String| BuildError::Path {
        path: path.to_path_buf(),
        reason,
    };

    if path.as_os_str().is_empty() {
        return Err(path_error("empty path".to_string()));
    }

    fs::create_dir_all(path).map_err(|e| path_error(e.to_string()))?;

    let meta = fs::metadata(path).map_err(|e| path_error(e.to_string()))?;
    if !meta.is_dir() {
        return Err(path_error("not a directory".to_string()));
    }
    if meta.permissions().readonly() {
        return Err(path_error("directory is read-only".to_string()));
    }

    Ok(path.to_path_buf())
}

/// Refuse a destination with less than `min_mb` free. An unreadable figure
/// only logs a warning; the engine reports a full disk itself.
fn ensure_free_space(path: &Path, min_mb: u64) -> Result<(), BuildError> {
    if min_mb == 0 {
        return Ok(());
    }
    let required = min_mb.saturating_mul(1024 * 1024);

    match fs2::available_space(path) {
        Ok(available) if available < required => Err(BuildError::Path {
            path: path.to_path_buf(),
            reason: format!(
                "insufficient disk space ({} MB free, {} MB required)",
                available / (1024 * 1024),
                min_mb
            ),
        }),
        Ok(available) => {
            debug!(path = %path.display(), free_mb = available / (1024 * 1024), "Free space ok");
            Ok(())
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read free disk space");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options_in(dir: &Path) -> JobOptions {
        JobOptions {
            destination: dir.to_path_buf(),
            min_free_mb: 0,
            ..JobOptions::default()
        }
    }

    #[test]
    fn builds_audio_job_with_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let job = build("https://youtu.be/abc", &options_in(tmp.path())).unwrap();

        assert_eq!(job.media_kind(), MediaKind::Audio);
        assert_eq!(job.destination(), tmp.path());
        assert!(job.flags().embed_metadata);
        assert!(!job.expand_playlist());
    }

    #[test]
    fn drm_url_is_blocked() {
        let tmp = tempfile::tempdir().unwrap();
        let err = build(
            "https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC",
            &options_in(tmp.path()),
        )
        .unwrap_err();
        assert_eq!(
            err,
            BuildError::BlockedPlatform {
                platform: "Spotify".to_string()
            }
        );
    }

    #[test]
    fn empty_url_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(
            build("   ", &options_in(tmp.path())).unwrap_err(),
            BuildError::EmptyUrl
        );
    }

    #[test]
    fn invalid_option_names_field() {
        let tmp = tempfile::tempdir().unwrap();
        let mut options = options_in(tmp.path());
        options.video_resolution = "9000p".to_string();

        match build("https://youtu.be/abc", &options) {
            Err(BuildError::InvalidOption { field, value }) => {
                assert_eq!(field, "video_resolution");
                assert_eq!(value, "9000p");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn destination_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        let builder = JobBuilder::new(&options_in(&nested)).unwrap();
        assert!(nested.is_dir());
        assert_eq!(builder.destination(), nested.as_path());
    }

    #[test]
    fn file_as_destination_is_path_error() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("file.txt");
        fs::write(&file, b"x").unwrap();

        let err = JobBuilder::new(&options_in(&file)).unwrap_err();
        assert!(matches!(err, BuildError::Path { .. }));
    }

    #[test]
    fn video_target_uses_video_options() {
        let tmp = tempfile::tempdir().unwrap();
        let mut options = options_in(tmp.path());
        options.media_kind = "video".to_string();
        options.video_resolution = "720p".to_string();

        let job = build("youtube.com/watch?v=abc", &options).unwrap();
        assert_eq!(job.url(), "https://youtube.com/watch?v=abc");
        assert!(matches!(
            job.target(),
            MediaTarget::Video {
                resolution: VideoResolution::P720,
                ..
            }
        ));
    }

    #[test]
    fn ids_are_fresh() {
        let tmp = tempfile::tempdir().unwrap();
        let builder = JobBuilder::new(&options_in(tmp.path())).unwrap();
        let a = builder.build("https://youtu.be/abc").unwrap();
        let b = builder.build("https://youtu.be/abc").unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn listing_limit_respects_ceiling() {
        let tmp = tempfile::tempdir().unwrap();
        let mut options = options_in(tmp.path());
        options.playlist_limit = 0;
        assert_eq!(JobBuilder::new(&options).unwrap().listing_limit(), 500);
        options.playlist_limit = 3;
        assert_eq!(JobBuilder::new(&options).unwrap().listing_limit(), 3);
    }

    #[test]
    fn validate_options_leaves_disk_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("not-yet");
        let mut options = options_in(&dest);
        assert!(validate_options(&options).is_ok());
        assert!(!dest.exists());

        options.subtitles = true;
        options.subtitle_lang = "  ".to_string();
        assert!(matches!(
            validate_options(&options),
            Err(BuildError::InvalidOption {
                field: "subtitle_lang",
                ..
            })
        ));
    }

    #[test]
    fn short_on_disk_space_is_path_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mut options = options_in(tmp.path());
        options.min_free_mb = u64::MAX;

        match JobBuilder::new(&options) {
            Err(BuildError::Path { reason, .. }) => {
                assert!(reason.starts_with("insufficient disk space"), "{}", reason)
            }
            other => panic!("expected a disk space error, got {:?}", other),
        }
    }

    #[test]
    fn url_is_checked_before_options() {
        let tmp = tempfile::tempdir().unwrap();
        let mut options = options_in(tmp.path());
        options.audio_format = "mp5".to_string();

        assert_eq!(build("  ", &options).unwrap_err(), BuildError::EmptyUrl);
        assert!(matches!(
            build("https://tidal.com/track/1", &options),
            Err(BuildError::BlockedPlatform { .. })
        ));
        assert!(matches!(
            build("https://youtu.be/abc", &options),
            Err(BuildError::InvalidOption {
                field: "audio_format",
                ..
            })
        ));
    }

    #[test]
    fn free_build_expands_collection_urls() {
        let tmp = tempfile::tempdir().unwrap();
        let job = build(
            "https://www.youtube.com/playlist?list=PL1",
            &options_in(tmp.path()),
        )
        .unwrap();
        assert!(job.expand_playlist());
    }
}
