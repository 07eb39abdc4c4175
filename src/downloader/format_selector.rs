// FormatSelector - maps a job's media target and flags to engine arguments
//
// Handles:
// - Height-capped video format specs with best-available fallback
// - Audio extraction codec and bitrate
// - Merge vs remux for the requested container
// - Subtitles, SponsorBlock, thumbnail and metadata post-processing

use super::models::{AudioFormat, AudioQuality, JobDescriptor, MediaTarget, VideoResolution};

/// Segments removed when SponsorBlock is enabled
pub const SPONSORBLOCK_CATEGORIES: &str = "sponsor,intro,outro,selfpromo,preview,filler";

pub struct FormatSelector;

impl FormatSelector {
    /// yt-dlp format spec for a video resolution cap
    pub fn format_spec(resolution: VideoResolution) -> String {
        match resolution.max_height() {
            Some(h) => format!("bestvideo[height<={h}]+bestaudio/best[height<={h}]"),
            None => "bestvideo+bestaudio/best".to_string(),
        }
    }

    /// Codec name the converter expects for an audio format
    pub fn audio_codec(format: AudioFormat) -> &'static str {
        match format {
            AudioFormat::Ogg => "vorbis",
            AudioFormat::Wma => "wmav2",
            AudioFormat::Webm => "opus",
            other => other.as_str(),
        }
    }

    /// `--audio-quality` value; `None` for lossless containers
    pub fn audio_quality(format: AudioFormat, quality: AudioQuality) -> Option<String> {
        if format.is_lossless() {
            return None;
        }
        match quality {
            AudioQuality::Lossless => Some("0".to_string()),
            q => Some(format!("{}K", q.as_str())),
        }
    }

    /// Thumbnail embedding fails the whole run for other output types
    pub fn can_embed_thumbnail(target: &MediaTarget) -> bool {
        match *target {
            MediaTarget::Audio { format, .. } => format.supports_thumbnail_embed(),
            MediaTarget::Video { container, .. } => container.supports_thumbnail_embed(),
        }
    }

    /// All format and post-processing arguments for a job
    pub fn engine_args(job: &JobDescriptor) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();

        match *job.target() {
            MediaTarget::Audio { format, quality } => {
                args.extend(["-f", "bestaudio/best", "-x", "--audio-format"].map(String::from));
                args.push(Self::audio_codec(format).to_string());
                if let Some(q) = Self::audio_quality(format, quality) {
                    args.push("--audio-quality".to_string());
                    args.push(q);
                }
            }
            MediaTarget::Video {
                resolution,
                container,
            } => {
                args.push("-f".to_string());
                args.push(Self::format_spec(resolution));
                if container.is_mergeable() {
                    args.push("--merge-output-format".to_string());
                } else {
                    args.push("--remux-video".to_string());
                }
                args.push(container.as_str().to_string());
            }
        }

        let flags = job.flags();

        // Subtitles only make sense for video
        if let (Some(subs), MediaTarget::Video { .. }) = (&flags.subtitles, job.target()) {
            args.extend(["--write-subs", "--write-auto-subs", "--sub-langs"].map(String::from));
            args.push(subs.lang.clone());
            if subs.embed {
                args.push("--embed-subs".to_string());
            }
        }

        if flags.sponsorblock {
            args.push("--sponsorblock-remove".to_string());
            args.push(SPONSORBLOCK_CATEGORIES.to_string());
        }

        if flags.embed_thumbnail && Self::can_embed_thumbnail(job.target()) {
            args.extend(["--embed-thumbnail", "--convert-thumbnails", "jpg"].map(String::from));
        }

        if flags.embed_metadata {
            args.push("--embed-metadata".to_string());
        }

        args
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::downloader::models::{MetadataFlags, SubtitleOptions, VideoContainer};
    use crate::downloader::platform::classify;

    fn job(target: MediaTarget, flags: MetadataFlags) -> JobDescriptor {
        JobDescriptor::new(
            "https://youtu.be/abc".to_string(),
            classify("https://youtu.be/abc"),
            target,
            PathBuf::from("/tmp/out"),
            false,
            flags,
            None,
        )
    }

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn test_format_spec() {
        assert_eq!(
            FormatSelector::format_spec(VideoResolution::P720),
            "bestvideo[height<=720]+bestaudio/best[height<=720]"
        );
        assert_eq!(
            FormatSelector::format_spec(VideoResolution::Best),
            "bestvideo+bestaudio/best"
        );
    }

    #[test]
    fn test_audio_args() {
        let args = FormatSelector::engine_args(&job(
            MediaTarget::Audio {
                format: AudioFormat::Ogg,
                quality: AudioQuality::Kbps192,
            },
            MetadataFlags::default(),
        ));
        assert!(args.contains(&"-x".to_string()));
        assert!(has_pair(&args, "--audio-format", "vorbis"));
        assert!(has_pair(&args, "--audio-quality", "192K"));
    }

    #[test]
    fn test_lossless_has_no_bitrate() {
        let args = FormatSelector::engine_args(&job(
            MediaTarget::Audio {
                format: AudioFormat::Flac,
                quality: AudioQuality::Kbps320,
            },
            MetadataFlags::default(),
        ));
        assert!(!args.contains(&"--audio-quality".to_string()));
        assert_eq!(
            FormatSelector::audio_quality(AudioFormat::Mp3, AudioQuality::Lossless),
            Some("0".to_string())
        );
    }

    #[test]
    fn test_video_merge_and_remux() {
        let mkv = FormatSelector::engine_args(&job(
            MediaTarget::Video {
                resolution: VideoResolution::P1080,
                container: VideoContainer::Mkv,
            },
            MetadataFlags::default(),
        ));
        assert!(has_pair(&mkv, "--merge-output-format", "mkv"));

        let ts = FormatSelector::engine_args(&job(
            MediaTarget::Video {
                resolution: VideoResolution::P1080,
                container: VideoContainer::Ts,
            },
            MetadataFlags::default(),
        ));
        assert!(has_pair(&ts, "--remux-video", "ts"));
    }

    #[test]
    fn test_post_processing_flags() {
        let flags = MetadataFlags {
            embed_metadata: true,
            embed_thumbnail: true,
            subtitles: Some(SubtitleOptions {
                lang: "de".to_string(),
                embed: true,
            }),
            sponsorblock: true,
        };
        let args = FormatSelector::engine_args(&job(
            MediaTarget::Video {
                resolution: VideoResolution::P480,
                container: VideoContainer::Mp4,
            },
            flags.clone(),
        ));
        assert!(has_pair(&args, "--sub-langs", "de"));
        assert!(args.contains(&"--embed-subs".to_string()));
        assert!(has_pair(&args, "--sponsorblock-remove", SPONSORBLOCK_CATEGORIES));
        assert!(has_pair(&args, "--convert-thumbnails", "jpg"));
        assert!(args.contains(&"--embed-metadata".to_string()));

        // subtitles are ignored for audio
        let audio = FormatSelector::engine_args(&job(
            MediaTarget::Audio {
                format: AudioFormat::Mp3,
                quality: AudioQuality::Kbps320,
            },
            flags,
        ));
        assert!(!audio.contains(&"--sub-langs".to_string()));
    }

    #[test]
    fn test_thumbnail_skipped_for_unsupported_outputs() {
        let flags = MetadataFlags {
            embed_metadata: true,
            embed_thumbnail: true,
            subtitles: None,
            sponsorblock: false,
        };
        let wav = FormatSelector::engine_args(&job(
            MediaTarget::Audio {
                format: AudioFormat::Wav,
                quality: AudioQuality::Kbps320,
            },
            flags.clone(),
        ));
        assert!(!wav.contains(&"--embed-thumbnail".to_string()));
        assert!(wav.contains(&"--embed-metadata".to_string()));

        let avi = FormatSelector::engine_args(&job(
            MediaTarget::Video {
                resolution: VideoResolution::P720,
                container: VideoContainer::Avi,
            },
            flags.clone(),
        ));
        assert!(!avi.contains(&"--embed-thumbnail".to_string()));

        let mp3 = FormatSelector::engine_args(&job(
            MediaTarget::Audio {
                format: AudioFormat::Mp3,
                quality: AudioQuality::Kbps320,
            },
            flags,
        ));
        assert!(mp3.contains(&"--embed-thumbnail".to_string()));
    }
}
