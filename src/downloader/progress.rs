// yt-dlp output line parsing
//
// Recognises the `--newline` progress lines and post-processor tags and
// tracks the final output path (last destination seen wins).

use std::path::PathBuf;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // [download]  12.5% of ~ 310.04MiB at  374.36KiB/s ETA 11:59 (frag 56/454)
    // [download] 100% of    3.50MiB in 00:00:01 at 2.51MiB/s
    static ref PROGRESS_RE: Regex = Regex::new(
        r"^\[download\]\s+(\d+(?:\.\d+)?)%(?:\s+of\s+~?\s*(\d+(?:\.\d+)?)\s*([KMGT]?i?B))?(?:.*?\s+at\s+(\S+/s))?(?:\s+ETA\s+(\S+))?"
    ).unwrap();
    static ref DEST_RE: Regex = Regex::new(r"^\[download\]\s+Destination:\s+(.+)$").unwrap();
    static ref ALREADY_RE: Regex =
        Regex::new(r"^\[download\]\s+(.+?) has already been downloaded").unwrap();
    static ref MERGE_RE: Regex =
        Regex::new(r#"^\[Merger\]\s+Merging formats into\s+"(.+)"$"#).unwrap();
    static ref EXTRACT_RE: Regex =
        Regex::new(r"^\[ExtractAudio\]\s+Destination:\s+(.+)$").unwrap();
    static ref REMUX_RE: Regex =
        Regex::new(r"^\[VideoRemuxer\]\s+.*?Destination:\s+(.+)$").unwrap();
    static ref POSTPROCESS_RE: Regex = Regex::new(
        r"^\[(ExtractAudio|Merger|VideoRemuxer|VideoConvertor|ffmpeg|EmbedThumbnail|ThumbnailsConvertor|Metadata|EmbedSubtitle|SponsorBlock|ModifyChapters|FixupM3u8|FixupM4a)\]\s*(.*)$"
    ).unwrap();
}

/// One meaningful line of engine output
#[derive(Debug, Clone, PartialEq)]
pub enum EngineLine {
    /// Fetch progress of the current stream
    Progress {
        percent: f32,
        total_bytes: Option<u64>,
        speed: Option<String>,
        eta: Option<String>,
    },
    /// A new stream started writing to this file
    Destination(PathBuf),
    /// File already on disk; nothing fetched
    AlreadyDownloaded(PathBuf),
    /// Post-processing step; `output` is set when the step names its result file
    Converting {
        step: String,
        message: String,
        output: Option<PathBuf>,
    },
}

impl EngineLine {
    /// Output file named by this line, if any
    pub fn output_path(&self) -> Option<&PathBuf> {
        match self {
            Self::Destination(path) | Self::AlreadyDownloaded(path) => Some(path),
            Self::Converting { output, .. } => output.as_ref(),
            Self::Progress { .. } => None,
        }
    }
}

/// Parse one stdout line
pub fn parse_line(line: &str) -> Option<EngineLine> {
    let line = line.trim();

    if let Some(caps) = PROGRESS_RE.captures(line) {
        let percent: f32 = caps.get(1)?.as_str().parse().ok()?;
        let total_bytes = match (caps.get(2), caps.get(3)) {
            (Some(value), Some(unit)) => parse_size(value.as_str(), unit.as_str()),
            _ => None,
        };
        return Some(EngineLine::Progress {
            percent,
            total_bytes,
            speed: caps.get(4).map(|m| m.as_str().to_string()),
            eta: caps.get(5).map(|m| m.as_str().to_string()),
        });
    }

    if let Some(caps) = DEST_RE.captures(line) {
        return Some(EngineLine::Destination(PathBuf::from(caps[1].trim())));
    }

    if let Some(caps) = ALREADY_RE.captures(line) {
        return Some(EngineLine::AlreadyDownloaded(PathBuf::from(caps[1].trim())));
    }

    if let Some(caps) = POSTPROCESS_RE.captures(line) {
        let step = caps[1].to_string();
        let message = caps[2].trim().to_string();
        let output = MERGE_RE
            .captures(line)
            .or_else(|| EXTRACT_RE.captures(line))
            .or_else(|| REMUX_RE.captures(line))
            .map(|c| PathBuf::from(c[1].trim()));
        return Some(EngineLine::Converting {
            step,
            message,
            output,
        });
    }

    None
}

/// "310.04" + "MiB" -> bytes
pub fn parse_size(value: &str, unit: &str) -> Option<u64> {
    let value: f64 = value.parse().ok()?;
    let multiplier: f64 = match unit {
        "B" => 1.0,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        _ => return None,
    };
    Some((value * multiplier) as u64)
}

/// Short status text for a progress line
pub fn describe_progress(percent: f32, speed: Option<&str>, eta: Option<&str>) -> String {
    match (speed, eta) {
        (Some(speed), Some(eta)) => format!("{:.1}% @ {} ETA {}", percent, speed, eta),
        (Some(speed), None) => format!("{:.1}% @ {}", percent, speed),
        _ => format!("{:.1}%", percent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fragment_progress() {
        let line = "[download]  12.5% of ~ 310.04MiB at  374.36KiB/s ETA 11:59 (frag 56/454)";
        match parse_line(line) {
            Some(EngineLine::Progress {
                percent,
                total_bytes,
                speed,
                eta,
            }) => {
                assert_eq!(percent, 12.5);
                assert_eq!(total_bytes, Some((310.04 * 1024.0 * 1024.0) as u64));
                assert_eq!(speed.as_deref(), Some("374.36KiB/s"));
                assert_eq!(eta.as_deref(), Some("11:59"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_final_progress_line() {
        let line = "[download] 100% of    3.50MiB in 00:00:01 at 2.51MiB/s";
        match parse_line(line) {
            Some(EngineLine::Progress { percent, .. }) => assert_eq!(percent, 100.0),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn destination_and_already_downloaded() {
        assert_eq!(
            parse_line("[download] Destination: /music/Song.webm"),
            Some(EngineLine::Destination(PathBuf::from("/music/Song.webm")))
        );
        assert_eq!(
            parse_line("[download] /music/Song.mp3 has already been downloaded"),
            Some(EngineLine::AlreadyDownloaded(PathBuf::from("/music/Song.mp3")))
        );
    }

    #[test]
    fn post_processing_lines_carry_output() {
        let merged = parse_line(r#"[Merger] Merging formats into "/video/Clip.mp4""#).unwrap();
        assert_eq!(merged.output_path(), Some(&PathBuf::from("/video/Clip.mp4")));

        let extracted = parse_line("[ExtractAudio] Destination: /music/Song.mp3").unwrap();
        assert_eq!(extracted.output_path(), Some(&PathBuf::from("/music/Song.mp3")));

        let remuxed = parse_line(
            "[VideoRemuxer] Remuxing video from mkv to ts; Destination: /video/Clip.ts",
        )
        .unwrap();
        assert_eq!(remuxed.output_path(), Some(&PathBuf::from("/video/Clip.ts")));

        let thumb = parse_line("[EmbedThumbnail] ffmpeg: Adding thumbnail to \"x.mp3\"").unwrap();
        assert!(matches!(thumb, EngineLine::Converting { ref step, .. } if step == "EmbedThumbnail"));
        assert_eq!(thumb.output_path(), None);
    }

    #[test]
    fn ignores_noise() {
        assert_eq!(parse_line("[youtube] dQw4w9WgXcQ: Downloading webpage"), None);
        assert_eq!(parse_line(""), None);
    }

    #[test]
    fn size_units() {
        assert_eq!(parse_size("1", "KiB"), Some(1024));
        assert_eq!(parse_size("2", "MB"), Some(2_000_000));
        assert_eq!(parse_size("1", "parsecs"), None);
    }
}
