// Platform classification - pure URL pattern matching, no I/O
//
// Every input classifies: strings that are not URLs simply match nothing
// and fall through to the generic platform.

use std::fmt;

use url::Url;

/// Known source platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    YouTube,
    Facebook,
    Instagram,
    TikTok,
    Twitter,
    SoundCloud,
    Vimeo,
    Dailymotion,
    Bilibili,
    Twitch,
    Reddit,
    Pinterest,
    LinkedIn,
    Bandcamp,
    // DRM-restricted
    Spotify,
    AppleMusic,
    AmazonMusic,
    Tidal,
    Deezer,
    /// Anything unrecognised; attempted with default behavior
    Generic,
}

impl Platform {
    pub fn name(&self) -> &'static str {
        match self {
            Self::YouTube => "YouTube",
            Self::Facebook => "Facebook",
            Self::Instagram => "Instagram",
            Self::TikTok => "TikTok",
            Self::Twitter => "Twitter",
            Self::SoundCloud => "SoundCloud",
            Self::Vimeo => "Vimeo",
            Self::Dailymotion => "Dailymotion",
            Self::Bilibili => "Bilibili",
            Self::Twitch => "Twitch",
            Self::Reddit => "Reddit",
            Self::Pinterest => "Pinterest",
            Self::LinkedIn => "LinkedIn",
            Self::Bandcamp => "Bandcamp",
            Self::Spotify => "Spotify",
            Self::AppleMusic => "Apple Music",
            Self::AmazonMusic => "Amazon Music",
            Self::Tidal => "Tidal",
            Self::Deezer => "Deezer",
            Self::Generic => "Generic",
        }
    }

    /// Streams are DRM-encrypted; downloading is refused
    pub fn is_drm(&self) -> bool {
        matches!(
            self,
            Self::Spotify | Self::AppleMusic | Self::AmazonMusic | Self::Tidal | Self::Deezer
        )
    }

    /// Returns 403 under the engine's default identity and must be fetched
    /// while impersonating a browser client
    pub fn needs_impersonation(&self) -> bool {
        matches!(self, Self::TikTok)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed DRM deny-list
pub const DRM_DOMAINS: &[(&str, Platform)] = &[
    ("spotify.com", Platform::Spotify),
    ("music.apple.com", Platform::AppleMusic),
    ("music.amazon.com", Platform::AmazonMusic),
    ("tidal.com", Platform::Tidal),
    ("deezer.com", Platform::Deezer),
];

pub const SUPPORTED_DOMAINS: &[(&str, Platform)] = &[
    ("youtube.com", Platform::YouTube),
    ("youtu.be", Platform::YouTube),
    ("facebook.com", Platform::Facebook),
    ("fb.watch", Platform::Facebook),
    ("instagram.com", Platform::Instagram),
    ("tiktok.com", Platform::TikTok),
    ("twitter.com", Platform::Twitter),
    ("x.com", Platform::Twitter),
    ("soundcloud.com", Platform::SoundCloud),
    ("vimeo.com", Platform::Vimeo),
    ("dailymotion.com", Platform::Dailymotion),
    ("bilibili.com", Platform::Bilibili),
    ("twitch.tv", Platform::Twitch),
    ("reddit.com", Platform::Reddit),
    ("pinterest.com", Platform::Pinterest),
    ("linkedin.com", Platform::LinkedIn),
    ("bandcamp.com", Platform::Bandcamp),
];

/// Result of classifying a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformVerdict {
    pub platform: Platform,
    pub allowed: bool,
    pub needs_special_path: bool,
}

impl PlatformVerdict {
    fn for_platform(platform: Platform) -> Self {
        Self {
            platform,
            allowed: !platform.is_drm(),
            needs_special_path: platform.needs_impersonation(),
        }
    }
}

/// Classify a URL. The deny-list is checked first, by host and then by
/// substring over the whole input, so an odd scheme or a trailing-dot host
/// can never get a DRM source past it.
pub fn classify(url: &str) -> PlatformVerdict {
    let lower = url.to_lowercase();
    let host = host_of(url);

    let platform = host
        .as_deref()
        .and_then(|h| match_host(h, DRM_DOMAINS))
        .or_else(|| match_substring(&lower, DRM_DOMAINS))
        .or_else(|| match host.as_deref() {
            Some(h) => match_host(h, SUPPORTED_DOMAINS),
            None => match_substring(&lower, SUPPORTED_DOMAINS),
        });

    PlatformVerdict::for_platform(platform.unwrap_or(Platform::Generic))
}

/// Whether the URL points at a playlist, set or album rather than a single item
pub fn is_collection_url(url: &str) -> bool {
    let lower = url.to_lowercase();

    if lower.contains("playlist?list=") || lower.contains("/playlist/") {
        return true;
    }
    if lower.contains("music.youtube.com") && lower.contains("list=") {
        return true;
    }
    if lower.contains("soundcloud.com") && lower.contains("/sets/") {
        return true;
    }
    if lower.contains("bandcamp.com") && lower.contains("/album/") {
        return true;
    }
    false
}

/// Trim and add a scheme when the user pasted a bare host/path. Input that
/// already names a scheme is left alone.
pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

fn host_of(url: &str) -> Option<String> {
    let candidate = normalize_url(url);
    let parsed = Url::parse(&candidate).ok()?;
    parsed
        .host_str()
        .map(|h| h.trim_end_matches('.').to_lowercase())
}

fn match_host(host: &str, table: &[(&str, Platform)]) -> Option<Platform> {
    table
        .iter()
        .find(|(domain, _)| host == *domain || host.ends_with(&format!(".{}", domain)))
        .map(|(_, platform)| *platform)
}

fn match_substring(lower: &str, table: &[(&str, Platform)]) -> Option<Platform> {
    table
        .iter()
        .find(|(domain, _)| lower.contains(domain))
        .map(|(_, platform)| *platform)
}
