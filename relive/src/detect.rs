//! Stream URL classification.
//!
//! Pure pattern matching: no I/O, no failure mode. Platforms are tried in a
//! fixed priority order and the first matching pattern wins; anything
//! unrecognized falls back to [`PlatformKind::Other`] with no identifier.

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::{PlatformKind, StreamSource};

static YOUTUBE_WATCH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:https?://)?(?:www\.)?youtube\.com/watch\?v=([^&?/]+)").unwrap()
});
static YOUTUBE_LIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:https?://)?(?:www\.)?youtube\.com/live/([^?/]+)").unwrap());
static YOUTUBE_SHORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:https?://)?youtu\.be/([^?/]+)").unwrap());

static FACEBOOK_VIDEO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:https?://)?(?:www\.)?facebook\.com/[^/]+/videos/(\d+)").unwrap()
});
static FACEBOOK_WATCH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:https?://)?(?:www\.)?facebook\.com/watch/?(?:\?v=(\d+)|live/?\?v=(\d+))")
        .unwrap()
});

static TWITCH_CHANNEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:https?://)?(?:www\.)?twitch\.tv/([A-Za-z0-9_]+)$").unwrap());

struct PlatformPatterns {
    kind: PlatformKind,
    patterns: &'static [&'static LazyLock<Regex>],
}

// Priority order: YouTube, Facebook, Twitch.
static PLATFORMS: &[PlatformPatterns] = &[
    PlatformPatterns {
        kind: PlatformKind::Youtube,
        patterns: &[&YOUTUBE_WATCH, &YOUTUBE_LIVE, &YOUTUBE_SHORT],
    },
    PlatformPatterns {
        kind: PlatformKind::Facebook,
        patterns: &[&FACEBOOK_VIDEO, &FACEBOOK_WATCH],
    },
    PlatformPatterns {
        kind: PlatformKind::Twitch,
        patterns: &[&TWITCH_CHANNEL],
    },
];

/// Classify a raw URL into a [`StreamSource`].
///
/// Always returns a value; `title`/`embed_url` stay empty and `is_live`
/// stays `false` until validation.
pub fn detect(url: &str) -> StreamSource {
    for platform in PLATFORMS {
        for pattern in platform.patterns {
            if let Some(captures) = pattern.captures(url) {
                // Alternation patterns capture the id in different groups;
                // take the first one that participated in the match.
                let external_id = captures
                    .iter()
                    .skip(1)
                    .flatten()
                    .next()
                    .map(|m| m.as_str().to_string());
                return StreamSource::detected(url, platform.kind, external_id);
            }
        }
    }

    StreamSource::detected(url, PlatformKind::Other, None)
}
