//! Stream source classification.

use serde::{Deserialize, Serialize};

/// Platform a stream URL belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformKind {
    Youtube,
    Twitch,
    Facebook,
    /// Anything not recognized as a known platform (direct HLS/RTMP etc.).
    #[default]
    Other,
}

impl PlatformKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Youtube => "youtube",
            Self::Twitch => "twitch",
            Self::Facebook => "facebook",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "youtube" => Some(Self::Youtube),
            "twitch" => Some(Self::Twitch),
            "facebook" => Some(Self::Facebook),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A classified stream source. Immutable once validation has filled in
/// `title`/`embed_url` and flipped `is_live`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSource {
    pub url: String,
    pub platform: PlatformKind,
    /// Stable platform identifier (video id, channel name) when one could
    /// be extracted from the URL.
    pub external_id: Option<String>,
    pub title: Option<String>,
    pub embed_url: Option<String>,
    pub is_live: bool,
}

impl StreamSource {
    /// A freshly detected source: classification only, nothing validated.
    pub fn detected(
        url: impl Into<String>,
        platform: PlatformKind,
        external_id: Option<String>,
    ) -> Self {
        Self {
            url: url.into(),
            platform,
            external_id,
            title: None,
            embed_url: None,
            is_live: false,
        }
    }

    /// Browser-embeddable player URL for this source, when the platform
    /// supports one. `twitch_parent` is the domain serving the Twitch
    /// player iframe.
    pub fn embed_link(&self, twitch_parent: &str) -> Option<String> {
        match self.platform {
            PlatformKind::Youtube => self
                .external_id
                .as_deref()
                .map(|id| format!("https://www.youtube.com/embed/{id}?autoplay=1")),
            PlatformKind::Twitch => self.external_id.as_deref().map(|channel| {
                format!("https://player.twitch.tv/?channel={channel}&parent={twitch_parent}")
            }),
            PlatformKind::Facebook => Some(self.url.clone()),
            PlatformKind::Other => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_round_trip() {
        for kind in [
            PlatformKind::Youtube,
            PlatformKind::Twitch,
            PlatformKind::Facebook,
            PlatformKind::Other,
        ] {
            assert_eq!(PlatformKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(PlatformKind::parse("vimeo"), None);
    }

    #[test]
    fn test_embed_link_per_platform() {
        let youtube = StreamSource::detected(
            "https://www.youtube.com/watch?v=abc",
            PlatformKind::Youtube,
            Some("abc".to_string()),
        );
        assert_eq!(
            youtube.embed_link("localhost").as_deref(),
            Some("https://www.youtube.com/embed/abc?autoplay=1")
        );

        let twitch = StreamSource::detected(
            "https://twitch.tv/chan",
            PlatformKind::Twitch,
            Some("chan".to_string()),
        );
        assert_eq!(
            twitch.embed_link("example.org").as_deref(),
            Some("https://player.twitch.tv/?channel=chan&parent=example.org")
        );

        let other = StreamSource::detected("https://example.com/a.m3u8", PlatformKind::Other, None);
        assert_eq!(other.embed_link("localhost"), None);
    }
}
