// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! URL construction for emoji, avatars and stickers.
//!
//! Rendering never performs network I/O; it only asks a [`CdnUrls`]
//! implementation for the URL string to embed. Callers that mirror assets
//! locally can supply their own implementation.

/// Default base for emoji and avatar assets.
pub const DEFAULT_CDN_BASE: &str = "https://cdn.discordapp.com";
/// Default base for sticker assets.
pub const DEFAULT_MEDIA_BASE: &str = "https://media.discordapp.net";

/// Builds asset URLs for the renderer.
pub trait CdnUrls {
    /// URL of a custom emoji image.
    fn emoji_url(&self, id: &str, animated: bool, size: u32) -> String;

    /// URL of a user's avatar. `hash` is `None` for users without one.
    fn avatar_url(&self, user_id: &str, hash: Option<&str>) -> String;

    /// URL of a sticker image.
    fn sticker_url(&self, id: &str, size: u32) -> String;
}

/// [`CdnUrls`] targeting the platform CDN or a configured mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscordCdn {
    /// Base for emoji and avatars, without a trailing slash.
    pub cdn_base: String,
    /// Base for stickers, without a trailing slash.
    pub media_base: String,
}

impl Default for DiscordCdn {
    fn default() -> Self {
        Self {
            cdn_base: DEFAULT_CDN_BASE.to_owned(),
            media_base: DEFAULT_MEDIA_BASE.to_owned(),
        }
    }
}

impl DiscordCdn {
    /// Creates a builder with custom bases; trailing slashes are removed.
    #[must_use]
    pub fn new(cdn_base: &str, media_base: &str) -> Self {
        Self {
            cdn_base: cdn_base.trim_end_matches('/').to_owned(),
            media_base: media_base.trim_end_matches('/').to_owned(),
        }
    }
}

impl CdnUrls for DiscordCdn {
    fn emoji_url(&self, id: &str, animated: bool, size: u32) -> String {
        let ext = if animated { "gif" } else { "webp" };
        format!(
            "{}/emojis/{id}.{ext}?size={size}&animated={animated}",
            self.cdn_base
        )
    }

    fn avatar_url(&self, user_id: &str, hash: Option<&str>) -> String {
        let Some(hash) = hash.map(str::trim).filter(|h| !h.is_empty()) else {
            // Users without an avatar get one of six stock images.
            let index = user_id.trim().parse::<u64>().map_or(0, |id| (id >> 22) % 6);
            return format!("{}/embed/avatars/{index}.png", self.cdn_base);
        };

        if is_prebuilt_url(hash) {
            return hash.to_owned();
        }

        let ext = if hash.starts_with("a_") { "gif" } else { "png" };
        format!(
            "{}/avatars/{}/{hash}.{ext}?size=128",
            self.cdn_base,
            user_id.trim()
        )
    }

    fn sticker_url(&self, id: &str, size: u32) -> String {
        format!(
            "{}/stickers/{id}.webp?size={size}&quality=lossless",
            self.media_base
        )
    }
}

/// Returns `true` when an avatar value is already a URL or a local path.
fn is_prebuilt_url(value: &str) -> bool {
    value.starts_with("http://")
        || value.starts_with("https://")
        || value.starts_with('/')
        || value.starts_with("./")
        || value.starts_with("../")
        || value.starts_with("data:")
}

/// Returns `true` for URLs that point at a sticker asset.
#[must_use]
pub fn is_sticker_url(url: &str) -> bool {
    url.contains("/stickers/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emoji_url_switches_extension() {
        let cdn = DiscordCdn::default();
        assert_eq!(
            cdn.emoji_url("42", false, 96),
            "https://cdn.discordapp.com/emojis/42.webp?size=96&animated=false"
        );
        assert_eq!(
            cdn.emoji_url("42", true, 96),
            "https://cdn.discordapp.com/emojis/42.gif?size=96&animated=true"
        );
    }

    #[test]
    fn avatar_url_from_hash() {
        let cdn = DiscordCdn::default();
        assert_eq!(
            cdn.avatar_url("5", Some("abc")),
            "https://cdn.discordapp.com/avatars/5/abc.png?size=128"
        );
        assert_eq!(
            cdn.avatar_url("5", Some("a_abc")),
            "https://cdn.discordapp.com/avatars/5/a_abc.gif?size=128"
        );
    }

    #[test]
    fn avatar_url_passes_through_urls() {
        let cdn = DiscordCdn::default();
        assert_eq!(
            cdn.avatar_url("5", Some("./assets/avatar.png")),
            "./assets/avatar.png"
        );
        assert_eq!(
            cdn.avatar_url("5", Some("https://example.com/a.png")),
            "https://example.com/a.png"
        );
    }

    #[test]
    fn avatar_url_without_hash_uses_stock_image() {
        let cdn = DiscordCdn::default();
        let url = cdn.avatar_url("80351110224678912", None);
        assert!(url.starts_with("https://cdn.discordapp.com/embed/avatars/"));
        assert!(url.ends_with(".png"));
        assert_eq!(
            cdn.avatar_url("x", Some("")),
            "https://cdn.discordapp.com/embed/avatars/0.png"
        );
    }

    #[test]
    fn custom_bases_drop_trailing_slash() {
        let cdn = DiscordCdn::new("https://mirror.test/", "https://media.test//");
        assert_eq!(
            cdn.sticker_url("9", 160),
            "https://media.test/stickers/9.webp?size=160&quality=lossless"
        );
        assert!(cdn.emoji_url("1", false, 48).starts_with("https://mirror.test/emojis/"));
    }

    #[test]
    fn detects_sticker_urls() {
        assert!(is_sticker_url("https://media.discordapp.net/stickers/1.png"));
        assert!(!is_sticker_url("https://example.com/page"));
    }
}
