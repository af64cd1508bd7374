// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Links, bare URLs and custom emoji in text the inline rules left behind.
//!
//! Each stage only sees what the previous stage did not consume, so a URL is
//! turned into a node at most once and link labels are never scanned again.

use super::preprocess::restore_escapes;
use super::{MarkupNode, Scope};
use crate::cdn::is_sticker_url;
use once_cell::sync::Lazy;
use regex::Regex;

/// Emoji image size requested from the CDN.
const EMOJI_SIZE: u32 = 96;

static MARKDOWN_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"\[([^\]]+)\]\(\s*",
        r"(?:<\s*(https?://[^>\s\x{E000}-\x{E002}]+)\s*>|(https?://[^\s)\x{E000}-\x{E002}]+))",
        r"\s*\)",
    ))
    .expect("markdown link regex")
});

static BARE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<\s*(https?://[^>\s\x{E000}-\x{E002}]+)\s*>|(https?://[^\s)<\x{E000}-\x{E002}]+)")
        .expect("bare url regex")
});

static EMOJI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(a)?:([^:>\s]+):(\d+)>").expect("emoji regex"));

/// Converts `text` into link, image, emoji and text nodes.
pub(super) fn push_text(nodes: &mut Vec<MarkupNode>, text: &str, scope: &Scope<'_, '_>) {
    let mut last = 0;
    for caps in MARKDOWN_LINK.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        push_urls(nodes, &text[last..whole.start()], scope);
        let url = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
        nodes.push(MarkupNode::Link {
            label: restore_escapes(&caps[1]),
            url: restore_escapes(url),
        });
        last = whole.end();
    }
    push_urls(nodes, &text[last..], scope);
}

fn push_urls(nodes: &mut Vec<MarkupNode>, text: &str, scope: &Scope<'_, '_>) {
    let mut last = 0;
    for caps in BARE_URL.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        push_emoji(nodes, &text[last..whole.start()], scope);
        let url = restore_escapes(caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str()));
        nodes.push(if is_sticker_url(&url) {
            MarkupNode::StickerImage { url }
        } else {
            MarkupNode::BareLink { url }
        });
        last = whole.end();
    }
    push_emoji(nodes, &text[last..], scope);
}

fn push_emoji(nodes: &mut Vec<MarkupNode>, text: &str, scope: &Scope<'_, '_>) {
    let mut last = 0;
    for caps in EMOJI.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        push_plain(nodes, &text[last..whole.start()]);
        let animated = caps.get(1).is_some();
        let id = &caps[3];
        nodes.push(MarkupNode::Emoji {
            id: id.to_owned(),
            name: caps[2].to_owned(),
            animated,
            url: scope.ctx.cdn.emoji_url(id, animated, EMOJI_SIZE),
        });
        last = whole.end();
    }
    push_plain(nodes, &text[last..]);
}

/// Appends literal text, merging with a preceding text node.
fn push_plain(nodes: &mut Vec<MarkupNode>, text: &str) {
    if text.is_empty() {
        return;
    }
    let text = restore_escapes(text);
    if let Some(MarkupNode::Text(previous)) = nodes.last_mut() {
        previous.push_str(&text);
    } else {
        nodes.push(MarkupNode::Text(text));
    }
}

#[cfg(test)]
mod tests {
    use crate::markup::tests::{render, text};
    use crate::markup::{MarkupNode, plain_text};
    use crate::resolver::UNKNOWN_USER;

    #[test]
    fn markdown_links() {
        assert_eq!(
            render("read [the docs](https://example.com/docs) first"),
            vec![
                text("read "),
                MarkupNode::Link {
                    label: "the docs".into(),
                    url: "https://example.com/docs".into(),
                },
                text(" first"),
            ]
        );
    }

    #[test]
    fn angle_bracket_link_targets() {
        assert_eq!(
            render("[x](< https://example.com/a >)"),
            vec![MarkupNode::Link {
                label: "x".into(),
                url: "https://example.com/a".into(),
            }]
        );
    }

    #[test]
    fn bare_urls() {
        assert_eq!(
            render("go to <https://example.com/> now"),
            vec![
                text("go to "),
                MarkupNode::BareLink {
                    url: "https://example.com/".into()
                },
                text(" now"),
            ]
        );
    }

    #[test]
    fn sticker_urls_become_images() {
        assert_eq!(
            render("https://media.discordapp.net/stickers/123.png"),
            vec![MarkupNode::StickerImage {
                url: "https://media.discordapp.net/stickers/123.png".into()
            }]
        );
    }

    #[test]
    fn link_labels_are_not_relinked() {
        let nodes = render("[https://a.example](https://b.example)");
        assert_eq!(
            nodes,
            vec![MarkupNode::Link {
                label: "https://a.example".into(),
                url: "https://b.example".into(),
            }]
        );
    }

    #[test]
    fn each_url_becomes_one_node() {
        let nodes = render("https://a.example and https://a.example");
        let links = nodes
            .iter()
            .filter(|n| matches!(n, MarkupNode::BareLink { .. }))
            .count();
        assert_eq!(links, 2);
        assert_eq!(nodes.len(), 3);
    }

    #[test]
    fn mentions_in_link_labels_show_names() {
        assert_eq!(
            render("[<@42>](https://example.com)"),
            vec![MarkupNode::Link {
                label: "@Alice".into(),
                url: "https://example.com".into(),
            }]
        );
    }

    #[test]
    fn mentions_after_bare_urls_resolve() {
        assert_eq!(
            render("https://example.com/<@42>"),
            vec![
                MarkupNode::BareLink {
                    url: "https://example.com/".into()
                },
                MarkupNode::UserRef {
                    name: "Alice".into()
                },
            ]
        );

        let nodes = render("https://example.com/<@999999> [<@999999>](https://a.example)");
        assert!(!plain_text(&nodes).contains("999999"), "{nodes:?}");
        assert!(nodes.contains(&MarkupNode::UserRef {
            name: UNKNOWN_USER.into()
        }));
    }

    #[test]
    fn custom_emoji() {
        assert_eq!(
            render("hi <:wave:123> <a:dance_party:456>"),
            vec![
                text("hi "),
                MarkupNode::Emoji {
                    id: "123".into(),
                    name: "wave".into(),
                    animated: false,
                    url: "https://cdn.discordapp.com/emojis/123.webp?size=96&animated=false".into(),
                },
                text(" "),
                MarkupNode::Emoji {
                    id: "456".into(),
                    name: "dance_party".into(),
                    animated: true,
                    url: "https://cdn.discordapp.com/emojis/456.gif?size=96&animated=true".into(),
                },
            ]
        );
    }

    #[test]
    fn malformed_emoji_is_text() {
        assert_eq!(render("<:broken:abc>"), vec![text("<:broken:abc>")]);
    }
}
