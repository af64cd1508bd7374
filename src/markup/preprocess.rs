// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Text rewriting that runs before line classification.
//!
//! Timestamps and mentions are swapped for private-use markers that index a
//! side table of finished nodes, so later stages can never re-parse them.
//! Backslash escapes become private-use stand-ins that no rule matches and
//! that are turned back into their characters on output.

use super::{MarkupNode, RenderContext, plain_text};
use crate::resolver::{Resolver, UNKNOWN_CHANNEL, UNKNOWN_ROLE, UNKNOWN_USER};
use crate::timestamp::{TimestampStyle, format_full, format_timestamp};
use chrono::DateTime;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Opens a timestamp marker.
pub(super) const TIMESTAMP_OPEN: char = '\u{E000}';
/// Closes any marker.
pub(super) const MARKER_CLOSE: char = '\u{E001}';
/// Opens a mention marker.
pub(super) const MENTION_OPEN: char = '\u{E002}';

/// First stand-in code point; the stand-in for `ESCAPABLE[i]` is `ESCAPE_BASE + i`.
const ESCAPE_BASE: u32 = 0xE100;
const ESCAPABLE: [char; 9] = ['*', '_', '~', '`', '\\', '|', '>', '#', '-'];

/// A finished node waiting in the side table.
#[derive(Debug, Clone)]
pub(super) struct Marker {
    pub node: MarkupNode,
    /// The token the marker replaced.
    pub source: String,
}

/// A text segment ready for line classification.
#[derive(Debug)]
pub(super) struct Prepared {
    pub text: String,
    pub markers: Vec<Marker>,
}

static TIMESTAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<t:(-?\d{1,13})(?::([tTdDfFR]))?>").expect("timestamp regex"));

static MENTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"<@!?(?P<user>\d+)>",
        r"|<@&(?P<role>\d+)>",
        r"|<#(?P<channel>\d+)>",
        r"|https?://(?:(?:ptb|canary)\.)?discord(?:app)?\.com/channels/(?:\d+|@me)/(?P<link>\d+)(?:/\d+)?",
    ))
    .expect("mention regex")
});

static HTML_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<\s*/?\s*(br|strong|b|u|em|i|s)\s*/?\s*>").expect("html tag regex")
});

/// Runs every preprocessing step in order.
pub(super) fn prepare(text: &str, ctx: &RenderContext<'_>) -> Prepared {
    let mut markers = Vec::new();
    let text = strip_invisible(text);
    let text = replace_timestamps(&text, ctx, &mut markers);
    let text = replace_mentions(&text, ctx.resolver, &mut markers);
    let text = normalize_html_tags(&text);
    let text = protect_escapes(&text);
    let text = strip_common_indent(&text);
    Prepared { text, markers }
}

/// Removes zero-width formatting characters and anything in the private use
/// area, which is reserved for markers and stand-ins.
///
/// The zero-width joiner is kept because emoji sequences depend on it.
fn strip_invisible(text: &str) -> String {
    text.chars()
        .filter(|&c| {
            !matches!(
                c,
                '\u{200B}' | '\u{200C}' | '\u{200E}' | '\u{200F}' | '\u{2060}' | '\u{FEFF}'
                    | '\u{00AD}' | '\u{E000}'..='\u{F8FF}'
            )
        })
        .collect()
}

fn push_marker(markers: &mut Vec<Marker>, open: char, node: MarkupNode, source: &str) -> String {
    let index = markers.len();
    markers.push(Marker {
        node,
        source: source.to_owned(),
    });
    format!("{open}{index}{MARKER_CLOSE}")
}

fn replace_timestamps(text: &str, ctx: &RenderContext<'_>, markers: &mut Vec<Marker>) -> String {
    TIMESTAMP
        .replace_all(text, |caps: &Captures<'_>| {
            let source = &caps[0];
            let style = caps
                .get(2)
                .and_then(|m| m.as_str().chars().next())
                .and_then(TimestampStyle::from_char)
                .unwrap_or_default();
            let Ok(unix) = caps[1].parse::<i64>() else {
                return source.to_owned();
            };
            let Some(display) = format_timestamp(unix, style, ctx.now, ctx.offset) else {
                return source.to_owned();
            };
            let full = DateTime::from_timestamp(unix, 0)
                .map(|dt| format_full(dt, ctx.offset))
                .unwrap_or_default();
            let node = MarkupNode::Timestamp {
                unix,
                style,
                display,
                full,
            };
            push_marker(markers, TIMESTAMP_OPEN, node, source)
        })
        .into_owned()
}

fn replace_mentions(text: &str, resolver: &Resolver<'_>, markers: &mut Vec<Marker>) -> String {
    MENTION
        .replace_all(text, |caps: &Captures<'_>| {
            let whole = &caps[0];
            let node = if let Some(id) = caps.name("user") {
                MarkupNode::UserRef {
                    name: resolver
                        .resolve_user(id.as_str())
                        .unwrap_or(UNKNOWN_USER)
                        .to_owned(),
                }
            } else if let Some(id) = caps.name("role") {
                match resolver.resolve_role(id.as_str()) {
                    Some(role) => MarkupNode::RoleRef {
                        name: role.name,
                        color: role.color,
                    },
                    None => MarkupNode::RoleRef {
                        name: UNKNOWN_ROLE.to_owned(),
                        color: None,
                    },
                }
            } else if let Some(id) = caps.name("channel").or_else(|| caps.name("link")) {
                if caps.name("link").is_some() && is_link_target(text, caps) {
                    return whole.to_owned();
                }
                MarkupNode::ChannelRef {
                    name: resolver
                        .resolve_channel(id.as_str())
                        .unwrap_or(UNKNOWN_CHANNEL)
                        .to_owned(),
                    channel_id: id.as_str().to_owned(),
                }
            } else {
                return whole.to_owned();
            };
            push_marker(markers, MENTION_OPEN, node, whole)
        })
        .into_owned()
}

/// Permalinks written as `(url)` or `<url>` belong to link syntax and stay
/// untouched.
fn is_link_target(text: &str, caps: &Captures<'_>) -> bool {
    caps.get(0)
        .is_some_and(|m| text[..m.start()].ends_with(['(', '<']))
}

fn normalize_html_tags(text: &str) -> String {
    HTML_TAG
        .replace_all(text, |caps: &Captures<'_>| {
            let replacement = match caps[1].to_ascii_lowercase().as_str() {
                "br" => "\n",
                "strong" | "b" => "**",
                "u" => "__",
                "em" | "i" => "*",
                "s" => "~~",
                _ => "",
            };
            replacement.to_owned()
        })
        .into_owned()
}

/// Replaces `\x` for markup punctuation `x` with the stand-in for `x`.
fn protect_escapes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\'
            && let Some(stand_in) = chars.peek().copied().and_then(stand_in_for)
        {
            out.push(stand_in);
            chars.next();
        } else {
            out.push(c);
        }
    }
    out
}

fn stand_in_for(c: char) -> Option<char> {
    let index = ESCAPABLE.iter().position(|&e| e == c)?;
    u32::try_from(index)
        .ok()
        .and_then(|i| char::from_u32(ESCAPE_BASE + i))
}

fn escaped_char(c: char) -> Option<char> {
    let index = u32::from(c).checked_sub(ESCAPE_BASE)?;
    ESCAPABLE.get(usize::try_from(index).ok()?).copied()
}

fn strip_common_indent(text: &str) -> String {
    let is_indent = |c: &char| *c == ' ' || *c == '\t';
    let indent = text
        .split('\n')
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.chars().take_while(is_indent).count())
        .min()
        .unwrap_or(0);
    if indent == 0 {
        return text.to_owned();
    }

    text.split('\n')
        .map(|line| {
            let skip: usize = line
                .chars()
                .take(indent)
                .take_while(is_indent)
                .map(char::len_utf8)
                .sum();
            &line[skip..]
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Turns stand-ins back into the characters they protect.
pub(super) fn restore_escapes(text: &str) -> String {
    text.chars()
        .map(|c| escaped_char(c).unwrap_or(c))
        .collect()
}

/// Rebuilds the source text: markers become their original tokens and
/// stand-ins regain their backslash. Used where markup is shown verbatim.
pub(super) fn restore_source(text: &str, markers: &[Marker]) -> String {
    let mut out = String::with_capacity(text.len());
    for_each_piece(text, markers, |piece| match piece {
        Piece::Char(c) => match escaped_char(c) {
            Some(e) => {
                out.push('\\');
                out.push(e);
            }
            None => out.push(c),
        },
        Piece::Marker(m) => out.push_str(&m.source),
    });
    out
}

/// Replaces markers with the text their nodes display (`@Alice`, a
/// formatted date) but leaves stand-ins alone. Used for link labels, which
/// hold plain text only.
pub(super) fn display_markers(text: &str, markers: &[Marker]) -> String {
    let mut out = String::with_capacity(text.len());
    for_each_piece(text, markers, |piece| match piece {
        Piece::Char(c) => out.push(c),
        Piece::Marker(m) => out.push_str(&plain_text(std::slice::from_ref(&m.node))),
    });
    out
}

enum Piece<'m> {
    Char(char),
    Marker(&'m Marker),
}

/// Walks `text`, decoding well-formed markers. Malformed markers are dropped.
fn for_each_piece<'m>(text: &str, markers: &'m [Marker], mut f: impl FnMut(Piece<'m>)) {
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != TIMESTAMP_OPEN && c != MENTION_OPEN {
            f(Piece::Char(c));
            continue;
        }
        let digits: String = chars.by_ref().take_while(|&d| d != MARKER_CLOSE).collect();
        if let Some(marker) = digits.parse::<usize>().ok().and_then(|i| markers.get(i)) {
            f(Piece::Marker(marker));
        }
    }
}

/// Looks up the node behind a marker index.
pub(super) fn marker_node(markers: &[Marker], index: &str) -> Option<MarkupNode> {
    index
        .parse::<usize>()
        .ok()
        .and_then(|i| markers.get(i))
        .map(|m| m.node.clone())
}
