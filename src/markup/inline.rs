// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! The inline grammar as an ordered rule table.
//!
//! At each step every rule searches from the current position; the match
//! that starts leftmost wins and ties go to the rule listed first in
//! [`RULES`]. Text between matches goes to the link inliner. Emphasis
//! content is parsed again with the full grammar.

use super::preprocess::{MARKER_CLOSE, MENTION_OPEN, TIMESTAMP_OPEN};
use super::preprocess::{display_markers, marker_node, restore_source};
use super::{MarkupNode, Scope, links};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// One inline grammar rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// `` `code` `` or ``` ``code`` ```
    InlineCode,
    /// Markdown links and URLs, passed to the link inliner untouched.
    LinkGuard,
    /// `<a:name:id>` emoji tokens, passed to the link inliner untouched.
    EmojiGuard,
    /// `||spoiler||`
    Spoiler,
    /// `~~strike~~`
    Strike,
    /// `***bold italic***`
    BoldItalic,
    /// `**bold**`
    Bold,
    /// A timestamp marker left by preprocessing.
    TimestampMarker,
    /// `__underline__`
    Underline,
    /// `*italic*`
    ItalicStar,
    /// `_italic_` at word boundaries.
    ItalicUnderscore,
    /// `</name:id>`
    SlashCommand,
    /// A mention marker left by preprocessing.
    MentionMarker,
}

/// Rules in priority order.
pub const RULES: [Rule; 13] = [
    Rule::InlineCode,
    Rule::LinkGuard,
    Rule::EmojiGuard,
    Rule::Spoiler,
    Rule::Strike,
    Rule::BoldItalic,
    Rule::Bold,
    Rule::TimestampMarker,
    Rule::Underline,
    Rule::ItalicStar,
    Rule::ItalicUnderscore,
    Rule::SlashCommand,
    Rule::MentionMarker,
];

impl Rule {
    fn pattern(self) -> String {
        match self {
            Self::InlineCode => r"``([^`].*?)``|`([^`]+)`".to_owned(),
            Self::LinkGuard => concat!(
                r"\[[^\]]+\]\(\s*(?:<\s*https?://[^>\s\x{E000}-\x{E002}]+\s*>|https?://[^\s)\x{E000}-\x{E002}]+)\s*\)",
                r"|<\s*https?://[^>\s\x{E000}-\x{E002}]+\s*>",
                r"|https?://[^\s)<\x{E000}-\x{E002}]+",
            )
            .to_owned(),
            Self::EmojiGuard => r"<a?:[^:>\s]+:\d+>".to_owned(),
            Self::Spoiler => r"\|\|(.+?)\|\|".to_owned(),
            Self::Strike => r"~~(.+?)~~".to_owned(),
            Self::BoldItalic => r"\*\*\*(.+?)\*\*\*".to_owned(),
            Self::Bold => r"\*\*(.+?)\*\*".to_owned(),
            Self::TimestampMarker => format!(r"{TIMESTAMP_OPEN}(\d+){MARKER_CLOSE}"),
            Self::Underline => r"__(.+?)__".to_owned(),
            Self::ItalicStar => r"\*([^\s*](?:[^*]*[^\s*])?)\*".to_owned(),
            Self::ItalicUnderscore => r"\b_([^_]+)_\b".to_owned(),
            Self::SlashCommand => r"</([\w-]+(?: [\w-]+){0,2}):\d+>".to_owned(),
            Self::MentionMarker => format!(r"{MENTION_OPEN}(\d+){MARKER_CLOSE}"),
        }
    }
}

static PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    RULES
        .iter()
        .map(|rule| Regex::new(&rule.pattern()).expect("inline rule regex"))
        .collect()
});

/// Parses one line (or emphasis body) into inline nodes.
pub(super) fn parse_inline(text: &str, scope: &Scope<'_, '_>) -> Vec<MarkupNode> {
    let patterns = &*PATTERNS;
    let mut nodes = Vec::new();
    // Per rule: not searched yet, no further match, or the next match.
    let mut next: [Option<Option<(usize, usize)>>; RULES.len()] = [None; RULES.len()];
    let mut pos = 0;

    while pos < text.len() {
        let mut best: Option<(usize, usize)> = None;
        for (i, regex) in patterns.iter().enumerate() {
            let found = match next[i] {
                Some(Some((start, end))) if start >= pos => Some((start, end)),
                Some(None) => None,
                _ => {
                    let m = regex.find_at(text, pos).map(|m| (m.start(), m.end()));
                    next[i] = Some(m);
                    m
                }
            };
            if let Some((start, _)) = found
                && best.is_none_or(|(best_start, _)| start < best_start)
            {
                best = Some((start, i));
            }
        }

        let Some((start, rule_index)) = best else {
            break;
        };
        let Some(caps) = patterns[rule_index].captures_at(text, start) else {
            break;
        };
        let end = caps.get(0).map_or(text.len(), |m| m.end());

        links::push_text(&mut nodes, &text[pos..start], scope);
        apply_rule(RULES[rule_index], &caps, scope, &mut nodes);
        pos = end.max(start + 1);
    }

    if pos < text.len() {
        links::push_text(&mut nodes, &text[pos..], scope);
    }
    nodes
}

fn apply_rule(rule: Rule, caps: &Captures<'_>, scope: &Scope<'_, '_>, nodes: &mut Vec<MarkupNode>) {
    let whole = caps.get(0).map_or("", |m| m.as_str());
    let inner = || caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());

    let node = match rule {
        Rule::InlineCode => MarkupNode::InlineCode(restore_source(inner(), scope.markers)),
        Rule::LinkGuard | Rule::EmojiGuard => {
            links::push_text(nodes, &display_markers(whole, scope.markers), scope);
            return;
        }
        Rule::Spoiler => MarkupNode::Spoiler(parse_inline(inner(), scope)),
        Rule::Strike => MarkupNode::Strike(parse_inline(inner(), scope)),
        Rule::BoldItalic => MarkupNode::BoldItalic(parse_inline(inner(), scope)),
        Rule::Bold => bold(parse_inline(inner(), scope)),
        Rule::Underline => underline(parse_inline(inner(), scope)),
        Rule::ItalicStar | Rule::ItalicUnderscore => {
            MarkupNode::Italic(parse_inline(inner(), scope))
        }
        Rule::SlashCommand => MarkupNode::CommandRef {
            name: inner().to_owned(),
        },
        Rule::TimestampMarker | Rule::MentionMarker => {
            if let Some(node) = marker_node(scope.markers, inner()) {
                nodes.push(node);
            }
            return;
        }
    };
    nodes.push(node);
}

/// `Bold[Underline[x]]` collapses to `BoldUnderline[x]`.
fn bold(children: Vec<MarkupNode>) -> MarkupNode {
    match <[MarkupNode; 1]>::try_from(children) {
        Ok([MarkupNode::Underline(inner)]) => MarkupNode::BoldUnderline(inner),
        Ok([only]) => MarkupNode::Bold(vec![only]),
        Err(children) => MarkupNode::Bold(children),
    }
}

/// `Underline[Bold[x]]` collapses to `BoldUnderline[x]`.
fn underline(children: Vec<MarkupNode>) -> MarkupNode {
    match <[MarkupNode; 1]>::try_from(children) {
        Ok([MarkupNode::Bold(inner)]) => MarkupNode::BoldUnderline(inner),
        Ok([only]) => MarkupNode::Underline(vec![only]),
        Err(children) => MarkupNode::Underline(children),
    }
}
