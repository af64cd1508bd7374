// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! The chat markup dialect and its document tree.
//!
//! Message text goes through three stages:
//!
//! 1. [`fence`](crate::fence) splits it into plain text and fenced code.
//! 2. Preprocessing replaces timestamp and mention tokens with markers,
//!    normalizes a few HTML tags, protects backslash escapes and removes the
//!    common indent.
//! 3. Each line is classified (quote, heading, small text, list item, plain)
//!    and its content is handed to the inline rule table ([`RULES`]), which
//!    hands residual text to the link and emoji inliner.
//!
//! Nothing here fails: malformed markup is kept as literal text and
//! unresolved references render fixed placeholders.
//!
//! # Example
//!
//! ```
//! use dc2html::cdn::DiscordCdn;
//! use dc2html::highlight::PlainHighlighter;
//! use dc2html::markup::{MarkupNode, RenderContext, render_message_content};
//! use dc2html::resolver::{Resolver, ResolverTables};
//!
//! let tables = ResolverTables::default();
//! let resolver = Resolver::new(&tables);
//! let cdn = DiscordCdn::default();
//! let ctx = RenderContext::new(&resolver, &cdn, &PlainHighlighter);
//!
//! let nodes = render_message_content("**hi**", &ctx);
//! assert_eq!(nodes, vec![MarkupNode::Bold(vec![MarkupNode::Text("hi".into())])]);
//! ```

mod inline;
mod links;
mod preprocess;

pub use inline::{RULES, Rule};

use crate::cdn::CdnUrls;
use crate::fence::{Segment, split_fences};
use crate::highlight::Highlighter;
use crate::resolver::Resolver;
use crate::timestamp::{TimestampStyle, local_offset};
use chrono::{DateTime, FixedOffset, Utc};
use once_cell::sync::Lazy;
use preprocess::Marker;
use regex::Regex;
use serde::Serialize;

/// A node of the rendered markup tree.
///
/// The tree is finite and acyclic. A `Quote` never contains another `Quote`,
/// and link leaves are never scanned again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum MarkupNode {
    /// Literal text.
    Text(String),
    /// A hard line break between lines.
    LineBreak,
    /// `**x**`
    Bold(Vec<MarkupNode>),
    /// `*x*` or `_x_`
    Italic(Vec<MarkupNode>),
    /// `***x***`
    BoldItalic(Vec<MarkupNode>),
    /// `__x__`
    Underline(Vec<MarkupNode>),
    /// `**__x__**` or `__**x**__`
    BoldUnderline(Vec<MarkupNode>),
    /// `~~x~~`
    Strike(Vec<MarkupNode>),
    /// `` `x` ``
    InlineCode(String),
    /// `||x||`
    Spoiler(Vec<MarkupNode>),
    /// A custom emoji image.
    Emoji {
        /// Emoji id.
        id: String,
        /// Emoji name, used as alt text.
        name: String,
        /// Whether the emoji is animated.
        animated: bool,
        /// Image URL.
        url: String,
    },
    /// A `<t:SECONDS:STYLE>` timestamp.
    Timestamp {
        /// Seconds since the Unix epoch.
        unix: i64,
        /// Display style.
        style: TimestampStyle,
        /// Text shown inline.
        display: String,
        /// Full date and time for the tooltip.
        full: String,
    },
    /// A `</name:id>` slash command reference.
    CommandRef {
        /// Command name, possibly with subcommands.
        name: String,
    },
    /// A user mention.
    UserRef {
        /// Resolved display name or the unknown-user placeholder.
        name: String,
    },
    /// A role mention.
    RoleRef {
        /// Resolved role name or the unknown-role placeholder.
        name: String,
        /// Role colour as `#rrggbb`.
        color: Option<String>,
    },
    /// A channel mention or channel permalink.
    ChannelRef {
        /// Resolved channel name or the unknown-channel placeholder.
        name: String,
        /// The referenced channel id.
        channel_id: String,
    },
    /// `[label](url)`
    Link {
        /// Visible label.
        label: String,
        /// Target URL.
        url: String,
    },
    /// A bare URL.
    BareLink {
        /// Target URL.
        url: String,
    },
    /// A sticker URL shown as an image.
    StickerImage {
        /// Image URL.
        url: String,
    },
    /// `# x` through `###### x`
    Heading {
        /// Heading level, 1 to 6.
        level: u8,
        /// Heading content.
        children: Vec<MarkupNode>,
    },
    /// `- x`
    ListItem(Vec<MarkupNode>),
    /// A run of `> x` lines.
    Quote {
        /// One entry per quoted line.
        lines: Vec<Vec<MarkupNode>>,
    },
    /// `-# x`
    SmallText(Vec<MarkupNode>),
    /// A fenced code block.
    CodeBlock {
        /// The raw code.
        code: String,
        /// The language tag, if any.
        lang: Option<String>,
        /// Highlighted and escaped HTML.
        highlighted: String,
    },
}

/// Everything markup rendering needs besides the text itself.
#[derive(Clone, Copy)]
pub struct RenderContext<'a> {
    /// Mention lookup.
    pub resolver: &'a Resolver<'a>,
    /// Emoji and sticker URLs.
    pub cdn: &'a dyn CdnUrls,
    /// Code block highlighting.
    pub highlighter: &'a dyn Highlighter,
    /// Reference point for relative timestamps.
    pub now: DateTime<Utc>,
    /// Offset used for absolute timestamps.
    pub offset: FixedOffset,
}

impl std::fmt::Debug for RenderContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("resolver", &self.resolver)
            .field("now", &self.now)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

impl<'a> RenderContext<'a> {
    /// Creates a context using the current time and the local offset.
    #[must_use]
    pub fn new(
        resolver: &'a Resolver<'a>,
        cdn: &'a dyn CdnUrls,
        highlighter: &'a dyn Highlighter,
    ) -> Self {
        Self {
            resolver,
            cdn,
            highlighter,
            now: Utc::now(),
            offset: local_offset(),
        }
    }

    /// Replaces the reference time.
    #[must_use]
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Replaces the display offset.
    #[must_use]
    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }
}

/// Renders one message's raw text into a markup tree.
#[must_use]
pub fn render_message_content(raw: &str, ctx: &RenderContext<'_>) -> Vec<MarkupNode> {
    let segments = split_fences(raw);
    let mut nodes = Vec::new();

    for (i, segment) in segments.iter().enumerate() {
        match segment {
            Segment::Text(text) => {
                let mut text = *text;
                // The line ending next to a fence belongs to the block layout.
                if i > 0 && matches!(segments[i - 1], Segment::Code(_)) {
                    text = text
                        .strip_prefix("\r\n")
                        .or_else(|| text.strip_prefix('\n'))
                        .unwrap_or(text);
                }
                if matches!(segments.get(i + 1), Some(Segment::Code(_))) {
                    text = text
                        .strip_suffix("\r\n")
                        .or_else(|| text.strip_suffix('\n'))
                        .unwrap_or(text);
                }
                if !text.is_empty() {
                    nodes.extend(parse_text(text, ctx));
                }
            }
            Segment::Code(fence) => nodes.push(MarkupNode::CodeBlock {
                code: fence.code.to_owned(),
                lang: fence.lang.map(str::to_owned),
                highlighted: ctx.highlighter.highlight(fence.code, fence.lang),
            }),
        }
    }

    nodes
}

/// Shared state for one text segment.
struct Scope<'s, 'a> {
    ctx: &'s RenderContext<'a>,
    markers: &'s [Marker],
}

static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.+)$").expect("heading regex"));

/// Parses a fence-free text segment line by line.
fn parse_text(text: &str, ctx: &RenderContext<'_>) -> Vec<MarkupNode> {
    let prepared = preprocess::prepare(text, ctx);
    let scope = Scope {
        ctx,
        markers: &prepared.markers,
    };

    let lines: Vec<&str> = prepared.text.split('\n').collect();
    let mut nodes = Vec::new();
    let mut quote: Vec<Vec<MarkupNode>> = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let is_last = i + 1 == lines.len();
        let line = line.strip_suffix('\r').unwrap_or(line).trim_start();

        if let Some(rest) = line.strip_prefix('>') {
            let rest = rest
                .strip_prefix(|c: char| c.is_whitespace())
                .unwrap_or(rest);
            quote.push(parse_block_line(rest, &scope).0);
            continue;
        }
        if !quote.is_empty() {
            nodes.push(MarkupNode::Quote {
                lines: std::mem::take(&mut quote),
            });
        }

        let (line_nodes, needs_break) = parse_block_line(line, &scope);
        nodes.extend(line_nodes);
        if needs_break && !is_last {
            nodes.push(MarkupNode::LineBreak);
        }
    }

    if !quote.is_empty() {
        nodes.push(MarkupNode::Quote { lines: quote });
    }

    nodes
}

/// Classifies one quote-free line. The flag says whether a line break
/// should follow it.
fn parse_block_line(line: &str, scope: &Scope<'_, '_>) -> (Vec<MarkupNode>, bool) {
    if let Some(caps) = HEADING.captures(line) {
        #[allow(clippy::cast_possible_truncation)]
        let level = caps[1].len() as u8;
        return (
            vec![MarkupNode::Heading {
                level,
                children: inline::parse_inline(&caps[2], scope),
            }],
            false,
        );
    }
    if let Some(rest) = line.strip_prefix("-#") {
        let rest = rest.strip_prefix(' ').unwrap_or(rest);
        return (
            vec![MarkupNode::SmallText(inline::parse_inline(rest, scope))],
            true,
        );
    }
    if let Some(rest) = line.strip_prefix("- ") {
        return (
            vec![MarkupNode::ListItem(inline::parse_inline(rest, scope))],
            false,
        );
    }
    (inline::parse_inline(line, scope), true)
}

/// Collects the visible text of a node list, for previews and alt text.
#[must_use]
pub fn plain_text(nodes: &[MarkupNode]) -> String {
    let mut out = String::new();
    collect_text(nodes, &mut out);
    out
}

fn collect_text(nodes: &[MarkupNode], out: &mut String) {
    for node in nodes {
        match node {
            MarkupNode::Text(t) | MarkupNode::InlineCode(t) => out.push_str(t),
            MarkupNode::LineBreak => out.push('\n'),
            MarkupNode::Bold(c)
            | MarkupNode::Italic(c)
            | MarkupNode::BoldItalic(c)
            | MarkupNode::Underline(c)
            | MarkupNode::BoldUnderline(c)
            | MarkupNode::Strike(c)
            | MarkupNode::Spoiler(c)
            | MarkupNode::ListItem(c)
            | MarkupNode::SmallText(c)
            | MarkupNode::Heading { children: c, .. } => collect_text(c, out),
            MarkupNode::Quote { lines } => {
                for line in lines {
                    collect_text(line, out);
                    out.push('\n');
                }
            }
            MarkupNode::Emoji { name, .. } => {
                out.push(':');
                out.push_str(name);
                out.push(':');
            }
            MarkupNode::Timestamp { display, .. } => out.push_str(display),
            MarkupNode::CommandRef { name } => {
                out.push('/');
                out.push_str(name);
            }
            MarkupNode::UserRef { name } | MarkupNode::RoleRef { name, .. } => {
                out.push('@');
                out.push_str(name);
            }
            MarkupNode::ChannelRef { name, .. } => {
                out.push('#');
                out.push_str(name);
            }
            MarkupNode::Link { label, .. } => out.push_str(label),
            MarkupNode::BareLink { url } => out.push_str(url),
            MarkupNode::StickerImage { .. } => {}
            MarkupNode::CodeBlock { code, .. } => out.push_str(code),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cdn::DiscordCdn;
    use crate::highlight::PlainHighlighter;
    use crate::resolver::{ChannelInfo, ResolverTables, RoleInfo, UserInfo};
    use chrono::TimeZone;

    pub(crate) fn tables() -> ResolverTables {
        let mut t = ResolverTables::default();
        t.users.insert(
            "42".into(),
            UserInfo {
                display_name: Some("Alice".into()),
                ..UserInfo::default()
            },
        );
        t.roles.insert(
            "7".into(),
            RoleInfo {
                name: "Mods".into(),
                color: Some("#ff0000".into()),
            },
        );
        t.channels.insert(
            "300".into(),
            ChannelInfo {
                name: Some("rules".into()),
                guild_id: "1".into(),
            },
        );
        t
    }

    /// Renders with fixed time, UTC and plain highlighting.
    pub(crate) fn render_with(raw: &str, tables: &ResolverTables) -> Vec<MarkupNode> {
        let resolver = Resolver::new(tables);
        let cdn = DiscordCdn::default();
        let ctx = RenderContext::new(&resolver, &cdn, &PlainHighlighter)
            .with_now(Utc.timestamp_opt(1_733_415_630, 0).unwrap())
            .with_offset(FixedOffset::east_opt(0).unwrap());
        render_message_content(raw, &ctx)
    }

    pub(crate) fn render(raw: &str) -> Vec<MarkupNode> {
        render_with(raw, &tables())
    }

    pub(crate) fn text(s: &str) -> MarkupNode {
        MarkupNode::Text(s.into())
    }

    #[test]
    fn plain_lines_are_separated_by_breaks() {
        assert_eq!(
            render("one\ntwo"),
            vec![text("one"), MarkupNode::LineBreak, text("two")]
        );
    }

    #[test]
    fn consecutive_quote_lines_form_one_quote() {
        assert_eq!(
            render("> a\n>b\nafter"),
            vec![
                MarkupNode::Quote {
                    lines: vec![vec![text("a")], vec![text("b")]],
                },
                text("after"),
            ]
        );
    }

    #[test]
    fn quotes_do_not_nest() {
        let nodes = render("> > inner");
        let MarkupNode::Quote { lines } = &nodes[0] else {
            panic!("Expected Quote, got {nodes:?}");
        };
        assert_eq!(lines, &vec![vec![text("> inner")]]);
    }

    #[test]
    fn headings() {
        assert_eq!(
            render("## Title"),
            vec![MarkupNode::Heading {
                level: 2,
                children: vec![text("Title")],
            }]
        );
        // No space after the hashes: not a heading.
        assert_eq!(render("#tag"), vec![text("#tag")]);
        assert_eq!(render("####### seven")[0], text("####### seven"));
    }

    #[test]
    fn small_text_and_list_items() {
        assert_eq!(
            render("-# fine print\n- item"),
            vec![
                MarkupNode::SmallText(vec![text("fine print")]),
                MarkupNode::LineBreak,
                MarkupNode::ListItem(vec![text("item")]),
            ]
        );
    }

    #[test]
    fn common_indent_is_removed() {
        assert_eq!(
            render("    > quoted\n    # Head"),
            vec![
                MarkupNode::Quote {
                    lines: vec![vec![text("quoted")]],
                },
                MarkupNode::Heading {
                    level: 1,
                    children: vec![text("Head")],
                },
            ]
        );
    }

    #[test]
    fn code_fences_become_code_blocks() {
        assert_eq!(
            render("look:\n```rust\nlet x = 1 < 2;\n```\ndone"),
            vec![
                text("look:"),
                MarkupNode::CodeBlock {
                    code: "let x = 1 < 2;".into(),
                    lang: Some("rust".into()),
                    highlighted: "let x = 1 &lt; 2;".into(),
                },
                text("done"),
            ]
        );
    }

    #[test]
    fn markup_inside_fences_is_not_parsed() {
        let nodes = render("```\n**not bold** <@42>\n```");
        assert_eq!(
            nodes,
            vec![MarkupNode::CodeBlock {
                code: "**not bold** <@42>".into(),
                lang: None,
                highlighted: "**not bold** &lt;@42&gt;".into(),
            }]
        );
    }

    #[test]
    fn unterminated_fence_stays_literal() {
        assert_eq!(render("```rust"), vec![text("```rust")]);
    }

    #[test]
    fn plain_text_flattens_tree() {
        let nodes = render("**hi** <@42> in <#300>");
        assert_eq!(plain_text(&nodes), "hi @Alice in #rules");
    }

    #[test]
    fn tree_serializes_with_type_tags() {
        let json = serde_json::to_value(render("**a**")).unwrap();
        assert_eq!(json[0]["type"], "Bold");
        assert_eq!(json[0]["data"][0]["type"], "Text");
        assert_eq!(json[0]["data"][0]["data"], "a");
    }
}
