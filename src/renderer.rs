// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! HTML rendering for document trees.
//!
//! This module turns the [`DocumentNode`] list produced by
//! [`crate::document::render_transcript`] into one self-contained HTML page.
//! The stylesheet is embedded, so the page needs nothing but the remote
//! images it links to.
//!
//! # Output Format
//!
//! The page contains:
//! - A channel header with name, topic, message count and export time
//! - One `<article>` per message, anchored by message id
//! - Date separators and system notices between messages
//!
//! Text and attribute values are HTML-escaped. Highlighted code is inserted
//! as the highlighter produced it (it escapes on its own). Link targets that
//! are not `http(s)` or relative are replaced with `#`.
//!
//! # Example
//!
//! ```
//! use dc2html::document::DocumentNode;
//! use dc2html::parser::Meta;
//! use dc2html::renderer::{render_page, RenderOptions, Theme};
//!
//! let document = vec![DocumentNode::DateSeparator {
//!     label: "December 5, 2024".into(),
//! }];
//! let meta = Meta {
//!     channel_name: Some("general".into()),
//!     ..Meta::default()
//! };
//! let opts = RenderOptions {
//!     theme: Theme::Light,
//!     ..RenderOptions::default()
//! };
//!
//! let html = render_page(&document, &meta, &opts);
//!
//! assert!(html.starts_with("<!DOCTYPE html>"));
//! assert!(html.contains("theme-light"));
//! assert!(html.contains("December 5, 2024"));
//! ```

use crate::assembler::Author;
use crate::document::{
    AttachmentKind, AttachmentView, ButtonStyle, DocumentNode, EmbedView, EmojiView, FileKind,
    ForwardedView, JoinNotice, MessageView, PinNotice, PollResultView, PollStatus, PollView,
    ReplyView, StickerView,
};
use crate::markup::{MarkupNode, plain_text};
use crate::parser::Meta;
use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};
use std::fmt::Write;

const STYLESHEET: &str = include_str!("../assets/transcript.css");

/// Colour scheme of the page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Theme {
    /// Dark background.
    #[default]
    Dark,
    /// Light background.
    Light,
}

impl Theme {
    /// Parses `dark` or `light`, ignoring case.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "dark" => Some(Self::Dark),
            "light" => Some(Self::Light),
            _ => None,
        }
    }

    /// The CSS class suffix.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dark => "dark",
            Self::Light => "light",
        }
    }
}

/// Configuration options for HTML rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Colour scheme.
    pub theme: Theme,

    /// Page title. Defaults to `#channel - guild`.
    pub title: Option<String>,

    /// Whether to show the channel header above the messages.
    ///
    /// Disable when embedding the transcript in another page.
    pub show_header: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            theme: Theme::Dark,
            title: None,
            show_header: true,
        }
    }
}

/// Renders a document tree as a complete HTML page.
///
/// # Arguments
///
/// * `document` - The nodes produced by [`crate::document::render_transcript`]
/// * `meta` - Channel metadata for the title and header
/// * `opts` - Configuration options controlling the output
#[must_use]
pub fn render_page(document: &[DocumentNode], meta: &Meta, opts: &RenderOptions) -> String {
    let channel = meta
        .channel_name
        .as_deref()
        .filter(|n| !n.is_empty())
        .unwrap_or(&meta.channel_id);
    let title = opts.title.clone().unwrap_or_else(|| match &meta.guild_name {
        Some(guild) if !guild.is_empty() => format!("#{channel} - {guild}"),
        _ => format!("#{channel}"),
    });

    let mut out = String::new();
    writeln!(out, "<!DOCTYPE html>").unwrap();
    writeln!(out, r#"<html lang="en" class="theme-{}">"#, opts.theme.as_str()).unwrap();
    writeln!(out, "<head>").unwrap();
    writeln!(out, r#"<meta charset="utf-8">"#).unwrap();
    writeln!(
        out,
        r#"<meta name="viewport" content="width=device-width, initial-scale=1">"#
    )
    .unwrap();
    writeln!(out, "<title>{}</title>", text(&title)).unwrap();
    writeln!(out, "<style>\n{STYLESHEET}</style>").unwrap();
    writeln!(out, "</head>").unwrap();
    writeln!(out, "<body>").unwrap();

    if opts.show_header {
        render_header(&mut out, channel, meta, document);
    }
    render_pinned_overview(&mut out, document);

    writeln!(out, r#"<main class="transcript">"#).unwrap();
    for node in document {
        render_node(&mut out, node);
    }
    writeln!(out, "</main>").unwrap();
    writeln!(out, "</body>\n</html>").unwrap();
    out
}

fn render_header(out: &mut String, channel: &str, meta: &Meta, document: &[DocumentNode]) {
    let count = document
        .iter()
        .filter(|n| !matches!(n, DocumentNode::DateSeparator { .. }))
        .count();

    writeln!(out, r#"<header class="channel-header">"#).unwrap();
    if let Some(guild) = meta.guild_name.as_deref().filter(|g| !g.is_empty()) {
        writeln!(out, r#"<div class="guild-name">{}</div>"#, text(guild)).unwrap();
    }
    writeln!(
        out,
        r#"<h1><span class="hash">#</span>{}</h1>"#,
        text(channel)
    )
    .unwrap();
    if let Some(topic) = meta.channel_topic.as_deref().filter(|t| !t.is_empty()) {
        writeln!(out, r#"<p class="topic">{}</p>"#, text(topic)).unwrap();
    }
    let plural = if count == 1 { "" } else { "s" };
    write!(out, r#"<p class="export-info">{count} message{plural}"#).unwrap();
    if let Some(generated) = meta.generated_at.as_deref() {
        write!(out, " &middot; exported {}", text(generated)).unwrap();
    }
    writeln!(out, "</p>\n</header>").unwrap();
}

/// Characters of message text shown per pinned entry.
const PIN_PREVIEW_CHARS: usize = 100;

/// Writes the panel listing pinned messages, each linking to its anchor.
/// Nothing is written when no message is pinned.
fn render_pinned_overview(out: &mut String, document: &[DocumentNode]) {
    let pinned: Vec<&MessageView> = document
        .iter()
        .filter_map(|n| match n {
            DocumentNode::Message(view) if view.pinned => Some(view.as_ref()),
            _ => None,
        })
        .collect();
    if pinned.is_empty() {
        return;
    }

    writeln!(
        out,
        r#"<section class="pinned-messages"><h2><span class="notice-icon">&#128204;</span>Pinned messages</h2>"#
    )
    .unwrap();
    out.push_str(r#"<div class="pinned-list">"#);
    for view in pinned {
        write!(
            out,
            r##"<a class="pinned-entry" href="#{}"><div class="pinned-author">"##,
            attr(&view.id)
        )
        .unwrap();
        write_author_name(out, &view.author, "author");
        write_badges(out, &view.author);
        if let Some(time) = &view.timestamp {
            write!(out, r#"<time class="timestamp">{}</time>"#, text(time)).unwrap();
        }
        let content = plain_text(&view.content);
        let preview: String = content.trim().chars().take(PIN_PREVIEW_CHARS).collect();
        let preview = if preview.is_empty() {
            "No content"
        } else {
            preview.as_str()
        };
        writeln!(
            out,
            r#"</div><div class="pinned-preview">{}</div></a>"#,
            text(preview)
        )
        .unwrap();
    }
    writeln!(out, "</div>\n</section>").unwrap();
}

fn render_node(out: &mut String, node: &DocumentNode) {
    match node {
        DocumentNode::DateSeparator { label } => {
            writeln!(
                out,
                r#"<div class="date-separator" role="separator"><span>{}</span></div>"#,
                text(label)
            )
            .unwrap();
        }
        DocumentNode::Message(view) => render_message(out, view),
        DocumentNode::JoinNotice(notice) => render_join(out, notice),
        DocumentNode::PinNotice(notice) => render_pin(out, notice),
        DocumentNode::PollResult(result) => render_poll_result(out, result),
        DocumentNode::Fallback { id, raw } => {
            writeln!(
                out,
                r#"<article class="message fallback" id="{id}" data-message-id="{id}"><div class="body"><pre class="raw">{}</pre></div></article>"#,
                text(raw),
                id = attr(id),
            )
            .unwrap();
        }
    }
}

fn render_message(out: &mut String, view: &MessageView) {
    let compact = if view.compact { " compact" } else { "" };
    writeln!(
        out,
        r#"<article class="message{compact}" id="{id}" data-message-id="{id}">"#,
        id = attr(&view.id)
    )
    .unwrap();

    out.push_str(r#"<div class="gutter">"#);
    if view.compact {
        if let Some(time) = &view.short_time {
            write!(out, r#"<span class="short-time">{}</span>"#, text(time)).unwrap();
        }
    } else {
        write!(
            out,
            r#"<img class="avatar" src="{}" alt="" loading="lazy">"#,
            attr(safe_url(&view.author.avatar_url))
        )
        .unwrap();
    }
    out.push_str("</div>\n");

    out.push_str(r#"<div class="body">"#);
    if let Some(reply) = &view.reply {
        render_reply(out, reply);
    }

    if view.compact {
        out.push_str(r#"<div class="content">"#);
        write_markup(out, &view.content);
        write_edited(out, view.edited);
        out.push_str("</div>\n");
    } else {
        if let Some(command) = &view.command {
            write!(
                out,
                r#"<div class="command-line"><img class="mini-avatar" src="{}" alt=""><span class="command-user">{}</span>"#,
                attr(safe_url(&command.avatar_url)),
                text(&command.user_name)
            )
            .unwrap();
            if let Some(display) = &command.display_name {
                write!(out, r#" <span class="command-display">{}</span>"#, text(display)).unwrap();
            }
            writeln!(
                out,
                r#" used <span class="command-name">/{}</span></div>"#,
                text(&command.command)
            )
            .unwrap();
        }

        out.push_str("<header>");
        write_author_name(out, &view.author, "author");
        write_badges(out, &view.author);
        if let Some(time) = &view.timestamp {
            write!(
                out,
                r#"<time title="{}">{}</time>"#,
                attr(view.timestamp_full.as_deref().unwrap_or(time)),
                text(time)
            )
            .unwrap();
        }
        write_edited(out, view.edited);
        if view.pinned {
            out.push_str(r#"<span class="pinned" title="Pinned">&#128204;</span>"#);
        }
        out.push_str("</header>\n");

        out.push_str(r#"<div class="content">"#);
        write_markup(out, &view.content);
        out.push_str("</div>\n");
    }

    if let Some(forwarded) = &view.forwarded {
        render_forwarded(out, forwarded);
    }
    render_media(out, &view.stickers, &view.attachments, &view.embeds);
    if let Some(poll) = &view.poll {
        render_poll(out, poll);
    }
    render_components(out, view);
    out.push_str("</div>\n</article>\n");
}

fn write_edited(out: &mut String, edited: bool) {
    if edited {
        out.push_str(r#" <span class="edited">(edited)</span>"#);
    }
}

fn write_author_name(out: &mut String, author: &Author, class: &str) {
    match &author.color {
        Some(color) => write!(
            out,
            r#"<span class="{class}" style="color:{}">{}</span>"#,
            attr(color),
            text(&author.name)
        ),
        None => write!(out, r#"<span class="{class}">{}</span>"#, text(&author.name)),
    }
    .unwrap();
}

fn write_badges(out: &mut String, author: &Author) {
    if let Some(tag) = &author.guild_tag {
        write!(out, r#"<span class="guild-tag">{}</span>"#, text(tag)).unwrap();
    }
    if author.bot {
        let check = if author.verified { "&#10003; " } else { "" };
        write!(out, r#"<span class="badge-app">{check}APP</span>"#).unwrap();
    }
}

fn render_reply(out: &mut String, reply: &ReplyView) {
    let missing = if reply.found { "" } else { " missing" };
    write!(
        out,
        r##"<a class="reply{missing}" href="#{}"><img class="mini-avatar" src="{}" alt="">"##,
        attr(&reply.id),
        attr(safe_url(&reply.author.avatar_url))
    )
    .unwrap();
    write_author_name(out, &reply.author, "reply-author");
    write_badges(out, &reply.author);
    if let Some(time) = &reply.timestamp {
        write!(out, r#"<span class="reply-time">{}</span>"#, text(time)).unwrap();
    }
    write_edited(out, reply.edited);
    out.push_str(r#"<span class="reply-content">"#);
    write_markup(out, &reply.content);
    out.push_str("</span></a>\n");
}

fn render_forwarded(out: &mut String, forwarded: &ForwardedView) {
    out.push_str(r#"<div class="forwarded"><div class="forwarded-label">&#8618; Forwarded</div>"#);
    if let Some(author) = &forwarded.author {
        write_author_name(out, author, "forwarded-author");
    }
    out.push_str(r#"<div class="content">"#);
    write_markup(out, &forwarded.content);
    out.push_str("</div>");
    render_media(
        out,
        &forwarded.stickers,
        &forwarded.attachments,
        &forwarded.embeds,
    );
    out.push_str(r#"<div class="forwarded-footer">"#);
    if let Some(channel) = &forwarded.channel_name {
        write!(out, "#{} &middot; ", text(channel)).unwrap();
    }
    if let Some(time) = &forwarded.timestamp {
        out.push_str(&text(time));
    }
    out.push_str("</div></div>\n");
}

fn render_media(
    out: &mut String,
    stickers: &[StickerView],
    attachments: &[AttachmentView],
    embeds: &[EmbedView],
) {
    for sticker in stickers {
        writeln!(
            out,
            r#"<img class="sticker" src="{}" alt="{}" title="{}" loading="lazy">"#,
            attr(safe_url(&sticker.url)),
            attr(&sticker.name),
            attr(&sticker.name)
        )
        .unwrap();
    }
    for attachment in attachments {
        render_attachment(out, attachment);
    }
    for embed in embeds {
        render_embed(out, embed);
    }
}

fn render_attachment(out: &mut String, attachment: &AttachmentView) {
    let url = attr(safe_url(&attachment.url));
    let name = text(&attachment.filename);
    let size = attachment.size.as_deref().map(text).unwrap_or_default();

    match attachment.kind {
        AttachmentKind::Image => writeln!(
            out,
            r#"<a class="attachment-image" href="{url}"><img src="{url}" alt="{}" loading="lazy"></a>"#,
            attr(&attachment.filename)
        ),
        AttachmentKind::Video => writeln!(
            out,
            r#"<div class="attachment-video"><video controls preload="metadata" src="{url}"></video><div class="file-meta">{name} <span class="file-size">{size}</span></div></div>"#
        ),
        AttachmentKind::Audio => writeln!(
            out,
            r#"<div class="attachment-audio"><div class="file-meta">{name} <span class="file-size">{size}</span></div><audio controls preload="metadata" src="{url}"></audio></div>"#
        ),
        AttachmentKind::File(kind) => {
            let kind = match kind {
                FileKind::Code => "code",
                FileKind::Document => "document",
            };
            writeln!(
                out,
                r#"<div class="attachment-file file-{kind}"><a href="{url}" download>{name}</a><span class="file-size">{size}</span></div>"#
            )
        }
    }
    .unwrap();
}

fn render_embed(out: &mut String, embed: &EmbedView) {
    match &embed.color {
        Some(color) => write!(
            out,
            r#"<div class="embed" style="border-left-color:{}">"#,
            attr(color)
        )
        .unwrap(),
        None => out.push_str(r#"<div class="embed">"#),
    }

    if let Some(author) = &embed.author {
        out.push_str(r#"<div class="embed-author">"#);
        if let Some(icon) = &author.icon_url {
            write!(out, r#"<img src="{}" alt="">"#, attr(safe_url(icon))).unwrap();
        }
        write_link_or_text(out, author.url.as_deref(), &author.name);
        out.push_str("</div>");
    }
    if let Some(title) = &embed.title {
        out.push_str(r#"<div class="embed-title">"#);
        write_link_or_text(out, embed.url.as_deref(), title);
        out.push_str("</div>");
    }
    if !embed.description.is_empty() {
        out.push_str(r#"<div class="embed-description">"#);
        write_markup(out, &embed.description);
        out.push_str("</div>");
    }
    if !embed.fields.is_empty() {
        out.push_str(r#"<div class="embed-fields">"#);
        for field in &embed.fields {
            let inline = if field.inline { " inline" } else { "" };
            write!(
                out,
                r#"<div class="embed-field{inline}"><div class="embed-field-name">{}</div><div class="embed-field-value">"#,
                text(&field.name)
            )
            .unwrap();
            write_markup(out, &field.value);
            out.push_str("</div></div>");
        }
        out.push_str("</div>");
    }
    if let Some(image) = &embed.image {
        write!(
            out,
            r#"<img class="embed-image" src="{}" alt="" loading="lazy">"#,
            attr(safe_url(image))
        )
        .unwrap();
    }
    if let Some(thumbnail) = &embed.thumbnail {
        write!(
            out,
            r#"<img class="embed-thumbnail" src="{}" alt="" loading="lazy">"#,
            attr(safe_url(thumbnail))
        )
        .unwrap();
    }
    if embed.footer.is_some() || embed.timestamp.is_some() {
        out.push_str(r#"<div class="embed-footer">"#);
        if let Some(icon) = &embed.footer_icon {
            write!(out, r#"<img src="{}" alt="">"#, attr(safe_url(icon))).unwrap();
        }
        let parts: Vec<&str> = [embed.footer.as_deref(), embed.timestamp.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        out.push_str(&text(&parts.join(" \u{2022} ")));
        out.push_str("</div>");
    }
    out.push_str("</div>\n");
}

fn write_link_or_text(out: &mut String, url: Option<&str>, label: &str) {
    match url {
        Some(url) => write!(
            out,
            r#"<a href="{}" target="_blank" rel="noopener noreferrer">{}</a>"#,
            attr(safe_url(url)),
            text(label)
        ),
        None => write!(out, "<span>{}</span>", text(label)),
    }
    .unwrap();
}

fn votes(count: u64) -> String {
    if count == 1 {
        "1 vote".to_owned()
    } else {
        format!("{count} votes")
    }
}

fn render_poll(out: &mut String, poll: &PollView) {
    out.push_str(r#"<div class="poll">"#);
    if let Some(question) = &poll.question {
        write!(out, r#"<div class="poll-question">{}</div>"#, text(question)).unwrap();
    }
    for option in &poll.options {
        let winner = if option.winner { " winner" } else { "" };
        write!(
            out,
            r#"<div class="poll-option{winner}"><div class="poll-bar" style="width:{}%"></div><span class="poll-label">{}</span><span class="poll-count">{}</span><span class="poll-percent">{}%</span></div>"#,
            option.percent,
            text(&option.label),
            votes(option.count),
            option.percent
        )
        .unwrap();
    }
    let status = match &poll.status {
        PollStatus::Closed => "Poll closed",
        PollStatus::Remaining(left) => left.as_str(),
        PollStatus::Open => "",
    };
    writeln!(
        out,
        r#"<div class="poll-footer"><span>{}</span><span>{}</span></div></div>"#,
        votes(poll.total_votes),
        text(status)
    )
    .unwrap();
}

fn render_components(out: &mut String, view: &MessageView) {
    if !view.buttons.is_empty() {
        out.push_str(r#"<div class="buttons">"#);
        for button in &view.buttons {
            let style = match button.style {
                ButtonStyle::Primary => "primary",
                ButtonStyle::Secondary => "secondary",
                ButtonStyle::Success => "success",
                ButtonStyle::Danger => "danger",
                ButtonStyle::Link => "link",
            };
            let mut inner = String::new();
            if let Some(emoji) = &button.emoji {
                write_emoji(&mut inner, emoji);
            }
            inner.push_str(&text(&button.label));

            match (&button.url, button.style) {
                (Some(url), ButtonStyle::Link) => write!(
                    out,
                    r#"<a class="button {style}" href="{}" target="_blank" rel="noopener noreferrer">{inner} &#8599;</a>"#,
                    attr(safe_url(url))
                ),
                _ => {
                    let disabled = if button.disabled { " disabled" } else { "" };
                    write!(
                        out,
                        r#"<button class="button {style}" type="button"{disabled}>{inner}</button>"#
                    )
                }
            }
            .unwrap();
        }
        out.push_str("</div>\n");
    }

    for select in &view.selects {
        write!(
            out,
            r#"<div class="select"><div class="select-placeholder">{} &#9662;</div><ul class="select-options">"#,
            text(&select.placeholder)
        )
        .unwrap();
        for option in &select.options {
            write!(out, "<li><span>{}</span>", text(&option.label)).unwrap();
            if let Some(description) = &option.description {
                write!(out, "<small>{}</small>", text(description)).unwrap();
            }
            if let Some(emoji) = &option.emoji {
                write_emoji(out, emoji);
            }
            out.push_str("</li>");
        }
        out.push_str("</ul></div>\n");
    }

    if !view.reactions.is_empty() {
        out.push_str(r#"<div class="reactions">"#);
        for reaction in &view.reactions {
            out.push_str(r#"<span class="reaction">"#);
            write_emoji(out, &reaction.emoji);
            write!(out, r#"<span class="count">{}</span></span>"#, reaction.count).unwrap();
        }
        out.push_str("</div>\n");
    }
}

fn write_emoji(out: &mut String, emoji: &EmojiView) {
    let name = emoji.name.as_deref().unwrap_or("emoji");
    match &emoji.url {
        Some(url) => write!(
            out,
            r#"<img class="emoji" src="{}" alt="{}">"#,
            attr(safe_url(url)),
            attr(name)
        ),
        None => write!(out, r#"<span class="emoji">{}</span>"#, text(name)),
    }
    .unwrap();
}

fn render_join(out: &mut String, notice: &JoinNotice) {
    write!(
        out,
        r#"<div class="system-notice join" id="{}"><span class="notice-icon">&#8594;</span><span>{}<strong>{}</strong>{}</span>"#,
        attr(&notice.id),
        text(&notice.before),
        text(&notice.author.name),
        text(&notice.after)
    )
    .unwrap();
    write_notice_time(out, notice.timestamp.as_deref());
    out.push_str("</div>\n");
}

fn render_pin(out: &mut String, notice: &PinNotice) {
    write!(
        out,
        r#"<div class="system-notice pin" id="{}"><span class="notice-icon">&#128204;</span><span>"#,
        attr(&notice.id)
    )
    .unwrap();
    write_author_name(out, &notice.author, "notice-author");
    out.push_str(" pinned ");
    match (&notice.target_id, notice.found) {
        (Some(target), true) => {
            write!(out, r##"<a href="#{}">a message</a>"##, attr(target)).unwrap();
        }
        _ => out.push_str("a message"),
    }
    out.push_str(" to this channel.</span>");
    write_notice_time(out, notice.timestamp.as_deref());
    out.push_str("</div>\n");
}

fn render_poll_result(out: &mut String, result: &PollResultView) {
    write!(
        out,
        r#"<div class="system-notice poll-result" id="{}"><span class="notice-icon">&#128202;</span><div><span>"#,
        attr(&result.id)
    )
    .unwrap();
    write_author_name(out, &result.author, "notice-author");
    out.push_str("&#39;s poll ");
    match &result.poll_message_id {
        Some(target) => write!(
            out,
            r##"<a href="#{}">{}</a>"##,
            attr(target),
            text(&result.question)
        ),
        None => write!(out, "<strong>{}</strong>", text(&result.question)),
    }
    .unwrap();
    out.push_str(" has closed.</span>");
    if let Some(ago) = &result.time_ago {
        write!(out, r#" <span class="notice-time">{}</span>"#, text(ago)).unwrap();
    }
    write!(
        out,
        r#"<div class="poll-result-card"><div class="poll-result-text">{}</div>"#,
        text(&result.result_text)
    )
    .unwrap();
    if result.tied {
        write!(
            out,
            r#"<div class="poll-result-percent">{}%</div>"#,
            result.highest_percent
        )
        .unwrap();
    }
    writeln!(
        out,
        r#"<div class="poll-result-votes">{}</div></div></div></div>"#,
        votes(result.total_votes)
    )
    .unwrap();
}

fn write_notice_time(out: &mut String, timestamp: Option<&str>) {
    if let Some(time) = timestamp {
        write!(out, r#"<time class="notice-time">{}</time>"#, text(time)).unwrap();
    }
}

/// Writes markup nodes as inline HTML.
fn write_markup(out: &mut String, nodes: &[MarkupNode]) {
    for node in nodes {
        write_node(out, node);
    }
}

fn wrap(out: &mut String, open: &str, children: &[MarkupNode], close: &str) {
    out.push_str(open);
    write_markup(out, children);
    out.push_str(close);
}

fn write_node(out: &mut String, node: &MarkupNode) {
    match node {
        MarkupNode::Text(s) => out.push_str(&text(s)),
        MarkupNode::LineBreak => out.push_str("<br>"),
        MarkupNode::Bold(c) => wrap(out, "<strong>", c, "</strong>"),
        MarkupNode::Italic(c) => wrap(out, "<em>", c, "</em>"),
        MarkupNode::BoldItalic(c) => wrap(out, "<strong><em>", c, "</em></strong>"),
        MarkupNode::Underline(c) => wrap(out, "<u>", c, "</u>"),
        MarkupNode::BoldUnderline(c) => wrap(out, "<strong><u>", c, "</u></strong>"),
        MarkupNode::Strike(c) => wrap(out, "<s>", c, "</s>"),
        MarkupNode::Spoiler(c) => wrap(out, r#"<span class="spoiler" tabindex="0">"#, c, "</span>"),
        MarkupNode::InlineCode(code) => {
            write!(out, r#"<code class="inline">{}</code>"#, text(code)).unwrap();
        }
        MarkupNode::Emoji { name, url, .. } => {
            write!(
                out,
                r#"<img class="emoji" src="{}" alt=":{name}:" title=":{name}:">"#,
                attr(safe_url(url)),
                name = attr(name)
            )
            .unwrap();
        }
        MarkupNode::Timestamp { display, full, .. } => {
            write!(
                out,
                r#"<span class="timestamp" title="{}">{}</span>"#,
                attr(full),
                text(display)
            )
            .unwrap();
        }
        MarkupNode::CommandRef { name } => {
            write!(out, r#"<span class="mention command">/{}</span>"#, text(name)).unwrap();
        }
        MarkupNode::UserRef { name } => {
            write!(out, r#"<span class="mention">@{}</span>"#, text(name)).unwrap();
        }
        MarkupNode::RoleRef { name, color } => match color {
            Some(color) => write!(
                out,
                r#"<span class="mention role" style="color:{}">@{}</span>"#,
                attr(color),
                text(name)
            ),
            None => write!(out, r#"<span class="mention role">@{}</span>"#, text(name)),
        }
        .unwrap(),
        MarkupNode::ChannelRef { name, .. } => {
            write!(out, r#"<span class="mention channel">#{}</span>"#, text(name)).unwrap();
        }
        MarkupNode::Link { label, url } => write_link_or_text(out, Some(url), label),
        MarkupNode::BareLink { url } => write_link_or_text(out, Some(url), url),
        MarkupNode::StickerImage { url } => {
            write!(
                out,
                r#"<img class="sticker" src="{}" alt="sticker" loading="lazy">"#,
                attr(safe_url(url))
            )
            .unwrap();
        }
        MarkupNode::Heading { level, children } => {
            let level = (*level).clamp(1, 6);
            wrap(out, &format!("<h{level}>"), children, &format!("</h{level}>"));
        }
        MarkupNode::ListItem(c) => wrap(out, r#"<div class="list-item">"#, c, "</div>"),
        MarkupNode::SmallText(c) => wrap(out, r#"<small class="subtext">"#, c, "</small>"),
        MarkupNode::Quote { lines } => {
            out.push_str("<blockquote>");
            for (i, line) in lines.iter().enumerate() {
                if i > 0 {
                    out.push_str("<br>");
                }
                write_markup(out, line);
            }
            out.push_str("</blockquote>");
        }
        MarkupNode::CodeBlock {
            lang, highlighted, ..
        } => {
            let lang = lang.as_deref().unwrap_or_default();
            write!(
                out,
                r#"<pre class="code-block" data-lang="{}"><code>{highlighted}</code></pre>"#,
                attr(lang)
            )
            .unwrap();
        }
    }
}

/// Returns `url` when it is `http(s)`, an inline image or scheme-less;
/// anything else (`javascript:` and friends) becomes `#`.
fn safe_url(url: &str) -> &str {
    let url = url.trim();
    let lower = url.to_ascii_lowercase();
    let colon = lower.find(':');
    let path_start = lower.find(['/', '?', '#']);

    match colon {
        Some(colon) if path_start.is_none_or(|p| colon < p) => {
            if lower.starts_with("http:")
                || lower.starts_with("https:")
                || lower.starts_with("data:image/")
            {
                url
            } else {
                "#"
            }
        }
        _ => url,
    }
}
