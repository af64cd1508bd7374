// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Message-level view tree.
//!
//! This layer turns [`AssembledMessage`]s into [`DocumentNode`]s: headers,
//! reply previews, forwarded messages, attachments, embeds, polls,
//! components and the system notices. Every piece of text is already parsed
//! into [`MarkupNode`]s and every timestamp is already formatted, so the HTML
//! serializer only has to walk the tree. The tree is also `Serialize` and can
//! be dumped as JSON.

use crate::assembler::{AssembledMessage, Author, ForwardedMessage, ReplyPreview};
use crate::cdn::CdnUrls;
use crate::markup::{MarkupNode, RenderContext, render_message_content};
use crate::parser::{
    Attachment, Button, ComponentEmoji, Embed, Interaction, MessageType, Poll, Select, Sticker,
};
use crate::resolver::normalize_color;
use crate::timestamp::{
    format_full, format_header, format_relative, format_separator_date, format_short_time,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use tracing::warn;

/// Replies longer than this many characters are cut.
const REPLY_PREVIEW_LIMIT: usize = 140;
/// Characters kept from a cut reply before the ellipsis.
const REPLY_PREVIEW_KEEP: usize = 137;
/// Shown instead of the text of a reply target that carries media.
pub const ATTACHMENT_PREVIEW: &str = "Click to see attachment";

const EMOJI_SIZE: u32 = 96;
const STICKER_SIZE: u32 = 160;

/// Join notice templates; `[username]` marks where the name goes.
const JOIN_MESSAGES: [&str; 21] = [
    "[username] just joined the server - glhf!",
    "[username] just joined. Everyone, look busy!",
    "[username] just joined. Can I get a heal?",
    "[username] joined your party.",
    "[username] joined. You must construct additional pylons.",
    "Ermagherd. [username] is here.",
    "Welcome, [username]. Stay awhile and listen.",
    "Welcome, [username]. We were expecting you ( ͡° ͜ʖ ͡°)",
    "Welcome, [username]. We hope you brought pizza.",
    "Welcome [username]. Leave your weapons by the door.",
    "A wild [username] appeared.",
    "Swoooosh. [username] just landed.",
    "Brace yourselves. [username] just joined the server.",
    "[username] just joined. Hide your bananas.",
    "[username] just arrived. Seems OP – please nerf.",
    "[username] just slid into the server.",
    "A [username] has spawned in the server.",
    "Big [username] showed up!",
    "Where's [username]? In the server!",
    "[username] hopped into the server. Kangaroo!!",
    "[username] just showed up. Hold my beer",
];

const POLL_QUESTION_FIELD: &str = "poll_question_text";
const POLL_TOTAL_FIELD: &str = "total_votes";
const POLL_TIED: &str = "The results were tied";

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg", "bmp", "avif"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "avi", "mkv"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "m4a", "flac", "aac", "weba", "opus"];
const CODE_EXTENSIONS: &[&str] = &[
    "js", "ts", "tsx", "jsx", "json", "py", "java", "c", "cpp", "cs", "rb", "php", "go", "rs",
    "swift", "kt", "kts", "sh", "ps1", "bat", "sql", "html", "css", "scss", "sass",
];

/// One top-level entry of a rendered transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentNode {
    /// Calendar day divider.
    DateSeparator {
        /// The formatted date.
        label: String,
    },
    /// A regular message.
    Message(Box<MessageView>),
    /// "X joined the server."
    JoinNotice(JoinNotice),
    /// "X pinned a message to this channel."
    PinNotice(PinNotice),
    /// Summary of a finished poll.
    PollResult(PollResultView),
    /// A message whose rendering failed, shown as raw text.
    Fallback {
        /// Message id.
        id: String,
        /// The unparsed message text.
        raw: String,
    },
}

/// A regular message ready for output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageView {
    /// Message id, used as the anchor.
    pub id: String,
    /// Resolved author.
    pub author: Author,
    /// Rendered without its own header.
    pub compact: bool,
    /// Header date and time.
    pub timestamp: Option<String>,
    /// Long form used as the header tooltip.
    pub timestamp_full: Option<String>,
    /// Gutter time for compact messages.
    pub short_time: Option<String>,
    /// Whether the message was edited.
    pub edited: bool,
    /// Whether the message is pinned.
    pub pinned: bool,
    /// "X used /command" line above the header.
    pub command: Option<CommandLine>,
    /// Preview of the replied-to message.
    pub reply: Option<ReplyView>,
    /// Parsed message text.
    pub content: Vec<MarkupNode>,
    /// Forwarded message body.
    pub forwarded: Option<ForwardedView>,
    /// Sticker images.
    pub stickers: Vec<StickerView>,
    /// Uploaded files.
    pub attachments: Vec<AttachmentView>,
    /// Rich embeds.
    pub embeds: Vec<EmbedView>,
    /// Attached poll.
    pub poll: Option<PollView>,
    /// Buttons.
    pub buttons: Vec<ButtonView>,
    /// Select menus.
    pub selects: Vec<SelectView>,
    /// Reactions.
    pub reactions: Vec<ReactionView>,
}

/// The slash command that produced a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandLine {
    /// Account name of the invoking user.
    pub user_name: String,
    /// Display name of the invoking user, when known.
    pub display_name: Option<String>,
    /// Avatar of the invoking user.
    pub avatar_url: String,
    /// Command name without the slash.
    pub command: String,
}

/// Reply preview above a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyView {
    /// Id of the replied-to message.
    pub id: String,
    /// Author of the replied-to message.
    pub author: Author,
    /// Shortened content.
    pub content: Vec<MarkupNode>,
    /// Header time of the replied-to message.
    pub timestamp: Option<String>,
    /// Whether the replied-to message was edited.
    pub edited: bool,
    /// Whether the replied-to message is in this transcript.
    pub found: bool,
}

/// A forwarded message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForwardedView {
    /// Id of the original message.
    pub message_id: Option<String>,
    /// Original author.
    pub author: Option<Author>,
    /// Channel the original was posted in.
    pub channel_name: Option<String>,
    /// Original send time.
    pub timestamp: Option<String>,
    /// Original text.
    pub content: Vec<MarkupNode>,
    /// Original attachments.
    pub attachments: Vec<AttachmentView>,
    /// Original embeds.
    pub embeds: Vec<EmbedView>,
    /// Original stickers.
    pub stickers: Vec<StickerView>,
}

/// A sticker image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StickerView {
    /// Sticker name, used as alt text.
    pub name: String,
    /// Image URL.
    pub url: String,
}

/// What an attachment is displayed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    /// Inline image.
    Image,
    /// Video player.
    Video,
    /// Audio player.
    Audio,
    /// Download card.
    File(FileKind),
}

/// Icon shown on a download card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    /// Source code.
    Code,
    /// Anything else.
    Document,
}

/// An uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentView {
    /// Download URL.
    pub url: String,
    /// File name shown on the card.
    pub filename: String,
    /// Human readable size.
    pub size: Option<String>,
    /// Display kind.
    pub kind: AttachmentKind,
}

/// A rich embed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedView {
    /// Accent colour as `#rrggbb`.
    pub color: Option<String>,
    /// Author line.
    pub author: Option<EmbedAuthorView>,
    /// Title text.
    pub title: Option<String>,
    /// Title link.
    pub url: Option<String>,
    /// Parsed description.
    pub description: Vec<MarkupNode>,
    /// Name/value fields.
    pub fields: Vec<EmbedFieldView>,
    /// Large image.
    pub image: Option<String>,
    /// Thumbnail.
    pub thumbnail: Option<String>,
    /// Footer text.
    pub footer: Option<String>,
    /// Footer icon.
    pub footer_icon: Option<String>,
    /// Formatted footer timestamp.
    pub timestamp: Option<String>,
}

/// Author line of an embed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedAuthorView {
    /// Name.
    pub name: String,
    /// Link.
    pub url: Option<String>,
    /// Icon.
    pub icon_url: Option<String>,
}

/// One embed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedFieldView {
    /// Field heading.
    pub name: String,
    /// Parsed field value.
    pub value: Vec<MarkupNode>,
    /// Laid out inline.
    pub inline: bool,
}

/// A poll with computed percentages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollView {
    /// Poll question.
    pub question: Option<String>,
    /// Answers.
    pub options: Vec<PollOptionView>,
    /// Total votes.
    pub total_votes: u64,
    /// Whether the poll is over, and if not, how long it runs.
    pub status: PollStatus,
}

/// One poll answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollOptionView {
    /// Answer text.
    pub label: String,
    /// Votes for this answer.
    pub count: u64,
    /// Rounded share of all votes.
    pub percent: u64,
    /// Has the most votes of a closed poll.
    pub winner: bool,
}

/// State line under a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollStatus {
    /// Voting has ended.
    Closed,
    /// Voting ends later, formatted as `Nh Mm left`.
    Remaining(String),
    /// No end time known.
    Open,
}

/// Button look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    /// Blurple.
    Primary,
    /// Grey.
    Secondary,
    /// Green.
    Success,
    /// Red.
    Danger,
    /// Grey with an external link icon.
    Link,
}

impl ButtonStyle {
    /// Maps the wire style code. Unknown codes look like secondary buttons.
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Primary,
            3 => Self::Success,
            4 => Self::Danger,
            5 => Self::Link,
            _ => Self::Secondary,
        }
    }
}

/// A button component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ButtonView {
    /// Label text.
    pub label: String,
    /// Look.
    pub style: ButtonStyle,
    /// Leading emoji.
    pub emoji: Option<EmojiView>,
    /// Target of link buttons.
    pub url: Option<String>,
    /// Greyed out.
    pub disabled: bool,
}

/// A select menu component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectView {
    /// Placeholder text.
    pub placeholder: String,
    /// Options.
    pub options: Vec<SelectOptionView>,
}

/// One select menu option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectOptionView {
    /// Label.
    pub label: String,
    /// Secondary line.
    pub description: Option<String>,
    /// Trailing emoji.
    pub emoji: Option<EmojiView>,
}

/// A reaction pill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactionView {
    /// The emoji.
    pub emoji: EmojiView,
    /// Reaction count.
    pub count: u32,
}

/// A custom emoji image or a unicode emoji.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmojiView {
    /// Image URL for custom emoji.
    pub url: Option<String>,
    /// Name, or the unicode character itself.
    pub name: Option<String>,
}

/// "X joined the server." notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinNotice {
    /// Message id.
    pub id: String,
    /// The member who joined.
    pub author: Author,
    /// Template text before the name.
    pub before: String,
    /// Template text after the name.
    pub after: String,
    /// Header time.
    pub timestamp: Option<String>,
}

/// "X pinned a message to this channel." notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PinNotice {
    /// Message id.
    pub id: String,
    /// Who pinned.
    pub author: Author,
    /// Id of the pinned message.
    pub target_id: Option<String>,
    /// Whether the pinned message is in this transcript.
    pub found: bool,
    /// Header time.
    pub timestamp: Option<String>,
}

/// Summary of a finished poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollResultView {
    /// Message id.
    pub id: String,
    /// Owner of the poll.
    pub author: Author,
    /// The poll question.
    pub question: String,
    /// Total votes cast.
    pub total_votes: u64,
    /// Winning share, or the tie notice.
    pub result_text: String,
    /// Share of the leading answer.
    pub highest_percent: u64,
    /// More than one answer shares the lead.
    pub tied: bool,
    /// Message that carried the poll.
    pub poll_message_id: Option<String>,
    /// How long ago the poll closed.
    pub time_ago: Option<String>,
}

/// Renders assembled messages, inserting date separators.
///
/// A message that fails to render becomes a [`DocumentNode::Fallback`]; the
/// rest of the batch is unaffected.
#[must_use]
pub fn render_transcript(
    messages: &[AssembledMessage<'_>],
    ctx: &RenderContext<'_>,
) -> Vec<DocumentNode> {
    let mut out = Vec::with_capacity(messages.len());
    for message in messages {
        if message.date_separator_before
            && let Some(created) = message.raw.created_at
        {
            out.push(DocumentNode::DateSeparator {
                label: format_separator_date(created, ctx.offset),
            });
        }
        out.push(render_isolated(message, ctx));
    }
    out
}

fn render_isolated(message: &AssembledMessage<'_>, ctx: &RenderContext<'_>) -> DocumentNode {
    panic::catch_unwind(AssertUnwindSafe(|| render_message(message, ctx))).unwrap_or_else(|_| {
        warn!(id = %message.raw.id, "failed to render message, showing raw text");
        DocumentNode::Fallback {
            id: message.raw.id.clone(),
            raw: message.raw.content.clone(),
        }
    })
}

/// Renders one assembled message.
#[must_use]
pub fn render_message(message: &AssembledMessage<'_>, ctx: &RenderContext<'_>) -> DocumentNode {
    match message.raw.message_type {
        MessageType::UserJoin => DocumentNode::JoinNotice(join_notice(message, ctx)),
        MessageType::ChannelPinnedMessage => DocumentNode::PinNotice(pin_notice(message, ctx)),
        MessageType::PollResult => poll_result(message, ctx).map_or_else(
            || DocumentNode::Message(Box::new(message_view(message, ctx))),
            DocumentNode::PollResult,
        ),
        _ => DocumentNode::Message(Box::new(message_view(message, ctx))),
    }
}

fn message_view(message: &AssembledMessage<'_>, ctx: &RenderContext<'_>) -> MessageView {
    let raw = message.raw;
    let embeds: Vec<&Embed> = raw.embeds.iter().filter(|e| !is_emoji_embed(e)).collect();
    let content = strip_urls(&raw.content, &hidden_urls(&raw.attachments, &embeds));

    MessageView {
        id: raw.id.clone(),
        author: message.author.clone(),
        compact: message.compact,
        timestamp: raw.created_at.map(|t| format_header(t, ctx.offset)),
        timestamp_full: raw.created_at.map(|t| format_full(t, ctx.offset)),
        short_time: raw.created_at.map(|t| format_short_time(t, ctx.offset)),
        edited: raw.edited_at.is_some(),
        pinned: raw.pinned,
        command: raw.interaction.as_ref().and_then(|i| command_line(i, ctx)),
        reply: message.reply_to.as_ref().map(|r| reply_view(r, ctx)),
        content: render_text(&content, ctx),
        forwarded: message.forwarded.as_ref().map(|f| forwarded_view(f, ctx)),
        stickers: sticker_views(&raw.stickers, ctx.cdn),
        attachments: raw.attachments.iter().map(attachment_view).collect(),
        embeds: embeds.into_iter().map(|e| embed_view(e, ctx)).collect(),
        poll: raw
            .poll
            .as_ref()
            .filter(|p| p.question.is_some() || !p.options.is_empty())
            .map(|p| poll_view(p, ctx.now)),
        buttons: raw.buttons.iter().map(|b| button_view(b, ctx.cdn)).collect(),
        selects: raw.selects.iter().map(|s| select_view(s, ctx.cdn)).collect(),
        reactions: raw
            .reactions
            .iter()
            .filter_map(|r| {
                emoji_view(&r.emoji, ctx.cdn).map(|emoji| ReactionView {
                    emoji,
                    count: r.count,
                })
            })
            .collect(),
    }
}

fn render_text(text: &str, ctx: &RenderContext<'_>) -> Vec<MarkupNode> {
    if text.trim().is_empty() {
        Vec::new()
    } else {
        render_message_content(text, ctx)
    }
}

/// Embeds that only show a custom emoji image.
fn is_emoji_embed(embed: &Embed) -> bool {
    let image = embed
        .image
        .as_ref()
        .and_then(|m| m.url.as_deref())
        .or_else(|| embed.thumbnail.as_ref().and_then(|m| m.url.as_deref()));
    image.is_some_and(|url| url.contains("/emojis/"))
        && embed.title.is_none()
        && embed.description.is_none()
        && embed.author.is_none()
}

/// URLs already shown as attachments or embeds.
fn hidden_urls<'m>(attachments: &'m [Attachment], embeds: &[&'m Embed]) -> Vec<&'m str> {
    let mut urls: Vec<&str> = attachments.iter().map(|a| a.url.as_str()).collect();
    for embed in embeds {
        urls.extend(embed.url.as_deref());
        urls.extend(embed.image.as_ref().and_then(|m| m.url.as_deref()));
        urls.extend(embed.thumbnail.as_ref().and_then(|m| m.url.as_deref()));
    }
    urls.retain(|u| !u.is_empty());
    urls
}

/// Drops whitespace-delimited words that are exactly one of `urls`.
///
/// Longer URLs sharing a prefix and URLs inside markdown links are other
/// words and stay.
fn strip_urls(content: &str, urls: &[&str]) -> String {
    if urls.is_empty() {
        return content.to_owned();
    }

    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    while !rest.is_empty() {
        let word_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let (word, tail) = rest.split_at(word_end);
        if !urls.contains(&word) {
            out.push_str(word);
        }
        let space_end = tail
            .find(|c: char| !c.is_whitespace())
            .unwrap_or(tail.len());
        out.push_str(&tail[..space_end]);
        rest = &tail[space_end..];
    }
    out
}

fn command_line(interaction: &Interaction, ctx: &RenderContext<'_>) -> Option<CommandLine> {
    let command = interaction.name.as_deref().filter(|n| !n.is_empty())?;
    let user = interaction.user.as_ref().filter(|u| !u.username.is_empty())?;
    let profile = Some(user.id.as_str())
        .filter(|id| !id.is_empty())
        .and_then(|id| ctx.resolver.user(id));

    Some(CommandLine {
        user_name: user.username.clone(),
        display_name: profile.and_then(|p| p.display_name.clone()),
        avatar_url: ctx
            .cdn
            .avatar_url(&user.id, profile.and_then(|p| p.avatar.as_deref())),
        command: command.to_owned(),
    })
}

fn reply_view(reply: &ReplyPreview, ctx: &RenderContext<'_>) -> ReplyView {
    let content = if reply.has_media || reply.content.is_empty() {
        vec![MarkupNode::Text(ATTACHMENT_PREVIEW.to_owned())]
    } else {
        render_message_content(&truncate_preview(&reply.content), ctx)
    };

    ReplyView {
        id: reply.id.clone(),
        author: reply.author.clone(),
        content,
        timestamp: reply.timestamp.map(|t| format_header(t, ctx.offset)),
        edited: reply.edited,
        found: reply.found,
    }
}

/// Openings of `<...>` tokens (mentions, timestamps, emoji, commands,
/// suppressed links) that must not be cut in half.
const TOKEN_OPENERS: [&str; 6] = ["<@", "<#", "<t:", "<:", "<a:", "</"];

/// Cuts reply text longer than 140 characters to 137 plus `...`.
///
/// A `<...>` token straddling the cut is dropped whole rather than left
/// half-open.
#[must_use]
pub fn truncate_preview(text: &str) -> String {
    if text.chars().count() <= REPLY_PREVIEW_LIMIT {
        return text.to_owned();
    }

    let end = text
        .char_indices()
        .nth(REPLY_PREVIEW_KEEP)
        .map_or(text.len(), |(i, _)| i);
    let mut cut = &text[..end];
    if let Some(open) = cut.rfind('<')
        && !cut[open..].contains('>')
        && text[end..].contains('>')
        && (TOKEN_OPENERS.iter().any(|p| text[open..].starts_with(p))
            || text[open + 1..].starts_with("http"))
    {
        cut = &cut[..open];
    }
    format!("{cut}...")
}

fn forwarded_view(forwarded: &ForwardedMessage, ctx: &RenderContext<'_>) -> ForwardedView {
    let embeds: Vec<&Embed> = forwarded
        .embeds
        .iter()
        .filter(|e| !is_emoji_embed(e))
        .collect();
    let content = strip_urls(
        &forwarded.content,
        &hidden_urls(&forwarded.attachments, &embeds),
    );

    ForwardedView {
        message_id: forwarded.message_id.clone(),
        author: forwarded.author.clone(),
        channel_name: forwarded.channel_name.clone(),
        timestamp: forwarded.created_at.map(|t| format_header(t, ctx.offset)),
        content: render_text(&content, ctx),
        attachments: forwarded.attachments.iter().map(attachment_view).collect(),
        embeds: embeds.into_iter().map(|e| embed_view(e, ctx)).collect(),
        stickers: sticker_views(&forwarded.stickers, ctx.cdn),
    }
}

fn sticker_views(stickers: &[Sticker], cdn: &dyn CdnUrls) -> Vec<StickerView> {
    stickers
        .iter()
        .filter_map(|s| {
            let url = s
                .url
                .clone()
                .filter(|u| !u.is_empty())
                .or_else(|| (!s.id.is_empty()).then(|| cdn.sticker_url(&s.id, STICKER_SIZE)))?;
            Some(StickerView {
                name: s.name.clone().unwrap_or_else(|| "sticker".to_owned()),
                url,
            })
        })
        .collect()
}

fn attachment_view(attachment: &Attachment) -> AttachmentView {
    let filename = attachment
        .filename
        .clone()
        .filter(|f| !f.trim().is_empty())
        .or_else(|| filename_from_url(&attachment.url))
        .unwrap_or_else(|| "file".to_owned());

    AttachmentView {
        kind: classify_attachment(attachment, &filename),
        size: attachment.size.map(format_file_size),
        url: attachment.url.clone(),
        filename,
    }
}

/// Picks the display kind from the MIME type, then the URL or file name
/// extension.
#[must_use]
pub fn classify_attachment(attachment: &Attachment, filename: &str) -> AttachmentKind {
    let mime = attachment.content_type.as_deref().unwrap_or_default();
    let ext = extension(&attachment.url).or_else(|| extension(filename));
    let has_ext = |list: &[&str]| ext.as_deref().is_some_and(|e| list.contains(&e));

    if mime.starts_with("image/") || has_ext(IMAGE_EXTENSIONS) {
        AttachmentKind::Image
    } else if mime.starts_with("audio/") || has_ext(AUDIO_EXTENSIONS) {
        AttachmentKind::Audio
    } else if mime.starts_with("video/") || has_ext(VIDEO_EXTENSIONS) {
        AttachmentKind::Video
    } else if extension(filename).is_some_and(|e| CODE_EXTENSIONS.contains(&e.as_str()))
        || has_ext(CODE_EXTENSIONS)
    {
        AttachmentKind::File(FileKind::Code)
    } else {
        AttachmentKind::File(FileKind::Document)
    }
}

/// Lowercase extension of the last path segment, ignoring query and fragment.
fn extension(path: &str) -> Option<String> {
    let segment = last_segment(path)?;
    let (_, ext) = segment.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

fn last_segment(path: &str) -> Option<&str> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
}

fn filename_from_url(url: &str) -> Option<String> {
    last_segment(url).map(str::to_owned)
}

/// Formats a byte count as `x.xx KB` below one megabyte, `x.xx MB` above.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_file_size(bytes: u64) -> String {
    let kb = bytes as f64 / 1024.0;
    if kb < 1024.0 {
        format!("{kb:.2} KB")
    } else {
        format!("{:.2} MB", kb / 1024.0)
    }
}

fn embed_view(embed: &Embed, ctx: &RenderContext<'_>) -> EmbedView {
    EmbedView {
        color: embed.color.as_deref().and_then(normalize_color),
        author: embed.author.as_ref().and_then(|a| {
            a.name.clone().map(|name| EmbedAuthorView {
                name,
                url: a.url.clone(),
                icon_url: a.icon_url.clone(),
            })
        }),
        title: embed.title.clone(),
        url: embed.url.clone(),
        description: embed
            .description
            .as_deref()
            .map(|d| render_text(d, ctx))
            .unwrap_or_default(),
        fields: embed
            .fields
            .iter()
            .map(|f| EmbedFieldView {
                name: f.name.clone(),
                value: render_text(&f.value, ctx),
                inline: f.inline,
            })
            .collect(),
        image: embed.image.as_ref().and_then(|m| m.url.clone()),
        thumbnail: embed.thumbnail.as_ref().and_then(|m| m.url.clone()),
        footer: embed.footer.as_ref().and_then(|f| f.text.clone()),
        footer_icon: embed.footer.as_ref().and_then(|f| f.icon_url.clone()),
        timestamp: embed
            .timestamp
            .as_deref()
            .and_then(parse_rfc3339)
            .map(|t| format_header(t, ctx.offset)),
    }
}

fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Rounded percentage, halves rounding up.
const fn percent(count: u64, total: u64) -> u64 {
    if total == 0 {
        0
    } else {
        (count * 200 + total) / (2 * total)
    }
}

fn poll_view(poll: &Poll, now: DateTime<Utc>) -> PollView {
    let total = poll
        .total_votes
        .unwrap_or_else(|| poll.options.iter().filter_map(|o| o.count).sum());
    let max = poll
        .options
        .iter()
        .map(|o| o.count.unwrap_or(0))
        .max()
        .unwrap_or(0);
    let ends_at = poll.ends_at.as_deref().and_then(parse_rfc3339);
    let closed = poll.closed || ends_at.is_some_and(|end| end < now);

    let status = match ends_at {
        _ if closed => PollStatus::Closed,
        Some(end) => PollStatus::Remaining(format_remaining(
            end.signed_duration_since(now).num_seconds(),
        )),
        None => PollStatus::Open,
    };

    PollView {
        question: poll.question.clone(),
        options: poll
            .options
            .iter()
            .map(|o| {
                let count = o.count.unwrap_or(0);
                PollOptionView {
                    label: o.label.clone().unwrap_or_default(),
                    count,
                    percent: percent(count, total),
                    winner: closed && total > 0 && count == max,
                }
            })
            .collect(),
        total_votes: total,
        status,
    }
}

fn format_remaining(secs: i64) -> String {
    format!("{}h {}m left", secs / 3600, (secs % 3600) / 60)
}

fn button_view(button: &Button, cdn: &dyn CdnUrls) -> ButtonView {
    ButtonView {
        label: button.label.clone().unwrap_or_default(),
        style: ButtonStyle::from_code(button.style.unwrap_or(1)),
        emoji: button.emoji.as_ref().and_then(|e| emoji_view(e, cdn)),
        url: button.url.clone(),
        disabled: button.disabled,
    }
}

fn select_view(select: &Select, cdn: &dyn CdnUrls) -> SelectView {
    SelectView {
        placeholder: select
            .placeholder
            .clone()
            .unwrap_or_else(|| "Select".to_owned()),
        options: select
            .options
            .iter()
            .map(|o| SelectOptionView {
                label: o.label.clone(),
                description: o.description.clone(),
                emoji: o.emoji.as_ref().and_then(|e| emoji_view(e, cdn)),
            })
            .collect(),
    }
}

fn emoji_view(emoji: &ComponentEmoji, cdn: &dyn CdnUrls) -> Option<EmojiView> {
    let name = emoji.name.clone().filter(|n| !n.is_empty());
    match emoji.id.as_deref().filter(|id| !id.is_empty()) {
        Some(id) => Some(EmojiView {
            url: Some(cdn.emoji_url(id, emoji.animated, EMOJI_SIZE)),
            name,
        }),
        None => name.map(|name| EmojiView {
            url: None,
            name: Some(name),
        }),
    }
}

/// Index of the join template for `username`: the sum of its UTF-16 code
/// units modulo the template count.
#[must_use]
pub fn join_template_index(username: &str) -> usize {
    username.encode_utf16().map(usize::from).sum::<usize>() % JOIN_MESSAGES.len()
}

fn join_notice(message: &AssembledMessage<'_>, ctx: &RenderContext<'_>) -> JoinNotice {
    let template = JOIN_MESSAGES[join_template_index(&message.author.name)];
    let (before, after) = template.split_once("[username]").unwrap_or((template, ""));

    JoinNotice {
        id: message.raw.id.clone(),
        author: message.author.clone(),
        before: before.to_owned(),
        after: after.to_owned(),
        timestamp: message.raw.created_at.map(|t| format_header(t, ctx.offset)),
    }
}

fn pin_notice(message: &AssembledMessage<'_>, ctx: &RenderContext<'_>) -> PinNotice {
    let reference = message.pinned_reference.as_ref();
    PinNotice {
        id: message.raw.id.clone(),
        author: message.author.clone(),
        target_id: reference.map(|r| r.id.clone()),
        found: reference.is_some_and(|r| r.found),
        timestamp: message.raw.created_at.map(|t| format_header(t, ctx.offset)),
    }
}

/// Leading integer of `s`, like a lenient number parse: `"12 votes"` is 12.
fn leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let sign_len = usize::from(s.starts_with(['-', '+']));
    let digits = s[sign_len..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(s.len(), |end| end + sign_len);
    s[..digits].parse().ok()
}

fn poll_result(message: &AssembledMessage<'_>, ctx: &RenderContext<'_>) -> Option<PollResultView> {
    let fields = &message.raw.embeds.first()?.fields;
    let question = fields.iter().find(|f| f.name == POLL_QUESTION_FIELD)?;
    let total_field = fields.iter().find(|f| f.name == POLL_TOTAL_FIELD)?;
    let total_votes = leading_int(&total_field.value)
        .and_then(|v| u64::try_from(v).ok())
        .unwrap_or(0);

    let answers: Vec<Option<i64>> = fields
        .iter()
        .filter(|f| f.name != POLL_QUESTION_FIELD && f.name != POLL_TOTAL_FIELD)
        .map(|f| leading_int(&f.value))
        .collect();
    let max = answers
        .iter()
        .map(|v| v.unwrap_or(0))
        .max()
        .unwrap_or(0)
        .max(0);
    let leaders = answers.iter().filter(|v| **v == Some(max)).count();
    let highest_percent = percent(u64::try_from(max).unwrap_or(0), total_votes);

    let result_text = if leaders == 1 && max > 0 {
        format!("{highest_percent}%")
    } else {
        POLL_TIED.to_owned()
    };

    Some(PollResultView {
        id: message.raw.id.clone(),
        author: message.author.clone(),
        question: question.value.clone(),
        total_votes,
        result_text,
        highest_percent,
        tied: leaders > 1,
        poll_message_id: message.raw.referenced_message_id.clone(),
        time_ago: message.raw.created_at.map(|t| format_relative(t, ctx.now)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::tests::{T, msg};
    use crate::assembler::{AssembleOptions, assemble_messages};
    use crate::cdn::DiscordCdn;
    use crate::highlight::PlainHighlighter;
    use crate::markup::plain_text;
    use crate::markup::tests::tables;
    use crate::parser::{EmbedField, EmbedMedia, PollOption, RawMessage, Reaction};
    use crate::resolver::Resolver;
    use chrono::{FixedOffset, TimeZone};

    /// 2024-12-05T16:20:30Z
    const NOW: i64 = 1_733_415_630;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn render_all_with(messages: &[RawMessage], cdn: &dyn CdnUrls) -> Vec<DocumentNode> {
        let tables = tables();
        let resolver = Resolver::new(&tables);
        let ctx = RenderContext::new(&resolver, cdn, &PlainHighlighter)
            .with_now(Utc.timestamp_opt(NOW, 0).unwrap())
            .with_offset(utc());
        let assembled = assemble_messages(
            messages,
            &resolver,
            cdn,
            &AssembleOptions { utc_offset: utc() },
        );
        render_transcript(&assembled, &ctx)
    }

    fn render_all(messages: &[RawMessage]) -> Vec<DocumentNode> {
        render_all_with(messages, &DiscordCdn::default())
    }

    fn render_one(message: RawMessage) -> DocumentNode {
        render_all(&[message]).pop().unwrap()
    }

    fn view(node: DocumentNode) -> MessageView {
        match node {
            DocumentNode::Message(view) => *view,
            other => panic!("Expected Message, got {other:?}"),
        }
    }

    #[test]
    fn regular_message_header() {
        let view = view(render_one(msg("1", "42", T)));

        assert_eq!(view.author.name, "Alice");
        assert_eq!(view.timestamp.as_deref(), Some("05.12.2024 10:00 AM"));
        assert_eq!(
            view.timestamp_full.as_deref(),
            Some("Thursday, December 5, 2024 at 10:00 AM")
        );
        assert_eq!(view.content, vec![MarkupNode::Text("message 1".into())]);
        assert!(!view.compact);
        assert!(!view.edited);
    }

    #[test]
    fn transcript_interleaves_date_separators() {
        let day = 86_400;
        let nodes = render_all(&[
            msg("1", "42", T),
            msg("2", "42", T + 10),
            msg("3", "42", T + day),
        ]);

        let labels: Vec<&str> = nodes
            .iter()
            .filter_map(|n| match n {
                DocumentNode::DateSeparator { label } => Some(label.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(labels, ["December 5, 2024", "December 6, 2024"]);
        assert_eq!(nodes.len(), 5);
        assert!(matches!(&nodes[2], DocumentNode::Message(v) if v.compact));
    }

    #[test]
    fn long_replies_are_truncated() {
        let mut target = msg("1", "42", T);
        target.content = "a".repeat(200);
        let mut reply = msg("2", "42", T + 10);
        reply.referenced_message_id = Some("1".into());

        let nodes = render_all(&[target, reply]);
        let view = view(nodes.last().cloned().unwrap());
        let preview = plain_text(&view.reply.unwrap().content);

        assert_eq!(preview.chars().count(), 140);
        assert!(preview.ends_with("aaa..."));
    }

    #[test]
    fn truncate_preview_keeps_short_text() {
        let exact = "b".repeat(140);
        assert_eq!(truncate_preview(&exact), exact);
        assert_eq!(truncate_preview(&"b".repeat(141)).len(), 140);
    }

    #[test]
    fn truncate_preview_keeps_tokens_whole() {
        let mention = format!("{} <@42> and more text", "a".repeat(134));
        assert_eq!(truncate_preview(&mention), format!("{} ...", "a".repeat(134)));

        let emoji = format!("{}<:wave:123> end of the line", "b".repeat(136));
        assert_eq!(truncate_preview(&emoji), format!("{}...", "b".repeat(136)));

        // A lone `<` is ordinary text.
        let heart = format!("{}<3 and more text here", "c".repeat(136));
        assert_eq!(truncate_preview(&heart), format!("{}<...", "c".repeat(136)));
    }

    #[test]
    fn truncated_reply_resolves_mentions() {
        let target_text = format!("{} <@42> and more text", "a".repeat(134));
        let mut target = msg("1", "42", T);
        target.content = target_text;
        let mut reply = msg("2", "42", T + 10);
        reply.referenced_message_id = Some("1".into());

        let nodes = render_all(&[target, reply]);
        let view = view(nodes.last().cloned().unwrap());
        let preview = plain_text(&view.reply.unwrap().content);

        assert!(!preview.contains("<@"));
        assert!(preview.ends_with("a ..."));
    }

    #[test]
    fn media_replies_show_attachment_hint() {
        let mut target = msg("1", "42", T);
        target.stickers.push(Sticker {
            id: "5".into(),
            ..Sticker::default()
        });
        let mut reply = msg("2", "42", T + 10);
        reply.referenced_message_id = Some("1".into());

        let nodes = render_all(&[target, reply]);
        let reply = view(nodes.last().cloned().unwrap()).reply.unwrap();
        assert_eq!(plain_text(&reply.content), ATTACHMENT_PREVIEW);
    }

    #[test]
    fn missing_reply_placeholder() {
        let mut reply = msg("2", "42", T);
        reply.referenced_message_id = Some("404".into());
        let reply = view(render_one(reply)).reply.unwrap();

        assert!(!reply.found);
        assert_eq!(reply.author.name, "Unknown User");
        assert_eq!(plain_text(&reply.content), "Message not in transcript");
    }

    #[test]
    fn attachment_classification() {
        let case = |url: &str, content_type: Option<&str>| {
            let a = Attachment {
                url: url.into(),
                content_type: content_type.map(str::to_owned),
                ..Attachment::default()
            };
            attachment_view(&a).kind
        };

        assert_eq!(case("https://x.example/photo.PNG", None), AttachmentKind::Image);
        assert_eq!(case("https://x.example/a.mp3?ex=1", None), AttachmentKind::Audio);
        assert_eq!(case("https://x.example/clip", Some("video/mp4")), AttachmentKind::Video);
        assert_eq!(
            case("https://x.example/main.rs", None),
            AttachmentKind::File(FileKind::Code)
        );
        assert_eq!(
            case("https://x.example/notes.pdf", None),
            AttachmentKind::File(FileKind::Document)
        );
    }

    #[test]
    fn attachment_names_and_sizes() {
        let a = Attachment {
            url: "https://x.example/files/report.pdf?ex=1".into(),
            size: Some(1536),
            ..Attachment::default()
        };
        let view = attachment_view(&a);
        assert_eq!(view.filename, "report.pdf");
        assert_eq!(view.size.as_deref(), Some("1.50 KB"));

        assert_eq!(format_file_size(0), "0.00 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn content_hides_attachment_urls() {
        let mut m = msg("1", "42", T);
        m.content = "look https://cdn.example.com/a.png".into();
        m.attachments.push(Attachment {
            url: "https://cdn.example.com/a.png".into(),
            ..Attachment::default()
        });
        let view = view(render_one(m));

        assert_eq!(plain_text(&view.content).trim(), "look");
        assert_eq!(view.attachments.len(), 1);
    }

    #[test]
    fn hidden_urls_match_whole_words_only() {
        let urls = ["https://cdn.example.com/a.png"];

        assert_eq!(
            strip_urls("see https://cdn.example.com/a.png now", &urls),
            "see  now"
        );
        assert_eq!(
            strip_urls("https://cdn.example.com/a.png?size=2 too", &urls),
            "https://cdn.example.com/a.png?size=2 too"
        );
        assert_eq!(
            strip_urls("[pic](https://cdn.example.com/a.png)", &urls),
            "[pic](https://cdn.example.com/a.png)"
        );
        assert_eq!(strip_urls("a\nb", &[]), "a\nb");
    }

    #[test]
    fn emoji_only_embeds_are_dropped() {
        let mut m = msg("1", "42", T);
        m.embeds.push(Embed {
            thumbnail: Some(EmbedMedia {
                url: Some("https://cdn.discordapp.com/emojis/1.png".into()),
            }),
            ..Embed::default()
        });
        m.embeds.push(Embed {
            title: Some("Kept".into()),
            color: Some("5793266".into()),
            description: Some("**bold**".into()),
            ..Embed::default()
        });
        let view = view(render_one(m));

        assert_eq!(view.embeds.len(), 1);
        let embed = &view.embeds[0];
        assert_eq!(embed.title.as_deref(), Some("Kept"));
        assert_eq!(embed.color.as_deref(), Some("#5865f2"));
        assert_eq!(
            embed.description,
            vec![MarkupNode::Bold(vec![MarkupNode::Text("bold".into())])]
        );
    }

    fn poll(closed: bool, ends_at: Option<&str>) -> Poll {
        Poll {
            question: Some("Tea?".into()),
            options: vec![
                PollOption {
                    label: Some("Yes".into()),
                    count: Some(3),
                    ..PollOption::default()
                },
                PollOption {
                    label: Some("No".into()),
                    count: Some(1),
                    ..PollOption::default()
                },
            ],
            ends_at: ends_at.map(str::to_owned),
            closed,
            ..Poll::default()
        }
    }

    #[test]
    fn closed_poll_marks_winner() {
        let now = Utc.timestamp_opt(NOW, 0).unwrap();
        let view = poll_view(&poll(true, None), now);

        assert_eq!(view.total_votes, 4);
        assert_eq!(view.options[0].percent, 75);
        assert_eq!(view.options[1].percent, 25);
        assert!(view.options[0].winner);
        assert!(!view.options[1].winner);
        assert_eq!(view.status, PollStatus::Closed);
    }

    #[test]
    fn open_poll_shows_time_left() {
        let now = Utc.timestamp_opt(NOW, 0).unwrap();
        let view = poll_view(&poll(false, Some("2024-12-05T18:25:30Z")), now);

        assert_eq!(view.status, PollStatus::Remaining("2h 5m left".into()));
        assert!(view.options.iter().all(|o| !o.winner));

        let expired = poll_view(&poll(false, Some("2024-12-01T00:00:00Z")), now);
        assert_eq!(expired.status, PollStatus::Closed);
    }

    #[test]
    fn percentages_round_half_up() {
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(1, 8), 13);
        assert_eq!(percent(2, 3), 67);
        assert_eq!(percent(5, 0), 0);
    }

    #[test]
    fn components_and_reactions() {
        let mut m = msg("1", "42", T);
        m.buttons = (1..=6)
            .map(|style| Button {
                label: Some(format!("b{style}")),
                style: Some(style),
                ..Button::default()
            })
            .collect();
        m.selects.push(Select::default());
        m.reactions.push(Reaction {
            emoji: ComponentEmoji {
                id: Some("9".into()),
                name: Some("blob".into()),
                animated: true,
            },
            count: 3,
        });
        m.reactions.push(Reaction::default());
        let view = view(render_one(m));

        let styles: Vec<ButtonStyle> = view.buttons.iter().map(|b| b.style).collect();
        assert_eq!(
            styles,
            [
                ButtonStyle::Primary,
                ButtonStyle::Secondary,
                ButtonStyle::Success,
                ButtonStyle::Danger,
                ButtonStyle::Link,
                ButtonStyle::Secondary,
            ]
        );
        assert_eq!(view.selects[0].placeholder, "Select");
        // The reaction without any emoji is skipped.
        assert_eq!(view.reactions.len(), 1);
        assert_eq!(
            view.reactions[0].emoji.url.as_deref(),
            Some("https://cdn.discordapp.com/emojis/9.gif?size=96&animated=true")
        );
    }

    #[test]
    fn slash_command_line() {
        let mut m = msg("1", "42", T);
        m.interaction = Some(Interaction {
            name: Some("roll".into()),
            user: Some(crate::parser::InteractionUser {
                id: "42".into(),
                username: "alice".into(),
            }),
            ..Interaction::default()
        });
        let command = view(render_one(m)).command.unwrap();

        assert_eq!(command.command, "roll");
        assert_eq!(command.user_name, "alice");
        assert_eq!(command.display_name.as_deref(), Some("Alice"));
    }

    #[test]
    fn stickers_use_cdn_or_given_url() {
        let mut m = msg("1", "42", T);
        m.stickers = vec![
            Sticker {
                id: "5".into(),
                name: Some("wave".into()),
                ..Sticker::default()
            },
            Sticker {
                url: Some("/assets/s.png".into()),
                ..Sticker::default()
            },
            Sticker::default(),
        ];
        let view = view(render_one(m));

        assert_eq!(view.stickers.len(), 2);
        assert_eq!(
            view.stickers[0].url,
            "https://media.discordapp.net/stickers/5.webp?size=160&quality=lossless"
        );
        assert_eq!(view.stickers[1].url, "/assets/s.png");
    }

    #[test]
    fn join_notice_template_is_deterministic() {
        // a(97) + l(108) + i(105) + c(99) + e(101) = 510, 510 % 21 = 6
        assert_eq!(join_template_index("alice"), 6);

        let mut tables_user = msg("1", "42", T);
        tables_user.message_type = MessageType::UserJoin;
        let DocumentNode::JoinNotice(notice) = render_one(tables_user) else {
            panic!("Expected JoinNotice");
        };
        let expected = JOIN_MESSAGES[join_template_index("Alice")];
        assert_eq!(
            format!("{}[username]{}", notice.before, notice.after),
            expected
        );
    }

    #[test]
    fn pin_notice_points_at_pinned_message() {
        let mut pinned = msg("1", "42", T);
        pinned.pinned = true;
        let mut notice = msg("2", "42", T + 10);
        notice.message_type = MessageType::ChannelPinnedMessage;
        notice.referenced_message_id = Some("1".into());

        let nodes = render_all(&[pinned, notice]);
        let Some(DocumentNode::PinNotice(pin)) = nodes.last() else {
            panic!("Expected PinNotice");
        };
        assert_eq!(pin.target_id.as_deref(), Some("1"));
        assert!(pin.found);
    }

    fn poll_result_message(answers: &[&str]) -> RawMessage {
        let mut m = msg("9", "42", T);
        m.message_type = MessageType::PollResult;
        let mut fields = vec![
            EmbedField {
                name: "poll_question_text".into(),
                value: "Lunch?".into(),
                inline: false,
            },
            EmbedField {
                name: "total_votes".into(),
                value: "8".into(),
                inline: false,
            },
        ];
        fields.extend(answers.iter().map(|v| EmbedField {
            name: "answer".into(),
            value: (*v).into(),
            inline: false,
        }));
        m.embeds.push(Embed {
            fields,
            ..Embed::default()
        });
        m
    }

    #[test]
    fn poll_result_winner() {
        let DocumentNode::PollResult(result) = render_one(poll_result_message(&["6", "2"])) else {
            panic!("Expected PollResult");
        };
        assert_eq!(result.question, "Lunch?");
        assert_eq!(result.result_text, "75%");
        assert!(!result.tied);
    }

    #[test]
    fn poll_result_tie() {
        let DocumentNode::PollResult(result) = render_one(poll_result_message(&["4", "4"])) else {
            panic!("Expected PollResult");
        };
        assert_eq!(result.result_text, "The results were tied");
        assert_eq!(result.highest_percent, 50);
        assert!(result.tied);
    }

    #[test]
    fn poll_result_without_fields_is_a_message() {
        let mut m = msg("1", "42", T);
        m.message_type = MessageType::PollResult;
        assert!(matches!(render_one(m), DocumentNode::Message(_)));
    }

    #[test]
    fn leading_integers() {
        assert_eq!(leading_int("12 votes"), Some(12));
        assert_eq!(leading_int("  -3"), Some(-3));
        assert_eq!(leading_int("abc"), None);
    }

    /// Emoji lookups blow up; everything else is the stock CDN.
    struct BrokenEmojiCdn(DiscordCdn);

    impl CdnUrls for BrokenEmojiCdn {
        fn emoji_url(&self, _id: &str, _animated: bool, _size: u32) -> String {
            panic!("emoji lookup failed");
        }

        fn avatar_url(&self, user_id: &str, hash: Option<&str>) -> String {
            self.0.avatar_url(user_id, hash)
        }

        fn sticker_url(&self, id: &str, size: u32) -> String {
            self.0.sticker_url(id, size)
        }
    }

    #[test]
    fn failing_message_falls_back_to_raw_text() {
        let mut broken = msg("1", "42", T);
        broken.content = "hi <:wave:123>".into();
        let messages = [broken, msg("2", "42", T + 10)];

        let nodes = render_all_with(&messages, &BrokenEmojiCdn(DiscordCdn::default()));
        assert_eq!(
            nodes[1],
            DocumentNode::Fallback {
                id: "1".into(),
                raw: "hi <:wave:123>".into(),
            }
        );
        assert!(matches!(&nodes[2], DocumentNode::Message(_)));
    }

    #[test]
    fn serializes_with_kind_tags() {
        let nodes = render_all(&[msg("1", "42", T)]);
        let json = serde_json::to_value(&nodes).unwrap();

        assert_eq!(json[0]["kind"], "date_separator");
        assert_eq!(json[1]["kind"], "message");
        assert_eq!(json[1]["author"]["name"], "Alice");
    }
}
