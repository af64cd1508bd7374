// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! JSON parsing for Discord channel exports.
//!
//! This module handles deserialization of the JSON document produced by the
//! upstream extraction stage. The format contains the channel metadata, the
//! ordered message list and the lookup tables used to resolve mentions.
//!
//! # Format Overview
//!
//! An export contains:
//! - `meta`: channel id/name, guild id, generation time
//! - `messages`: the ordered message records
//! - `resolvedUsers`, `resolvedRoles`, `resolvedChannels`: id keyed tables
//!
//! Upstream sources are not consistent about types: ids and colours arrive as
//! strings or numbers, `author` is either an id or an inline object, and
//! components may be nested in `actionRows`. Parsing normalizes all of this.
//!
//! # Example
//!
//! ```
//! use dc2html::parser::parse_transcript;
//!
//! let json = r#"{
//!     "meta": { "channelId": "1", "channelName": "general" },
//!     "messages": [{
//!         "id": "10",
//!         "content": "Hello",
//!         "author": "42",
//!         "createdAt": "2024-12-05T00:00:00.000Z",
//!         "attachments": [],
//!         "pinned": false
//!     }],
//!     "resolvedUsers": { "42": { "username": "alice" } }
//! }"#;
//!
//! let transcript = parse_transcript(json).unwrap();
//! assert_eq!(transcript.messages.len(), 1);
//! assert_eq!(transcript.meta.channel_name.as_deref(), Some("general"));
//! ```

use crate::resolver::{ResolverTables, UserInfo};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use snafu::prelude::*;

/// Error type for JSON parsing failures.
#[derive(Debug, Snafu)]
pub enum ParseError {
    /// Failed to parse JSON content.
    #[snafu(display("failed to parse JSON: {source}"))]
    Json {
        /// The underlying JSON parsing error.
        source: serde_json::Error,
    },
}

/// The root structure of a channel export.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    /// Channel level metadata.
    #[serde(default)]
    pub meta: Meta,

    /// The messages in channel order (oldest first).
    pub messages: Vec<RawMessage>,

    /// Lookup tables for users, roles and channels.
    #[serde(flatten)]
    pub tables: ResolverTables,
}

/// Metadata describing the exported channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Meta {
    /// Id of the exported channel.
    #[serde(deserialize_with = "string_or_number")]
    pub channel_id: String,
    /// Display name of the exported channel.
    pub channel_name: Option<String>,
    /// Channel topic, if any.
    pub channel_topic: Option<String>,
    /// Id of the guild the channel belongs to.
    #[serde(deserialize_with = "opt_string_or_number")]
    pub guild_id: Option<String>,
    /// Guild display name.
    pub guild_name: Option<String>,
    /// When the export was generated (RFC 3339).
    pub generated_at: Option<String>,
    /// Number of messages the extraction stage reported.
    pub message_count: Option<u64>,
}

/// The platform's message type discriminator.
///
/// Only the types the renderer treats specially get their own variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub enum MessageType {
    /// A regular message.
    #[default]
    Default,
    /// "X pinned a message to this channel."
    ChannelPinnedMessage,
    /// A member joined the server.
    UserJoin,
    /// A reply to another message.
    Reply,
    /// A slash command response.
    ChatInputCommand,
    /// The final results of a poll.
    PollResult,
    /// Any other numeric type.
    Other(i64),
}

impl MessageType {
    /// Maps the numeric wire value to a [`MessageType`].
    #[must_use]
    pub const fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Default,
            6 => Self::ChannelPinnedMessage,
            7 => Self::UserJoin,
            19 => Self::Reply,
            20 => Self::ChatInputCommand,
            46 => Self::PollResult,
            other => Self::Other(other),
        }
    }

    /// Returns `true` for system notices that never group with neighbours.
    #[must_use]
    pub const fn is_system_notice(self) -> bool {
        matches!(self, Self::UserJoin | Self::ChannelPinnedMessage)
    }
}

/// How a message refers to its author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorRef {
    /// A user id to be looked up in the user table.
    Id(String),
    /// Author data embedded in the message itself.
    Inline {
        /// The author's id, when present.
        id: Option<String>,
        /// The embedded profile.
        info: UserInfo,
    },
    /// No author information at all.
    Unknown,
}

impl AuthorRef {
    /// Returns the author id, if one is known.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Id(id) => Some(id),
            Self::Inline { id, .. } => id.as_deref(),
            Self::Unknown => None,
        }
    }
}

/// A single exported message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Message id (snowflake as a string).
    pub id: String,
    /// The raw markup text.
    pub content: String,
    /// Reference to the author.
    pub author: AuthorRef,
    /// When the message was sent.
    pub created_at: Option<DateTime<Utc>>,
    /// When the message was last edited.
    pub edited_at: Option<DateTime<Utc>>,
    /// Uploaded files.
    pub attachments: Vec<Attachment>,
    /// Rich embeds.
    pub embeds: Vec<Embed>,
    /// Stickers sent with the message.
    pub stickers: Vec<Sticker>,
    /// Reactions and their counts.
    pub reactions: Vec<Reaction>,
    /// Button components.
    pub buttons: Vec<Button>,
    /// Select-menu components.
    pub selects: Vec<Select>,
    /// A native or emulated poll.
    pub poll: Option<Poll>,
    /// The slash command interaction that produced this message.
    pub interaction: Option<Interaction>,
    /// Id of the replied-to (or pinned) message.
    pub referenced_message_id: Option<String>,
    /// Forwarded message snapshot.
    pub forwarded: Option<Forwarded>,
    /// Whether the message is pinned in the channel.
    pub pinned: bool,
    /// Message type discriminator.
    pub message_type: MessageType,
}

/// An uploaded file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Attachment {
    /// Attachment id.
    #[serde(deserialize_with = "opt_string_or_number")]
    pub id: Option<String>,
    /// Original file name.
    pub filename: Option<String>,
    /// Download URL.
    pub url: String,
    /// MIME type reported by the platform.
    pub content_type: Option<String>,
    /// Size in bytes.
    pub size: Option<u64>,
    /// Pixel width for images and videos.
    pub width: Option<u32>,
    /// Pixel height for images and videos.
    pub height: Option<u32>,
}

/// A rich embed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Embed {
    /// Embed title.
    pub title: Option<String>,
    /// Markup description.
    pub description: Option<String>,
    /// Title link.
    pub url: Option<String>,
    /// Footer timestamp (RFC 3339).
    pub timestamp: Option<String>,
    /// Accent colour as hex or decimal.
    #[serde(deserialize_with = "opt_string_or_number")]
    pub color: Option<String>,
    /// Footer line.
    pub footer: Option<EmbedFooter>,
    /// Large image.
    pub image: Option<EmbedMedia>,
    /// Thumbnail image.
    pub thumbnail: Option<EmbedMedia>,
    /// Author line.
    pub author: Option<EmbedAuthor>,
    /// Name/value fields.
    pub fields: Vec<EmbedField>,
}

/// Embed footer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbedFooter {
    /// Footer text.
    pub text: Option<String>,
    /// Footer icon.
    pub icon_url: Option<String>,
}

/// Embed image or thumbnail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EmbedMedia {
    /// Image URL.
    pub url: Option<String>,
}

/// Embed author line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbedAuthor {
    /// Author name.
    pub name: Option<String>,
    /// Author link.
    pub url: Option<String>,
    /// Author icon.
    pub icon_url: Option<String>,
}

/// A single embed field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EmbedField {
    /// Field heading.
    pub name: String,
    /// Field markup value.
    pub value: String,
    /// Whether the field is laid out inline.
    pub inline: bool,
}

/// A sticker sent with a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Sticker {
    /// Sticker id.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Sticker name.
    pub name: Option<String>,
    /// Asset format (`png`, `apng`, `lottie`, `gif`).
    pub format: Option<String>,
    /// Pre-resolved asset URL.
    pub url: Option<String>,
}

/// A reaction on a message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Reaction {
    /// The reacted emoji.
    pub emoji: ComponentEmoji,
    /// Number of users who reacted.
    pub count: u32,
}

impl Default for Reaction {
    fn default() -> Self {
        Self {
            emoji: ComponentEmoji::default(),
            count: 1,
        }
    }
}

/// An emoji attached to a reaction, button or select option.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ComponentEmoji {
    /// Custom emoji id; `None` for unicode emoji.
    #[serde(deserialize_with = "opt_string_or_number")]
    pub id: Option<String>,
    /// Emoji name or the unicode character itself.
    pub name: Option<String>,
    /// Whether the custom emoji is animated.
    #[serde(deserialize_with = "bool_or_null")]
    pub animated: bool,
}

/// A button component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Button {
    /// Developer-defined id.
    pub custom_id: Option<String>,
    /// Visible label.
    pub label: Option<String>,
    /// Button style code (1 primary .. 5 link).
    pub style: Option<u8>,
    /// Emoji shown before the label.
    pub emoji: Option<ComponentEmoji>,
    /// Target for link buttons.
    pub url: Option<String>,
    /// Whether the button is disabled.
    #[serde(deserialize_with = "bool_or_null")]
    pub disabled: bool,
}

/// A select-menu component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Select {
    /// Developer-defined id.
    pub custom_id: Option<String>,
    /// Text shown when nothing is selected.
    pub placeholder: Option<String>,
    /// Minimum number of selections.
    pub min_values: Option<u32>,
    /// Maximum number of selections.
    pub max_values: Option<u32>,
    /// Available options.
    pub options: Vec<SelectOption>,
}

/// One option of a select menu.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SelectOption {
    /// Visible label.
    pub label: String,
    /// Submitted value.
    pub value: String,
    /// Secondary text.
    pub description: Option<String>,
    /// Whether the option is preselected.
    #[serde(deserialize_with = "bool_or_null")]
    pub default: bool,
    /// Emoji shown before the label.
    pub emoji: Option<ComponentEmoji>,
}

/// A poll attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Poll {
    /// How the poll was collected (`native`, `reactions`, ...).
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Poll question.
    pub question: Option<String>,
    /// Answers with their vote counts.
    pub options: Vec<PollOption>,
    /// Total number of votes, when reported.
    pub total_votes: Option<u64>,
    /// Closing time (RFC 3339).
    pub ends_at: Option<String>,
    /// Whether the poll was explicitly closed.
    #[serde(deserialize_with = "bool_or_null")]
    pub closed: bool,
}

/// One poll answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PollOption {
    /// Answer id.
    #[serde(deserialize_with = "opt_string_or_number")]
    pub id: Option<String>,
    /// Answer text.
    pub label: Option<String>,
    /// Vote count.
    pub count: Option<u64>,
}

/// The slash command invocation behind a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Interaction {
    /// Interaction id.
    #[serde(deserialize_with = "opt_string_or_number")]
    pub id: Option<String>,
    /// Command name.
    pub name: Option<String>,
    /// The invoking user.
    pub user: Option<InteractionUser>,
}

/// The user who invoked a slash command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InteractionUser {
    /// User id.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Account name.
    pub username: String,
}

/// A forwarded message reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Forwarded {
    /// Id of the original message.
    pub from_message_id: Option<String>,
    /// Channel the original lives in.
    pub from_channel_id: Option<String>,
    /// Guild the original lives in.
    pub from_guild_id: Option<String>,
    /// Snapshot of the original message, when captured.
    pub original: Option<ForwardedOriginal>,
}

/// Snapshot of a forwarded message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardedOriginal {
    /// Original message id.
    pub id: Option<String>,
    /// Original markup text.
    pub content: String,
    /// Original author id.
    pub author: Option<String>,
    /// Original send time.
    pub created_at: Option<DateTime<Utc>>,
    /// Original embeds.
    pub embeds: Vec<Embed>,
    /// Original attachments.
    pub attachments: Vec<Attachment>,
    /// Original stickers.
    pub stickers: Vec<Sticker>,
}

/// Component type codes inside `actionRows`.
const COMPONENT_BUTTON: i64 = 2;
const SELECT_COMPONENTS: [i64; 5] = [3, 5, 6, 7, 8];

impl<'de> Deserialize<'de> for RawMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;

        let (buttons, selects) = extract_components(&value);

        Ok(Self {
            id: get_id(&value, &["id"]).unwrap_or_else(|| "0".to_owned()),
            content: get_string(&value, &["content"]).unwrap_or_default(),
            author: extract_author(value.get("author")),
            created_at: value
                .get("createdAt")
                .or_else(|| value.get("timestamp"))
                .and_then(parse_time),
            edited_at: value
                .get("editedAt")
                .or_else(|| value.get("edited_timestamp"))
                .and_then(parse_time),
            attachments: extract_attachments(value.get("attachments")),
            embeds: extract_list(value.get("embeds")),
            stickers: extract_list(value.get("stickers")),
            reactions: extract_list(value.get("reactions")),
            buttons,
            selects,
            poll: extract_optional(value.get("poll")),
            interaction: extract_optional(value.get("interaction")),
            referenced_message_id: get_id(&value, &["referencedMessageId"])
                .or_else(|| get_id(&value, &["referenced_message_id"]))
                .or_else(|| get_id(&value, &["replyTo", "id"])),
            forwarded: value.get("forwarded").and_then(extract_forwarded),
            pinned: value
                .get("pinned")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false),
            message_type: extract_message_type(value.get("messageType")),
        })
    }
}

/// Reads the author field, which may be an id, a number or an inline object.
fn extract_author(value: Option<&serde_json::Value>) -> AuthorRef {
    match value {
        Some(serde_json::Value::String(id)) => AuthorRef::Id(id.clone()),
        Some(serde_json::Value::Number(n)) => AuthorRef::Id(n.to_string()),
        Some(obj @ serde_json::Value::Object(_)) => AuthorRef::Inline {
            id: get_id(obj, &["id"]),
            info: serde_json::from_value(obj.clone()).unwrap_or_default(),
        },
        _ => AuthorRef::Unknown,
    }
}

/// Accepts numeric codes, numeric strings and a few symbolic names.
fn extract_message_type(value: Option<&serde_json::Value>) -> MessageType {
    let Some(value) = value else {
        return MessageType::Default;
    };
    if let Some(code) = value.as_i64() {
        return MessageType::from_code(code);
    }
    match value.as_str().map(str::trim) {
        Some("Default" | "DEFAULT") => MessageType::Default,
        Some("ChannelPinnedMessage" | "CHANNEL_PINNED_MESSAGE") => {
            MessageType::ChannelPinnedMessage
        }
        Some("UserJoin" | "GUILD_MEMBER_JOIN") => MessageType::UserJoin,
        Some("Reply" | "REPLY") => MessageType::Reply,
        Some("ChatInputCommand" | "CHAT_INPUT_COMMAND") => MessageType::ChatInputCommand,
        Some("PollResult" | "POLL_RESULT") => MessageType::PollResult,
        Some(other) => other
            .parse::<i64>()
            .map_or(MessageType::Default, MessageType::from_code),
        None => MessageType::Default,
    }
}

/// Attachments arrive either as objects or, in forwarded snapshots, as bare URLs.
fn extract_attachments(value: Option<&serde_json::Value>) -> Vec<Attachment> {
    value
        .and_then(serde_json::Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|item| match item {
            serde_json::Value::String(url) => Some(Attachment {
                url: url.clone(),
                ..Attachment::default()
            }),
            obj @ serde_json::Value::Object(_) => serde_json::from_value(obj.clone()).ok(),
            _ => None,
        })
        .filter(|a| !a.url.is_empty())
        .collect()
}

/// Deserializes every element of a JSON array, skipping malformed entries.
fn extract_list<T>(value: Option<&serde_json::Value>) -> Vec<T>
where
    T: for<'a> Deserialize<'a>,
{
    value
        .and_then(serde_json::Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|item| serde_json::from_value(item.clone()).ok())
        .collect()
}

fn extract_optional<T>(value: Option<&serde_json::Value>) -> Option<T>
where
    T: for<'a> Deserialize<'a>,
{
    value
        .filter(|v| !v.is_null())
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

/// Collects buttons and selects from `actionRows`, falling back to the flat
/// `buttons`/`selects` arrays when the rows contain none.
fn extract_components(value: &serde_json::Value) -> (Vec<Button>, Vec<Select>) {
    let components: Vec<&serde_json::Value> = value
        .get("actionRows")
        .and_then(serde_json::Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|row| row.get("components")?.as_array())
        .flatten()
        .collect();

    let component_type = |c: &serde_json::Value| c.get("type").and_then(serde_json::Value::as_i64);

    let mut buttons: Vec<Button> = components
        .iter()
        .filter(|c| component_type(c) == Some(COMPONENT_BUTTON))
        .filter_map(|c| serde_json::from_value((*c).clone()).ok())
        .collect();
    if buttons.is_empty() {
        buttons = extract_list(value.get("buttons"));
    }

    let mut selects: Vec<Select> = components
        .iter()
        .filter(|c| component_type(c).is_some_and(|t| SELECT_COMPONENTS.contains(&t)))
        .filter_map(|c| serde_json::from_value((*c).clone()).ok())
        .collect();
    if selects.is_empty() {
        selects = extract_list(value.get("selects"));
    }

    (buttons, selects)
}

fn extract_forwarded(value: &serde_json::Value) -> Option<Forwarded> {
    if !value.is_object() {
        return None;
    }
    let original = value
        .get("original")
        .filter(|o| o.is_object())
        .map(|o| ForwardedOriginal {
            id: get_id(o, &["id"]),
            content: get_string(o, &["content"]).unwrap_or_default(),
            author: get_id(o, &["author"]).or_else(|| get_id(o, &["author", "id"])),
            created_at: o.get("createdAt").and_then(parse_time),
            embeds: extract_list(o.get("embeds")),
            attachments: extract_attachments(o.get("attachments")),
            stickers: extract_list(o.get("stickers")),
        });

    Some(Forwarded {
        from_message_id: get_id(value, &["fromMessageId"]),
        from_channel_id: get_id(value, &["fromChannelId"]),
        from_guild_id: get_id(value, &["fromGuildId"]),
        original,
    })
}

/// Parses an RFC 3339 string or a millisecond epoch number.
fn parse_time(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        serde_json::Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

/// Navigates a JSON path and returns the string value at the end.
///
/// # Arguments
///
/// * `value` - The root JSON value to navigate from
/// * `path` - A sequence of keys to follow through the JSON structure
fn get_str<'a>(value: &'a serde_json::Value, path: &[&str]) -> Option<&'a str> {
    let mut current = value;
    for key in path {
        current = current.get(*key)?;
    }
    current.as_str()
}

/// Like [`get_str`] but returns an owned `String`.
fn get_string(value: &serde_json::Value, path: &[&str]) -> Option<String> {
    get_str(value, path).map(str::to_owned)
}

/// Like [`get_string`] but also accepts numbers, which some sources use for ids.
fn get_id(value: &serde_json::Value, path: &[&str]) -> Option<String> {
    let mut current = value;
    for key in path {
        current = current.get(*key)?;
    }
    match current {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Deserializes a string that may have been written as a JSON number.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(opt_string_or_number(deserializer)?.unwrap_or_default())
}

/// Optional variant of [`string_or_number`]; `null` becomes `None`.
pub(crate) fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Deserializes a boolean where `null` means `false`.
pub(crate) fn bool_or_null<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

/// Parses a JSON string into a [`Transcript`] structure.
///
/// This is the main entry point for parsing channel exports.
///
/// # Errors
///
/// Returns an error if the JSON is malformed or lacks the `messages` array.
pub fn parse_transcript(json_str: &str) -> Result<Transcript, ParseError> {
    serde_json::from_str(json_str).context(JsonSnafu)
}
