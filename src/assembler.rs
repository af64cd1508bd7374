// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Cross-referencing and grouping of the ordered message list.
//!
//! [`assemble_messages`] walks the messages once, in input order, and for
//! each one decides:
//!
//! - who wrote it (resolved through the user table),
//! - which earlier message it replies to, or a placeholder if that message
//!   is not part of the export,
//! - what it forwards, copied eagerly from the forwarded snapshot,
//! - which pinned message a pin notice refers to,
//! - whether a date separator precedes it, and
//! - whether it is compact (grouped under the previous message's header).
//!
//! Output order is always input order.

use crate::cdn::CdnUrls;
use crate::parser::{
    Attachment, AuthorRef, Embed, Forwarded, MessageType, RawMessage, Sticker,
};
use crate::resolver::{Resolver, UserInfo, normalize_color};
use crate::timestamp::local_offset;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Content shown when a reply target is not in the export.
pub const MISSING_REPLY_CONTENT: &str = "Message not in transcript";
/// Author shown when a reply target is not in the export.
pub const MISSING_REPLY_AUTHOR: &str = "Unknown User";
/// Name used when an author cannot be resolved at all.
pub const UNKNOWN_AUTHOR: &str = "Unknown";

/// Largest gap between two messages that still groups them.
pub const GROUP_WINDOW_SECS: i64 = 300;

/// Options for [`assemble_messages`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssembleOptions {
    /// Offset that defines calendar days for date separators.
    pub utc_offset: FixedOffset,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            utc_offset: local_offset(),
        }
    }
}

/// Which messages to drop before assembly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreOptions {
    /// Drop messages written by bots.
    pub bots: bool,
    /// Drop messages by these user ids.
    pub user_ids: Vec<String>,
    /// Keep only the most recent N messages.
    pub limit: Option<usize>,
}

/// A resolved message author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Author {
    /// User id, if known.
    pub id: Option<String>,
    /// Display name.
    pub name: String,
    /// Avatar image URL.
    pub avatar_url: String,
    /// Whether the account is a bot.
    pub bot: bool,
    /// Whether the bot is verified.
    pub verified: bool,
    /// Name colour as `#rrggbb`.
    pub color: Option<String>,
    /// Server tag shown after the name.
    pub guild_tag: Option<String>,
}

impl Author {
    fn named(id: Option<String>, name: &str, cdn: &dyn CdnUrls) -> Self {
        Self {
            avatar_url: cdn.avatar_url(id.as_deref().unwrap_or_default(), None),
            id,
            name: name.to_owned(),
            bot: false,
            verified: false,
            color: None,
            guild_tag: None,
        }
    }
}

/// The replied-to message as shown above a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyPreview {
    /// Id of the replied-to message.
    pub id: String,
    /// Raw text of the replied-to message, or the missing placeholder.
    pub content: String,
    /// Author of the replied-to message.
    pub author: Author,
    /// Whether the target carries attachments, embeds or stickers.
    pub has_media: bool,
    /// When the target was sent.
    pub timestamp: Option<DateTime<Utc>>,
    /// Whether the target was edited.
    pub edited: bool,
    /// Whether the target was found in the export.
    pub found: bool,
}

/// A forwarded message, copied out of the snapshot at assembly time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForwardedMessage {
    /// Id of the original message.
    pub message_id: Option<String>,
    /// Channel the original was posted in.
    pub channel_id: Option<String>,
    /// Resolved name of that channel.
    pub channel_name: Option<String>,
    /// Guild of the original.
    pub guild_id: Option<String>,
    /// Original raw text.
    pub content: String,
    /// Original author, if the snapshot names one.
    pub author: Option<Author>,
    /// Original send time.
    pub created_at: Option<DateTime<Utc>>,
    /// Original embeds.
    #[serde(skip)]
    pub embeds: Vec<Embed>,
    /// Original attachments.
    #[serde(skip)]
    pub attachments: Vec<Attachment>,
    /// Original stickers.
    #[serde(skip)]
    pub stickers: Vec<Sticker>,
}

/// The pinned message a pin notice refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PinnedReference {
    /// Id of the pinned message.
    pub id: String,
    /// Author of the pinned message, when it is in the export.
    pub author: Option<Author>,
    /// Whether the pinned message is in the export.
    pub found: bool,
}

/// A message with its cross-references and layout decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledMessage<'a> {
    /// The underlying record.
    pub raw: &'a RawMessage,
    /// Resolved author.
    pub author: Author,
    /// The message this one replies to.
    pub reply_to: Option<ReplyPreview>,
    /// The message this one forwards.
    pub forwarded: Option<ForwardedMessage>,
    /// For pin notices, the message that was pinned.
    pub pinned_reference: Option<PinnedReference>,
    /// Rendered without its own header.
    pub compact: bool,
    /// A date separator goes right before this message.
    pub date_separator_before: bool,
}

/// Builds the assembled list for one export.
///
/// Replies resolve only against messages seen earlier in the list.
#[must_use]
pub fn assemble_messages<'a>(
    messages: &'a [RawMessage],
    resolver: &Resolver<'_>,
    cdn: &dyn CdnUrls,
    opts: &AssembleOptions,
) -> Vec<AssembledMessage<'a>> {
    let pinned: HashMap<&str, &RawMessage> = pinned_messages(messages)
        .into_iter()
        .map(|m| (m.id.as_str(), m))
        .collect();

    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut out: Vec<AssembledMessage<'a>> = Vec::with_capacity(messages.len());
    let mut last_day: Option<NaiveDate> = None;

    for raw in messages {
        let author = build_author(&raw.author, resolver, cdn);

        let reply_to = reply_target(raw).map(|target_id| {
            seen.get(target_id).map_or_else(
                || missing_reply(target_id, cdn),
                |&index| reply_preview(&out[index]),
            )
        });

        let pinned_reference = pin_target(raw).map(|target_id| {
            let target = pinned
                .get(target_id)
                .map(|m| build_author(&m.author, resolver, cdn));
            PinnedReference {
                id: target_id.to_owned(),
                found: target.is_some(),
                author: target,
            }
        });

        let forwarded = raw
            .forwarded
            .as_ref()
            .map(|f| resolve_forward(f, resolver, cdn));

        let previous = out.last();
        let day = raw.created_at.map(|t| local_day(t, opts.utc_offset));
        // Undated messages never move the last seen day.
        let date_separator_before =
            previous.is_none() || day.is_some_and(|d| last_day != Some(d));
        if day.is_some() {
            last_day = day;
        }
        let compact = !date_separator_before
            && previous.is_some_and(|prev| groups_with(prev.raw, raw));

        out.push(AssembledMessage {
            raw,
            author,
            reply_to,
            forwarded,
            pinned_reference,
            compact,
            date_separator_before,
        });
        seen.entry(raw.id.as_str()).or_insert(out.len() - 1);
    }

    out
}

/// Pinned messages in input order.
#[must_use]
pub fn pinned_messages(messages: &[RawMessage]) -> Vec<&RawMessage> {
    messages.iter().filter(|m| m.pinned).collect()
}

/// Drops ignored messages and applies the limit, keeping input order.
#[must_use]
pub fn filter_messages(
    messages: Vec<RawMessage>,
    resolver: &Resolver<'_>,
    opts: &IgnoreOptions,
) -> Vec<RawMessage> {
    let mut kept: Vec<RawMessage> = messages
        .into_iter()
        .filter(|m| !(opts.bots && is_bot(&m.author, resolver)))
        .filter(|m| {
            m.author
                .id()
                .is_none_or(|id| !opts.user_ids.iter().any(|ignored| same_id(ignored, id)))
        })
        .collect();

    if let Some(limit) = opts.limit
        && kept.len() > limit
    {
        kept.drain(..kept.len() - limit);
    }
    kept
}

fn is_bot(author: &AuthorRef, resolver: &Resolver<'_>) -> bool {
    match author {
        AuthorRef::Id(id) => resolver.user(id).is_some_and(|u| u.bot),
        AuthorRef::Inline { id, info } => {
            info.bot || id.as_deref().and_then(|id| resolver.user(id)).is_some_and(|u| u.bot)
        }
        AuthorRef::Unknown => false,
    }
}

fn same_id(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    a == b || matches!((a.parse::<u64>(), b.parse::<u64>()), (Ok(x), Ok(y)) if x == y)
}

/// The id a message replies to. Pin notices use the same field for the
/// pinned message, which is not a reply.
fn reply_target(raw: &RawMessage) -> Option<&str> {
    if raw.message_type == MessageType::ChannelPinnedMessage {
        return None;
    }
    raw.referenced_message_id.as_deref()
}

fn pin_target(raw: &RawMessage) -> Option<&str> {
    if raw.message_type == MessageType::ChannelPinnedMessage {
        raw.referenced_message_id.as_deref()
    } else {
        None
    }
}

fn is_reply(raw: &RawMessage) -> bool {
    reply_target(raw).is_some()
}

/// Whether `current` can share `previous`'s header. The date separator
/// check happens in the caller.
fn groups_with(previous: &RawMessage, current: &RawMessage) -> bool {
    let same_author = matches!(
        (previous.author.id(), current.author.id()),
        (Some(a), Some(b)) if a == b
    );
    let within_window = matches!(
        (previous.created_at, current.created_at),
        (Some(a), Some(b)) if b.signed_duration_since(a).num_seconds() <= GROUP_WINDOW_SECS
    );

    same_author
        && within_window
        && !is_reply(previous)
        && !is_reply(current)
        && !previous.message_type.is_system_notice()
        && !current.message_type.is_system_notice()
}

fn local_day(dt: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    dt.with_timezone(&offset).date_naive()
}

fn reply_preview(target: &AssembledMessage<'_>) -> ReplyPreview {
    let raw = target.raw;
    ReplyPreview {
        id: raw.id.clone(),
        content: raw.content.clone(),
        author: target.author.clone(),
        has_media: !raw.attachments.is_empty()
            || !raw.embeds.is_empty()
            || !raw.stickers.is_empty(),
        timestamp: raw.created_at,
        edited: raw.edited_at.is_some(),
        found: true,
    }
}

fn missing_reply(id: &str, cdn: &dyn CdnUrls) -> ReplyPreview {
    ReplyPreview {
        id: id.to_owned(),
        content: MISSING_REPLY_CONTENT.to_owned(),
        author: Author::named(None, MISSING_REPLY_AUTHOR, cdn),
        has_media: false,
        timestamp: None,
        edited: false,
        found: false,
    }
}

fn resolve_forward(
    forwarded: &Forwarded,
    resolver: &Resolver<'_>,
    cdn: &dyn CdnUrls,
) -> ForwardedMessage {
    let original = forwarded.original.as_ref();
    ForwardedMessage {
        message_id: forwarded
            .from_message_id
            .clone()
            .or_else(|| original.and_then(|o| o.id.clone())),
        channel_id: forwarded.from_channel_id.clone(),
        channel_name: forwarded
            .from_channel_id
            .as_deref()
            .and_then(|id| resolver.resolve_channel(id))
            .map(str::to_owned),
        guild_id: forwarded.from_guild_id.clone(),
        content: original.map(|o| o.content.clone()).unwrap_or_default(),
        author: original
            .and_then(|o| o.author.as_deref())
            .map(|id| build_author(&AuthorRef::Id(id.to_owned()), resolver, cdn)),
        created_at: original.and_then(|o| o.created_at),
        embeds: original.map(|o| o.embeds.clone()).unwrap_or_default(),
        attachments: original.map(|o| o.attachments.clone()).unwrap_or_default(),
        stickers: original.map(|o| o.stickers.clone()).unwrap_or_default(),
    }
}

/// Resolves an author reference. Inline data wins over the user table
/// field by field.
#[must_use]
pub fn build_author(author: &AuthorRef, resolver: &Resolver<'_>, cdn: &dyn CdnUrls) -> Author {
    let (id, inline) = match author {
        AuthorRef::Id(id) => (Some(id.as_str()), None),
        AuthorRef::Inline { id, info } => (id.as_deref(), Some(info)),
        AuthorRef::Unknown => (None, None),
    };
    let table = id.and_then(|id| resolver.user(id));

    let name = inline
        .and_then(UserInfo::name)
        .or_else(|| table.and_then(UserInfo::name))
        .unwrap_or(UNKNOWN_AUTHOR)
        .to_owned();
    let avatar = pick(inline, table, |u| u.avatar.as_deref());

    Author {
        avatar_url: cdn.avatar_url(id.unwrap_or_default(), avatar.as_deref()),
        id: id.map(str::to_owned),
        name,
        bot: inline.is_some_and(|i| i.bot) || table.is_some_and(|t| t.bot),
        verified: inline.is_some_and(|i| i.verified) || table.is_some_and(|t| t.verified),
        color: pick(inline, table, |u| u.color.as_deref()).and_then(|c| normalize_color(&c)),
        guild_tag: pick(inline, table, |u| u.guild_tag.as_deref()),
    }
}

/// First non-blank value of `field`, inline profile first.
fn pick(
    inline: Option<&UserInfo>,
    table: Option<&UserInfo>,
    field: fn(&UserInfo) -> Option<&str>,
) -> Option<String> {
    [inline, table]
        .into_iter()
        .flatten()
        .filter_map(field)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cdn::DiscordCdn;
    use crate::parser::ForwardedOriginal;
    use crate::resolver::ResolverTables;
    use chrono::TimeZone;

    /// 2024-12-05T10:00:00Z
    pub(crate) const T: i64 = 1_733_392_800;

    pub(crate) fn msg(id: &str, author: &str, secs: i64) -> RawMessage {
        RawMessage {
            id: id.into(),
            content: format!("message {id}"),
            author: AuthorRef::Id(author.into()),
            created_at: Some(Utc.timestamp_opt(secs, 0).unwrap()),
            edited_at: None,
            attachments: vec![],
            embeds: vec![],
            stickers: vec![],
            reactions: vec![],
            buttons: vec![],
            selects: vec![],
            poll: None,
            interaction: None,
            referenced_message_id: None,
            forwarded: None,
            pinned: false,
            message_type: MessageType::Default,
        }
    }

    fn tables() -> ResolverTables {
        let mut t = ResolverTables::default();
        t.users.insert(
            "A".into(),
            UserInfo {
                username: Some("alice".into()),
                avatar: Some("abc".into()),
                color: Some("16711680".into()),
                ..UserInfo::default()
            },
        );
        t.users.insert(
            "B".into(),
            UserInfo {
                username: Some("botty".into()),
                bot: true,
                ..UserInfo::default()
            },
        );
        t
    }

    fn utc() -> AssembleOptions {
        AssembleOptions {
            utc_offset: FixedOffset::east_opt(0).unwrap(),
        }
    }

    fn assemble(messages: &[RawMessage]) -> Vec<AssembledMessage<'_>> {
        let tables = tables();
        let resolver = Resolver::new(&tables);
        assemble_messages(messages, &resolver, &DiscordCdn::default(), &utc())
    }

    #[test]
    fn groups_within_five_minutes() {
        let messages = [msg("1", "A", T), msg("2", "A", T + 10), msg("3", "A", T + 600)];
        let out = assemble(&messages);

        assert!(!out[0].compact);
        assert!(out[1].compact);
        assert!(!out[2].compact);
    }

    #[test]
    fn window_boundary_is_inclusive() {
        let messages = [msg("1", "A", T), msg("2", "A", T + GROUP_WINDOW_SECS)];
        assert!(assemble(&messages)[1].compact);
    }

    #[test]
    fn different_authors_do_not_group() {
        let messages = [msg("1", "A", T), msg("2", "B", T + 10)];
        assert!(!assemble(&messages)[1].compact);
    }

    #[test]
    fn replies_break_groups() {
        let mut reply = msg("2", "A", T + 10);
        reply.referenced_message_id = Some("1".into());
        let messages = [msg("1", "A", T), reply, msg("3", "A", T + 20)];
        let out = assemble(&messages);

        assert!(!out[1].compact);
        assert!(!out[2].compact);
    }

    #[test]
    fn join_notices_break_groups() {
        let mut join = msg("1", "A", T);
        join.message_type = MessageType::UserJoin;
        let messages = [join, msg("2", "A", T + 10)];
        assert!(!assemble(&messages)[1].compact);
    }

    #[test]
    fn reply_to_earlier_message() {
        let mut reply = msg("2", "B", T + 10);
        reply.referenced_message_id = Some("1".into());
        let messages = [msg("1", "A", T), reply];
        let out = assemble(&messages);

        let preview = out[1].reply_to.as_ref().unwrap();
        assert!(preview.found);
        assert_eq!(preview.content, "message 1");
        assert_eq!(preview.author.name, "alice");
    }

    #[test]
    fn reply_to_missing_message_uses_placeholder() {
        let mut reply = msg("4", "A", T);
        reply.referenced_message_id = Some("999".into());
        let out = assemble(std::slice::from_ref(&reply));

        let preview = out[0].reply_to.as_ref().unwrap();
        assert!(!preview.found);
        assert_eq!(preview.content, MISSING_REPLY_CONTENT);
        assert_eq!(preview.author.name, MISSING_REPLY_AUTHOR);
    }

    #[test]
    fn reply_to_later_message_uses_placeholder() {
        let mut reply = msg("1", "A", T);
        reply.referenced_message_id = Some("2".into());
        let messages = [reply, msg("2", "B", T + 10)];
        assert!(!assemble(&messages)[0].reply_to.as_ref().unwrap().found);
    }

    #[test]
    fn reply_preview_flags_media() {
        let mut target = msg("1", "A", T);
        target.attachments.push(Attachment {
            url: "https://cdn.example.com/a.png".into(),
            ..Attachment::default()
        });
        let mut reply = msg("2", "B", T + 10);
        reply.referenced_message_id = Some("1".into());
        let messages = [target, reply];
        assert!(assemble(&messages)[1].reply_to.as_ref().unwrap().has_media);
    }

    #[test]
    fn date_separators_follow_calendar_days() {
        // 23:59:00 and 23:59:30 on one day, then 00:00:10 the next.
        let midnight = 1_733_443_200; // 2024-12-06T00:00:00Z
        let messages = [
            msg("1", "A", midnight - 60),
            msg("2", "A", midnight - 30),
            msg("3", "A", midnight + 10),
        ];
        let out = assemble(&messages);

        assert!(out[0].date_separator_before);
        assert!(!out[1].date_separator_before);
        assert!(out[2].date_separator_before);
        assert_eq!(out.iter().filter(|m| m.date_separator_before).count(), 2);
        // The separator forces a full header even for the same author.
        assert!(!out[2].compact);
    }

    #[test]
    fn undated_messages_do_not_consume_the_first_separator() {
        let mut undated = msg("1", "A", T);
        undated.created_at = None;
        let mut undated_later = msg("3", "A", T);
        undated_later.created_at = None;
        let messages = [
            undated,
            msg("2", "A", T),
            undated_later,
            msg("4", "A", T + 60),
            msg("5", "A", T + 86_400),
        ];
        let out = assemble(&messages);

        let separators: Vec<bool> = out.iter().map(|m| m.date_separator_before).collect();
        // The first dated message opens its day; an undated one in between
        // does not reopen it.
        assert_eq!(separators, [true, true, false, false, true]);
        assert!(!out[1].compact);
    }

    #[test]
    fn date_separators_use_offset() {
        let midnight = 1_733_443_200;
        let messages = [msg("1", "A", midnight - 60), msg("2", "A", midnight + 10)];
        let tables = tables();
        let resolver = Resolver::new(&tables);
        let plus_two = AssembleOptions {
            utc_offset: FixedOffset::east_opt(2 * 3600).unwrap(),
        };
        let out = assemble_messages(&messages, &resolver, &DiscordCdn::default(), &plus_two);
        // Both fall on Dec 6 at +02:00.
        assert!(!out[1].date_separator_before);
    }

    #[test]
    fn pin_notices_reference_pinned_messages() {
        let mut pinned = msg("1", "A", T);
        pinned.pinned = true;
        let mut notice = msg("2", "B", T + 10);
        notice.message_type = MessageType::ChannelPinnedMessage;
        notice.referenced_message_id = Some("1".into());
        let messages = [pinned, notice];
        let out = assemble(&messages);

        assert!(out[1].reply_to.is_none());
        let pin = out[1].pinned_reference.as_ref().unwrap();
        assert!(pin.found);
        assert_eq!(pin.author.as_ref().unwrap().name, "alice");
    }

    #[test]
    fn forwards_are_copied_eagerly() {
        let mut fwd = msg("1", "A", T);
        fwd.forwarded = Some(Forwarded {
            from_message_id: Some("77".into()),
            from_channel_id: Some("9".into()),
            from_guild_id: None,
            original: Some(ForwardedOriginal {
                content: "original".into(),
                author: Some("B".into()),
                stickers: vec![Sticker {
                    id: "5".into(),
                    ..Sticker::default()
                }],
                ..ForwardedOriginal::default()
            }),
        });
        let out = assemble(std::slice::from_ref(&fwd));
        let forwarded = out[0].forwarded.as_ref().unwrap();

        assert_eq!(forwarded.message_id.as_deref(), Some("77"));
        assert_eq!(forwarded.content, "original");
        assert_eq!(forwarded.author.as_ref().unwrap().name, "botty");
        assert_eq!(forwarded.stickers.len(), 1);
    }

    #[test]
    fn authors_resolve_through_tables() {
        let messages = [msg("1", "A", T), msg("2", "nobody", T)];
        let out = assemble(&messages);

        assert_eq!(out[0].author.name, "alice");
        assert_eq!(out[0].author.color.as_deref(), Some("#ff0000"));
        assert_eq!(
            out[0].author.avatar_url,
            "https://cdn.discordapp.com/avatars/A/abc.png?size=128"
        );
        assert_eq!(out[1].author.name, UNKNOWN_AUTHOR);
    }

    #[test]
    fn inline_authors_override_tables() {
        let mut m = msg("1", "A", T);
        m.author = AuthorRef::Inline {
            id: Some("A".into()),
            info: UserInfo {
                display_name: Some("Alice Inline".into()),
                ..UserInfo::default()
            },
        };
        let out = assemble(std::slice::from_ref(&m));

        assert_eq!(out[0].author.name, "Alice Inline");
        // Avatar still comes from the table.
        assert!(out[0].author.avatar_url.contains("/avatars/A/abc"));
    }

    #[test]
    fn filters_bots_users_and_limit() {
        let tables = tables();
        let resolver = Resolver::new(&tables);
        let messages = vec![
            msg("1", "A", T),
            msg("2", "B", T + 1),
            msg("3", "C", T + 2),
            msg("4", "A", T + 3),
            msg("5", "D", T + 4),
        ];

        let opts = IgnoreOptions {
            bots: true,
            user_ids: vec![" C ".into()],
            limit: Some(2),
        };
        let kept = filter_messages(messages, &resolver, &opts);
        let ids: Vec<&str> = kept.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["4", "5"]);
    }

    #[test]
    fn pinned_messages_keep_order() {
        let mut a = msg("1", "A", T);
        a.pinned = true;
        let b = msg("2", "A", T);
        let mut c = msg("3", "A", T);
        c.pinned = true;
        let messages = [a, b, c];
        let ids: Vec<&str> = pinned_messages(&messages)
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(ids, ["1", "3"]);
    }
}
