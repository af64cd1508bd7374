// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Lookup of users, roles and channels referenced by id.
//!
//! Exports carry three id keyed tables. Ids inside message text and in the
//! tables come from different upstream sources and are not consistently
//! typed, so every lookup tries three tiers in order:
//!
//! 1. exact key match
//! 2. numeric equality (`"0123"` finds the key `"123"`)
//! 3. whitespace-trimmed equality (`" 123 "` finds `"123"`)
//!
//! Only entries that carry a usable name count as a hit. The numeric and
//! trimmed indexes are built once by [`Resolver::new`] and live as long as the
//! caller keeps the resolver, normally one export run.

use crate::parser::{opt_string_or_number, string_or_number};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

/// Shown in place of an unresolved user mention.
pub const UNKNOWN_USER: &str = "unknown-user";
/// Shown in place of an unresolved role mention.
pub const UNKNOWN_ROLE: &str = "unknown-role";
/// Shown in place of an unresolved channel mention.
pub const UNKNOWN_CHANNEL: &str = "unknown";

/// Caller supplied id keyed tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ResolverTables {
    /// Known users.
    #[serde(rename = "resolvedUsers", default)]
    pub users: BTreeMap<String, UserInfo>,
    /// Known roles.
    #[serde(rename = "resolvedRoles", default)]
    pub roles: BTreeMap<String, RoleInfo>,
    /// Known channels.
    #[serde(rename = "resolvedChannels", default)]
    pub channels: BTreeMap<String, ChannelInfo>,
}

/// Profile data for a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserInfo {
    /// Global display name.
    #[serde(alias = "name", alias = "globalName")]
    pub display_name: Option<String>,
    /// Server nickname.
    pub nickname: Option<String>,
    /// Account name.
    pub username: Option<String>,
    /// Avatar hash or URL.
    pub avatar: Option<String>,
    /// Whether the account is a bot.
    #[serde(deserialize_with = "crate::parser::bool_or_null")]
    pub bot: bool,
    /// Whether the bot is verified.
    #[serde(deserialize_with = "crate::parser::bool_or_null")]
    pub verified: bool,
    /// Name colour from the highest coloured role.
    #[serde(deserialize_with = "opt_string_or_number")]
    pub color: Option<String>,
    /// Server tag shown after the name.
    #[serde(deserialize_with = "opt_string_or_number")]
    pub guild_tag: Option<String>,
}

impl UserInfo {
    /// The name to display: display name, then nickname, then username.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        [&self.display_name, &self.nickname, &self.username]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
    }
}

/// A role definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RoleInfo {
    /// Role name.
    pub name: String,
    /// Role colour as hex or decimal.
    #[serde(deserialize_with = "opt_string_or_number")]
    pub color: Option<String>,
}

/// A channel definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelInfo {
    /// Channel name.
    pub name: Option<String>,
    /// Owning guild.
    #[serde(deserialize_with = "string_or_number")]
    pub guild_id: String,
}

/// A resolved role mention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRole {
    /// Role name.
    pub name: String,
    /// Normalized `#rrggbb` colour, if the role has one.
    pub color: Option<String>,
}

/// Numeric and trimmed secondary indexes over one table.
#[derive(Debug, Default)]
struct LookupIndex {
    numeric: HashMap<u64, String>,
    trimmed: HashMap<String, String>,
}

impl LookupIndex {
    fn build<'a, I>(usable_keys: I) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut index = Self::default();
        for key in usable_keys {
            if let Ok(n) = key.trim().parse::<u64>() {
                index.numeric.entry(n).or_insert_with(|| key.clone());
            }
            index
                .trimmed
                .entry(key.trim().to_owned())
                .or_insert_with(|| key.clone());
        }
        index
    }
}

/// Looks up a key in `table`, falling back to the numeric and trimmed tiers.
fn lookup<'t, V>(
    table: &'t BTreeMap<String, V>,
    index: &LookupIndex,
    id: &str,
    usable: impl Fn(&V) -> bool,
) -> Option<&'t V> {
    if let Some(v) = table.get(id).filter(|v| usable(v)) {
        return Some(v);
    }
    if let Ok(n) = id.trim().parse::<u64>()
        && let Some(key) = index.numeric.get(&n)
    {
        return table.get(key);
    }
    index
        .trimmed
        .get(id.trim())
        .and_then(|key| table.get(key))
}

/// Resolves ids against a set of [`ResolverTables`].
///
/// Lookups are pure: the same id always yields the same answer for the
/// lifetime of the resolver.
#[derive(Debug)]
pub struct Resolver<'t> {
    tables: &'t ResolverTables,
    users: LookupIndex,
    roles: LookupIndex,
    channels: LookupIndex,
}

impl<'t> Resolver<'t> {
    /// Builds the lookup indexes for `tables`.
    #[must_use]
    pub fn new(tables: &'t ResolverTables) -> Self {
        let users = LookupIndex::build(
            tables
                .users
                .iter()
                .filter(|(_, u)| u.name().is_some())
                .map(|(k, _)| k),
        );
        let roles = LookupIndex::build(
            tables
                .roles
                .iter()
                .filter(|(_, r)| has_name(&r.name))
                .map(|(k, _)| k),
        );
        let channels = LookupIndex::build(
            tables
                .channels
                .iter()
                .filter(|(_, c)| c.name.as_deref().is_some_and(has_name))
                .map(|(k, _)| k),
        );
        Self {
            tables,
            users,
            roles,
            channels,
        }
    }

    /// Returns the full profile for a user id.
    #[must_use]
    pub fn user(&self, id: &str) -> Option<&'t UserInfo> {
        lookup(&self.tables.users, &self.users, id, |u| u.name().is_some())
    }

    /// Returns the display name for a user id.
    #[must_use]
    pub fn resolve_user(&self, id: &str) -> Option<&'t str> {
        self.user(id).and_then(UserInfo::name)
    }

    /// Returns the name and colour for a role id.
    #[must_use]
    pub fn resolve_role(&self, id: &str) -> Option<ResolvedRole> {
        lookup(&self.tables.roles, &self.roles, id, |r| has_name(&r.name)).map(|role| {
            ResolvedRole {
                name: role.name.trim().to_owned(),
                color: role.color.as_deref().and_then(normalize_color),
            }
        })
    }

    /// Returns the name for a channel id.
    #[must_use]
    pub fn resolve_channel(&self, id: &str) -> Option<&'t str> {
        lookup(&self.tables.channels, &self.channels, id, |c| {
            c.name.as_deref().is_some_and(has_name)
        })
        .and_then(|c| c.name.as_deref())
        .map(str::trim)
    }
}

fn has_name(name: &str) -> bool {
    !name.trim().is_empty()
}

/// Normalizes a colour given as `#rrggbb`, `rrggbb`, `0xrrggbb` or a decimal
/// integer into lowercase `#rrggbb`.
///
/// Zero is the platform's "no colour" value and yields `None`.
#[must_use]
pub fn normalize_color(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let hex = raw
        .strip_prefix('#')
        .or_else(|| raw.strip_prefix("0x"))
        .or_else(|| raw.strip_prefix("0X"));

    let value = match hex {
        Some(digits) => u32::from_str_radix(digits, 16).ok()?,
        None if raw.len() == 6 && raw.chars().any(|c| c.is_ascii_alphabetic()) => {
            u32::from_str_radix(raw, 16).ok()?
        }
        None => raw.parse::<u32>().ok()?,
    };

    (value != 0 && value <= 0x00FF_FFFF).then(|| format!("#{value:06x}"))
}
