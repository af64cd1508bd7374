// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Display formats for `<t:SECONDS:STYLE>` tokens and message headers.
//!
//! All formatting is done in a caller supplied UTC offset so output does not
//! depend on the machine running the conversion. Relative times are computed
//! against an injected "now".

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;

/// The seven timestamp token styles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum TimestampStyle {
    /// `t`: `4:20 PM`
    ShortTime,
    /// `T`: `4:20:30 PM`
    LongTime,
    /// `d`: `12/5/2024`
    ShortDate,
    /// `D`: `December 5, 2024`
    LongDate,
    /// `f`: `December 5, 2024 4:20 PM` (the default)
    #[default]
    ShortDateTime,
    /// `F`: `Thursday, December 5, 2024 at 4:20 PM`
    LongDateTime,
    /// `R`: `3 hours ago`
    Relative,
}

impl TimestampStyle {
    /// Parses a style letter.
    #[must_use]
    pub const fn from_char(c: char) -> Option<Self> {
        Some(match c {
            't' => Self::ShortTime,
            'T' => Self::LongTime,
            'd' => Self::ShortDate,
            'D' => Self::LongDate,
            'f' => Self::ShortDateTime,
            'F' => Self::LongDateTime,
            'R' => Self::Relative,
            _ => return None,
        })
    }

    /// The style letter used in tokens.
    #[must_use]
    pub const fn as_char(self) -> char {
        match self {
            Self::ShortTime => 't',
            Self::LongTime => 'T',
            Self::ShortDate => 'd',
            Self::LongDate => 'D',
            Self::ShortDateTime => 'f',
            Self::LongDateTime => 'F',
            Self::Relative => 'R',
        }
    }
}

/// Returns the offset of the machine's local time zone right now.
#[must_use]
pub fn local_offset() -> FixedOffset {
    *chrono::Local::now().offset()
}

/// Formats a Unix timestamp in the given style.
///
/// Returns `None` when `unix` is outside the representable range.
#[must_use]
pub fn format_timestamp(
    unix: i64,
    style: TimestampStyle,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Option<String> {
    let utc = DateTime::from_timestamp(unix, 0)?;
    let local = utc.with_timezone(&offset);
    Some(match style {
        TimestampStyle::ShortTime => local.format("%-I:%M %p").to_string(),
        TimestampStyle::LongTime => local.format("%-I:%M:%S %p").to_string(),
        TimestampStyle::ShortDate => local.format("%-m/%-d/%Y").to_string(),
        TimestampStyle::LongDate => local.format("%B %-d, %Y").to_string(),
        TimestampStyle::ShortDateTime => local.format("%B %-d, %Y %-I:%M %p").to_string(),
        TimestampStyle::LongDateTime => local.format("%A, %B %-d, %Y at %-I:%M %p").to_string(),
        TimestampStyle::Relative => format_relative(utc, now),
    })
}

/// Full date and time used for tooltips.
#[must_use]
pub fn format_full(dt: DateTime<Utc>, offset: FixedOffset) -> String {
    dt.with_timezone(&offset)
        .format("%A, %B %-d, %Y at %-I:%M %p")
        .to_string()
}

/// Date and time shown next to the author name.
#[must_use]
pub fn format_header(dt: DateTime<Utc>, offset: FixedOffset) -> String {
    dt.with_timezone(&offset)
        .format("%d.%m.%Y %I:%M %p")
        .to_string()
}

/// Time shown in the gutter of compact messages.
#[must_use]
pub fn format_short_time(dt: DateTime<Utc>, offset: FixedOffset) -> String {
    dt.with_timezone(&offset).format("%I:%M %p").to_string()
}

/// Label of a date separator.
#[must_use]
pub fn format_separator_date(dt: DateTime<Utc>, offset: FixedOffset) -> String {
    dt.with_timezone(&offset).format("%B %-d, %Y").to_string()
}

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const MONTH: i64 = 30 * DAY;
const YEAR: i64 = 365 * DAY;

/// Natural language distance between `then` and `now`.
///
/// Counts are rounded to the nearest unit. Past times read `N units ago`,
/// future times read `in N units`.
#[must_use]
pub fn format_relative(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = now.signed_duration_since(then).num_seconds();
    // The same instant reads as "1 second ago", never "0 seconds".
    let secs = delta.abs().max(1);

    let (count, unit) = if secs < MINUTE {
        (secs, "second")
    } else if secs < HOUR {
        (round_div(secs, MINUTE), "minute")
    } else if secs < DAY {
        (round_div(secs, HOUR), "hour")
    } else if secs < MONTH {
        (round_div(secs, DAY), "day")
    } else if secs < YEAR {
        (round_div(secs, MONTH), "month")
    } else {
        (round_div(secs, YEAR), "year")
    };

    let plural = if count == 1 { "" } else { "s" };
    if delta < 0 {
        format!("in {count} {unit}{plural}")
    } else {
        format!("{count} {unit}{plural} ago")
    }
}

const fn round_div(value: i64, unit: i64) -> i64 {
    (value + unit / 2) / unit
}
