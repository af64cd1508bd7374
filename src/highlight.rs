// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Syntax highlighting for fenced code blocks.
//!
//! The [`Highlighter`] trait is the seam between the markup engine and a
//! highlighting backend. Implementations return HTML with all code text
//! escaped and must never panic on odd input; the worst case is plain
//! escaped code.

use syntect::easy::HighlightLines;
use syntect::highlighting::{Theme, ThemeSet};
use syntect::html::{IncludeBackground, styled_line_to_highlighted_html};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;
use tracing::debug;

/// Default syntect theme, chosen to read well on the dark transcript theme.
pub const DEFAULT_THEME: &str = "base16-ocean.dark";

/// Turns code into highlighted, escaped HTML.
pub trait Highlighter {
    /// Highlights `code`, using `lang` as a hint when present.
    fn highlight(&self, code: &str, lang: Option<&str>) -> String;
}

/// Maps common short language names to the names backends know.
///
/// The result is lower-cased so `PY` and `py` agree.
#[must_use]
pub fn normalize_language(lang: &str) -> String {
    let lower = lang.trim().to_ascii_lowercase();
    match lower.as_str() {
        "py" => "python".to_owned(),
        "js" | "jsx" => "javascript".to_owned(),
        "ts" | "tsx" => "typescript".to_owned(),
        _ => lower,
    }
}

/// HTML-escapes code without any highlighting.
#[must_use]
pub fn escape_code(code: &str) -> String {
    html_escape::encode_text(code).into_owned()
}

/// A [`Highlighter`] that only escapes.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainHighlighter;

impl Highlighter for PlainHighlighter {
    fn highlight(&self, code: &str, _lang: Option<&str>) -> String {
        escape_code(code)
    }
}

/// A [`Highlighter`] backed by syntect's bundled grammars.
pub struct SyntectHighlighter {
    syntax_set: SyntaxSet,
    theme: Theme,
}

impl std::fmt::Debug for SyntectHighlighter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntectHighlighter")
            .field("syntaxes", &self.syntax_set.syntaxes().len())
            .field("theme", &self.theme.name)
            .finish()
    }
}

impl Default for SyntectHighlighter {
    fn default() -> Self {
        Self::with_theme(DEFAULT_THEME)
    }
}

impl SyntectHighlighter {
    /// Loads the default grammars and the named bundled theme.
    ///
    /// Unknown theme names fall back to syntect's default theme.
    #[must_use]
    pub fn with_theme(theme_name: &str) -> Self {
        let mut themes = ThemeSet::load_defaults();
        let theme = themes.themes.remove(theme_name).unwrap_or_else(|| {
            debug!(theme_name, "unknown highlight theme, using default");
            Theme::default()
        });
        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme,
        }
    }

    fn find_syntax(&self, code: &str, lang: Option<&str>) -> Option<&SyntaxReference> {
        if let Some(lang) = lang.map(normalize_language).filter(|l| !l.is_empty()) {
            if let Some(syntax) = self
                .syntax_set
                .find_syntax_by_token(&lang)
                .or_else(|| self.syntax_set.find_syntax_by_name(&capitalize(&lang)))
            {
                return Some(syntax);
            }
            debug!(lang, "no grammar for language, detecting from content");
        }
        let first_line = code.lines().next().unwrap_or_default();
        self.syntax_set.find_syntax_by_first_line(first_line)
    }

    fn highlight_with(&self, code: &str, syntax: &SyntaxReference) -> Option<String> {
        let mut highlighter = HighlightLines::new(syntax, &self.theme);
        let mut out = String::with_capacity(code.len() * 2);
        for line in LinesWithEndings::from(code) {
            let ranges = highlighter.highlight_line(line, &self.syntax_set).ok()?;
            let html = styled_line_to_highlighted_html(&ranges, IncludeBackground::No).ok()?;
            out.push_str(&html);
        }
        Some(out)
    }
}

impl Highlighter for SyntectHighlighter {
    fn highlight(&self, code: &str, lang: Option<&str>) -> String {
        let Some(syntax) = self.find_syntax(code, lang) else {
            return escape_code(code);
        };
        self.highlight_with(code, syntax).unwrap_or_else(|| {
            debug!(syntax = %syntax.name, "highlighting failed, emitting plain code");
            escape_code(code)
        })
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}
