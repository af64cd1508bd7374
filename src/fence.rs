// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Splitting message text into plain and fenced-code segments.
//!
//! Fences are literal triple backticks, matched left to right without
//! nesting. This module only splits; it never interprets markup.

const FENCE: &str = "```";

/// One piece of a split message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Plain text to be run through the inline engine.
    Text(&'a str),
    /// A fenced code block.
    Code(CodeFence<'a>),
}

/// A fenced code block borrowed from the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeFence<'a> {
    /// Everything between the opening and closing fence markers.
    pub body: &'a str,
    /// Language tag from the first line, if any.
    pub lang: Option<&'a str>,
    /// The code itself, without the tag line and final newline.
    pub code: &'a str,
}

impl Segment<'_> {
    /// Reconstructs the source text of this segment.
    #[must_use]
    pub fn to_source(&self) -> String {
        match self {
            Self::Text(text) => (*text).to_owned(),
            Self::Code(fence) => format!("{FENCE}{}{FENCE}", fence.body),
        }
    }
}

/// Splits `raw` into alternating text and code segments.
///
/// An opening fence without a closing one turns the rest of the input,
/// markers included, into a trailing text segment.
#[must_use]
pub fn split_fences(raw: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut pos = 0;

    while pos < raw.len() {
        let Some(open) = raw[pos..].find(FENCE).map(|i| pos + i) else {
            segments.push(Segment::Text(&raw[pos..]));
            break;
        };
        let body_start = open + FENCE.len();
        let Some(close) = raw[body_start..].find(FENCE).map(|i| body_start + i) else {
            segments.push(Segment::Text(&raw[pos..]));
            break;
        };

        if open > pos {
            segments.push(Segment::Text(&raw[pos..open]));
        }
        segments.push(Segment::Code(parse_fence_body(&raw[body_start..close])));
        pos = close + FENCE.len();
    }

    segments
}

fn parse_fence_body(body: &str) -> CodeFence<'_> {
    let Some(newline) = body.find('\n') else {
        // No newline: the whole body is an (optional) language tag.
        let tag = body.trim();
        return CodeFence {
            body,
            lang: (!tag.is_empty()).then_some(tag),
            code: "",
        };
    };

    // Whatever the first line holds, trimmed, is the tag. An unknown tag
    // falls back to plain text when highlighting.
    let first_line = body[..newline].trim();
    CodeFence {
        body,
        lang: (!first_line.is_empty()).then_some(first_line),
        code: trim_final_newline(&body[newline + 1..]),
    }
}

fn trim_final_newline(code: &str) -> &str {
    code.strip_suffix('\n')
        .map_or(code, |c| c.strip_suffix('\r').unwrap_or(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(lang: Option<&str>, code: &str) -> (Option<String>, String) {
        (lang.map(str::to_owned), code.to_owned())
    }

    fn codes(raw: &str) -> Vec<(Option<String>, String)> {
        split_fences(raw)
            .into_iter()
            .filter_map(|s| match s {
                Segment::Code(f) => Some((f.lang.map(str::to_owned), f.code.to_owned())),
                Segment::Text(_) => None,
            })
            .collect()
    }

    #[test]
    fn plain_text_is_one_segment() {
        assert_eq!(split_fences("hello"), vec![Segment::Text("hello")]);
        assert!(split_fences("").is_empty());
    }

    #[test]
    fn splits_text_and_code() {
        let segments = split_fences("before\n```rust\nfn main() {}\n```\nafter");
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0], Segment::Text("before\n"));
        assert_eq!(segments[2], Segment::Text("\nafter"));
        assert_eq!(
            codes("before\n```rust\nfn main() {}\n```\nafter"),
            vec![code(Some("rust"), "fn main() {}")]
        );
    }

    #[test]
    fn leading_newline_means_no_language() {
        assert_eq!(codes("```\nlet x = 1;\n```"), vec![code(None, "let x = 1;")]);
        assert_eq!(codes("```\r\nx\r\n```"), vec![code(None, "x")]);
    }

    #[test]
    fn body_without_newline_is_language_only() {
        assert_eq!(codes("```python```"), vec![code(Some("python"), "")]);
        assert_eq!(codes("``````"), vec![code(None, "")]);
    }

    #[test]
    fn whole_first_line_is_the_language() {
        assert_eq!(
            codes("```print('a b')\nprint(2)\n```"),
            vec![code(Some("print('a b')"), "print(2)")]
        );
        assert_eq!(
            codes("``` objective c \n[x y];\n```"),
            vec![code(Some("objective c"), "[x y];")]
        );
    }

    #[test]
    fn language_tag_is_trimmed() {
        assert_eq!(codes("```  js  \nx\n```"), vec![code(Some("js"), "x")]);
    }

    #[test]
    fn unterminated_fence_is_trailing_text() {
        let raw = "text ```rust\nfn x() {}";
        assert_eq!(split_fences(raw), vec![Segment::Text(raw)]);

        let raw = "```a\nb\n``` middle ```unclosed";
        let segments = split_fences(raw);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1], Segment::Text(" middle ```unclosed"));
    }

    #[test]
    fn multiple_fences() {
        assert_eq!(
            codes("```a\n1\n```x```b\n2\n```"),
            vec![code(Some("a"), "1"), code(Some("b"), "2")]
        );
    }

    #[test]
    fn round_trip_reconstructs_input() {
        let inputs = [
            "plain",
            "a ```rs\nlet x;\n``` b",
            "```\nno lang\n```",
            "```py```tail",
            "x ```one\n1\n``````two\n2\n``` y",
            "open ```never closed",
        ];
        for raw in inputs {
            let rebuilt: String = split_fences(raw).iter().map(Segment::to_source).collect();
            assert_eq!(rebuilt, raw);
        }
    }
}
