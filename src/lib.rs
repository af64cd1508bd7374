// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Render Discord channel exports as standalone HTML transcripts.
//!
//! This crate turns the JSON produced by a channel export into a readable,
//! self-contained HTML page that looks like the chat client.
//!
//! # Overview
//!
//! Rendering runs in stages:
//!
//! 1. [`parser`] reads the export into typed messages and lookup tables
//! 2. [`assembler`] resolves authors and replies and groups consecutive
//!    messages
//! 3. [`document`] renders message text with [`markup`] and builds a tree of
//!    view nodes
//! 4. [`renderer`] serializes that tree as an HTML page
//!
//! # Example
//!
//! ```no_run
//! use dc2html::assembler::{self, AssembleOptions, IgnoreOptions};
//! use dc2html::cdn::DiscordCdn;
//! use dc2html::highlight::SyntectHighlighter;
//! use dc2html::markup::RenderContext;
//! use dc2html::resolver::Resolver;
//! use dc2html::{document, parser, renderer};
//!
//! let json = std::fs::read_to_string("channel.json").unwrap();
//! let transcript = parser::parse_transcript(&json).unwrap();
//!
//! let resolver = Resolver::new(&transcript.tables);
//! let cdn = DiscordCdn::default();
//! let highlighter = SyntectHighlighter::default();
//!
//! let messages =
//!     assembler::filter_messages(transcript.messages, &resolver, &IgnoreOptions::default());
//! let assembled =
//!     assembler::assemble_messages(&messages, &resolver, &cdn, &AssembleOptions::default());
//!
//! let ctx = RenderContext::new(&resolver, &cdn, &highlighter);
//! let nodes = document::render_transcript(&assembled, &ctx);
//!
//! let html = renderer::render_page(&nodes, &transcript.meta, &renderer::RenderOptions::default());
//! println!("{html}");
//! ```
//!
//! # Modules
//!
//! - [`parser`]: JSON parsing and type definitions for channel exports
//! - [`resolver`]: user, role and channel lookups
//! - [`cdn`]: image URLs for avatars, emoji and stickers
//! - [`timestamp`]: date and time formatting
//! - [`fence`]: code fence splitting
//! - [`highlight`]: syntax highlighting for code blocks
//! - [`markup`]: the chat markup parser
//! - [`assembler`]: reply resolution and message grouping
//! - [`document`]: per-message view trees
//! - [`renderer`]: HTML page generation

#![deny(missing_docs)]

pub mod assembler;
pub mod cdn;
pub mod document;
pub mod fence;
pub mod highlight;
pub mod markup;
pub mod parser;
pub mod renderer;
pub mod resolver;
pub mod timestamp;
