// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Command-line interface for dc2html.
//!
//! This binary provides the `dc2html` command for converting Discord channel
//! exports from JSON to standalone HTML transcripts.

use chrono::FixedOffset;
use dc2html::assembler::{self, AssembleOptions, IgnoreOptions};
use dc2html::cdn::{DEFAULT_CDN_BASE, DEFAULT_MEDIA_BASE, DiscordCdn};
use dc2html::highlight::SyntectHighlighter;
use dc2html::markup::RenderContext;
use dc2html::renderer::{self, Theme};
use dc2html::resolver::Resolver;
use dc2html::{document, parser, timestamp};
use lexopt::prelude::*;
use snafu::{OptionExt, ensure, prelude::*};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Highlight theme used with the light page theme.
const LIGHT_CODE_THEME: &str = "InspiredGitHub";

/// Where to write the rendered output.
#[derive(Clone)]
enum OutputTarget {
    /// Write each file to the specified directory.
    Directory(PathBuf),
    /// Write to stdout.
    Stdout,
}

#[allow(clippy::struct_excessive_bools)]
struct Cli {
    input: Vec<PathBuf>,
    output: OutputTarget,
    theme: Theme,
    utc_offset: Option<FixedOffset>,
    cdn_base: String,
    media_base: String,
    limit: Option<usize>,
    ignore_bots: bool,
    ignore_users: Vec<String>,
    json: bool,
    quiet: bool,
    dry_run: bool,
    force: bool,
    verbose: bool,
}

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to parse arguments: {source}"))]
    ParseArgs { source: lexopt::Error },

    #[snafu(display("at least one input file or directory is required"))]
    NoInputFiles,

    #[snafu(display("cannot output multiple files to stdout"))]
    MultipleFilesToStdout,

    #[snafu(display("failed to create output directory: {source}"))]
    CreateOutputDir { source: std::io::Error },

    #[snafu(display("failed to read {}: {source}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to parse {}: {source}", path.display()))]
    ParseFile {
        path: PathBuf,
        source: parser::ParseError,
    },

    #[snafu(display("failed to encode document for {}: {source}", path.display()))]
    EncodeJson {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[snafu(display("invalid input filename: no file stem"))]
    InvalidFilename,

    #[snafu(display("failed to write {}: {source}", path.display()))]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn print_help() {
    println!(
        "\
{name} {version}
Convert Discord channel exports to standalone HTML transcripts

Usage: {name} [OPTIONS] -o <OUTPUT> <INPUT>...

Arguments:
  <INPUT>...  Input JSON files or directories containing exports

Options:
  -o, --output <OUTPUT>     Output directory (or - for stdout)
      --theme <THEME>       Page theme: dark or light (default: dark)
      --utc-offset <OFFSET> Display times at this offset, e.g. +02:00 or -5
                            (default: local time)
      --json                Write the document tree as JSON instead of HTML

Media:
      --cdn-base <URL>      Base URL for avatars and emoji
                            (default: {cdn})
      --media-base <URL>    Base URL for stickers
                            (default: {media})

Filtering:
      --limit <N>           Keep only the most recent N messages
      --ignore-bots         Drop messages written by bots
      --ignore-user <ID>    Drop messages by this user id (repeatable)

Other options:
  -q, --quiet               Suppress progress messages
  -n, --dry-run             Show what would be processed without writing
  -f, --force               Overwrite existing output files
  -v, --verbose             Log debug details to stderr (RUST_LOG overrides)
  -h, --help                Print help
  -V, --version             Print version",
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        cdn = DEFAULT_CDN_BASE,
        media = DEFAULT_MEDIA_BASE,
    );
}

fn parse_args() -> Result<Cli, lexopt::Error> {
    // Show help if no arguments provided
    if std::env::args().len() == 1 {
        print_help();
        std::process::exit(0);
    }

    let mut input = Vec::new();
    let mut output: Option<OutputTarget> = None;
    let mut theme = Theme::default();
    let mut utc_offset = None;
    let mut cdn_base = DEFAULT_CDN_BASE.to_owned();
    let mut media_base = DEFAULT_MEDIA_BASE.to_owned();
    let mut limit = None;
    let mut ignore_bots = false;
    let mut ignore_users = Vec::new();
    let mut json = false;
    let mut quiet = false;
    let mut dry_run = false;
    let mut force = false;
    let mut verbose = false;

    let mut parser = lexopt::Parser::from_env();
    while let Some(arg) = parser.next()? {
        match arg {
            Short('o') | Long("output") => {
                let val: PathBuf = parser.value()?.parse()?;
                output = Some(if val == Path::new("-") {
                    OutputTarget::Stdout
                } else {
                    OutputTarget::Directory(val)
                });
            }
            Long("theme") => {
                let val: String = parser.value()?.parse()?;
                theme = Theme::from_name(&val).ok_or("theme must be dark or light")?;
            }
            Long("utc-offset") => {
                let val: String = parser.value()?.parse()?;
                utc_offset =
                    Some(parse_offset(&val).ok_or("utc-offset must look like +02:00 or -5")?);
            }
            Long("cdn-base") => cdn_base = parser.value()?.parse()?,
            Long("media-base") => media_base = parser.value()?.parse()?,
            Long("limit") => {
                let val: usize = parser
                    .value()?
                    .parse()
                    .map_err(|_| "limit must be a positive number")?;
                limit = Some(val);
            }
            Long("ignore-bots") => ignore_bots = true,
            Long("ignore-user") => ignore_users.push(parser.value()?.parse()?),
            Long("json") => json = true,
            Short('q') | Long("quiet") => quiet = true,
            Short('n') | Long("dry-run") => dry_run = true,
            Short('f') | Long("force") => force = true,
            Short('v') | Long("verbose") => verbose = true,
            Short('h') | Long("help") => {
                print_help();
                std::process::exit(0);
            }
            Short('V') | Long("version") => {
                println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            Value(val) => input.push(val.parse()?),
            _ => return Err(arg.unexpected()),
        }
    }

    Ok(Cli {
        input,
        output: output.ok_or("missing required option: --output")?,
        theme,
        utc_offset,
        cdn_base,
        media_base,
        limit,
        ignore_bots,
        ignore_users,
        json,
        quiet,
        dry_run,
        force,
        verbose,
    })
}

/// Parses `+HH:MM`, `-HH:MM`, `+HH` or a bare hour count.
fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    let (sign, rest) = match raw.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, raw.strip_prefix('+').unwrap_or(raw)),
    };
    let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "0"));
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if !(0..=23).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<(), Error> {
    let cli = parse_args().context(ParseArgsSnafu)?;
    init_logging(cli.verbose);

    ensure!(!cli.input.is_empty(), NoInputFilesSnafu);

    // Collect all input files first
    let files = collect_input_files(&cli.input);
    debug!(count = files.len(), "collected input files");

    let highlighter = match cli.theme {
        Theme::Dark => SyntectHighlighter::default(),
        Theme::Light => SyntectHighlighter::with_theme(LIGHT_CODE_THEME),
    };

    match &cli.output {
        OutputTarget::Stdout => {
            ensure!(files.len() == 1, MultipleFilesToStdoutSnafu);
            process_to_stdout(&files[0], &cli, &highlighter)?;
        }
        OutputTarget::Directory(dir) => {
            if !cli.dry_run {
                std::fs::create_dir_all(dir).context(CreateOutputDirSnafu)?;
            }
            for file in &files {
                process_file(file, dir, &cli, &highlighter)?;
            }
        }
    }

    Ok(())
}

/// Collects all JSON files from the given inputs (files and directories).
fn collect_input_files(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            for entry in WalkDir::new(input)
                .sort_by_file_name()
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
            {
                files.push(entry.path().to_path_buf());
            }
        } else {
            files.push(input.clone());
        }
    }
    files
}

/// Creates render options from CLI arguments.
#[allow(clippy::missing_const_for_fn)]
fn make_render_options(cli: &Cli) -> renderer::RenderOptions {
    renderer::RenderOptions {
        theme: cli.theme,
        ..renderer::RenderOptions::default()
    }
}

/// Creates message filters from CLI arguments.
fn make_ignore_options(cli: &Cli) -> IgnoreOptions {
    IgnoreOptions {
        bots: cli.ignore_bots,
        user_ids: cli.ignore_users.clone(),
        limit: cli.limit,
    }
}

/// Reads, parses and renders one export.
fn convert(input: &Path, cli: &Cli, highlighter: &SyntectHighlighter) -> Result<String, Error> {
    let json = std::fs::read_to_string(input).context(ReadFileSnafu { path: input })?;
    let transcript = parser::parse_transcript(&json).context(ParseFileSnafu { path: input })?;

    let offset = cli.utc_offset.unwrap_or_else(timestamp::local_offset);
    let resolver = Resolver::new(&transcript.tables);
    let cdn = DiscordCdn::new(&cli.cdn_base, &cli.media_base);

    let messages =
        assembler::filter_messages(transcript.messages, &resolver, &make_ignore_options(cli));
    let assembled = assembler::assemble_messages(
        &messages,
        &resolver,
        &cdn,
        &AssembleOptions { utc_offset: offset },
    );

    let ctx = RenderContext::new(&resolver, &cdn, highlighter).with_offset(offset);
    let nodes = document::render_transcript(&assembled, &ctx);
    info!(path = %input.display(), messages = assembled.len(), "rendered transcript");

    if cli.json {
        serde_json::to_string_pretty(&nodes).context(EncodeJsonSnafu { path: input })
    } else {
        Ok(renderer::render_page(
            &nodes,
            &transcript.meta,
            &make_render_options(cli),
        ))
    }
}

/// Processes a single file and outputs to stdout.
fn process_to_stdout(
    input: &Path,
    cli: &Cli,
    highlighter: &SyntectHighlighter,
) -> Result<(), Error> {
    if cli.dry_run {
        eprintln!("Would output {}", input.display());
        return Ok(());
    }

    let output = convert(input, cli, highlighter)?;
    print!("{output}");
    Ok(())
}

/// Processes a single file and writes to the output directory.
fn process_file(
    input: &Path,
    out_dir: &Path,
    cli: &Cli,
    highlighter: &SyntectHighlighter,
) -> Result<(), Error> {
    let out_name = input.file_stem().context(InvalidFilenameSnafu)?;
    let extension = if cli.json { "json" } else { "html" };
    let out_path = out_dir.join(format!("{}.{extension}", out_name.to_string_lossy()));

    // Handle dry-run mode
    if cli.dry_run {
        eprintln!("Would write {}", out_path.display());
        return Ok(());
    }

    // Check if output exists and handle overwrite
    if out_path.exists() && !cli.force {
        eprintln!(
            "Skipping {} (already exists, use --force to overwrite)",
            out_path.display()
        );
        return Ok(());
    }

    let output = convert(input, cli, highlighter)?;
    std::fs::write(&out_path, &output).context(WriteFileSnafu { path: &out_path })?;

    if !cli.quiet {
        eprintln!("Wrote {}", out_path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_offsets() {
        assert_eq!(parse_offset("+02:00"), FixedOffset::east_opt(7200));
        assert_eq!(parse_offset("-5"), FixedOffset::west_opt(5 * 3600));
        assert_eq!(parse_offset("05:30"), FixedOffset::east_opt(19_800));
        assert_eq!(parse_offset("0"), FixedOffset::east_opt(0));
    }

    #[test]
    fn rejects_bad_offsets() {
        assert_eq!(parse_offset(""), None);
        assert_eq!(parse_offset("+25"), None);
        assert_eq!(parse_offset("+01:75"), None);
        assert_eq!(parse_offset("east"), None);
    }
}
