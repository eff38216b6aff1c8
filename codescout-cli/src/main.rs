mod export;

use clap::Parser;
use codescout::{SearchEngine, SearchMatch, SearchRequest};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Exclusions applied unless --no-default-excludes is set
const DEFAULT_EXCLUDES: &[&str] = &["*/target/*", "*/build/*", "*/.git/*", "*/node_modules/*"];

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Text or regular expression to search for
    keyword: String,

    /// Root directory to search in
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Treat the keyword as a regular expression
    #[arg(short = 'r', long)]
    regex: bool,

    /// Match case-sensitively
    #[arg(short = 'c', long)]
    case_sensitive: bool,

    /// Match whole words only
    #[arg(short = 'w', long)]
    whole_word: bool,

    /// File extensions to include, comma separated (e.g. rs,go,js)
    #[arg(short = 'e', long)]
    extensions: Option<String>,

    /// Exclusion pattern (regex, glob, or literal); can be repeated
    #[arg(short = 'x', long = "exclude")]
    exclude: Vec<String>,

    /// Skip the built-in exclusions (target, build, .git, node_modules)
    #[arg(long)]
    no_default_excludes: bool,

    /// Encoding used to decode file contents (e.g. utf-8, euc-kr)
    #[arg(long, default_value = "utf-8")]
    encoding: String,

    /// Number of worker threads
    #[arg(short = 'j', long)]
    threads: Option<NonZeroUsize>,

    /// Print matches as a JSON array instead of text
    #[arg(long)]
    json: bool,

    /// Write matches to a CSV file; a numbered name is chosen if the
    /// file already exists
    #[arg(long, value_name = "FILE")]
    export: Option<PathBuf>,

    /// Suppress the progress bar
    #[arg(short = 'q', long)]
    quiet: bool,
}

fn main() {
    let cli = Cli::parse();
    setup_logging();

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn setup_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let started = Instant::now();
    let request = build_request(&cli);
    let engine = SearchEngine::new();

    let show_bar = !cli.quiet;
    let progress = if show_bar {
        ProgressBar::new(0).with_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")
                .unwrap()
                .progress_chars("=>-"),
        )
    } else {
        ProgressBar::hidden()
    };

    let stream_text = !cli.json;
    let results = engine.search_with_callbacks(
        &request,
        |completed, total, _path| {
            if progress.length() != Some(total as u64) {
                progress.set_length(total as u64);
            }
            progress.set_position(completed as u64);
        },
        |batch| {
            if stream_text {
                for m in batch {
                    let line = format_match(m);
                    if show_bar {
                        progress.println(line);
                    } else {
                        println!("{}", line);
                    }
                }
            }
        },
    )?;
    progress.finish_and_clear();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else if results.is_empty() {
        println!("{}", "No matches found".yellow());
    } else {
        let files: HashSet<&Path> = results.iter().map(|m| m.file_path.as_path()).collect();
        let elapsed = Duration::from_millis(started.elapsed().as_millis() as u64);
        println!(
            "\n{} {} matches in {} files ({})",
            "Found".green(),
            results.len(),
            files.len(),
            humantime::format_duration(elapsed)
        );
    }

    if let Some(requested) = &cli.export {
        let written = export::write_csv(&results, requested)?;
        println!(
            "Exported {} matches to {}",
            results.len(),
            written.display().to_string().blue()
        );
    }

    info!("Run finished in {:.2?}", started.elapsed());
    Ok(())
}

fn build_request(cli: &Cli) -> SearchRequest {
    let mut request = SearchRequest::new(cli.path.clone(), cli.keyword.clone());
    request.use_regex = cli.regex;
    request.case_sensitive = cli.case_sensitive;
    request.whole_word = cli.whole_word;
    request.file_encoding = cli.encoding.clone();
    request.thread_count = cli.threads;
    if let Some(raw) = &cli.extensions {
        request.file_extensions = parse_extensions(raw);
    }

    let mut excludes = cli.exclude.clone();
    if !cli.no_default_excludes {
        excludes.extend(DEFAULT_EXCLUDES.iter().map(|p| p.to_string()));
    }
    request.exclude_patterns = excludes;
    request
}

/// Normalizes comma-separated extensions to dotted suffixes, so both
/// "rs,go" and ".rs,.go" work.
fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            if s.starts_with('.') {
                s.to_string()
            } else {
                format!(".{}", s)
            }
        })
        .collect()
}

fn format_match(m: &SearchMatch) -> String {
    // Highlight one occurrence per record; a repeated keyword on the
    // same line yields one record for each occurrence.
    let content = match m.line_content.find(&m.matched_text) {
        Some(start) => {
            let end = start + m.matched_text.len();
            format!(
                "{}{}{}",
                &m.line_content[..start],
                m.line_content[start..end].yellow().bold(),
                &m.line_content[end..]
            )
        }
        None => m.line_content.clone(),
    };
    format!(
        "{}:{}: {}",
        m.file_path.display().to_string().blue(),
        m.line_number.to_string().green(),
        content
    )
}
