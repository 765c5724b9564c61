//! # Content Guard
//!
//! Content guardrail engine with a deterministic multi-stage matching
//! pipeline and a toxicity-classifier fallback.
//!
//! `content-guard` decides whether a piece of text violates a
//! configurable rule set. A declarative rule document (JSON or YAML) is
//! compiled into keyword, stem, pattern and embedding indices; each
//! check runs a short-circuiting cascade over those indices and falls
//! back to a remote toxicity classifier when no rule fires.
//!
//! # Architecture
//!
//! The engine evaluates each text in two phases:
//!
//! 1. **Rule matching** (always runs) - a six-stage cascade: regex
//!    patterns, exact keywords, lemmas, Porter stems, Levenshtein fuzzy
//!    matching, and semantic similarity against rule examples. Stages
//!    1-5 are pure CPU and run on a bounded [`rayon`] worker pool;
//!    results are cached by text fingerprint with a TTL.
//!
//! 2. **Toxicity classification** (on no match) - the text is sent to a
//!    remote classifier returning six category scores. Scores below the
//!    toxicity threshold yield `safe`; anything else `unsafe`. A
//!    classifier failure degrades to `warning` for human review.
//!
//! # Quick Start
//!
//! ```bash
//! # Check one text against rules.json
//! content-guard check "Is it good to buy Tesla stock?"
//!
//! # Read the text from stdin
//! echo "hello there" | content-guard check -
//!
//! # Batch mode, one text per line, JSON output
//! content-guard batch inputs.txt -f json
//!
//! # Inspect and manage the rule set
//! content-guard rules
//! content-guard reload
//! content-guard health
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded from (in order of precedence):
//!
//! 1. Command-line arguments
//! 2. Environment variables (`RULES_PATH`, `REDIS_HOST`, ...)
//! 3. `.content-guard.toml` in current directory
//! 4. `~/.config/content-guard/config.toml`
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RULES_PATH` | `rules.json` | Rule document path |
//! | `CACHE_EXPIRY` | `300` | Result cache TTL in seconds |
//! | `MAX_WORKERS` | `4` | Matcher worker pool size |
//! | `REDIS_HOST` / `REDIS_PORT` / `REDIS_DB` / `REDIS_PASSWORD` | `localhost:6379/0` | Cache backend |
//! | `TOXIC_CLASSIFIER_URL` | `http://localhost:8001/predict` | Classifier endpoint |
//! | `API_TIMEOUT` | `5.0` | Classifier timeout in seconds |
//! | `EMBEDDING_MODEL` / `EMBEDDING_URL` | `all-mpnet-base-v2` / unset | Embedding oracle |
//! | `LOG_LEVEL` | `info` | Log filter |
//!
//! # Exit Codes
//!
//! The process exit code reflects the strongest verdict found:
//!
//! - `0` - content is safe
//! - `1` - needs attention (`warning`, `invalid`, `error`)
//! - `2` - content rejected (`violation`, `unsafe`)
//!
//! # Modules
//!
//! - `rules` - rule document loading, compilation and snapshots
//! - `matcher` - the six-stage matching pipeline
//! - `evaluator` - orchestration, batch checks, health
//! - `cache` - fingerprint-keyed result cache
//! - `oracle` - toxicity classifier client
//! - `embedding` - embedding oracle seam
//! - `text` - tokenization and lemmatization seam
//! - `stem` - Porter stemming
//! - `config` - configuration loading and validation
//! - `output` - result formatting
//! - `error` - error types and constructors

use std::{
    env,
    fs::read_to_string,
    io::{self, IsTerminal, Read},
    path::PathBuf,
    process,
    time::Duration
};

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::main;
use tracing_subscriber::EnvFilter;

use content_guard::{
    cache::ResultCache,
    cli::{Cli, Commands, Format},
    config::Config,
    error::{AppResult, file_read_error},
    evaluator::{BatchItem, Evaluator, Status},
    output::{
        OutputFormat, OutputOptions, format_batch_response, format_check_response,
        format_health_report, format_reload_report, format_rules_listing
    }
};

#[main]
async fn main() {
    init_tracing();
    match run().await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

/// Install a stderr subscriber honoring `LOG_LEVEL`.
fn init_tracing() {
    let level = env::var("LOG_LEVEL").unwrap_or_else(|_| String::from("info"));
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run() -> AppResult<i32> {
    let cli = Cli::parse();
    let mut config = Config::load()?;

    match cli.command {
        Commands::Check {
            text,
            rules,
            output_format,
            no_cache,
            no_color
        } => {
            apply_rules_path(&mut config, rules);
            let text = if text == "-" { read_stdin()? } else { text };
            let evaluator = build_evaluator(&config, no_cache).await?;
            let response = evaluator.check(&text, None).await;
            let opts = output_options(output_format, no_color);
            println!("{}", format_check_response(&response, &opts));
            Ok(exit_code(response.status))
        }

        Commands::Batch {
            file,
            rules,
            output_format,
            no_cache,
            no_color
        } => {
            apply_rules_path(&mut config, rules);
            let content = if file.to_str() == Some("-") {
                read_stdin()?
            } else {
                read_to_string(&file)
                    .map_err(|e| file_read_error(&file.display().to_string(), e))?
            };
            let items: Vec<BatchItem> = content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(|line| BatchItem {
                    text:    line.to_string(),
                    context: None
                })
                .collect();

            let evaluator = build_evaluator(&config, no_cache).await?;

            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}")
            {
                pb.set_style(style);
            }
            pb.set_message(format!("Checking {} texts...", items.len()));
            pb.enable_steady_tick(Duration::from_millis(100));

            let response = evaluator.batch_check(items).await?;
            pb.finish_and_clear();

            let opts = output_options(output_format, no_color);
            println!("{}", format_batch_response(&response, &opts));
            let code = response
                .results
                .iter()
                .map(|r| exit_code(r.status))
                .max()
                .unwrap_or(0);
            Ok(code)
        }

        Commands::Rules {
            rules,
            output_format
        } => {
            apply_rules_path(&mut config, rules);
            let evaluator = build_evaluator(&config, true).await?;
            let listing = evaluator.rules().await;
            let opts = output_options(output_format, false);
            println!("{}", format_rules_listing(&listing, &opts));
            Ok(0)
        }

        Commands::Reload {
            rules,
            output_format
        } => {
            apply_rules_path(&mut config, rules);
            let evaluator = build_evaluator(&config, true).await?;
            let report = evaluator.reload_rules().await;
            let opts = output_options(output_format, false);
            println!("{}", format_reload_report(&report, &opts));
            Ok(if report.success { 0 } else { 1 })
        }

        Commands::Health {
            output_format
        } => {
            let evaluator = build_evaluator(&config, false).await?;
            let report = evaluator.health().await;
            let opts = output_options(output_format, false);
            println!("{}", format_health_report(&report, &opts));
            Ok(0)
        }
    }
}

fn apply_rules_path(config: &mut Config, rules: Option<PathBuf>) {
    if let Some(path) = rules {
        config.engine.rules_path = path.display().to_string();
    }
}

async fn build_evaluator(config: &Config, no_cache: bool) -> AppResult<Evaluator> {
    if no_cache {
        Evaluator::from_config_with_cache(config, ResultCache::disabled()).await
    } else {
        Evaluator::from_config(config).await
    }
}

fn read_stdin() -> AppResult<String> {
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .map_err(|e| file_read_error("stdin", e))?;
    Ok(buffer)
}

fn output_options(format: Format, no_color: bool) -> OutputOptions {
    OutputOptions {
        format:  match format {
            Format::Text => OutputFormat::Text,
            Format::Json => OutputFormat::Json,
            Format::Yaml => OutputFormat::Yaml
        },
        colored: !no_color && io::stdout().is_terminal()
    }
}

/// Exit code for a verdict: 0 safe, 1 needs attention, 2 rejected.
fn exit_code(status: Status) -> i32 {
    match status {
        Status::Safe => 0,
        Status::Warning | Status::Invalid | Status::Error => 1,
        Status::Violation | Status::Unsafe => 2
    }
}
