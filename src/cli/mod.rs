//! CLI command definitions and handlers

use crate::cache::{Cache, TTL_INCREMENTAL};
use crate::history::{GitHistory, History};
use crate::models::ScanReport;
use crate::pipeline::{ScanOptions, ScanOutcome, ScanRequest, Scanner};
use crate::rules::Ruleset;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

/// Shadowscope - shadow-logic analysis
///
/// 100% local. Ranks code by the gap between structural complexity and the
/// human review evidence behind it.
#[derive(Parser, Debug)]
#[command(name = "shadowscope")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to repository (default: current directory)
    #[arg(global = true, default_value = ".")]
    pub path: PathBuf,

    /// Number of parallel workers (default: logical CPU count)
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan the repository and emit a report
    Scan {
        /// Changed files for an incremental scan (repeatable). Without this
        /// flag a full scan runs.
        #[arg(long)]
        changed: Vec<String>,

        /// Commit SHA to record on the report (default: HEAD)
        #[arg(long)]
        commit: Option<String>,

        /// Branch name to record on the report
        #[arg(long)]
        branch: Option<String>,

        /// Output format
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
        format: String,

        /// Output file (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Ruleset file overriding the embedded default
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Cache directory (default: <repo>/.shadowscope/cache)
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Prior report JSON, enables cluster reuse and the runway estimate
        #[arg(long)]
        prior: Option<PathBuf>,

        /// Skip version-control history; evidence degrades to zero
        #[arg(long)]
        no_history: bool,
    },
}

/// Run the CLI with parsed arguments
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Scan {
            changed,
            commit,
            branch,
            format,
            output,
            rules,
            cache_dir,
            prior,
            no_history,
        } => scan(
            &cli.path,
            ScanArgs {
                changed,
                commit,
                branch,
                format,
                output,
                rules,
                cache_dir,
                prior,
                no_history,
                workers: cli.workers,
            },
        ),
    }
}

struct ScanArgs {
    changed: Vec<String>,
    commit: Option<String>,
    branch: Option<String>,
    format: String,
    output: Option<PathBuf>,
    rules: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    prior: Option<PathBuf>,
    no_history: bool,
    workers: Option<usize>,
}

fn scan(path: &Path, args: ScanArgs) -> Result<()> {
    let root = path
        .canonicalize()
        .with_context(|| format!("cannot resolve scan root {:?}", path))?;

    let ruleset = match &args.rules {
        Some(path) => Ruleset::load(path)?,
        None => Ruleset::embedded(),
    };

    let history = if args.no_history {
        None
    } else {
        match GitHistory::open(&root) {
            Ok(history) => Some(history),
            Err(e) => {
                info!("no usable git history: {e}");
                None
            }
        }
    };

    let incremental = !args.changed.is_empty();
    let cache_root = args
        .cache_dir
        .unwrap_or_else(|| root.join(".shadowscope").join("cache"));
    let cache = Cache::open(&cache_root).context("failed to open cache directory")?;
    let cache = if incremental {
        cache.with_ttl(TTL_INCREMENTAL)
    } else {
        cache
    };

    let prior: Option<ScanReport> = match &args.prior {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read prior report {:?}", path))?;
            Some(serde_json::from_str(&raw).context("prior report is not a valid ScanReport")?)
        }
        None => None,
    };

    let mut options = ScanOptions::default();
    if let Some(workers) = args.workers {
        options.workers = workers.max(1);
    }

    let mut scanner = Scanner::new(&ruleset).with_cache(&cache).with_options(options);
    if let Some(history) = history.as_ref() {
        scanner = scanner.with_history(history as &dyn History);
    }

    let request = if incremental {
        ScanRequest::Incremental {
            root: root.clone(),
            commit: args.commit,
            branch: args.branch,
            changed_files: args.changed,
        }
    } else {
        ScanRequest::Full {
            root: root.clone(),
            commit: args.commit,
            branch: args.branch,
        }
    };

    match scanner.run(&request, prior.as_ref()) {
        ScanOutcome::Completed(report) => {
            persist_report(&root, &report)?;
            let rendered = match args.format.as_str() {
                "json" => crate::reporters::json::render(&report)?,
                _ => crate::reporters::text::render(&report)?,
            };
            match args.output {
                Some(path) => std::fs::write(&path, rendered)
                    .with_context(|| format!("cannot write report to {:?}", path))?,
                None => print!("{rendered}"),
            }
            Ok(())
        }
        ScanOutcome::Failed(failed) => {
            bail!("scan {} failed: {}", failed.scan_id, failed.reason)
        }
    }
}

/// Append-only report store: one JSON file per scan id.
fn persist_report(root: &Path, report: &ScanReport) -> Result<()> {
    let dir = root.join(".shadowscope").join("reports");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{}.json", report.scan_id));
    let json = crate::reporters::json::render(report)?;
    std::fs::write(&path, json)?;
    info!("report stored at {:?}", path);
    Ok(())
}
