//! # bff CLI
//!
//! Command-line interface for the bff library.
//!
//! ## Usage
//! ```bash
//! # Start tracking the current directory
//! bff init
//!
//! # Snapshot it into .bff/index.json
//! bff index --progress
//!
//! # What changed since the snapshot?
//! bff status
//!
//! # How does it overlap with another indexed tree?
//! bff compare ../backup
//!
//! # Copy over what is missing, placed next to matching siblings
//! bff match ../old_layout --dry-run
//! ```
//!
//! Summary lines use fixed labels (`New files:`, `Copied <n> files`, ...)
//! and are never coloured, so scripts can parse them.

use anyhow::{ensure, Context};
use bff::{Bff, BffError, InitOutcome, ProgressInfo, StatusReport};
use clap::{Parser, Subcommand};
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeSet;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// bff - index directory trees by content and reconcile them
#[derive(Parser)]
#[command(name = "bff")]
#[command(version)]
#[command(about = "Content-addressable indexing and reconciliation of directory trees")]
#[command(long_about = None)]
struct Cli {
    /// Tree root (defaults to the current directory)
    #[arg(short, long, global = true)]
    path: Option<PathBuf>,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the .bff metadata directory
    Init,

    /// Hash every file and save the snapshot
    Index {
        /// Show a progress bar while hashing
        #[arg(long)]
        progress: bool,
    },

    /// Remove the saved snapshot
    Clean,

    /// Show files that changed since the last index
    Status,

    /// List contents stored under more than one path
    Clones,

    /// Compare this tree with another indexed tree
    Compare {
        /// Root of the other tree
        other: PathBuf,
    },

    /// Copy files missing here from another tree, placed by sibling affinity
    Match {
        /// Root of the source tree
        source: PathBuf,

        /// Report what would be copied without writing anything
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries only the labelled report
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if std::env::var_os("NO_COLOR").is_some() || !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        let (label, message) = match e.downcast_ref::<BffError>() {
            // Uninitialized or unindexed tree
            Some(err) if err.is_missing_state() => ("Error".yellow().bold(), err.user_message()),
            Some(err) => ("Error".red().bold(), err.user_message()),
            None => ("Error".red().bold(), format!("{:#}", e)),
        };
        eprintln!("{}: {}", label, message);
        std::process::exit(1);
    }
}

/// Main command runner
fn run(cli: Cli) -> anyhow::Result<()> {
    let root_path = cli.path.unwrap_or_else(|| PathBuf::from("."));

    match cli.command {
        Commands::Init => cmd_init(root_path),
        Commands::Index { progress } => cmd_index(root_path, progress),
        Commands::Clean => cmd_clean(root_path),
        Commands::Status => cmd_status(root_path),
        Commands::Clones => cmd_clones(root_path),
        Commands::Compare { other } => cmd_compare(root_path, &other),
        Commands::Match { source, dry_run } => cmd_match(root_path, &source, dry_run),
    }
}

/// Initialize a tree, reporting whether it already was one
fn cmd_init(root_path: PathBuf) -> anyhow::Result<()> {
    ensure!(root_path.is_dir(), "{} is not a directory", root_path.display());

    let outcome = Bff::init(root_path.clone())?;
    let shown = root_path.canonicalize().unwrap_or(root_path);

    match outcome {
        InitOutcome::Created => {
            println!("Initialized empty bff repository in {}/.bff/", shown.display())
        }
        InitOutcome::AlreadyInitialized => {
            println!("Reinitialized existing bff repository in {}/.bff/", shown.display())
        }
    }
    Ok(())
}

/// Build and save the snapshot of the tree and its nested trees
fn cmd_index(root_path: PathBuf, show_progress: bool) -> anyhow::Result<()> {
    let bff = Bff::open(root_path)?;
    let start = Instant::now();

    let summaries = if show_progress {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .context("invalid progress bar template")?
                .progress_chars("=> "),
        );
        pb.set_message("Hashing files...");

        let bar = pb.clone();
        let result = bff.index_with_progress(Some(move |info: ProgressInfo| {
            if let Some(total) = info.total {
                bar.set_length(total as u64);
            }
            bar.inc(1);
        }));
        pb.finish_and_clear();
        result?
    } else {
        bff.index()?
    };

    let mut summaries = summaries.into_iter();
    if let Some(root) = summaries.next() {
        println!("Indexed files into .bff/index.json");
        println!("Tracked {} unique file hashes", root.unique_contents);
    }
    for nested in summaries {
        println!(
            "  Indexed nested repository: {} ({} hashes)",
            nested.tree, nested.unique_contents
        );
    }

    let duration = Duration::from_millis(start.elapsed().as_millis() as u64);
    println!("  {} {}", "Time:".dimmed(), format_duration(duration).to_string().cyan());
    Ok(())
}

/// Remove the saved snapshot
fn cmd_clean(root_path: PathBuf) -> anyhow::Result<()> {
    let bff = Bff::open(root_path)?;
    if bff.clean()? {
        println!("Cleaned index file: .bff/index.json");
    } else {
        println!("No index file to clean");
    }
    Ok(())
}

/// Print drift between the tree and its snapshot
fn cmd_status(root_path: PathBuf) -> anyhow::Result<()> {
    let bff = Bff::open(root_path)?;
    let report = bff.status()?;
    print_status(&report);
    Ok(())
}

fn print_status(report: &StatusReport) {
    if !report.has_changes() && report.unreadable.is_empty() {
        println!("No changes");
        return;
    }

    print_section("Modified files:", &report.modified, |p| p.yellow());
    print_section("Deleted files:", &report.deleted, |p| p.red());
    print_section("New files:", &report.new, |p| p.green());

    if !report.unreadable.is_empty() {
        println!("Unreadable files:");
        for failure in &report.unreadable {
            println!("  {}: {}", failure.path.display().to_string().red(), failure.message);
        }
    }
}

fn print_section<T: std::fmt::Display>(
    label: &str,
    paths: &BTreeSet<T>,
    paint: impl Fn(&str) -> ColoredString,
) {
    if paths.is_empty() {
        return;
    }
    println!("{}", label);
    for path in paths {
        println!("  {}", paint(&path.to_string()));
    }
}

/// Print every content stored under more than one path
fn cmd_clones(root_path: PathBuf) -> anyhow::Result<()> {
    let bff = Bff::open(root_path)?;
    for (digest, paths) in bff.clones()? {
        println!("Hash: {}", digest);
        for path in paths {
            println!("  {}", path);
        }
    }
    Ok(())
}

/// Compare this tree with another
fn cmd_compare(root_path: PathBuf, other: &Path) -> anyhow::Result<()> {
    ensure!(other.is_dir(), "{} is not a directory", other.display());

    let bff = Bff::open(root_path)?;
    let report = bff.compare(other)?;

    println!("By path (same relative path):");
    println!("  Files in this not in other: {}", report.only_in_a_paths);
    println!("  Files in other not in this: {}", report.only_in_b_paths);
    println!("  Same path + same content: {}", report.same_path_same_content);
    println!("  Same path + different content: {}", report.same_path_different_content);
    println!("By content (hash overlap):");
    println!("  Unique contents in this not in other: {}", report.unique_contents_only_in_a);
    println!("  Unique contents in other not in this: {}", report.unique_contents_only_in_b);
    println!("  Common contents (unique hashes): {}", report.common_contents);
    Ok(())
}

/// Copy content missing from this tree out of `source`
fn cmd_match(root_path: PathBuf, source: &Path, dry_run: bool) -> anyhow::Result<()> {
    ensure!(source.is_dir(), "{} is not a directory", source.display());

    let bff = Bff::open(root_path)?;
    let report = bff.match_from(source, dry_run)?;

    if dry_run {
        println!("{}", "Dry run: nothing was written".yellow());
    }
    for copy in &report.copied {
        println!("  {} -> {}", copy.source, copy.target.to_string().green());
    }
    for failed in &report.failed {
        println!("  {} -> {}: {}", failed.source, failed.target.to_string().red(), failed.message);
    }

    println!("Copied {} files", report.copied.len());
    println!("Skipped (target exists): {}", report.conflicts.len());
    println!("Unmatched (no matching siblings): {}", report.unmatched.len());
    println!("Failed: {}", report.failed.len());
    Ok(())
}
