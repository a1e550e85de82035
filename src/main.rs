use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dialoguer::Confirm;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use syno_dedupe::config::FileConfig;
use syno_dedupe::core::generate::generate_dummy_data;
use syno_dedupe::core::model::{DateSource, DuplicateGroups, Stats};
use syno_dedupe::core::progress;
use syno_dedupe::core::refine::{DecodeFailure, RefineError, Refiner};
use syno_dedupe::core::relocate::{
    Collision, RelocateError, RelocationPlan, RelocationReport, execute_with, plan_relocation,
};
use syno_dedupe::core::scanner::{ScanError, Scanner, SkippedEntry};
use syno_dedupe::ExifService;

#[derive(Parser, Debug)]
#[command(
    name = "syno-dedupe",
    version,
    about = "Move aside photos saved more than once under the same name on the same day"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Find duplicate groups and move all but the largest copy into `<dest>/<rank>/`
    Dedupe(DedupeArgs),

    /// Write a synthetic tree of duplicate files to experiment with
    Generate {
        /// Directory to create (must not exist)
        #[arg(value_name = "DIR")]
        dir: PathBuf,
        /// Number of files in the first folder
        #[arg(short = 'n', long, default_value_t = 1000)]
        files: usize,
        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Args, Debug)]
struct DedupeArgs {
    /// Source directories to scan
    #[arg(long, value_name = "DIR", num_args = 1.., required = true)]
    dirs: Vec<PathBuf>,
    /// Directory that receives the moved copies
    #[arg(long, value_name = "DIR")]
    dest: PathBuf,
    /// File extensions to include (default: jpg png jpeg gif mp4 webp heic raf)
    #[arg(short, long, value_name = "EXT", num_args = 1..)]
    ext: Vec<String>,
    /// Skip files with any path component equal to one of these
    #[arg(long, value_name = "NAME", num_args = 1..)]
    filters: Vec<String>,
    /// Only report what would be moved
    #[arg(short, long)]
    dry_run: bool,
    /// Print every file of every duplicate group
    #[arg(short, long)]
    verbose: bool,
    /// Move without asking for confirmation
    #[arg(short, long, conflicts_with = "dry_run")]
    yes: bool,
    /// Print the result as JSON
    #[arg(long)]
    json: bool,
    /// Config file (default: `<config dir>/syno-dedupe/config.json`)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Serialize)]
struct JsonGroup<'a> {
    name: &'a str,
    date: String,
    files: &'a [syno_dedupe::FileRecord],
}

#[derive(Serialize)]
struct JsonSummary<'a> {
    stats: Stats,
    groups: Vec<JsonGroup<'a>>,
    skipped: &'a [SkippedEntry],
    unreadable: &'a [DecodeFailure],
    plan: &'a RelocationPlan,
    report: Option<&'a RelocationReport>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Dedupe(args) => {
            init_logging(args.verbose);
            run_dedupe(args)
        }
        Commands::Generate { dir, files, seed } => {
            init_logging(false);
            let summary = generate_dummy_data(&dir, files, seed)
                .with_context(|| format!("Failed to generate data in {}", dir.display()))?;
            println!(
                "✅ Wrote {} files to {} and {} to {}",
                summary.first,
                dir.join("dir1").display(),
                summary.second,
                dir.join("dir2").display()
            );
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn run_dedupe(args: DedupeArgs) -> Result<()> {
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        ctrlc::set_handler(move || {
            log::warn!("Interrupt received");
            cancel.store(true, Ordering::SeqCst);
        })
        .context("Failed to install Ctrl-C handler")?;
    }

    let config = FileConfig::load_or_default(args.config.as_deref())?;
    let options = config.scan_options(&args.ext, &args.filters);
    let show_progress = !args.json;

    let start = Instant::now();
    let scan = match Scanner::new(options)
        .with_progress(show_progress)
        .with_cancellation(Arc::clone(&cancel))
        .scan(&args.dirs)
    {
        Ok(scan) => scan,
        Err(ScanError::Cancelled) => return interrupted(),
        Err(e) => return Err(e).context("Scan failed"),
    };
    let refined = match Refiner::new(ExifService::new())
        .with_progress(show_progress)
        .with_cancellation(Arc::clone(&cancel))
        .refine(scan.groups)
    {
        Ok(refined) => refined,
        Err(RefineError::Cancelled) => return interrupted(),
    };
    log::info!("Scan and refine took {:.2?}", start.elapsed());

    let stats = Stats::from_groups(&refined.groups);
    let plan = plan_relocation(&refined.groups, &args.dest);

    if !args.json {
        if args.verbose {
            print_duplicates(&refined.groups);
        }
        println!(
            "Found dupes of {} files. Total: {}. Max: {}",
            stats.groups, stats.total_files, stats.max_group_size
        );
        print_problems(&scan.skipped, &refined.failures, &plan.collisions);
    }

    let proceed = should_proceed(args.dry_run, args.yes, plan.move_count(), || {
        confirm(plan.move_count(), &args.dest)
    });

    let report = if proceed {
        let bar = progress::bar(plan.move_count() as u64, show_progress, "Moving duplicates");
        let result = execute_with(&plan, &cancel, |_| bar.inc(1));
        bar.finish_and_clear();
        match result {
            Ok(report) => Some(report),
            Err(RelocateError::Cancelled) => {
                log::warn!("Interrupted before moving anything");
                None
            }
            Err(e) => return Err(e).context("Relocation failed"),
        }
    } else {
        None
    };

    if args.json {
        let summary = JsonSummary {
            stats,
            groups: refined
                .groups
                .iter()
                .map(|(key, files)| JsonGroup {
                    name: &key.name,
                    date: key.date.to_string(),
                    files,
                })
                .collect(),
            skipped: &scan.skipped,
            unreadable: &refined.failures,
            plan: &plan,
            report: report.as_ref(),
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    match report {
        Some(report) => print_report(&report, &plan),
        None if args.dry_run => println!("\n⚠️  Dry-run only; no files moved."),
        None => println!("No files moved."),
    }
    Ok(())
}

fn interrupted() -> Result<()> {
    log::warn!("Interrupted before moving anything");
    println!("No files moved.");
    Ok(())
}

/// Whether to run the moves. Dry runs and empty plans never prompt.
fn should_proceed<F>(dry_run: bool, yes: bool, move_count: usize, confirm: F) -> bool
where
    F: FnOnce() -> bool,
{
    if dry_run || move_count == 0 {
        false
    } else if yes {
        true
    } else {
        confirm()
    }
}

fn confirm(moves: usize, dest: &std::path::Path) -> bool {
    let prompt = format!("Move {} files to {}?", moves, dest.display());
    match Confirm::new().with_prompt(prompt).default(false).interact() {
        Ok(answer) => answer,
        Err(e) => {
            log::warn!("Prompt failed: {}", e);
            false
        }
    }
}

fn print_duplicates(groups: &DuplicateGroups) {
    println!("\n{:>15} {:>10} path", "size", "date");

    for (key, files) in groups {
        println!("{}", "-".repeat(80));
        for file in files {
            let marker = match file.capture.map(|c| c.source) {
                Some(DateSource::Modified) => " (mtime)",
                _ => "",
            };
            println!("{:>15} {:>10} {}{}", file.size, key.date, file.path.display(), marker);
        }
    }
    println!();
}

fn print_problems(skipped: &[SkippedEntry], failures: &[DecodeFailure], collisions: &[Collision]) {
    if !skipped.is_empty() {
        println!("⚠️  {} entries could not be read during the scan", skipped.len());
    }
    if !failures.is_empty() {
        println!("⚠️  {} files had unreadable metadata and were ignored:", failures.len());
        for failure in failures {
            println!("   ▶ {} ({})", failure.path.display(), failure.reason);
        }
    }
    if !collisions.is_empty() {
        println!("⚠️  {} files would collide at the destination and stay put:", collisions.len());
        for collision in collisions {
            println!(
                "   ▶ {} → {} (taken by {})",
                collision.source.display(),
                collision.target.display(),
                collision.claimed_by.display()
            );
        }
    }
}

fn print_report(report: &RelocationReport, plan: &RelocationPlan) {
    println!("Moved {} files to {}.", report.moved_count(), plan.destination.display());
    if !report.failed.is_empty() {
        println!("❌ {} moves failed:", report.failed.len());
        for failure in &report.failed {
            println!(
                "   ▶ {} → {}: {}",
                failure.source.display(),
                failure.target.display(),
                failure.reason
            );
        }
    }
    if report.cancelled {
        let untouched = plan
            .move_count()
            .saturating_sub(report.moved_count() + report.failed.len());
        println!("⚠️  Interrupted; {} planned moves were not made.", untouched);
    }
}
