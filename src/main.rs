use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use pitch_loader::config::{self, SQLITE_PATH_VAR, StoreTarget};
use pitch_loader::logging::init_logging;
use pitch_loader::pipeline::{ParseErrorPolicy, Pipeline, PipelineOptions, RunSummary};
use pitch_loader::source::{UnitFilter, discover_units};
use pitch_loader::store::ConnectionHolder;
use pitch_loader::tables::{Dataset, LoadPlan, Thresholds};
use pitch_loader::writer::{
    DEFAULT_MAX_DELAY, DryRunSink, ResilientWriter, RetryPolicy, RowSink, StoreSink,
};

/// Load match tracking, event and roster files into a keyed table store.
#[derive(Parser, Debug)]
#[command(name = "pitch_loader", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Raw frames, player and ball positions, plus smoothed variants.
    Tracking {
        /// Skip the smoothed player and ball tables.
        #[arg(long)]
        no_smoothed: bool,
        #[command(flatten)]
        load: LoadArgs,
    },
    /// Frames and smoothed player positions.
    SmoothTracking {
        #[command(flatten)]
        load: LoadArgs,
    },
    /// Frames and smoothed ball positions.
    SmoothBalls {
        #[command(flatten)]
        load: LoadArgs,
    },
    /// Event timeline, game events, possessions, passes and shots.
    Events {
        #[command(flatten)]
        load: LoadArgs,
    },
    /// One metadata row per match.
    Metadata {
        #[command(flatten)]
        load: LoadArgs,
    },
    /// Match rosters and the players in them.
    Rosters {
        #[command(flatten)]
        load: LoadArgs,
    },
}

impl Command {
    fn split(&self) -> (Dataset, &LoadArgs) {
        match self {
            Command::Tracking { no_smoothed, load } => {
                (Dataset::Tracking { smoothed: !no_smoothed }, load)
            }
            Command::SmoothTracking { load } => (Dataset::SmoothTracking, load),
            Command::SmoothBalls { load } => (Dataset::SmoothBalls, load),
            Command::Events { load } => (Dataset::Events, load),
            Command::Metadata { load } => (Dataset::Metadata, load),
            Command::Rosters { load } => (Dataset::Rosters, load),
        }
    }
}

#[derive(Args, Debug)]
struct LoadArgs {
    /// Glob of input files, e.g. "data/tracking/*.jsonl.bz2".
    #[arg(long)]
    input: String,

    /// Minimum spacing between kept tracking frames.
    #[arg(long, default_value_t = 100.0)]
    min_dt_ms: f64,

    #[arg(long, default_value_t = 400)]
    batch_frames: usize,

    #[arg(long, default_value_t = 8000)]
    batch_players: usize,

    #[arg(long, default_value_t = 2000)]
    batch_balls: usize,

    /// Chunk size for event, metadata and roster tables.
    #[arg(long, default_value_t = 500)]
    batch_rows: usize,

    /// Only load this game/match id.
    #[arg(long)]
    only_game: Option<i64>,

    /// Stop after this many files.
    #[arg(long)]
    max_games: Option<usize>,

    /// Parse and build rows without writing anything.
    #[arg(long)]
    dry_run: bool,

    /// Count stored rows per game after each file.
    #[arg(long)]
    verify: bool,

    /// Log every Nth flush (0 = never).
    #[arg(long, default_value_t = 1)]
    print_every_flush: usize,

    /// Stop the whole run on a malformed file instead of skipping it.
    #[arg(long)]
    abort_on_parse_error: bool,

    /// Write attempts per batch before giving up.
    #[arg(long, default_value_t = 8)]
    max_retries: u32,

    /// Write to this SQLite file instead of the REST endpoint.
    #[arg(long, env = SQLITE_PATH_VAR)]
    sqlite: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

impl LoadArgs {
    fn thresholds(&self) -> Thresholds {
        Thresholds {
            frames: self.batch_frames,
            players: self.batch_players,
            balls: self.batch_balls,
            entity_rows: self.batch_rows,
        }
    }

    fn options(&self) -> PipelineOptions {
        PipelineOptions {
            min_dt_ms: self.min_dt_ms,
            dry_run: self.dry_run,
            verify: self.verify,
            print_every_flush: self.print_every_flush,
            parse_errors: if self.abort_on_parse_error {
                ParseErrorPolicy::AbortRun
            } else {
                ParseErrorPolicy::SkipUnit
            },
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let (dataset, args) = cli.command.split();

    config::load_dotenv();
    init_logging(args.verbose);

    // Resolve the destination before touching any input.
    let target = if args.dry_run {
        None
    } else {
        Some(StoreTarget::select(args.sqlite.clone()).context("unable to resolve store target")?)
    };

    let filter = UnitFilter {
        only_partition: args.only_game,
        max_units: args.max_games,
    };
    let units = discover_units(&args.input, &filter).context("unable to list input files")?;
    if units.is_empty() {
        return Err(anyhow!("no input files matched {}", args.input));
    }

    let plan = LoadPlan::for_dataset(dataset, args.thresholds());
    let pipeline = Pipeline::new(&plan, args.options());
    info!(
        dataset = ?dataset,
        units = units.len(),
        tables = plan.tables.len(),
        dry_run = args.dry_run,
        "starting load"
    );

    let mut sink: Box<dyn RowSink> = match &target {
        None => Box::new(DryRunSink::new()),
        Some(target) => {
            info!(target = %target.describe(), "connecting");
            let conn = ConnectionHolder::connect(target.factory())
                .context("unable to connect to store")?;
            let policy = RetryPolicy::new(args.max_retries, DEFAULT_MAX_DELAY);
            let writer = ResilientWriter::new(policy);
            Box::new(StoreSink::new(conn, writer))
        }
    };

    let summary = pipeline.run(&units, sink.as_mut()).context("load aborted")?;
    print_summary(&summary, target.as_ref(), args.dry_run);
    Ok(())
}

fn print_summary(summary: &RunSummary, target: Option<&StoreTarget>, dry_run: bool) {
    println!("Load complete{}", if dry_run { " (dry run)" } else { "" });
    if let Some(target) = target {
        println!("Store: {}", target.describe());
    }
    println!("Started: {}", summary.started_at);
    println!("Finished: {}", summary.finished_at);
    println!("Files: {}/{}", summary.units_succeeded, summary.units_total);
    println!("Flushes: {}", summary.flushes);
    for (table, rows) in &summary.rows_written {
        println!("  {table}: {rows} rows");
    }

    let mismatches = summary.verify_mismatches();
    if mismatches > 0 {
        println!("Verify mismatches: {mismatches}");
        for unit in summary.units.iter().filter(|u| !u.verified()) {
            for outcome in unit.verification.iter().filter(|v| !v.matched()) {
                println!(
                    "   - {} {}: expected {} got {}",
                    unit.unit,
                    outcome.table,
                    outcome.expected,
                    outcome
                        .actual
                        .map(|n| n.to_string())
                        .or_else(|| outcome.error.clone())
                        .unwrap_or_else(|| "n/a".into())
                );
            }
        }
    }

    if !summary.errors.is_empty() {
        println!("Errors: {}", summary.errors.len());
        for err in summary.errors.iter().take(6) {
            println!("   - {err}");
        }
    }
}
