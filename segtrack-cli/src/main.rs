//! Segtrack CLI: daily Strava segment tracking.
//!
//! Commands:
//! - `run`: fetch every configured segment, append to the log, redraw plots
//! - `explore`: list segments inside a bounding box
//! - `plot`: redraw plots from the log without touching the network
//! - `publish`: commit and push the log and plots if they changed
//! - `schedule`: show upcoming trigger times
//! - `daemon`: wait for each trigger time and run

mod logging;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use segtrack_core::config::{
    self, ApiAccess, ApiSettings, Credentials, PublishSettings, TrackerConfig,
};
use segtrack_core::explore::{format_explore_table, ActivityType, Bounds, ClimbCategory};
use segtrack_core::pipeline::{self, RunSummary};
use segtrack_core::publish::{self, GitPublisher, PublishOutcome};
use segtrack_core::schedule::{DailySchedule, DEFAULT_CRON};
use segtrack_core::strava::{CircuitBreaker, StravaClient, TracingProgress};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "segtrack", version, about = "Daily Strava segment attempt tracker")]
struct Cli {
    /// Increase log detail (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch segment stats, append to the log and regenerate plots.
    Run {
        /// Config file (used when the STRAVA_* environment variables are not all set).
        #[arg(long, default_value = config::DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Date to record rows under (YYYY-MM-DD). Defaults to today (UTC).
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Commit and push the artifacts after a successful run.
        #[arg(long, default_value_t = false)]
        publish: bool,

        /// Commit but do not push.
        #[arg(long, default_value_t = false)]
        no_push: bool,
    },
    /// List segments inside a bounding box.
    Explore {
        #[arg(allow_negative_numbers = true)]
        sw_lat: f64,
        #[arg(allow_negative_numbers = true)]
        sw_lng: f64,
        #[arg(allow_negative_numbers = true)]
        ne_lat: f64,
        #[arg(allow_negative_numbers = true)]
        ne_lng: f64,

        /// riding or running.
        #[arg(long, default_value = "riding")]
        activity: ActivityType,

        /// Minimum climb category (0-5).
        #[arg(long)]
        min_cat: Option<u8>,

        /// Maximum climb category (0-5).
        #[arg(long)]
        max_cat: Option<u8>,

        #[arg(long, default_value = config::DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Regenerate every plot from the log (no network access).
    Plot {
        #[arg(long, default_value = config::DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Commit the log and plots if they changed, then push.
    Publish {
        #[arg(long, default_value = config::DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Commit but do not push.
        #[arg(long, default_value_t = false)]
        no_push: bool,
    },
    /// Print the next trigger times of a daily cron expression.
    Schedule {
        #[arg(long, default_value = DEFAULT_CRON)]
        cron: String,

        /// How many upcoming runs to show.
        #[arg(long, default_value_t = 5)]
        count: usize,
    },
    /// Stay running and execute `run` at every trigger time.
    Daemon {
        #[arg(long, default_value = DEFAULT_CRON)]
        cron: String,

        #[arg(long, default_value = config::DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Commit and push after each successful run.
        #[arg(long, default_value_t = false)]
        publish: bool,

        /// Commit but do not push.
        #[arg(long, default_value_t = false)]
        no_push: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(logging::LoggingConfig::from_verbosity(cli.verbose, cli.log_json));

    match cli.command {
        Commands::Run {
            config,
            date,
            publish,
            no_push,
        } => {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            run_once(&config, date, publish, no_push).map(|_| ())
        }
        Commands::Explore {
            sw_lat,
            sw_lng,
            ne_lat,
            ne_lng,
            activity,
            min_cat,
            max_cat,
            config,
        } => run_explore(
            &config,
            Bounds::new(sw_lat, sw_lng, ne_lat, ne_lng)?,
            activity,
            min_cat.map(ClimbCategory::new).transpose()?,
            max_cat.map(ClimbCategory::new).transpose()?,
        ),
        Commands::Plot { config } => run_plot(&config),
        Commands::Publish { config, no_push } => {
            let settings = config::load_local_settings(&config)?;
            run_publish(&settings.paths, publish_settings(settings.publish, no_push))
        }
        Commands::Schedule { cron, count } => run_schedule(&cron, count),
        Commands::Daemon {
            cron,
            config,
            publish,
            no_push,
        } => run_daemon(&cron, &config, publish, no_push),
    }
}

/// One complete tracker run under the run lock.
fn run_once(config_path: &Path, date: NaiveDate, publish: bool, no_push: bool) -> Result<RunSummary> {
    let config = TrackerConfig::load(config_path)
        .with_context(|| format!("loading configuration ({})", config_path.display()))?;
    tracing::info!(
        segments = config.segment_ids.len(),
        source = ?config.source,
        "configuration loaded"
    );

    let client = strava_client(&config.credentials, &config.api)?;
    let publisher = publish
        .then(|| GitPublisher::new(".", publish_settings(config.publish.clone(), no_push)));

    let run = pipeline::run_and_publish(
        &config,
        &client,
        date,
        &TracingProgress,
        publisher.as_ref(),
    )?;
    print_summary(&run.summary);
    if let Some(outcome) = &run.published {
        print_publish_outcome(outcome);
    }
    Ok(run.summary)
}

fn strava_client(credentials: &Credentials, api: &ApiSettings) -> Result<StravaClient> {
    let circuit_breaker = Arc::new(CircuitBreaker::for_strava());
    Ok(StravaClient::new(
        credentials.clone(),
        api.clone(),
        circuit_breaker,
    )?)
}

fn publish_settings(mut settings: PublishSettings, no_push: bool) -> PublishSettings {
    if no_push {
        settings.push = false;
    }
    settings
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("Run for {}", summary.date);
    println!(
        "Segments: {}/{} fetched, {} failed",
        summary.fetched.len(),
        summary.total,
        summary.failures.len()
    );
    for snap in &summary.fetched {
        println!(
            "  {:<12} {:<40} {:>10} efforts {:>8} athletes",
            snap.id, snap.name, snap.effort_count, snap.athlete_count
        );
    }
    for (id, err) in &summary.failures {
        println!("  {id:<12} FAILED: {err}");
    }
    println!("Rows written: {}", summary.rows_written);
    println!("Plots written: {}", summary.plots.len());
    println!("Elapsed: {:.1}s", summary.elapsed.as_secs_f64());
}

fn run_explore(
    config_path: &Path,
    bounds: Bounds,
    activity: ActivityType,
    min_cat: Option<ClimbCategory>,
    max_cat: Option<ClimbCategory>,
) -> Result<()> {
    if let (Some(min), Some(max)) = (min_cat, max_cat) {
        if min > max {
            bail!("--min-cat {} is above --max-cat {}", min.value(), max.value());
        }
    }

    let access = ApiAccess::load(config_path)
        .with_context(|| format!("loading credentials ({})", config_path.display()))?;
    let client = strava_client(&access.credentials, &access.api)?;
    client
        .refresh_access_token()
        .context("authenticating with Strava")?;

    let segments = client.explore_segments(&bounds, activity, min_cat, max_cat)?;
    if segments.is_empty() {
        println!("No segments found in the specified area.");
        return Ok(());
    }

    println!("Found {} {activity} segments:", segments.len());
    print!("{}", format_explore_table(&segments));
    Ok(())
}

fn run_plot(config_path: &Path) -> Result<()> {
    let settings = config::load_local_settings(config_path)?;
    let plots = pipeline::regenerate_plots(&settings.paths.log_file, &settings.paths.plot_dir)
        .with_context(|| format!("reading {}", settings.paths.log_file.display()))?;
    for path in &plots {
        println!("{}", path.display());
    }
    println!("{} plots written", plots.len());
    Ok(())
}

fn run_publish(paths: &config::PathSettings, settings: PublishSettings) -> Result<()> {
    let publisher = GitPublisher::new(".", settings);
    let outcome = publisher.publish(&publish::artifacts(paths), Utc::now())?;
    print_publish_outcome(&outcome);
    Ok(())
}

fn print_publish_outcome(outcome: &PublishOutcome) {
    match outcome {
        PublishOutcome::NoChanges => println!("No changes to commit"),
        PublishOutcome::Committed { message, pushed } => {
            println!("Committed: {message}");
            if *pushed {
                println!("Pushed to remote");
            }
        }
    }
}

fn run_schedule(cron: &str, count: usize) -> Result<()> {
    let schedule = DailySchedule::from_cron(cron)?;
    println!("Schedule: {schedule} ({})", schedule.to_cron());
    for at in schedule.upcoming(Utc::now(), count) {
        println!("  {}", at.format("%Y-%m-%d %H:%M UTC"));
    }
    Ok(())
}

fn run_daemon(cron: &str, config_path: &Path, publish: bool, no_push: bool) -> Result<()> {
    let schedule = DailySchedule::from_cron(cron)?;
    tracing::info!(%schedule, "daemon started");

    loop {
        let now = Utc::now();
        let next = schedule.next_after(now);
        tracing::info!(next = %next, "waiting for next run");
        std::thread::sleep((next - now).to_std().unwrap_or_default());

        // A failed run is reported and the daemon waits for the next trigger.
        if let Err(e) = run_once(config_path, next.date_naive(), publish, no_push) {
            tracing::error!("scheduled run failed: {e:#}");
        }
    }
}
