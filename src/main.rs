//! myco-telemetry - greenhouse sensor analytics
//!
//! Replays or streams reading events into a [`TelemetryEngine`] and prints the
//! derived stats bundle as JSON at a fixed interval and on shutdown.
//!
//! # Usage
//!
//! ```bash
//! # Replay a CSV export (timestamp,sensorType,value,sourceId)
//! myco-telemetry --csv readings.csv --timeframe 24h
//!
//! # Stream from the simulator
//! simulation --hours 48 --scenario co2-buildup | myco-telemetry --stdin --event-time
//!
//! # Dump the effective configuration
//! myco-telemetry --print-config
//! ```
//!
//! # Environment Variables
//!
//! - `MYCO_CONFIG`: Path to the engine TOML config (default: ./telemetry.toml)
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use myco_telemetry::source::{
    read_csv_events, CsvSource, JsonLinesSource, ReadingSource, SourceEvent,
};
use myco_telemetry::{
    AppendOutcome, Clock, EngineConfig, ManualClock, SystemClock, TelemetryEngine, Timeframe,
};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "myco-telemetry")]
#[command(about = "Greenhouse sensor telemetry analytics engine")]
#[command(version)]
struct CliArgs {
    /// Read JSON reading events from stdin, one per line
    #[arg(long, conflicts_with = "csv")]
    stdin: bool,

    /// Path to a CSV file with columns timestamp,sensorType,value,sourceId
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Engine config file (overrides MYCO_CONFIG and ./telemetry.toml)
    #[arg(long, env = "MYCO_CONFIG")]
    config: Option<PathBuf>,

    /// Timeframe to report (1h, 24h, 7d, 30d)
    #[arg(long, default_value = "24h")]
    timeframe: Timeframe,

    /// Seconds between periodic reports (0 = only report at the end)
    #[arg(long, default_value = "10")]
    report_secs: u64,

    /// Delay between CSV events in milliseconds (0 = as fast as possible)
    #[arg(long, default_value = "0")]
    delay_ms: u64,

    /// Drive the engine clock from event timestamps instead of wall time.
    /// Always on for CSV replay.
    #[arg(long)]
    event_time: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

// ============================================================================
// Ingest Tally
// ============================================================================

#[derive(Debug, Default)]
struct Tally {
    inserted: u64,
    late: u64,
    duplicate: u64,
    expired: u64,
    untracked: u64,
    rejected: u64,
}

impl Tally {
    fn record(&mut self, outcome: &AppendOutcome) {
        match outcome {
            AppendOutcome::Inserted { late, .. } => {
                self.inserted += 1;
                if *late {
                    self.late += 1;
                }
            }
            AppendOutcome::Duplicate => self.duplicate += 1,
            AppendOutcome::Expired => self.expired += 1,
            AppendOutcome::Untracked => self.untracked += 1,
            AppendOutcome::Rejected => self.rejected += 1,
        }
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => EngineConfig::load(),
    };

    if args.print_config {
        print!("{}", config.to_toml().context("Failed to serialize config")?);
        return Ok(());
    }

    // Event time starts at the epoch and follows the newest reading seen
    let event_clock = (args.event_time || args.csv.is_some())
        .then(|| Arc::new(ManualClock::new(chrono::DateTime::UNIX_EPOCH)));
    let clock: Arc<dyn Clock> = match &event_clock {
        Some(c) => Arc::clone(c) as Arc<dyn Clock>,
        None => Arc::new(SystemClock),
    };

    let engine = Arc::new(
        TelemetryEngine::with_clock(config, clock).context("Invalid engine configuration")?,
    );
    if !engine.timeframes().contains(&args.timeframe) {
        anyhow::bail!("Timeframe {} is not enabled in [windows]", args.timeframe);
    }

    info!("");
    info!("  Myco Telemetry - site {}", engine.config().site.name);
    info!(
        "  Scoring {} sensor types, reporting {} window",
        engine.registry().len(),
        args.timeframe
    );
    info!("");

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let maintenance = engine.spawn_maintenance(cancel_token.clone());

    let tally = if args.stdin {
        info!("Input: stdin (JSON reading events)");
        run(JsonLinesSource::stdin(), &engine, event_clock.as_deref(), &args, cancel_token.clone()).await?
    } else if let Some(path) = &args.csv {
        let events = read_csv_events(path)?;
        if events.is_empty() {
            anyhow::bail!("No reading events loaded from {}", path.display());
        }
        info!(count = events.len(), "Input: CSV replay");
        let source = CsvSource::new(events, args.delay_ms);
        run(source, &engine, event_clock.as_deref(), &args, cancel_token.clone()).await?
    } else {
        anyhow::bail!("No input selected: pass --csv <file> or --stdin");
    };

    report(&engine, args.timeframe).await?;
    info!(
        inserted = tally.inserted,
        late = tally.late,
        duplicate = tally.duplicate,
        expired = tally.expired,
        untracked = tally.untracked,
        rejected = tally.rejected,
        "Ingest summary"
    );

    cancel_token.cancel();
    maintenance.await.context("Maintenance task panicked")?;
    info!("Myco Telemetry shutdown complete");
    Ok(())
}

/// Pump events from `source` into the engine until EOF or cancellation,
/// printing a report every `report_secs`.
async fn run(
    mut source: impl ReadingSource,
    engine: &TelemetryEngine,
    event_clock: Option<&ManualClock>,
    args: &CliArgs,
    cancel: CancellationToken,
) -> Result<Tally> {
    let mut tally = Tally::default();
    let periodic = args.report_secs > 0;
    let mut report_timer =
        tokio::time::interval(std::time::Duration::from_secs(args.report_secs.max(1)));
    // The first tick completes immediately; skip it
    report_timer.tick().await;

    info!(source = source.source_name(), "Ingest loop starting");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Ingest loop received shutdown signal");
                break;
            }
            _ = report_timer.tick(), if periodic => {
                report(engine, args.timeframe).await?;
            }
            event = source.next_event() => match event? {
                SourceEvent::Reading(event) => match event.into_reading() {
                    Ok(reading) => {
                        if let Some(clock) = event_clock {
                            if reading.timestamp > clock.now() {
                                clock.set(reading.timestamp);
                            }
                        }
                        tally.record(&engine.ingest(reading));
                    }
                    Err(e) => {
                        warn!(error = %e, "Rejected reading event");
                        tally.rejected += 1;
                    }
                },
                SourceEvent::Malformed(_) => tally.rejected += 1,
                SourceEvent::Eof => {
                    info!(source = source.source_name(), "Source exhausted");
                    break;
                }
            },
        }
    }
    Ok(tally)
}

/// Print the bundle for `timeframe` as pretty JSON on stdout.
async fn report(engine: &TelemetryEngine, timeframe: Timeframe) -> Result<()> {
    let snapshot = engine.snapshot_all(timeframe).await?;
    if let Some(profile) = &snapshot.bundle.efficiency {
        info!(
            timeframe = %timeframe,
            overall = profile.overall_score,
            scored = snapshot.bundle.deviation.len(),
            "Efficiency report"
        );
    } else {
        info!(timeframe = %timeframe, "No sensor type has enough data yet");
    }
    println!("{}", serde_json::to_string_pretty(snapshot.as_ref())?);
    Ok(())
}
