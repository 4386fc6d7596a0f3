//! Track and simulate commands: run the step tracker to completion.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use owo_colors::OwoColorize;
use stride_core::{
    DayClock, ManualClock, ReplaySensor, SensorDateClock, StaticPermissions, StepSensor,
    StepTracker, TrackerConfig, TrackerEvent,
};
use stride_store::{MemoryKv, MemoryRemote, RemoteStore, StepLog};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::Context;
use crate::cli::{OutputArgs, OutputFormat, TrackArgs};
use crate::format::{format_summary_csv, format_summary_json, format_summary_text};
use crate::util::{open_log, open_remote, parse_day_arg, write_output};

/// Arguments for the simulate command.
pub struct SimulateArgs {
    pub counts: Vec<u64>,
    pub date: Option<String>,
    pub dry_run: bool,
    pub track: TrackArgs,
    pub output: OutputArgs,
}

/// Replay a recorded sensor stream through the tracker.
pub async fn cmd_track(
    ctx: &Context<'_>,
    replay: &Path,
    pace_ms: u64,
    track: TrackArgs,
    output: OutputArgs,
) -> Result<()> {
    let sensor = ReplaySensor::from_path(replay)
        .with_context(|| format!("Failed to load recording {}", replay.display()))?
        .with_pace(Duration::from_millis(pace_ms));

    let clock = ctx.config.clock()?;
    let clock: Arc<dyn DayClock> = if track.sensor_dates {
        // The recording's own calendar starts on its first reading.
        let start = sensor.first_date().unwrap_or_else(|| clock.today());
        Arc::new(SensorDateClock::new(ManualClock::new(start)))
    } else {
        Arc::new(clock)
    };

    let log = open_log(&ctx.db_path())?;
    let remote = if sync_enabled(ctx, &track) {
        Some(Arc::new(open_remote(&ctx.remote_db_path())?) as Arc<dyn RemoteStore>)
    } else {
        None
    };

    run_tracker(ctx, Arc::new(sensor), log, remote, clock, track, output).await
}

/// Feed literal counter values through the tracker.
pub async fn cmd_simulate(ctx: &Context<'_>, args: SimulateArgs) -> Result<()> {
    let SimulateArgs {
        counts,
        date,
        dry_run,
        track,
        output,
    } = args;

    let day = match date {
        Some(date) => parse_day_arg(&date)?,
        None => ctx.config.clock()?.today(),
    };
    let sensor = ReplaySensor::from_counts(counts, day);
    let clock: Arc<dyn DayClock> = Arc::new(ManualClock::new(day));

    let (log, remote) = if dry_run {
        let remote: Option<Arc<dyn RemoteStore>> = if track.no_sync {
            None
        } else {
            Some(Arc::new(MemoryRemote::new()))
        };
        (StepLog::new(MemoryKv::new()), remote)
    } else {
        let remote = if sync_enabled(ctx, &track) {
            Some(Arc::new(open_remote(&ctx.remote_db_path())?) as Arc<dyn RemoteStore>)
        } else {
            None
        };
        (open_log(&ctx.db_path())?, remote)
    };

    run_tracker(ctx, Arc::new(sensor), log, remote, clock, track, output).await
}

fn sync_enabled(ctx: &Context<'_>, track: &TrackArgs) -> bool {
    ctx.config.sync.enabled && !track.no_sync
}

async fn run_tracker(
    ctx: &Context<'_>,
    sensor: Arc<dyn StepSensor>,
    log: StepLog,
    remote: Option<Arc<dyn RemoteStore>>,
    clock: Arc<dyn DayClock>,
    track: TrackArgs,
    output: OutputArgs,
) -> Result<()> {
    let config = &ctx.config;
    let user = config.resolve_user(track.user)?;
    let permissions = StaticPermissions::new(config.permissions.granted.iter().copied())
        .grant_on_request(config.permissions.grant_on_request);

    let tracker_config = TrackerConfig::new(user)
        .platform(config.platform()?)
        .retry(config.retry(track.retries));

    let mut tracker = StepTracker::new(sensor, log, tracker_config)
        .with_clock(clock)
        .with_permissions(Arc::new(permissions));
    if let Some(remote) = remote {
        tracker = tracker.with_remote(remote);
    }

    let show_progress = !ctx.quiet && output.format == OutputFormat::Text;
    let printer = show_progress.then(|| spawn_progress(&tracker, ctx.no_color));

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let result = tracker.run(cancel).await;
    signal.abort();
    drop(tracker);
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    let summary = match result {
        Ok(summary) => summary,
        Err(stride_core::Error::PermissionDenied(permission)) => bail!(
            "Permission denied: {}. Run 'stride permissions --request' or grant it with 'stride config set granted ...'",
            permission
        ),
        Err(e) => return Err(e).context("Tracker failed"),
    };

    let opts = ctx.format_options(output.no_header);
    let content = match output.format {
        OutputFormat::Text => format_summary_text(&summary, &opts),
        OutputFormat::Json => format_summary_json(&summary)?,
        OutputFormat::Csv => format_summary_csv(&summary, &opts)?,
    };
    write_output(ctx.output, &content)
}

/// Print live tracker events to stderr until the tracker goes away.
fn spawn_progress(tracker: &StepTracker, no_color: bool) -> JoinHandle<()> {
    let mut events = tracker.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            };
            match event {
                TrackerEvent::Updated { today, delta } if delta > 0 => {
                    eprintln!("{} (+{})", today, delta);
                }
                TrackerEvent::DayClosed { record } => {
                    let line = format!("Closed {}", record);
                    if no_color {
                        eprintln!("{}", line);
                    } else {
                        eprintln!("{}", line.cyan());
                    }
                }
                TrackerEvent::CounterReset { raw, previous } => {
                    eprintln!("Step counter reset ({} -> {})", previous, raw);
                }
                TrackerEvent::SensorFailed { error } | TrackerEvent::PersistFailed { error } => {
                    let line = format!("Warning: {}", error);
                    if no_color {
                        eprintln!("{}", line);
                    } else {
                        eprintln!("{}", line.yellow());
                    }
                }
                TrackerEvent::Stopped { .. } => break,
                _ => {}
            }
        }
    })
}
