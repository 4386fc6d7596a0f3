//! Command-line interface for daily step tracking.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `track` | Replay a recorded sensor stream through the tracker |
//! | `simulate` | Feed literal counter values through the tracker |
//! | `history` | Daily totals from the local store |
//! | `remote` | A user's days from the remote store |
//! | `sync` | Push or pull days between the stores |
//! | `permissions` | Check or request runtime permissions |
//! | `config` | Manage CLI configuration |
//! | `completions` | Generate shell completions |
//!
//! Configuration lives in `~/.config/stride/config.toml` (or platform
//! equivalent). `STRIDE_USER`, `STRIDE_CONFIG`, `STRIDE_DB` and
//! `STRIDE_REMOTE_DB` override it.

mod cli;
mod commands;
mod config;
mod format;
mod util;

use std::io;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::{Context, SimulateArgs};
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    human_panic::setup_panic!();

    let cli = Cli::parse();

    // Handle completions command early (before tracing init)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "stride", &mut io::stdout());
        return Ok(());
    }

    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    // Logs go to stderr so stdout stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(!cli.no_color)
        .init();

    let config_path = cli.config_path.clone().unwrap_or_else(Config::default_path);
    let mut ctx = Context {
        config: Config::load(&config_path),
        config_path: &config_path,
        db: cli.db.as_deref(),
        remote_db: cli.remote_db.as_deref(),
        output: cli.output.as_ref(),
        quiet: cli.quiet,
        no_color: cli.no_color,
    };

    match cli.command {
        Commands::Track {
            replay,
            pace_ms,
            track,
            output,
        } => commands::cmd_track(&ctx, &replay, pace_ms, track, output).await,
        Commands::Simulate {
            counts,
            date,
            dry_run,
            track,
            output,
        } => {
            commands::cmd_simulate(
                &ctx,
                SimulateArgs {
                    counts,
                    date,
                    dry_run,
                    track,
                    output,
                },
            )
            .await
        }
        Commands::History { range, output } => commands::cmd_history(&ctx, &range, &output),
        Commands::Remote {
            user,
            range,
            output,
        } => commands::cmd_remote(&ctx, user, &range, &output),
        Commands::Sync { direction } => commands::cmd_sync(&ctx, direction),
        Commands::Permissions { request, format } => {
            commands::cmd_permissions(&mut ctx, request, format).await
        }
        Commands::Config { action } => commands::cmd_config(&mut ctx, action),
        Commands::Completions { .. } => Ok(()),
    }
}
