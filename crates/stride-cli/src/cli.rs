//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Csv,
}

/// Reusable output format arguments
#[derive(Debug, Clone, Args)]
pub struct OutputArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Omit header row in CSV output (useful for appending)
    #[arg(long)]
    pub no_header: bool,
}

/// Day range filter shared by history-style commands
#[derive(Debug, Clone, Default, Args)]
pub struct RangeArgs {
    /// Only days on or after this date (YYYY-MM-DD)
    #[arg(long)]
    pub since: Option<String>,

    /// Only days on or before this date (YYYY-MM-DD)
    #[arg(long)]
    pub until: Option<String>,

    /// Maximum number of days to show (0 for all)
    #[arg(short = 'n', long, default_value = "0")]
    pub limit: u32,

    /// List oldest days first
    #[arg(long)]
    pub oldest_first: bool,
}

/// Tracker options shared by `track` and `simulate`
#[derive(Debug, Clone, Args)]
pub struct TrackArgs {
    /// User that owns the remote documents
    #[arg(short, long, env = "STRIDE_USER")]
    pub user: Option<String>,

    /// Do not mirror days to the remote store
    #[arg(long)]
    pub no_sync: bool,

    /// Bucket days by each reading's own date instead of the wall clock
    #[arg(long)]
    pub sensor_dates: bool,

    /// Retries for failed remote writes (overrides config)
    #[arg(long)]
    pub retries: Option<u32>,
}

#[derive(Parser)]
#[command(name = "stride")]
#[command(author, version, about = "Daily step tracking from a raw step counter", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Configuration file to use instead of the default location
    #[arg(long = "config", global = true, env = "STRIDE_CONFIG")]
    pub config_path: Option<PathBuf>,

    /// Local step database (overrides config)
    #[arg(long, global = true, env = "STRIDE_DB")]
    pub db: Option<PathBuf>,

    /// Remote step database (overrides config)
    #[arg(long, global = true, env = "STRIDE_REMOTE_DB")]
    pub remote_db: Option<PathBuf>,

    /// Write output to file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Track steps from a recorded sensor stream until it ends or Ctrl-C
    Track {
        /// Recording to replay (JSON array or one JSON reading per line)
        #[arg(short, long)]
        replay: PathBuf,

        /// Delay between readings in milliseconds
        #[arg(long, default_value = "0")]
        pace_ms: u64,

        #[command(flatten)]
        track: TrackArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Feed raw counter values through the tracker
    Simulate {
        /// Raw counter readings, in arrival order
        #[arg(required = true, num_args = 1..)]
        counts: Vec<u64>,

        /// Day the readings belong to (YYYY-MM-DD, default today)
        #[arg(short, long)]
        date: Option<String>,

        /// Keep results in memory instead of the configured databases
        #[arg(long)]
        dry_run: bool,

        #[command(flatten)]
        track: TrackArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Show daily totals from the local store
    History {
        #[command(flatten)]
        range: RangeArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Show a user's days from the remote store
    Remote {
        /// User to list
        #[arg(short, long, env = "STRIDE_USER")]
        user: Option<String>,

        #[command(flatten)]
        range: RangeArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Reconcile the local and remote stores
    Sync {
        #[command(subcommand)]
        direction: SyncDirection,
    },

    /// Show or request the runtime permissions step counting needs
    Permissions {
        /// Request missing permissions instead of only checking
        #[arg(long)]
        request: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Sync directions
#[derive(Debug, Clone, Subcommand)]
pub enum SyncDirection {
    /// Push local days to the remote store (max-wins)
    Push {
        /// User that owns the remote documents
        #[arg(short, long, env = "STRIDE_USER")]
        user: Option<String>,

        /// Only days on or after this date (YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,
    },

    /// Pull remote days into the local store (max-wins)
    Pull {
        /// User whose documents to pull
        #[arg(short, long, env = "STRIDE_USER")]
        user: Option<String>,
    },
}

/// Configuration keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigKey {
    /// Owner of remote documents
    UserUid,
    /// Local step database path
    DbPath,
    /// Remote step database path
    RemoteDbPath,
    /// Fixed UTC offset for day boundaries (e.g. +09:00)
    UtcOffset,
    /// Platform for the permission gate (android, ios, other)
    Platform,
    /// Android API level
    AndroidApiLevel,
    /// Comma-separated granted permissions
    Granted,
    /// Answer permission prompts with "allow"
    GrantOnRequest,
    /// Mirror days to the remote store
    SyncEnabled,
    /// Retries for failed remote writes
    MaxRetries,
    /// First retry delay in milliseconds
    InitialDelayMs,
}

/// Configuration subcommands
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Get a configuration value
    Get {
        /// Configuration key
        #[arg(value_enum)]
        key: ConfigKey,
    },

    /// Set a configuration value
    Set {
        /// Configuration key
        #[arg(value_enum)]
        key: ConfigKey,
        /// Configuration value
        value: String,
    },

    /// Unset (reset) a configuration value
    Unset {
        /// Configuration key to reset
        #[arg(value_enum)]
        key: ConfigKey,
    },

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_simulate_parses_counts() {
        let cli = Cli::try_parse_from([
            "stride", "simulate", "1000", "1050", "--date", "2024-01-01", "--dry-run",
        ])
        .unwrap();
        match cli.command {
            Commands::Simulate {
                counts,
                date,
                dry_run,
                ..
            } => {
                assert_eq!(counts, vec![1000, 1050]);
                assert_eq!(date.as_deref(), Some("2024-01-01"));
                assert!(dry_run);
            }
            _ => panic!("expected simulate"),
        }
    }

    #[test]
    fn test_simulate_requires_counts() {
        assert!(Cli::try_parse_from(["stride", "simulate"]).is_err());
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["stride", "-q", "-v", "history"]).is_err());
    }

    #[test]
    fn test_history_range_flags() {
        let cli = Cli::try_parse_from([
            "stride",
            "history",
            "--since",
            "2024-01-01",
            "-n",
            "7",
            "--format",
            "csv",
        ])
        .unwrap();
        match cli.command {
            Commands::History { range, output } => {
                assert_eq!(range.since.as_deref(), Some("2024-01-01"));
                assert_eq!(range.limit, 7);
                assert_eq!(output.format, OutputFormat::Csv);
            }
            _ => panic!("expected history"),
        }
    }
}
