//! Command implementations for the CLI.

mod config;
mod history;
mod permissions;
mod remote;
mod sync;
mod track;

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::format::FormatOptions;

pub use config::cmd_config;
pub use history::cmd_history;
pub use permissions::cmd_permissions;
pub use remote::cmd_remote;
pub use sync::cmd_sync;
pub use track::{SimulateArgs, cmd_simulate, cmd_track};

/// Settings shared by every command.
pub struct Context<'a> {
    pub config: Config,
    pub config_path: &'a Path,
    pub db: Option<&'a Path>,
    pub remote_db: Option<&'a Path>,
    pub output: Option<&'a PathBuf>,
    pub quiet: bool,
    pub no_color: bool,
}

impl Context<'_> {
    pub fn db_path(&self) -> PathBuf {
        self.config.db_path(self.db)
    }

    pub fn remote_db_path(&self) -> PathBuf {
        self.config.remote_db_path(self.remote_db)
    }

    pub fn format_options(&self, no_header: bool) -> FormatOptions {
        FormatOptions::new(self.no_color).with_no_header(no_header)
    }
}
