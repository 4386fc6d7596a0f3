//! Config command - inspect and edit the configuration file.

use anyhow::{Context as _, Result, bail};

use super::Context;
use crate::cli::ConfigAction;
use crate::config::Config;
use crate::util::write_output;

pub fn cmd_config(ctx: &mut Context<'_>, action: ConfigAction) -> Result<()> {
    let path = ctx.config_path;

    match action {
        ConfigAction::Show => {
            let content =
                toml::to_string_pretty(&ctx.config).context("Failed to serialize config")?;
            write_output(ctx.output, &content)?;
        }
        ConfigAction::Get { key } => match ctx.config.get(key) {
            Some(value) => write_output(ctx.output, &format!("{}\n", value))?,
            None => {
                if !ctx.quiet {
                    eprintln!("(not set)");
                }
            }
        },
        ConfigAction::Set { key, value } => {
            ctx.config.set(key, &value)?;
            ctx.config.save(path)?;
            if !ctx.quiet {
                eprintln!("Updated {}", path.display());
            }
        }
        ConfigAction::Unset { key } => {
            ctx.config.unset(key);
            ctx.config.save(path)?;
            if !ctx.quiet {
                eprintln!("Updated {}", path.display());
            }
        }
        ConfigAction::Path => write_output(ctx.output, &format!("{}\n", path.display()))?,
        ConfigAction::Init => {
            if path.exists() {
                bail!("Config file already exists: {}", path.display());
            }
            Config::default().save(path)?;
            if !ctx.quiet {
                eprintln!("Created {}", path.display());
            }
        }
    }
    Ok(())
}
