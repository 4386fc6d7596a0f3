//! Permissions command - check or request the runtime permission set.

use anyhow::{Result, bail};
use stride_core::{GateResult, StaticPermissions, check_all, request_all};

use super::Context;
use crate::cli::OutputFormat;
use crate::format::{format_permissions_csv, format_permissions_json, format_permissions_text};
use crate::util::write_output;

pub async fn cmd_permissions(
    ctx: &mut Context<'_>,
    request: bool,
    format: OutputFormat,
) -> Result<()> {
    let platform = ctx.config.platform()?;
    let provider = StaticPermissions::new(ctx.config.permissions.granted.iter().copied())
        .grant_on_request(ctx.config.permissions.grant_on_request);

    let denied = if request {
        let result = request_all(&provider, platform).await;

        // Prompts answered with "allow" stick.
        let newly_granted: Vec<_> = provider
            .requested()
            .into_iter()
            .filter(|p| Some(*p) != denied_permission(result))
            .collect();
        if !newly_granted.is_empty() && ctx.config.permissions.grant_on_request {
            ctx.config.grant(&newly_granted);
            ctx.config.save(ctx.config_path)?;
            if !ctx.quiet {
                eprintln!("Saved {} granted permissions", newly_granted.len());
            }
        }
        denied_permission(result)
    } else {
        None
    };

    let statuses = check_all(&provider, platform).await;
    let opts = ctx.format_options(false);
    let content = match format {
        OutputFormat::Text => {
            let mut text = format!("Platform: {}\n", platform);
            text.push_str(&format_permissions_text(&statuses, &opts));
            text
        }
        OutputFormat::Json => format_permissions_json(&statuses)?,
        OutputFormat::Csv => format_permissions_csv(&statuses, &opts),
    };
    write_output(ctx.output, &content)?;

    if let Some(permission) = denied {
        bail!("Permission denied: {}", permission);
    }
    Ok(())
}

fn denied_permission(result: GateResult) -> Option<stride_core::Permission> {
    match result {
        GateResult::Granted => None,
        GateResult::Denied(permission) => Some(permission),
    }
}
