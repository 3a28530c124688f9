//! # Blade Shell Command
//!
//! File: cli/src/commands/sh.rs
//!
//! ## Overview
//!
//! Implements `blade sh <command...>`: sends one command line to the gogo
//! shell of the running Liferay instance and prints what it answered. The
//! same reachability probe as `blade deploy` runs first.
//!
//! ## Usage
//!
//! ```bash
//! blade sh lb -s
//! blade sh diag 42
//! ```
//!
use crate::common::gogo::{GogoClient, GogoShell, ShellTarget};
use crate::common::network;
use crate::common::ui::Console;
use crate::core::{config, context::BladeContext, error::Result};
use anyhow::Context;
use clap::Parser;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(about = "Run a gogo shell command on the running Liferay")]
pub struct ShArgs {
    /// The gogo shell command and its arguments.
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "COMMAND"
    )]
    command: Vec<String>,
}

pub async fn handle_sh(args: ShArgs) -> Result<()> {
    info!("Handling sh command...");
    debug!("Sh args: {:?}", args);

    let cfg = config::load_config().context("Failed to load blade configuration")?;
    let ctx = BladeContext::new(Console::stdio(), cfg)?;
    run_sh(&ctx, &args.command.join(" ")).await
}

pub(crate) async fn run_sh(ctx: &BladeContext, command: &str) -> Result<()> {
    let shell = &ctx.config.shell;
    network::probe(
        &shell.host,
        shell.port,
        Duration::from_millis(shell.probe_timeout_ms),
    )
    .await?;

    let target = ShellTarget::from(shell);
    let line = command.to_string();
    let response = tokio::task::spawn_blocking(move || -> Result<String> {
        let mut client = GogoClient::connect(&target)?;
        let response = client.send(&line)?;
        client.close();
        Ok(response)
    })
    .await
    .context("Shell session ended unexpectedly")??;

    for line in strip_echo(&response, command) {
        ctx.console.println(line);
    }
    Ok(())
}

/// The response lines after the shell's echo of `command`.
fn strip_echo<'a>(response: &'a str, command: &str) -> impl Iterator<Item = &'a str> {
    let mut lines = response.lines().peekable();
    if lines.peek().map(|first| first.trim() == command.trim()) == Some(true) {
        lines.next();
    }
    lines
}
