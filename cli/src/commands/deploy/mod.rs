//! # Blade Deploy Command
//!
//! File: cli/src/commands/deploy/mod.rs
//!
//! ## Overview
//!
//! Implements `blade deploy`: build the project, then install or update
//! every artifact the build produced on a running Liferay instance.
//!
//! ## Architecture
//!
//! 1. Load the configuration (`core::config`) and build a `BladeContext`.
//! 2. Pick the build runner (`common::build::detect`) and wire a
//!    `BundleReconciler` to the configured gogo shell endpoint.
//! 3. Probe the gogo shell port. If nothing answers, stop here: no build
//!    runs and no protocol traffic is sent.
//! 4. Run the build. A failed build ends the command before any deploy.
//! 5. Deploy the outputs one at a time, in the order the build reported
//!    them. A failed artifact is reported and the batch carries on; the
//!    command exits non-zero once the batch is done.
//!
//! With `--watch`, step 5 is followed by a watch session (see `watch`):
//! a continuous build runs in the background and each rebuilt artifact is
//! redeployed as soon as it changes on disk.
//!
//! ## Usage
//!
//! ```bash
//! blade deploy
//! blade deploy --watch
//! ```
//!
use crate::common::build::{self, BuildRunner};
use crate::common::bundle::{BundleReconciler, DeployOutcome, Deployer};
use crate::common::gogo::{ShellTarget, TcpConnector};
use crate::common::network;
use crate::common::ui::Console;
use crate::core::{
    config,
    context::BladeContext,
    error::Result,
};
use anyhow::{anyhow, Context};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[cfg(test)]
mod testing;
mod watch;

/// Prefix for errors this command prints.
pub const COMMAND_NAME: &str = "deploy";

#[derive(Parser, Debug)]
#[command(about = "Build the project and deploy its bundles to a running Liferay")]
pub struct DeployArgs {
    /// Keep running: rebuild continuously and redeploy artifacts as they change.
    #[arg(short, long)]
    watch: bool,
}

pub async fn handle_deploy(args: DeployArgs) -> Result<()> {
    info!("Handling deploy command...");
    debug!("Deploy args: {:?}", args);

    let cfg = config::load_config().context("Failed to load blade configuration")?;
    let ctx = BladeContext::new(Console::stdio(), cfg)?;

    let runner: Arc<dyn BuildRunner> = Arc::from(build::detect(&ctx.base_dir, ctx.config.build.tool)?);
    let deployer: Arc<dyn Deployer> = Arc::new(BundleReconciler::new(
        TcpConnector::new(ShellTarget::from(&ctx.config.shell)),
        ctx.console.clone(),
        ctx.config.shell.verify_responses,
    ));

    run_deploy(&ctx, args.watch, runner, deployer).await
}

/// Probes the shell, then runs one deploy pass or a watch session.
///
/// The blocking pipeline runs on tokio's blocking pool.
pub(crate) async fn run_deploy(
    ctx: &BladeContext,
    watch: bool,
    runner: Arc<dyn BuildRunner>,
    deployer: Arc<dyn Deployer>,
) -> Result<()> {
    let shell = &ctx.config.shell;
    network::probe(
        &shell.host,
        shell.port,
        Duration::from_millis(shell.probe_timeout_ms),
    )
    .await?;

    let console = ctx.console.clone();
    if watch {
        let root = ctx.base_dir.clone();
        return tokio::task::spawn_blocking(move || watch::run_watch(&console, runner, deployer, &root))
            .await
            .context("Watch session ended unexpectedly")?;
    }

    let report = tokio::task::spawn_blocking(move || {
        deploy_pass(&console, runner.as_ref(), deployer.as_ref())
    })
    .await
    .context("Deploy pass ended unexpectedly")??;
    report.into_result()
}

/// What happened to each artifact of one deploy pass.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outputs: Vec<PathBuf>,
    pub deployed: Vec<(PathBuf, DeployOutcome)>,
    pub failures: Vec<(PathBuf, String)>,
}

impl BatchReport {
    /// `Err` if any artifact failed.
    pub fn into_result(self) -> Result<()> {
        info!(
            "Deploy pass finished: {} deployed, {} failed",
            self.deployed.len(),
            self.failures.len()
        );
        if self.failures.is_empty() {
            return Ok(());
        }
        Err(anyhow!(
            "{} of {} artifacts failed to deploy",
            self.failures.len(),
            self.outputs.len()
        ))
    }
}

/// Builds once, then deploys every output.
///
/// # Errors
///
/// Only for a build that could not run or failed. Per-artifact failures are
/// printed and collected in the returned report.
pub fn deploy_pass(
    console: &Console,
    runner: &dyn BuildRunner,
    deployer: &dyn Deployer,
) -> Result<BatchReport> {
    console.println(format!("Building with {}...", runner.name()));
    let outcome = runner.build()?.ensure_success()?;
    debug!("Build output of '{}':\n{}", outcome.command, outcome.output);

    let outputs = runner.output_files()?;
    if outputs.is_empty() {
        warn!("Build produced no deployable artifacts");
        console.eprintln("Warning: the build produced no jar or war files to deploy");
    }
    Ok(deploy_all(console, deployer, outputs))
}

fn deploy_all(console: &Console, deployer: &dyn Deployer, outputs: Vec<PathBuf>) -> BatchReport {
    let mut report = BatchReport::default();
    for path in &outputs {
        match deployer.install_or_update(path) {
            Ok(outcome) => {
                console.println(&outcome);
                report.deployed.push((path.clone(), outcome));
            }
            Err(e) => {
                warn!("Deploy of {} failed: {:?}", path.display(), e);
                console.error(COMMAND_NAME, format!("{:#}", e));
                report.failures.push((path.clone(), format!("{:#}", e)));
            }
        }
    }
    report.outputs = outputs;
    report
}
