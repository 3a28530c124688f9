//! # Watch-Mode Deploy
//!
//! File: cli/src/commands/deploy/watch.rs
//!
//! ## Overview
//!
//! `blade deploy --watch` keeps a project deployed while it is being edited:
//!
//! 1. One ordinary deploy pass (`deploy_pass`). A failed build ends the
//!    command; failed artifacts are reported and the session starts anyway.
//! 2. The build tool's continuous mode runs as a background process whose
//!    output is streamed to the console. If it cannot start or later dies,
//!    that is reported and watching continues.
//! 3. A recursive file watch on the project directory redeploys any of the
//!    artifacts from step 1 when it changes. A failed redeploy is reported
//!    and the next change is handled as usual.
//!
//! The session runs until the process is stopped. The background build is
//! killed when the session is dropped.
//!
use super::{deploy_pass, COMMAND_NAME};
use crate::common::build::BuildRunner;
use crate::common::bundle::Deployer;
use crate::common::process::{BackgroundProcess, ProcessSpec};
use crate::common::ui::Console;
use crate::common::watch::{FileWatcher, WatchLoop};
use crate::core::error::Result;
use chrono::Local;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// How long a killed background build may take to flush its output.
const BUILD_STOP_GRACE: Duration = Duration::from_secs(2);

pub fn run_watch(
    console: &Console,
    runner: Arc<dyn BuildRunner>,
    deployer: Arc<dyn Deployer>,
    root: &Path,
) -> Result<()> {
    // Refuse tools without a continuous mode before building anything.
    let continuous = runner.continuous_build()?;

    let report = deploy_pass(console, runner.as_ref(), deployer.as_ref())?;
    if !report.failures.is_empty() {
        console.eprintln(format!(
            "{} of {} artifacts failed to deploy; watching for changes anyway",
            report.failures.len(),
            report.outputs.len()
        ));
    }

    let session = WatchSession::start(console, &continuous, deployer, root, report.outputs)?;
    console.println(format!(
        "Watching {} for changes to {} artifacts. Press Ctrl-C to stop.",
        session.watched_root().display(),
        session.tracked_output_paths().len()
    ));
    session.wait()
}

/// A running watch: the file watch thread plus the background build.
pub struct WatchSession {
    watched_root: PathBuf,
    tracked_output_paths: HashSet<PathBuf>,
    background_build: Option<BackgroundProcess>,
    watch_loop: Option<WatchLoop>,
}

impl WatchSession {
    pub fn start(
        console: &Console,
        continuous: &ProcessSpec,
        deployer: Arc<dyn Deployer>,
        root: &Path,
        outputs: Vec<PathBuf>,
    ) -> Result<Self> {
        let tracked: HashSet<PathBuf> = outputs.iter().map(|p| absolute(p)).collect();
        let background_build = start_background_build(console, continuous);

        let on_change = redeploy_on_change(console.clone(), deployer, tracked.clone());
        let watch_loop = match FileWatcher::start(root, true, tracked.clone(), on_change) {
            Ok(watch_loop) => watch_loop,
            Err(e) => {
                if let Some(build) = &background_build {
                    build.kill();
                }
                return Err(e);
            }
        };

        Ok(Self {
            watched_root: watch_loop.watcher().root().to_path_buf(),
            tracked_output_paths: tracked,
            background_build,
            watch_loop: Some(watch_loop),
        })
    }

    pub fn watched_root(&self) -> &Path {
        &self.watched_root
    }

    pub fn tracked_output_paths(&self) -> &HashSet<PathBuf> {
        &self.tracked_output_paths
    }

    /// Stops the file watch. `wait` returns once the watch thread has ended.
    pub fn close(&self) {
        if let Some(watch_loop) = &self.watch_loop {
            watch_loop.close();
        }
    }

    /// Blocks until the file watch ends, then stops the background build.
    pub fn wait(mut self) -> Result<()> {
        let result = match self.watch_loop.take() {
            Some(watch_loop) => watch_loop.join(),
            None => Ok(()),
        };
        self.stop_background_build();
        result
    }

    fn stop_background_build(&mut self) {
        if let Some(build) = self.background_build.take() {
            build.stop(BUILD_STOP_GRACE);
        }
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.close();
        self.stop_background_build();
    }
}

fn start_background_build(console: &Console, spec: &ProcessSpec) -> Option<BackgroundProcess> {
    let out = console.clone();
    match BackgroundProcess::spawn(spec, move |line| out.println(line)) {
        Ok(process) => Some(process),
        Err(e) => {
            error!("Continuous build failed to start: {:?}", e);
            console.error(COMMAND_NAME, format!("Continuous build not running: {:#}", e));
            None
        }
    }
}

/// The watch callback: redeploys a changed artifact and reports the result.
///
/// Errors are printed, never returned.
fn redeploy_on_change(
    console: Console,
    deployer: Arc<dyn Deployer>,
    tracked: HashSet<PathBuf>,
) -> impl FnMut(&Path) + Send + 'static {
    move |path: &Path| {
        let path = absolute(path);
        if !tracked.contains(&path) {
            return;
        }
        if !path.is_file() {
            debug!("{} is gone, waiting for the next build", path.display());
            return;
        }

        console.println(format!("[{}] Redeploying {}", timestamp(), path.display()));
        match deployer.install_or_update(&path) {
            Ok(outcome) => {
                info!("Redeployed {}: {}", path.display(), outcome);
                console.println(format!("[{}] {}", timestamp(), outcome));
            }
            Err(e) => {
                error!("Redeploy of {} failed: {:?}", path.display(), e);
                console.error(COMMAND_NAME, format!("{:#}", e));
            }
        }
    }
}

fn absolute(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn timestamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}
