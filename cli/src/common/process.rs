//! # Blade Process Execution Utilities (`common::process`)
//!
//! File: cli/src/common/process.rs
//!
//! ## Overview
//!
//! Runs the external build tools. Two shapes are needed:
//!
//! - **`run_captured`**: run to completion and keep the exit status plus
//!   the combined stdout/stderr text (one-shot builds).
//! - **`BackgroundProcess`**: spawn a long-running process on its own
//!   thread, hand every output line to a callback as it arrives, and allow
//!   a best-effort kill from any other thread (continuous builds).
//!
use crate::core::error::Result;
use anyhow::Context;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A program, its arguments, and the directory to run it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl ProcessSpec {
    pub fn new(program: impl Into<PathBuf>, args: &[&str], cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            cwd: cwd.into(),
        }
    }

    /// Shell-like rendering for messages, e.g. `./gradlew assemble -x check`.
    pub fn display(&self) -> String {
        let mut text = self.program.display().to_string();
        for arg in &self.args {
            text.push(' ');
            text.push_str(arg);
        }
        text
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).current_dir(&self.cwd);
        command
    }
}

/// Result of a process that ran to completion.
#[derive(Debug)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    /// Stdout followed by stderr.
    pub output: String,
}

/// Runs `spec` to completion, capturing its output.
///
/// A non-zero exit is not an error here; callers inspect `status`.
pub fn run_captured(spec: &ProcessSpec) -> Result<CapturedOutput> {
    info!("Executing command: {} (in {})", spec.display(), spec.cwd.display());
    let output = spec
        .command()
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("Failed to execute '{}'. Is it installed?", spec.display()))?;
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    debug!("'{}' exited with {}", spec.display(), output.status);
    Ok(CapturedOutput {
        status: output.status,
        output: text,
    })
}

/// How often the streaming thread checks whether the child has exited.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A child process whose output is streamed line by line from a dedicated thread.
pub struct BackgroundProcess {
    child: Arc<Mutex<Child>>,
    reader: JoinHandle<Result<ExitStatus>>,
    command_line: String,
}

impl BackgroundProcess {
    /// Spawns `spec` and starts streaming its stdout and stderr to `on_line`.
    ///
    /// The streaming thread ends when the process exits (or is killed) and
    /// yields its exit status.
    pub fn spawn<F>(spec: &ProcessSpec, on_line: F) -> Result<Self>
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        info!("Starting background command: {} (in {})", spec.display(), spec.cwd.display());
        let mut child = spec
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to start '{}'. Is it installed?", spec.display()))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let child = Arc::new(Mutex::new(child));
        let on_line = Arc::new(on_line);
        let command_line = spec.display();

        let reader = {
            let child = Arc::clone(&child);
            let command_line = command_line.clone();
            thread::Builder::new()
                .name("background-build".to_string())
                .spawn(move || {
                    let stderr_pump = stderr.map(|err| {
                        let on_line = Arc::clone(&on_line);
                        thread::spawn(move || pump_lines(err, on_line.as_ref()))
                    });
                    if let Some(out) = stdout {
                        pump_lines(out, on_line.as_ref());
                    }
                    if let Some(pump) = stderr_pump {
                        let _ = pump.join();
                    }
                    let status = wait_unlocked(&child)
                        .with_context(|| format!("Failed to wait for '{}'", command_line))?;
                    if status.success() {
                        info!("'{}' finished", command_line);
                    } else {
                        warn!("'{}' exited with {}", command_line, status);
                    }
                    Ok(status)
                })
                .context("Failed to start output streaming thread")?
        };

        Ok(Self {
            child,
            reader,
            command_line,
        })
    }

    /// Kills the process if it is still running. Best-effort.
    pub fn kill(&self) {
        let mut child = lock_child(&self.child);
        match child.try_wait() {
            Ok(Some(_)) => {}
            _ => {
                if let Err(e) = child.kill() {
                    debug!("Could not kill '{}': {}", self.command_line, e);
                } else {
                    info!("Stopped '{}'", self.command_line);
                }
            }
        }
    }

    /// Kills the process, then gives its output up to `grace` to drain.
    ///
    /// The streaming thread is detached if it is still busy after `grace`,
    /// e.g. when a grandchild holds the output pipes open.
    pub fn stop(self, grace: Duration) {
        self.kill();
        let deadline = Instant::now() + grace;
        while !self.reader.is_finished() && Instant::now() < deadline {
            thread::sleep(EXIT_POLL_INTERVAL);
        }
        if !self.reader.is_finished() {
            debug!("Output of '{}' still open; detaching", self.command_line);
            return;
        }
        match self.reader.join() {
            Ok(Ok(status)) => debug!("'{}' stopped with {}", self.command_line, status),
            Ok(Err(e)) => debug!("'{}' did not stop cleanly: {:#}", self.command_line, e),
            Err(_) => warn!("Output streaming thread for '{}' panicked", self.command_line),
        }
    }

    /// Waits for the process to exit and its output to drain.
    #[cfg(test)]
    pub fn wait(self) -> Result<ExitStatus> {
        self.reader.join().map_err(|_| {
            anyhow::anyhow!("Output streaming thread for '{}' panicked", self.command_line)
        })?
    }
}

fn lock_child(child: &Mutex<Child>) -> MutexGuard<'_, Child> {
    // Tolerate a poisoned lock.
    child.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Polls for the child's exit, holding the lock only for each `try_wait`
/// so `kill` can always get in.
fn wait_unlocked(child: &Mutex<Child>) -> std::io::Result<ExitStatus> {
    loop {
        if let Some(status) = lock_child(child).try_wait()? {
            return Ok(status);
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }
}

fn pump_lines<R: Read>(source: R, on_line: &(dyn Fn(&str) + Send + Sync)) {
    let reader = BufReader::new(source);
    for line in reader.lines() {
        match line {
            Ok(line) => on_line(&line),
            Err(e) => {
                debug!("Stopped reading process output: {}", e);
                break;
            }
        }
    }
}
