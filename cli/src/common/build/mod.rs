//! # Blade Build Runners (`common::build`)
//!
//! File: cli/src/common/build/mod.rs
//!
//! ## Overview
//!
//! The boundary between the deploy pipeline and the project's build tool.
//! A `BuildRunner` can:
//!
//! - run a one-shot build and report how it went,
//! - list the artifacts that build produced,
//! - describe the command that keeps rebuilding on source changes (watch mode).
//!
//! Two runners exist, `gradle::GradleBuild` and `maven::MavenBuild`. Which
//! one applies is decided by `detect`, either from the `build.tool` setting
//! or from marker files in the project directory.
//!
//! Runners prefer the project's wrapper script (`gradlew`, `mvnw`) found in
//! the project directory or any parent, and fall back to the tool on `PATH`.
//!
use crate::common::process::{CapturedOutput, ProcessSpec};
use crate::core::config::BuildToolChoice;
use crate::core::error::{BladeError, Result};
use anyhow::anyhow;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

pub mod gradle;
pub mod maven;

pub use gradle::GradleBuild;
pub use maven::MavenBuild;

/// A project build tool, as seen by the deploy pipeline.
pub trait BuildRunner: Send + Sync {
    /// Human-readable tool name, e.g. `Gradle`.
    fn name(&self) -> &'static str;

    /// Runs a one-shot build and waits for it.
    ///
    /// A build that runs but fails is returned as an unsuccessful
    /// `BuildOutcome`; `Err` means the tool could not be run at all.
    fn build(&self) -> Result<BuildOutcome>;

    /// The deployable artifacts currently present, in a stable order.
    fn output_files(&self) -> Result<Vec<PathBuf>>;

    /// The command that rebuilds continuously as sources change.
    fn continuous_build(&self) -> Result<ProcessSpec>;
}

/// How a one-shot build went.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub command: String,
    pub success: bool,
    pub status: String,
    pub output: String,
}

impl BuildOutcome {
    pub fn from_captured(spec: &ProcessSpec, captured: CapturedOutput) -> Self {
        Self {
            command: spec.display(),
            success: captured.status.success(),
            status: captured
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string()),
            output: captured.output,
        }
    }

    /// Turns an unsuccessful build into `BladeError::BuildFailed`.
    pub fn ensure_success(self) -> Result<Self> {
        if self.success {
            return Ok(self);
        }
        Err(anyhow!(BladeError::BuildFailed {
            cmd: self.command,
            status: self.status,
            output: self.output,
        }))
    }
}

/// Picks the runner for the project in `base_dir`.
pub fn detect(base_dir: &Path, choice: BuildToolChoice) -> Result<Box<dyn BuildRunner>> {
    let runner: Box<dyn BuildRunner> = match choice {
        BuildToolChoice::Gradle => Box::new(GradleBuild::new(base_dir)),
        BuildToolChoice::Maven => Box::new(MavenBuild::new(base_dir)),
        BuildToolChoice::Auto => {
            if gradle::is_gradle_project(base_dir) {
                Box::new(GradleBuild::new(base_dir))
            } else if maven::is_maven_project(base_dir) {
                Box::new(MavenBuild::new(base_dir))
            } else {
                return Err(anyhow!(BladeError::Config(format!(
                    "No Gradle or Maven build found in {}. Set build.tool in .blade.toml to choose one.",
                    base_dir.display()
                ))));
            }
        }
    };
    debug!("Using {} for {}", runner.name(), base_dir.display());
    Ok(runner)
}

/// Finds `wrapper` in `start` or the nearest parent directory that has one,
/// otherwise `tool` on `PATH`.
pub(crate) fn resolve_program(start: &Path, wrapper: &str, tool: &str) -> Result<PathBuf> {
    for dir in start.ancestors() {
        let candidate = dir.join(wrapper);
        if candidate.is_file() {
            debug!("Found build wrapper: {}", candidate.display());
            return Ok(candidate);
        }
    }
    which::which(tool).map_err(|e| {
        anyhow!(BladeError::Config(format!(
            "Neither {} (in {} or a parent directory) nor '{}' on PATH was found: {}",
            wrapper,
            start.display(),
            tool,
            e
        )))
    })
}

/// Collects `*.jar` / `*.war` files under `root` whose parent directory
/// satisfies `in_output_dir`, skipping `-sources`, `-javadoc` and `-tests`
/// classifiers.
pub(crate) fn collect_outputs(root: &Path, in_output_dir: fn(&Path) -> bool) -> Result<Vec<PathBuf>> {
    let mut outputs = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored_dir(e));
    for entry in walker {
        let entry = entry.map_err(|e| {
            anyhow!(BladeError::FileSystem(format!(
                "Failed to scan {} for build outputs: {}",
                root.display(),
                e
            )))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let in_dir = path.parent().map(in_output_dir).unwrap_or(false);
        if in_dir && is_deployable(path) {
            outputs.push(path.to_path_buf());
        }
    }
    outputs.sort();
    debug!("Found {} build outputs under {}", outputs.len(), root.display());
    Ok(outputs)
}

fn is_ignored_dir(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || name == "node_modules"
}

fn is_deployable(path: &Path) -> bool {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    if !extension.eq_ignore_ascii_case("jar") && !extension.eq_ignore_ascii_case("war") {
        return false;
    }
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    !["-sources", "-javadoc", "-tests"]
        .iter()
        .any(|classifier| stem.ends_with(classifier))
}

pub(crate) fn dir_named(path: &Path, name: &str) -> bool {
    path.file_name().map(|n| n == name).unwrap_or(false)
}
