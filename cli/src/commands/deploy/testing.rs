//! Test doubles for the deploy pipeline: a build runner with canned outputs
//! and a deployer that records calls and fails on chosen file names.

use crate::common::build::{BuildOutcome, BuildRunner};
use crate::common::bundle::{DeployOutcome, Deployer};
use crate::common::process::ProcessSpec;
use crate::core::error::{BladeError, Result};
use anyhow::anyhow;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub struct FakeRunner {
    outputs: Vec<PathBuf>,
    succeed: bool,
    continuous: Option<ProcessSpec>,
    builds: AtomicUsize,
}

impl FakeRunner {
    pub fn new(outputs: Vec<PathBuf>) -> Self {
        Self {
            outputs,
            succeed: true,
            continuous: None,
            builds: AtomicUsize::new(0),
        }
    }

    pub fn failing(mut self) -> Self {
        self.succeed = false;
        self
    }

    pub fn with_continuous(mut self, spec: ProcessSpec) -> Self {
        self.continuous = Some(spec);
        self
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl BuildRunner for FakeRunner {
    fn name(&self) -> &'static str {
        "Fake"
    }

    fn build(&self) -> Result<BuildOutcome> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(BuildOutcome {
            command: "fake assemble".to_string(),
            success: self.succeed,
            status: if self.succeed { "0" } else { "1" }.to_string(),
            output: if self.succeed {
                "BUILD SUCCESSFUL".to_string()
            } else {
                "error: cannot find symbol".to_string()
            },
        })
    }

    fn output_files(&self) -> Result<Vec<PathBuf>> {
        Ok(self.outputs.clone())
    }

    fn continuous_build(&self) -> Result<ProcessSpec> {
        self.continuous.clone().ok_or_else(|| {
            anyhow!(BladeError::ArgumentParsing(
                "--watch is only supported for Gradle projects".to_string()
            ))
        })
    }
}

#[derive(Default)]
pub struct ScriptedDeployer {
    failing: HashSet<String>,
    calls: Mutex<Vec<PathBuf>>,
}

impl ScriptedDeployer {
    /// Deploys succeed except for files named in `failing`.
    pub fn failing_on(names: &[&str]) -> Self {
        Self {
            failing: names.iter().map(|n| n.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }

    pub fn was_called_for(&self, file_name: &str) -> bool {
        self.calls()
            .iter()
            .any(|p| p.file_name().map(|n| n == file_name).unwrap_or(false))
    }
}

impl Deployer for ScriptedDeployer {
    fn install_or_update(&self, path: &Path) -> Result<DeployOutcome> {
        self.calls.lock().unwrap().push(path.to_path_buf());
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.failing.contains(&name) {
            return Err(anyhow!(BladeError::StartFailed { id: 9 })
                .context(format!("Failed to deploy {}", path.display())));
        }
        Ok(DeployOutcome::Updated { id: 7 })
    }
}
