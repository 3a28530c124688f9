//! Gradle runner. Outputs are the jars and wars under any `build/libs`.

use super::{collect_outputs, dir_named, resolve_program, BuildOutcome, BuildRunner};
use crate::common::process::{self, ProcessSpec};
use crate::core::error::Result;
use std::path::{Path, PathBuf};

const WRAPPER: &str = if cfg!(windows) { "gradlew.bat" } else { "gradlew" };
const BUILD_ARGS: &[&str] = &["assemble", "-x", "check"];
const CONTINUOUS_ARGS: &[&str] = &["assemble", "-x", "check", "--continuous"];

pub struct GradleBuild {
    base_dir: PathBuf,
}

impl GradleBuild {
    pub fn new(base_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
        }
    }

    fn spec(&self, args: &[&str]) -> Result<ProcessSpec> {
        let program = resolve_program(&self.base_dir, WRAPPER, "gradle")?;
        Ok(ProcessSpec::new(program, args, &self.base_dir))
    }
}

impl BuildRunner for GradleBuild {
    fn name(&self) -> &'static str {
        "Gradle"
    }

    fn build(&self) -> Result<BuildOutcome> {
        let spec = self.spec(BUILD_ARGS)?;
        let captured = process::run_captured(&spec)?;
        Ok(BuildOutcome::from_captured(&spec, captured))
    }

    fn output_files(&self) -> Result<Vec<PathBuf>> {
        collect_outputs(&self.base_dir, is_libs_dir)
    }

    fn continuous_build(&self) -> Result<ProcessSpec> {
        self.spec(CONTINUOUS_ARGS)
    }
}

pub(crate) fn is_gradle_project(dir: &Path) -> bool {
    [
        "build.gradle",
        "build.gradle.kts",
        "settings.gradle",
        "settings.gradle.kts",
        WRAPPER,
    ]
    .iter()
    .any(|marker| dir.join(marker).is_file())
}

fn is_libs_dir(dir: &Path) -> bool {
    dir_named(dir, "libs") && dir.parent().map(|p| dir_named(p, "build")).unwrap_or(false)
}
