//! Maven runner. Outputs are the jars and wars directly inside any `target/`.
//!
//! Maven has no continuous build, so watch mode is refused up front.

use super::{collect_outputs, dir_named, resolve_program, BuildOutcome, BuildRunner};
use crate::common::process::{self, ProcessSpec};
use crate::core::error::{BladeError, Result};
use anyhow::anyhow;
use std::path::{Path, PathBuf};

const WRAPPER: &str = if cfg!(windows) { "mvnw.cmd" } else { "mvnw" };
const BUILD_ARGS: &[&str] = &["package", "-DskipTests"];

pub struct MavenBuild {
    base_dir: PathBuf,
}

impl MavenBuild {
    pub fn new(base_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
        }
    }
}

impl BuildRunner for MavenBuild {
    fn name(&self) -> &'static str {
        "Maven"
    }

    fn build(&self) -> Result<BuildOutcome> {
        let program = resolve_program(&self.base_dir, WRAPPER, "mvn")?;
        let spec = ProcessSpec::new(program, BUILD_ARGS, &self.base_dir);
        let captured = process::run_captured(&spec)?;
        Ok(BuildOutcome::from_captured(&spec, captured))
    }

    fn output_files(&self) -> Result<Vec<PathBuf>> {
        collect_outputs(&self.base_dir, |dir| dir_named(dir, "target"))
    }

    fn continuous_build(&self) -> Result<ProcessSpec> {
        Err(anyhow!(BladeError::ArgumentParsing(
            "--watch is only supported for Gradle projects".to_string()
        )))
    }
}

pub(crate) fn is_maven_project(dir: &Path) -> bool {
    dir.join("pom.xml").is_file()
}
