//! # Blade Configuration System
//!
//! File: cli/src/core/config.rs
//!
//! ## Overview
//!
//! This module loads, merges, and validates Blade's configuration. Settings
//! come from up to two TOML files plus built-in defaults:
//!
//! 1. Project-specific `.blade.toml` in the current directory or an ancestor
//!    (the search stops at a directory containing `.git`)
//! 2. User-specific `<config dir>/blade/config.toml`
//! 3. Default values defined in the code
//!
//! ## Examples
//!
//! ```toml
//! [shell]
//! host = "localhost"
//! port = 11311
//!
//! [build]
//! tool = "gradle"
//! base_dir = "~/liferay/workspace/modules/my-portlet"
//! ```
//!
//! ```rust
//! let cfg = config::load_config()?;
//! let target = ShellTarget::from(&cfg.shell);
//! ```
//!
use crate::core::error::{BladeError, Result};
use anyhow::{anyhow, Context};
use directories::ProjectDirs;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use toml::{Table, Value};
use tracing::{debug, info};

/// Represents the main configuration structure, loaded from TOML files.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub build: BuildConfig,
}

/// Where the remote gogo shell lives and how patiently to talk to it.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ShellConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Timeout of the pre-flight reachability probe.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Timeout for opening a protocol connection.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Idle window that ends a response when no prompt is seen.
    #[serde(default = "default_quiescence_ms")]
    pub quiescence_ms: u64,
    /// Compare each response's echo line against the command that was sent.
    #[serde(default = "default_verify_responses")]
    pub verify_responses: bool,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            probe_timeout_ms: default_probe_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            quiescence_ms: default_quiescence_ms(),
            verify_responses: default_verify_responses(),
        }
    }
}

/// Which build tool produces the artifacts and where the project lives.
#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    #[serde(default)]
    pub tool: BuildToolChoice,
    /// Project base directory (can use ~). Defaults to the current directory.
    pub base_dir: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BuildToolChoice {
    #[default]
    Auto,
    Gradle,
    Maven,
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    11311
}
fn default_probe_timeout_ms() -> u64 {
    3000
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_quiescence_ms() -> u64 {
    500
}
fn default_verify_responses() -> bool {
    true
}

const PROJECT_CONFIG_FILENAME: &str = ".blade.toml";

pub fn load_config() -> Result<Config> {
    let user_config = load_user_config()?;
    let project_config = load_project_config()?;
    let mut merged_config = merge_configs(user_config, project_config)?;
    expand_config_paths(&mut merged_config).context("Failed to expand paths in configuration")?;
    validate_config(&merged_config).context("Configuration validation failed")?;
    debug!("Final loaded configuration: {:?}", merged_config);
    Ok(merged_config)
}

impl Config {
    /// The project base directory: the configured one, or the current directory.
    pub fn base_dir(&self) -> Result<PathBuf> {
        match &self.build.base_dir {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => std::env::current_dir().context("Failed to get current directory"),
        }
    }
}

fn load_user_config() -> Result<Option<Table>> {
    let Some(proj_dirs) = ProjectDirs::from("com", "Liferay", "blade") else {
        debug!("Could not determine user config directory.");
        return Ok(None);
    };
    let config_path = proj_dirs.config_dir().join("config.toml");
    if config_path.exists() {
        info!("Loading user configuration from: {}", config_path.display());
        load_config_from_path(&config_path).map(Some)
    } else {
        debug!(
            "User configuration file not found at {}",
            config_path.display()
        );
        Ok(None)
    }
}

fn load_project_config() -> Result<Option<Table>> {
    let current_dir = std::env::current_dir().context("Failed to get current directory")?;
    match find_project_config_path(&current_dir) {
        Some(path) => {
            info!("Loading project configuration from: {}", path.display());
            load_config_from_path(&path).map(Some)
        }
        None => {
            debug!("No project configuration file (.blade.toml) found.");
            Ok(None)
        }
    }
}

fn find_project_config_path(start: &Path) -> Option<PathBuf> {
    let mut path = start;
    loop {
        let project_config = path.join(PROJECT_CONFIG_FILENAME);
        if project_config.is_file() {
            return Some(project_config);
        }
        if path.join(".git").is_dir() {
            debug!(
                "Found .git directory at {}, stopping project config search.",
                path.display()
            );
            return None;
        }
        path = path.parent()?;
    }
}

/// Reads one config file. The file is checked against `Config` on its own
/// so errors name the file; the raw table is kept for merging.
fn load_config_from_path(path: &Path) -> Result<Table> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;
    toml::from_str::<Config>(&content)
        .with_context(|| format!("Failed to parse TOML from file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse TOML from file: {}", path.display()))
}

/// Every key the project file sets wins over the user file, key by key
/// within each section. Keys set in neither file take their defaults.
fn merge_configs(user: Option<Table>, project: Option<Table>) -> Result<Config> {
    let mut merged = user.unwrap_or_default();
    if let Some(project) = project {
        merge_tables(&mut merged, project);
    }
    Value::Table(merged)
        .try_into()
        .map_err(|e| anyhow!(BladeError::Config(format!("Invalid merged configuration: {}", e))))
}

fn merge_tables(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(existing)), Value::Table(section)) => merge_tables(existing, section),
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn expand_config_paths(config: &mut Config) -> Result<()> {
    if let Some(dir) = &config.build.base_dir {
        let expanded = shellexpand::tilde(dir).into_owned();
        debug!("Expanded build base directory: {}", expanded);
        config.build.base_dir = Some(expanded);
    }
    Ok(())
}

fn validate_config(config: &Config) -> Result<()> {
    if config.shell.host.trim().is_empty() {
        return Err(anyhow!(BladeError::Config(
            "shell.host cannot be empty.".to_string()
        )));
    }
    if config.shell.port == 0 {
        return Err(anyhow!(BladeError::Config(
            "shell.port must be between 1 and 65535.".to_string()
        )));
    }
    for (name, value) in [
        ("probe_timeout_ms", config.shell.probe_timeout_ms),
        ("connect_timeout_ms", config.shell.connect_timeout_ms),
        ("quiescence_ms", config.shell.quiescence_ms),
    ] {
        if value == 0 {
            return Err(anyhow!(BladeError::Config(format!(
                "shell.{} must be greater than zero.",
                name
            ))));
        }
    }
    if let Some(dir) = &config.build.base_dir {
        let dir = PathBuf::from(dir);
        if !dir.is_dir() {
            return Err(anyhow!(BladeError::Config(format!(
                "Configured build base directory '{}' is not a directory.",
                dir.display()
            ))));
        }
    }
    Ok(())
}
