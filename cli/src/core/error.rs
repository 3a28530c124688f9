//! # Blade Error Types
//!
//! File: cli/src/core/error.rs
//!
//! ## Overview
//!
//! This module defines the error types used throughout Blade. Every failure
//! that reaches the user is either a `BladeError` variant or an `anyhow`
//! chain whose root is one, so callers can classify failures with
//! `downcast_ref::<BladeError>()` while still carrying context.
//!
//! ## Architecture
//!
//! - `BladeError`: a `thiserror` enum covering configuration, filesystem,
//!   build tool, remote shell, and reconciliation failures.
//! - `Result<T>`: an alias for `anyhow::Result<T>` used by almost every
//!   function in the crate.
//!
//! The error variants fall into the following groups:
//! - Invocation-level failures (`ShellUnreachable`, `BuildFailed`, `Config`)
//!   that abort a whole deploy pass.
//! - Per-artifact failures (`InstallResponse`, `BundleIdMismatch`,
//!   `StartFailed`, `NotABundle`, ...) that are recorded against one artifact
//!   while the rest of the batch keeps going.
//!
//! ## Examples
//!
//! ```rust
//! let id = parse_install_response(&response)
//!     .with_context(|| format!("Failed to install {}", path.display()))?;
//!
//! match result {
//!     Err(e) if matches!(e.downcast_ref::<BladeError>(), Some(BladeError::ShellUnreachable { .. })) => {
//!         // nothing was sent, report and stop
//!     }
//!     other => other?,
//! }
//! ```
//!
use std::path::PathBuf;
use thiserror::Error;

/// Custom error type for the Blade application.
#[derive(Error, Debug)]
pub enum BladeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Filesystem error: {0}")]
    FileSystem(String),

    #[error("Build failed: {cmd} exited with status {status}\n{output}")]
    BuildFailed {
        cmd: String,
        status: String,
        output: String,
    },

    #[error("Unable to connect to gogo shell on {host}:{port}")]
    ShellUnreachable {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Gogo shell I/O failed while running '{command}'")]
    Protocol {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Response to '{command}' does not match the request. Response was:\n{response}")]
    ResponseMismatch { command: String, response: String },

    #[error("Unable to parse bundle id from install response:\n{response}")]
    InstallResponse { response: String },

    #[error("Bundle IDs do not match: install reported {installed}, inventory shows {resolved}")]
    BundleIdMismatch { installed: i64, resolved: i64 },

    #[error("Bundle {id} failed to start")]
    StartFailed { id: i64 },

    #[error("Web bundle install of {} did not return a bundle id", path.display())]
    WebBundleInstall { path: PathBuf },

    #[error("{} is not an OSGi bundle or web application", path.display())]
    NotABundle { path: PathBuf },

    #[error("Unable to read manifest from {}: {reason}", path.display())]
    Manifest { path: PathBuf, reason: String },

    #[error("File watch error: {0}")]
    Watch(String),

    #[error("Argument parsing error: {0}")]
    ArgumentParsing(String),
}

/// Type alias for Result using anyhow::Error for broad compatibility.
pub type Result<T> = anyhow::Result<T>;
