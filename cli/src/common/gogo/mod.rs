//! # Gogo Shell Access (`common::gogo`)
//!
//! File: cli/src/common/gogo/mod.rs
//!
//! ## Overview
//!
//! Everything Blade knows about talking to the remote OSGi "gogo" shell:
//!
//! - **`client`**: the line-oriented TCP client (`GogoClient`) and its
//!   connection settings (`ShellTarget`).
//! - **`inventory`**: the `lb -s -u` listing parser and bundle lookup.
//!
//! The two traits below are the seam between the protocol and the deploy
//! logic. `GogoShell` is one open session that can run a command and return
//! its full textual output; `ShellConnector` opens a fresh session. The
//! reconciler is written against these traits, which is how its tests swap
//! the socket for an in-memory framework.
//!
//! ## Usage
//!
//! ```rust
//! let connector = TcpConnector::new(ShellTarget::from(&cfg.shell));
//! let mut shell = connector.connect()?;
//! let listing = shell.send("lb -s -u")?;
//! ```
//!
use crate::core::error::{BladeError, Result};
use anyhow::anyhow;

pub mod client;
pub mod inventory;

pub use client::{GogoClient, ShellTarget};

/// One open session with a remote gogo shell.
pub trait GogoShell {
    /// Sends one command line and returns the complete textual response,
    /// starting with the shell's echo of the command.
    fn send(&mut self, command: &str) -> Result<String>;
}

/// Opens gogo shell sessions. Each call returns a new, independent session.
pub trait ShellConnector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn GogoShell>>;
}

/// Connects to a real gogo shell over TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    target: ShellTarget,
}

impl TcpConnector {
    pub fn new(target: ShellTarget) -> Self {
        Self { target }
    }
}

impl ShellConnector for TcpConnector {
    fn connect(&self) -> Result<Box<dyn GogoShell>> {
        Ok(Box::new(GogoClient::connect(&self.target)?))
    }
}

/// Loose sanity check that `response` is the answer to `command`.
///
/// The first line of a response is the shell's echo of the command. When it
/// is present, it must have as many whitespace-separated words as the
/// command. A response with no text at all passes.
pub fn verify_response(command: &str, response: &str) -> Result<()> {
    let Some(echo) = response.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return Ok(());
    };
    if echo.split_whitespace().count() != command.split_whitespace().count() {
        return Err(anyhow!(BladeError::ResponseMismatch {
            command: command.to_string(),
            response: response.to_string(),
        }));
    }
    Ok(())
}
