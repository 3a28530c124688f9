//! # Blade Network Utilities (`common::network`)
//!
//! File: cli/src/common/network/mod.rs
//!
//! ## Overview
//!
//! The pre-flight reachability probe run before any deploy batch or shell
//! command. It is a plain TCP connect with a timeout: nothing is written to
//! the socket, and the connection is dropped as soon as it is established.
//! If the probe fails, the caller stops before any protocol traffic.
//!
//! ```rust
//! network::probe("localhost", 11311, Duration::from_secs(3)).await?;
//! ```
//!
use crate::core::error::{BladeError, Result};
use anyhow::anyhow;
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// Checks that something accepts TCP connections on `host:port`.
///
/// # Errors
///
/// `BladeError::ShellUnreachable` if the connection is refused, the host
/// cannot be resolved, or `timeout` elapses first.
pub async fn probe(host: &str, port: u16, timeout: Duration) -> Result<()> {
    debug!("Probing {}:{} (timeout {:?})", host, port, timeout);
    let outcome = tokio::time::timeout(timeout, TcpStream::connect((host, port))).await;
    let source = match outcome {
        Ok(Ok(_stream)) => {
            debug!("{}:{} is reachable", host, port);
            return Ok(());
        }
        Ok(Err(e)) => e,
        Err(_) => io::Error::new(
            io::ErrorKind::TimedOut,
            format!("no connection within {} ms", timeout.as_millis()),
        ),
    };
    Err(anyhow!(BladeError::ShellUnreachable {
        host: host.to_string(),
        port,
        source,
    }))
}
