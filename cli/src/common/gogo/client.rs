//! # Gogo Shell TCP Client (`common::gogo::client`)
//!
//! File: cli/src/common/gogo/client.rs
//!
//! ## Overview
//!
//! A blocking, line-oriented client for the OSGi gogo shell as exposed over
//! telnet (Liferay listens on `localhost:11311` by default).
//!
//! ## Framing
//!
//! - Commands are written as ASCII text followed by `\r\n`.
//! - Telnet option negotiation (`IAC` sequences) sent by the server is
//!   stripped from the byte stream and never answered.
//! - On connect the banner is read until the `g! ` prompt, waiting up to
//!   `connect_timeout` for it.
//! - A response ends when the `g! ` prompt shows up at the end of the text
//!   read so far. If the server has not shown a prompt in its banner, a
//!   response instead ends after `quiescence` passes with no new bytes.
//! - The returned text includes the shell's echo of the command as its first
//!   line and excludes the trailing prompt. Line endings are normalised to `\n`.
//!
//! One `GogoClient` is one TCP connection. Dropping it closes the socket.
//!
use crate::common::gogo::GogoShell;
use crate::core::config::ShellConfig;
use crate::core::error::{BladeError, Result};
use anyhow::{anyhow, Context};
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

const PROMPT: &str = "g! ";

/// Upper bound on how long a prompting shell may take to answer one command.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);

const IAC: u8 = 255;
const SB: u8 = 250;
const SE: u8 = 240;
const WILL: u8 = 251;
const DONT: u8 = 254;

/// Address and timing settings for gogo shell connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellTarget {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub quiescence: Duration,
}

impl From<&ShellConfig> for ShellTarget {
    fn from(config: &ShellConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            quiescence: Duration::from_millis(config.quiescence_ms),
        }
    }
}

#[cfg(test)]
impl ShellTarget {
    /// A target at `host:port` with the default timeouts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let defaults = ShellConfig::default();
        Self {
            host: host.into(),
            port,
            ..Self::from(&defaults)
        }
    }
}

/// An open telnet session with a gogo shell.
pub struct GogoClient {
    stream: TcpStream,
    quiescence: Duration,
    prompted: bool,
    peer: String,
}

impl GogoClient {
    /// Connects to the shell and drains its banner.
    ///
    /// # Errors
    ///
    /// Returns `BladeError::ShellUnreachable` if no address for the target
    /// accepts a connection within `connect_timeout`.
    pub fn connect(target: &ShellTarget) -> Result<Self> {
        let stream = open_stream(target).map_err(|source| {
            anyhow!(BladeError::ShellUnreachable {
                host: target.host.clone(),
                port: target.port,
                source,
            })
        })?;
        stream
            .set_read_timeout(Some(target.quiescence))
            .context("Failed to set read timeout on gogo shell socket")?;
        let _ = stream.set_nodelay(true);

        let mut client = Self {
            stream,
            quiescence: target.quiescence,
            prompted: false,
            peer: format!("{}:{}", target.host, target.port),
        };

        let banner = client
            .read_banner(target.connect_timeout)
            .with_context(|| format!("Failed to read banner from {}", client.peer))?;
        client.prompted = banner.ends_with(PROMPT);
        debug!(
            "Connected to gogo shell at {} (prompt detected: {})",
            client.peer, client.prompted
        );
        Ok(client)
    }

    /// Closes the connection. Equivalent to dropping the client.
    pub fn close(self) {}

    /// Reads the banner until the prompt, EOF, or `timeout` has passed.
    ///
    /// Slow shells may send the banner in pieces with pauses longer than
    /// `quiescence` in between.
    fn read_banner(&mut self, timeout: Duration) -> io::Result<String> {
        let deadline = Instant::now() + timeout;
        let mut raw = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let chunk = self.read_bytes(remaining)?;
            if chunk.is_empty() {
                break;
            }
            raw.extend_from_slice(&chunk);
            if decode(&raw).ends_with(PROMPT) || Instant::now() >= deadline {
                break;
            }
        }
        Ok(decode(&raw))
    }

    /// Reads until the prompt, EOF, or an idle read timeout.
    ///
    /// While nothing has arrived yet, idle timeouts are tolerated for up to
    /// `first_byte_wait`. Once the shell is known to prompt, idle timeouts
    /// are tolerated for up to `RESPONSE_TIMEOUT` in total.
    fn read_raw(&mut self, first_byte_wait: Duration) -> io::Result<String> {
        self.read_bytes(first_byte_wait).map(|raw| decode(&raw))
    }

    fn read_bytes(&mut self, first_byte_wait: Duration) -> io::Result<Vec<u8>> {
        let started = Instant::now();
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    raw.extend_from_slice(&buf[..n]);
                    if decode(&raw).ends_with(PROMPT) {
                        break;
                    }
                }
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    let elapsed = started.elapsed();
                    if self.prompted && elapsed < RESPONSE_TIMEOUT {
                        continue;
                    }
                    if raw.is_empty() && elapsed < first_byte_wait {
                        continue;
                    }
                    break;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(raw)
    }
}

impl GogoShell for GogoClient {
    fn send(&mut self, command: &str) -> Result<String> {
        debug!("gogo> {}", command);
        let line = format!("{}\r\n", command);
        self.stream
            .write_all(line.as_bytes())
            .and_then(|_| self.stream.flush())
            .map_err(|source| {
                anyhow!(BladeError::Protocol {
                    command: command.to_string(),
                    source,
                })
            })?;

        let wait = self.quiescence.max(RESPONSE_TIMEOUT);
        let raw = self.read_raw(wait).map_err(|source| {
            anyhow!(BladeError::Protocol {
                command: command.to_string(),
                source,
            })
        })?;
        let response = strip_prompt(&raw);
        trace!("gogo< {}", response);
        Ok(response)
    }
}

impl Drop for GogoClient {
    fn drop(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
        debug!("Closed gogo shell connection to {}", self.peer);
    }
}

fn open_stream(target: &ShellTarget) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in (target.host.as_str(), target.port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, target.connect_timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("Connection to {} failed: {}", addr, e);
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("No address found for {}", target.host),
        )
    }))
}

/// Turns raw socket bytes into text: telnet commands removed, `\r` dropped.
fn decode(raw: &[u8]) -> String {
    String::from_utf8_lossy(&strip_telnet(raw))
        .chars()
        .filter(|c| *c != '\r' && *c != '\0')
        .collect()
}

fn strip_prompt(text: &str) -> String {
    text.strip_suffix(PROMPT)
        .unwrap_or(text)
        .trim_end_matches('\n')
        .to_string()
}

/// Removes telnet `IAC` command sequences, keeping escaped `IAC IAC` bytes.
fn strip_telnet(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] != IAC {
            out.push(raw[i]);
            i += 1;
            continue;
        }
        match raw.get(i + 1) {
            Some(&IAC) => {
                out.push(IAC);
                i += 2;
            }
            Some(&SB) => {
                // Skip to IAC SE; an unterminated block swallows the rest.
                let end = raw[i + 2..]
                    .windows(2)
                    .position(|w| w == [IAC, SE])
                    .map(|p| i + 2 + p + 2);
                i = end.unwrap_or(raw.len());
            }
            Some(cmd) if (WILL..=DONT).contains(cmd) => i += 3,
            Some(_) => i += 2,
            None => i += 1,
        }
    }
    out
}
