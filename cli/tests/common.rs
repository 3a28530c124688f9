//! # Blade CLI Integration Test Common Helpers
//!
//! File: cli/tests/common.rs
//!
//! ## Overview
//!
//! Shared helpers for the integration tests in `cli/tests/`. Every test
//! runs the compiled `blade` binary inside a scratch project directory with
//! its own `HOME`, so no user configuration leaks in.
//!

// Not every test file uses every helper.
#![allow(dead_code)]

pub use assert_cmd::Command;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::Path;
use std::thread;
use tempfile::TempDir;

/// A `blade` command with an isolated home directory.
pub fn blade_cmd(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("blade").expect("Failed to find blade binary for testing");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("RUST_LOG");
    cmd
}

/// A scratch project directory with a `.blade.toml` pointing at `port`.
pub fn project_with_port(port: u16) -> TempDir {
    let dir = tempfile::tempdir().expect("Failed to create temp project");
    fs::write(
        dir.path().join(".blade.toml"),
        format!(
            "[shell]\nhost = \"127.0.0.1\"\nport = {}\nprobe_timeout_ms = 1000\nquiescence_ms = 150\n",
            port
        ),
    )
    .expect("Failed to write .blade.toml");
    dir
}

/// A port with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
    listener.local_addr().expect("No local address").port()
}

/// A minimal gogo shell: answers the first command it receives with its
/// echo, `body`, and a prompt. Connections that send nothing are skipped.
pub fn spawn_gogo_shell(body: &'static str) -> (u16, thread::JoinHandle<Option<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
    let port = listener.local_addr().expect("No local address").port();
    let handle = thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            if stream.write_all(b"Welcome to Apache Felix Gogo\r\n\r\ng! ").is_err() {
                continue;
            }
            let mut reader = BufReader::new(stream.try_clone().ok()?);
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap_or(0) == 0 {
                continue;
            }
            let command = line.trim_end().to_string();
            let _ = stream.write_all(format!("{}\r\n{}g! ", command, body).as_bytes());
            return Some(command);
        }
        None
    });
    (port, handle)
}
