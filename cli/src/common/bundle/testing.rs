//! In-memory stand-in for a remote OSGi framework and its gogo shell.
//!
//! `FakeFramework` implements `ShellConnector`; every session it hands out
//! records the commands it receives and answers them the way a gogo shell
//! would (echo line first), updating a small bundle table as it goes.
//! `install` reads the artifact's manifest from the `file:` URI to learn its
//! symbolic name.

use crate::common::bundle::artifact::ArtifactDescriptor;
use crate::common::gogo::inventory::BundleState;
use crate::common::gogo::{GogoShell, ShellConnector};
use crate::core::error::{BladeError, Result};
use anyhow::anyhow;
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use url::Url;

#[derive(Clone)]
pub struct FakeFramework {
    inner: Arc<Mutex<FrameworkState>>,
}

#[derive(Default)]
struct FrameworkState {
    bundles: Vec<FakeBundle>,
    next_id: i64,
    commands: Vec<String>,
    connects: usize,
    open_sessions: usize,
    misreported_install_id: Option<i64>,
    garble_install: bool,
    unreachable: bool,
    replies: HashMap<String, String>,
    raw_replies: HashMap<String, String>,
    broken_on: Option<String>,
}

struct FakeBundle {
    id: i64,
    symbolic_name: String,
    state: BundleState,
}

impl FakeFramework {
    /// An empty framework whose next installed bundle gets `next_id`.
    pub fn new(next_id: i64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FrameworkState {
                next_id,
                ..Default::default()
            })),
        }
    }

    pub fn with_bundle(self, id: i64, symbolic_name: &str, state: BundleState) -> Self {
        self.inner.lock().unwrap().bundles.push(FakeBundle {
            id,
            symbolic_name: symbolic_name.to_string(),
            state,
        });
        self
    }

    /// `install` answers with `id` instead of the id actually assigned.
    pub fn misreport_install_id(self, id: i64) -> Self {
        self.inner.lock().unwrap().misreported_install_id = Some(id);
        self
    }

    /// `install` answers without a `Bundle ID:` line.
    pub fn garble_install_response(self) -> Self {
        self.inner.lock().unwrap().garble_install = true;
        self
    }

    /// `connect` fails as if nothing listened on the port.
    pub fn unreachable(self) -> Self {
        self.inner.lock().unwrap().unreachable = true;
        self
    }

    /// Replaces the output (after the echo line) for one exact command.
    pub fn reply_to(&self, command: &str, body: &str) {
        self.inner
            .lock()
            .unwrap()
            .replies
            .insert(command.to_string(), body.to_string());
    }

    /// Replaces the whole response, echo line included, for one exact command.
    pub fn reply_raw(&self, command: &str, response: &str) {
        self.inner
            .lock()
            .unwrap()
            .raw_replies
            .insert(command.to_string(), response.to_string());
    }

    /// The connection breaks when `command` is sent.
    pub fn break_on(&self, command: &str) {
        self.inner.lock().unwrap().broken_on = Some(command.to_string());
    }

    pub fn commands(&self) -> Vec<String> {
        self.inner.lock().unwrap().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.inner.lock().unwrap().commands.clear();
    }

    pub fn connects(&self) -> usize {
        self.inner.lock().unwrap().connects
    }

    pub fn open_sessions(&self) -> usize {
        self.inner.lock().unwrap().open_sessions
    }

    /// Number of installed bundles named `symbolic_name`.
    pub fn count(&self, symbolic_name: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .bundles
            .iter()
            .filter(|b| b.symbolic_name == symbolic_name)
            .count()
    }

    pub fn state_of(&self, symbolic_name: &str) -> Option<BundleState> {
        self.inner
            .lock()
            .unwrap()
            .bundles
            .iter()
            .find(|b| b.symbolic_name == symbolic_name)
            .map(|b| b.state)
    }
}

impl ShellConnector for FakeFramework {
    fn connect(&self) -> Result<Box<dyn GogoShell>> {
        let mut state = self.inner.lock().unwrap();
        if state.unreachable {
            return Err(anyhow!(BladeError::ShellUnreachable {
                host: "localhost".to_string(),
                port: 11311,
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
            }));
        }
        state.connects += 1;
        state.open_sessions += 1;
        Ok(Box::new(FakeSession {
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct FakeSession {
    inner: Arc<Mutex<FrameworkState>>,
}

impl GogoShell for FakeSession {
    fn send(&mut self, command: &str) -> Result<String> {
        let mut state = self.inner.lock().unwrap();
        state.commands.push(command.to_string());
        if state.broken_on.as_deref() == Some(command) {
            return Err(anyhow!(BladeError::Protocol {
                command: command.to_string(),
                source: io::Error::new(io::ErrorKind::BrokenPipe, "connection reset by peer"),
            }));
        }
        if let Some(raw) = state.raw_replies.get(command) {
            return Ok(raw.clone());
        }
        let mut body = state.execute(command);
        if let Some(reply) = state.replies.get(command) {
            body = reply.clone();
        }
        Ok(if body.is_empty() {
            command.to_string()
        } else {
            format!("{}\n{}", command, body)
        })
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        if let Ok(mut state) = self.inner.lock() {
            state.open_sessions -= 1;
        }
    }
}

impl FrameworkState {
    fn execute(&mut self, command: &str) -> String {
        let mut words = command.split_whitespace();
        match (words.next(), words.next()) {
            (Some("lb"), _) => self.listing(),
            (Some("install"), Some(location)) => self.install(location),
            (Some("start"), Some(id)) => self.set_state(id, Some(BundleState::Active)),
            (Some("stop"), Some(id)) => self.set_state(id, Some(BundleState::Resolved)),
            (Some("update"), Some(id)) | (Some("refresh"), Some(id)) => self.set_state(id, None),
            _ => format!("gogo: CommandNotFoundException: Command not found: {}", command),
        }
    }

    fn listing(&self) -> String {
        let mut text = String::from("START LEVEL 20\n   ID|State      |Level|Symbolic name");
        for bundle in &self.bundles {
            text.push_str(&format!(
                "\n{:>5}|{:<11}|{:>5}|{}",
                bundle.id,
                bundle.state.to_string(),
                10,
                bundle.symbolic_name
            ));
        }
        text
    }

    fn install(&mut self, location: &str) -> String {
        let name = match location.strip_prefix("webbundle:") {
            Some(rest) => rest
                .split_once("Web-ContextPath=/")
                .map(|(_, context)| context.to_string()),
            None => Url::parse(location)
                .ok()
                .and_then(|url| url.to_file_path().ok())
                .and_then(|path| ArtifactDescriptor::read(&path).ok())
                .and_then(|artifact| artifact.bundle_symbolic_name),
        };
        let Some(name) = name else {
            return format!("gogo: BundleException: Cannot install {}", location);
        };

        let id = match self.bundles.iter().find(|b| b.symbolic_name == name) {
            Some(bundle) => bundle.id,
            None => {
                let id = self.next_id;
                self.next_id += 1;
                self.bundles.push(FakeBundle {
                    id,
                    symbolic_name: name,
                    state: BundleState::Installed,
                });
                id
            }
        };

        if self.garble_install {
            return "gogo: BundleException: Unexpected failure".to_string();
        }
        format!("Bundle ID: {}", self.misreported_install_id.unwrap_or(id))
    }

    fn set_state(&mut self, id: &str, state: Option<BundleState>) -> String {
        let id = id.parse::<i64>().unwrap_or(-1);
        match self.bundles.iter_mut().find(|b| b.id == id) {
            Some(bundle) => {
                if let Some(state) = state {
                    bundle.state = state;
                }
                String::new()
            }
            None => format!("gogo: IllegalArgumentException: Cannot coerce {} to Bundle", id),
        }
    }
}
