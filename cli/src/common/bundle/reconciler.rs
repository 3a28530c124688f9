//! # Bundle Reconciler (`common::bundle::reconciler`)
//!
//! File: cli/src/common/bundle/reconciler.rs
//!
//! ## Overview
//!
//! `BundleReconciler::install_or_update` decides, for one built artifact,
//! which gogo shell commands bring the remote framework in line with it,
//! and issues them strictly one after another on a connection it opens for
//! this call alone.
//!
//! ## Decision Procedure
//!
//! 1. Web bundle (`.war` without OSGi headers): `install webbundle:...`,
//!    then `start <id>`. An id `<= 0` is fatal.
//! 2. Otherwise list the installed bundles and resolve
//!    `existing` (same symbolic name) and `host` (fragment host, if any).
//! 3. Then:
//!
//! | existing | fragment with host | commands                                   |
//! |----------|--------------------|--------------------------------------------|
//! | `> 0`    | yes                | `update existing uri`, `refresh host`       |
//! | `> 0`    | no                 | `stop existing`, `update existing uri`, `start existing` |
//! | `<= 0`   | yes                | `install uri`, `refresh host`               |
//! | `<= 0`   | no                 | `install uri`, re-list, compare ids, `start id` |
//!
//! Fragments are never started themselves; refreshing the host attaches them.
//!
//! Only the `install` response is parsed (`Bundle ID: <n>`). Other
//! responses are optionally sanity-checked against the command they answer
//! and their text is passed on to the console.
//!
use crate::common::bundle::artifact::{ArtifactDescriptor, ArtifactKind};
use crate::common::bundle::{Deployer, DeployOutcome};
use crate::common::gogo::inventory::{self, NO_BUNDLE};
use crate::common::gogo::{verify_response, GogoShell, ShellConnector};
use crate::common::ui::Console;
use crate::core::error::{BladeError, Result};
use anyhow::{anyhow, Context};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, info};

static INSTALL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s).*Bundle ID:\s*(-?\d+)").expect("valid install id pattern"));

/// Reconciles built artifacts against the bundles installed in a remote
/// framework reached through `C`.
pub struct BundleReconciler<C: ShellConnector> {
    connector: C,
    console: Console,
    verify_responses: bool,
}

impl<C: ShellConnector> BundleReconciler<C> {
    pub fn new(connector: C, console: Console, verify_responses: bool) -> Self {
        Self {
            connector,
            console,
            verify_responses,
        }
    }

    fn deploy(&self, artifact: &ArtifactDescriptor) -> Result<DeployOutcome> {
        let kind = artifact.kind();
        if kind == ArtifactKind::Unrecognized {
            return Err(anyhow!(BladeError::NotABundle {
                path: artifact.path.clone(),
            }));
        }

        // Dropped on every exit path below, which closes the connection.
        let mut shell = self.connector.connect()?;
        match kind {
            ArtifactKind::WebBundle => self.install_web_bundle(shell.as_mut(), artifact),
            _ => self.reconcile_bundle(shell.as_mut(), artifact, &kind),
        }
    }

    fn install_web_bundle(
        &self,
        shell: &mut dyn GogoShell,
        artifact: &ArtifactDescriptor,
    ) -> Result<DeployOutcome> {
        let response = self.run(shell, &format!("install {}", artifact.web_bundle_uri()?))?;
        let id = parse_install_response(&response)?;
        if id <= 0 {
            return Err(anyhow!(BladeError::WebBundleInstall {
                path: artifact.path.clone(),
            }));
        }
        self.run(shell, &format!("start {}", id))?;
        Ok(DeployOutcome::InstalledWebBundle { id })
    }

    fn reconcile_bundle(
        &self,
        shell: &mut dyn GogoShell,
        artifact: &ArtifactDescriptor,
        kind: &ArtifactKind,
    ) -> Result<DeployOutcome> {
        let symbolic_name = artifact.bundle_symbolic_name.as_deref();
        let bundles = inventory::list_bundles(shell)?;
        let existing_id = inventory::find_bundle_id(&bundles, symbolic_name);
        let host_id = match kind {
            ArtifactKind::Fragment { host } => inventory::find_bundle_id(&bundles, Some(host)),
            _ => NO_BUNDLE,
        };
        let attach_to_host = host_id > 0;
        debug!(
            "Reconciling {:?}: existing id {}, host id {}",
            symbolic_name, existing_id, host_id
        );

        let uri = artifact.uri()?;

        if existing_id > 0 {
            if attach_to_host {
                self.run(shell, &format!("update {} {}", existing_id, uri))?;
                self.run(shell, &format!("refresh {}", host_id))?;
            } else {
                self.run(shell, &format!("stop {}", existing_id))?;
                self.run(shell, &format!("update {} {}", existing_id, uri))?;
                self.run(shell, &format!("start {}", existing_id))?;
            }
            return Ok(DeployOutcome::Updated { id: existing_id });
        }

        let response = self.run(shell, &format!("install {}", uri))?;
        let installed_id = parse_install_response(&response)?;

        if attach_to_host {
            self.run(shell, &format!("refresh {}", host_id))?;
            return Ok(DeployOutcome::InstalledFragment {
                id: installed_id,
                host_id,
            });
        }

        let bundles = inventory::list_bundles(shell)?;
        let resolved_id = inventory::find_bundle_id(&bundles, symbolic_name);
        if resolved_id != installed_id {
            return Err(anyhow!(BladeError::BundleIdMismatch {
                installed: installed_id,
                resolved: resolved_id,
            }));
        }
        if resolved_id <= 1 {
            return Err(anyhow!(BladeError::StartFailed { id: resolved_id }));
        }
        self.run(shell, &format!("start {}", resolved_id))?;
        Ok(DeployOutcome::Installed { id: resolved_id })
    }

    /// Sends one command and passes any output beyond the echo to the console.
    fn run(&self, shell: &mut dyn GogoShell, command: &str) -> Result<String> {
        let response = shell.send(command)?;
        if self.verify_responses {
            verify_response(command, &response)?;
        }
        let body: Vec<&str> = response
            .lines()
            .skip(1)
            .filter(|l| !l.trim().is_empty())
            .collect();
        if !body.is_empty() && !command.starts_with("install ") {
            self.console.println(body.join("\n"));
        }
        Ok(response)
    }
}

impl<C: ShellConnector> Deployer for BundleReconciler<C> {
    fn install_or_update(&self, path: &Path) -> Result<DeployOutcome> {
        info!("Deploying {}", path.display());
        let artifact = ArtifactDescriptor::read(path)?;
        let outcome = self
            .deploy(&artifact)
            .with_context(|| format!("Failed to deploy {}", path.display()))?;
        info!("{} ({})", outcome, path.display());
        Ok(outcome)
    }
}

/// Extracts the id from an `install` response (`... Bundle ID: 42 ...`).
///
/// # Errors
///
/// `BladeError::InstallResponse` carrying the full response if no id is found.
pub fn parse_install_response(response: &str) -> Result<i64> {
    INSTALL_ID
        .captures(response)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok())
        .ok_or_else(|| {
            anyhow!(BladeError::InstallResponse {
                response: response.to_string(),
            })
        })
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::bundle::artifact::testing::*;
    use crate::common::bundle::testing::FakeFramework;
    use crate::common::gogo::inventory::BundleState;
    use crate::common::ui::capture_console;
    use std::path::PathBuf;
    use tempfile::{tempdir, TempDir};

    fn reconciler(framework: &FakeFramework) -> BundleReconciler<FakeFramework> {
        let (console, _, _) = capture_console();
        BundleReconciler::new(framework.clone(), console, true)
    }

    fn jar(dir: &TempDir, file: &str, manifest: &str) -> PathBuf {
        let path = dir.path().join(file);
        write_archive(&path, Some(manifest));
        path
    }

    fn uri_of(path: &Path) -> String {
        ArtifactDescriptor::read(path).unwrap().uri().unwrap()
    }

    #[test]
    fn test_parse_install_response() {
        assert_eq!(
            parse_install_response("install file:/tmp/a.jar\nBundle ID: 42\n").unwrap(),
            42
        );
        assert_eq!(
            parse_install_response("install x\nsome\nlines\nBundle ID: 42").unwrap(),
            42
        );
    }

    #[test]
    fn test_parse_install_response_without_id_is_diagnosable() {
        let response = "install file:/tmp/a.jar\ngogo: BundleException: Could not resolve module";
        let err = parse_install_response(response).unwrap_err();
        match err.downcast_ref::<BladeError>() {
            Some(BladeError::InstallResponse { response: r }) => assert_eq!(r, response),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_fresh_install_then_update() {
        let dir = tempdir().unwrap();
        let framework = FakeFramework::new(7);
        let deployer = reconciler(&framework);
        let path = jar(&dir, "foo.jar", &bundle_manifest("foo"));
        let uri = uri_of(&path);

        let first = deployer.install_or_update(&path).unwrap();
        assert_eq!(first, DeployOutcome::Installed { id: 7 });
        assert_eq!(first.to_string(), "Installed bundle 7");
        assert_eq!(
            framework.commands(),
            vec![
                "lb -s -u".to_string(),
                format!("install {}", uri),
                "lb -s -u".to_string(),
                "start 7".to_string(),
            ]
        );

        framework.clear_commands();
        let second = deployer.install_or_update(&path).unwrap();
        assert_eq!(second, DeployOutcome::Updated { id: 7 });
        assert_eq!(second.to_string(), "Updated bundle 7");
        assert_eq!(
            framework.commands(),
            vec![
                "lb -s -u".to_string(),
                "stop 7".to_string(),
                format!("update 7 {}", uri),
                "start 7".to_string(),
            ]
        );

        assert_eq!(framework.count("foo"), 1);
        assert_eq!(framework.state_of("foo"), Some(BundleState::Active));
    }

    #[test]
    fn test_fragment_install_refreshes_host_and_never_starts() {
        let dir = tempdir().unwrap();
        let framework = FakeFramework::new(20).with_bundle(12, "com.example.host", BundleState::Active);
        let deployer = reconciler(&framework);
        let path = jar(
            &dir,
            "frag.jar",
            &fragment_manifest("com.example.frag", "com.example.host"),
        );
        let uri = uri_of(&path);

        let outcome = deployer.install_or_update(&path).unwrap();
        assert_eq!(outcome, DeployOutcome::InstalledFragment { id: 20, host_id: 12 });
        assert_eq!(outcome.to_string(), "Installed fragment bundle 20");
        assert_eq!(
            framework.commands(),
            vec![
                "lb -s -u".to_string(),
                format!("install {}", uri),
                "refresh 12".to_string(),
            ]
        );
        assert!(!framework.commands().iter().any(|c| c.starts_with("start")));

        framework.clear_commands();
        let outcome = deployer.install_or_update(&path).unwrap();
        assert_eq!(outcome, DeployOutcome::Updated { id: 20 });
        assert_eq!(
            framework.commands(),
            vec![
                "lb -s -u".to_string(),
                format!("update 20 {}", uri),
                "refresh 12".to_string(),
            ]
        );
    }

    #[test]
    fn test_fragment_without_installed_host_is_treated_as_plain_bundle() {
        let dir = tempdir().unwrap();
        let framework = FakeFramework::new(9).with_bundle(9, "com.example.frag", BundleState::Resolved);
        let deployer = reconciler(&framework);
        let path = jar(
            &dir,
            "frag.jar",
            &fragment_manifest("com.example.frag", "com.example.missing.host"),
        );

        let outcome = deployer.install_or_update(&path).unwrap();
        assert_eq!(outcome, DeployOutcome::Updated { id: 9 });
        let commands = framework.commands();
        assert_eq!(commands[1], "stop 9");
        assert!(commands[2].starts_with("update 9 "));
        assert_eq!(commands[3], "start 9");
    }

    #[test]
    fn test_web_bundle_install_and_start() {
        let dir = tempdir().unwrap();
        let framework = FakeFramework::new(31);
        let deployer = reconciler(&framework);
        let path = dir.path().join("my-theme.war");
        write_archive(&path, Some("Manifest-Version: 1.0\r\n\r\n"));

        let outcome = deployer.install_or_update(&path).unwrap();
        assert_eq!(outcome, DeployOutcome::InstalledWebBundle { id: 31 });
        let commands = framework.commands();
        assert_eq!(commands.len(), 2);
        assert!(commands[0].starts_with("install webbundle:file:///"));
        assert!(commands[0].ends_with("?Web-ContextPath=/my-theme"));
        assert_eq!(commands[1], "start 31");
    }

    #[test]
    fn test_web_bundle_without_valid_id_is_not_started() {
        let dir = tempdir().unwrap();
        let framework = FakeFramework::new(0);
        let deployer = reconciler(&framework);
        let path = dir.path().join("my-theme.war");
        write_archive(&path, Some("Manifest-Version: 1.0\r\n\r\n"));

        let err = deployer.install_or_update(&path).unwrap_err();
        match err.downcast_ref::<BladeError>() {
            Some(BladeError::WebBundleInstall { path: p }) => assert_eq!(p, &path),
            other => panic!("unexpected error: {:?}", other),
        }
        let commands = framework.commands();
        assert_eq!(commands.len(), 1);
        assert!(commands[0].starts_with("install webbundle:"));
        assert_eq!(framework.open_sessions(), 0);
    }

    #[test]
    fn test_mismatched_response_fails_artifact_when_verifying() {
        let dir = tempdir().unwrap();
        let framework = FakeFramework::new(7).with_bundle(7, "foo", BundleState::Active);
        let deployer = reconciler(&framework);
        let path = jar(&dir, "foo.jar", &bundle_manifest("foo"));
        framework.reply_raw("stop 7", "gogo: CommandNotFoundException: Command not found: stop7");

        let err = deployer.install_or_update(&path).unwrap_err();
        match err.downcast_ref::<BladeError>() {
            Some(BladeError::ResponseMismatch { command, .. }) => assert_eq!(command, "stop 7"),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(framework.commands(), vec!["lb -s -u", "stop 7"]);
        assert_eq!(framework.open_sessions(), 0);
    }

    #[test]
    fn test_mismatched_response_tolerated_without_verification() {
        let dir = tempdir().unwrap();
        let framework = FakeFramework::new(7).with_bundle(7, "foo", BundleState::Active);
        let (console, _, _) = capture_console();
        let deployer = BundleReconciler::new(framework.clone(), console, false);
        let path = jar(&dir, "foo.jar", &bundle_manifest("foo"));
        framework.reply_raw("stop 7", "gogo: CommandNotFoundException: Command not found: stop7");

        assert_eq!(
            deployer.install_or_update(&path).unwrap(),
            DeployOutcome::Updated { id: 7 }
        );
        assert_eq!(framework.commands().len(), 4);
    }

    #[test]
    fn test_broken_connection_fails_artifact_and_closes_session() {
        let dir = tempdir().unwrap();
        let framework = FakeFramework::new(7);
        let deployer = reconciler(&framework);
        let first = jar(&dir, "foo.jar", &bundle_manifest("foo"));
        let second = jar(&dir, "bar.jar", &bundle_manifest("bar"));
        framework.break_on(&format!("install {}", uri_of(&first)));

        let err = deployer.install_or_update(&first).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BladeError>(),
            Some(BladeError::Protocol { .. })
        ));
        assert!(err.to_string().contains("foo.jar"));
        assert_eq!(framework.open_sessions(), 0);
        assert_eq!(framework.count("foo"), 0);

        // The next artifact gets a fresh session.
        assert_eq!(
            deployer.install_or_update(&second).unwrap(),
            DeployOutcome::Installed { id: 7 }
        );
        assert_eq!(framework.connects(), 2);
    }

    #[test]
    fn test_id_mismatch_does_not_start() {
        let dir = tempdir().unwrap();
        let framework = FakeFramework::new(7).misreport_install_id(99);
        let deployer = reconciler(&framework);
        let path = jar(&dir, "foo.jar", &bundle_manifest("foo"));

        let err = deployer.install_or_update(&path).unwrap_err();
        match err.downcast_ref::<BladeError>() {
            Some(BladeError::BundleIdMismatch { installed, resolved }) => {
                assert_eq!(*installed, 99);
                assert_eq!(*resolved, 7);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.to_string().contains("foo.jar"));
        assert!(!framework.commands().iter().any(|c| c.starts_with("start")));
    }

    #[test]
    fn test_low_bundle_id_reports_start_failure() {
        let dir = tempdir().unwrap();
        let framework = FakeFramework::new(1);
        let deployer = reconciler(&framework);
        let path = jar(&dir, "foo.jar", &bundle_manifest("foo"));

        let err = deployer.install_or_update(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BladeError>(),
            Some(BladeError::StartFailed { id: 1 })
        ));
    }

    #[test]
    fn test_unparseable_install_response_is_fatal_for_artifact() {
        let dir = tempdir().unwrap();
        let framework = FakeFramework::new(7).garble_install_response();
        let deployer = reconciler(&framework);
        let path = jar(&dir, "foo.jar", &bundle_manifest("foo"));

        let err = deployer.install_or_update(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BladeError>(),
            Some(BladeError::InstallResponse { .. })
        ));
        assert_eq!(framework.commands().len(), 2);
    }

    #[test]
    fn test_unrecognized_artifact_sends_nothing() {
        let dir = tempdir().unwrap();
        let framework = FakeFramework::new(7);
        let deployer = reconciler(&framework);
        let path = dir.path().join("lib.jar");
        write_archive(&path, None);

        let err = deployer.install_or_update(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BladeError>(),
            Some(BladeError::NotABundle { .. })
        ));
        assert_eq!(framework.connects(), 0);
    }

    #[test]
    fn test_connection_is_closed_on_every_path() {
        let dir = tempdir().unwrap();
        let framework = FakeFramework::new(7).misreport_install_id(99);
        let deployer = reconciler(&framework);
        let path = jar(&dir, "foo.jar", &bundle_manifest("foo"));

        assert!(deployer.install_or_update(&path).is_err());
        assert_eq!(framework.connects(), 1);
        assert_eq!(framework.open_sessions(), 0);
    }

    #[test]
    fn test_command_output_reaches_console() {
        let dir = tempdir().unwrap();
        let framework = FakeFramework::new(7).with_bundle(7, "foo", BundleState::Active);
        let (console, out, _) = capture_console();
        let deployer = BundleReconciler::new(framework.clone(), console, true);
        let path = jar(&dir, "foo.jar", &bundle_manifest("foo"));
        framework.reply_to("start 7", "gogo: BundleException: Could not resolve module: foo");

        let outcome = deployer.install_or_update(&path).unwrap();
        assert_eq!(outcome, DeployOutcome::Updated { id: 7 });
        assert!(out.contents().contains("Could not resolve module: foo"));
    }
}
