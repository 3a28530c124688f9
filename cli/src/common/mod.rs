//! # Blade Common Utilities (`common`)
//!
//! File: cli/src/common/mod.rs
//!
//! ## Overview
//!
//! Shared building blocks used by the command handlers in `commands::`.
//!
//! - **`build`**: Gradle and Maven runners behind the `BuildRunner` trait.
//! - **`bundle`**: artifact classification and the install/update reconciler.
//! - **`gogo`**: the gogo shell client and the bundle inventory parser.
//! - **`network`**: the pre-flight reachability probe.
//! - **`process`**: running build tools, captured or streamed.
//! - **`ui`**: the `Console` all user-facing output goes through.
//! - **`watch`**: the file watch loop behind `deploy --watch`.
//!

/// Build tool runners (Gradle, Maven) and build output discovery.
pub mod build;
/// Deploying jar/war artifacts as OSGi bundles.
pub mod bundle;
/// Gogo shell protocol client and `lb` listing parser.
pub mod gogo;
/// TCP reachability probe.
pub mod network;
/// External process execution.
pub mod process;
/// Console output shared across threads.
pub mod ui;
/// File system change notification.
pub mod watch;
