//! # Blade Commands
//!
//! File: cli/src/commands/mod.rs
//!
//! ## Overview
//!
//! One module per top-level `blade` command. Each exposes a clap `Args`
//! struct and an async `handle_*` function; `main.rs` maps the `Commands`
//! enum onto them.
//!

/// `blade deploy [--watch]`: build and deploy bundles, optionally keep redeploying.
pub mod deploy;
/// `blade sh <command...>`: run one gogo shell command.
pub mod sh;
