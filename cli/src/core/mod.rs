//! # Blade Core Infrastructure (`core`)
//!
//! File: cli/src/core/mod.rs
//!
//! ## Overview
//!
//! Infrastructure every command relies on:
//!
//! - **`config`**: layered TOML configuration (user file, then `.blade.toml`).
//! - **`context`**: `BladeContext`, the console/config/base-directory bundle
//!   handed to each command.
//! - **`error`**: `BladeError` and the crate-wide `Result` alias.
//!
pub mod config;
pub mod context;
pub mod error;
