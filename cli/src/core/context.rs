//! # Blade Invocation Context
//!
//! File: cli/src/core/context.rs
//!
//! Everything a command needs from its surroundings, passed explicitly into
//! each component: the console to print through, the loaded configuration,
//! and the project base directory.
//!
use crate::common::ui::Console;
use crate::core::config::Config;
use crate::core::error::Result;
use std::path::PathBuf;

#[derive(Clone)]
pub struct BladeContext {
    pub console: Console,
    pub config: Config,
    pub base_dir: PathBuf,
}

impl BladeContext {
    pub fn new(console: Console, config: Config) -> Result<Self> {
        let base_dir = config.base_dir()?;
        Ok(Self {
            console,
            config,
            base_dir,
        })
    }
}
