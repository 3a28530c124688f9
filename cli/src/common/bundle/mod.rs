//! # Bundle Deployment (`common::bundle`)
//!
//! File: cli/src/common/bundle/mod.rs
//!
//! ## Overview
//!
//! Deploys built artifacts to a running OSGi framework through its gogo shell.
//!
//! - **`artifact`**: reads a jar/war manifest and classifies the file.
//! - **`reconciler`**: compares an artifact with the remote bundle inventory
//!   and issues the install/update/start/stop/refresh commands that bring
//!   the remote side in line with it.
//!
//! Callers depend on the `Deployer` trait rather than on the reconciler
//! directly. The batch deploy and the watch loop are both written against
//! it, which keeps their tests free of sockets and jar files.
//!
use crate::core::error::Result;
use std::fmt;
use std::path::Path;

pub mod artifact;
pub mod reconciler;
#[cfg(test)]
pub mod testing;

pub use reconciler::BundleReconciler;

/// Deploys one built artifact, installing or updating as needed.
pub trait Deployer: Send + Sync {
    fn install_or_update(&self, path: &Path) -> Result<DeployOutcome>;
}

/// What a successful deploy did to the remote framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployOutcome {
    Installed { id: i64 },
    InstalledFragment { id: i64, host_id: i64 },
    InstalledWebBundle { id: i64 },
    Updated { id: i64 },
}

impl fmt::Display for DeployOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Installed { id } => write!(f, "Installed bundle {}", id),
            Self::InstalledFragment { id, .. } => write!(f, "Installed fragment bundle {}", id),
            Self::InstalledWebBundle { id } => write!(f, "Installed web bundle {}", id),
            Self::Updated { id } => write!(f, "Updated bundle {}", id),
        }
    }
}
