//! # Bundle Inventory (`common::gogo::inventory`)
//!
//! File: cli/src/common/gogo/inventory.rs
//!
//! ## Overview
//!
//! Reads the remote framework's installed bundles with `lb -s -u` and turns
//! the tabular text into `BundleRecord`s. The remote framework is the only
//! source of truth: records are parsed fresh for every query and never cached.
//!
//! A typical response, as returned by `GogoShell::send`:
//!
//! ```text
//! lb -s -u
//! START LEVEL 20
//!    ID|State      |Level|Symbolic name
//!     0|Active     |    0|org.eclipse.osgi
//!    27|Resolved   |   10|com.liferay.foo.web
//! ```
//!
//! The first three lines (echo, start level, column header) are skipped.
//! Each remaining non-blank line is split on `|`: field 0 is the id, field 1
//! the state, field 3 the symbolic name. The symbolic name is taken verbatim.
//!
use crate::common::gogo::GogoShell;
use crate::core::error::Result;
use anyhow::Context;
use std::fmt;
use tracing::{debug, trace};

/// The list-bundles command: state and symbolic name columns.
pub const LIST_BUNDLES_COMMAND: &str = "lb -s -u";

/// Lines before the first data row of a listing.
const HEADER_LINES: usize = 3;

/// Returned by `find_bundle_id` when no bundle matches.
pub const NO_BUNDLE: i64 = -1;

/// Lifecycle state of a bundle in the remote framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleState {
    Installed,
    Resolved,
    Starting,
    Active,
    Stopping,
    Uninstalled,
    Unknown,
}

impl BundleState {
    /// Case-insensitive match of a listing's state column.
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword.trim().to_ascii_lowercase().as_str() {
            "installed" => Self::Installed,
            "resolved" => Self::Resolved,
            "starting" => Self::Starting,
            "active" => Self::Active,
            "stopping" => Self::Stopping,
            "uninstalled" => Self::Uninstalled,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for BundleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Installed => "INSTALLED",
            Self::Resolved => "RESOLVED",
            Self::Starting => "STARTING",
            Self::Active => "ACTIVE",
            Self::Stopping => "STOPPING",
            Self::Uninstalled => "UNINSTALLED",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// One row of the remote bundle listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleRecord {
    pub id: i64,
    pub state: BundleState,
    pub symbolic_name: String,
}

/// Queries the remote framework for its installed bundles, in listing order.
pub fn list_bundles(shell: &mut dyn GogoShell) -> Result<Vec<BundleRecord>> {
    let response = shell
        .send(LIST_BUNDLES_COMMAND)
        .context("Failed to list installed bundles")?;
    let records = parse_bundle_listing(&response);
    debug!("Remote framework lists {} bundles", records.len());
    for record in &records {
        trace!("{:>5} {:<11} {}", record.id, record.state.to_string(), record.symbolic_name);
    }
    Ok(records)
}

/// Parses an `lb -s -u` response. Malformed rows are logged and skipped.
pub fn parse_bundle_listing(response: &str) -> Vec<BundleRecord> {
    response
        .lines()
        .skip(HEADER_LINES)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match parse_bundle_line(line) {
            Some(record) => Some(record),
            None => {
                debug!("Skipping malformed bundle listing line: {:?}", line);
                None
            }
        })
        .collect()
}

fn parse_bundle_line(line: &str) -> Option<BundleRecord> {
    let fields: Vec<&str> = line.split('|').collect();
    if fields.len() < 4 {
        return None;
    }
    let id = fields[0].trim().parse::<i64>().ok().filter(|id| *id >= 0)?;
    Some(BundleRecord {
        id,
        state: BundleState::from_keyword(fields[1]),
        symbolic_name: fields[3].to_string(),
    })
}

/// Id of the bundle whose symbolic name equals `symbolic_name` exactly,
/// or `NO_BUNDLE`. An absent name never matches.
pub fn find_bundle_id(records: &[BundleRecord], symbolic_name: Option<&str>) -> i64 {
    let Some(name) = symbolic_name else {
        return NO_BUNDLE;
    };
    records
        .iter()
        .find(|record| record.symbolic_name == name)
        .map_or(NO_BUNDLE, |record| record.id)
}
