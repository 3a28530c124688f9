//! # Built Artifact Classification (`common::bundle::artifact`)
//!
//! File: cli/src/common/bundle/artifact.rs
//!
//! ## Overview
//!
//! Reads the OSGi headers out of a built jar/war's `META-INF/MANIFEST.MF`
//! and classifies the file as exactly one of:
//!
//! - **Bundle**: has a `Bundle-SymbolicName` and no `Fragment-Host`.
//! - **Fragment**: has both; the host's symbolic name is kept.
//! - **WebBundle**: a `.war` without a `Bundle-SymbolicName`; installed
//!   through the `webbundle:` URL handler.
//! - **Unrecognized**: anything else. Cannot be deployed.
//!
//! Header values are cut at the first `;` so directives such as
//! `singleton:=true` or `bundle-version="[1.0,2.0)"` do not leak into names.
//!
use crate::core::error::{BladeError, Result};
use anyhow::{anyhow, Context};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use url::Url;

const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// How a built file will be reconciled against the remote framework.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactKind {
    Bundle,
    Fragment { host: String },
    WebBundle,
    Unrecognized,
}

/// OSGi identity of one built jar/war.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDescriptor {
    pub path: PathBuf,
    pub bundle_symbolic_name: Option<String>,
    pub fragment_host_symbolic_name: Option<String>,
}

impl ArtifactDescriptor {
    /// Reads the manifest of the archive at `path`.
    ///
    /// An archive without a manifest yields a descriptor with no headers.
    ///
    /// # Errors
    ///
    /// Fails if the file is missing or is not a readable zip archive.
    pub fn read(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(anyhow!(BladeError::FileSystem(format!(
                "Artifact not found: {}",
                path.display()
            ))));
        }
        let headers = match read_manifest(path)? {
            Some(text) => parse_manifest(&text),
            None => HashMap::new(),
        };
        Ok(Self {
            path: path.to_path_buf(),
            bundle_symbolic_name: header_name(&headers, "Bundle-SymbolicName"),
            fragment_host_symbolic_name: header_name(&headers, "Fragment-Host"),
        })
    }

    pub fn kind(&self) -> ArtifactKind {
        match (&self.bundle_symbolic_name, &self.fragment_host_symbolic_name) {
            (Some(_), Some(host)) => ArtifactKind::Fragment { host: host.clone() },
            (Some(_), None) => ArtifactKind::Bundle,
            (None, _) if has_extension(&self.path, "war") => ArtifactKind::WebBundle,
            (None, _) => ArtifactKind::Unrecognized,
        }
    }

    /// `file:` URI of the artifact, as handed to `install`/`update`.
    pub fn uri(&self) -> Result<String> {
        let absolute = fs::canonicalize(&self.path)
            .with_context(|| format!("Failed to resolve {}", self.path.display()))?;
        Url::from_file_path(&absolute)
            .map(|url| url.to_string())
            .map_err(|_| {
                anyhow!(BladeError::FileSystem(format!(
                    "Cannot express {} as a file URI",
                    absolute.display()
                )))
            })
    }

    /// `webbundle:` install location: context path is the file stem.
    pub fn web_bundle_uri(&self) -> Result<String> {
        let context = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(format!(
            "webbundle:{}?Web-ContextPath=/{}",
            self.uri()?,
            context
        ))
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .map_or(false, |e| e.to_string_lossy().eq_ignore_ascii_case(ext))
}

fn read_manifest(path: &Path) -> Result<Option<String>> {
    let manifest_error = |reason: String| {
        anyhow!(BladeError::Manifest {
            path: path.to_path_buf(),
            reason,
        })
    };
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| manifest_error(e.to_string()))?;
    let mut entry = match archive.by_name(MANIFEST_PATH) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(manifest_error(e.to_string())),
    };
    let mut text = String::new();
    entry
        .read_to_string(&mut text)
        .map_err(|e| manifest_error(e.to_string()))?;
    Ok(Some(text))
}

/// Main-section headers of a manifest, with continuation lines joined.
fn parse_manifest(text: &str) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    let mut current: Option<(String, String)> = None;
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(rest) = line.strip_prefix(' ') {
            if let Some((_, value)) = current.as_mut() {
                value.push_str(rest);
            }
            continue;
        }
        if let Some((name, value)) = current.take() {
            headers.insert(name, value);
        }
        if line.is_empty() {
            // End of the main section.
            if !headers.is_empty() {
                break;
            }
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            current = Some((name.trim().to_string(), value.trim_start().to_string()));
        }
    }
    if let Some((name, value)) = current {
        headers.insert(name, value);
    }
    headers
}

fn header_name(headers: &HashMap<String, String>, header: &str) -> Option<String> {
    headers
        .get(header)
        .map(|value| value.split(';').next().unwrap_or_default().trim().to_string())
        .filter(|name| !name.is_empty())
}
