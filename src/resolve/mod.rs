// src/resolve/mod.rs

//! Build target resolution
//!
//! Scans the local package tree, extracts each definition's declared
//! version (from the cached .SRCINFO when present, otherwise by asking
//! the build tool to print it), and diffs the result against the
//! published database under one of four override policies.
//!
//! The scan fans out across package directories and joins before any
//! selection happens; selection itself is a pure function of its inputs.

use crate::error::{Error, Result};
use crate::version::PkgVersion;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;
use tracing::{debug, warn};

/// Architecture token matching every host
const ARCH_ANY: &str = "any";

/// One scanned package definition
#[derive(Debug, Clone)]
pub struct LocalPackage {
    pub name: String,
    pub version: PkgVersion,
    pub path: PathBuf,
    /// Host architecture (or `any`) appears in the declared arch list
    pub arch_match: bool,
    /// Wall time of the metadata subprocess; -1.0 when .SRCINFO was cached
    pub srcinfo_secs: f64,
}

impl fmt::Display for LocalPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)?;
        if self.srcinfo_secs >= 0.0 {
            write!(f, " (spend: {:.2}s)", self.srcinfo_secs)?;
        }
        Ok(())
    }
}

/// Which local definitions get built
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverridePolicy {
    /// Exactly the named definitions, versions ignored entirely
    ExplicitOverride(Vec<String>),
    /// Every definition
    BuildAll,
    /// Only the named definitions
    ExplicitTargets(Vec<String>),
    /// Definitions missing from the database or published older than local
    Default,
}

impl OverridePolicy {
    /// Combine the CI override list, the build-all request, and explicit
    /// targets into one policy, in that precedence order.
    pub fn determine(
        override_list: &[String],
        build_all: bool,
        targets: &[String],
    ) -> Self {
        if !override_list.is_empty() {
            warn!("BUILD OVERRIDE: {}", override_list.join(";"));
            OverridePolicy::ExplicitOverride(override_list.to_vec())
        } else if build_all {
            OverridePolicy::BuildAll
        } else if !targets.is_empty() {
            OverridePolicy::ExplicitTargets(targets.to_vec())
        } else {
            OverridePolicy::Default
        }
    }
}

/// Parse .SRCINFO-shaped metadata into `(pkgbase, version, arch_match)`
///
/// `fallback_name` covers definitions that never declare `pkgbase`.
fn parse_metadata(text: &str, host_arch: &str, fallback_name: &str) -> Result<LocalMetadata> {
    let version = PkgVersion::from_script(text)?;

    let mut base: Option<String> = None;
    let mut arches: Vec<String> = Vec::new();
    for line in text.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key.trim() {
            "pkgbase" if base.is_none() => base = Some(value.trim().to_string()),
            // Covers both shapes: `arch = x86_64` lines and `arch=('any')`.
            "arch" => {
                let list = value.trim().trim_start_matches('(').trim_end_matches(')');
                for token in list.split_whitespace() {
                    arches.push(token.trim_matches(|c| c == '"' || c == '\'').to_lowercase());
                }
            }
            _ => {}
        }
    }

    let name = match base {
        Some(b) if !b.is_empty() => b,
        _ => fallback_name.to_string(),
    };
    let arch_match = arches.iter().any(|a| a == host_arch || a == ARCH_ANY);

    Ok(LocalMetadata {
        name,
        version,
        arch_match,
    })
}

struct LocalMetadata {
    name: String,
    version: PkgVersion,
    arch_match: bool,
}

/// Scan one package directory
///
/// Prefers the cached .SRCINFO; otherwise runs `makepkg --printsrcinfo`
/// in the directory and parses its stdout, timing the subprocess.
fn scan_package_dir(dir: &Path, host_arch: &str) -> Result<LocalPackage> {
    let fallback = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let srcinfo = dir.join(".SRCINFO");
    let (text, srcinfo_secs) = if srcinfo.is_file() {
        let text = fs::read_to_string(&srcinfo)
            .map_err(|e| Error::IoError(format!("failed to read {}: {e}", srcinfo.display())))?;
        (text, -1.0)
    } else {
        let start = Instant::now();
        let output = Command::new("makepkg")
            .arg("--printsrcinfo")
            .current_dir(dir)
            .output()
            .map_err(|e| Error::SpawnError {
                command: "makepkg --printsrcinfo".to_string(),
                source: e,
            })?;
        if !output.status.success() {
            warn!(
                "makepkg --printsrcinfo exited with {:?} in {}",
                output.status.code(),
                dir.display()
            );
        }
        (
            String::from_utf8_lossy(&output.stdout).into_owned(),
            start.elapsed().as_secs_f64(),
        )
    };

    let meta = parse_metadata(&text, host_arch, &fallback)?;
    Ok(LocalPackage {
        name: meta.name,
        version: meta.version,
        path: dir.to_path_buf(),
        arch_match: meta.arch_match,
        srcinfo_secs,
    })
}

/// Scan every package directory under `repo_dir` in parallel
///
/// Dotted names and plain files are skipped. A definition with broken
/// metadata loses only itself: it is logged and dropped from the result.
pub fn scan_local_packages(repo_dir: &Path, host_arch: &str) -> Result<Vec<LocalPackage>> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    let entries = fs::read_dir(repo_dir)
        .map_err(|e| Error::IoError(format!("failed to list {}: {e}", repo_dir.display())))?;
    for entry in entries {
        let entry = entry.map_err(|e| Error::IoError(e.to_string()))?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();

    let results: Vec<Result<LocalPackage>> = dirs
        .par_iter()
        .map(|dir| scan_package_dir(dir, host_arch))
        .collect();

    let mut packages = Vec::new();
    for (dir, result) in dirs.iter().zip(results) {
        match result {
            Ok(pkg) => {
                debug!("{pkg}");
                packages.push(pkg);
            }
            Err(e) => warn!("Skipping {}: {e}", dir.display()),
        }
    }
    Ok(packages)
}

/// Select the build set
///
/// Pure over its inputs; the returned targets are sorted by name. Under
/// the default policy a definition is selected iff it is absent from the
/// database, or the published version is strictly older than the local
/// one (an unparseable published version counts as stale).
pub fn resolve_targets(
    repo: &HashMap<String, String>,
    locals: Vec<LocalPackage>,
    policy: &OverridePolicy,
) -> Vec<LocalPackage> {
    let mut selected: Vec<LocalPackage> = match policy {
        OverridePolicy::ExplicitOverride(names) | OverridePolicy::ExplicitTargets(names) => {
            locals
                .into_iter()
                .filter(|pkg| names.iter().any(|n| n == &pkg.name))
                .collect()
        }
        OverridePolicy::BuildAll => locals,
        OverridePolicy::Default => locals
            .into_iter()
            .filter(|pkg| match repo.get(&pkg.name) {
                None => true,
                Some(published) => match PkgVersion::parse(published) {
                    Ok(published) => published < pkg.version,
                    Err(e) => {
                        warn!(
                            "Published version '{published}' of {} unreadable ({e}), rebuilding",
                            pkg.name
                        );
                        true
                    }
                },
            })
            .collect(),
    };

    selected.sort_by(|a, b| a.name.cmp(&b.name));
    selected
}
