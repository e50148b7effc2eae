// src/probe/mod.rs

//! Remote availability probing for build-time dependencies
//!
//! Before a run, dependencies declared in a PKGBUILD are classified by
//! whether the AUR carries them: those names end up in the hidden
//! per-target dependency list that the build executor later consults.
//! Probing is a bounded fan-out: every name is submitted at once, but a
//! fixed-size worker pool caps how many existence checks are in flight.
//!
//! A single check that keeps failing is retried with jittered backoff and
//! eventually reported as exhausted for that name alone; sibling probes
//! are never affected.

use crate::error::{Error, Result};
use rand::Rng;
use rayon::prelude::*;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default AUR endpoint serving per-package PKGBUILDs
pub const AUR_PKGBUILD_URL: &str = "https://aur.archlinux.org/cgit/aur.git/plain/PKGBUILD";

/// Per-request timeout for existence checks (10 seconds)
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Failure of a single probe attempt
#[derive(Debug)]
pub enum ProbeError {
    Timeout,
    Transport(String),
}

impl std::fmt::Display for ProbeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeError::Timeout => write!(f, "request timed out"),
            ProbeError::Transport(msg) => write!(f, "{msg}"),
        }
    }
}

/// Existence check against a remote package source
///
/// The production implementation is [`AurProbe`]; tests substitute doubles
/// with scripted responses.
pub trait ExistenceProbe: Sync {
    /// Returns whether the named package exists upstream. A non-success
    /// HTTP status is `Ok(false)`, not an error.
    fn check(&self, name: &str) -> std::result::Result<bool, ProbeError>;
}

/// AUR existence probe: a lightweight HEAD against the cgit PKGBUILD URL
pub struct AurProbe {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl AurProbe {
    pub fn new() -> Result<Self> {
        Self::with_base_url(AUR_PKGBUILD_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .map_err(|e| Error::HttpError(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }
}

impl ExistenceProbe for AurProbe {
    fn check(&self, name: &str) -> std::result::Result<bool, ProbeError> {
        let url = format!("{}?h={}", self.base_url, name);
        match self.client.head(&url).send() {
            Ok(response) => Ok(response.status().as_u16() == 200),
            Err(e) if e.is_timeout() => Err(ProbeError::Timeout),
            Err(e) => Err(ProbeError::Transport(e.to_string())),
        }
    }
}

/// Fetch of a package's upstream build script
///
/// Used by the update checker; `None` means the package is not registered
/// upstream at all.
pub trait ScriptSource: Sync {
    fn fetch_script(&self, name: &str) -> std::result::Result<Option<String>, ProbeError>;
}

impl ScriptSource for AurProbe {
    fn fetch_script(&self, name: &str) -> std::result::Result<Option<String>, ProbeError> {
        let url = format!("{}?h={}", self.base_url, name);
        match self.client.get(&url).send() {
            Ok(response) if response.status().as_u16() == 200 => response
                .text()
                .map(Some)
                .map_err(|e| ProbeError::Transport(e.to_string())),
            Ok(_) => Ok(None),
            Err(e) if e.is_timeout() => Err(ProbeError::Timeout),
            Err(e) => Err(ProbeError::Transport(e.to_string())),
        }
    }
}

/// Probe batch parameters
#[derive(Debug, Clone)]
pub struct ProberConfig {
    /// Maximum in-flight existence checks
    pub concurrency: usize,
    /// Attempts per name before giving up
    pub max_attempts: u32,
    /// Upper bound of the jittered sleep between attempts
    pub backoff_base: Duration,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            concurrency: 32,
            max_attempts: 5,
            backoff_base: Duration::from_secs(1),
        }
    }
}

/// Classification of one dependency name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Upstream serves this package
    Available,
    /// Upstream answered, package unknown
    Unavailable,
    /// Retry budget spent without an answer; treated as unavailable
    Exhausted,
}

impl ProbeOutcome {
    pub fn is_available(&self) -> bool {
        matches!(self, ProbeOutcome::Available)
    }
}

/// Probe a batch of names with bounded concurrency
///
/// Every name is submitted immediately; a dedicated pool of
/// `config.concurrency` workers gates admission. The returned mapping is
/// keyed, so completion order does not matter.
pub fn probe_all(
    probe: &dyn ExistenceProbe,
    names: &[String],
    config: &ProberConfig,
) -> Result<BTreeMap<String, ProbeOutcome>> {
    if names.is_empty() {
        return Ok(BTreeMap::new());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.concurrency.max(1))
        .build()
        .map_err(|e| Error::IoError(format!("failed to create probe pool: {e}")))?;

    let outcomes = pool.install(|| {
        names
            .par_iter()
            .map(|name| {
                let outcome = match probe_one(probe, name, config) {
                    Ok(true) => ProbeOutcome::Available,
                    Ok(false) => ProbeOutcome::Unavailable,
                    Err(e) => {
                        warn!("{e}; treating '{name}' as unavailable");
                        ProbeOutcome::Exhausted
                    }
                };
                (name.clone(), outcome)
            })
            .collect()
    });

    Ok(outcomes)
}

/// Check one name with bounded retry and jittered backoff
fn probe_one(
    probe: &dyn ExistenceProbe,
    name: &str,
    config: &ProberConfig,
) -> Result<bool> {
    let attempts = config.max_attempts.max(1);
    for attempt in 1..=attempts {
        debug!("Checking {} (attempt {}/{})", name, attempt, attempts);
        match probe.check(name) {
            Ok(found) => return Ok(found),
            Err(e) => {
                warn!("Probe attempt {} for '{}' failed: {}", attempt, name, e);
                if attempt < attempts && !config.backoff_base.is_zero() {
                    let jitter = config.backoff_base.mul_f64(rand::thread_rng().gen_range(0.0..1.0));
                    std::thread::sleep(jitter);
                }
            }
        }
    }
    Err(Error::ProbeExhausted {
        name: name.to_string(),
        attempts,
    })
}

/// Classify a package's declared dependencies and write the hidden
/// dependency list next to the package directory
///
/// Reads `depends` and `makedepends` arrays from the PKGBUILD, probes each
/// name, and writes the upstream-available ones (original declaration
/// order, one per line) to `<parent>/.yaydeps/<dir name>`. Returns the
/// written list; an empty list means no file was written.
pub fn classify_dependencies(
    pkg_dir: &Path,
    probe: &dyn ExistenceProbe,
    config: &ProberConfig,
) -> Result<Vec<String>> {
    let pkgbuild = pkg_dir.join("PKGBUILD");
    if !pkgbuild.is_file() {
        return Err(Error::NotFoundError(format!(
            "no PKGBUILD in {}",
            pkg_dir.display()
        )));
    }
    let content = fs::read_to_string(&pkgbuild)
        .map_err(|e| Error::IoError(format!("failed to read {}: {e}", pkgbuild.display())))?;

    let mut names: Vec<String> = Vec::new();
    for key in ["depends", "makedepends"] {
        match extract_array(&content, key) {
            Some(values) => {
                for value in values {
                    if !names.contains(&value) {
                        names.push(value);
                    }
                }
            }
            None => warn!("'{key}' array not found in {}", pkgbuild.display()),
        }
    }
    if names.is_empty() {
        return Ok(Vec::new());
    }

    let outcomes = probe_all(probe, &names, config)?;

    // Declaration order, not completion order.
    let available: Vec<String> = names
        .into_iter()
        .filter(|n| outcomes.get(n).is_some_and(|o| o.is_available()))
        .collect();

    if available.is_empty() {
        info!("No upstream dependencies for {}", pkg_dir.display());
        return Ok(Vec::new());
    }

    let target_name = pkg_dir
        .file_name()
        .ok_or_else(|| Error::IoError(format!("bad package directory: {}", pkg_dir.display())))?;
    let deps_dir = pkg_dir.parent().unwrap_or(Path::new(".")).join(".yaydeps");
    fs::create_dir_all(&deps_dir)
        .map_err(|e| Error::IoError(format!("failed to create {}: {e}", deps_dir.display())))?;
    let deps_file = deps_dir.join(target_name);

    let mut body = available.join("\n");
    body.push('\n');
    fs::write(&deps_file, body)
        .map_err(|e| Error::IoError(format!("failed to write {}: {e}", deps_file.display())))?;

    info!(
        "Wrote {} upstream dependencies to {}",
        available.len(),
        deps_file.display()
    );
    Ok(available)
}

/// Extract a bash array variable: `name=('a' 'b')` or `name=(a b)`
fn extract_array(content: &str, name: &str) -> Option<Vec<String>> {
    let pattern = format!(r"(?s){}=\(([^)]*)\)", regex::escape(name));
    let re = Regex::new(&pattern).ok()?;
    let caps = re.captures(content)?;
    let body = caps.get(1)?.as_str();

    Some(
        body.split_whitespace()
            .map(|s| s.trim_matches(|c| c == '"' || c == '\'').to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    )
}
