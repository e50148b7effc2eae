// src/config.rs

//! Run configuration
//!
//! Two inputs shape a run: read-only CI environment variables and the
//! build environment derived from the working directory. Both are
//! collected once at startup and passed by value; nothing here is
//! re-read mid-run.

use std::env;
use std::path::PathBuf;
use std::process::Command;
use tracing::{info, warn};

/// Directory of package definitions, relative to the working directory
pub const PKGBUILD_DIRECTORY_BASE: &str = "repo";

/// Read-only CI inputs
#[derive(Debug, Clone, Default)]
pub struct CiContext {
    /// Current branch (`CI_COMMIT_BRANCH`)
    pub branch: String,
    /// Default branch (`CI_DEFAULT_BRANCH`)
    pub default_branch: String,
    /// Commit title, scanned for a rebuild-all directive (`CI_COMMIT_TITLE`)
    pub commit_title: String,
    /// Semicolon-separated package override list (`BUILD_OVERRIDE`)
    pub build_override: Vec<String>,
    /// Upload switched off (`BUILD_NO_UPLOAD` present)
    pub upload_disabled: bool,
    /// Architecture override (`BUILD_ARCH`)
    pub arch_override: Option<String>,
    /// Upload endpoint (`REMOTE_PATH`)
    pub remote_path: Option<String>,
    /// Upload credential (`UPLOAD_TOKEN`)
    pub upload_token: Option<String>,
}

impl CiContext {
    pub fn from_env() -> Self {
        let build_override = env::var("BUILD_OVERRIDE")
            .unwrap_or_default()
            .split(';')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
        Self {
            branch: env::var("CI_COMMIT_BRANCH").unwrap_or_default(),
            default_branch: env::var("CI_DEFAULT_BRANCH").unwrap_or_default(),
            commit_title: env::var("CI_COMMIT_TITLE").unwrap_or_default(),
            build_override,
            upload_disabled: env::var_os("BUILD_NO_UPLOAD").is_some(),
            arch_override: env::var("BUILD_ARCH").ok(),
            remote_path: env::var("REMOTE_PATH").ok(),
            upload_token: env::var("UPLOAD_TOKEN").ok(),
        }
    }

    /// Rebuild-all directive in the commit title
    pub fn rebuild_all_requested(&self) -> bool {
        self.commit_title.contains("REBUILD ALL") || self.commit_title.contains("REBUILD_ALL")
    }

    /// Packages built on the default branch are signed
    pub fn sign_by_default(&self) -> bool {
        !self.branch.is_empty() && self.branch == self.default_branch
    }
}

/// Paths and flags pinned into every build tool invocation
#[derive(Debug, Clone)]
pub struct BuildEnv {
    /// Scratch directory for sources (`SRCDEST`/`SRCPKGDEST`)
    pub src_dest: PathBuf,
    /// Destination for built packages (`PKGDEST`)
    pub pkg_dest: PathBuf,
    /// makepkg configuration file (`MAKEPKG_CONF`)
    pub makepkg_conf: PathBuf,
    /// Pass `--sign` to the build tool
    pub sign: bool,
    /// Host architecture token
    pub arch: String,
}

impl BuildEnv {
    /// Derive the build environment from a working directory
    pub fn new(cwd: &PathBuf, arch: String, sign: bool) -> Self {
        if !sign {
            info!("Skip signing package");
        }
        Self {
            src_dest: cwd.join("build"),
            pkg_dest: cwd.join("packages").join(&arch),
            makepkg_conf: cwd.join("makepkg_current.conf"),
            sign,
            arch,
        }
    }
}

/// Host architecture token, lowercase
///
/// The env override wins; otherwise `uname -m`, falling back to the
/// compile-time architecture if that cannot run.
pub fn detect_host_arch(ci: &CiContext) -> String {
    if let Some(arch) = &ci.arch_override {
        return arch.to_lowercase();
    }
    match Command::new("uname").arg("-m").output() {
        Ok(output) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).trim().to_lowercase()
        }
        _ => {
            warn!("uname -m failed, using compile-time architecture");
            env::consts::ARCH.to_string()
        }
    }
}
