// src/report/mod.rs

//! End-of-run reporting
//!
//! After the build loop finishes the run is sealed: the source scratch
//! tree is dropped, the last-build timestamp is rewritten, failures are
//! summarized, and the package directory is handed to the upload helper.
//! Only the upload result and the failure count decide the process exit
//! code; everything else here is best effort.

use crate::config::{BuildEnv, CiContext};
use crate::error::{Error, Result};
use crate::executor::RunLedger;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{error, info, warn};

/// Helper invoked to push built packages to the repository server
const DEFAULT_UPLOAD_COMMAND: &str = "./utils/upload.py";

/// Timestamp file overwritten at the end of every non-dry run
const LAST_BUILD_FILE: &str = "LASTBUILD";

/// Seals a finished run and computes the process exit code
pub struct RunReporter {
    env: BuildEnv,
    upload_command: PathBuf,
}

impl RunReporter {
    pub fn new(env: BuildEnv) -> Self {
        Self {
            env,
            upload_command: PathBuf::from(DEFAULT_UPLOAD_COMMAND),
        }
    }

    pub fn with_upload_command(mut self, command: PathBuf) -> Self {
        self.upload_command = command;
        self
    }

    /// Run all end-of-run steps and return the process exit code
    ///
    /// Dry runs touch nothing and always exit 0.
    pub fn finalize(&self, ci: &CiContext, ledger: &RunLedger) -> i32 {
        clean_build_tree(&self.env.src_dest);

        if let Err(e) = write_last_build(&self.env.pkg_dest) {
            warn!("Could not write last-build timestamp: {e}");
        }

        log_summary(ledger);

        let upload_code = if ci.upload_disabled {
            info!("Upload disabled, skipped");
            0
        } else {
            self.upload_packages(ci)
        };

        exit_code(upload_code, ledger.has_failures())
    }

    /// Invoke the upload helper; missing endpoint or credential skips the
    /// upload instead of failing the run
    fn upload_packages(&self, ci: &CiContext) -> i32 {
        let (Some(remote), Some(token)) = (&ci.remote_path, &ci.upload_token) else {
            error!("$REMOTE_PATH or $UPLOAD_TOKEN is unset, skipped upload");
            return 0;
        };

        let mut cmd = Command::new(&self.upload_command);
        cmd.arg(remote)
            .arg(token)
            .arg(&self.env.arch)
            .arg("--directory")
            .arg(&self.env.pkg_dest)
            .stdin(Stdio::null());

        match cmd.status() {
            Ok(status) => status.code().unwrap_or(-1),
            Err(e) => {
                error!("Upload helper failed to start: {e}");
                -1
            }
        }
    }
}

/// Final exit code: a failed upload wins, then any build failure
pub fn exit_code(upload_code: i32, has_failures: bool) -> i32 {
    if upload_code != 0 {
        upload_code
    } else if has_failures {
        1
    } else {
        0
    }
}

/// Drop the source scratch tree left behind by the build tool
fn clean_build_tree(src_dest: &Path) {
    if src_dest.is_dir() {
        if let Err(e) = fs::remove_dir_all(src_dest) {
            warn!("Could not remove {}: {e}", src_dest.display());
        }
    }
}

/// Overwrite the last-build timestamp in the package directory
pub fn write_last_build(pkg_dest: &Path) -> Result<()> {
    fs::create_dir_all(pkg_dest)
        .map_err(|e| Error::IoError(format!("failed to create {}: {e}", pkg_dest.display())))?;
    let path = pkg_dest.join(LAST_BUILD_FILE);
    fs::write(&path, chrono::Utc::now().timestamp().to_string())
        .map_err(|e| Error::IoError(format!("failed to write {}: {e}", path.display())))
}

/// Log failed targets and advisory notes
fn log_summary(ledger: &RunLedger) {
    if ledger.has_failures() {
        error!("Build failed repositories ({}):", ledger.failures.len());
        let summary = ledger
            .failures
            .iter()
            .map(|f| f.summary())
            .collect::<Vec<_>>()
            .join(", ");
        error!("{summary}");
    }
    for note in &ledger.advisories {
        warn!("Advisory: {note}");
    }
}
