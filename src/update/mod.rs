// src/update/mod.rs

//! AUR update checking
//!
//! Compares each local definition's declared version against the AUR's
//! copy of the same package. The fetch fans out with the same bounded
//! worker-pool shape as dependency probing; comparison uses the standard
//! version order. Definitions that are git checkouts of their AUR
//! counterpart can be pulled forward when an update is found.

use crate::error::{Error, Result};
use crate::probe::ScriptSource;
use crate::version::PkgVersion;
use rayon::prelude::*;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{info, warn};

/// Relation of a local definition to its AUR counterpart
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    UpToDate,
    /// The AUR does not serve a PKGBUILD under this name
    NotRegistered,
    /// The local definition is ahead of the AUR
    LocalNewer {
        local: PkgVersion,
        remote: PkgVersion,
    },
    /// The AUR carries a newer version; `tracked` marks a git checkout
    /// that can be pulled forward
    UpdateAvailable {
        local: PkgVersion,
        remote: PkgVersion,
        tracked: bool,
    },
}

/// One checked definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub name: String,
    pub path: PathBuf,
    pub status: UpdateStatus,
}

impl fmt::Display for UpdateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            UpdateStatus::UpToDate => write!(f, "{} is up to date", self.name),
            UpdateStatus::NotRegistered => write!(f, "{} not registered in AUR", self.name),
            UpdateStatus::LocalNewer { local, remote } => {
                write!(f, "{} {} is newer than AUR ({})", self.name, local, remote)
            }
            UpdateStatus::UpdateAvailable {
                local,
                remote,
                tracked,
            } => {
                if *tracked {
                    write!(f, "Upgrade {} from {} to {}", self.name, local, remote)
                } else {
                    write!(f, "Found update {}({}) (AUR: {})", self.name, local, remote)
                }
            }
        }
    }
}

/// Check every definition under `repo_dir` against the AUR
///
/// Dotted names and plain files are skipped, as are definitions without a
/// readable PKGBUILD or with an unreachable AUR counterpart; each of those
/// loses only itself. Reports come back sorted by name.
pub fn check_updates(
    repo_dir: &Path,
    source: &dyn ScriptSource,
    concurrency: usize,
) -> Result<Vec<UpdateReport>> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    let entries = fs::read_dir(repo_dir)
        .map_err(|e| Error::IoError(format!("failed to list {}: {e}", repo_dir.display())))?;
    for entry in entries {
        let entry = entry.map_err(|e| Error::IoError(e.to_string()))?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(concurrency.max(1))
        .build()
        .map_err(|e| Error::IoError(format!("failed to create update pool: {e}")))?;

    let reports: Vec<Option<UpdateReport>> = pool.install(|| {
        dirs.par_iter().map(|dir| check_one(dir, source)).collect()
    });

    Ok(reports.into_iter().flatten().collect())
}

/// Check one definition directory; `None` drops it from the report
fn check_one(dir: &Path, source: &dyn ScriptSource) -> Option<UpdateReport> {
    let name = dir.file_name()?.to_string_lossy().into_owned();

    let pkgbuild = dir.join("PKGBUILD");
    if !pkgbuild.is_file() {
        warn!("PKGBUILD not in {}, skipped", dir.display());
        return None;
    }
    let text = match fs::read_to_string(&pkgbuild) {
        Ok(text) => text,
        Err(e) => {
            warn!("Unreadable {}: {e}", pkgbuild.display());
            return None;
        }
    };
    let local = match PkgVersion::from_script(&text) {
        Ok(version) => version,
        Err(e) => {
            warn!("Unreadable version in {}: {e}", pkgbuild.display());
            return None;
        }
    };

    let remote_text = match source.fetch_script(&name) {
        Ok(Some(text)) => text,
        Ok(None) => {
            return Some(UpdateReport {
                name,
                path: dir.to_path_buf(),
                status: UpdateStatus::NotRegistered,
            });
        }
        Err(e) => {
            warn!("Could not fetch AUR PKGBUILD for {name}: {e}");
            return None;
        }
    };
    let remote = match PkgVersion::from_script(&remote_text) {
        Ok(version) => version,
        Err(e) => {
            warn!("Unreadable version in AUR PKGBUILD for {name}: {e}");
            return None;
        }
    };

    let status = if remote == local {
        UpdateStatus::UpToDate
    } else if remote < local {
        UpdateStatus::LocalNewer { local, remote }
    } else {
        UpdateStatus::UpdateAvailable {
            local,
            remote,
            tracked: dir.join(".git").exists(),
        }
    };

    Some(UpdateReport {
        name,
        path: dir.to_path_buf(),
        status,
    })
}

/// Source checkout pull, behind a seam for tests
pub trait SourcePuller {
    fn pull(&self, dir: &Path) -> Result<i32>;
}

/// Pulls a checkout with `git -C <dir> pull origin master`
pub struct GitPuller;

impl SourcePuller for GitPuller {
    fn pull(&self, dir: &Path) -> Result<i32> {
        let mut child = Command::new("git")
            .arg("-C")
            .arg(dir)
            .args(["pull", "origin", "master"])
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| Error::SpawnError {
                command: "git pull".to_string(),
                source: e,
            })?;
        Ok(child.wait()?.code().unwrap_or(-1))
    }
}

/// Pull every tracked checkout with an available update
///
/// Pull failures are logged and skipped; returns how many pulls succeeded.
pub fn pull_tracked(reports: &[UpdateReport], puller: &dyn SourcePuller) -> usize {
    let mut pulled = 0;
    for report in reports {
        if let UpdateStatus::UpdateAvailable {
            local,
            remote,
            tracked: true,
        } = &report.status
        {
            info!("Upgrade {} from {} to {}", report.name, local, remote);
            match puller.pull(&report.path) {
                Ok(0) => pulled += 1,
                Ok(code) => warn!("git pull in {} exited {}", report.path.display(), code),
                Err(e) => warn!("git pull in {} failed: {}", report.path.display(), e),
            }
        }
    }
    pulled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Scripted source: a map from name to an optional PKGBUILD body
    struct MapSource {
        scripts: HashMap<String, Option<String>>,
        failing: Vec<String>,
    }

    impl MapSource {
        fn new(entries: &[(&str, Option<String>)]) -> Self {
            Self {
                scripts: entries
                    .iter()
                    .map(|(n, s)| (n.to_string(), s.clone()))
                    .collect(),
                failing: Vec::new(),
            }
        }

        fn failing(mut self, names: &[&str]) -> Self {
            self.failing = names.iter().map(|s| s.to_string()).collect();
            self
        }
    }

    impl ScriptSource for MapSource {
        fn fetch_script(&self, name: &str) -> std::result::Result<Option<String>, ProbeError> {
            if self.failing.iter().any(|n| n == name) {
                return Err(ProbeError::Timeout);
            }
            Ok(self.scripts.get(name).cloned().flatten())
        }
    }

    fn script(version: &str, release: &str) -> String {
        format!("pkgname=whatever\npkgver={version}\npkgrel={release}\n")
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path().to_path_buf();
            Self { _dir: dir, root }
        }

        fn definition(&self, name: &str, version: &str, release: &str) -> PathBuf {
            let dir = self.root.join(name);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("PKGBUILD"), script(version, release)).unwrap();
            dir
        }
    }

    fn status_of<'a>(reports: &'a [UpdateReport], name: &str) -> &'a UpdateStatus {
        &reports.iter().find(|r| r.name == name).unwrap().status
    }

    #[test]
    fn test_statuses_across_a_tree() {
        let fx = Fixture::new();
        fx.definition("current", "1.0", "1");
        fx.definition("stale", "1.0", "1");
        fx.definition("ahead", "2.0", "1");
        fx.definition("unlisted", "1.0", "1");
        // Hidden directories and plain files never count.
        fs::create_dir(fx.root.join(".git")).unwrap();
        fs::write(fx.root.join("README"), "not a package").unwrap();

        let source = MapSource::new(&[
            ("current", Some(script("1.0", "1"))),
            ("stale", Some(script("1.1", "1"))),
            ("ahead", Some(script("1.0", "1"))),
            ("unlisted", None),
        ]);

        let reports = check_updates(&fx.root, &source, 4).unwrap();
        assert_eq!(reports.len(), 4);
        assert_eq!(status_of(&reports, "current"), &UpdateStatus::UpToDate);
        assert_eq!(status_of(&reports, "unlisted"), &UpdateStatus::NotRegistered);
        assert!(matches!(
            status_of(&reports, "stale"),
            UpdateStatus::UpdateAvailable { tracked: false, .. }
        ));
        assert!(matches!(
            status_of(&reports, "ahead"),
            UpdateStatus::LocalNewer { .. }
        ));
    }

    #[test]
    fn test_tracked_checkout_is_flagged() {
        let fx = Fixture::new();
        let dir = fx.definition("tracked", "1.0", "1");
        fs::create_dir(dir.join(".git")).unwrap();
        let source = MapSource::new(&[("tracked", Some(script("1.1", "1")))]);

        let reports = check_updates(&fx.root, &source, 2).unwrap();
        assert!(matches!(
            status_of(&reports, "tracked"),
            UpdateStatus::UpdateAvailable { tracked: true, .. }
        ));
    }

    #[test]
    fn test_unreachable_source_drops_only_that_definition() {
        let fx = Fixture::new();
        fx.definition("good", "1.0", "1");
        fx.definition("flaky", "1.0", "1");
        let source =
            MapSource::new(&[("good", Some(script("1.0", "1")))]).failing(&["flaky"]);

        let reports = check_updates(&fx.root, &source, 2).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].name, "good");
    }

    #[test]
    fn test_missing_pkgbuild_is_skipped() {
        let fx = Fixture::new();
        fs::create_dir(fx.root.join("empty")).unwrap();
        let source = MapSource::new(&[]);

        let reports = check_updates(&fx.root, &source, 2).unwrap();
        assert!(reports.is_empty());
    }

    /// Scripted puller recording every directory it was asked to pull
    struct RecordingPuller(Mutex<Vec<PathBuf>>);

    impl SourcePuller for RecordingPuller {
        fn pull(&self, dir: &Path) -> Result<i32> {
            self.0.lock().unwrap().push(dir.to_path_buf());
            Ok(0)
        }
    }

    #[test]
    fn test_pull_only_tracked_updates() {
        let fx = Fixture::new();
        let tracked = fx.definition("tracked", "1.0", "1");
        fs::create_dir(tracked.join(".git")).unwrap();
        fx.definition("untracked", "1.0", "1");
        fx.definition("current", "1.0", "1");
        let source = MapSource::new(&[
            ("tracked", Some(script("1.1", "1"))),
            ("untracked", Some(script("1.1", "1"))),
            ("current", Some(script("1.0", "1"))),
        ]);

        let reports = check_updates(&fx.root, &source, 2).unwrap();
        let puller = RecordingPuller(Mutex::new(Vec::new()));
        let pulled = pull_tracked(&reports, &puller);

        assert_eq!(pulled, 1);
        assert_eq!(*puller.0.lock().unwrap(), vec![tracked]);
    }

    #[test]
    fn test_report_display() {
        let report = UpdateReport {
            name: "nano".to_string(),
            path: PathBuf::from("/repo/nano"),
            status: UpdateStatus::UpdateAvailable {
                local: PkgVersion::parse("8.4-1").unwrap(),
                remote: PkgVersion::parse("8.5-1").unwrap(),
                tracked: true,
            },
        };
        assert_eq!(report.to_string(), "Upgrade nano from 8.4-1 to 8.5-1");
    }
}
