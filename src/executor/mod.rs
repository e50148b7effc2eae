// src/executor/mod.rs

//! Dependency-ordered build execution
//!
//! Targets are built strictly one after another: every build mutates the
//! host package state (installed packages, build caches), which is owned
//! exclusively for the whole run. Within a target the steps are
//!
//! pre-hook → dependencies (in file order) → signing keys → build
//!
//! A failing step loses only its target; the run records the failure and
//! moves on unless fail-fast was requested. Best-effort side effects
//! (key import, orphan removal) never change a target's outcome; their
//! failures land in the ledger's advisory list instead.
//!
//! All external tools sit behind the [`ToolRunner`] trait, so the state
//! machine is exercised in tests with scripted exit codes.

use crate::config::BuildEnv;
use crate::error::{Error, Result};
use crate::resolve::LocalPackage;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use wait_timeout::ChildExt;

/// Build tool exit code meaning "package was already built"
const ALREADY_BUILT_EXIT: i32 = 13;

/// Exit code reported when a tool exceeds the configured timeout
const TIMEOUT_EXIT: i32 = 124;

/// Exit code recorded when a tool could not be launched at all
const SPAWN_FAILURE_EXIT: i32 = -1;

/// Default trust-import script run after a key-import script
const DEFAULT_TRUST_SCRIPT: &str = "./utils/trust_gpg.sh";

/// Hidden per-target files, resolved once before the state machine runs
///
/// The repo tree keeps hook scripts, dependency lists, and key-import
/// scripts in dotted sibling directories keyed by target name. Resolving
/// them up front keeps the filesystem out of the state machine.
#[derive(Debug, Clone, Default)]
pub struct TargetManifest {
    pub hook_script: Option<PathBuf>,
    pub deps_file: Option<PathBuf>,
    pub key_script: Option<PathBuf>,
}

impl TargetManifest {
    /// Resolve the manifest for one package directory
    pub fn discover(pkg_dir: &Path) -> Self {
        let Some(name) = pkg_dir.file_name() else {
            return Self::default();
        };
        let parent = pkg_dir.parent().unwrap_or(Path::new("."));
        let find = |sub: &str| {
            let path = parent.join(sub).join(name);
            path.is_file().then_some(path)
        };
        Self {
            hook_script: find(".hook"),
            deps_file: find(".yaydeps"),
            key_script: find(".gpg_keys"),
        }
    }
}

/// External tools the executor drives
///
/// Every method returns the tool's exit code; `Err` means the tool could
/// not even be launched.
pub trait ToolRunner {
    /// Execute a pre-build hook script
    fn run_hook(&self, script: &Path) -> Result<i32>;
    /// Invoke the package build tool in `dir`; `install_after` also
    /// installs the result (used for local dependency builds)
    fn build_package(&self, dir: &Path, install_after: bool) -> Result<i32>;
    /// Install a dependency through the external package manager
    fn install_external(&self, dependency: &str) -> Result<i32>;
    /// Run a key-import script followed by the trust-import script
    fn import_keys(&self, script: &Path) -> Result<i32>;
    /// Remove orphaned packages left behind by dependency installs
    fn remove_orphans(&self) -> Result<i32>;
}

/// [`ToolRunner`] backed by real subprocesses (makepkg, yay, pacman)
pub struct SystemToolRunner {
    env: BuildEnv,
    trust_script: PathBuf,
    /// Per-invocation timeout; `None` lets tools run unbounded
    timeout: Option<Duration>,
}

impl SystemToolRunner {
    pub fn new(env: BuildEnv, timeout: Option<Duration>) -> Self {
        Self {
            env,
            trust_script: PathBuf::from(DEFAULT_TRUST_SCRIPT),
            timeout,
        }
    }

    pub fn with_trust_script(mut self, script: PathBuf) -> Self {
        self.trust_script = script;
        self
    }

    fn wait(&self, mut child: Child, what: &str) -> Result<i32> {
        match self.timeout {
            Some(limit) => match child.wait_timeout(limit)? {
                Some(status) => Ok(status.code().unwrap_or(SPAWN_FAILURE_EXIT)),
                None => {
                    let _ = child.kill();
                    let _ = child.wait();
                    warn!("{} timed out after {}s", what, limit.as_secs());
                    Ok(TIMEOUT_EXIT)
                }
            },
            None => Ok(child.wait()?.code().unwrap_or(SPAWN_FAILURE_EXIT)),
        }
    }

    fn spawn(&self, mut cmd: Command, what: &str) -> Result<i32> {
        let child = cmd.stdin(Stdio::null()).spawn().map_err(|e| Error::SpawnError {
            command: what.to_string(),
            source: e,
        })?;
        self.wait(child, what)
    }
}

impl ToolRunner for SystemToolRunner {
    fn run_hook(&self, script: &Path) -> Result<i32> {
        info!("Running hook script {}", script.display());
        self.spawn(Command::new(script), "hook script")
    }

    fn build_package(&self, dir: &Path, install_after: bool) -> Result<i32> {
        let mut cmd = Command::new("makepkg");
        cmd.arg("--clean").arg("-s");
        if install_after {
            cmd.arg("-i");
        }
        if self.env.sign {
            cmd.arg("--sign");
        }
        cmd.args(["--asdeps", "--noconfirm", "--needed", "--noprogressbar"])
            .env("SRCDEST", &self.env.src_dest)
            .env("SRCPKGDEST", &self.env.src_dest)
            .env("PKGDEST", &self.env.pkg_dest)
            .env("MAKEPKG_CONF", &self.env.makepkg_conf)
            .current_dir(dir);
        self.spawn(cmd, "makepkg")
    }

    fn install_external(&self, dependency: &str) -> Result<i32> {
        let mut cmd = Command::new("yay");
        cmd.args(["--noconfirm", "--asdeps", "--needed", "--noprogressbar", "-S"])
            .arg(dependency);
        self.spawn(cmd, "yay")
    }

    fn import_keys(&self, script: &Path) -> Result<i32> {
        let mut import = Command::new("/bin/bash");
        import.arg(script);
        let code = self.spawn(import, "key import")?;
        if code != 0 {
            return Ok(code);
        }
        self.spawn(Command::new(&self.trust_script), "trust import")
    }

    fn remove_orphans(&self) -> Result<i32> {
        let mut cmd = Command::new("/bin/bash");
        cmd.arg("-c")
            .arg("pacman -Qdtq | ifne sudo pacman --noconfirm -Rcns -");
        self.spawn(cmd, "orphan removal")
    }
}

/// One recorded build failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub target: String,
    pub exit_code: i32,
    /// Set when a dependency failed before the target's own build ran
    pub failing_dependency: Option<String>,
}

impl BuildOutcome {
    /// Compact summary line: `name(code)` or `name(dependency)[dep](code)`
    pub fn summary(&self) -> String {
        match &self.failing_dependency {
            Some(dep) => format!("{}(dependency)[{}]({})", self.target, dep, self.exit_code),
            None => format!("{}({})", self.target, self.exit_code),
        }
    }
}

/// Append-only record of one run
#[derive(Debug, Default)]
pub struct RunLedger {
    /// Failed targets, in execution order
    pub failures: Vec<BuildOutcome>,
    /// Best-effort side effects that went wrong
    pub advisories: Vec<String>,
}

impl RunLedger {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    fn advise(&mut self, note: String) {
        warn!("{note}");
        self.advisories.push(note);
    }
}

/// Run policy knobs
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Abort the whole run on the first failure
    pub fail_fast: bool,
    /// Remove orphaned packages after each target
    pub auto_remove: bool,
    /// Resolve and log but do not build
    pub dry_run: bool,
    /// Pause after a failed target before continuing
    pub pause: Duration,
    /// Whether orphan removal still runs after a failed pre-hook
    pub cleanup_after_hook_failure: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            fail_fast: false,
            auto_remove: true,
            dry_run: false,
            pause: Duration::from_secs(3),
            cleanup_after_hook_failure: true,
        }
    }
}

/// Terminal state of one target
enum TargetStep {
    Success,
    HookFailed(BuildOutcome),
    Failed(BuildOutcome),
}

/// Sequential build loop over resolved targets
pub struct BuildExecutor<'a, R: ToolRunner> {
    runner: &'a R,
    options: ExecutorOptions,
}

impl<'a, R: ToolRunner> BuildExecutor<'a, R> {
    pub fn new(runner: &'a R, options: ExecutorOptions) -> Self {
        Self { runner, options }
    }

    /// Build every target in order, collecting failures instead of
    /// aborting (unless fail-fast is set)
    pub fn run(&self, targets: &[LocalPackage]) -> RunLedger {
        let mut ledger = RunLedger::default();

        for target in targets {
            if !target.arch_match {
                info!("Skipped {} (architecture not match)", target.name);
                continue;
            }
            if self.options.dry_run {
                info!("Skipped {} (dry run)", target.name);
                continue;
            }

            info!("Building {} ({})", target.name, target.path.display());
            let step = self.build_one(target, &mut ledger);

            let (failed, run_cleanup) = match step {
                TargetStep::Success => (false, true),
                TargetStep::HookFailed(outcome) => {
                    ledger.failures.push(outcome);
                    (true, self.options.cleanup_after_hook_failure)
                }
                TargetStep::Failed(outcome) => {
                    ledger.failures.push(outcome);
                    (true, true)
                }
            };

            if failed {
                if self.options.fail_fast {
                    warn!("Fail fast requested, stopping the run");
                    break;
                }
                std::thread::sleep(self.options.pause);
            }

            if run_cleanup && self.options.auto_remove {
                match self.runner.remove_orphans() {
                    Ok(0) => {}
                    Ok(code) => ledger.advise(format!("orphan removal exited {code}")),
                    Err(e) => ledger.advise(format!("orphan removal failed: {e}")),
                }
            }
        }

        ledger
    }

    /// Drive one target through the per-target state machine
    fn build_one(&self, target: &LocalPackage, ledger: &mut RunLedger) -> TargetStep {
        let manifest = TargetManifest::discover(&target.path);

        if let Some(hook) = &manifest.hook_script {
            match self.runner.run_hook(hook) {
                Ok(0) => {}
                Ok(code) => {
                    error!("Hook script for {} exited {}, skipping target", target.name, code);
                    return TargetStep::HookFailed(BuildOutcome {
                        target: target.name.clone(),
                        exit_code: code,
                        failing_dependency: None,
                    });
                }
                Err(e) => {
                    error!("Hook script for {} failed to start: {}", target.name, e);
                    return TargetStep::HookFailed(BuildOutcome {
                        target: target.name.clone(),
                        exit_code: SPAWN_FAILURE_EXIT,
                        failing_dependency: None,
                    });
                }
            }
        }

        if let Some(deps_file) = &manifest.deps_file {
            match read_dependency_list(deps_file) {
                Ok(deps) => {
                    for dep in deps {
                        debug!("Found dependency {}, building first", dep);
                        let code = match self.build_dependency(target, &dep) {
                            Ok(code) => code,
                            Err(e) => {
                                error!("Dependency {} of {} failed to start: {}", dep, target.name, e);
                                SPAWN_FAILURE_EXIT
                            }
                        };
                        if code != 0 {
                            error!(
                                "Dependency {} of {} failed ({}), skipping remaining steps",
                                dep, target.name, code
                            );
                            return TargetStep::Failed(BuildOutcome {
                                target: target.name.clone(),
                                exit_code: code,
                                failing_dependency: Some(dep),
                            });
                        }
                    }
                }
                Err(e) => {
                    error!("Unreadable dependency list for {}: {}", target.name, e);
                    return TargetStep::Failed(BuildOutcome {
                        target: target.name.clone(),
                        exit_code: SPAWN_FAILURE_EXIT,
                        failing_dependency: None,
                    });
                }
            }
        }

        if let Some(keys) = &manifest.key_script {
            match self.runner.import_keys(keys) {
                Ok(0) => {}
                Ok(code) => ledger.advise(format!("key import for {} exited {code}", target.name)),
                Err(e) => ledger.advise(format!("key import for {} failed: {e}", target.name)),
            }
        }

        match self.runner.build_package(&target.path, false) {
            Ok(0) => TargetStep::Success,
            Ok(ALREADY_BUILT_EXIT) => {
                ledger.advise(format!("{} already built, skipped", target.name));
                TargetStep::Success
            }
            Ok(code) => {
                warn!("Build {} failed: {}", target.name, code);
                TargetStep::Failed(BuildOutcome {
                    target: target.name.clone(),
                    exit_code: code,
                    failing_dependency: None,
                })
            }
            Err(e) => {
                error!("Build tool for {} failed to start: {}", target.name, e);
                TargetStep::Failed(BuildOutcome {
                    target: target.name.clone(),
                    exit_code: SPAWN_FAILURE_EXIT,
                    failing_dependency: None,
                })
            }
        }
    }

    /// Build or install one dependency of `target`
    ///
    /// A same-named sibling directory means a local source build (its own
    /// hook, then build+install); anything else goes through the external
    /// package manager.
    fn build_dependency(&self, target: &LocalPackage, dependency: &str) -> Result<i32> {
        let parent = target.path.parent().unwrap_or(Path::new("."));
        let dep_dir = parent.join(dependency);
        if dep_dir.is_dir() {
            let manifest = TargetManifest::discover(&dep_dir);
            if let Some(hook) = &manifest.hook_script {
                let code = self.runner.run_hook(hook)?;
                if code != 0 {
                    return Ok(code);
                }
            }
            self.runner.build_package(&dep_dir, true)
        } else {
            self.runner.install_external(dependency)
        }
    }
}

/// Read a dependency list file: one name per line, blanks skipped
fn read_dependency_list(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::IoError(format!("failed to read {}: {e}", path.display())))?;
    Ok(content
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::PkgVersion;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Scripted runner recording every call in order
    #[derive(Default)]
    struct ScriptedRunner {
        calls: RefCell<Vec<String>>,
        /// Exit codes keyed by call label; unlisted calls return 0
        codes: HashMap<String, i32>,
        /// Call labels whose tool cannot even be launched
        spawn_failures: Vec<String>,
    }

    impl ScriptedRunner {
        fn with_codes(codes: &[(&str, i32)]) -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                codes: codes.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
                spawn_failures: Vec::new(),
            }
        }

        fn with_spawn_failures(labels: &[&str]) -> Self {
            Self {
                spawn_failures: labels.iter().map(|l| l.to_string()).collect(),
                ..Self::default()
            }
        }

        fn record(&self, label: String) -> Result<i32> {
            self.calls.borrow_mut().push(label.clone());
            if self.spawn_failures.contains(&label) {
                return Err(Error::SpawnError {
                    command: label,
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing tool"),
                });
            }
            Ok(*self.codes.get(&label).unwrap_or(&0))
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl ToolRunner for ScriptedRunner {
        fn run_hook(&self, script: &Path) -> Result<i32> {
            let name = script.file_name().unwrap().to_string_lossy().into_owned();
            self.record(format!("hook:{name}"))
        }

        fn build_package(&self, dir: &Path, install_after: bool) -> Result<i32> {
            let name = dir.file_name().unwrap().to_string_lossy().into_owned();
            let suffix = if install_after { "+install" } else { "" };
            self.record(format!("build:{name}{suffix}"))
        }

        fn install_external(&self, dependency: &str) -> Result<i32> {
            self.record(format!("yay:{dependency}"))
        }

        fn import_keys(&self, script: &Path) -> Result<i32> {
            let name = script.file_name().unwrap().to_string_lossy().into_owned();
            self.record(format!("keys:{name}"))
        }

        fn remove_orphans(&self) -> Result<i32> {
            self.record("orphans".to_string())
        }
    }

    /// Fixture: repo tree with a package dir and optional hidden files
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

        fn package(&self, name: &str) -> LocalPackage {
            let path = self.root.join(name);
            fs::create_dir_all(&path).unwrap();
            LocalPackage {
                name: name.to_string(),
                version: PkgVersion::parse("1.0-1").unwrap(),
                path,
                arch_match: true,
                srcinfo_secs: -1.0,
            }
        }

        fn hidden_file(&self, sub: &str, name: &str, content: &str) {
            let dir = self.root.join(sub);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(name), content).unwrap();
        }
    }

    fn quiet_options() -> ExecutorOptions {
        ExecutorOptions {
            pause: Duration::ZERO,
            ..ExecutorOptions::default()
        }
    }

    #[test]
    fn test_plain_target_builds_and_cleans_up() {
        let fx = Fixture::new();
        let target = fx.package("alpha");
        let runner = ScriptedRunner::default();

        let ledger = BuildExecutor::new(&runner, quiet_options()).run(&[target]);

        assert!(!ledger.has_failures());
        assert_eq!(runner.calls(), vec!["build:alpha", "orphans"]);
    }

    #[test]
    fn test_failing_dependency_skips_target_build() {
        let fx = Fixture::new();
        let target = fx.package("alpha");
        fx.package("dep-d"); // local sibling directory for the dependency
        fx.hidden_file(".yaydeps", "alpha", "dep-d\n");
        let runner = ScriptedRunner::with_codes(&[("build:dep-d+install", 7)]);

        let ledger = BuildExecutor::new(&runner, quiet_options()).run(&[target]);

        assert_eq!(ledger.failures.len(), 1);
        let failure = &ledger.failures[0];
        assert_eq!(failure.exit_code, 7);
        assert_eq!(failure.failing_dependency.as_deref(), Some("dep-d"));
        // The target's own build was never invoked.
        assert!(!runner.calls().iter().any(|c| c == "build:alpha"));
    }

    #[test]
    fn test_dependency_without_local_dir_uses_external_installer() {
        let fx = Fixture::new();
        let target = fx.package("alpha");
        fx.hidden_file(".yaydeps", "alpha", "remote-dep\n\n");
        let runner = ScriptedRunner::default();

        let ledger = BuildExecutor::new(&runner, quiet_options()).run(&[target]);

        assert!(!ledger.has_failures());
        assert_eq!(runner.calls(), vec!["yay:remote-dep", "build:alpha", "orphans"]);
    }

    #[test]
    fn test_dependencies_run_in_file_order() {
        let fx = Fixture::new();
        let target = fx.package("alpha");
        fx.hidden_file(".yaydeps", "alpha", "zeta\nbeta\n");
        let runner = ScriptedRunner::default();

        BuildExecutor::new(&runner, quiet_options()).run(&[target]);

        let calls = runner.calls();
        assert_eq!(&calls[..2], &["yay:zeta", "yay:beta"]);
    }

    #[test]
    fn test_already_built_exit_code_is_success() {
        let fx = Fixture::new();
        let target = fx.package("alpha");
        let runner = ScriptedRunner::with_codes(&[("build:alpha", ALREADY_BUILT_EXIT)]);

        let ledger = BuildExecutor::new(&runner, quiet_options()).run(&[target]);

        assert!(!ledger.has_failures());
        assert!(ledger.advisories.iter().any(|a| a.contains("already built")));
    }

    #[test]
    fn test_build_failure_is_recorded_without_dependency() {
        let fx = Fixture::new();
        let target = fx.package("alpha");
        let runner = ScriptedRunner::with_codes(&[("build:alpha", 2)]);

        let ledger = BuildExecutor::new(&runner, quiet_options()).run(&[target]);

        assert_eq!(ledger.failures.len(), 1);
        assert_eq!(ledger.failures[0].exit_code, 2);
        assert_eq!(ledger.failures[0].failing_dependency, None);
        assert_eq!(ledger.failures[0].summary(), "alpha(2)");
    }

    #[test]
    fn test_hook_failure_aborts_target() {
        let fx = Fixture::new();
        let target = fx.package("alpha");
        fx.hidden_file(".hook", "alpha", "#!/bin/sh\n");
        let runner = ScriptedRunner::with_codes(&[("hook:alpha", 1)]);

        let ledger = BuildExecutor::new(&runner, quiet_options()).run(&[target]);

        assert_eq!(ledger.failures.len(), 1);
        assert_eq!(ledger.failures[0].exit_code, 1);
        assert!(!runner.calls().iter().any(|c| c.starts_with("build:")));
        // Cleanup still ran (default policy).
        assert!(runner.calls().iter().any(|c| c == "orphans"));
    }

    #[test]
    fn test_hook_failure_can_skip_cleanup() {
        let fx = Fixture::new();
        let target = fx.package("alpha");
        fx.hidden_file(".hook", "alpha", "#!/bin/sh\n");
        let runner = ScriptedRunner::with_codes(&[("hook:alpha", 1)]);
        let options = ExecutorOptions {
            cleanup_after_hook_failure: false,
            ..quiet_options()
        };

        BuildExecutor::new(&runner, options).run(&[target]);

        assert!(!runner.calls().iter().any(|c| c == "orphans"));
    }

    #[test]
    fn test_key_import_failure_is_advisory_only() {
        let fx = Fixture::new();
        let target = fx.package("alpha");
        fx.hidden_file(".gpg_keys", "alpha", "#!/bin/sh\n");
        let runner = ScriptedRunner::with_codes(&[("keys:alpha", 2)]);

        let ledger = BuildExecutor::new(&runner, quiet_options()).run(&[target]);

        assert!(!ledger.has_failures());
        assert!(ledger.advisories.iter().any(|a| a.contains("key import")));
        assert!(runner.calls().iter().any(|c| c == "build:alpha"));
    }

    #[test]
    fn test_fail_fast_stops_the_run() {
        let fx = Fixture::new();
        let first = fx.package("alpha");
        let second = fx.package("beta");
        let runner = ScriptedRunner::with_codes(&[("build:alpha", 1)]);
        let options = ExecutorOptions {
            fail_fast: true,
            ..quiet_options()
        };

        let ledger = BuildExecutor::new(&runner, options).run(&[first, second]);

        assert_eq!(ledger.failures.len(), 1);
        assert!(!runner.calls().iter().any(|c| c == "build:beta"));
    }

    #[test]
    fn test_build_spawn_failure_recorded_and_run_continues() {
        let fx = Fixture::new();
        let first = fx.package("alpha");
        let second = fx.package("beta");
        let runner = ScriptedRunner::with_spawn_failures(&["build:alpha"]);

        let ledger = BuildExecutor::new(&runner, quiet_options()).run(&[first, second]);

        assert_eq!(ledger.failures.len(), 1);
        assert_eq!(ledger.failures[0].target, "alpha");
        assert_eq!(ledger.failures[0].exit_code, SPAWN_FAILURE_EXIT);
        assert_eq!(ledger.failures[0].failing_dependency, None);
        assert!(runner.calls().iter().any(|c| c == "build:beta"));
    }

    #[test]
    fn test_hook_spawn_failure_aborts_target() {
        let fx = Fixture::new();
        let target = fx.package("alpha");
        fx.hidden_file(".hook", "alpha", "#!/bin/sh\n");
        let runner = ScriptedRunner::with_spawn_failures(&["hook:alpha"]);

        let ledger = BuildExecutor::new(&runner, quiet_options()).run(&[target]);

        assert_eq!(ledger.failures.len(), 1);
        assert_eq!(ledger.failures[0].exit_code, SPAWN_FAILURE_EXIT);
        assert!(!runner.calls().iter().any(|c| c.starts_with("build:")));
    }

    #[test]
    fn test_fail_fast_break_skips_trailing_cleanup() {
        let fx = Fixture::new();
        let target = fx.package("alpha");
        let runner = ScriptedRunner::with_codes(&[("build:alpha", 1)]);
        let options = ExecutorOptions {
            fail_fast: true,
            ..quiet_options()
        };

        BuildExecutor::new(&runner, options).run(&[target]);

        assert_eq!(runner.calls(), vec!["build:alpha"]);
    }

    #[test]
    fn test_failure_continues_to_next_target_by_default() {
        let fx = Fixture::new();
        let first = fx.package("alpha");
        let second = fx.package("beta");
        let runner = ScriptedRunner::with_codes(&[("build:alpha", 1)]);

        let ledger = BuildExecutor::new(&runner, quiet_options()).run(&[first, second]);

        assert_eq!(ledger.failures.len(), 1);
        assert!(runner.calls().iter().any(|c| c == "build:beta"));
    }

    #[test]
    fn test_arch_mismatch_and_dry_run_skip() {
        let fx = Fixture::new();
        let mut foreign = fx.package("foreign");
        foreign.arch_match = false;
        let runner = ScriptedRunner::default();

        let ledger = BuildExecutor::new(&runner, quiet_options()).run(&[foreign]);
        assert!(runner.calls().is_empty());
        assert!(!ledger.has_failures());

        let normal = fx.package("normal");
        let options = ExecutorOptions {
            dry_run: true,
            ..quiet_options()
        };
        BuildExecutor::new(&runner, options).run(&[normal]);
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_auto_remove_disabled() {
        let fx = Fixture::new();
        let target = fx.package("alpha");
        let runner = ScriptedRunner::default();
        let options = ExecutorOptions {
            auto_remove: false,
            ..quiet_options()
        };

        BuildExecutor::new(&runner, options).run(&[target]);

        assert_eq!(runner.calls(), vec!["build:alpha"]);
    }

    #[test]
    fn test_manifest_discovery() {
        let fx = Fixture::new();
        let target = fx.package("alpha");
        fx.hidden_file(".hook", "alpha", "");
        fx.hidden_file(".yaydeps", "other", "");

        let manifest = TargetManifest::discover(&target.path);
        assert!(manifest.hook_script.is_some());
        assert!(manifest.deps_file.is_none());
        assert!(manifest.key_script.is_none());
    }

    #[test]
    fn test_dependency_hook_failure_attributed_to_dependency() {
        let fx = Fixture::new();
        let target = fx.package("alpha");
        fx.package("dep-d");
        fx.hidden_file(".yaydeps", "alpha", "dep-d\n");
        fx.hidden_file(".hook", "dep-d", "#!/bin/sh\n");
        let runner = ScriptedRunner::with_codes(&[("hook:dep-d", 3)]);

        let ledger = BuildExecutor::new(&runner, quiet_options()).run(&[target]);

        assert_eq!(ledger.failures.len(), 1);
        assert_eq!(ledger.failures[0].failing_dependency.as_deref(), Some("dep-d"));
        assert_eq!(ledger.failures[0].exit_code, 3);
        assert_eq!(
            ledger.failures[0].summary(),
            "alpha(dependency)[dep-d](3)"
        );
    }
}
