// src/main.rs

use anyhow::Result;
use clap::{Parser, Subcommand};
use repoforge::config::{detect_host_arch, BuildEnv, CiContext, PKGBUILD_DIRECTORY_BASE};
use repoforge::database::read_database;
use repoforge::probe::classify_dependencies;
use repoforge::report::RunReporter;
use repoforge::resolve::{resolve_targets, scan_local_packages};
use repoforge::update::{check_updates, pull_tracked, GitPuller, UpdateStatus};
use repoforge::{
    AurProbe, BuildExecutor, ExecutorOptions, OverridePolicy, ProberConfig, SystemToolRunner,
};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "repoforge")]
#[command(author, version, about = "CI build orchestrator for a pacman package repository", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve outdated package definitions and build them
    Build {
        /// Path to the published repository database file
        db_file: PathBuf,
        /// Directory of package definitions
        #[arg(long, default_value = PKGBUILD_DIRECTORY_BASE)]
        repo_dir: PathBuf,
        /// Build every definition regardless of published versions
        #[arg(long)]
        build_all: bool,
        /// Build only the named definitions (repeatable)
        #[arg(long)]
        target: Vec<String>,
        /// Sign built packages even off the default branch
        #[arg(long)]
        sign: bool,
        /// Stop the run at the first failed target
        #[arg(long)]
        fail_fast: bool,
        /// Keep orphaned packages after each target
        #[arg(long)]
        disable_auto_remove: bool,
        /// Resolve and log targets without building or uploading
        #[arg(long)]
        dry_run: bool,
        /// Kill any build tool invocation after this many seconds
        #[arg(long)]
        tool_timeout: Option<u64>,
    },
    /// Print the published database as name/version pairs
    ShowDb {
        /// Path to the repository database file
        db_file: PathBuf,
    },
    /// Scan and print the local package definitions
    ShowLocal {
        /// Directory of package definitions
        #[arg(long, default_value = PKGBUILD_DIRECTORY_BASE)]
        repo_dir: PathBuf,
    },
    /// Classify a definition's dependencies against the AUR and write its
    /// hidden dependency list
    CheckDeps {
        /// Package definition directory
        pkg_dir: PathBuf,
        /// Maximum in-flight checks
        #[arg(long, default_value_t = 32)]
        max_workers: usize,
    },
    /// Compare local definitions against their AUR counterparts and pull
    /// tracked checkouts that have updates
    CheckUpdates {
        /// Directory of package definitions
        #[arg(long, default_value = PKGBUILD_DIRECTORY_BASE)]
        repo_dir: PathBuf,
        /// Maximum in-flight fetches
        #[arg(long, default_value_t = 32)]
        max_workers: usize,
        /// Report only; never pull tracked checkouts
        #[arg(long)]
        dry_run: bool,
    },
}

#[allow(clippy::too_many_arguments)]
fn run_build(
    db_file: PathBuf,
    repo_dir: PathBuf,
    build_all: bool,
    targets: Vec<String>,
    sign: bool,
    fail_fast: bool,
    disable_auto_remove: bool,
    dry_run: bool,
    tool_timeout: Option<u64>,
) -> Result<i32> {
    let ci = CiContext::from_env();
    let arch = detect_host_arch(&ci);
    let cwd = env::current_dir()?;
    let sign = sign || ci.sign_by_default();
    let build_env = BuildEnv::new(&cwd, arch.clone(), sign);

    let repo = read_database(&db_file)?;
    info!("Remote database has {} packages", repo.len());

    let locals = scan_local_packages(&repo_dir, &arch)?;
    info!("Scanned {} local definitions", locals.len());

    let policy = OverridePolicy::determine(
        &ci.build_override,
        build_all || ci.rebuild_all_requested(),
        &targets,
    );
    let resolved = resolve_targets(&repo, locals, &policy);
    info!("Resolved {} build targets", resolved.len());
    for target in &resolved {
        info!("  {target}");
    }

    let runner = SystemToolRunner::new(
        build_env.clone(),
        tool_timeout.map(Duration::from_secs),
    );
    let options = ExecutorOptions {
        fail_fast,
        auto_remove: !disable_auto_remove,
        dry_run,
        ..ExecutorOptions::default()
    };
    let ledger = BuildExecutor::new(&runner, options).run(&resolved);

    if dry_run {
        return Ok(0);
    }

    Ok(RunReporter::new(build_env).finalize(&ci, &ledger))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Build {
            db_file,
            repo_dir,
            build_all,
            target,
            sign,
            fail_fast,
            disable_auto_remove,
            dry_run,
            tool_timeout,
        } => run_build(
            db_file,
            repo_dir,
            build_all,
            target,
            sign,
            fail_fast,
            disable_auto_remove,
            dry_run,
            tool_timeout,
        )?,
        Commands::ShowDb { db_file } => {
            let repo = read_database(&db_file)?;
            let mut entries: Vec<_> = repo.into_iter().collect();
            entries.sort();
            for (name, version) in entries {
                println!("{name} {version}");
            }
            0
        }
        Commands::ShowLocal { repo_dir } => {
            let ci = CiContext::from_env();
            let arch = detect_host_arch(&ci);
            for pkg in scan_local_packages(&repo_dir, &arch)? {
                println!("{pkg}");
            }
            0
        }
        Commands::CheckDeps {
            pkg_dir,
            max_workers,
        } => {
            let probe = AurProbe::new()?;
            let config = ProberConfig {
                concurrency: max_workers,
                ..ProberConfig::default()
            };
            let written = classify_dependencies(&pkg_dir, &probe, &config)?;
            if written.is_empty() {
                println!("no upstream dependencies");
            } else {
                for dep in written {
                    println!("{dep}");
                }
            }
            0
        }
        Commands::CheckUpdates {
            repo_dir,
            max_workers,
            dry_run,
        } => {
            let source = AurProbe::new()?;
            let reports = check_updates(&repo_dir, &source, max_workers)?;
            for report in &reports {
                if report.status != UpdateStatus::UpToDate {
                    println!("{report}");
                }
            }
            if !dry_run {
                let pulled = pull_tracked(&reports, &GitPuller);
                if pulled > 0 {
                    info!("Pulled {pulled} tracked checkouts");
                }
            }
            0
        }
    };

    std::process::exit(code);
}
