// src/lib.rs

//! Repoforge
//!
//! CI orchestrator for a self-hosted Arch package repository. One run
//! reads the published repository database, scans the local tree of
//! package definitions, resolves which definitions are newer than what
//! is published, builds them in order, and seals the run with a summary
//! and an upload.
//!
//! # Architecture
//!
//! - Read-only inputs first: database mapping and local scan are collected
//!   before anything mutates the host
//! - Target selection is a pure function of both snapshots and a policy
//! - Builds are strictly sequential; only network probes fan out
//! - External tools sit behind a trait so the orchestration is testable

pub mod config;
pub mod database;
mod error;
pub mod executor;
pub mod probe;
pub mod report;
pub mod resolve;
pub mod update;
pub mod version;

pub use error::{Error, Result};
pub use executor::{
    BuildExecutor, BuildOutcome, ExecutorOptions, RunLedger, SystemToolRunner, TargetManifest,
    ToolRunner,
};
pub use probe::{AurProbe, ExistenceProbe, ProbeOutcome, ProberConfig, ScriptSource};
pub use resolve::{LocalPackage, OverridePolicy};
pub use update::{UpdateReport, UpdateStatus};
pub use version::{ComparePolicy, PkgVersion};
