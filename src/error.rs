// src/error.rs

//! Central error type shared across repoforge modules

use std::io;
use thiserror::Error;

/// Errors produced by repoforge operations
#[derive(Error, Debug)]
pub enum Error {
    /// Package metadata is missing the mandatory pkgver field, or a field
    /// that must be numeric is not. Fatal to that one descriptor only.
    #[error("malformed version: {0}")]
    MalformedVersion(String),

    /// The repository database scanner hit an inconsistent marker/value
    /// sequence. Fatal to the whole read; no partial mapping is returned.
    #[error("corrupt repository database: {0}")]
    CorruptDatabase(String),

    /// A single availability probe ran out of retry attempts.
    #[error("availability probe for '{name}' exhausted after {attempts} attempts")]
    ProbeExhausted { name: String, attempts: u32 },

    /// Failed to launch an external tool.
    #[error("failed to spawn '{command}': {source}")]
    SpawnError {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("not found: {0}")]
    NotFoundError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::IoError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
