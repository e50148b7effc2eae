// src/database/mod.rs

//! Repository database reader
//!
//! Pacman repository databases are compressed tar archives whose `desc`
//! entries carry `%FIELD%` marker lines, each immediately followed by its
//! value line. Only `%NAME%` and `%VERSION%` matter here, so the reader
//! does not unpack the archive: it decompresses the stream and scans it
//! line-wise, skipping tar framing and unrelated fields. This reproduces
//! how the repositories this tool maintains have always been read.
//!
//! The scanner is strict about the marker/value pairing: a recognized
//! marker arriving while a value is still pending means the database is
//! corrupt, and the whole read fails; no partial mapping is returned.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::Path;
use tracing::debug;

const NAME_MARKER: &[u8] = b"%NAME%";
const VERSION_MARKER: &[u8] = b"%VERSION%";

/// Compression wrapping of the database file, detected from magic bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    None,
    Gzip,
    Xz,
    Zstd,
}

impl CompressionFormat {
    /// Detect from leading magic bytes
    ///
    /// - Gzip: `1f 8b`
    /// - XZ: `fd 37 7a 58 5a 00`
    /// - Zstd: `28 b5 2f fd`
    pub fn from_magic_bytes(data: &[u8]) -> Self {
        if data.starts_with(&[0x1f, 0x8b]) {
            Self::Gzip
        } else if data.starts_with(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]) {
            Self::Xz
        } else if data.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
            Self::Zstd
        } else {
            Self::None
        }
    }
}

/// Create a decompressing reader for the detected format
fn create_decoder<'a, R: Read + 'a>(
    reader: R,
    format: CompressionFormat,
) -> Result<Box<dyn Read + 'a>> {
    match format {
        CompressionFormat::None => Ok(Box::new(reader)),
        CompressionFormat::Gzip => Ok(Box::new(flate2::read::GzDecoder::new(reader))),
        CompressionFormat::Xz => Ok(Box::new(xz2::read::XzDecoder::new(reader))),
        CompressionFormat::Zstd => {
            let decoder = zstd::Decoder::new(reader)
                .map_err(|e| Error::IoError(format!("failed to create zstd decoder: {e}")))?;
            Ok(Box::new(decoder))
        }
    }
}

/// Scanner expectation between lines
enum ScanState {
    AwaitingMarker,
    AwaitingName,
    AwaitingVersion,
}

/// Read a repository database file into a `name -> version` mapping
///
/// Duplicate names are last-write-wins; well-formed databases have unique
/// names, so this only matters for violated inputs.
pub fn read_database(path: &Path) -> Result<HashMap<String, String>> {
    let data = fs::read(path)
        .map_err(|e| Error::IoError(format!("failed to read {}: {e}", path.display())))?;
    let format = CompressionFormat::from_magic_bytes(&data);
    debug!("Reading database {} ({:?})", path.display(), format);

    let mut decoder = create_decoder(data.as_slice(), format)?;
    let mut raw = Vec::new();
    decoder
        .read_to_end(&mut raw)
        .map_err(|e| Error::IoError(format!("failed to decompress {}: {e}", path.display())))?;

    scan_records(&raw)
}

/// Line-scan decompressed database bytes with the two-state marker/value
/// automaton
fn scan_records(raw: &[u8]) -> Result<HashMap<String, String>> {
    let mut packages = HashMap::new();
    let mut state = ScanState::AwaitingMarker;
    let mut pending_name = String::new();

    for line in raw.split(|&b| b == b'\n') {
        let line = line.trim_ascii();

        if line == NAME_MARKER || line == VERSION_MARKER {
            if !matches!(state, ScanState::AwaitingMarker) {
                return Err(Error::CorruptDatabase(format!(
                    "marker {} while a value was still pending",
                    String::from_utf8_lossy(line)
                )));
            }
            state = if line == NAME_MARKER {
                ScanState::AwaitingName
            } else {
                ScanState::AwaitingVersion
            };
            continue;
        }

        match state {
            // Tar framing, other %FIELD% sections, and their values.
            ScanState::AwaitingMarker => {}
            ScanState::AwaitingName => {
                pending_name = String::from_utf8_lossy(line).into_owned();
                state = ScanState::AwaitingMarker;
            }
            ScanState::AwaitingVersion => {
                if pending_name.is_empty() {
                    return Err(Error::CorruptDatabase(
                        "version record with no preceding name".to_string(),
                    ));
                }
                let version = String::from_utf8_lossy(line).into_owned();
                packages.insert(std::mem::take(&mut pending_name), version);
                state = ScanState::AwaitingMarker;
            }
        }
    }

    if !matches!(state, ScanState::AwaitingMarker) {
        return Err(Error::CorruptDatabase(
            "database truncated while awaiting a value".to_string(),
        ));
    }

    debug!("Database contains {} packages", packages.len());
    Ok(packages)
}
