//! Functions specifically for reading FASTA files.
//!
//! Leverages the `needletail` crate for parsing, which handles
//! gzip/bzip2/xz/zstd compressed input transparently.

use log::{debug, info};
use needletail::parse_fastx_file;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SequenceError {
    #[error("File '{0}' does not exist.")]
    Missing(PathBuf),

    #[error("Failed to parse '{path}': {message}")]
    Parse { path: PathBuf, message: String },

    #[error("No sequence records found in '{0}'")]
    Empty(PathBuf),
}

/// An owned sequence record.
///
/// `id` is the first whitespace-delimited token of the header line, the
/// sequence is upper-cased with line breaks removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceRecord {
    pub id: String,
    pub sequence: Vec<u8>,
}

impl SequenceRecord {
    pub fn new(id: impl Into<String>, sequence: &[u8]) -> Self {
        SequenceRecord {
            id: id.into(),
            sequence: sequence.to_ascii_uppercase(),
        }
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }
}

fn header_id(header: &[u8]) -> String {
    let header = String::from_utf8_lossy(header);
    header.split_whitespace().next().unwrap_or_default().to_string()
}

fn open_error(path: &Path, err: impl std::fmt::Display) -> SequenceError {
    SequenceError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Reads every record of a FASTA file, stopping after `limit` records if given.
fn read_limited(path: &Path, limit: Option<usize>) -> Result<Vec<SequenceRecord>, SequenceError> {
    if !path.is_file() {
        return Err(SequenceError::Missing(path.to_path_buf()));
    }

    let mut reader = parse_fastx_file(path).map_err(|e| open_error(path, e))?;
    let mut records = Vec::new();
    while let Some(record) = reader.next() {
        let record = record.map_err(|e| open_error(path, e))?;
        records.push(SequenceRecord::new(header_id(record.id()), &record.seq()));
        if limit.is_some_and(|n| records.len() >= n) {
            break;
        }
    }

    if records.is_empty() {
        return Err(SequenceError::Empty(path.to_path_buf()));
    }
    debug!("Read {} record(s) from {}", records.len(), path.display());
    Ok(records)
}

/// Reads all sequence records from a FASTA file.
pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<SequenceRecord>, SequenceError> {
    let path = path.as_ref();
    let records = read_limited(path, None)?;
    info!("Loaded {} sequences from {}", records.len(), path.display());
    Ok(records)
}

/// Reads only the first record; the query files carry a single genome.
pub fn read_first_record(path: impl AsRef<Path>) -> Result<SequenceRecord, SequenceError> {
    let path = path.as_ref();
    read_limited(path, Some(1))?
        .into_iter()
        .next()
        .ok_or_else(|| SequenceError::Empty(path.to_path_buf()))
}
