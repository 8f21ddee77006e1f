//! Input/Output operations module.
//!
//! Handles reading sequence data (FASTA) and writing the JSON and
//! plain-text result files each pipeline stage leaves behind.

pub mod fasta; // Sub-module specifically for FASTA handling

pub use fasta::{read_first_record, read_records, SequenceError, SequenceRecord};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Writes a value as pretty-printed JSON.
///
/// # Arguments
///
/// * `value` - Report to serialise
/// * `output_path` - Destination file, replaced if it exists
pub fn write_json<T: Serialize>(value: &T, output_path: &Path) -> Result<()> {
    let file = File::create(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

/// Reads a JSON report written by [`write_json`].
pub fn read_json<T: DeserializeOwned>(input_path: &Path) -> Result<T> {
    let file = File::open(input_path)
        .with_context(|| format!("Failed to open {}", input_path.display()))?;
    let value = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to decode {}", input_path.display()))?;
    Ok(value)
}

/// Writes `label: distance` lines, the format of the per-reference distance listings.
pub fn write_distance_listing<'a, I>(
    header: Option<&str>,
    rows: I,
    output_path: &Path,
) -> Result<()>
where
    I: IntoIterator<Item = (&'a str, f64)>,
{
    let file = File::create(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;
    let mut writer = BufWriter::new(file);
    if let Some(header) = header {
        writeln!(writer, "{}", header)?;
    }
    for (label, distance) in rows {
        writeln!(writer, "{}: {}", label, distance)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::fs;
    use tempfile::tempdir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        value: Option<f64>,
    }

    #[test]
    fn test_json_report_survives_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");
        let sample = Sample {
            name: "RatHEV".to_string(),
            value: None,
        };

        write_json(&sample, &path).unwrap();
        let loaded: Sample = read_json(&path).unwrap();
        assert_eq!(loaded, sample);
    }

    #[test]
    fn test_write_distance_listing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("distances.txt");

        write_distance_listing(
            Some("Patristic Distances from q:"),
            vec![("A", 0.25), ("B", 1.0)],
            &path,
        )
        .unwrap();

        let content = fs::read_to_string(path).unwrap();
        assert_eq!(content, "Patristic Distances from q:\nA: 0.25\nB: 1\n");
    }
}
