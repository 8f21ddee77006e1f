//! Reference annotation handling.
//!
//! The annotation table maps every reference genome in the tree to its
//! clade and subtype. It is a CSV file with at least the columns
//! `Name`, `Clade` and `Subtype`; any other column is ignored.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnnotationError {
    #[error("File '{0}' does not exist.")]
    Missing(PathBuf),

    #[error("Annotation CSV '{path}' is missing the '{column}' column")]
    MissingColumn { path: PathBuf, column: &'static str },

    #[error("Failed to read annotation CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Clade and subtype of one reference genome.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Annotation {
    pub clade: String,
    pub subtype: String,
}

/// Reference annotations keyed by genome name, in file order.
#[derive(Debug, Clone, Default)]
pub struct ReferenceAnnotations {
    entries: IndexMap<String, Annotation>,
}

impl ReferenceAnnotations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the annotation of a reference.
    pub fn insert(&mut self, name: &str, clade: &str, subtype: &str) {
        self.entries.insert(
            name.to_string(),
            Annotation {
                clade: clade.to_string(),
                subtype: subtype.to_string(),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&Annotation> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn find_column(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}').trim() == name)
}

/// Loads the annotation table from a CSV file.
///
/// # Arguments
///
/// * `path` - CSV with `Name`, `Clade` and `Subtype` columns
///
/// # Returns
///
/// * `Result<ReferenceAnnotations, AnnotationError>` - Annotations keyed by reference name
pub fn load_annotations(path: impl AsRef<Path>) -> Result<ReferenceAnnotations, AnnotationError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(AnnotationError::Missing(path.to_path_buf()));
    }
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = rdr.headers()?.clone();

    let column = |column: &'static str| {
        find_column(&headers, column).ok_or_else(|| AnnotationError::MissingColumn {
            path: path.to_path_buf(),
            column,
        })
    };
    let name_col = column("Name")?;
    let clade_col = column("Clade")?;
    let subtype_col = column("Subtype")?;

    let mut annotations = ReferenceAnnotations::new();
    for result in rdr.records() {
        let record = result?;
        let field = |i: usize| record.get(i).unwrap_or("").trim();
        let name = field(name_col);
        if name.is_empty() {
            log::warn!("Skipping annotation row with empty name.");
            continue;
        }
        if annotations.get(name).is_some() {
            log::warn!("Reference '{}' is annotated more than once; keeping the last row.", name);
        }
        annotations.insert(name, field(clade_col), field(subtype_col));
    }

    if annotations.is_empty() {
        log::warn!("No reference annotations found in {}", path.display());
    }
    log::info!(
        "Loaded {} reference annotations from {}",
        annotations.len(),
        path.display()
    );
    Ok(annotations)
}
