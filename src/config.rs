//! Reference panel configuration.
//!
//! Everything the pipeline needs besides the query: where the reference
//! panel lives, which external tools to call and the distance cutoffs.
//! Values come from defaults, an optional TOML file, then CLI overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Cutoffs calibrated on the rat hepatitis E reference panel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Largest p-distance still inside a known subtype.
    pub subtype_p_distance: f64,
    /// Largest p-distance still inside the clade.
    pub clade_p_distance: f64,
    /// Patristic distances strictly below this count as subtype neighbours.
    pub ml_patristic: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            subtype_p_distance: 0.1833,
            clade_p_distance: 0.2145,
            ml_patristic: 0.5585,
        }
    }
}

/// External programs used to graft the query onto the reference tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub mafft: String,
    pub iqtree: String,
    /// IQ-TREE substitution model.
    pub model: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        ToolConfig {
            mafft: "mafft".to_string(),
            iqtree: "iqtree2".to_string(),
            model: "GTR+F+G4".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    pub reference_genomes: PathBuf,
    pub reference_alignment: PathBuf,
    pub reference_tree: PathBuf,
    pub reference_subtypes: PathBuf,
    pub output_dir: PathBuf,
    pub tools: ToolConfig,
    pub thresholds: Thresholds,
}

impl Default for PanelConfig {
    fn default() -> Self {
        PanelConfig {
            reference_genomes: PathBuf::from("reference_genomes.fa"),
            reference_alignment: PathBuf::from("reference_alignment.fa"),
            reference_tree: PathBuf::from("reference_tree.tree"),
            reference_subtypes: PathBuf::from("reference_subtypes.csv"),
            output_dir: PathBuf::from("output"),
            tools: ToolConfig::default(),
            thresholds: Thresholds::default(),
        }
    }
}

impl PanelConfig {
    /// Loads a TOML panel description. Keys left out keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: PanelConfig = toml::from_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, or the given file when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        if !(t.subtype_p_distance <= t.clade_p_distance) {
            anyhow::bail!(
                "subtype p-distance cutoff ({}) must not exceed the clade cutoff ({})",
                t.subtype_p_distance,
                t.clade_p_distance
            );
        }
        if !(t.ml_patristic > 0.0) {
            anyhow::bail!("ML patristic threshold must be positive, got {}", t.ml_patristic);
        }
        Ok(())
    }
}
