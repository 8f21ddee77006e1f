//! Result reports: console verdicts, the JSON files each stage leaves in
//! the output directory, and the summary rendered from those files.

use super::placement::TreeReport;
use super::subtype::{Assignment, SubtypeInference};
use crate::bio::{CutoffBand, PDistanceScan};
use crate::io::{read_json, write_distance_listing, write_json};
use anyhow::Result;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const P_DISTANCE_REPORT: &str = "p_distance_output.json";
pub const P_DISTANCE_LISTING: &str = "p_distances.txt";
pub const TREE_REPORT: &str = "ml_tree_output.json";
pub const SUBTYPE_REPORT: &str = "subtype_output.json";
pub const PATRISTIC_LISTING: &str = "patristic_distances.txt";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PDistanceReport {
    pub closest_reference: Option<String>,
    pub p_distance: Option<f64>,
    pub below_cutoff: bool,
}

impl From<&PDistanceScan> for PDistanceReport {
    fn from(scan: &PDistanceScan) -> Self {
        PDistanceReport {
            closest_reference: scan.closest.as_ref().map(|c| c.reference_id.clone()),
            p_distance: scan.closest.as_ref().map(|c| c.distance),
            below_cutoff: scan.below_cutoff(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictingTaxon {
    pub taxon: String,
    pub clade: String,
    pub subtype: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConflictSummary {
    pub conflicting_taxa: Vec<ConflictingTaxon>,
    pub clades: Vec<String>,
    pub subtypes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtypeReport {
    pub closest_reference_ml: Option<String>,
    pub ml_distance: Option<f64>,
    pub conflicts: bool,
    pub conflict_summary: ConflictSummary,
    pub subtype_assignment: String,
}

impl From<&SubtypeInference> for SubtypeReport {
    fn from(inference: &SubtypeInference) -> Self {
        let conflicts = inference.assignment.is_conflicting();
        let conflicting_taxa = inference
            .conflicting_hits()
            .into_iter()
            .map(|(hit, a)| ConflictingTaxon {
                taxon: hit.label.clone(),
                clade: a.clade.clone(),
                subtype: a.subtype.clone(),
            })
            .collect();
        let subtype_assignment = match inference.assignment.annotation() {
            Some(a) => format!("Clade={}, Subtype={}", a.clade, a.subtype),
            None => "Clade=Unknown, Subtype=Unknown".to_string(),
        };

        SubtypeReport {
            closest_reference_ml: inference.closest().map(|hit| hit.label.clone()),
            ml_distance: inference.closest().map(|hit| hit.distance),
            conflicts,
            conflict_summary: ConflictSummary {
                conflicting_taxa,
                clades: inference.clades(),
                subtypes: inference.subtypes(),
            },
            subtype_assignment,
        }
    }
}

/// The three stage reports of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub p_distance: PDistanceReport,
    pub ml_tree: TreeReport,
    pub subtype: SubtypeReport,
}

impl RunSummary {
    pub fn load(output_dir: &Path) -> Result<Self> {
        Ok(RunSummary {
            p_distance: read_json(&output_dir.join(P_DISTANCE_REPORT))?,
            ml_tree: read_json(&output_dir.join(TREE_REPORT))?,
            subtype: read_json(&output_dir.join(SUBTYPE_REPORT))?,
        })
    }

    /// Numbered results list.
    pub fn render(&self) -> String {
        let or_none = |value: &Option<String>| value.clone().unwrap_or_else(|| "None".to_string());
        [
            format!(
                "1. Closest reference by p-distance: {}",
                or_none(&self.p_distance.closest_reference)
            ),
            format!("2. p-distance below cutoff: {}", self.p_distance.below_cutoff),
            format!(
                "3. Closest reference by ML patristic distance: {}",
                or_none(&self.subtype.closest_reference_ml)
            ),
            format!("4. Conflicts in subtype assignment: {}", self.subtype.conflicts),
            format!(
                "5. Subtype assignment using ML patristic distance: {}",
                self.subtype.subtype_assignment
            ),
        ]
        .join("\n")
    }
}

/// Writes the p-distance JSON report and the per-reference listing.
pub fn write_pdistance_outputs(scan: &PDistanceScan, output_dir: &Path) -> Result<PDistanceReport> {
    let report = PDistanceReport::from(scan);
    write_json(&report, &output_dir.join(P_DISTANCE_REPORT))?;
    write_distance_listing(
        None,
        scan.distances
            .iter()
            .map(|d| (d.reference_id.as_str(), d.distance)),
        &output_dir.join(P_DISTANCE_LISTING),
    )?;
    Ok(report)
}

pub fn write_tree_outputs(report: &TreeReport, output_dir: &Path) -> Result<()> {
    write_json(report, &output_dir.join(TREE_REPORT))
}

pub fn write_subtype_outputs(inference: &SubtypeInference, output_dir: &Path) -> Result<SubtypeReport> {
    let report = SubtypeReport::from(inference);
    write_json(&report, &output_dir.join(SUBTYPE_REPORT))?;
    let header = format!("Patristic Distances from {}:", inference.query_label);
    write_distance_listing(
        Some(header.as_str()),
        inference
            .distances
            .iter()
            .map(|d| (d.label.as_str(), d.distance)),
        &output_dir.join(PATRISTIC_LISTING),
    )?;
    Ok(report)
}

pub fn print_pdistance_verdict(scan: &PDistanceScan) {
    log::info!(
        "{}: {} ({} references compared)",
        scan.query_id,
        scan.band,
        scan.distances.len()
    );
    if let Some(closest) = &scan.closest {
        println!(
            "{}",
            format!(
                "Closest reference sequence is {}, p-distance = {:.4}",
                closest.reference_id, closest.distance
            )
            .green()
        );
    }
    match scan.band {
        CutoffBand::WithinSubtype => println!("{}", scan.band.message()),
        _ => println!("{}", scan.band.message().yellow()),
    }
}

pub fn print_subtype_verdict(inference: &SubtypeInference) {
    println!(
        "Distances under subtyping threshold ({})",
        inference.threshold
    );
    for hit in &inference.hits {
        match &hit.annotation {
            Some(a) => println!(
                "{}: Distance={:.4}, Clade={}, Subtype={}",
                hit.label, hit.distance, a.clade, a.subtype
            ),
            None => println!(
                "{}: Distance={:.4}, Not found in the CSV file.",
                hit.label, hit.distance
            ),
        }
    }

    match &inference.assignment {
        Assignment::Consistent(a) => println!(
            "{}",
            format!(
                "Inferred clade and subtype for '{}': Clade={}, Subtype={}",
                inference.query_label, a.clade, a.subtype
            )
            .green()
        ),
        Assignment::Conflicting(_) => println!(
            "{}",
            "Conflicting clade/subtype inferred. Cutoff thresholds may need to be updated. Please contact the authors."
                .yellow()
        ),
        Assignment::Unassigned => println!(
            "No clade and subtype could be inferred for '{}'. This query may belong to a novel subtype.",
            inference.query_label
        ),
    }

    match inference.closest() {
        Some(hit) => println!(
            "{}",
            format!(
                "Closest reference genome by ML patristic distance is {}",
                hit.label
            )
            .green()
        ),
        None => println!(
            "{}",
            "No reference genome under the distance threshold found.".red()
        ),
    }
}
