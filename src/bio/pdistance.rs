//! Pairwise p-distance between the query and each reference genome.
//!
//! The query is globally aligned to every reference with BLASTN-like
//! scoring and the proportion of mismatching aligned columns is taken
//! as the distance.

use crate::config::Thresholds;
use crate::io::SequenceRecord;
use bio::alignment::pairwise::Aligner;
use bio::alignment::AlignmentOperation;
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

const MATCH_SCORE: i32 = 2;
const MISMATCH_SCORE: i32 = -3;
// A gap of length k scores GAP_OPEN + k * GAP_EXTEND, i.e. -7 for the first position.
const GAP_OPEN: i32 = -5;
const GAP_EXTEND: i32 = -2;

fn blastn_score(a: u8, b: u8) -> i32 {
    if a == b {
        MATCH_SCORE
    } else {
        MISMATCH_SCORE
    }
}

/// Column counts of a global alignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlignmentCounts {
    pub mismatches: usize,
    pub columns: usize,
}

impl AlignmentCounts {
    fn from_operations(operations: &[AlignmentOperation]) -> Self {
        let mut counts = AlignmentCounts::default();
        for op in operations {
            match op {
                AlignmentOperation::Match => counts.columns += 1,
                AlignmentOperation::Subst => {
                    counts.columns += 1;
                    counts.mismatches += 1;
                }
                AlignmentOperation::Del | AlignmentOperation::Ins => counts.columns += 1,
                AlignmentOperation::Xclip(n) | AlignmentOperation::Yclip(n) => counts.columns += n,
            }
        }
        counts
    }

    /// Mismatches over aligned columns; gaps only widen the denominator.
    pub fn p_distance(&self) -> f64 {
        if self.columns == 0 {
            return f64::NAN;
        }
        self.mismatches as f64 / self.columns as f64
    }
}

/// Aligns two sequences end to end and counts mismatching columns.
pub fn align_counts(x: &[u8], y: &[u8]) -> AlignmentCounts {
    if x.is_empty() || y.is_empty() {
        // Only gap columns are possible.
        return AlignmentCounts {
            mismatches: 0,
            columns: x.len().max(y.len()),
        };
    }
    let mut aligner = Aligner::with_capacity(x.len(), y.len(), GAP_OPEN, GAP_EXTEND, blastn_score);
    let alignment = aligner.global(x, y);
    AlignmentCounts::from_operations(&alignment.operations)
}

pub fn p_distance(x: &[u8], y: &[u8]) -> f64 {
    align_counts(x, y).p_distance()
}

/// Where the closest p-distance falls relative to the panel cutoffs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CutoffBand {
    WithinSubtype,
    NovelSubtype,
    BeyondClade,
}

impl CutoffBand {
    pub fn classify(distance: Option<f64>, thresholds: &Thresholds) -> Self {
        match distance {
            Some(d) if d <= thresholds.subtype_p_distance => CutoffBand::WithinSubtype,
            Some(d) if d <= thresholds.clade_p_distance => CutoffBand::NovelSubtype,
            _ => CutoffBand::BeyondClade,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            CutoffBand::WithinSubtype => {
                "Distance is within subtype cutoff range. Proceeding to ML subtype inference..."
            }
            CutoffBand::NovelSubtype => {
                "P-distance to closest reference is greater than subtype cutoff. This sequence may belong to a novel subtype. Proceeding to ML subtype inference..."
            }
            CutoffBand::BeyondClade => {
                "P-distance to closest reference is greater than clade cutoff. Please make sure this sequence belongs to rat hepatitis E. Proceeding to ML subtype inference..."
            }
        }
    }
}

impl fmt::Display for CutoffBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CutoffBand::WithinSubtype => "within subtype cutoff",
            CutoffBand::NovelSubtype => "above subtype cutoff",
            CutoffBand::BeyondClade => "above clade cutoff",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceDistance {
    pub reference_id: String,
    pub distance: f64,
}

/// Result of comparing the query against the whole reference panel.
#[derive(Debug, Clone)]
pub struct PDistanceScan {
    pub query_id: String,
    /// One entry per reference, in file order.
    pub distances: Vec<ReferenceDistance>,
    pub closest: Option<ReferenceDistance>,
    pub band: CutoffBand,
}

impl PDistanceScan {
    pub fn below_cutoff(&self) -> bool {
        self.band == CutoffBand::WithinSubtype
    }
}

/// Compares the query against every reference.
///
/// The closest reference is the first one whose distance is strictly
/// smaller than all before it, so ties resolve to file order and NaN
/// distances never win.
///
/// # Arguments
///
/// * `query` - Query genome
/// * `references` - Reference genomes in file order
/// * `thresholds` - Cutoffs used to classify the minimum distance
///
/// # Returns
///
/// * `PDistanceScan` - Every distance, the closest reference and its cutoff band
pub fn scan_references(
    query: &SequenceRecord,
    references: &[SequenceRecord],
    thresholds: &Thresholds,
) -> PDistanceScan {
    info!(
        "Comparing {} ({} nt) to {} reference sequences...",
        query.id,
        query.len(),
        references.len()
    );

    let distances: Vec<ReferenceDistance> = references
        .par_iter()
        .map(|reference| {
            let distance = p_distance(&query.sequence, &reference.sequence);
            debug!("{} vs {}: p-distance = {:.4}", query.id, reference.id, distance);
            ReferenceDistance {
                reference_id: reference.id.clone(),
                distance,
            }
        })
        .collect();

    let total = distances.len();
    let mut closest: Option<&ReferenceDistance> = None;
    for (index, entry) in distances.iter().enumerate() {
        let best = closest.map_or(f64::INFINITY, |c| c.distance);
        if entry.distance < best {
            info!(
                "New closest reference sequence: {}, p-distance = {:.4}",
                entry.reference_id, entry.distance
            );
            closest = Some(entry);
        }
        debug!(
            "Progress: {:.2}% ({}/{})",
            (index + 1) as f64 / total as f64 * 100.0,
            index + 1,
            total
        );
    }

    let closest = closest.cloned();
    let band = CutoffBand::classify(closest.as_ref().map(|c| c.distance), thresholds);
    PDistanceScan {
        query_id: query.id.clone(),
        distances,
        closest,
        band,
    }
}
