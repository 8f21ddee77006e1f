//! Subtype assignment by nearest neighbours in the grafted ML tree.

use super::PipelineError;
use crate::metadata::{load_annotations, Annotation, ReferenceAnnotations};
use crate::phylo::{patristic_distances, PatristicDistance, Tree};
use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use log::{debug, info};
use std::path::Path;

/// A reference within the patristic threshold of the query.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtypeHit {
    pub label: String,
    pub distance: f64,
    /// `None` when the reference is absent from the annotation table.
    pub annotation: Option<Annotation>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    /// Every annotated neighbour agrees.
    Consistent(Annotation),
    /// Neighbours disagree; carries the most common clade and subtype.
    Conflicting(Annotation),
    /// No annotated reference under the threshold.
    Unassigned,
}

impl Assignment {
    pub fn annotation(&self) -> Option<&Annotation> {
        match self {
            Assignment::Consistent(a) | Assignment::Conflicting(a) => Some(a),
            Assignment::Unassigned => None,
        }
    }

    pub fn is_conflicting(&self) -> bool {
        matches!(self, Assignment::Conflicting(_))
    }
}

#[derive(Debug, Clone)]
pub struct SubtypeInference {
    pub query_label: String,
    pub threshold: f64,
    /// Distances to every other taxon, ascending.
    pub distances: Vec<PatristicDistance>,
    /// Taxa strictly under the threshold, ascending.
    pub hits: Vec<SubtypeHit>,
    pub assignment: Assignment,
}

impl SubtypeInference {
    /// Nearest reference under the threshold, annotated or not.
    pub fn closest(&self) -> Option<&SubtypeHit> {
        self.hits.first()
    }

    pub fn annotated_hits(&self) -> impl Iterator<Item = (&SubtypeHit, &Annotation)> {
        self.hits
            .iter()
            .filter_map(|hit| hit.annotation.as_ref().map(|a| (hit, a)))
    }

    /// Annotated hits met once the neighbours seen so far disagree on clade
    /// or subtype, in order of distance. Hits before the first disagreement
    /// are not listed.
    pub fn conflicting_hits(&self) -> Vec<(&SubtypeHit, &Annotation)> {
        let mut clades: IndexSet<&str> = IndexSet::new();
        let mut subtypes: IndexSet<&str> = IndexSet::new();
        let mut conflicting = Vec::new();
        for (hit, annotation) in self.annotated_hits() {
            clades.insert(annotation.clade.as_str());
            subtypes.insert(annotation.subtype.as_str());
            if clades.len() > 1 || subtypes.len() > 1 {
                conflicting.push((hit, annotation));
            }
        }
        conflicting
    }

    /// Distinct clades among annotated hits, in order of distance.
    pub fn clades(&self) -> Vec<String> {
        self.annotated_hits()
            .map(|(_, a)| a.clade.clone())
            .unique()
            .collect()
    }

    pub fn subtypes(&self) -> Vec<String> {
        self.annotated_hits()
            .map(|(_, a)| a.subtype.clone())
            .unique()
            .collect()
    }
}

/// Most frequent value; among equally frequent values the first seen wins.
fn most_common<'a>(values: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut counts: IndexMap<&str, usize> = IndexMap::new();
    for value in values {
        *counts.entry(value).or_insert(0) += 1;
    }
    let mut best: Option<(&str, usize)> = None;
    for (value, count) in counts {
        if best.map_or(true, |(_, n)| count > n) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value.to_string())
}

/// Assigns clade and subtype from patristic distances to the query.
pub fn infer_subtype(
    query_label: &str,
    mut distances: Vec<PatristicDistance>,
    annotations: &ReferenceAnnotations,
    threshold: f64,
) -> SubtypeInference {
    // stable: equal distances keep tree order
    distances.sort_by(|a, b| a.distance.total_cmp(&b.distance));

    let hits: Vec<SubtypeHit> = distances
        .iter()
        .filter(|d| d.distance < threshold)
        .map(|d| SubtypeHit {
            label: d.label.clone(),
            distance: d.distance,
            annotation: annotations.get(&d.label).cloned(),
        })
        .collect();
    info!(
        "{} of {} taxa within patristic distance {} of {}",
        hits.len(),
        distances.len(),
        threshold,
        query_label
    );

    let annotated: Vec<&Annotation> = hits.iter().filter_map(|h| h.annotation.as_ref()).collect();
    let assignment = match (
        most_common(annotated.iter().map(|a| a.clade.as_str())),
        most_common(annotated.iter().map(|a| a.subtype.as_str())),
    ) {
        (Some(clade), Some(subtype)) => {
            let consistent = annotated.iter().all(|a| a.clade == clade && a.subtype == subtype);
            let annotation = Annotation { clade, subtype };
            if consistent {
                Assignment::Consistent(annotation)
            } else {
                Assignment::Conflicting(annotation)
            }
        }
        _ => Assignment::Unassigned,
    };

    SubtypeInference {
        query_label: query_label.to_string(),
        threshold,
        distances,
        hits,
        assignment,
    }
}

/// Loads the grafted tree and annotation table and assigns the query.
///
/// # Arguments
///
/// * `treefile` - Newick tree containing the query and the references
/// * `query_label` - Taxon label of the query in the tree
/// * `annotation_csv` - Reference annotation table
/// * `threshold` - Patristic distance below which a reference is a neighbour
///
/// # Returns
///
/// * `Result<SubtypeInference, PipelineError>` - Neighbours and the assignment, or the first error
pub fn infer_subtype_from_files(
    treefile: &Path,
    query_label: &str,
    annotation_csv: &Path,
    threshold: f64,
) -> Result<SubtypeInference, PipelineError> {
    if !treefile.is_file() {
        return Err(PipelineError::MissingOutput(treefile.to_path_buf()));
    }
    let annotations = load_annotations(annotation_csv)?;
    let tree = Tree::from_file(treefile)?;
    debug!("{} has {} taxa", treefile.display(), tree.taxa().len());
    debug!("Grafted tree: {}", tree);
    let distances = patristic_distances(&tree, query_label)?;
    Ok(infer_subtype(query_label, distances, &annotations, threshold))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const THRESHOLD: f64 = 0.5585;

    fn distances(items: &[(&str, f64)]) -> Vec<PatristicDistance> {
        items
            .iter()
            .map(|(label, distance)| PatristicDistance {
                label: label.to_string(),
                distance: *distance,
            })
            .collect()
    }

    fn annotations() -> ReferenceAnnotations {
        let mut annotations = ReferenceAnnotations::new();
        annotations.insert("R1", "C1", "a");
        annotations.insert("R2", "C1", "a");
        annotations.insert("R3", "C1", "b");
        annotations.insert("R4", "C2", "a");
        annotations
    }

    #[test]
    fn test_consistent_neighbours() {
        let inference = infer_subtype(
            "query",
            distances(&[("R4", 0.9), ("R2", 0.2), ("R1", 0.1)]),
            &annotations(),
            THRESHOLD,
        );

        assert_eq!(inference.hits.len(), 2);
        assert_eq!(inference.closest().unwrap().label, "R1");
        assert_eq!(inference.distances[2].label, "R4");
        assert_eq!(
            inference.assignment,
            Assignment::Consistent(Annotation {
                clade: "C1".to_string(),
                subtype: "a".to_string()
            })
        );
    }

    #[test]
    fn test_conflicting_neighbours_report_most_common() {
        let inference = infer_subtype(
            "query",
            distances(&[("R3", 0.05), ("R1", 0.1), ("R2", 0.2), ("R4", 0.3)]),
            &annotations(),
            THRESHOLD,
        );

        assert!(inference.assignment.is_conflicting());
        let annotation = inference.assignment.annotation().unwrap();
        assert_eq!(annotation.clade, "C1");
        assert_eq!(annotation.subtype, "a");
        assert_eq!(inference.clades(), vec!["C1", "C2"]);
        assert_eq!(inference.subtypes(), vec!["b", "a"]);
    }

    #[test]
    fn test_conflicting_hits_start_at_first_disagreement() {
        let mut annotations = ReferenceAnnotations::new();
        annotations.insert("R1", "C1", "a");
        annotations.insert("R2", "C1", "a");
        annotations.insert("R3", "C2", "b");
        annotations.insert("R4", "C1", "a");
        let inference = infer_subtype(
            "query",
            distances(&[("R3", 0.3), ("R2", 0.2), ("R4", 0.4), ("R1", 0.1)]),
            &annotations,
            THRESHOLD,
        );

        let labels: Vec<&str> = inference
            .conflicting_hits()
            .iter()
            .map(|(hit, _)| hit.label.as_str())
            .collect();
        assert_eq!(labels, vec!["R3", "R4"]);
    }

    #[test]
    fn test_consistent_neighbours_have_no_conflicting_hits() {
        let inference = infer_subtype(
            "query",
            distances(&[("R2", 0.2), ("R1", 0.1)]),
            &annotations(),
            THRESHOLD,
        );
        assert!(inference.conflicting_hits().is_empty());
    }

    #[test]
    fn test_equal_distances_keep_tree_order() {
        let mut annotations = ReferenceAnnotations::new();
        annotations.insert("Zeta", "C1", "a");
        annotations.insert("Alpha", "C2", "b");
        let inference = infer_subtype(
            "query",
            distances(&[("Zeta", 0.2), ("Mid", 0.1), ("Alpha", 0.2), ("Beta", 0.2)]),
            &annotations,
            THRESHOLD,
        );

        let order: Vec<&str> = inference.hits.iter().map(|h| h.label.as_str()).collect();
        assert_eq!(order, vec!["Mid", "Zeta", "Alpha", "Beta"]);
        assert_eq!(inference.clades(), vec!["C1", "C2"]);
        assert_eq!(inference.assignment.annotation().unwrap().clade, "C1");
    }

    #[test]
    fn test_most_common_ties_go_to_first_seen() {
        assert_eq!(most_common(["b", "a", "a", "b"].into_iter()), Some("b".to_string()));
        assert_eq!(most_common(std::iter::empty()), None);
    }

    #[test]
    fn test_threshold_is_strict_and_unannotated_hits_count_as_closest() {
        let inference = infer_subtype(
            "query",
            distances(&[("unknown", 0.01), ("R1", THRESHOLD)]),
            &annotations(),
            THRESHOLD,
        );

        assert_eq!(inference.hits.len(), 1);
        assert_eq!(inference.closest().unwrap().label, "unknown");
        assert!(inference.closest().unwrap().annotation.is_none());
        assert_eq!(inference.assignment, Assignment::Unassigned);
    }

    #[test]
    fn test_nothing_under_threshold() {
        let inference = infer_subtype("query", distances(&[("R1", 2.0)]), &annotations(), THRESHOLD);
        assert!(inference.closest().is_none());
        assert_eq!(inference.assignment, Assignment::Unassigned);
    }

    #[test]
    fn test_infer_from_files() {
        let dir = tempdir().unwrap();
        let tree = dir.path().join("grafted.treefile");
        let csv = dir.path().join("reference_subtypes.csv");
        fs::write(&tree, "(R1:0.05,R4:0.8,(query:0.01,R2:0.02)100:0.03);\n").unwrap();
        fs::write(&csv, "Name,Clade,Subtype\nR1,C1,a\nR2,C1,a\nR4,C2,a\n").unwrap();

        let inference = infer_subtype_from_files(&tree, "query", &csv, THRESHOLD).unwrap();
        assert_eq!(inference.closest().unwrap().label, "R2");
        assert_eq!(inference.hits.len(), 2);
        assert_eq!(inference.assignment.annotation().unwrap().subtype, "a");
        assert!(!inference.assignment.is_conflicting());

        let missing = infer_subtype_from_files(&tree, "absent", &csv, THRESHOLD);
        assert!(matches!(missing, Err(PipelineError::Taxon(_))));
    }
}
