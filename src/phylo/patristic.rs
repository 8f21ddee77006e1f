//! Patristic (path-length) distances between taxa of a tree.

use super::newick::{NodeId, Tree};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Taxon '{0}' not found in the tree.")]
pub struct TaxonNotFound(pub String);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatristicDistance {
    pub label: String,
    pub distance: f64,
}

/// Sum of branch lengths from `source` to every node of the tree.
/// Missing branch lengths count as zero.
fn path_lengths(tree: &Tree, source: NodeId) -> Vec<f64> {
    let mut distance = vec![f64::NAN; tree.len()];
    let mut visited = vec![false; tree.len()];
    let mut stack = vec![source];
    distance[source] = 0.0;
    visited[source] = true;

    while let Some(id) = stack.pop() {
        for (next, length) in tree.neighbours(id) {
            if !visited[next] {
                visited[next] = true;
                distance[next] = distance[id] + length;
                stack.push(next);
            }
        }
    }
    distance
}

/// Distances from the leaf `source` to every other labelled leaf, in leaf order.
pub fn distances_from(tree: &Tree, source: NodeId) -> Vec<PatristicDistance> {
    let lengths = path_lengths(tree, source);
    tree.leaves()
        .filter(|&id| id != source)
        .filter_map(|id| {
            tree.node(id).label.as_ref().map(|label| PatristicDistance {
                label: label.clone(),
                distance: lengths[id],
            })
        })
        .collect()
}

/// Distances from the taxon named `label` to all other taxa.
pub fn patristic_distances(
    tree: &Tree,
    label: &str,
) -> Result<Vec<PatristicDistance>, TaxonNotFound> {
    let source = tree
        .find_leaf(label)
        .ok_or_else(|| TaxonNotFound(label.to_string()))?;
    Ok(distances_from(tree, source))
}
