//! Phylogenetic tree handling: Newick parsing and patristic distances.

pub mod newick;
pub mod patristic;

pub use newick::{NewickError, Tree};
pub use patristic::{patristic_distances, PatristicDistance, TaxonNotFound};
