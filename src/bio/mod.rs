//! Bioinformatics utilities module.
//!
//! Sequence-level helpers and the pairwise p-distance scan.

pub mod pdistance;

pub use pdistance::{scan_references, CutoffBand, PDistanceScan};

/// Checks if a byte represents a valid DNA base (A, C, G, T).
/// Case-insensitive.
pub fn is_valid_base(base: u8) -> bool {
    matches!(base.to_ascii_uppercase(), b'A' | b'C' | b'G' | b'T')
}

/// Fraction of positions that are not one of A, C, G, T (IUPAC codes, gaps, N).
pub fn ambiguous_fraction(sequence: &[u8]) -> f64 {
    if sequence.is_empty() {
        return 0.0;
    }
    let ambiguous = sequence.iter().filter(|&&b| !is_valid_base(b)).count();
    ambiguous as f64 / sequence.len() as f64
}
