pub mod placement;
pub mod processor;
pub mod report;
pub mod subtype;

pub use processor::SubtypingPipeline;

use crate::io::SequenceError;
use crate::metadata::AnnotationError;
use crate::phylo::{NewickError, TaxonNotFound};
use crate::utils::ToolError;
use std::path::PathBuf;
use thiserror::Error;

// --- Error Type ---
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Sequence(#[from] SequenceError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Newick(#[from] NewickError),

    #[error(transparent)]
    Taxon(#[from] TaxonNotFound),

    #[error(transparent)]
    Annotation(#[from] AnnotationError),

    #[error("Expected output '{0}' was not produced")]
    MissingOutput(PathBuf),
}
