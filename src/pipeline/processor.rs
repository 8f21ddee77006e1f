use super::placement::{PlacementRequest, PlacementStrategy, TreePlacer};
use super::report::{
    print_pdistance_verdict, print_subtype_verdict, write_pdistance_outputs, write_subtype_outputs,
    write_tree_outputs, RunSummary,
};
use super::subtype::infer_subtype_from_files;
use crate::bio::{ambiguous_fraction, scan_references};
use crate::config::PanelConfig;
use crate::io::{read_first_record, read_records};
use anyhow::{Context, Result};
use log::{info, warn};
use std::fs;
use std::path::Path;
use std::time::Instant;

/// Queries with more ambiguous positions than this get a warning.
const AMBIGUITY_WARNING: f64 = 0.05;

/// End-to-end subtyping of one query genome against the reference panel.
pub struct SubtypingPipeline {
    config: PanelConfig,
    strategy: PlacementStrategy,
}

impl SubtypingPipeline {
    pub fn new(config: PanelConfig, strategy: PlacementStrategy) -> Self {
        SubtypingPipeline { config, strategy }
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    /// Runs p-distance scan, tree placement and subtype inference in order.
    /// Any failing stage aborts the run.
    pub fn run(&self, query: &Path) -> Result<RunSummary> {
        let start = Instant::now();
        let config = &self.config;
        let output_dir = config.output_dir.as_path();
        fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

        let query_record = read_first_record(query)?;
        let label = query_record.id.clone();
        info!("Query '{}' ({} nt) from {}", label, query_record.len(), query.display());
        let ambiguous = ambiguous_fraction(&query_record.sequence);
        if ambiguous > AMBIGUITY_WARNING {
            warn!(
                "{:.1}% of the query positions are not A/C/G/T; distances may be inflated",
                ambiguous * 100.0
            );
        }

        println!("\nCalculating p-distance...");
        let references = read_records(&config.reference_genomes)
            .context("Error calculating p-distance")?;
        let scan = scan_references(&query_record, &references, &config.thresholds);
        print_pdistance_verdict(&scan);
        let p_distance = write_pdistance_outputs(&scan, output_dir)?;

        println!("\nInferring new ML tree...");
        let mut request = PlacementRequest::with_default_outputs(
            &config.reference_alignment,
            query,
            &config.reference_tree,
            output_dir,
        );
        request.strategy = self.strategy;
        println!(
            "Output alignment will be saved as: {}",
            request.output_alignment.display()
        );
        println!("Output tree will be saved as: {}", request.treefile().display());
        let ml_tree = TreePlacer::new(&config.tools)
            .place(&request)
            .context("Error inferring new ML tree")?;
        write_tree_outputs(&ml_tree, output_dir)?;

        println!("\nInferring subtype...");
        let inference = infer_subtype_from_files(
            &ml_tree.treefile(),
            &label,
            &config.reference_subtypes,
            config.thresholds.ml_patristic,
        )
        .context("Error inferring subtype")?;
        print_subtype_verdict(&inference);
        let subtype = write_subtype_outputs(&inference, output_dir)?;

        info!(
            "Subtyping of '{}' finished in {:.1}s",
            label,
            start.elapsed().as_secs_f64()
        );
        Ok(RunSummary {
            p_distance,
            ml_tree,
            subtype,
        })
    }
}
