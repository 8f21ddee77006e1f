use crate::bio::scan_references;
use crate::config::PanelConfig;
use crate::io::{read_first_record, read_records};
use crate::pipeline::placement::{PlacementRequest, PlacementStrategy, TreePlacer};
use crate::pipeline::report::{
    print_pdistance_verdict, print_subtype_verdict, write_pdistance_outputs, write_subtype_outputs,
    write_tree_outputs, RunSummary,
};
use crate::pipeline::subtype::infer_subtype_from_files;
use crate::pipeline::SubtypingPipeline;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Rat hepatitis E virus clade/subtype assignment", long_about = None)]
pub struct Cli {
    /// Reference panel configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for result files [default: output]
    #[arg(short, long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Number of threads to use
    #[arg(short, long, default_value_t = 1, global = true)]
    pub threads: usize,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run p-distance, tree placement and subtype inference for a query genome
    Run {
        /// Query FASTA; the first record is used
        query: PathBuf,

        /// Reference genomes FASTA
        #[arg(long)]
        references: Option<PathBuf>,

        /// Reference multiple sequence alignment
        #[arg(long)]
        alignment: Option<PathBuf>,

        /// Reference ML tree (Newick)
        #[arg(long)]
        tree: Option<PathBuf>,

        /// Reference annotation table (CSV with Name, Clade, Subtype)
        #[arg(long)]
        annotations: Option<PathBuf>,

        /// Re-optimise the whole tree after constrained placement
        #[arg(long)]
        reoptimise: bool,
    },

    /// Find the closest reference genome by pairwise p-distance
    PDistance {
        /// Query FASTA; the first record is used
        query: PathBuf,

        /// Reference genomes FASTA
        references: PathBuf,
    },

    /// Add the query to the reference alignment and infer a new ML tree
    Place {
        /// Existing reference alignment
        alignment: PathBuf,

        /// Query FASTA
        query: PathBuf,

        /// Existing reference tree
        tree: PathBuf,

        /// Updated alignment path
        #[arg(long, requires = "output_tree")]
        output_alignment: Option<PathBuf>,

        /// IQ-TREE output prefix; the tree is written to <prefix>.treefile
        #[arg(long, requires = "output_alignment")]
        output_tree: Option<PathBuf>,

        /// Re-optimise the whole tree after constrained placement
        #[arg(long)]
        reoptimise: bool,
    },

    /// Assign clade and subtype from patristic distances in a tree
    Subtype {
        /// Tree containing the query (Newick)
        treefile: PathBuf,

        /// Taxon label of the query in the tree
        label: String,

        /// Reference annotation table (CSV with Name, Clade, Subtype)
        annotations: PathBuf,

        /// Patristic distance threshold [default: 0.5585]
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Print the results of a finished run from its output directory
    Summary {
        /// Print the combined raw JSON instead of the results list
        #[arg(long)]
        json: bool,
    },
}

fn strategy(reoptimise: bool) -> PlacementStrategy {
    if reoptimise {
        PlacementStrategy::Reoptimise
    } else {
        PlacementStrategy::Constrained
    }
}

/// Main entry point for CLI
pub fn run_cli(cli: Cli) -> Result<()> {
    let mut config = PanelConfig::load(cli.config.as_deref())?;
    if let Some(output_dir) = cli.output_dir {
        config.output_dir = output_dir;
    }

    rayon::ThreadPoolBuilder::new()
        .num_threads(cli.threads.max(1))
        .build_global()?;
    info!("Using {} threads.", cli.threads.max(1));

    match cli.command {
        Commands::Run {
            query,
            references,
            alignment,
            tree,
            annotations,
            reoptimise,
        } => {
            if let Some(path) = references {
                config.reference_genomes = path;
            }
            if let Some(path) = alignment {
                config.reference_alignment = path;
            }
            if let Some(path) = tree {
                config.reference_tree = path;
            }
            if let Some(path) = annotations {
                config.reference_subtypes = path;
            }
            config.validate()?;

            let pipeline = SubtypingPipeline::new(config, strategy(reoptimise));
            let summary = pipeline.run(&query)?;
            println!("\nResults:\n{}", summary.render());
            info!(
                "Reports written to {}",
                pipeline.config().output_dir.display()
            );
        }

        Commands::PDistance { query, references } => {
            std::fs::create_dir_all(&config.output_dir)?;
            let query_record = read_first_record(&query)?;
            let references = read_records(&references)?;
            println!("Comparing input sequence to reference sequences...");
            let scan = scan_references(&query_record, &references, &config.thresholds);
            print_pdistance_verdict(&scan);
            write_pdistance_outputs(&scan, &config.output_dir)?;
        }

        Commands::Place {
            alignment,
            query,
            tree,
            output_alignment,
            output_tree,
            reoptimise,
        } => {
            std::fs::create_dir_all(&config.output_dir)?;
            let mut request =
                PlacementRequest::with_default_outputs(&alignment, &query, &tree, &config.output_dir);
            if let (Some(output_alignment), Some(output_tree)) = (output_alignment, output_tree) {
                request.output_alignment = output_alignment;
                request.output_prefix = output_tree;
            }
            request.strategy = strategy(reoptimise);

            println!(
                "\nOutput alignment will be saved as: {}",
                request.output_alignment.display()
            );
            println!("Output tree will be saved as: {}", request.treefile().display());
            let report = TreePlacer::new(&config.tools).place(&request)?;
            write_tree_outputs(&report, &config.output_dir)?;
            println!("\nOperation completed successfully.");
        }

        Commands::Subtype {
            treefile,
            label,
            annotations,
            threshold,
        } => {
            std::fs::create_dir_all(&config.output_dir)?;
            let threshold = threshold.unwrap_or(config.thresholds.ml_patristic);
            let inference = infer_subtype_from_files(&treefile, &label, &annotations, threshold)?;
            print_subtype_verdict(&inference);
            write_subtype_outputs(&inference, &config.output_dir)?;
        }

        Commands::Summary { json } => {
            let summary = RunSummary::load(&config.output_dir).with_context(|| {
                format!(
                    "Error loading results from {}",
                    config.output_dir.display()
                )
            })?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("Results:\n{}", summary.render());
            }
        }
    }

    Ok(())
}
