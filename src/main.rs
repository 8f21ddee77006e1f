//! Main entry point for the hev-subtyper application.
//!
//! Assigns a rat hepatitis E virus genome to a clade and subtype:
//! 1. Pairwise p-distance against the reference genomes.
//! 2. Grafting the query onto the reference ML tree (MAFFT + IQ-TREE).
//! 3. Patristic distances in the new tree, matched against the
//!    reference annotation table.

// Modules defined within the project
mod bio;
mod cli;
mod config;
mod io;
mod metadata;
mod phylo;
mod pipeline;
mod utils;
use cli::{run_cli, Cli};

// External Crate Imports
use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    // Initialize logger; RUST_LOG overrides the default level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Parse command line arguments
    let cli = Cli::parse();

    // Run CLI
    run_cli(cli)
}
