//! Grafting the query onto the reference tree.
//!
//! MAFFT adds the query to the fixed-length reference alignment, then
//! IQ-TREE infers a maximum-likelihood tree constrained by the reference
//! topology. Optionally a second, unconstrained IQ-TREE run starts from
//! the constrained tree to re-optimise the whole topology.

use super::PipelineError;
use crate::config::ToolConfig;
use crate::utils::{file_stem_before_dot, with_suffix, ExternalTool, ToolError};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlacementStrategy {
    /// Single IQ-TREE run with the reference tree as constraint (`-g`).
    #[default]
    Constrained,
    /// Constrained run, then a free run starting from its tree (`-t`).
    Reoptimise,
}

#[derive(Debug, Clone)]
pub struct PlacementRequest {
    pub existing_alignment: PathBuf,
    pub query: PathBuf,
    pub reference_tree: PathBuf,
    pub output_alignment: PathBuf,
    /// IQ-TREE `-pre` prefix; the tree lands in `<prefix>.treefile`.
    pub output_prefix: PathBuf,
    pub strategy: PlacementStrategy,
}

impl PlacementRequest {
    /// Output names derived from the reference files:
    /// `<alignment stem>_updated.fasta` and `<tree stem>_reoptimised`, inside `output_dir`.
    pub fn with_default_outputs(
        existing_alignment: &Path,
        query: &Path,
        reference_tree: &Path,
        output_dir: &Path,
    ) -> Self {
        let output_alignment = output_dir.join(format!(
            "{}_updated.fasta",
            file_stem_before_dot(existing_alignment)
        ));
        let output_prefix = output_dir.join(format!(
            "{}_reoptimised",
            file_stem_before_dot(reference_tree)
        ));
        PlacementRequest {
            existing_alignment: existing_alignment.to_path_buf(),
            query: query.to_path_buf(),
            reference_tree: reference_tree.to_path_buf(),
            output_alignment,
            output_prefix,
            strategy: PlacementStrategy::default(),
        }
    }

    pub fn treefile(&self) -> PathBuf {
        with_suffix(&self.output_prefix, ".treefile")
    }
}

/// Paths produced by a successful placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeReport {
    pub output_alignment: PathBuf,
    pub output_tree: PathBuf,
}

impl TreeReport {
    pub fn treefile(&self) -> PathBuf {
        with_suffix(&self.output_tree, ".treefile")
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub struct TreePlacer {
    mafft: ExternalTool,
    iqtree: ExternalTool,
    model: String,
}

impl TreePlacer {
    pub fn new(tools: &ToolConfig) -> Self {
        TreePlacer {
            mafft: ExternalTool::new(&tools.mafft),
            iqtree: ExternalTool::new(&tools.iqtree),
            model: tools.model.clone(),
        }
    }

    fn mafft_args(&self, existing_alignment: &Path, query: &Path) -> Vec<String> {
        vec![
            "--quiet".to_string(),
            "--add".to_string(),
            path_arg(query),
            "--keeplength".to_string(),
            path_arg(existing_alignment),
        ]
    }

    /// `tree_flag` is `-g` for a constraint tree or `-t` for a starting tree.
    fn iqtree_args(&self, alignment: &Path, tree_flag: &str, tree: &Path, prefix: &Path) -> Vec<String> {
        vec![
            "-redo".to_string(),
            "--quiet".to_string(),
            "-s".to_string(),
            path_arg(alignment),
            tree_flag.to_string(),
            path_arg(tree),
            "-pre".to_string(),
            path_arg(prefix),
            "-m".to_string(),
            self.model.clone(),
        ]
    }

    /// Adds the query to the reference alignment without widening it.
    pub fn add_to_alignment(
        &self,
        existing_alignment: &Path,
        query: &Path,
        output_alignment: &Path,
    ) -> Result<(), ToolError> {
        info!(
            "Adding {} to alignment {}",
            query.display(),
            existing_alignment.display()
        );
        self.mafft.run_to_file(
            &self.mafft_args(existing_alignment, query),
            output_alignment,
        )
    }

    fn run_iqtree(&self, args: Vec<String>, prefix: &Path) -> Result<PathBuf, PipelineError> {
        self.iqtree.run(&args)?;
        let treefile = with_suffix(prefix, ".treefile");
        if !treefile.is_file() {
            return Err(PipelineError::MissingOutput(treefile));
        }
        Ok(treefile)
    }

    /// Infers the ML tree for the updated alignment; returns the `.treefile` path.
    pub fn place_on_tree(&self, request: &PlacementRequest) -> Result<PathBuf, PipelineError> {
        let alignment = &request.output_alignment;
        match request.strategy {
            PlacementStrategy::Constrained => {
                info!("Inferring constrained ML tree ({})", self.model);
                self.run_iqtree(
                    self.iqtree_args(alignment, "-g", &request.reference_tree, &request.output_prefix),
                    &request.output_prefix,
                )
            }
            PlacementStrategy::Reoptimise => {
                let placement_prefix = with_suffix(alignment, "_pp");
                info!("Phylogenetic placement with constraint tree ({})", self.model);
                let placement_tree = self.run_iqtree(
                    self.iqtree_args(alignment, "-g", &request.reference_tree, &placement_prefix),
                    &placement_prefix,
                )?;
                info!("Re-optimising tree from placement result");
                self.run_iqtree(
                    self.iqtree_args(alignment, "-t", &placement_tree, &request.output_prefix),
                    &request.output_prefix,
                )
            }
        }
    }

    pub fn place(&self, request: &PlacementRequest) -> Result<TreeReport, PipelineError> {
        self.add_to_alignment(
            &request.existing_alignment,
            &request.query,
            &request.output_alignment,
        )?;
        self.place_on_tree(request)?;
        Ok(TreeReport {
            output_alignment: request.output_alignment.clone(),
            output_tree: request.output_prefix.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    fn placer() -> TreePlacer {
        TreePlacer::new(&ToolConfig::default())
    }

    /// Writes an executable shell script standing in for an external tool.
    fn stub_tool(dir: &Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_default_output_names() {
        let request = PlacementRequest::with_default_outputs(
            Path::new("panel/reference_alignment.fa"),
            Path::new("query.fasta"),
            Path::new("panel/reference_tree.tree"),
            Path::new("output"),
        );
        assert_eq!(
            request.output_alignment,
            PathBuf::from("output/reference_alignment_updated.fasta")
        );
        assert_eq!(
            request.treefile(),
            PathBuf::from("output/reference_tree_reoptimised.treefile")
        );
        assert_eq!(request.strategy, PlacementStrategy::Constrained);
    }

    #[test]
    fn test_mafft_arguments() {
        let args = placer().mafft_args(Path::new("ref.fa"), Path::new("q.fa"));
        assert_eq!(args, vec!["--quiet", "--add", "q.fa", "--keeplength", "ref.fa"]);
    }

    #[test]
    fn test_iqtree_arguments() {
        let args = placer().iqtree_args(
            Path::new("out/aln.fasta"),
            "-g",
            Path::new("ref.tree"),
            Path::new("out/tree_reoptimised"),
        );
        assert_eq!(
            args,
            vec![
                "-redo", "--quiet", "-s", "out/aln.fasta", "-g", "ref.tree", "-pre",
                "out/tree_reoptimised", "-m", "GTR+F+G4"
            ]
        );
    }

    #[test]
    fn test_place_with_stub_tools() {
        let dir = tempdir().unwrap();
        let tools = ToolConfig {
            mafft: stub_tool(dir.path(), "mafft", "printf '>ref\\nACGT\\n>query\\nACGA\\n'"),
            // -pre is the 8th argument; write a tree next to it
            iqtree: stub_tool(dir.path(), "iqtree2", "printf '(ref:0.1,query:0.2);' > \"$8.treefile\""),
            model: "GTR+F+G4".to_string(),
        };
        let mut request = PlacementRequest::with_default_outputs(
            Path::new("reference_alignment.fa"),
            Path::new("query.fa"),
            Path::new("reference_tree.tree"),
            dir.path(),
        );
        request.strategy = PlacementStrategy::Reoptimise;

        let report = TreePlacer::new(&tools).place(&request).unwrap();
        assert!(fs::read_to_string(&report.output_alignment)
            .unwrap()
            .contains(">query"));
        assert!(report.treefile().is_file());
        assert!(with_suffix(&request.output_alignment, "_pp.treefile").is_file());
    }

    #[test]
    fn test_reoptimise_starts_from_placement_tree() {
        let dir = tempdir().unwrap();
        let calls = dir.path().join("iqtree_calls.txt");
        let tools = ToolConfig {
            mafft: stub_tool(dir.path(), "mafft", "printf '>query\\nACGT\\n'"),
            iqtree: stub_tool(
                dir.path(),
                "iqtree2",
                &format!(
                    "printf '%s\\n' \"$*\" >> '{}'\nprintf '(ref:0.1,query:0.2);' > \"$8.treefile\"",
                    calls.display()
                ),
            ),
            model: "GTR+F+G4".to_string(),
        };
        let mut request = PlacementRequest::with_default_outputs(
            Path::new("reference_alignment.fa"),
            Path::new("query.fa"),
            Path::new("reference_tree.tree"),
            dir.path(),
        );
        request.strategy = PlacementStrategy::Reoptimise;
        TreePlacer::new(&tools).place(&request).unwrap();

        let log = fs::read_to_string(&calls).unwrap();
        let runs: Vec<Vec<&str>> = log.lines().map(|l| l.split_whitespace().collect()).collect();
        assert_eq!(runs.len(), 2);

        let placement_prefix = with_suffix(&request.output_alignment, "_pp");
        assert_eq!(runs[0][4], "-g");
        assert_eq!(runs[0][5], "reference_tree.tree");
        assert_eq!(runs[0][7], path_arg(&placement_prefix));

        let start_tree = with_suffix(&request.output_alignment, "_pp.treefile");
        assert_eq!(runs[1][4], "-t");
        assert_eq!(runs[1][5], path_arg(&start_tree));
        assert_eq!(runs[1][7], path_arg(&request.output_prefix));
    }

    #[test]
    fn test_constrained_runs_iqtree_once() {
        let dir = tempdir().unwrap();
        let calls = dir.path().join("iqtree_calls.txt");
        let tools = ToolConfig {
            mafft: stub_tool(dir.path(), "mafft", "printf '>query\\nACGT\\n'"),
            iqtree: stub_tool(
                dir.path(),
                "iqtree2",
                &format!(
                    "printf '%s\\n' \"$*\" >> '{}'\nprintf '(ref:0.1,query:0.2);' > \"$8.treefile\"",
                    calls.display()
                ),
            ),
            model: "GTR+F+G4".to_string(),
        };
        let request = PlacementRequest::with_default_outputs(
            Path::new("reference_alignment.fa"),
            Path::new("query.fa"),
            Path::new("reference_tree.tree"),
            dir.path(),
        );
        TreePlacer::new(&tools).place(&request).unwrap();

        let log = fs::read_to_string(&calls).unwrap();
        let runs: Vec<&str> = log.lines().collect();
        assert_eq!(runs.len(), 1);
        assert!(runs[0].contains("-g reference_tree.tree"));
        assert!(!runs[0].contains(" -t "));
    }

    #[test]
    fn test_missing_treefile_is_reported() {
        let dir = tempdir().unwrap();
        let tools = ToolConfig {
            mafft: stub_tool(dir.path(), "mafft", "printf '>query\\nACGT\\n'"),
            iqtree: stub_tool(dir.path(), "iqtree2", "exit 0"),
            model: "GTR+F+G4".to_string(),
        };
        let request = PlacementRequest::with_default_outputs(
            Path::new("reference_alignment.fa"),
            Path::new("query.fa"),
            Path::new("reference_tree.tree"),
            dir.path(),
        );

        let result = TreePlacer::new(&tools).place(&request);
        assert!(matches!(result, Err(PipelineError::MissingOutput(_))));
    }
}
