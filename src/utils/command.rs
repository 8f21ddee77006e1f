//! Running the external alignment and tree-building programs.

use log::{debug, error};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Output, Stdio};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Failed to execute '{program}' - is it installed? ({source})")]
    NotFound {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with {status}:\n{stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("Failed to create output file {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// An external program invoked with an argument list, never through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalTool {
    program: String,
}

impl ExternalTool {
    pub fn new(program: impl Into<String>) -> Self {
        ExternalTool {
            program: program.into(),
        }
    }

    fn command(&self, args: &[String]) -> Command {
        debug!("Running: {} {}", self.program, args.join(" "));
        let mut command = Command::new(&self.program);
        command.args(args);
        command
    }

    fn check(&self, output: Output) -> Result<Output, ToolError> {
        if output.status.success() {
            return Ok(output);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        error!("{} failed with {}", self.program, output.status);
        Err(ToolError::Failed {
            program: self.program.clone(),
            status: output.status,
            stderr,
        })
    }

    fn spawn_error(&self, source: std::io::Error) -> ToolError {
        ToolError::NotFound {
            program: self.program.clone(),
            source,
        }
    }

    /// Runs the program to completion; a non-zero exit status is an error.
    pub fn run(&self, args: &[String]) -> Result<(), ToolError> {
        let output = self
            .command(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| self.spawn_error(e))?;
        self.check(output).map(|_| ())
    }

    /// Runs the program with its standard output written to `path`.
    pub fn run_to_file(&self, args: &[String], path: &Path) -> Result<(), ToolError> {
        let file = File::create(path).map_err(|source| ToolError::Output {
            path: path.to_path_buf(),
            source,
        })?;
        let output = self
            .command(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(file))
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| self.spawn_error(e))?;
        self.check(output).map(|_| ())
    }
}
