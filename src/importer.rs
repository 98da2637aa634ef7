//! Graph store bulk import through `neo4j-admin`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

use crate::error::PipelineError;
use crate::graph::{INDEX_STATEMENTS, NODE_FILES, RELATIONSHIP_FILES};

/// What a finished process left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

pub trait CommandRunner {
    fn run(&mut self, program: &Path, args: &[String]) -> Result<CommandOutcome>;
}

/// Runs commands with `std::process`, capturing their output.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&mut self, program: &Path, args: &[String]) -> Result<CommandOutcome> {
        let output = Command::new(program)
            .args(args)
            .output()
            .with_context(|| format!("Failed to spawn {}", program.display()))?;
        Ok(CommandOutcome {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Maps a failed run to `ExternalCommand`, preferring stderr over stdout.
fn ensure_success(program: &Path, args: &[String], outcome: CommandOutcome) -> Result<()> {
    if outcome.success {
        return Ok(());
    }
    let output = if outcome.stderr.trim().is_empty() {
        outcome.stdout
    } else {
        outcome.stderr
    };
    Err(PipelineError::ExternalCommand {
        command: format!("{} {}", program.display(), args.join(" ")),
        code: outcome.code,
        output,
    }
    .into())
}

#[derive(Debug, Clone)]
pub struct BulkImport {
    pub admin_bin: PathBuf,
    pub database: String,
    pub graph_dir: PathBuf,
    /// `cypher-shell` used to create indexes after the import; none skips indexing
    pub cypher_shell: Option<PathBuf>,
}

impl BulkImport {
    /// Arguments for a full, overwriting import of every node and relationship file.
    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["database", "import", "full", "--delimiter=TAB"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        for (label, file) in NODE_FILES {
            args.push(format!(
                "--nodes={}={}",
                label,
                self.graph_dir.join(file).display()
            ));
        }
        for (rel_type, file) in RELATIONSHIP_FILES {
            args.push(format!(
                "--relationships={}={}",
                rel_type,
                self.graph_dir.join(file).display()
            ));
        }
        args.push("--overwrite-destination".to_string());
        args.push(self.database.clone());
        args
    }

    /// `cypher-shell` arguments for one index statement.
    pub fn index_args(&self, statement: &str) -> Vec<String> {
        vec![format!("--database={}", self.database), statement.to_string()]
    }

    /// Runs the import, then creates the range indexes. A non-zero exit aborts with the captured
    /// diagnostics.
    pub fn run(&self, runner: &mut dyn CommandRunner) -> Result<()> {
        let args = self.args();
        let outcome = runner.run(&self.admin_bin, &args)?;
        ensure_success(&self.admin_bin, &args, outcome)?;
        info!("Finished populating graph database {}", self.database);

        if let Some(shell) = &self.cypher_shell {
            self.create_indexes(shell, runner)?;
        }
        Ok(())
    }

    fn create_indexes(&self, shell: &Path, runner: &mut dyn CommandRunner) -> Result<()> {
        for statement in INDEX_STATEMENTS {
            let args = self.index_args(statement);
            let outcome = runner.run(shell, &args)?;
            ensure_success(shell, &args, outcome)?;
        }
        info!(
            "Created {} indexes in graph database {}",
            INDEX_STATEMENTS.len(),
            self.database
        );
        Ok(())
    }
}
