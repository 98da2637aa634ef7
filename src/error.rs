//! Typed failures callers need to tell apart.
//!
//! Everything else travels as `anyhow::Error` with context attached at the I/O site.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// An external process (bulk importer) exited unsuccessfully.
    #[error("command `{command}` failed with exit code {code:?}: {output}")]
    ExternalCommand {
        command: String,
        /// `None` when the process was killed by a signal
        code: Option<i32>,
        /// Captured stderr, falling back to stdout when stderr is empty
        output: String,
    },

    /// A staged table lacks a column a stage depends on.
    #[error("table `{table}` has no column `{column}`")]
    MissingColumn { table: String, column: String },

    /// A raw batch line could not be decoded into a record.
    #[error("malformed raw record for {year} at line {line}: {reason}")]
    MalformedRecord {
        year: i32,
        line: usize,
        reason: String,
    },

    #[error("invalid year range: start {start} is after end {end}")]
    InvalidYearRange { start: i32, end: i32 },

    /// A stage was asked to run on an input directory with nothing in it.
    #[error("{stage} stage has no input in {}", input.display())]
    EmptyStageInput { stage: String, input: PathBuf },

    /// The relational sink reported an unrecoverable failure.
    #[error("relational sink failed while loading {entity}: {message}")]
    SinkFailure { entity: String, message: String },
}

impl PipelineError {
    pub fn missing_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::MissingColumn {
            table: table.into(),
            column: column.into(),
        }
    }
}
