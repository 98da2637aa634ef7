//! Staging directory layout and checkpoint helpers.

use anyhow::{Context, Result};
use std::fs::{self, create_dir_all};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::PipelineError;

/// Run timestamp in the form `2025-04-22T10-01-23` (ISO-8601 to the second, filesystem safe).
pub fn run_timestamp() -> String {
    chrono::Local::now()
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string()
        .replace(':', "-")
}

/// Where one pipeline run keeps its artifacts.
///
/// Every stage receives this value explicitly; nothing about the layout is global, so two runs
/// can share a process as long as their run ids or year ranges differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingLayout {
    pub data_dir: PathBuf,
    pub run_id: String,
    pub start_year: i32,
    pub end_year: i32,
}

impl StagingLayout {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        run_id: impl Into<String>,
        start_year: i32,
        end_year: i32,
    ) -> Result<Self, PipelineError> {
        if start_year > end_year {
            return Err(PipelineError::InvalidYearRange {
                start: start_year,
                end: end_year,
            });
        }
        Ok(Self {
            data_dir: data_dir.into(),
            run_id: run_id.into(),
            start_year,
            end_year,
        })
    }

    /// `<run_id>_<start>-<end>`
    pub fn run_name(&self) -> String {
        format!("{}_{}-{}", self.run_id, self.start_year, self.end_year)
    }

    pub fn run_dir(&self) -> PathBuf {
        self.data_dir.join(self.run_name())
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.run_dir().join("raw")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.run_dir().join("processed")
    }

    pub fn merged_dir(&self) -> PathBuf {
        self.run_dir().join("merged")
    }

    pub fn graph_dir(&self) -> PathBuf {
        self.run_dir().join("neo4j")
    }

    pub fn parquet_dir(&self) -> PathBuf {
        self.run_dir().join("parquet")
    }

    /// Requested years, newest first.
    pub fn years_descending(&self) -> impl Iterator<Item = i32> {
        (self.start_year..=self.end_year).rev()
    }
}

pub fn raw_artifact_name(year: i32) -> String {
    format!("results_{}.jsonl.gz", year)
}

pub fn processed_artifact_name(prefix: &str, year: i32) -> String {
    format!("{}_{}.tsv", prefix, year)
}

/// True when `directory` is missing or holds no entries.
pub fn is_empty(directory: &Path) -> Result<bool> {
    if !directory.exists() {
        return Ok(true);
    }
    let mut entries = fs::read_dir(directory)
        .with_context(|| format!("Failed to list {}", directory.display()))?;
    Ok(entries.next().is_none())
}

/// A stage output directory that only becomes visible under its final name once
/// [`StagedDir::publish`] is called.
///
/// Writes go to a sibling `.<name>.partial` directory. A crash leaves that sibling behind and the
/// final directory absent, so the orchestrator's emptiness check never mistakes a half-written
/// stage for a finished one.
#[derive(Debug)]
pub struct StagedDir {
    target: PathBuf,
    partial: PathBuf,
}

impl StagedDir {
    pub fn begin(target: &Path) -> Result<Self> {
        let name = target
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Staging target has no name: {}", target.display()))?;
        let parent = target
            .parent()
            .with_context(|| format!("Staging target has no parent: {}", target.display()))?;
        let partial = parent.join(format!(".{}.partial", name));

        if partial.exists() {
            debug!("Discarding leftover partial output {}", partial.display());
            fs::remove_dir_all(&partial)
                .with_context(|| format!("Failed to clear {}", partial.display()))?;
        }
        create_dir_all(&partial)
            .with_context(|| format!("Failed to create {}", partial.display()))?;

        Ok(Self {
            target: target.to_path_buf(),
            partial,
        })
    }

    /// Directory stage code should write into.
    pub fn path(&self) -> &Path {
        &self.partial
    }

    pub fn publish(self) -> Result<PathBuf> {
        // An empty target may exist from an earlier run that produced nothing.
        if self.target.exists() {
            fs::remove_dir_all(&self.target)
                .with_context(|| format!("Failed to replace {}", self.target.display()))?;
        }
        fs::rename(&self.partial, &self.target).with_context(|| {
            format!(
                "Failed to publish {} as {}",
                self.partial.display(),
                self.target.display()
            )
        })?;
        Ok(self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths_are_derived_from_run_and_years() {
        let layout = StagingLayout::new("/data", "2025-04-22T10-01-23", 2020, 2021).unwrap();
        assert_eq!(
            layout.raw_dir(),
            PathBuf::from("/data/2025-04-22T10-01-23_2020-2021/raw")
        );
        assert_eq!(
            layout.graph_dir(),
            PathBuf::from("/data/2025-04-22T10-01-23_2020-2021/neo4j")
        );
        assert_eq!(layout.years_descending().collect::<Vec<_>>(), vec![2021, 2020]);
    }

    #[test]
    fn rejects_inverted_year_range() {
        let err = StagingLayout::new("/data", "run", 2022, 2020).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidYearRange {
                start: 2022,
                end: 2020
            }
        ));
    }

    #[test]
    fn missing_and_empty_directories_count_as_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("stage");
        assert!(is_empty(&dir).unwrap());
        create_dir_all(&dir).unwrap();
        assert!(is_empty(&dir).unwrap());
        fs::write(dir.join("a.tsv"), "x").unwrap();
        assert!(!is_empty(&dir).unwrap());
    }

    #[test]
    fn staged_dir_is_invisible_until_published() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("merged");

        let staged = StagedDir::begin(&target).unwrap();
        fs::write(staged.path().join("authors.tsv"), "scopus_id\tname\n").unwrap();
        assert!(is_empty(&target).unwrap());

        staged.publish().unwrap();
        assert!(target.join("authors.tsv").exists());
        assert!(!tmp.path().join(".merged.partial").exists());
    }

    #[test]
    fn leftover_partial_output_is_discarded() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("processed");
        let partial = tmp.path().join(".processed.partial");
        create_dir_all(&partial).unwrap();
        fs::write(partial.join("stale.tsv"), "old").unwrap();

        let staged = StagedDir::begin(&target).unwrap();
        assert!(!staged.path().join("stale.tsv").exists());
    }
}
