//! Stage sequencing with directory checkpoints.
//!
//! Each stage writes into a staged sibling directory and publishes it with a rename once it has
//! finished. A stage whose published directory already holds files is skipped, so re-running a
//! crashed or completed run picks up at the first unfinished stage.

use anyhow::Result;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, info_span, warn};

use crate::clean::{clean_authorships, FilterReport};
use crate::columnar::export_columnar;
use crate::dedup::drop_duplicates;
use crate::error::PipelineError;
use crate::extract::{extract_years, RecordSource};
use crate::graph::{export_graph, GraphExportReport, KeyGenerator, UuidKeys};
use crate::helpers::{is_empty, StagedDir, StagingLayout};
use crate::importer::{BulkImport, CommandRunner, SystemRunner};
use crate::merge::merge_all;
use crate::normalize::normalize_authorships;
use crate::processor::{process_all, ProcessingStats};
use crate::sink::{load_relational, LoadReport, RelationalSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineState {
    NotStarted,
    Extracted,
    Processed,
    MergedAndCleaned,
    GraphExported,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Process,
    MergeAndClean,
    GraphExport,
    Columnar,
    RelationalLoad,
    BulkImport,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Extract => "extract",
            Stage::Process => "process",
            Stage::MergeAndClean => "merge-and-clean",
            Stage::GraphExport => "graph-export",
            Stage::Columnar => "columnar-export",
            Stage::RelationalLoad => "relational-load",
            Stage::BulkImport => "bulk-import",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Ran,
    /// Output directory was already populated
    Skipped,
    /// Nothing configured to run it
    NotConfigured,
}

#[derive(Debug, Clone)]
pub struct BulkImportConfig {
    pub admin_bin: PathBuf,
    pub database: String,
    /// Creates the range indexes once the import has finished
    pub cypher_shell: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub layout: StagingLayout,
    pub columnar: bool,
    pub bulk_import: Option<BulkImportConfig>,
}

impl PipelineConfig {
    pub fn new(layout: StagingLayout) -> Self {
        Self {
            layout,
            columnar: false,
            bulk_import: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub stages: Vec<(Stage, StageOutcome)>,
    pub processing: Option<ProcessingStats>,
    pub filter: Option<FilterReport>,
    pub graph: Option<GraphExportReport>,
    pub relational: Option<LoadReport>,
}

impl RunReport {
    pub fn outcome(&self, stage: Stage) -> Option<StageOutcome> {
        self.stages
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, outcome)| *outcome)
    }
}

/// Runs `work` on `input` into a staged copy of `target` unless `target` is already populated.
///
/// An empty `input` is an error: publishing output derived from nothing would make the checkpoint
/// trust empty tables on every later resume.
fn gated<T>(
    stage: Stage,
    input: &Path,
    target: &Path,
    work: impl FnOnce(&Path) -> Result<T>,
) -> Result<Option<T>> {
    if !is_empty(target)? {
        info!(
            "Skipped {} stage, {} is already populated",
            stage,
            target.display()
        );
        return Ok(None);
    }
    if is_empty(input)? {
        return Err(PipelineError::EmptyStageInput {
            stage: stage.to_string(),
            input: input.to_path_buf(),
        }
        .into());
    }
    info!("Running {} stage", stage);
    let staged = StagedDir::begin(target)?;
    let output = work(staged.path())?;
    staged.publish()?;
    Ok(Some(output))
}

fn outcome_of<T>(result: &Option<T>) -> StageOutcome {
    if result.is_some() {
        StageOutcome::Ran
    } else {
        StageOutcome::Skipped
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    source: Option<Box<dyn RecordSource>>,
    keys: Box<dyn KeyGenerator>,
    runner: Box<dyn CommandRunner>,
    sink: Option<Box<dyn RelationalSink>>,
    state: PipelineState,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            source: None,
            keys: Box::new(UuidKeys),
            runner: Box::new(SystemRunner),
            sink: None,
            state: PipelineState::NotStarted,
        }
    }

    pub fn with_source(mut self, source: Box<dyn RecordSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_keys(mut self, keys: Box<dyn KeyGenerator>) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_runner(mut self, runner: Box<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn RelationalSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn layout(&self) -> &StagingLayout {
        &self.config.layout
    }

    pub fn run(&mut self) -> Result<RunReport> {
        let layout = self.config.layout.clone();
        let span = info_span!("pipeline", run_id = %layout.run_name());
        let _guard = span.enter();

        let mut report = RunReport::default();

        let extracted = self.extract(&layout)?;
        report.stages.push((Stage::Extract, extracted));
        let raw_dir = layout.raw_dir();
        if is_empty(&raw_dir)? {
            warn!(
                "No raw data in {}; stopping before any stage output is published",
                raw_dir.display()
            );
            return Ok(report);
        }
        self.state = PipelineState::Extracted;

        let processed = gated(Stage::Process, &raw_dir, &layout.processed_dir(), |out| {
            process_all(&layout, out)
        })?;
        report.stages.push((Stage::Process, outcome_of(&processed)));
        report.processing = processed;
        self.state = PipelineState::Processed;

        let processed_dir = layout.processed_dir();
        let cleaned = gated(Stage::MergeAndClean, &processed_dir, &layout.merged_dir(), |out| {
            merge_all(&processed_dir, out)?;
            normalize_authorships(out)?;
            let filter = clean_authorships(out)?;
            drop_duplicates(out)?;
            Ok(filter)
        })?;
        report.stages.push((Stage::MergeAndClean, outcome_of(&cleaned)));
        report.filter = cleaned;
        self.state = PipelineState::MergedAndCleaned;

        let merged_dir = layout.merged_dir();
        let keys = self.keys.as_mut();
        let graph = gated(Stage::GraphExport, &merged_dir, &layout.graph_dir(), |out| {
            export_graph(&merged_dir, out, keys)
        })?;
        report.stages.push((Stage::GraphExport, outcome_of(&graph)));
        report.graph = graph;
        self.state = PipelineState::GraphExported;

        if self.config.columnar {
            let columnar = gated(Stage::Columnar, &merged_dir, &layout.parquet_dir(), |out| {
                export_columnar(&merged_dir, out)
            })?;
            report.stages.push((Stage::Columnar, outcome_of(&columnar)));
        } else {
            report.stages.push((Stage::Columnar, StageOutcome::NotConfigured));
        }

        match self.sink.as_mut() {
            Some(sink) => {
                info!("Running {} stage", Stage::RelationalLoad);
                report.relational = Some(load_relational(sink.as_mut(), &merged_dir)?);
                report.stages.push((Stage::RelationalLoad, StageOutcome::Ran));
            }
            None => report.stages.push((Stage::RelationalLoad, StageOutcome::NotConfigured)),
        }

        match &self.config.bulk_import {
            Some(import) => {
                info!("Running {} stage", Stage::BulkImport);
                BulkImport {
                    admin_bin: import.admin_bin.clone(),
                    database: import.database.clone(),
                    graph_dir: layout.graph_dir(),
                    cypher_shell: import.cypher_shell.clone(),
                }
                .run(self.runner.as_mut())?;
                report.stages.push((Stage::BulkImport, StageOutcome::Ran));
            }
            None => report.stages.push((Stage::BulkImport, StageOutcome::NotConfigured)),
        }

        self.state = PipelineState::Done;
        info!("Pipeline finished");
        Ok(report)
    }

    fn extract(&mut self, layout: &StagingLayout) -> Result<StageOutcome> {
        let raw_dir = layout.raw_dir();
        if !is_empty(&raw_dir)? {
            info!("Skipped data extraction, because data has already been extracted.");
            return Ok(StageOutcome::Skipped);
        }
        let Some(source) = self.source.as_mut() else {
            warn!(
                "No record source configured and {} is empty; nothing to extract",
                raw_dir.display()
            );
            return Ok(StageOutcome::NotConfigured);
        };

        info!("Running {} stage", Stage::Extract);
        let staged = StagedDir::begin(&raw_dir)?;
        let written = extract_years(source.as_mut(), layout.years_descending(), staged.path())?;
        if written == 0 {
            warn!("Source returned no records for any requested year");
        }
        staged.publish()?;
        Ok(StageOutcome::Ran)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn populated_dir(parent: &Path, name: &str) -> PathBuf {
        let dir = parent.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("authors.tsv"), "scopus_id\tname\n").unwrap();
        dir
    }

    #[test]
    fn gated_skips_populated_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("processed");
        let target = tmp.path().join("merged");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("authors.tsv"), "scopus_id\tname\n").unwrap();

        let mut called = false;
        let result = gated(Stage::MergeAndClean, &input, &target, |_| {
            called = true;
            Ok(())
        })
        .unwrap();

        assert!(result.is_none());
        assert!(!called);
    }

    #[test]
    fn failed_stage_leaves_no_published_output() {
        let tmp = tempfile::tempdir().unwrap();
        let input = populated_dir(tmp.path(), "merged");
        let target = tmp.path().join("neo4j");

        let result: Result<Option<()>> = gated(Stage::GraphExport, &input, &target, |out| {
            fs::write(out.join("node_authors.tsv"), "partial")?;
            anyhow::bail!("crashed mid-write")
        });

        assert!(result.is_err());
        assert!(is_empty(&target).unwrap());
    }

    #[test]
    fn empty_input_is_refused_before_anything_is_published() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("processed");
        fs::create_dir_all(&input).unwrap();
        let target = tmp.path().join("merged");

        let err = gated(Stage::MergeAndClean, &input, &target, |out| {
            fs::write(out.join("authors.tsv"), "scopus_id\tname\n")?;
            Ok(())
        })
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::EmptyStageInput { .. })
        ));
        assert!(!target.exists());
        assert!(!tmp.path().join(".merged.partial").exists());
    }

    #[test]
    fn run_without_source_or_raw_data_publishes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = StagingLayout::new(tmp.path(), "empty", 2020, 2021).unwrap();
        let mut pipeline = Pipeline::new(PipelineConfig::new(layout.clone()));

        let report = pipeline.run().unwrap();

        assert_eq!(pipeline.state(), PipelineState::NotStarted);
        assert_eq!(report.stages, vec![(Stage::Extract, StageOutcome::NotConfigured)]);
        assert!(!layout.processed_dir().exists());
        assert!(!layout.merged_dir().exists());
    }

    #[test]
    fn states_are_ordered() {
        assert!(PipelineState::NotStarted < PipelineState::Extracted);
        assert!(PipelineState::GraphExported < PipelineState::Done);
    }
}
