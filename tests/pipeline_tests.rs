//! End-to-end runs over a temporary staging directory.

use serde_json::{json, Value};
use std::fs;
use std::path::Path;

use scopus_etl::collab::{read_collaboration_edges, CollaborationEdge};
use scopus_etl::extract::DumpDirectorySource;
use scopus_etl::graph::SequentialKeys;
use scopus_etl::merge::merged_path;
use scopus_etl::pipeline::{Stage, StageOutcome};
use scopus_etl::schema::EntityKind;
use scopus_etl::table::read_tsv;
use scopus_etl::{Pipeline, PipelineConfig, PipelineState, StagingLayout};

fn write_dump(dir: &Path, year: i32, records: &[Value]) {
    let body: String = records
        .iter()
        .map(|r| format!("{}\n", r))
        .collect();
    fs::write(dir.join(format!("results_{}.jsonl", year)), body).unwrap();
}

fn two_document_year() -> Vec<Value> {
    vec![
        json!({
            "eid": "D1", "title": "Collaboration graphs", "openaccess": 1, "citedby_count": 3,
            "afid": "I1;I2", "affilname": "Unicamp;USP",
            "affiliation_city": "Campinas;Sao Paulo", "affiliation_country": "Brazil;Brazil",
            "author_ids": "A1;A2", "author_names": "Ada;Bob", "author_afids": "I1;I1-I2"
        }),
        json!({
            "eid": "D2", "title": "Community detection", "openaccess": 0, "citedby_count": 0,
            "afid": "I1", "affilname": "Unicamp",
            "affiliation_city": "Campinas", "affiliation_country": "Brazil",
            "author_ids": "A1", "author_names": "Ada", "author_afids": "I1"
        }),
    ]
}

fn pipeline_for(data: &Path, dumps: &Path, start: i32, end: i32) -> Pipeline {
    let layout = StagingLayout::new(data, "test-run", start, end).unwrap();
    Pipeline::new(PipelineConfig::new(layout))
        .with_source(Box::new(DumpDirectorySource::new(dumps)))
        .with_keys(Box::new(SequentialKeys::new("auth-")))
}

fn authorship_tuples(merged_dir: &Path) -> Vec<(String, String, Option<String>)> {
    let table = read_tsv(
        &merged_path(merged_dir, EntityKind::Authorships),
        "authorships",
    )
    .unwrap();
    table
        .rows()
        .iter()
        .map(|row| {
            (
                row[0].clone().unwrap(),
                row[1].clone().unwrap(),
                row[2].clone(),
            )
        })
        .collect()
}

fn t(doc: &str, author: &str, inst: Option<&str>) -> (String, String, Option<String>) {
    (doc.to_string(), author.to_string(), inst.map(str::to_string))
}

#[test]
fn single_year_scenario_produces_expected_authorships_and_edges() {
    let data = tempfile::tempdir().unwrap();
    let dumps = tempfile::tempdir().unwrap();
    write_dump(dumps.path(), 2021, &two_document_year());

    let mut pipeline = pipeline_for(data.path(), dumps.path(), 2021, 2021);
    let report = pipeline.run().unwrap();
    assert_eq!(pipeline.state(), PipelineState::Done);

    let layout = pipeline.layout().clone();
    assert_eq!(
        authorship_tuples(&layout.merged_dir()),
        vec![
            t("D1", "A1", Some("I1")),
            t("D1", "A2", Some("I1")),
            t("D1", "A2", Some("I2")),
            t("D2", "A1", Some("I1")),
        ]
    );

    let edges =
        read_collaboration_edges(&layout.graph_dir().join("rel_author_author.tsv")).unwrap();
    assert_eq!(
        edges,
        vec![CollaborationEdge {
            author1: "A1".to_string(),
            author2: "A2".to_string(),
            count: 1,
        }]
    );

    let filter = report.filter.unwrap();
    assert_eq!(filter.removed, 0);
    let graph = report.graph.unwrap();
    assert_eq!(graph.authorship_nodes, 4);
    assert_eq!(graph.relationships, 12);
}

#[test]
fn rerun_skips_every_populated_stage() {
    let data = tempfile::tempdir().unwrap();
    let dumps = tempfile::tempdir().unwrap();
    write_dump(dumps.path(), 2021, &two_document_year());

    pipeline_for(data.path(), dumps.path(), 2021, 2021).run().unwrap();
    let report = pipeline_for(data.path(), dumps.path(), 2021, 2021).run().unwrap();

    for stage in [Stage::Extract, Stage::Process, Stage::MergeAndClean, Stage::GraphExport] {
        assert_eq!(report.outcome(stage), Some(StageOutcome::Skipped), "{}", stage);
    }
    assert_eq!(report.outcome(Stage::Columnar), Some(StageOutcome::NotConfigured));
}

#[test]
fn crashed_stage_output_is_not_trusted_on_restart() {
    let data = tempfile::tempdir().unwrap();
    let dumps = tempfile::tempdir().unwrap();
    write_dump(dumps.path(), 2021, &two_document_year());

    let layout = StagingLayout::new(data.path(), "test-run", 2021, 2021).unwrap();
    // What a crash during the merge stage leaves behind
    let partial = layout.run_dir().join(".merged.partial");
    fs::create_dir_all(&partial).unwrap();
    fs::write(partial.join("documents.tsv"), "scopus_id\n").unwrap();

    let report = pipeline_for(data.path(), dumps.path(), 2021, 2021).run().unwrap();
    assert_eq!(report.outcome(Stage::MergeAndClean), Some(StageOutcome::Ran));
    assert!(!partial.exists());
    assert_eq!(authorship_tuples(&layout.merged_dir()).len(), 4);
}

#[test]
fn newest_year_wins_and_missing_years_are_skipped() {
    let data = tempfile::tempdir().unwrap();
    let dumps = tempfile::tempdir().unwrap();
    write_dump(
        dumps.path(),
        2019,
        &[json!({
            "eid": "D0", "afid": "I1", "affilname": "Old name",
            "affiliation_city": "Campinas", "affiliation_country": "Brazil",
            "author_ids": "A1", "author_names": "A. Lovelace", "author_afids": "I1"
        })],
    );
    write_dump(dumps.path(), 2021, &two_document_year());

    let mut pipeline = pipeline_for(data.path(), dumps.path(), 2019, 2021);
    let report = pipeline.run().unwrap();
    let stats = report.processing.unwrap();
    assert_eq!(stats.years_processed, 2);
    assert_eq!(stats.years_missing, 1);

    let merged = pipeline.layout().merged_dir();
    let authors = read_tsv(&merged_path(&merged, EntityKind::Authors), "authors").unwrap();
    assert_eq!(authors.len(), 2);
    assert_eq!(authors.rows()[0][1].as_deref(), Some("Ada"));

    let institutions =
        read_tsv(&merged_path(&merged, EntityKind::Institutions), "institutions").unwrap();
    let i1 = institutions
        .rows()
        .iter()
        .find(|row| row[0].as_deref() == Some("I1"))
        .unwrap();
    assert_eq!(i1[1].as_deref(), Some("Unicamp"));
}

#[test]
fn unknown_institutions_are_filtered_but_missing_ones_kept() {
    let data = tempfile::tempdir().unwrap();
    let dumps = tempfile::tempdir().unwrap();
    write_dump(
        dumps.path(),
        2020,
        &[json!({
            "eid": "D5", "afid": "I1", "affilname": "Unicamp",
            "affiliation_city": "Campinas", "affiliation_country": "Brazil",
            "author_ids": "A1;A2;A3", "author_names": "Ada;Bob;Cy",
            "author_afids": "I1;I404;"
        })],
    );

    let mut pipeline = pipeline_for(data.path(), dumps.path(), 2020, 2020);
    let report = pipeline.run().unwrap();

    assert_eq!(
        authorship_tuples(&pipeline.layout().merged_dir()),
        vec![t("D5", "A1", Some("I1")), t("D5", "A3", None)]
    );
    let filter = report.filter.unwrap();
    assert_eq!((filter.before, filter.removed), (3, 1));
    assert_eq!(filter.removed_percentage, 33.33);

    // A3 has no institution: author and document edges only
    let graph = report.graph.unwrap();
    assert_eq!(graph.authorship_nodes, 2);
    assert_eq!(graph.relationships, 5);
}

#[test]
fn columnar_export_runs_when_enabled() {
    let data = tempfile::tempdir().unwrap();
    let dumps = tempfile::tempdir().unwrap();
    write_dump(dumps.path(), 2021, &two_document_year());

    let layout = StagingLayout::new(data.path(), "test-run", 2021, 2021).unwrap();
    let mut config = PipelineConfig::new(layout.clone());
    config.columnar = true;
    let report = Pipeline::new(config)
        .with_source(Box::new(DumpDirectorySource::new(dumps.path())))
        .run()
        .unwrap();

    assert_eq!(report.outcome(Stage::Columnar), Some(StageOutcome::Ran));
    assert!(layout.parquet_dir().join("authorships.parquet").exists());
}

#[test]
fn sourceless_run_does_not_block_a_later_resume() {
    let data = tempfile::tempdir().unwrap();
    let dumps = tempfile::tempdir().unwrap();
    let layout = StagingLayout::new(data.path(), "test-run", 2021, 2021).unwrap();

    let mut sourceless = Pipeline::new(PipelineConfig::new(layout.clone()));
    let report = sourceless.run().unwrap();
    assert_eq!(report.outcome(Stage::Extract), Some(StageOutcome::NotConfigured));
    assert_eq!(report.outcome(Stage::MergeAndClean), None);
    assert_eq!(sourceless.state(), PipelineState::NotStarted);
    assert!(!layout.merged_dir().exists());

    write_dump(dumps.path(), 2021, &two_document_year());
    let mut resumed = pipeline_for(data.path(), dumps.path(), 2021, 2021);
    let report = resumed.run().unwrap();

    for stage in [Stage::Extract, Stage::Process, Stage::MergeAndClean, Stage::GraphExport] {
        assert_eq!(report.outcome(stage), Some(StageOutcome::Ran), "{}", stage);
    }
    assert_eq!(authorship_tuples(&layout.merged_dir()).len(), 4);
    assert_eq!(report.graph.unwrap().collaboration_edges, 1);
}

#[test]
fn source_without_any_requested_year_stops_before_processing() {
    let data = tempfile::tempdir().unwrap();
    let dumps = tempfile::tempdir().unwrap();
    write_dump(dumps.path(), 2018, &two_document_year());

    let mut pipeline = pipeline_for(data.path(), dumps.path(), 2020, 2021);
    let report = pipeline.run().unwrap();

    assert_eq!(report.outcome(Stage::Extract), Some(StageOutcome::Ran));
    assert_eq!(report.outcome(Stage::Process), None);
    assert_eq!(pipeline.state(), PipelineState::NotStarted);
    assert!(!pipeline.layout().processed_dir().exists());
}
