//! Decodes raw per-year search results into the four per-year tables.

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::path::Path;
use tracing::{info, warn};

use crate::accumulator::{Accumulator, MergePolicy};
use crate::extract::read_raw_batch;
use crate::helpers::{processed_artifact_name, raw_artifact_name, StagingLayout};
use crate::schema::{parse_bool, EntityKind};
use crate::table::{write_tsv, Cell, Row, Table};

/// Separator between positionally aligned values in one raw field.
const LIST_SEPARATOR: char = ';';
/// Separator between the institutions of one author inside `author_afids`.
const GROUP_SEPARATOR: char = '-';
/// Separator used in the intermediate `institution_ids` column.
pub const JOINED_SEPARATOR: &str = ",";

// Text of a scalar JSON field; numbers and booleans are rendered, empty strings are null
macro_rules! extract_text {
    ($json:expr, $field:expr) => {
        $json.get($field).and_then(value_text)
    };
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn bool_text(value: Option<String>) -> Cell {
    value.and_then(|v| parse_bool(&v)).map(|b| b.to_string())
}

fn split_list(value: Option<&str>) -> Vec<&str> {
    value
        .map(|v| v.split(LIST_SEPARATOR).collect())
        .unwrap_or_default()
}

fn nth_cell(parts: &[&str], idx: usize) -> Cell {
    parts
        .get(idx)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessingStats {
    pub years_processed: u64,
    pub years_missing: u64,
    pub records_processed: u64,
    pub records_skipped: u64,
    pub misaligned_records: u64,
}

/// The four tables produced from one year's batch.
#[derive(Debug, Clone)]
pub struct YearTables {
    pub year: i32,
    pub documents: Table,
    pub authors: Table,
    pub institutions: Table,
    pub authorships: Table,
}

impl YearTables {
    pub fn write(&self, dir: &Path) -> Result<()> {
        for (kind, table) in [
            (EntityKind::Documents, &self.documents),
            (EntityKind::Authors, &self.authors),
            (EntityKind::Institutions, &self.institutions),
            (EntityKind::Authorships, &self.authorships),
        ] {
            write_tsv(table, &dir.join(processed_artifact_name(kind.prefix(), self.year)))?;
        }
        Ok(())
    }
}

fn document_row(record: &Value, scopus_id: &str) -> Row {
    vec![
        Some(scopus_id.to_string()),
        extract_text!(record, "title"),
        extract_text!(record, "doi"),
        bool_text(extract_text!(record, "openaccess")),
        extract_text!(record, "coverDate"),
        extract_text!(record, "subtype"),
        extract_text!(record, "subtypeDescription"),
        extract_text!(record, "volume"),
        extract_text!(record, "issueIdentifier"),
        extract_text!(record, "pageRange"),
        extract_text!(record, "citedby_count"),
        extract_text!(record, "fund_acr"),
        extract_text!(record, "fund_no"),
        extract_text!(record, "fund_sponsor"),
        extract_text!(record, "publicationName"),
        extract_text!(record, "aggregationType"),
        extract_text!(record, "source_id"),
        extract_text!(record, "issn"),
        extract_text!(record, "eIssn"),
    ]
}

/// Turns one year's raw results into per-year tables.
///
/// Institutions and authors are accumulated per year with last-seen-wins; cross-year conflicts
/// are settled later by deduplication.
pub fn process_records(records: &[Value], year: i32, stats: &mut ProcessingStats) -> YearTables {
    let mut documents = Table::new(
        EntityKind::Documents.prefix(),
        EntityKind::Documents.processed_columns(),
    );
    let mut authorships = Table::new(
        EntityKind::Authorships.prefix(),
        EntityKind::Authorships.processed_columns(),
    );
    let mut authors: Accumulator<String, Row> = Accumulator::new(MergePolicy::KeepLast);
    let mut institutions: Accumulator<String, Row> = Accumulator::new(MergePolicy::KeepLast);

    for record in records {
        let Some(document_id) = extract_text!(record, "eid") else {
            warn!("Skipping {} record without eid", year);
            stats.records_skipped += 1;
            continue;
        };
        documents.push_row(document_row(record, &document_id));

        let afid = extract_text!(record, "afid");
        let mut misaligned = false;
        if afid.is_some() {
            let names = extract_text!(record, "affilname");
            let cities = extract_text!(record, "affiliation_city");
            let countries = extract_text!(record, "affiliation_country");

            let ids = split_list(afid.as_deref());
            let names = split_list(names.as_deref());
            let cities = split_list(cities.as_deref());
            let countries = split_list(countries.as_deref());
            misaligned |= [names.len(), cities.len(), countries.len()]
                .iter()
                .any(|&n| n != ids.len());

            for (i, id) in ids.iter().enumerate() {
                if id.is_empty() {
                    continue;
                }
                institutions.upsert(
                    id.to_string(),
                    vec![
                        Some(id.to_string()),
                        nth_cell(&names, i),
                        nth_cell(&cities, i),
                        nth_cell(&countries, i),
                    ],
                );
            }
        }

        let author_ids = extract_text!(record, "author_ids");
        if author_ids.is_some() {
            let names = extract_text!(record, "author_names");
            let groups = extract_text!(record, "author_afids");

            let ids = split_list(author_ids.as_deref());
            let names = split_list(names.as_deref());
            let groups = split_list(groups.as_deref());
            misaligned |= names.len() != ids.len() || groups.len() != ids.len();

            for (i, author_id) in ids.iter().enumerate() {
                if author_id.is_empty() {
                    continue;
                }
                authors.upsert(
                    author_id.to_string(),
                    vec![Some(author_id.to_string()), nth_cell(&names, i)],
                );

                let institution_ids = groups
                    .get(i)
                    .map(|group| {
                        group
                            .split(GROUP_SEPARATOR)
                            .filter(|s| !s.is_empty())
                            .collect::<Vec<_>>()
                            .join(JOINED_SEPARATOR)
                    })
                    .unwrap_or_default();

                authorships.push_row(vec![
                    Some(document_id.clone()),
                    Some(author_id.to_string()),
                    Some(institution_ids),
                    Some((i == 0).to_string()),
                ]);
            }
        }

        if misaligned {
            warn!(
                "Record {} ({}) has parallel fields of unequal length",
                document_id, year
            );
            stats.misaligned_records += 1;
        }
        stats.records_processed += 1;
    }

    let mut author_table = Table::new(EntityKind::Authors.prefix(), EntityKind::Authors.columns());
    author_table.extend_rows(authors.into_values());
    let mut institution_table = Table::new(
        EntityKind::Institutions.prefix(),
        EntityKind::Institutions.columns(),
    );
    institution_table.extend_rows(institutions.into_values());

    YearTables {
        year,
        documents,
        authors: author_table,
        institutions: institution_table,
        authorships,
    }
}

/// Processes a single year's raw artifact into `out_dir`. A missing artifact is not an error.
pub fn process_year(
    raw_dir: &Path,
    out_dir: &Path,
    year: i32,
    stats: &mut ProcessingStats,
) -> Result<Option<YearTables>> {
    let raw_path = raw_dir.join(raw_artifact_name(year));
    if !raw_path.exists() {
        stats.years_missing += 1;
        return Ok(None);
    }

    let records = read_raw_batch(&raw_path, year)?;
    let tables = process_records(&records, year, stats);
    tables.write(out_dir)?;
    stats.years_processed += 1;

    info!(
        "Processed {}: {} documents, {} authors, {} institutions, {} authorships",
        year,
        tables.documents.len(),
        tables.authors.len(),
        tables.institutions.len(),
        tables.authorships.len()
    );
    Ok(Some(tables))
}

/// Processes every requested year, newest first.
pub fn process_all(layout: &StagingLayout, out_dir: &Path) -> Result<ProcessingStats> {
    let years: Vec<i32> = layout.years_descending().collect();
    let progress = ProgressBar::new(years.len() as u64);
    progress.set_style(ProgressStyle::with_template(
        "[{elapsed_precise}] {bar:50.cyan/blue} {pos:>4}/{len:4} years | {msg}",
    )?);

    let mut stats = ProcessingStats::default();
    for year in years {
        progress.set_message(format!("processing {}", year));
        process_year(&layout.raw_dir(), out_dir, year, &mut stats)?;
        progress.inc(1);
    }
    progress.finish_with_message("record processing complete");

    info!(
        "Processed {} records from {} years ({} years without data, {} records skipped)",
        stats.records_processed, stats.years_processed, stats.years_missing, stats.records_skipped
    );
    Ok(stats)
}
