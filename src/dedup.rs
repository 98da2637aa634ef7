//! Duplicate removal for the merged tables.
//!
//! Reference entities are unique by `scopus_id` and keep their first occurrence. Because merge
//! concatenates newest year first, the newest version of an entity survives. Authorships have no
//! single key and are deduplicated on the whole row.

use anyhow::Result;
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use crate::accumulator::{Accumulator, MergePolicy};
use crate::error::PipelineError;
use crate::merge::merged_path;
use crate::schema::EntityKind;
use crate::table::{read_tsv, write_tsv, Row, Table};

/// Keeps the first row for each value of `key`. Rows with a null key are dropped.
pub fn dedup_by_key(table: &Table, key: &str) -> Result<Table, PipelineError> {
    let idx = table.column_index(key)?;
    let mut first_seen: Accumulator<String, Row> = Accumulator::new(MergePolicy::KeepFirst);
    for row in table.rows() {
        if let Some(id) = &row[idx] {
            first_seen.upsert(id.clone(), row.clone());
        }
    }

    let mut deduped = Table::with_columns(table.name(), table.columns().to_vec());
    deduped.extend_rows(first_seen.into_values());
    Ok(deduped)
}

/// Keeps the first of each set of identical rows.
pub fn dedup_rows(table: &Table) -> Table {
    let mut seen: HashSet<&Row> = HashSet::with_capacity(table.len());
    let mut deduped = Table::with_columns(table.name(), table.columns().to_vec());
    for row in table.rows() {
        if seen.insert(row) {
            deduped.push_row(row.clone());
        }
    }
    deduped
}

pub fn dedup_table(kind: EntityKind, table: &Table) -> Result<Table, PipelineError> {
    match kind.natural_key() {
        Some(key) => dedup_by_key(table, key),
        None => Ok(dedup_rows(table)),
    }
}

/// Rewrites every merged table without duplicates.
pub fn drop_duplicates(merged_dir: &Path) -> Result<()> {
    for kind in EntityKind::ALL {
        let path = merged_path(merged_dir, kind);
        let table = read_tsv(&path, kind.prefix())?;
        let deduped = dedup_table(kind, &table)?;
        write_tsv(&deduped, &path)?;
        info!(
            "Deduplicated {}: {} rows -> {}",
            kind,
            table.len(),
            deduped.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    #[test]
    fn first_occurrence_wins_per_key() {
        let mut authors = Table::new("authors", EntityKind::Authors.columns());
        authors.push_row(vec![s("A1"), s("Ada (2021)")]);
        authors.push_row(vec![s("A2"), s("Bob")]);
        authors.push_row(vec![s("A1"), s("Ada (2019)")]);

        let deduped = dedup_table(EntityKind::Authors, &authors).unwrap();
        assert_eq!(
            deduped.rows(),
            &[vec![s("A1"), s("Ada (2021)")], vec![s("A2"), s("Bob")]]
        );
    }

    #[test]
    fn authorships_dedup_on_full_row() {
        let mut table = Table::new("authorships", EntityKind::Authorships.columns());
        table.push_row(vec![s("D1"), s("A1"), s("I1"), s("true")]);
        table.push_row(vec![s("D1"), s("A1"), s("I1"), s("true")]);
        table.push_row(vec![s("D1"), s("A1"), None, s("true")]);
        table.push_row(vec![s("D1"), s("A1"), s("I1"), s("false")]);

        let deduped = dedup_table(EntityKind::Authorships, &table).unwrap();
        assert_eq!(deduped.len(), 3);
    }

    #[test]
    fn dedup_is_idempotent() {
        let mut docs = Table::new("documents", &["scopus_id", "title"]);
        docs.push_row(vec![s("D1"), s("a")]);
        docs.push_row(vec![s("D1"), s("b")]);
        docs.push_row(vec![s("D2"), s("c")]);

        let once = dedup_table(EntityKind::Documents, &docs).unwrap();
        let twice = dedup_table(EntityKind::Documents, &once).unwrap();
        assert_eq!(once, twice);
    }
}
