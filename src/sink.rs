//! Relational sink boundary.
//!
//! The store's connection and bulk-insert mechanics live behind [`RelationalSink`]. This module
//! turns the cleaned tables into typed row mappings and feeds them in dependency order.

use anyhow::Result;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::merge::merged_path;
use crate::schema::{parse_bool, parse_int, ColumnType, EntityKind};
use crate::table::{read_tsv, Table};

pub type RowMapping = Map<String, Value>;

/// Independent entities first, then the junction that references them.
pub const LOAD_ORDER: [EntityKind; 4] = [
    EntityKind::Authors,
    EntityKind::Documents,
    EntityKind::Institutions,
    EntityKind::Authorships,
];

#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    /// A constraint rejected the batch; the sink has rolled it back.
    #[error("constraint violation: {0}")]
    Conflict(String),

    #[error("{0}")]
    Fatal(String),
}

pub trait RelationalSink {
    fn insert_batch(&mut self, entity: EntityKind, rows: &[RowMapping]) -> Result<(), SinkError>;
}

fn typed_value(ty: ColumnType, cell: Option<&str>) -> Value {
    match (ty, cell) {
        (_, None) => Value::Null,
        (ColumnType::Text, Some(text)) => Value::String(text.to_string()),
        (ColumnType::Bool, Some(text)) => parse_bool(text).map(Value::Bool).unwrap_or(Value::Null),
        (ColumnType::Int, Some(text)) => parse_int(text).map(Value::from).unwrap_or(Value::Null),
    }
}

/// One mapping per row, keyed by column name.
pub fn row_mappings(kind: EntityKind, table: &Table) -> Vec<RowMapping> {
    let types: Vec<ColumnType> = table
        .columns()
        .iter()
        .map(|c| kind.column_type(c))
        .collect();
    table
        .rows()
        .iter()
        .map(|row| {
            table
                .columns()
                .iter()
                .zip(&types)
                .zip(row)
                .map(|((column, ty), cell)| (column.clone(), typed_value(*ty, cell.as_deref())))
                .collect()
        })
        .collect()
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: Vec<(EntityKind, usize)>,
    pub rejected: Vec<EntityKind>,
}

/// Inserts every cleaned table. A rejected batch is logged and skipped; a fatal sink error
/// aborts the load.
pub fn load_relational(sink: &mut dyn RelationalSink, merged_dir: &Path) -> Result<LoadReport> {
    let mut report = LoadReport::default();
    for kind in LOAD_ORDER {
        let table = read_tsv(&merged_path(merged_dir, kind), kind.prefix())?;
        let mappings = row_mappings(kind, &table);

        match sink.insert_batch(kind, &mappings) {
            Ok(()) => {
                info!("Inserted {} {} rows", mappings.len(), kind);
                report.loaded.push((kind, mappings.len()));
            }
            Err(SinkError::Conflict(message)) => {
                warn!("Ignored duplicated and/or invalid {} batch: {}", kind, message);
                report.rejected.push(kind);
            }
            Err(SinkError::Fatal(message)) => {
                return Err(PipelineError::SinkFailure {
                    entity: kind.to_string(),
                    message,
                }
                .into());
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::write_tsv;

    fn s(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    #[derive(Default)]
    struct RecordingSink {
        inserted: Vec<(EntityKind, Vec<RowMapping>)>,
        reject: Option<EntityKind>,
        fail: Option<EntityKind>,
    }

    impl RelationalSink for RecordingSink {
        fn insert_batch(
            &mut self,
            entity: EntityKind,
            rows: &[RowMapping],
        ) -> Result<(), SinkError> {
            if self.fail == Some(entity) {
                return Err(SinkError::Fatal("connection lost".into()));
            }
            if self.reject == Some(entity) {
                return Err(SinkError::Conflict("duplicate key".into()));
            }
            self.inserted.push((entity, rows.to_vec()));
            Ok(())
        }
    }

    fn merged_fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for kind in EntityKind::ALL {
            let mut table = Table::new(kind.prefix(), kind.columns());
            if kind == EntityKind::Authorships {
                table.push_row(vec![s("D1"), s("A1"), None, s("true")]);
            }
            write_tsv(&table, &merged_path(dir.path(), kind)).unwrap();
        }
        dir
    }

    #[test]
    fn mappings_are_typed() {
        let mut table = Table::new("documents", &["scopus_id", "openaccess", "citedby_count"]);
        table.push_row(vec![s("D1"), s("true"), s("5")]);
        let rows = row_mappings(EntityKind::Documents, &table);

        assert_eq!(rows[0]["openaccess"], Value::Bool(true));
        assert_eq!(rows[0]["citedby_count"], Value::from(5));
        assert_eq!(rows[0]["scopus_id"], Value::String("D1".into()));
    }

    #[test]
    fn loads_in_dependency_order_and_skips_conflicts() {
        let merged = merged_fixture();
        let mut sink = RecordingSink {
            reject: Some(EntityKind::Documents),
            ..Default::default()
        };

        let report = load_relational(&mut sink, merged.path()).unwrap();
        let order: Vec<_> = sink.inserted.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            order,
            vec![EntityKind::Authors, EntityKind::Institutions, EntityKind::Authorships]
        );
        assert_eq!(report.rejected, vec![EntityKind::Documents]);
        assert_eq!(sink.inserted[2].1[0]["institution_id"], Value::Null);
    }

    #[test]
    fn fatal_sink_error_aborts() {
        let merged = merged_fixture();
        let mut sink = RecordingSink {
            fail: Some(EntityKind::Institutions),
            ..Default::default()
        };

        let err = load_relational(&mut sink, merged.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::SinkFailure { .. })
        ));
        assert_eq!(sink.inserted.len(), 2);
    }
}
