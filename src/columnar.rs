//! Typed Parquet copies of the cleaned tables.
//!
//! The staged TSVs keep every cell as text; this is where booleans and counts are coerced for
//! consumers that want typed columns.

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, BooleanArray, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::merge::merged_path;
use crate::schema::{parse_bool, parse_int, ColumnType, EntityKind};
use crate::table::{read_tsv, Table};

// Macro for creating nullable Arrow schema fields
macro_rules! field {
    ($name:expr, $data_type:expr) => {
        Field::new($name, $data_type, true)
    };
    ($name:expr, $data_type:expr, $nullable:expr) => {
        Field::new($name, $data_type, $nullable)
    };
}

// Macro for creating record batches with less boilerplate
macro_rules! record_batch {
    ($schema:expr, $columns:expr) => {
        RecordBatch::try_new(Arc::new($schema), $columns)
    };
}

fn data_type(ty: ColumnType) -> DataType {
    match ty {
        ColumnType::Text => DataType::Utf8,
        ColumnType::Bool => DataType::Boolean,
        ColumnType::Int => DataType::Int64,
    }
}

pub fn arrow_schema(kind: EntityKind) -> Schema {
    let fields: Vec<Field> = kind
        .columns()
        .iter()
        .map(|column| {
            // The natural key is never null after deduplication
            if Some(*column) == kind.natural_key() {
                field!(*column, DataType::Utf8, false)
            } else {
                field!(*column, data_type(kind.column_type(column)))
            }
        })
        .collect();
    Schema::new(fields)
}

fn create_parquet_writer(output_path: &Path, schema: Schema) -> Result<ArrowWriter<File>> {
    let file = File::create(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_max_row_group_size(1_000_000)
        .build();

    let writer = ArrowWriter::try_new(file, Arc::new(schema), Some(props))?;
    Ok(writer)
}

/// Converts a canonical table into a typed batch. Returns the batch and the number of non-null
/// cells that failed coercion (written as null).
pub fn to_record_batch(kind: EntityKind, table: &Table) -> Result<(RecordBatch, u64)> {
    let table = table.project(kind.columns());
    let mut failures = 0u64;
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(kind.columns().len());

    for (idx, column) in kind.columns().iter().enumerate() {
        let cells = table.rows().iter().map(|row| row[idx].as_deref());
        let array: ArrayRef = match kind.column_type(column) {
            ColumnType::Text => Arc::new(StringArray::from_iter(cells)),
            ColumnType::Bool => Arc::new(BooleanArray::from_iter(cells.map(|cell| {
                let parsed = cell.and_then(parse_bool);
                failures += u64::from(cell.is_some() && parsed.is_none());
                parsed
            }))),
            ColumnType::Int => Arc::new(Int64Array::from_iter(cells.map(|cell| {
                let parsed = cell.and_then(parse_int);
                failures += u64::from(cell.is_some() && parsed.is_none());
                parsed
            }))),
        };
        columns.push(array);
    }

    let batch = record_batch!(arrow_schema(kind), columns)?;
    Ok((batch, failures))
}

pub fn parquet_path(parquet_dir: &Path, kind: EntityKind) -> PathBuf {
    parquet_dir.join(format!("{}.parquet", kind.prefix()))
}

/// Writes `<prefix>.parquet` for every cleaned table. Returns the total coercion failures.
pub fn export_columnar(merged_dir: &Path, parquet_dir: &Path) -> Result<u64> {
    let mut total_failures = 0;
    for kind in EntityKind::ALL {
        let table = read_tsv(&merged_path(merged_dir, kind), kind.prefix())?;
        let (batch, failures) = to_record_batch(kind, &table)?;

        let mut writer =
            create_parquet_writer(&parquet_path(parquet_dir, kind), arrow_schema(kind))?;
        writer.write(&batch)?;
        writer.close()?;

        if failures > 0 {
            warn!("{} {} cells could not be coerced and were written as null", failures, kind);
        }
        info!("Wrote {} {} rows to Parquet", batch.num_rows(), kind);
        total_failures += failures;
    }
    Ok(total_failures)
}
