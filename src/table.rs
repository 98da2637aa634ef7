//! In-memory TSV tables.
//!
//! Every staged artifact is a header row plus text cells. An empty field is null, so cells are
//! `Option<String>` and coercion to bools and integers is left to the consumers that need it.

use anyhow::{Context, Result};
use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use std::path::Path;

use crate::error::PipelineError;

pub type Cell = Option<String>;
pub type Row = Vec<Cell>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self::with_columns(name, columns.iter().map(|c| c.to_string()).collect())
    }

    pub fn with_columns(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Appends a row, padding or truncating it to the column count.
    pub fn push_row(&mut self, mut row: Row) {
        row.resize(self.columns.len(), None);
        self.rows.push(row);
    }

    pub fn extend_rows(&mut self, rows: impl IntoIterator<Item = Row>) {
        for row in rows {
            self.push_row(row);
        }
    }

    pub fn column_index(&self, column: &str) -> Result<usize, PipelineError> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| PipelineError::missing_column(&self.name, column))
    }

    /// Values of one column, in row order.
    pub fn column(
        &self,
        column: &str,
    ) -> Result<impl Iterator<Item = Option<&str>> + '_, PipelineError> {
        let idx = self.column_index(column)?;
        Ok(self.rows.iter().map(move |row| row[idx].as_deref()))
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<(), PipelineError> {
        let idx = self.column_index(from)?;
        self.columns[idx] = to.to_string();
        Ok(())
    }

    pub fn retain(&mut self, keep: impl FnMut(&Row) -> bool) {
        self.rows.retain(keep);
    }

    /// Reorders and narrows the table to `columns`. Columns absent from the source become null.
    pub fn project(&self, columns: &[&str]) -> Table {
        let sources: Vec<Option<usize>> = columns
            .iter()
            .map(|c| self.columns.iter().position(|own| own == c))
            .collect();

        let mut projected = Table::new(self.name.clone(), columns);
        for row in &self.rows {
            projected.rows.push(
                sources
                    .iter()
                    .map(|src| src.and_then(|i| row[i].clone()))
                    .collect(),
            );
        }
        projected
    }

    /// Looks up a cell by column name on a row of this table.
    pub fn cell<'a>(&self, row: &'a Row, column: &str) -> Result<Option<&'a str>, PipelineError> {
        let idx = self.column_index(column)?;
        Ok(row[idx].as_deref())
    }
}

fn to_cell(field: &str) -> Cell {
    if field.is_empty() {
        None
    } else {
        Some(field.to_string())
    }
}

pub fn read_tsv(path: &Path, name: &str) -> Result<Table> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let columns: Vec<String> = reader
        .headers()
        .with_context(|| format!("Unable to read headers of {}", path.display()))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut table = Table::with_columns(name, columns);
    for record in reader.records() {
        let record = record.with_context(|| format!("Malformed row in {}", path.display()))?;
        table.push_row(record.iter().map(to_cell).collect());
    }
    Ok(table)
}

pub fn write_tsv(table: &Table, path: &Path) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(QuoteStyle::Necessary)
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    writer
        .write_record(&table.columns)
        .with_context(|| format!("Failed to write header of {}", path.display()))?;
    for row in &table.rows {
        writer
            .write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))
            .with_context(|| format!("Failed to write row to {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to flush {}", path.display()))?;
    Ok(())
}
