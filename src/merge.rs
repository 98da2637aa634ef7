//! Unions the per-year processed tables into one table per entity kind.

use anyhow::{Context, Result};
use glob::glob;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::schema::EntityKind;
use crate::table::{read_tsv, write_tsv, Table};

/// Processed artifacts for `kind`, newest year first.
pub fn find_year_artifacts(processed_dir: &Path, kind: EntityKind) -> Result<Vec<(i32, PathBuf)>> {
    let pattern = format!("{}/{}_*.tsv", processed_dir.display(), kind.prefix());
    let mut found = Vec::new();

    for entry in glob(&pattern).with_context(|| format!("Bad glob pattern {}", pattern))? {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                warn!("Error reading glob entry: {}", e);
                continue;
            }
        };
        let year = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.strip_prefix(kind.prefix()))
            .and_then(|rest| rest.strip_prefix('_'))
            .and_then(|year| year.parse::<i32>().ok());
        match year {
            Some(year) => found.push((year, path)),
            None => warn!("Ignoring {} (no year suffix)", path.display()),
        }
    }

    found.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(found)
}

/// Concatenates every year of `kind`, newest year first, rows in file order.
///
/// Cells stay text; each year's file is aligned to the processed schema by column name.
pub fn merge_entity(processed_dir: &Path, kind: EntityKind) -> Result<Table> {
    let mut merged = Table::new(kind.prefix(), kind.processed_columns());
    for (year, path) in find_year_artifacts(processed_dir, kind)? {
        let yearly = read_tsv(&path, kind.prefix())?;
        let aligned = yearly.project(kind.processed_columns());
        info!("Merging {} {} rows from {}", aligned.len(), kind, year);
        merged.extend_rows(aligned.into_rows());
    }
    Ok(merged)
}

/// Writes `<prefix>.tsv` for every entity kind into `merged_dir`.
pub fn merge_all(processed_dir: &Path, merged_dir: &Path) -> Result<()> {
    for kind in EntityKind::ALL {
        let merged = merge_entity(processed_dir, kind)?;
        write_tsv(&merged, &merged_path(merged_dir, kind))?;
        info!("Merged {} rows into {}.tsv", merged.len(), kind);
    }
    Ok(())
}

pub fn merged_path(merged_dir: &Path, kind: EntityKind) -> PathBuf {
    merged_dir.join(format!("{}.tsv", kind.prefix()))
}
