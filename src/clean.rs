//! Referential filter for the authorship junction.

use anyhow::Result;
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use crate::error::PipelineError;
use crate::merge::merged_path;
use crate::schema::{EntityKind, NATURAL_KEY};
use crate::table::{read_tsv, write_tsv, Table};

/// Decimal places of the reported removal percentage.
const PERCENT_PRECISION: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterReport {
    pub before: usize,
    pub after: usize,
    pub removed: usize,
    pub removed_percentage: f64,
}

impl FilterReport {
    fn new(before: usize, after: usize) -> Self {
        let removed = before - after;
        let removed_percentage = if before == 0 {
            0.0
        } else {
            let scale = 10f64.powi(PERCENT_PRECISION);
            (removed as f64 / before as f64 * 100.0 * scale).round() / scale
        };
        Self {
            before,
            after,
            removed,
            removed_percentage,
        }
    }
}

/// Drops authorship rows whose non-null `institution_id` is not a known institution.
///
/// Rows with a null institution are always kept.
pub fn filter_unknown_institutions(
    authorships: &mut Table,
    institutions: &Table,
) -> Result<FilterReport, PipelineError> {
    let known: HashSet<String> = institutions
        .column(NATURAL_KEY)?
        .flatten()
        .map(str::to_string)
        .collect();
    let idx = authorships.column_index("institution_id")?;

    let before = authorships.len();
    authorships.retain(|row| match row[idx].as_deref() {
        None => true,
        Some(id) => known.contains(id),
    });
    Ok(FilterReport::new(before, authorships.len()))
}

/// Rewrites the merged authorships file without dangling institution references.
pub fn clean_authorships(merged_dir: &Path) -> Result<FilterReport> {
    let authorships_path = merged_path(merged_dir, EntityKind::Authorships);
    let mut authorships = read_tsv(&authorships_path, EntityKind::Authorships.prefix())?;
    let institutions = read_tsv(
        &merged_path(merged_dir, EntityKind::Institutions),
        EntityKind::Institutions.prefix(),
    )?;

    let report = filter_unknown_institutions(&mut authorships, &institutions)?;
    write_tsv(&authorships, &authorships_path)?;

    info!("number of authorships before cleaning: {}", report.before);
    info!("number of authorships after cleaning: {}", report.after);
    info!(
        "percentage of authorships removed: {:.2}%",
        report.removed_percentage
    );
    Ok(report)
}
