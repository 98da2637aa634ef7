//! Explodes the comma-joined `institution_ids` column into one row per institution.

use anyhow::Result;
use std::path::Path;
use tracing::info;

use crate::error::PipelineError;
use crate::merge::merged_path;
use crate::processor::JOINED_SEPARATOR;
use crate::schema::EntityKind;
use crate::table::{read_tsv, write_tsv, Cell, Table};

const JOINED_COLUMN: &str = "institution_ids";
const EXPLODED_COLUMN: &str = "institution_id";

/// Institution tokens of one joined cell. A null or empty cell is a single null token, so an
/// author without institutions keeps exactly one row.
pub fn institution_tokens(joined: Option<&str>) -> Vec<Cell> {
    match joined {
        None | Some("") => vec![None],
        Some(joined) => joined
            .split(JOINED_SEPARATOR)
            .map(|token| {
                if token.is_empty() {
                    None
                } else {
                    Some(token.to_string())
                }
            })
            .collect(),
    }
}

/// One output row per institution token; every other column is copied.
pub fn explode_institutions(authorships: &Table) -> Result<Table, PipelineError> {
    let idx = authorships.column_index(JOINED_COLUMN)?;
    let mut columns = authorships.columns().to_vec();
    columns[idx] = EXPLODED_COLUMN.to_string();

    let mut exploded = Table::with_columns(authorships.name(), columns);
    for row in authorships.rows() {
        for token in institution_tokens(row[idx].as_deref()) {
            let mut out = row.clone();
            out[idx] = token;
            exploded.push_row(out);
        }
    }
    Ok(exploded)
}

/// Rewrites the merged authorships file in place.
pub fn normalize_authorships(merged_dir: &Path) -> Result<()> {
    let path = merged_path(merged_dir, EntityKind::Authorships);
    let before = read_tsv(&path, EntityKind::Authorships.prefix())?;
    let after = explode_institutions(&before)?;
    write_tsv(&after, &path)?;
    info!(
        "Normalized authorships: {} rows became {}",
        before.len(),
        after.len()
    );
    Ok(())
}
