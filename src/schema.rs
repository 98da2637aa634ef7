//! Canonical entity schemas.

use std::fmt;

pub const DOCUMENT_COLUMNS: &[&str] = &[
    "scopus_id",
    "title",
    "doi",
    "openaccess",
    "date",
    "document_type",
    "document_type_description",
    "volume",
    "issue",
    "page",
    "citedby_count",
    "funding_acronym",
    "funding_number",
    "funding_name",
    "source_name",
    "source_type",
    "source_id",
    "source_issn",
    "source_eissn",
];

pub const AUTHOR_COLUMNS: &[&str] = &["scopus_id", "name"];

pub const INSTITUTION_COLUMNS: &[&str] = &["scopus_id", "name", "city", "country"];

/// Per-year authorship rows, institutions still comma-joined.
pub const PROCESSED_AUTHORSHIP_COLUMNS: &[&str] =
    &["document_id", "author_id", "institution_ids", "first_author"];

/// Authorship after normalization: one institution per row.
pub const AUTHORSHIP_COLUMNS: &[&str] =
    &["document_id", "author_id", "institution_id", "first_author"];

pub const NATURAL_KEY: &str = "scopus_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Documents,
    Authors,
    Institutions,
    Authorships,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Documents,
        EntityKind::Institutions,
        EntityKind::Authors,
        EntityKind::Authorships,
    ];

    /// File prefix used for processed and merged artifacts.
    pub fn prefix(self) -> &'static str {
        match self {
            EntityKind::Documents => "documents",
            EntityKind::Authors => "authors",
            EntityKind::Institutions => "institutions",
            EntityKind::Authorships => "authorships",
        }
    }

    /// Columns of the per-year processed artifact.
    pub fn processed_columns(self) -> &'static [&'static str] {
        match self {
            EntityKind::Authorships => PROCESSED_AUTHORSHIP_COLUMNS,
            other => other.columns(),
        }
    }

    /// Columns of the canonical, cleaned table.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            EntityKind::Documents => DOCUMENT_COLUMNS,
            EntityKind::Authors => AUTHOR_COLUMNS,
            EntityKind::Institutions => INSTITUTION_COLUMNS,
            EntityKind::Authorships => AUTHORSHIP_COLUMNS,
        }
    }

    /// `Some("scopus_id")` for reference entities; the junction has no natural key.
    pub fn natural_key(self) -> Option<&'static str> {
        match self {
            EntityKind::Authorships => None,
            _ => Some(NATURAL_KEY),
        }
    }

    pub fn column_type(self, column: &str) -> ColumnType {
        match (self, column) {
            (EntityKind::Documents, "openaccess") => ColumnType::Bool,
            (EntityKind::Documents, "citedby_count") => ColumnType::Int,
            (EntityKind::Authorships, "first_author") => ColumnType::Bool,
            _ => ColumnType::Text,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Bool,
    Int,
}

/// Reads the boolean spellings found in raw batches and staged files.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "true" | "True" | "TRUE" | "1" => Some(true),
        "false" | "False" | "FALSE" | "0" => Some(false),
        _ => None,
    }
}

pub fn parse_int(value: &str) -> Option<i64> {
    let trimmed = value.trim();
    trimmed.parse::<i64>().ok().or_else(|| {
        // "12.0" shows up when an upstream tool wrote counts as floats
        trimmed
            .parse::<f64>()
            .ok()
            // 2^63 itself is out of range; `as` would saturate it to i64::MAX
            .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
            .map(|f| f as i64)
    })
}
