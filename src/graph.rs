//! Reshapes the cleaned tables into node and relationship files for the graph bulk importer.
//!
//! Headers follow the importer's convention: the node id column is `<property>:ID(<Label>)`,
//! relationship files carry `:START_ID(<Label>)`/`:END_ID(<Label>)` and typed properties are
//! suffixed with their type (`:boolean`, `:long`).

use anyhow::Result;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

use crate::collab::{build_collaboration_edges, edges_table};
use crate::error::PipelineError;
use crate::merge::merged_path;
use crate::schema::{parse_bool, parse_int, ColumnType, EntityKind, NATURAL_KEY};
use crate::table::{read_tsv, write_tsv, Table};

pub const AUTHOR_LABEL: &str = "Author";
pub const DOCUMENT_LABEL: &str = "Document";
pub const INSTITUTION_LABEL: &str = "Institution";
pub const AUTHORSHIP_LABEL: &str = "Authorship";

/// Node label and file, in import order.
pub const NODE_FILES: [(&str, &str); 4] = [
    (AUTHOR_LABEL, "node_authors.tsv"),
    (DOCUMENT_LABEL, "node_documents.tsv"),
    (INSTITUTION_LABEL, "node_institutions.tsv"),
    (AUTHORSHIP_LABEL, "node_authorships.tsv"),
];

/// Relationship type and file, in import order.
pub const RELATIONSHIP_FILES: [(&str, &str); 4] = [
    ("INVOLVES_AUTHOR", "rel_authorship_author.tsv"),
    ("INVOLVES_DOCUMENT", "rel_authorship_document.tsv"),
    ("INVOLVES_INSTITUTION", "rel_authorship_institution.tsv"),
    ("COLLABORATED_WITH", "rel_author_author.tsv"),
];

pub const AUTHORSHIP_ID: &str = "authorship_id";

/// Range indexes created once the bulk import has finished.
pub const INDEX_STATEMENTS: [&str; 12] = [
    "CREATE INDEX range_author_scopus_id IF NOT EXISTS FOR (a:Author) ON (a.scopus_id)",
    "CREATE INDEX range_author_name IF NOT EXISTS FOR (a:Author) ON (a.name)",
    "CREATE INDEX range_document_scopus_id IF NOT EXISTS FOR (d:Document) ON (d.scopus_id)",
    "CREATE INDEX range_document_doi IF NOT EXISTS FOR (d:Document) ON (d.doi)",
    "CREATE INDEX range_document_title IF NOT EXISTS FOR (d:Document) ON (d.title)",
    "CREATE INDEX range_institution_scopus_id IF NOT EXISTS FOR (i:Institution) ON (i.scopus_id)",
    "CREATE INDEX range_institution_name IF NOT EXISTS FOR (i:Institution) ON (i.name)",
    "CREATE INDEX range_institution_city IF NOT EXISTS FOR (i:Institution) ON (i.city)",
    "CREATE INDEX range_institution_country IF NOT EXISTS FOR (i:Institution) ON (i.country)",
    "CREATE INDEX range_authorship_author_id IF NOT EXISTS FOR (a:Authorship) ON (a.author_id)",
    "CREATE INDEX range_authorship_document_id IF NOT EXISTS FOR (a:Authorship) ON (a.document_id)",
    "CREATE INDEX range_authorship_institution_id IF NOT EXISTS \
     FOR (a:Authorship) ON (a.institution_id)",
];

pub fn id_header(property: &str, label: &str) -> String {
    format!("{}:ID({})", property, label)
}

pub fn start_id_header(label: &str) -> String {
    format!(":START_ID({})", label)
}

pub fn end_id_header(label: &str) -> String {
    format!(":END_ID({})", label)
}

/// Source of surrogate ids for authorship nodes.
pub trait KeyGenerator {
    fn next_key(&mut self) -> String;
}

/// Random v4 UUIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidKeys;

impl KeyGenerator for UuidKeys {
    fn next_key(&mut self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// `<prefix>1`, `<prefix>2`, ...
#[derive(Debug, Clone)]
pub struct SequentialKeys {
    prefix: String,
    next: u64,
}

impl SequentialKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 1,
        }
    }
}

impl KeyGenerator for SequentialKeys {
    fn next_key(&mut self) -> String {
        let key = format!("{}{}", self.prefix, self.next);
        self.next += 1;
        key
    }
}

#[derive(Debug, Clone)]
pub struct GraphExport {
    pub authors: Table,
    pub documents: Table,
    pub institutions: Table,
    pub authorships: Table,
    pub authorship_author: Table,
    pub authorship_document: Table,
    pub authorship_institution: Table,
}

impl GraphExport {
    fn node_tables(&self) -> [&Table; 4] {
        [&self.authors, &self.documents, &self.institutions, &self.authorships]
    }

    fn relationship_tables(&self) -> [&Table; 3] {
        [
            &self.authorship_author,
            &self.authorship_document,
            &self.authorship_institution,
        ]
    }

    pub fn write(&self, dir: &Path) -> Result<()> {
        for ((_, file), table) in NODE_FILES.iter().zip(self.node_tables()) {
            write_tsv(table, &dir.join(file))?;
        }
        for ((_, file), table) in RELATIONSHIP_FILES.iter().zip(self.relationship_tables()) {
            write_tsv(table, &dir.join(file))?;
        }
        Ok(())
    }
}

/// Rewrites typed columns so the importer can parse them; unparsable values become null.
fn typed_node_table(kind: EntityKind, table: &Table) -> Table {
    let mut columns = Vec::with_capacity(table.columns().len());
    let mut types = Vec::with_capacity(table.columns().len());
    for column in table.columns() {
        let ty = kind.column_type(column);
        columns.push(match ty {
            ColumnType::Text => column.clone(),
            ColumnType::Bool => format!("{}:boolean", column),
            ColumnType::Int => format!("{}:long", column),
        });
        types.push(ty);
    }

    let mut typed = Table::with_columns(table.name(), columns);
    for row in table.rows() {
        typed.push_row(
            row.iter()
                .zip(&types)
                .map(|(cell, ty)| match ty {
                    ColumnType::Text => cell.clone(),
                    ColumnType::Bool => cell
                        .as_deref()
                        .and_then(parse_bool)
                        .map(|b| b.to_string()),
                    ColumnType::Int => cell.as_deref().and_then(parse_int).map(|n| n.to_string()),
                })
                .collect(),
        );
    }
    typed
}

fn relationship_table(end_label: &str) -> Table {
    Table::with_columns(
        format!("authorship_{}", end_label.to_lowercase()),
        vec![start_id_header(AUTHORSHIP_LABEL), end_id_header(end_label)],
    )
}

fn reference_nodes(kind: EntityKind, label: &str, table: &Table) -> Result<Table, PipelineError> {
    let mut nodes = typed_node_table(kind, table);
    nodes.rename_column(NATURAL_KEY, &id_header(NATURAL_KEY, label))?;
    Ok(nodes)
}

/// Builds node and relationship tables from the cleaned canonical tables.
///
/// Every authorship row becomes one node with a fresh surrogate id plus one relationship per
/// non-null foreign key.
pub fn format_graph(
    documents: &Table,
    authors: &Table,
    institutions: &Table,
    authorships: &Table,
    keys: &mut dyn KeyGenerator,
) -> Result<GraphExport, PipelineError> {
    let author_nodes = reference_nodes(EntityKind::Authors, AUTHOR_LABEL, authors)?;
    let document_nodes = reference_nodes(EntityKind::Documents, DOCUMENT_LABEL, documents)?;
    let institution_nodes =
        reference_nodes(EntityKind::Institutions, INSTITUTION_LABEL, institutions)?;

    let typed_authorships = typed_node_table(EntityKind::Authorships, authorships);
    let mut node_columns = vec![id_header(AUTHORSHIP_ID, AUTHORSHIP_LABEL)];
    node_columns.extend(typed_authorships.columns().iter().cloned());
    let mut authorship_nodes = Table::with_columns(authorships.name(), node_columns);

    let author_idx = authorships.column_index("author_id")?;
    let document_idx = authorships.column_index("document_id")?;
    let institution_idx = authorships.column_index("institution_id")?;
    let mut authorship_author = relationship_table(AUTHOR_LABEL);
    let mut authorship_document = relationship_table(DOCUMENT_LABEL);
    let mut authorship_institution = relationship_table(INSTITUTION_LABEL);

    for row in typed_authorships.rows() {
        let key = keys.next_key();
        let mut node = Vec::with_capacity(row.len() + 1);
        node.push(Some(key.clone()));
        node.extend(row.iter().cloned());
        authorship_nodes.push_row(node);

        for (idx, rel) in [
            (author_idx, &mut authorship_author),
            (document_idx, &mut authorship_document),
            (institution_idx, &mut authorship_institution),
        ] {
            // A null reference has no edge
            if let Some(end) = &row[idx] {
                rel.push_row(vec![Some(key.clone()), Some(end.clone())]);
            }
        }
    }

    Ok(GraphExport {
        authors: author_nodes,
        documents: document_nodes,
        institutions: institution_nodes,
        authorships: authorship_nodes,
        authorship_author,
        authorship_document,
        authorship_institution,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphExportReport {
    pub authorship_nodes: usize,
    pub relationships: usize,
    pub collaboration_edges: usize,
}

/// Reads the cleaned tables from `merged_dir` and writes every import file into `graph_dir`.
pub fn export_graph(
    merged_dir: &Path,
    graph_dir: &Path,
    keys: &mut dyn KeyGenerator,
) -> Result<GraphExportReport> {
    let load = |kind: EntityKind| read_tsv(&merged_path(merged_dir, kind), kind.prefix());
    let documents = load(EntityKind::Documents)?;
    let authors = load(EntityKind::Authors)?;
    let institutions = load(EntityKind::Institutions)?;
    let authorships = load(EntityKind::Authorships)?;

    let export = format_graph(&documents, &authors, &institutions, &authorships, keys)?;
    export.write(graph_dir)?;

    let edges = build_collaboration_edges(&authorships, &authors)?;
    let (_, collab_file) = RELATIONSHIP_FILES[3];
    write_tsv(&edges_table(&edges), &graph_dir.join(collab_file))?;

    let report = GraphExportReport {
        authorship_nodes: export.authorships.len(),
        relationships: export
            .relationship_tables()
            .iter()
            .map(|t| t.len())
            .sum(),
        collaboration_edges: edges.len(),
    };
    info!(
        "Exported {} authorship nodes, {} authorship relationships, {} collaboration edges",
        report.authorship_nodes, report.relationships, report.collaboration_edges
    );
    Ok(report)
}
