//! Author-author collaboration edges derived from shared documents.

use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;

use crate::error::PipelineError;
use crate::graph::{end_id_header, start_id_header, AUTHOR_LABEL};
use crate::schema::{parse_int, NATURAL_KEY};
use crate::table::{read_tsv, Table};

pub const COUNT_HEADER: &str = "count:long";

/// An unordered author pair, stored with `author1 < author2`, and the number of distinct
/// documents they share.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollaborationEdge {
    pub author1: String,
    pub author2: String,
    pub count: u64,
}

/// Self-joins authorships on `document_id`, keeping pairs with `a1 < a2`, and counts distinct
/// shared documents per pair. Only authors present in `authors` take part.
///
/// Output is ordered by count descending, then by the author ids.
pub fn build_collaboration_edges(
    authorships: &Table,
    authors: &Table,
) -> Result<Vec<CollaborationEdge>, PipelineError> {
    let known: HashSet<&str> = authors.column(NATURAL_KEY)?.flatten().collect();
    let document_idx = authorships.column_index("document_id")?;
    let author_idx = authorships.column_index("author_id")?;

    // One author may appear on a document several times (one row per institution); the set
    // collapses those so each document counts once per pair.
    let mut by_document: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for row in authorships.rows() {
        let (Some(document), Some(author)) =
            (row[document_idx].as_deref(), row[author_idx].as_deref())
        else {
            continue;
        };
        if known.contains(author) {
            by_document.entry(document).or_default().insert(author);
        }
    }

    let mut counts: HashMap<(&str, &str), u64> = HashMap::new();
    for coauthors in by_document.values() {
        let coauthors: Vec<&str> = coauthors.iter().copied().collect();
        for (i, a1) in coauthors.iter().enumerate() {
            for a2 in &coauthors[i + 1..] {
                *counts.entry((*a1, *a2)).or_insert(0) += 1;
            }
        }
    }

    let mut edges: Vec<CollaborationEdge> = counts
        .into_iter()
        .map(|((a1, a2), count)| CollaborationEdge {
            author1: a1.to_string(),
            author2: a2.to_string(),
            count,
        })
        .collect();
    edges.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.author1.cmp(&b.author1))
            .then_with(|| a.author2.cmp(&b.author2))
    });
    Ok(edges)
}

/// `:START_ID(Author)`, `:END_ID(Author)`, `count:long`
pub fn edges_table(edges: &[CollaborationEdge]) -> Table {
    let mut table = Table::with_columns(
        "author_author",
        vec![
            start_id_header(AUTHOR_LABEL),
            end_id_header(AUTHOR_LABEL),
            COUNT_HEADER.to_string(),
        ],
    );
    for edge in edges {
        table.push_row(vec![
            Some(edge.author1.clone()),
            Some(edge.author2.clone()),
            Some(edge.count.to_string()),
        ]);
    }
    table
}

/// Reads an exported `rel_author_author.tsv` back into edges.
pub fn read_collaboration_edges(path: &Path) -> Result<Vec<CollaborationEdge>> {
    let table = read_tsv(path, "author_author")?;
    let start = table.column_index(&start_id_header(AUTHOR_LABEL))?;
    let end = table.column_index(&end_id_header(AUTHOR_LABEL))?;
    let count = table.column_index(COUNT_HEADER)?;

    table
        .rows()
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let parsed = match (&row[start], &row[end], row[count].as_deref().and_then(parse_int)) {
                (Some(a1), Some(a2), Some(n)) if n >= 0 => Some(CollaborationEdge {
                    author1: a1.clone(),
                    author2: a2.clone(),
                    count: n as u64,
                }),
                _ => None,
            };
            parsed.with_context(|| format!("Invalid edge on row {} of {}", i + 1, path.display()))
        })
        .collect()
}
