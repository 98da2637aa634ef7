//! Capability interface for graph analytics over the collaboration edges.
//!
//! A graph engine runs community detection against the imported graph; the pipeline only needs
//! to name an algorithm, hand over parameters and read back metrics. [`InMemoryAnalytics`]
//! answers the same calls from the exported edge list so results can be checked without an
//! engine.

use anyhow::{bail, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use crate::collab::{read_collaboration_edges, CollaborationEdge};
use crate::graph::RELATIONSHIP_FILES;

pub type AlgorithmParams = Map<String, Value>;

/// Minimum collaboration count for an edge to take part, as the projection param is named.
pub const MIN_WEIGHT_PARAM: &str = "minWeight";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlgorithmMetrics {
    pub nodes: u64,
    pub edges: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub communities: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modularity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_degree: Option<u64>,
}

pub trait GraphAnalytics {
    fn run_algorithm(&mut self, name: &str, params: &AlgorithmParams) -> Result<AlgorithmMetrics>;
}

#[derive(Debug, Clone)]
pub struct AlgorithmRequest {
    pub name: String,
    pub params: AlgorithmParams,
}

impl AlgorithmRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: AlgorithmParams::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }
}

/// Runs each request in order and logs its metrics.
pub fn run_community_detection(
    analytics: &mut dyn GraphAnalytics,
    requests: &[AlgorithmRequest],
) -> Result<Vec<(String, AlgorithmMetrics)>> {
    let mut results = Vec::with_capacity(requests.len());
    for request in requests {
        let metrics = analytics.run_algorithm(&request.name, &request.params)?;
        info!(
            "{}: {} nodes, {} edges, communities {:?}, modularity {:?}",
            request.name, metrics.nodes, metrics.edges, metrics.communities, metrics.modularity
        );
        results.push((request.name.clone(), metrics));
    }
    Ok(results)
}

/// Connected components and degree over the exported collaboration edges in `graph_dir`.
///
/// Fails when the edge file is missing or unreadable.
pub fn summarize_collaboration(
    graph_dir: &Path,
    min_weight: u64,
) -> Result<Vec<(String, AlgorithmMetrics)>> {
    let (_, collab_file) = RELATIONSHIP_FILES[3];
    let edges = read_collaboration_edges(&graph_dir.join(collab_file))?;
    let mut analytics = InMemoryAnalytics::new(edges);
    let requests = [
        AlgorithmRequest::new("connectedComponents").with_param(MIN_WEIGHT_PARAM, min_weight),
        AlgorithmRequest::new("degree").with_param(MIN_WEIGHT_PARAM, min_weight),
    ];
    run_community_detection(&mut analytics, &requests)
}

/// Answers algorithm calls from an in-memory weighted edge list.
#[derive(Debug, Clone)]
pub struct InMemoryAnalytics {
    edges: Vec<CollaborationEdge>,
}

impl InMemoryAnalytics {
    pub fn new(edges: Vec<CollaborationEdge>) -> Self {
        Self { edges }
    }

    fn projected(&self, params: &AlgorithmParams) -> Result<Vec<&CollaborationEdge>> {
        let min_weight = match params.get(MIN_WEIGHT_PARAM) {
            None => 1,
            Some(v) => match v.as_u64() {
                Some(w) => w,
                None => bail!("{} must be a non-negative integer, got {}", MIN_WEIGHT_PARAM, v),
            },
        };
        Ok(self.edges.iter().filter(|e| e.count >= min_weight).collect())
    }
}

/// Weighted degree per node of an undirected edge list.
fn weighted_degrees<'a>(edges: &[&'a CollaborationEdge]) -> HashMap<&'a str, u64> {
    let mut degrees = HashMap::new();
    for edge in edges {
        *degrees.entry(edge.author1.as_str()).or_insert(0) += edge.count;
        *degrees.entry(edge.author2.as_str()).or_insert(0) += edge.count;
    }
    degrees
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}

fn connected_components(edges: &[&CollaborationEdge]) -> AlgorithmMetrics {
    let degrees = weighted_degrees(edges);
    let index: HashMap<&str, usize> = degrees
        .keys()
        .enumerate()
        .map(|(i, node)| (*node, i))
        .collect();

    let mut sets = DisjointSet::new(index.len());
    for edge in edges {
        sets.union(index[edge.author1.as_str()], index[edge.author2.as_str()]);
    }

    // Every edge is internal to its component, so modularity reduces to 1 - sum((d_c / 2m)^2).
    let mut component_degree: HashMap<usize, u64> = HashMap::new();
    for (node, i) in &index {
        *component_degree.entry(sets.find(*i)).or_insert(0) += degrees[node];
    }
    let total_weight: u64 = edges.iter().map(|e| e.count).sum();
    let modularity = if total_weight == 0 {
        None
    } else {
        let two_m = 2.0 * total_weight as f64;
        Some(
            1.0 - component_degree
                .values()
                .map(|d| (*d as f64 / two_m).powi(2))
                .sum::<f64>(),
        )
    };

    AlgorithmMetrics {
        nodes: index.len() as u64,
        edges: edges.len() as u64,
        communities: Some(component_degree.len() as u64),
        modularity,
        max_degree: None,
    }
}

impl GraphAnalytics for InMemoryAnalytics {
    fn run_algorithm(&mut self, name: &str, params: &AlgorithmParams) -> Result<AlgorithmMetrics> {
        let edges = self.projected(params)?;
        match name {
            "connectedComponents" => Ok(connected_components(&edges)),
            "degree" => {
                let degrees = weighted_degrees(&edges);
                Ok(AlgorithmMetrics {
                    nodes: degrees.len() as u64,
                    edges: edges.len() as u64,
                    max_degree: degrees.values().max().copied(),
                    ..Default::default()
                })
            }
            other => bail!("algorithm `{}` is not supported in memory", other),
        }
    }
}
