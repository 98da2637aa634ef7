//! Staged transform of per-year Scopus search results into clean relational tables and graph
//! bulk-import files.
//!
//! Stages run in order: [`processor`] per year, [`merge`] across years, [`normalize`],
//! [`clean`] and [`dedup`] on the merged tables, then [`graph`] and [`collab`] for the graph
//! store. [`pipeline`] sequences them with directory checkpoints.

pub mod accumulator;
pub mod analytics;
pub mod clean;
pub mod collab;
pub mod columnar;
pub mod dedup;
pub mod error;
pub mod extract;
pub mod graph;
pub mod helpers;
pub mod importer;
pub mod merge;
pub mod normalize;
pub mod pipeline;
pub mod processor;
pub mod schema;
pub mod sink;
pub mod table;

pub use error::PipelineError;
pub use helpers::StagingLayout;
pub use pipeline::{Pipeline, PipelineConfig, PipelineState};
