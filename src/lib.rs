//! # wikibridge
//!
//! Bidirectional reconciliation between a flat property-graph export (the
//! Neo4j bulk-import CSV dialect) and a Wikibase-style entity/statement
//! store.
//!
//! ## Architecture
//!
//! - **Model** (`model`): table rows, statement records, provenance groups
//! - **Tables** (`tables`): CSV reading/writing with `"None"` normalization
//! - **Resolver** (`resolver`): the in-run CURIE/URI ↔ entity-id map
//! - **Synchronizers** (`sync`): bootstrap schema, property and item creation
//! - **Builder** (`builder`): edge aggregation into batched statement writes
//! - **Exporter** (`export`): rendering the store back into graph tables
//! - **Pipeline** (`pipeline`): one parameterized pass per direction
//!
//! ## Library usage
//!
//! ```no_run
//! use wikibridge::kb::MemoryKb;
//! use wikibridge::pipeline::{self, ImportOptions};
//! use wikibridge::tables;
//!
//! # fn main() -> wikibridge::error::BridgeResult<()> {
//! let kb = MemoryKb::new();
//! let nodes = tables::read_nodes("nodes.csv".as_ref())?;
//! let edges = tables::read_edges("edges.csv".as_ref())?;
//! let report = pipeline::run_import(&kb, nodes, edges, &ImportOptions::default())?;
//! println!("created {} items", report.items_created);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod config;
pub mod dedup;
pub mod error;
pub mod export;
pub mod kb;
pub mod model;
pub mod pipeline;
pub mod reference;
pub mod resolver;
pub mod retry;
pub mod sync;
pub mod tables;
