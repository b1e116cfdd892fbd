//! End-to-end orchestration of the two reconciliation directions.
//!
//! Import: dedupe labels, bootstrap the schema, synchronize properties,
//! class items, and node items, then push edge statements. Export: seed a
//! resolver from the store and render everything back into tables. Each
//! direction is a single parameterized pass; behavior differences are
//! options, not separate pipelines.

use crate::builder::{self, StatementBuilder};
use crate::dedup;
use crate::error::BridgeResult;
use crate::export::Exporter;
use crate::kb::KbClient;
use crate::model::{EdgeRow, NodeRow};
use crate::retry::RetryPolicy;
use crate::sync::{self, Synchronizer};

/// Knobs of one import run.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Resolve and aggregate without writing anything to the store.
    pub simulate: bool,
    /// Overwrite items whose CURIE already resolves instead of skipping them.
    pub force: bool,
    /// Cap item descriptions at this many characters. `None` keeps them whole.
    pub truncate_descriptions: Option<usize>,
    /// Bootstrap consistency-wait policy.
    pub retry: RetryPolicy,
    /// Canonical URI of the type property. Stores that already carry a type
    /// property under a different URI can reuse it instead of minting the
    /// default one.
    pub type_property_uri: String,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            simulate: false,
            force: false,
            truncate_descriptions: Some(250),
            retry: RetryPolicy::default(),
            type_property_uri: sync::uris::TYPE_OF.to_string(),
        }
    }
}

/// What one import run did.
#[derive(Debug, Default, Clone)]
pub struct ImportReport {
    pub properties_created: usize,
    pub properties_existing: usize,
    pub items_created: usize,
    pub items_existing: usize,
    pub items_updated: usize,
    pub oversized_skipped: usize,
    pub subjects_written: usize,
    pub statements_written: usize,
    pub reference_groups: usize,
    pub dropped_triples: usize,
    pub unresolved_subjects: usize,
    pub failed_subjects: usize,
}

/// Run a full import of the node and edge tables into the store.
pub fn run_import(
    client: &dyn KbClient,
    mut nodes: Vec<NodeRow>,
    edges: Vec<EdgeRow>,
    options: &ImportOptions,
) -> BridgeResult<ImportReport> {
    let write = !options.simulate;
    if options.simulate {
        tracing::info!("simulate mode: no writes will reach the store");
    }

    dedup::dedupe_labels(&mut nodes);

    let mut sync =
        Synchronizer::bootstrap(client, write, options.retry, &options.type_property_uri)?;
    let predicates = sync.sync_properties(&edges)?;
    sync.sync_classes(&nodes)?;
    sync.sync_items(&nodes, options.force, options.truncate_descriptions)?;

    let builder = StatementBuilder::new(&sync.resolver, &predicates, sync.schema());
    let edge_report = builder::push_edges(client, &builder, &edges, write);

    let report = ImportReport {
        properties_created: sync.report.properties_created,
        properties_existing: sync.report.properties_existing,
        items_created: sync.report.items_created,
        items_existing: sync.report.items_existing,
        items_updated: sync.report.items_updated,
        oversized_skipped: sync.report.oversized_skipped,
        subjects_written: edge_report.subjects_written,
        statements_written: edge_report.statements_written,
        reference_groups: edge_report.reference_groups,
        dropped_triples: edge_report.dropped_triples,
        unresolved_subjects: edge_report.unresolved_subjects,
        failed_subjects: edge_report.failed_subjects,
    };
    tracing::info!(
        properties_created = report.properties_created,
        items_created = report.items_created,
        subjects_written = report.subjects_written,
        statements_written = report.statements_written,
        dropped_triples = report.dropped_triples,
        "import finished"
    );
    Ok(report)
}

/// Run a full export of the store into node and edge tables. The type
/// property URI must match the one the store was imported with.
pub fn run_export(
    client: &dyn KbClient,
    type_property_uri: &str,
) -> BridgeResult<(Vec<NodeRow>, Vec<EdgeRow>)> {
    let mut exporter = Exporter::connect(client, type_property_uri)?;
    let (nodes, edges) = exporter.run()?;
    tracing::info!(
        nodes = nodes.len(),
        edges = edges.len(),
        skipped = exporter.report.skipped_items,
        "export finished"
    );
    Ok((nodes, edges))
}
