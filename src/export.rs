//! Export of the knowledge base back into the flat graph tables.
//!
//! Walks every item known to the cross-reference index, fetches its full
//! claim set, and renders node and edge rows in the bulk-import column
//! dialect. Provenance is reassembled from reference groups: supporting-text
//! chunks rejoin with spaces, and consecutive citation-index URL fragments
//! merge back into the original batched URL before the pipe join.

use std::collections::HashMap;

use crate::error::{ExportError, ExportResult};
use crate::kb::{EntitySnapshot, KbClient, KbError};
use crate::model::{EdgeRow, ItemId, KbId, NodeRow, PropertyId, ReferenceGroup, SnakValue};
use crate::reference;
use crate::resolver::IdentifierResolver;
use crate::sync::{Schema, uris};

/// Counters for one export pass.
#[derive(Debug, Default, Clone)]
pub struct ExportReportCounters {
    pub items_visited: usize,
    pub nodes_written: usize,
    pub edges_written: usize,
    pub skipped_items: usize,
}

pub struct Exporter<'a> {
    client: &'a dyn KbClient,
    resolver: IdentifierResolver,
    schema: Schema,
    property_curies: HashMap<PropertyId, String>,
    property_labels: HashMap<PropertyId, String>,
    pub report: ExportReportCounters,
}

impl<'a> Exporter<'a> {
    /// Seed the resolver from the store. Fails if the bootstrap properties
    /// are missing, which means no import ever ran against this store.
    pub fn connect(client: &'a dyn KbClient, type_property_uri: &str) -> ExportResult<Self> {
        let equiv = client
            .equivalent_property_pid()?
            .ok_or_else(|| ExportError::MissingProperty {
                uri: uris::OWL_EQUIVALENT_PROPERTY.to_string(),
            })?;

        let mut resolver = IdentifierResolver::new();
        resolver.register_property(uris::OWL_EQUIVALENT_PROPERTY, equiv.clone());
        for (uri, id) in client.map_by_external_id(&equiv)? {
            if let KbId::Property(pid) = id {
                resolver.register_property(uri, pid);
            }
        }
        let schema = Schema::from_resolver(&resolver, type_property_uri)
            .map_err(|uri| ExportError::MissingProperty { uri })?;

        // The cross-reference query yields both halves of the inverse maps:
        // item CURIEs for node identity, property CURIEs for edge :TYPE.
        let mut property_curies = HashMap::new();
        for (curie, id) in client.map_by_external_id(&schema.dbxref)? {
            match id {
                KbId::Item(qid) => resolver.register_item(curie, qid),
                KbId::Property(pid) => {
                    property_curies.insert(pid, curie);
                }
            }
        }

        tracing::info!(
            items = resolver.item_count(),
            properties = resolver.property_count(),
            "export resolver seeded"
        );
        Ok(Self {
            client,
            resolver,
            schema,
            property_curies,
            property_labels: HashMap::new(),
            report: ExportReportCounters::default(),
        })
    }

    /// Render the whole store into node and edge tables, in CURIE order.
    /// Items that fail to fetch are logged and skipped.
    pub fn run(&mut self) -> ExportResult<(Vec<NodeRow>, Vec<EdgeRow>)> {
        let mut pairs: Vec<(String, ItemId)> = self
            .resolver
            .items()
            .map(|(curie, qid)| (curie.to_string(), qid.clone()))
            .collect();
        pairs.sort();

        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        for (curie, qid) in pairs {
            self.report.items_visited += 1;
            let snapshot = match self.client.fetch_item(&qid) {
                Ok(snapshot) => snapshot,
                Err(KbError::NotFound { .. }) => {
                    tracing::warn!(%curie, %qid, "indexed item vanished, skipping");
                    self.report.skipped_items += 1;
                    continue;
                }
                Err(other) => return Err(other.into()),
            };

            if let Some(node) = self.node_row(&curie, &snapshot) {
                nodes.push(node);
                self.report.nodes_written += 1;
            } else {
                self.report.skipped_items += 1;
            }
            let item_edges = self.edge_rows(&curie, &snapshot)?;
            self.report.edges_written += item_edges.len();
            edges.extend(item_edges);
        }
        Ok((nodes, edges))
    }

    /// A node row needs exactly one type statement; anything else is not a
    /// graph node (bootstrap scaffolding, type items, hand-edited entities).
    fn node_row(&self, curie: &str, snapshot: &EntitySnapshot) -> Option<NodeRow> {
        let mut type_targets = snapshot.claims.iter().filter_map(|claim| {
            if claim.property != self.schema.type_of {
                return None;
            }
            match &claim.value {
                SnakValue::Item(qid) => Some(qid),
                _ => None,
            }
        });
        let target = type_targets.next()?;
        if type_targets.next().is_some() {
            tracing::warn!(%curie, "multiple type statements, skipping node row");
            return None;
        }
        let Some(node_type) = self.resolver.curie_of(target) else {
            tracing::warn!(%curie, type_qid = %target, "type item carries no cross-reference, skipping node row");
            return None;
        };

        Some(NodeRow {
            id: curie.to_string(),
            node_type: node_type.to_string(),
            preflabel: snapshot.label.clone(),
            synonyms: snapshot.aliases.join("|"),
            name: snapshot.label.clone(),
            description: snapshot.description.clone(),
        })
    }

    /// Edge rows for every ordinary claim: type and cross-reference claims
    /// are structural, not graph edges. One row per reference group; a
    /// claim without references still yields one row with blank provenance.
    fn edge_rows(
        &mut self,
        curie: &str,
        snapshot: &EntitySnapshot,
    ) -> ExportResult<Vec<EdgeRow>> {
        let mut rows = Vec::new();
        for claim in &snapshot.claims {
            if claim.property == self.schema.type_of || claim.property == self.schema.dbxref {
                continue;
            }
            let Some(rel_type) = self.property_curies.get(&claim.property).cloned() else {
                tracing::warn!(%curie, pid = %claim.property, "claim property carries no cross-reference, skipping");
                continue;
            };
            let end_id = match &claim.value {
                SnakValue::Item(qid) => match self.resolver.curie_of(qid) {
                    Some(target) => target.to_string(),
                    None => {
                        tracing::warn!(%curie, target = %qid, "object item carries no cross-reference, skipping");
                        continue;
                    }
                },
                SnakValue::Str(s) | SnakValue::Url(s) => s.clone(),
            };
            let property_uri = self
                .resolver
                .uri_of(&claim.property)
                .unwrap_or_default()
                .to_string();
            let property_label = self.property_label(&claim.property)?;

            let template = EdgeRow {
                start_id: curie.to_string(),
                rel_type,
                end_id,
                property_label,
                property_uri,
                ..Default::default()
            };
            if claim.references.is_empty() {
                rows.push(template);
                continue;
            }
            for group in &claim.references {
                let mut row = template.clone();
                let (text, urls) = self.render_group(group);
                row.reference_supporting_text = text;
                row.reference_uri = urls;
                rows.push(row);
            }
        }
        Ok(rows)
    }

    /// Reassemble one reference group: text chunks joined by spaces, URLs
    /// pipe-joined with consecutive citation fragments merged back into
    /// their original batched form.
    fn render_group(&self, group: &ReferenceGroup) -> (String, String) {
        let mut texts = Vec::new();
        let mut urls: Vec<String> = Vec::new();
        for fragment in &group.fragments {
            match &fragment.value {
                SnakValue::Str(s) if fragment.property == self.schema.supporting_text => {
                    texts.push(s.as_str());
                }
                SnakValue::Url(u) if fragment.property == self.schema.reference_uri => {
                    urls.push(u.clone());
                }
                _ => {}
            }
        }
        (texts.join(" "), merge_citation_runs(&urls).join("|"))
    }

    fn property_label(&mut self, pid: &PropertyId) -> ExportResult<String> {
        if let Some(label) = self.property_labels.get(pid) {
            return Ok(label.clone());
        }
        let label = self.client.fetch_label(pid)?;
        self.property_labels.insert(pid.clone(), label.clone());
        Ok(label)
    }
}

/// Merge maximal runs of consecutive citation-index URLs back into single
/// batched URLs; other URLs pass through in place.
///
/// Lossy for adjacency: two citation URLs that were separate entries in the
/// source row come back as one batched URL. Fragment order inside a group is
/// the only adjacency signal left after import, so the rejoin is best-effort.
fn merge_citation_runs(urls: &[String]) -> Vec<String> {
    let mut merged = Vec::new();
    let mut run: Vec<&String> = Vec::new();
    for url in urls {
        if reference::is_citation_url(url) {
            run.push(url);
        } else {
            if !run.is_empty() {
                merged.push(reference::merge_citation_urls(&run));
                run.clear();
            }
            merged.push(url.clone());
        }
    }
    if !run.is_empty() {
        merged.push(reference::merge_citation_urls(&run));
    }
    merged
}
