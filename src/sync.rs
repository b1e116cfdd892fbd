//! Property and item synchronization against the knowledge base.
//!
//! The [`Synchronizer`] is constructed by [`Synchronizer::bootstrap`], which
//! seeds the resolver from the store's bulk queries and ensures the fixed
//! bootstrap properties exist. The cross-reference property comes first —
//! every later property carries a cross-reference claim through it — and its
//! first-time creation triggers the one bounded consistency wait against the
//! lagging query endpoint.
//!
//! All creation paths honor the `write` flag: simulated runs mint local
//! placeholder ids instead of calling the store, so resolution and
//! aggregation still run end to end.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{SyncError, SyncResult};
use crate::kb::{ItemSpec, KbClient, PropertySpec};
use crate::model::{EdgeRow, ItemId, KbId, NodeRow, PropertyDefinition, PropertyId, SnakValue, StatementRecord, ValueKind};
use crate::resolver::IdentifierResolver;
use crate::dedup;
use crate::retry::{self, RetryPolicy};

/// Canonical URIs of the well-known predicates.
pub mod uris {
    pub const OWL_EQUIVALENT_PROPERTY: &str = "http://www.w3.org/2002/07/owl#equivalentProperty";
    pub const DBXREF: &str = "http://www.geneontology.org/formats/oboInOwl#DbXref";
    pub const SKOS_EXACT_MATCH: &str = "http://www.w3.org/2004/02/skos/core#exactMatch";
    pub const REFERENCE_URI: &str = "http://www.wikidata.org/entity/P854";
    pub const REFERENCE_SUPPORTING_TEXT: &str = "http://reference_supporting_text";
    /// Reified stand-in for the graph's node-label field.
    pub const TYPE_OF: &str = "http://type";
    pub const RO_COLOCALIZES_WITH: &str = "http://purl.obolibrary.org/obo/RO_0002325";
    pub const RO_CONTRIBUTES_TO: &str = "http://purl.obolibrary.org/obo/RO_0002326";
}

/// The one predicate whose objects are literals, not item references.
pub const EXACT_MATCH_CURIE: &str = "skos:exactMatch";

fn dbxref_definition() -> PropertyDefinition {
    PropertyDefinition::new(
        "External ID",
        "generic property for holding a (generally CURIE-fied) external ID",
        ValueKind::Str,
        uris::DBXREF,
        "oboInOwl:DbXref",
    )
}

/// Bootstrap properties ensured regardless of what the edge file contains.
fn initial_definitions() -> [PropertyDefinition; 3] {
    [
        PropertyDefinition::new(
            "exact match",
            "",
            ValueKind::Str,
            uris::SKOS_EXACT_MATCH,
            EXACT_MATCH_CURIE,
        ),
        PropertyDefinition::new(
            "reference uri",
            "",
            ValueKind::Url,
            uris::REFERENCE_URI,
            "reference_uri",
        ),
        PropertyDefinition::new(
            "reference supporting text",
            "",
            ValueKind::Str,
            uris::REFERENCE_SUPPORTING_TEXT,
            "ref_supp_text",
        ),
    ]
}

/// The reified type property. Its URI is configurable so different stores
/// can reuse an existing type property instead of the default.
fn type_definition(uri: &str) -> PropertyDefinition {
    PropertyDefinition::new(
        "type",
        "the graph node type, aka ':LABEL'",
        ValueKind::ItemReference,
        uri,
        "type",
    )
}

/// Resolved ids of the bootstrap properties, shared with the statement
/// builder and the exporter.
#[derive(Debug, Clone)]
pub struct Schema {
    pub equivalent_property: PropertyId,
    pub dbxref: PropertyId,
    pub exact_match: PropertyId,
    pub reference_uri: PropertyId,
    pub supporting_text: PropertyId,
    pub type_of: PropertyId,
}

impl Schema {
    /// Build from an already-seeded resolver. Returns the first missing
    /// canonical URI, for stores that were never imported into.
    pub fn from_resolver(
        resolver: &IdentifierResolver,
        type_property_uri: &str,
    ) -> Result<Schema, String> {
        let get = |uri: &str| -> Result<PropertyId, String> {
            resolver
                .resolve_property(uri)
                .cloned()
                .ok_or_else(|| uri.to_string())
        };
        Ok(Schema {
            equivalent_property: get(uris::OWL_EQUIVALENT_PROPERTY)?,
            dbxref: get(uris::DBXREF)?,
            exact_match: get(uris::SKOS_EXACT_MATCH)?,
            reference_uri: get(uris::REFERENCE_URI)?,
            supporting_text: get(uris::REFERENCE_SUPPORTING_TEXT)?,
            type_of: get(type_property_uri)?,
        })
    }
}

/// A predicate as the statement builder sees it: the property id plus its
/// value kind, resolved once at synchronization time.
#[derive(Debug, Clone)]
pub struct PredicateHandle {
    pub property: PropertyId,
    pub kind: ValueKind,
}

/// Predicate CURIE → handle, for every predicate observed in the edge set.
pub type PredicateTable = BTreeMap<String, PredicateHandle>;

/// Counters for what a synchronization pass did.
#[derive(Debug, Default, Clone)]
pub struct SyncReport {
    pub properties_created: usize,
    pub properties_existing: usize,
    pub items_created: usize,
    pub items_existing: usize,
    pub items_updated: usize,
    pub oversized_skipped: usize,
}

/// Inputs for one item creation.
#[derive(Debug, Clone, Default)]
pub struct ItemInputs<'s> {
    pub label: &'s str,
    pub description: &'s str,
    pub curie: &'s str,
    pub synonyms: Vec<String>,
    pub type_of: Option<&'s str>,
}

pub struct Synchronizer<'a> {
    client: &'a dyn KbClient,
    pub resolver: IdentifierResolver,
    schema: Schema,
    write: bool,
    sim_ids: u64,
    pub report: SyncReport,
}

impl<'a> Synchronizer<'a> {
    /// Seed the resolver and ensure the bootstrap properties, waiting out
    /// the query endpoint's indexing lag if the cross-reference property was
    /// created for the first time. A failing seeding query is fatal — there
    /// is no safe partial-resolution mode.
    pub fn bootstrap(
        client: &'a dyn KbClient,
        write: bool,
        retry: RetryPolicy,
        type_property_uri: &str,
    ) -> SyncResult<Self> {
        let equiv = client
            .equivalent_property_pid()?
            .ok_or(SyncError::NoEquivalentProperty)?;
        tracing::info!(pid = %equiv, "discovered equivalent-property property");

        let mut resolver = IdentifierResolver::new();
        resolver.register_property(uris::OWL_EQUIVALENT_PROPERTY, equiv.clone());
        seed_properties(&mut resolver, client.map_by_external_id(&equiv)?);

        let mut sim_ids = 0u64;
        let mut report = SyncReport::default();

        // The cross-reference property has none of its own (it cannot,
        // before it exists); everything after it does.
        let (dbxref, created) = ensure_property(
            client, &mut resolver, &mut sim_ids, &mut report, write, &equiv, None,
            &dbxref_definition(),
        )?;

        let [exact_match_def, reference_uri_def, supporting_text_def] = initial_definitions();
        let type_of_def = type_definition(type_property_uri);
        let mut ensure = |def: &PropertyDefinition| {
            ensure_property(
                client, &mut resolver, &mut sim_ids, &mut report, write, &equiv,
                Some(&dbxref), def,
            )
            .map(|(pid, _)| pid)
        };
        let exact_match = ensure(&exact_match_def)?;
        let reference_uri = ensure(&reference_uri_def)?;
        let supporting_text = ensure(&supporting_text_def)?;
        let type_of = ensure(&type_of_def)?;

        // First-time creation: the query endpoint has not indexed the new
        // property yet, so wait until the bulk query reflects it before
        // trusting any further seeding reads.
        if created && write {
            let fresh = retry::poll(retry, || -> SyncResult<_> {
                let pairs = client.map_by_external_id(&equiv)?;
                let visible = pairs.iter().any(|(uri, _)| uri.as_str() == uris::DBXREF);
                Ok(visible.then_some(pairs))
            })?;
            match fresh {
                Some(pairs) => seed_properties(&mut resolver, pairs),
                None => {
                    return Err(SyncError::BootstrapTimeout {
                        uri: uris::DBXREF.to_string(),
                        attempts: retry.max_attempts,
                    });
                }
            }
        }

        resolver.seed_items(client.map_by_external_id(&dbxref)?);
        tracing::info!(
            properties = resolver.property_count(),
            items = resolver.item_count(),
            "resolver seeded"
        );

        Ok(Self {
            client,
            resolver,
            schema: Schema {
                equivalent_property: equiv,
                dbxref,
                exact_match,
                reference_uri,
                supporting_text,
                type_of,
            },
            write,
            sim_ids,
            report,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Ensure every predicate observed in the edge set exists as a property,
    /// and hand back the predicate table the statement builder works from.
    ///
    /// Two predicate URIs are patched in because the edge file encodes them
    /// incorrectly. The exact-match predicate is not created here — it is a
    /// string-typed bootstrap property — but it does get a handle.
    pub fn sync_properties(&mut self, edges: &[EdgeRow]) -> SyncResult<PredicateTable> {
        let mut labels: BTreeMap<String, String> = BTreeMap::new();
        let mut uri_by_curie: BTreeMap<String, String> = BTreeMap::new();
        for edge in edges {
            if edge.rel_type.is_empty() {
                continue;
            }
            let label = if edge.property_label.is_empty() {
                edge.rel_type.clone()
            } else {
                edge.property_label.clone()
            };
            labels.insert(edge.rel_type.clone(), label);
            uri_by_curie.insert(edge.rel_type.clone(), edge.property_uri.clone());
        }
        uri_by_curie.insert(
            "colocalizes_with".to_string(),
            uris::RO_COLOCALIZES_WITH.to_string(),
        );
        uri_by_curie.insert(
            "contributes_to".to_string(),
            uris::RO_CONTRIBUTES_TO.to_string(),
        );
        labels.remove(EXACT_MATCH_CURIE);

        let mut table = PredicateTable::new();
        table.insert(
            EXACT_MATCH_CURIE.to_string(),
            PredicateHandle {
                property: self.schema.exact_match.clone(),
                kind: ValueKind::Str,
            },
        );

        for (curie, label) in &labels {
            let uri = match uri_by_curie.get(curie) {
                Some(uri) if !uri.is_empty() => uri.clone(),
                // No canonical URI in the edge file: fall back to the CURIE
                // so the property still has a resolvable key.
                _ => curie.clone(),
            };
            let def = PropertyDefinition::new(
                label.clone(),
                "",
                ValueKind::ItemReference,
                uri,
                curie.clone(),
            );
            let (pid, _) = ensure_property(
                self.client,
                &mut self.resolver,
                &mut self.sim_ids,
                &mut self.report,
                self.write,
                &self.schema.equivalent_property,
                Some(&self.schema.dbxref),
                &def,
            )?;
            table.insert(
                curie.clone(),
                PredicateHandle {
                    property: pid,
                    kind: ValueKind::ItemReference,
                },
            );
        }
        Ok(table)
    }

    /// Ensure an item exists for every distinct node type, so node "type"
    /// statements have a resolvable target.
    pub fn sync_classes(&mut self, nodes: &[NodeRow]) -> SyncResult<()> {
        let types: BTreeSet<&str> = nodes
            .iter()
            .map(|n| n.node_type.as_str())
            .filter(|t| !t.is_empty())
            .collect();
        for class in types {
            self.ensure_item(
                &ItemInputs {
                    label: class,
                    curie: class,
                    ..Default::default()
                },
                false,
            )?;
        }
        Ok(())
    }

    /// Ensure an item exists for every node, in sorted CURIE order. Must run
    /// to completion before edge processing: an unresolved endpoint silently
    /// drops its statements.
    pub fn sync_items(
        &mut self,
        nodes: &[NodeRow],
        force: bool,
        truncate_descriptions: Option<usize>,
    ) -> SyncResult<()> {
        let mut sorted: Vec<&NodeRow> = nodes.iter().filter(|n| !n.id.is_empty()).collect();
        sorted.sort_by(|a, b| a.id.cmp(&b.id));

        for node in sorted {
            if !dedup::representable(&node.id) {
                tracing::warn!(curie = %node.id, "CURIE exceeds representational limit, skipping item");
                self.report.oversized_skipped += 1;
                continue;
            }
            let label = if node.preflabel.is_empty() {
                node.id.as_str()
            } else {
                node.preflabel.as_str()
            };
            let mut synonyms: BTreeSet<String> =
                node.synonym_list().into_iter().collect();
            if !node.name.is_empty() {
                synonyms.insert(node.name.clone());
            }
            synonyms.remove(label);
            let description = match truncate_descriptions {
                Some(limit) => node.description.chars().take(limit).collect(),
                None => node.description.clone(),
            };
            self.ensure_item(
                &ItemInputs {
                    label,
                    description: &description,
                    curie: &node.id,
                    synonyms: synonyms.into_iter().collect(),
                    type_of: (!node.node_type.is_empty()).then_some(node.node_type.as_str()),
                },
                force,
            )?;
        }
        Ok(())
    }

    /// Get-or-create an item carrying the CURIE as its cross-reference.
    ///
    /// With `force` false an already-resolved CURIE is an idempotent no-op.
    /// With `force` true the existing item's label, description, aliases,
    /// and claims are overwritten in place.
    pub fn ensure_item(
        &mut self,
        inputs: &ItemInputs<'_>,
        force: bool,
    ) -> SyncResult<(ItemId, bool)> {
        if let Some(existing) = self.resolver.resolve_item(inputs.curie) {
            if !force {
                tracing::info!(curie = %inputs.curie, qid = %existing, "item already exists");
                self.report.items_existing += 1;
                return Ok((existing.clone(), false));
            }
            let existing = existing.clone();
            let spec = self.item_spec(inputs);
            if self.write {
                self.client.overwrite_item(&existing, &spec)?;
            }
            tracing::info!(curie = %inputs.curie, qid = %existing, "item overwritten");
            self.report.items_updated += 1;
            return Ok((existing, true));
        }

        let spec = self.item_spec(inputs);
        let qid = if self.write {
            self.client.create_item(&spec)?
        } else {
            self.sim_ids += 1;
            ItemId(format!("SIM-Q{}", self.sim_ids))
        };
        self.resolver.register_item(inputs.curie, qid.clone());
        tracing::debug!(curie = %inputs.curie, qid = %qid, "item created");
        self.report.items_created += 1;
        Ok((qid, true))
    }

    fn item_spec(&self, inputs: &ItemInputs<'_>) -> ItemSpec {
        let mut claims = vec![StatementRecord::new(
            self.schema.dbxref.clone(),
            SnakValue::Str(inputs.curie.to_string()),
        )];
        if let Some(type_curie) = inputs.type_of {
            match self.resolver.resolve_item(type_curie) {
                Some(type_qid) => claims.push(StatementRecord::new(
                    self.schema.type_of.clone(),
                    SnakValue::Item(type_qid.clone()),
                )),
                None => {
                    tracing::warn!(curie = %inputs.curie, type_curie, "type item unresolved, omitting type statement");
                }
            }
        }
        ItemSpec {
            label: inputs.label.to_string(),
            description: inputs.description.to_string(),
            aliases: inputs.synonyms.clone(),
            claims,
        }
    }
}

fn seed_properties(resolver: &mut IdentifierResolver, pairs: Vec<(String, KbId)>) {
    resolver.seed_properties(pairs.into_iter().filter_map(|(uri, id)| match id {
        KbId::Property(pid) => Some((uri, pid)),
        KbId::Item(_) => None,
    }));
}

/// Get-or-create a property. The factory runs at most once; placeholders
/// are minted instead when writes are suppressed.
#[allow(clippy::too_many_arguments)]
fn ensure_property(
    client: &dyn KbClient,
    resolver: &mut IdentifierResolver,
    sim_ids: &mut u64,
    report: &mut SyncReport,
    write: bool,
    equiv: &PropertyId,
    dbxref: Option<&PropertyId>,
    def: &PropertyDefinition,
) -> SyncResult<(PropertyId, bool)> {
    let mut claims = vec![StatementRecord::new(
        equiv.clone(),
        SnakValue::Url(def.uri.clone()),
    )];
    if let Some(dbxref) = dbxref {
        claims.push(StatementRecord::new(
            dbxref.clone(),
            SnakValue::Str(def.dbxref.clone()),
        ));
    }
    let spec = PropertySpec {
        label: def.label.clone(),
        description: def.description.clone(),
        kind: def.kind,
        claims,
    };

    let (pid, created) = resolver.get_or_create_property(&def.uri, || -> SyncResult<PropertyId> {
        if write {
            Ok(client.create_property(&spec)?)
        } else {
            *sim_ids += 1;
            Ok(PropertyId(format!("SIM-P{sim_ids}")))
        }
    })?;

    if created {
        tracing::debug!(uri = %def.uri, pid = %pid, "property created");
        report.properties_created += 1;
    } else {
        tracing::info!(uri = %def.uri, pid = %pid, "property already exists");
        report.properties_existing += 1;
    }
    Ok((pid, created))
}
