//! Knowledge-base client boundary.
//!
//! [`KbClient`] is the capability surface the reconciliation engine consumes:
//! bulk external-id queries, entity creation, claim batches, and entity
//! fetches. [`HttpKb`] talks to a Wikibase-style store over the MediaWiki
//! action API plus a SPARQL query endpoint; [`MemoryKb`] is an in-memory
//! stand-in used by tests and offline runs.
//!
//! All calls are blocking; the engine is batch-sequential by design.

use std::collections::BTreeMap;
use std::sync::Mutex;

use miette::Diagnostic;
use serde_json::{Value, json};
use thiserror::Error;

use crate::model::{
    ItemId, KbId, PropertyId, ReferenceFragment, ReferenceGroup, SnakValue, StatementRecord,
    ValueKind,
};
use crate::sync::uris;

// ---------------------------------------------------------------------------
// Client error
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum KbError {
    #[error("HTTP request failed: {message}")]
    #[diagnostic(
        code(bridge::kb::http),
        help("Check that the API and SPARQL endpoints are reachable.")
    )]
    Http { message: String },

    #[error("API error {code}: {message}")]
    #[diagnostic(
        code(bridge::kb::api),
        help(
            "The store rejected the request. `failed-save` with a label \
             conflict usually means a previous partial run left entities \
             behind that the seeding query has not indexed yet."
        )
    )]
    Api { code: String, message: String },

    #[error("login failed for user {user}: {message}")]
    #[diagnostic(
        code(bridge::kb::auth),
        help("Check the credentials in the config file (bot passwords need the `wikibase-item` grants).")
    )]
    Auth { user: String, message: String },

    #[error("SPARQL query failed: {message}")]
    #[diagnostic(
        code(bridge::kb::query),
        help("Check the SPARQL endpoint URL and that the query service is up.")
    )]
    Query { message: String },

    #[error("unexpected response shape: {message}")]
    #[diagnostic(
        code(bridge::kb::parse),
        help("Server version mismatch? The response did not match the expected JSON layout.")
    )]
    Parse { message: String },

    #[error("entity not found: {id}")]
    #[diagnostic(code(bridge::kb::not_found))]
    NotFound { id: String },
}

pub type KbResult<T> = std::result::Result<T, KbError>;

// ---------------------------------------------------------------------------
// Request / snapshot types
// ---------------------------------------------------------------------------

/// A property to create: entity fields plus the claims attached at creation
/// time (the equivalent-property URL and, usually, a cross-reference string).
#[derive(Debug, Clone)]
pub struct PropertySpec {
    pub label: String,
    pub description: String,
    pub kind: ValueKind,
    pub claims: Vec<StatementRecord>,
}

/// An item to create or overwrite.
#[derive(Debug, Clone, Default)]
pub struct ItemSpec {
    pub label: String,
    pub description: String,
    pub aliases: Vec<String>,
    pub claims: Vec<StatementRecord>,
}

/// A fetched entity with all its claims, as the exporter consumes it.
#[derive(Debug, Clone)]
pub struct EntitySnapshot {
    pub id: ItemId,
    pub label: String,
    pub description: String,
    pub aliases: Vec<String>,
    pub claims: Vec<StatementRecord>,
}

// ---------------------------------------------------------------------------
// Client trait
// ---------------------------------------------------------------------------

/// The external store, as the engine sees it.
///
/// Failures are fatal for the current operation; the statement-writing loop
/// isolates them per subject, everything else propagates.
pub trait KbClient {
    /// Bulk-fetch every `(external id value, entity id)` pair for entities
    /// carrying a claim of `property`. This is the resolver's seeding path;
    /// the store offers no per-key lookup by external id.
    fn map_by_external_id(&self, property: &PropertyId) -> KbResult<Vec<(String, KbId)>>;

    /// Discover the equivalent-property property by querying for the entity
    /// whose direct claim points at the OWL equivalentProperty URI.
    fn equivalent_property_pid(&self) -> KbResult<Option<PropertyId>>;

    fn create_property(&self, spec: &PropertySpec) -> KbResult<PropertyId>;

    fn create_item(&self, spec: &ItemSpec) -> KbResult<ItemId>;

    /// Rewrite an existing item's fields and claims (the `force` path).
    fn overwrite_item(&self, id: &ItemId, spec: &ItemSpec) -> KbResult<()>;

    /// Append a batch of claims to an existing item in a single update.
    fn append_claims(&self, subject: &ItemId, claims: &[StatementRecord]) -> KbResult<()>;

    fn fetch_item(&self, id: &ItemId) -> KbResult<EntitySnapshot>;

    fn fetch_label(&self, id: &PropertyId) -> KbResult<String>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// Blocking client for a Wikibase-style store: MediaWiki action API for
/// writes and entity fetches, SPARQL endpoint for the bulk queries.
///
/// Login is lazy: the CSRF token is fetched on the first write, so read-only
/// and simulated runs never authenticate.
pub struct HttpKb {
    agent: ureq::Agent,
    api_url: String,
    sparql_url: String,
    user: String,
    password: String,
    csrf: Mutex<Option<String>>,
}

impl HttpKb {
    pub fn new(api_url: &str, sparql_url: &str, user: &str, password: &str) -> Self {
        Self {
            agent: ureq::Agent::new(),
            api_url: api_url.to_string(),
            sparql_url: sparql_url.to_string(),
            user: user.to_string(),
            password: password.to_string(),
            csrf: Mutex::new(None),
        }
    }

    fn get_json(&self, request: ureq::Request) -> KbResult<Value> {
        request
            .call()
            .map_err(|e| KbError::Http {
                message: e.to_string(),
            })?
            .into_json()
            .map_err(|e| KbError::Parse {
                message: e.to_string(),
            })
    }

    fn sparql(&self, query: &str) -> KbResult<Vec<Value>> {
        let response = self
            .agent
            .get(&self.sparql_url)
            .query("query", query)
            .query("format", "json")
            .call()
            .map_err(|e| KbError::Query {
                message: e.to_string(),
            })?;
        let body: Value = response.into_json().map_err(|e| KbError::Parse {
            message: e.to_string(),
        })?;
        let bindings = body["results"]["bindings"]
            .as_array()
            .cloned()
            .ok_or_else(|| KbError::Parse {
                message: "missing results.bindings".into(),
            })?;
        Ok(bindings)
    }

    fn ensure_csrf(&self) -> KbResult<String> {
        let mut csrf = self.csrf.lock().expect("csrf lock poisoned");
        if let Some(token) = csrf.as_ref() {
            return Ok(token.clone());
        }

        let login_token = self.get_json(
            self.agent
                .get(&self.api_url)
                .query("action", "query")
                .query("meta", "tokens")
                .query("type", "login")
                .query("format", "json"),
        )?["query"]["tokens"]["logintoken"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| KbError::Parse {
                message: "missing login token".into(),
            })?;

        let login: Value = self
            .agent
            .post(&self.api_url)
            .send_form(&[
                ("action", "login"),
                ("lgname", &self.user),
                ("lgpassword", &self.password),
                ("lgtoken", &login_token),
                ("format", "json"),
            ])
            .map_err(|e| KbError::Http {
                message: e.to_string(),
            })?
            .into_json()
            .map_err(|e| KbError::Parse {
                message: e.to_string(),
            })?;
        if login["login"]["result"].as_str() != Some("Success") {
            return Err(KbError::Auth {
                user: self.user.clone(),
                message: login["login"]["reason"]
                    .as_str()
                    .unwrap_or("login rejected")
                    .to_string(),
            });
        }

        let token = self.get_json(
            self.agent
                .get(&self.api_url)
                .query("action", "query")
                .query("meta", "tokens")
                .query("format", "json"),
        )?["query"]["tokens"]["csrftoken"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| KbError::Parse {
                message: "missing csrf token".into(),
            })?;

        tracing::debug!(user = %self.user, "authenticated against the store");
        *csrf = Some(token.clone());
        Ok(token)
    }

    fn edit_entity(&self, params: &[(&str, &str)], data: &Value) -> KbResult<Value> {
        let token = self.ensure_csrf()?;
        let data = data.to_string();
        let mut form: Vec<(&str, &str)> = vec![
            ("action", "wbeditentity"),
            ("format", "json"),
            ("bot", "1"),
            ("data", &data),
            ("token", &token),
        ];
        form.extend_from_slice(params);

        let body: Value = self
            .agent
            .post(&self.api_url)
            .send_form(&form)
            .map_err(|e| KbError::Http {
                message: e.to_string(),
            })?
            .into_json()
            .map_err(|e| KbError::Parse {
                message: e.to_string(),
            })?;

        if let Some(error) = body.get("error") {
            return Err(KbError::Api {
                code: error["code"].as_str().unwrap_or("unknown").to_string(),
                message: error["info"].as_str().unwrap_or("").to_string(),
            });
        }
        Ok(body)
    }

    fn created_id(body: &Value) -> KbResult<String> {
        body["entity"]["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| KbError::Parse {
                message: "wbeditentity response carries no entity.id".into(),
            })
    }

    /// Last path segment of an entity URI from a SPARQL binding.
    fn binding_entity_id(binding: &Value, var: &str) -> Option<String> {
        let uri = binding[var]["value"].as_str()?;
        Some(uri.rsplit('/').next().unwrap_or(uri).to_string())
    }
}

fn snak_json(property: &PropertyId, value: &SnakValue) -> Value {
    let datavalue = match value {
        SnakValue::Item(qid) => json!({
            "value": { "entity-type": "item", "id": qid.as_str() },
            "type": "wikibase-entityid",
        }),
        SnakValue::Str(s) | SnakValue::Url(s) => json!({ "value": s, "type": "string" }),
    };
    json!({
        "snaktype": "value",
        "property": property.as_str(),
        "datavalue": datavalue,
        "datatype": value.kind().datatype(),
    })
}

fn claims_json(claims: &[StatementRecord]) -> Value {
    let rendered: Vec<Value> = claims
        .iter()
        .map(|claim| {
            let references: Vec<Value> = claim
                .references
                .iter()
                .filter(|group| !group.is_empty())
                .map(|group| {
                    let mut snaks: BTreeMap<&str, Vec<Value>> = BTreeMap::new();
                    let mut order: Vec<&str> = Vec::new();
                    for fragment in &group.fragments {
                        let pid = fragment.property.as_str();
                        if !order.contains(&pid) {
                            order.push(pid);
                        }
                        snaks
                            .entry(pid)
                            .or_default()
                            .push(snak_json(&fragment.property, &fragment.value));
                    }
                    json!({ "snaks": snaks, "snaks-order": order })
                })
                .collect();
            json!({
                "mainsnak": snak_json(&claim.property, &claim.value),
                "type": "statement",
                "rank": "normal",
                "references": references,
            })
        })
        .collect();
    Value::Array(rendered)
}

fn entity_data(spec: &ItemSpec) -> Value {
    let mut data = json!({
        "labels": { "en": { "language": "en", "value": spec.label } },
        "claims": claims_json(&spec.claims),
    });
    if !spec.description.is_empty() {
        data["descriptions"] = json!({ "en": { "language": "en", "value": spec.description } });
    }
    if !spec.aliases.is_empty() {
        let aliases: Vec<Value> = spec
            .aliases
            .iter()
            .map(|a| json!({ "language": "en", "value": a }))
            .collect();
        data["aliases"] = json!({ "en": aliases });
    }
    data
}

fn parse_snak(snak: &Value) -> Option<SnakValue> {
    let datavalue = snak.get("datavalue")?;
    match datavalue["type"].as_str()? {
        "wikibase-entityid" => {
            let id = datavalue["value"]["id"].as_str()?;
            Some(SnakValue::Item(ItemId(id.to_string())))
        }
        "string" => {
            let s = datavalue["value"].as_str()?.to_string();
            if snak["datatype"].as_str() == Some("url") {
                Some(SnakValue::Url(s))
            } else {
                Some(SnakValue::Str(s))
            }
        }
        _ => None,
    }
}

impl KbClient for HttpKb {
    fn map_by_external_id(&self, property: &PropertyId) -> KbResult<Vec<(String, KbId)>> {
        let query = format!(
            "SELECT ?entity ?value WHERE {{\n\
             \x20 ?prop <http://wikiba.se/ontology#directClaim> ?claim .\n\
             \x20 ?entity ?claim ?value .\n\
             \x20 FILTER(STRENDS(STR(?prop), \"/{pid}\"))\n\
             }}",
            pid = property.as_str()
        );
        let bindings = self.sparql(&query)?;
        let mut pairs = Vec::with_capacity(bindings.len());
        for binding in &bindings {
            let Some(raw_id) = Self::binding_entity_id(binding, "entity") else {
                continue;
            };
            let Some(value) = binding["value"]["value"].as_str() else {
                continue;
            };
            if let Some(id) = KbId::parse(&raw_id) {
                pairs.push((value.to_string(), id));
            }
        }
        Ok(pairs)
    }

    fn equivalent_property_pid(&self) -> KbResult<Option<PropertyId>> {
        // Find the equivalent-property property without knowing its id: it is
        // the one whose direct claim carries the OWL equivalentProperty URI.
        let query = format!(
            "SELECT * WHERE {{\n\
             \x20 ?item ?prop <{uri}> .\n\
             \x20 ?item <http://wikiba.se/ontology#directClaim> ?prop .\n\
             }}",
            uri = uris::OWL_EQUIVALENT_PROPERTY
        );
        let bindings = self.sparql(&query)?;
        Ok(bindings
            .first()
            .and_then(|b| Self::binding_entity_id(b, "prop"))
            .map(PropertyId))
    }

    fn create_property(&self, spec: &PropertySpec) -> KbResult<PropertyId> {
        let item_spec = ItemSpec {
            label: spec.label.clone(),
            description: spec.description.clone(),
            aliases: Vec::new(),
            claims: spec.claims.clone(),
        };
        let body = self.edit_entity(
            &[
                ("new", "property"),
                ("datatype", spec.kind.datatype()),
            ],
            &entity_data(&item_spec),
        )?;
        Ok(PropertyId(Self::created_id(&body)?))
    }

    fn create_item(&self, spec: &ItemSpec) -> KbResult<ItemId> {
        let body = self.edit_entity(&[("new", "item")], &entity_data(spec))?;
        Ok(ItemId(Self::created_id(&body)?))
    }

    fn overwrite_item(&self, id: &ItemId, spec: &ItemSpec) -> KbResult<()> {
        self.edit_entity(
            &[("id", id.as_str()), ("clear", "1")],
            &entity_data(spec),
        )?;
        Ok(())
    }

    fn append_claims(&self, subject: &ItemId, claims: &[StatementRecord]) -> KbResult<()> {
        let data = json!({ "claims": claims_json(claims) });
        self.edit_entity(&[("id", subject.as_str())], &data)?;
        Ok(())
    }

    fn fetch_item(&self, id: &ItemId) -> KbResult<EntitySnapshot> {
        let body = self.get_json(
            self.agent
                .get(&self.api_url)
                .query("action", "wbgetentities")
                .query("ids", id.as_str())
                .query("format", "json"),
        )?;
        let entity = &body["entities"][id.as_str()];
        if entity.is_null() || entity.get("missing").is_some() {
            return Err(KbError::NotFound {
                id: id.to_string(),
            });
        }

        let label = entity["labels"]["en"]["value"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let description = entity["descriptions"]["en"]["value"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let aliases = entity["aliases"]["en"]
            .as_array()
            .map(|list| {
                list.iter()
                    .filter_map(|a| a["value"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let mut claims = Vec::new();
        if let Some(by_property) = entity["claims"].as_object() {
            for (pid, statements) in by_property {
                let Some(statements) = statements.as_array() else {
                    continue;
                };
                for statement in statements {
                    let Some(value) = parse_snak(&statement["mainsnak"]) else {
                        continue;
                    };
                    let mut record =
                        StatementRecord::new(PropertyId(pid.clone()), value);
                    if let Some(refs) = statement["references"].as_array() {
                        for group in refs {
                            let mut fragments = Vec::new();
                            let order: Vec<String> = group["snaks-order"]
                                .as_array()
                                .map(|o| {
                                    o.iter()
                                        .filter_map(|v| v.as_str().map(str::to_string))
                                        .collect()
                                })
                                .unwrap_or_default();
                            for ref_pid in &order {
                                if let Some(snaks) = group["snaks"][ref_pid].as_array() {
                                    for snak in snaks {
                                        if let Some(value) = parse_snak(snak) {
                                            fragments.push(ReferenceFragment {
                                                property: PropertyId(ref_pid.clone()),
                                                value,
                                            });
                                        }
                                    }
                                }
                            }
                            record.references.push(ReferenceGroup { fragments });
                        }
                    }
                    claims.push(record);
                }
            }
        }

        Ok(EntitySnapshot {
            id: id.clone(),
            label,
            description,
            aliases,
            claims,
        })
    }

    fn fetch_label(&self, id: &PropertyId) -> KbResult<String> {
        let body = self.get_json(
            self.agent
                .get(&self.api_url)
                .query("action", "wbgetentities")
                .query("ids", id.as_str())
                .query("props", "labels")
                .query("format", "json"),
        )?;
        Ok(body["entities"][id.as_str()]["labels"]["en"]["value"]
            .as_str()
            .unwrap_or_default()
            .to_string())
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StoredEntity {
    label: String,
    description: String,
    aliases: Vec<String>,
    datatype: Option<ValueKind>,
    claims: Vec<StatementRecord>,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_property: u64,
    next_item: u64,
    entities: BTreeMap<String, StoredEntity>,
    create_calls: usize,
    write_calls: usize,
    // Pending stale reads, simulating the query endpoint's indexing lag.
    query_lag: u32,
}

/// In-memory [`KbClient`] with the same observable semantics as a fresh
/// Wikibase instance: an `equivalent property` property is pre-seeded (that
/// is part of store setup, not something the engine creates), ids are minted
/// in the store's `P…`/`Q…` scheme, and an optional artificial query lag
/// makes the bulk external-id query return stale results for the first N
/// calls, exercising the bootstrap wait.
pub struct MemoryKb {
    state: Mutex<MemoryState>,
}

impl MemoryKb {
    pub fn new() -> Self {
        let mut state = MemoryState {
            next_property: 1,
            next_item: 0,
            ..Default::default()
        };
        state.entities.insert(
            "P1".into(),
            StoredEntity {
                label: "equivalent property".into(),
                description: String::new(),
                aliases: Vec::new(),
                datatype: Some(ValueKind::Url),
                claims: vec![StatementRecord::new(
                    PropertyId("P1".into()),
                    SnakValue::Url(uris::OWL_EQUIVALENT_PROPERTY.into()),
                )],
            },
        );
        Self {
            state: Mutex::new(state),
        }
    }

    /// As [`new`](Self::new), but the first `lag` bulk external-id queries
    /// return empty results.
    pub fn with_query_lag(lag: u32) -> Self {
        let kb = Self::new();
        kb.state.lock().expect("state lock poisoned").query_lag = lag;
        kb
    }

    /// Number of entity creations performed.
    pub fn create_calls(&self) -> usize {
        self.state.lock().expect("state lock poisoned").create_calls
    }

    /// Number of claim-batch writes performed.
    pub fn write_calls(&self) -> usize {
        self.state.lock().expect("state lock poisoned").write_calls
    }

    pub fn entity_count(&self) -> usize {
        self.state.lock().expect("state lock poisoned").entities.len()
    }

    /// Datatype of a stored property, for assertions.
    pub fn property_datatype(&self, id: &PropertyId) -> Option<ValueKind> {
        self.state
            .lock()
            .expect("state lock poisoned")
            .entities
            .get(id.as_str())
            .and_then(|e| e.datatype)
    }
}

impl Default for MemoryKb {
    fn default() -> Self {
        Self::new()
    }
}

impl KbClient for MemoryKb {
    fn map_by_external_id(&self, property: &PropertyId) -> KbResult<Vec<(String, KbId)>> {
        let mut state = self.state.lock().expect("state lock poisoned");
        if state.query_lag > 0 {
            state.query_lag -= 1;
            return Ok(Vec::new());
        }
        let mut pairs = Vec::new();
        for (id, entity) in &state.entities {
            for claim in &entity.claims {
                if &claim.property == property {
                    if let SnakValue::Str(value) | SnakValue::Url(value) = &claim.value {
                        if let Some(kb_id) = KbId::parse(id) {
                            pairs.push((value.clone(), kb_id));
                        }
                    }
                }
            }
        }
        Ok(pairs)
    }

    fn equivalent_property_pid(&self) -> KbResult<Option<PropertyId>> {
        let state = self.state.lock().expect("state lock poisoned");
        for (id, entity) in &state.entities {
            let is_marker = entity.claims.iter().any(|c| {
                matches!(&c.value, SnakValue::Url(u) if u == uris::OWL_EQUIVALENT_PROPERTY)
            });
            if is_marker && id.starts_with('P') {
                return Ok(Some(PropertyId(id.clone())));
            }
        }
        Ok(None)
    }

    fn create_property(&self, spec: &PropertySpec) -> KbResult<PropertyId> {
        let mut state = self.state.lock().expect("state lock poisoned");
        state.next_property += 1;
        state.create_calls += 1;
        let id = format!("P{}", state.next_property);
        state.entities.insert(
            id.clone(),
            StoredEntity {
                label: spec.label.clone(),
                description: spec.description.clone(),
                aliases: Vec::new(),
                datatype: Some(spec.kind),
                claims: spec.claims.clone(),
            },
        );
        Ok(PropertyId(id))
    }

    fn create_item(&self, spec: &ItemSpec) -> KbResult<ItemId> {
        let mut state = self.state.lock().expect("state lock poisoned");
        state.next_item += 1;
        state.create_calls += 1;
        let id = format!("Q{}", state.next_item);
        state.entities.insert(
            id.clone(),
            StoredEntity {
                label: spec.label.clone(),
                description: spec.description.clone(),
                aliases: spec.aliases.clone(),
                datatype: None,
                claims: spec.claims.clone(),
            },
        );
        Ok(ItemId(id))
    }

    fn overwrite_item(&self, id: &ItemId, spec: &ItemSpec) -> KbResult<()> {
        let mut state = self.state.lock().expect("state lock poisoned");
        let entity = state
            .entities
            .get_mut(id.as_str())
            .ok_or_else(|| KbError::NotFound {
                id: id.to_string(),
            })?;
        entity.label = spec.label.clone();
        entity.description = spec.description.clone();
        entity.aliases = spec.aliases.clone();
        entity.claims = spec.claims.clone();
        Ok(())
    }

    fn append_claims(&self, subject: &ItemId, claims: &[StatementRecord]) -> KbResult<()> {
        let mut state = self.state.lock().expect("state lock poisoned");
        state.write_calls += 1;
        let entity = state
            .entities
            .get_mut(subject.as_str())
            .ok_or_else(|| KbError::NotFound {
                id: subject.to_string(),
            })?;
        entity.claims.extend_from_slice(claims);
        Ok(())
    }

    fn fetch_item(&self, id: &ItemId) -> KbResult<EntitySnapshot> {
        let state = self.state.lock().expect("state lock poisoned");
        let entity = state
            .entities
            .get(id.as_str())
            .ok_or_else(|| KbError::NotFound {
                id: id.to_string(),
            })?;
        Ok(EntitySnapshot {
            id: id.clone(),
            label: entity.label.clone(),
            description: entity.description.clone(),
            aliases: entity.aliases.clone(),
            claims: entity.claims.clone(),
        })
    }

    fn fetch_label(&self, id: &PropertyId) -> KbResult<String> {
        let state = self.state.lock().expect("state lock poisoned");
        state
            .entities
            .get(id.as_str())
            .map(|e| e.label.clone())
            .ok_or_else(|| KbError::NotFound {
                id: id.to_string(),
            })
    }
}
