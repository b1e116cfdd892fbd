//! Core data model for the reconciliation pipeline.
//!
//! Two worlds meet here: the flat property-graph export (CURIE-keyed
//! [`NodeRow`]s and [`EdgeRow`]s, the Neo4j bulk-import column dialect) and
//! the knowledge-base side (opaque [`PropertyId`]/[`ItemId`] identifiers,
//! [`StatementRecord`]s with provenance [`ReferenceGroup`]s).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum serialized length of a single reference fragment (text chunk or
/// rendered URL). The knowledge base rejects longer string values.
pub const FRAGMENT_MAX: usize = 400;

/// CURIEs longer than this cannot be stored as item cross-references and are
/// skipped during item creation. They remain legal edge endpoints.
pub const CURIE_MAX: usize = 100;

// ---------------------------------------------------------------------------
// Knowledge-base identifiers
// ---------------------------------------------------------------------------

/// Opaque identifier of a knowledge-base property. Assigned by the store,
/// never invented locally.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyId(pub String);

impl PropertyId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier of a knowledge-base item.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Either namespace. Bulk external-id queries return a mix of properties and
/// items; [`KbId::parse`] partitions them by the store's id scheme.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KbId {
    Property(PropertyId),
    Item(ItemId),
}

impl KbId {
    /// Classify a raw entity id by its namespace prefix (`P…` property,
    /// `Q…` item). Returns `None` for anything else.
    pub fn parse(raw: &str) -> Option<KbId> {
        let bytes = raw.as_bytes();
        let rest_numeric = bytes.len() > 1 && bytes[1..].iter().all(u8::is_ascii_digit);
        match bytes.first() {
            Some(b'P') if rest_numeric => Some(KbId::Property(PropertyId(raw.to_string()))),
            Some(b'Q') if rest_numeric => Some(KbId::Item(ItemId(raw.to_string()))),
            _ => None,
        }
    }
}

impl fmt::Display for KbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KbId::Property(p) => p.fmt(f),
            KbId::Item(q) => q.fmt(f),
        }
    }
}

// ---------------------------------------------------------------------------
// Statement values
// ---------------------------------------------------------------------------

/// Value kind of a property, resolved once at property-synchronization time.
///
/// Every predicate from the edge file maps to `ItemReference` except the
/// reserved exact-match predicate, which is `Str`. Reference fragments use
/// `Str` (supporting text) and `Url` (reference URIs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    ItemReference,
    Str,
    Url,
}

impl ValueKind {
    /// The store's datatype tag for this kind.
    pub fn datatype(self) -> &'static str {
        match self {
            ValueKind::ItemReference => "wikibase-item",
            ValueKind::Str => "string",
            ValueKind::Url => "url",
        }
    }

    pub fn from_datatype(tag: &str) -> Option<ValueKind> {
        match tag {
            "wikibase-item" => Some(ValueKind::ItemReference),
            "string" => Some(ValueKind::Str),
            "url" => Some(ValueKind::Url),
            _ => None,
        }
    }
}

/// A single typed value, as it appears in a statement main value or a
/// reference fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnakValue {
    Item(ItemId),
    Str(String),
    Url(String),
}

impl SnakValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            SnakValue::Item(_) => ValueKind::ItemReference,
            SnakValue::Str(_) => ValueKind::Str,
            SnakValue::Url(_) => ValueKind::Url,
        }
    }
}

// ---------------------------------------------------------------------------
// Statements and provenance
// ---------------------------------------------------------------------------

/// One provenance fragment: a `(property, value)` pair inside a reference
/// group. Values are always `Str` or `Url`, each at most [`FRAGMENT_MAX`]
/// characters in serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceFragment {
    pub property: PropertyId,
    pub value: SnakValue,
}

/// Ordered fragments reconstructing one source row's provenance: the chunked
/// supporting text first, then the (possibly split) reference URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceGroup {
    pub fragments: Vec<ReferenceFragment>,
}

impl ReferenceGroup {
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

/// One claim to attach to an item: a property, its value, and the ordered
/// reference groups (one group per source edge row that asserted the triple).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementRecord {
    pub property: PropertyId,
    pub value: SnakValue,
    pub references: Vec<ReferenceGroup>,
}

impl StatementRecord {
    pub fn new(property: PropertyId, value: SnakValue) -> Self {
        Self {
            property,
            value,
            references: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Property definitions
// ---------------------------------------------------------------------------

/// Canonical definition of a predicate to ensure in the knowledge base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDefinition {
    /// Display label.
    pub label: String,
    /// Description, may be empty.
    pub description: String,
    /// Value kind of the property.
    pub kind: ValueKind,
    /// Canonical URI, the key the resolver maps to the property id.
    pub uri: String,
    /// CURIE stored as the property's own cross-reference.
    pub dbxref: String,
}

impl PropertyDefinition {
    pub fn new(
        label: impl Into<String>,
        description: impl Into<String>,
        kind: ValueKind,
        uri: impl Into<String>,
        dbxref: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            description: description.into(),
            kind,
            uri: uri.into(),
            dbxref: dbxref.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Graph table rows
// ---------------------------------------------------------------------------

/// One row of the node table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRow {
    /// CURIE, the node's stable external identifier.
    #[serde(rename = "id:ID", default)]
    pub id: String,
    /// The node's type CURIE (the graph's label field).
    #[serde(rename = ":LABEL", default)]
    pub node_type: String,
    #[serde(default)]
    pub preflabel: String,
    #[serde(rename = "synonyms:IGNORE", default)]
    pub synonyms: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl NodeRow {
    /// Pipe-split synonyms, dropping empties.
    pub fn synonym_list(&self) -> Vec<String> {
        self.synonyms
            .split('|')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// One row of the edge table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRow {
    #[serde(rename = ":START_ID", default)]
    pub start_id: String,
    /// Predicate CURIE.
    #[serde(rename = ":TYPE", default)]
    pub rel_type: String,
    #[serde(rename = ":END_ID", default)]
    pub end_id: String,
    /// Pipe-delimited reference URI list, may be empty.
    #[serde(default)]
    pub reference_uri: String,
    #[serde(default)]
    pub reference_supporting_text: String,
    #[serde(default)]
    pub reference_date: String,
    #[serde(default)]
    pub property_label: String,
    #[serde(rename = "property_description:IGNORE", default)]
    pub property_description: String,
    #[serde(default)]
    pub property_uri: String,
}

impl EdgeRow {
    /// Pipe-split reference URIs, dropping empties.
    pub fn reference_uris(&self) -> Vec<&str> {
        self.reference_uri
            .split('|')
            .filter(|s| !s.is_empty())
            .collect()
    }
}
