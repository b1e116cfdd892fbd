//! Statement construction from edge rows.
//!
//! Edges are grouped by subject, then by distinct (subject, predicate,
//! object) triple: each distinct triple becomes exactly one statement, and
//! each source row contributes one reference group to it. All statements of
//! a subject go to the store in a single batched write; a failing subject is
//! logged and skipped without aborting the run.

use std::collections::BTreeMap;

use crate::kb::KbClient;
use crate::model::{EdgeRow, ReferenceFragment, ReferenceGroup, SnakValue, StatementRecord, ValueKind};
use crate::reference;
use crate::resolver::IdentifierResolver;
use crate::sync::{PredicateTable, Schema};

/// Counters for one edge-processing pass.
#[derive(Debug, Default, Clone)]
pub struct EdgeReport {
    pub subjects_written: usize,
    pub statements_written: usize,
    pub reference_groups: usize,
    pub dropped_triples: usize,
    pub unresolved_subjects: usize,
    pub failed_subjects: usize,
}

pub struct StatementBuilder<'a> {
    resolver: &'a IdentifierResolver,
    predicates: &'a PredicateTable,
    schema: &'a Schema,
}

impl<'a> StatementBuilder<'a> {
    pub fn new(
        resolver: &'a IdentifierResolver,
        predicates: &'a PredicateTable,
        schema: &'a Schema,
    ) -> Self {
        Self { resolver, predicates, schema }
    }

    /// One reference group per source row: supporting text wrapped into
    /// fragments, then each raw URI rendered into its fragment forms.
    pub fn reference_group(&self, row: &EdgeRow) -> ReferenceGroup {
        let mut fragments = Vec::new();
        for chunk in reference::chunk_text(&row.reference_supporting_text) {
            fragments.push(ReferenceFragment {
                property: self.schema.supporting_text.clone(),
                value: SnakValue::Str(chunk),
            });
        }
        for raw in row.reference_uris() {
            for url in reference::url_fragments(raw) {
                fragments.push(ReferenceFragment {
                    property: self.schema.reference_uri.clone(),
                    value: SnakValue::Url(url),
                });
            }
        }
        ReferenceGroup { fragments }
    }

    /// Resolve predicate and object for one triple. `None` means the triple
    /// is dropped: unknown predicate, or an object CURIE no item was created
    /// for.
    fn bare_statement(&self, row: &EdgeRow) -> Option<StatementRecord> {
        let handle = match self.predicates.get(&row.rel_type) {
            Some(handle) => handle,
            None => {
                tracing::warn!(predicate = %row.rel_type, "unknown predicate, dropping triple");
                return None;
            }
        };
        let value = match handle.kind {
            ValueKind::ItemReference => match self.resolver.resolve_item(&row.end_id) {
                Some(qid) => SnakValue::Item(qid.clone()),
                None => {
                    tracing::warn!(
                        subject = %row.start_id,
                        predicate = %row.rel_type,
                        object = %row.end_id,
                        "object unresolved, dropping triple"
                    );
                    return None;
                }
            },
            ValueKind::Str => SnakValue::Str(row.end_id.clone()),
            ValueKind::Url => SnakValue::Url(row.end_id.clone()),
        };
        Some(StatementRecord::new(handle.property.clone(), value))
    }

    /// Build the statement set for one subject's rows: one statement per
    /// distinct triple, one reference group per row, in deterministic
    /// (predicate, object) order. Returns the statements and the number of
    /// dropped triples.
    pub fn subject_statements(&self, rows: &[&EdgeRow]) -> (Vec<StatementRecord>, usize) {
        let mut grouped: BTreeMap<(String, String), Vec<&EdgeRow>> = BTreeMap::new();
        for row in rows {
            grouped
                .entry((row.rel_type.clone(), row.end_id.clone()))
                .or_default()
                .push(row);
        }

        let mut statements = Vec::new();
        let mut dropped = 0;
        for rows in grouped.values() {
            let Some(mut statement) = self.bare_statement(rows[0]) else {
                dropped += 1;
                continue;
            };
            for row in rows {
                statement.references.push(self.reference_group(row));
            }
            statements.push(statement);
        }
        (statements, dropped)
    }
}

/// Process the whole edge set: group by subject, build each subject's
/// statements, and push them in one batched write per subject. Subjects
/// without a resolvable item, and subjects whose write fails, are skipped
/// with a log line; the pass always runs to completion.
pub fn push_edges(
    client: &dyn KbClient,
    builder: &StatementBuilder<'_>,
    edges: &[EdgeRow],
    write: bool,
) -> EdgeReport {
    let mut by_subject: BTreeMap<&str, Vec<&EdgeRow>> = BTreeMap::new();
    for edge in edges {
        if edge.start_id.is_empty() {
            continue;
        }
        by_subject.entry(edge.start_id.as_str()).or_default().push(edge);
    }

    let mut report = EdgeReport::default();
    for (subject, rows) in by_subject {
        let Some(qid) = builder.resolver.resolve_item(subject) else {
            tracing::warn!(subject, "subject unresolved, skipping its statements");
            report.unresolved_subjects += 1;
            continue;
        };

        let (statements, dropped) = builder.subject_statements(&rows);
        report.dropped_triples += dropped;
        if statements.is_empty() {
            continue;
        }

        if write {
            if let Err(error) = client.append_claims(qid, &statements) {
                tracing::error!(subject, qid = %qid, %error, "statement write failed, continuing");
                report.failed_subjects += 1;
                continue;
            }
        }
        report.subjects_written += 1;
        report.statements_written += statements.len();
        report.reference_groups += statements.iter().map(|s| s.references.len()).sum::<usize>();
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::MemoryKb;
    use crate::model::{FRAGMENT_MAX, ItemId};
    use crate::reference::CITATION_BASE;
    use crate::retry::RetryPolicy;
    use crate::sync::{EXACT_MATCH_CURIE, ItemInputs, Synchronizer, uris};

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            delay: std::time::Duration::from_millis(1),
        }
    }

    fn edge(start: &str, rel: &str, end: &str) -> EdgeRow {
        EdgeRow {
            start_id: start.into(),
            rel_type: rel.into(),
            end_id: end.into(),
            property_uri: format!("http://example.org/{rel}"),
            ..Default::default()
        }
    }

    fn synced<'a>(kb: &'a MemoryKb, edges: &[EdgeRow], items: &[&str]) -> (Synchronizer<'a>, PredicateTable) {
        let mut sync = Synchronizer::bootstrap(kb, true, fast_retry(), uris::TYPE_OF).unwrap();
        let table = sync.sync_properties(edges).unwrap();
        for &curie in items {
            sync.ensure_item(
                &ItemInputs {
                    label: curie,
                    curie,
                    ..Default::default()
                },
                false,
            )
            .unwrap();
        }
        (sync, table)
    }

    #[test]
    fn duplicate_triples_collapse_to_one_statement_with_two_reference_groups() {
        let kb = MemoryKb::new();
        let mut rows = vec![
            edge("GO:1", "part_of", "GO:2"),
            edge("GO:1", "part_of", "GO:2"),
        ];
        rows[0].reference_uri = format!("{CITATION_BASE}111");
        rows[1].reference_uri = format!("{CITATION_BASE}222");
        let (sync, table) = synced(&kb, &rows, &["GO:1", "GO:2"]);
        let builder = StatementBuilder::new(&sync.resolver, &table, sync.schema());

        let report = push_edges(&kb, &builder, &rows, true);
        assert_eq!(report.subjects_written, 1);
        assert_eq!(report.statements_written, 1);
        assert_eq!(report.reference_groups, 2);

        let qid = sync.resolver.resolve_item("GO:1").unwrap();
        let snapshot = kb.fetch_item(qid).unwrap();
        let stmt = snapshot
            .claims
            .iter()
            .find(|c| matches!(&c.value, SnakValue::Item(_)))
            .unwrap();
        assert_eq!(stmt.references.len(), 2);
    }

    #[test]
    fn exact_match_objects_stay_literal() {
        let kb = MemoryKb::new();
        let rows = vec![edge("GO:1", EXACT_MATCH_CURIE, "MESH:D000001")];
        let (sync, table) = synced(&kb, &rows, &["GO:1"]);
        let builder = StatementBuilder::new(&sync.resolver, &table, sync.schema());

        let report = push_edges(&kb, &builder, &rows, true);
        assert_eq!(report.statements_written, 1);
        assert_eq!(report.dropped_triples, 0);

        let qid = sync.resolver.resolve_item("GO:1").unwrap();
        let snapshot = kb.fetch_item(qid).unwrap();
        assert!(snapshot.claims.iter().any(|c| {
            c.property == sync.schema().exact_match
                && c.value == SnakValue::Str("MESH:D000001".to_string())
        }));
    }

    #[test]
    fn unresolved_object_drops_triple_but_not_run() {
        let kb = MemoryKb::new();
        let rows = vec![
            edge("GO:1", "part_of", "GO:MISSING"),
            edge("GO:1", "part_of", "GO:2"),
        ];
        let (sync, table) = synced(&kb, &rows, &["GO:1", "GO:2"]);
        let builder = StatementBuilder::new(&sync.resolver, &table, sync.schema());

        let report = push_edges(&kb, &builder, &rows, true);
        assert_eq!(report.dropped_triples, 1);
        assert_eq!(report.statements_written, 1);
    }

    #[test]
    fn unresolved_subject_skips_all_its_rows() {
        let kb = MemoryKb::new();
        let rows = vec![edge("GO:ABSENT", "part_of", "GO:2")];
        let (sync, table) = synced(&kb, &rows, &["GO:2"]);
        let builder = StatementBuilder::new(&sync.resolver, &table, sync.schema());

        let report = push_edges(&kb, &builder, &rows, true);
        assert_eq!(report.unresolved_subjects, 1);
        assert_eq!(report.subjects_written, 0);
    }

    #[test]
    fn long_supporting_text_and_citation_batches_fragment() {
        let kb = MemoryKb::new();
        let mut row = edge("GO:1", "part_of", "GO:2");
        row.reference_supporting_text = (0..150)
            .map(|i| format!("word{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        let ids: Vec<String> = (20_000_000..20_000_060).map(|i| i.to_string()).collect();
        row.reference_uri = format!("{CITATION_BASE}{}", ids.join(","));
        let rows = vec![row];
        let (sync, table) = synced(&kb, &rows, &["GO:1", "GO:2"]);
        let builder = StatementBuilder::new(&sync.resolver, &table, sync.schema());

        let group = builder.reference_group(&rows[0]);
        let texts: Vec<_> = group
            .fragments
            .iter()
            .filter(|f| f.property == sync.schema().supporting_text)
            .collect();
        let urls: Vec<_> = group
            .fragments
            .iter()
            .filter(|f| f.property == sync.schema().reference_uri)
            .collect();
        assert!(texts.len() > 1);
        assert!(urls.len() > 1);
        for fragment in &group.fragments {
            let len = match &fragment.value {
                SnakValue::Str(s) | SnakValue::Url(s) => s.chars().count(),
                SnakValue::Item(_) => 0,
            };
            assert!(len <= FRAGMENT_MAX);
        }
    }

    #[test]
    fn failed_subject_write_does_not_abort_other_subjects() {
        let kb = MemoryKb::new();
        let rows = vec![
            edge("GO:1", "part_of", "GO:2"),
            edge("GO:GHOST", "part_of", "GO:2"),
        ];
        let (mut sync, table) = synced(&kb, &rows, &["GO:1", "GO:2"]);
        // A resolvable CURIE whose item the store no longer has: the write
        // for it fails, everything else still lands.
        sync.resolver
            .register_item("GO:GHOST", ItemId("Q9999".into()));
        let builder = StatementBuilder::new(&sync.resolver, &table, sync.schema());

        let report = push_edges(&kb, &builder, &rows, true);
        assert_eq!(report.failed_subjects, 1);
        assert_eq!(report.subjects_written, 1);
        assert_eq!(report.statements_written, 1);

        let qid = sync.resolver.resolve_item("GO:1").unwrap();
        assert!(
            kb.fetch_item(qid)
                .unwrap()
                .claims
                .iter()
                .any(|c| matches!(&c.value, SnakValue::Item(_)))
        );
    }

    #[test]
    fn unknown_predicate_drops_triple_without_failing() {
        let kb = MemoryKb::new();
        let known = edge("GO:1", "part_of", "GO:2");
        let unknown = edge("GO:1", "never_synchronized", "GO:2");
        let (sync, table) = synced(&kb, std::slice::from_ref(&known), &["GO:1", "GO:2"]);
        let builder = StatementBuilder::new(&sync.resolver, &table, sync.schema());

        let report = push_edges(&kb, &builder, &[known, unknown], true);
        assert_eq!(report.dropped_triples, 1);
        assert_eq!(report.statements_written, 1);
        assert_eq!(report.failed_subjects, 0);
    }

    #[test]
    fn simulated_pass_writes_nothing_but_still_counts() {
        let kb = MemoryKb::new();
        let rows = vec![edge("GO:1", "part_of", "GO:2")];
        let (sync, table) = synced(&kb, &rows, &["GO:1", "GO:2"]);
        let builder = StatementBuilder::new(&sync.resolver, &table, sync.schema());

        let writes_before = kb.write_calls();
        let report = push_edges(&kb, &builder, &rows, false);
        assert_eq!(kb.write_calls(), writes_before);
        assert_eq!(report.statements_written, 1);
    }
}
