//! End-to-end import/export runs against the in-memory store.

use std::time::Duration;

use wikibridge::kb::MemoryKb;
use wikibridge::model::{EdgeRow, NodeRow};
use wikibridge::pipeline::{self, ImportOptions};
use wikibridge::reference::CITATION_BASE;
use wikibridge::retry::RetryPolicy;
use wikibridge::sync::uris;

fn options() -> ImportOptions {
    ImportOptions {
        retry: RetryPolicy {
            max_attempts: 5,
            delay: Duration::from_millis(1),
        },
        ..Default::default()
    }
}

fn node(id: &str, node_type: &str, preflabel: &str) -> NodeRow {
    NodeRow {
        id: id.into(),
        node_type: node_type.into(),
        preflabel: preflabel.into(),
        ..Default::default()
    }
}

fn edge(start: &str, rel: &str, end: &str) -> EdgeRow {
    EdgeRow {
        start_id: start.into(),
        rel_type: rel.into(),
        end_id: end.into(),
        property_label: rel.replace('_', " "),
        property_uri: format!("http://purl.obolibrary.org/obo/{rel}"),
        ..Default::default()
    }
}

#[test]
fn import_then_export_round_trips_tables() {
    let kb = MemoryKb::new();

    let mut apoptosis = node("GO:0006915", "biological_process", "apoptosis");
    apoptosis.name = "programmed cell death".into();
    apoptosis.synonyms = "apoptotic process|cell suicide".into();
    apoptosis.description = "death of a cell by its own program".into();
    let nodes = vec![
        apoptosis,
        node("GO:0012501", "biological_process", "necrosis"),
    ];

    let mut part_of = edge("GO:0006915", "BFO:0000050", "GO:0012501");
    part_of.reference_supporting_text = "observed in liver tissue".into();
    part_of.reference_uri = format!("{CITATION_BASE}11111,22222");
    let edges = vec![part_of];

    let report = pipeline::run_import(&kb, nodes, edges, &options()).unwrap();
    assert_eq!(report.items_created, 3); // two nodes + one class item
    assert_eq!(report.statements_written, 1);
    assert_eq!(report.dropped_triples, 0);

    let (out_nodes, out_edges) = pipeline::run_export(&kb, uris::TYPE_OF).unwrap();
    assert_eq!(out_nodes.len(), 2);
    assert_eq!(out_edges.len(), 1);

    let exported = out_nodes.iter().find(|n| n.id == "GO:0006915").unwrap();
    assert_eq!(exported.node_type, "biological_process");
    assert_eq!(exported.preflabel, "apoptosis");
    assert_eq!(exported.description, "death of a cell by its own program");
    let synonyms = exported.synonym_list();
    assert!(synonyms.contains(&"programmed cell death".to_string()));
    assert!(synonyms.contains(&"cell suicide".to_string()));
    assert!(!synonyms.contains(&"apoptosis".to_string()));

    let exported_edge = &out_edges[0];
    assert_eq!(exported_edge.start_id, "GO:0006915");
    assert_eq!(exported_edge.rel_type, "BFO:0000050");
    assert_eq!(exported_edge.end_id, "GO:0012501");
    assert_eq!(
        exported_edge.property_uri,
        "http://purl.obolibrary.org/obo/BFO:0000050"
    );
    assert_eq!(
        exported_edge.reference_supporting_text,
        "observed in liver tissue"
    );
    assert_eq!(
        exported_edge.reference_uri,
        format!("{CITATION_BASE}11111,22222")
    );
}

#[test]
fn oversized_citation_batches_round_trip_through_splitting() {
    let kb = MemoryKb::new();
    let nodes = vec![
        node("GO:1", "biological_process", "a"),
        node("GO:2", "biological_process", "b"),
    ];
    let ids: Vec<String> = (30_000_000..30_000_060).map(|i| i.to_string()).collect();
    let batched = format!("{CITATION_BASE}{}", ids.join(","));
    let mut link = edge("GO:1", "BFO:0000050", "GO:2");
    link.reference_uri = batched.clone();
    assert!(batched.len() > 400);

    pipeline::run_import(&kb, nodes, vec![link], &options()).unwrap();
    let (_, out_edges) = pipeline::run_export(&kb, uris::TYPE_OF).unwrap();
    assert_eq!(out_edges.len(), 1);
    assert_eq!(out_edges[0].reference_uri, batched);
}

#[test]
fn repeated_triples_become_one_statement_with_one_group_per_row() {
    let kb = MemoryKb::new();
    let nodes = vec![
        node("GO:1", "biological_process", "a"),
        node("GO:2", "biological_process", "b"),
    ];
    let mut first = edge("GO:1", "BFO:0000050", "GO:2");
    first.reference_uri = format!("{CITATION_BASE}111");
    let mut second = edge("GO:1", "BFO:0000050", "GO:2");
    second.reference_uri = format!("{CITATION_BASE}222");

    let report = pipeline::run_import(&kb, nodes, vec![first, second], &options()).unwrap();
    assert_eq!(report.statements_written, 1);
    assert_eq!(report.reference_groups, 2);

    // Each group surfaces as its own edge row on the way back out.
    let (_, out_edges) = pipeline::run_export(&kb, uris::TYPE_OF).unwrap();
    assert_eq!(out_edges.len(), 2);
    let mut uris: Vec<_> = out_edges.iter().map(|e| e.reference_uri.clone()).collect();
    uris.sort();
    assert_eq!(
        uris,
        vec![format!("{CITATION_BASE}111"), format!("{CITATION_BASE}222")]
    );
}

#[test]
fn duplicate_labels_are_disambiguated_before_creation() {
    let kb = MemoryKb::new();
    let nodes = vec![
        node("GO:1", "biological_process", "apoptosis"),
        node("GO:2", "biological_process", "apoptosis"),
    ];
    pipeline::run_import(&kb, nodes, Vec::new(), &options()).unwrap();

    let (out_nodes, _) = pipeline::run_export(&kb, uris::TYPE_OF).unwrap();
    let mut labels: Vec<_> = out_nodes.iter().map(|n| n.preflabel.clone()).collect();
    labels.sort();
    assert_eq!(labels, vec!["apoptosis (GO:1)", "apoptosis (GO:2)"]);
}

#[test]
fn simulate_run_touches_nothing_but_still_reports() {
    let kb = MemoryKb::new();
    let nodes = vec![
        node("GO:1", "biological_process", "a"),
        node("GO:2", "biological_process", "b"),
    ];
    let edges = vec![edge("GO:1", "BFO:0000050", "GO:2")];
    let report = pipeline::run_import(
        &kb,
        nodes,
        edges,
        &ImportOptions {
            simulate: true,
            ..options()
        },
    )
    .unwrap();

    assert_eq!(kb.create_calls(), 0);
    assert_eq!(kb.write_calls(), 0);
    assert_eq!(kb.entity_count(), 1); // only the pre-seeded store property
    assert_eq!(report.items_created, 3);
    assert_eq!(report.statements_written, 1);
}

#[test]
fn second_import_is_idempotent_without_force() {
    let kb = MemoryKb::new();
    let nodes = vec![
        node("GO:1", "biological_process", "a"),
        node("GO:2", "biological_process", "b"),
    ];
    pipeline::run_import(&kb, nodes.clone(), Vec::new(), &options()).unwrap();
    let creates_after_first = kb.create_calls();

    let report = pipeline::run_import(&kb, nodes, Vec::new(), &options()).unwrap();
    assert_eq!(kb.create_calls(), creates_after_first);
    assert_eq!(report.items_created, 0);
    assert_eq!(report.items_existing, 3);
    assert_eq!(report.properties_created, 0);
}

#[test]
fn force_reimport_overwrites_changed_labels() {
    let kb = MemoryKb::new();
    pipeline::run_import(
        &kb,
        vec![node("GO:1", "biological_process", "old label")],
        Vec::new(),
        &options(),
    )
    .unwrap();

    let report = pipeline::run_import(
        &kb,
        vec![node("GO:1", "biological_process", "new label")],
        Vec::new(),
        &ImportOptions {
            force: true,
            ..options()
        },
    )
    .unwrap();
    assert!(report.items_updated >= 1);

    let (out_nodes, _) = pipeline::run_export(&kb, uris::TYPE_OF).unwrap();
    let exported = out_nodes.iter().find(|n| n.id == "GO:1").unwrap();
    assert_eq!(exported.preflabel, "new label");
}

#[test]
fn import_rides_out_query_endpoint_lag() {
    let kb = MemoryKb::with_query_lag(3);
    let report = pipeline::run_import(
        &kb,
        vec![node("GO:1", "biological_process", "a")],
        Vec::new(),
        &options(),
    )
    .unwrap();
    assert_eq!(report.items_created, 2);
}

#[test]
fn unknown_endpoints_drop_triples_without_failing_the_run() {
    let kb = MemoryKb::new();
    let nodes = vec![node("GO:1", "biological_process", "a")];
    let edges = vec![
        edge("GO:1", "BFO:0000050", "GO:MISSING"),
        edge("GO:ABSENT", "BFO:0000050", "GO:1"),
    ];
    let report = pipeline::run_import(&kb, nodes, edges, &options()).unwrap();
    assert_eq!(report.dropped_triples, 1);
    assert_eq!(report.unresolved_subjects, 1);
    assert_eq!(report.statements_written, 0);
}

#[test]
fn exact_match_objects_export_as_literals() {
    let kb = MemoryKb::new();
    let nodes = vec![node("GO:1", "biological_process", "a")];
    let edges = vec![EdgeRow {
        start_id: "GO:1".into(),
        rel_type: "skos:exactMatch".into(),
        end_id: "MESH:D000001".into(),
        ..Default::default()
    }];
    let report = pipeline::run_import(&kb, nodes, edges, &options()).unwrap();
    assert_eq!(report.statements_written, 1);

    let (_, out_edges) = pipeline::run_export(&kb, uris::TYPE_OF).unwrap();
    assert_eq!(out_edges.len(), 1);
    assert_eq!(out_edges[0].rel_type, "skos:exactMatch");
    assert_eq!(out_edges[0].end_id, "MESH:D000001");
}
