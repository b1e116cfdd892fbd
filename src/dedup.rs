//! Label deduplication under the store's global label-uniqueness constraint.
//!
//! Two passes over the whole node set, order-independent: first substitute
//! the CURIE for records whose label and name are both blank, then append
//! `" (<curie>)"` to every record whose label is shared by at least one
//! other record. The suffix is a function of the label multiset, not of
//! processing order.

use std::collections::HashMap;

use crate::model::{CURIE_MAX, NodeRow};

/// Make `preflabel` unique across the node set, in place.
pub fn dedupe_labels(nodes: &mut [NodeRow]) {
    for node in nodes.iter_mut() {
        if node.preflabel.is_empty() && node.name.is_empty() {
            node.preflabel = node.id.clone();
        }
    }

    let mut counts: HashMap<String, usize> = HashMap::new();
    for node in nodes.iter() {
        *counts.entry(node.preflabel.clone()).or_insert(0) += 1;
    }

    for node in nodes.iter_mut() {
        if counts[&node.preflabel] > 1 {
            node.preflabel = format!("{} ({})", node.preflabel, node.id);
        }
    }
}

/// Whether a CURIE fits within the store's cross-reference length limit.
///
/// Oversized CURIEs are skipped during item creation but stay legal as edge
/// endpoints; edges referencing them simply fail to resolve later.
pub fn representable(curie: &str) -> bool {
    curie.chars().count() <= CURIE_MAX
}
