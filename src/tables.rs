//! CSV table I/O for the property-graph export format.
//!
//! Reads and writes the node/edge tables produced by a graph-database bulk
//! dump. Blank cells and the literal string `None` both normalize to the
//! empty string, so downstream code only ever deals with `""` for "absent".

use std::path::Path;

use crate::error::{TableError, TableResult};
use crate::model::{EdgeRow, NodeRow};

fn normalize(field: &mut String) {
    if field == "None" {
        field.clear();
    }
}

/// Read the node table, normalizing absent values.
pub fn read_nodes(path: &Path) -> TableResult<Vec<NodeRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|source| TableError::Read {
            path: path.display().to_string(),
            source,
        })?;

    let mut rows = Vec::new();
    for record in reader.deserialize() {
        let mut row: NodeRow = record.map_err(|source| TableError::Read {
            path: path.display().to_string(),
            source,
        })?;
        normalize(&mut row.id);
        normalize(&mut row.node_type);
        normalize(&mut row.preflabel);
        normalize(&mut row.synonyms);
        normalize(&mut row.name);
        normalize(&mut row.description);
        rows.push(row);
    }
    tracing::debug!(path = %path.display(), count = rows.len(), "read node table");
    Ok(rows)
}

/// Read the edge table, normalizing absent values.
pub fn read_edges(path: &Path) -> TableResult<Vec<EdgeRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|source| TableError::Read {
            path: path.display().to_string(),
            source,
        })?;

    let mut rows = Vec::new();
    for record in reader.deserialize() {
        let mut row: EdgeRow = record.map_err(|source| TableError::Read {
            path: path.display().to_string(),
            source,
        })?;
        normalize(&mut row.start_id);
        normalize(&mut row.rel_type);
        normalize(&mut row.end_id);
        normalize(&mut row.reference_uri);
        normalize(&mut row.reference_supporting_text);
        normalize(&mut row.reference_date);
        normalize(&mut row.property_label);
        normalize(&mut row.property_description);
        normalize(&mut row.property_uri);
        rows.push(row);
    }
    tracing::debug!(path = %path.display(), count = rows.len(), "read edge table");
    Ok(rows)
}

/// Write a node table with the standard column set.
pub fn write_nodes(path: &Path, rows: &[NodeRow]) -> TableResult<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|source| TableError::Write {
        path: path.display().to_string(),
        source,
    })?;
    for row in rows {
        writer.serialize(row).map_err(|source| TableError::Write {
            path: path.display().to_string(),
            source,
        })?;
    }
    writer
        .flush()
        .map_err(|source| TableError::Write {
            path: path.display().to_string(),
            source: csv::Error::from(source),
        })?;
    tracing::debug!(path = %path.display(), count = rows.len(), "wrote node table");
    Ok(())
}

/// Write an edge table with the standard column set.
pub fn write_edges(path: &Path, rows: &[EdgeRow]) -> TableResult<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|source| TableError::Write {
        path: path.display().to_string(),
        source,
    })?;
    for row in rows {
        writer.serialize(row).map_err(|source| TableError::Write {
            path: path.display().to_string(),
            source,
        })?;
    }
    writer
        .flush()
        .map_err(|source| TableError::Write {
            path: path.display().to_string(),
            source: csv::Error::from(source),
        })?;
    tracing::debug!(path = %path.display(), count = rows.len(), "wrote edge table");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn read_nodes_normalizes_none_and_blank() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nodes.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "id:ID,:LABEL,preflabel,synonyms:IGNORE,name,description").unwrap();
        writeln!(f, "GO:1,biological_process,apoptosis,a|b,None,").unwrap();
        drop(f);

        let rows = read_nodes(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "GO:1");
        assert_eq!(rows[0].name, "");
        assert_eq!(rows[0].description, "");
        assert_eq!(rows[0].synonym_list(), vec!["a", "b"]);
    }

    #[test]
    fn node_table_round_trips() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nodes.csv");
        let rows = vec![NodeRow {
            id: "GO:1".into(),
            node_type: "biological_process".into(),
            preflabel: "apoptosis".into(),
            synonyms: "cell death".into(),
            name: "apoptosis".into(),
            description: "programmed cell death".into(),
        }];
        write_nodes(&path, &rows).unwrap();
        let back = read_nodes(&path).unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn edge_table_round_trips() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("edges.csv");
        let rows = vec![EdgeRow {
            start_id: "GO:1".into(),
            rel_type: "RO:0002331".into(),
            end_id: "GO:2".into(),
            reference_uri: "http://a|http://b".into(),
            reference_supporting_text: "supporting words".into(),
            property_uri: "http://purl.obolibrary.org/obo/RO_0002331".into(),
            ..Default::default()
        }];
        write_edges(&path, &rows).unwrap();
        let back = read_edges(&path).unwrap();
        assert_eq!(back, rows);
    }
}
