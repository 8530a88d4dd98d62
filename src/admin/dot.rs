use std::fs;
use std::path::Path;

use crate::db::Database;
use crate::error::Result;
use crate::model::PropertyValue;
use crate::txn::XId;

/// Writes a Graphviz `.dot` rendering of every node and relationship
/// visible to `xid`. Intended for ad-hoc debugging of a small graph,
/// not as a durable export format.
pub fn dump_dot(db: &mut Database, path: &Path, xid: XId) -> Result<()> {
    let mut out = String::from("digraph poseidon {\n");

    let node_ids: Vec<u64> = db.store().nodes.iter().filter(|(_, r)| r.header.is_valid_for(xid)).map(|(o, _)| o).collect();
    for id in &node_ids {
        let desc = db.store_mut().get_node_description(*id, xid)?;
        out.push_str(&format!("  n{} [label=\"{}: {}\"];\n", id, desc.label, format_properties(&desc.properties)));
    }

    let rship_ids: Vec<u64> = db.store().rships.iter().filter(|(_, r)| r.header.is_valid_for(xid)).map(|(o, _)| o).collect();
    for id in &rship_ids {
        let desc = db.store_mut().get_rship_description(*id, xid)?;
        out.push_str(&format!(
            "  n{} -> n{} [label=\"{}: {}\"];\n",
            desc.from_id,
            desc.to_id,
            desc.label,
            format_properties(&desc.properties)
        ));
    }

    out.push_str("}\n");
    fs::write(path, out)?;
    Ok(())
}

fn format_properties(props: &crate::model::PropertyMap) -> String {
    props
        .iter()
        .map(|(k, v)| format!("{k}={}", format_value(v)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_value(v: &PropertyValue) -> String {
    match v {
        PropertyValue::Int32(n) => n.to_string(),
        PropertyValue::UInt64(n) => n.to_string(),
        PropertyValue::Float64(n) => n.to_string(),
        PropertyValue::String(s) => s.clone(),
        PropertyValue::DateTime(t) => t.to_string(),
    }
}
