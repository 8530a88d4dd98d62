#![allow(clippy::uninlined_format_args)]

use poseidon::db::Database;
use poseidon::error::Result;
use poseidon::model::PropertyValue;
use poseidon::{PropertyMap, TxState};
use tempfile::TempDir;

fn props(pairs: &[(&str, PropertyValue)]) -> PropertyMap {
    let mut map = PropertyMap::new();
    for (k, v) in pairs {
        map.insert(k.to_string(), v.clone());
    }
    map
}

#[test]
fn commit_persists_across_reopen() -> Result<()> {
    let dir = TempDir::new()?;

    let node_id = {
        let mut db = Database::open(dir.path())?;
        let id = db.run_transaction(|tx| tx.add_node("Person", &props(&[("name", PropertyValue::String("Alice".into()))])))?;
        db.checkpoint()?;
        id
    };

    let mut db = Database::open(dir.path())?;
    let desc = db.run_transaction(|tx| tx.get_node_description(node_id))?;
    assert_eq!(desc.label, "Person");
    assert_eq!(desc.properties.get("name"), Some(&PropertyValue::String("Alice".into())));
    Ok(())
}

#[test]
fn recovery_replays_committed_work_without_checkpoint() -> Result<()> {
    let dir = TempDir::new()?;

    let node_id = {
        let mut db = Database::open(dir.path())?;
        let id = db.run_transaction(|tx| tx.add_node("Person", &PropertyMap::new()))?;
        // No explicit checkpoint: recovery must replay the WAL on reopen.
        id
    };

    let mut db = Database::open(dir.path())?;
    let desc = db.run_transaction(|tx| tx.get_node_description(node_id))?;
    assert_eq!(desc.label, "Person");
    Ok(())
}

#[test]
fn rollback_leaves_no_visible_trace() -> Result<()> {
    let dir = TempDir::new()?;
    let mut db = Database::open(dir.path())?;

    let mut tx = db.begin_transaction()?;
    let id = tx.add_node("Person", &PropertyMap::new())?;
    tx.rollback()?;

    let mut tx = db.begin_transaction()?;
    assert!(tx.get_node_description(id).is_err());
    tx.rollback()?;
    Ok(())
}

#[test]
fn nested_transaction_on_the_same_thread_is_rejected() -> Result<()> {
    // `transaction::has_active()` is a thread-local marker, not tied to a
    // single `Database` — so the guard also fires across two distinct
    // databases opened on the same thread while one still holds an
    // active transaction.
    let dir_a = TempDir::new()?;
    let dir_b = TempDir::new()?;
    let mut db_a = Database::open(dir_a.path())?;
    let mut db_b = Database::open(dir_b.path())?;

    let _tx = db_a.begin_transaction()?;
    assert!(db_b.begin_transaction().is_err());
    Ok(())
}

#[test]
fn committed_transaction_reports_committed_state() -> Result<()> {
    let dir = TempDir::new()?;
    let mut db = Database::open(dir.path())?;
    let mut tx = db.begin_transaction()?;
    tx.add_node("Person", &PropertyMap::new())?;
    assert_eq!(tx.state(), TxState::Active);
    tx.commit()?;
    Ok(())
}

#[test]
fn secondary_index_lookup_finds_matching_nodes() -> Result<()> {
    let dir = TempDir::new()?;
    let mut db = Database::open(dir.path())?;
    db.create_index("Person", "age")?;

    db.run_transaction(|tx| {
        tx.add_node("Person", &props(&[("age", PropertyValue::Int32(30))]))?;
        tx.add_node("Person", &props(&[("age", PropertyValue::Int32(30))]))?;
        tx.add_node("Person", &props(&[("age", PropertyValue::Int32(99))]))?;
        Ok(())
    })?;

    let mut hits = Vec::new();
    db.index_lookup("Person", "age", 30, |id| hits.push(id))?;
    assert_eq!(hits.len(), 2);

    db.drop_index("Person", "age")?;
    assert!(!db.has_index("Person", "age"));
    Ok(())
}

#[test]
fn relationship_traversal_finds_outgoing_edge() -> Result<()> {
    let dir = TempDir::new()?;
    let mut db = Database::open(dir.path())?;

    let (alice, bob) = db.run_transaction(|tx| {
        let alice = tx.add_node("Person", &PropertyMap::new())?;
        let bob = tx.add_node("Person", &PropertyMap::new())?;
        tx.add_relationship("KNOWS", alice, bob, &PropertyMap::new())?;
        Ok((alice, bob))
    })?;

    let tx = db.begin_transaction()?;
    let xid = tx.xid();
    tx.rollback()?;

    let mut seen = Vec::new();
    db.foreach_from_relationship_of_node(alice, Some("KNOWS"), xid, |rel| seen.push((rel.from_id, rel.to_id)))?;
    assert_eq!(seen, vec![(alice, bob)]);
    Ok(())
}

#[test]
fn verify_reports_no_findings_on_a_healthy_graph() -> Result<()> {
    let dir = TempDir::new()?;
    let mut db = Database::open(dir.path())?;
    db.run_transaction(|tx| {
        let a = tx.add_node("Person", &PropertyMap::new())?;
        let b = tx.add_node("Person", &PropertyMap::new())?;
        tx.add_relationship("KNOWS", a, b, &PropertyMap::new())?;
        Ok(())
    })?;

    let report = db.verify(poseidon::admin::IntegrityOptions::default());
    assert!(report.ok());
    assert_eq!(report.nodes_checked, 2);
    assert_eq!(report.relationships_checked, 1);
    Ok(())
}

#[test]
fn vacuum_reclaims_abandoned_reservation_after_rollback() -> Result<()> {
    let dir = TempDir::new()?;
    let mut db = Database::open(dir.path())?;

    let mut tx = db.begin_transaction()?;
    tx.add_node("Person", &PropertyMap::new())?;
    tx.rollback()?;

    let report = db.vacuum_now()?;
    assert_eq!(report.nodes_reclaimed, 1);
    Ok(())
}
