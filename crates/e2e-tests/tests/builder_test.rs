//! End-to-end document builder tests: wire maps built from documents and
//! documents rebuilt from the wire maps stored in the backend.

use pretty_assertions::assert_eq;
use serde_json::json;

use e2e_tests::TestHarness;
use searchsync_indexing::{DocumentBuilder, Indexer, RecordData, META_ID};
use searchsync_types::{IndexMethod, WireDocument};

fn user_fields(wire: &WireDocument) -> WireDocument {
    let reserved = ["id", "source_class", "record_base_class", META_ID];
    wire.iter()
        .filter(|(key, _)| !reserved.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[test]
fn test_round_trip_keeps_identity_and_fields() {
    let harness = TestHarness::new();
    harness.write_tag(1, "rust");
    harness.write_tag(2, "search");
    harness.store.write(
        RecordData::new("Page", 4)
            .with_field("Title", "Getting started")
            .with_many("Tags", &[1, 2]),
    );
    let builder = DocumentBuilder::new(harness.ctx.clone());
    let original = harness.doc("Page", 4);

    let wire = builder.to_array(original.as_ref()).unwrap();
    assert_eq!(wire["id"], json!("page_4"));
    assert_eq!(wire["source_class"], json!("Page"));
    assert_eq!(wire[META_ID], json!(4));

    let rebuilt = builder.from_array(&wire).unwrap().unwrap();
    assert_eq!(rebuilt.identifier(), original.identifier());
    assert_eq!(rebuilt.source_class(), "Page");

    let again = builder.to_array(rebuilt.as_ref()).unwrap();
    assert_eq!(user_fields(&again), user_fields(&wire));
    assert_eq!(
        user_fields(&wire),
        WireDocument::from_iter([
            ("title".to_string(), json!("Getting started")),
            ("tag_titles".to_string(), json!(["rust", "search"])),
            ("related_title".to_string(), json!(null)),
        ])
    );
}

#[test]
fn test_documents_rebuilt_from_backend_contents() {
    let harness = TestHarness::new();
    let pages = harness.write_pages(3);
    Indexer::new(harness.ctx.clone(), pages, IndexMethod::Add, 2)
        .unwrap()
        .drain()
        .unwrap();
    let builder = DocumentBuilder::new(harness.ctx.clone());

    for id in harness.indexed_ids("main") {
        let stored = harness.backend.document("main", &id).unwrap();
        let rebuilt = builder.from_array(&stored).unwrap().unwrap();
        assert_eq!(rebuilt.identifier(), id);
        assert_eq!(builder.to_array(rebuilt.as_ref()).unwrap(), stored);
    }
}

#[test]
fn test_wire_without_live_record_rebuilds_nothing() {
    let harness = TestHarness::new();
    let page = harness.write_pages(1).remove(0);
    let builder = DocumentBuilder::new(harness.ctx.clone());
    let wire = builder.to_array(page.as_ref()).unwrap();

    harness.store.delete("Page", 1);
    assert!(builder.from_array(&wire).unwrap().is_none());

    let mut anonymous = wire.clone();
    anonymous.remove("source_class");
    assert!(builder.from_array(&anonymous).unwrap().is_none());
}
