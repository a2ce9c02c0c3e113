mod helpers;

use anyhow::bail;
use braid::config::BraidConfig;
use braid::engine::{CaptureRequest, MemoryEngine};
use braid::extract::{Extraction, ExtractionProvider};
use braid::memory::types::OriginType;
use braid::store::{bridges, threads};
use helpers::{insert_thread, test_db, test_embedding};
use std::sync::Arc;

/// Provider that always fails, standing in for an LLM timeout.
struct FailingExtractor;

impl ExtractionProvider for FailingExtractor {
    fn extract(
        &self,
        _content: &str,
        _origin: OriginType,
        _file_path: Option<&str>,
    ) -> anyhow::Result<Extraction> {
        bail!("upstream model timed out")
    }
}

#[test]
fn extraction_failure_degrades_to_heuristic() {
    let engine = MemoryEngine::in_memory(BraidConfig::default())
        .unwrap()
        .with_providers(
            Arc::from(braid::embedding::default_provider()),
            Arc::new(FailingExtractor),
        );

    // the capture still succeeds and produces a usable thread
    let result = engine
        .capture(CaptureRequest::new(
            "Investigating flaky integration tests in the payments suite",
            OriginType::Prompt,
        ))
        .unwrap();
    assert_eq!(result.action, "new_thread");
    assert!(!result.thread_title.is_empty());
}

#[test]
fn corrupt_thread_rows_never_crash_readers() {
    let mut conn = test_db();
    insert_thread(&mut conn, "good one", &["ok"], "fine", test_embedding(0));
    let bad = insert_thread(&mut conn, "bad one", &["ok"], "fine", test_embedding(1));

    // mangle the topics JSON behind the store's back (the status column is
    // guarded by a CHECK constraint, JSON payloads are not)
    conn.execute(
        "UPDATE threads SET topics = 'not json' WHERE id = ?1",
        rusqlite::params![bad.id],
    )
    .unwrap();

    // readers skip the corrupt row and keep going
    assert!(threads::get_thread(&conn, &bad.id).unwrap().is_none());
    let active = threads::list_active(&conn).unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].title, "good one");
}

#[test]
fn corrupt_bridge_rows_are_invisible() {
    let mut conn = test_db();
    let bridge = braid::memory::types::Bridge::new(
        "a",
        "b",
        braid::memory::types::RelationType::Extends,
        "",
        vec![],
        0.8,
    );
    bridges::save_bridge(&mut conn, &bridge).unwrap();
    conn.execute(
        "UPDATE bridges SET shared_concepts = 'not-json' WHERE id = ?1",
        rusqlite::params![bridge.id],
    )
    .unwrap();

    assert!(bridges::get_bridge(&conn, &bridge.id).unwrap().is_none());
    assert!(bridges::list_all(&conn).unwrap().is_empty());
    // and a fresh save between the same endpoints is not blocked forever:
    // the corrupt row is unreadable, so the pair reads as unconnected
    let replacement = braid::memory::types::Bridge::new(
        "a",
        "b",
        braid::memory::types::RelationType::Extends,
        "",
        vec![],
        0.8,
    );
    let saved = bridges::save_bridge(&mut conn, &replacement).unwrap();
    assert!(!saved.deduplicated);
}

#[test]
fn sweep_survives_corrupt_rows() {
    let mut conn = test_db();
    let bad = insert_thread(&mut conn, "bad", &[], "c", test_embedding(0));
    insert_thread(&mut conn, "good", &[], "c", test_embedding(1));
    conn.execute(
        "UPDATE threads SET topics = '{{{' WHERE id = ?1",
        rusqlite::params![bad.id],
    )
    .unwrap();

    let result = braid::memory::lifecycle::decay_sweep(&mut conn).unwrap();
    assert_eq!(result.decayed, 1); // only the readable thread
}

#[test]
fn capture_json_handles_arbitrary_nesting() {
    let engine = MemoryEngine::in_memory(BraidConfig::default()).unwrap();
    let value = serde_json::json!({
        "result": {
            "blocks": [
                {"type": "status", "code": 200},
                {"type": "text", "text": "the actual tool output we want captured"}
            ]
        }
    });
    let result = engine.capture_json(&value, OriginType::Fetch).unwrap();
    assert_eq!(result.action, "new_thread");
}
