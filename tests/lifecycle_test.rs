mod helpers;

use braid::engine::{CaptureRequest, MemoryEngine};
use braid::config::BraidConfig;
use braid::error::EngineError;
use braid::memory::lifecycle::{
    archive_stale, decay_sweep, enforce_quota, merge_threads, set_mode, split_thread,
    SplitPartition,
};
use braid::memory::types::{Message, OriginType, Role, SplitLockMode, Thread, ThreadStatus};
use braid::store::threads;
use helpers::{backdate_thread, insert_thread, test_db, test_embedding};

#[test]
fn quota_invariant_holds_after_decision_sequences() {
    let mut conn = test_db();
    set_mode(&conn, "light").unwrap(); // quota 15

    for i in 0..40u8 {
        insert_thread(
            &mut conn,
            &format!("thread {i}"),
            &[],
            "content",
            test_embedding(i),
        );
        enforce_quota(&mut conn).unwrap();
        assert!(threads::list_active(&conn).unwrap().len() <= 15);
    }

    // nothing was deleted, only suspended
    assert_eq!(threads::list_all(&conn).unwrap().len(), 40);
}

#[test]
fn mode_change_takes_effect_on_next_pass() {
    let mut conn = test_db();
    set_mode(&conn, "light").unwrap();
    for i in 0..20u8 {
        insert_thread(&mut conn, &format!("t{i}"), &[], "c", test_embedding(i));
    }
    enforce_quota(&mut conn).unwrap();
    assert_eq!(threads::list_active(&conn).unwrap().len(), 15);

    // heavier mode: no further suspensions, and no resurrections either
    set_mode(&conn, "heavy").unwrap();
    let result = enforce_quota(&mut conn).unwrap();
    assert_eq!(result.quota, 100);
    assert!(result.suspended.is_empty());
}

#[test]
fn invalid_mode_is_rejected() {
    let conn = test_db();
    let err = set_mode(&conn, "ludicrous").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::InvalidMode(_))
    ));
}

#[test]
fn decayed_threads_suspend_at_threshold() {
    let mut conn = test_db();
    // weight 0.2, half-life 7 days, idle 14 days → 0.05, under the 0.1 threshold
    let thread = insert_thread(&mut conn, "old", &[], "c", test_embedding(0));
    conn.execute(
        "UPDATE threads SET weight = 0.2 WHERE id = ?1",
        rusqlite::params![thread.id],
    )
    .unwrap();
    backdate_thread(&conn, &thread.id, 14);

    let result = decay_sweep(&mut conn).unwrap();
    assert_eq!(result.suspended, vec![thread.id.clone()]);

    let reloaded = threads::get_thread(&conn, &thread.id).unwrap().unwrap();
    assert_eq!(reloaded.status, ThreadStatus::Suspended);
    assert!((reloaded.weight - 0.05).abs() < 1e-3);
}

#[test]
fn merge_conserves_message_counts() {
    let mut conn = test_db();
    let mut survivor = Thread::new("survivor", OriginType::Prompt);
    for i in 0..3 {
        survivor.append_message(Message::new(Role::User, format!("s{i}")));
    }
    threads::save_thread(&mut conn, &survivor).unwrap();

    let mut absorbed = Thread::new("absorbed", OriginType::Task);
    for i in 0..4 {
        absorbed.append_message(Message::new(Role::Assistant, format!("a{i}")));
    }
    absorbed.topics = vec!["extra".into()];
    threads::save_thread(&mut conn, &absorbed).unwrap();

    let result = merge_threads(&mut conn, &survivor.id, &absorbed.id).unwrap();
    assert_eq!(result.message_count, 7);

    let survivor = threads::get_thread(&conn, &survivor.id).unwrap().unwrap();
    assert_eq!(survivor.messages.len(), 7);
    assert!(survivor.topics.contains(&"extra".to_string()));

    let absorbed = threads::get_thread(&conn, &absorbed.id).unwrap().unwrap();
    assert_eq!(absorbed.status, ThreadStatus::Archived);
    assert_eq!(absorbed.messages.len(), 0);
    assert!(absorbed
        .tags
        .iter()
        .any(|t| t == &format!("merged_into:{}", survivor.id)));
}

#[test]
fn merge_respects_split_locks() {
    let mut conn = test_db();
    let survivor = insert_thread(&mut conn, "s", &[], "c", test_embedding(0));
    let mut locked = Thread::new("locked", OriginType::Prompt);
    locked.split_lock_mode = Some(SplitLockMode::AgentRelease);
    threads::save_thread(&mut conn, &locked).unwrap();

    assert!(merge_threads(&mut conn, &survivor.id, &locked.id).is_err());
    assert!(merge_threads(&mut conn, &locked.id, &survivor.id).is_err());
}

#[test]
fn split_partitions_the_messages_exactly() {
    let mut conn = test_db();
    let mut parent = Thread::new("parent", OriginType::Prompt);
    for i in 0..6 {
        parent.append_message(Message::new(Role::User, format!("m{i}")));
    }
    threads::save_thread(&mut conn, &parent).unwrap();
    let ids: Vec<String> = parent.messages.iter().map(|m| m.id.clone()).collect();

    let children = split_thread(
        &mut conn,
        &parent.id,
        &[
            SplitPartition {
                title: "first half".into(),
                message_ids: ids[0..2].to_vec(),
                topics: None,
            },
            SplitPartition {
                title: "second half".into(),
                message_ids: ids[2..5].to_vec(),
                topics: None,
            },
        ],
        SplitLockMode::AgentRelease,
    )
    .unwrap();

    // each child holds exactly its partition
    let child0 = threads::get_thread(&conn, &children[0].id).unwrap().unwrap();
    let child0_ids: Vec<&str> = child0.messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(child0_ids, ids[0..2].iter().map(String::as_str).collect::<Vec<_>>());
    let child1 = threads::get_thread(&conn, &children[1].id).unwrap().unwrap();
    assert_eq!(child1.messages.len(), 3);

    // the parent keeps exactly the unnamed remainder
    let parent = threads::get_thread(&conn, &parent.id).unwrap().unwrap();
    assert_eq!(parent.messages.len(), 1);
    assert_eq!(parent.messages[0].id, ids[5]);
    assert_eq!(parent.child_ids.len(), 2);

    // children inherit 0.8 × parent weight and are locked
    for child in [&child0, &child1] {
        assert!((child.weight - 0.8).abs() < 1e-9);
        assert!(child.split_locked());
        assert_eq!(child.origin, OriginType::Split);
    }
}

#[test]
fn split_of_missing_thread_is_rejected() {
    let mut conn = test_db();
    let err = split_thread(
        &mut conn,
        "ghost",
        &[SplitPartition {
            title: "x".into(),
            message_ids: vec![],
            topics: None,
        }],
        SplitLockMode::Force,
    )
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::ThreadNotFound(_))
    ));
}

#[test]
fn archival_preserves_provenance() {
    let mut conn = test_db();
    let mut thread = Thread::new("finished investigation", OriginType::Task);
    thread.summary = "Root cause was a stale cache entry.".into();
    thread.topics = vec!["cache".into()];
    thread.append_message(Message::new(Role::User, "payload to be dropped"));
    thread.suspend();
    threads::save_thread(&mut conn, &thread).unwrap();
    backdate_thread(&conn, &thread.id, 5); // well past 72h

    let result = archive_stale(&mut conn, 72).unwrap();
    assert_eq!(result.archived, vec![thread.id.clone()]);

    // live row and payload gone
    assert!(threads::get_thread(&conn, &thread.id).unwrap().is_none());
    let messages: i64 = conn
        .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
        .unwrap();
    assert_eq!(messages, 0);

    // the id still resolves to the condensed synthesis
    let (title, synthesis) = threads::get_archive(&conn, &thread.id).unwrap().unwrap();
    assert_eq!(title, "finished investigation");
    assert!(synthesis.contains("Root cause was a stale cache entry."));
    assert!(synthesis.contains("cache"));
}

#[test]
fn capture_sequence_respects_quota_end_to_end() {
    let mut config = BraidConfig::default();
    config.engine.default_mode = "light".into();
    let engine = MemoryEngine::in_memory(config).unwrap();

    for i in 0..25 {
        engine
            .capture(CaptureRequest::new(
                format!("topic{i} subject{i} wholly{i} distinct{i} matter{i}"),
                OriginType::Prompt,
            ))
            .unwrap();
        let stats = engine.stats().unwrap();
        assert!(stats.by_status["active"] <= 15);
    }
}
