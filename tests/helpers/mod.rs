#![allow(dead_code)]

use braid::db;
use braid::memory::types::{Message, OriginType, Role, Thread};
use braid::store::threads;
use rusqlite::Connection;

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    db::open_memory_database().unwrap()
}

/// Generate a deterministic embedding with a spike at position `seed`.
/// Each seed produces a distinct, orthogonal vector; identical seeds match
/// with cosine similarity 1.0.
pub fn test_embedding(seed: u8) -> Vec<f32> {
    let mut v = vec![0.0f32; 384];
    v[seed as usize % 384] = 1.0;
    v
}

/// Insert an active thread with the given topics and a single message.
/// The cached embedding is preset so routing and gossip see it immediately.
pub fn insert_thread(
    conn: &mut Connection,
    title: &str,
    topics: &[&str],
    content: &str,
    embedding: Vec<f32>,
) -> Thread {
    let mut thread = Thread::new(title, OriginType::Prompt);
    thread.topics = topics.iter().map(|s| s.to_string()).collect();
    thread.append_message(Message::new(Role::User, content));
    thread.embedding = Some(embedding);
    threads::save_thread(conn, &thread).unwrap();
    thread
}

/// Backdate a thread's activity timestamps to simulate aging.
pub fn backdate_thread(conn: &Connection, id: &str, days_ago: i64) {
    let old_date = (chrono::Utc::now() - chrono::Duration::days(days_ago)).to_rfc3339();
    conn.execute(
        "UPDATE threads SET last_active = ?1, updated_at = ?1 WHERE id = ?2",
        rusqlite::params![old_date, id],
    )
    .unwrap();
}
