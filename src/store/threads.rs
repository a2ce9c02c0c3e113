//! Thread persistence: save, load, delete, and status listings.
//!
//! Threads serialize to one `threads` row plus one `messages` row per
//! message. Saving upserts the thread row and every message it carries;
//! messages keep their own ids, so re-parenting on merge/split is an update,
//! not a copy.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::str::FromStr;
use tracing::warn;

use super::{bytes_to_embedding, embedding_to_bytes};
use crate::memory::types::{Message, OriginType, Role, SplitLockMode, Thread, ThreadStatus};

/// Persist a thread and all messages it carries. Upsert on id; the status
/// indexes stay consistent because status lives on the row itself.
pub fn save_thread(conn: &mut Connection, thread: &Thread) -> Result<()> {
    let tx = conn.transaction()?;

    let topics = serde_json::to_string(&thread.topics)?;
    let tags = serde_json::to_string(&thread.tags)?;
    let child_ids = serde_json::to_string(&thread.child_ids)?;
    let embedding = thread.embedding.as_ref().map(|e| embedding_to_bytes(e));

    // ON CONFLICT UPDATE rather than OR REPLACE: a row replacement would
    // cascade-delete the thread's messages.
    tx.execute(
        "INSERT INTO threads (id, title, summary, topics, tags, status, origin, parent_id, \
         child_ids, split_lock_mode, weight, last_active, activation_count, embedding, \
         created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16) \
         ON CONFLICT(id) DO UPDATE SET \
         title = ?2, summary = ?3, topics = ?4, tags = ?5, status = ?6, origin = ?7, \
         parent_id = ?8, child_ids = ?9, split_lock_mode = ?10, weight = ?11, \
         last_active = ?12, activation_count = ?13, embedding = ?14, updated_at = ?16",
        params![
            thread.id,
            thread.title,
            thread.summary,
            topics,
            tags,
            thread.status.as_str(),
            thread.origin.as_str(),
            thread.parent_id,
            child_ids,
            thread.split_lock_mode.map(|m| m.as_str()),
            thread.weight,
            thread.last_active.to_rfc3339(),
            thread.activation_count,
            embedding,
            thread.created_at.to_rfc3339(),
            thread.updated_at.to_rfc3339(),
        ],
    )?;

    for message in &thread.messages {
        let metadata = message
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        tx.execute(
            "INSERT INTO messages (id, thread_id, role, content, metadata, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(id) DO UPDATE SET thread_id = ?2",
            params![
                message.id,
                thread.id,
                message.role.as_str(),
                message.content,
                metadata,
                message.created_at.to_rfc3339(),
            ],
        )?;
    }

    tx.commit()?;
    Ok(())
}

/// Load a thread with its messages in timestamp order. Returns `None` for
/// unknown ids and for rows that fail to parse (corruption is a skip, not a
/// crash).
pub fn get_thread(conn: &Connection, id: &str) -> Result<Option<Thread>> {
    let row = conn
        .query_row("SELECT * FROM threads WHERE id = ?1", params![id], |row| {
            thread_from_row(row)
        })
        .optional()?;

    let mut thread = match row {
        Some(Ok(thread)) => thread,
        Some(Err(e)) => {
            warn!(thread = %id, error = %e, "skipping corrupt thread row");
            return Ok(None);
        }
        None => return Ok(None),
    };

    thread.messages = load_messages(conn, id)?;
    Ok(Some(thread))
}

/// Remove a thread row (messages cascade). Returns `true` if a row existed.
pub fn delete_thread(conn: &Connection, id: &str) -> Result<bool> {
    let rows = conn.execute("DELETE FROM threads WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}

/// All ACTIVE threads in creation order (stable for routing tie-breaks).
pub fn list_active(conn: &Connection) -> Result<Vec<Thread>> {
    list_by_status(conn, ThreadStatus::Active)
}

/// All SUSPENDED threads in creation order.
pub fn list_suspended(conn: &Connection) -> Result<Vec<Thread>> {
    list_by_status(conn, ThreadStatus::Suspended)
}

/// Every thread regardless of status.
pub fn list_all(conn: &Connection) -> Result<Vec<Thread>> {
    collect_threads(conn, "SELECT * FROM threads ORDER BY created_at", &[])
}

/// The ACTIVE thread touched most recently, if any.
pub fn find_most_recent_active(conn: &Connection) -> Result<Option<Thread>> {
    let mut threads = collect_threads(
        conn,
        "SELECT * FROM threads WHERE status = 'active' ORDER BY last_active DESC LIMIT 1",
        &[],
    )?;
    Ok(threads.pop())
}

/// Delete every message belonging to a thread (archival payload cleanup).
pub fn delete_messages(conn: &Connection, thread_id: &str) -> Result<usize> {
    let rows = conn.execute(
        "DELETE FROM messages WHERE thread_id = ?1",
        params![thread_id],
    )?;
    Ok(rows)
}

/// Write the condensed record for an archived thread.
pub fn save_archive(conn: &Connection, thread: &Thread, synthesis: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO archives (id, title, synthesis, topics, archived_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            thread.id,
            thread.title,
            synthesis,
            serde_json::to_string(&thread.topics)?,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Resolve an archived thread id to its synthesis, for provenance lookups.
pub fn get_archive(conn: &Connection, id: &str) -> Result<Option<(String, String)>> {
    let row = conn
        .query_row(
            "SELECT title, synthesis FROM archives WHERE id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(row)
}

// ── Row mapping ──────────────────────────────────────────────────────────────

fn list_by_status(conn: &Connection, status: ThreadStatus) -> Result<Vec<Thread>> {
    collect_threads(
        conn,
        "SELECT * FROM threads WHERE status = ?1 ORDER BY created_at",
        &[status.as_str()],
    )
}

fn collect_threads(conn: &Connection, sql: &str, args: &[&str]) -> Result<Vec<Thread>> {
    let mut stmt = conn.prepare(sql)?;
    let rows: Vec<Result<Thread>> = stmt
        .query_map(rusqlite::params_from_iter(args), thread_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut threads = Vec::new();
    for row in rows {
        match row {
            Ok(thread) => threads.push(thread),
            Err(e) => warn!(error = %e, "skipping corrupt thread row"),
        }
    }
    for thread in &mut threads {
        thread.messages = load_messages(conn, &thread.id)?;
    }
    Ok(threads)
}

/// Map a `threads` row. Parse failures surface as the inner `Err` so list
/// readers can skip the row instead of aborting the query.
fn thread_from_row(row: &Row) -> rusqlite::Result<Result<Thread>> {
    let id: String = row.get("id")?;
    let title: String = row.get("title")?;
    let summary: String = row.get("summary")?;
    let topics: String = row.get("topics")?;
    let tags: String = row.get("tags")?;
    let status: String = row.get("status")?;
    let origin: String = row.get("origin")?;
    let parent_id: Option<String> = row.get("parent_id")?;
    let child_ids: String = row.get("child_ids")?;
    let split_lock_mode: Option<String> = row.get("split_lock_mode")?;
    let weight: f64 = row.get("weight")?;
    let last_active: String = row.get("last_active")?;
    let activation_count: u32 = row.get("activation_count")?;
    let embedding: Option<Vec<u8>> = row.get("embedding")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(build_thread(
        id,
        title,
        summary,
        topics,
        tags,
        status,
        origin,
        parent_id,
        child_ids,
        split_lock_mode,
        weight,
        last_active,
        activation_count,
        embedding,
        created_at,
        updated_at,
    ))
}

#[allow(clippy::too_many_arguments)]
fn build_thread(
    id: String,
    title: String,
    summary: String,
    topics: String,
    tags: String,
    status: String,
    origin: String,
    parent_id: Option<String>,
    child_ids: String,
    split_lock_mode: Option<String>,
    weight: f64,
    last_active: String,
    activation_count: u32,
    embedding: Option<Vec<u8>>,
    created_at: String,
    updated_at: String,
) -> Result<Thread> {
    let status = ThreadStatus::from_str(&status).map_err(anyhow::Error::msg)?;
    let origin = OriginType::from_str(&origin).map_err(anyhow::Error::msg)?;
    let split_lock_mode = split_lock_mode
        .as_deref()
        .map(SplitLockMode::from_str)
        .transpose()
        .map_err(anyhow::Error::msg)?;

    Ok(Thread {
        id,
        title,
        summary,
        topics: serde_json::from_str(&topics).context("topics JSON")?,
        tags: serde_json::from_str(&tags).context("tags JSON")?,
        status,
        origin,
        parent_id,
        child_ids: serde_json::from_str(&child_ids).context("child_ids JSON")?,
        split_lock_mode,
        weight,
        last_active: parse_timestamp(&last_active)?,
        activation_count,
        embedding: embedding.map(|b| bytes_to_embedding(&b)),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        messages: Vec::new(),
    })
}

fn load_messages(conn: &Connection, thread_id: &str) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(
        "SELECT id, role, content, metadata, created_at FROM messages \
         WHERE thread_id = ?1 ORDER BY created_at, id",
    )?;
    let rows: Vec<(String, String, String, Option<String>, String)> = stmt
        .query_map(params![thread_id], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut messages = Vec::new();
    for (id, role, content, metadata, created_at) in rows {
        let role = match Role::from_str(&role) {
            Ok(role) => role,
            Err(e) => {
                warn!(message = %id, error = %e, "skipping corrupt message row");
                continue;
            }
        };
        messages.push(Message {
            id,
            role,
            content,
            metadata: metadata.as_deref().map(serde_json::from_str).transpose()?,
            created_at: parse_timestamp(&created_at)?,
        });
    }
    Ok(messages)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("bad timestamp: {s}"))?
        .with_timezone(&Utc))
}
