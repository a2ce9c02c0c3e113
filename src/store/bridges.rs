//! Bridge persistence and pair-level deduplication.
//!
//! The dedup rule lives here, at the save layer: any attempt to persist a
//! new bridge between an already-connected pair of threads (in either
//! direction) collapses into a use-boost on the existing edge. Callers that
//! bypass the propose path still cannot create duplicates.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::str::FromStr;
use tracing::warn;

use crate::memory::types::{Bridge, BridgeStatus, RelationType};

/// Result returned from a save operation.
#[derive(Debug, Serialize)]
pub struct SaveBridgeResult {
    /// Id of the stored (or strengthened) bridge.
    pub id: String,
    /// `true` if the pair was already connected and the save became a use.
    pub deduplicated: bool,
}

/// Persist a bridge, collapsing duplicates into a use event.
pub fn save_bridge(conn: &mut Connection, bridge: &Bridge) -> Result<SaveBridgeResult> {
    let tx = conn.transaction()?;

    if let Some(mut existing) = find_between_tx(&tx, &bridge.source_id, &bridge.target_id)? {
        existing.record_use(Utc::now());
        update_bridge_row(&tx, &existing)?;
        tx.commit()?;
        return Ok(SaveBridgeResult {
            id: existing.id,
            deduplicated: true,
        });
    }

    insert_bridge_row(&tx, bridge)?;
    tx.commit()?;

    Ok(SaveBridgeResult {
        id: bridge.id.clone(),
        deduplicated: false,
    })
}

/// Persist in-place changes (decay, use, invalidation) to an existing bridge.
pub fn update_bridge(conn: &Connection, bridge: &Bridge) -> Result<()> {
    update_bridge_row(conn, bridge)
}

pub fn get_bridge(conn: &Connection, id: &str) -> Result<Option<Bridge>> {
    let row = conn
        .query_row("SELECT * FROM bridges WHERE id = ?1", params![id], |row| {
            bridge_from_row(row)
        })
        .optional()?;

    match row {
        Some(Ok(bridge)) => Ok(Some(bridge)),
        Some(Err(e)) => {
            warn!(bridge = %id, error = %e, "skipping corrupt bridge row");
            Ok(None)
        }
        None => Ok(None),
    }
}

/// Returns `true` if a row existed.
pub fn delete_bridge(conn: &Connection, id: &str) -> Result<bool> {
    let rows = conn.execute("DELETE FROM bridges WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}

pub fn list_by_source(conn: &Connection, source_id: &str) -> Result<Vec<Bridge>> {
    collect_bridges(
        conn,
        "SELECT * FROM bridges WHERE source_id = ?1 ORDER BY created_at",
        &[source_id],
    )
}

pub fn list_by_target(conn: &Connection, target_id: &str) -> Result<Vec<Bridge>> {
    collect_bridges(
        conn,
        "SELECT * FROM bridges WHERE target_id = ?1 ORDER BY created_at",
        &[target_id],
    )
}

/// Every bridge touching a thread from either end.
pub fn list_for_thread(conn: &Connection, thread_id: &str) -> Result<Vec<Bridge>> {
    collect_bridges(
        conn,
        "SELECT * FROM bridges WHERE source_id = ?1 OR target_id = ?1 ORDER BY created_at",
        &[thread_id],
    )
}

/// The bridge connecting the unordered pair `{a, b}`, if one exists.
/// Checks both directions — Sibling and Contradicts are logically
/// bidirectional, and the uniqueness invariant is per unordered pair.
pub fn find_between(conn: &Connection, a: &str, b: &str) -> Result<Option<Bridge>> {
    find_between_tx(conn, a, b)
}

pub fn list_all(conn: &Connection) -> Result<Vec<Bridge>> {
    collect_bridges(conn, "SELECT * FROM bridges ORDER BY created_at", &[])
}

/// Delete every bridge touching a thread (endpoint archived or removed).
pub fn delete_for_thread(conn: &Connection, thread_id: &str) -> Result<usize> {
    let rows = conn.execute(
        "DELETE FROM bridges WHERE source_id = ?1 OR target_id = ?1",
        params![thread_id],
    )?;
    Ok(rows)
}

// ── Row plumbing ─────────────────────────────────────────────────────────────

fn find_between_tx(conn: &Connection, a: &str, b: &str) -> Result<Option<Bridge>> {
    let row = conn
        .query_row(
            "SELECT * FROM bridges WHERE (source_id = ?1 AND target_id = ?2) \
             OR (source_id = ?2 AND target_id = ?1) LIMIT 1",
            params![a, b],
            |row| bridge_from_row(row),
        )
        .optional()?;

    match row {
        Some(Ok(bridge)) => Ok(Some(bridge)),
        Some(Err(e)) => {
            warn!(error = %e, "skipping corrupt bridge row");
            Ok(None)
        }
        None => Ok(None),
    }
}

fn insert_bridge_row(conn: &Connection, bridge: &Bridge) -> Result<()> {
    conn.execute(
        "INSERT INTO bridges (id, source_id, target_id, relation, reason, shared_concepts, \
         confidence, weight, status, propagated_from, propagation_depth, use_count, \
         last_used, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            bridge.id,
            bridge.source_id,
            bridge.target_id,
            bridge.relation.as_str(),
            bridge.reason,
            serde_json::to_string(&bridge.shared_concepts)?,
            bridge.confidence,
            bridge.weight,
            bridge.status.as_str(),
            bridge.propagated_from,
            bridge.propagation_depth,
            bridge.use_count,
            bridge.last_used.map(|t| t.to_rfc3339()),
            bridge.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn update_bridge_row(conn: &Connection, bridge: &Bridge) -> Result<()> {
    conn.execute(
        "UPDATE bridges SET weight = ?1, status = ?2, use_count = ?3, last_used = ?4 \
         WHERE id = ?5",
        params![
            bridge.weight,
            bridge.status.as_str(),
            bridge.use_count,
            bridge.last_used.map(|t| t.to_rfc3339()),
            bridge.id,
        ],
    )?;
    Ok(())
}

fn collect_bridges(conn: &Connection, sql: &str, args: &[&str]) -> Result<Vec<Bridge>> {
    let mut stmt = conn.prepare(sql)?;
    let rows: Vec<Result<Bridge>> = stmt
        .query_map(rusqlite::params_from_iter(args), bridge_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut bridges = Vec::new();
    for row in rows {
        match row {
            Ok(bridge) => bridges.push(bridge),
            Err(e) => warn!(error = %e, "skipping corrupt bridge row"),
        }
    }
    Ok(bridges)
}

fn bridge_from_row(row: &Row) -> rusqlite::Result<Result<Bridge>> {
    let id: String = row.get("id")?;
    let source_id: String = row.get("source_id")?;
    let target_id: String = row.get("target_id")?;
    let relation: String = row.get("relation")?;
    let reason: String = row.get("reason")?;
    let shared_concepts: String = row.get("shared_concepts")?;
    let confidence: f64 = row.get("confidence")?;
    let weight: f64 = row.get("weight")?;
    let status: String = row.get("status")?;
    let propagated_from: Option<String> = row.get("propagated_from")?;
    let propagation_depth: u32 = row.get("propagation_depth")?;
    let use_count: u32 = row.get("use_count")?;
    let last_used: Option<String> = row.get("last_used")?;
    let created_at: String = row.get("created_at")?;

    let parsed: Result<Bridge> = (|| {
        Ok(Bridge {
            id,
            source_id,
            target_id,
            relation: RelationType::from_str(&relation).map_err(anyhow::Error::msg)?,
            reason,
            shared_concepts: serde_json::from_str(&shared_concepts)
                .context("shared_concepts JSON")?,
            confidence,
            weight,
            status: BridgeStatus::from_str(&status).map_err(anyhow::Error::msg)?,
            propagated_from,
            propagation_depth,
            use_count,
            last_used: last_used.as_deref().map(parse_timestamp).transpose()?,
            created_at: parse_timestamp(&created_at)?,
        })
    })();
    Ok(parsed)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("bad timestamp: {s}"))?
        .with_timezone(&Utc))
}
