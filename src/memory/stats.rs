use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

/// Response from the stats surface.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_threads: u64,
    pub by_status: HashMap<String, u64>,
    pub archived_records: u64,
    pub total_messages: u64,
    pub avg_active_weight: f64,
    pub total_bridges: u64,
    pub bridges_by_status: HashMap<String, u64>,
    pub propagated_bridges: u64,
    pub db_size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_thread: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_thread: Option<String>,
}

/// Compute store statistics.
///
/// `db_path` is used for file size calculation; pass None for in-memory
/// databases.
pub fn engine_stats(conn: &Connection, db_path: Option<&Path>) -> Result<StatsResponse> {
    let total_threads: i64 =
        conn.query_row("SELECT COUNT(*) FROM threads", [], |row| row.get(0))?;
    let by_status = count_grouped(conn, "SELECT status, COUNT(*) FROM threads GROUP BY status",
        &["active", "suspended", "archived"])?;
    let archived_records: i64 =
        conn.query_row("SELECT COUNT(*) FROM archives", [], |row| row.get(0))?;
    let total_messages: i64 =
        conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
    let avg_active_weight: f64 = conn.query_row(
        "SELECT COALESCE(AVG(weight), 0.0) FROM threads WHERE status = 'active'",
        [],
        |row| row.get(0),
    )?;

    let total_bridges: i64 =
        conn.query_row("SELECT COUNT(*) FROM bridges", [], |row| row.get(0))?;
    let bridges_by_status = count_grouped(
        conn,
        "SELECT status, COUNT(*) FROM bridges GROUP BY status",
        &["active", "weak", "invalid"],
    )?;
    let propagated_bridges: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bridges WHERE propagation_depth > 0",
        [],
        |row| row.get(0),
    )?;

    let (oldest, newest): (Option<String>, Option<String>) = conn.query_row(
        "SELECT MIN(created_at), MAX(created_at) FROM threads",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let db_size_bytes = db_path
        .and_then(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .unwrap_or(0);

    Ok(StatsResponse {
        total_threads: total_threads as u64,
        by_status,
        archived_records: archived_records as u64,
        total_messages: total_messages as u64,
        avg_active_weight,
        total_bridges: total_bridges as u64,
        bridges_by_status,
        propagated_bridges: propagated_bridges as u64,
        db_size_bytes,
        oldest_thread: oldest,
        newest_thread: newest,
    })
}

/// Run a `GROUP BY` count query, seeding every known key with zero.
fn count_grouped(conn: &Connection, sql: &str, keys: &[&str]) -> Result<HashMap<String, u64>> {
    let mut map = HashMap::new();
    for key in keys {
        map.insert(key.to_string(), 0);
    }

    let mut stmt = conn.prepare(sql)?;
    let rows: Vec<(String, i64)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    for (key, count) in rows {
        map.insert(key, count as u64);
    }
    Ok(map)
}
