//! Lifecycle orchestration: decision execution, quota, decay sweeps,
//! merge/split, and archival.
//!
//! Everything here enforces the global invariants over the thread
//! population: ACTIVE count stays within the mode quota after every write,
//! decayed threads suspend instead of lingering, threads are archived (never
//! destroyed), and split locks block merges until released.

use anyhow::Result;
use chrono::{Duration, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::migrations;
use crate::error::EngineError;
use crate::extract::Extraction;
use crate::memory::router::{Decision, RouteAction};
use crate::memory::types::{Message, OriginType, SplitLockMode, Thread};
use crate::store::{bridges, threads};

// ── Quota ────────────────────────────────────────────────────────────────────

/// Map a quota mode to its active-thread limit.
pub fn quota_for_mode(mode: &str) -> Result<usize, EngineError> {
    match mode {
        "light" => Ok(15),
        "normal" => Ok(50),
        "heavy" => Ok(100),
        "max" => Ok(200),
        other => Err(EngineError::InvalidMode(other.to_string())),
    }
}

/// Read the current quota. The mode is re-read from the database on every
/// call so a mode change takes effect without restart.
pub fn current_quota(conn: &Connection) -> Result<usize> {
    let mode = migrations::get_mode(conn)?.unwrap_or_else(|| "normal".to_string());
    Ok(quota_for_mode(&mode)?)
}

/// Validate and persist a new quota mode.
pub fn set_mode(conn: &Connection, mode: &str) -> Result<usize> {
    let quota = quota_for_mode(mode)?;
    migrations::set_mode(conn, mode)?;
    info!(mode, quota, "quota mode changed");
    Ok(quota)
}

#[derive(Debug, Serialize)]
pub struct QuotaResult {
    pub quota: usize,
    pub suspended: Vec<String>,
}

/// Suspend the lowest-weight ACTIVE threads until the population fits the
/// quota. Split-locked threads are never auto-suspended.
pub fn enforce_quota(conn: &mut Connection) -> Result<QuotaResult> {
    let quota = current_quota(conn)?;
    let mut active = threads::list_active(conn)?;

    let mut suspended = Vec::new();
    if active.len() > quota {
        // ascending by weight: the least relevant threads go first
        active.sort_by(|a, b| a.weight.partial_cmp(&b.weight).unwrap_or(std::cmp::Ordering::Equal));
        let excess = active.len() - quota;
        for thread in active.iter_mut().filter(|t| !t.split_locked()).take(excess) {
            thread.suspend();
            threads::save_thread(conn, thread)?;
            info!(thread = %thread.id, reason = "quota_exceeded", "thread suspended");
            suspended.push(thread.id.clone());
        }
    }

    Ok(QuotaResult { quota, suspended })
}

// ── Decision execution ───────────────────────────────────────────────────────

/// Outcome of executing a routing decision.
#[derive(Debug, Serialize)]
pub struct ExecuteResult {
    pub thread_id: String,
    pub action: String,
    pub confidence: f64,
    /// Set when the decision's target vanished and a new thread was created.
    pub fell_back: bool,
}

/// Execute a routing decision, returning the affected thread. A decision
/// whose target thread no longer exists falls back to a fresh thread rather
/// than failing: callers always get a valid thread back.
pub fn execute_decision(
    conn: &mut Connection,
    decision: &Decision,
    extraction: &Extraction,
    message: Message,
    origin: OriginType,
) -> Result<(Thread, ExecuteResult)> {
    match &decision.action {
        RouteAction::NewThread => {
            let thread = create_thread(conn, extraction, message, origin, None)?;
            Ok(result(thread, "new_thread", decision.confidence, false))
        }
        RouteAction::Continue { thread_id } => {
            match threads::get_thread(conn, thread_id)? {
                Some(mut thread) => {
                    thread.append_message(message);
                    thread.merge_topics(&extraction.subjects);
                    thread.merge_summary(&extraction.summary);
                    thread.record_use(Utc::now());
                    threads::save_thread(conn, &thread)?;
                    Ok(result(thread, "continue", decision.confidence, false))
                }
                None => fallback(conn, extraction, message, origin, thread_id),
            }
        }
        RouteAction::Fork { parent_id } => match threads::get_thread(conn, parent_id)? {
            Some(mut parent) => {
                let child = create_thread(
                    conn,
                    extraction,
                    message,
                    origin,
                    Some(parent.clone()),
                )?;
                parent.child_ids.push(child.id.clone());
                threads::save_thread(conn, &parent)?;
                Ok(result(child, "fork", decision.confidence, false))
            }
            None => fallback(conn, extraction, message, origin, parent_id),
        },
        RouteAction::Reactivate { thread_id } => {
            match threads::get_thread(conn, thread_id)? {
                Some(mut thread) => {
                    thread.reactivate();
                    thread.append_message(message);
                    thread.merge_topics(&extraction.subjects);
                    thread.merge_summary(&extraction.summary);
                    threads::save_thread(conn, &thread)?;
                    info!(thread = %thread.id, "thread reactivated");
                    Ok(result(thread, "reactivate", decision.confidence, false))
                }
                None => fallback(conn, extraction, message, origin, thread_id),
            }
        }
    }
}

fn result(
    thread: Thread,
    action: &str,
    confidence: f64,
    fell_back: bool,
) -> (Thread, ExecuteResult) {
    let execute = ExecuteResult {
        thread_id: thread.id.clone(),
        action: action.to_string(),
        confidence,
        fell_back,
    };
    (thread, execute)
}

fn fallback(
    conn: &mut Connection,
    extraction: &Extraction,
    message: Message,
    origin: OriginType,
    missing_id: &str,
) -> Result<(Thread, ExecuteResult)> {
    warn!(thread = %missing_id, "decision target missing, falling back to new thread");
    let thread = create_thread(conn, extraction, message, origin, None)?;
    Ok(result(thread, "new_thread", 0.5, true))
}

/// Create a thread from an extraction. Forks inherit the parent's current
/// weight; fresh threads start at 1.0.
fn create_thread(
    conn: &mut Connection,
    extraction: &Extraction,
    message: Message,
    origin: OriginType,
    parent: Option<Thread>,
) -> Result<Thread> {
    let title = if extraction.title.is_empty() {
        "Untitled".to_string()
    } else {
        extraction.title.clone()
    };
    let mut thread = Thread::new(title, origin);
    thread.merge_topics(&extraction.subjects);
    thread.merge_topics(&extraction.key_concepts);
    thread.merge_summary(&extraction.summary);
    if let Some(parent) = parent {
        thread.parent_id = Some(parent.id.clone());
        thread.weight = parent.weight;
    }
    thread.append_message(message);
    threads::save_thread(conn, &thread)?;
    Ok(thread)
}

// ── Decay sweep ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SweepResult {
    pub decayed: usize,
    pub suspended: Vec<String>,
    pub quota: QuotaResult,
}

/// Decay every ACTIVE thread, suspending the ones that fall below the
/// threshold, then re-apply quota enforcement (decay may not have freed
/// enough slots, and the mode may have changed since the last pass).
pub fn decay_sweep(conn: &mut Connection) -> Result<SweepResult> {
    let now = Utc::now();
    let mut decayed = 0;
    let mut suspended = Vec::new();

    for mut thread in threads::list_active(conn)? {
        thread.decay(now);
        decayed += 1;
        if thread.should_suspend() && !thread.split_locked() {
            thread.suspend();
            info!(thread = %thread.id, reason = "auto_decay", "thread suspended");
            suspended.push(thread.id.clone());
        }
        threads::save_thread(conn, &thread)?;
    }

    let quota = enforce_quota(conn)?;
    Ok(SweepResult {
        decayed,
        suspended,
        quota,
    })
}

// ── Merge ────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct MergeResult {
    pub survivor_id: String,
    pub absorbed_id: String,
    pub message_count: usize,
}

/// Merge `absorbed` into `survivor`. Message counts are conserved: every
/// message of the absorbed thread is re-parented, none copied. The absorbed
/// thread is archived with a `merged_into:` tag, never deleted.
pub fn merge_threads(
    conn: &mut Connection,
    survivor_id: &str,
    absorbed_id: &str,
) -> Result<MergeResult> {
    let mut survivor = threads::get_thread(conn, survivor_id)?
        .ok_or_else(|| EngineError::ThreadNotFound(survivor_id.to_string()))?;
    let mut absorbed = threads::get_thread(conn, absorbed_id)?
        .ok_or_else(|| EngineError::ThreadNotFound(absorbed_id.to_string()))?;

    if survivor.split_locked() {
        return Err(EngineError::SplitLocked(survivor.id).into());
    }
    if absorbed.split_locked() {
        return Err(EngineError::SplitLocked(absorbed.id).into());
    }

    // Move messages across, keeping the combined list in timestamp order.
    survivor.messages.append(&mut absorbed.messages);
    survivor
        .messages
        .sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    let absorbed_topics = absorbed.topics.clone();
    survivor.merge_topics(&absorbed_topics);
    let absorbed_tags = absorbed.tags.clone();
    survivor.merge_tags(&absorbed_tags);
    if !absorbed.summary.is_empty() {
        survivor.summary = if survivor.summary.is_empty() {
            absorbed.summary.clone()
        } else {
            format!("{}\n{}", survivor.summary, absorbed.summary)
        };
    }
    survivor.weight = (survivor.weight.max(absorbed.weight) + 0.1).min(1.0);
    survivor.embedding = None;
    let message_count = survivor.messages.len();
    // Saving the survivor re-parents the absorbed thread's message rows.
    threads::save_thread(conn, &survivor)?;

    absorbed.archive();
    absorbed.tags.push(format!("merged_into:{}", survivor.id));
    absorbed.embedding = None;
    threads::save_thread(conn, &absorbed)?;

    info!(survivor = %survivor.id, absorbed = %absorbed.id, "threads merged");
    Ok(MergeResult {
        survivor_id: survivor.id,
        absorbed_id: absorbed.id,
        message_count,
    })
}

// ── Split ────────────────────────────────────────────────────────────────────

/// One requested slice of a split.
#[derive(Debug, Clone, Deserialize)]
pub struct SplitPartition {
    pub title: String,
    pub message_ids: Vec<String>,
    pub topics: Option<Vec<String>>,
}

/// Split named messages out of a thread into new split-locked children.
///
/// Messages are moved, never copied; messages named by no partition stay in
/// the original. Rejects unknown and doubly-assigned message ids with no
/// partial mutation.
pub fn split_thread(
    conn: &mut Connection,
    thread_id: &str,
    partitions: &[SplitPartition],
    lock_mode: SplitLockMode,
) -> Result<Vec<Thread>> {
    let mut parent = threads::get_thread(conn, thread_id)?
        .ok_or_else(|| EngineError::ThreadNotFound(thread_id.to_string()))?;

    // Validate before mutating anything
    let owned: Vec<&str> = parent.messages.iter().map(|m| m.id.as_str()).collect();
    let mut seen: Vec<&str> = Vec::new();
    for partition in partitions {
        let unknown: Vec<String> = partition
            .message_ids
            .iter()
            .filter(|id| !owned.contains(&id.as_str()))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(EngineError::UnknownMessages {
                partition: partition.title.clone(),
                ids: unknown,
            }
            .into());
        }
        for id in &partition.message_ids {
            if seen.contains(&id.as_str()) {
                return Err(EngineError::DuplicatePartitionMessage(id.clone()).into());
            }
            seen.push(id);
        }
    }

    let mut children = Vec::new();
    for partition in partitions {
        let mut child = Thread::new(&partition.title, OriginType::Split);
        child.parent_id = Some(parent.id.clone());
        child.weight = (parent.weight * 0.8).clamp(0.0, 1.0);
        child.split_lock_mode = Some(lock_mode);
        if let Some(topics) = &partition.topics {
            child.merge_topics(topics);
        }
        // Move the named messages into the child
        let (moved, kept): (Vec<Message>, Vec<Message>) = parent
            .messages
            .drain(..)
            .partition(|m| partition.message_ids.contains(&m.id));
        parent.messages = kept;
        child.messages = moved;

        threads::save_thread(conn, &child)?;
        parent.child_ids.push(child.id.clone());
        info!(parent = %parent.id, child = %child.id, "thread split");
        children.push(child);
    }

    parent.embedding = None;
    threads::save_thread(conn, &parent)?;
    Ok(children)
}

/// Explicitly release a split lock (any mode). Returns `false` for threads
/// that were not locked.
pub fn release_split_lock(conn: &mut Connection, thread_id: &str) -> Result<bool> {
    let mut thread = threads::get_thread(conn, thread_id)?
        .ok_or_else(|| EngineError::ThreadNotFound(thread_id.to_string()))?;
    if thread.split_lock_mode.is_none() {
        return Ok(false);
    }
    thread.split_lock_mode = None;
    threads::save_thread(conn, &thread)?;
    Ok(true)
}

/// Release every `Compaction`-mode split lock. Runs at the start of the
/// archival pass — the compaction event those locks wait for.
pub fn release_compaction_locks(conn: &mut Connection) -> Result<usize> {
    let mut released = 0;
    for mut thread in threads::list_all(conn)? {
        if thread.split_lock_mode == Some(SplitLockMode::Compaction) {
            thread.split_lock_mode = None;
            threads::save_thread(conn, &thread)?;
            released += 1;
        }
    }
    Ok(released)
}

// ── Archival ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ArchiveResult {
    pub archived: Vec<String>,
    pub bridges_removed: usize,
}

/// Archive threads suspended longer than the age threshold: write the
/// condensed synthesis, delete the message payload, remove the live row from
/// primary storage, and drop bridges touching them. The id stays resolvable
/// through the archive index for provenance.
pub fn archive_stale(conn: &mut Connection, max_suspended_hours: i64) -> Result<ArchiveResult> {
    let cutoff = Utc::now() - Duration::hours(max_suspended_hours);
    let mut archived = Vec::new();
    let mut bridges_removed = 0;

    for thread in threads::list_suspended(conn)? {
        // updated_at is touched by suspend(), so it marks suspension time
        if thread.updated_at >= cutoff {
            continue;
        }
        let synthesis = synthesize(&thread);
        threads::save_archive(conn, &thread, &synthesis)?;
        threads::delete_messages(conn, &thread.id)?;
        bridges_removed += bridges::delete_for_thread(conn, &thread.id)?;
        threads::delete_thread(conn, &thread.id)?;
        info!(thread = %thread.id, "thread archived");
        archived.push(thread.id);
    }

    Ok(ArchiveResult {
        archived,
        bridges_removed,
    })
}

/// Condense a thread to the text its archive record keeps. Message payloads
/// are dropped; this is all that survives.
fn synthesize(thread: &Thread) -> String {
    let mut parts = vec![thread.title.clone()];
    if !thread.summary.is_empty() {
        parts.push(thread.summary.clone());
    }
    if !thread.topics.is_empty() {
        parts.push(format!("Topics: {}", thread.topics.join(", ")));
    }
    parts.push(format!("{} messages", thread.messages.len()));
    parts.join("\n")
}
