//! The memory engine: one owner of the store, one capture pipeline.
//!
//! [`MemoryEngine`] wires the store, the providers, and the lifecycle
//! machinery together behind a single connection mutex, so every
//! read-modify-write on a thread or bridge is serialized. Requests run the
//! capture pipeline (clean → extract → decide → execute → gossip → quota);
//! the periodic sweep runs as a background tokio task that a watch-channel
//! shutdown stops promptly.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

use crate::config::BraidConfig;
use crate::content;
use crate::db;
use crate::embedding::{self, EmbeddingProvider};
use crate::extract::{Extraction, ExtractionProvider, HeuristicExtractor};
use crate::memory::gossip::{self, GossipResult};
use crate::memory::lifecycle::{self, ArchiveResult, MergeResult, SplitPartition, SweepResult};
use crate::memory::router;
use crate::memory::types::{Message, OriginType, Role, SplitLockMode, Thread};

/// A capture request. `chain_to_pending` is set by the external coherence
/// check when this capture belongs to the thread of the previous one.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub content: String,
    pub role: Role,
    pub origin: OriginType,
    pub file_path: Option<String>,
    pub chain_to_pending: bool,
}

impl CaptureRequest {
    pub fn new(content: impl Into<String>, origin: OriginType) -> Self {
        Self {
            content: content.into(),
            role: Role::User,
            origin,
            file_path: None,
            chain_to_pending: false,
        }
    }
}

/// What a capture did.
#[derive(Debug, Serialize)]
pub struct CaptureResult {
    pub thread_id: String,
    pub thread_title: String,
    pub action: String,
    pub confidence: f64,
    pub fell_back: bool,
    pub gossip: GossipResult,
}

/// Report from one sweep pass.
#[derive(Debug, Serialize)]
pub struct SweepReport {
    pub threads: SweepResult,
    pub locks_released: usize,
    pub archive: ArchiveResult,
    pub bridges_pruned: usize,
}

/// Cross-request context chaining related captures. Discarded after its TTL.
struct PendingCapture {
    thread_id: String,
    created_at: DateTime<Utc>,
}

pub struct MemoryEngine {
    conn: Arc<Mutex<Connection>>,
    embedder: Arc<dyn EmbeddingProvider>,
    extractor: Arc<dyn ExtractionProvider>,
    config: BraidConfig,
    pending: Mutex<Option<PendingCapture>>,
}

impl MemoryEngine {
    /// Open the configured database with the built-in providers.
    pub fn new(config: BraidConfig) -> Result<Self> {
        let conn = db::open_database(config.resolved_db_path())?;
        Ok(Self::with_connection(conn, config))
    }

    /// In-memory engine for tests and dry runs.
    pub fn in_memory(config: BraidConfig) -> Result<Self> {
        let conn = db::open_memory_database()?;
        Ok(Self::with_connection(conn, config))
    }

    fn with_connection(conn: Connection, config: BraidConfig) -> Self {
        // apply the configured mode at startup; runtime set_mode calls
        // take precedence until the next restart
        match lifecycle::set_mode(&conn, &config.engine.default_mode) {
            Ok(quota) => info!(mode = %config.engine.default_mode, quota, "quota mode applied"),
            Err(e) => warn!(error = %e, "invalid default_mode in config, keeping stored mode"),
        }
        Self {
            conn: Arc::new(Mutex::new(conn)),
            embedder: Arc::from(embedding::default_provider()),
            extractor: Arc::new(HeuristicExtractor),
            config,
            pending: Mutex::new(None),
        }
    }

    /// Swap in external providers (LLM extraction, model-backed embeddings).
    pub fn with_providers(
        mut self,
        embedder: Arc<dyn EmbeddingProvider>,
        extractor: Arc<dyn ExtractionProvider>,
    ) -> Self {
        self.embedder = embedder;
        self.extractor = extractor;
        self
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("connection mutex poisoned"))
    }

    /// Run the full capture pipeline. Callers always get a valid thread
    /// back: provider failures degrade to the heuristic extractor, and a
    /// vanished decision target falls back to a new thread.
    pub fn capture(&self, request: CaptureRequest) -> Result<CaptureResult> {
        let extraction = self.extract(&request);

        let parent_hint = if request.chain_to_pending {
            self.take_pending()
        } else {
            None
        };

        let mut conn = self.lock_conn()?;

        let decision = router::decide(
            &mut conn,
            self.embedder.as_ref(),
            &request.content,
            &extraction,
            parent_hint.as_deref(),
        )?;
        info!(action = ?decision.action, confidence = decision.confidence, reason = %decision.reason, "routing decision");

        let mut message = Message::new(request.role, request.content.clone());
        if let Some(path) = &request.file_path {
            message.metadata = Some(serde_json::json!({ "file_path": path }));
        }

        let (thread, executed) = lifecycle::execute_decision(
            &mut conn,
            &decision,
            &extraction,
            message,
            request.origin,
        )?;

        let gossip_result = gossip::on_thread_modified(
            &mut conn,
            self.embedder.as_ref(),
            &self.config.gossip,
            &thread.id,
        )?;

        lifecycle::enforce_quota(&mut conn)?;
        drop(conn);

        self.set_pending(&thread.id);

        Ok(CaptureResult {
            thread_id: thread.id,
            thread_title: thread.title,
            action: executed.action,
            confidence: executed.confidence,
            fell_back: executed.fell_back,
            gossip: gossip_result,
        })
    }

    /// Capture content that arrived as a nested JSON tool result.
    pub fn capture_json(
        &self,
        value: &serde_json::Value,
        origin: OriginType,
    ) -> Result<CaptureResult> {
        let text = content::extract_text(value);
        self.capture(CaptureRequest::new(text, origin))
    }

    /// One full maintenance pass: thread decay (with quota), compaction-lock
    /// release, archival of stale suspended threads, bridge pruning.
    pub fn sweep(&self) -> Result<SweepReport> {
        let mut conn = self.lock_conn()?;

        let threads_result = lifecycle::decay_sweep(&mut conn)?;
        let locks_released = lifecycle::release_compaction_locks(&mut conn)?;
        let archive = lifecycle::archive_stale(&mut conn, self.config.engine.archive_after_hours)?;
        let bridges = gossip::prune(&conn)?;

        info!(
            suspended = threads_result.suspended.len(),
            archived = archive.archived.len(),
            bridges_pruned = bridges.pruned,
            "sweep complete"
        );

        Ok(SweepReport {
            threads: threads_result,
            locks_released,
            archive,
            bridges_pruned: bridges.pruned,
        })
    }

    /// Diagnostics: bounded BFS over the bridge graph.
    pub fn network(&self, start: &str, max_hops: usize) -> Result<gossip::Network> {
        let conn = self.lock_conn()?;
        gossip::network(&conn, start, max_hops)
    }

    /// Store statistics.
    pub fn stats(&self) -> Result<crate::memory::stats::StatsResponse> {
        let conn = self.lock_conn()?;
        crate::memory::stats::engine_stats(&conn, Some(&self.config.resolved_db_path()))
    }

    /// Change the quota mode; applies on the next enforcement pass.
    pub fn set_mode(&self, mode: &str) -> Result<usize> {
        let conn = self.lock_conn()?;
        lifecycle::set_mode(&conn, mode)
    }

    /// Merge one thread into another. Rejects split-locked or missing
    /// threads with no partial mutation; the absorbed thread is archived.
    pub fn merge(&self, survivor_id: &str, absorbed_id: &str) -> Result<MergeResult> {
        let mut conn = self.lock_conn()?;
        let result = lifecycle::merge_threads(&mut conn, survivor_id, absorbed_id)?;
        lifecycle::enforce_quota(&mut conn)?;
        Ok(result)
    }

    /// Split named messages out of a thread into split-locked children.
    pub fn split(
        &self,
        thread_id: &str,
        partitions: &[SplitPartition],
        lock_mode: SplitLockMode,
    ) -> Result<Vec<Thread>> {
        let mut conn = self.lock_conn()?;
        let children = lifecycle::split_thread(&mut conn, thread_id, partitions, lock_mode)?;
        lifecycle::enforce_quota(&mut conn)?;
        Ok(children)
    }

    /// Release a thread's split lock. Returns `false` if it was not locked.
    pub fn release_split_lock(&self, thread_id: &str) -> Result<bool> {
        let mut conn = self.lock_conn()?;
        lifecycle::release_split_lock(&mut conn, thread_id)
    }

    /// The thread the pending context points at, if it is still fresh.
    fn take_pending(&self) -> Option<String> {
        let Ok(mut pending) = self.pending.lock() else {
            return None;
        };
        let ttl = Duration::seconds(self.config.engine.pending_context_ttl_secs);
        match pending.as_ref() {
            Some(p) if Utc::now() - p.created_at <= ttl => Some(p.thread_id.clone()),
            Some(_) => {
                // expired: discard rather than chain to stale context
                *pending = None;
                None
            }
            None => None,
        }
    }

    fn set_pending(&self, thread_id: &str) {
        if let Ok(mut pending) = self.pending.lock() {
            *pending = Some(PendingCapture {
                thread_id: thread_id.to_string(),
                created_at: Utc::now(),
            });
        }
    }

    /// Run an extraction, degrading to the keyword heuristic on provider
    /// failure so routing always receives a usable value.
    fn extract(&self, request: &CaptureRequest) -> Extraction {
        match self.extractor.extract(
            &request.content,
            request.origin,
            request.file_path.as_deref(),
        ) {
            Ok(extraction) => extraction,
            Err(e) => {
                warn!(error = %e, "extraction provider failed, using heuristic fallback");
                HeuristicExtractor
                    .extract(
                        &request.content,
                        request.origin,
                        request.file_path.as_deref(),
                    )
                    .unwrap_or_default()
            }
        }
    }
}

/// Spawn the periodic sweep loop. The task owns its interval, never runs a
/// pass concurrently with itself, and exits promptly on shutdown.
pub fn spawn_sweeper(
    engine: Arc<MemoryEngine>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    let interval_secs = engine.config.server.sweep_interval_secs;
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
        // the first tick fires immediately; skip it so startup isn't a sweep
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = engine.sweep() {
                        warn!(error = %e, "sweep pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("sweeper shutting down");
                        return;
                    }
                }
            }
        }
    })
}
