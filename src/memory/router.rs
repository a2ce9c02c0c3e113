//! Routing: does new content continue, fork, reactivate, or start a thread?
//!
//! Scores incoming content against the ACTIVE population first and the
//! SUSPENDED population second, combining embedding similarity with topic
//! overlap. Thresholds are deliberate constants kept in one place; the fork
//! heuristic in particular is a weak signal a future retune may adjust.

use anyhow::Result;
use rusqlite::Connection;
use tracing::debug;

use crate::embedding::EmbeddingProvider;
use crate::extract::Extraction;
use crate::memory::types::Thread;
use crate::store::threads;

/// Best ACTIVE score above this continues the thread.
pub const CONTINUE_THRESHOLD: f64 = 0.35;

/// Best SUSPENDED score above this reactivates the thread.
pub const REACTIVATE_THRESHOLD: f64 = 0.5;

const EMBEDDING_WEIGHT: f64 = 0.7;
const TOPIC_WEIGHT: f64 = 0.3;
const EXACT_MATCH_BONUS: f64 = 0.15;

/// What to do with a piece of captured content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAction {
    NewThread,
    Continue { thread_id: String },
    Fork { parent_id: String },
    Reactivate { thread_id: String },
}

/// A routing decision with the confidence the executor records.
#[derive(Debug, Clone)]
pub struct Decision {
    pub action: RouteAction,
    pub confidence: f64,
    pub reason: String,
}

/// Per-thread score and the overlap counts the fork heuristic needs.
struct ScoredThread {
    thread_id: String,
    score: f64,
    overlap_count: usize,
    new_count: usize,
}

/// Decide how to route `content`.
///
/// A `parent_hint` from an external coherence check short-circuits scoring
/// entirely and forces a fork off the hinted thread. Otherwise the cascade
/// runs: continue > reactivate > fork > new. Deterministic for a fixed
/// thread population with fixed cached embeddings; ties go to the
/// first-listed (oldest) thread.
pub fn decide(
    conn: &mut Connection,
    embedder: &dyn EmbeddingProvider,
    content: &str,
    extraction: &Extraction,
    parent_hint: Option<&str>,
) -> Result<Decision> {
    if let Some(parent_id) = parent_hint {
        return Ok(Decision {
            action: RouteAction::Fork {
                parent_id: parent_id.to_string(),
            },
            confidence: 0.8,
            reason: "chained to pending capture context".into(),
        });
    }

    let mut active = threads::list_active(conn)?;
    if active.is_empty() {
        return Ok(Decision {
            action: RouteAction::NewThread,
            confidence: 1.0,
            reason: "no active threads".into(),
        });
    }

    let content_embedding = embedder.embed(content)?;

    let best_active = best_match(conn, embedder, &content_embedding, extraction, &mut active)?;
    if let Some(ref best) = best_active {
        debug!(thread = %best.thread_id, score = best.score, "best active match");
        if best.score > CONTINUE_THRESHOLD {
            return Ok(Decision {
                action: RouteAction::Continue {
                    thread_id: best.thread_id.clone(),
                },
                confidence: best.score,
                reason: format!("similarity {:.2} to active thread", best.score),
            });
        }
    }

    let mut suspended = threads::list_suspended(conn)?;
    if let Some(best) =
        best_match(conn, embedder, &content_embedding, extraction, &mut suspended)?
    {
        if best.score > REACTIVATE_THRESHOLD {
            return Ok(Decision {
                action: RouteAction::Reactivate {
                    thread_id: best.thread_id.clone(),
                },
                confidence: best.score,
                reason: format!("similarity {:.2} to suspended thread", best.score),
            });
        }
    }

    // Fork potential: the best active thread shares ground with the new
    // content, but the content brings at least as many new subjects as
    // shared ones.
    if let Some(best) = best_active {
        if best.overlap_count > 0 && best.new_count >= best.overlap_count {
            return Ok(Decision {
                action: RouteAction::Fork {
                    parent_id: best.thread_id,
                },
                confidence: 0.7,
                reason: format!(
                    "{} shared vs {} new subjects",
                    best.overlap_count, best.new_count
                ),
            });
        }
    }

    Ok(Decision {
        action: RouteAction::NewThread,
        confidence: 0.8,
        reason: "no sufficient match".into(),
    })
}

/// Score every thread in `candidates` and return the best. First-encountered
/// wins ties (strict greater-than while walking the stable listing order).
/// Threads without a cached embedding get one computed and cached back.
fn best_match(
    conn: &mut Connection,
    embedder: &dyn EmbeddingProvider,
    content_embedding: &[f32],
    extraction: &Extraction,
    candidates: &mut [Thread],
) -> Result<Option<ScoredThread>> {
    let mut best: Option<ScoredThread> = None;

    for thread in candidates.iter_mut() {
        if thread.embedding.is_none() {
            thread.embedding = Some(embedder.embed(&thread.routing_text())?);
            threads::save_thread(conn, thread)?;
        }
        let thread_embedding = thread.embedding.as_deref().unwrap_or(&[]);

        let embedding_similarity = embedder.similarity(content_embedding, thread_embedding);
        let (overlap_count, new_count) = subject_overlap(extraction, thread);
        let overlap_ratio = if extraction.subjects.is_empty() {
            0.0
        } else {
            overlap_count as f64 / extraction.subjects.len() as f64
        };
        let bonus = if overlap_count > 0 { EXACT_MATCH_BONUS } else { 0.0 };

        let score = (EMBEDDING_WEIGHT * embedding_similarity
            + TOPIC_WEIGHT * overlap_ratio
            + bonus)
            .min(1.0);

        if best.as_ref().map_or(true, |b| score > b.score) {
            best = Some(ScoredThread {
                thread_id: thread.id.clone(),
                score,
                overlap_count,
                new_count,
            });
        }
    }

    Ok(best)
}

/// Count extracted subjects that do / do not appear in the thread's topics.
fn subject_overlap(extraction: &Extraction, thread: &Thread) -> (usize, usize) {
    let topics: Vec<String> = thread.topics.iter().map(|t| t.to_lowercase()).collect();
    let mut overlap = 0;
    let mut fresh = 0;
    for subject in &extraction.subjects {
        if topics.contains(&subject.to_lowercase()) {
            overlap += 1;
        } else {
            fresh += 1;
        }
    }
    (overlap, fresh)
}
