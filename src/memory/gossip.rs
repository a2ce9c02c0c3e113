//! Bridge creation and gossip propagation across the thread graph.
//!
//! When a thread changes, it is compared against the rest of the active
//! population; sufficiently similar pairs get a typed bridge. Existing
//! bridges then gossip: a neighbor's neighbor becomes a candidate for a
//! derived edge, down-weighted and depth-limited so chains terminate. All
//! persistence goes through the dedup-on-save rule, so re-observing a pair
//! strengthens the existing edge instead of duplicating it.

use anyhow::Result;
use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use tracing::debug;

use crate::config::GossipConfig;
use crate::embedding::EmbeddingProvider;
use crate::memory::types::{Bridge, RelationType, Thread};
use crate::store::{bridges, threads};

/// Outcome of one gossip pass over a modified thread.
#[derive(Debug, Default, Serialize)]
pub struct GossipResult {
    pub created: usize,
    pub strengthened: usize,
    pub propagated: usize,
}

/// React to a modified thread: create direct bridges to similar active
/// threads, then propagate transitively through the existing graph.
pub fn on_thread_modified(
    conn: &mut Connection,
    embedder: &dyn EmbeddingProvider,
    config: &GossipConfig,
    thread_id: &str,
) -> Result<GossipResult> {
    let mut result = GossipResult::default();

    let mut modified = match threads::get_thread(conn, thread_id)? {
        Some(thread) => thread,
        // modified thread vanished between write and gossip; nothing to do
        None => return Ok(result),
    };

    if modified.embedding.is_none() {
        modified.embedding = Some(embedder.embed(&modified.routing_text())?);
        threads::save_thread(conn, &modified)?;
    }
    let modified_embedding = modified.embedding.clone().unwrap_or_default();

    // Direct bridges against every other active thread with a cached embedding
    for other in threads::list_active(conn)? {
        if other.id == modified.id {
            continue;
        }
        let Some(other_embedding) = other.embedding.as_deref() else {
            continue;
        };
        let similarity = embedder.similarity(&modified_embedding, other_embedding);
        if similarity < config.similarity_threshold {
            continue;
        }

        let bridge = propose_bridge(&modified, &other, similarity);
        debug!(
            source = %bridge.source_id,
            target = %bridge.target_id,
            relation = %bridge.relation,
            similarity,
            "proposing bridge"
        );
        let saved = bridges::save_bridge(conn, &bridge)?;
        if saved.deduplicated {
            result.strengthened += 1;
        } else {
            result.created += 1;
        }
    }

    result.propagated = propagate(conn, embedder, config, &modified, &modified_embedding)?;
    Ok(result)
}

/// Build a direct bridge between two threads. Relation inference is a rule
/// order, not a similarity function: parenthood first, then shared parents,
/// then chronology.
fn propose_bridge(modified: &Thread, other: &Thread, similarity: f64) -> Bridge {
    let shared = shared_concepts(modified, other);
    let reason = format!("semantic similarity {similarity:.2}");

    let (source, target, relation) = if modified.parent_id.as_deref() == Some(other.id.as_str()) {
        // the chronological child extends its parent
        (&modified.id, &other.id, RelationType::Extends)
    } else if other.parent_id.as_deref() == Some(modified.id.as_str()) {
        (&other.id, &modified.id, RelationType::Extends)
    } else if modified.parent_id.is_some() && modified.parent_id == other.parent_id {
        (&modified.id, &other.id, RelationType::Sibling)
    } else if modified.created_at > other.created_at {
        (&modified.id, &other.id, RelationType::Extends)
    } else if similarity > 0.8 {
        // modified is the older thread; the newer one extends it
        (&other.id, &modified.id, RelationType::Extends)
    } else {
        (&modified.id, &other.id, RelationType::Sibling)
    };

    Bridge::new(source.clone(), target.clone(), relation, reason, shared, similarity)
}

/// Lowercased topic intersection, capped at five concepts.
fn shared_concepts(a: &Thread, b: &Thread) -> Vec<String> {
    let b_topics: HashSet<String> = b.topics.iter().map(|t| t.to_lowercase()).collect();
    let mut shared: Vec<String> = Vec::new();
    for topic in &a.topics {
        let lower = topic.to_lowercase();
        if b_topics.contains(&lower) && !shared.contains(&lower) {
            shared.push(lower);
            if shared.len() == 5 {
                break;
            }
        }
    }
    shared
}

/// Transitive closure step: for each bridge touching the modified thread and
/// each bridge touching its far endpoint, consider a derived edge to the
/// third thread. Bridges at or beyond the max depth do not serve as sources.
fn propagate(
    conn: &mut Connection,
    embedder: &dyn EmbeddingProvider,
    config: &GossipConfig,
    modified: &Thread,
    modified_embedding: &[f32],
) -> Result<usize> {
    let derived_threshold = 0.8 * config.similarity_threshold;
    let mut created = 0;

    for first in bridges::list_for_thread(conn, &modified.id)? {
        if first.propagation_depth >= config.max_propagation_depth {
            continue;
        }
        let far_id = other_endpoint(&first, &modified.id);

        for second in bridges::list_for_thread(conn, far_id)? {
            let third_id = other_endpoint(&second, far_id);
            if third_id == modified.id {
                continue;
            }
            if bridges::find_between(conn, &modified.id, third_id)?.is_some() {
                continue;
            }
            let Some(third) = threads::get_thread(conn, third_id)? else {
                continue;
            };
            let Some(third_embedding) = third.embedding.as_deref() else {
                continue;
            };

            let similarity = embedder.similarity(modified_embedding, third_embedding);
            if similarity < derived_threshold {
                continue;
            }

            let mut bridge = Bridge::new(
                modified.id.clone(),
                third.id.clone(),
                RelationType::Extends,
                format!("propagated via {}", far_id),
                shared_concepts(modified, &third),
                similarity * 0.9,
            );
            bridge.propagated_from = Some(first.id.clone());
            bridge.propagation_depth = first.propagation_depth + 1;

            let saved = bridges::save_bridge(conn, &bridge)?;
            if !saved.deduplicated {
                created += 1;
            }
        }
    }

    Ok(created)
}

fn other_endpoint<'a>(bridge: &'a Bridge, this: &str) -> &'a str {
    if bridge.source_id == this {
        &bridge.target_id
    } else {
        &bridge.source_id
    }
}

// ── Pruning ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct PruneResult {
    pub pruned: usize,
    pub surviving: usize,
}

/// Decay every bridge; delete the ones that died. Unlike threads, dead
/// bridges are removed outright.
pub fn prune(conn: &Connection) -> Result<PruneResult> {
    let now = Utc::now();
    let mut pruned = 0;
    let mut surviving = 0;

    for mut bridge in bridges::list_all(conn)? {
        if bridge.decay(now) {
            bridges::delete_bridge(conn, &bridge.id)?;
            debug!(bridge = %bridge.id, "bridge died");
            pruned += 1;
        } else {
            bridges::update_bridge(conn, &bridge)?;
            surviving += 1;
        }
    }

    Ok(PruneResult { pruned, surviving })
}

// ── Network introspection ────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct NetworkNode {
    pub id: String,
    pub title: String,
    pub status: String,
    pub weight: f64,
}

#[derive(Debug, Serialize)]
pub struct NetworkEdge {
    pub source: String,
    pub target: String,
    pub relation: String,
    pub confidence: f64,
}

#[derive(Debug, Serialize)]
pub struct Network {
    pub nodes: Vec<NetworkNode>,
    pub edges: Vec<NetworkEdge>,
}

/// Bounded breadth-first walk of the bridge graph from a starting thread.
/// Diagnostics only; the routing and decay paths never consult this.
pub fn network(conn: &Connection, start: &str, max_hops: usize) -> Result<Network> {
    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut seen_edges: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<(String, usize)> = VecDeque::new();

    queue.push_back((start.to_string(), 0));
    visited.insert(start.to_string());

    while let Some((thread_id, hops)) = queue.pop_front() {
        if let Some(thread) = threads::get_thread(conn, &thread_id)? {
            nodes.push(NetworkNode {
                id: thread.id.clone(),
                title: thread.title.clone(),
                status: thread.status.as_str().to_string(),
                weight: thread.weight,
            });
        }
        if hops == max_hops {
            continue;
        }

        for bridge in bridges::list_for_thread(conn, &thread_id)? {
            if seen_edges.insert(bridge.id.clone()) {
                edges.push(NetworkEdge {
                    source: bridge.source_id.clone(),
                    target: bridge.target_id.clone(),
                    relation: bridge.relation.as_str().to_string(),
                    confidence: bridge.confidence,
                });
            }
            let neighbor = other_endpoint(&bridge, &thread_id).to_string();
            if visited.insert(neighbor.clone()) {
                queue.push_back((neighbor, hops + 1));
            }
        }
    }

    Ok(Network { nodes, edges })
}
