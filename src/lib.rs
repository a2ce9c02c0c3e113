//! Decaying, graph-linked thread memory for AI agents.
//!
//! braid maintains a population of work **threads** (topics, not sessions)
//! and typed **bridges** between them. New content is routed onto the
//! population — continue, fork, reactivate, or start fresh — and everything
//! ages: weights halve per half-life of disuse and are boosted back on use.
//!
//! | Entity | Half-life | Threshold | Below threshold |
//! |--------|-----------|-----------|-----------------|
//! | **Thread** | 7 days | 0.1 | suspended (never deleted) |
//! | **Bridge** | 1 day | 0.05 | deleted outright |
//!
//! # Architecture
//!
//! - **Storage**: SQLite (WAL) — one row per thread/bridge, status indexes,
//!   transactional writes
//! - **Routing**: combined embedding-similarity + topic-overlap score against
//!   the ACTIVE population, then the SUSPENDED one
//! - **Gossip**: similar thread pairs get typed bridges; bridges propagate
//!   transitively with depth-limited, down-weighted confidence
//! - **Lifecycle**: mode-based quota enforcement, periodic decay sweep,
//!   merge/split with split locks, archival to condensed syntheses
//!
//! # Modules
//!
//! - [`config`] — Configuration loading from TOML files and environment variables
//! - [`db`] — SQLite initialization, schema, and migrations
//! - [`embedding`] — Pluggable text-to-vector capability with cosine similarity
//! - [`extract`] — Pluggable structured extraction with a heuristic fallback
//! - [`memory`] — Core engine: types, decay, routing, lifecycle, gossip
//! - [`store`] — Thread and bridge persistence
//! - [`engine`] — The capture pipeline and background sweeper

pub mod config;
pub mod content;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extract;
pub mod memory;
pub mod store;
