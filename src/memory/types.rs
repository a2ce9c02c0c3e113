//! Core thread and bridge type definitions.
//!
//! Defines [`Thread`] (a decaying work stream), [`Bridge`] (a directed typed
//! edge between threads), [`Message`], and the status/origin/relation enums.
//! All state transitions go through methods with exhaustive matches; raw
//! field twiddling is reserved for the storage layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::decay;

/// Running summaries are capped at this many characters.
pub const SUMMARY_MAX_CHARS: usize = 500;

/// Characters of each message included when building routing text.
pub const MESSAGE_SNIPPET_CHARS: usize = 300;

// ── Enums ────────────────────────────────────────────────────────────────────

/// Lifecycle state of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    /// In the working set; routing candidates come from here.
    Active,
    /// Decayed or evicted; can be reactivated.
    Suspended,
    /// Soft-deleted; only a synthesis record remains after archival.
    Archived,
}

impl ThreadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Archived => "archived",
        }
    }
}

impl std::fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ThreadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            "archived" => Ok(Self::Archived),
            _ => Err(format!("unknown thread status: {s}")),
        }
    }
}

/// How a thread came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginType {
    Prompt,
    FileRead,
    Task,
    Fetch,
    Split,
    Reactivation,
}

impl OriginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::FileRead => "file_read",
            Self::Task => "task",
            Self::Fetch => "fetch",
            Self::Split => "split",
            Self::Reactivation => "reactivation",
        }
    }
}

impl std::fmt::Display for OriginType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OriginType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prompt" => Ok(Self::Prompt),
            "file_read" => Ok(Self::FileRead),
            "task" => Ok(Self::Task),
            "fetch" => Ok(Self::Fetch),
            "split" => Ok(Self::Split),
            "reactivation" => Ok(Self::Reactivation),
            _ => Err(format!("unknown origin type: {s}")),
        }
    }
}

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(format!("unknown role: {s}")),
        }
    }
}

/// Semantic relation carried by a bridge.
///
/// `Sibling` and `Contradicts` are logically bidirectional — existence checks
/// must cover both directions (see `store::bridges::find_between`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    Extends,
    Contradicts,
    Depends,
    Replaces,
    ChildOf,
    Sibling,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extends => "extends",
            Self::Contradicts => "contradicts",
            Self::Depends => "depends",
            Self::Replaces => "replaces",
            Self::ChildOf => "child_of",
            Self::Sibling => "sibling",
        }
    }

    /// True for relations that read the same in both directions.
    pub fn is_bidirectional(&self) -> bool {
        matches!(self, Self::Sibling | Self::Contradicts)
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RelationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "extends" => Ok(Self::Extends),
            "contradicts" => Ok(Self::Contradicts),
            "depends" => Ok(Self::Depends),
            "replaces" => Ok(Self::Replaces),
            "child_of" => Ok(Self::ChildOf),
            "sibling" => Ok(Self::Sibling),
            _ => Err(format!("unknown relation type: {s}")),
        }
    }
}

/// Health of a bridge. Unlike threads, bridges that decay past the death
/// threshold are deleted, not archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeStatus {
    Active,
    Weak,
    Invalid,
}

impl BridgeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Weak => "weak",
            Self::Invalid => "invalid",
        }
    }
}

impl std::str::FromStr for BridgeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "weak" => Ok(Self::Weak),
            "invalid" => Ok(Self::Invalid),
            _ => Err(format!("unknown bridge status: {s}")),
        }
    }
}

/// What releases a split lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitLockMode {
    /// Released automatically at the next compaction (archival) pass.
    Compaction,
    /// Released only by an explicit release call.
    AgentRelease,
    /// Same release rule as `AgentRelease`; marks a forced split.
    Force,
}

impl SplitLockMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compaction => "compaction",
            Self::AgentRelease => "agent_release",
            Self::Force => "force",
        }
    }
}

impl std::str::FromStr for SplitLockMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compaction" => Ok(Self::Compaction),
            "agent_release" => Ok(Self::AgentRelease),
            "force" => Ok(Self::Force),
            _ => Err(format!("unknown split lock mode: {s}")),
        }
    }
}

// ── Message ──────────────────────────────────────────────────────────────────

/// A single captured message inside a thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// UUID v7 (time-sortable) primary key.
    pub id: String,
    pub role: Role,
    pub content: String,
    /// Free-form metadata (e.g. originating tool, file path).
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            role,
            content: content.into(),
            metadata: None,
            created_at: Utc::now(),
        }
    }
}

// ── Thread ───────────────────────────────────────────────────────────────────

/// A work stream (topic), not a session. Threads accumulate messages over
/// time, decay with a 7-day half-life, and are suspended rather than deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    /// UUID v7 (time-sortable) primary key.
    pub id: String,
    pub title: String,
    pub summary: String,
    /// Deduplicated keyword/phrase strings.
    pub topics: Vec<String>,
    pub tags: Vec<String>,
    pub status: ThreadStatus,
    pub origin: OriginType,
    /// Weak back-reference; the parent may no longer exist.
    pub parent_id: Option<String>,
    /// Ids of threads this thread spawned. Only ever grows.
    pub child_ids: Vec<String>,
    /// Present while a split result awaits review; blocks merge and
    /// decay-triggered suspension.
    pub split_lock_mode: Option<SplitLockMode>,
    pub weight: f64,
    pub last_active: DateTime<Utc>,
    pub activation_count: u32,
    /// Cached embedding of the routing text; invalidated on content change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

impl Thread {
    pub fn new(title: impl Into<String>, origin: OriginType) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            title: title.into(),
            summary: String::new(),
            topics: Vec::new(),
            tags: Vec::new(),
            status: ThreadStatus::Active,
            origin,
            parent_id: None,
            child_ids: Vec::new(),
            split_lock_mode: None,
            weight: 1.0,
            last_active: now,
            activation_count: 0,
            embedding: None,
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        }
    }

    pub fn split_locked(&self) -> bool {
        self.split_lock_mode.is_some()
    }

    /// Apply lazy decay against `last_active`.
    pub fn decay(&mut self, now: DateTime<Utc>) {
        self.weight =
            decay::decayed_weight(self.weight, self.last_active, decay::THREAD_HALF_LIFE_DAYS, now);
    }

    /// True once decay has pushed the weight below the suspend threshold.
    pub fn should_suspend(&self) -> bool {
        self.weight < decay::THREAD_SUSPEND_THRESHOLD
    }

    /// Usage counteracts decay: boost weight and reset the decay reference.
    pub fn record_use(&mut self, now: DateTime<Utc>) {
        self.weight = decay::boosted_weight(self.weight);
        self.last_active = now;
        self.updated_at = now;
    }

    /// Active → Suspended. No-op for threads already suspended or archived.
    pub fn suspend(&mut self) {
        match self.status {
            ThreadStatus::Active => {
                self.status = ThreadStatus::Suspended;
                self.updated_at = Utc::now();
            }
            ThreadStatus::Suspended | ThreadStatus::Archived => {}
        }
    }

    /// Suspended → Active, with a use boost and activation count bump.
    pub fn reactivate(&mut self) {
        match self.status {
            ThreadStatus::Suspended => {
                let now = Utc::now();
                self.status = ThreadStatus::Active;
                self.activation_count += 1;
                self.record_use(now);
            }
            ThreadStatus::Active | ThreadStatus::Archived => {}
        }
    }

    /// Any → Archived.
    pub fn archive(&mut self) {
        match self.status {
            ThreadStatus::Archived => {}
            ThreadStatus::Active | ThreadStatus::Suspended => {
                self.status = ThreadStatus::Archived;
                self.updated_at = Utc::now();
            }
        }
    }

    /// Append a message and drop the stale embedding cache.
    pub fn append_message(&mut self, message: Message) {
        self.messages.push(message);
        self.embedding = None;
        self.updated_at = Utc::now();
    }

    /// Union new topics in, preserving insertion order.
    pub fn merge_topics(&mut self, new_topics: &[String]) {
        for topic in new_topics {
            if !self.topics.iter().any(|t| t.eq_ignore_ascii_case(topic)) {
                self.topics.push(topic.clone());
            }
        }
    }

    /// Union tags in, preserving insertion order.
    pub fn merge_tags(&mut self, new_tags: &[String]) {
        for tag in new_tags {
            if !self.tags.contains(tag) {
                self.tags.push(tag.clone());
            }
        }
    }

    /// Append new summary text unless it is already a substring of the
    /// current summary; truncate to [`SUMMARY_MAX_CHARS`].
    pub fn merge_summary(&mut self, new_summary: &str) {
        let new_summary = new_summary.trim();
        if new_summary.is_empty() || self.summary.contains(new_summary) {
            return;
        }
        if self.summary.is_empty() {
            self.summary = new_summary.to_string();
        } else {
            self.summary = format!("{} {}", self.summary, new_summary);
        }
        self.summary = truncate_chars(&self.summary, SUMMARY_MAX_CHARS);
    }

    /// Text used for embedding and similarity scoring: title, topics, and the
    /// last three messages (each truncated).
    pub fn routing_text(&self) -> String {
        let mut parts = vec![self.title.clone()];
        if !self.topics.is_empty() {
            parts.push(self.topics.join(" "));
        }
        for message in self.messages.iter().rev().take(3).rev() {
            parts.push(truncate_chars(&message.content, MESSAGE_SNIPPET_CHARS));
        }
        parts.join("\n")
    }
}

// ── Bridge ───────────────────────────────────────────────────────────────────

/// A directed, typed, weighted semantic edge between two threads.
///
/// Weight starts at `confidence` and then decays independently of it with a
/// 1-day half-life. Dead bridges (weight below the death threshold) are
/// deleted by the prune sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bridge {
    /// UUID v7 (time-sortable) primary key.
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub relation: RelationType,
    pub reason: String,
    /// Topic strings common to both endpoints, lowercased, at most five.
    pub shared_concepts: Vec<String>,
    /// Fixed at creation; does not decay.
    pub confidence: f64,
    pub weight: f64,
    pub status: BridgeStatus,
    /// Weak back-reference to the bridge this one was derived from.
    pub propagated_from: Option<String>,
    /// 0 = direct observation, ≥ 1 = derived via gossip.
    pub propagation_depth: u32,
    pub use_count: u32,
    pub last_used: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Bridge {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relation: RelationType,
        reason: impl Into<String>,
        shared_concepts: Vec<String>,
        confidence: f64,
    ) -> Self {
        let confidence = confidence.clamp(0.0, 1.0);
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            relation,
            reason: reason.into(),
            shared_concepts,
            confidence,
            weight: confidence,
            status: BridgeStatus::Active,
            propagated_from: None,
            propagation_depth: 0,
            use_count: 0,
            last_used: None,
            created_at: Utc::now(),
        }
    }

    /// Apply lazy decay against the last use (creation if never used).
    /// Returns `true` when the bridge has died and must be deleted.
    pub fn decay(&mut self, now: DateTime<Utc>) -> bool {
        let reference = self.last_used.unwrap_or(self.created_at);
        self.weight =
            decay::decayed_weight(self.weight, reference, decay::BRIDGE_HALF_LIFE_DAYS, now);
        if self.weight < decay::BRIDGE_DEATH_THRESHOLD {
            return true;
        }
        if self.weight < decay::BRIDGE_WEAK_THRESHOLD && self.status == BridgeStatus::Active {
            self.status = BridgeStatus::Weak;
        }
        false
    }

    /// Traversal or re-observation strengthens the edge.
    pub fn record_use(&mut self, now: DateTime<Utc>) {
        self.weight = decay::boosted_weight(self.weight);
        self.use_count += 1;
        self.last_used = Some(now);
        if self.status == BridgeStatus::Weak {
            self.status = BridgeStatus::Active;
        }
    }

    /// Flag an edge an external reasoning step has rejected.
    pub fn mark_invalid(&mut self) {
        self.status = BridgeStatus::Invalid;
    }

    /// True if this bridge connects the unordered pair `{a, b}`.
    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.source_id == a && self.target_id == b)
            || (self.source_id == b && self.target_id == a)
    }
}

/// Truncate to a character budget on a char boundary.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}
