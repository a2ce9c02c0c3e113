//! Content extraction capability.
//!
//! [`ExtractionProvider`] turns raw captured text into the structured
//! [`Extraction`] the router scores against. An LLM-backed implementation
//! plugs in from outside; the built-in [`HeuristicExtractor`] is the
//! documented fallback the engine uses whenever a provider fails or times
//! out, so routing always receives a usable extraction.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::memory::types::{truncate_chars, OriginType};

/// Structured extraction of a captured piece of content. Plain data, fixed
/// shape; optional parts are empty vectors rather than a dynamic map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extraction {
    pub title: String,
    pub summary: String,
    /// Topical subjects used for overlap scoring and thread topics.
    pub subjects: Vec<String>,
    /// Secondary concepts folded into a new thread's topics.
    pub key_concepts: Vec<String>,
    pub questions: Vec<String>,
    pub decisions: Vec<String>,
    pub context_hints: Vec<String>,
}

/// Trait for extracting structure from captured content.
///
/// Implementations must degrade rather than hang: a remote-model provider
/// bounds its own latency and returns an error, which the engine converts
/// into a [`HeuristicExtractor`] pass.
pub trait ExtractionProvider: Send + Sync {
    fn extract(
        &self,
        content: &str,
        origin: OriginType,
        file_path: Option<&str>,
    ) -> Result<Extraction>;
}

/// Keyword-frequency extraction. Deterministic, no external calls.
pub struct HeuristicExtractor;

impl ExtractionProvider for HeuristicExtractor {
    fn extract(
        &self,
        content: &str,
        _origin: OriginType,
        file_path: Option<&str>,
    ) -> Result<Extraction> {
        let title = content
            .lines()
            .find(|l| !l.trim().is_empty())
            .map(|l| truncate_chars(l.trim(), 80))
            .unwrap_or_else(|| "Untitled".to_string());

        let summary = truncate_chars(content.trim(), 200);

        let keywords = ranked_keywords(content);
        let subjects: Vec<String> = keywords.iter().take(5).cloned().collect();
        let key_concepts: Vec<String> = keywords.iter().skip(5).take(3).cloned().collect();

        let questions: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|l| l.ends_with('?'))
            .map(|l| l.to_string())
            .collect();

        let decisions: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|l| {
                let lower = l.to_lowercase();
                lower.contains("decided") || lower.contains("decision:") || lower.contains("we will")
            })
            .map(|l| l.to_string())
            .collect();

        let context_hints = file_path.map(|p| vec![p.to_string()]).unwrap_or_default();

        Ok(Extraction {
            title,
            summary,
            subjects,
            key_concepts,
            questions,
            decisions,
            context_hints,
        })
    }
}

/// Keywords ranked by frequency, ties broken by first appearance.
fn ranked_keywords(content: &str) -> Vec<String> {
    const STOPWORDS: &[&str] = &[
        "about", "after", "again", "because", "being", "could", "doing", "during", "every",
        "from", "have", "having", "here", "into", "just", "like", "more", "most", "other",
        "over", "same", "should", "some", "such", "than", "that", "their", "them", "then",
        "there", "these", "they", "this", "those", "through", "very", "want", "were", "what",
        "when", "where", "which", "while", "will", "with", "would", "your",
    ];

    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for token in content
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 4)
        .map(|t| t.to_lowercase())
    {
        if STOPWORDS.contains(&token.as_str()) || token.chars().all(|c| c.is_numeric()) {
            continue;
        }
        if !counts.contains_key(&token) {
            order.push(token.clone());
        }
        *counts.entry(token).or_insert(0) += 1;
    }

    let mut ranked: Vec<(usize, usize, String)> = order
        .into_iter()
        .enumerate()
        .map(|(i, token)| (counts[&token], i, token))
        .collect();
    // highest count first, then first-seen
    ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    ranked.into_iter().map(|(_, _, token)| token).collect()
}
