//! Shared exponential decay law for threads and bridges.
//!
//! Both entity kinds carry a weight in `[0.0, 1.0]` that halves every
//! half-life of disuse and is boosted additively on each use. Decay is lazy:
//! it is applied at sweep/prune checkpoints, not continuously, so callers
//! must run `decay()` before trusting a stored weight.

use chrono::{DateTime, Utc};

/// Days for a thread's weight to halve without reinforcement.
pub const THREAD_HALF_LIFE_DAYS: f64 = 7.0;

/// Threads below this weight are suspended by the decay sweep.
pub const THREAD_SUSPEND_THRESHOLD: f64 = 0.1;

/// Days for a bridge's weight to halve without reinforcement.
pub const BRIDGE_HALF_LIFE_DAYS: f64 = 1.0;

/// Bridges below this weight are deleted outright.
pub const BRIDGE_DEATH_THRESHOLD: f64 = 0.05;

/// Bridges below this weight (but above death) are downgraded to weak.
pub const BRIDGE_WEAK_THRESHOLD: f64 = 0.2;

/// Additive weight boost applied on each use, capped at 1.0.
pub const USE_BOOST: f64 = 0.1;

/// Apply exponential decay: `weight × 0.5^(Δdays / half_life)`.
///
/// `reference` is the last use (or creation if never used). A reference in
/// the future clamps elapsed time to zero rather than inflating the weight.
pub fn decayed_weight(
    weight: f64,
    reference: DateTime<Utc>,
    half_life_days: f64,
    now: DateTime<Utc>,
) -> f64 {
    let elapsed_days = (now - reference).num_milliseconds().max(0) as f64 / 86_400_000.0;
    let decayed = weight * 0.5_f64.powf(elapsed_days / half_life_days);
    decayed.clamp(0.0, 1.0)
}

/// Hebbian reinforcement: add [`USE_BOOST`], capped at 1.0.
pub fn boosted_weight(weight: f64) -> f64 {
    (weight + USE_BOOST).min(1.0)
}
