//! Beam selection: rank an active state set and truncate it to a width.

use std::cmp::Ordering;

/// Keeps the `width` highest-scoring items.
///
/// Pure and deterministic. Ties break toward earlier input position (the
/// underlying sort is stable), and an input no larger than the width is
/// returned unchanged in its original order. Non-finite scores compare as
/// equal rather than poisoning the ordering.
pub fn select<T>(scored: Vec<(T, f64)>, width: usize) -> Vec<T> {
    if scored.len() <= width {
        return scored.into_iter().map(|(item, _)| item).collect();
    }

    let mut scored = scored;
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored.truncate(width);
    scored.into_iter().map(|(item, _)| item).collect()
}
