//! Total order over locator candidates.
//!
//! Rank is always recomputed into a fresh list; callers replace the old
//! ranking wholesale instead of swapping entries in place.

use std::cmp::Ordering;

use autopom_core_types::LocatorCandidate;

/// Proposal order: stability, then strategy priority, then shorter expression.
pub fn proposal_order(a: &LocatorCandidate, b: &LocatorCandidate) -> Ordering {
    b.stability
        .total_cmp(&a.stability)
        .then_with(|| a.strategy.priority().cmp(&b.strategy.priority()))
        .then_with(|| a.expression.len().cmp(&b.expression.len()))
}

/// Verified candidates always rank ahead of unverified ones.
pub fn verified_order(a: &LocatorCandidate, b: &LocatorCandidate) -> Ordering {
    b.verified
        .cmp(&a.verified)
        .then_with(|| proposal_order(a, b))
}

/// A newly sorted copy of `candidates`.
pub fn rank(candidates: &[LocatorCandidate]) -> Vec<LocatorCandidate> {
    let mut ranked = candidates.to_vec();
    ranked.sort_by(verified_order);
    ranked
}
