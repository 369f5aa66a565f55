//! Picks the current status out of a version/platform history.

use crate::model::{StatusQueryResult, StatusRecord};

/// Resolves the current status of a history given in append order.
///
/// The record with the latest `published_at` wins. Records sharing a timestamp
/// are ordered by their position in `history`, so the last appended one wins.
/// An empty history resolves to [`StatusQueryResult::NOT_FOUND`].
pub fn resolve(history: &[StatusRecord]) -> StatusQueryResult {
    // `max_by_key` yields the last of several equal maxima.
    history
        .iter()
        .max_by_key(|record| record.published_at)
        .map_or(StatusQueryResult::NOT_FOUND, |record| StatusQueryResult {
            status: record.status,
            found: true,
        })
}
