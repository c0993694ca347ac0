//! Score normalization and result ordering.
//!
//! Backends report a native distance where lower is closer. Scores are
//! normalized so that higher is better regardless of metric:
//!
//! | Metric | Native distance | Score |
//! |--------|-----------------|-------|
//! | cosine | `1 - cos` | `1 - d` |
//! | dot | `1 - dot` | `1 - d` |
//! | L2 | euclidean (squared on LanceDB) | `1 / (1 + d)` |

use semdex_core::{DistanceMetric, SearchResult, StoreHit};
use std::cmp::Ordering;

/// Convert a native distance to a higher-is-better score.
#[must_use]
pub fn normalize_score(metric: DistanceMetric, distance: f32) -> f32 {
    match metric {
        DistanceMetric::Cosine | DistanceMetric::Dot => 1.0 - distance,
        DistanceMetric::L2 => 1.0 / (1.0 + distance.max(0.0)),
    }
}

/// Order by score descending, ties by ascending `record_id`.
#[must_use]
pub fn compare(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.record_id.cmp(&b.record_id))
}

/// Normalize, sort, apply `min_score` and truncate to `top_k`.
#[must_use]
pub fn rank(
    metric: DistanceMetric,
    hits: Vec<StoreHit>,
    min_score: Option<f32>,
    top_k: usize,
) -> Vec<SearchResult> {
    let mut results: Vec<SearchResult> = hits
        .into_iter()
        .map(|hit| SearchResult {
            score: normalize_score(metric, hit.distance),
            record_id: hit.record_id,
            document_id: hit.document_id,
            sequence_index: hit.sequence_index,
            content: hit.content,
            metadata: hit.metadata,
        })
        .collect();
    results.sort_by(compare);
    if let Some(min) = min_score {
        results.retain(|r| r.score >= min);
    }
    results.truncate(top_k);
    results
}
