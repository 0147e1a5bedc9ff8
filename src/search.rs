//! Hybrid lexical + vector retrieval over completed assets.
//!
//! # Pipeline
//!
//! 1. **Candidates**: the newest `candidate_limit` assets with status
//!    `COMPLETED`. This is a recency-bounded scan, not a full-corpus one.
//! 2. **Vector signal** (best-effort, concurrent with step 1): embed the
//!    query and ask the metadata store for the nearest `vector_candidates`
//!    semantic vectors, bounded by `vector_timeout_secs`. Similarity is
//!    `max(0, 1 − distance)`. Any failure or timeout here only removes the
//!    signal; see [`Signal`].
//! 3. **Lexical score** per candidate, on normalized text:
//!    - `+2` if `"filename mime caption text"` contains the query
//!    - `+1` if the caption alone contains the query
//!    - `+` fraction of distinct query characters present anywhere
//!    - a flat [`EMPTY_QUERY_LEXICAL`] when the query is empty
//!
//!    then divided by 3 and capped at 1.
//! 4. **Combined**: `w·vector + (1−w)·lexical` when any vector score exists
//!    for this query, else lexical alone; minus `recency_weight_per_hour ×
//!    hours since creation`; clamped to `[0, 1]`; rounded to 3 decimals.
//! 5. **Filter and order**: drop scores below the threshold (non-empty
//!    queries only), sort by score desc, `created_at` desc, id asc, and
//!    truncate to the clamped limit.
//! 6. **Decorate** survivors with a preview and a best-effort presigned URL.
//!    URLs are minted concurrently, so one slow object store costs at most a
//!    single presign timeout per search.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::RetrievalConfig;
use crate::embedding::{embed_signal, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::models::{Asset, ScoredAsset, Signal};
use crate::object_store::{presign_or_empty, ObjectStore};
use crate::store::MetadataStore;
use crate::text;

/// Lexical score (before the ÷3 normalization) assigned to every candidate
/// when the query is empty.
pub const EMPTY_QUERY_LEXICAL: f64 = 0.1;

/// Ranked results plus what happened to the vector signal.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub results: Vec<ScoredAsset>,
    /// Number of vector scores used, or why there were none.
    pub vector_signal: Signal<usize>,
}

/// A query in canonical form, prepared once per search.
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    /// Trimmed original text, sent to the embedding provider.
    pub raw: String,
    pub normalized: String,
    pub chars: HashSet<char>,
}

impl PreparedQuery {
    pub fn new(raw: &str) -> Self {
        let normalized = text::normalize(raw);
        let chars = text::unique_chars(&normalized);
        Self {
            raw: raw.trim().to_string(),
            normalized,
            chars,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }
}

/// Normalized lexical score in `[0, 1]`.
pub fn lexical_score(query: &PreparedQuery, asset: &Asset) -> f64 {
    let raw = if query.is_empty() {
        EMPTY_QUERY_LEXICAL
    } else {
        let caption = asset.caption.as_deref().unwrap_or("");
        let haystack = text::normalize(&format!(
            "{} {} {} {}",
            asset.file_name(),
            asset.mime_type,
            caption,
            asset.content_text.as_deref().unwrap_or("")
        ));

        let mut score = 0.0;
        if haystack.contains(&query.normalized) {
            score += 2.0;
        }
        if text::normalize(caption).contains(&query.normalized) {
            score += 1.0;
        }
        score + text::char_coverage(&query.chars, &haystack)
    };
    (raw / 3.0).clamp(0.0, 1.0)
}

/// Weighted combination, recency adjustment, clamp, and rounding.
///
/// `vector` is this candidate's similarity if it was among the nearest
/// neighbours; `has_vector_scores` says whether the query produced any
/// vector scores at all.
pub fn combined_score(
    config: &RetrievalConfig,
    lexical: f64,
    vector: Option<f64>,
    has_vector_scores: bool,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> f64 {
    let base = if has_vector_scores {
        config.vector_weight * vector.unwrap_or(0.0) + (1.0 - config.vector_weight) * lexical
    } else {
        lexical
    };
    let hours = ((now - created_at).num_milliseconds() as f64 / 3_600_000.0).max(0.0);
    let adjusted = (base - config.recency_weight_per_hour * hours).clamp(0.0, 1.0);
    (adjusted * 1000.0).round() / 1000.0
}

/// Map a requested limit into `[1, max_limit]`; non-positive means default.
pub fn clamp_limit(requested: i64, default: i64, max: i64) -> i64 {
    if requested <= 0 {
        default.min(max)
    } else {
        requested.min(max)
    }
}

pub struct RetrievalEngine {
    store: Arc<dyn MetadataStore>,
    objects: Arc<dyn ObjectStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: RetrievalConfig,
    presign_ttl: Duration,
    presign_timeout: Duration,
}

impl RetrievalEngine {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        objects: Arc<dyn ObjectStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: RetrievalConfig,
        presign_ttl: Duration,
    ) -> Self {
        Self {
            store,
            objects,
            embedder,
            config,
            presign_ttl,
            presign_timeout: Duration::from_secs(5),
        }
    }

    /// Bound on minting a single presigned URL (default 5s).
    pub fn with_presign_timeout(mut self, timeout: Duration) -> Self {
        self.presign_timeout = timeout;
        self
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub async fn search(&self, query: &str, limit: i64, threshold: f64) -> Result<SearchOutcome> {
        self.search_at(query, limit, threshold, Utc::now()).await
    }

    /// [`search`](Self::search) with an explicit evaluation instant, so the
    /// recency adjustment is reproducible.
    pub async fn search_at(
        &self,
        query: &str,
        limit: i64,
        threshold: f64,
        now: DateTime<Utc>,
    ) -> Result<SearchOutcome> {
        let limit = clamp_limit(limit, self.config.default_limit, self.config.max_limit);
        let threshold = if threshold.is_finite() {
            threshold
        } else {
            self.config.default_threshold
        };
        let prepared = PreparedQuery::new(query);

        let (candidates, vector_signal) = tokio::join!(
            self.store.recent_completed(self.config.candidate_limit),
            self.vector_scores(&prepared),
        );
        let candidates = candidates.map_err(Error::Retrieval)?;

        let vector_state = match &vector_signal {
            Signal::Present(scores) => Signal::Present(scores.len()),
            Signal::Absent => Signal::Absent,
            Signal::Errored(msg) => Signal::Errored(msg.clone()),
        };
        let vector_scores = vector_signal.unwrap_or(HashMap::new());
        let has_vector_scores = !vector_scores.is_empty();

        let mut scored: Vec<(f64, Asset)> = candidates
            .into_iter()
            .filter_map(|asset| {
                let lexical = lexical_score(&prepared, &asset);
                let vector = vector_scores.get(&asset.id).copied();
                let score = combined_score(
                    &self.config,
                    lexical,
                    vector,
                    has_vector_scores,
                    asset.created_at,
                    now,
                );
                if !prepared.is_empty() && score < threshold {
                    return None;
                }
                Some((score, asset))
            })
            .collect();

        scored.sort_by(|(sa, a), (sb, b)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(limit as usize);

        let urls = self.presign_all(&scored).await;
        let results: Vec<ScoredAsset> = scored
            .into_iter()
            .zip(urls)
            .map(|((score, asset), url)| self.to_result(asset, score, url))
            .collect();

        debug!(
            query_len = prepared.normalized.chars().count(),
            results = results.len(),
            vector = ?vector_state.state(),
            "search complete"
        );

        Ok(SearchOutcome {
            results,
            vector_signal: vector_state,
        })
    }

    /// Similarity per asset id from the nearest-neighbour query.
    async fn vector_scores(&self, query: &PreparedQuery) -> Signal<HashMap<String, f64>> {
        if query.is_empty() {
            return Signal::Absent;
        }

        let vector = match embed_signal(self.embedder.as_ref(), &query.raw).await {
            Signal::Present(v) => v,
            Signal::Absent => return Signal::Absent,
            Signal::Errored(msg) => {
                warn!(error = %msg, "query embedding failed, ranking lexically");
                return Signal::Errored(msg);
            }
        };

        let budget = Duration::from_secs(self.config.vector_timeout_secs);
        let nearest = self
            .store
            .nearest_assets(&vector, self.config.vector_candidates);
        match tokio::time::timeout(budget, nearest).await {
            Ok(Ok(neighbors)) if neighbors.is_empty() => Signal::Absent,
            Ok(Ok(neighbors)) => Signal::Present(
                neighbors
                    .into_iter()
                    .map(|n| (n.asset_id, (1.0 - n.distance).max(0.0)))
                    .collect(),
            ),
            Ok(Err(e)) => {
                warn!(error = %format!("{:#}", e), "vector query failed, ranking lexically");
                Signal::Errored(format!("{:#}", e))
            }
            Err(_) => {
                warn!(
                    timeout_secs = budget.as_secs(),
                    "vector query timed out, ranking lexically"
                );
                Signal::Errored("vector query timed out".to_string())
            }
        }
    }

    /// One best-effort URL per ranked asset, in rank order.
    async fn presign_all(&self, scored: &[(f64, Asset)]) -> Vec<String> {
        let mut urls = vec![String::new(); scored.len()];
        let mut set = JoinSet::new();
        for (i, (_, asset)) in scored.iter().enumerate() {
            let objects = Arc::clone(&self.objects);
            let bucket = asset.bucket.clone();
            let key = asset.object_key.clone();
            let (ttl, timeout) = (self.presign_ttl, self.presign_timeout);
            set.spawn(async move {
                let url = presign_or_empty(objects.as_ref(), &bucket, &key, ttl, timeout).await;
                (i, url)
            });
        }
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((i, url)) => urls[i] = url,
                Err(e) => debug!(error = %e, "presign task failed"),
            }
        }
        urls
    }

    fn to_result(&self, asset: Asset, score: f64, url: String) -> ScoredAsset {
        let content_preview = asset
            .content_text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| text::truncate_preview(t, self.config.preview_chars))
            .unwrap_or_default();
        ScoredAsset {
            file_name: asset.file_name().to_string(),
            caption: asset.caption.filter(|c| !c.trim().is_empty()),
            id: asset.id,
            mime_type: asset.mime_type,
            size_bytes: asset.size_bytes,
            content_preview,
            processing_status: asset.status,
            score,
            url,
            created_at: asset.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AssetStatus;
    use chrono::Duration as ChronoDuration;

    fn asset(id: &str, key: &str, caption: Option<&str>, text: Option<&str>) -> Asset {
        let now = Utc::now();
        Asset {
            id: id.to_string(),
            bucket: "b".to_string(),
            object_key: key.to_string(),
            mime_type: "application/pdf".to_string(),
            size_bytes: 1,
            caption: caption.map(str::to_string),
            content_text: text.map(str::to_string),
            metadata: serde_json::json!({}),
            status: AssetStatus::Completed,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn test_lexical_full_hit() {
        let q = PreparedQuery::new("Invoice");
        let a = asset("1", "1/invoice_2024.pdf", Some("March invoice"), None);
        // 2 (combined) + 1 (caption) + 1 (coverage) = 4, capped at 1
        assert_eq!(lexical_score(&q, &a), 1.0);
    }

    #[test]
    fn test_lexical_partial_coverage_only() {
        let q = PreparedQuery::new("xyz");
        let a = asset("1", "1/x.bin", None, None);
        // only 'x' of {x,y,z} present
        let expected = (1.0 / 3.0) / 3.0;
        assert!((lexical_score(&q, &a) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_lexical_empty_query_constant() {
        let q = PreparedQuery::new("   \n ");
        let a = asset("1", "1/anything.pdf", Some("cap"), Some("body"));
        assert!((lexical_score(&q, &a) - EMPTY_QUERY_LEXICAL / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_combined_without_vector_is_lexical() {
        let cfg = RetrievalConfig::default();
        let now = Utc::now();
        assert_eq!(combined_score(&cfg, 0.5, None, false, now, now), 0.5);
    }

    #[test]
    fn test_combined_with_vector_weights() {
        let cfg = RetrievalConfig::default();
        let now = Utc::now();
        let s = combined_score(&cfg, 1.0, Some(0.5), true, now, now);
        assert_eq!(s, 0.65);
        // candidate missing from the nearest set gets zero vector score
        let s = combined_score(&cfg, 1.0, None, true, now, now);
        assert_eq!(s, 0.3);
    }

    #[test]
    fn test_combined_recency_and_bounds() {
        let cfg = RetrievalConfig::default();
        let now = Utc::now();
        let ten_hours_ago = now - ChronoDuration::hours(10);
        assert_eq!(combined_score(&cfg, 0.5, None, false, ten_hours_ago, now), 0.49);

        let ancient = now - ChronoDuration::days(3650);
        assert_eq!(combined_score(&cfg, 1.0, None, false, ancient, now), 0.0);

        let future = now + ChronoDuration::hours(5);
        assert_eq!(combined_score(&cfg, 1.0, Some(1.0), true, future, now), 1.0);
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(0, 20, 100), 20);
        assert_eq!(clamp_limit(-3, 20, 100), 20);
        assert_eq!(clamp_limit(7, 20, 100), 7);
        assert_eq!(clamp_limit(1000, 20, 100), 100);
    }
}
