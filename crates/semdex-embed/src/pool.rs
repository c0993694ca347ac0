//! Embedder pool for concurrent embedding operations.
//!
//! [`EmbedderPool`] wraps one [`Embedder`] and is what the pipelines call. It
//! re-batches input to the provider's `max_batch_size`, runs the sub-batches
//! concurrently under a semaphore, applies a per-call timeout and retries
//! transient failures with exponential backoff. The returned vectors are
//! checked against the embedder's declared count and dimensionality.

use futures::future::try_join_all;
use semdex_core::{EmbedError, Embedder, Embedding};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Timeout and retry settings for provider calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub retry_budget: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for computed backoff
    pub max_backoff: Duration,
    /// Per-call timeout
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_budget: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `retry` (0-based).
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.min(16)).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    fn delay_for(&self, retry: u32, err: &EmbedError) -> Duration {
        let backoff = self.backoff(retry);
        match err.retry_after() {
            Some(hint) if hint > backoff => hint,
            _ => backoff,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Purpose {
    Documents,
    Query,
}

/// Pool of embedders with concurrency control.
pub struct EmbedderPool {
    embedder: Arc<dyn Embedder>,
    /// Semaphore to limit concurrent provider calls
    semaphore: Semaphore,
    max_concurrent: usize,
    policy: RetryPolicy,
}

impl EmbedderPool {
    /// Create a new embedder pool.
    pub fn new(embedder: Arc<dyn Embedder>, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            embedder,
            semaphore: Semaphore::new(max_concurrent),
            max_concurrent,
            policy: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Get the embedding dimension.
    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    /// Get the model name.
    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    /// Provider batch limit used for re-batching.
    pub fn max_batch_size(&self) -> usize {
        self.embedder.max_batch_size().max(1)
    }

    /// Get the underlying embedder.
    pub fn embedder(&self) -> Arc<dyn Embedder> {
        Arc::clone(&self.embedder)
    }

    /// Active retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Embed texts, preserving input order.
    pub async fn embed(
        &self,
        texts: &[&str],
        cancel: &CancellationToken,
    ) -> Result<Vec<Embedding>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if cancel.is_cancelled() {
            return Err(EmbedError::Cancelled);
        }

        let batch_size = self.max_batch_size();
        debug!(
            "Embedding {} texts in {} batches of up to {}",
            texts.len(),
            texts.len().div_ceil(batch_size),
            batch_size
        );

        let batches = texts
            .chunks(batch_size)
            .map(|batch| self.embed_with_retry(batch, Purpose::Documents, cancel));
        let results = try_join_all(batches).await?;

        let vectors: Vec<Embedding> = results.into_iter().flatten().collect();
        if vectors.len() != texts.len() {
            return Err(EmbedError::LengthMismatch {
                expected: texts.len(),
                actual: vectors.len(),
            });
        }
        Ok(vectors)
    }

    /// Embed a single query.
    ///
    /// Goes through [`Embedder::embed_query`] so providers can embed queries
    /// differently from documents. Timeout and retry apply as for batches.
    pub async fn embed_query(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Embedding, EmbedError> {
        if cancel.is_cancelled() {
            return Err(EmbedError::Cancelled);
        }
        let mut vectors = self.embed_with_retry(&[query], Purpose::Query, cancel).await?;
        vectors.pop().ok_or(EmbedError::LengthMismatch {
            expected: 1,
            actual: 0,
        })
    }

    async fn embed_with_retry(
        &self,
        batch: &[&str],
        purpose: Purpose,
        cancel: &CancellationToken,
    ) -> Result<Vec<Embedding>, EmbedError> {
        let mut retry = 0u32;
        loop {
            match self.attempt(batch, purpose, cancel).await {
                Ok(vectors) => {
                    self.check_contract(batch.len(), &vectors)?;
                    return Ok(vectors);
                }
                Err(err) if err.is_transient() => {
                    if retry >= self.policy.retry_budget {
                        return Err(EmbedError::RetriesExhausted {
                            attempts: retry + 1,
                            last: Box::new(err),
                        });
                    }
                    let delay = self.policy.delay_for(retry, &err);
                    warn!(
                        "Embedding attempt {} failed, retrying in {:?}: {}",
                        retry + 1,
                        delay,
                        err
                    );
                    tokio::select! {
                        () = cancel.cancelled() => return Err(EmbedError::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                    retry += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn attempt(
        &self,
        batch: &[&str],
        purpose: Purpose,
        cancel: &CancellationToken,
    ) -> Result<Vec<Embedding>, EmbedError> {
        let _permit = tokio::select! {
            () = cancel.cancelled() => return Err(EmbedError::Cancelled),
            permit = self.semaphore.acquire() => permit
                .map_err(|e| EmbedError::Transport(format!("semaphore error: {e}")))?,
        };

        tokio::select! {
            () = cancel.cancelled() => Err(EmbedError::Cancelled),
            result = tokio::time::timeout(self.policy.timeout, self.call(batch, purpose)) => {
                result.unwrap_or(Err(EmbedError::Timeout(self.policy.timeout)))
            }
        }
    }

    async fn call(&self, batch: &[&str], purpose: Purpose) -> Result<Vec<Embedding>, EmbedError> {
        match (purpose, batch) {
            (Purpose::Query, [query]) => self.embedder.embed_query(query).await.map(|v| vec![v]),
            _ => self.embedder.embed_batch(batch).await,
        }
    }

    fn check_contract(&self, expected: usize, vectors: &[Embedding]) -> Result<(), EmbedError> {
        if vectors.len() != expected {
            return Err(EmbedError::LengthMismatch {
                expected,
                actual: vectors.len(),
            });
        }
        let dimension = self.dimension();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(EmbedError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }
        Ok(())
    }

    /// Get pool statistics.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Get max concurrent operations.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

impl std::fmt::Debug for EmbedderPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbedderPool")
            .field("model", &self.model_name())
            .field("dimension", &self.dimension())
            .field("max_concurrent", &self.max_concurrent)
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HashEmbedder;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const TEST_DIM: usize = 8;

    /// Scripted embedder: fails the first `fail_times` calls with the error
    /// produced by `failure`, then returns one vector per input whose first
    /// component encodes the input's numeric value.
    struct ScriptedEmbedder {
        dimension: usize,
        max_batch: usize,
        fail_times: usize,
        failure: fn() -> EmbedError,
        calls: AtomicUsize,
        batch_sizes: Mutex<Vec<usize>>,
        delay: Option<Duration>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        output_dimension: usize,
        drop_last: bool,
    }

    impl ScriptedEmbedder {
        fn new() -> Self {
            Self {
                dimension: TEST_DIM,
                max_batch: 4,
                fail_times: 0,
                failure: || EmbedError::Transport("connection reset".to_string()),
                calls: AtomicUsize::new(0),
                batch_sizes: Mutex::new(Vec::new()),
                delay: None,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                output_dimension: TEST_DIM,
                drop_last: false,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Embedder for ScriptedEmbedder {
        fn model_name(&self) -> &str {
            "scripted"
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn max_batch_size(&self) -> usize {
            self.max_batch
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbedError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.batch_sizes.lock().unwrap().push(texts.len());

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if call < self.fail_times {
                return Err((self.failure)());
            }
            let mut out: Vec<Embedding> = texts
                .iter()
                .map(|text| {
                    let mut v = vec![0.0; self.output_dimension];
                    v[0] = text.parse::<f32>().unwrap_or(-1.0);
                    v
                })
                .collect();
            if self.drop_last {
                out.pop();
            }
            Ok(out)
        }
    }

    fn numbers(n: usize) -> Vec<String> {
        (0..n).map(|i| i.to_string()).collect()
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            retry_budget: 2,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_millis(200));
        assert_eq!(policy.backoff(1), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(1600));
        assert_eq!(policy.backoff(10), Duration::from_secs(5));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn test_retry_after_hint_wins_when_larger() {
        let policy = RetryPolicy::default();
        let hinted = EmbedError::RateLimited {
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(policy.delay_for(0, &hinted), Duration::from_secs(2));

        let small = EmbedError::RateLimited {
            retry_after: Some(Duration::from_millis(1)),
        };
        assert_eq!(policy.delay_for(0, &small), Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_pool_creation() {
        let pool = EmbedderPool::new(Arc::new(HashEmbedder::new(TEST_DIM)), 4);

        assert_eq!(pool.dimension(), TEST_DIM);
        assert_eq!(pool.model_name(), "hash-embedding");
        assert_eq!(pool.max_concurrent(), 4);
        assert_eq!(pool.available_permits(), 4);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let pool = EmbedderPool::new(Arc::new(ScriptedEmbedder::new()), 2);
        let vectors = pool.embed(&[], &CancellationToken::new()).await.unwrap();
        assert!(vectors.is_empty());
    }

    #[tokio::test]
    async fn test_rebatch_preserves_order() {
        let embedder = Arc::new(ScriptedEmbedder::new());
        let pool = EmbedderPool::new(embedder.clone(), 3);
        let inputs = numbers(10);
        let texts: Vec<&str> = inputs.iter().map(String::as_str).collect();

        let vectors = pool.embed(&texts, &CancellationToken::new()).await.unwrap();

        assert_eq!(vectors.len(), 10);
        for (i, v) in vectors.iter().enumerate() {
            assert_eq!(v[0], i as f32);
        }
        let mut sizes = embedder.batch_sizes.lock().unwrap().clone();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![2, 4, 4]);
        assert!(sizes.iter().all(|s| *s <= 4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let mut embedder = ScriptedEmbedder::new();
        embedder.max_batch = 1;
        embedder.delay = Some(Duration::from_millis(50));
        let embedder = Arc::new(embedder);
        let pool = EmbedderPool::new(embedder.clone(), 2);
        let inputs = numbers(6);
        let texts: Vec<&str> = inputs.iter().map(String::as_str).collect();

        pool.embed(&texts, &CancellationToken::new()).await.unwrap();

        assert_eq!(embedder.calls(), 6);
        assert!(embedder.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.available_permits(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let mut embedder = ScriptedEmbedder::new();
        embedder.fail_times = 2;
        let embedder = Arc::new(embedder);
        let pool = EmbedderPool::new(embedder.clone(), 1).with_policy(fast_policy());

        let vectors = pool.embed(&["7"], &CancellationToken::new()).await.unwrap();

        assert_eq!(vectors[0][0], 7.0);
        assert_eq!(embedder.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_exhausted() {
        let mut embedder = ScriptedEmbedder::new();
        embedder.fail_times = usize::MAX;
        embedder.failure = || EmbedError::Provider {
            status: 503,
            message: "unavailable".to_string(),
        };
        let embedder = Arc::new(embedder);
        let pool = EmbedderPool::new(embedder.clone(), 1).with_policy(fast_policy());

        let err = pool.embed(&["1"], &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, EmbedError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(embedder.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let mut embedder = ScriptedEmbedder::new();
        embedder.fail_times = usize::MAX;
        embedder.failure = || EmbedError::Provider {
            status: 400,
            message: "bad request".to_string(),
        };
        let embedder = Arc::new(embedder);
        let pool = EmbedderPool::new(embedder.clone(), 1).with_policy(fast_policy());

        let err = pool.embed(&["1"], &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, EmbedError::Provider { status: 400, .. }));
        assert_eq!(embedder.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_transient_then_exhausted() {
        let mut embedder = ScriptedEmbedder::new();
        embedder.delay = Some(Duration::from_secs(10));
        let embedder = Arc::new(embedder);
        let pool = EmbedderPool::new(embedder.clone(), 1).with_policy(RetryPolicy {
            retry_budget: 1,
            timeout: Duration::from_millis(100),
            ..fast_policy()
        });

        let err = pool.embed(&["1"], &CancellationToken::new()).await.unwrap_err();

        match err {
            EmbedError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 2);
                assert!(matches!(*last, EmbedError::Timeout(_)));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let mut embedder = ScriptedEmbedder::new();
        embedder.fail_times = usize::MAX;
        let embedder = Arc::new(embedder);
        let pool = EmbedderPool::new(embedder.clone(), 1).with_policy(RetryPolicy {
            retry_budget: 10,
            initial_backoff: Duration::from_secs(60),
            max_backoff: Duration::from_secs(60),
            timeout: Duration::from_secs(1),
        });
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let err = pool.embed(&["1"], &cancel).await.unwrap_err();

        assert!(matches!(err, EmbedError::Cancelled));
        assert_eq!(embedder.calls(), 1);
    }

    #[tokio::test]
    async fn test_pre_cancelled() {
        let embedder = Arc::new(ScriptedEmbedder::new());
        let pool = EmbedderPool::new(embedder.clone(), 1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = pool.embed(&["1"], &cancel).await.unwrap_err();

        assert!(matches!(err, EmbedError::Cancelled));
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn test_dimension_contract() {
        let mut embedder = ScriptedEmbedder::new();
        embedder.output_dimension = TEST_DIM + 1;
        let pool = EmbedderPool::new(Arc::new(embedder), 1);

        let err = pool.embed(&["1"], &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(
            err,
            EmbedError::DimensionMismatch {
                expected: TEST_DIM,
                actual: 9
            }
        ));
    }

    #[tokio::test]
    async fn test_length_contract() {
        let mut embedder = ScriptedEmbedder::new();
        embedder.drop_last = true;
        let pool = EmbedderPool::new(Arc::new(embedder), 1);

        let err = pool
            .embed(&["1", "2"], &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            EmbedError::LengthMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_embed_query() {
        let pool = EmbedderPool::new(Arc::new(HashEmbedder::new(TEST_DIM)), 1);
        let vector = pool
            .embed_query("hello world", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(vector, HashEmbedder::new(TEST_DIM).embed_one("hello world"));
    }

    /// Marks query vectors so tests can tell which trait method the pool used.
    struct QueryAwareEmbedder {
        query_calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for QueryAwareEmbedder {
        fn model_name(&self) -> &str {
            "query-aware"
        }

        fn dimension(&self) -> usize {
            TEST_DIM
        }

        fn max_batch_size(&self) -> usize {
            4
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbedError> {
            Ok(texts.iter().map(|_| vec![0.0; TEST_DIM]).collect())
        }

        async fn embed_query(&self, _query: &str) -> Result<Embedding, EmbedError> {
            let call = self.query_calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                return Err(EmbedError::Transport("connection reset".to_string()));
            }
            Ok(vec![1.0; TEST_DIM])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_embed_query_uses_query_method_with_retry() {
        let embedder = Arc::new(QueryAwareEmbedder {
            query_calls: AtomicUsize::new(0),
        });
        let pool = EmbedderPool::new(embedder.clone(), 1).with_policy(fast_policy());
        let cancel = CancellationToken::new();

        let query = pool.embed_query("what is indexed", &cancel).await.unwrap();
        assert_eq!(query, vec![1.0; TEST_DIM]);
        assert_eq!(embedder.query_calls.load(Ordering::SeqCst), 2);

        let documents = pool.embed(&["what is indexed"], &cancel).await.unwrap();
        assert_eq!(documents, vec![vec![0.0; TEST_DIM]]);
        assert_eq!(embedder.query_calls.load(Ordering::SeqCst), 2);
    }
}
