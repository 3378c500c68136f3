//! Store access with retry and a short-lived read cache
//!
//! Retries apply to transient store failures only, with doubling backoff.
//! The record cache is dropped on every write.

use super::{
    AuditEntry, AuditField, BridgeStore, ManagedBridgeRecord, MetricsUpdate, RateField,
    RateUpdate, StoreError,
};
use crate::store::override_text;
use crate::telemetry::{increment_counter, CounterMetric};
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

/// Call-site wrapper around a [`BridgeStore`]
pub struct StoreGateway {
    store: Arc<dyn BridgeStore>,
    retry: RetryPolicy,
    cache_ttl: Duration,
    cache: RwLock<Option<(Instant, Vec<ManagedBridgeRecord>)>>,
}

impl StoreGateway {
    pub fn new(store: Arc<dyn BridgeStore>, retry: RetryPolicy, cache_ttl: Duration) -> Self {
        Self {
            store,
            retry,
            cache_ttl,
            cache: RwLock::new(None),
        }
    }

    pub fn store(&self) -> &Arc<dyn BridgeStore> {
        &self.store
    }

    async fn with_retry<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 1;
        let mut delay = self.retry.initial_backoff;

        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    tracing::warn!(op, attempt, error = %e, "Store call failed, retrying");
                    increment_counter(CounterMetric::StoreRetries, 1);
                    sleep(delay).await;
                    delay = (delay * 2).min(self.retry.max_backoff);
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(op, attempt, error = %e, "Store call failed");
                    return Err(e);
                }
            }
        }
    }

    fn invalidate(&self) {
        *self.cache.write() = None;
    }

    /// All records, served from cache while fresh
    pub async fn records(&self) -> Result<Vec<ManagedBridgeRecord>, StoreError> {
        let cached = self
            .cache
            .read()
            .as_ref()
            .filter(|(loaded, _)| loaded.elapsed() < self.cache_ttl)
            .map(|(_, records)| records.clone());
        if let Some(records) = cached {
            return Ok(records);
        }

        let records = self.with_retry("records", || self.store.records()).await?;
        *self.cache.write() = Some((Instant::now(), records.clone()));
        Ok(records)
    }

    pub async fn record(&self, name: &str) -> Result<Option<ManagedBridgeRecord>, StoreError> {
        self.with_retry("record", || self.store.record(name)).await
    }

    pub async fn register(&self, records: &[ManagedBridgeRecord]) -> Result<usize, StoreError> {
        let result = self.with_retry("register", || self.store.register(records)).await;
        self.invalidate();
        result
    }

    /// Register missing bridges and write a rate batch as one commit
    pub async fn commit_rates(
        &self,
        register: &[ManagedBridgeRecord],
        field: RateField,
        batch: &[RateUpdate],
    ) -> Result<usize, StoreError> {
        let result = self
            .with_retry("commit_rates", || {
                self.store.commit_rates(register, field, batch)
            })
            .await;
        self.invalidate();
        result
    }

    pub async fn routine_refresh(&self, batch: &[RateUpdate]) -> Result<usize, StoreError> {
        self.commit_rates(&[], RateField::Scan, batch).await
    }

    pub async fn rebaseline(&self, batch: &[RateUpdate]) -> Result<usize, StoreError> {
        self.commit_rates(&[], RateField::Window, batch).await
    }

    pub async fn commit_evaluation(
        &self,
        updates: &[MetricsUpdate],
        audit: &[AuditEntry],
    ) -> Result<usize, StoreError> {
        let result = self
            .with_retry("commit_evaluation", || {
                self.store.commit_evaluation(updates, audit)
            })
            .await;
        self.invalidate();
        result
    }

    /// Set or clear a manual override, writing an audit entry for the change
    pub async fn set_manual_override(
        &self,
        name: &str,
        value: Option<bool>,
        reason: &str,
        actor: &str,
    ) -> Result<Option<AuditEntry>, StoreError> {
        let current = self
            .record(name)
            .await?
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        if current.manual_override == value {
            return Ok(None);
        }

        let entry = AuditEntry::new(
            name,
            AuditField::ManualOverride,
            override_text(current.manual_override),
            override_text(value),
            reason,
            actor,
        );
        let result = self
            .with_retry("set_manual_override", || {
                self.store.set_manual_override(name, value, &entry)
            })
            .await;
        self.invalidate();
        result.map(|_| Some(entry))
    }

    pub async fn audit_log(&self, name: Option<&str>) -> Result<Vec<AuditEntry>, StoreError> {
        self.with_retry("audit_log", || self.store.audit_log(name)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::BridgeKind;
    use crate::store::MemoryBridgeStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` writes with a transient error
    struct FlakyStore {
        inner: MemoryBridgeStore,
        failures: AtomicU32,
        calls: AtomicU32,
    }

    impl FlakyStore {
        fn new(failures: u32) -> Self {
            Self {
                inner: MemoryBridgeStore::with_records([ManagedBridgeRecord::new(
                    "a",
                    BridgeKind::PositionMemory,
                )]),
                failures: AtomicU32::new(failures),
                calls: AtomicU32::new(0),
            }
        }

        fn trip(&self) -> Result<(), StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::Unavailable("busy".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl BridgeStore for FlakyStore {
        async fn register(&self, r: &[ManagedBridgeRecord]) -> Result<usize, StoreError> {
            self.inner.register(r).await
        }
        async fn records(&self) -> Result<Vec<ManagedBridgeRecord>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.records().await
        }
        async fn record(&self, n: &str) -> Result<Option<ManagedBridgeRecord>, StoreError> {
            self.inner.record(n).await
        }
        async fn commit_rates(
            &self,
            r: &[ManagedBridgeRecord],
            f: RateField,
            b: &[RateUpdate],
        ) -> Result<usize, StoreError> {
            self.trip()?;
            self.inner.commit_rates(r, f, b).await
        }
        async fn commit_evaluation(
            &self,
            u: &[MetricsUpdate],
            a: &[AuditEntry],
        ) -> Result<usize, StoreError> {
            self.trip()?;
            self.inner.commit_evaluation(u, a).await
        }
        async fn set_manual_override(
            &self,
            n: &str,
            v: Option<bool>,
            a: &AuditEntry,
        ) -> Result<(), StoreError> {
            self.inner.set_manual_override(n, v, a).await
        }
        async fn audit_log(&self, n: Option<&str>) -> Result<Vec<AuditEntry>, StoreError> {
            self.inner.audit_log(n).await
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }

    fn batch() -> Vec<RateUpdate> {
        vec![RateUpdate {
            name: "a".into(),
            win_rate_text: "50.00% (1/2)".into(),
            max_lose_streak: 1,
            recent_win_count: 1,
        }]
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let store = Arc::new(FlakyStore::new(2));
        let gateway = StoreGateway::new(store.clone(), fast_retry(3), Duration::ZERO);

        assert_eq!(gateway.routine_refresh(&batch()).await.unwrap(), 1);
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_is_bounded() {
        let store = Arc::new(FlakyStore::new(5));
        let gateway = StoreGateway::new(store.clone(), fast_retry(2), Duration::ZERO);

        let err = gateway.routine_refresh(&batch()).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_records_cache_invalidated_by_writes() {
        let store = Arc::new(FlakyStore::new(0));
        let gateway = StoreGateway::new(store.clone(), RetryPolicy::none(), Duration::from_secs(60));

        gateway.records().await.unwrap();
        gateway.records().await.unwrap();
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);

        gateway.routine_refresh(&batch()).await.unwrap();
        let records = gateway.records().await.unwrap();
        assert_eq!(records[0].scan_rate.as_deref(), Some("50.00% (1/2)"));
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_manual_override_is_audited_once() {
        let store = Arc::new(FlakyStore::new(0));
        let gateway = StoreGateway::new(store, RetryPolicy::none(), Duration::ZERO);

        let entry = gateway
            .set_manual_override("a", Some(true), "pinned", "ops")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.old_value, "none");
        assert_eq!(entry.new_value, "true");

        let again = gateway
            .set_manual_override("a", Some(true), "pinned", "ops")
            .await
            .unwrap();
        assert!(again.is_none());
        assert_eq!(gateway.audit_log(Some("a")).await.unwrap().len(), 1);

        assert!(matches!(
            gateway.set_manual_override("nope", None, "", "ops").await,
            Err(StoreError::NotFound(_))
        ));
    }
}
