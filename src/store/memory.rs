//! In-memory store

use super::{
    AuditEntry, BridgeStore, ManagedBridgeRecord, MetricsUpdate, RateField, RateUpdate,
    StoreError,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct State {
    records: BTreeMap<String, ManagedBridgeRecord>,
    audit: Vec<AuditEntry>,
}

/// Store kept in process memory; one lock per batch keeps writes atomic
#[derive(Debug, Default)]
pub struct MemoryBridgeStore {
    state: Mutex<State>,
}

impl MemoryBridgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store preloaded with records
    pub fn with_records(records: impl IntoIterator<Item = ManagedBridgeRecord>) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.lock();
            for record in records {
                state.records.insert(record.name.clone(), record);
            }
        }
        store
    }
}

#[async_trait]
impl BridgeStore for MemoryBridgeStore {
    async fn register(&self, records: &[ManagedBridgeRecord]) -> Result<usize, StoreError> {
        let mut state = self.state.lock();
        let mut inserted = 0;
        for record in records {
            if !state.records.contains_key(&record.name) {
                state.records.insert(record.name.clone(), record.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn records(&self) -> Result<Vec<ManagedBridgeRecord>, StoreError> {
        Ok(self.state.lock().records.values().cloned().collect())
    }

    async fn record(&self, name: &str) -> Result<Option<ManagedBridgeRecord>, StoreError> {
        Ok(self.state.lock().records.get(name).cloned())
    }

    async fn commit_rates(
        &self,
        register: &[ManagedBridgeRecord],
        field: RateField,
        batch: &[RateUpdate],
    ) -> Result<usize, StoreError> {
        let mut state = self.state.lock();
        for record in register {
            state
                .records
                .entry(record.name.clone())
                .or_insert_with(|| record.clone());
        }

        let mut updated = 0;
        for update in batch {
            if let Some(record) = state.records.get_mut(&update.name) {
                let rate = match field {
                    RateField::Scan => &mut record.scan_rate,
                    RateField::Window => &mut record.window_rate,
                };
                *rate = Some(update.win_rate_text.clone());
                record.max_lose_streak = Some(update.max_lose_streak);
                record.recent_win_count = Some(update.recent_win_count);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn commit_evaluation(
        &self,
        updates: &[MetricsUpdate],
        audit: &[AuditEntry],
    ) -> Result<usize, StoreError> {
        let mut state = self.state.lock();
        for update in updates {
            let record = state
                .records
                .entry(update.name.clone())
                .or_insert_with(|| ManagedBridgeRecord::new(&update.name, update.kind));
            record.metrics = update.metrics.clone();
            record.auto_enabled = update.auto_enabled;
            record.last_evaluated = Some(update.evaluated_at);
        }
        state.audit.extend_from_slice(audit);
        Ok(updates.len())
    }

    async fn set_manual_override(
        &self,
        name: &str,
        value: Option<bool>,
        audit: &AuditEntry,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let record = state
            .records
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        record.manual_override = value;
        state.audit.push(audit.clone());
        Ok(())
    }

    async fn audit_log(&self, name: Option<&str>) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self
            .state
            .lock()
            .audit
            .iter()
            .filter(|e| name.map_or(true, |n| e.bridge_name == n))
            .cloned()
            .collect())
    }
}
