//! Bridge persistence module
//!
//! Storage boundary for managed bridge records and the audit log. Every
//! batch write is atomic: either the whole batch lands or none of it does.

mod gateway;
mod memory;
mod sqlite;
mod types;

pub use gateway::{RetryPolicy, StoreGateway};
pub use memory::MemoryBridgeStore;
pub use sqlite::SqliteBridgeStore;
pub use types::{
    override_text, AuditEntry, AuditField, DynamicMetrics, ManagedBridgeRecord, MetricsUpdate,
    RateField, RateUpdate,
};

use async_trait::async_trait;
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite failure
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// No record with this name
    #[error("Unknown bridge: {0}")]
    NotFound(String),
    /// Store temporarily unreachable
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    /// Stored value could not be decoded
    #[error("Corrupt stored value: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Whether a retry may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

/// Trait for managed bridge stores
#[async_trait]
pub trait BridgeStore: Send + Sync {
    /// Insert bridges that are not stored yet; existing records keep their data
    async fn register(&self, records: &[ManagedBridgeRecord]) -> Result<usize, StoreError>;

    /// All records, ordered by name
    async fn records(&self) -> Result<Vec<ManagedBridgeRecord>, StoreError>;

    /// A single record
    async fn record(&self, name: &str) -> Result<Option<ManagedBridgeRecord>, StoreError>;

    /// Register missing bridges and write a rate batch in one commit
    ///
    /// `RateField::Scan` never touches `window_rate`. Rows naming bridges
    /// that are neither stored nor in `register` are skipped. Returns the
    /// number of rate rows written.
    async fn commit_rates(
        &self,
        register: &[ManagedBridgeRecord],
        field: RateField,
        batch: &[RateUpdate],
    ) -> Result<usize, StoreError>;

    /// Write scan results to the ad-hoc fields; never touches `window_rate`
    async fn routine_refresh(&self, batch: &[RateUpdate]) -> Result<usize, StoreError> {
        self.commit_rates(&[], RateField::Scan, batch).await
    }

    /// Overwrite the authoritative fixed-window rate
    async fn rebaseline(&self, batch: &[RateUpdate]) -> Result<usize, StoreError> {
        self.commit_rates(&[], RateField::Window, batch).await
    }

    /// Upsert dynamic metrics and auto flags together with their audit entries
    async fn commit_evaluation(
        &self,
        updates: &[MetricsUpdate],
        audit: &[AuditEntry],
    ) -> Result<usize, StoreError>;

    /// Set or clear a manual override and record the change
    async fn set_manual_override(
        &self,
        name: &str,
        value: Option<bool>,
        audit: &AuditEntry,
    ) -> Result<(), StoreError>;

    /// Audit entries, oldest first, optionally for one bridge
    async fn audit_log(&self, name: Option<&str>) -> Result<Vec<AuditEntry>, StoreError>;
}
