//! SQLite-backed store

use super::{
    AuditEntry, AuditField, BridgeStore, DynamicMetrics, ManagedBridgeRecord, MetricsUpdate,
    RateField, RateUpdate, StoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS managed_bridges (
    name TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    window_rate TEXT,
    scan_rate TEXT,
    max_lose_streak INTEGER,
    recent_win_count INTEGER,
    wins_in_window INTEGER,
    win_rate_in_window TEXT,
    current_streak INTEGER,
    score TEXT,
    auto_enabled INTEGER NOT NULL DEFAULT 0,
    manual_override INTEGER NOT NULL DEFAULT 0,
    manual_override_value INTEGER NOT NULL DEFAULT 0,
    last_evaluated TEXT
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS bridge_audit (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    bridge_name TEXT NOT NULL,
    field TEXT NOT NULL,
    old_value TEXT NOT NULL,
    new_value TEXT NOT NULL,
    reason TEXT NOT NULL,
    actor TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_bridge_audit_name
    ON bridge_audit(bridge_name, seq);
"#;

const SELECT_RECORD: &str = "SELECT name, kind, window_rate, scan_rate, max_lose_streak,
        recent_win_count, wins_in_window, win_rate_in_window, current_streak, score,
        auto_enabled, manual_override, manual_override_value, last_evaluated
     FROM managed_bridges";

const INSERT_AUDIT: &str = "INSERT INTO bridge_audit
     (id, bridge_name, field, old_value, new_value, reason, actor, recorded_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

/// Managed bridge store in a SQLite file
pub struct SqliteBridgeStore {
    conn: Arc<Mutex<Connection>>,
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

/// Undecodable stored values are corruption, not driver failures
fn decode_error(err: rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::FromSqlConversionFailure(idx, _, e) => {
            StoreError::Corrupt(format!("column {}: {}", idx, e))
        }
        rusqlite::Error::InvalidColumnType(idx, name, ty) => {
            StoreError::Corrupt(format!("column {} ({}) holds {}", idx, name, ty))
        }
        other => StoreError::Sqlite(other),
    }
}

fn rate_column(field: RateField) -> &'static str {
    match field {
        RateField::Scan => "scan_rate",
        RateField::Window => "window_rate",
    }
}

fn parse_decimal(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    row.get::<_, Option<String>>(idx)?
        .map(|s| Decimal::from_str(&s).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn parse_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<String>>(idx)?
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| conversion_error(idx, e))
        })
        .transpose()
}

fn audit_field(s: &str) -> Option<AuditField> {
    match s {
        "auto_enabled" => Some(AuditField::AutoEnabled),
        "manual_override" => Some(AuditField::ManualOverride),
        _ => None,
    }
}

impl SqliteBridgeStore {
    /// Open (or create) a store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        Self::init(conn, &path.as_ref().display().to_string())
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, ":memory:")
    }

    fn init(conn: Connection, location: &str) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA_SQL)?;

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM managed_bridges", [], |row| row.get(0))
            .unwrap_or(0);
        tracing::info!(location, bridges = count, "Bridge store opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ManagedBridgeRecord> {
        let kind: String = row.get(1)?;
        let has_override: bool = row.get(11)?;
        let override_value: bool = row.get(12)?;

        Ok(ManagedBridgeRecord {
            name: row.get(0)?,
            kind: kind.parse().map_err(|e| conversion_error(1, e))?,
            window_rate: row.get(2)?,
            scan_rate: row.get(3)?,
            max_lose_streak: row.get(4)?,
            recent_win_count: row.get(5)?,
            metrics: DynamicMetrics {
                wins_in_window: row.get(6)?,
                win_rate_in_window: parse_decimal(row, 7)?,
                current_streak: row.get(8)?,
                score: parse_decimal(row, 9)?,
            },
            auto_enabled: row.get(10)?,
            manual_override: has_override.then_some(override_value),
            last_evaluated: parse_time(row, 13)?,
        })
    }

    fn row_to_audit(row: &Row<'_>) -> rusqlite::Result<AuditEntry> {
        let id: String = row.get(0)?;
        let field: String = row.get(2)?;
        let recorded_at: String = row.get(7)?;

        Ok(AuditEntry {
            id: Uuid::parse_str(&id).map_err(|e| conversion_error(0, e))?,
            bridge_name: row.get(1)?,
            field: audit_field(&field).ok_or_else(|| {
                conversion_error(2, std::io::Error::other(format!("unknown field {}", field)))
            })?,
            old_value: row.get(3)?,
            new_value: row.get(4)?,
            reason: row.get(5)?,
            actor: row.get(6)?,
            recorded_at: DateTime::parse_from_rfc3339(&recorded_at)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| conversion_error(7, e))?,
        })
    }

    fn insert_audit(conn: &Connection, entry: &AuditEntry) -> rusqlite::Result<usize> {
        conn.execute(
            INSERT_AUDIT,
            params![
                entry.id.to_string(),
                &entry.bridge_name,
                entry.field.as_str(),
                &entry.old_value,
                &entry.new_value,
                &entry.reason,
                &entry.actor,
                entry.recorded_at.to_rfc3339(),
            ],
        )
    }

    fn insert_missing(
        tx: &rusqlite::Transaction<'_>,
        records: &[ManagedBridgeRecord],
    ) -> rusqlite::Result<usize> {
        let mut stmt = tx.prepare_cached(
            "INSERT OR IGNORE INTO managed_bridges (name, kind) VALUES (?1, ?2)",
        )?;
        let mut inserted = 0;
        for record in records {
            inserted += stmt.execute(params![&record.name, record.kind.as_str()])?;
        }
        Ok(inserted)
    }
}

#[async_trait]
impl BridgeStore for SqliteBridgeStore {
    async fn register(&self, records: &[ManagedBridgeRecord]) -> Result<usize, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let inserted = Self::insert_missing(&tx, records)?;
        tx.commit()?;
        Ok(inserted)
    }

    async fn records(&self) -> Result<Vec<ManagedBridgeRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!("{} ORDER BY name", SELECT_RECORD))?;
        let records = stmt
            .query_map([], Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(decode_error)?;
        Ok(records)
    }

    async fn record(&self, name: &str) -> Result<Option<ManagedBridgeRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!("{} WHERE name = ?1", SELECT_RECORD))?;
        stmt.query_row([name], Self::row_to_record)
            .optional()
            .map_err(decode_error)
    }

    async fn commit_rates(
        &self,
        register: &[ManagedBridgeRecord],
        field: RateField,
        batch: &[RateUpdate],
    ) -> Result<usize, StoreError> {
        if register.is_empty() && batch.is_empty() {
            return Ok(0);
        }

        let column = rate_column(field);
        let sql = format!(
            "UPDATE managed_bridges
             SET {} = ?1, max_lose_streak = ?2, recent_win_count = ?3
             WHERE name = ?4",
            column
        );

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let inserted = Self::insert_missing(&tx, register)?;
        let mut updated = 0;
        {
            let mut stmt = tx.prepare_cached(&sql)?;
            for update in batch {
                updated += stmt.execute(params![
                    &update.win_rate_text,
                    update.max_lose_streak,
                    update.recent_win_count,
                    &update.name,
                ])?;
            }
        }
        tx.commit()?;

        tracing::debug!(column, inserted, updated, "Rate batch committed");
        Ok(updated)
    }

    async fn commit_evaluation(
        &self,
        updates: &[MetricsUpdate],
        audit: &[AuditEntry],
    ) -> Result<usize, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO managed_bridges
                    (name, kind, wins_in_window, win_rate_in_window, current_streak, score,
                     auto_enabled, last_evaluated)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(name) DO UPDATE SET
                    wins_in_window = excluded.wins_in_window,
                    win_rate_in_window = excluded.win_rate_in_window,
                    current_streak = excluded.current_streak,
                    score = excluded.score,
                    auto_enabled = excluded.auto_enabled,
                    last_evaluated = excluded.last_evaluated",
            )?;
            for update in updates {
                stmt.execute(params![
                    &update.name,
                    update.kind.as_str(),
                    update.metrics.wins_in_window,
                    update.metrics.win_rate_in_window.map(|d| d.to_string()),
                    update.metrics.current_streak,
                    update.metrics.score.map(|d| d.to_string()),
                    update.auto_enabled,
                    update.evaluated_at.to_rfc3339(),
                ])?;
            }
        }
        for entry in audit {
            Self::insert_audit(&tx, entry)?;
        }
        tx.commit()?;
        Ok(updates.len())
    }

    async fn set_manual_override(
        &self,
        name: &str,
        value: Option<bool>,
        audit: &AuditEntry,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE managed_bridges
             SET manual_override = ?1, manual_override_value = ?2
             WHERE name = ?3",
            params![value.is_some(), value.unwrap_or(false), name],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(name.to_string()));
        }
        Self::insert_audit(&tx, audit)?;
        tx.commit()?;
        Ok(())
    }

    async fn audit_log(&self, name: Option<&str>) -> Result<Vec<AuditEntry>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, bridge_name, field, old_value, new_value, reason, actor, recorded_at
             FROM bridge_audit
             WHERE ?1 IS NULL OR bridge_name = ?1
             ORDER BY seq",
        )?;
        let entries = stmt
            .query_map([name], Self::row_to_audit)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(decode_error)?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::BridgeKind;
    use rust_decimal_macros::dec;

    fn update(name: &str, rate: &str) -> RateUpdate {
        RateUpdate {
            name: name.to_string(),
            win_rate_text: rate.to_string(),
            max_lose_streak: 4,
            recent_win_count: 6,
        }
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let store = SqliteBridgeStore::open_in_memory().unwrap();
        let records = vec![
            ManagedBridgeRecord::new("a", BridgeKind::PositionMemory),
            ManagedBridgeRecord::new("b", BridgeKind::DynamicScored),
        ];
        assert_eq!(store.register(&records).await.unwrap(), 2);
        assert_eq!(store.register(&records).await.unwrap(), 0);

        let stored = store.records().await.unwrap();
        assert_eq!(stored, records);
    }

    #[tokio::test]
    async fn test_routine_refresh_keeps_window_rate() {
        let store = SqliteBridgeStore::open_in_memory().unwrap();
        store
            .register(&[ManagedBridgeRecord::new("a", BridgeKind::PositionMemory)])
            .await
            .unwrap();
        store.rebaseline(&[update("a", "90.00% (27/30)")]).await.unwrap();

        let updated = store
            .routine_refresh(&[update("a", "10.00% (1/10)"), update("ghost", "1")])
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let record = store.record("a").await.unwrap().unwrap();
        assert_eq!(record.window_rate.as_deref(), Some("90.00% (27/30)"));
        assert_eq!(record.scan_rate.as_deref(), Some("10.00% (1/10)"));
        assert_eq!(record.max_lose_streak, Some(4));
        assert_eq!(record.recent_win_count, Some(6));
    }

    #[tokio::test]
    async fn test_commit_rates_registers_and_writes_together() {
        let store = SqliteBridgeStore::open_in_memory().unwrap();
        let written = store
            .commit_rates(
                &[ManagedBridgeRecord::new("fresh", BridgeKind::CustomDualPosition)],
                RateField::Scan,
                &[update("fresh", "40.00% (4/10)")],
            )
            .await
            .unwrap();
        assert_eq!(written, 1);

        let record = store.record("fresh").await.unwrap().unwrap();
        assert_eq!(record.kind, BridgeKind::CustomDualPosition);
        assert_eq!(record.scan_rate.as_deref(), Some("40.00% (4/10)"));
        assert!(record.window_rate.is_none());
    }

    #[tokio::test]
    async fn test_failed_rate_write_rolls_back_registration() {
        let store = SqliteBridgeStore::open_in_memory().unwrap();
        store
            .conn
            .lock()
            .execute_batch(
                "CREATE TRIGGER reject_boom BEFORE UPDATE ON managed_bridges
                 WHEN NEW.name = 'boom'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let result = store
            .commit_rates(
                &[
                    ManagedBridgeRecord::new("fresh", BridgeKind::PositionMemory),
                    ManagedBridgeRecord::new("boom", BridgeKind::PositionMemory),
                ],
                RateField::Scan,
                &[update("fresh", "50.00% (1/2)"), update("boom", "0.00% (0/2)")],
            )
            .await;
        assert!(result.is_err());
        assert!(store.records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_row_is_corrupt() {
        let store = SqliteBridgeStore::open_in_memory().unwrap();
        store
            .conn
            .lock()
            .execute(
                "INSERT INTO managed_bridges (name, kind, score) VALUES ('bad', 'dynamic_scored', 'high')",
                [],
            )
            .unwrap();

        assert!(matches!(store.record("bad").await, Err(StoreError::Corrupt(_))));
        assert!(matches!(store.records().await, Err(StoreError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_commit_evaluation_round_trips_metrics_and_audit() {
        let store = SqliteBridgeStore::open_in_memory().unwrap();
        let now = Utc::now();
        let update = MetricsUpdate {
            name: "dyn".to_string(),
            kind: BridgeKind::DynamicScored,
            metrics: DynamicMetrics {
                wins_in_window: Some(28),
                win_rate_in_window: Some(dec!(93.33)),
                current_streak: Some(-2),
                score: Some(dec!(9.33)),
            },
            auto_enabled: true,
            evaluated_at: now,
        };
        let entry = AuditEntry::new("dyn", AuditField::AutoEnabled, "false", "true", "why", "me");

        store.commit_evaluation(&[update.clone()], &[entry.clone()]).await.unwrap();

        let record = store.record("dyn").await.unwrap().unwrap();
        assert_eq!(record.metrics, update.metrics);
        assert!(record.auto_enabled);
        assert_eq!(
            record.last_evaluated.map(|t| t.timestamp_millis()),
            Some(now.timestamp_millis())
        );

        let log = store.audit_log(Some("dyn")).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].id, entry.id);
        assert_eq!(log[0].field, AuditField::AutoEnabled);
        assert!(store.audit_log(Some("other")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_manual_override() {
        let store = SqliteBridgeStore::open_in_memory().unwrap();
        store
            .register(&[ManagedBridgeRecord::new("a", BridgeKind::DynamicScored)])
            .await
            .unwrap();

        let entry = AuditEntry::new("a", AuditField::ManualOverride, "none", "false", "", "me");
        store.set_manual_override("a", Some(false), &entry).await.unwrap();
        let record = store.record("a").await.unwrap().unwrap();
        assert_eq!(record.manual_override, Some(false));

        let missing = store.set_manual_override("zzz", Some(true), &entry).await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
        assert_eq!(store.audit_log(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_open_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridges.db");
        {
            let store = SqliteBridgeStore::open(&path).unwrap();
            store
                .register(&[ManagedBridgeRecord::new("a", BridgeKind::Algorithmic)])
                .await
                .unwrap();
        }
        let store = SqliteBridgeStore::open(&path).unwrap();
        assert_eq!(store.records().await.unwrap().len(), 1);
    }
}
