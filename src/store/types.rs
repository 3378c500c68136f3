//! Persisted bridge records and audit entries

use crate::bridge::BridgeKind;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Rolling metrics of a dynamically scored bridge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicMetrics {
    /// Wins over the trailing evaluation window
    pub wins_in_window: Option<u32>,
    /// Win percentage over the trailing window
    pub win_rate_in_window: Option<Decimal>,
    pub current_streak: Option<i32>,
    /// Ranking score in `[0, 10]`
    pub score: Option<Decimal>,
}

/// Managed bridge as kept by the external store
///
/// `window_rate` is the authoritative fixed-window rate; only a re-baseline
/// writes it. `scan_rate` holds the latest ad-hoc scan and is overwritten
/// freely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedBridgeRecord {
    pub name: String,
    pub kind: BridgeKind,
    pub window_rate: Option<String>,
    pub scan_rate: Option<String>,
    pub max_lose_streak: Option<u32>,
    /// Wins in the short recent-form window; also the legacy visibility metric
    pub recent_win_count: Option<u32>,
    pub metrics: DynamicMetrics,
    pub auto_enabled: bool,
    /// Forced visibility, when a manual override is set
    pub manual_override: Option<bool>,
    pub last_evaluated: Option<DateTime<Utc>>,
}

impl ManagedBridgeRecord {
    pub fn new(name: impl Into<String>, kind: BridgeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            window_rate: None,
            scan_rate: None,
            max_lose_streak: None,
            recent_win_count: None,
            metrics: DynamicMetrics::default(),
            auto_enabled: false,
            manual_override: None,
            last_evaluated: None,
        }
    }
}

/// One row of a routine refresh or re-baseline batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateUpdate {
    pub name: String,
    pub win_rate_text: String,
    pub max_lose_streak: u32,
    pub recent_win_count: u32,
}

/// Rate field targeted by a rate batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateField {
    /// Latest ad-hoc scan, overwritten by every routine refresh
    Scan,
    /// Authoritative fixed-window rate, written only by a re-baseline
    Window,
}

/// Dynamic metrics and auto flag written after an evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsUpdate {
    pub name: String,
    pub kind: BridgeKind,
    pub metrics: DynamicMetrics,
    pub auto_enabled: bool,
    pub evaluated_at: DateTime<Utc>,
}

impl MetricsUpdate {
    pub fn from_record(record: &ManagedBridgeRecord, evaluated_at: DateTime<Utc>) -> Self {
        Self {
            name: record.name.clone(),
            kind: record.kind,
            metrics: record.metrics.clone(),
            auto_enabled: record.auto_enabled,
            evaluated_at,
        }
    }
}

/// Audited field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditField {
    AutoEnabled,
    ManualOverride,
}

impl AuditField {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditField::AutoEnabled => "auto_enabled",
            AuditField::ManualOverride => "manual_override",
        }
    }
}

/// Append-only record of a visibility flag change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub bridge_name: String,
    pub field: AuditField,
    pub old_value: String,
    pub new_value: String,
    pub reason: String,
    pub actor: String,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        bridge_name: impl Into<String>,
        field: AuditField,
        old_value: impl Into<String>,
        new_value: impl Into<String>,
        reason: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            bridge_name: bridge_name.into(),
            field,
            old_value: old_value.into(),
            new_value: new_value.into(),
            reason: reason.into(),
            actor: actor.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// Text form of an optional override, as written to the audit log
pub fn override_text(value: Option<bool>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "none".to_string(),
    }
}
