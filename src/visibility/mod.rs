//! Visibility evaluation module
//!
//! Decides whether a dynamically scored bridge is shown, using a hysteresis
//! band on its trailing win count so the decision does not flap near the
//! threshold.

mod score;

pub use score::{compute_score, window_rate};

use crate::store::{AuditEntry, AuditField, ManagedBridgeRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Hysteresis thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct VisibilityThresholds {
    /// Wins at or above this enable the bridge
    #[serde(default = "default_enable_threshold")]
    pub enable_threshold: u32,
    /// Wins at or below this disable the bridge
    #[serde(default = "default_disable_threshold")]
    pub disable_threshold: u32,
    /// Trailing evaluation window, in periods
    #[serde(default = "default_window")]
    pub window: u32,
    /// Window of the legacy recent-form count
    #[serde(default = "default_legacy_window")]
    pub legacy_window: u32,
}

fn default_enable_threshold() -> u32 {
    28
}
fn default_disable_threshold() -> u32 {
    26
}
fn default_window() -> u32 {
    30
}
fn default_legacy_window() -> u32 {
    10
}

impl Default for VisibilityThresholds {
    fn default() -> Self {
        Self {
            enable_threshold: default_enable_threshold(),
            disable_threshold: default_disable_threshold(),
            window: default_window(),
            legacy_window: default_legacy_window(),
        }
    }
}

impl VisibilityThresholds {
    /// Scale a legacy recent-form count onto the evaluation window
    ///
    /// Counts that fit the legacy window are scaled up; larger counts are
    /// taken as already measured over the evaluation window.
    pub fn rescale_legacy(&self, legacy: u32) -> u32 {
        if self.legacy_window > 0 && legacy <= self.legacy_window {
            (legacy * self.window + self.legacy_window / 2) / self.legacy_window
        } else {
            legacy.min(self.window)
        }
    }
}

/// Which rule produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    ManualOverride,
    AutoFlag,
    WindowWins,
    LegacyForm,
    NoMetrics,
}

impl DecisionSource {
    /// Decisions derived from metrics drive the stored auto flag
    pub fn is_metric_driven(&self) -> bool {
        matches!(self, DecisionSource::WindowWins | DecisionSource::LegacyForm)
    }
}

/// Visibility decision for one bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisibilityDecision {
    pub visible: bool,
    pub reason: String,
    /// The bridge lacks the metrics for a proper decision
    pub needs_evaluation: bool,
    pub source: DecisionSource,
}

impl VisibilityDecision {
    fn new(visible: bool, reason: String, needs_evaluation: bool, source: DecisionSource) -> Self {
        Self {
            visible,
            reason,
            needs_evaluation,
            source,
        }
    }
}

/// Full precedence: manual override, auto flag, trailing wins, legacy form
pub fn evaluate(record: &ManagedBridgeRecord, thresholds: &VisibilityThresholds) -> VisibilityDecision {
    if let Some(forced) = record.manual_override {
        return manual(forced);
    }
    if record.auto_enabled {
        return VisibilityDecision::new(
            true,
            "auto flag true".to_string(),
            false,
            DecisionSource::AutoFlag,
        );
    }
    from_metrics(record, thresholds)
}

/// Metric-only evaluation used when refreshing the stored auto flag
///
/// Same as [`evaluate`] without the auto-flag shortcut, so the hysteresis
/// band can turn an enabled bridge off again.
pub fn evaluate_metrics(
    record: &ManagedBridgeRecord,
    thresholds: &VisibilityThresholds,
) -> VisibilityDecision {
    if let Some(forced) = record.manual_override {
        return manual(forced);
    }
    from_metrics(record, thresholds)
}

fn manual(forced: bool) -> VisibilityDecision {
    VisibilityDecision::new(
        forced,
        format!("manual override (forced {})", forced),
        false,
        DecisionSource::ManualOverride,
    )
}

fn from_metrics(record: &ManagedBridgeRecord, thresholds: &VisibilityThresholds) -> VisibilityDecision {
    // The stored auto flag stands in for the previous decision
    let previous = record.auto_enabled;

    if let Some(wins) = record.metrics.wins_in_window {
        let (visible, reason) = hysteresis(wins, previous, thresholds);
        return VisibilityDecision::new(
            visible,
            format!("wins {}/{}: {}", wins, thresholds.window, reason),
            false,
            DecisionSource::WindowWins,
        );
    }

    if let Some(legacy) = record.recent_win_count {
        let scaled = thresholds.rescale_legacy(legacy);
        let (visible, reason) = hysteresis(scaled, previous, thresholds);
        return VisibilityDecision::new(
            visible,
            format!(
                "legacy form {} (scaled {}/{}): {}",
                legacy, scaled, thresholds.window, reason
            ),
            true,
            DecisionSource::LegacyForm,
        );
    }

    VisibilityDecision::new(
        false,
        "no metrics available".to_string(),
        true,
        DecisionSource::NoMetrics,
    )
}

fn hysteresis(wins: u32, previous: bool, thresholds: &VisibilityThresholds) -> (bool, String) {
    if wins >= thresholds.enable_threshold {
        (true, format!(">= enable threshold {}", thresholds.enable_threshold))
    } else if wins <= thresholds.disable_threshold {
        (false, format!("<= disable threshold {}", thresholds.disable_threshold))
    } else {
        (
            previous,
            format!(
                "inside hysteresis band ({}, {}), keeping {}",
                thresholds.disable_threshold, thresholds.enable_threshold, previous
            ),
        )
    }
}

/// Apply a decision to a record's auto flag
///
/// Only metric-driven decisions move the flag. Returns the audit entry when
/// the flag actually changed.
pub fn apply_decision(
    record: &mut ManagedBridgeRecord,
    decision: &VisibilityDecision,
    actor: &str,
    now: DateTime<Utc>,
) -> Option<AuditEntry> {
    record.last_evaluated = Some(now);
    if !decision.source.is_metric_driven() || record.auto_enabled == decision.visible {
        return None;
    }

    let old = record.auto_enabled;
    record.auto_enabled = decision.visible;
    tracing::info!(
        bridge = %record.name,
        old,
        new = decision.visible,
        reason = %decision.reason,
        "Auto flag changed"
    );

    let mut entry = AuditEntry::new(
        &record.name,
        AuditField::AutoEnabled,
        old.to_string(),
        decision.visible.to_string(),
        &decision.reason,
        actor,
    );
    entry.recorded_at = now;
    Some(entry)
}
