//! Visibility decisions over a sequence of evaluations

use bridge_backtest::bridge::BridgeKind;
use bridge_backtest::store::{AuditField, ManagedBridgeRecord};
use bridge_backtest::visibility::{
    apply_decision, evaluate, evaluate_metrics, DecisionSource, VisibilityThresholds,
};
use chrono::Utc;

fn dynamic() -> ManagedBridgeRecord {
    ManagedBridgeRecord::new("dyn", BridgeKind::DynamicScored)
}

/// Feed a series of trailing win counts through evaluate + apply
fn replay(wins: &[u32]) -> (Vec<bool>, usize) {
    let thresholds = VisibilityThresholds::default();
    let mut record = dynamic();
    let mut visible = Vec::new();
    let mut audits = 0;

    for &w in wins {
        record.metrics.wins_in_window = Some(w);
        let decision = evaluate_metrics(&record, &thresholds);
        if apply_decision(&mut record, &decision, "test", Utc::now()).is_some() {
            audits += 1;
        }
        visible.push(record.auto_enabled);
    }
    (visible, audits)
}

#[test]
fn test_hysteresis_does_not_flap_inside_band() {
    let (visible, audits) = replay(&[25, 27, 28, 27, 26, 27, 28, 30, 27]);
    assert_eq!(
        visible,
        vec![false, false, true, true, false, false, true, true, true]
    );
    // Enable at 28, disable at 26, enable at 28 again
    assert_eq!(audits, 3);
}

#[test]
fn test_manual_override_beats_everything() {
    let thresholds = VisibilityThresholds::default();
    let mut record = dynamic();
    record.metrics.wins_in_window = Some(30);
    record.auto_enabled = true;
    record.manual_override = Some(false);

    let decision = evaluate(&record, &thresholds);
    assert!(!decision.visible);
    assert_eq!(decision.source, DecisionSource::ManualOverride);
    assert!(apply_decision(&mut record, &decision, "test", Utc::now()).is_none());
    assert!(record.auto_enabled);
}

#[test]
fn test_auto_flag_short_circuits_full_evaluation_only() {
    let thresholds = VisibilityThresholds::default();
    let mut record = dynamic();
    record.auto_enabled = true;
    record.metrics.wins_in_window = Some(10);

    assert_eq!(evaluate(&record, &thresholds).source, DecisionSource::AutoFlag);
    assert!(evaluate(&record, &thresholds).visible);

    let decision = evaluate_metrics(&record, &thresholds);
    assert!(!decision.visible);
    let entry = apply_decision(&mut record, &decision, "refresh", Utc::now()).unwrap();
    assert_eq!(entry.field, AuditField::AutoEnabled);
    assert_eq!((entry.old_value.as_str(), entry.new_value.as_str()), ("true", "false"));
    assert_eq!(entry.actor, "refresh");
}

#[test]
fn test_legacy_form_is_rescaled_and_flagged() {
    let thresholds = VisibilityThresholds::default();
    let mut record = dynamic();
    record.recent_win_count = Some(10);

    let decision = evaluate(&record, &thresholds);
    assert!(decision.visible);
    assert!(decision.needs_evaluation);
    assert_eq!(decision.source, DecisionSource::LegacyForm);

    record.recent_win_count = Some(8);
    let decision = evaluate(&record, &thresholds);
    assert!(!decision.visible);
}

#[test]
fn test_no_metrics_hides_and_requests_evaluation() {
    let decision = evaluate(&dynamic(), &VisibilityThresholds::default());
    assert!(!decision.visible);
    assert!(decision.needs_evaluation);
    assert_eq!(decision.reason, "no metrics available");
}
