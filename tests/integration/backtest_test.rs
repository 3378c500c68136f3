//! End-to-end backtest scenarios

use bridge_backtest::backtest::{
    aggregate, validate_range, BacktestEngine, BacktestMode, BacktestSettings, ParameterError,
};
use bridge_backtest::bridge::{
    Bridge, BridgeError, BridgeKind, BridgeRegistry, PredictionSet,
};
use bridge_backtest::history::{parse_history, DrawRecord, HistoryWindow};
use bridge_backtest::manager::BridgeManager;
use std::sync::Arc;

/// Knows the rule the synthetic draws follow
struct Oracle;

impl Bridge for Oracle {
    fn name(&self) -> &str {
        "oracle"
    }
    fn kind(&self) -> BridgeKind {
        BridgeKind::Algorithmic
    }
    fn predict(&self, window: &HistoryWindow<'_>) -> Result<PredictionSet, BridgeError> {
        let next = window.end_period().ok_or(BridgeError::EmptyWindow)? + 1;
        Ok([loto_of(next)].into_iter().collect())
    }
}

fn loto_of(period: u32) -> String {
    format!("{:02}", (period * 11) % 100)
}

fn draws(n: u32) -> Vec<DrawRecord> {
    (1..=n)
        .map(|p| DrawRecord::new(p, vec![("special", vec![format!("123{}", loto_of(p))])]))
        .collect()
}

fn settings(mode: BacktestMode) -> BacktestSettings {
    BacktestSettings {
        mode,
        ..Default::default()
    }
}

#[test]
fn test_three_period_oracle_scenario() {
    let history = draws(3);
    let range = validate_range(&history, Some("2"), Some("4")).unwrap();
    let bridges: Vec<Arc<dyn Bridge>> = vec![Arc::new(Oracle)];

    let report = BacktestEngine::new(settings(BacktestMode::Single))
        .run(&range, &bridges, None)
        .unwrap();
    let aggregation = aggregate(&report.table);

    let stats = aggregation.get("oracle").unwrap();
    assert_eq!(stats.current_streak, 2);
    assert_eq!(stats.win_rate_text, "100.00% (2/2)");
    assert_eq!(stats.max_lose_streak, 0);
    assert_eq!(stats.recent_win_count, 2);
}

#[test]
fn test_manager_backtest_over_full_history() {
    let history = draws(25);
    let mut registry = BridgeRegistry::standard();
    registry.register(Oracle);

    let (report, aggregation) = BridgeManager::backtest(
        &settings(BacktestMode::Single),
        &history,
        Some("5"),
        Some("20"),
        &registry,
        None,
    )
    .unwrap();

    assert_eq!(report.first_scorable, 6);
    assert_eq!(report.effective_end, 20);
    assert_eq!(aggregation.stats.len(), registry.len());

    let oracle = aggregation.get("oracle").unwrap();
    assert_eq!(oracle.current_streak, 15);
    assert_eq!(oracle.win_rate_text, "100.00% (15/15)");
    assert_eq!(oracle.recent_win_count, 10);
    assert_eq!(oracle.clean_prediction, loto_of(21));
}

#[test]
fn test_two_period_oracle_never_opens_pending() {
    let history = draws(12);
    let mut registry = BridgeRegistry::new();
    registry.register(Oracle);

    let (report, aggregation) = BridgeManager::backtest(
        &settings(BacktestMode::TwoPeriod),
        &history,
        Some("2"),
        Some("12"),
        &registry,
        None,
    )
    .unwrap();

    assert_eq!(report.dangling().count(), 0);
    let pending = &aggregation.pending["oracle"];
    assert!(!pending.awaiting_confirmation);
    assert_eq!(pending.prediction, loto_of(13));
    assert_eq!(aggregation.get("oracle").unwrap().current_streak, 10);
}

#[test]
fn test_invalid_parameters_fail_before_running() {
    let history = draws(10);
    let registry = BridgeRegistry::standard();
    let run = |start: Option<&str>, end: Option<&str>| {
        BridgeManager::backtest(
            &BacktestSettings::default(),
            &history,
            start,
            end,
            &registry,
            None,
        )
    };

    assert!(run(None, Some("5")).is_err());
    assert!(run(Some("1"), Some("5")).is_err());
    assert!(run(Some("6"), Some("5")).is_err());
    assert!(run(Some("abc"), Some("5")).is_err());
    // Only one row left at the end of the history
    assert!(run(Some("10"), Some("50")).is_err());
}

#[test]
fn test_insufficient_data_reports_bounds() {
    let history = draws(1);
    let err = validate_range(&history, Some("2"), Some("9")).unwrap_err();
    assert_eq!(
        err,
        ParameterError::InsufficientData {
            first_scorable: 3,
            effective_end: 2,
        }
    );
}

#[test]
fn test_history_file_round_trip_into_backtest() {
    let json = r#"[
        {"period": 1, "prizes": {"special": ["12311"]}},
        {"period": 2, "prizes": {"special": ["12322"]}},
        {"period": 3, "prizes": {"special": ["12333"]}},
        {"period": 4, "prizes": {"special": ["12344"]}}
    ]"#;
    let history = parse_history(json).unwrap();
    let mut registry = BridgeRegistry::new();
    registry.register(Oracle);

    let (_, aggregation) = BridgeManager::backtest(
        &BacktestSettings::default(),
        &history,
        Some("2"),
        Some("4"),
        &registry,
        None,
    )
    .unwrap();
    assert_eq!(aggregation.get("oracle").unwrap().win_rate_text, "100.00% (2/2)");
}
