//! Store invariants across the public API

use bridge_backtest::backtest::BacktestSettings;
use bridge_backtest::bridge::{BridgeKind, BridgeRegistry, PositionPairBridge};
use bridge_backtest::history::DrawRecord;
use bridge_backtest::manager::{BridgeManager, RateWrite};
use bridge_backtest::store::{
    AuditEntry, AuditField, BridgeStore, DynamicMetrics, ManagedBridgeRecord, MetricsUpdate,
    RateUpdate, RetryPolicy, SqliteBridgeStore, StoreGateway,
};
use bridge_backtest::visibility::VisibilityThresholds;
use chrono::Utc;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn update(name: &str, text: &str) -> RateUpdate {
    RateUpdate {
        name: name.to_string(),
        win_rate_text: text.to_string(),
        max_lose_streak: 2,
        recent_win_count: 6,
    }
}

fn history(n: u32) -> Arc<[DrawRecord]> {
    (1..=n)
        .map(|p| DrawRecord::new(p, vec![("special", vec![format!("{:05}", p * 37)])]))
        .collect()
}

#[tokio::test]
async fn test_routine_refresh_keeps_fixed_window_rate() {
    let dir = TempDir::new().unwrap();
    let store = SqliteBridgeStore::open(dir.path().join("bridges.db")).unwrap();
    store
        .register(&[ManagedBridgeRecord::new("p", BridgeKind::PositionMemory)])
        .await
        .unwrap();
    store.rebaseline(&[update("p", "71.43% (5/7)")]).await.unwrap();
    let before = store.record("p").await.unwrap().unwrap().window_rate;

    store
        .routine_refresh(&[update("p", "12.50% (1/8)")])
        .await
        .unwrap();

    let after = store.record("p").await.unwrap().unwrap();
    assert_eq!(after.window_rate, before);
    assert_eq!(after.window_rate.as_deref(), Some("71.43% (5/7)"));
    assert_eq!(after.scan_rate.as_deref(), Some("12.50% (1/8)"));
}

#[tokio::test]
async fn test_scan_after_rebaseline_only_moves_scan_rate() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteBridgeStore::open(dir.path().join("bridges.db")).unwrap());
    let manager = BridgeManager::new(
        BacktestSettings::default(),
        VisibilityThresholds::default(),
        StoreGateway::new(store.clone(), RetryPolicy::none(), Duration::ZERO),
    );
    let mut registry = BridgeRegistry::new();
    registry.register(PositionPairBridge::new("p", 2, 4));

    manager
        .rebaseline(history(40), Some("2".into()), Some("20".into()), &registry)
        .await
        .unwrap();
    let baseline = store.record("p").await.unwrap().unwrap().window_rate;
    assert!(baseline.is_some());

    let outcome = manager
        .scan(
            history(40),
            Some("21".into()),
            Some("40".into()),
            &registry,
            RateWrite::Routine,
            None,
        )
        .await
        .unwrap();
    assert_eq!(outcome.persisted, Some(1));

    let record = store.record("p").await.unwrap().unwrap();
    assert_eq!(record.window_rate, baseline);
    assert_eq!(
        record.scan_rate.as_deref(),
        Some(outcome.aggregation.stats[0].win_rate_text.as_str())
    );
}

#[tokio::test]
async fn test_unknown_names_are_skipped() {
    let store = SqliteBridgeStore::open_in_memory().unwrap();
    store
        .register(&[ManagedBridgeRecord::new("p", BridgeKind::PositionMemory)])
        .await
        .unwrap();

    let written = store
        .routine_refresh(&[update("p", "50.00% (1/2)"), update("ghost", "0.00% (0/2)")])
        .await
        .unwrap();
    assert_eq!(written, 1);
    assert!(store.record("ghost").await.unwrap().is_none());
}

#[tokio::test]
async fn test_evaluation_and_audit_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bridges.db");
    let now = Utc::now();

    {
        let store = SqliteBridgeStore::open(&path).unwrap();
        let update = MetricsUpdate {
            name: "dyn".to_string(),
            kind: BridgeKind::DynamicScored,
            metrics: DynamicMetrics {
                wins_in_window: Some(28),
                win_rate_in_window: Some(dec!(93.33)),
                current_streak: Some(-1),
                score: Some(dec!(9.33)),
            },
            auto_enabled: true,
            evaluated_at: now,
        };
        let audit = AuditEntry::new(
            "dyn",
            AuditField::AutoEnabled,
            "false",
            "true",
            "wins 28/30",
            "scheduler",
        );
        store.commit_evaluation(&[update], &[audit]).await.unwrap();
    }

    let store = SqliteBridgeStore::open(&path).unwrap();
    let record = store.record("dyn").await.unwrap().unwrap();
    assert!(record.auto_enabled);
    assert_eq!(record.metrics.wins_in_window, Some(28));
    assert_eq!(record.metrics.win_rate_in_window, Some(dec!(93.33)));
    assert_eq!(record.metrics.current_streak, Some(-1));

    let log = store.audit_log(Some("dyn")).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].field, AuditField::AutoEnabled);
    assert_eq!(log[0].actor, "scheduler");
}
