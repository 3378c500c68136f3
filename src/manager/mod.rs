//! Bridge management
//!
//! Ties the pieces together: fetch the requested rows, validate, run the
//! engine on a blocking worker, aggregate, and write the results through the
//! store gateway. Store writes happen only after the run completed, so a
//! failed or cancelled run leaves the store untouched.

use crate::backtest::{
    aggregate, parse_bounds, validate_bounds, Aggregation, BacktestEngine, BacktestError,
    BacktestMode, BacktestReport, BacktestSettings, CancelToken,
};
use crate::bridge::{BridgeKind, BridgeRegistry};
use crate::history::DrawRecord;
use crate::store::{
    AuditEntry, DynamicMetrics, ManagedBridgeRecord, MetricsUpdate, RateField, RateUpdate,
    StoreError, StoreGateway,
};
use crate::telemetry::{increment_counter, set_gauge, CounterMetric, GaugeMetric};
use crate::visibility::{
    apply_decision, compute_score, evaluate, evaluate_metrics, window_rate, VisibilityDecision,
    VisibilityThresholds,
};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Manager errors
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Backtest(#[from] BacktestError),
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Background worker panicked or was aborted
    #[error("Backtest worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Which rate field a scan writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateWrite {
    /// Compute only
    None,
    /// Ad-hoc scan field; the fixed-window rate is left alone
    Routine,
    /// Overwrite the fixed-window rate
    Rebaseline,
}

/// Result of a scan
#[derive(Debug, Serialize)]
pub struct ScanOutcome {
    pub report: BacktestReport,
    pub aggregation: Aggregation,
    /// Records written, when persistence succeeded
    pub persisted: Option<usize>,
    /// Persistence failure; the computed results stay valid
    #[serde(skip)]
    pub persist_error: Option<StoreError>,
}

/// One bridge after a dynamic refresh
#[derive(Debug, Clone, Serialize)]
pub struct EvaluatedBridge {
    pub name: String,
    pub metrics: DynamicMetrics,
    pub decision: VisibilityDecision,
}

/// Result of a dynamic refresh
#[derive(Debug, Default, Serialize)]
pub struct RefreshOutcome {
    pub evaluated: Vec<EvaluatedBridge>,
    pub audit: Vec<AuditEntry>,
}

/// Current visibility of a stored bridge
#[derive(Debug, Clone, Serialize)]
pub struct BridgeVisibility {
    pub record: ManagedBridgeRecord,
    pub decision: VisibilityDecision,
}

/// Rows `start..=end` (1-based) of the full history, clipped to what exists
pub fn select_rows(history: &[DrawRecord], start: u32, end: u32) -> &[DrawRecord] {
    let from = (start.max(1) - 1) as usize;
    let to = (end as usize).min(history.len());
    if from >= to {
        return &[];
    }
    &history[from..to]
}

/// Runs scans and evaluations against the managed bridge store
pub struct BridgeManager {
    settings: BacktestSettings,
    thresholds: VisibilityThresholds,
    gateway: StoreGateway,
}

impl BridgeManager {
    pub fn new(
        settings: BacktestSettings,
        thresholds: VisibilityThresholds,
        gateway: StoreGateway,
    ) -> Self {
        Self {
            settings,
            thresholds,
            gateway,
        }
    }

    pub fn settings(&self) -> &BacktestSettings {
        &self.settings
    }

    pub fn gateway(&self) -> &StoreGateway {
        &self.gateway
    }

    /// Validate and run a backtest synchronously, then aggregate the table
    pub fn backtest(
        settings: &BacktestSettings,
        history: &[DrawRecord],
        start_token: Option<&str>,
        end_token: Option<&str>,
        registry: &BridgeRegistry,
        cancel: Option<&CancelToken>,
    ) -> Result<(BacktestReport, Aggregation), BacktestError> {
        let (start, end) = parse_bounds(start_token, end_token)?;
        let rows = select_rows(history, start, end);
        let range = validate_bounds(rows, start, end)?;

        let report = BacktestEngine::new(settings.clone()).run(&range, registry.bridges(), cancel)?;
        let aggregation = aggregate(&report.table);
        Ok((report, aggregation))
    }

    async fn backtest_on_worker(
        settings: BacktestSettings,
        history: Arc<[DrawRecord]>,
        start: Option<String>,
        end: Option<String>,
        registry: BridgeRegistry,
        cancel: Option<CancelToken>,
    ) -> Result<(BacktestReport, Aggregation), ManagerError> {
        let result = tokio::task::spawn_blocking(move || {
            Self::backtest(
                &settings,
                &history,
                start.as_deref(),
                end.as_deref(),
                &registry,
                cancel.as_ref(),
            )
        })
        .await?;
        Ok(result?)
    }

    /// Backtest on a blocking worker and optionally persist the rates
    ///
    /// Validation and engine failures are returned as errors. A persistence
    /// failure is reported in the outcome alongside the computed results.
    pub async fn scan(
        &self,
        history: Arc<[DrawRecord]>,
        start: Option<String>,
        end: Option<String>,
        registry: &BridgeRegistry,
        write: RateWrite,
        cancel: Option<CancelToken>,
    ) -> Result<ScanOutcome, ManagerError> {
        let (report, aggregation) = Self::backtest_on_worker(
            self.settings.clone(),
            history,
            start,
            end,
            registry.clone(),
            cancel,
        )
        .await?;

        let (persisted, persist_error) = match self.persist(registry, &aggregation, write).await {
            Ok(n) => (n, None),
            Err(e) => {
                tracing::error!(error = %e, "Persisting scan results failed");
                (None, Some(e))
            }
        };

        Ok(ScanOutcome {
            report,
            aggregation,
            persisted,
            persist_error,
        })
    }

    /// New bridges and their rates land in one commit, or not at all
    async fn persist(
        &self,
        registry: &BridgeRegistry,
        aggregation: &Aggregation,
        write: RateWrite,
    ) -> Result<Option<usize>, StoreError> {
        let field = match write {
            RateWrite::None => return Ok(None),
            RateWrite::Routine => RateField::Scan,
            RateWrite::Rebaseline => RateField::Window,
        };

        let known: Vec<ManagedBridgeRecord> = registry
            .bridges()
            .iter()
            .map(|b| ManagedBridgeRecord::new(b.name(), b.kind()))
            .collect();
        let batch: Vec<RateUpdate> = aggregation
            .stats
            .iter()
            .map(|s| RateUpdate {
                name: s.name.clone(),
                win_rate_text: s.win_rate_text.clone(),
                max_lose_streak: s.max_lose_streak,
                recent_win_count: s.recent_win_count,
            })
            .collect();

        let written = self.gateway.commit_rates(&known, field, &batch).await?;
        if written < batch.len() {
            tracing::warn!(
                written,
                expected = batch.len(),
                "Some bridge rates matched no stored record"
            );
        }
        tracing::info!(written, ?field, "Persisted bridge rates");
        Ok(Some(written))
    }

    /// Re-baseline the fixed-window rate over an explicit range
    pub async fn rebaseline(
        &self,
        history: Arc<[DrawRecord]>,
        start: Option<String>,
        end: Option<String>,
        registry: &BridgeRegistry,
    ) -> Result<ScanOutcome, ManagerError> {
        let outcome = self
            .scan(history, start, end, registry, RateWrite::Rebaseline, None)
            .await?;
        match outcome.persist_error {
            Some(e) => Err(e.into()),
            None => Ok(outcome),
        }
    }

    /// Recompute window metrics of dynamic bridges and update their auto flags
    ///
    /// Scores the trailing `window` periods of the history in single-period
    /// mode. Metrics, flags, and audit entries are committed as one batch.
    pub async fn refresh_dynamic(
        &self,
        history: Arc<[DrawRecord]>,
        registry: &BridgeRegistry,
        actor: &str,
        cancel: Option<CancelToken>,
    ) -> Result<RefreshOutcome, ManagerError> {
        let dynamic = registry.of_kind(BridgeKind::DynamicScored);
        if dynamic.is_empty() {
            tracing::warn!("No dynamic bridges to refresh");
            return Ok(RefreshOutcome::default());
        }

        let len = u32::try_from(history.len()).unwrap_or(u32::MAX);
        let start = len.saturating_sub(self.thresholds.window).max(2);
        let settings = BacktestSettings {
            mode: BacktestMode::Single,
            ..self.settings.clone()
        };
        let (report, _) = Self::backtest_on_worker(
            settings,
            history,
            Some(start.to_string()),
            Some(len.to_string()),
            dynamic,
            cancel,
        )
        .await?;

        let mut stored: BTreeMap<String, ManagedBridgeRecord> = self
            .gateway
            .records()
            .await?
            .into_iter()
            .map(|r| (r.name.clone(), r))
            .collect();

        let now = Utc::now();
        let mut outcome = RefreshOutcome::default();
        let mut updates = Vec::with_capacity(report.runs.len());

        for run in &report.runs {
            let mut record = stored
                .remove(&run.name)
                .unwrap_or_else(|| ManagedBridgeRecord::new(&run.name, run.kind));
            let streak = &run.streak;
            record.metrics = DynamicMetrics {
                wins_in_window: Some(streak.wins),
                win_rate_in_window: Some(window_rate(streak.wins, streak.scored)),
                current_streak: Some(streak.current),
                score: Some(compute_score(streak.wins, self.thresholds.window)),
            };

            let decision = evaluate_metrics(&record, &self.thresholds);
            if let Some(entry) = apply_decision(&mut record, &decision, actor, now) {
                outcome.audit.push(entry);
            }
            updates.push(MetricsUpdate::from_record(&record, now));
            outcome.evaluated.push(EvaluatedBridge {
                name: record.name.clone(),
                metrics: record.metrics.clone(),
                decision,
            });
        }

        self.gateway.commit_evaluation(&updates, &outcome.audit).await?;
        increment_counter(CounterMetric::AutoFlagChanges, outcome.audit.len() as u64);
        tracing::info!(
            evaluated = updates.len(),
            flag_changes = outcome.audit.len(),
            "Dynamic refresh committed"
        );
        Ok(outcome)
    }

    /// Evaluate the visibility of every stored bridge
    pub async fn visibility(&self) -> Result<Vec<BridgeVisibility>, ManagerError> {
        let records = self.gateway.records().await?;
        let evaluated: Vec<BridgeVisibility> = records
            .into_iter()
            .map(|record| {
                let decision = evaluate(&record, &self.thresholds);
                BridgeVisibility { record, decision }
            })
            .collect();

        let visible = evaluated.iter().filter(|b| b.decision.visible).count();
        let pending = evaluated
            .iter()
            .filter(|b| b.decision.needs_evaluation)
            .count();
        set_gauge(GaugeMetric::VisibleBridges, visible as f64);
        set_gauge(GaugeMetric::BridgesNeedingEvaluation, pending as f64);
        Ok(evaluated)
    }

    /// Set or clear a manual override
    pub async fn set_manual_override(
        &self,
        name: &str,
        value: Option<bool>,
        reason: &str,
        actor: &str,
    ) -> Result<Option<AuditEntry>, ManagerError> {
        Ok(self
            .gateway
            .set_manual_override(name, value, reason, actor)
            .await?)
    }
}
