//! Backtest engine
//!
//! Drives every bridge over the validated range, one period at a time, in
//! increasing order. Streak and pending state depend on that ordering.

use super::table::{self, ResultTable};
use super::types::{
    BacktestMode, BacktestSettings, NextPrediction, Outcome, OutcomeRecord, PendingResolution,
    StreakState,
};
use super::{BacktestError, ValidatedRange};
use crate::bridge::{format_prediction, Bridge, BridgeKind, PredictionSet};
use crate::history::HistoryWindow;
use crate::telemetry::{increment_counter, record_duration, CounterMetric, DurationMetric};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Cooperative cancellation flag, checked between periods
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything recorded for one bridge during a run
#[derive(Debug, Clone, Serialize)]
pub struct BridgeRun {
    pub name: String,
    pub kind: BridgeKind,
    pub streak: StreakState,
    pub outcomes: Vec<OutcomeRecord>,
    /// Forecast for the period after the range
    pub next: Option<NextPrediction>,
    /// Two-period forecast still unresolved when the range ended
    pub dangling: Option<PendingResolution>,
    #[serde(skip)]
    pending: Option<PendingResolution>,
}

impl BridgeRun {
    fn new(bridge: &dyn Bridge, recent_capacity: usize) -> Self {
        Self {
            name: bridge.name().to_string(),
            kind: bridge.kind(),
            streak: StreakState::new(recent_capacity),
            outcomes: Vec::new(),
            next: None,
            dangling: None,
            pending: None,
        }
    }

    /// Next prediction cell, annotated in two-period mode
    fn prediction_cell(&self, mode: BacktestMode) -> String {
        let Some(next) = &self.next else {
            return String::new();
        };
        let values = format_prediction(&next.predicted);
        match mode {
            BacktestMode::Single => values,
            BacktestMode::TwoPeriod if next.awaiting_confirmation => {
                format!("{} (step 2, pending)", values)
            }
            BacktestMode::TwoPeriod => format!("{} (step 1)", values),
        }
    }
}

/// Complete result of one backtest run
#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub mode: BacktestMode,
    pub first_scorable: u32,
    pub effective_end: u32,
    pub runs: Vec<BridgeRun>,
    pub table: ResultTable,
    pub predictor_errors: u32,
}

impl BacktestReport {
    pub fn run(&self, name: &str) -> Option<&BridgeRun> {
        self.runs.iter().find(|r| r.name == name)
    }

    /// Bridges whose two-period forecast was still open at the end
    pub fn dangling(&self) -> impl Iterator<Item = (&str, &PendingResolution)> {
        self.runs
            .iter()
            .filter_map(|r| r.dangling.as_ref().map(|p| (r.name.as_str(), p)))
    }
}

/// Runs bridges over historical draws
pub struct BacktestEngine {
    settings: BacktestSettings,
}

impl BacktestEngine {
    /// Create a new engine
    pub fn new(settings: BacktestSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &BacktestSettings {
        &self.settings
    }

    /// Run the backtest
    pub fn run(
        &self,
        range: &ValidatedRange<'_>,
        bridges: &[Arc<dyn Bridge>],
        cancel: Option<&CancelToken>,
    ) -> Result<BacktestReport, BacktestError> {
        if bridges.is_empty() {
            return Err(BacktestError::NoBridges);
        }

        let started = Instant::now();
        let mode = self.settings.mode;
        tracing::info!(
            %mode,
            bridges = bridges.len(),
            first = range.first_scorable,
            last = range.effective_end,
            "Starting backtest"
        );

        let mut runs: Vec<BridgeRun> = bridges
            .iter()
            .map(|b| BridgeRun::new(b.as_ref(), self.settings.recent_form_window))
            .collect();
        let mut period_rows: Vec<(u32, Vec<String>)> =
            Vec::with_capacity(range.scorable_rows() as usize);
        let mut predictor_errors = 0u32;

        for row in range.first_scorable..=range.effective_end {
            let draw = range.record(row);
            if cancel.is_some_and(CancelToken::is_cancelled) {
                tracing::info!(period = draw.period, "Backtest cancelled");
                return Err(BacktestError::Cancelled {
                    period: draw.period,
                });
            }

            let window = range.window_before(row);
            let actual = Arc::new(draw.loto());
            let mut cells = Vec::with_capacity(bridges.len());

            for (bridge, run) in bridges.iter().zip(runs.iter_mut()) {
                let record = match mode {
                    BacktestMode::Single => {
                        Self::score_single(bridge.as_ref(), run, &window, draw.period, &actual)
                    }
                    BacktestMode::TwoPeriod => {
                        Self::score_two_period(bridge.as_ref(), run, &window, draw.period, &actual)
                    }
                };
                if matches!(record.outcome, Outcome::Error(_)) {
                    predictor_errors += 1;
                }
                cells.push(record.cell());
                run.outcomes.push(record);
            }

            period_rows.push((draw.period, cells));
            increment_counter(CounterMetric::PeriodsProcessed, 1);
        }

        let final_window = range.full_window();
        for (bridge, run) in bridges.iter().zip(runs.iter_mut()) {
            Self::finish(bridge.as_ref(), run, &final_window);
        }

        let table = Self::build_table(mode, self.settings.recent_form_window, &runs, period_rows);

        increment_counter(CounterMetric::PredictorErrors, predictor_errors.into());
        record_duration(DurationMetric::BacktestRun, started.elapsed());
        tracing::info!(
            periods = range.scorable_rows(),
            predictor_errors,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Backtest complete"
        );

        Ok(BacktestReport {
            mode,
            first_scorable: range.first_scorable,
            effective_end: range.effective_end,
            runs,
            table,
            predictor_errors,
        })
    }

    fn predict(
        bridge: &dyn Bridge,
        run: &mut BridgeRun,
        window: &HistoryWindow<'_>,
        period: u32,
    ) -> Result<PredictionSet, String> {
        bridge.predict(window).map_err(|e| {
            tracing::warn!(bridge = bridge.name(), period, error = %e, "Bridge prediction failed");
            run.streak.record_error();
            e.to_string()
        })
    }

    fn score_single(
        bridge: &dyn Bridge,
        run: &mut BridgeRun,
        window: &HistoryWindow<'_>,
        period: u32,
        actual: &Arc<BTreeSet<String>>,
    ) -> OutcomeRecord {
        let (outcome, predicted) = match Self::predict(bridge, run, window, period) {
            Ok(predicted) => {
                let hit = !predicted.is_disjoint(actual);
                run.streak.record(hit);
                (if hit { Outcome::Hit } else { Outcome::Miss }, predicted)
            }
            Err(msg) => (Outcome::Error(msg), PredictionSet::new()),
        };

        OutcomeRecord {
            period,
            step: 1,
            outcome,
            predicted,
            actual: actual.clone(),
        }
    }

    /// An open pending entry is checked before any new prediction is made.
    /// A first-step hit short-circuits the second check.
    fn score_two_period(
        bridge: &dyn Bridge,
        run: &mut BridgeRun,
        window: &HistoryWindow<'_>,
        period: u32,
        actual: &Arc<BTreeSet<String>>,
    ) -> OutcomeRecord {
        if let Some(pending) = run.pending.take() {
            let hit = !pending.predicted.is_disjoint(actual);
            run.streak.record(hit);
            return OutcomeRecord {
                period,
                step: 2,
                outcome: if hit { Outcome::Hit } else { Outcome::Miss },
                predicted: pending.predicted,
                actual: actual.clone(),
            };
        }

        let (outcome, predicted) = match Self::predict(bridge, run, window, period) {
            Ok(predicted) if !predicted.is_disjoint(actual) => {
                run.streak.record(true);
                (Outcome::Hit, predicted)
            }
            Ok(predicted) => {
                run.pending = Some(PendingResolution {
                    opened_at: period,
                    predicted: predicted.clone(),
                });
                (Outcome::Waiting, predicted)
            }
            Err(msg) => (Outcome::Error(msg), PredictionSet::new()),
        };

        OutcomeRecord {
            period,
            step: 1,
            outcome,
            predicted,
            actual: actual.clone(),
        }
    }

    /// Compute the forecast for the period after the range
    fn finish(bridge: &dyn Bridge, run: &mut BridgeRun, window: &HistoryWindow<'_>) {
        if let Some(pending) = run.pending.take() {
            tracing::info!(
                bridge = %run.name,
                opened_at = pending.opened_at,
                "Pending resolution left open at end of range"
            );
            run.next = Some(NextPrediction {
                predicted: pending.predicted.clone(),
                awaiting_confirmation: true,
            });
            run.dangling = Some(pending);
            return;
        }

        match bridge.predict(window) {
            Ok(predicted) => {
                run.next = Some(NextPrediction {
                    predicted,
                    awaiting_confirmation: false,
                })
            }
            Err(e) => {
                tracing::warn!(bridge = %run.name, error = %e, "Next prediction failed");
            }
        }
    }

    fn build_table(
        mode: BacktestMode,
        recent_form_window: usize,
        runs: &[BridgeRun],
        period_rows: Vec<(u32, Vec<String>)>,
    ) -> ResultTable {
        let mut header = vec![table::HEADER_LABEL.to_string()];
        header.extend(
            runs.iter()
                .map(|r| table::bridge_header(&r.name, mode.annotation())),
        );

        let mut result = ResultTable::new(header);
        result.push_row(
            table::RATE_LABEL,
            runs.iter().map(|r| r.streak.win_rate_text()).collect(),
        );
        result.push_row(
            table::STREAK_LABEL,
            runs.iter().map(|r| r.streak.streak_text()).collect(),
        );
        result.push_row(
            table::form_label(recent_form_window),
            runs.iter().map(|r| r.streak.form_text()).collect(),
        );
        result.push_row(
            table::PREDICTION_LABEL,
            runs.iter().map(|r| r.prediction_cell(mode)).collect(),
        );

        for (period, cells) in period_rows.into_iter().rev() {
            result.push_row(period.to_string(), cells);
        }
        result
    }
}
