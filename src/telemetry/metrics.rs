//! Prometheus metrics

use std::time::Duration;

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Periods processed by the engine
    PeriodsProcessed,
    /// Bridge invocations that failed
    PredictorErrors,
    /// Store calls retried after a transient failure
    StoreRetries,
    /// Auto flag changes written to the audit log
    AutoFlagChanges,
}

/// Duration metric types
#[derive(Debug, Clone, Copy)]
pub enum DurationMetric {
    /// Wall time of one backtest run
    BacktestRun,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Bridges currently visible
    VisibleBridges,
    /// Bridges lacking metrics for a decision
    BridgesNeedingEvaluation,
}

fn counter_name(metric: CounterMetric) -> &'static str {
    match metric {
        CounterMetric::PeriodsProcessed => "bridge_backtest_periods_total",
        CounterMetric::PredictorErrors => "bridge_backtest_predictor_errors_total",
        CounterMetric::StoreRetries => "bridge_backtest_store_retries_total",
        CounterMetric::AutoFlagChanges => "bridge_backtest_auto_flag_changes_total",
    }
}

/// Increment a counter
pub fn increment_counter(metric: CounterMetric, value: u64) {
    if value > 0 {
        ::metrics::counter!(counter_name(metric)).increment(value);
    }
}

/// Record a duration measurement in milliseconds
pub fn record_duration(metric: DurationMetric, duration: Duration) {
    let metric_name = match metric {
        DurationMetric::BacktestRun => "bridge_backtest_run_duration_ms",
    };

    ::metrics::histogram!(metric_name).record(duration.as_secs_f64() * 1000.0);
    tracing::debug!(
        metric = metric_name,
        value_ms = duration.as_millis() as u64,
        "Recording duration"
    );
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    let metric_name = match metric {
        GaugeMetric::VisibleBridges => "bridge_backtest_visible_bridges",
        GaugeMetric::BridgesNeedingEvaluation => "bridge_backtest_bridges_needing_evaluation",
    };

    ::metrics::gauge!(metric_name).set(value);
}
