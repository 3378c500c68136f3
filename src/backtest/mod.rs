//! Backtesting module
//!
//! Validates a requested range, replays bridges period by period and turns
//! the raw result table into per-bridge statistics

mod aggregate;
mod engine;
pub mod table;
mod types;
mod validator;

pub use aggregate::{aggregate, Aggregation, BridgeStats, ParseError, PendingPrediction};
pub use engine::{BacktestEngine, BacktestReport, BridgeRun, CancelToken};
pub use table::ResultTable;
pub use types::{
    BacktestMode, BacktestSettings, NextPrediction, Outcome, OutcomeRecord, PendingResolution,
    StreakState,
};
pub use validator::{
    parse_bounds, validate_bounds, validate_range, ParameterError, ValidatedRange,
};

use thiserror::Error;

/// Backtest run errors
#[derive(Debug, Error)]
pub enum BacktestError {
    /// Requested range rejected before any computation
    #[error(transparent)]
    Parameter(#[from] ParameterError),
    /// Nothing to run
    #[error("No bridges to backtest")]
    NoBridges,
    /// Caller cancelled between periods
    #[error("Backtest cancelled before period {period}")]
    Cancelled { period: u32 },
}
