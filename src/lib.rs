//! bridge-backtest: backtesting and visibility management for lottery bridges
//!
//! This library provides the core components for:
//! - Loading draw history
//! - Position bridges and a bridge registry
//! - Range validation and single/two-period backtesting
//! - Label-based aggregation of the raw result table
//! - Hysteresis-based visibility decisions with an audit trail
//! - SQLite and in-memory bridge stores behind a retrying gateway
//! - Logging and Prometheus metrics

pub mod backtest;
pub mod bridge;
pub mod cli;
pub mod config;
pub mod history;
pub mod manager;
pub mod store;
pub mod telemetry;
pub mod visibility;
