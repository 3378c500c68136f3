//! Prediction bridge module
//!
//! A bridge derives a small set of 2-digit candidates from prior draws. The
//! backtest engine only depends on the [`Bridge`] trait; the concrete bridges
//! here are position-based formulas used by the CLI and tests.

mod position;
mod registry;

pub use position::PositionPairBridge;
pub use registry::{BridgeRegistry, BridgeSpec};

use crate::history::HistoryWindow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Predicted 2-digit values, kept sorted so output is deterministic
pub type PredictionSet = BTreeSet<String>;

/// Render a prediction set as `"12,21"`
pub fn format_prediction(set: &PredictionSet) -> String {
    set.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

/// Bridge type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeKind {
    Algorithmic,
    PositionMemory,
    PositionShadow,
    CustomDualPosition,
    DynamicScored,
}

impl BridgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeKind::Algorithmic => "algorithmic",
            BridgeKind::PositionMemory => "position_memory",
            BridgeKind::PositionShadow => "position_shadow",
            BridgeKind::CustomDualPosition => "custom_dual_position",
            BridgeKind::DynamicScored => "dynamic_scored",
        }
    }
}

impl fmt::Display for BridgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BridgeKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "algorithmic" => Ok(BridgeKind::Algorithmic),
            "position_memory" => Ok(BridgeKind::PositionMemory),
            "position_shadow" => Ok(BridgeKind::PositionShadow),
            "custom_dual_position" => Ok(BridgeKind::CustomDualPosition),
            "dynamic_scored" => Ok(BridgeKind::DynamicScored),
            other => Err(BridgeError::InvalidSpec(format!("unknown kind '{}'", other))),
        }
    }
}

/// Bridge errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    /// Window holds no records to predict from
    #[error("Empty history window")]
    EmptyWindow,
    /// Digit position missing from the source draw
    #[error("Position {position} out of range (draw has {available} digits)")]
    PositionOutOfRange { position: usize, available: usize },
    /// Bridge definition could not be parsed
    #[error("Invalid bridge spec: {0}")]
    InvalidSpec(String),
    /// Formula-specific failure
    #[error("Prediction failed: {0}")]
    Failed(String),
}

/// Predictor capability driven by the backtest engine
///
/// Implementations must be pure functions of the window: the engine calls
/// `predict` many times per run and relies on identical windows producing
/// identical sets.
pub trait Bridge: Send + Sync {
    /// Unique bridge name
    fn name(&self) -> &str;
    /// Type tag
    fn kind(&self) -> BridgeKind;
    /// Predict the 2-digit values for the period following the window
    fn predict(&self, window: &HistoryWindow<'_>) -> Result<PredictionSet, BridgeError>;
}
