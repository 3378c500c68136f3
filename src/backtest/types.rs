//! Backtest state and outcome types

use crate::bridge::{format_prediction, PredictionSet};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;

/// How predictions are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BacktestMode {
    /// Each prediction is scored against the next period only
    #[default]
    Single,
    /// A first-step miss gets one more period before it counts as a loss
    TwoPeriod,
}

impl BacktestMode {
    /// Header annotation appended to bridge names
    pub fn annotation(&self) -> Option<&'static str> {
        match self {
            BacktestMode::Single => None,
            BacktestMode::TwoPeriod => Some("2-period"),
        }
    }
}

impl fmt::Display for BacktestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BacktestMode::Single => f.write_str("single"),
            BacktestMode::TwoPeriod => f.write_str("two_period"),
        }
    }
}

/// Engine settings
#[derive(Debug, Clone, Deserialize)]
pub struct BacktestSettings {
    #[serde(default)]
    pub mode: BacktestMode,
    /// Size of the trailing hit/miss window reported as recent form
    #[serde(default = "default_recent_form_window")]
    pub recent_form_window: usize,
}

fn default_recent_form_window() -> usize {
    10
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            mode: BacktestMode::Single,
            recent_form_window: default_recent_form_window(),
        }
    }
}

/// Result of one bridge in one period
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum Outcome {
    /// Prediction matched the draw
    Hit,
    /// Prediction missed and is scored as a loss
    Miss,
    /// First-step miss in two-period mode; resolution deferred
    Waiting,
    /// Bridge failed; the period is not scored for this bridge
    Error(String),
}

/// Per bridge per period outcome, appended in period order
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeRecord {
    /// Period id of the draw the prediction was checked against
    pub period: u32,
    /// 1 for a fresh prediction, 2 for a carried-over check
    pub step: u8,
    pub outcome: Outcome,
    pub predicted: PredictionSet,
    /// 2-digit values of the draw the prediction was checked against
    #[serde(skip)]
    pub actual: Arc<BTreeSet<String>>,
}

impl OutcomeRecord {
    pub fn is_hit(&self) -> bool {
        self.outcome == Outcome::Hit
    }

    /// Predicted values that appeared in the draw
    pub fn matched(&self) -> Vec<&str> {
        self.predicted
            .iter()
            .filter(|v| self.actual.contains(*v))
            .map(String::as_str)
            .collect()
    }

    /// Cell text used in the per-period rows of the result table
    pub fn cell(&self) -> String {
        let values = format_prediction(&self.predicted);
        match &self.outcome {
            Outcome::Hit if self.step == 2 => format!("HIT {} (step 2)", values),
            Outcome::Hit => format!("HIT {}", values),
            Outcome::Miss => format!("MISS {}", values),
            Outcome::Waiting => format!("WAIT {}", values),
            Outcome::Error(msg) => format!("ERROR {}", msg),
        }
    }
}

/// A two-period forecast that missed its first check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingResolution {
    /// Period id the forecast was first checked against
    pub opened_at: u32,
    pub predicted: PredictionSet,
}

/// Streak and form tracking for one bridge, updated strictly in period order
#[derive(Debug, Clone, Serialize)]
pub struct StreakState {
    /// Consecutive outcomes: positive for wins, negative for losses
    pub current: i32,
    /// Longest losing run observed
    pub max_lose: u32,
    /// Scored wins
    pub wins: u32,
    /// Scored periods (wins + losses)
    pub scored: u32,
    /// Periods the bridge failed to predict
    pub errors: u32,
    recent: VecDeque<bool>,
    recent_capacity: usize,
}

impl StreakState {
    pub fn new(recent_capacity: usize) -> Self {
        Self {
            current: 0,
            max_lose: 0,
            wins: 0,
            scored: 0,
            errors: 0,
            recent: VecDeque::with_capacity(recent_capacity),
            recent_capacity,
        }
    }

    /// Record a scored outcome
    pub fn record(&mut self, hit: bool) {
        self.scored += 1;
        if hit {
            self.wins += 1;
            self.current = if self.current > 0 { self.current + 1 } else { 1 };
        } else {
            self.current = if self.current < 0 { self.current - 1 } else { -1 };
            self.max_lose = self.max_lose.max(self.current.unsigned_abs());
        }

        if self.recent_capacity > 0 {
            if self.recent.len() == self.recent_capacity {
                self.recent.pop_front();
            }
            self.recent.push_back(hit);
        }
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    /// Wins inside the trailing form window
    pub fn recent_wins(&self) -> u32 {
        self.recent.iter().filter(|h| **h).count() as u32
    }

    pub fn recent_capacity(&self) -> usize {
        self.recent_capacity
    }

    /// Win rate as a percentage
    pub fn win_rate(&self) -> Decimal {
        if self.scored == 0 {
            return Decimal::ZERO;
        }
        (Decimal::from(self.wins) / Decimal::from(self.scored) * dec!(100)).round_dp(2)
    }

    /// `"66.67% (2/3)"`
    pub fn win_rate_text(&self) -> String {
        format!("{:.2}% ({}/{})", self.win_rate(), self.wins, self.scored)
    }

    /// `"<current>/<max lose>"`
    pub fn streak_text(&self) -> String {
        format!("{}/{}", self.current, self.max_lose)
    }

    /// `"<wins>/<window>"`
    pub fn form_text(&self) -> String {
        format!("{}/{}", self.recent_wins(), self.recent_capacity)
    }
}

/// Forecast for the period after the run
#[derive(Debug, Clone, Serialize)]
pub struct NextPrediction {
    pub predicted: PredictionSet,
    /// Still inside the two-period grace window
    pub awaiting_confirmation: bool,
}
