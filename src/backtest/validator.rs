//! Backtest range validation
//!
//! The history handed to the validator is the slice retrieved for the
//! requested range: its first record sits at row `start`, so the last usable
//! row is `start + len - 1`.

use crate::history::{DrawRecord, HistoryWindow};
use thiserror::Error;

/// Range validation errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParameterError {
    /// Bound not supplied
    #[error("Missing parameter: {0}")]
    MissingParameter(&'static str),
    /// Bound is not an integer
    #[error("Parameter {name} is not a number: '{value}'")]
    NonNumericParameter { name: &'static str, value: String },
    /// Start must be greater than 1 and not after end
    #[error("Invalid range: start {start}, end {end}")]
    InvalidRange { start: i64, end: i64 },
    /// No period left to score after clamping
    #[error("Insufficient data: first scorable period {first_scorable} is after {effective_end}")]
    InsufficientData {
        first_scorable: u32,
        effective_end: u32,
    },
}

/// A validated backtest range over a history slice
#[derive(Debug, Clone, Copy)]
pub struct ValidatedRange<'a> {
    /// Records from row `offset` through row `effective_end`
    pub slice: &'a [DrawRecord],
    /// Last row scored, after clamping to the available data
    pub effective_end: u32,
    /// First row that has a prior row to predict from
    pub first_scorable: u32,
    /// Row number of `slice[0]`
    pub offset: u32,
}

impl<'a> ValidatedRange<'a> {
    /// Index into `slice` for a row number
    pub fn index_of(&self, row: u32) -> usize {
        (row - self.offset) as usize
    }

    /// Record at a row number
    pub fn record(&self, row: u32) -> &'a DrawRecord {
        &self.slice[self.index_of(row)]
    }

    /// Window of every record strictly before `row`
    pub fn window_before(&self, row: u32) -> HistoryWindow<'a> {
        HistoryWindow::new(&self.slice[..self.index_of(row)])
    }

    /// Window ending at the effective end, used for the next forecast
    pub fn full_window(&self) -> HistoryWindow<'a> {
        HistoryWindow::new(&self.slice[..=self.index_of(self.effective_end)])
    }

    /// Number of rows that will be scored
    pub fn scorable_rows(&self) -> u32 {
        self.effective_end + 1 - self.first_scorable
    }
}

fn parse_token(name: &'static str, token: Option<&str>) -> Result<i64, ParameterError> {
    let token = token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ParameterError::MissingParameter(name))?;

    token
        .parse::<i64>()
        .map_err(|_| ParameterError::NonNumericParameter {
            name,
            value: token.to_string(),
        })
}

/// Parse raw start/end tokens and check their ordering
pub fn parse_bounds(
    start_token: Option<&str>,
    end_token: Option<&str>,
) -> Result<(u32, u32), ParameterError> {
    let start = parse_token("start", start_token)?;
    let end = parse_token("end", end_token)?;

    if start <= 1 || start > end {
        return Err(ParameterError::InvalidRange { start, end });
    }

    let start = u32::try_from(start).map_err(|_| ParameterError::InvalidRange { start, end })?;
    let end = u32::try_from(end).unwrap_or(u32::MAX);
    Ok((start, end))
}

/// Validate already-parsed bounds against the retrieved history slice
pub fn validate_bounds(
    history: &[DrawRecord],
    start: u32,
    end: u32,
) -> Result<ValidatedRange<'_>, ParameterError> {
    if start <= 1 || start > end {
        return Err(ParameterError::InvalidRange {
            start: start.into(),
            end: end.into(),
        });
    }

    let available = u32::try_from(history.len()).unwrap_or(u32::MAX);
    // An empty slice clamps to start - 1, which always fails the check below
    let last_available = start.saturating_add(available).saturating_sub(1);
    let effective_end = end.min(last_available);
    let first_scorable = start.checked_add(1).ok_or(ParameterError::InvalidRange {
        start: start.into(),
        end: end.into(),
    })?;

    if first_scorable > effective_end {
        return Err(ParameterError::InsufficientData {
            first_scorable,
            effective_end,
        });
    }

    if effective_end < end {
        tracing::debug!(end, effective_end, "Clamped backtest end to available history");
    }

    Ok(ValidatedRange {
        slice: &history[..=(effective_end - start) as usize],
        effective_end,
        first_scorable,
        offset: start,
    })
}

/// Validate raw start/end tokens against the retrieved history slice
pub fn validate_range<'a>(
    history: &'a [DrawRecord],
    start_token: Option<&str>,
    end_token: Option<&str>,
) -> Result<ValidatedRange<'a>, ParameterError> {
    let (start, end) = parse_bounds(start_token, end_token)?;
    validate_bounds(history, start, end)
}
