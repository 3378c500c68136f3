//! Result table aggregation
//!
//! Semantic rows are found by label keyword, not by position, because the
//! row order is not stable when the bridge set changes. A missing label falls
//! back to the canonical position (only if that row is unlabeled) and then to
//! a default value.

use super::table::ResultTable;
use super::types::BacktestMode;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Field-level parse failures; always defaulted, never propagated
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Malformed streak '{0}'")]
    Streak(String),
    #[error("Malformed recent form '{0}'")]
    Form(String),
    #[error("Missing header for column {0}")]
    Header(usize),
}

/// Per-bridge statistics read back from a result table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    pub win_rate_text: String,
    pub current_streak: i32,
    pub clean_prediction: String,
    pub max_lose_streak: u32,
    pub recent_win_count: u32,
    pub name: String,
}

impl BridgeStats {
    /// `(winRateText, currentStreak, cleanPrediction, maxLoseStreak, recentWinCount, name)`
    pub fn into_tuple(self) -> (String, i32, String, u32, u32, String) {
        (
            self.win_rate_text,
            self.current_streak,
            self.clean_prediction,
            self.max_lose_streak,
            self.recent_win_count,
            self.name,
        )
    }
}

/// Next-period forecast of one bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingPrediction {
    pub prediction: String,
    /// Still inside the two-period grace window
    pub awaiting_confirmation: bool,
    pub annotation: Option<String>,
}

/// Aggregated view of a result table
#[derive(Debug, Clone, Default, Serialize)]
pub struct Aggregation {
    pub stats: Vec<BridgeStats>,
    pub pending: BTreeMap<String, PendingPrediction>,
}

impl Aggregation {
    pub fn get(&self, name: &str) -> Option<&BridgeStats> {
        self.stats.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowKind {
    Rate,
    Streak,
    Form,
    Prediction,
}

impl RowKind {
    const ALL: [RowKind; 4] = [
        RowKind::Rate,
        RowKind::Streak,
        RowKind::Form,
        RowKind::Prediction,
    ];

    fn keyword(&self) -> &'static str {
        match self {
            RowKind::Rate => "rate",
            RowKind::Streak => "streak",
            RowKind::Form => "form",
            RowKind::Prediction => "prediction",
        }
    }

    /// Canonical row index, header being row 0
    fn position(&self) -> usize {
        match self {
            RowKind::Rate => 1,
            RowKind::Streak => 2,
            RowKind::Form => 3,
            RowKind::Prediction => 4,
        }
    }

    fn classify(label: &str) -> Option<RowKind> {
        let label = label.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| label.contains(kind.keyword()))
    }
}

/// Per-period rows are labeled with the period id
fn is_period_label(label: &str) -> bool {
    let label = label.trim();
    !label.is_empty() && label.chars().all(|c| c.is_ascii_digit())
}

fn locate(table: &ResultTable, kind: RowKind) -> Option<usize> {
    let by_label = table
        .rows()
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, row)| row.first().and_then(|l| RowKind::classify(l)) == Some(kind))
        .map(|(idx, _)| idx);
    if by_label.is_some() {
        return by_label;
    }

    let idx = kind.position();
    let label = table.cell(idx, 0)?;
    if RowKind::classify(label).is_none() && !is_period_label(label) {
        tracing::debug!(row = kind.keyword(), idx, "Using positional fallback");
        Some(idx)
    } else {
        None
    }
}

/// Strip a trailing `(...)` annotation from a prediction cell
fn split_annotation(cell: &str) -> (&str, Option<&str>) {
    let trimmed = cell.trim();
    if trimmed.ends_with(')') {
        if let Some(open) = trimmed.rfind('(') {
            let inner = &trimmed[open + 1..trimmed.len() - 1];
            return (trimmed[..open].trim_end(), Some(inner.trim()));
        }
    }
    (trimmed, None)
}

/// Bridge name of a header cell, without a mode annotation
///
/// Other parentheses belong to the bridge name and are kept.
fn header_bridge_name(cell: &str) -> &str {
    let cell = cell.trim();
    [BacktestMode::Single, BacktestMode::TwoPeriod]
        .iter()
        .filter_map(BacktestMode::annotation)
        .find_map(|a| cell.strip_suffix(format!("({})", a).as_str()))
        .map_or(cell, str::trim_end)
}

/// `"<current>/<max lose>"` or a bare current streak
fn parse_streak(cell: &str) -> Result<(i32, u32), ParseError> {
    let err = || ParseError::Streak(cell.to_string());
    let cell = cell.trim();
    match cell.split_once('/') {
        Some((current, max_lose)) => Ok((
            current.trim().parse().map_err(|_| err())?,
            max_lose.trim().parse().map_err(|_| err())?,
        )),
        None => Ok((cell.parse().map_err(|_| err())?, 0)),
    }
}

/// `"<wins>/<window>"`; returns the win count
fn parse_form(cell: &str) -> Result<u32, ParseError> {
    let err = || ParseError::Form(cell.to_string());
    let wins = cell.trim().split('/').next().unwrap_or_default();
    wins.trim().parse().map_err(|_| err())
}

fn is_grace_annotation(annotation: &str) -> bool {
    let annotation = annotation.to_lowercase();
    annotation.contains("pending") || annotation.contains("step 2")
}

struct RowIndex {
    rate: Option<usize>,
    streak: Option<usize>,
    form: Option<usize>,
    prediction: Option<usize>,
}

impl RowIndex {
    fn discover(table: &ResultTable) -> Self {
        Self {
            rate: locate(table, RowKind::Rate),
            streak: locate(table, RowKind::Streak),
            form: locate(table, RowKind::Form),
            prediction: locate(table, RowKind::Prediction),
        }
    }
}

fn cell_at<'a>(table: &'a ResultTable, row: Option<usize>, column: usize) -> Option<&'a str> {
    row.and_then(|r| table.cell(r, column))
}

/// Convert a raw result table into per-bridge statistics and forecasts
///
/// Never fails: malformed cells are logged and replaced with defaults
/// (`"0"` rate, `0/0` streak, `0/10` form, empty prediction).
pub fn aggregate(table: &ResultTable) -> Aggregation {
    let mut result = Aggregation::default();
    let Some(header) = table.header() else {
        tracing::warn!("Result table has no header row");
        return result;
    };

    let rows = RowIndex::discover(table);
    for (kind, found) in [
        (RowKind::Rate, rows.rate),
        (RowKind::Streak, rows.streak),
        (RowKind::Form, rows.form),
        (RowKind::Prediction, rows.prediction),
    ] {
        if found.is_none() {
            tracing::warn!(row = kind.keyword(), "Row not found, using defaults");
        }
    }

    for column in 1..header.len() {
        let name = header_bridge_name(&header[column]);
        if name.is_empty() {
            tracing::warn!(error = %ParseError::Header(column), "Skipping column");
            continue;
        }

        let win_rate_text = cell_at(table, rows.rate, column)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("0")
            .to_string();

        let (current_streak, max_lose_streak) = match cell_at(table, rows.streak, column) {
            Some(cell) => parse_streak(cell).unwrap_or_else(|e| {
                tracing::warn!(bridge = name, error = %e, "Defaulting streak");
                (0, 0)
            }),
            None => (0, 0),
        };

        let recent_win_count = match cell_at(table, rows.form, column) {
            Some(cell) => parse_form(cell).unwrap_or_else(|e| {
                tracing::warn!(bridge = name, error = %e, "Defaulting recent form");
                0
            }),
            None => 0,
        };

        let (clean_prediction, annotation) =
            split_annotation(cell_at(table, rows.prediction, column).unwrap_or(""));

        if !clean_prediction.is_empty() {
            result.pending.insert(
                name.to_string(),
                PendingPrediction {
                    prediction: clean_prediction.to_string(),
                    awaiting_confirmation: annotation.is_some_and(is_grace_annotation),
                    annotation: annotation.map(str::to_string),
                },
            );
        }

        result.stats.push(BridgeStats {
            win_rate_text,
            current_streak,
            clean_prediction: clean_prediction.to_string(),
            max_lose_streak,
            recent_win_count,
            name: name.to_string(),
        });
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    fn full_table() -> ResultTable {
        ResultTable::from_rows(vec![
            row(&["Period", "alpha (2-period)", "beta (2-period)"]),
            row(&["Win Rate", "75.00% (3/4)", "25.00% (1/4)"]),
            row(&["Streak (current/max lose)", "2/1", "-3/3"]),
            row(&["Recent Form (last 10)", "3/10", "1/10"]),
            row(&["Next Prediction", "12,21 (step 1)", "45,54 (step 2, pending)"]),
            row(&["9", "HIT 12,21", "WAIT 45,54"]),
        ])
    }

    #[test]
    fn test_aggregate_full_table() {
        let agg = aggregate(&full_table());
        assert_eq!(agg.stats.len(), 2);

        let alpha = agg.get("alpha").unwrap();
        assert_eq!(alpha.win_rate_text, "75.00% (3/4)");
        assert_eq!(alpha.current_streak, 2);
        assert_eq!(alpha.max_lose_streak, 1);
        assert_eq!(alpha.recent_win_count, 3);
        assert_eq!(alpha.clean_prediction, "12,21");

        let beta = agg.get("beta").unwrap();
        assert_eq!(beta.current_streak, -3);
        assert!(agg.pending["beta"].awaiting_confirmation);
        assert!(!agg.pending["alpha"].awaiting_confirmation);
        assert_eq!(agg.pending["alpha"].annotation.as_deref(), Some("step 1"));
    }

    #[test]
    fn test_tuple_order() {
        let agg = aggregate(&full_table());
        let tuple = agg.stats[0].clone().into_tuple();
        assert_eq!(
            tuple,
            (
                "75.00% (3/4)".to_string(),
                2,
                "12,21".to_string(),
                1,
                3,
                "alpha".to_string()
            )
        );
    }

    #[test]
    fn test_rows_found_by_label_in_any_order() {
        let table = ResultTable::from_rows(vec![
            row(&["Period", "alpha"]),
            row(&["Next Prediction", "07"]),
            row(&["Recent Form (last 10)", "4/10"]),
            row(&["Win Rate", "40.00% (4/10)"]),
            row(&["Streak (current/max lose)", "-1/2"]),
        ]);
        let stats = &aggregate(&table).stats[0];
        assert_eq!(stats.win_rate_text, "40.00% (4/10)");
        assert_eq!(stats.current_streak, -1);
        assert_eq!(stats.max_lose_streak, 2);
        assert_eq!(stats.recent_win_count, 4);
        assert_eq!(stats.clean_prediction, "07");
    }

    #[test]
    fn test_missing_streak_row_defaults_to_zero() {
        let table = ResultTable::from_rows(vec![
            row(&["Period", "alpha"]),
            row(&["Win Rate", "50.00% (1/2)"]),
            row(&["Recent Form (last 10)", "1/10"]),
            row(&["Next Prediction", "33"]),
            row(&["4", "HIT 33"]),
        ]);
        let stats = &aggregate(&table).stats[0];
        assert_eq!(stats.win_rate_text, "50.00% (1/2)");
        assert_eq!(stats.current_streak, 0);
        assert_eq!(stats.max_lose_streak, 0);
        assert_eq!(stats.recent_win_count, 1);
    }

    #[test]
    fn test_positional_fallback_for_unlabeled_rows() {
        let table = ResultTable::from_rows(vec![
            row(&["Period", "alpha"]),
            row(&["", "60.00% (3/5)"]),
            row(&["", "4/0"]),
            row(&["", "6/10"]),
            row(&["", "88 (step 1)"]),
        ]);
        let stats = &aggregate(&table).stats[0];
        assert_eq!(stats.win_rate_text, "60.00% (3/5)");
        assert_eq!(stats.current_streak, 4);
        assert_eq!(stats.recent_win_count, 6);
        assert_eq!(stats.clean_prediction, "88");
    }

    #[test]
    fn test_malformed_cells_default_without_dropping_bridge() {
        let table = ResultTable::from_rows(vec![
            row(&["Period", "alpha", "beta"]),
            row(&["Win Rate", "", "10.00% (1/10)"]),
            row(&["Streak (current/max lose)", "abc/2", "5"]),
            row(&["Recent Form (last 10)", "x/10", "2/10"]),
            row(&["Next Prediction", ""]),
        ]);
        let agg = aggregate(&table);
        assert_eq!(agg.stats.len(), 2);

        let alpha = agg.get("alpha").unwrap();
        assert_eq!(alpha.win_rate_text, "0");
        assert_eq!((alpha.current_streak, alpha.max_lose_streak), (0, 0));
        assert_eq!(alpha.recent_win_count, 0);
        assert!(!agg.pending.contains_key("alpha"));

        let beta = agg.get("beta").unwrap();
        assert_eq!((beta.current_streak, beta.max_lose_streak), (5, 0));
        assert_eq!(beta.clean_prediction, "");
    }

    #[test]
    fn test_empty_table() {
        let agg = aggregate(&ResultTable::from_rows(vec![]));
        assert!(agg.stats.is_empty());
        assert!(agg.pending.is_empty());
    }

    #[test]
    fn test_parenthesised_bridge_names_survive() {
        let table = ResultTable::from_rows(vec![
            row(&["Period", "pair(3,4)", "shadow (0,4) (2-period)"]),
            row(&["Win Rate", "50.00% (1/2)", "0.00% (0/2)"]),
            row(&["Streak (current/max lose)", "1/1", "-2/2"]),
            row(&["Recent Form (last 10)", "1/10", "0/10"]),
            row(&["Next Prediction", "34,43", "49 (step 1)"]),
        ]);
        let agg = aggregate(&table);
        let names: Vec<_> = agg.stats.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["pair(3,4)", "shadow (0,4)"]);
        assert_eq!(agg.get("pair(3,4)").unwrap().current_streak, 1);
        assert!(agg.pending.contains_key("shadow (0,4)"));
    }

    #[test]
    fn test_header_bridge_name() {
        assert_eq!(header_bridge_name(" alpha (2-period) "), "alpha");
        assert_eq!(header_bridge_name("alpha"), "alpha");
        assert_eq!(header_bridge_name("f(x)"), "f(x)");
    }

    #[test]
    fn test_split_annotation() {
        assert_eq!(split_annotation("12,21 (step 1)"), ("12,21", Some("step 1")));
        assert_eq!(split_annotation(" 12 "), ("12", None));
        assert_eq!(split_annotation("x)"), ("x)", None));
    }
}
