//! Raw tabular backtest result
//!
//! Row 0 is the header: `"Period"` then one label per bridge. Every following
//! row starts with a label cell naming what the row holds. Summary rows come
//! first, then one row per scored period, newest first.

use serde::{Deserialize, Serialize};

pub const HEADER_LABEL: &str = "Period";
pub const RATE_LABEL: &str = "Win Rate";
pub const STREAK_LABEL: &str = "Streak (current/max lose)";
pub const PREDICTION_LABEL: &str = "Next Prediction";

/// Label of the recent-form row for a given window size
pub fn form_label(window: usize) -> String {
    format!("Recent Form (last {})", window)
}

/// Header cell for a bridge, with the mode annotation if any
pub fn bridge_header(name: &str, annotation: Option<&str>) -> String {
    match annotation {
        Some(a) => format!("{} ({})", name, a),
        None => name.to_string(),
    }
}

/// Rows of string cells
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultTable {
    rows: Vec<Vec<String>>,
}

impl ResultTable {
    /// Start a table with the given header row
    pub fn new(header: Vec<String>) -> Self {
        Self { rows: vec![header] }
    }

    /// Wrap existing rows, header first
    pub fn from_rows(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    /// Append a labeled row
    pub fn push_row(&mut self, label: impl Into<String>, cells: Vec<String>) {
        let mut row = Vec::with_capacity(cells.len() + 1);
        row.push(label.into());
        row.extend(cells);
        self.rows.push(row);
    }

    pub fn header(&self) -> Option<&[String]> {
        self.rows.first().map(Vec::as_slice)
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row(&self, idx: usize) -> Option<&[String]> {
        self.rows.get(idx).map(Vec::as_slice)
    }

    /// Cell at `(row, column)`, column 0 being the label
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render as aligned text columns, limited to `max_rows` data rows
    pub fn format_table(&self, max_rows: usize) -> String {
        let shown: Vec<&Vec<String>> = self.rows.iter().take(max_rows + 1).collect();
        let columns = shown.iter().map(|r| r.len()).max().unwrap_or(0);

        let widths: Vec<usize> = (0..columns)
            .map(|c| {
                shown
                    .iter()
                    .filter_map(|r| r.get(c))
                    .map(|s| s.chars().count())
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut out = String::new();
        for (i, row) in shown.iter().enumerate() {
            let line: Vec<String> = widths
                .iter()
                .enumerate()
                .map(|(c, w)| {
                    let cell = row.get(c).map(String::as_str).unwrap_or("");
                    format!("{:<width$}", cell, width = *w)
                })
                .collect();
            out.push_str(line.join(" | ").trim_end());
            out.push('\n');
            if i == 0 {
                let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
                out.push_str(&rule.join("-+-"));
                out.push('\n');
            }
        }
        if self.rows.len() > shown.len() {
            out.push_str(&format!("... {} more rows\n", self.rows.len() - shown.len()));
        }
        out
    }
}
