//! JSON history loading

use super::DrawRecord;
use std::path::Path;
use thiserror::Error;

/// History loading errors
#[derive(Debug, Error)]
pub enum HistoryError {
    /// File could not be read
    #[error("Failed to read history file: {0}")]
    Io(#[from] std::io::Error),
    /// File content is not a valid record list
    #[error("Malformed history: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Period ids are not strictly increasing
    #[error("Period {current} does not follow period {previous}")]
    OutOfOrder { previous: u32, current: u32 },
}

/// Parse a JSON array of draw records and check period ordering
pub fn parse_history(json: &str) -> Result<Vec<DrawRecord>, HistoryError> {
    let records: Vec<DrawRecord> = serde_json::from_str(json)?;

    for pair in records.windows(2) {
        if pair[1].period <= pair[0].period {
            return Err(HistoryError::OutOfOrder {
                previous: pair[0].period,
                current: pair[1].period,
            });
        }
    }

    Ok(records)
}

/// Load history from a JSON file
pub fn load_history(path: impl AsRef<Path>) -> Result<Vec<DrawRecord>, HistoryError> {
    let content = std::fs::read_to_string(path.as_ref())?;
    let records = parse_history(&content)?;
    tracing::debug!(
        path = %path.as_ref().display(),
        count = records.len(),
        "Loaded draw history"
    );
    Ok(records)
}
