//! Draw history module
//!
//! Immutable draw records and the read-only windows handed to bridges

mod loader;
mod types;

pub use loader::{load_history, parse_history, HistoryError};
pub use types::{DrawRecord, HistoryWindow, PRIZE_ORDER};
