//! Position-pair bridges

use super::{Bridge, BridgeError, BridgeKind, PredictionSet};
use crate::history::HistoryWindow;

/// Builds a 2-digit value from two digit positions of the previous draw
///
/// The previous draw's digits are read in canonical prize order. The bridge
/// predicts the pair and its reversal. The shadow variant maps each digit to
/// its shadow (`d + 5 mod 10`) first.
#[derive(Debug, Clone)]
pub struct PositionPairBridge {
    name: String,
    kind: BridgeKind,
    first: usize,
    second: usize,
    shadow: bool,
}

impl PositionPairBridge {
    /// Create a position-memory bridge
    pub fn new(name: impl Into<String>, first: usize, second: usize) -> Self {
        Self {
            name: name.into(),
            kind: BridgeKind::PositionMemory,
            first,
            second,
            shadow: false,
        }
    }

    /// Create a shadow bridge over the same positions
    pub fn shadow(name: impl Into<String>, first: usize, second: usize) -> Self {
        Self {
            kind: BridgeKind::PositionShadow,
            shadow: true,
            ..Self::new(name, first, second)
        }
    }

    /// Override the type tag
    pub fn with_kind(mut self, kind: BridgeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn positions(&self) -> (usize, usize) {
        (self.first, self.second)
    }

    fn digit_at(&self, digits: &[u8], position: usize) -> Result<u8, BridgeError> {
        let digit = digits
            .get(position)
            .copied()
            .ok_or(BridgeError::PositionOutOfRange {
                position,
                available: digits.len(),
            })?;
        Ok(if self.shadow { (digit + 5) % 10 } else { digit })
    }
}

impl Bridge for PositionPairBridge {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BridgeKind {
        self.kind
    }

    fn predict(&self, window: &HistoryWindow<'_>) -> Result<PredictionSet, BridgeError> {
        let last = window.last().ok_or(BridgeError::EmptyWindow)?;
        let digits = last.digits();

        let a = self.digit_at(&digits, self.first)?;
        let b = self.digit_at(&digits, self.second)?;

        Ok([format!("{}{}", a, b), format!("{}{}", b, a)]
            .into_iter()
            .collect())
    }
}
