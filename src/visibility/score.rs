//! Ranking score

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// `round(wins / window * 10, 2)`, clamped to `[0, 10]`; zero for an empty window
pub fn compute_score(wins_in_window: u32, window: u32) -> Decimal {
    if window == 0 {
        return Decimal::ZERO;
    }
    let score = (Decimal::from(wins_in_window) / Decimal::from(window) * dec!(10)).round_dp(2);
    score.clamp(Decimal::ZERO, dec!(10))
}

/// Win percentage over a window, two decimals
pub fn window_rate(wins: u32, scored: u32) -> Decimal {
    if scored == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(wins) / Decimal::from(scored) * dec!(100)).round_dp(2)
}
