//! Wager valuation.
//!
//! Prices are decimal odds: the total amount returned per unit staked on a
//! win, stake included (e.g. `1.91` for a -110 American price).

/// Expected value per unit staked.
///
/// EV = p · odds − 1
pub fn expected_value(prob_win: f64, odds_decimal: f64) -> f64 {
    prob_win * odds_decimal - 1.0
}

/// Expected amount returned for `stake`.
pub fn expected_payout(ev: f64, stake: f64) -> f64 {
    stake + ev * stake
}
