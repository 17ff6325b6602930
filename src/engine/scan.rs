use std::collections::HashSet;
use tracing::{debug, info, warn};

use super::simulator::PredictiveSimulator;
use super::stats::empirical_over_probability;
use super::valuation::expected_value;
use crate::error::{EngineError, EngineResult};
use crate::provider::{MarketProvider, PropMarket, StatsProvider};
use crate::store::Side;

#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub simulations: usize,
    pub excluded: HashSet<String>,
    /// Minimum simulated probability of the backed side
    pub certainty: f64,
    pub seed: Option<u64>,
}

/// A market side whose simulated probability clears the certainty threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueBet {
    pub entity: String,
    pub line: f64,
    pub side: Side,
    pub probability: f64,
    pub ev: f64,
}

/// Pick the side of `market` backed by the simulated `samples`, if either side
/// is more likely than `certainty`. Each side is tallied against its own line.
pub fn pick_side(
    entity: &str,
    market: &PropMarket,
    samples: &[f64],
    certainty: f64,
) -> Option<ValueBet> {
    if samples.is_empty() {
        return None;
    }
    let p_over = empirical_over_probability(samples, market.over.line);
    let p_under = 1.0 - empirical_over_probability(samples, market.under.line);
    let (side, quote, probability) = if p_over > certainty {
        (Side::Over, market.over, p_over)
    } else if p_under > certainty {
        (Side::Under, market.under, p_under)
    } else {
        return None;
    };
    Some(ValueBet {
        entity: entity.to_string(),
        line: quote.line,
        side,
        probability,
        ev: expected_value(probability, quote.price),
    })
}

/// Simulate every entity with a listed market and return the confident
/// sides, best expected value first. Entities are processed one at a time;
/// per-entity failures are logged and skipped.
pub async fn scan_markets(
    markets: &dyn MarketProvider,
    stats: &dyn StatsProvider,
    simulator: &PredictiveSimulator<'_>,
    settings: &ScanSettings,
) -> EngineResult<Vec<ValueBet>> {
    let props = markets
        .all_player_props()
        .await
        .map_err(EngineError::Provider)?;
    info!("Scanning {} market(s) from {}", props.len(), markets.name());

    let mut bets = Vec::new();
    for (entity, market) in &props {
        let row = match stats.model_input(entity, market.date).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                debug!("No model input for {} on {}", entity, market.date);
                continue;
            }
            Err(e) => {
                warn!("Skipping {}: {:#}", entity, e);
                continue;
            }
        };
        let samples = match simulator.simulate(
            &row,
            &settings.excluded,
            settings.simulations,
            settings.seed,
        ) {
            Ok(s) => s,
            Err(e) => {
                warn!("Simulation for {} failed: {}", entity, e);
                continue;
            }
        };
        if let Some(bet) = pick_side(entity, market, &samples, settings.certainty) {
            bets.push(bet);
        }
    }
    bets.sort_by(|a, b| b.ev.total_cmp(&a.ev));
    Ok(bets)
}
