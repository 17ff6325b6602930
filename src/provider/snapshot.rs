use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info, warn};

use super::{MarketProvider, PropMarket, StatLine, StatsProvider};
use crate::model::FeatureRow;
use crate::store::{event_date, parse_date};

pub const ODDS_FILE: &str = "odds.json";
pub const GAME_LOGS_FILE: &str = "game_logs.json";
pub const MODEL_INPUTS_FILE: &str = "model_inputs.json";

#[derive(Debug, Clone, Deserialize)]
struct GameLog {
    #[serde(with = "event_date")]
    date: NaiveDate,
    stats: StatLine,
}

/// Provider backed by JSON snapshots exported into a data directory:
///
/// - `odds.json`: `{entity: {date, over: {line, price}, under: {line, price}}}`
/// - `game_logs.json`: `{entity: [{date, stats: {category: value}}]}`
/// - `model_inputs.json`: `{entity: {date: {feature: value}}}`
///
/// Missing files are treated as empty.
pub struct SnapshotProvider {
    props: BTreeMap<String, PropMarket>,
    /// Most recent game first
    game_logs: HashMap<String, Vec<GameLog>>,
    model_inputs: HashMap<String, HashMap<NaiveDate, FeatureRow>>,
}

impl SnapshotProvider {
    pub fn open(data_dir: &Path) -> Result<Self> {
        let props = load_props(&data_dir.join(ODDS_FILE))?;

        let mut game_logs: HashMap<String, Vec<GameLog>> =
            read_json(&data_dir.join(GAME_LOGS_FILE))?.unwrap_or_default();
        for logs in game_logs.values_mut() {
            logs.sort_by(|a, b| b.date.cmp(&a.date));
        }

        let raw_inputs: HashMap<String, HashMap<String, FeatureRow>> =
            read_json(&data_dir.join(MODEL_INPUTS_FILE))?.unwrap_or_default();
        let mut model_inputs = HashMap::new();
        for (entity, rows) in raw_inputs {
            let mut by_date = HashMap::new();
            for (date, row) in rows {
                let date = parse_date(&date)
                    .with_context(|| format!("bad model input date {:?} for {}", date, entity))?;
                by_date.insert(date, row);
            }
            model_inputs.insert(entity, by_date);
        }

        info!(
            "Snapshot provider loaded from {}: {} market(s), {} game log(s), {} input set(s)",
            data_dir.display(),
            props.len(),
            game_logs.len(),
            model_inputs.len()
        );
        Ok(SnapshotProvider {
            props,
            game_logs,
            model_inputs,
        })
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        warn!("Snapshot file {} not found, treating as empty", path.display());
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if text.trim().is_empty() {
        return Ok(None);
    }
    let value = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}

/// Entities whose market lacks a side or a date are skipped, not fatal.
fn load_props(path: &Path) -> Result<BTreeMap<String, PropMarket>> {
    let raw: BTreeMap<String, serde_json::Value> = read_json(path)?.unwrap_or_default();
    let mut props = BTreeMap::new();
    for (entity, value) in raw {
        match serde_json::from_value::<PropMarket>(value) {
            Ok(market) => {
                props.insert(entity, market);
            }
            Err(e) => debug!("Skipping incomplete market for {}: {}", entity, e),
        }
    }
    Ok(props)
}

#[async_trait]
impl StatsProvider for SnapshotProvider {
    fn name(&self) -> &str {
        "snapshot"
    }

    async fn stats_on_date(&self, entity: &str, date: NaiveDate) -> Result<Option<StatLine>> {
        let line = self
            .game_logs
            .get(entity)
            .and_then(|logs| logs.iter().find(|g| g.date == date))
            .map(|g| g.stats.clone());
        if line.is_none() {
            info!("No stat-line found for {} on {}", entity, date);
        }
        Ok(line)
    }

    async fn last_stats_in_category(
        &self,
        entity: &str,
        num_games: usize,
        category: &str,
        cutoff: NaiveDate,
    ) -> Result<Option<Vec<f64>>> {
        let Some(logs) = self.game_logs.get(entity) else {
            return Ok(None);
        };
        let recent: Vec<&GameLog> = logs
            .iter()
            .filter(|g| g.date >= cutoff)
            .take(num_games)
            .collect();
        if recent.len() < num_games {
            debug!("{} has not played {} games since {}", entity, num_games, cutoff);
            return Ok(None);
        }
        Ok(recent
            .iter()
            .map(|g| g.stats.get(category).copied())
            .collect::<Option<Vec<f64>>>())
    }

    async fn model_input(&self, entity: &str, date: NaiveDate) -> Result<Option<FeatureRow>> {
        Ok(self
            .model_inputs
            .get(entity)
            .and_then(|rows| rows.get(&date))
            .cloned())
    }
}

#[async_trait]
impl MarketProvider for SnapshotProvider {
    fn name(&self) -> &str {
        "snapshot"
    }

    async fn player_props(&self, entity: &str) -> Result<Option<PropMarket>> {
        Ok(self.props.get(entity).cloned())
    }

    async fn all_player_props(&self) -> Result<BTreeMap<String, PropMarket>> {
        Ok(self.props.clone())
    }
}
