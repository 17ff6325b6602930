pub mod snapshot;

pub use snapshot::SnapshotProvider;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::model::FeatureRow;
use crate::store::event_date;

/// One side of an over/under market.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub line: f64,
    /// Decimal odds
    pub price: f64,
}

/// Current over/under market for an entity's next event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropMarket {
    #[serde(with = "event_date")]
    pub date: NaiveDate,
    pub over: Quote,
    pub under: Quote,
}

/// Realized box score: category (e.g. `PTS`, `MIN`) -> value.
pub type StatLine = HashMap<String, f64>;

/// Game-log and feature source for tracked entities.
#[async_trait]
pub trait StatsProvider: Send + Sync {
    /// Realized stat line for the entity on `date`, `None` if it did not play.
    async fn stats_on_date(&self, entity: &str, date: NaiveDate) -> Result<Option<StatLine>>;

    /// The last `num_games` values of `category` played on or after `cutoff`,
    /// most recent first. `None` when fewer games are available.
    async fn last_stats_in_category(
        &self,
        entity: &str,
        num_games: usize,
        category: &str,
        cutoff: NaiveDate,
    ) -> Result<Option<Vec<f64>>>;

    /// Model input row for the entity's event on `date`.
    async fn model_input(&self, entity: &str, date: NaiveDate) -> Result<Option<FeatureRow>>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

/// Source of current over/under markets.
#[async_trait]
pub trait MarketProvider: Send + Sync {
    async fn player_props(&self, entity: &str) -> Result<Option<PropMarket>>;

    async fn all_player_props(&self) -> Result<BTreeMap<String, PropMarket>>;

    fn name(&self) -> &str;
}
