//! Prediction ledger for tracked entities.
//!
//! Each tracked entity carries at most one outstanding prediction. Evaluating
//! an entity settles (or discards) that prediction once its event date has
//! passed and then opens a new one against the current market. The store is
//! reloaded before and rewritten after every mutation.

use chrono::{Local, NaiveDate};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::stats::{mean_std, probability_over, probability_under};
use super::valuation::expected_value;
use crate::error::{EngineError, EngineResult};
use crate::model::CalibratedModel;
use crate::provider::{MarketProvider, PropMarket, StatsProvider};
use crate::store::{Portfolio, PortfolioStore, PredictionEntry, PredictionRecord, Side};

/// Category holding minutes played in game logs.
pub const MINUTES_CATEGORY: &str = "MIN";

/// What happened to the previous outstanding prediction.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    Settled { date: NaiveDate, actual: f64 },
    /// The entity did not play; the speculative prediction was discarded.
    RolledBack { date: NaiveDate },
}

#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationOutcome {
    /// The outstanding prediction's event has not happened yet.
    AwaitingEvent { date: NaiveDate },
    Opened {
        settlement: Option<Settlement>,
        entry: PredictionEntry,
    },
}

/// Result of evaluating every tracked entity.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub evaluated: Vec<(String, EvaluationOutcome)>,
    pub failed: Vec<(String, EngineError)>,
}

/// Parameters of the consistency ranking.
#[derive(Debug, Clone)]
pub struct ConsistencyQuery {
    /// Only games on or after this date count
    pub cutoff: NaiveDate,
    /// Number of most recent games considered
    pub window: usize,
    pub min_minutes: f64,
    pub category: String,
    pub min_stat: f64,
    pub top_k: usize,
}

impl Default for ConsistencyQuery {
    fn default() -> Self {
        ConsistencyQuery {
            cutoff: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default(),
            window: 2,
            min_minutes: 30.0,
            category: "PTS".into(),
            min_stat: 0.0,
            top_k: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsistentCandidate {
    pub entity: String,
    pub mean: f64,
    pub std: f64,
    pub minutes_mean: f64,
}

/// Price a point prediction against a market: estimate both sides under
/// `N(prediction, calibration_std²)`, back the more likely one and value it.
/// Ties go to the under.
pub fn price_prediction(
    prediction: f64,
    calibration_std: f64,
    market: &PropMarket,
) -> PredictionEntry {
    let p_over = probability_over(market.over.line, prediction, calibration_std);
    let p_under = probability_under(market.under.line, prediction, calibration_std);
    let (side, quote, p_win) = if p_over > p_under {
        (Side::Over, market.over, p_over)
    } else {
        (Side::Under, market.under, p_under)
    };
    PredictionEntry {
        predicted: prediction,
        line: quote.line,
        ev: expected_value(p_win, quote.price),
        date: market.date,
        side,
        actual: None,
    }
}

pub struct PortfolioTracker {
    store: PortfolioStore,
    portfolio: Portfolio,
    stats: Arc<dyn StatsProvider>,
    markets: Arc<dyn MarketProvider>,
    model: Arc<CalibratedModel>,
    /// Stat category predictions are made and settled in
    category: String,
}

impl PortfolioTracker {
    pub fn new(
        store: PortfolioStore,
        stats: Arc<dyn StatsProvider>,
        markets: Arc<dyn MarketProvider>,
        model: Arc<CalibratedModel>,
        category: impl Into<String>,
    ) -> EngineResult<Self> {
        let portfolio = store.load()?;
        Ok(PortfolioTracker {
            store,
            portfolio,
            stats,
            markets,
            model,
            category: category.into(),
        })
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn record(&self, entity: &str) -> Option<&PredictionRecord> {
        self.portfolio.get(entity)
    }

    pub fn entities(&self) -> Vec<String> {
        self.portfolio.keys().cloned().collect()
    }

    pub fn reload(&mut self) -> EngineResult<()> {
        self.portfolio = self.store.load()?;
        Ok(())
    }

    fn persist(&self) -> EngineResult<()> {
        self.store.save(&self.portfolio)
    }

    /// Start tracking `entity`. Returns `false` if it was already tracked.
    pub fn add(&mut self, entity: &str) -> EngineResult<bool> {
        let inserted = self.store.track(entity)?;
        self.reload()?;
        Ok(inserted)
    }

    /// Stop tracking `entity` and drop its history. Returns `false` if it was
    /// not tracked.
    pub fn remove(&mut self, entity: &str) -> EngineResult<bool> {
        let removed = self.store.untrack(entity)?;
        self.reload()?;
        Ok(removed)
    }

    pub async fn evaluate(&mut self, entity: &str) -> EngineResult<EvaluationOutcome> {
        self.evaluate_on(entity, Local::now().date_naive()).await
    }

    /// Evaluate `entity` as of `today`.
    pub async fn evaluate_on(
        &mut self,
        entity: &str,
        today: NaiveDate,
    ) -> EngineResult<EvaluationOutcome> {
        self.reload()?;
        let pending_date = self
            .portfolio
            .get(entity)
            .ok_or_else(|| EngineError::NotTracked(entity.to_string()))?
            .pending()
            .map(|p| p.date);

        let settlement = match pending_date {
            Some(date) if date >= today => {
                debug!("{} already has a prediction for {}", entity, date);
                return Ok(EvaluationOutcome::AwaitingEvent { date });
            }
            Some(date) => Some(self.settle(entity, date).await?),
            None => None,
        };

        let entry = self.open_prediction(entity, today).await?;
        Ok(EvaluationOutcome::Opened { settlement, entry })
    }

    /// Resolve the outstanding prediction dated `date` and persist the result.
    async fn settle(&mut self, entity: &str, date: NaiveDate) -> EngineResult<Settlement> {
        let line = self
            .stats
            .stats_on_date(entity, date)
            .await
            .map_err(EngineError::Provider)?;

        let actual = match line {
            Some(line) => Some(line.get(&self.category).copied().ok_or_else(|| {
                EngineError::Provider(anyhow::anyhow!(
                    "stat line for {} on {} has no {}",
                    entity,
                    date,
                    self.category
                ))
            })?),
            None => None,
        };

        let record = self
            .portfolio
            .get_mut(entity)
            .ok_or_else(|| EngineError::NotTracked(entity.to_string()))?;
        let settlement = match actual {
            Some(actual) => {
                record.settle(actual)?;
                info!("Settled {} for {}: {} = {}", entity, date, self.category, actual);
                Settlement::Settled { date, actual }
            }
            None => {
                record.rollback();
                info!("{} did not play on {}, discarding prediction", entity, date);
                Settlement::RolledBack { date }
            }
        };
        self.persist()?;
        Ok(settlement)
    }

    async fn open_prediction(
        &mut self,
        entity: &str,
        today: NaiveDate,
    ) -> EngineResult<PredictionEntry> {
        let market = self
            .markets
            .player_props(entity)
            .await
            .map_err(EngineError::Provider)?
            .ok_or_else(|| EngineError::MissingMarketData {
                entity: entity.to_string(),
            })?;

        // a listing must be for an event after everything already recorded
        let last_date = self
            .portfolio
            .get(entity)
            .and_then(|r| r.entries().last())
            .map(|e| e.date);
        if market.date < today || last_date.is_some_and(|last| market.date <= last) {
            return Err(EngineError::StaleMarket {
                entity: entity.to_string(),
                date: market.date,
            });
        }

        let row = self
            .stats
            .model_input(entity, market.date)
            .await
            .map_err(EngineError::Provider)?
            .ok_or_else(|| EngineError::MissingFeatureInput {
                entity: entity.to_string(),
                date: market.date,
            })?;

        let prediction = self.model.predict(&row)?;
        let entry = price_prediction(prediction, self.model.mae, &market);

        let record = self
            .portfolio
            .get_mut(entity)
            .ok_or_else(|| EngineError::NotTracked(entity.to_string()))?;
        record.open(entry.clone())?;
        self.persist()?;

        info!(
            "{} {}: predicted {:.1}, {} {} (ev {:+.3})",
            entity, market.date, prediction, entry.side, entry.line, entry.ev
        );
        Ok(entry)
    }

    pub async fn evaluate_all(&mut self) -> EngineResult<BatchReport> {
        self.evaluate_all_on(Local::now().date_naive()).await
    }

    /// Evaluate every tracked entity. Failures for one entity are logged and
    /// collected; store failures abort the batch.
    pub async fn evaluate_all_on(&mut self, today: NaiveDate) -> EngineResult<BatchReport> {
        self.reload()?;
        let mut report = BatchReport::default();
        for entity in self.entities() {
            match self.evaluate_on(&entity, today).await {
                Ok(outcome) => report.evaluated.push((entity, outcome)),
                Err(e) if e.is_persistence() => return Err(e),
                Err(e) => {
                    warn!("Evaluation of {} failed: {}", entity, e);
                    report.failed.push((entity, e));
                }
            }
        }
        info!(
            "Evaluated {} entities ({} failed)",
            report.evaluated.len() + report.failed.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Rank candidates not yet in the portfolio; see [`rank_consistent`].
    pub async fn most_consistent(
        &mut self,
        candidates: &[String],
        query: &ConsistencyQuery,
    ) -> EngineResult<Vec<ConsistentCandidate>> {
        self.reload()?;
        rank_consistent(self.stats.as_ref(), &self.portfolio, candidates, query).await
    }
}

/// Rank candidates absent from `tracked` by the standard deviation of
/// `query.category` over their last `query.window` games, most consistent
/// first. Candidates are queried one at a time.
pub async fn rank_consistent(
    stats: &dyn StatsProvider,
    tracked: &Portfolio,
    candidates: &[String],
    query: &ConsistencyQuery,
) -> EngineResult<Vec<ConsistentCandidate>> {
    let mut ranked = Vec::new();
    for entity in candidates {
        if tracked.contains_key(entity) {
            continue;
        }
        match consistency_of(stats, entity, query).await {
            Ok(Some(c)) => {
                if c.mean >= query.min_stat && c.minutes_mean >= query.min_minutes {
                    ranked.push(c);
                }
            }
            Ok(None) => debug!("Not enough recent games for {}", entity),
            Err(e) => warn!("Skipping {}: {}", entity, e),
        }
    }
    ranked.sort_by(|a, b| a.std.total_cmp(&b.std));
    ranked.truncate(query.top_k);
    Ok(ranked)
}

async fn consistency_of(
    stats: &dyn StatsProvider,
    entity: &str,
    query: &ConsistencyQuery,
) -> EngineResult<Option<ConsistentCandidate>> {
    let Some(values) = stats
        .last_stats_in_category(entity, query.window, &query.category, query.cutoff)
        .await
        .map_err(EngineError::Provider)?
    else {
        return Ok(None);
    };
    let Some(minutes) = stats
        .last_stats_in_category(entity, query.window, MINUTES_CATEGORY, query.cutoff)
        .await
        .map_err(EngineError::Provider)?
    else {
        return Ok(None);
    };
    let (mean, std) = mean_std(&values)?;
    let (minutes_mean, _) = mean_std(&minutes)?;
    Ok(Some(ConsistentCandidate {
        entity: entity.to_string(),
        mean,
        std,
        minutes_mean,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FeatureRow, PointPredictor};
    use crate::provider::{Quote, StatLine};
    use crate::store::{parse_date, RecordLayout, RecordState};
    use approx::assert_relative_eq;
    use async_trait::async_trait;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn d(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[derive(Default)]
    struct FakeStats {
        lines: HashMap<(String, NaiveDate), StatLine>,
        recent: HashMap<(String, String), Vec<f64>>,
        inputs: HashMap<String, FeatureRow>,
        failing: Vec<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl StatsProvider for FakeStats {
        fn name(&self) -> &str {
            "fake"
        }

        async fn stats_on_date(
            &self,
            entity: &str,
            date: NaiveDate,
        ) -> anyhow::Result<Option<StatLine>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.lines.get(&(entity.to_string(), date)).cloned())
        }

        async fn last_stats_in_category(
            &self,
            entity: &str,
            num_games: usize,
            category: &str,
            _cutoff: NaiveDate,
        ) -> anyhow::Result<Option<Vec<f64>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.iter().any(|f| f == entity) {
                anyhow::bail!("rate limited");
            }
            Ok(self
                .recent
                .get(&(entity.to_string(), category.to_string()))
                .filter(|v| v.len() >= num_games)
                .map(|v| v[..num_games].to_vec()))
        }

        async fn model_input(
            &self,
            entity: &str,
            _date: NaiveDate,
        ) -> anyhow::Result<Option<FeatureRow>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.inputs.get(entity).cloned())
        }
    }

    #[derive(Default)]
    struct FakeMarkets {
        props: BTreeMap<String, PropMarket>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MarketProvider for FakeMarkets {
        fn name(&self) -> &str {
            "fake"
        }

        async fn player_props(&self, entity: &str) -> anyhow::Result<Option<PropMarket>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.props.get(entity).cloned())
        }

        async fn all_player_props(&self) -> anyhow::Result<BTreeMap<String, PropMarket>> {
            Ok(self.props.clone())
        }
    }

    struct Fixed {
        value: f64,
        calls: Arc<AtomicUsize>,
    }

    impl PointPredictor for Fixed {
        fn predict(&self, _row: &FeatureRow) -> EngineResult<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.value)
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        store: PortfolioStore,
        stats: Arc<FakeStats>,
        markets: Arc<FakeMarkets>,
        model_calls: Arc<AtomicUsize>,
        tracker: PortfolioTracker,
    }

    fn market(date: &str, over: f64, under: f64) -> PropMarket {
        PropMarket {
            date: d(date),
            over: Quote { line: over, price: 1.9 },
            under: Quote { line: under, price: 1.9 },
        }
    }

    fn harness(
        portfolio: Portfolio,
        stats: FakeStats,
        markets: FakeMarkets,
        prediction: f64,
    ) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = PortfolioStore::new(dir.path().join("portfolio.json"));
        store.save(&portfolio).unwrap();
        let stats = Arc::new(stats);
        let markets = Arc::new(markets);
        let model_calls = Arc::new(AtomicUsize::new(0));
        let model = CalibratedModel::new(
            Box::new(Fixed {
                value: prediction,
                calls: model_calls.clone(),
            }),
            5.0,
            BTreeMap::new(),
        );
        let tracker = PortfolioTracker::new(
            store.clone(),
            stats.clone(),
            markets.clone(),
            Arc::new(model),
            "PTS",
        )
        .unwrap();
        Harness {
            _dir: dir,
            store,
            stats,
            markets,
            model_calls,
            tracker,
        }
    }

    fn pending_portfolio(entity: &str, date: &str) -> Portfolio {
        let mut record = PredictionRecord::new();
        record
            .open(PredictionEntry {
                predicted: 10.0,
                line: 8.5,
                ev: 0.1,
                date: d(date),
                side: Side::Over,
                actual: None,
            })
            .unwrap();
        let mut p = Portfolio::new();
        p.insert(entity.to_string(), record);
        p
    }

    fn stored_layout(store: &PortfolioStore, entity: &str) -> RecordLayout {
        let p = store.load().unwrap();
        p[entity].clone().into()
    }

    #[tokio::test]
    async fn missed_settlement_rolls_back_pending_prediction() {
        let mut h = harness(
            pending_portfolio("Jalen Green", "01/01/2025"),
            FakeStats::default(),
            FakeMarkets::default(),
            20.0,
        );
        let err = h
            .tracker
            .evaluate_on("Jalen Green", d("01/05/2025"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingMarketData { .. }));

        let raw = stored_layout(&h.store, "Jalen Green");
        assert!(raw.predicted.is_empty());
        assert!(raw.line.is_empty());
        assert!(raw.ev.is_empty());
        assert!(raw.date.is_empty());
        assert!(raw.actual.is_empty());
    }

    #[tokio::test]
    async fn passed_event_is_settled() {
        let mut stats = FakeStats::default();
        let line: StatLine = [("PTS".to_string(), 22.0)].into_iter().collect();
        stats
            .lines
            .insert(("Jaylen Brown".to_string(), d("01/01/2025")), line);
        let mut h = harness(
            pending_portfolio("Jaylen Brown", "01/01/2025"),
            stats,
            FakeMarkets::default(),
            20.0,
        );
        let _ = h.tracker.evaluate_on("Jaylen Brown", d("01/02/2025")).await;

        let raw = stored_layout(&h.store, "Jaylen Brown");
        assert_eq!(raw.actual, vec![22.0]);
        assert_eq!(raw.predicted, vec![10.0]);
        assert_eq!(raw.line, vec![8.5]);
        assert_eq!(raw.ev, vec![0.1]);
        assert_eq!(raw.date, vec!["01/01/2025".to_string()]);
    }

    #[tokio::test]
    async fn settlement_then_new_prediction() {
        let mut stats = FakeStats::default();
        stats.lines.insert(
            ("Jaylen Brown".to_string(), d("01/01/2025")),
            [("PTS".to_string(), 22.0)].into_iter().collect(),
        );
        stats
            .inputs
            .insert("Jaylen Brown".to_string(), FeatureRow::new());
        let mut markets = FakeMarkets::default();
        markets
            .props
            .insert("Jaylen Brown".to_string(), market("01/03/2025", 19.5, 19.5));
        let mut h = harness(
            pending_portfolio("Jaylen Brown", "01/01/2025"),
            stats,
            markets,
            25.0,
        );

        let outcome = h
            .tracker
            .evaluate_on("Jaylen Brown", d("01/02/2025"))
            .await
            .unwrap();
        match outcome {
            EvaluationOutcome::Opened { settlement, entry } => {
                assert_eq!(
                    settlement,
                    Some(Settlement::Settled {
                        date: d("01/01/2025"),
                        actual: 22.0
                    })
                );
                assert_eq!(entry.date, d("01/03/2025"));
            }
            other => panic!("Expected Opened, got {:?}", other),
        }
        let record = &h.store.load().unwrap()["Jaylen Brown"];
        assert_eq!(record.len(), 2);
        assert_eq!(record.state(), RecordState::PendingSettlement);
    }

    #[tokio::test]
    async fn stale_listing_does_not_reopen_a_settled_event() {
        let mut stats = FakeStats::default();
        stats.lines.insert(
            ("Jaylen Brown".to_string(), d("01/01/2025")),
            [("PTS".to_string(), 22.0)].into_iter().collect(),
        );
        stats
            .inputs
            .insert("Jaylen Brown".to_string(), FeatureRow::new());
        let mut markets = FakeMarkets::default();
        markets
            .props
            .insert("Jaylen Brown".to_string(), market("01/01/2025", 19.5, 19.5));
        let mut h = harness(
            pending_portfolio("Jaylen Brown", "01/01/2025"),
            stats,
            markets,
            25.0,
        );

        for _ in 0..3 {
            let err = h
                .tracker
                .evaluate_on("Jaylen Brown", d("01/05/2025"))
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::StaleMarket { .. }));
        }

        let raw = stored_layout(&h.store, "Jaylen Brown");
        assert_eq!(raw.date, vec!["01/01/2025".to_string()]);
        assert_eq!(raw.actual, vec![22.0]);
        assert_eq!(h.model_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn listing_dated_before_today_is_stale() {
        let mut stats = FakeStats::default();
        stats
            .inputs
            .insert("Stephen Curry".to_string(), FeatureRow::new());
        let mut markets = FakeMarkets::default();
        markets
            .props
            .insert("Stephen Curry".to_string(), market("05/04/2025", 19.5, 19.5));
        let mut p = Portfolio::new();
        p.insert("Stephen Curry".to_string(), PredictionRecord::new());
        let mut h = harness(p, stats, markets, 25.0);

        let err = h
            .tracker
            .evaluate_on("Stephen Curry", d("05/05/2025"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::StaleMarket { .. }));
        assert!(h.store.load().unwrap()["Stephen Curry"].is_empty());

        // a game later today is still upcoming
        h.tracker
            .evaluate_on("Stephen Curry", d("05/04/2025"))
            .await
            .unwrap();
        assert_eq!(h.store.load().unwrap()["Stephen Curry"].len(), 1);
    }

    #[tokio::test]
    async fn pending_event_today_is_a_no_op() {
        let mut h = harness(
            pending_portfolio("Nikola Jokic", "03/10/2025"),
            FakeStats::default(),
            FakeMarkets::default(),
            20.0,
        );
        let before = h.store.load().unwrap();
        for today in ["03/10/2025", "03/09/2025"] {
            let outcome = h.tracker.evaluate_on("Nikola Jokic", d(today)).await.unwrap();
            assert_eq!(
                outcome,
                EvaluationOutcome::AwaitingEvent {
                    date: d("03/10/2025")
                }
            );
        }
        assert_eq!(h.model_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.markets.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.stats.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.store.load().unwrap(), before);
    }

    #[tokio::test]
    async fn new_prediction_backs_over_when_more_likely() {
        let mut stats = FakeStats::default();
        stats
            .inputs
            .insert("Stephen Curry".to_string(), FeatureRow::new());
        let mut markets = FakeMarkets::default();
        markets
            .props
            .insert("Stephen Curry".to_string(), market("05/06/2025", 19.5, 19.5));
        let mut p = Portfolio::new();
        p.insert("Stephen Curry".to_string(), PredictionRecord::new());
        let mut h = harness(p, stats, markets, 25.0);

        h.tracker
            .evaluate_on("Stephen Curry", d("05/05/2025"))
            .await
            .unwrap();

        let record = &h.store.load().unwrap()["Stephen Curry"];
        let entry = record.pending().unwrap();
        let p_over = probability_over(19.5, 25.0, 5.0);
        assert_eq!(entry.side, Side::Over);
        assert_relative_eq!(entry.predicted, 25.0);
        assert_relative_eq!(entry.line, 19.5);
        assert_relative_eq!(entry.ev, p_over * 1.9 - 1.0, epsilon = 1e-12);
        assert_eq!(h.model_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn under_side_records_under_line() {
        let m = market("05/06/2025", 19.5, 20.5);
        let entry = price_prediction(15.0, 5.0, &m);
        assert_eq!(entry.side, Side::Under);
        assert_relative_eq!(entry.line, 20.5);
        let p_under = probability_under(20.5, 15.0, 5.0);
        assert_relative_eq!(entry.ev, p_under * 1.9 - 1.0, epsilon = 1e-12);
    }

    #[test]
    fn equal_probabilities_back_the_under() {
        let m = market("05/06/2025", 20.0, 20.0);
        assert_eq!(price_prediction(20.0, 5.0, &m).side, Side::Under);
    }

    #[tokio::test]
    async fn missing_feature_input_leaves_record_untouched() {
        let mut markets = FakeMarkets::default();
        markets
            .props
            .insert("Rudy Gobert".to_string(), market("05/06/2025", 12.5, 12.5));
        let mut p = Portfolio::new();
        p.insert("Rudy Gobert".to_string(), PredictionRecord::new());
        let mut h = harness(p, FakeStats::default(), markets, 14.0);

        let err = h
            .tracker
            .evaluate_on("Rudy Gobert", d("05/05/2025"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingFeatureInput { .. }));
        assert!(h.store.load().unwrap()["Rudy Gobert"].is_empty());
        assert_eq!(h.model_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn untracked_entity_is_an_error() {
        let mut h = harness(
            Portfolio::new(),
            FakeStats::default(),
            FakeMarkets::default(),
            20.0,
        );
        let err = h
            .tracker
            .evaluate_on("Nobody", d("05/05/2025"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotTracked(_)));
    }

    #[tokio::test]
    async fn evaluate_all_isolates_failures() {
        let mut stats = FakeStats::default();
        stats
            .inputs
            .insert("Anthony Edwards".to_string(), FeatureRow::new());
        let mut markets = FakeMarkets::default();
        markets
            .props
            .insert("Anthony Edwards".to_string(), market("05/06/2025", 26.5, 26.5));
        let mut p = Portfolio::new();
        p.insert("Anthony Edwards".to_string(), PredictionRecord::new());
        p.insert("Kawhi Leonard".to_string(), PredictionRecord::new());
        let mut h = harness(p, stats, markets, 28.0);

        let report = h.tracker.evaluate_all_on(d("05/05/2025")).await.unwrap();
        assert_eq!(report.evaluated.len(), 1);
        assert_eq!(report.evaluated[0].0, "Anthony Edwards");
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "Kawhi Leonard");
        assert!(matches!(
            report.failed[0].1,
            EngineError::MissingMarketData { .. }
        ));

        let stored = h.store.load().unwrap();
        assert_eq!(stored["Anthony Edwards"].len(), 1);
        assert!(stored["Kawhi Leonard"].is_empty());
    }

    #[tokio::test]
    async fn evaluate_all_aborts_on_corrupt_store() {
        let mut h = harness(
            pending_portfolio("Jalen Brunson", "01/01/2025"),
            FakeStats::default(),
            FakeMarkets::default(),
            20.0,
        );
        std::fs::write(h.store.path(), "{ broken").unwrap();
        let err = h.tracker.evaluate_all_on(d("05/05/2025")).await.unwrap_err();
        assert!(err.is_persistence());
    }

    #[tokio::test]
    async fn add_is_idempotent_and_remove_deletes() {
        let mut h = harness(
            pending_portfolio("Myles Turner", "01/01/2025"),
            FakeStats::default(),
            FakeMarkets::default(),
            20.0,
        );
        assert!(h.tracker.add("Derrick White").unwrap());
        assert!(!h.tracker.add("Derrick White").unwrap());
        assert!(!h.tracker.add("Myles Turner").unwrap());
        // existing history survives a repeated add
        assert_eq!(h.store.load().unwrap()["Myles Turner"].len(), 1);

        assert!(h.tracker.remove("Myles Turner").unwrap());
        assert!(!h.tracker.remove("Myles Turner").unwrap());
        let stored = h.store.load().unwrap();
        assert_eq!(stored.keys().collect::<Vec<_>>(), vec!["Derrick White"]);
        assert_eq!(h.tracker.entities(), vec!["Derrick White".to_string()]);
    }

    #[tokio::test]
    async fn mutations_see_external_writes() {
        let mut h = harness(
            Portfolio::new(),
            FakeStats::default(),
            FakeMarkets::default(),
            20.0,
        );
        h.store
            .save(&pending_portfolio("Evan Mobley", "01/01/2025"))
            .unwrap();
        h.tracker.add("Jarrett Allen").unwrap();
        let stored = h.store.load().unwrap();
        assert!(stored.contains_key("Evan Mobley"));
        assert!(stored.contains_key("Jarrett Allen"));
    }

    fn recent(stats: &mut FakeStats, entity: &str, pts: &[f64], minutes: &[f64]) {
        stats
            .recent
            .insert((entity.to_string(), "PTS".to_string()), pts.to_vec());
        stats
            .recent
            .insert((entity.to_string(), "MIN".to_string()), minutes.to_vec());
    }

    #[tokio::test]
    async fn most_consistent_ranks_by_ascending_std() {
        let mut stats = FakeStats::default();
        let mins = [34.0, 36.0, 35.0];
        recent(&mut stats, "A", &[18.0, 20.0, 22.0], &mins);
        recent(&mut stats, "B", &[20.0, 25.0, 30.0], &mins);
        recent(&mut stats, "C", &[17.0, 18.0, 19.0], &mins);
        // tracked, below the stat floor, short on minutes, failing fetch, no data
        recent(&mut stats, "Tracked", &[30.0, 30.0, 30.0], &mins);
        recent(&mut stats, "Bench", &[5.0, 5.0, 5.0], &mins);
        recent(&mut stats, "Rotation", &[20.0, 20.0, 20.0], &[12.0, 14.0, 10.0]);
        stats.failing.push("Flaky".to_string());

        let mut p = Portfolio::new();
        p.insert("Tracked".to_string(), PredictionRecord::new());
        let mut h = harness(p, stats, FakeMarkets::default(), 20.0);

        let candidates: Vec<String> = ["A", "Tracked", "B", "Flaky", "Bench", "Rotation", "C", "Unknown"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let query = ConsistencyQuery {
            window: 3,
            min_stat: 15.0,
            top_k: 2,
            ..ConsistencyQuery::default()
        };
        let ranked = h.tracker.most_consistent(&candidates, &query).await.unwrap();
        let names: Vec<&str> = ranked.iter().map(|c| c.entity.as_str()).collect();
        assert_eq!(names, vec!["C", "A"]);
        assert_relative_eq!(ranked[0].std, 1.0, epsilon = 1e-12);
        assert_relative_eq!(ranked[1].mean, 20.0, epsilon = 1e-12);
        assert_relative_eq!(ranked[1].std, 2.0, epsilon = 1e-12);

        let all = h
            .tracker
            .most_consistent(&candidates, &ConsistencyQuery { top_k: 10, ..query })
            .await
            .unwrap();
        let names: Vec<&str> = all.iter().map(|c| c.entity.as_str()).collect();
        assert_eq!(names, vec!["C", "A", "B"]);
    }
}
