use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

use prop_ev::config::{Command, Config};
use prop_ev::engine::{
    rank_consistent, scan_markets, summarize, ConsistencyQuery, EvaluationOutcome,
    PortfolioTracker, PredictiveSimulator, ScanSettings, Settlement,
};
use prop_ev::model::ModelArtifact;
use prop_ev::provider::{MarketProvider, SnapshotProvider, StatsProvider};
use prop_ev::store::{parse_date, PortfolioStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let store = PortfolioStore::new(&config.portfolio_path);

    match &config.command {
        Command::Add { names } => {
            for name in names {
                store.track(name)?;
            }
        }
        Command::Remove { names } => {
            for name in names {
                if !store.untrack(name)? {
                    warn!("{} was not tracked", name);
                }
            }
        }
        Command::Consistent {
            cutoff,
            window,
            min_minutes,
            min_stat,
            top_k,
        } => {
            let stats = SnapshotProvider::open(&config.data_dir)?;
            let path = config.candidates_path();
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read candidates {}", path.display()))?;
            let candidates: Vec<String> = serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse candidates {}", path.display()))?;
            let query = ConsistencyQuery {
                cutoff: parse_date(cutoff).with_context(|| format!("bad cutoff {}", cutoff))?,
                window: *window,
                min_minutes: *min_minutes,
                category: config.category.clone(),
                min_stat: *min_stat,
                top_k: *top_k,
            };
            let tracked = store.load()?;
            let ranked = rank_consistent(&stats, &tracked, &candidates, &query).await?;
            println!("{:<28} {:>8} {:>8} {:>8}", "PLAYER", "MEAN", "STD", "MIN");
            for c in ranked {
                println!(
                    "{:<28} {:>8.2} {:>8.2} {:>8.1}",
                    c.entity, c.mean, c.std, c.minutes_mean
                );
            }
        }
        _ => evaluate_command(&config, store).await?,
    }

    Ok(())
}

/// Commands that price markets with the trained model.
async fn evaluate_command(config: &Config, store: PortfolioStore) -> Result<()> {
    let model = Arc::new(ModelArtifact::load(&config.model_path)?.into_model());
    let snapshot = Arc::new(SnapshotProvider::open(&config.data_dir)?);
    let stats: Arc<dyn StatsProvider> = snapshot.clone();
    let markets: Arc<dyn MarketProvider> = snapshot;

    let mut tracker = PortfolioTracker::new(
        store,
        stats.clone(),
        markets.clone(),
        model.clone(),
        config.category.clone(),
    )?;
    info!(
        "Portfolio {} tracks {} player(s)",
        config.portfolio_path.display(),
        tracker.entities().len()
    );

    match &config.command {
        Command::Evaluate { name } => {
            let outcome = tracker.evaluate(name).await?;
            print_outcome(name, &outcome);
        }
        Command::EvaluateAll => {
            let report = tracker.evaluate_all().await?;
            for (name, outcome) in &report.evaluated {
                print_outcome(name, outcome);
            }
            for (name, err) in &report.failed {
                println!("{:<28} skipped: {}", name, err);
            }
        }
        Command::Simulate { name } => {
            let market = markets
                .player_props(name)
                .await?
                .with_context(|| format!("{} currently has no odds listed", name))?;
            let row = stats
                .model_input(name, market.date)
                .await?
                .with_context(|| format!("no model input for {} on {}", name, market.date))?;
            let simulator = PredictiveSimulator::new(&model);
            let samples =
                simulator.simulate(&row, &config.excluded(), config.simulations, config.seed)?;
            let summary = summarize(&samples, market.over.line)?;
            println!(
                "{} {}: line {} | mean {:.2} std {:.2} over {:.1}% under {:.1}% ({} draws)",
                name,
                market.date,
                market.over.line,
                summary.mean,
                summary.std,
                summary.p_over * 100.0,
                summary.p_under * 100.0,
                summary.n
            );
        }
        Command::Scan => {
            let simulator = PredictiveSimulator::new(&model);
            let settings = ScanSettings {
                simulations: config.simulations,
                excluded: config.excluded(),
                certainty: config.certainty,
                seed: config.seed,
            };
            let bets =
                scan_markets(markets.as_ref(), stats.as_ref(), &simulator, &settings).await?;
            println!(
                "{:<28} {:>6} {:>7} {:>9} {:>8}",
                "PLAYER", "LINE", "OUTCOME", "P_OUTCOME", "EV"
            );
            for b in bets {
                println!(
                    "{:<28} {:>6.1} {:>7} {:>9.3} {:>+8.3}",
                    b.entity, b.line, b.side, b.probability, b.ev
                );
            }
        }
        Command::Add { .. } | Command::Remove { .. } | Command::Consistent { .. } => {}
    }

    Ok(())
}

fn print_outcome(name: &str, outcome: &EvaluationOutcome) {
    match outcome {
        EvaluationOutcome::AwaitingEvent { date } => {
            println!("{:<28} awaiting event on {}", name, date);
        }
        EvaluationOutcome::Opened { settlement, entry } => {
            match settlement {
                Some(Settlement::Settled { date, actual }) => {
                    println!("{:<28} settled {}: actual {}", name, date, actual)
                }
                Some(Settlement::RolledBack { date }) => {
                    println!("{:<28} did not play {}, prediction discarded", name, date)
                }
                None => {}
            }
            println!(
                "{:<28} {} {} {:.1} (predicted {:.1}, ev {:+.3})",
                name, entry.date, entry.side, entry.line, entry.predicted, entry.ev
            );
        }
    }
}
