use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::path::PathBuf;

/// Player prop expected-value engine
#[derive(Parser, Debug, Clone)]
#[command(name = "prop-ev", version, about)]
pub struct Config {
    /// Portfolio ledger (JSON)
    #[arg(long, env = "PORTFOLIO_PATH", default_value = "betting_data/portfolio.json")]
    pub portfolio_path: PathBuf,

    /// Directory holding the odds, game-log and model-input snapshots
    #[arg(long, env = "DATA_DIR", default_value = "player_data")]
    pub data_dir: PathBuf,

    /// Trained model artifact (JSON)
    #[arg(long, env = "MODEL_PATH", default_value = "model/model.json")]
    pub model_path: PathBuf,

    /// Stat category predictions are made and settled in
    #[arg(long, env = "CATEGORY", default_value = "PTS")]
    pub category: String,

    /// Number of Monte Carlo draws per simulation
    #[arg(long, env = "NUM_SIMULATIONS", default_value = "1000")]
    pub simulations: usize,

    /// Seed for reproducible simulations
    #[arg(long, env = "SIM_SEED")]
    pub seed: Option<u64>,

    /// Features never randomized during simulation (comma separated)
    #[arg(
        long,
        env = "EXCLUDED_FEATURES",
        value_delimiter = ',',
        default_value = "REST"
    )]
    pub excluded_features: Vec<String>,

    /// JSON array of candidate entity names for the consistency ranking
    /// (defaults to <data-dir>/candidates.json)
    #[arg(long, env = "CANDIDATES_PATH")]
    pub candidates_path: Option<PathBuf>,

    /// Minimum simulated probability for a side to be reported by `scan`
    #[arg(long, env = "CERTAINTY_LINE", default_value = "0.9")]
    pub certainty: f64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start tracking one or more players
    Add { names: Vec<String> },
    /// Stop tracking one or more players
    Remove { names: Vec<String> },
    /// Settle and re-evaluate a single tracked player
    Evaluate { name: String },
    /// Settle and re-evaluate every tracked player
    EvaluateAll,
    /// Rank untracked candidates by recent consistency
    Consistent {
        /// Only games on or after this date (MM/DD/YYYY)
        #[arg(long, default_value = "01/01/2025")]
        cutoff: String,
        /// Number of most recent games
        #[arg(long, default_value = "2")]
        window: usize,
        #[arg(long, default_value = "30")]
        min_minutes: f64,
        #[arg(long, default_value = "0")]
        min_stat: f64,
        #[arg(long, default_value = "10")]
        top_k: usize,
    },
    /// Simulate a player's next game against the current line
    Simulate { name: String },
    /// Report the confident sides across every listed market
    Scan,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.simulations == 0 {
            anyhow::bail!("simulations must be at least 1");
        }
        if !(0.5..=1.0).contains(&self.certainty) {
            anyhow::bail!("certainty must be between 0.5 and 1.0");
        }
        if self.category.trim().is_empty() {
            anyhow::bail!("category must not be empty");
        }
        if let Command::Consistent { window, top_k, .. } = &self.command {
            if *window == 0 || *top_k == 0 {
                anyhow::bail!("window and top_k must be at least 1");
            }
        }
        Ok(())
    }

    pub fn excluded(&self) -> HashSet<String> {
        self.excluded_features
            .iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect()
    }

    pub fn candidates_path(&self) -> PathBuf {
        self.candidates_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("candidates.json"))
    }
}
