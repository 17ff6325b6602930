pub mod portfolio;
pub mod scan;
pub mod simulator;
pub mod stats;
pub mod valuation;

pub use portfolio::{
    rank_consistent, ConsistencyQuery, EvaluationOutcome, PortfolioTracker, Settlement,
};
pub use scan::{scan_markets, ScanSettings};
pub use simulator::{summarize, PredictiveSimulator};
