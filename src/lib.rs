//! Expected-value engine for player prop markets.
//!
//! A trained point-prediction model is turned into over/under probabilities
//! (normal approximation around the prediction, or a Monte Carlo tally over
//! perturbed inputs), valued against decimal odds, and tracked in a JSON
//! ledger that settles each prediction once its event has been played.

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod provider;
pub mod store;

pub use error::{EngineError, EngineResult};
