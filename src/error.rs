use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

/// Errors raised by the evaluation engine and the portfolio store.
#[derive(Error, Debug)]
pub enum EngineError {
    /// No current over/under market for the entity.
    #[error("{entity} currently has no odds listed")]
    MissingMarketData { entity: String },

    /// The listed market is for an event that has already been played or
    /// predicted.
    #[error("{entity} is only listed for {date}, which is not an upcoming event")]
    StaleMarket { entity: String, date: NaiveDate },

    /// The feature row for the entity's next event could not be built.
    #[error("no model input available for {entity} on {date}")]
    MissingFeatureInput { entity: String, date: NaiveDate },

    /// A data or market collaborator failed.
    #[error("provider failure: {0:#}")]
    Provider(#[source] anyhow::Error),

    #[error("portfolio store {path} could not be accessed: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("portfolio store {path} is corrupt: {reason}")]
    CorruptStore { path: PathBuf, reason: String },

    #[error("{0} is not tracked in the portfolio")]
    NotTracked(String),

    #[error("at least one value is required")]
    InsufficientData,

    #[error("model prediction failed: {0}")]
    Model(String),

    #[error("invalid record operation: {0}")]
    InvalidRecord(String),
}

impl EngineError {
    /// Store failures invalidate the in-memory view and must not be skipped.
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            EngineError::Persistence { .. } | EngineError::CorruptStore { .. }
        )
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
