use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};

pub mod models;
pub use models::*;

/// JSON file holding the whole portfolio. Every load reads the full file and
/// every save rewrites it; there is no locking, so a single writer is assumed.
#[derive(Debug, Clone)]
pub struct PortfolioStore {
    path: PathBuf,
}

impl PortfolioStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        PortfolioStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the portfolio. A missing or blank file is an empty portfolio and is
    /// (re)written immediately.
    pub fn load(&self) -> EngineResult<Portfolio> {
        let text = match fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Portfolio store {} not found, creating it", self.path.display());
                String::new()
            }
            Err(source) => return Err(self.io_error(source)),
        };

        if text.trim().is_empty() {
            let empty = Portfolio::new();
            self.save(&empty)?;
            return Ok(empty);
        }

        let portfolio: Portfolio =
            serde_json::from_str(&text).map_err(|e| EngineError::CorruptStore {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        debug!(
            "Loaded {} tracked entities from {}",
            portfolio.len(),
            self.path.display()
        );
        Ok(portfolio)
    }

    /// Add an empty record for `entity`. Returns `false` if it was already
    /// tracked; the store is rewritten either way.
    pub fn track(&self, entity: &str) -> EngineResult<bool> {
        let mut portfolio = self.load()?;
        let inserted = !portfolio.contains_key(entity);
        if inserted {
            portfolio.insert(entity.to_string(), PredictionRecord::new());
        }
        self.save(&portfolio)?;
        if inserted {
            info!("Added {} to the portfolio", entity);
        }
        Ok(inserted)
    }

    /// Drop `entity` and its history. Returns `false` if it was not tracked.
    pub fn untrack(&self, entity: &str) -> EngineResult<bool> {
        let mut portfolio = self.load()?;
        let removed = portfolio.remove(entity).is_some();
        self.save(&portfolio)?;
        if removed {
            info!("Removed {} from the portfolio", entity);
        }
        Ok(removed)
    }

    /// Rewrite the whole store. The new content goes to a sibling temp file
    /// first and is renamed over the old one.
    pub fn save(&self, portfolio: &Portfolio) -> EngineResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
        }
        let body = serde_json::to_string_pretty(portfolio).map_err(|e| {
            EngineError::CorruptStore {
                path: self.path.clone(),
                reason: e.to_string(),
            }
        })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, body).map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;
        Ok(())
    }

    fn io_error(&self, source: std::io::Error) -> EngineError {
        EngineError::Persistence {
            path: self.path.clone(),
            source,
        }
    }
}
