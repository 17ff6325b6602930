use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{EngineError, EngineResult};

/// Event dates are written as `MM/DD/YYYY`.
pub const DATE_FORMAT: &str = "%m/%d/%Y";

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
}

/// Serde adapter for `MM/DD/YYYY` dates.
pub mod event_date {
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_date(*date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_date(&raw).map_err(de::Error::custom)
    }
}

/// Which side of an over/under market a prediction backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[default]
    Over,
    Under,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Side::Over => "OVER",
            Side::Under => "UNDER",
        })
    }
}

/// One prediction made for an entity's upcoming event.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionEntry {
    /// Point prediction at evaluation time
    pub predicted: f64,
    /// Market line of the backed side
    pub line: f64,
    /// Expected value of the backed side
    pub ev: f64,
    pub date: NaiveDate,
    pub side: Side,
    /// Realized value; `None` until the event is settled
    pub actual: Option<f64>,
}

/// Shape of a record, derived from its entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Empty,
    Synchronized,
    PendingSettlement,
}

/// Ordered prediction history for one entity. Only the last entry may be
/// unsettled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RecordLayout", into = "RecordLayout")]
pub struct PredictionRecord {
    entries: Vec<PredictionEntry>,
}

impl PredictionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[PredictionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn state(&self) -> RecordState {
        match self.entries.last() {
            None => RecordState::Empty,
            Some(e) if e.actual.is_none() => RecordState::PendingSettlement,
            Some(_) => RecordState::Synchronized,
        }
    }

    /// The outstanding (unsettled) prediction, if any.
    pub fn pending(&self) -> Option<&PredictionEntry> {
        self.entries.last().filter(|e| e.actual.is_none())
    }

    /// Append a new speculative prediction.
    pub fn open(&mut self, mut entry: PredictionEntry) -> EngineResult<()> {
        if let Some(p) = self.pending() {
            return Err(EngineError::InvalidRecord(format!(
                "prediction for {} is still unsettled",
                format_date(p.date)
            )));
        }
        entry.actual = None;
        self.entries.push(entry);
        Ok(())
    }

    /// Record the realized value of the pending prediction.
    pub fn settle(&mut self, actual: f64) -> EngineResult<&PredictionEntry> {
        match self.entries.last_mut() {
            Some(e) if e.actual.is_none() => {
                e.actual = Some(actual);
                Ok(&*e)
            }
            _ => Err(EngineError::InvalidRecord(
                "no pending prediction to settle".into(),
            )),
        }
    }

    /// Discard the pending prediction.
    pub fn rollback(&mut self) -> Option<PredictionEntry> {
        if self.pending().is_some() {
            self.entries.pop()
        } else {
            None
        }
    }
}

/// Whole-portfolio mapping, entity name -> record.
pub type Portfolio = BTreeMap<String, PredictionRecord>;

/// Wire layout: index-aligned arrays, `actual` trailing by at most one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordLayout {
    #[serde(default)]
    pub ev: Vec<f64>,
    #[serde(default)]
    pub actual: Vec<f64>,
    #[serde(default)]
    pub predicted: Vec<f64>,
    #[serde(default)]
    pub line: Vec<f64>,
    #[serde(default)]
    pub date: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub side: Vec<Side>,
}

impl TryFrom<RecordLayout> for PredictionRecord {
    type Error = String;

    fn try_from(raw: RecordLayout) -> Result<Self, Self::Error> {
        let n = raw.predicted.len();
        if raw.ev.len() != n || raw.line.len() != n || raw.date.len() != n {
            return Err(format!(
                "misaligned arrays: predicted={} line={} ev={} date={}",
                n,
                raw.line.len(),
                raw.ev.len(),
                raw.date.len()
            ));
        }
        if raw.actual.len() > n || n - raw.actual.len() > 1 {
            return Err(format!(
                "actual has {} values for {} predictions",
                raw.actual.len(),
                n
            ));
        }
        if !raw.side.is_empty() && raw.side.len() != n {
            return Err(format!("side has {} values for {} predictions", raw.side.len(), n));
        }

        let mut entries = Vec::with_capacity(n);
        for i in 0..n {
            let date = parse_date(&raw.date[i])
                .map_err(|e| format!("bad date {:?}: {}", raw.date[i], e))?;
            entries.push(PredictionEntry {
                predicted: raw.predicted[i],
                line: raw.line[i],
                ev: raw.ev[i],
                date,
                side: raw.side.get(i).copied().unwrap_or_default(),
                actual: raw.actual.get(i).copied(),
            });
        }
        Ok(PredictionRecord { entries })
    }
}

impl From<PredictionRecord> for RecordLayout {
    fn from(record: PredictionRecord) -> Self {
        let mut raw = RecordLayout::default();
        for e in record.entries {
            raw.ev.push(e.ev);
            raw.predicted.push(e.predicted);
            raw.line.push(e.line);
            raw.date.push(format_date(e.date));
            raw.side.push(e.side);
            if let Some(a) = e.actual {
                raw.actual.push(a);
            }
        }
        raw
    }
}
