//! Core storage engine
//!
//! Append-only SQLite table of vital-sign observations:
//! - Schema setup and migrations
//! - Classified appends
//! - Ordered and name-grouped retrieval

pub mod doctors;
pub mod observations;
pub mod persistence;

use std::sync::{Mutex, MutexGuard};

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classifier::{self, RiskLabel, Vitals};
use crate::config::StorageConfig;

/// Fixed-width so that text ordering in SQLite matches chronological ordering.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] rusqlite::Error),

    #[error("storage unavailable: {0}")]
    Io(String),

    #[error("storage unavailable: connection lock poisoned")]
    LockPoisoned,

    #[error("migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("observation {0} not found")]
    NotFound(i64),

    #[error("constraint violated: {0}")]
    ConstraintViolation(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

/// A persisted vital-signs reading and its classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: i64,
    #[serde(rename = "name")]
    pub patient_name: String,
    pub age: u32,
    pub address: String,
    pub systolic: f64,
    pub diastolic: f64,
    pub heart_rate: f64,
    pub spo2: f64,
    pub result: RiskLabel,
    pub timestamp: NaiveDateTime,
    pub notes: Option<String>,
}

impl Observation {
    pub fn vitals(&self) -> Vitals {
        Vitals::new(self.systolic, self.diastolic, self.heart_rate, self.spo2)
    }
}

/// Everything the caller supplies for a new observation.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationDraft {
    pub patient_name: String,
    pub age: u32,
    pub address: String,
    pub vitals: Vitals,
    pub notes: Option<String>,
    /// Creation time is used when left unset.
    pub timestamp: Option<NaiveDateTime>,
}

impl ObservationDraft {
    pub fn new(patient_name: impl Into<String>, age: u32, address: impl Into<String>, vitals: Vitals) -> Self {
        ObservationDraft {
            patient_name: patient_name.into(),
            age,
            address: address.into(),
            vitals,
            notes: None,
            timestamp: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn at(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Midnight at the start of `date`.
pub fn day_start(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::default())
}

/// Stored timestamps carry microsecond precision.
fn truncate_to_micros(timestamp: NaiveDateTime) -> NaiveDateTime {
    timestamp
        .with_nanosecond(timestamp.nanosecond() / 1_000 * 1_000)
        .unwrap_or(timestamp)
}

/// Application-scoped handle on the observation database. Each repository
/// call borrows the connection for its duration only.
#[derive(Debug)]
pub struct RecordStore {
    conn: Mutex<Connection>,
}

impl RecordStore {
    pub fn open(config: &StorageConfig) -> Result<Self, StorageError> {
        let conn = persistence::open_database(&config.path)?;
        Ok(RecordStore::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Ok(RecordStore::from_connection(persistence::open_memory_database()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        RecordStore { conn: Mutex::new(conn) }
    }

    /// Run `f` with exclusive access to the connection.
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let conn = self.lock()?;
        f(&conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Classify and persist a draft. The label is fixed at this point and
    /// never recomputed.
    pub fn append(&self, draft: ObservationDraft) -> Result<Observation, StorageError> {
        let result = classifier::classify(&draft.vitals);
        let timestamp = truncate_to_micros(draft.timestamp.unwrap_or_else(|| Local::now().naive_local()));

        let id = self
            .with_conn(|conn| observations::insert_observation(conn, &draft, result, &timestamp))
            .inspect_err(|e| tracing::error!(error = %e, "failed to append observation"))?;

        let ObservationDraft { patient_name, age, address, vitals, notes, .. } = draft;
        Ok(Observation {
            id,
            patient_name,
            age,
            address,
            systolic: vitals.systolic,
            diastolic: vitals.diastolic,
            heart_rate: vitals.heart_rate,
            spo2: vitals.spo2,
            result,
            timestamp,
            notes,
        })
    }

    pub fn recent_history(&self, limit: usize) -> Result<Vec<Observation>, StorageError> {
        self.with_conn(|conn| observations::list_recent(conn, limit))
    }

    pub fn by_id(&self, id: i64) -> Result<Observation, StorageError> {
        self.with_conn(|conn| observations::get_observation(conn, id))
    }

    /// Every observation recorded under exactly `name`, newest first.
    pub fn by_name(&self, name: &str) -> Result<Vec<Observation>, StorageError> {
        self.by_name_ordered(name, SortOrder::Descending)
    }

    pub fn by_name_ordered(&self, name: &str, order: SortOrder) -> Result<Vec<Observation>, StorageError> {
        self.with_conn(|conn| observations::list_by_name(conn, name, order))
    }

    pub fn all(&self, order: SortOrder) -> Result<Vec<Observation>, StorageError> {
        self.with_conn(|conn| observations::list_all(conn, order))
    }

    pub fn count(&self) -> Result<usize, StorageError> {
        self.with_conn(observations::count_observations)
    }

    /// Name-fragment search with optional date bounds, each inclusive at
    /// midnight.
    pub fn search(
        &self,
        name_fragment: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Observation>, StorageError> {
        let from = start.map(day_start);
        let until = end.map(day_start);
        self.with_conn(|conn| {
            observations::search_observations(conn, name_fragment, from.as_ref(), until.as_ref())
        })
    }
}
