use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;

use super::filter::{FilterOptions, HistoryFilter, DATE_FORMAT};
use crate::storage::{Observation, ObservationDraft, RecordStore, SortOrder, StorageError};

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("invalid filter {field}: {value:?}")]
    InvalidFilter { field: &'static str, value: String },

    #[error("observation {0} not found")]
    NotFound(i64),

    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for QueryError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::NotFound(id) => QueryError::NotFound(id),
            other => QueryError::Storage(other),
        }
    }
}

/// A patient's anchor observation together with their filtered history.
#[derive(Debug, Clone)]
pub struct PatientHistory {
    pub patient: Observation,
    pub records: Vec<Observation>,
}

/// Filtered, ordered views over the record store.
#[derive(Debug, Clone)]
pub struct HistoryEngine {
    store: Arc<RecordStore>,
    recent_limit: usize,
}

impl HistoryEngine {
    pub fn new(store: Arc<RecordStore>, recent_limit: usize) -> Self {
        HistoryEngine { store, recent_limit }
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    /// Classify, persist and return a new observation.
    pub fn submit(&self, draft: ObservationDraft) -> Result<Observation, QueryError> {
        let stored = self.store.append(draft)?;
        tracing::info!(id = stored.id, result = %stored.result, "observation recorded");
        Ok(stored)
    }

    /// The dashboard view: newest first, capped at the configured limit.
    pub fn recent(&self) -> Result<Vec<Observation>, QueryError> {
        self.recent_with_limit(self.recent_limit)
    }

    pub fn recent_with_limit(&self, limit: usize) -> Result<Vec<Observation>, QueryError> {
        Ok(self.store.recent_history(limit)?)
    }

    /// Apply `options` to an arbitrary base set.
    pub fn filter(
        &self,
        base: Vec<Observation>,
        options: &FilterOptions,
        order: SortOrder,
    ) -> Result<Vec<Observation>, QueryError> {
        let filter = HistoryFilter::parse(options)?;
        Ok(filter.apply(base, order))
    }

    /// Filtered history over every stored observation.
    pub fn history(
        &self,
        options: &FilterOptions,
        order: SortOrder,
    ) -> Result<Vec<Observation>, QueryError> {
        let filter = HistoryFilter::parse(options)?;
        let base = self.store.all(order)?;
        Ok(filter.apply(base, order))
    }

    /// Resolve observation `id`, then filter every observation sharing its
    /// patient name.
    pub fn patient_history(
        &self,
        id: i64,
        options: &FilterOptions,
        order: SortOrder,
    ) -> Result<PatientHistory, QueryError> {
        let patient = self.store.by_id(id)?;
        let filter = HistoryFilter::parse(options)?;
        let base = self.store.by_name_ordered(&patient.patient_name, order)?;
        tracing::debug!(id, name = %patient.patient_name, base = base.len(), "patient history lookup");
        let records = filter.apply(base, order);
        Ok(PatientHistory { patient, records })
    }

    /// Every observation for the patient behind `id`, unfiltered.
    pub fn patient_records(&self, id: i64, order: SortOrder) -> Result<PatientHistory, QueryError> {
        let patient = self.store.by_id(id)?;
        let records = self.store.by_name_ordered(&patient.patient_name, order)?;
        Ok(PatientHistory { patient, records })
    }

    /// Name-fragment search with optional `YYYY-MM-DD` bounds.
    pub fn search(
        &self,
        name_fragment: &str,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Vec<Observation>, QueryError> {
        let start = parse_optional_date("start_date", start)?;
        let end = parse_optional_date("end_date", end)?;
        Ok(self.store.search(name_fragment, start, end)?)
    }
}

fn parse_optional_date(field: &'static str, raw: Option<&str>) -> Result<Option<NaiveDate>, QueryError> {
    match raw.filter(|r| !r.trim().is_empty()) {
        Some(raw) => NaiveDate::parse_from_str(raw, DATE_FORMAT)
            .map(Some)
            .map_err(|_| QueryError::InvalidFilter { field, value: raw.to_string() }),
        None => Ok(None),
    }
}
