use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::query::QueryError;
use crate::storage::{day_start, Observation, SortOrder};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Filter options exactly as a caller supplies them. Empty strings count as
/// not supplied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOptions {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub keyword: Option<String>,
    #[serde(default)]
    pub risk_only: bool,
}

impl FilterOptions {
    pub fn start_date(mut self, date: impl Into<String>) -> Self {
        self.start_date = Some(date.into());
        self
    }

    pub fn end_date(mut self, date: impl Into<String>) -> Self {
        self.end_date = Some(date.into());
        self
    }

    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn risk_only(mut self) -> Self {
        self.risk_only = true;
        self
    }

    /// True when at least one option constrains the result.
    pub fn is_active(&self) -> bool {
        supplied(&self.start_date).is_some()
            || supplied(&self.end_date).is_some()
            || self.keyword.as_deref().is_some_and(|k| !k.is_empty())
            || self.risk_only
    }
}

fn supplied(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Validated filter. Both date bounds are midnight at the start of the given
/// day and both are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    pub from: Option<NaiveDateTime>,
    pub until: Option<NaiveDateTime>,
    pub keyword: Option<String>,
    pub risk_only: bool,
}

impl HistoryFilter {
    /// Parse every option up front; one bad date rejects the whole filter.
    pub fn parse(options: &FilterOptions) -> Result<Self, QueryError> {
        let start = supplied(&options.start_date)
            .map(|raw| parse_date("start_date", raw))
            .transpose()?;
        let end = supplied(&options.end_date)
            .map(|raw| parse_date("end_date", raw))
            .transpose()?;

        Ok(HistoryFilter {
            from: start.map(day_start),
            until: end.map(day_start),
            keyword: options.keyword.clone().filter(|k| !k.is_empty()),
            risk_only: options.risk_only,
        })
    }

    pub fn matches(&self, observation: &Observation) -> bool {
        if self.from.is_some_and(|from| observation.timestamp < from) {
            return false;
        }
        if self.until.is_some_and(|until| observation.timestamp > until) {
            return false;
        }
        if let Some(keyword) = &self.keyword {
            match &observation.notes {
                Some(notes) if notes.contains(keyword.as_str()) => {}
                _ => return false,
            }
        }
        if self.risk_only && !observation.result.is_risk() {
            return false;
        }
        true
    }

    /// Keep matching observations and sort them by timestamp.
    pub fn apply(&self, base: Vec<Observation>, order: SortOrder) -> Vec<Observation> {
        let mut kept: Vec<Observation> = base.into_iter().filter(|o| self.matches(o)).collect();
        sort_observations(&mut kept, order);
        kept
    }
}

/// Timestamp order, with id breaking ties so equal instants stay stable.
pub fn sort_observations(observations: &mut [Observation], order: SortOrder) {
    observations.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
    if order == SortOrder::Descending {
        observations.reverse();
    }
}

fn parse_date(field: &'static str, raw: &str) -> Result<NaiveDate, QueryError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|_| QueryError::InvalidFilter {
        field,
        value: raw.to_string(),
    })
}
