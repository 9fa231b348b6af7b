use serde::{Deserialize, Serialize};

use super::format_timestamp;
use crate::storage::Observation;

/// Parallel arrays for chart consumers. Index `i` of every array describes
/// the same observation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub labels: Vec<String>,
    pub heart: Vec<f64>,
    pub spo2: Vec<f64>,
    pub systolic: Vec<f64>,
    pub diastolic: Vec<f64>,
}

impl ChartSeries {
    /// Project in the order given.
    pub fn from_observations(observations: &[Observation]) -> Self {
        let mut series = ChartSeries {
            labels: Vec::with_capacity(observations.len()),
            heart: Vec::with_capacity(observations.len()),
            spo2: Vec::with_capacity(observations.len()),
            systolic: Vec::with_capacity(observations.len()),
            diastolic: Vec::with_capacity(observations.len()),
        };
        for o in observations {
            series.labels.push(format_timestamp(&o.timestamp));
            series.heart.push(o.heart_rate);
            series.spo2.push(o.spo2);
            series.systolic.push(o.systolic);
            series.diastolic.push(o.diastolic);
        }
        series
    }

    /// Project a newest-first sequence in chronological order.
    pub fn chronological(newest_first: &[Observation]) -> Self {
        let oldest_first: Vec<Observation> = newest_first.iter().rev().cloned().collect();
        ChartSeries::from_observations(&oldest_first)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
