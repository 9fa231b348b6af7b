//! Rule-based risk classification of a vital-signs reading.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const SYSTOLIC_LIMIT: f64 = 140.0;
pub const DIASTOLIC_LIMIT: f64 = 90.0;
pub const HEART_RATE_LIMIT: f64 = 100.0;
pub const SPO2_FLOOR: f64 = 95.0;

/// The two possible classifier outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLabel {
    Risk,
    Healthy,
}

impl RiskLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLabel::Risk => "RISK",
            RiskLabel::Healthy => "HEALTHY",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "RISK" => Some(RiskLabel::Risk),
            "HEALTHY" => Some(RiskLabel::Healthy),
            _ => None,
        }
    }

    pub fn is_risk(self) -> bool {
        self == RiskLabel::Risk
    }
}

impl fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One set of vital readings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    pub systolic: f64,
    pub diastolic: f64,
    pub heart_rate: f64,
    pub spo2: f64,
}

impl Vitals {
    pub fn new(systolic: f64, diastolic: f64, heart_rate: f64, spo2: f64) -> Self {
        Vitals { systolic, diastolic, heart_rate, spo2 }
    }
}

/// RISK when any single reading crosses its threshold, HEALTHY otherwise.
/// Readings exactly on a threshold are HEALTHY.
pub fn classify(vitals: &Vitals) -> RiskLabel {
    if vitals.systolic > SYSTOLIC_LIMIT
        || vitals.diastolic > DIASTOLIC_LIMIT
        || vitals.heart_rate > HEART_RATE_LIMIT
        || vitals.spo2 < SPO2_FLOOR
    {
        RiskLabel::Risk
    } else {
        RiskLabel::Healthy
    }
}
