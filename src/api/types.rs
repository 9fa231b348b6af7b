use std::collections::HashMap;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

use crate::classifier::{RiskLabel, Vitals};
use crate::history::FilterOptions;
use crate::storage::ObservationDraft;

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl ApiResponse {
    pub fn success(message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        ApiResponse { status: "success".to_string(), message: message.into(), data }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ApiResponse { status: "error".to_string(), message: message.into(), data: None }
    }
}

/// Vitals submitted for one patient. Numeric fields accept JSON numbers or
/// numeric strings, as posted by HTML forms.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionRequest {
    pub name: String,
    #[serde(deserialize_with = "lenient_u32")]
    pub age: u32,
    pub address: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub systolic_bp: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub diastolic_bp: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub heart_rate: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub spo2: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl SubmissionRequest {
    pub fn into_draft(self) -> ObservationDraft {
        let vitals = Vitals::new(self.systolic_bp, self.diastolic_bp, self.heart_rate, self.spo2);
        let draft = ObservationDraft::new(self.name, self.age, self.address, vitals);
        match self.notes {
            Some(notes) => draft.with_notes(notes),
            None => draft,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionResponse {
    pub result: RiskLabel,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    Text(String),
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => n,
        NumberOrString::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| de::Error::custom(format!("expected a number, got {s:?}")))?,
    };
    if !value.is_finite() {
        return Err(de::Error::custom("expected a finite number"));
    }
    Ok(value)
}

fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = lenient_f64(deserializer)?;
    if value < 0.0 || value > f64::from(u32::MAX) || value.fract() != 0.0 {
        return Err(de::Error::custom(format!("expected a whole non-negative number, got {value}")));
    }
    Ok(value as u32)
}

/// Build filter options from raw query parameters. `risk_only` is on for any
/// value other than empty, `0`, `false`, `no` or `off`.
pub fn filter_options(params: &HashMap<String, String>) -> FilterOptions {
    let risk_only = params
        .get("risk_only")
        .map(|v| v.trim().to_ascii_lowercase())
        .is_some_and(|v| !matches!(v.as_str(), "" | "0" | "false" | "no" | "off"));

    FilterOptions {
        start_date: params.get("start_date").cloned(),
        end_date: params.get("end_date").cloned(),
        keyword: params.get("keyword").cloned(),
        risk_only,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_accepts_numbers_and_strings() {
        let body = r#"{"name":"Jane","age":"40","address":"X","systolic_bp":150,
                       "diastolic_bp":"95","heart_rate":110.0,"spo2":" 90 "}"#;
        let request: SubmissionRequest = serde_json::from_str(body).unwrap();
        assert_eq!(request.age, 40);
        assert_eq!(request.diastolic_bp, 95.0);
        assert_eq!(request.spo2, 90.0);
        assert_eq!(request.notes, None);

        let draft = request.into_draft();
        assert_eq!(draft.vitals, Vitals::new(150.0, 95.0, 110.0, 90.0));
    }

    #[test]
    fn test_submission_rejects_garbage() {
        let body = r#"{"name":"Jane","age":40,"address":"X","systolic_bp":"high",
                       "diastolic_bp":95,"heart_rate":110,"spo2":90}"#;
        assert!(serde_json::from_str::<SubmissionRequest>(body).is_err());

        let body = r#"{"name":"Jane","age":40.5,"address":"X","systolic_bp":1,
                       "diastolic_bp":95,"heart_rate":110,"spo2":90}"#;
        assert!(serde_json::from_str::<SubmissionRequest>(body).is_err());
    }

    #[test]
    fn test_filter_options_from_query() {
        let mut params = HashMap::new();
        params.insert("start_date".to_string(), "2024-03-01".to_string());
        params.insert("risk_only".to_string(), "on".to_string());
        let options = filter_options(&params);
        assert_eq!(options.start_date.as_deref(), Some("2024-03-01"));
        assert!(options.risk_only);

        params.insert("risk_only".to_string(), "false".to_string());
        assert!(!filter_options(&params).risk_only);
        assert!(!filter_options(&HashMap::new()).is_active());
    }
}
