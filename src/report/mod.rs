//! Report projections
//!
//! Reshapes ordered observations for downstream sinks:
//! - Fixed-column tables for CSV and PDF documents
//! - Index-aligned series for charts

pub mod chart;
pub mod csv;
pub mod pdf;

pub use chart::ChartSeries;
pub use csv::CsvSink;
pub use pdf::PdfSink;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::storage::Observation;

/// Timestamp format shared by tables and chart labels.
pub const LABEL_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Stands in for empty notes in the profile table.
pub const NOTES_PLACEHOLDER: &str = "\u{2014}";

pub const LIST_HEADER: [&str; 9] = [
    "Name", "Age", "Address", "Date", "Systolic", "Diastolic", "HR", "SpO2", "Result",
];

pub const PROFILE_HEADER: [&str; 7] = [
    "Timestamp", "Result", "Systolic", "Diastolic", "HR", "SpO2", "Notes",
];

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("PDF rendering failed: {0}")]
    Pdf(String),
}

/// A header row plus data rows, all cells already formatted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(header: &[&str]) -> Self {
        Table {
            header: header.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<String>) {
        debug_assert_eq!(row.len(), self.header.len());
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A rendered, downloadable document.
#[derive(Debug, Clone)]
pub struct Document {
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Renders a titled table into a document format.
pub trait DocumentSink {
    fn content_type(&self) -> &'static str;

    fn extension(&self) -> &'static str;

    /// `details` are free-form lines shown between the title and the table.
    fn render(&self, title: &str, details: &[String], table: &Table) -> Result<Document, ReportError>;
}

pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format(LABEL_FORMAT).to_string()
}

/// One row per observation for the history list and its exports.
pub fn list_table(observations: &[Observation]) -> Table {
    let mut table = Table::new(&LIST_HEADER);
    for o in observations {
        table.push(vec![
            o.patient_name.clone(),
            o.age.to_string(),
            o.address.clone(),
            format_timestamp(&o.timestamp),
            o.systolic.to_string(),
            o.diastolic.to_string(),
            o.heart_rate.to_string(),
            o.spo2.to_string(),
            o.result.to_string(),
        ]);
    }
    table
}

/// One row per observation for a single patient's profile.
pub fn profile_table(observations: &[Observation]) -> Table {
    let mut table = Table::new(&PROFILE_HEADER);
    for o in observations {
        let notes = match o.notes.as_deref() {
            Some(notes) if !notes.is_empty() => notes.to_string(),
            _ => NOTES_PLACEHOLDER.to_string(),
        };
        table.push(vec![
            format_timestamp(&o.timestamp),
            o.result.to_string(),
            o.systolic.to_string(),
            o.diastolic.to_string(),
            o.heart_rate.to_string(),
            o.spo2.to_string(),
            notes,
        ]);
    }
    table
}

/// Header lines for a profile document.
pub fn profile_details(patient: &Observation) -> Vec<String> {
    vec![
        format!("Name: {}", patient.patient_name),
        format!("Age: {}", patient.age),
        format!("Address: {}", patient.address),
    ]
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::classifier::RiskLabel;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    pub(crate) fn observation(id: i64, minute: u32, notes: Option<&str>) -> Observation {
        Observation {
            id,
            patient_name: "Jane".to_string(),
            age: 40,
            address: "12 Elm St".to_string(),
            systolic: 150.0,
            diastolic: 95.0,
            heart_rate: 110.0,
            spo2: 97.5,
            result: RiskLabel::Risk,
            timestamp: NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(9, minute, 42)
                .unwrap(),
            notes: notes.map(str::to_string),
        }
    }

    #[test]
    fn test_list_table_columns() {
        let table = list_table(&[observation(1, 5, None)]);
        assert_eq!(table.header, LIST_HEADER.to_vec());
        assert_eq!(
            table.rows[0],
            vec!["Jane", "40", "12 Elm St", "2024-03-01 09:05", "150", "95", "110", "97.5", "RISK"]
        );
    }

    #[test]
    fn test_profile_table_uses_placeholder_for_empty_notes() {
        let table = profile_table(&[
            observation(1, 0, None),
            observation(2, 1, Some("")),
            observation(3, 2, Some("dizzy")),
        ]);
        assert_eq!(table.header, PROFILE_HEADER.to_vec());
        let notes: Vec<&str> = table.rows.iter().map(|r| r[6].as_str()).collect();
        assert_eq!(notes, vec!["\u{2014}", "\u{2014}", "dizzy"]);
        assert_eq!(table.rows[0][0], "2024-03-01 09:00");
        assert_eq!(table.rows[0][1], "RISK");
    }

    #[test]
    fn test_tables_keep_input_order() {
        let input = [observation(3, 30, None), observation(1, 10, None), observation(2, 20, None)];
        let table = list_table(&input);
        assert_eq!(table.len(), 3);
        let dates: Vec<&str> = table.rows.iter().map(|r| r[3].as_str()).collect();
        assert_eq!(dates, vec!["2024-03-01 09:30", "2024-03-01 09:10", "2024-03-01 09:20"]);
    }

    #[test]
    fn test_empty_input_gives_header_only() {
        let table = list_table(&[]);
        assert!(table.is_empty());
        assert_eq!(table.header.len(), 9);
    }
}
