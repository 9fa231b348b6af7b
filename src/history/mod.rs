//! History queries
//!
//! Filtered and ordered views over stored observations:
//! - Date windows, note keywords and risk-only selection
//! - Per-patient grouping by name
//! - The recent-history dashboard view

pub mod filter;
pub mod query;

pub use filter::{FilterOptions, HistoryFilter};
pub use query::{HistoryEngine, PatientHistory, QueryError};
