//! HealthGuard: a clinical vitals record store
//!
//! HealthGuard classifies submitted vital signs as risky or healthy, keeps
//! every observation in an append-only SQLite store and serves filtered
//! history, chart series and CSV/PDF reports over a small REST API.

pub mod api;
pub mod auth;
pub mod classifier;
pub mod config;
pub mod error;
pub mod history;
pub mod report;
pub mod storage;

pub use error::HealthGuardError;
