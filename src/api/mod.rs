//! HTTP surface
//!
//! Warp routes for doctor sessions, vitals submission, history views,
//! chart series and document downloads.

pub mod error;
pub mod rest;
pub mod types;

pub use error::ApiError;
pub use rest::RestApi;
