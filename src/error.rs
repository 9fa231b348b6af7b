use thiserror::Error;

use crate::auth::AuthError;
use crate::config::ConfigError;
use crate::history::QueryError;
use crate::report::ReportError;
use crate::storage::StorageError;

/// Top-level error for embedding the store outside the HTTP layer.
#[derive(Error, Debug)]
pub enum HealthGuardError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Report(#[from] ReportError),
}

pub type Result<T> = std::result::Result<T, HealthGuardError>;
