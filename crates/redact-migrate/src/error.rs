//! Error types for redact-migrate.
//!
//! Every failure in a migration run maps to one variant of [`Error`]. Each
//! variant carries a stable `MIGRATE-XXX` code that is part of its message.

use thiserror::Error;

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during a migration run.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection string scheme has no connector (MIGRATE-001).
    #[error("[MIGRATE-001] Unsupported database type: {0}")]
    UnsupportedDatabase(String),

    /// Connect or ping failure (MIGRATE-002).
    #[error("[MIGRATE-002] Connection error: {0}")]
    Connection(String),

    /// Fetch or decode failure (MIGRATE-003).
    #[error("[MIGRATE-003] Read error: {0}")]
    Read(String),

    /// Insert, bulk write or transaction failure (MIGRATE-004).
    #[error("[MIGRATE-004] Write error: {0}")]
    Write(String),

    /// A configured field is absent from a record (MIGRATE-005).
    #[error("[MIGRATE-005] Field '{field}' not found in record #{record}")]
    FieldNotFound {
        /// Configured field name.
        field: String,
        /// Zero-based index of the offending record.
        record: usize,
    },

    /// Anonymisation target has no placeholder for its type (MIGRATE-006).
    #[error("[MIGRATE-006] Cannot anonymise field '{field}' of type {type_name}")]
    UnsupportedAnonymizationType {
        /// Field name.
        field: String,
        /// Dynamic type of the value found.
        type_name: &'static str,
    },

    /// Invalid configuration (MIGRATE-007).
    #[error("[MIGRATE-007] Configuration error: {0}")]
    Config(String),

    /// IO error (MIGRATE-008).
    #[error("[MIGRATE-008] IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns the error code (e.g., "MIGRATE-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedDatabase(_) => "MIGRATE-001",
            Self::Connection(_) => "MIGRATE-002",
            Self::Read(_) => "MIGRATE-003",
            Self::Write(_) => "MIGRATE-004",
            Self::FieldNotFound { .. } => "MIGRATE-005",
            Self::UnsupportedAnonymizationType { .. } => "MIGRATE-006",
            Self::Config(_) => "MIGRATE-007",
            Self::Io(_) => "MIGRATE-008",
        }
    }

    /// Returns true if the error was caused by the connection timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Connection(msg) | Self::Read(msg) | Self::Write(msg) => {
                msg.contains("timed out")
            }
            _ => false,
        }
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
