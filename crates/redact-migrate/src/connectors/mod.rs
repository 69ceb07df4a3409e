//! Database connectors.
//!
//! Every supported database family implements [`DatabaseConnector`]. The
//! connection string scheme is the only dispatch key: [`DatabaseKind`]
//! parses it, [`create_connector`] builds the matching connector.

pub mod common;
pub mod mongodb;
pub mod postgres;

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::record::Dataset;

/// Supported database families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseKind {
    /// Relational, row-oriented (`postgresql://`).
    Postgres,
    /// Document-oriented (`mongodb://`).
    MongoDb,
}

impl DatabaseKind {
    /// Resolves the database family from a connection string scheme.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedDatabase`] for an unknown scheme and
    /// [`Error::Config`] if the string is not a URI.
    pub fn from_dsn(dsn: &str) -> Result<Self> {
        let url = url::Url::parse(dsn)
            .map_err(|e| Error::Config(format!("invalid connection string: {e}")))?;

        match url.scheme() {
            "postgresql" => Ok(Self::Postgres),
            "mongodb" => Ok(Self::MongoDb),
            other => Err(Error::UnsupportedDatabase(other.to_string())),
        }
    }

    /// Connection string scheme for this family.
    #[must_use]
    pub const fn scheme(self) -> &'static str {
        match self {
            Self::Postgres => "postgresql",
            Self::MongoDb => "mongodb",
        }
    }
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// Trait for database connectors.
///
/// A connector owns at most one connection. Callers connect once, perform
/// reads or writes, then close once; closing twice is not supported.
#[async_trait]
pub trait DatabaseConnector: Send {
    /// Database family served by this connector.
    fn kind(&self) -> DatabaseKind;

    /// Opens the connection and checks that the server answers.
    async fn connect(&mut self, dsn: &str) -> Result<()>;

    /// Reads every record of `collection`, unfiltered.
    async fn read_all(&mut self, collection: &str) -> Result<Dataset>;

    /// Reads at most `limit` records of `collection`, skipping the first `offset`.
    async fn read_page(&mut self, collection: &str, limit: u64, offset: u64) -> Result<Dataset>;

    /// Writes all records of `dataset` to `collection`.
    async fn write_all(&mut self, collection: &str, dataset: Dataset) -> Result<()>;

    /// Closes the connection.
    async fn close(&mut self) -> Result<()>;
}

/// Creates a connector for `kind`. No I/O happens until `connect`.
///
/// `database_name` is only meaningful for document stores.
#[must_use]
pub fn create_connector(
    kind: DatabaseKind,
    database_name: &str,
    timeout: Duration,
) -> Box<dyn DatabaseConnector> {
    match kind {
        DatabaseKind::Postgres => Box::new(postgres::PostgresConnector::new(timeout)),
        DatabaseKind::MongoDb => Box::new(mongodb::MongoDBConnector::new(database_name, timeout)),
    }
}
