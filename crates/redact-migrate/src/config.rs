//! Configuration for a migration run.
//!
//! Values come from a YAML file (default `config.yaml`) overlaid with
//! environment variables named after the upper-cased keys, e.g.
//! `SOURCE_DATABASE_DSN` or `FIELDS_TO_DELETE="[ssn, email]"`.
//!
//! # Priority (highest to lowest)
//!
//! 1. Environment variables
//! 2. Configuration file

use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::connectors::common::DEFAULT_TIMEOUT;
use crate::connectors::DatabaseKind;
use crate::error::{Error, Result};

/// Keys that may be overridden from the environment.
const CONFIG_KEYS: [&str; 10] = [
    "source_database_dsn",
    "source_collection_name",
    "source_database_name",
    "destination_database_dsn",
    "destination_collection_name",
    "destination_database_name",
    "fields_to_delete",
    "fields_to_anonymise",
    "timeout_secs",
    "read_batch_size",
];

/// Immutable configuration of one migration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Source connection string; its scheme selects the connector.
    pub source_database_dsn: String,
    /// Source table or collection.
    pub source_collection_name: String,
    /// Source logical database (document stores only).
    #[serde(default)]
    pub source_database_name: String,
    /// Destination connection string; its scheme selects the connector.
    pub destination_database_dsn: String,
    /// Destination table or collection.
    pub destination_collection_name: String,
    /// Destination logical database (document stores only).
    #[serde(default)]
    pub destination_database_name: String,
    /// Fields removed from every record.
    #[serde(default)]
    pub fields_to_delete: Vec<String>,
    /// Fields replaced by a placeholder in every record.
    #[serde(default)]
    pub fields_to_anonymise: Vec<String>,
    /// Bound on every database operation, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Read the source in pages of this size instead of a single query.
    #[serde(default)]
    pub read_batch_size: Option<u64>,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

impl MigrationConfig {
    /// Loads configuration from a YAML file, overlaid with environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file does not exist or the merged
    /// values cannot be deserialized, and [`Error::Io`] if it cannot be read.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::Config(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }

        let contents = std::fs::read_to_string(path)?;
        let figment = Figment::new()
            .merge(Yaml::string(&contents))
            .merge(Env::raw().only(&CONFIG_KEYS));

        Ok(figment.extract()?)
    }

    /// Parses configuration from a YAML string, without environment overlay.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(Figment::new().merge(Yaml::string(yaml)).extract()?)
    }

    /// Per-operation timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("source_database_dsn", &self.source_database_dsn),
            ("source_collection_name", &self.source_collection_name),
            ("destination_database_dsn", &self.destination_database_dsn),
            (
                "destination_collection_name",
                &self.destination_collection_name,
            ),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{key} cannot be empty")));
            }
        }

        if self.timeout_secs == 0 {
            return Err(Error::Config(
                "timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.read_batch_size == Some(0) {
            return Err(Error::Config(
                "read_batch_size must be greater than 0".to_string(),
            ));
        }

        unique_fields("fields_to_delete", &self.fields_to_delete)?;
        let to_anonymise = unique_fields("fields_to_anonymise", &self.fields_to_anonymise)?;
        if let Some(field) = self
            .fields_to_delete
            .iter()
            .find(|f| to_anonymise.contains(f.as_str()))
        {
            return Err(Error::Config(format!(
                "field '{field}' is listed in both fields_to_delete and fields_to_anonymise"
            )));
        }

        // Unsupported schemes are reported when the connectors are resolved.
        for (dsn, name, key) in [
            (
                &self.source_database_dsn,
                &self.source_database_name,
                "source_database_name",
            ),
            (
                &self.destination_database_dsn,
                &self.destination_database_name,
                "destination_database_name",
            ),
        ] {
            if matches!(DatabaseKind::from_dsn(dsn), Ok(DatabaseKind::MongoDb))
                && name.trim().is_empty()
            {
                return Err(Error::Config(format!(
                    "{key} is required for mongodb endpoints"
                )));
            }
        }

        Ok(())
    }
}

fn unique_fields<'a>(key: &str, fields: &'a [String]) -> Result<HashSet<&'a str>> {
    let mut seen = HashSet::with_capacity(fields.len());
    for field in fields {
        if field.is_empty() {
            return Err(Error::Config(format!("{key} contains an empty field name")));
        }
        if !seen.insert(field.as_str()) {
            return Err(Error::Config(format!("{key} lists '{field}' more than once")));
        }
    }
    Ok(seen)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
