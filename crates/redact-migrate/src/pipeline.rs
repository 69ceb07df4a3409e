//! Migration pipeline orchestration.
//!
//! One [`Pipeline`] performs one attempt: connect to the source, fetch the
//! whole dataset, delete then anonymise the configured fields, connect to
//! the destination and write. Every connection that was opened is closed
//! again, whatever the outcome. Nothing is retried.

use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::MigrationConfig;
use crate::connectors::{create_connector, DatabaseConnector, DatabaseKind};
use crate::error::{Error, Result};
use crate::record::Dataset;
use crate::transform::Transformer;

/// Orchestrator state. Transitions are strictly linear; [`MigrationState::Failed`]
/// is reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    /// Nothing loaded yet.
    Idle,
    /// Configuration validated and connectors resolved.
    ConfigLoaded,
    /// Source connection open.
    SourceConnected,
    /// Dataset fetched and source connection released.
    DataFetched,
    /// Deletion stage applied.
    FieldsDeleted,
    /// Anonymisation stage applied.
    FieldsAnonymised,
    /// Destination connection open.
    DestinationConnected,
    /// Dataset written.
    DataWritten,
    /// Run completed.
    Done,
    /// Run aborted by an error.
    Failed,
}

impl MigrationState {
    /// Returns true for `Done` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::ConfigLoaded => "config loaded",
            Self::SourceConnected => "source connected",
            Self::DataFetched => "data fetched",
            Self::FieldsDeleted => "fields deleted",
            Self::FieldsAnonymised => "fields anonymised",
            Self::DestinationConnected => "destination connected",
            Self::DataWritten => "data written",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Migration statistics.
#[derive(Debug, Default, Clone)]
pub struct MigrationStats {
    /// Records fetched from the source.
    pub records_read: u64,
    /// Records handed to the destination.
    pub records_written: u64,
    /// Field values removed.
    pub fields_deleted: u64,
    /// Field values replaced by a placeholder.
    pub fields_anonymised: u64,
    /// Source queries issued.
    pub pages_read: u64,
    /// Duration in seconds.
    pub duration_secs: f64,
}

impl MigrationStats {
    /// Calculate throughput (records per second).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn throughput(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.records_written as f64 / self.duration_secs
        } else {
            0.0
        }
    }
}

/// Migration pipeline.
pub struct Pipeline {
    config: MigrationConfig,
    source: Box<dyn DatabaseConnector>,
    destination: Box<dyn DatabaseConnector>,
    transformer: Transformer,
    state: MigrationState,
}

impl Pipeline {
    /// Create a new migration pipeline.
    ///
    /// Both connection strings are resolved here, so an unsupported scheme
    /// fails before any network I/O.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid configuration and
    /// [`Error::UnsupportedDatabase`] for an unknown scheme.
    pub fn new(config: MigrationConfig) -> Result<Self> {
        config.validate()?;

        let source_kind = DatabaseKind::from_dsn(&config.source_database_dsn)?;
        let destination_kind = DatabaseKind::from_dsn(&config.destination_database_dsn)?;
        info!("Migrating {} -> {}", source_kind, destination_kind);

        let timeout = config.timeout();
        let source = create_connector(source_kind, &config.source_database_name, timeout);
        let destination = create_connector(
            destination_kind,
            &config.destination_database_name,
            timeout,
        );

        Ok(Self::with_connectors(config, source, destination))
    }

    /// Create a pipeline around already-built connectors.
    #[must_use]
    pub fn with_connectors(
        config: MigrationConfig,
        source: Box<dyn DatabaseConnector>,
        destination: Box<dyn DatabaseConnector>,
    ) -> Self {
        let transformer = Transformer::new(
            config.fields_to_delete.clone(),
            config.fields_to_anonymise.clone(),
        );

        Self {
            config,
            source,
            destination,
            transformer,
            state: MigrationState::ConfigLoaded,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> MigrationState {
        self.state
    }

    /// Run the migration pipeline.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a connector or transform stage.
    /// A pipeline runs at most once; running it again is a
    /// [`Error::Config`] error.
    pub async fn run(&mut self) -> Result<MigrationStats> {
        if self.state != MigrationState::ConfigLoaded {
            return Err(Error::Config(format!(
                "migration pipeline cannot run from state '{}'",
                self.state
            )));
        }

        let start = Instant::now();
        let mut stats = MigrationStats::default();
        let progress = create_spinner();

        info!("Starting migration pipeline");
        let outcome = self.execute(&mut stats, &progress).await;
        stats.duration_secs = start.elapsed().as_secs_f64();

        match outcome {
            Ok(()) => {
                self.advance(MigrationState::Done, &progress);
                progress.finish_with_message("Migration complete");
                info!(
                    "Migration complete: {} read, {} written, {} deleted, {} anonymised in {:.2}s ({:.0} records/sec)",
                    stats.records_read,
                    stats.records_written,
                    stats.fields_deleted,
                    stats.fields_anonymised,
                    stats.duration_secs,
                    stats.throughput()
                );
                Ok(stats)
            }
            Err(e) => {
                let failed_in = self.state;
                self.state = MigrationState::Failed;
                progress.abandon_with_message("Migration failed");
                error!("Migration failed after '{}': {}", failed_in, e);
                Err(e)
            }
        }
    }

    async fn execute(&mut self, stats: &mut MigrationStats, progress: &ProgressBar) -> Result<()> {
        let mut dataset = self.extract(stats, progress).await?;

        self.transformer.delete(&mut dataset)?;
        stats.fields_deleted = field_count(&dataset, self.transformer.fields_to_delete());
        self.advance(MigrationState::FieldsDeleted, progress);

        let dataset = self.transformer.anonymise(&dataset)?;
        stats.fields_anonymised = field_count(&dataset, self.transformer.fields_to_anonymise());
        self.advance(MigrationState::FieldsAnonymised, progress);

        stats.records_written = self.load(dataset, progress).await?;
        self.advance(MigrationState::DataWritten, progress);
        Ok(())
    }

    /// Connects, reads and always closes the source.
    async fn extract(&mut self, stats: &mut MigrationStats, progress: &ProgressBar) -> Result<Dataset> {
        self.source
            .connect(&self.config.source_database_dsn)
            .await?;
        self.advance(MigrationState::SourceConnected, progress);

        let fetched = self.read_source(stats, progress).await;
        release(self.source.as_mut(), "source").await;

        let dataset = fetched?;
        stats.records_read = dataset.len() as u64;
        info!(
            "{} records fetched from '{}'",
            dataset.len(),
            self.config.source_collection_name
        );
        self.advance(MigrationState::DataFetched, progress);
        Ok(dataset)
    }

    async fn read_source(&mut self, stats: &mut MigrationStats, progress: &ProgressBar) -> Result<Dataset> {
        let collection = &self.config.source_collection_name;

        let Some(page_size) = self.config.read_batch_size else {
            let dataset = self.source.read_all(collection).await?;
            stats.pages_read = 1;
            return Ok(dataset);
        };

        let mut dataset = Dataset::new();
        let mut offset = 0;
        loop {
            let page = self.source.read_page(collection, page_size, offset).await?;
            let fetched = page.len() as u64;
            stats.pages_read += 1;
            dataset.extend(page);

            debug!("Page {}: {} records at offset {}", stats.pages_read, fetched, offset);
            progress.set_message(format!("Fetched {} records", dataset.len()));

            if fetched < page_size {
                break;
            }
            offset += fetched;
        }
        Ok(dataset)
    }

    /// Connects, writes and always closes the destination.
    async fn load(&mut self, dataset: Dataset, progress: &ProgressBar) -> Result<u64> {
        self.destination
            .connect(&self.config.destination_database_dsn)
            .await?;
        self.advance(MigrationState::DestinationConnected, progress);

        let count = dataset.len() as u64;
        let written = self
            .destination
            .write_all(&self.config.destination_collection_name, dataset)
            .await;
        release(self.destination.as_mut(), "destination").await;

        written?;
        info!(
            "{} records written to '{}'",
            count, self.config.destination_collection_name
        );
        Ok(count)
    }

    fn advance(&mut self, next: MigrationState, progress: &ProgressBar) {
        debug!("State: {} -> {}", self.state, next);
        self.state = next;
        progress.set_message(next.to_string());
    }
}

async fn release(connector: &mut dyn DatabaseConnector, role: &str) {
    if let Err(e) = connector.close().await {
        warn!("Failed to close {} {} connection: {}", role, connector.kind(), e);
    }
}

fn field_count(dataset: &Dataset, fields: &[String]) -> u64 {
    (dataset.len() * fields.len()) as u64
}

fn create_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();

    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));

    pb
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
