//! MongoDB connector.
//!
//! Documents map one-to-one onto records. The `_id` identity field is
//! dropped on read and stripped again on write, so the destination always
//! assigns fresh identities.

use ::mongodb::bson::{doc, Bson, Document};
use ::mongodb::options::{ClientOptions, FindOptions};
use ::mongodb::{Client, Collection};
use async_trait::async_trait;
use futures::TryStreamExt;
use std::time::Duration;
use tracing::{debug, info};

use crate::connectors::common::{describe_endpoint, not_connected, with_timeout};
use crate::connectors::{DatabaseConnector, DatabaseKind};
use crate::error::{Error, Result};
use crate::record::{Dataset, Record, Value};

/// Database-internal identity field.
pub const ID_FIELD: &str = "_id";

/// MongoDB connector.
pub struct MongoDBConnector {
    client: Option<Client>,
    database: String,
    timeout: Duration,
}

impl MongoDBConnector {
    /// Creates an unconnected connector for the logical database `database`.
    #[must_use]
    pub fn new(database: &str, timeout: Duration) -> Self {
        Self {
            client: None,
            database: database.to_string(),
            timeout,
        }
    }

    fn collection(&self, name: &str) -> Result<Collection<Document>> {
        let client = self.client.as_ref().ok_or_else(|| not_connected("MongoDB"))?;
        Ok(client.database(&self.database).collection(name))
    }

    async fn fetch(&self, name: &str, options: Option<FindOptions>) -> Result<Dataset> {
        let collection = self.collection(name)?;

        with_timeout(self.timeout, "find", Error::Read, async move {
            let cursor = collection
                .find(doc! {})
                .with_options(options)
                .await
                .map_err(|e| Error::Read(format!("find failed: {e}")))?;
            let documents: Vec<Document> = cursor
                .try_collect()
                .await
                .map_err(|e| Error::Read(format!("cursor failed: {e}")))?;

            documents
                .into_iter()
                .map(document_to_record)
                .collect::<Result<Dataset>>()
        })
        .await
    }
}

#[async_trait]
impl DatabaseConnector for MongoDBConnector {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::MongoDb
    }

    async fn connect(&mut self, dsn: &str) -> Result<()> {
        if self.client.is_some() {
            return Err(Error::Connection(
                "MongoDB connector is already connected".to_string(),
            ));
        }

        let timeout = self.timeout;
        let client = with_timeout(timeout, "connect", Error::Connection, async {
            let mut options = ClientOptions::parse(dsn)
                .await
                .map_err(|e| Error::Connection(format!("invalid MongoDB URI: {e}")))?;
            options.connect_timeout = Some(timeout);
            options.server_selection_timeout = Some(timeout);

            let client = Client::with_options(options)
                .map_err(|e| Error::Connection(format!("MongoDB client failed: {e}")))?;
            client
                .database("admin")
                .run_command(doc! { "ping": 1 })
                .await
                .map_err(|e| Error::Connection(format!("MongoDB ping failed: {e}")))?;
            Ok(client)
        })
        .await?;

        info!(
            "Connected to {} (database '{}')",
            describe_endpoint(dsn),
            self.database
        );
        self.client = Some(client);
        Ok(())
    }

    async fn read_all(&mut self, collection: &str) -> Result<Dataset> {
        debug!("find {}.{} (all)", self.database, collection);
        self.fetch(collection, None).await
    }

    async fn read_page(&mut self, collection: &str, limit: u64, offset: u64) -> Result<Dataset> {
        let Some(options) = page_options(limit, offset)? else {
            self.collection(collection)?;
            return Ok(Dataset::new());
        };
        debug!(
            "find {}.{} [limit={}, skip={}]",
            self.database, collection, limit, offset
        );
        self.fetch(collection, Some(options)).await
    }

    async fn write_all(&mut self, collection: &str, dataset: Dataset) -> Result<()> {
        let target = self.collection(collection)?;
        if dataset.is_empty() {
            debug!("Nothing to insert into {}.{}", self.database, collection);
            return Ok(());
        }

        let documents: Vec<Document> = dataset.into_iter().map(record_to_document).collect();
        let count = documents.len();

        with_timeout(self.timeout, "insert_many", Error::Write, async move {
            target
                .insert_many(documents)
                .await
                .map_err(|e| Error::Write(format!("insert_many failed: {e}")))?;
            Ok(())
        })
        .await?;

        info!(
            "Inserted {} documents into {}.{}",
            count, self.database, collection
        );
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let client = self.client.take().ok_or_else(|| not_connected("MongoDB"))?;
        client.shutdown().await;
        Ok(())
    }
}

/// Find options for one page, sorted by identity so pages do not overlap.
///
/// Returns `None` for an empty page: the server reads a zero limit as
/// "no limit".
pub(crate) fn page_options(limit: u64, offset: u64) -> Result<Option<FindOptions>> {
    if limit == 0 {
        return Ok(None);
    }
    let limit = i64::try_from(limit)
        .map_err(|_| Error::Read(format!("page limit {limit} is out of range")))?;

    Ok(Some(
        FindOptions::builder()
            .sort(doc! { "_id": 1 })
            .limit(limit)
            .skip(offset)
            .build(),
    ))
}

/// Converts a fetched document, dropping its identity field.
pub(crate) fn document_to_record(mut document: Document) -> Result<Record> {
    document.remove(ID_FIELD);
    nested_record(document)
}

/// Converts a record to a document, without any identity field.
pub(crate) fn record_to_document(record: Record) -> Document {
    let mut document = nested_document(record);
    document.remove(ID_FIELD);
    document
}

fn nested_record(document: Document) -> Result<Record> {
    let mut record = Record::new();
    for (key, bson) in document {
        let value = bson_to_value(bson).map_err(|e| match e {
            Error::Read(msg) => Error::Read(format!("field '{key}': {msg}")),
            other => other,
        })?;
        record.insert(key, value);
    }
    Ok(record)
}

fn nested_document(record: Record) -> Document {
    record
        .into_iter()
        .map(|(key, value)| (key, value_to_bson(value)))
        .collect()
}

fn bson_to_value(bson: Bson) -> Result<Value> {
    let value = match bson {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Boolean(b),
        Bson::Int32(i) => Value::Integer(i64::from(i)),
        Bson::Int64(i) => Value::Integer(i),
        Bson::Double(f) => Value::Float(f),
        Bson::String(s) | Bson::Symbol(s) => Value::String(s),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => Value::String(
            dt.try_to_rfc3339_string()
                .map_err(|e| Error::Read(format!("invalid datetime: {e}")))?,
        ),
        Bson::Array(items) => Value::List(
            items
                .into_iter()
                .map(bson_to_value)
                .collect::<Result<Vec<_>>>()?,
        ),
        Bson::Document(document) => Value::Record(nested_record(document)?),
        other => {
            return Err(Error::Read(format!(
                "unsupported BSON type {:?}",
                other.element_type()
            )))
        }
    };
    Ok(value)
}

fn value_to_bson(value: Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Boolean(b) => Bson::Boolean(b),
        Value::Integer(i) => Bson::Int64(i),
        Value::Float(f) => Bson::Double(f),
        Value::String(s) => Bson::String(s),
        Value::List(items) => Bson::Array(items.into_iter().map(value_to_bson).collect()),
        Value::Record(record) => Bson::Document(nested_document(record)),
    }
}

#[cfg(test)]
#[path = "mongodb_tests.rs"]
mod tests;
