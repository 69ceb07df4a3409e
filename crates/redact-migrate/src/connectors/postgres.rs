//! PostgreSQL connector.
//!
//! Reads every column of a table into a [`Record`] and writes records back
//! as parameterised `INSERT` statements inside one transaction.

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgConnection, PgRow};
use sqlx::query::Query;
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::{BigDecimal, Json, Uuid};
use sqlx::{Column, Connection, Postgres, Row, TypeInfo};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::connectors::common::{describe_endpoint, not_connected, with_timeout};
use crate::connectors::{DatabaseConnector, DatabaseKind};
use crate::error::{Error, Result};
use crate::record::{Dataset, Record, Value};

/// PostgreSQL identifiers are truncated beyond this many bytes.
const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Column types of an existing table, as printed by `format_type`.
const COLUMN_TYPES_QUERY: &str = "SELECT a.attname::text, format_type(a.atttypid, a.atttypmod) \
     FROM pg_attribute a \
     WHERE a.attrelid = to_regclass($1) AND a.attnum > 0 AND NOT a.attisdropped";

/// PostgreSQL connector backed by a single `sqlx` connection.
pub struct PostgresConnector {
    conn: Option<PgConnection>,
    timeout: Duration,
}

impl PostgresConnector {
    /// Creates an unconnected connector.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            conn: None,
            timeout,
        }
    }

    fn connection(&mut self) -> Result<&mut PgConnection> {
        self.conn.as_mut().ok_or_else(|| not_connected("PostgreSQL"))
    }

    async fn fetch(&mut self, sql: String, page: Option<(i64, i64)>) -> Result<Dataset> {
        let timeout = self.timeout;
        let conn = self.connection()?;

        with_timeout(timeout, "select", Error::Read, async move {
            let mut query = sqlx::query(&sql);
            if let Some((limit, offset)) = page {
                query = query.bind(limit).bind(offset);
            }
            let rows = query
                .fetch_all(&mut *conn)
                .await
                .map_err(|e| Error::Read(format!("query failed: {e}")))?;

            rows.iter().map(decode_row).collect::<Result<Dataset>>()
        })
        .await
    }
}

#[async_trait]
impl DatabaseConnector for PostgresConnector {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Postgres
    }

    async fn connect(&mut self, dsn: &str) -> Result<()> {
        if self.conn.is_some() {
            return Err(Error::Connection(
                "PostgreSQL connector is already connected".to_string(),
            ));
        }

        let conn = with_timeout(self.timeout, "connect", Error::Connection, async {
            PgConnection::connect(dsn)
                .await
                .map_err(|e| Error::Connection(format!("PostgreSQL connect failed: {e}")))
        })
        .await?;

        info!("Connected to {}", describe_endpoint(dsn));
        self.conn = Some(conn);
        Ok(())
    }

    async fn read_all(&mut self, collection: &str) -> Result<Dataset> {
        let sql = format!("SELECT * FROM {}", quote_table(collection)?);
        debug!("{}", sql);
        self.fetch(sql, None).await
    }

    async fn read_page(&mut self, collection: &str, limit: u64, offset: u64) -> Result<Dataset> {
        let limit = i64::try_from(limit)
            .map_err(|_| Error::Read(format!("page limit {limit} is out of range")))?;
        let offset = i64::try_from(offset)
            .map_err(|_| Error::Read(format!("page offset {offset} is out of range")))?;

        let sql = page_query(&quote_table(collection)?);
        debug!("{} [limit={}, offset={}]", sql, limit, offset);
        self.fetch(sql, Some((limit, offset))).await
    }

    async fn write_all(&mut self, collection: &str, dataset: Dataset) -> Result<()> {
        let table = quote_table(collection)?;
        let timeout = self.timeout;
        let conn = self.connection()?;

        with_timeout(timeout, "insert", Error::Write, async move {
            let column_types = load_column_types(conn, &table).await?;

            let mut tx = conn
                .begin()
                .await
                .map_err(|e| Error::Write(format!("cannot start transaction: {e}")))?;

            let mut inserted = Ok(());
            for (index, record) in dataset.iter().enumerate() {
                inserted = insert_record(&mut *tx, &table, record, &column_types)
                    .await
                    .map_err(|e| Error::Write(format!("record #{index}: {e}")));
                if inserted.is_err() {
                    break;
                }
            }

            if let Err(e) = inserted {
                return match tx.rollback().await {
                    Ok(()) => Err(e),
                    Err(rollback) => Err(Error::Write(format!("{e}; rollback failed: {rollback}"))),
                };
            }

            tx.commit()
                .await
                .map_err(|e| Error::Write(format!("commit failed: {e}")))?;
            info!("Inserted {} rows into {}", dataset.len(), table);
            Ok(())
        })
        .await
    }

    async fn close(&mut self) -> Result<()> {
        let conn = self.conn.take().ok_or_else(|| not_connected("PostgreSQL"))?;
        conn.close()
            .await
            .map_err(|e| Error::Connection(format!("PostgreSQL close failed: {e}")))
    }
}

/// Paged `SELECT` over a quoted table.
///
/// Rows are ordered by physical location so consecutive pages neither
/// overlap nor skip rows while the table is not modified.
pub(crate) fn page_query(table: &str) -> String {
    format!("SELECT * FROM {table} ORDER BY ctid LIMIT $1 OFFSET $2")
}

/// Quotes a single identifier, doubling embedded quotes.
pub(crate) fn quote_identifier(name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(Error::Config("identifier cannot be empty".to_string()));
    }
    if name.contains('\0') {
        return Err(Error::Config(format!(
            "identifier contains a null byte: {name:?}"
        )));
    }
    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(Error::Config(format!(
            "identifier exceeds {MAX_IDENTIFIER_LENGTH} bytes: {name:?}"
        )));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quotes a possibly schema-qualified table name (`schema.table`).
pub(crate) fn quote_table(name: &str) -> Result<String> {
    let parts = name
        .split('.')
        .map(quote_identifier)
        .collect::<Result<Vec<_>>>()?;
    Ok(parts.join("."))
}

async fn load_column_types(
    conn: &mut PgConnection,
    table: &str,
) -> Result<HashMap<String, String>> {
    let rows = sqlx::query(COLUMN_TYPES_QUERY)
        .bind(table)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| Error::Write(format!("cannot inspect {table}: {e}")))?;

    let mut types = HashMap::with_capacity(rows.len());
    for row in &rows {
        let name: String = row
            .try_get(0)
            .map_err(|e| Error::Write(format!("cannot inspect {table}: {e}")))?;
        let type_name: String = row
            .try_get(1)
            .map_err(|e| Error::Write(format!("cannot inspect {table}: {e}")))?;
        types.insert(name, type_name);
    }
    if types.is_empty() {
        warn!("No column metadata found for {}; values are sent untyped", table);
    }
    Ok(types)
}

async fn insert_record(
    conn: &mut PgConnection,
    table: &str,
    record: &Record,
    column_types: &HashMap<String, String>,
) -> Result<()> {
    let statement = build_insert(table, record, column_types)?;
    let mut query = sqlx::query(&statement.sql);
    for param in statement.params {
        query = param.bind(query);
    }
    query
        .execute(&mut *conn)
        .await
        .map_err(|e| Error::Write(e.to_string()))?;
    Ok(())
}

// -------------------------------------------------------------------------
// INSERT construction
// -------------------------------------------------------------------------

/// A bound parameter of an `INSERT`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Param {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    BoolArray(Vec<Option<bool>>),
    IntArray(Vec<Option<i64>>),
    FloatArray(Vec<Option<f64>>),
    TextArray(Vec<Option<String>>),
    Json(serde_json::Value),
}

impl Param {
    fn bind<'q>(
        self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        match self {
            Self::Bool(v) => query.bind(v),
            Self::Int(v) => query.bind(v),
            Self::Float(v) => query.bind(v),
            Self::Text(v) => query.bind(v),
            Self::BoolArray(v) => query.bind(v),
            Self::IntArray(v) => query.bind(v),
            Self::FloatArray(v) => query.bind(v),
            Self::TextArray(v) => query.bind(v),
            Self::Json(v) => query.bind(Json(v)),
        }
    }

    /// Type the parameter is sent as.
    fn sql_type(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Int(_) => "bigint",
            Self::Float(_) => "double precision",
            Self::Text(_) => "text",
            Self::BoolArray(_) => "boolean[]",
            Self::IntArray(_) => "bigint[]",
            Self::FloatArray(_) => "double precision[]",
            Self::TextArray(_) => "text[]",
            Self::Json(_) => "jsonb",
        }
    }
}

/// SQL text plus parameters for one record.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct InsertStatement {
    pub sql: String,
    pub params: Vec<Param>,
}

/// Builds the `INSERT` for one record, columns in record order.
///
/// `NULL` is written inline so the server infers its type. Text, array and
/// JSON parameters are cast to the destination column type when it is known
/// and differs, since PostgreSQL does not convert them implicitly.
pub(crate) fn build_insert(
    table: &str,
    record: &Record,
    column_types: &HashMap<String, String>,
) -> Result<InsertStatement> {
    if record.is_empty() {
        return Err(Error::Write("record has no fields".to_string()));
    }

    let mut columns = Vec::with_capacity(record.len());
    let mut placeholders = Vec::with_capacity(record.len());
    let mut params = Vec::with_capacity(record.len());

    for (name, value) in record.iter() {
        columns.push(quote_identifier(name).map_err(|e| Error::Write(e.to_string()))?);

        let column_type = column_types.get(name).map(String::as_str);
        let Some(param) = to_param(value, column_type) else {
            placeholders.push("NULL".to_string());
            continue;
        };

        let placeholder = format!("${}", params.len() + 1);
        placeholders.push(match column_type {
            Some(target) if needs_cast(&param, target) => {
                format!("CAST({placeholder} AS {target})")
            }
            _ => placeholder,
        });
        params.push(param);
    }

    Ok(InsertStatement {
        sql: format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders.join(", ")
        ),
        params,
    })
}

fn to_param(value: &Value, column_type: Option<&str>) -> Option<Param> {
    let json_column = column_type.is_some_and(is_json_type);
    let param = match value {
        Value::Null => return None,
        Value::Boolean(b) => Param::Bool(*b),
        Value::Integer(i) => Param::Int(*i),
        Value::Float(f) => Param::Float(*f),
        Value::String(s) => Param::Text(s.clone()),
        Value::List(items) if !json_column => {
            scalar_array(items).unwrap_or_else(|| Param::Json(value.to_json()))
        }
        Value::List(_) | Value::Record(_) => Param::Json(value.to_json()),
    };
    Some(param)
}

/// Converts a list whose non-null items share one scalar type.
fn scalar_array(items: &[Value]) -> Option<Param> {
    let first = items.iter().find(|v| !v.is_null())?;
    match first {
        Value::Boolean(_) => items
            .iter()
            .map(|v| match v {
                Value::Null => Some(None),
                Value::Boolean(b) => Some(Some(*b)),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(Param::BoolArray),
        Value::Integer(_) => items
            .iter()
            .map(|v| match v {
                Value::Null => Some(None),
                Value::Integer(i) => Some(Some(*i)),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(Param::IntArray),
        Value::Float(_) => items
            .iter()
            .map(|v| match v {
                Value::Null => Some(None),
                Value::Float(f) => Some(Some(*f)),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(Param::FloatArray),
        Value::String(_) => items
            .iter()
            .map(|v| match v {
                Value::Null => Some(None),
                Value::String(s) => Some(Some(s.clone())),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(Param::TextArray),
        _ => None,
    }
}

fn is_json_type(column_type: &str) -> bool {
    matches!(column_type, "json" | "jsonb")
}

fn is_text_type(column_type: &str) -> bool {
    column_type == "text"
        || column_type == "name"
        || column_type == "citext"
        || column_type.starts_with("character")
}

fn needs_cast(param: &Param, target: &str) -> bool {
    match param {
        Param::Bool(_) | Param::Int(_) | Param::Float(_) => false,
        Param::Text(_) => !is_text_type(target),
        Param::Json(_) => !is_json_type(target) && !is_text_type(target),
        array => target != array.sql_type(),
    }
}

// -------------------------------------------------------------------------
// Row decoding
// -------------------------------------------------------------------------

fn decode_row(row: &PgRow) -> Result<Record> {
    let mut record = Record::new();
    for (index, column) in row.columns().iter().enumerate() {
        let value = decode_column(row, index, column.type_info().name()).map_err(|e| {
            Error::Read(format!(
                "cannot decode column '{}' ({}): {}",
                column.name(),
                column.type_info().name(),
                e
            ))
        })?;
        record.insert(column.name(), value);
    }
    Ok(record)
}

fn list<T: Into<Value>>(items: Option<Vec<Option<T>>>) -> Value {
    items.map_or(Value::Null, |items| {
        Value::List(items.into_iter().map(Value::from).collect())
    })
}

fn decode_column(row: &PgRow, index: usize, type_name: &str) -> Result<Value> {
    let decoded: std::result::Result<Value, sqlx::Error> = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(index).map(Value::from),
        "INT2" => row
            .try_get::<Option<i16>, _>(index)
            .map(|v| v.map(i64::from).into()),
        "INT4" => row
            .try_get::<Option<i32>, _>(index)
            .map(|v| v.map(i64::from).into()),
        "INT8" => row.try_get::<Option<i64>, _>(index).map(Value::from),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(index)
            .map(|v| v.map(f64::from).into()),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index).map(Value::from),
        name if is_text_column(name) => row.try_get::<Option<String>, _>(index).map(Value::from),
        // Exact decimal text; written back through a cast to the column type.
        "NUMERIC" => row
            .try_get::<Option<BigDecimal>, _>(index)
            .map(|v| v.map(|d| d.to_string()).into()),
        "JSON" | "JSONB" => row
            .try_get::<Option<serde_json::Value>, _>(index)
            .map(|v| v.map_or(Value::Null, Value::from)),
        "UUID" => row
            .try_get::<Option<Uuid>, _>(index)
            .map(|v| v.map(|u| u.to_string()).into()),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)
            .map(|v| v.map(|t| t.to_rfc3339()).into()),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(index)
            .map(|v| v.map(|t| t.format("%Y-%m-%dT%H:%M:%S%.f").to_string()).into()),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(index)
            .map(|v| v.map(|d| d.to_string()).into()),
        "TIME" => row
            .try_get::<Option<NaiveTime>, _>(index)
            .map(|v| v.map(|t| t.to_string()).into()),
        "BOOL[]" => row.try_get::<Option<Vec<Option<bool>>>, _>(index).map(list),
        "INT2[]" => row
            .try_get::<Option<Vec<Option<i16>>>, _>(index)
            .map(|v| list(v.map(|items| widen(items, i64::from)))),
        "INT4[]" => row
            .try_get::<Option<Vec<Option<i32>>>, _>(index)
            .map(|v| list(v.map(|items| widen(items, i64::from)))),
        "INT8[]" => row.try_get::<Option<Vec<Option<i64>>>, _>(index).map(list),
        "FLOAT4[]" => row
            .try_get::<Option<Vec<Option<f32>>>, _>(index)
            .map(|v| list(v.map(|items| widen(items, f64::from)))),
        "FLOAT8[]" => row.try_get::<Option<Vec<Option<f64>>>, _>(index).map(list),
        "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => {
            row.try_get::<Option<Vec<Option<String>>>, _>(index).map(list)
        }
        other => return Err(Error::Read(format!("unsupported column type {other}"))),
    };
    decoded.map_err(|e| Error::Read(e.to_string()))
}

/// Text-like column types as reported by the driver. Extension types
/// such as `citext` keep their lowercase catalog name.
pub(crate) fn is_text_column(type_name: &str) -> bool {
    matches!(type_name, "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "citext")
}

fn widen<T, U>(items: Vec<Option<T>>, f: fn(T) -> U) -> Vec<Option<U>> {
    items.into_iter().map(|item| item.map(f)).collect()
}

#[cfg(test)]
#[path = "postgres_tests.rs"]
mod tests;
