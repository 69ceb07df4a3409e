//! Common utilities shared across connectors.

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default bound on every database operation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs `operation` under `limit`.
///
/// An elapsed timeout is reported through `make_error`, so it surfaces as
/// the operation's own error kind.
pub async fn with_timeout<T, F>(
    limit: Duration,
    operation: &str,
    make_error: fn(String) -> Error,
    future: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(make_error(format!(
            "{operation} timed out after {}s",
            limit.as_secs_f64()
        ))),
    }
}

/// Describes an endpoint for logs without leaking credentials.
#[must_use]
pub fn describe_endpoint(dsn: &str) -> String {
    match url::Url::parse(dsn) {
        Ok(url) => match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}://{}:{}", url.scheme(), host, port),
            (Some(host), None) => format!("{}://{}", url.scheme(), host),
            _ => format!("{}://", url.scheme()),
        },
        Err(_) => "<invalid connection string>".to_string(),
    }
}

/// Error for operations attempted without an open connection.
pub fn not_connected(source_name: &str) -> Error {
    Error::Connection(format!("{source_name} connector is not connected"))
}
