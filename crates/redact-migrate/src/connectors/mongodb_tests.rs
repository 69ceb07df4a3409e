//! Tests for MongoDB connector.

use super::*;
use ::mongodb::bson::oid::ObjectId;
use ::mongodb::bson::spec::BinarySubtype;
use ::mongodb::bson::{Binary, DateTime};
use crate::connectors::common::DEFAULT_TIMEOUT;

#[test]
fn test_mongodb_connector_new() {
    let connector = MongoDBConnector::new("archive", DEFAULT_TIMEOUT);
    assert_eq!(connector.kind(), DatabaseKind::MongoDb);
    assert_eq!(connector.database, "archive");
}

#[test]
fn test_document_to_record_drops_id() {
    // Arrange
    let document = doc! {
        "_id": ObjectId::new(),
        "name": "Alice",
        "ssn": "123-45-6789",
        "age": 30,
    };

    // Act
    let record = document_to_record(document).unwrap();

    // Assert
    assert_eq!(
        record.field_names().collect::<Vec<_>>(),
        vec!["name", "ssn", "age"]
    );
    assert_eq!(record.get("age"), Some(&Value::Integer(30)));
}

#[test]
fn test_document_to_record_maps_scalars() {
    let document = doc! {
        "i32": 7_i32,
        "i64": 9_000_000_000_i64,
        "f": 1.5,
        "b": false,
        "n": Bson::Null,
        "s": "text",
    };

    let record = document_to_record(document).unwrap();

    assert_eq!(record.get("i32"), Some(&Value::Integer(7)));
    assert_eq!(record.get("i64"), Some(&Value::Integer(9_000_000_000)));
    assert_eq!(record.get("f"), Some(&Value::Float(1.5)));
    assert_eq!(record.get("b"), Some(&Value::Boolean(false)));
    assert_eq!(record.get("n"), Some(&Value::Null));
    assert_eq!(record.get("s"), Some(&Value::from("text")));
}

#[test]
fn test_document_to_record_nested() {
    let document = doc! {
        "address": { "city": "Paris", "_id": 5 },
        "tags": ["a", "b"],
    };

    let record = document_to_record(document).unwrap();

    let Some(Value::Record(address)) = record.get("address") else {
        panic!("expected nested record");
    };
    assert_eq!(address.get("city"), Some(&Value::from("Paris")));
    // Only the top-level identity is dropped.
    assert!(address.contains_field("_id"));
    assert_eq!(
        record.get("tags"),
        Some(&Value::List(vec![Value::from("a"), Value::from("b")]))
    );
}

#[test]
fn test_document_to_record_stringifies_object_id_and_date() {
    let oid = ObjectId::parse_str("507f1f77bcf86cd799439011").unwrap();
    let document = doc! {
        "owner": oid,
        "created": DateTime::from_millis(0),
    };

    let record = document_to_record(document).unwrap();

    assert_eq!(
        record.get("owner"),
        Some(&Value::from("507f1f77bcf86cd799439011"))
    );
    let Some(Value::String(created)) = record.get("created") else {
        panic!("expected string date");
    };
    assert!(created.starts_with("1970-01-01T00:00:00"));
}

#[test]
fn test_document_to_record_unsupported_type() {
    let blob = Binary {
        subtype: BinarySubtype::Generic,
        bytes: vec![1, 2, 3],
    };
    let document = doc! { "blob": blob };

    let err = document_to_record(document).unwrap_err();

    assert!(matches!(err, Error::Read(_)));
    assert!(err.to_string().contains("'blob'"));
}

#[test]
fn test_record_to_document_strips_id() {
    let record: Record = vec![
        ("_id", Value::from("stale")),
        ("name", Value::from("Anonymised")),
        ("age", Value::Integer(30)),
    ]
    .into_iter()
    .collect();

    let document = record_to_document(record);

    assert!(!document.contains_key("_id"));
    assert_eq!(document.get_str("name").unwrap(), "Anonymised");
    assert_eq!(document.get_i64("age").unwrap(), 30);
    assert_eq!(
        document.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["name", "age"]
    );
}

#[test]
fn test_record_document_round_trip() {
    let original = doc! {
        "name": "Alice",
        "age": 30_i64,
        "score": 9.5,
        "active": true,
        "nothing": Bson::Null,
        "address": { "city": "Paris", "zip": "75001" },
        "tags": ["x", 1_i64, false],
    };

    let record = document_to_record(original.clone()).unwrap();
    let document = record_to_document(record);

    assert_eq!(document, original);
}

#[test]
fn test_page_options_sort_by_identity() {
    // Act
    let options = page_options(10, 20).unwrap().unwrap();

    // Assert
    assert_eq!(options.sort, Some(doc! { "_id": 1 }));
    assert_eq!(options.limit, Some(10));
    assert_eq!(options.skip, Some(20));
}

#[test]
fn test_page_options_zero_limit_is_empty_page() {
    assert!(page_options(0, 5).unwrap().is_none());
}

#[test]
fn test_page_options_limit_out_of_range() {
    assert!(matches!(page_options(u64::MAX, 0), Err(Error::Read(_))));
}

#[tokio::test]
async fn test_zero_limit_page_still_requires_connection() {
    let mut connector = MongoDBConnector::new("db", DEFAULT_TIMEOUT);

    let result = connector.read_page("users", 0, 0).await;

    assert!(matches!(result, Err(Error::Connection(_))));
}

#[tokio::test]
async fn test_read_before_connect_fails() {
    let mut connector = MongoDBConnector::new("db", DEFAULT_TIMEOUT);

    let result = connector.read_page("users", 10, 0).await;

    assert!(matches!(result, Err(Error::Connection(_))));
}

#[tokio::test]
async fn test_close_without_connection_fails() {
    let mut connector = MongoDBConnector::new("db", DEFAULT_TIMEOUT);

    assert!(connector.close().await.is_err());
}
