//! Tests for the transform stages.

use super::*;
use crate::record::Record;
use proptest::prelude::*;

fn fields(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| (*s).to_string()).collect()
}

fn alice() -> Record {
    vec![
        ("name", Value::from("Alice")),
        ("ssn", Value::from("123-45-6789")),
        ("age", Value::Integer(30)),
    ]
    .into_iter()
    .collect()
}

// -------------------------------------------------------------------------
// delete_fields
// -------------------------------------------------------------------------

#[test]
fn test_delete_fields_removes_listed() {
    // Arrange
    let mut dataset = vec![alice()];

    // Act
    delete_fields(&mut dataset, &fields(&["ssn"])).unwrap();

    // Assert
    assert_eq!(
        dataset[0].field_names().collect::<Vec<_>>(),
        vec!["name", "age"]
    );
    assert_eq!(dataset[0].get("age"), Some(&Value::Integer(30)));
}

#[test]
fn test_delete_fields_empty_list_is_noop() {
    let mut dataset = vec![alice()];

    delete_fields(&mut dataset, &[]).unwrap();

    assert_eq!(dataset, vec![alice()]);
}

#[test]
fn test_delete_fields_empty_dataset() {
    let mut dataset = Dataset::new();

    delete_fields(&mut dataset, &fields(&["ssn"])).unwrap();

    assert!(dataset.is_empty());
}

#[test]
fn test_delete_fields_missing_field_reports_record() {
    // Arrange
    let mut second = alice();
    second.remove("ssn");
    let mut dataset = vec![alice(), second];

    // Act
    let err = delete_fields(&mut dataset, &fields(&["ssn"])).unwrap_err();

    // Assert
    match err {
        Error::FieldNotFound { field, record } => {
            assert_eq!(field, "ssn");
            assert_eq!(record, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_delete_fields_failure_leaves_dataset_untouched() {
    let mut second = alice();
    second.remove("age");
    let mut dataset = vec![alice(), second.clone()];

    let result = delete_fields(&mut dataset, &fields(&["ssn", "age"]));

    assert!(result.is_err());
    assert_eq!(dataset, vec![alice(), second]);
}

#[test]
fn test_delete_twice_fails() {
    let mut dataset = vec![alice()];
    let to_delete = fields(&["ssn"]);

    delete_fields(&mut dataset, &to_delete).unwrap();
    let again = delete_fields(&mut dataset, &to_delete);

    assert!(matches!(again, Err(Error::FieldNotFound { .. })));
}

// -------------------------------------------------------------------------
// anonymise_fields
// -------------------------------------------------------------------------

#[test]
fn test_anonymise_string_and_integer() {
    // Arrange
    let dataset = vec![alice()];

    // Act
    let out = anonymise_fields(&dataset, &fields(&["name", "age"])).unwrap();

    // Assert
    assert_eq!(out[0].get("name"), Some(&Value::from(ANONYMISED_STRING)));
    assert_eq!(out[0].get("age"), Some(&Value::Integer(ANONYMISED_INTEGER)));
    assert_eq!(out[0].get("ssn"), Some(&Value::from("123-45-6789")));
    // Input is not modified.
    assert_eq!(dataset, vec![alice()]);
}

#[test]
fn test_anonymise_keeps_field_order() {
    let dataset = vec![alice()];

    let out = anonymise_fields(&dataset, &fields(&["ssn"])).unwrap();

    assert_eq!(
        out[0].field_names().collect::<Vec<_>>(),
        vec!["name", "ssn", "age"]
    );
}

#[test]
fn test_anonymise_is_idempotent() {
    let to_anonymise = fields(&["name", "age"]);
    let once = anonymise_fields(&vec![alice()], &to_anonymise).unwrap();

    let twice = anonymise_fields(&once, &to_anonymise).unwrap();

    assert_eq!(once, twice);
}

#[test]
fn test_anonymise_empty_list_is_noop() {
    let dataset = vec![alice()];

    let out = anonymise_fields(&dataset, &[]).unwrap();

    assert_eq!(out, dataset);
}

#[test]
fn test_anonymise_missing_field() {
    let dataset = vec![alice()];

    let err = anonymise_fields(&dataset, &fields(&["email"])).unwrap_err();

    assert!(matches!(
        err,
        Error::FieldNotFound { ref field, record: 0 } if field == "email"
    ));
}

#[test]
fn test_anonymise_unsupported_types() {
    let cases = [
        Value::Null,
        Value::Boolean(true),
        Value::Float(1.5),
        Value::List(vec![Value::Integer(1)]),
        Value::Record(Record::new()),
    ];

    for value in cases {
        let expected = value.type_name();
        let record: Record = [("x", value)].into_iter().collect();

        let err = anonymise_fields(&vec![record], &fields(&["x"])).unwrap_err();

        match err {
            Error::UnsupportedAnonymizationType { field, type_name } => {
                assert_eq!(field, "x");
                assert_eq!(type_name, expected);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

// -------------------------------------------------------------------------
// Transformer
// -------------------------------------------------------------------------

#[test]
fn test_transformer_apply_scenario() {
    // Arrange
    let transformer = Transformer::new(fields(&["ssn"]), fields(&["name"]));

    // Act
    let out = transformer.apply(vec![alice()]).unwrap();

    // Assert
    let expected: Record = vec![
        ("name", Value::from("Anonymised")),
        ("age", Value::Integer(30)),
    ]
    .into_iter()
    .collect();
    assert_eq!(out, vec![expected]);
}

#[test]
fn test_transformer_default_is_identity() {
    let transformer = Transformer::default();

    let out = transformer.apply(vec![alice()]).unwrap();

    assert_eq!(out, vec![alice()]);
    assert!(transformer.fields_to_delete().is_empty());
    assert!(transformer.fields_to_anonymise().is_empty());
}

// -------------------------------------------------------------------------
// Properties
// -------------------------------------------------------------------------

const KEYS: [&str; 6] = ["a", "b", "c", "d", "e", "f"];

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::Integer),
        "[a-z]{0,8}".prop_map(Value::String),
    ]
}

fn dataset_strategy() -> impl Strategy<Value = Dataset> {
    let record = proptest::collection::vec(scalar(), KEYS.len()).prop_map(|values| {
        KEYS.iter()
            .zip(values)
            .map(|(k, v)| (*k, v))
            .collect::<Record>()
    });
    proptest::collection::vec(record, 0..8)
}

fn subset_strategy() -> impl Strategy<Value = Vec<String>> {
    proptest::sample::subsequence(KEYS.to_vec(), 0..=KEYS.len())
        .prop_map(|keys| keys.into_iter().map(str::to_string).collect())
}

proptest! {
    #[test]
    fn prop_delete_leaves_set_difference(
        dataset in dataset_strategy(),
        to_delete in subset_strategy(),
    ) {
        let mut out = dataset.clone();
        delete_fields(&mut out, &to_delete).unwrap();

        for (before, after) in dataset.iter().zip(&out) {
            let expected: Vec<&str> = before
                .field_names()
                .filter(|name| !to_delete.iter().any(|d| d == name))
                .collect();
            prop_assert_eq!(after.field_names().collect::<Vec<_>>(), expected);
            for name in after.field_names() {
                prop_assert_eq!(after.get(name), before.get(name));
            }
        }
    }

    #[test]
    fn prop_anonymise_replaces_only_listed(
        dataset in dataset_strategy(),
        to_anonymise in subset_strategy(),
    ) {
        let out = anonymise_fields(&dataset, &to_anonymise).unwrap();

        prop_assert_eq!(out.len(), dataset.len());
        for (before, after) in dataset.iter().zip(&out) {
            prop_assert_eq!(
                after.field_names().collect::<Vec<_>>(),
                before.field_names().collect::<Vec<_>>()
            );
            for (name, value) in before.iter() {
                let listed = to_anonymise.iter().any(|f| f == name);
                let expected = match value {
                    Value::String(_) if listed => Value::from(ANONYMISED_STRING),
                    Value::Integer(_) if listed => Value::Integer(ANONYMISED_INTEGER),
                    other => other.clone(),
                };
                prop_assert_eq!(after.get(name), Some(&expected));
            }
        }
    }
}
