//! Tests for `error` module

use super::*;

#[test]
fn test_error_codes_are_unique() {
    // Arrange
    let errors: Vec<Error> = vec![
        Error::UnsupportedDatabase("redis".into()),
        Error::Connection("refused".into()),
        Error::Read("bad row".into()),
        Error::Write("constraint".into()),
        Error::FieldNotFound {
            field: "age".into(),
            record: 0,
        },
        Error::UnsupportedAnonymizationType {
            field: "active".into(),
            type_name: "boolean",
        },
        Error::Config("missing".into()),
        Error::Io(std::io::Error::other("disk")),
    ];

    // Act
    let codes: Vec<&str> = errors.iter().map(Error::code).collect();

    // Assert
    let mut unique_codes = codes.clone();
    unique_codes.sort_unstable();
    unique_codes.dedup();
    assert_eq!(codes.len(), unique_codes.len(), "Error codes must be unique");
    for (err, code) in errors.iter().zip(&codes) {
        assert!(
            err.to_string().contains(code),
            "Display of {err:?} should contain {code}"
        );
    }
}

#[test]
fn test_messages_name_the_offender() {
    assert!(Error::UnsupportedDatabase("redis".into())
        .to_string()
        .contains("redis"));

    let err = Error::FieldNotFound {
        field: "age".into(),
        record: 1,
    };
    assert!(err.to_string().contains("'age'"));
    assert!(err.to_string().contains("#1"));

    let err = Error::UnsupportedAnonymizationType {
        field: "score".into(),
        type_name: "float",
    };
    assert!(err.to_string().contains("'score'"));
    assert!(err.to_string().contains("float"));
}

#[test]
fn test_is_timeout() {
    assert!(Error::Read("operation timed out after 30s".into()).is_timeout());
    assert!(Error::Connection("connect timed out after 5s".into()).is_timeout());
    assert!(!Error::Write("duplicate key".into()).is_timeout());
    assert!(!Error::Config("timed out".into()).is_timeout());
}
