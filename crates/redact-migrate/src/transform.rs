//! Field deletion and anonymisation stages.
//!
//! Both stages are strict: a configured field missing from any record fails
//! the whole dataset with [`Error::FieldNotFound`]. On error the caller's
//! dataset is left unchanged.

use tracing::debug;

use crate::error::{Error, Result};
use crate::record::{Dataset, Value};

/// Replacement for anonymised string values.
pub const ANONYMISED_STRING: &str = "Anonymised";

/// Replacement for anonymised integer values.
pub const ANONYMISED_INTEGER: i64 = 0;

/// Removes every field in `fields` from every record, in place.
///
/// # Errors
///
/// Returns [`Error::FieldNotFound`] for the first record lacking one of
/// `fields`; no record is modified in that case.
pub fn delete_fields(dataset: &mut Dataset, fields: &[String]) -> Result<()> {
    if fields.is_empty() {
        return Ok(());
    }

    for (index, record) in dataset.iter().enumerate() {
        if let Some(missing) = fields.iter().find(|f| !record.contains_field(f)) {
            return Err(Error::FieldNotFound {
                field: missing.clone(),
                record: index,
            });
        }
    }

    for record in dataset.iter_mut() {
        for field in fields {
            record.remove(field);
        }
    }

    debug!(
        "Deleted {} field(s) from {} record(s)",
        fields.len(),
        dataset.len()
    );
    Ok(())
}

/// Returns a copy of `dataset` with every field in `fields` replaced by a
/// placeholder: strings become [`ANONYMISED_STRING`], integers
/// [`ANONYMISED_INTEGER`]. Other fields are copied unchanged.
///
/// # Errors
///
/// Returns [`Error::FieldNotFound`] if a record lacks one of `fields`, and
/// [`Error::UnsupportedAnonymizationType`] if a listed field holds any
/// other type.
pub fn anonymise_fields(dataset: &Dataset, fields: &[String]) -> Result<Dataset> {
    if fields.is_empty() {
        return Ok(dataset.clone());
    }

    let mut anonymised = Dataset::with_capacity(dataset.len());
    for (index, record) in dataset.iter().enumerate() {
        let mut copy = record.clone();
        for field in fields {
            let placeholder = match record.get(field) {
                None => {
                    return Err(Error::FieldNotFound {
                        field: field.clone(),
                        record: index,
                    })
                }
                Some(value) => placeholder_for(field, value)?,
            };
            copy.insert(field.as_str(), placeholder);
        }
        anonymised.push(copy);
    }

    debug!(
        "Anonymised {} field(s) in {} record(s)",
        fields.len(),
        anonymised.len()
    );
    Ok(anonymised)
}

fn placeholder_for(field: &str, value: &Value) -> Result<Value> {
    match value {
        Value::String(_) => Ok(Value::String(ANONYMISED_STRING.to_string())),
        Value::Integer(_) => Ok(Value::Integer(ANONYMISED_INTEGER)),
        Value::Null | Value::Boolean(_) | Value::Float(_) | Value::List(_) | Value::Record(_) => {
            Err(Error::UnsupportedAnonymizationType {
                field: field.to_string(),
                type_name: value.type_name(),
            })
        }
    }
}

/// Transform pipeline configured for one run: delete, then anonymise.
#[derive(Debug, Clone, Default)]
pub struct Transformer {
    fields_to_delete: Vec<String>,
    fields_to_anonymise: Vec<String>,
}

impl Transformer {
    /// Creates a transformer from the configured field lists.
    #[must_use]
    pub fn new(fields_to_delete: Vec<String>, fields_to_anonymise: Vec<String>) -> Self {
        Self {
            fields_to_delete,
            fields_to_anonymise,
        }
    }

    /// Fields removed by [`Transformer::delete`].
    #[must_use]
    pub fn fields_to_delete(&self) -> &[String] {
        &self.fields_to_delete
    }

    /// Fields replaced by [`Transformer::anonymise`].
    #[must_use]
    pub fn fields_to_anonymise(&self) -> &[String] {
        &self.fields_to_anonymise
    }

    /// Runs the deletion stage.
    ///
    /// # Errors
    ///
    /// See [`delete_fields`].
    pub fn delete(&self, dataset: &mut Dataset) -> Result<()> {
        delete_fields(dataset, &self.fields_to_delete)
    }

    /// Runs the anonymisation stage.
    ///
    /// # Errors
    ///
    /// See [`anonymise_fields`].
    pub fn anonymise(&self, dataset: &Dataset) -> Result<Dataset> {
        anonymise_fields(dataset, &self.fields_to_anonymise)
    }

    /// Runs both stages in order, consuming the dataset.
    ///
    /// # Errors
    ///
    /// Returns the first stage error.
    pub fn apply(&self, mut dataset: Dataset) -> Result<Dataset> {
        self.delete(&mut dataset)?;
        self.anonymise(&dataset)
    }
}

#[cfg(test)]
#[path = "transform_tests.rs"]
mod tests;
