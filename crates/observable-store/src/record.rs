//! Structured record type with a field-level merge.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{StoreError, StoreResult};

/// A cached entity: a flat map of top-level fields.
///
/// Nested objects are treated as opaque field values; merging is one level
/// deep only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// The `id` field, when it is a string.
    pub fn id(&self) -> Option<&str> {
        self.fields.get("id").and_then(Value::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(field.into(), value)
    }

    /// Builder-style [`Record::insert`].
    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.insert(field, value);
        self
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    /// Shallow-overlay `partial` onto this record.
    ///
    /// Fields present in `partial` overwrite; absent fields are kept. An
    /// explicit `null` deletes the field, as a realtime write of `null` does.
    /// Returns whether anything changed.
    pub fn merge(&mut self, partial: &Record) -> bool {
        let mut changed = false;
        for (field, value) in &partial.fields {
            if value.is_null() {
                changed |= self.fields.remove(field).is_some();
                continue;
            }
            if self.fields.get(field) != Some(value) {
                self.fields.insert(field.clone(), value.clone());
                changed = true;
            }
        }
        changed
    }

    /// Consuming form of [`Record::merge`].
    pub fn overlay(mut self, partial: &Record) -> Self {
        self.merge(partial);
        self
    }
}

impl TryFrom<Value> for Record {
    type Error = StoreError;

    fn try_from(value: Value) -> StoreResult<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            Value::Null => Err(StoreError::NotAnObject("null")),
            Value::Bool(_) => Err(StoreError::NotAnObject("bool")),
            Value::Number(_) => Err(StoreError::NotAnObject("number")),
            Value::String(_) => Err(StoreError::NotAnObject("string")),
            Value::Array(_) => Err(StoreError::NotAnObject("array")),
        }
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        record.into_value()
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
