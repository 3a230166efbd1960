//! Interface-boundary descriptors: models, properties, typed values, records.
//!
//! The crate does not define models itself; callers describe them with these
//! types and hand them in alongside queries and records.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::Error;

/// Storage-level type of a property. Everything is stored as text; kinds other
/// than `String` are coerced back into typed values on read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyKind {
    /// Integer primary key assigned from the per-model atomic counter when absent.
    Serial,
    Integer,
    String,
    DateTime,
    Date,
}

impl PropertyKind {
    pub(crate) fn coerce(self, field: &str, raw: &str) -> Result<Value, Error> {
        let bad = || Error::BadStoredValue {
            field: field.to_string(),
            value: raw.to_string(),
        };
        match self {
            PropertyKind::String => Ok(Value::Str(raw.to_string())),
            PropertyKind::Serial | PropertyKind::Integer => {
                raw.parse().map(Value::Int).map_err(|_| bad())
            }
            PropertyKind::DateTime => DateTime::parse_from_rfc3339(raw)
                .map(|t| Value::DateTime(t.with_timezone(&Utc)))
                .map_err(|_| bad()),
            PropertyKind::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|_| bad()),
        }
    }
}

/// A typed field value. Nulls are represented by absence from the [`Record`],
/// never by a value variant.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
}

impl Value {
    /// The textual form written to the store and used for index keying.
    pub fn to_stored(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::DateTime(t) => t.to_rfc3339(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::DateTime(t)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

#[derive(Clone, Debug)]
pub struct Property {
    pub name: String,
    pub kind: PropertyKind,
    pub indexed: bool,
}

/// How a comparison subject reaches another model.
#[derive(Clone, Debug)]
pub enum Relationship {
    /// A foreign-key field on the queried (child) model referencing a parent key.
    ManyToOne { child_field: String },
    /// Two many-to-one legs chained through a join model: `near_field` is the
    /// join's foreign key back to the queried model, `far_field` the join's
    /// foreign key holding the compared value.
    ManyToMany {
        join_model: Model,
        near_field: String,
        far_field: String,
    },
}

/// Descriptor for one record type: name, ordered primary key, properties, and
/// which fields act as foreign keys (those are indexed implicitly).
#[derive(Clone, Debug)]
pub struct Model {
    pub name: String,
    pub key_fields: Vec<String>,
    pub properties: Vec<Property>,
    pub foreign_keys: Vec<String>,
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_fields: Vec::new(),
            properties: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// Append a primary-key field. Call order fixes the key tuple order.
    pub fn key(mut self, name: &str, kind: PropertyKind) -> Self {
        self.key_fields.push(name.to_string());
        self.push(name, kind, false)
    }

    pub fn property(mut self, name: &str, kind: PropertyKind) -> Self {
        self.push(name, kind, false)
    }

    pub fn indexed(mut self, name: &str, kind: PropertyKind) -> Self {
        self.push(name, kind, true)
    }

    pub fn foreign_key(mut self, name: &str, kind: PropertyKind) -> Self {
        self.foreign_keys.push(name.to_string());
        self.push(name, kind, false)
    }

    fn push(mut self, name: &str, kind: PropertyKind, indexed: bool) -> Self {
        self.properties.push(Property {
            name: name.to_string(),
            kind,
            indexed,
        });
        self
    }

    pub fn find_property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn is_key_field(&self, name: &str) -> bool {
        self.key_fields.iter().any(|k| k == name)
    }

    /// Indexed fields get an index set per distinct value; foreign keys always do.
    pub fn is_indexed(&self, name: &str) -> bool {
        self.foreign_keys.iter().any(|f| f == name)
            || self.find_property(name).is_some_and(|p| p.indexed)
    }

    /// Canonical identity string: primary-key values joined by `:`, in key order.
    pub fn identity(&self, record: &Record) -> Result<String, Error> {
        let mut parts = Vec::with_capacity(self.key_fields.len());
        for field in &self.key_fields {
            let value = record.get(field).ok_or_else(|| {
                Error::InvalidIdentity(format!(
                    "{} record is missing primary key field {field}",
                    self.name
                ))
            })?;
            parts.push(value.to_stored());
        }
        Ok(parts.join(":"))
    }
}

/// One record: a map from field name to value. Absent fields are null.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter for literals.
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Restrict to the given fields; unknown names are simply absent.
    pub fn project(&self, fields: &[String]) -> Record {
        Record {
            fields: self
                .fields
                .iter()
                .filter(|(name, _)| fields.contains(name))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        }
    }
}
