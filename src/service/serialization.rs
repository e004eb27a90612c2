//! Row ↔ wire conversion. Defaults apply the column policy of a configuration;
//! callers can replace either side with their own implementation or a closure.

use crate::config::{Model, ModelConfiguration, Row};
use serde_json::Value;
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SerializationError {
    #[error("model does not have field '{0}'")]
    UnknownField(String),
    #[error("{0}")]
    Custom(String),
}

pub trait Serializer: Send + Sync {
    fn serialize(&self, model: &Model, row: &Row) -> Result<Value, SerializationError>;
}

pub trait Deserializer: Send + Sync {
    fn deserialize(&self, model: &Model, body: Row) -> Result<Row, SerializationError>;
}

impl<F> Serializer for F
where
    F: Fn(&Model, &Row) -> Result<Value, SerializationError> + Send + Sync,
{
    fn serialize(&self, model: &Model, row: &Row) -> Result<Value, SerializationError> {
        self(model, row)
    }
}

impl<F> Deserializer for F
where
    F: Fn(&Model, Row) -> Result<Row, SerializationError> + Send + Sync,
{
    fn deserialize(&self, model: &Model, body: Row) -> Result<Row, SerializationError> {
        self(model, body)
    }
}

/// Include-list or exclude-list filtering, plus computed attributes from `include_methods`.
#[derive(Clone, Debug, Default)]
pub struct ColumnSerializer {
    include: Option<BTreeSet<String>>,
    exclude: BTreeSet<String>,
    include_methods: Vec<String>,
}

impl ColumnSerializer {
    pub fn from_config(config: &ModelConfiguration) -> Self {
        ColumnSerializer {
            include: config
                .include_columns
                .as_ref()
                .map(|cols| cols.iter().cloned().collect()),
            exclude: config
                .exclude_columns
                .iter()
                .flatten()
                .cloned()
                .collect(),
            include_methods: config.include_methods.clone().unwrap_or_default(),
        }
    }

    fn keeps(&self, column: &str) -> bool {
        match &self.include {
            Some(include) => include.contains(column),
            None => !self.exclude.contains(column),
        }
    }
}

impl Serializer for ColumnSerializer {
    fn serialize(&self, model: &Model, row: &Row) -> Result<Value, SerializationError> {
        let mut out: Row = row
            .iter()
            .filter(|(k, _)| self.keeps(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for name in &self.include_methods {
            if let Some(attr) = model.computed.get(name) {
                out.insert(name.clone(), attr(row));
            }
        }
        Ok(Value::Object(out))
    }
}

/// Keeps model columns, drops relation and computed keys, rejects anything else.
#[derive(Clone, Copy, Debug, Default)]
pub struct ColumnDeserializer;

impl Deserializer for ColumnDeserializer {
    fn deserialize(&self, model: &Model, body: Row) -> Result<Row, SerializationError> {
        let mut out = Row::new();
        for (key, value) in body {
            if model.has_column(&key) {
                out.insert(key, value);
            } else if model.relation(&key).is_none() && !model.computed.contains(&key) {
                return Err(SerializationError::UnknownField(key));
            }
        }
        Ok(out)
    }
}
