//! Model metadata: what the mapping layer tells us about a model class.
//! Endpoints are derived from this; rows travel as JSON object maps.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// One row of a model, as a JSON object map.
pub type Row = serde_json::Map<String, Value>;

/// Identity of a model, used as the registry key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(name: impl Into<String>) -> Self {
        ModelId(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&Model> for ModelId {
    fn from(model: &Model) -> Self {
        model.id()
    }
}

impl From<&str> for ModelId {
    fn from(name: &str) -> Self {
        ModelId::new(name)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// PostgreSQL type name for SQL casts (e.g. "timestamptz") when binding string values.
    #[serde(default)]
    pub pg_type: Option<String>,
    #[serde(default = "default_true")]
    pub nullable: bool,
}

fn default_true() -> bool {
    true
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>) -> Self {
        ColumnInfo {
            name: name.into(),
            pg_type: None,
            nullable: true,
        }
    }
}

/// Direction of a relation: to_one (we have FK to them) or to_many (they have FK to us).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationDirection {
    ToOne,
    ToMany,
}

/// A relation exposed under `/{collection}/{instid}/{relationname}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Relation {
    pub name: String,
    pub direction: RelationDirection,
    #[serde(default = "default_schema")]
    pub target_schema: String,
    pub target_table: String,
    /// Primary key of the related table, matched against `relationinstid`.
    pub target_primary_key: String,
    /// Our column used in the join (our FK for to_one; our PK for to_many).
    pub our_key_column: String,
    /// Their column used in the join (their PK for to_one; their FK for to_many).
    pub their_key_column: String,
}

fn default_schema() -> String {
    "public".into()
}

/// Named attribute computed from a row, exposed through `include_methods`.
pub type ComputedAttribute = Arc<dyn Fn(&Row) -> Value + Send + Sync>;

#[derive(Clone, Default)]
pub struct ComputedAttributes(BTreeMap<String, ComputedAttribute>);

impl ComputedAttributes {
    pub fn get(&self, name: &str) -> Option<&ComputedAttribute> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }
}

impl fmt::Debug for ComputedAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Model {
    /// Model identity (e.g. "Person").
    pub name: String,
    #[serde(default = "default_schema")]
    pub schema_name: String,
    /// Natural storage name; the default collection name.
    pub table_name: String,
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(skip)]
    pub computed: ComputedAttributes,
}

impl Model {
    pub fn new(name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Model {
            name: name.into(),
            schema_name: default_schema(),
            table_name: table_name.into(),
            primary_key: Vec::new(),
            columns: Vec::new(),
            relations: Vec::new(),
            computed: ComputedAttributes::default(),
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema_name = schema.into();
        self
    }

    /// Adds a primary-key column (also registered as a column).
    pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
        let column = column.into();
        if !self.has_column(&column) {
            self.columns.push(ColumnInfo::new(column.clone()));
        }
        self.primary_key.push(column);
        self
    }

    pub fn with_column(mut self, column: ColumnInfo) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(names.into_iter().map(ColumnInfo::new));
        self
    }

    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn with_computed<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Row) -> Value + Send + Sync + 'static,
    {
        self.computed.0.insert(name.into(), Arc::new(f));
        self
    }

    pub fn id(&self) -> ModelId {
        ModelId::new(self.name.clone())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// `"id"` when it is one of the primary-key columns, else the first primary-key column.
    pub fn primary_key_name(&self) -> Result<&str, ConfigError> {
        if self.primary_key.iter().any(|pk| pk == "id") {
            return Ok("id");
        }
        self.primary_key
            .first()
            .map(String::as_str)
            .ok_or_else(|| ConfigError::MissingPrimaryKey(self.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_key_name_prefers_id() {
        let model = Model::new("Pair", "pair")
            .with_primary_key("key")
            .with_primary_key("id");
        assert_eq!(model.primary_key_name(), Ok("id"));

        let model = Model::new("Tag", "tag").with_primary_key("slug");
        assert_eq!(model.primary_key_name(), Ok("slug"));
    }

    #[test]
    fn model_without_primary_key_is_rejected() {
        let model = Model::new("Loose", "loose").with_columns(["a"]);
        assert_eq!(
            model.primary_key_name(),
            Err(ConfigError::MissingPrimaryKey("Loose".into()))
        );
    }

    #[test]
    fn deserializes_from_json() {
        let model: Model = serde_json::from_value(serde_json::json!({
            "name": "Person",
            "table_name": "person",
            "primary_key": ["id"],
            "columns": [{ "name": "id", "pg_type": "bigint" }, { "name": "name" }],
            "relations": [{
                "name": "computers",
                "direction": "to_many",
                "target_table": "computer",
                "target_primary_key": "id",
                "our_key_column": "id",
                "their_key_column": "owner_id"
            }]
        }))
        .unwrap();
        assert_eq!(model.schema_name, "public");
        assert!(model.has_column("name"));
        assert_eq!(
            model.relation("computers").map(|r| r.direction),
            Some(RelationDirection::ToMany)
        );
    }
}
