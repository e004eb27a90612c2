#![allow(dead_code)]

use async_trait::async_trait;
use restless_sdk::config::{Model, Relation, RelationDirection, Row};
use restless_sdk::service::{SearchQuery, SearchResult, Session, SessionError, Window};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// Tables of JSON rows keyed by table name. Integer ids are assigned on insert.
#[derive(Default)]
pub struct MemorySession {
    tables: Mutex<HashMap<String, Vec<Row>>>,
    /// Fails `create` with this validation kind when set.
    pub reject_create: Mutex<Option<String>>,
}

fn text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn matches(row: &Row, query: &SearchQuery) -> Result<bool, SessionError> {
    for f in &query.filters {
        let field = row.get(&f.name).cloned().unwrap_or(Value::Null);
        let ok = match f.op.as_str() {
            "==" | "eq" => field == f.val,
            "!=" | "neq" => field != f.val,
            ">" | "gt" => field.as_f64() > f.val.as_f64(),
            "<" | "lt" => field.as_f64() < f.val.as_f64(),
            other => return Err(SessionError::BadQuery(format!("unknown operator '{}'", other))),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

impl MemorySession {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, table: &str, row: Value) {
        if let Value::Object(row) = row {
            self.tables.lock().unwrap().entry(table.to_string()).or_default().push(row);
        }
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables.lock().unwrap().get(table).cloned().unwrap_or_default()
    }

    fn find(&self, model: &Model, key: &str, id: &str) -> Option<Row> {
        self.rows(&model.table_name)
            .into_iter()
            .find(|r| r.get(key).map(text).as_deref() == Some(id))
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn search(
        &self,
        model: &Model,
        query: &SearchQuery,
        window: Option<Window>,
    ) -> Result<SearchResult, SessionError> {
        let mut rows = Vec::new();
        for row in self.rows(&model.table_name) {
            if matches(&row, query)? {
                rows.push(row);
            }
        }
        let total = rows.len() as u64;
        if let Some(w) = window {
            rows = rows
                .into_iter()
                .skip(w.offset as usize)
                .take(w.limit as usize)
                .collect();
        }
        Ok(SearchResult { rows, total })
    }

    async fn get(&self, model: &Model, key: &str, id: &str) -> Result<Option<Row>, SessionError> {
        Ok(self.find(model, key, id))
    }

    async fn create(&self, model: &Model, mut row: Row) -> Result<Row, SessionError> {
        if let Some(kind) = self.reject_create.lock().unwrap().clone() {
            let errors: BTreeMap<String, String> =
                [("name".to_string(), "must not be empty".to_string())].into();
            return Err(SessionError::Validation { kind, errors });
        }
        let mut tables = self.tables.lock().unwrap();
        let table = tables.entry(model.table_name.clone()).or_default();
        let pk = model.primary_key_name().unwrap_or("id").to_string();
        if !row.contains_key(&pk) {
            row.insert(pk, json!(table.len() as u64 + 1));
        }
        for column in &model.columns {
            row.entry(column.name.clone()).or_insert(Value::Null);
        }
        table.push(row.clone());
        Ok(row)
    }

    async fn update(
        &self,
        model: &Model,
        key: &str,
        id: &str,
        changes: Row,
    ) -> Result<Option<Row>, SessionError> {
        let mut tables = self.tables.lock().unwrap();
        let table = tables.entry(model.table_name.clone()).or_default();
        match table.iter_mut().find(|r| r.get(key).map(text).as_deref() == Some(id)) {
            Some(row) => {
                row.extend(changes);
                Ok(Some(row.clone()))
            }
            None => Ok(None),
        }
    }

    async fn update_many(
        &self,
        model: &Model,
        query: &SearchQuery,
        changes: Row,
    ) -> Result<u64, SessionError> {
        let mut tables = self.tables.lock().unwrap();
        let table = tables.entry(model.table_name.clone()).or_default();
        let mut n = 0;
        for row in table.iter_mut() {
            if matches(row, query)? {
                row.extend(changes.clone());
                n += 1;
            }
        }
        Ok(n)
    }

    async fn delete(&self, model: &Model, key: &str, id: &str) -> Result<bool, SessionError> {
        let mut tables = self.tables.lock().unwrap();
        let table = tables.entry(model.table_name.clone()).or_default();
        let before = table.len();
        table.retain(|r| r.get(key).map(text).as_deref() != Some(id));
        Ok(table.len() < before)
    }

    async fn delete_many(&self, model: &Model, query: &SearchQuery) -> Result<u64, SessionError> {
        let mut tables = self.tables.lock().unwrap();
        let table = tables.entry(model.table_name.clone()).or_default();
        let before = table.len();
        let mut kept = Vec::new();
        for row in table.drain(..) {
            if !matches(&row, query)? {
                kept.push(row);
            }
        }
        *table = kept;
        Ok((before - table.len()) as u64)
    }

    async fn related(
        &self,
        model: &Model,
        key: &str,
        id: &str,
        relation: &Relation,
    ) -> Result<Option<Vec<Row>>, SessionError> {
        let Some(row) = self.find(model, key, id) else {
            return Ok(None);
        };
        let ours = row.get(&relation.our_key_column).cloned().unwrap_or(Value::Null);
        if ours.is_null() {
            return Ok(Some(Vec::new()));
        }
        let rows = self
            .rows(&relation.target_table)
            .into_iter()
            .filter(|r| r.get(&relation.their_key_column) == Some(&ours))
            .collect();
        Ok(Some(rows))
    }

    async fn remove_related(
        &self,
        model: &Model,
        key: &str,
        id: &str,
        relation: &Relation,
        related_id: &str,
    ) -> Result<bool, SessionError> {
        let Some(row) = self.find(model, key, id) else {
            return Ok(false);
        };
        let ours = row.get(&relation.our_key_column).cloned().unwrap_or(Value::Null);
        let mut tables = self.tables.lock().unwrap();
        match relation.direction {
            RelationDirection::ToMany => {
                let related = tables.entry(relation.target_table.clone()).or_default();
                let target = related.iter_mut().find(|r| {
                    r.get(&relation.target_primary_key).map(text).as_deref() == Some(related_id)
                        && r.get(&relation.their_key_column) == Some(&ours)
                });
                match target {
                    Some(r) => {
                        r.insert(relation.their_key_column.clone(), Value::Null);
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
            RelationDirection::ToOne => {
                let table = tables.entry(model.table_name.clone()).or_default();
                match table.iter_mut().find(|r| r.get(key).map(text).as_deref() == Some(id)) {
                    Some(r) if text(&ours) == related_id => {
                        r.insert(relation.our_key_column.clone(), Value::Null);
                        Ok(true)
                    }
                    _ => Ok(false),
                }
            }
        }
    }

    async fn evaluate(&self, model: &Model, query: &SearchQuery) -> Result<Row, SessionError> {
        let mut out = Row::new();
        let rows = self.rows(&model.table_name);
        for call in &query.functions {
            let values = rows.iter().filter_map(|r| r.get(&call.field).and_then(Value::as_f64));
            let value = match call.name.as_str() {
                "sum" => json!(values.sum::<f64>()),
                "count" => json!(values.count()),
                "max" => json!(values.fold(f64::MIN, f64::max)),
                other => {
                    return Err(SessionError::BadQuery(format!(
                        "unsupported function '{}'",
                        other
                    )))
                }
            };
            out.insert(call.result_key(), value);
        }
        Ok(out)
    }
}

pub fn person() -> Model {
    Model::new("Person", "person")
        .with_primary_key("id")
        .with_columns(["name", "age"])
        .with_relation(Relation {
            name: "computers".into(),
            direction: RelationDirection::ToMany,
            target_schema: "public".into(),
            target_table: "computer".into(),
            target_primary_key: "id".into(),
            our_key_column: "id".into(),
            their_key_column: "owner_id".into(),
        })
}

pub fn computer() -> Model {
    Model::new("Computer", "computer")
        .with_primary_key("id")
        .with_columns(["name", "owner_id"])
}

pub fn seeded() -> Arc<MemorySession> {
    let session = MemorySession::new();
    session.insert("person", json!({ "id": 1, "name": "Ada", "age": 36 }));
    session.insert("person", json!({ "id": 2, "name": "Alan", "age": 41 }));
    session.insert("person", json!({ "id": 3, "name": "Grace", "age": 85 }));
    session.insert("computer", json!({ "id": 10, "name": "Engine", "owner_id": 1 }));
    session.insert("computer", json!({ "id": 11, "name": "Mark I", "owner_id": 3 }));
    session
}
