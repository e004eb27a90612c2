//! Builds parameterized SELECT, INSERT, UPDATE, DELETE for a model.
//! Rows are projected with `to_jsonb` so every statement yields JSON objects.

use crate::config::{Model, Relation, Row};
use crate::service::{FilterOp, FunctionCall, SearchQuery, SessionError, SortDirection, Window};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

const ALIAS: &str = "t";
const RELATED_ALIAS: &str = "r";

/// Quote identifier for PostgreSQL (safe: only from config).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

fn function_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"))
}

/// SQL function names accepted for evaluation.
pub fn is_function_name(name: &str) -> bool {
    function_name_pattern().is_match(name)
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn push_param(&mut self, v: Value) -> usize {
        self.params.push(v);
        self.params.len()
    }

    /// Placeholder for a value compared with or stored in `column`; casts when the type is known.
    fn placeholder(&mut self, model: &Model, column: &str, v: Value) -> String {
        let n = self.push_param(v);
        match model.column(column).and_then(|c| c.pg_type.as_deref()) {
            Some(t) => format!("${}::{}", n, t),
            None => format!("${}", n),
        }
    }

    /// `alias.key = $n`, comparing as text unless the column type is known.
    fn key_predicate(&mut self, model: &Model, alias: &str, key: &str, id: &str) -> String {
        let col = format!("{}.{}", alias, quoted(key));
        match model.column(key).and_then(|c| c.pg_type.as_deref()) {
            Some(t) => {
                let n = self.push_param(Value::String(id.to_string()));
                format!("{} = ${}::{}", col, n, t)
            }
            None => {
                let n = self.push_param(Value::String(id.to_string()));
                format!("{}::text = ${}", col, n)
            }
        }
    }
}

fn bad_query(msg: impl Into<String>) -> SessionError {
    SessionError::BadQuery(msg.into())
}

fn checked_column<'a>(model: &Model, name: &'a str) -> Result<&'a str, SessionError> {
    if model.has_column(name) {
        Ok(name)
    } else {
        Err(bad_query(format!("no such field '{}'", name)))
    }
}

fn where_clause(
    model: &Model,
    query: &SearchQuery,
    q: &mut QueryBuf,
) -> Result<String, SessionError> {
    let mut parts = Vec::with_capacity(query.filters.len());
    for filter in &query.filters {
        let column = checked_column(model, &filter.name)?;
        let op: FilterOp = filter.op.parse().map_err(bad_query)?;
        let col = format!("{}.{}", ALIAS, quoted(column));
        let part = match op {
            FilterOp::IsNull => format!("{} IS NULL", col),
            FilterOp::IsNotNull => format!("{} IS NOT NULL", col),
            FilterOp::In | FilterOp::NotIn => {
                let values = filter
                    .val
                    .as_array()
                    .ok_or_else(|| bad_query(format!("'{}' expects a list", filter.op)))?;
                if values.is_empty() {
                    if op == FilterOp::In { "FALSE".to_string() } else { "TRUE".to_string() }
                } else {
                    let phs: Vec<String> = values
                        .iter()
                        .map(|v| q.placeholder(model, column, v.clone()))
                        .collect();
                    let kw = if op == FilterOp::In { "IN" } else { "NOT IN" };
                    format!("{} {} ({})", col, kw, phs.join(", "))
                }
            }
            FilterOp::Like | FilterOp::Ilike => {
                let n = q.push_param(filter.val.clone());
                format!("{}::text {} ${}", col, op.sql_operator().unwrap_or("LIKE"), n)
            }
            _ => {
                let ph = q.placeholder(model, column, filter.val.clone());
                format!("{} {} {}", col, op.sql_operator().unwrap_or("="), ph)
            }
        };
        parts.push(part);
    }
    Ok(if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    })
}

fn order_clause(model: &Model, query: &SearchQuery, alias: &str) -> Result<String, SessionError> {
    if query.order_by.is_empty() {
        return Ok(String::new());
    }
    let parts = query
        .order_by
        .iter()
        .map(|o| {
            let column = checked_column(model, &o.field)?;
            let dir = match o.direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            Ok(format!("{}.{} {}", alias, quoted(column), dir))
        })
        .collect::<Result<Vec<_>, SessionError>>()?;
    Ok(format!(" ORDER BY {}", parts.join(", ")))
}

fn limit_clause(q: &mut QueryBuf, limit: Option<u64>, offset: Option<u64>) -> String {
    let mut out = String::new();
    if let Some(limit) = limit {
        let n = q.push_param(Value::from(limit));
        out.push_str(&format!(" LIMIT ${}", n));
    }
    if let Some(offset) = offset {
        let n = q.push_param(Value::from(offset));
        out.push_str(&format!(" OFFSET ${}", n));
    }
    out
}

/// Rows matching the query (filters, order, its own limit/offset) as a subquery.
fn matching_rows(
    model: &Model,
    query: &SearchQuery,
    q: &mut QueryBuf,
) -> Result<String, SessionError> {
    let table = qualified_table(&model.schema_name, &model.table_name);
    let where_sql = where_clause(model, query, q)?;
    let order_sql = order_clause(model, query, ALIAS)?;
    let limit_sql = limit_clause(q, query.limit, query.offset);
    Ok(format!(
        "SELECT {}.* FROM {} AS {}{}{}{}",
        ALIAS, table, ALIAS, where_sql, order_sql, limit_sql
    ))
}

/// Page of matching rows; the window applies on top of the query's own limit/offset.
pub fn select_page(
    model: &Model,
    query: &SearchQuery,
    window: Option<Window>,
) -> Result<QueryBuf, SessionError> {
    let mut q = QueryBuf::default();
    let inner = matching_rows(model, query, &mut q)?;
    let order_sql = order_clause(model, query, "sub")?;
    let limit_sql = limit_clause(&mut q, window.map(|w| w.limit), window.map(|w| w.offset));
    q.sql = format!(
        "SELECT to_jsonb(sub) FROM ({}) AS sub{}{}",
        inner, order_sql, limit_sql
    );
    Ok(q)
}

pub fn count_matching(model: &Model, query: &SearchQuery) -> Result<QueryBuf, SessionError> {
    let mut q = QueryBuf::default();
    let inner = matching_rows(model, query, &mut q)?;
    q.sql = format!("SELECT COUNT(*) FROM ({}) AS sub", inner);
    Ok(q)
}

pub fn select_by_key(model: &Model, key: &str, id: &str) -> QueryBuf {
    let mut q = QueryBuf::default();
    let table = qualified_table(&model.schema_name, &model.table_name);
    let pred = q.key_predicate(model, ALIAS, key, id);
    q.sql = format!("SELECT to_jsonb({}) FROM {} AS {} WHERE {}", ALIAS, table, ALIAS, pred);
    q
}

pub fn insert(model: &Model, row: &Row) -> QueryBuf {
    let mut q = QueryBuf::default();
    let table = qualified_table(&model.schema_name, &model.table_name);
    let cols: Vec<&String> = row.keys().filter(|k| model.has_column(k)).collect();
    if cols.is_empty() {
        q.sql = format!(
            "INSERT INTO {} AS {} DEFAULT VALUES RETURNING to_jsonb({})",
            table, ALIAS, ALIAS
        );
        return q;
    }
    let names: Vec<String> = cols.iter().map(|c| quoted(c)).collect();
    let phs: Vec<String> = cols
        .iter()
        .map(|c| q.placeholder(model, c, row.get(c.as_str()).cloned().unwrap_or(Value::Null)))
        .collect();
    q.sql = format!(
        "INSERT INTO {} AS {} ({}) VALUES ({}) RETURNING to_jsonb({})",
        table,
        ALIAS,
        names.join(", "),
        phs.join(", "),
        ALIAS
    );
    q
}

fn set_clause(model: &Model, changes: &Row, q: &mut QueryBuf) -> Result<String, SessionError> {
    let sets: Vec<String> = changes
        .iter()
        .filter(|(k, _)| model.has_column(k))
        .map(|(k, v)| format!("{} = {}", quoted(k), q.placeholder(model, k, v.clone())))
        .collect();
    if sets.is_empty() {
        return Err(bad_query("no fields to update"));
    }
    Ok(sets.join(", "))
}

pub fn update_by_key(
    model: &Model,
    key: &str,
    id: &str,
    changes: &Row,
) -> Result<QueryBuf, SessionError> {
    let mut q = QueryBuf::default();
    let table = qualified_table(&model.schema_name, &model.table_name);
    let sets = set_clause(model, changes, &mut q)?;
    let pred = q.key_predicate(model, ALIAS, key, id);
    q.sql = format!(
        "UPDATE {} AS {} SET {} WHERE {} RETURNING to_jsonb({})",
        table, ALIAS, sets, pred, ALIAS
    );
    Ok(q)
}

/// Updates every row whose primary key is among the query's matches.
pub fn update_matching(
    model: &Model,
    key: &str,
    query: &SearchQuery,
    changes: &Row,
) -> Result<QueryBuf, SessionError> {
    let mut q = QueryBuf::default();
    let table = qualified_table(&model.schema_name, &model.table_name);
    let sets = set_clause(model, changes, &mut q)?;
    let inner = matching_rows(model, query, &mut q)?;
    q.sql = format!(
        "UPDATE {} AS u SET {} WHERE u.{} IN (SELECT sub.{} FROM ({}) AS sub)",
        table,
        sets,
        quoted(key),
        quoted(key),
        inner
    );
    Ok(q)
}

pub fn delete_by_key(model: &Model, key: &str, id: &str) -> QueryBuf {
    let mut q = QueryBuf::default();
    let table = qualified_table(&model.schema_name, &model.table_name);
    let pred = q.key_predicate(model, ALIAS, key, id);
    q.sql = format!("DELETE FROM {} AS {} WHERE {}", table, ALIAS, pred);
    q
}

pub fn delete_matching(
    model: &Model,
    key: &str,
    query: &SearchQuery,
) -> Result<QueryBuf, SessionError> {
    let mut q = QueryBuf::default();
    let table = qualified_table(&model.schema_name, &model.table_name);
    let inner = matching_rows(model, query, &mut q)?;
    q.sql = format!(
        "DELETE FROM {} AS d WHERE d.{} IN (SELECT sub.{} FROM ({}) AS sub)",
        table,
        quoted(key),
        quoted(key),
        inner
    );
    Ok(q)
}

/// Related rows joined through the relation's key columns.
pub fn select_related(model: &Model, key: &str, id: &str, relation: &Relation) -> QueryBuf {
    let mut q = QueryBuf::default();
    let table = qualified_table(&model.schema_name, &model.table_name);
    let related = qualified_table(&relation.target_schema, &relation.target_table);
    let pred = q.key_predicate(model, ALIAS, key, id);
    let owners = format!(
        "SELECT {t}.{ours} FROM {table} AS {t} WHERE {pred}",
        t = ALIAS,
        ours = quoted(&relation.our_key_column),
    );
    q.sql = format!(
        "SELECT to_jsonb({r}) FROM {related} AS {r} WHERE {r}.{their} IN ({owners})",
        r = RELATED_ALIAS,
        their = quoted(&relation.their_key_column),
    );
    q
}

/// Clears the foreign key that links the instance and the related instance.
pub fn unlink_related(
    model: &Model,
    key: &str,
    id: &str,
    relation: &Relation,
    related_id: &str,
) -> QueryBuf {
    use crate::config::RelationDirection;

    let mut q = QueryBuf::default();
    let table = qualified_table(&model.schema_name, &model.table_name);
    let related = qualified_table(&relation.target_schema, &relation.target_table);
    let pred = q.key_predicate(model, ALIAS, key, id);
    let n = q.push_param(Value::String(related_id.to_string()));
    let related_pred = format!(
        "{}.{}::text = ${}",
        RELATED_ALIAS,
        quoted(&relation.target_primary_key),
        n
    );
    let their = quoted(&relation.their_key_column);
    let ours = quoted(&relation.our_key_column);
    q.sql = match relation.direction {
        RelationDirection::ToMany => {
            let owners = format!("SELECT {t}.{ours} FROM {table} AS {t} WHERE {pred}", t = ALIAS);
            format!(
                "UPDATE {related} AS {r} SET {their} = NULL \
                 WHERE {related_pred} AND {r}.{their} IN ({owners})",
                r = RELATED_ALIAS,
            )
        }
        RelationDirection::ToOne => {
            let targets = format!(
                "SELECT {r}.{their} FROM {related} AS {r} WHERE {related_pred}",
                r = RELATED_ALIAS,
            );
            format!(
                "UPDATE {table} AS {t} SET {ours} = NULL \
                 WHERE {pred} AND {t}.{ours} IN ({targets})",
                t = ALIAS,
            )
        }
    };
    q
}

/// One JSON object keyed `name__field` with each function's value.
pub fn evaluate_functions(model: &Model, query: &SearchQuery) -> Result<QueryBuf, SessionError> {
    let mut q = QueryBuf::default();
    let table = qualified_table(&model.schema_name, &model.table_name);
    let calls = query
        .functions
        .iter()
        .map(|f: &FunctionCall| {
            if !is_function_name(&f.name) {
                return Err(bad_query(format!("invalid function name '{}'", f.name)));
            }
            let column = checked_column(model, &f.field)?;
            let n = q.push_param(Value::String(f.result_key()));
            Ok(format!("${}::text, {}({}.{})", n, f.name, ALIAS, quoted(column)))
        })
        .collect::<Result<Vec<_>, SessionError>>()?;
    let where_sql = where_clause(model, query, &mut q)?;
    q.sql = format!(
        "SELECT jsonb_build_object({}) FROM {} AS {}{}",
        calls.join(", "),
        table,
        ALIAS,
        where_sql
    );
    Ok(q)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColumnInfo, RelationDirection};
    use crate::service::Filter;
    use serde_json::json;

    fn person() -> Model {
        Model::new("Person", "person")
            .with_column(ColumnInfo {
                name: "id".into(),
                pg_type: Some("bigint".into()),
                nullable: false,
            })
            .with_primary_key("id")
            .with_columns(["name", "age"])
    }

    fn computers() -> Relation {
        Relation {
            name: "computers".into(),
            direction: RelationDirection::ToMany,
            target_schema: "public".into(),
            target_table: "computer".into(),
            target_primary_key: "id".into(),
            our_key_column: "id".into(),
            their_key_column: "owner_id".into(),
        }
    }

    #[test]
    fn select_by_key_casts_known_types() {
        let q = select_by_key(&person(), "id", "7");
        assert_eq!(
            q.sql,
            r#"SELECT to_jsonb(t) FROM "public"."person" AS t WHERE t."id" = $1::bigint"#
        );
        assert_eq!(q.params, vec![json!("7")]);
    }

    #[test]
    fn select_by_key_compares_text_otherwise() {
        let q = select_by_key(&person(), "name", "ann");
        assert!(q.sql.ends_with(r#"WHERE t."name"::text = $1"#));
    }

    #[test]
    fn page_applies_filters_order_and_window() {
        let query = SearchQuery {
            filters: vec![
                Filter::new("age", ">=", json!(18)),
                Filter::new("name", "in", json!(["a", "b"])),
            ],
            order_by: vec![crate::service::OrderBy {
                field: "name".into(),
                direction: SortDirection::Desc,
            }],
            ..Default::default()
        };
        let q = select_page(&person(), &query, Some(Window { offset: 20, limit: 10 })).unwrap();
        assert_eq!(
            q.sql,
            concat!(
                r#"SELECT to_jsonb(sub) FROM (SELECT t.* FROM "public"."person" AS t"#,
                r#" WHERE t."age" >= $1 AND t."name" IN ($2, $3) ORDER BY t."name" DESC) AS sub"#,
                r#" ORDER BY sub."name" DESC LIMIT $4 OFFSET $5"#
            )
        );
        assert_eq!(q.params, vec![json!(18), json!("a"), json!("b"), json!(10), json!(20)]);
    }

    #[test]
    fn unknown_field_or_operator_is_a_bad_query() {
        let query = SearchQuery {
            filters: vec![Filter::new("shoe_size", "==", json!(1))],
            ..Default::default()
        };
        assert!(matches!(count_matching(&person(), &query), Err(SessionError::BadQuery(_))));
        let query = SearchQuery {
            filters: vec![Filter::new("age", "between", json!(1))],
            ..Default::default()
        };
        assert!(matches!(count_matching(&person(), &query), Err(SessionError::BadQuery(_))));
    }

    #[test]
    fn empty_in_list_matches_nothing() {
        let query = SearchQuery {
            filters: vec![Filter::new("age", "in", json!([]))],
            ..Default::default()
        };
        let q = count_matching(&person(), &query).unwrap();
        assert!(q.sql.contains("WHERE FALSE"));
    }

    #[test]
    fn insert_uses_only_model_columns() {
        let row = json!({ "name": "ann", "bogus": 1 }).as_object().cloned().unwrap();
        let q = insert(&person(), &row);
        assert_eq!(
            q.sql,
            r#"INSERT INTO "public"."person" AS t ("name") VALUES ($1) RETURNING to_jsonb(t)"#
        );
    }

    #[test]
    fn update_without_fields_is_rejected() {
        assert!(update_by_key(&person(), "id", "1", &Row::new()).is_err());
    }

    #[test]
    fn related_rows_join_through_keys() {
        let q = select_related(&person(), "id", "1", &computers());
        assert_eq!(
            q.sql,
            concat!(
                r#"SELECT to_jsonb(r) FROM "public"."computer" AS r WHERE r."owner_id" IN"#,
                r#" (SELECT t."id" FROM "public"."person" AS t WHERE t."id" = $1::bigint)"#
            )
        );
    }

    #[test]
    fn unlink_to_many_clears_their_foreign_key() {
        let q = unlink_related(&person(), "id", "1", &computers(), "9");
        assert!(q.sql.starts_with(r#"UPDATE "public"."computer" AS r SET "owner_id" = NULL"#));
        assert_eq!(q.params, vec![json!("1"), json!("9")]);
    }

    #[test]
    fn functions_are_checked() {
        let query = SearchQuery {
            functions: vec![FunctionCall {
                name: "sum".into(),
                field: "age".into(),
            }],
            ..Default::default()
        };
        let q = evaluate_functions(&person(), &query).unwrap();
        assert_eq!(
            q.sql,
            r#"SELECT jsonb_build_object($1::text, sum(t."age")) FROM "public"."person" AS t"#
        );
        let query = SearchQuery {
            functions: vec![FunctionCall {
                name: "sum); DROP TABLE x; --".into(),
                field: "age".into(),
            }],
            ..Default::default()
        };
        assert!(evaluate_functions(&person(), &query).is_err());
    }
}
