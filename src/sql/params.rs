//! Convert serde_json::Value parameters into typed PostgreSQL arguments.

use crate::service::SessionError;
use serde_json::Value;
use sqlx::postgres::PgArguments;
use sqlx::Arguments;

/// Binds each value with its natural type; arrays and objects go in as JSONB.
pub fn to_arguments(params: &[Value]) -> Result<PgArguments, SessionError> {
    let mut args = PgArguments::default();
    for p in params {
        let added = match p {
            Value::Null => args.add(None::<String>),
            Value::Bool(b) => args.add(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    args.add(i)
                } else if let Some(f) = n.as_f64() {
                    args.add(f)
                } else {
                    args.add(n.to_string())
                }
            }
            Value::String(s) => args.add(s.clone()),
            Value::Array(_) | Value::Object(_) => args.add(sqlx::types::Json(p.clone())),
        };
        added.map_err(|e| SessionError::BadQuery(e.to_string()))?;
    }
    Ok(args)
}
