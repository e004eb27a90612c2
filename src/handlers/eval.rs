//! `GET /eval/{collection}`: evaluates SQL aggregate functions over a model.

use crate::config::Model;
use crate::error::AppError;
use crate::response::ApiResponse;
use crate::service::{SearchQuery, Session, SessionError};
use crate::sql::is_function_name;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub struct FunctionHandler {
    pub(crate) session: Arc<dyn Session>,
    pub(crate) model: Arc<Model>,
}

impl FunctionHandler {
    pub fn new(session: Arc<dyn Session>, model: Arc<Model>) -> Self {
        FunctionHandler { session, model }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub async fn handle(&self, query: HashMap<String, String>) -> Result<ApiResponse, AppError> {
        let search = match query.get("q") {
            Some(raw) => SearchQuery::from_json(raw).map_err(|e| {
                AppError::BadRequest(format!("unable to decode search query: {}", e))
            })?,
            None => SearchQuery::default(),
        };
        self.dispatch(&search).await
    }

    /// Result object is keyed `{name}__{field}`; no functions gives `{}`.
    pub async fn dispatch(&self, search: &SearchQuery) -> Result<ApiResponse, AppError> {
        for call in &search.functions {
            if !is_function_name(&call.name) {
                return Err(AppError::BadRequest(format!("invalid function name '{}'", call.name)));
            }
            if !self.model.has_column(&call.field) {
                return Err(AppError::BadRequest(format!("no column '{}'", call.field)));
            }
        }
        let values = self
            .session
            .evaluate(&self.model, search)
            .await
            .map_err(|e| match e {
                SessionError::BadQuery(msg) => AppError::BadRequest(msg),
                SessionError::Db(e) => AppError::Db(e),
                other => AppError::Session(other.to_string()),
            })?;
        Ok(ApiResponse::ok(Value::Object(values)))
    }
}
