//! Bound handler for one model's collection, instance and relation routes.
//! A single handler serves all five route shapes; absent placeholders arrive as `None`.

use crate::config::{HttpMethod, MethodSet, Model, RelationDirection, Row};
use crate::error::AppError;
use crate::processors::ProcessorChains;
use crate::response::{ApiResponse, Paginated};
use crate::service::{Deserializer, SearchQuery, Serializer, Session, SessionError, Window};
use axum::body::Bytes;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

pub const INSTANCE_ID: &str = "instid";
pub const RELATION_NAME: &str = "relationname";
pub const RELATION_INSTANCE_ID: &str = "relationinstid";

/// Path placeholders of a matched route. Placeholders the route does not carry are `None`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouteParams {
    pub instid: Option<String>,
    pub relationname: Option<String>,
    pub relationinstid: Option<String>,
}

impl RouteParams {
    pub fn from_path(mut path: HashMap<String, String>) -> Self {
        RouteParams {
            instid: path.remove(INSTANCE_ID),
            relationname: path.remove(RELATION_NAME),
            relationinstid: path.remove(RELATION_INSTANCE_ID),
        }
    }
}

/// Whether a request addresses one instance or a collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    Single,
    Many,
}

/// A request as seen by hooks and the handler.
#[derive(Clone, Debug)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub params: RouteParams,
    pub query: BTreeMap<String, String>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: HttpMethod) -> Self {
        ApiRequest {
            method,
            params: RouteParams::default(),
            query: BTreeMap::new(),
            body: None,
        }
    }

    pub fn with_instance(mut self, id: impl Into<String>) -> Self {
        self.params.instid = Some(id.into());
        self
    }

    pub fn with_relation(mut self, name: impl Into<String>) -> Self {
        self.params.relationname = Some(name.into());
        self
    }

    pub fn with_relation_instance(mut self, id: impl Into<String>) -> Self {
        self.params.relationinstid = Some(id.into());
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn scope(&self) -> Scope {
        if self.params.instid.is_some() && self.params.relationname.is_none() {
            Scope::Single
        } else if self.params.relationinstid.is_some() {
            Scope::Single
        } else {
            Scope::Many
        }
    }

    /// `[METHOD, METHOD_SINGLE|METHOD_MANY]`; POST only has its bare token.
    pub fn processor_tokens(&self) -> Vec<String> {
        let method = self.method.as_str();
        if self.method == HttpMethod::Post {
            return vec![method.to_string()];
        }
        let scoped = match self.scope() {
            Scope::Single => format!("{}_SINGLE", method),
            Scope::Many => format!("{}_MANY", method),
        };
        vec![method.to_string(), scoped]
    }

    /// The `q` search document from the query string, if any.
    fn search_from_query(&self) -> Result<SearchQuery, AppError> {
        match self.query.get("q") {
            Some(raw) => SearchQuery::from_json(raw)
                .map_err(|e| AppError::BadRequest(format!("unable to decode search query: {}", e))),
            None => Ok(SearchQuery::default()),
        }
    }

    fn body_object(&self) -> Result<Row, AppError> {
        match &self.body {
            Some(Value::Object(map)) => Ok(map.clone()),
            Some(_) => Err(AppError::BadRequest("body must be a JSON object".into())),
            None => Err(AppError::BadRequest("request body is required".into())),
        }
    }
}

/// Everything a generated endpoint needs, captured once at build time.
pub struct ApiHandler {
    pub(crate) session: Arc<dyn Session>,
    pub(crate) model: Arc<Model>,
    pub(crate) primary_key: String,
    pub(crate) methods: MethodSet,
    pub(crate) allow_patch_many: bool,
    pub(crate) allow_delete_many: bool,
    pub(crate) results_per_page: u32,
    pub(crate) max_results_per_page: u32,
    pub(crate) serializer: Arc<dyn Serializer>,
    pub(crate) deserializer: Arc<dyn Deserializer>,
    pub(crate) validation_exceptions: BTreeSet<String>,
    pub(crate) chains: ProcessorChains,
}

impl ApiHandler {
    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn methods(&self) -> &MethodSet {
        &self.methods
    }

    pub fn chains(&self) -> &ProcessorChains {
        &self.chains
    }

    /// Entry point from the router: raw path map, query map and body bytes.
    pub async fn handle(
        &self,
        method: &axum::http::Method,
        path: HashMap<String, String>,
        query: HashMap<String, String>,
        body: Bytes,
    ) -> Result<ApiResponse, AppError> {
        let method = HttpMethod::from_http(method)
            .ok_or_else(|| AppError::MethodNotAllowed(method.to_string()))?;
        let body = if body.is_empty() {
            None
        } else {
            Some(
                serde_json::from_slice(&body)
                    .map_err(|_| AppError::BadRequest("unable to decode data".into()))?,
            )
        };
        let request = ApiRequest {
            method,
            params: RouteParams::from_path(path),
            query: query.into_iter().collect(),
            body,
        };
        self.dispatch(request).await
    }

    /// Runs pre hooks, the operation for this method and route shape, then post hooks.
    pub async fn dispatch(&self, mut request: ApiRequest) -> Result<ApiResponse, AppError> {
        self.check_allowed(&request)?;
        let tokens = request.processor_tokens();
        self.chains.run_pre(&tokens, &mut request)?;
        // Hooks may rewrite the method or the ids.
        self.check_allowed(&request)?;
        let mut response = self.execute(&request).await?;
        let mut result = response.body.take().unwrap_or(Value::Null);
        self.chains.run_post(&tokens, &request, &mut result)?;
        if response.status != axum::http::StatusCode::NO_CONTENT {
            response.body = Some(result);
        }
        Ok(response)
    }

    fn check_allowed(&self, request: &ApiRequest) -> Result<(), AppError> {
        let method = request.method;
        let allowed = self.methods.contains(method)
            && match (method, request.params.instid.is_some()) {
                (HttpMethod::Post, has_instance) => !has_instance,
                (HttpMethod::Patch | HttpMethod::Put, false) => self.allow_patch_many,
                (HttpMethod::Delete, false) => self.allow_delete_many,
                _ => true,
            };
        if allowed {
            Ok(())
        } else {
            Err(AppError::MethodNotAllowed(method.to_string()))
        }
    }

    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, AppError> {
        let p = &request.params;
        match (
            request.method,
            p.instid.as_deref(),
            p.relationname.as_deref(),
            p.relationinstid.as_deref(),
        ) {
            (HttpMethod::Get, None, _, _) => self.search(request).await,
            (HttpMethod::Get, Some(id), None, _) => self.get_instance(id).await,
            (HttpMethod::Get, Some(id), Some(rel), None) => self.get_related(id, rel).await,
            (HttpMethod::Get, Some(id), Some(rel), Some(rid)) => {
                self.get_related_instance(id, rel, rid).await
            }
            (HttpMethod::Post, None, _, _) => self.create(request).await,
            (HttpMethod::Patch | HttpMethod::Put, None, _, _) => self.update_many(request).await,
            (HttpMethod::Patch | HttpMethod::Put, Some(id), None, _) => {
                self.update(id, request).await
            }
            (HttpMethod::Delete, None, _, _) => self.delete_many(request).await,
            (HttpMethod::Delete, Some(id), None, _) => self.delete(id).await,
            (HttpMethod::Delete, Some(id), Some(rel), Some(rid)) => {
                self.remove_related(id, rel, rid).await
            }
            (HttpMethod::Delete, Some(_), Some(_), None) => Err(AppError::BadRequest(
                "specify the related instance to remove".into(),
            )),
            (HttpMethod::Patch | HttpMethod::Put, Some(_), Some(_), _) => Err(AppError::BadRequest(
                "related instances cannot be updated through the parent".into(),
            )),
            (HttpMethod::Post, Some(_), _, _) => {
                Err(AppError::MethodNotAllowed(request.method.to_string()))
            }
        }
    }

    fn session_error(&self, e: SessionError) -> AppError {
        match e {
            SessionError::Validation { kind, errors }
                if self.validation_exceptions.contains(&kind) =>
            {
                AppError::Validation { kind, errors }
            }
            SessionError::BadQuery(msg) => AppError::BadRequest(msg),
            SessionError::Db(e) => AppError::Db(e),
            other => AppError::Session(other.to_string()),
        }
    }

    fn serialize(&self, row: &Row) -> Result<Value, AppError> {
        self.serializer
            .serialize(&self.model, row)
            .map_err(|e| AppError::Session(format!("serialization failed: {}", e)))
    }

    fn deserialize(&self, body: Row) -> Result<Row, AppError> {
        self.deserializer
            .deserialize(&self.model, body)
            .map_err(|e| AppError::BadRequest(e.to_string()))
    }

    fn not_found(&self, id: &str) -> AppError {
        AppError::NotFound(format!("no instance with {} '{}'", self.primary_key, id))
    }

    fn page_window(&self, request: &ApiRequest) -> Result<(u64, u64), AppError> {
        let per_page = match request.query.get("results_per_page") {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    AppError::BadRequest("results_per_page must be a positive integer".into())
                })?,
            None => self.results_per_page,
        }
        .min(self.max_results_per_page);
        let page = match request.query.get("page") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| AppError::BadRequest("page must be a positive integer".into()))?,
            None => 1,
        };
        Ok((page, u64::from(per_page)))
    }

    async fn search(&self, request: &ApiRequest) -> Result<ApiResponse, AppError> {
        let query = request.search_from_query()?;
        if query.single {
            let found = self
                .session
                .search(&self.model, &query, Some(Window { offset: 0, limit: 2 }))
                .await
                .map_err(|e| self.session_error(e))?;
            return match found.rows.as_slice() {
                [row] => Ok(ApiResponse::ok(self.serialize(row)?)),
                [] => Err(AppError::NotFound("no result found".into())),
                _ => Err(AppError::BadRequest("multiple results found".into())),
            };
        }
        let (page, per_page) = self.page_window(request)?;
        let window = Window {
            offset: (page - 1).saturating_mul(per_page),
            limit: per_page,
        };
        let found = self
            .session
            .search(&self.model, &query, Some(window))
            .await
            .map_err(|e| self.session_error(e))?;
        let objects = found
            .rows
            .iter()
            .map(|row| self.serialize(row))
            .collect::<Result<Vec<_>, _>>()?;
        let body = serde_json::to_value(Paginated::new(objects, found.total, page, per_page))
            .map_err(|e| AppError::Session(format!("serialization failed: {}", e)))?;
        Ok(ApiResponse::ok(body))
    }

    async fn get_instance(&self, id: &str) -> Result<ApiResponse, AppError> {
        let row = self
            .session
            .get(&self.model, &self.primary_key, id)
            .await
            .map_err(|e| self.session_error(e))?
            .ok_or_else(|| self.not_found(id))?;
        Ok(ApiResponse::ok(self.serialize(&row)?))
    }

    async fn related_rows(
        &self,
        id: &str,
        relation_name: &str,
    ) -> Result<(RelationDirection, String, Vec<Row>), AppError> {
        let relation = self
            .model
            .relation(relation_name)
            .ok_or_else(|| AppError::NotFound(format!("no relation '{}'", relation_name)))?;
        let rows = self
            .session
            .related(&self.model, &self.primary_key, id, relation)
            .await
            .map_err(|e| self.session_error(e))?
            .ok_or_else(|| self.not_found(id))?;
        Ok((relation.direction, relation.target_primary_key.clone(), rows))
    }

    async fn get_related(&self, id: &str, relation_name: &str) -> Result<ApiResponse, AppError> {
        let (direction, _, rows) = self.related_rows(id, relation_name).await?;
        let body = match direction {
            RelationDirection::ToMany => {
                Value::Array(rows.into_iter().map(Value::Object).collect())
            }
            RelationDirection::ToOne => {
                rows.into_iter().next().map(Value::Object).unwrap_or(Value::Null)
            }
        };
        Ok(ApiResponse::ok(body))
    }

    async fn get_related_instance(
        &self,
        id: &str,
        relation_name: &str,
        related_id: &str,
    ) -> Result<ApiResponse, AppError> {
        let (_, target_key, rows) = self.related_rows(id, relation_name).await?;
        rows.into_iter()
            .find(|row| row.get(&target_key).map(key_text).as_deref() == Some(related_id))
            .map(|row| ApiResponse::ok(Value::Object(row)))
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "no related instance '{}' in '{}'",
                    related_id, relation_name
                ))
            })
    }

    async fn create(&self, request: &ApiRequest) -> Result<ApiResponse, AppError> {
        let row = self.deserialize(request.body_object()?)?;
        let created = self
            .session
            .create(&self.model, row)
            .await
            .map_err(|e| self.session_error(e))?;
        Ok(ApiResponse::created(self.serialize(&created)?))
    }

    async fn update(&self, id: &str, request: &ApiRequest) -> Result<ApiResponse, AppError> {
        let changes = self.deserialize(request.body_object()?)?;
        let updated = self
            .session
            .update(&self.model, &self.primary_key, id, changes)
            .await
            .map_err(|e| self.session_error(e))?
            .ok_or_else(|| self.not_found(id))?;
        Ok(ApiResponse::ok(self.serialize(&updated)?))
    }

    /// Search comes from `q` in the body, else from the query string.
    async fn update_many(&self, request: &ApiRequest) -> Result<ApiResponse, AppError> {
        let mut body = request.body_object()?;
        let query = match body.remove("q") {
            Some(q) => SearchQuery::from_value(q).map_err(|e| {
                AppError::BadRequest(format!("unable to decode search query: {}", e))
            })?,
            None => request.search_from_query()?,
        };
        let changes = self.deserialize(body)?;
        let n = self
            .session
            .update_many(&self.model, &query, changes)
            .await
            .map_err(|e| self.session_error(e))?;
        Ok(ApiResponse::ok(json!({ "num_modified": n })))
    }

    async fn delete(&self, id: &str) -> Result<ApiResponse, AppError> {
        let deleted = self
            .session
            .delete(&self.model, &self.primary_key, id)
            .await
            .map_err(|e| self.session_error(e))?;
        if deleted {
            Ok(ApiResponse::no_content())
        } else {
            Err(self.not_found(id))
        }
    }

    async fn delete_many(&self, request: &ApiRequest) -> Result<ApiResponse, AppError> {
        let query = request.search_from_query()?;
        let n = self
            .session
            .delete_many(&self.model, &query)
            .await
            .map_err(|e| self.session_error(e))?;
        Ok(ApiResponse::ok(json!({ "num_deleted": n })))
    }

    async fn remove_related(
        &self,
        id: &str,
        relation_name: &str,
        related_id: &str,
    ) -> Result<ApiResponse, AppError> {
        let relation = self
            .model
            .relation(relation_name)
            .ok_or_else(|| AppError::NotFound(format!("no relation '{}'", relation_name)))?;
        let removed = self
            .session
            .remove_related(&self.model, &self.primary_key, id, relation, related_id)
            .await
            .map_err(|e| self.session_error(e))?;
        if removed {
            Ok(ApiResponse::no_content())
        } else {
            Err(AppError::NotFound(format!(
                "no related instance '{}' in '{}'",
                related_id, relation_name
            )))
        }
    }
}

/// Text form of a key value for comparison with a path segment.
fn key_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
