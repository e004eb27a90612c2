//! A named, url-prefixed set of bound routes for one model.

use crate::config::{HttpMethod, ModelId};
use crate::error::AppError;
use crate::handlers::{ApiHandler, FunctionHandler};
use crate::response::ApiResponse;
use crate::routes::planner::{RouteDescriptor, RouteKind};
use crate::routes::url::UrlRule;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::Method,
    routing::{MethodFilter, MethodRouter},
    Router,
};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock};

/// Endpoint name of a model's API: `{collection}api`.
pub fn api_name(collection_name: &str) -> String {
    format!("{}api", collection_name)
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static regex"))
}

/// `/api/people/{instid}` as axum wants it: `/api/people/:instid`.
pub fn axum_path(path: &str) -> String {
    placeholder_pattern().replace_all(path, ":${1}").into_owned()
}

fn method_filter(method: HttpMethod) -> MethodFilter {
    match method {
        HttpMethod::Get => MethodFilter::GET,
        HttpMethod::Post => MethodFilter::POST,
        HttpMethod::Patch => MethodFilter::PATCH,
        HttpMethod::Put => MethodFilter::PUT,
        HttpMethod::Delete => MethodFilter::DELETE,
    }
}

pub struct RoutingGroup {
    pub(crate) name: String,
    pub(crate) url_prefix: String,
    pub(crate) collection_name: String,
    pub(crate) model_id: ModelId,
    pub(crate) routes: Vec<RouteDescriptor>,
    pub(crate) api: Arc<ApiHandler>,
    pub(crate) eval: Option<Arc<FunctionHandler>>,
}

impl RoutingGroup {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    pub fn model_id(&self) -> &ModelId {
        &self.model_id
    }

    pub fn api_name(&self) -> String {
        api_name(&self.collection_name)
    }

    pub fn routes(&self) -> &[RouteDescriptor] {
        &self.routes
    }

    pub fn api_handler(&self) -> &Arc<ApiHandler> {
        &self.api
    }

    pub fn eval_handler(&self) -> Option<&Arc<FunctionHandler>> {
        self.eval.as_ref()
    }

    /// `{group}.{collection}api`, or `{group}.{collection}apieval` for the eval route.
    pub fn endpoint(&self, kind: RouteKind) -> String {
        if kind.is_eval() {
            format!("{}.{}eval", self.name, self.api_name())
        } else {
            format!("{}.{}", self.name, self.api_name())
        }
    }

    pub fn full_path(&self, route: &RouteDescriptor) -> String {
        format!("{}{}", self.url_prefix, route.path)
    }

    /// Bound routes only; empty method sets are left out.
    pub fn url_rules(&self) -> Vec<UrlRule> {
        self.routes
            .iter()
            .filter(|r| !r.methods.is_empty())
            .map(|r| UrlRule {
                endpoint: self.endpoint(r.kind),
                path: self.full_path(r),
                methods: r.methods.clone(),
                defaults: r.defaults.names().to_vec(),
            })
            .collect()
    }

    /// Every `(axum path, method)` pair this group binds.
    pub fn route_keys(&self) -> Vec<(String, HttpMethod)> {
        self.routes
            .iter()
            .flat_map(|r| {
                let path = axum_path(&self.full_path(r));
                r.methods.iter().map(move |m| (path.clone(), m))
            })
            .collect()
    }

    pub fn router(&self) -> Router {
        let mut api_routes: BTreeMap<String, MethodRouter<Arc<ApiHandler>>> = BTreeMap::new();
        let mut eval_routes: BTreeMap<String, MethodRouter<Arc<FunctionHandler>>> = BTreeMap::new();
        for route in self.routes.iter().filter(|r| !r.methods.is_empty()) {
            let path = axum_path(&self.full_path(route));
            for method in route.methods.iter() {
                if route.kind.is_eval() {
                    let entry = eval_routes.remove(&path).unwrap_or_else(MethodRouter::new);
                    eval_routes.insert(path.clone(), entry.on(method_filter(method), serve_eval));
                } else {
                    let entry = api_routes.remove(&path).unwrap_or_else(MethodRouter::new);
                    api_routes.insert(path.clone(), entry.on(method_filter(method), serve_api));
                }
            }
        }
        let api = api_routes
            .into_iter()
            .fold(Router::new(), |router, (path, mr)| router.route(&path, mr))
            .with_state::<()>(Arc::clone(&self.api));
        match &self.eval {
            Some(eval) => api.merge(
                eval_routes
                    .into_iter()
                    .fold(Router::new(), |router, (path, mr)| router.route(&path, mr))
                    .with_state::<()>(Arc::clone(eval)),
            ),
            None => api,
        }
    }
}

impl std::fmt::Debug for RoutingGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingGroup")
            .field("name", &self.name)
            .field("url_prefix", &self.url_prefix)
            .field("collection_name", &self.collection_name)
            .field("routes", &self.routes)
            .finish()
    }
}

async fn serve_api(
    State(api): State<Arc<ApiHandler>>,
    method: Method,
    path: Option<Path<HashMap<String, String>>>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<ApiResponse, AppError> {
    let path = path.map(|Path(p)| p).unwrap_or_default();
    api.handle(&method, path, query, body).await
}

async fn serve_eval(
    State(eval): State<Arc<FunctionHandler>>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<ApiResponse, AppError> {
    eval.handle(query).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_placeholders_for_axum() {
        assert_eq!(axum_path("/api/people"), "/api/people");
        assert_eq!(
            axum_path("/api/people/{instid}/{relationname}"),
            "/api/people/:instid/:relationname"
        );
    }

    #[test]
    fn api_name_appends_suffix() {
        assert_eq!(api_name("people"), "peopleapi");
    }
}
