//! Per-model API configuration and HTTP method tokens.

use crate::error::ConfigError;
use crate::processors::Processors;
use crate::service::{Deserializer, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// HTTP methods an endpoint group can expose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    pub fn from_http(method: &axum::http::Method) -> Option<Self> {
        method.as_str().parse().ok()
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ConfigError;

    /// Case-insensitive: "get", "Get" and "GET" are the same token.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PATCH" => Ok(HttpMethod::Patch),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            _ => Err(ConfigError::UnknownMethod(s.to_string())),
        }
    }
}

/// Ordered set of method tokens.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MethodSet(BTreeSet<HttpMethod>);

impl MethodSet {
    pub fn new() -> Self {
        MethodSet(BTreeSet::new())
    }

    /// Normalizes raw tokens to upper case; unknown tokens are a configuration error.
    pub fn parse<I, S>(tokens: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        tokens
            .into_iter()
            .map(|t| t.as_ref().parse::<HttpMethod>())
            .collect::<Result<BTreeSet<_>, _>>()
            .map(MethodSet)
    }

    pub fn insert(&mut self, method: HttpMethod) {
        self.0.insert(method);
    }

    pub fn contains(&self, method: HttpMethod) -> bool {
        self.0.contains(&method)
    }

    /// Members of this set that are also in `allowed`.
    pub fn restricted_to(&self, allowed: &[HttpMethod]) -> MethodSet {
        MethodSet(self.0.iter().copied().filter(|m| allowed.contains(m)).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = HttpMethod> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<HttpMethod> for MethodSet {
    fn from_iter<T: IntoIterator<Item = HttpMethod>>(iter: T) -> Self {
        MethodSet(iter.into_iter().collect())
    }
}

/// Methods allowed when a configuration does not say otherwise.
pub const READONLY_METHODS: &[HttpMethod] = &[HttpMethod::Get];

/// Settings for one model's endpoint group. Consumed by the builder.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfiguration {
    /// Raw method tokens, any case.
    pub methods: Vec<String>,
    pub url_prefix: String,
    /// Defaults to the model's table name.
    pub collection_name: Option<String>,
    pub allow_patch_many: bool,
    pub allow_delete_many: bool,
    pub allow_functions: bool,
    pub exclude_columns: Option<Vec<String>>,
    pub include_columns: Option<Vec<String>>,
    pub include_methods: Option<Vec<String>>,
    /// Session validation-error kinds forwarded to the client as 400.
    pub validation_exceptions: Vec<String>,
    pub results_per_page: u32,
    pub max_results_per_page: u32,
    /// Column used as the instance id in URLs; defaults to the model's primary key name.
    pub primary_key: Option<String>,
    #[serde(skip)]
    pub processors: Processors,
    #[serde(skip)]
    pub serializer: Option<Arc<dyn Serializer>>,
    #[serde(skip)]
    pub deserializer: Option<Arc<dyn Deserializer>>,
}

impl Default for ModelConfiguration {
    fn default() -> Self {
        ModelConfiguration {
            methods: READONLY_METHODS.iter().map(|m| m.as_str().to_string()).collect(),
            url_prefix: "/api".into(),
            collection_name: None,
            allow_patch_many: false,
            allow_delete_many: false,
            allow_functions: false,
            exclude_columns: None,
            include_columns: None,
            include_methods: None,
            validation_exceptions: Vec::new(),
            results_per_page: 10,
            max_results_per_page: 100,
            primary_key: None,
            processors: Processors::default(),
            serializer: None,
            deserializer: None,
        }
    }
}

impl ModelConfiguration {
    pub fn with_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.methods = methods.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.url_prefix = prefix.into();
        self
    }

    pub fn with_collection_name(mut self, name: impl Into<String>) -> Self {
        self.collection_name = Some(name.into());
        self
    }

    pub fn with_patch_many(mut self, allow: bool) -> Self {
        self.allow_patch_many = allow;
        self
    }

    pub fn with_delete_many(mut self, allow: bool) -> Self {
        self.allow_delete_many = allow;
        self
    }

    pub fn with_functions(mut self, allow: bool) -> Self {
        self.allow_functions = allow;
        self
    }

    pub fn with_exclude_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_include_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_include_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_methods = Some(methods.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_validation_exceptions<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.validation_exceptions = kinds.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_pagination(mut self, results_per_page: u32, max_results_per_page: u32) -> Self {
        self.results_per_page = results_per_page;
        self.max_results_per_page = max_results_per_page;
        self
    }

    pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(column.into());
        self
    }

    pub fn with_processors(mut self, processors: Processors) -> Self {
        self.processors = processors;
        self
    }

    pub fn with_serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    pub fn with_deserializer(mut self, deserializer: Arc<dyn Deserializer>) -> Self {
        self.deserializer = Some(deserializer);
        self
    }
}

impl fmt::Debug for ModelConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfiguration")
            .field("methods", &self.methods)
            .field("url_prefix", &self.url_prefix)
            .field("collection_name", &self.collection_name)
            .field("allow_patch_many", &self.allow_patch_many)
            .field("allow_delete_many", &self.allow_delete_many)
            .field("allow_functions", &self.allow_functions)
            .field("exclude_columns", &self.exclude_columns)
            .field("include_columns", &self.include_columns)
            .field("include_methods", &self.include_methods)
            .field("validation_exceptions", &self.validation_exceptions)
            .field("results_per_page", &self.results_per_page)
            .field("max_results_per_page", &self.max_results_per_page)
            .field("primary_key", &self.primary_key)
            .field("processors", &self.processors)
            .field("serializer", &self.serializer.is_some())
            .field("deserializer", &self.deserializer.is_some())
            .finish()
    }
}
