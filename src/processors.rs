//! Pre/post hooks keyed by method token, and the universal-then-local merge.
//!
//! Tokens are free-form upper-case strings. Handlers run the bare method token
//! (`GET`) followed by the scoped one (`GET_SINGLE` / `GET_MANY`).

use crate::error::AppError;
use crate::handlers::ApiRequest;
use axum::http::StatusCode;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Raised by a hook to stop handling and answer with `status`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessingError {
    pub status: StatusCode,
    pub message: String,
}

impl ProcessingError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ProcessingError {
            status,
            message: message.into(),
        }
    }
}

impl From<ProcessingError> for AppError {
    fn from(e: ProcessingError) -> Self {
        AppError::Processing {
            status: e.status,
            message: e.message,
        }
    }
}

/// Runs before core handling; may rewrite the request or short-circuit.
pub type Preprocessor = Arc<dyn Fn(&mut ApiRequest) -> Result<(), ProcessingError> + Send + Sync>;

/// Runs on the result before it is returned.
pub type Postprocessor =
    Arc<dyn Fn(&ApiRequest, &mut Value) -> Result<(), ProcessingError> + Send + Sync>;

fn normalize(token: &str) -> String {
    token.trim().to_ascii_uppercase()
}

/// Hook lists per method token, as supplied by a caller.
#[derive(Clone, Default)]
pub struct Processors {
    pre: BTreeMap<String, Vec<Preprocessor>>,
    post: BTreeMap<String, Vec<Postprocessor>>,
}

impl Processors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pre<F>(self, token: &str, hook: F) -> Self
    where
        F: Fn(&mut ApiRequest) -> Result<(), ProcessingError> + Send + Sync + 'static,
    {
        self.pre_hook(token, Arc::new(hook))
    }

    pub fn post<F>(self, token: &str, hook: F) -> Self
    where
        F: Fn(&ApiRequest, &mut Value) -> Result<(), ProcessingError> + Send + Sync + 'static,
    {
        self.post_hook(token, Arc::new(hook))
    }

    /// Appends an already shared hook; the same `Arc` may be registered in several places.
    pub fn pre_hook(mut self, token: &str, hook: Preprocessor) -> Self {
        self.pre.entry(normalize(token)).or_default().push(hook);
        self
    }

    pub fn post_hook(mut self, token: &str, hook: Postprocessor) -> Self {
        self.post.entry(normalize(token)).or_default().push(hook);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.pre.values().all(Vec::is_empty) && self.post.values().all(Vec::is_empty)
    }

    pub fn pre_for(&self, token: &str) -> &[Preprocessor] {
        self.pre.get(&normalize(token)).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn post_for(&self, token: &str) -> &[Postprocessor] {
        self.post.get(&normalize(token)).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl fmt::Debug for Processors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pre: BTreeMap<_, _> = self.pre.iter().map(|(k, v)| (k, v.len())).collect();
        let post: BTreeMap<_, _> = self.post.iter().map(|(k, v)| (k, v.len())).collect();
        f.debug_struct("Processors")
            .field("pre", &pre)
            .field("post", &post)
            .finish()
    }
}

/// Merged chains for one endpoint group. Immutable once built.
#[derive(Clone, Debug, Default)]
pub struct ProcessorChains(Processors);

impl ProcessorChains {
    pub fn pre(&self, token: &str) -> &[Preprocessor] {
        self.0.pre_for(token)
    }

    pub fn post(&self, token: &str) -> &[Postprocessor] {
        self.0.post_for(token)
    }

    /// Runs each token's pre chain in order; stops at the first error.
    pub fn run_pre(
        &self,
        tokens: &[String],
        request: &mut ApiRequest,
    ) -> Result<(), ProcessingError> {
        for token in tokens {
            for hook in self.pre(token) {
                hook(request)?;
            }
        }
        Ok(())
    }

    pub fn run_post(
        &self,
        tokens: &[String],
        request: &ApiRequest,
        result: &mut Value,
    ) -> Result<(), ProcessingError> {
        for token in tokens {
            for hook in self.post(token) {
                hook(request, result)?;
            }
        }
        Ok(())
    }
}

/// `universal[token] ++ local[token]` for every token, pre and post alike.
/// Inputs are not modified and nothing is deduplicated.
pub fn compose(universal: &Processors, local: &Processors) -> ProcessorChains {
    let mut merged = universal.clone();
    for (token, hooks) in &local.pre {
        merged.pre.entry(token.clone()).or_default().extend(hooks.iter().cloned());
    }
    for (token, hooks) in &local.post {
        merged.post.entry(token.clone()).or_default().extend(hooks.iter().cloned());
    }
    ProcessorChains(merged)
}
