//! Data-access session used by bound handlers. Implementations must be safe to
//! call from many requests at once (a pool, or a request-scoped accessor).

use crate::config::{Model, Relation, Row};
use crate::service::{SearchQuery, Window};
use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    /// Model-level validation failure; forwarded to clients when `kind` is listed
    /// in the configuration's `validation_exceptions`.
    #[error("validation failed: {kind}")]
    Validation {
        kind: String,
        errors: BTreeMap<String, String>,
    },
    #[error("bad query: {0}")]
    BadQuery(String),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error("{0}")]
    Other(String),
}

/// Rows in the requested window plus the number of rows matching the query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchResult {
    pub rows: Vec<Row>,
    pub total: u64,
}

#[async_trait]
pub trait Session: Send + Sync {
    async fn search(
        &self,
        model: &Model,
        query: &SearchQuery,
        window: Option<Window>,
    ) -> Result<SearchResult, SessionError>;

    /// Instance whose `key` column equals `id`.
    async fn get(&self, model: &Model, key: &str, id: &str) -> Result<Option<Row>, SessionError>;

    async fn create(&self, model: &Model, row: Row) -> Result<Row, SessionError>;

    async fn update(
        &self,
        model: &Model,
        key: &str,
        id: &str,
        changes: Row,
    ) -> Result<Option<Row>, SessionError>;

    /// Applies `changes` to every row matching `query`; returns the count.
    async fn update_many(
        &self,
        model: &Model,
        query: &SearchQuery,
        changes: Row,
    ) -> Result<u64, SessionError>;

    async fn delete(&self, model: &Model, key: &str, id: &str) -> Result<bool, SessionError>;

    async fn delete_many(&self, model: &Model, query: &SearchQuery) -> Result<u64, SessionError>;

    /// Related rows of one instance, or `None` when the instance does not exist.
    async fn related(
        &self,
        model: &Model,
        key: &str,
        id: &str,
        relation: &Relation,
    ) -> Result<Option<Vec<Row>>, SessionError>;

    /// Breaks the link between an instance and one related instance.
    async fn remove_related(
        &self,
        model: &Model,
        key: &str,
        id: &str,
        relation: &Relation,
        related_id: &str,
    ) -> Result<bool, SessionError>;

    /// Evaluates `query.functions` over the rows matching `query.filters`.
    async fn evaluate(&self, model: &Model, query: &SearchQuery) -> Result<Row, SessionError>;
}
