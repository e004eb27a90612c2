//! `Session` over a PostgreSQL pool.

use crate::config::{Model, Relation, Row};
use crate::service::{SearchQuery, SearchResult, Session, SessionError, Window};
use crate::sql::{self, to_arguments, QueryBuf};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

#[derive(Clone)]
pub struct PgSession {
    pool: PgPool,
}

impl PgSession {
    pub fn new(pool: PgPool) -> Self {
        PgSession { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_rows(&self, q: &QueryBuf) -> Result<Vec<Row>, SessionError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let values = sqlx::query_scalar_with::<_, Value, _>(&q.sql, to_arguments(&q.params)?)
            .fetch_all(&self.pool)
            .await?;
        Ok(values.into_iter().filter_map(into_row).collect())
    }

    async fn fetch_row(&self, q: &QueryBuf) -> Result<Option<Row>, SessionError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let value = sqlx::query_scalar_with::<_, Value, _>(&q.sql, to_arguments(&q.params)?)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value.and_then(into_row))
    }

    async fn execute(&self, q: &QueryBuf) -> Result<u64, SessionError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut tx = self.pool.begin().await?;
        let done = sqlx::query_with(&q.sql, to_arguments(&q.params)?)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(done.rows_affected())
    }
}

fn into_row(value: Value) -> Option<Row> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

#[async_trait]
impl Session for PgSession {
    async fn search(
        &self,
        model: &Model,
        query: &SearchQuery,
        window: Option<Window>,
    ) -> Result<SearchResult, SessionError> {
        let count = sql::count_matching(model, query)?;
        tracing::debug!(sql = %count.sql, params = ?count.params, "query");
        let total = sqlx::query_scalar_with::<_, i64, _>(&count.sql, to_arguments(&count.params)?)
            .fetch_one(&self.pool)
            .await?;
        let rows = self.fetch_rows(&sql::select_page(model, query, window)?).await?;
        Ok(SearchResult {
            rows,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    async fn get(&self, model: &Model, key: &str, id: &str) -> Result<Option<Row>, SessionError> {
        self.fetch_row(&sql::select_by_key(model, key, id)).await
    }

    async fn create(&self, model: &Model, row: Row) -> Result<Row, SessionError> {
        self.fetch_row(&sql::insert(model, &row))
            .await?
            .ok_or(SessionError::Db(sqlx::Error::RowNotFound))
    }

    async fn update(
        &self,
        model: &Model,
        key: &str,
        id: &str,
        changes: Row,
    ) -> Result<Option<Row>, SessionError> {
        self.fetch_row(&sql::update_by_key(model, key, id, &changes)?).await
    }

    async fn update_many(
        &self,
        model: &Model,
        query: &SearchQuery,
        changes: Row,
    ) -> Result<u64, SessionError> {
        let key = primary_key(model)?;
        self.execute(&sql::update_matching(model, key, query, &changes)?).await
    }

    async fn delete(&self, model: &Model, key: &str, id: &str) -> Result<bool, SessionError> {
        Ok(self.execute(&sql::delete_by_key(model, key, id)).await? > 0)
    }

    async fn delete_many(&self, model: &Model, query: &SearchQuery) -> Result<u64, SessionError> {
        let key = primary_key(model)?;
        self.execute(&sql::delete_matching(model, key, query)?).await
    }

    async fn related(
        &self,
        model: &Model,
        key: &str,
        id: &str,
        relation: &Relation,
    ) -> Result<Option<Vec<Row>>, SessionError> {
        if self.get(model, key, id).await?.is_none() {
            return Ok(None);
        }
        let rows = self.fetch_rows(&sql::select_related(model, key, id, relation)).await?;
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
        let q = sql::unlink_related(model, key, id, relation, related_id);
        Ok(self.execute(&q).await? > 0)
    }

    async fn evaluate(&self, model: &Model, query: &SearchQuery) -> Result<Row, SessionError> {
        if query.functions.is_empty() {
            return Ok(Row::new());
        }
        let q = sql::evaluate_functions(model, query)?;
        Ok(self.fetch_row(&q).await?.unwrap_or_default())
    }
}

fn primary_key(model: &Model) -> Result<&str, SessionError> {
    model
        .primary_key_name()
        .map_err(|e| SessionError::Other(e.to_string()))
}
