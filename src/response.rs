//! Response envelopes for generated endpoints.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

/// One page of a collection.
#[derive(Debug, Serialize)]
pub struct Paginated {
    pub num_results: u64,
    pub page: u64,
    pub total_pages: u64,
    pub objects: Vec<Value>,
}

impl Paginated {
    pub fn new(objects: Vec<Value>, num_results: u64, page: u64, per_page: u64) -> Self {
        Paginated {
            num_results,
            page,
            total_pages: total_pages(num_results, per_page),
            objects,
        }
    }
}

pub fn total_pages(num_results: u64, per_page: u64) -> u64 {
    if per_page == 0 {
        return 0;
    }
    num_results.div_ceil(per_page)
}

/// Status plus optional JSON body, as produced by a bound handler.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Option<Value>,
}

impl ApiResponse {
    pub fn ok(body: Value) -> Self {
        ApiResponse {
            status: StatusCode::OK,
            body: Some(body),
        }
    }

    pub fn created(body: Value) -> Self {
        ApiResponse {
            status: StatusCode::CREATED,
            body: Some(body),
        }
    }

    pub fn no_content() -> Self {
        ApiResponse {
            status: StatusCode::NO_CONTENT,
            body: None,
        }
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        match self.body {
            Some(body) => (self.status, Json(body)).into_response(),
            None => self.status.into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(0, 10), 0);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
    }

    #[test]
    fn envelope_shape() {
        let page = Paginated::new(vec![serde_json::json!({ "id": 1 })], 21, 3, 10);
        assert_eq!(
            serde_json::to_value(page).unwrap(),
            serde_json::json!({
                "num_results": 21,
                "page": 3,
                "total_pages": 3,
                "objects": [{ "id": 1 }]
            })
        );
    }
}
