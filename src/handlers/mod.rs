// HTTP request handlers

pub mod blogs;
pub mod health;
pub mod users;

use axum::{
    body::to_bytes,
    extract::{rejection::QueryRejection, Query, Request},
};
use serde::de::DeserializeOwned;

use crate::models::errors::AppError;
use crate::models::pagination::{Page, PageQuery};

/// Reads a JSON request body. An empty body yields `T::default()`.
pub(crate) async fn json_body<T>(request: Request, limit: usize) -> Result<T, AppError>
where
    T: DeserializeOwned + Default,
{
    let bytes = to_bytes(request.into_body(), limit).await.map_err(|e| {
        tracing::debug!("Failed to read request body: {}", e);
        AppError::validation_failed("Failed to read request body")
    })?;

    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(T::default());
    }

    serde_json::from_slice(&bytes)
        .map_err(|e| AppError::validation_failed(format!("Invalid JSON body: {}", e)))
}

/// Resolves `page`/`limit` query parameters. Malformed values are reported
/// through `AppError` so the response keeps the JSON error envelope.
pub(crate) fn page_query(
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Option<Page>, AppError> {
    let Query(query) = query.map_err(|rejection| {
        tracing::debug!("Rejected page query: {}", rejection);
        AppError::validation_failed(format!("Invalid query: {}", rejection.body_text()))
    })?;
    query.resolve()
}
