//! HTTP surface over the document stores.
//!
//! Each collection gets the same JSON routes:
//!
//! | Method   | Path               | Store operation   |
//! |----------|--------------------|-------------------|
//! | `GET`    | `/api/{name}`      | `list_all`        |
//! | `POST`   | `/api/{name}`      | `create`          |
//! | `GET`    | `/api/{name}/:id`  | `get_by_id`       |
//! | `PUT`    | `/api/{name}/:id`  | `update`          |
//! | `PATCH`  | `/api/{name}/:id`  | `update_with`     |
//! | `DELETE` | `/api/{name}/:id`  | `delete`          |

pub mod handlers;
pub mod resource;

use crate::core::StoreError;
use crate::entities::{Post, User};
use crate::facade::DocumentStore;
use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use handlers::{
    SharedStore, create_document, delete_document, get_document, healthcheck, list_documents,
    patch_document, replace_document,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

pub use resource::{PostPatch, Resource, UserPatch};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug)]
pub enum WebError {
    Store(StoreError),
    Input(String),
}

impl From<StoreError> for WebError {
    fn from(err: StoreError) -> Self {
        WebError::Store(err)
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, message, code) = match self {
            WebError::Store(err @ StoreError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, err.to_string(), "not_found")
            }
            WebError::Store(err @ StoreError::Conflict { .. }) => {
                (StatusCode::CONFLICT, err.to_string(), "conflict")
            }
            WebError::Store(StoreError::Rejected(msg)) | WebError::Input(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, msg, "input_error")
            }
            WebError::Store(StoreError::Closed) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "store is shutting down".to_string(),
                "unavailable",
            ),
            WebError::Store(err) => {
                error!(error = %err, "store operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                    "internal_error",
                )
            }
        };

        let body = Json(ErrorResponse {
            error: message,
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, WebError>;

/// CRUD routes for one collection, relative to where they are nested.
pub fn resource_routes<D: Resource>(store: SharedStore<D>) -> Router {
    Router::new()
        .route("/", get(list_documents::<D>).post(create_document::<D>))
        .route(
            "/:id",
            get(get_document::<D>)
                .put(replace_document::<D>)
                .patch(patch_document::<D>)
                .delete(delete_document::<D>),
        )
        .with_state(store)
}

pub fn build_router(users: Arc<DocumentStore<User>>, posts: Arc<DocumentStore<Post>>) -> Router {
    Router::new()
        .route("/health", get(healthcheck))
        .nest("/api/users", resource_routes(users))
        .nest("/api/posts", resource_routes(posts))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_http_statuses() {
        let cases = [
            (StoreError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                StoreError::conflict("email", "ann@x.com"),
                StatusCode::CONFLICT,
            ),
            (
                StoreError::Rejected("bad".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                StoreError::persistence("disk full"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (StoreError::Closed, StatusCode::SERVICE_UNAVAILABLE),
        ];

        for (err, expected) in cases {
            let response = WebError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn input_errors_are_unprocessable() {
        let response = WebError::Input("name must not be empty".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
