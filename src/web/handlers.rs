use super::{Result, WebError, resource::Resource};
use crate::core::{Record, StoreError};
use crate::facade::DocumentStore;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Serialize;
use std::sync::Arc;

pub type SharedStore<D> = Arc<DocumentStore<D>>;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct ApiMessage {
    pub message: String,
}

pub async fn healthcheck() -> Json<ApiResponse<ApiMessage>> {
    Json(ApiResponse {
        data: ApiMessage {
            message: "ok".to_string(),
        },
    })
}

pub async fn list_documents<D: Resource>(
    State(store): State<SharedStore<D>>,
) -> Json<ApiResponse<Vec<Record<D>>>> {
    Json(ApiResponse {
        data: store.list_all(),
    })
}

pub async fn get_document<D: Resource>(
    State(store): State<SharedStore<D>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Record<D>>>> {
    let record = store.get_by_id(&id)?;
    Ok(Json(ApiResponse { data: record }))
}

pub async fn create_document<D: Resource>(
    State(store): State<SharedStore<D>>,
    Json(payload): Json<D>,
) -> Result<(StatusCode, Json<ApiResponse<Record<D>>>)> {
    payload.validate().map_err(WebError::Input)?;

    let record = store.create(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse { data: record })))
}

pub async fn replace_document<D: Resource>(
    State(store): State<SharedStore<D>>,
    Path(id): Path<String>,
    Json(payload): Json<D>,
) -> Result<Json<ApiResponse<Record<D>>>> {
    payload.validate().map_err(WebError::Input)?;

    let record = store.update(&id, payload).await?;
    Ok(Json(ApiResponse { data: record }))
}

pub async fn patch_document<D: Resource>(
    State(store): State<SharedStore<D>>,
    Path(id): Path<String>,
    Json(patch): Json<D::Patch>,
) -> Result<Json<ApiResponse<Record<D>>>> {
    let record = store
        .update_with(&id, move |fields| {
            fields.apply_patch(patch);
            fields.validate().map_err(StoreError::Rejected)
        })
        .await?;
    Ok(Json(ApiResponse { data: record }))
}

pub async fn delete_document<D: Resource>(
    State(store): State<SharedStore<D>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    store.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
