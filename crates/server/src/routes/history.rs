use actix_web::{delete, get, web, HttpResponse};
use echotext_common::EchoTextError;
use std::sync::Arc;
use tracing::info;

use crate::error::ApiResult;
use crate::state::AppState;
use crate::types::DeleteResponse;

/// All records, newest first
#[get("/history")]
pub async fn list_history(state: web::Data<Arc<AppState>>) -> ApiResult<HttpResponse> {
    let store = state.store.clone();
    let records = web::block(move || store.list_all()).await??;
    Ok(HttpResponse::Ok().json(records))
}

#[get("/history/{id}")]
pub async fn get_history(
    path: web::Path<i64>,
    state: web::Data<Arc<AppState>>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    let store = state.store.clone();
    let record = web::block(move || store.get(id))
        .await??
        .ok_or_else(|| EchoTextError::not_found(format!("Transcription {} not found", id)))?;
    Ok(HttpResponse::Ok().json(record))
}

/// Idempotent; deleting an unknown id still succeeds
#[delete("/history/{id}")]
pub async fn delete_history(
    path: web::Path<i64>,
    state: web::Data<Arc<AppState>>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    let store = state.store.clone();
    web::block(move || store.delete(id)).await??;
    info!("Deleted transcription {}", id);

    Ok(HttpResponse::Ok().json(DeleteResponse {
        status: "ok".to_string(),
        deleted: id,
    }))
}
