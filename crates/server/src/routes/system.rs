use actix_web::{get, web, HttpResponse};
use std::sync::Arc;

use crate::state::AppState;
use crate::types::StatusResponse;

/// Liveness check
#[get("/")]
pub async fn status(state: web::Data<Arc<AppState>>) -> actix_web::Result<HttpResponse> {
    let backend = state.engine.backend().await;

    Ok(HttpResponse::Ok().json(StatusResponse {
        status: "ok".to_string(),
        message: "EchoText API is ready".to_string(),
        model_ready: backend.is_some(),
        backend,
    }))
}
