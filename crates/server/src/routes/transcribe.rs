use actix_multipart::Multipart;
use actix_web::{post, web, HttpResponse};
use echotext_common::EchoTextError;
use futures_util::StreamExt;
use std::sync::Arc;
use tracing::info;

use crate::error::ApiResult;
use crate::state::AppState;

/// Upload received through the `file` multipart field
struct Upload {
    filename: String,
    bytes: Vec<u8>,
}

#[post("/transcribe")]
pub async fn transcribe(
    mut payload: Multipart,
    state: web::Data<Arc<AppState>>,
) -> ApiResult<HttpResponse> {
    let mut upload = None;

    while let Some(field) = payload.next().await {
        let mut field = field?;
        let content_disposition = field.content_disposition();

        if content_disposition.get_name() != Some("file") {
            continue;
        }

        let filename = content_disposition
            .get_filename()
            .unwrap_or_default()
            .to_string();

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            bytes.extend_from_slice(&chunk?);
        }

        upload = Some(Upload { filename, bytes });
    }

    let upload = upload.ok_or_else(|| EchoTextError::invalid_input("No file uploaded"))?;
    info!("Received {} ({} bytes)", upload.filename, upload.bytes.len());

    let result = state
        .pipeline
        .handle_upload(&upload.bytes, &upload.filename)
        .await?;

    Ok(HttpResponse::Ok().json(result))
}
