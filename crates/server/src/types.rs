use echotext_stt::{Backend, Segment};
use serde::{Deserialize, Serialize};

/// Successful `POST /transcribe` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    /// Full transcript
    pub transcript: String,

    /// Original upload name
    pub filename: String,

    /// Record id
    pub id: i64,

    /// Where the stored audio can be fetched
    pub audio_url: String,

    pub segments: Vec<Segment>,
}

/// `DELETE /history/{id}` body
#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub status: String,
    pub deleted: i64,
}

/// Liveness payload
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,

    /// Whether `POST /transcribe` will currently be served
    pub model_ready: bool,

    pub backend: Option<Backend>,
}

/// Error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}
