/// EchoText error types
#[derive(Debug, thiserror::Error)]
pub enum EchoTextError {
    /// Rejected upload (unsupported extension, missing file field)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Speech model not loaded yet
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Filesystem or database failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Model invocation failure
    #[error("Transcription error: {0}")]
    Transcription(String),

    /// Model invocation failure caused by the accelerated backend
    #[error("Accelerator error: {0}")]
    Accelerator(String),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network/HTTP error
    #[error("Network error: {0}")]
    Network(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// General error (anyhow integration)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Message fragments that point at the GPU stack rather than the input.
const ACCELERATOR_MARKERS: &[&str] = &["cuda", "cudnn", "cublas", "metal", "gpu"];

impl EchoTextError {
    /// Create invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create service unavailable error
    pub fn service_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    /// Create storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create transcription error
    pub fn transcription<S: Into<String>>(msg: S) -> Self {
        Self::Transcription(msg.into())
    }

    /// Create accelerator error
    pub fn accelerator<S: Into<String>>(msg: S) -> Self {
        Self::Accelerator(msg.into())
    }

    /// Create not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Create internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether a failed transcription should be retried on the fallback backend.
    pub fn is_accelerator_failure(&self) -> bool {
        match self {
            Self::Accelerator(_) => true,
            Self::Transcription(msg) => {
                let msg = msg.to_lowercase();
                ACCELERATOR_MARKERS.iter().any(|marker| msg.contains(marker))
            }
            _ => false,
        }
    }
}

// HTTP response conversion (the server crate wraps this in a ResponseError)
impl EchoTextError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::NotFound(_) => 404,
            Self::ServiceUnavailable(_) => 503,
            Self::Network(_) => 503,
            Self::Storage(_) => 500,
            Self::Transcription(_) => 500,
            Self::Accelerator(_) => 500,
            Self::Config(_) => 500,
            Self::Internal(_) => 500,
            Self::Io(_) => 500,
            Self::Json(_) => 500,
            Self::Other(_) => 500,
        }
    }
}
