use crate::error::EchoTextError;
use crate::model_manager::ModelManager;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// EchoText application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// SQLite database file
    pub db_path: PathBuf,

    /// Permanent audio copies, served under `/audio`
    pub upload_dir: PathBuf,

    /// Transient working copies handed to the model
    pub work_dir: PathBuf,

    /// Whisper model files
    pub models_dir: PathBuf,

    /// Whisper model used by the accelerated backend
    pub whisper_model: String,

    /// Quantized Whisper model used by the CPU fallback backend
    pub fallback_model: String,

    /// Device preference: "auto" or "cpu"
    pub device: String,

    /// Language hint (None = auto detect)
    pub language: Option<String>,

    /// Server bind address
    pub server_host: String,

    /// Server port
    pub server_port: u16,

    /// Base URL used to build `audio_url` values
    pub public_base_url: String,

    /// Upper bound on simultaneous model invocations
    pub max_concurrent_transcriptions: usize,

    /// Log directory
    pub log_dir: PathBuf,

    /// Log level
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/transcriptions.db"),
            upload_dir: PathBuf::from("./data/uploads"),
            work_dir: std::env::temp_dir(),
            models_dir: ModelManager::default_models_dir(),
            whisper_model: "base".to_string(),
            fallback_model: "base-q8_0".to_string(),
            device: "auto".to_string(),
            language: None,
            server_host: "127.0.0.1".to_string(),
            server_port: 8000,
            public_base_url: "http://127.0.0.1:8000".to_string(),
            max_concurrent_transcriptions: 2,
            log_dir: PathBuf::from("./data/log"),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self, EchoTextError> {
        // Load .env file (ignore if not exists)
        let _ = dotenv::dotenv();

        let server_host = std::env::var("SERVER_HOST")
            .unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = std::env::var("SERVER_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8000);

        let config = Self {
            db_path: Self::get_env_path("DB_PATH")
                .unwrap_or_else(|| PathBuf::from("./data/transcriptions.db")),
            upload_dir: Self::get_env_path("UPLOAD_DIR")
                .unwrap_or_else(|| PathBuf::from("./data/uploads")),
            work_dir: Self::get_env_path("WORK_DIR")
                .unwrap_or_else(std::env::temp_dir),
            models_dir: Self::get_env_path("MODELS_DIR")
                .unwrap_or_else(ModelManager::default_models_dir),
            whisper_model: std::env::var("WHISPER_MODEL")
                .unwrap_or_else(|_| "base".to_string()),
            fallback_model: std::env::var("FALLBACK_MODEL")
                .unwrap_or_else(|_| "base-q8_0".to_string()),
            device: std::env::var("DEVICE")
                .map(|d| d.to_lowercase())
                .unwrap_or_else(|_| "auto".to_string()),
            language: Self::language_from_env(),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| format!("http://{}:{}", server_host, server_port)),
            server_host,
            server_port,
            max_concurrent_transcriptions: std::env::var("MAX_CONCURRENT_TRANSCRIPTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            log_dir: Self::get_env_path("LOG_DIR")
                .unwrap_or_else(|| PathBuf::from("./data/log")),
            log_level: std::env::var("LOG_LEVEL")
                .unwrap_or_else(|_| "info".to_string()),
        };

        // Ensure required directories exist
        config.ensure_directories()?;

        Ok(config)
    }

    /// Whisper language hint. `LANGUAGE` is the gettext locale list and is never read.
    fn language_from_env() -> Option<String> {
        std::env::var("WHISPER_LANGUAGE")
            .ok()
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty())
    }

    /// Get PathBuf from environment variable
    fn get_env_path(key: &str) -> Option<PathBuf> {
        std::env::var(key).ok().map(PathBuf::from)
    }

    /// Ensure required directories exist, create if not
    pub fn ensure_directories(&self) -> Result<(), EchoTextError> {
        let mut dirs: Vec<&Path> = vec![
            self.upload_dir.as_path(),
            self.work_dir.as_path(),
            self.log_dir.as_path(),
        ];
        if let Some(parent) = self.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            dirs.push(parent);
        }

        for dir in dirs {
            if !dir.exists() {
                std::fs::create_dir_all(dir).map_err(|e| {
                    EchoTextError::config(format!(
                        "Failed to create directory {}: {}",
                        dir.display(),
                        e
                    ))
                })?;
            }
        }

        Ok(())
    }

    /// Get server bind address (host:port)
    pub fn server_bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Externally addressable URL of a permanently staged audio file
    pub fn audio_url(&self, generated_name: &str) -> String {
        format!("{}/audio/{}", self.public_base_url.trim_end_matches('/'), generated_name)
    }

    /// Whether the accelerated backend may be tried at all
    pub fn prefers_accelerator(&self) -> bool {
        self.device != "cpu"
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), EchoTextError> {
        if self.whisper_model.is_empty() || self.fallback_model.is_empty() {
            return Err(EchoTextError::config("Whisper model name cannot be empty"));
        }

        if self.device != "auto" && self.device != "cpu" {
            return Err(EchoTextError::config(format!(
                "Unknown device '{}', expected 'auto' or 'cpu'",
                self.device
            )));
        }

        if !self.public_base_url.starts_with("http://")
            && !self.public_base_url.starts_with("https://") {
            return Err(EchoTextError::config(
                "Public base URL must start with http:// or https://"
            ));
        }

        if let Some(language) = &self.language {
            if !is_whisper_language_code(language) {
                return Err(EchoTextError::config(format!(
                    "Invalid WHISPER_LANGUAGE '{}', expected a code such as 'en' or 'auto'",
                    language
                )));
            }
        }

        // Validate port range
        if self.server_port == 0 {
            return Err(EchoTextError::config("Server port cannot be 0"));
        }

        if self.max_concurrent_transcriptions == 0 {
            return Err(EchoTextError::config(
                "MAX_CONCURRENT_TRANSCRIPTIONS must be at least 1"
            ));
        }

        Ok(())
    }
}

/// Whisper language ids are short lowercase codes ("en", "haw") or "auto"
fn is_whisper_language_code(code: &str) -> bool {
    code == "auto" || ((2..=3).contains(&code.len()) && code.bytes().all(|b| b.is_ascii_lowercase()))
}
