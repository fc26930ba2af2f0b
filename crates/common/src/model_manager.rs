//! Model Manager for automatic model downloading
//!
//! Resolves Whisper ggml model files on disk and fetches missing ones
//! from the public whisper.cpp model repository.

use crate::Result;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

const MODEL_BASE_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

/// Whisper model information
#[derive(Debug, Clone)]
pub struct WhisperModel {
    /// Model name (e.g., "base", "base-q8_0")
    pub name: String,

    /// Approximate file size in bytes
    pub size: u64,

    /// Download URL
    pub url: String,
}

impl WhisperModel {
    fn new(name: &str, size_mb: u64) -> Self {
        Self {
            name: name.to_string(),
            size: size_mb * 1024 * 1024,
            url: format!("{}/{}", MODEL_BASE_URL, model_filename(name)),
        }
    }

    /// Get model filename
    pub fn filename(&self) -> String {
        model_filename(&self.name)
    }

    /// Get size in MB
    pub fn size_mb(&self) -> f64 {
        self.size as f64 / 1024.0 / 1024.0
    }
}

/// ggml file name for a model name
pub fn model_filename(name: &str) -> String {
    format!("ggml-{}.bin", name)
}

/// Available Whisper models
///
/// The `-q8_0` variants carry 8-bit quantized weights and back the CPU fallback.
pub fn available_whisper_models() -> Vec<WhisperModel> {
    vec![
        WhisperModel::new("tiny", 75),
        WhisperModel::new("tiny-q8_0", 42),
        WhisperModel::new("base", 142),
        WhisperModel::new("base-q8_0", 78),
        WhisperModel::new("small", 466),
        WhisperModel::new("small-q8_0", 252),
        WhisperModel::new("medium", 1500),
        WhisperModel::new("medium-q8_0", 785),
        WhisperModel::new("large-v3", 3100),
    ]
}

/// Model Manager
pub struct ModelManager {
    models_dir: PathBuf,
    client: Client,
}

impl ModelManager {
    /// Create new model manager
    pub fn new(models_dir: PathBuf) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(3600)) // 1 hour for large downloads
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self { models_dir, client })
    }

    /// Get default models directory
    pub fn default_models_dir() -> PathBuf {
        #[cfg(target_os = "linux")]
        {
            if let Some(home) = std::env::var_os("HOME") {
                return PathBuf::from(home)
                    .join(".cache/echotext/models");
            }
        }

        #[cfg(target_os = "macos")]
        {
            if let Some(home) = std::env::var_os("HOME") {
                return PathBuf::from(home)
                    .join("Library/Caches/echotext/models");
            }
        }

        #[cfg(target_os = "windows")]
        {
            if let Some(local_app_data) = std::env::var_os("LOCALAPPDATA") {
                return PathBuf::from(local_app_data)
                    .join("echotext\\models");
            }
        }

        // Fallback
        PathBuf::from("models")
    }

    /// Path a model is expected at, whether or not it exists yet
    pub fn model_path(&self, model_name: &str) -> PathBuf {
        self.models_dir.join(model_filename(model_name))
    }

    /// Ensure Whisper model exists, download if missing
    pub async fn ensure_whisper_model(&self, model_name: &str) -> Result<PathBuf> {
        let model_path = self.model_path(model_name);

        if model_path.exists() {
            info!("Model already exists: {}", model_path.display());
            return Ok(model_path);
        }

        info!("Model not found, downloading: {}", model_name);

        let models = available_whisper_models();
        let model_info = models
            .iter()
            .find(|m| m.name == model_name)
            .ok_or_else(|| crate::EchoTextError::config(format!("Unknown model: {}", model_name)))?;

        self.download_model(model_info, &model_path).await?;

        Ok(model_path)
    }

    /// Download model from URL
    pub async fn download_model(&self, model: &WhisperModel, dest: &Path) -> Result<()> {
        info!(
            "Downloading {} ({:.1} MB) from {}",
            model.filename(),
            model.size_mb(),
            model.url
        );

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        let pb = ProgressBar::new(model.size);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }

        let response = self.client.get(&model.url).send().await
            .map_err(|e| crate::EchoTextError::network(format!("Failed to download: {}", e)))?;

        if !response.status().is_success() {
            return Err(crate::EchoTextError::network(format!(
                "Download failed with status: {}",
                response.status()
            )));
        }

        // Write to temporary file first
        let temp_path = dest.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        use futures::StreamExt;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| crate::EchoTextError::network(format!("Download error: {}", e)))?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            pb.set_position(downloaded);
        }

        pb.finish_with_message("Download complete");
        file.sync_all().await?;
        drop(file);

        let metadata = fs::metadata(&temp_path).await?;
        if metadata.len() < model.size / 2 {
            fs::remove_file(&temp_path).await?;
            return Err(crate::EchoTextError::network(format!(
                "Downloaded file is too small ({} bytes, expected ~{} bytes)",
                metadata.len(),
                model.size
            )));
        }

        fs::rename(&temp_path, dest).await?;

        info!("Download successful: {}", dest.display());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_models() {
        let models = available_whisper_models();
        assert!(models.iter().any(|m| m.name == "base"));
        assert!(models.iter().any(|m| m.name == "base-q8_0"));
    }

    #[test]
    fn test_model_filename() {
        let model = WhisperModel::new("base-q8_0", 78);
        assert_eq!(model.filename(), "ggml-base-q8_0.bin");
        assert!(model.url.ends_with("/ggml-base-q8_0.bin"));
    }

    #[test]
    fn test_default_models_dir() {
        let dir = ModelManager::default_models_dir();
        assert!(!dir.to_string_lossy().is_empty());
    }

    #[tokio::test]
    async fn test_existing_model_is_not_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ggml-base.bin"), b"weights").unwrap();

        let manager = ModelManager::new(dir.path().to_path_buf()).unwrap();
        let path = manager.ensure_whisper_model("base").await.unwrap();
        assert_eq!(path, dir.path().join("ggml-base.bin"));
    }

    #[tokio::test]
    async fn test_unknown_model_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::new(dir.path().to_path_buf()).unwrap();
        assert!(manager.ensure_whisper_model("no-such-model").await.is_err());
    }
}
