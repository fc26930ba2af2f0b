use echotext_common::{AppConfig, EchoTextError, Result};
use echotext_store::TranscriptionStore;
use echotext_stt::{self as stt, audio, Backend, EngineLoader, SpeechEngine, Transcription};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, info_span, warn};

use crate::staging::AudioStager;
use crate::state::EngineSlot;
use crate::types::TranscriptionResult;

/// Orchestrates staging, transcription and persistence for one upload
pub struct TranscriptionPipeline {
    config: Arc<AppConfig>,
    stager: AudioStager,
    store: Arc<TranscriptionStore>,
    engine: Arc<EngineSlot>,
    loader: Arc<dyn EngineLoader>,
    permits: Arc<Semaphore>,
}

impl TranscriptionPipeline {
    /// Create new pipeline
    pub fn new(
        config: Arc<AppConfig>,
        stager: AudioStager,
        store: Arc<TranscriptionStore>,
        engine: Arc<EngineSlot>,
        loader: Arc<dyn EngineLoader>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_transcriptions.max(1)));
        Self {
            config,
            stager,
            store,
            engine,
            loader,
            permits,
        }
    }

    /// Transcribe an upload and record the result.
    ///
    /// The working copy is removed on every exit path, including when this
    /// future is dropped. The permanent copy stays even if a later step fails.
    pub async fn handle_upload(
        &self,
        bytes: &[u8],
        original_filename: &str,
    ) -> Result<TranscriptionResult> {
        if !audio::is_accepted(original_filename) {
            return Err(EchoTextError::invalid_input("Invalid file type."));
        }

        let engine = self
            .engine
            .get()
            .await
            .ok_or_else(|| EchoTextError::service_unavailable("Model is loading..."))?;

        let staged = self.stager.stage(bytes, original_filename).await?;
        let audio_id = staged.permanent_id;
        info!("[{}] Staged {} ({} bytes)", audio_id, original_filename, bytes.len());

        // Owned so the slot stays taken until inference ends, even if this request is dropped
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| EchoTextError::internal(format!("Transcription queue closed: {}", e)))?;

        let loader = self.loader.clone();
        let working = staged.working;
        let span = info_span!("transcription", audio_id = %audio_id);
        let transcription = tokio::task::spawn_blocking(move || {
            let _guard = span.enter();
            info!("[{}] Transcribing on {}", audio_id, engine.backend());
            let result = transcribe_with_fallback(engine.as_ref(), loader.as_ref(), working.path());
            working.release();
            drop(permit);
            info!("[{}] Working copy released", audio_id);
            result
        })
        .await
        .map_err(|e| EchoTextError::internal(format!("Transcription task failed: {}", e)))?
        .map_err(|e| {
            error!("[{}] Transcription error: {}", audio_id, e);
            e
        })?;

        let audio_url = self.config.audio_url(&staged.permanent_name);
        let id = {
            let store = self.store.clone();
            let filename = original_filename.to_string();
            let transcript = transcription.text.clone();
            let url = audio_url.clone();
            let segments = transcription.segments.clone();
            tokio::task::spawn_blocking(move || {
                store.create(&filename, &transcript, Some(url.as_str()), Some(segments.as_slice()))
            })
            .await
            .map_err(|e| EchoTextError::internal(format!("Record task failed: {}", e)))??
        };
        info!("[{}] Recorded transcription {}", audio_id, id);

        Ok(TranscriptionResult {
            transcript: transcription.text,
            filename: original_filename.to_string(),
            id,
            audio_url,
            segments: transcription.segments,
        })
    }
}

/// Run the shared engine, retrying once on a fresh fallback engine when the
/// failure points at the accelerator.
///
/// The fallback instance lives only for this call; the shared engine is not replaced.
pub fn transcribe_with_fallback(
    engine: &dyn SpeechEngine,
    loader: &dyn EngineLoader,
    working_path: &Path,
) -> Result<Transcription> {
    match stt::transcribe(engine, working_path) {
        Ok(transcription) => Ok(transcription),
        Err(e) if e.is_accelerator_failure() => {
            warn!("Accelerated transcription failed: {}. Retrying with a fresh CPU model...", e);
            let retry = loader
                .load(Backend::fallback())
                .and_then(|fallback| stt::transcribe(fallback.as_ref(), working_path));
            retry.map_err(|e| {
                EchoTextError::transcription(format!("CPU fallback also failed: {}", detail(&e)))
            })
        }
        Err(e) => Err(match e {
            EchoTextError::Transcription(_) => e,
            other => EchoTextError::transcription(detail(&other)),
        }),
    }
}

/// Error message without the variant prefix when it carries one
fn detail(e: &EchoTextError) -> String {
    match e {
        EchoTextError::Transcription(msg)
        | EchoTextError::Accelerator(msg)
        | EchoTextError::Storage(msg)
        | EchoTextError::Config(msg)
        | EchoTextError::Internal(msg) => msg.clone(),
        other => other.to_string(),
    }
}
