use echotext_common::{EchoTextError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, WhisperState,
};

use crate::audio;
use crate::engine::{Backend, EngineLoader, Precision, SegmentStream, SpeechEngine};
use crate::types::RawSegment;

/// Beam width used for every decode
pub const BEAM_SIZE: i32 = 5;

/// Whisper STT Engine
pub struct WhisperEngine {
    ctx: WhisperContext,
    model_path: PathBuf,
    backend: Backend,
    language: Option<String>,
}

impl WhisperEngine {
    /// Load a Whisper model file on the given backend
    ///
    /// # Arguments
    /// * `model_path` - Path to the ggml model file
    /// * `backend` - Accelerated (GPU) or fallback (CPU) execution
    /// * `language` - Language hint; `None` lets Whisper detect it
    ///
    /// # Example
    /// ```no_run
    /// use echotext_stt::{Backend, WhisperEngine};
    ///
    /// let engine = WhisperEngine::new("models/ggml-base-q8_0.bin", Backend::fallback(), None).unwrap();
    /// ```
    pub fn new(
        model_path: impl AsRef<Path>,
        backend: Backend,
        language: Option<String>,
    ) -> Result<Self> {
        let path = model_path.as_ref();

        if !path.exists() {
            return Err(EchoTextError::transcription(format!(
                "Model file not found: {}",
                path.display()
            )));
        }

        let path_str = path.to_str().ok_or_else(|| {
            EchoTextError::config(format!("Model path is not valid UTF-8: {}", path.display()))
        })?;

        info!("Loading Whisper model from {} on {}", path.display(), backend);

        let params = WhisperContextParameters {
            use_gpu: backend.is_accelerated(),
            ..Default::default()
        };

        let ctx = WhisperContext::new_with_params(path_str, params).map_err(|e| {
            let msg = format!("Failed to load Whisper model on {}: {}", backend, e);
            if backend.is_accelerated() {
                EchoTextError::accelerator(msg)
            } else {
                EchoTextError::transcription(msg)
            }
        })?;

        info!("Whisper model loaded successfully with {}", backend);

        Ok(Self {
            ctx,
            model_path: path.to_path_buf(),
            backend,
            language,
        })
    }

    /// Get model path
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// 추론 실패는 GPU 백엔드에서 발생하면 가속기 오류로 분류합니다.
    fn inference_error(&self, what: &str, e: impl std::fmt::Display) -> EchoTextError {
        let msg = format!("{} on {}: {}", what, self.backend, e);
        if self.backend.is_accelerated() {
            EchoTextError::accelerator(msg)
        } else {
            EchoTextError::transcription(msg)
        }
    }
}

impl SpeechEngine for WhisperEngine {
    fn backend(&self) -> Backend {
        self.backend
    }

    fn segments(&self, audio_path: &Path) -> Result<SegmentStream<'_>> {
        info!("Transcribing audio file: {}", audio_path.display());

        // Decoding problems are about the input, never the accelerator
        let samples = audio::load_for_model(audio_path)?;
        if samples.is_empty() {
            info!("No audio samples in {}, nothing to transcribe", audio_path.display());
            return Ok(Box::new(std::iter::empty()));
        }

        let mut params = FullParams::new(SamplingStrategy::BeamSearch {
            beam_size: BEAM_SIZE,
            patience: -1.0,
        });
        params.set_language(self.language.as_deref());
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        // Create a new state for this transcription
        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| self.inference_error("Failed to create Whisper state", e))?;

        debug!("Starting Whisper inference on {} samples", samples.len());
        state
            .full(params, &samples)
            .map_err(|e| self.inference_error("Transcription failed", e))?;

        let count = state
            .full_n_segments()
            .map_err(|e| self.inference_error("Failed to get segment count", e))?;

        debug!("Whisper inference complete, {} segments", count);

        Ok(Box::new(WhisperSegments {
            state,
            next: 0,
            count,
        }))
    }
}

/// Reads segments out of a finished Whisper state one at a time
struct WhisperSegments {
    state: WhisperState,
    next: i32,
    count: i32,
}

impl WhisperSegments {
    fn read(&self, i: i32) -> Result<RawSegment> {
        let text = self
            .state
            .full_get_segment_text_lossy(i)
            .map_err(|e| EchoTextError::transcription(format!("Failed to get segment text: {}", e)))?;
        let t0 = self
            .state
            .full_get_segment_t0(i)
            .map_err(|e| EchoTextError::transcription(format!("Failed to get segment start time: {}", e)))?;
        let t1 = self
            .state
            .full_get_segment_t1(i)
            .map_err(|e| EchoTextError::transcription(format!("Failed to get segment end time: {}", e)))?;

        // Whisper timestamps are centiseconds
        Ok(RawSegment {
            start: t0 as f64 / 100.0,
            end: t1 as f64 / 100.0,
            text,
        })
    }
}

impl Iterator for WhisperSegments {
    type Item = Result<RawSegment>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.count {
            return None;
        }
        let segment = self.read(self.next);
        self.next += 1;
        Some(segment)
    }
}

/// Loads `WhisperEngine`s from the configured model files
pub struct WhisperLoader {
    /// Half-precision weights for the accelerated backend
    pub accelerated_model: PathBuf,
    /// Quantized weights for the CPU fallback backend
    pub fallback_model: PathBuf,
    pub language: Option<String>,
}

impl EngineLoader for WhisperLoader {
    fn load(&self, backend: Backend) -> Result<Arc<dyn SpeechEngine>> {
        let model_path = match backend.precision {
            Precision::F16 => &self.accelerated_model,
            Precision::Int8 => &self.fallback_model,
        };
        let engine = WhisperEngine::new(model_path, backend, self.language.clone())?;
        Ok(Arc::new(engine))
    }
}
