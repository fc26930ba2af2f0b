//! Engine adapter contract
//!
//! Backend selection and the single-pass segment producer shared by every
//! speech engine implementation.

use echotext_common::Result;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::types::{RawSegment, Transcription};

/// GPU 디바이스 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuDevice {
    /// CUDA (NVIDIA GPU)
    Cuda,
    /// Metal (Apple GPU)
    Metal,
    /// CPU만 사용
    Cpu,
}

impl GpuDevice {
    /// 사용 가능한 GPU 디바이스 감지 (우선순위: CUDA > Metal > CPU)
    ///
    /// GPU 지원 여부는 빌드 시 feature flag로 결정됩니다.
    /// `--features cuda` 또는 `--features metal` 없이 빌드하면 CPU만 사용합니다.
    pub fn detect() -> Self {
        if cfg!(feature = "cuda") {
            GpuDevice::Cuda
        } else if cfg!(feature = "metal") {
            GpuDevice::Metal
        } else {
            GpuDevice::Cpu
        }
    }

    pub fn is_accelerated(self) -> bool {
        self != GpuDevice::Cpu
    }
}

/// Numeric mode of the loaded weights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    F16,
    Int8,
}

/// Execution mode of the speech model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Backend {
    pub device: GpuDevice,
    pub precision: Precision,
}

impl Backend {
    /// GPU execution with half-precision weights
    pub fn accelerated(device: GpuDevice) -> Self {
        Self {
            device,
            precision: Precision::F16,
        }
    }

    /// CPU execution with 8-bit quantized weights
    pub fn fallback() -> Self {
        Self {
            device: GpuDevice::Cpu,
            precision: Precision::Int8,
        }
    }

    pub fn is_accelerated(&self) -> bool {
        self.device.is_accelerated()
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", self.device, self.precision)
    }
}

/// Lazy, finite, single-pass sequence of model segments.
///
/// Not restartable: a second pass needs a new `SpeechEngine::segments` call.
pub type SegmentStream<'a> = Box<dyn Iterator<Item = Result<RawSegment>> + 'a>;

/// A loaded speech-to-text model bound to one backend
pub trait SpeechEngine: Send + Sync {
    /// Backend this instance runs on
    fn backend(&self) -> Backend;

    /// Run the model on an audio file and hand back its segment producer
    fn segments(&self, audio_path: &Path) -> Result<SegmentStream<'_>>;
}

/// Constructs speech engines for a given backend
pub trait EngineLoader: Send + Sync {
    fn load(&self, backend: Backend) -> Result<Arc<dyn SpeechEngine>>;
}

/// Pick and load the process-wide backend.
///
/// The accelerated backend is tried when the build advertises a GPU and the
/// caller allows it; any load failure falls through to the CPU fallback.
pub fn select_backend(
    loader: &dyn EngineLoader,
    prefer_accelerator: bool,
) -> Result<Arc<dyn SpeechEngine>> {
    let device = if prefer_accelerator {
        GpuDevice::detect()
    } else {
        GpuDevice::Cpu
    };

    select_backend_for(loader, device)
}

pub(crate) fn select_backend_for(
    loader: &dyn EngineLoader,
    device: GpuDevice,
) -> Result<Arc<dyn SpeechEngine>> {
    if device.is_accelerated() {
        let backend = Backend::accelerated(device);
        info!("Loading speech model on {}", backend);
        match loader.load(backend) {
            Ok(engine) => return Ok(engine),
            Err(e) => {
                warn!("Failed to load on {}: {}. Falling back to CPU...", backend, e);
            }
        }
    }

    let backend = Backend::fallback();
    info!("Loading speech model on {}", backend);
    let engine = loader.load(backend)?;
    info!("Speech model loaded on {}", engine.backend());
    Ok(engine)
}

/// Transcribe a file, fully draining the engine's segment producer
pub fn transcribe(engine: &dyn SpeechEngine, audio_path: &Path) -> Result<Transcription> {
    let stream = engine.segments(audio_path)?;
    let transcription = Transcription::collect(stream)?;

    info!(
        "Transcription finished on {}: {} segments, {:.2}s",
        engine.backend(),
        transcription.segments.len(),
        transcription.duration()
    );

    Ok(transcription)
}
