//! EchoText STT (Speech-to-Text) Engine
//!
//! Whisper.cpp based speech recognition module

pub mod audio;
pub mod engine;
pub mod types;
pub mod whisper;

// Re-export main types
pub use engine::{
    select_backend, transcribe, Backend, EngineLoader, GpuDevice, Precision, SegmentStream,
    SpeechEngine,
};
pub use types::{RawSegment, Segment, Transcription};
pub use whisper::{WhisperEngine, WhisperLoader};
