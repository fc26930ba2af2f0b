//! Audio decoding and conversion
//!
//! Decodes uploaded containers with symphonia and converts them to the
//! 16kHz mono f32 samples Whisper expects.

use echotext_common::{EchoTextError, Result};
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info, warn};

/// Upload extensions the service accepts (compared case-insensitively)
pub const ACCEPTED_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a", "mp4"];

/// Sample rate required by Whisper
pub const WHISPER_SAMPLE_RATE: u32 = 16_000;

/// Extension of an uploaded file name, as written (without the dot)
pub fn extension_of(filename: &str) -> Option<&str> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
}

/// Check if an uploaded file name has an accepted extension
pub fn is_accepted(filename: &str) -> bool {
    extension_of(filename)
        .map(|ext| ACCEPTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Audio buffer (interleaved f32 samples)
#[derive(Debug)]
pub struct AudioBuffer {
    /// Audio samples normalized to [-1.0, 1.0]
    pub samples: Vec<f32>,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Number of channels
    pub channels: u16,
}

impl AudioBuffer {
    /// Create a new audio buffer
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Get duration in seconds
    pub fn duration(&self) -> f32 {
        let frames = self.samples.len() / self.channels.max(1) as usize;
        frames as f32 / self.sample_rate as f32
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Convert to mono by averaging channels
    pub fn to_mono(mut self) -> Self {
        if self.channels <= 1 {
            return self;
        }

        debug!("Converting {} channel audio to mono", self.channels);

        let channels = self.channels as usize;
        self.samples = self
            .samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();
        self.channels = 1;
        self
    }

    /// Resample to target sample rate
    ///
    /// Linear interpolation; adequate for speech at Whisper's 16kHz.
    pub fn resample(mut self, target_rate: u32) -> Self {
        if self.sample_rate == target_rate || self.samples.is_empty() {
            self.sample_rate = target_rate;
            return self;
        }

        debug!("Resampling from {}Hz to {}Hz", self.sample_rate, target_rate);

        let ratio = self.sample_rate as f64 / target_rate as f64;
        let new_length = (self.samples.len() as f64 / ratio) as usize;
        let last = self.samples.len() - 1;
        let mut resampled = Vec::with_capacity(new_length);

        for i in 0..new_length {
            let src_index = i as f64 * ratio;
            let src_index_floor = (src_index.floor() as usize).min(last);
            let src_index_ceil = (src_index_floor + 1).min(last);
            let fraction = src_index - src_index_floor as f64;

            let sample = self.samples[src_index_floor] * (1.0 - fraction) as f32
                + self.samples[src_index_ceil] * fraction as f32;

            resampled.push(sample);
        }

        self.samples = resampled;
        self.sample_rate = target_rate;
        self
    }
}

/// Decode an audio/video file into interleaved f32 samples.
///
/// A zero-length file, or a container without any decodable frames,
/// yields an empty buffer rather than an error.
pub fn decode_file(path: &Path) -> Result<AudioBuffer> {
    let file = File::open(path)
        .map_err(|e| EchoTextError::transcription(format!("Failed to open audio file {}: {}", path.display(), e)))?;

    let len = file
        .metadata()
        .map_err(|e| EchoTextError::transcription(format!("Failed to stat audio file: {}", e)))?
        .len();
    if len == 0 {
        info!("Audio file is empty: {}", path.display());
        return Ok(AudioBuffer::new(Vec::new(), WHISPER_SAMPLE_RATE, 1));
    }

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(&ext.to_lowercase());
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| EchoTextError::transcription(format!("Unsupported or corrupt audio: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| EchoTextError::transcription("No audio track found"))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let mut sample_rate = codec_params.sample_rate.unwrap_or(WHISPER_SAMPLE_RATE);
    let mut channels = codec_params.channels.map_or(1, |c| c.count() as u16);

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| EchoTextError::transcription(format!("Unsupported codec: {}", e)))?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(EchoTextError::transcription(format!("Failed to read audio packet: {}", e)));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping undecodable audio packet: {}", e);
                continue;
            }
            Err(e) => {
                return Err(EchoTextError::transcription(format!("Audio decode failed: {}", e)));
            }
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        channels = spec.channels.count() as u16;

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    let buffer = AudioBuffer::new(samples, sample_rate, channels);
    info!(
        "Decoded {}: {}Hz, {} channel(s), {:.2}s",
        path.display(),
        buffer.sample_rate,
        buffer.channels,
        buffer.duration()
    );

    Ok(buffer)
}

/// Decode a file and convert it to 16kHz mono samples for Whisper
pub fn load_for_model(path: &Path) -> Result<Vec<f32>> {
    let buffer = decode_file(path)?
        .to_mono()
        .resample(WHISPER_SAMPLE_RATE);
    Ok(buffer.samples)
}
