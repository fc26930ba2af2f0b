use echotext_common::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Single transcription segment with timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start time in seconds
    pub start: f64,

    /// End time in seconds
    pub end: f64,

    /// Transcribed text, trimmed
    pub text: String,
}

impl Segment {
    /// Create a new segment
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    /// Get duration in seconds
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Segment as the model reports it, before trimming
#[derive(Debug, Clone, PartialEq)]
pub struct RawSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Complete transcription result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    /// Full transcribed text
    pub text: String,

    /// Individual segments with timestamps
    pub segments: Vec<Segment>,
}

impl Transcription {
    /// Drain a segment producer into a finished transcription.
    ///
    /// The producer is consumed to the end; the first error aborts collection.
    /// Timestamps are kept as reported except that `start >= 0` and `end >= start`
    /// are enforced, and segments are ordered by start time.
    pub fn collect<I>(raw_segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = Result<RawSegment>>,
    {
        let mut segments = Vec::new();

        for raw in raw_segments {
            let raw = raw?;
            let start = raw.start.max(0.0);
            let end = raw.end.max(start);
            if start != raw.start || end != raw.end {
                debug!("Clamped segment timestamps {}-{} to {}-{}", raw.start, raw.end, start, end);
            }
            segments.push(Segment::new(start, end, raw.text.trim()));
        }

        // stable: equal starts keep model order
        segments.sort_by(|a, b| a.start.total_cmp(&b.start));

        let text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        Ok(Self { text, segments })
    }

    /// Get total duration
    pub fn duration(&self) -> f64 {
        self.segments
            .last()
            .map(|seg| seg.end)
            .unwrap_or(0.0)
    }
}
