use std::{io::Error as IoError, time::Duration};

use thiserror::Error;

/// The error type for everything that can go wrong between spawning ffprobe
/// and writing the chart. Variants carry enough context to tell which stage
/// failed without extra logging at the call site.
#[derive(Debug, Error)]
pub enum FrameplotError {
    /// ffprobe was still running at the deadline and got killed.
    #[error("ffprobe ran past the {0:?} deadline and was killed")]
    ProbeTimeout(Duration),

    /// The captured ffprobe output is not well-formed JSON.
    #[error("ffprobe output is not valid JSON: {0}")]
    ProbeOutput(#[source] serde_json::Error),

    /// The parsed output has no "frames" list.
    #[error("ffprobe output has no \"frames\" list")]
    NoFrames,

    /// A frame entry is missing a required field or holds an unconvertible value.
    #[error("frame {index}: {field} {reason}")]
    FrameField {
        index: usize,
        field: &'static str,
        reason: String,
    },

    /// A picture type outside the recognized set, which has no color or mark.
    #[error("no rendering defined for picture type {0:?}")]
    UnknownPictType(String),

    /// The chart backend failed while drawing or writing the image.
    #[error("failed to draw chart: {0}")]
    Chart(String),

    #[error("i/o error: {0}")]
    Io(#[from] IoError),
}

impl FrameplotError {
    pub(crate) fn chart<E: std::fmt::Display>(err: E) -> Self {
        Self::Chart(err.to_string())
    }
}
