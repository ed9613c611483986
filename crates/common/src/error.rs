//! Error types shared across Duet crates.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which side of the stack a clip occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipRole {
    /// Upper layer; drives the timeline and the audio.
    Top,
    /// Lower layer; truncated to the top clip's duration.
    Bottom,
}

impl fmt::Display for ClipRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClipRole::Top => f.write_str("top"),
            ClipRole::Bottom => f.write_str("bottom"),
        }
    }
}

/// Terminal failure of a single composition attempt.
///
/// None of these are retried internally. The caller decides whether to
/// offer the source clips again.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompositionError {
    #[error("The {role} clip has no video track")]
    MissingVideoTrack { role: ClipRole },

    #[error("Failed to allocate composition track: {message}")]
    TrackAllocationFailed { message: String },

    #[error("Failed to insert clip samples: {message}")]
    SampleInsertionFailed { message: String },

    #[error("Renderer unavailable: {message}")]
    RendererUnavailable { message: String },

    #[error("Render failed: {message}")]
    RenderFailed { message: String },

    #[error("Destination {path} unavailable: {message}")]
    DestinationUnavailable { path: PathBuf, message: String },
}

impl CompositionError {
    pub fn track_allocation(msg: impl Into<String>) -> Self {
        Self::TrackAllocationFailed {
            message: msg.into(),
        }
    }

    pub fn sample_insertion(msg: impl Into<String>) -> Self {
        Self::SampleInsertionFailed {
            message: msg.into(),
        }
    }

    pub fn renderer_unavailable(msg: impl Into<String>) -> Self {
        Self::RendererUnavailable {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::RenderFailed {
            message: msg.into(),
        }
    }

    pub fn destination(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::DestinationUnavailable {
            path: path.into(),
            message: msg.into(),
        }
    }
}

/// Top-level error type for Duet operations outside a composition.
#[derive(Debug, thiserror::Error)]
pub enum DuetError {
    #[error("Probe error: {message}")]
    Probe { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Composition(#[from] CompositionError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type alias using DuetError.
pub type DuetResult<T> = Result<T, DuetError>;

/// Result type alias for a composition attempt.
pub type CompositionResult<T> = Result<T, CompositionError>;

impl DuetError {
    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }
}
