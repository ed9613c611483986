//! Duet Compose Engine
//!
//! Stacks two recordings into one portrait movie: the top clip fills the
//! upper half of the canvas, the bottom clip the lower half, and the top
//! clip's audio is carried through unchanged.
//!
//! # Pipeline Architecture
//!
//! ```text
//! top.mov ─────┐
//!              ├── Probe (ffprobe: duration, tracks, orientation)
//! bottom.mov ──┘         │
//!                        ▼
//!                 CompositionPlan (canvas, timeline, layers, audio)
//!                        │
//!                        ├── Orient + place top layer at (0, 0)
//!                        ├── Orient + place bottom layer at (0, top height)
//!                        ├── Map top audio (copy)
//!                        ▼
//!                 Encode (H.264, .mov) -> .<name>.partial
//!                        │
//!                        ▼
//!                 Rename over destination ── Verify (optional)
//! ```

pub mod capabilities;
pub mod composer;
pub mod ffmpeg;
pub mod plan;
pub mod probe;
pub mod render;
pub mod verify;

pub use composer::{
    completion_channel, ComposeRequest, CompletionHandle, CompletionSender, Composer,
    RenderedOutput,
};
pub use ffmpeg::FfmpegBackend;
pub use plan::{AudioPlan, CompositionPlan, LayerPlan};
pub use probe::{FfprobeProbe, MediaProbe};
pub use render::{ComposeProgress, ComposeStage, ProgressCallback, RenderBackend, RenderJob};
pub use verify::{VerificationReport, VerificationStatus};
