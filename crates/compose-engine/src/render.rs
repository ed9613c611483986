//! Render backend seam and progress reporting.

use std::path::PathBuf;

use duet_common::error::CompositionResult;

use crate::plan::CompositionPlan;

/// A planned composition bound to a concrete output file.
#[derive(Debug, Clone)]
pub struct RenderJob {
    /// The composition to render.
    pub plan: CompositionPlan,

    /// File the backend writes. This is the staging file, not the final
    /// destination; the composer moves it into place on success.
    pub output_path: PathBuf,
}

/// Progress callback for composition rendering.
pub type ProgressCallback = Box<dyn Fn(ComposeProgress) + Send + Sync>;

/// Composition progress report.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposeProgress {
    /// Current progress [0.0, 1.0].
    pub progress: f64,

    /// Frames rendered so far.
    pub frames_rendered: u64,

    /// Total frames to render.
    pub total_frames: u64,

    /// Estimated time remaining in seconds.
    pub eta_secs: f64,

    /// Current stage.
    pub stage: ComposeStage,
}

/// Stages of a composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeStage {
    Probing,
    Planning,
    Rendering,
    Finalizing,
    Complete,
    Failed,
}

impl ComposeProgress {
    /// A report with no frames rendered yet.
    pub fn at_stage(stage: ComposeStage, total_frames: u64) -> Self {
        let done = stage == ComposeStage::Complete;
        Self {
            progress: if done { 1.0 } else { 0.0 },
            frames_rendered: if done { total_frames } else { 0 },
            total_frames,
            eta_secs: 0.0,
            stage,
        }
    }
}

/// Trait for render backends.
pub trait RenderBackend: Send + Sync {
    /// Render `job.plan` into `job.output_path`. Blocks until the render
    /// finishes.
    fn render(&self, job: &RenderJob, progress: Option<&ProgressCallback>) -> CompositionResult<()>;

    /// Check if this backend is available on the system.
    fn is_available(&self) -> bool;

    /// Backend name.
    fn name(&self) -> &str;
}
