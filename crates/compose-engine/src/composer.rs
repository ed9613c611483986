//! The composer: probe, plan, render, and deliver exactly one result.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use duet_common::config::ComposeSettings;
use duet_common::error::{ClipRole, CompositionError, CompositionResult, DuetResult};
use duet_media_model::{MediaClip, MediaTime, PixelSize};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::ffmpeg::FfmpegBackend;
use crate::plan::CompositionPlan;
use crate::probe::{FfprobeProbe, MediaProbe};
use crate::render::{ComposeProgress, ComposeStage, ProgressCallback, RenderBackend, RenderJob};
use crate::verify::{verify_output, VerificationReport};

/// Inputs of one composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeRequest {
    /// Clip stacked on top; drives the timeline and the audio.
    pub top: PathBuf,

    /// Clip stacked below.
    pub bottom: PathBuf,

    /// Where the rendered movie ends up. Replaced if it exists.
    pub destination: PathBuf,
}

impl ComposeRequest {
    pub fn new(
        top: impl Into<PathBuf>,
        bottom: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            top: top.into(),
            bottom: bottom.into(),
            destination: destination.into(),
        }
    }
}

/// A successfully rendered composition.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedOutput {
    /// Final location of the rendered file.
    pub path: PathBuf,

    /// Output canvas.
    pub canvas: PixelSize,

    /// Output timeline length.
    pub duration: MediaTime,

    /// Whether the top clip's audio was carried.
    pub has_audio: bool,

    /// Wall time spent composing.
    pub elapsed_secs: f64,

    /// Post-render check, when enabled.
    pub verification: Option<VerificationReport>,
}

/// Stacks two clips into one movie.
pub struct Composer<P = FfprobeProbe, B = FfmpegBackend> {
    probe: Arc<P>,
    backend: Arc<B>,
    settings: ComposeSettings,
}

impl Composer<FfprobeProbe, FfmpegBackend> {
    /// Composer backed by the configured ffprobe and ffmpeg executables.
    pub fn ffmpeg(settings: ComposeSettings) -> Self {
        Self::new(
            FfprobeProbe::new(settings.ffprobe_bin.clone()),
            FfmpegBackend::new(settings.ffmpeg_bin.clone()),
            settings,
        )
    }
}

impl<P, B> Composer<P, B>
where
    P: MediaProbe + 'static,
    B: RenderBackend + 'static,
{
    pub fn new(probe: P, backend: B, settings: ComposeSettings) -> Self {
        Self {
            probe: Arc::new(probe),
            backend: Arc::new(backend),
            settings,
        }
    }

    /// Probe both clips and build the plan without rendering anything.
    pub fn plan(&self, top: &Path, bottom: &Path) -> DuetResult<CompositionPlan> {
        let top = self.probe.probe(top)?;
        let bottom = self.probe.probe(bottom)?;
        Ok(CompositionPlan::build(&top, &bottom, &self.settings)?)
    }

    /// Run one composition to completion.
    ///
    /// The work runs on tokio's blocking pool. Dropping the returned future
    /// does not stop a render that has already started.
    pub async fn compose(
        &self,
        request: ComposeRequest,
        progress: Option<ProgressCallback>,
    ) -> CompositionResult<RenderedOutput> {
        tracing::info!(
            top = %request.top.display(),
            bottom = %request.bottom.display(),
            destination = %request.destination.display(),
            backend = self.backend.name(),
            "Starting composition"
        );

        let probe = Arc::clone(&self.probe);
        let backend = Arc::clone(&self.backend);
        let settings = self.settings.clone();
        let destination = request.destination.clone();

        let result = tokio::task::spawn_blocking(move || {
            let result = run_pipeline(&*probe, &*backend, &settings, &request, progress.as_ref());
            if result.is_err() {
                report(progress.as_ref(), ComposeProgress::at_stage(ComposeStage::Failed, 0));
            }
            result
        })
        .await
        .unwrap_or_else(|e| {
            Err(CompositionError::render(format!(
                "Composition worker stopped: {e}"
            )))
        });

        match &result {
            Ok(output) => tracing::info!(
                output = %output.path.display(),
                canvas = %output.canvas,
                duration = %output.duration,
                audio = output.has_audio,
                elapsed_secs = output.elapsed_secs,
                "Composition finished"
            ),
            Err(e) => tracing::warn!(
                destination = %destination.display(),
                error = %e,
                "Composition failed"
            ),
        }

        result
    }

    /// Start a composition in the background.
    ///
    /// The returned handle resolves exactly once, with the rendered output
    /// or the error that ended the attempt. Callers must not start another
    /// composition for the same destination before it resolves.
    pub fn spawn(
        self: &Arc<Self>,
        request: ComposeRequest,
        progress: Option<ProgressCallback>,
    ) -> CompletionHandle {
        let (sender, handle) = completion_channel();
        let composer = Arc::clone(self);
        tokio::spawn(async move {
            let result = composer.compose(request, progress).await;
            sender.complete(result);
        });
        handle
    }
}

fn report(progress: Option<&ProgressCallback>, update: ComposeProgress) {
    if let Some(cb) = progress {
        cb(update);
    }
}

fn run_pipeline(
    probe: &dyn MediaProbe,
    backend: &dyn RenderBackend,
    settings: &ComposeSettings,
    request: &ComposeRequest,
    progress: Option<&ProgressCallback>,
) -> CompositionResult<RenderedOutput> {
    let started = Instant::now();
    report(progress, ComposeProgress::at_stage(ComposeStage::Probing, 0));

    let top = probe_clip(probe, ClipRole::Top, &request.top)?;
    let bottom = probe_clip(probe, ClipRole::Bottom, &request.bottom)?;

    report(progress, ComposeProgress::at_stage(ComposeStage::Planning, 0));
    let plan = CompositionPlan::build(&top, &bottom, settings)?;
    tracing::info!(
        canvas = %plan.canvas,
        duration = %plan.duration,
        bottom_insert = %plan.bottom.insert_duration,
        top_orientation = plan.top.orientation.as_str(),
        bottom_orientation = plan.bottom.orientation.as_str(),
        audio = plan.has_audio(),
        frames = plan.total_frames,
        "Composition plan built"
    );
    if plan.bottom_is_short() {
        tracing::info!(
            tail_fill = plan.tail_fill.as_str(),
            "Bottom clip ends before the timeline"
        );
    }

    if !backend.is_available() {
        return Err(CompositionError::renderer_unavailable(format!(
            "The {} render backend is not available",
            backend.name()
        )));
    }

    let staging = prepare_destination(&request.destination)?;
    report(
        progress,
        ComposeProgress::at_stage(ComposeStage::Rendering, plan.total_frames),
    );

    let job = RenderJob {
        plan,
        output_path: staging.path().to_path_buf(),
    };
    backend.render(&job, progress)?;

    if !staging.path().is_file() {
        return Err(CompositionError::render(format!(
            "The {} backend reported success but wrote no file",
            backend.name()
        )));
    }
    staging.commit(&request.destination)?;

    let verification = if settings.verify_output {
        let verification = verify_output(probe, &job.plan, &request.destination);
        for finding in &verification.findings {
            tracing::warn!(finding = %finding, "Output verification");
        }
        match verification.write_sidecar() {
            Ok(path) => tracing::info!(report = %path.display(), "Wrote verification report"),
            Err(e) => tracing::warn!(error = %e, "Failed to write verification report"),
        }
        Some(verification)
    } else {
        None
    };

    report(
        progress,
        ComposeProgress::at_stage(ComposeStage::Complete, job.plan.total_frames),
    );

    Ok(RenderedOutput {
        path: request.destination.clone(),
        canvas: job.plan.canvas,
        duration: job.plan.duration,
        has_audio: job.plan.has_audio(),
        elapsed_secs: started.elapsed().as_secs_f64(),
        verification,
    })
}

fn probe_clip(probe: &dyn MediaProbe, role: ClipRole, path: &Path) -> CompositionResult<MediaClip> {
    probe.probe(path).map_err(|e| {
        CompositionError::sample_insertion(format!(
            "Failed to read the {role} clip {}: {e}",
            path.display()
        ))
    })
}

/// Clear the destination and reserve a sibling staging file.
fn prepare_destination(destination: &Path) -> CompositionResult<StagingFile> {
    let file_name = destination
        .file_name()
        .ok_or_else(|| CompositionError::destination(destination, "path has no file name"))?;

    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            CompositionError::destination(destination, format!("cannot create parent: {e}"))
        })?;
    }

    if destination.is_dir() {
        return Err(CompositionError::destination(destination, "path is a directory"));
    }
    remove_if_exists(destination).map_err(|e| {
        CompositionError::destination(destination, format!("cannot remove existing file: {e}"))
    })?;

    let staging_path = destination.with_file_name(format!(
        ".{}.partial",
        file_name.to_string_lossy()
    ));
    remove_if_exists(&staging_path).map_err(|e| {
        CompositionError::destination(destination, format!("cannot clear staging file: {e}"))
    })?;

    Ok(StagingFile {
        path: staging_path,
        committed: false,
    })
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// The file the backend renders into. Removed on drop unless committed.
#[derive(Debug)]
struct StagingFile {
    path: PathBuf,
    committed: bool,
}

impl StagingFile {
    fn path(&self) -> &Path {
        &self.path
    }

    /// Move the staging file over `destination`.
    fn commit(mut self, destination: &Path) -> CompositionResult<()> {
        std::fs::rename(&self.path, destination).map_err(|e| {
            CompositionError::destination(destination, format!("cannot move rendered file: {e}"))
        })?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = remove_if_exists(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove staging file");
        }
    }
}

/// Create a fire-once completion channel.
pub fn completion_channel() -> (CompletionSender, CompletionHandle) {
    let (tx, rx) = oneshot::channel();
    (CompletionSender { tx: Some(tx) }, CompletionHandle { rx })
}

/// Sending half of a completion channel.
///
/// `complete` consumes the sender, so a result can be delivered once. A
/// sender dropped without completing delivers `RenderFailed`.
#[derive(Debug)]
pub struct CompletionSender {
    tx: Option<oneshot::Sender<CompositionResult<RenderedOutput>>>,
}

impl CompletionSender {
    /// Deliver the terminal result. Returns `false` if nobody is listening.
    pub fn complete(mut self, result: CompositionResult<RenderedOutput>) -> bool {
        match self.tx.take() {
            Some(tx) => tx.send(result).is_ok(),
            None => false,
        }
    }
}

impl Drop for CompletionSender {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Err(CompositionError::render(
                "Composition ended without reporting a result",
            )));
        }
    }
}

/// Receiving half of a completion channel. Await it for the result.
#[derive(Debug)]
pub struct CompletionHandle {
    rx: oneshot::Receiver<CompositionResult<RenderedOutput>>,
}

impl CompletionHandle {
    /// Non-blocking check. `None` while the composition is still running.
    pub fn try_result(&mut self) -> Option<CompositionResult<RenderedOutput>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(closed_channel())),
        }
    }
}

impl Future for CompletionHandle {
    type Output = CompositionResult<RenderedOutput>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(closed_channel())))
    }
}

fn closed_channel() -> CompositionError {
    CompositionError::render("Completion channel closed without a result")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_file_sits_next_to_destination() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("merged.mov");
        let staging = prepare_destination(&destination).unwrap();
        assert_eq!(staging.path(), dir.path().join(".merged.mov.partial"));
    }

    #[test]
    fn test_prepare_removes_existing_destination_and_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("exports").join("merged.mov");
        std::fs::create_dir_all(destination.parent().unwrap()).unwrap();
        std::fs::write(&destination, b"old").unwrap();

        let _staging = prepare_destination(&destination).unwrap();
        assert!(!destination.exists());

        let fresh = dir.path().join("new").join("deep").join("out.mov");
        let _staging = prepare_destination(&fresh).unwrap();
        assert!(fresh.parent().unwrap().is_dir());
    }

    #[test]
    fn test_directory_destination_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = prepare_destination(dir.path()).unwrap_err();
        assert!(matches!(err, CompositionError::DestinationUnavailable { .. }));
    }

    #[test]
    fn test_uncommitted_staging_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("merged.mov");
        let staging = prepare_destination(&destination).unwrap();
        let staging_path = staging.path().to_path_buf();
        std::fs::write(&staging_path, b"partial").unwrap();

        drop(staging);
        assert!(!staging_path.exists());
        assert!(!destination.exists());
    }

    #[test]
    fn test_commit_moves_file_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("merged.mov");
        let staging = prepare_destination(&destination).unwrap();
        let staging_path = staging.path().to_path_buf();
        std::fs::write(&staging_path, b"rendered").unwrap();

        staging.commit(&destination).unwrap();
        assert!(!staging_path.exists());
        assert_eq!(std::fs::read(&destination).unwrap(), b"rendered");
    }

    #[tokio::test]
    async fn test_dropped_sender_still_completes() {
        let (sender, handle) = completion_channel();
        drop(sender);
        let err = handle.await.unwrap_err();
        assert!(matches!(err, CompositionError::RenderFailed { .. }));
    }

    #[tokio::test]
    async fn test_try_result_is_empty_until_completed() {
        let (sender, mut handle) = completion_channel();
        assert!(handle.try_result().is_none());
        assert!(sender.complete(Err(CompositionError::render("boom"))));
        let result = handle.try_result().unwrap();
        assert_eq!(result.unwrap_err(), CompositionError::render("boom"));
    }
}
