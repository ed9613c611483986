//! ffmpeg render backend.
//!
//! One ffmpeg invocation renders the whole composition. Autorotation is
//! disabled on both inputs and every layer is put upright by the filter
//! graph, so the layer sizes in the graph are exactly the planned ones.

use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::time::Instant;

use duet_common::config::{QualityPreset, TailFill};
use duet_common::error::{CompositionError, CompositionResult};

use crate::capabilities::binary_available;
use crate::plan::{CompositionPlan, LayerPlan};
use crate::render::{ComposeProgress, ComposeStage, ProgressCallback, RenderBackend, RenderJob};

/// Trailing stderr kept in error messages.
const MAX_STDERR_CHARS: usize = 4000;

/// Seconds without timeline advancement before a stall warning is logged.
const STALL_WARNING_SECS: u64 = 10;

/// [`RenderBackend`] that shells out to ffmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    binary: String,
}

impl FfmpegBackend {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl RenderBackend for FfmpegBackend {
    fn render(&self, job: &RenderJob, progress: Option<&ProgressCallback>) -> CompositionResult<()> {
        let args = build_ffmpeg_args(job);
        tracing::debug!(args = ?args, "Running ffmpeg");

        let mut cmd = Command::new(&self.binary);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|e| {
            CompositionError::renderer_unavailable(format!("Failed to start {}: {e}", self.binary))
        })?;

        tracing::info!(
            pid = child.id(),
            args_len = args.len(),
            total_frames = job.plan.total_frames,
            "ffmpeg process started"
        );

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CompositionError::render("Failed to capture ffmpeg stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| CompositionError::render("Failed to capture ffmpeg stderr"))?;

        // Drain stderr concurrently to avoid ffmpeg blocking on a full stderr pipe.
        let stderr_task = std::thread::spawn(move || -> String {
            let mut reader = BufReader::new(stderr);
            let mut output = String::new();
            match reader.read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        let expected_secs = job.plan.duration.as_secs_f64();
        let mut reader = BufReader::new(stdout);
        let mut line = String::new();
        let mut latest = ProgressState::default();
        let mut last_progress_secs = 0.0f64;
        let mut last_progress_wall = Instant::now();
        loop {
            line.clear();
            let bytes = match reader.read_line(&mut line) {
                Ok(bytes) => bytes,
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(CompositionError::render(format!(
                        "Failed reading ffmpeg progress: {e}"
                    )));
                }
            };
            if bytes == 0 {
                break;
            }

            let Some((key, value)) = line.trim().split_once('=') else {
                continue;
            };
            latest.update(key, value);
            if key != "progress" {
                continue;
            }

            if latest.out_time_secs > last_progress_secs + 0.001 {
                last_progress_secs = latest.out_time_secs;
                last_progress_wall = Instant::now();
            }
            if let Some(cb) = progress {
                cb(progress_report(
                    &latest,
                    job.plan.total_frames,
                    expected_secs,
                    start.elapsed().as_secs_f64(),
                ));
            }
            if last_progress_wall.elapsed().as_secs() >= STALL_WARNING_SECS {
                tracing::warn!(
                    out_time_secs = latest.out_time_secs,
                    elapsed_secs = start.elapsed().as_secs_f64(),
                    "No ffmpeg progress advancement for {STALL_WARNING_SECS}s"
                );
                last_progress_wall = Instant::now();
            }
        }

        let status = child
            .wait()
            .map_err(|e| CompositionError::render(format!("Failed to wait on ffmpeg: {e}")))?;

        let stderr_output = stderr_task
            .join()
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        if !status.success() {
            let reason = match status.code() {
                Some(code) => format!("exit code {code}"),
                None => "terminated by signal".to_string(),
            };
            return Err(CompositionError::render(format!(
                "ffmpeg {reason}: {}",
                tail_chars(stderr_output.trim(), MAX_STDERR_CHARS)
            )));
        }

        if let Some(cb) = progress {
            cb(ComposeProgress::at_stage(
                ComposeStage::Finalizing,
                job.plan.total_frames,
            ));
        }

        tracing::info!(
            elapsed_secs = start.elapsed().as_secs_f64(),
            "ffmpeg render finished"
        );
        Ok(())
    }

    fn is_available(&self) -> bool {
        binary_available(&self.binary)
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// Full ffmpeg argument list for a job.
pub fn build_ffmpeg_args(job: &RenderJob) -> Vec<String> {
    let plan = &job.plan;
    let mut args: Vec<String> = [
        "-y",
        "-hide_banner",
        "-loglevel",
        "error",
        "-nostats",
        "-progress",
        "pipe:1",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    for layer in [&plan.top, &plan.bottom] {
        args.push("-noautorotate".to_string());
        args.push("-i".to_string());
        args.push(layer.source.display().to_string());
    }

    args.push("-filter_complex".to_string());
    args.push(build_filter_graph(plan));
    args.push("-map".to_string());
    args.push("[vout]".to_string());

    match &plan.audio {
        Some(audio) => {
            args.push("-map".to_string());
            args.push(format!("0:{}", audio.stream_index));
            args.push("-c:a".to_string());
            args.push("copy".to_string());
        }
        None => args.push("-an".to_string()),
    }

    args.push("-r".to_string());
    args.push(plan.fps.to_string());
    args.push("-t".to_string());
    args.push(plan.duration.to_ffmpeg_timestamp());

    args.extend(codec_args(plan));

    args.push("-f".to_string());
    args.push("mov".to_string());
    args.push(job.output_path.display().to_string());
    args
}

/// The `-filter_complex` graph: black canvas, top layer at the origin,
/// bottom layer directly below it.
pub fn build_filter_graph(plan: &CompositionPlan) -> String {
    let canvas = plan.canvas;
    let duration = plan.duration.to_ffmpeg_timestamp();
    let bottom_eof = match plan.tail_fill {
        TailFill::Blank => "pass",
        TailFill::Hold => "repeat",
    };

    let mut graph = format!(
        "color=c=black:s={w}x{h}:r={fps}:d={duration}[canvas];",
        w = canvas.width,
        h = canvas.height,
        fps = plan.fps,
    );
    graph.push_str(&layer_chain(0, &plan.top, "top"));
    graph.push(';');
    graph.push_str(&layer_chain(1, &plan.bottom, "bottom"));
    graph.push(';');

    // The top layer spans the whole timeline; repeating covers a video stream
    // that ends a few milliseconds before the container does.
    graph.push_str(&format!(
        "[canvas][top]overlay=x={tx}:y={ty}:eof_action=repeat[stage];\
         [stage][bottom]overlay=x={bx}:y={by}:eof_action={bottom_eof},fps={fps},format={pix}[vout]",
        tx = plan.top.origin.0,
        ty = plan.top.origin.1,
        bx = plan.bottom.origin.0,
        by = plan.bottom.origin.1,
        fps = plan.fps,
        pix = pixel_format(plan),
    ));

    graph
}

/// Trim, upright and size one layer.
fn layer_chain(input_index: usize, layer: &LayerPlan, label: &str) -> String {
    let mut chain = format!(
        "[{input_index}:{stream}]trim=duration={dur},setpts=PTS-STARTPTS",
        stream = layer.stream_index,
        dur = layer.insert_duration.to_ffmpeg_timestamp(),
    );
    if let Some(filter) = layer.orientation.ffmpeg_filter() {
        chain.push(',');
        chain.push_str(filter);
    }
    chain.push_str(&format!(
        ",scale={w}:{h},setsar=1[{label}]",
        w = layer.oriented_size.width,
        h = layer.oriented_size.height,
    ));
    chain
}

/// 4:2:0 for even canvases, 4:4:4 when a dimension is odd.
pub fn pixel_format(plan: &CompositionPlan) -> &'static str {
    if plan.canvas.has_odd_dimension() {
        "yuv444p"
    } else {
        "yuv420p"
    }
}

fn codec_args(plan: &CompositionPlan) -> Vec<String> {
    let (preset, crf) = match plan.quality {
        QualityPreset::Highest => ("slow", 16),
        QualityPreset::Balanced => ("medium", 20),
        QualityPreset::Fast => ("veryfast", 23),
    };

    vec![
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        preset.to_string(),
        "-crf".to_string(),
        crf.to_string(),
        "-pix_fmt".to_string(),
        pixel_format(plan).to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
    ]
}

fn tail_chars(text: &str, max: usize) -> &str {
    let count = text.chars().count();
    if count <= max {
        return text;
    }
    let skip = count - max;
    match text.char_indices().nth(skip) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

#[derive(Debug, Default)]
struct ProgressState {
    out_time_secs: f64,
    frame: Option<u64>,
    complete: bool,
}

impl ProgressState {
    fn update(&mut self, key: &str, value: &str) {
        match key {
            // ffmpeg reports microseconds under both names.
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "frame" => {
                self.frame = value.parse().ok();
            }
            "progress" => {
                self.complete = value == "end";
            }
            _ => {}
        }
    }
}

fn progress_report(
    state: &ProgressState,
    total_frames: u64,
    expected_duration_secs: f64,
    elapsed_secs: f64,
) -> ComposeProgress {
    let progress = if expected_duration_secs <= 0.0 {
        0.0
    } else {
        (state.out_time_secs / expected_duration_secs).clamp(0.0, 1.0)
    };

    let frames_rendered = state
        .frame
        .unwrap_or_else(|| (progress * total_frames as f64).round() as u64)
        .min(total_frames);
    let eta_secs = if progress > 0.0 {
        (elapsed_secs / progress) - elapsed_secs
    } else {
        0.0
    }
    .max(0.0);

    ComposeProgress {
        progress: if state.complete { 1.0 } else { progress },
        frames_rendered,
        total_frames,
        eta_secs,
        stage: if state.complete {
            ComposeStage::Finalizing
        } else {
            ComposeStage::Rendering
        },
    }
}
