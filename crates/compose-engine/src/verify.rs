//! Post-render verification of the composed file against its plan.

use std::path::{Path, PathBuf};

use duet_common::error::DuetResult;
use duet_media_model::{MediaClip, PixelSize};
use serde::Serialize;

use crate::plan::CompositionPlan;
use crate::probe::MediaProbe;

/// Overall verification outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Ok,
    Warn,
}

/// What was expected versus what the rendered file contains.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub output: PathBuf,
    pub status: VerificationStatus,
    pub findings: Vec<String>,
    pub expected_canvas: PixelSize,
    pub actual_canvas: Option<PixelSize>,
    pub expected_duration_secs: f64,
    pub actual_duration_secs: Option<f64>,
    pub audio_expected: bool,
    pub audio_present: Option<bool>,
    pub verified_at: String,
}

impl VerificationReport {
    pub fn is_ok(&self) -> bool {
        self.status == VerificationStatus::Ok
    }

    /// Sidecar location for a rendered file: `merged.mov` -> `merged.mov.verification.json`.
    pub fn sidecar_path(output: &Path) -> PathBuf {
        let mut name = output.as_os_str().to_owned();
        name.push(".verification.json");
        PathBuf::from(name)
    }

    /// Write the report as pretty JSON next to the output.
    pub fn write_sidecar(&self) -> DuetResult<PathBuf> {
        let path = Self::sidecar_path(&self.output);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }
}

/// Probe `output` and compare it with `plan`.
///
/// A probe failure is itself a finding; this never fails the composition.
pub fn verify_output(probe: &dyn MediaProbe, plan: &CompositionPlan, output: &Path) -> VerificationReport {
    match probe.probe(output) {
        Ok(clip) => compare(plan, output, &clip),
        Err(e) => VerificationReport {
            output: output.to_path_buf(),
            status: VerificationStatus::Warn,
            findings: vec![format!("Rendered file could not be probed: {e}")],
            expected_canvas: plan.canvas,
            actual_canvas: None,
            expected_duration_secs: plan.duration.as_secs_f64(),
            actual_duration_secs: None,
            audio_expected: plan.has_audio(),
            audio_present: None,
            verified_at: chrono::Utc::now().to_rfc3339(),
        },
    }
}

/// Compare an already-probed output clip with the plan.
pub fn compare(plan: &CompositionPlan, output: &Path, clip: &MediaClip) -> VerificationReport {
    let mut findings = Vec::new();

    let actual_canvas = clip.primary_video().map(|v| v.oriented_size());
    match actual_canvas {
        Some(canvas) if canvas != plan.canvas => findings.push(format!(
            "Canvas is {canvas}, expected {}",
            plan.canvas
        )),
        None => findings.push("Rendered file has no video track".to_string()),
        _ => {}
    }

    let tolerance = 1.0 / plan.fps.max(1) as f64 + 1e-3;
    let drift = clip.duration.abs_diff_secs(plan.duration);
    if drift > tolerance {
        findings.push(format!(
            "Duration is {}, expected {} (off by {drift:.3}s)",
            clip.duration, plan.duration
        ));
    }

    let audio_present = clip.has_audio();
    if audio_present != plan.has_audio() {
        findings.push(if plan.has_audio() {
            "Top clip audio is missing from the output".to_string()
        } else {
            "Output carries audio although the top clip had none".to_string()
        });
    }

    VerificationReport {
        output: output.to_path_buf(),
        status: if findings.is_empty() {
            VerificationStatus::Ok
        } else {
            VerificationStatus::Warn
        },
        findings,
        expected_canvas: plan.canvas,
        actual_canvas,
        expected_duration_secs: plan.duration.as_secs_f64(),
        actual_duration_secs: Some(clip.duration.as_secs_f64()),
        audio_expected: plan.has_audio(),
        audio_present: Some(audio_present),
        verified_at: chrono::Utc::now().to_rfc3339(),
    }
}
