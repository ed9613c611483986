//! Render the stacked movie.

use std::path::PathBuf;

use duet_common::config::{ComposeSettings, QualityPreset, TailFill};
use duet_compose_engine::{ComposeProgress, ComposeRequest, ComposeStage, Composer, ProgressCallback};

/// Command-line overrides of the configured compose settings.
pub struct Overrides {
    pub fps: Option<u32>,
    pub quality: Option<String>,
    pub tail_fill: Option<String>,
    pub verify: bool,
}

impl Overrides {
    fn apply(self, mut settings: ComposeSettings) -> anyhow::Result<ComposeSettings> {
        if let Some(fps) = self.fps {
            settings.fps = fps;
        }
        if let Some(quality) = self.quality {
            settings.quality = quality.parse::<QualityPreset>()?;
        }
        if let Some(tail_fill) = self.tail_fill {
            settings.tail_fill = tail_fill.parse::<TailFill>()?;
        }
        settings.verify_output |= self.verify;
        settings.validate()?;
        Ok(settings)
    }
}

/// `<temp dir>/duet-<timestamp>.mov`
fn default_output() -> PathBuf {
    std::env::temp_dir().join(format!(
        "duet-{}.mov",
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    ))
}

pub async fn run(
    settings: ComposeSettings,
    top: PathBuf,
    bottom: PathBuf,
    output: Option<PathBuf>,
    overrides: Overrides,
) -> anyhow::Result<()> {
    let settings = overrides.apply(settings)?;
    let output_path = output.unwrap_or_else(default_output);

    println!("Composing:");
    println!("  Top:    {}", top.display());
    println!("  Bottom: {}", bottom.display());
    println!("  Output: {}", output_path.display());
    println!(
        "  Quality: {} @ {}fps (tail fill: {})",
        settings.quality.as_str(),
        settings.fps,
        settings.tail_fill.as_str()
    );

    let progress_cb: ProgressCallback = Box::new(|p: ComposeProgress| match p.stage {
        ComposeStage::Rendering => print!(
            "\r  Progress: {:.1}% ({}/{} frames, ETA: {:.0}s)  ",
            p.progress * 100.0,
            p.frames_rendered,
            p.total_frames,
            p.eta_secs,
        ),
        ComposeStage::Probing => println!("  Reading clips..."),
        _ => {}
    });

    let composer = Composer::ffmpeg(settings);
    let request = ComposeRequest::new(top, bottom, output_path);

    match composer.compose(request, Some(progress_cb)).await {
        Ok(rendered) => {
            println!("\nComposition complete: {}", rendered.path.display());
            println!(
                "  Canvas: {}  Duration: {}  Audio: {}  ({:.1}s)",
                rendered.canvas,
                rendered.duration,
                if rendered.has_audio { "yes" } else { "no" },
                rendered.elapsed_secs
            );
            if let Some(report) = rendered.verification {
                if report.is_ok() {
                    println!("  Verification: OK");
                } else {
                    println!("  Verification: {} warning(s)", report.findings.len());
                    for finding in &report.findings {
                        println!("    - {finding}");
                    }
                }
            }
            Ok(())
        }
        Err(e) => {
            println!("\nComposition failed: {e}");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_config_values() {
        let overrides = Overrides {
            fps: Some(60),
            quality: Some("fast".to_string()),
            tail_fill: Some("hold".to_string()),
            verify: true,
        };
        let settings = overrides.apply(ComposeSettings::default()).unwrap();
        assert_eq!(settings.fps, 60);
        assert_eq!(settings.quality, QualityPreset::Fast);
        assert_eq!(settings.tail_fill, TailFill::Hold);
        assert!(settings.verify_output);
    }

    #[test]
    fn test_unknown_quality_is_rejected() {
        let overrides = Overrides {
            fps: None,
            quality: Some("ultra".to_string()),
            tail_fill: None,
            verify: false,
        };
        assert!(overrides.apply(ComposeSettings::default()).is_err());
    }

    #[test]
    fn test_out_of_range_fps_is_rejected() {
        for fps in [0, 241, 100_000] {
            let overrides = Overrides {
                fps: Some(fps),
                quality: None,
                tail_fill: None,
                verify: false,
            };
            let err = overrides.apply(ComposeSettings::default()).unwrap_err();
            assert!(err.to_string().contains("fps"), "{err}");
        }
    }

    #[test]
    fn test_default_output_is_a_mov_in_temp() {
        let path = default_output();
        assert!(path.starts_with(std::env::temp_dir()));
        assert_eq!(path.extension().unwrap(), "mov");
    }
}
