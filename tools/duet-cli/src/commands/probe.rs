//! Show clip information.

use std::path::PathBuf;

use duet_common::config::ComposeSettings;
use duet_compose_engine::{FfprobeProbe, MediaProbe};

pub fn run(settings: ComposeSettings, path: PathBuf, json: bool) -> anyhow::Result<()> {
    let clip = FfprobeProbe::new(settings.ffprobe_bin)
        .probe(&path)
        .map_err(|e| anyhow::anyhow!("Failed to probe clip: {e}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&clip)?);
        return Ok(());
    }

    println!("Clip: {}", clip.display_name());
    println!("  Path: {}", clip.path.display());
    println!("  Container: {}", clip.container);
    println!("  Duration: {}", clip.duration);
    println!();

    println!("Tracks:");
    match clip.primary_video() {
        Some(v) => {
            println!(
                "  Video: stream {} {} ({}, {} upright)",
                v.stream_index,
                v.codec,
                v.natural_size,
                v.oriented_size()
            );
            println!("    Orientation: {}", v.orientation().as_str());
            if let Some(fps) = v.frame_rate {
                println!("    Frame rate: {fps:.2}fps");
            }
        }
        None => println!("  Video: none (cannot be composed)"),
    }
    match &clip.audio {
        Some(a) => println!(
            "  Audio: stream {} {} ({} ch{})",
            a.stream_index,
            a.codec,
            a.channels,
            a.sample_rate
                .map(|hz| format!(", {hz} Hz"))
                .unwrap_or_default()
        ),
        None => println!("  Audio: none"),
    }

    Ok(())
}
