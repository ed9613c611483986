//! Print the composition plan without rendering.

use std::path::PathBuf;

use duet_common::config::ComposeSettings;
use duet_compose_engine::Composer;

pub fn run(settings: ComposeSettings, top: PathBuf, bottom: PathBuf) -> anyhow::Result<()> {
    let plan = Composer::ffmpeg(settings)
        .plan(&top, &bottom)
        .map_err(|e| anyhow::anyhow!("Failed to plan composition: {e}"))?;

    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}
