//! Check system capabilities.

use duet_common::config::ComposeSettings;
use duet_compose_engine::capabilities::{check_capabilities, print_capability_report};

pub fn run(settings: ComposeSettings) -> anyhow::Result<()> {
    println!("Duet System Check");
    println!("{}", "=".repeat(50));
    println!("  ffmpeg:  {}", settings.ffmpeg_bin);
    println!("  ffprobe: {}", settings.ffprobe_bin);
    println!();

    let capabilities = check_capabilities(&settings);
    print_capability_report(&capabilities);

    let all_required_ok = capabilities
        .iter()
        .filter(|c| c.required)
        .all(|c| c.available);

    println!();
    if all_required_ok {
        println!("All required capabilities are available. Duet is ready.");
    } else {
        println!("Some required capabilities are missing. See above for fixes.");
    }

    Ok(())
}
