//! Capability detection for the external media tools.

use std::process::{Command, Stdio};

use duet_common::config::ComposeSettings;
use serde::Serialize;

/// An external capability the composer may need.
#[derive(Debug, Clone, Serialize)]
pub struct Capability {
    pub name: String,
    pub description: String,
    pub available: bool,
    pub required: bool,
    pub fix_instructions: Option<String>,
}

/// Check all capabilities and report status.
pub fn check_capabilities(settings: &ComposeSettings) -> Vec<Capability> {
    let ffmpeg_ok = binary_available(&settings.ffmpeg_bin);
    let mut capabilities = vec![
        check_binary(
            &settings.ffmpeg_bin,
            "ffmpeg",
            "Renders and muxes the stacked output",
        ),
        check_binary(
            &settings.ffprobe_bin,
            "ffprobe",
            "Reads clip durations, tracks, and orientation",
        ),
    ];

    let encoders = if ffmpeg_ok {
        ffmpeg_listing(&settings.ffmpeg_bin, "-encoders")
    } else {
        None
    };
    capabilities.push(component_capability(
        "H.264 Encoder (libx264)",
        "Video encoder used for every quality preset",
        encoders.as_deref().map(|l| listing_contains(l, "libx264")),
        "Install an ffmpeg build with --enable-libx264 (most distribution packages have it)",
    ));

    let muxers = if ffmpeg_ok {
        ffmpeg_listing(&settings.ffmpeg_bin, "-muxers")
    } else {
        None
    };
    capabilities.push(component_capability(
        "QuickTime Muxer (mov)",
        "Container written at the destination",
        muxers.as_deref().map(|l| listing_contains(l, "mov")),
        "Install a complete ffmpeg build; the mov muxer is part of every default build",
    ));

    capabilities
}

/// Whether `binary -version` can be executed.
pub fn binary_available(binary: &str) -> bool {
    Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn check_binary(binary: &str, tool: &str, description: &str) -> Capability {
    let available = binary_available(binary);
    Capability {
        name: format!("{tool} ({binary})"),
        description: description.to_string(),
        available,
        required: true,
        fix_instructions: if available {
            None
        } else {
            Some(format!(
                "Install {tool} (e.g. sudo apt install ffmpeg) or set compose.{tool}_bin in the config"
            ))
        },
    }
}

fn component_capability(
    name: &str,
    description: &str,
    found: Option<bool>,
    fix: &str,
) -> Capability {
    let available = found.unwrap_or(false);
    Capability {
        name: name.to_string(),
        description: description.to_string(),
        available,
        required: true,
        fix_instructions: if available {
            None
        } else {
            Some(fix.to_string())
        },
    }
}

fn ffmpeg_listing(binary: &str, flag: &str) -> Option<String> {
    let output = Command::new(binary)
        .args(["-hide_banner", flag])
        .stdin(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Whether an `ffmpeg -encoders`/`-muxers` listing names a component.
///
/// Listing rows look like ` V....D libx264  ...` or `  E mov  QuickTime / MOV`;
/// the component name is the second whitespace-separated column.
fn listing_contains(listing: &str, component: &str) -> bool {
    listing.lines().any(|line| {
        let mut columns = line.split_whitespace();
        let _flags = columns.next();
        columns
            .next()
            .map(|name| name.split(',').any(|n| n == component))
            .unwrap_or(false)
    })
}

/// Print a user-friendly capability report.
pub fn print_capability_report(capabilities: &[Capability]) {
    println!("Duet Composer Capabilities:");
    println!("{}", "-".repeat(60));

    for cap in capabilities {
        let status = if cap.available {
            "[OK]"
        } else if cap.required {
            "[MISSING - REQUIRED]"
        } else {
            "[MISSING - OPTIONAL]"
        };

        println!("  {} {}: {}", status, cap.name, cap.description);

        if let Some(ref fix) = cap.fix_instructions {
            println!("    Fix: {fix}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENCODERS: &str = "Encoders:\n V..... = Video\n ------\n V....D libx264              libx264 H.264 / AVC\n A....D aac                  AAC (Advanced Audio Coding)\n";
    const MUXERS: &str = "File formats:\n D. = Demuxing supported\n --\n  E mov             QuickTime / MOV\n  E mp4             MP4 (MPEG-4 Part 14)\n";

    #[test]
    fn test_listing_finds_components() {
        assert!(listing_contains(ENCODERS, "libx264"));
        assert!(listing_contains(ENCODERS, "aac"));
        assert!(!listing_contains(ENCODERS, "libx265"));
        assert!(listing_contains(MUXERS, "mov"));
        assert!(!listing_contains(MUXERS, "webm"));
    }

    #[test]
    fn test_missing_tools_are_reported_required() {
        let settings = ComposeSettings {
            ffmpeg_bin: "duet-no-such-ffmpeg".to_string(),
            ffprobe_bin: "duet-no-such-ffprobe".to_string(),
            ..ComposeSettings::default()
        };

        let caps = check_capabilities(&settings);
        assert_eq!(caps.len(), 4);
        assert!(caps.iter().all(|c| c.required && !c.available));
        assert!(caps.iter().all(|c| c.fix_instructions.is_some()));
    }
}
