//! Clip probing via ffprobe.

use std::collections::HashMap;
use std::path::Path;
use std::process::Command;

use duet_common::error::{DuetError, DuetResult};
use duet_media_model::{AffineTransform, AudioTrack, MediaClip, MediaTime, PixelSize, VideoTrack};
use serde::Deserialize;

/// Something that can turn a media file into a [`MediaClip`].
pub trait MediaProbe: Send + Sync {
    fn probe(&self, path: &Path) -> DuetResult<MediaClip>;
}

/// [`MediaProbe`] backed by the `ffprobe` executable.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    binary: String,
}

impl FfprobeProbe {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl MediaProbe for FfprobeProbe {
    fn probe(&self, path: &Path) -> DuetResult<MediaClip> {
        if !path.exists() {
            return Err(DuetError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let output = Command::new(&self.binary)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output()
            .map_err(|e| DuetError::probe(format!("Failed to start {}: {e}", self.binary)))?;

        if !output.status.success() {
            return Err(DuetError::probe(format!(
                "{} failed on {} (status {}): {}",
                self.binary,
                path.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let raw = String::from_utf8(output.stdout)
            .map_err(|e| DuetError::probe(format!("ffprobe output is not UTF-8: {e}")))?;
        let clip = parse_probe_output(path, &raw)?;

        tracing::debug!(
            path = %path.display(),
            duration = %clip.duration,
            has_video = clip.video.is_some(),
            has_audio = clip.audio.is_some(),
            "Probed clip"
        );
        Ok(clip)
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    format_name: String,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    index: u32,
    codec_type: Option<String>,
    #[serde(default)]
    codec_name: String,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
    channels: Option<u32>,
    sample_rate: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
    disposition: Option<ProbeDisposition>,
}

#[derive(Debug, Deserialize)]
struct ProbeDisposition {
    #[serde(default)]
    attached_pic: u8,
}

#[derive(Debug, Deserialize)]
struct ProbeSideData {
    #[serde(default)]
    side_data_type: String,
    rotation: Option<f64>,
}

impl ProbeStream {
    fn is(&self, kind: &str) -> bool {
        self.codec_type.as_deref() == Some(kind)
    }

    /// Cover art and thumbnails are stored as single-picture video streams.
    fn is_attached_picture(&self) -> bool {
        self.disposition
            .as_ref()
            .map(|d| d.attached_pic == 1)
            .unwrap_or(false)
    }

    /// Clockwise display rotation in degrees.
    ///
    /// The display matrix reports counter-clockwise degrees; the legacy
    /// `rotate` tag reports clockwise degrees.
    fn clockwise_rotation(&self) -> i32 {
        if let Some(rotation) = self
            .side_data_list
            .iter()
            .filter(|sd| sd.side_data_type.eq_ignore_ascii_case("Display Matrix"))
            .find_map(|sd| sd.rotation)
        {
            return (-rotation).round() as i32;
        }

        self.tags
            .get("rotate")
            .and_then(|v| v.trim().parse::<f64>().ok())
            .map(|v| v.round() as i32)
            .unwrap_or(0)
    }
}

/// Build a [`MediaClip`] from `ffprobe -print_format json` output.
pub fn parse_probe_output(path: &Path, raw: &str) -> DuetResult<MediaClip> {
    let parsed: ProbeOutput = serde_json::from_str(raw)
        .map_err(|e| DuetError::probe(format!("Unparsable ffprobe output: {e}")))?;

    let video = parsed
        .streams
        .iter()
        .find(|s| {
            s.is("video") && !s.is_attached_picture() && s.width.is_some() && s.height.is_some()
        })
        .map(|s| {
            let natural = PixelSize::new(s.width.unwrap_or(0), s.height.unwrap_or(0));
            VideoTrack {
                stream_index: s.index,
                natural_size: natural,
                preferred_transform: AffineTransform::rotation_clockwise(
                    s.clockwise_rotation(),
                    natural,
                ),
                codec: s.codec_name.clone(),
                frame_rate: s.avg_frame_rate.as_deref().and_then(parse_frame_rate),
            }
        });

    let audio = parsed.streams.iter().find(|s| s.is("audio")).map(|s| AudioTrack {
        stream_index: s.index,
        codec: s.codec_name.clone(),
        channels: s.channels.unwrap_or(0),
        sample_rate: s.sample_rate.as_deref().and_then(|v| v.parse().ok()),
    });

    let format_duration = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse::<MediaTime>().ok());
    let duration = match format_duration {
        Some(duration) => duration,
        None => parsed
            .streams
            .iter()
            .filter_map(|s| s.duration.as_deref())
            .filter_map(|d| d.parse::<MediaTime>().ok())
            .max()
            .ok_or_else(|| {
                DuetError::probe(format!("No duration reported for {}", path.display()))
            })?,
    };

    Ok(MediaClip {
        path: path.to_path_buf(),
        duration,
        video,
        audio,
        container: parsed.format.map(|f| f.format_name).unwrap_or_default(),
    })
}

/// Parse an ffprobe rational such as `"30000/1001"`.
fn parse_frame_rate(raw: &str) -> Option<f64> {
    let (num, den) = raw.split_once('/').unwrap_or((raw, "1"));
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    if num <= 0.0 || den <= 0.0 {
        return None;
    }
    Some(num / den)
}
