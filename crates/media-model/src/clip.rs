//! Probed media clips.
//!
//! A clip is a reference to a decodable file plus what the container says
//! about it. Only the first video stream and the first audio stream matter
//! to the composer.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::geometry::{AffineTransform, Orientation, PixelSize};
use crate::time::MediaTime;

/// A recorded video resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaClip {
    /// Location of the media file.
    pub path: PathBuf,

    /// Container duration.
    pub duration: MediaTime,

    /// Primary (first) video stream.
    pub video: Option<VideoTrack>,

    /// Primary (first) audio stream.
    pub audio: Option<AudioTrack>,

    /// Container format name as reported by the demuxer (e.g. "mov,mp4,m4a").
    #[serde(default)]
    pub container: String,
}

/// A video stream with its display orientation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoTrack {
    /// Stream index within the container.
    pub stream_index: u32,

    /// Encoded (sensor) dimensions.
    pub natural_size: PixelSize,

    /// Orientation correction applied at display time.
    pub preferred_transform: AffineTransform,

    /// Codec short name.
    pub codec: String,

    /// Average frame rate, when the container reports one.
    pub frame_rate: Option<f64>,
}

/// An audio stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioTrack {
    /// Stream index within the container.
    pub stream_index: u32,

    /// Codec short name.
    pub codec: String,

    /// Channel count.
    pub channels: u32,

    /// Sample rate in Hz.
    pub sample_rate: Option<u32>,
}

impl MediaClip {
    /// Create a clip with no tracks.
    pub fn new(path: impl Into<PathBuf>, duration: MediaTime) -> Self {
        Self {
            path: path.into(),
            duration,
            video: None,
            audio: None,
            container: String::new(),
        }
    }

    pub fn with_video(mut self, video: VideoTrack) -> Self {
        self.video = Some(video);
        self
    }

    pub fn with_audio(mut self, audio: AudioTrack) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn primary_video(&self) -> Option<&VideoTrack> {
        self.video.as_ref()
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    /// File name for log output.
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

impl VideoTrack {
    pub fn new(stream_index: u32, natural_size: PixelSize) -> Self {
        Self {
            stream_index,
            natural_size,
            preferred_transform: AffineTransform::IDENTITY,
            codec: String::new(),
            frame_rate: None,
        }
    }

    pub fn with_transform(mut self, transform: AffineTransform) -> Self {
        self.preferred_transform = transform;
        self
    }

    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = codec.into();
        self
    }

    /// Natural size run through the preferred transform, absolute valued.
    pub fn oriented_size(&self) -> PixelSize {
        self.preferred_transform
            .apply_to_size(self.natural_size.as_size())
            .abs()
            .to_pixels()
    }

    pub fn orientation(&self) -> Orientation {
        self.preferred_transform.orientation()
    }
}

impl AudioTrack {
    pub fn new(stream_index: u32, codec: impl Into<String>, channels: u32) -> Self {
        Self {
            stream_index,
            codec: codec.into(),
            channels,
            sample_rate: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn portrait_clip() -> MediaClip {
        let natural = PixelSize::new(1920, 1080);
        MediaClip::new("/tmp/front_1.mov", MediaTime::from_secs(15))
            .with_video(
                VideoTrack::new(0, natural)
                    .with_transform(AffineTransform::rotation_clockwise(90, natural))
                    .with_codec("hevc"),
            )
            .with_audio(AudioTrack::new(1, "aac", 1))
    }

    #[test]
    fn test_oriented_size_of_portrait_recording() {
        let clip = portrait_clip();
        let video = clip.primary_video().unwrap();
        assert_eq!(video.oriented_size(), PixelSize::new(1080, 1920));
        assert_eq!(video.orientation(), Orientation::Rotate90);
    }

    #[test]
    fn test_clip_without_tracks() {
        let clip = MediaClip::new("/tmp/empty.mov", MediaTime::ZERO);
        assert!(clip.primary_video().is_none());
        assert!(!clip.has_audio());
    }

    #[test]
    fn test_display_name_uses_file_name() {
        assert_eq!(portrait_clip().display_name(), "front_1.mov");
    }

    #[test]
    fn test_clip_json_roundtrip() {
        let clip = portrait_clip();
        let json = serde_json::to_string(&clip).unwrap();
        let back: MediaClip = serde_json::from_str(&json).unwrap();
        assert_eq!(back, clip);
    }
}
