//! Composition planning: stacks the top clip above the bottom clip.
//!
//! The plan is a pure function of the two probed clips and the compose
//! settings. Nothing here touches the filesystem or spawns a process.

use std::path::PathBuf;

use duet_common::config::{ComposeSettings, QualityPreset, TailFill};
use duet_common::error::{ClipRole, CompositionError, CompositionResult};
use duet_media_model::{AffineTransform, MediaClip, MediaTime, Orientation, PixelSize};
use serde::Serialize;

/// Everything the renderer needs to produce the stacked output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositionPlan {
    /// Output canvas: widest layer by the sum of both layer heights.
    pub canvas: PixelSize,

    /// Timeline length. Always the top clip's duration.
    pub duration: MediaTime,

    /// Output frame rate.
    pub fps: u32,

    /// Frames in the output.
    pub total_frames: u64,

    /// Upper layer.
    pub top: LayerPlan,

    /// Lower layer.
    pub bottom: LayerPlan,

    /// Audio carried into the output (top clip only).
    pub audio: Option<AudioPlan>,

    /// Encoder quality.
    pub quality: QualityPreset,

    /// Bottom region fill once the bottom layer runs out.
    pub tail_fill: TailFill,
}

/// One positioned video layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerPlan {
    pub role: ClipRole,

    /// Source file.
    pub source: PathBuf,

    /// Video stream index inside `source`.
    pub stream_index: u32,

    /// Encoded frame size.
    pub natural_size: PixelSize,

    /// Frame size after orientation correction.
    pub oriented_size: PixelSize,

    /// Axis-aligned orientation used to put frames upright.
    pub orientation: Orientation,

    /// Full layer transform: native orientation, then placement.
    pub transform: AffineTransform,

    /// Top-left corner of the layer on the canvas.
    pub origin: (u32, u32),

    /// Timeline position the samples are inserted at.
    pub insert_at: MediaTime,

    /// Length of source inserted.
    pub insert_duration: MediaTime,
}

/// The audio stream copied to the output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioPlan {
    pub source: PathBuf,
    pub stream_index: u32,
    pub codec: String,
    pub insert_duration: MediaTime,
}

impl CompositionPlan {
    /// Build the plan for stacking `top` above `bottom`.
    pub fn build(
        top: &MediaClip,
        bottom: &MediaClip,
        settings: &ComposeSettings,
    ) -> CompositionResult<Self> {
        let top_video = top.primary_video().ok_or(CompositionError::MissingVideoTrack {
            role: ClipRole::Top,
        })?;
        let bottom_video = bottom
            .primary_video()
            .ok_or(CompositionError::MissingVideoTrack {
                role: ClipRole::Bottom,
            })?;

        if settings.fps == 0 {
            return Err(CompositionError::track_allocation(
                "Output frame rate must be positive",
            ));
        }

        let duration = top.duration;
        if !duration.is_positive() {
            return Err(CompositionError::track_allocation(format!(
                "Timeline duration resolved to {duration} (top clip {})",
                top.display_name()
            )));
        }

        let top_size = top_video.oriented_size();
        let bottom_size = bottom_video.oriented_size();
        for (role, size) in [(ClipRole::Top, top_size), (ClipRole::Bottom, bottom_size)] {
            if size.is_empty() {
                return Err(CompositionError::track_allocation(format!(
                    "The {role} video track has an empty frame size ({size})"
                )));
            }
        }

        let canvas = stacked_canvas(top_size, bottom_size).ok_or_else(|| {
            CompositionError::track_allocation(format!(
                "Stacked canvas {top_size} over {bottom_size} is too large"
            ))
        })?;

        let bottom_insert = bottom.duration.min(duration);
        if !bottom_insert.is_positive() {
            return Err(CompositionError::sample_insertion(format!(
                "The bottom clip {} has no samples to insert",
                bottom.display_name()
            )));
        }

        let top_layer = LayerPlan {
            role: ClipRole::Top,
            source: top.path.clone(),
            stream_index: top_video.stream_index,
            natural_size: top_video.natural_size,
            oriented_size: top_size,
            orientation: top_video.orientation(),
            transform: top_video.preferred_transform,
            origin: (0, 0),
            insert_at: MediaTime::ZERO,
            insert_duration: duration,
        };

        let bottom_layer = LayerPlan {
            role: ClipRole::Bottom,
            source: bottom.path.clone(),
            stream_index: bottom_video.stream_index,
            natural_size: bottom_video.natural_size,
            oriented_size: bottom_size,
            orientation: bottom_video.orientation(),
            transform: bottom_video
                .preferred_transform
                .translated_by(0.0, top_size.height as f64),
            origin: (0, top_size.height),
            insert_at: MediaTime::ZERO,
            insert_duration: bottom_insert,
        };

        // Only the top clip's audio is ever carried.
        let audio = top.audio.as_ref().map(|track| AudioPlan {
            source: top.path.clone(),
            stream_index: track.stream_index,
            codec: track.codec.clone(),
            insert_duration: duration,
        });

        Ok(Self {
            canvas,
            duration,
            fps: settings.fps,
            total_frames: duration.frame_count(settings.fps),
            top: top_layer,
            bottom: bottom_layer,
            audio,
            quality: settings.quality,
            tail_fill: settings.tail_fill,
        })
    }

    /// Whether the bottom layer ends before the timeline does.
    pub fn bottom_is_short(&self) -> bool {
        self.bottom.insert_duration < self.duration
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }
}

/// `max(widths)` by `sum(heights)`, or `None` if it does not fit in `u32`.
pub fn stacked_canvas(top: PixelSize, bottom: PixelSize) -> Option<PixelSize> {
    let height = top.height.checked_add(bottom.height)?;
    Some(PixelSize::new(top.width.max(bottom.width), height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_media_model::{AudioTrack, VideoTrack};
    use proptest::prelude::*;

    fn clip(name: &str, secs: i64, natural: PixelSize, rotate: i32, audio: bool) -> MediaClip {
        let video = VideoTrack::new(0, natural)
            .with_transform(AffineTransform::rotation_clockwise(rotate, natural));
        let clip = MediaClip::new(format!("/captures/{name}.mov"), MediaTime::from_secs(secs))
            .with_video(video);
        if audio {
            clip.with_audio(AudioTrack::new(1, "aac", 1))
        } else {
            clip
        }
    }

    fn portrait(name: &str, secs: i64, audio: bool) -> MediaClip {
        clip(name, secs, PixelSize::new(1920, 1080), 90, audio)
    }

    #[test]
    fn test_two_portrait_clips_stack_to_double_height() {
        let plan = CompositionPlan::build(
            &portrait("front", 15, true),
            &portrait("back", 15, false),
            &ComposeSettings::default(),
        )
        .unwrap();

        assert_eq!(plan.canvas, PixelSize::new(1080, 3840));
        assert_eq!(plan.duration, MediaTime::from_secs(15));
        assert_eq!(plan.total_frames, 450);
        assert_eq!(plan.fps, 30);
        assert!(plan.has_audio());
        assert_eq!(plan.bottom.origin, (0, 1920));
        assert!(!plan.bottom_is_short());
    }

    #[test]
    fn test_short_bottom_keeps_top_duration() {
        let plan = CompositionPlan::build(
            &portrait("front", 15, true),
            &portrait("back", 5, false),
            &ComposeSettings::default(),
        )
        .unwrap();

        assert_eq!(plan.duration, MediaTime::from_secs(15));
        assert_eq!(plan.bottom.insert_duration, MediaTime::from_secs(5));
        assert!(plan.bottom_is_short());
    }

    #[test]
    fn test_long_bottom_is_truncated() {
        let plan = CompositionPlan::build(
            &portrait("front", 5, false),
            &portrait("back", 15, true),
            &ComposeSettings::default(),
        )
        .unwrap();

        assert_eq!(plan.duration, MediaTime::from_secs(5));
        assert_eq!(plan.bottom.insert_duration, MediaTime::from_secs(5));
        // Bottom audio is never carried.
        assert!(plan.audio.is_none());
    }

    #[test]
    fn test_missing_video_track_names_the_clip() {
        let no_video = MediaClip::new("/captures/audio_only.m4a", MediaTime::from_secs(15))
            .with_audio(AudioTrack::new(0, "aac", 2));
        let settings = ComposeSettings::default();

        let err = CompositionPlan::build(&no_video, &portrait("back", 15, false), &settings)
            .unwrap_err();
        assert_eq!(
            err,
            CompositionError::MissingVideoTrack {
                role: ClipRole::Top
            }
        );

        let err = CompositionPlan::build(&portrait("front", 15, false), &no_video, &settings)
            .unwrap_err();
        assert_eq!(
            err,
            CompositionError::MissingVideoTrack {
                role: ClipRole::Bottom
            }
        );
    }

    #[test]
    fn test_bottom_transform_is_native_then_offset() {
        let plan = CompositionPlan::build(
            &portrait("front", 15, false),
            &portrait("back", 15, false),
            &ComposeSettings::default(),
        )
        .unwrap();

        assert_eq!(plan.top.transform, AffineTransform::rotation_clockwise(90, PixelSize::new(1920, 1080)));
        let (x, y) = plan.bottom.transform.apply_to_point(0.0, 0.0);
        assert!((x - 1080.0).abs() < 1e-9);
        assert!((y - 1920.0).abs() < 1e-9);
    }

    #[test]
    fn test_mixed_orientations_use_widest_layer() {
        let landscape = clip("back", 10, PixelSize::new(1920, 1080), 0, false);
        let plan = CompositionPlan::build(
            &portrait("front", 10, false),
            &landscape,
            &ComposeSettings::default(),
        )
        .unwrap();

        assert_eq!(plan.canvas, PixelSize::new(1920, 1920 + 1080));
        assert_eq!(plan.top.orientation, Orientation::Rotate90);
        assert_eq!(plan.bottom.orientation, Orientation::Rotate0);
    }

    #[test]
    fn test_zero_length_top_cannot_allocate_timeline() {
        let err = CompositionPlan::build(
            &portrait("front", 0, false),
            &portrait("back", 15, false),
            &ComposeSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CompositionError::TrackAllocationFailed { .. }));
    }

    #[test]
    fn test_empty_bottom_has_nothing_to_insert() {
        let err = CompositionPlan::build(
            &portrait("front", 15, false),
            &portrait("back", 0, false),
            &ComposeSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CompositionError::SampleInsertionFailed { .. }));
    }

    #[test]
    fn test_canvas_overflow_is_rejected() {
        assert!(stacked_canvas(PixelSize::new(2, u32::MAX), PixelSize::new(2, 2)).is_none());
    }

    proptest! {
        #[test]
        fn prop_canvas_and_timeline_invariants(
            tw in 2u32..4096, th in 2u32..4096, tr in 0i32..4, ts in 1i64..600,
            bw in 2u32..4096, bh in 2u32..4096, br in 0i32..4, bs in 1i64..600,
        ) {
            let top = clip("top", ts, PixelSize::new(tw, th), tr * 90, true);
            let bottom = clip("bottom", bs, PixelSize::new(bw, bh), br * 90, true);
            let plan = CompositionPlan::build(&top, &bottom, &ComposeSettings::default()).unwrap();

            let top_size = top.primary_video().unwrap().oriented_size();
            let bottom_size = bottom.primary_video().unwrap().oriented_size();

            prop_assert_eq!(plan.canvas.width, top_size.width.max(bottom_size.width));
            prop_assert_eq!(plan.canvas.height, top_size.height + bottom_size.height);
            prop_assert!(plan.canvas.width >= top_size.width);
            prop_assert!(plan.canvas.width >= bottom_size.width);
            prop_assert_eq!(plan.duration, top.duration);
            prop_assert!(plan.bottom.insert_duration <= plan.duration);
            prop_assert_eq!(plan.bottom.origin.1, top_size.height);
            prop_assert_eq!(
                plan.audio.as_ref().map(|a| a.source.clone()),
                Some(top.path.clone())
            );
        }
    }
}
