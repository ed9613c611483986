//! Duet Media Model
//!
//! Defines the data contracts consumed by the composer:
//! - **Time:** Rational media timestamps and durations
//! - **Geometry:** Pixel sizes, affine orientation transforms, and the
//!   eight axis-aligned orientations a camera can record in
//! - **Clips:** A probed media file with its primary video track and
//!   optional audio track
//!
//! Clips are immutable once probed and are only ever read by the composer.

pub mod clip;
pub mod geometry;
pub mod time;

pub use clip::*;
pub use geometry::*;
pub use time::*;
