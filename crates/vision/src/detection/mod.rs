//! Pixel-level detection stages, kept behind [`DetectionBackend`].
//!
//! The processing loop always runs the same sequence: grayscale, threshold
//! mask, edges, line segments, overlay. Backends choose their own buffer types
//! so OpenCV keeps `Mat`s end to end while the software backend uses plain
//! byte images.

use std::fmt;

use anyhow::Result;
use video_ingest::Frame;

use crate::params::{HoughParams, ThresholdBand};

#[cfg(feature = "opencv")]
pub mod opencv_backend;
pub mod software;

/// Lower hysteresis threshold of the edge stage; independent of the parameter set.
pub const CANNY_LOW_THRESHOLD: f64 = 50.0;
/// Upper hysteresis threshold of the edge stage.
pub const CANNY_HIGH_THRESHOLD: f64 = 150.0;
pub const CANNY_APERTURE: i32 = 3;
/// Overlay colour in BGR order.
pub const OVERLAY_BGR: [u8; 3] = [0, 255, 0];
pub const OVERLAY_THICKNESS: i32 = 2;

/// A detected straight segment in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LineSegment {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl LineSegment {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn length(&self) -> f64 {
        f64::from(self.x2 - self.x1).hypot(f64::from(self.y2 - self.y1))
    }
}

impl fmt::Display for LineSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})-({},{})", self.x1, self.y1, self.x2, self.y2)
    }
}

/// The external image algorithms used by the processing loop.
///
/// An inverted [`ThresholdBand`] must produce an empty mask.
pub trait DetectionBackend: Send {
    type Gray;
    type Mask;
    type Edges;

    /// Single-channel grayscale conversion of a BGR frame.
    fn grayscale(&mut self, frame: &Frame) -> Result<Self::Gray>;

    /// Binary mask of samples inside `band` (inclusive).
    fn threshold(&mut self, gray: &Self::Gray, band: ThresholdBand) -> Result<Self::Mask>;

    /// Edge map of the mask using the fixed Canny thresholds.
    fn edges(&mut self, mask: &Self::Mask) -> Result<Self::Edges>;

    /// Straight segments in the edge map. An empty list is a normal result.
    fn segments(&mut self, edges: &Self::Edges, hough: &HoughParams) -> Result<Vec<LineSegment>>;

    /// Draw `segments` onto the original colour frame.
    fn draw_overlay(&mut self, frame: &mut Frame, segments: &[LineSegment]) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_length_is_euclidean() {
        assert_eq!(LineSegment::new(0, 0, 3, 4).length(), 5.0);
        assert_eq!(LineSegment::new(2, 2, 2, 2).length(), 0.0);
        assert_eq!(LineSegment::new(1, 2, 3, 4).to_string(), "(1,2)-(3,4)");
    }
}
