//! Frame capture for the line tuner.
//!
//! The capture loop only depends on [`FrameSource`]; the OpenCV camera is
//! compiled in with the `opencv` feature.

#[cfg(feature = "opencv")]
pub mod camera;
pub mod source;
pub mod types;

#[cfg(feature = "opencv")]
pub use camera::OpenCvCamera;
pub use source::{FrameSource, ScriptedSource};
pub use types::{BGR_CHANNELS, CaptureError, Frame, FrameFormat};
