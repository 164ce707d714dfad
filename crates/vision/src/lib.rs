//! Live line detection with operator-tuned parameters.
//!
//! A capture thread feeds frames through a FIFO hand-off queue to a processing
//! thread that runs grayscale, threshold, edge and line extraction stages and
//! previews the result. The capture side publishes operator slider changes
//! into a lock-guarded [`SharedParameters`] record that the processing side
//! snapshots once per frame. Parameters persist across runs through
//! [`ConfigStore`].

pub mod detection;
#[cfg(feature = "opencv")]
pub mod highgui;
pub mod params;
pub mod pipeline;
pub mod shared;
pub mod store;
pub mod surface;

pub use detection::{DetectionBackend, LineSegment, software::SoftwareBackend};
pub use params::{HoughParams, ParameterSet, PipelineVariant, SliderPositions, ThresholdBand};
pub use pipeline::{
    Collaborators, RunReport,
    config::{PipelineOptions, RuntimeConfig},
    run,
    shutdown::{ShutdownSignal, StopReason},
};
pub use shared::SharedParameters;
pub use store::{ConfigError, ConfigStore};
pub use surface::{FixedInput, HeadlessPreview, ParameterInput, PreviewSurface};
