//! OpenCV-backed camera capture.

use chrono::Utc;
use opencv::{
    core::MatTraitConstManual,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst},
};
use tracing::{debug, warn};

use crate::{
    source::FrameSource,
    types::{CaptureError, Frame, FrameFormat},
};

/// Camera opened by device index, read synchronously by the capture loop.
pub struct OpenCvCamera {
    cap: VideoCapture,
    device_index: i32,
    scratch: Mat,
}

impl OpenCvCamera {
    /// Open the camera at `device_index`.
    ///
    /// Failing to open is a startup error; the caller reports it and exits before
    /// any pipeline thread is started.
    pub fn open(device_index: i32) -> Result<Self, CaptureError> {
        let cap = open_video_capture(device_index)?;
        Ok(Self {
            cap,
            device_index,
            scratch: Mat::default(),
        })
    }

    pub fn device_index(&self) -> i32 {
        self.device_index
    }
}

impl FrameSource for OpenCvCamera {
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        let grabbed = self
            .cap
            .read(&mut self.scratch)
            .map_err(|e| CaptureError::Other(e.into()))?;
        if !grabbed || self.scratch.empty() {
            return Err(CaptureError::EndOfStream);
        }

        let width = self.scratch.cols();
        let height = self.scratch.rows();
        let data = if self.scratch.is_continuous() {
            self.scratch
                .data_bytes()
                .map_err(|e| CaptureError::Other(e.into()))?
                .to_vec()
        } else {
            let owned = self
                .scratch
                .try_clone()
                .map_err(|e| CaptureError::Other(e.into()))?;
            owned
                .data_bytes()
                .map_err(|e| CaptureError::Other(e.into()))?
                .to_vec()
        };

        let frame = Frame {
            data,
            width,
            height,
            timestamp_ms: Utc::now().timestamp_millis(),
            format: FrameFormat::Bgr8,
        };
        if frame.data.len() != (width as usize) * (height as usize) * 3 {
            return Err(CaptureError::Geometry {
                width,
                height,
                len: frame.data.len(),
            });
        }
        Ok(frame)
    }

    fn release(&mut self) {
        if let Err(err) = self.cap.release() {
            warn!("failed to release camera #{}: {err}", self.device_index);
        } else {
            debug!("released camera #{}", self.device_index);
        }
    }

    fn describe(&self) -> String {
        format!("camera #{}", self.device_index)
    }
}

/// Attempt to open a camera by index, preferring V4L before the generic backend.
fn open_video_capture(index: i32) -> Result<VideoCapture, CaptureError> {
    for backend in [videoio::CAP_V4L, videoio::CAP_ANY] {
        match VideoCapture::new(index, backend) {
            Ok(cap) => {
                if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                    return Ok(cap);
                }
            }
            Err(err) => {
                warn!("failed to open device #{index} with backend {backend}: {err}");
            }
        }
    }

    Err(CaptureError::Open {
        uri: format!("/dev/video{index}"),
    })
}
