//! Camera collaborator interface and an in-memory scripted source.

use std::collections::VecDeque;

use crate::types::{CaptureError, Frame};

/// A synchronous frame producer owned by the capture thread.
pub trait FrameSource: Send {
    /// Block until the next frame is available.
    ///
    /// [`CaptureError::EndOfStream`] marks the normal end of a finite source; any
    /// other error is a device fault. Both end the capture loop.
    fn read_frame(&mut self) -> Result<Frame, CaptureError>;

    /// Release the underlying device. Called once after the consumer has joined.
    fn release(&mut self) {}

    /// Short description used in log lines.
    fn describe(&self) -> String {
        "frame source".to_string()
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        (**self).read_frame()
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Replays a fixed list of frames and then reports end of stream.
///
/// Used for tests and headless runs; optionally ends with a device fault
/// instead of a clean end.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    frames: VecDeque<Frame>,
    fail_at_end: Option<String>,
    delivered: u64,
    released: bool,
}

impl ScriptedSource {
    pub fn new(frames: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Source that ends immediately without producing a frame.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Finish with a device error carrying `message` instead of end of stream.
    pub fn failing_with(mut self, message: impl Into<String>) -> Self {
        self.fail_at_end = Some(message.into());
        self
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl FrameSource for ScriptedSource {
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        if self.released {
            return Err(CaptureError::EndOfStream);
        }
        match self.frames.pop_front() {
            Some(frame) => {
                self.delivered += 1;
                Ok(frame)
            }
            None => match &self.fail_at_end {
                Some(message) => Err(CaptureError::Other(anyhow::anyhow!(message.clone()))),
                None => Err(CaptureError::EndOfStream),
            },
        }
    }

    fn release(&mut self) {
        self.released = true;
    }

    fn describe(&self) -> String {
        format!("scripted source ({} frame(s) queued)", self.frames.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_source_replays_in_order_then_ends() {
        let frames = (0..3)
            .map(|i| Frame::filled(2, 2, [i, i, i]).unwrap())
            .collect::<Vec<_>>();
        let mut source = ScriptedSource::new(frames);

        for i in 0..3u8 {
            let frame = source.read_frame().unwrap();
            assert_eq!(frame.pixel(0, 0), Some([i, i, i]));
        }
        assert!(source.read_frame().unwrap_err().is_end_of_stream());
        assert_eq!(source.delivered(), 3);
    }

    #[test]
    fn failing_source_reports_device_error() {
        let mut source = ScriptedSource::empty().failing_with("cable unplugged");
        let err = source.read_frame().unwrap_err();
        assert!(!err.is_end_of_stream());
        assert!(err.to_string().contains("cable unplugged"));
    }

    #[test]
    fn released_source_stops_delivering() {
        let mut source = ScriptedSource::new([Frame::filled(1, 1, [0, 0, 0]).unwrap()]);
        source.release();
        assert!(source.is_released());
        assert!(source.read_frame().unwrap_err().is_end_of_stream());
        assert_eq!(source.remaining(), 1);
    }
}
