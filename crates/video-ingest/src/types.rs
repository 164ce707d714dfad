use anyhow::Error;
use chrono::Utc;
use thiserror::Error;

/// Number of interleaved samples per pixel for [`FrameFormat::Bgr8`].
pub const BGR_CHANNELS: usize = 3;

/// Raw BGR frame captured from a video source.
///
/// Ownership moves from the capture loop to the processing loop through the
/// hand-off queue; the consumer may draw onto `data` in place before display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: i32,
    pub height: i32,
    pub timestamp_ms: i64,
    pub format: FrameFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Bgr8,
}

impl Frame {
    /// Wrap an interleaved BGR buffer, checking that it covers `width * height` pixels.
    pub fn from_bgr(data: Vec<u8>, width: i32, height: i32) -> Result<Self, CaptureError> {
        let expected = expected_len(width, height)?;
        if data.len() != expected {
            return Err(CaptureError::Geometry {
                width,
                height,
                len: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            timestamp_ms: Utc::now().timestamp_millis(),
            format: FrameFormat::Bgr8,
        })
    }

    /// Frame where every pixel has the same BGR value.
    pub fn filled(width: i32, height: i32, bgr: [u8; 3]) -> Result<Self, CaptureError> {
        let pixels = expected_len(width, height)? / BGR_CHANNELS;
        let mut data = Vec::with_capacity(pixels * BGR_CHANNELS);
        for _ in 0..pixels {
            data.extend_from_slice(&bgr);
        }
        Self::from_bgr(data, width, height)
    }

    /// BGR value at `(x, y)`, or `None` outside the frame.
    pub fn pixel(&self, x: i32, y: i32) -> Option<[u8; 3]> {
        let offset = self.offset(x, y)?;
        let px = self.data.get(offset..offset + BGR_CHANNELS)?;
        Some([px[0], px[1], px[2]])
    }

    /// Overwrite the pixel at `(x, y)`; writes outside the frame are ignored.
    pub fn put_pixel(&mut self, x: i32, y: i32, bgr: [u8; 3]) {
        if let Some(offset) = self.offset(x, y) {
            if let Some(px) = self.data.get_mut(offset..offset + BGR_CHANNELS) {
                px.copy_from_slice(&bgr);
            }
        }
    }

    fn offset(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return None;
        }
        Some((y as usize * self.width as usize + x as usize) * BGR_CHANNELS)
    }
}

fn expected_len(width: i32, height: i32) -> Result<usize, CaptureError> {
    if width <= 0 || height <= 0 {
        return Err(CaptureError::Geometry {
            width,
            height,
            len: 0,
        });
    }
    Ok(width as usize * height as usize * BGR_CHANNELS)
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}")]
    Open { uri: String },
    #[error("video source reached end of stream")]
    EndOfStream,
    #[error("frame buffer of {len} bytes does not match {width}x{height} BGR")]
    Geometry { width: i32, height: i32, len: usize },
    #[error(transparent)]
    Other(#[from] Error),
}

impl CaptureError {
    /// Whether the error is the normal end of a finite stream rather than a device fault.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, CaptureError::EndOfStream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_bgr_rejects_short_buffers() {
        let err = Frame::from_bgr(vec![0; 5], 2, 1).unwrap_err();
        assert!(matches!(err, CaptureError::Geometry { len: 5, .. }));
    }

    #[test]
    fn from_bgr_rejects_empty_geometry() {
        assert!(Frame::from_bgr(Vec::new(), 0, 4).is_err());
    }

    #[test]
    fn filled_frame_reports_pixels() {
        let frame = Frame::filled(4, 3, [1, 2, 3]).unwrap();
        assert_eq!(frame.data.len(), 4 * 3 * 3);
        assert_eq!(frame.pixel(3, 2), Some([1, 2, 3]));
        assert_eq!(frame.pixel(4, 0), None);
        assert_eq!(frame.pixel(-1, 0), None);
    }

    #[test]
    fn put_pixel_ignores_out_of_bounds_writes() {
        let mut frame = Frame::filled(2, 2, [0, 0, 0]).unwrap();
        frame.put_pixel(1, 1, [0, 255, 0]);
        frame.put_pixel(2, 1, [9, 9, 9]);
        assert_eq!(frame.pixel(1, 1), Some([0, 255, 0]));
        assert_eq!(frame.data.iter().filter(|&&b| b == 9).count(), 0);
    }
}
