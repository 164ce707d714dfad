//! OpenCV detection backend used by the interactive binary.

use anyhow::{Context, Result, bail};
use opencv::{
    core::{self, Mat, Point, Scalar, Vec4i, Vector},
    imgproc,
    prelude::*,
};
use video_ingest::{Frame, FrameFormat};

use crate::{
    detection::{
        CANNY_APERTURE, CANNY_HIGH_THRESHOLD, CANNY_LOW_THRESHOLD, DetectionBackend, LineSegment,
        OVERLAY_BGR, OVERLAY_THICKNESS,
    },
    params::{HoughParams, THETA_RESOLUTION, ThresholdBand},
};

/// Copy a BGR frame into an owned three-channel `Mat`.
pub(crate) fn frame_to_mat(frame: &Frame) -> Result<Mat> {
    if !matches!(frame.format, FrameFormat::Bgr8) {
        bail!("unsupported frame format");
    }
    let flat = Mat::from_slice(&frame.data).context("wrap frame buffer")?;
    let shaped = flat
        .reshape(3, frame.height)
        .with_context(|| format!("reshape frame to {}x{}", frame.width, frame.height))?;
    Ok(shaped.try_clone()?)
}

#[derive(Debug, Default)]
pub struct OpenCvBackend;

impl OpenCvBackend {
    pub fn new() -> Self {
        Self
    }
}

impl DetectionBackend for OpenCvBackend {
    type Gray = Mat;
    type Mask = Mat;
    type Edges = Mat;

    fn grayscale(&mut self, frame: &Frame) -> Result<Mat> {
        let bgr = frame_to_mat(frame)?;
        let mut gray = Mat::default();
        imgproc::cvt_color_def(&bgr, &mut gray, imgproc::COLOR_BGR2GRAY)
            .context("convert frame to grayscale")?;
        Ok(gray)
    }

    fn threshold(&mut self, gray: &Mat, band: ThresholdBand) -> Result<Mat> {
        if band.is_inverted() {
            return Ok(Mat::zeros(gray.rows(), gray.cols(), core::CV_8UC1)?.to_mat()?);
        }
        let mut mask = Mat::default();
        core::in_range(
            gray,
            &Scalar::all(f64::from(band.min)),
            &Scalar::all(f64::from(band.max)),
            &mut mask,
        )
        .context("threshold grayscale band")?;
        Ok(mask)
    }

    fn edges(&mut self, mask: &Mat) -> Result<Mat> {
        let mut edges = Mat::default();
        imgproc::canny(
            mask,
            &mut edges,
            CANNY_LOW_THRESHOLD,
            CANNY_HIGH_THRESHOLD,
            CANNY_APERTURE,
            false,
        )
        .context("extract mask edges")?;
        Ok(edges)
    }

    fn segments(&mut self, edges: &Mat, hough: &HoughParams) -> Result<Vec<LineSegment>> {
        let mut lines = Vector::<Vec4i>::new();
        imgproc::hough_lines_p(
            edges,
            &mut lines,
            hough.rho,
            THETA_RESOLUTION,
            hough.vote_threshold,
            f64::from(hough.min_segment_length),
            f64::from(hough.max_segment_gap),
        )
        .context("probabilistic Hough transform")?;
        Ok(lines
            .iter()
            .map(|l| LineSegment::new(l[0], l[1], l[2], l[3]))
            .collect())
    }

    fn draw_overlay(&mut self, frame: &mut Frame, segments: &[LineSegment]) -> Result<()> {
        if segments.is_empty() {
            return Ok(());
        }
        let mut canvas = frame_to_mat(frame)?;
        let colour = Scalar::new(
            f64::from(OVERLAY_BGR[0]),
            f64::from(OVERLAY_BGR[1]),
            f64::from(OVERLAY_BGR[2]),
            0.0,
        );
        for segment in segments {
            imgproc::line(
                &mut canvas,
                Point::new(segment.x1, segment.y1),
                Point::new(segment.x2, segment.y2),
                colour,
                OVERLAY_THICKNESS,
                imgproc::LINE_8,
                0,
            )
            .with_context(|| format!("draw segment {segment}"))?;
        }
        frame.data.copy_from_slice(canvas.data_bytes()?);
        Ok(())
    }
}
