//! Pure-Rust detection backend.
//!
//! Deterministic stand-ins for the OpenCV stages: BT.601 grayscale, inclusive
//! band mask, mask boundary as the edge map and a progressive Hough transform
//! that extracts segments from the strongest accumulator cells first. Good
//! enough for headless runs and tests; the OpenCV backend is the one tuned
//! for live cameras.

use std::cmp::Reverse;

use anyhow::{Result, bail};
use tracing::debug;
use video_ingest::{BGR_CHANNELS, Frame, FrameFormat};

use crate::{
    detection::{DetectionBackend, LineSegment, OVERLAY_BGR, OVERLAY_THICKNESS},
    params::{HoughParams, THETA_RESOLUTION, ThresholdBand},
};

/// Upper bound on distance bins; finer rho settings are coarsened to fit.
pub const MAX_RHO_BINS: usize = 4096;
/// Upper bound on accumulator cells examined per frame.
pub const MAX_LINE_CANDIDATES: usize = 512;

const ON: u8 = 255;

/// Single-channel 8-bit image, row major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    pub fn count_nonzero(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SoftwareBackend;

impl SoftwareBackend {
    pub fn new() -> Self {
        Self
    }
}

impl DetectionBackend for SoftwareBackend {
    type Gray = GrayImage;
    type Mask = GrayImage;
    type Edges = GrayImage;

    fn grayscale(&mut self, frame: &Frame) -> Result<GrayImage> {
        if !matches!(frame.format, FrameFormat::Bgr8) {
            bail!("unsupported frame format");
        }
        if frame.width <= 0 || frame.height <= 0 {
            bail!("empty frame {}x{}", frame.width, frame.height);
        }
        let (width, height) = (frame.width as usize, frame.height as usize);
        if frame.data.len() != width * height * BGR_CHANNELS {
            bail!(
                "frame buffer of {} bytes does not match {}x{} BGR",
                frame.data.len(),
                width,
                height
            );
        }

        let data = frame
            .data
            .chunks_exact(BGR_CHANNELS)
            .map(|px| luma(px[0], px[1], px[2]))
            .collect();
        Ok(GrayImage {
            width,
            height,
            data,
        })
    }

    fn threshold(&mut self, gray: &GrayImage, band: ThresholdBand) -> Result<GrayImage> {
        let mut mask = GrayImage::new(gray.width, gray.height);
        if band.is_inverted() {
            return Ok(mask);
        }
        for (dst, &src) in mask.data.iter_mut().zip(&gray.data) {
            if band.contains(src) {
                *dst = ON;
            }
        }
        Ok(mask)
    }

    fn edges(&mut self, mask: &GrayImage) -> Result<GrayImage> {
        Ok(mask_boundary(mask))
    }

    fn segments(&mut self, edges: &GrayImage, hough: &HoughParams) -> Result<Vec<LineSegment>> {
        Ok(progressive_hough(edges, hough))
    }

    fn draw_overlay(&mut self, frame: &mut Frame, segments: &[LineSegment]) -> Result<()> {
        for segment in segments {
            draw_segment(frame, segment, OVERLAY_BGR, OVERLAY_THICKNESS);
        }
        Ok(())
    }
}

/// BT.601 luma with 14-bit fixed point weights.
fn luma(b: u8, g: u8, r: u8) -> u8 {
    let weighted = u32::from(b) * 1868 + u32::from(g) * 9617 + u32::from(r) * 4899;
    ((weighted + (1 << 13)) >> 14).min(255) as u8
}

/// Set pixels with at least one unset 4-neighbour inside the image.
///
/// A uniform mask, full or empty, has no boundary.
fn mask_boundary(mask: &GrayImage) -> GrayImage {
    let (w, h) = (mask.width, mask.height);
    let mut edges = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            if mask.get(x, y) == 0 {
                continue;
            }
            let unset = |nx: usize, ny: usize| mask.get(nx, ny) == 0;
            let boundary = (x > 0 && unset(x - 1, y))
                || (x + 1 < w && unset(x + 1, y))
                || (y > 0 && unset(x, y - 1))
                || (y + 1 < h && unset(x, y + 1));
            if boundary {
                edges.data[y * w + x] = ON;
            }
        }
    }
    edges
}

fn progressive_hough(edges: &GrayImage, hough: &HoughParams) -> Vec<LineSegment> {
    let points: Vec<(i32, i32)> = edges
        .data
        .iter()
        .enumerate()
        .filter(|(_, v)| **v != 0)
        .map(|(i, _)| ((i % edges.width) as i32, (i / edges.width) as i32))
        .collect();
    if points.is_empty() {
        return Vec::new();
    }

    let diag = (edges.width as f64).hypot(edges.height as f64);
    let mut rho_res = hough.rho.max(f64::EPSILON);
    if (2.0 * diag / rho_res).ceil() as usize + 1 > MAX_RHO_BINS {
        rho_res = 2.0 * diag / (MAX_RHO_BINS - 1) as f64;
        debug!(
            "software hough: rho {:.3} coarsened to {:.3} px",
            hough.rho, rho_res
        );
    }
    let n_rho = (2.0 * diag / rho_res).ceil() as usize + 1;
    let n_theta = (std::f64::consts::PI / THETA_RESOLUTION).round() as usize;
    let trig: Vec<(f64, f64)> = (0..n_theta)
        .map(|t| {
            let theta = t as f64 * THETA_RESOLUTION;
            (theta.cos(), theta.sin())
        })
        .collect();
    let rho_bin = |(x, y): (i32, i32), (cos, sin): (f64, f64)| -> usize {
        let rho = f64::from(x) * cos + f64::from(y) * sin;
        (((rho + diag) / rho_res).round() as usize).min(n_rho - 1)
    };

    let mut accumulator = vec![0u32; n_theta * n_rho];
    for &point in &points {
        for (t, &cs) in trig.iter().enumerate() {
            accumulator[t * n_rho + rho_bin(point, cs)] += 1;
        }
    }

    let min_votes = hough.vote_threshold.max(1) as u32;
    let mut candidates: Vec<(u32, usize)> = accumulator
        .iter()
        .enumerate()
        .filter(|(_, votes)| **votes >= min_votes)
        .map(|(cell, votes)| (*votes, cell))
        .collect();
    candidates.sort_unstable_by_key(|&(votes, cell)| (Reverse(votes), cell));
    candidates.truncate(MAX_LINE_CANDIDATES);

    let max_gap = f64::from(hough.max_segment_gap.max(0)) + 1.0;
    let min_length = f64::from(hough.min_segment_length.max(0));
    let mut used = vec![false; points.len()];
    let mut segments = Vec::new();

    for (_, cell) in candidates {
        let (t, bin) = (cell / n_rho, cell % n_rho);
        let (cos, sin) = trig[t];
        let mut on_line: Vec<(f64, usize)> = points
            .iter()
            .enumerate()
            .filter(|(i, p)| !used[*i] && rho_bin(**p, (cos, sin)) == bin)
            .map(|(i, &(x, y))| (f64::from(y) * cos - f64::from(x) * sin, i))
            .collect();
        if on_line.len() < min_votes as usize {
            continue;
        }
        on_line.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut run_start = 0;
        for k in 1..=on_line.len() {
            let split = k == on_line.len() || on_line[k].0 - on_line[k - 1].0 > max_gap;
            if !split {
                continue;
            }
            let (first, last) = (points[on_line[run_start].1], points[on_line[k - 1].1]);
            let segment = LineSegment::new(first.0, first.1, last.0, last.1);
            if k - run_start >= 2 && segment.length() >= min_length {
                for &(_, i) in &on_line[run_start..k] {
                    used[i] = true;
                }
                segments.push(segment);
            }
            run_start = k;
        }
    }

    segments
}

/// Bresenham line, thickened by one pixel across its minor axis.
fn draw_segment(frame: &mut Frame, segment: &LineSegment, bgr: [u8; 3], thickness: i32) {
    let (mut x, mut y) = (segment.x1, segment.y1);
    let dx = (segment.x2 - segment.x1).abs();
    let dy = -(segment.y2 - segment.y1).abs();
    let sx = if segment.x1 < segment.x2 { 1 } else { -1 };
    let sy = if segment.y1 < segment.y2 { 1 } else { -1 };
    let steep = dx < -dy;
    let mut err = dx + dy;

    loop {
        for offset in 0..thickness.max(1) {
            if steep {
                frame.put_pixel(x + offset, y, bgr);
            } else {
                frame.put_pixel(x, y + offset, bgr);
            }
        }
        if x == segment.x2 && y == segment.y2 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Black frame with a white horizontal bar covering rows 10..=20, columns 4..=59.
    fn bar_frame() -> Frame {
        let mut frame = Frame::filled(64, 32, [0, 0, 0]).unwrap();
        for y in 10..=20 {
            for x in 4..=59 {
                frame.put_pixel(x, y, [255, 255, 255]);
            }
        }
        frame
    }

    #[test]
    fn grayscale_uses_bt601_weights() {
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(255, 255, 255), 255);
        assert_eq!(luma(0, 0, 255), 76);
        assert_eq!(luma(0, 255, 0), 150);
        assert_eq!(luma(255, 0, 0), 29);
    }

    #[test]
    fn grayscale_rejects_mismatched_buffers() {
        let mut frame = Frame::filled(2, 2, [0, 0, 0]).unwrap();
        frame.data.pop();
        assert!(SoftwareBackend.grayscale(&frame).is_err());
    }

    #[test]
    fn threshold_is_inclusive() {
        let gray = GrayImage {
            width: 4,
            height: 1,
            data: vec![9, 10, 20, 21],
        };
        let mask = SoftwareBackend
            .threshold(&gray, ThresholdBand::new(10, 20))
            .unwrap();
        assert_eq!(mask.data, vec![0, 255, 255, 0]);
    }

    #[test]
    fn inverted_band_yields_empty_mask() {
        let gray = GrayImage {
            width: 3,
            height: 1,
            data: vec![50, 100, 200],
        };
        let mask = SoftwareBackend
            .threshold(&gray, ThresholdBand::new(200, 50))
            .unwrap();
        assert_eq!(mask.count_nonzero(), 0);
    }

    #[test]
    fn uniform_mask_has_no_edges() {
        let mut mask = GrayImage::new(8, 8);
        mask.data.fill(255);
        assert_eq!(mask_boundary(&mask).count_nonzero(), 0);
        assert_eq!(mask_boundary(&GrayImage::new(8, 8)).count_nonzero(), 0);
    }

    #[test]
    fn bar_yields_its_two_long_edges() {
        let mut backend = SoftwareBackend::new();
        let frame = bar_frame();
        let gray = backend.grayscale(&frame).unwrap();
        let mask = backend
            .threshold(&gray, ThresholdBand::new(200, 255))
            .unwrap();
        let edges = backend.edges(&mask).unwrap();
        let segments = backend.segments(&edges, &HoughParams::BUILT_IN).unwrap();

        assert_eq!(segments.len(), 2, "segments: {segments:?}");
        let mut rows: Vec<i32> = segments
            .iter()
            .map(|s| {
                assert_eq!(s.y1, s.y2, "not horizontal: {s}");
                assert_eq!((s.x2 - s.x1).abs(), 55, "unexpected span: {s}");
                s.y1
            })
            .collect();
        rows.sort_unstable();
        assert_eq!(rows, vec![10, 20]);
    }

    #[test]
    fn high_vote_threshold_suppresses_short_edges() {
        let mut backend = SoftwareBackend::new();
        let frame = bar_frame();
        let gray = backend.grayscale(&frame).unwrap();
        let mask = backend
            .threshold(&gray, ThresholdBand::new(200, 255))
            .unwrap();
        let edges = backend.edges(&mask).unwrap();
        let hough = HoughParams {
            vote_threshold: 200,
            ..HoughParams::BUILT_IN
        };
        assert!(backend.segments(&edges, &hough).unwrap().is_empty());
    }

    #[test]
    fn gaps_wider_than_allowed_split_segments() {
        let mut edges = GrayImage::new(40, 5);
        for x in (0..15).chain(25..40) {
            edges.data[2 * 40 + x] = 255;
        }
        let hough = HoughParams {
            vote_threshold: 10,
            min_segment_length: 5,
            max_segment_gap: 3,
            rho: 1.0,
        };
        let segments = SoftwareBackend.segments(&edges, &hough).unwrap();
        assert_eq!(segments.len(), 2, "segments: {segments:?}");
        assert!(segments.iter().all(|s| s.length() >= 14.0));

        let bridged = HoughParams {
            max_segment_gap: 10,
            ..hough
        };
        let segments = SoftwareBackend.segments(&edges, &bridged).unwrap();
        assert_eq!(segments.len(), 1, "segments: {segments:?}");
        assert_eq!(segments[0].length(), 39.0);
    }

    #[test]
    fn overlay_draws_thick_green_line_on_colour_frame() {
        let mut frame = Frame::filled(10, 10, [0, 0, 0]).unwrap();
        SoftwareBackend
            .draw_overlay(&mut frame, &[LineSegment::new(1, 4, 8, 4)])
            .unwrap();
        for x in 1..=8 {
            assert_eq!(frame.pixel(x, 4), Some(OVERLAY_BGR));
            assert_eq!(frame.pixel(x, 5), Some(OVERLAY_BGR));
        }
        assert_eq!(frame.pixel(0, 4), Some([0, 0, 0]));
        assert_eq!(frame.pixel(1, 3), Some([0, 0, 0]));
    }

    #[test]
    fn overlay_clips_segments_leaving_the_frame() {
        let mut frame = Frame::filled(4, 4, [0, 0, 0]).unwrap();
        SoftwareBackend
            .draw_overlay(&mut frame, &[LineSegment::new(-5, -5, 10, 10)])
            .unwrap();
        assert_eq!(frame.pixel(2, 2), Some(OVERLAY_BGR));
    }
}
