//! Tunable detection parameters and their declared ranges.
//!
//! A [`ParameterSet`] always carries the grayscale threshold band. The Hough
//! settings are only present in the extended pipeline variant; readers go
//! through [`ParameterSet::hough_or_built_in`] so an absent block falls back to
//! the fixed constants without special-casing the processing loop.

use std::{f64::consts::PI, fmt, ops::RangeInclusive, str::FromStr};

use anyhow::{Result, bail};

/// Grayscale intensity band bounds.
pub const INTENSITY_RANGE: RangeInclusive<i32> = 0..=255;
/// Minimum accumulator votes for a line candidate.
pub const HOUGH_THRESHOLD_RANGE: RangeInclusive<i32> = 0..=255;
/// Minimum accepted segment length in pixels.
pub const MIN_LINE_LENGTH_RANGE: RangeInclusive<i32> = 0..=100;
/// Maximum gap in pixels bridged inside one segment.
pub const MAX_LINE_GAP_RANGE: RangeInclusive<i32> = 0..=50;
/// Distance resolution of the accumulator in pixels.
pub const RHO_RANGE: RangeInclusive<f64> = 0.01..=10.0;
/// Sliders carry rho as an integer scaled by this factor.
pub const RHO_SLIDER_SCALE: f64 = 100.0;
/// Highest rho slider position (10.0 px).
pub const RHO_SLIDER_MAX: i32 = 1000;
/// Angular resolution of the accumulator, one degree.
pub const THETA_RESOLUTION: f64 = PI / 180.0;

/// Which parameter shape the pipeline runs with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PipelineVariant {
    /// Threshold band only; line extraction uses built-in constants.
    Base,
    /// Threshold band plus operator-tunable Hough settings.
    #[default]
    Extended,
}

impl PipelineVariant {
    pub fn label(self) -> &'static str {
        match self {
            PipelineVariant::Base => "base",
            PipelineVariant::Extended => "extended",
        }
    }
}

impl fmt::Display for PipelineVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PipelineVariant {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "base" => Ok(PipelineVariant::Base),
            "extended" => Ok(PipelineVariant::Extended),
            other => bail!("unknown pipeline variant {other:?} (expected `base` or `extended`)"),
        }
    }
}

/// Inclusive grayscale band selected by the mask.
///
/// `min > max` is accepted as-is; the masking stage turns an inverted band
/// into an empty mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThresholdBand {
    pub min: u8,
    pub max: u8,
}

impl ThresholdBand {
    pub const FULL: Self = Self { min: 0, max: 255 };

    pub fn new(min: u8, max: u8) -> Self {
        Self { min, max }
    }

    /// Build a band from unchecked integers, clamping each bound into `0..=255`.
    pub fn from_clamped(min: i32, max: i32) -> Self {
        Self {
            min: clamp_i32(min, INTENSITY_RANGE) as u8,
            max: clamp_i32(max, INTENSITY_RANGE) as u8,
        }
    }

    pub fn is_inverted(&self) -> bool {
        self.min > self.max
    }

    pub fn contains(&self, value: u8) -> bool {
        self.min <= value && value <= self.max
    }
}

impl Default for ThresholdBand {
    fn default() -> Self {
        Self::FULL
    }
}

/// Probabilistic Hough settings for segment extraction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HoughParams {
    pub vote_threshold: i32,
    pub min_segment_length: i32,
    pub max_segment_gap: i32,
    pub rho: f64,
}

impl HoughParams {
    /// Constants used whenever the pipeline variant does not expose a field.
    pub const BUILT_IN: Self = Self {
        vote_threshold: 50,
        min_segment_length: 10,
        max_segment_gap: 5,
        rho: 1.0,
    };

    pub fn clamped(self) -> Self {
        Self {
            vote_threshold: clamp_i32(self.vote_threshold, HOUGH_THRESHOLD_RANGE),
            min_segment_length: clamp_i32(self.min_segment_length, MIN_LINE_LENGTH_RANGE),
            max_segment_gap: clamp_i32(self.max_segment_gap, MAX_LINE_GAP_RANGE),
            rho: clamp_rho(self.rho),
        }
    }

    pub fn is_in_range(&self) -> bool {
        HOUGH_THRESHOLD_RANGE.contains(&self.vote_threshold)
            && MIN_LINE_LENGTH_RANGE.contains(&self.min_segment_length)
            && MAX_LINE_GAP_RANGE.contains(&self.max_segment_gap)
            && RHO_RANGE.contains(&self.rho)
    }
}

impl Default for HoughParams {
    fn default() -> Self {
        Self::BUILT_IN
    }
}

/// The whole record shared between the capture and processing threads.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParameterSet {
    pub band: ThresholdBand,
    pub hough: Option<HoughParams>,
}

impl ParameterSet {
    /// Hard-coded defaults for `variant`, used whenever persisted state is unusable.
    pub fn defaults(variant: PipelineVariant) -> Self {
        Self {
            band: ThresholdBand::FULL,
            hough: match variant {
                PipelineVariant::Base => None,
                PipelineVariant::Extended => Some(HoughParams::BUILT_IN),
            },
        }
    }

    pub fn variant(&self) -> PipelineVariant {
        if self.hough.is_some() {
            PipelineVariant::Extended
        } else {
            PipelineVariant::Base
        }
    }

    /// Hough settings to run with, falling back to the built-in constants.
    pub fn hough_or_built_in(&self) -> HoughParams {
        self.hough.unwrap_or(HoughParams::BUILT_IN)
    }

    pub fn clamped(self) -> Self {
        Self {
            band: self.band,
            hough: self.hough.map(HoughParams::clamped),
        }
    }

    pub fn is_in_range(&self) -> bool {
        self.hough.as_ref().is_none_or(HoughParams::is_in_range)
    }

    /// Convert raw slider positions into a clamped set of the given variant.
    ///
    /// Extended fields the input surface did not report keep their built-in value.
    pub fn from_positions(variant: PipelineVariant, positions: &SliderPositions) -> Self {
        let band = ThresholdBand::from_clamped(positions.min_val, positions.max_val);
        let hough = match variant {
            PipelineVariant::Base => None,
            PipelineVariant::Extended => {
                let built_in = HoughParams::BUILT_IN;
                Some(
                    HoughParams {
                        vote_threshold: positions
                            .hough_threshold
                            .unwrap_or(built_in.vote_threshold),
                        min_segment_length: positions
                            .min_line_length
                            .unwrap_or(built_in.min_segment_length),
                        max_segment_gap: positions.max_line_gap.unwrap_or(built_in.max_segment_gap),
                        rho: positions
                            .rho_scaled
                            .map(rho_from_slider)
                            .unwrap_or(built_in.rho),
                    }
                    .clamped(),
                )
            }
        };
        Self { band, hough }
    }

    /// Slider positions that display this set on the input surface.
    pub fn to_positions(&self) -> SliderPositions {
        SliderPositions {
            min_val: i32::from(self.band.min),
            max_val: i32::from(self.band.max),
            hough_threshold: self.hough.map(|h| h.vote_threshold),
            min_line_length: self.hough.map(|h| h.min_segment_length),
            max_line_gap: self.hough.map(|h| h.max_segment_gap),
            rho_scaled: self.hough.map(|h| rho_to_slider(h.rho)),
        }
    }
}

/// Raw integer positions read from the operator's sliders, before clamping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SliderPositions {
    pub min_val: i32,
    pub max_val: i32,
    pub hough_threshold: Option<i32>,
    pub min_line_length: Option<i32>,
    pub max_line_gap: Option<i32>,
    pub rho_scaled: Option<i32>,
}

/// Slider position to rho, floored at the smallest usable resolution.
pub fn rho_from_slider(position: i32) -> f64 {
    clamp_rho(f64::from(position) / RHO_SLIDER_SCALE)
}

pub fn rho_to_slider(rho: f64) -> i32 {
    ((clamp_rho(rho) * RHO_SLIDER_SCALE).round() as i32).clamp(0, RHO_SLIDER_MAX)
}

fn clamp_i32(value: i32, range: RangeInclusive<i32>) -> i32 {
    value.clamp(*range.start(), *range.end())
}

fn clamp_rho(rho: f64) -> f64 {
    if rho.is_nan() {
        return HoughParams::BUILT_IN.rho;
    }
    rho.clamp(*RHO_RANGE.start(), *RHO_RANGE.end())
}
