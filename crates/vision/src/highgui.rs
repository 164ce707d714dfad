//! HighGUI trackbars and preview windows.

use anyhow::{Context, Result};
use opencv::{core::Mat, highgui};
use tracing::debug;
use video_ingest::Frame;

use crate::{
    detection::opencv_backend::frame_to_mat,
    params::{
        HOUGH_THRESHOLD_RANGE, INTENSITY_RANGE, MAX_LINE_GAP_RANGE, MIN_LINE_LENGTH_RANGE,
        ParameterSet, PipelineVariant, RHO_SLIDER_MAX, SliderPositions,
    },
    surface::{ParameterInput, PreviewSurface},
};

pub const SETTINGS_WINDOW: &str = "settings";
pub const OVERLAY_WINDOW: &str = "original with lines";
pub const MASK_WINDOW: &str = "mask";
pub const QUIT_KEY: char = 'q';

const MIN_VAL: &str = "min_val";
const MAX_VAL: &str = "max_val";
const HOUGH_THRESHOLD: &str = "threshold";
const MIN_LINE_LENGTH: &str = "min_line_length";
const MAX_LINE_GAP: &str = "max_line_gap";
const RHO: &str = "rho";

/// One trackbar per field of the active variant, in the settings window.
pub struct HighGuiTrackbars {
    variant: PipelineVariant,
}

impl HighGuiTrackbars {
    /// Open the settings window with sliders positioned at `initial`.
    pub fn create(initial: &ParameterSet) -> Result<Self> {
        highgui::named_window(SETTINGS_WINDOW, highgui::WINDOW_AUTOSIZE)
            .context("open settings window")?;

        let positions = initial.to_positions();
        add_trackbar(MIN_VAL, *INTENSITY_RANGE.end(), positions.min_val)?;
        add_trackbar(MAX_VAL, *INTENSITY_RANGE.end(), positions.max_val)?;

        let variant = initial.variant();
        if variant == PipelineVariant::Extended {
            let extended = [
                (HOUGH_THRESHOLD, *HOUGH_THRESHOLD_RANGE.end(), positions.hough_threshold),
                (MIN_LINE_LENGTH, *MIN_LINE_LENGTH_RANGE.end(), positions.min_line_length),
                (MAX_LINE_GAP, *MAX_LINE_GAP_RANGE.end(), positions.max_line_gap),
                (RHO, RHO_SLIDER_MAX, positions.rho_scaled),
            ];
            for (name, max, position) in extended {
                add_trackbar(name, max, position.unwrap_or_default())?;
            }
        }
        debug!("settings window ready ({variant} variant)");

        Ok(Self { variant })
    }
}

fn add_trackbar(name: &str, max: i32, position: i32) -> Result<()> {
    highgui::create_trackbar(name, SETTINGS_WINDOW, None, max, None)
        .with_context(|| format!("create trackbar {name}"))?;
    highgui::set_trackbar_pos(name, SETTINGS_WINDOW, position)
        .with_context(|| format!("position trackbar {name}"))?;
    Ok(())
}

fn trackbar(name: &str) -> Result<i32> {
    highgui::get_trackbar_pos(name, SETTINGS_WINDOW)
        .with_context(|| format!("read trackbar {name}"))
}

impl ParameterInput for HighGuiTrackbars {
    fn read_positions(&mut self) -> Result<SliderPositions> {
        let mut positions = SliderPositions {
            min_val: trackbar(MIN_VAL)?,
            max_val: trackbar(MAX_VAL)?,
            ..SliderPositions::default()
        };
        if self.variant == PipelineVariant::Extended {
            positions.hough_threshold = Some(trackbar(HOUGH_THRESHOLD)?);
            positions.min_line_length = Some(trackbar(MIN_LINE_LENGTH)?);
            positions.max_line_gap = Some(trackbar(MAX_LINE_GAP)?);
            positions.rho_scaled = Some(trackbar(RHO)?);
        }
        Ok(positions)
    }

    fn pump_events(&mut self) -> Result<()> {
        highgui::wait_key(1).context("pump HighGUI events")?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        highgui::destroy_window(SETTINGS_WINDOW).context("close settings window")
    }
}

/// The overlay and mask windows.
#[derive(Debug, Default)]
pub struct HighGuiPreview;

impl HighGuiPreview {
    pub fn new() -> Self {
        Self
    }
}

impl PreviewSurface<Mat> for HighGuiPreview {
    fn render(&mut self, overlay: &Frame, mask: &Mat) -> Result<()> {
        let overlay = frame_to_mat(overlay)?;
        highgui::imshow(OVERLAY_WINDOW, &overlay).context("show overlay")?;
        highgui::imshow(MASK_WINDOW, mask).context("show mask")?;
        Ok(())
    }

    fn quit_requested(&mut self) -> Result<bool> {
        let key = highgui::wait_key(1).context("poll preview keys")?;
        Ok(key & 0xFF == QUIT_KEY as i32)
    }

    fn close(&mut self) -> Result<()> {
        highgui::destroy_window(OVERLAY_WINDOW).context("close overlay window")?;
        highgui::destroy_window(MASK_WINDOW).context("close mask window")?;
        Ok(())
    }
}
