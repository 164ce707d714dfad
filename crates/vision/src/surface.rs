//! Operator-facing collaborators: the parameter sliders read by the capture
//! loop and the preview windows driven by the processing loop.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread,
    time::Duration,
};

use anyhow::Result;
use video_ingest::Frame;

use crate::params::SliderPositions;

/// Pause used by surfaces without an event loop of their own.
pub const PRODUCER_YIELD: Duration = Duration::from_millis(1);

/// Live operator input, polled by the capture loop once per iteration.
pub trait ParameterInput {
    /// Raw slider positions; the caller clamps them.
    fn read_positions(&mut self) -> Result<SliderPositions>;

    /// Give the windowing system a moment to deliver input events.
    fn pump_events(&mut self) -> Result<()> {
        thread::sleep(PRODUCER_YIELD);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Display of the overlaid frame and the mask, owned by the processing thread.
pub trait PreviewSurface<M>: Send {
    fn render(&mut self, overlay: &Frame, mask: &M) -> Result<()>;

    /// Polled once per processed frame.
    fn quit_requested(&mut self) -> Result<bool>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<M, P: PreviewSurface<M> + ?Sized> PreviewSurface<M> for Box<P> {
    fn render(&mut self, overlay: &Frame, mask: &M) -> Result<()> {
        (**self).render(overlay, mask)
    }

    fn quit_requested(&mut self) -> Result<bool> {
        (**self).quit_requested()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Sliders that never move.
#[derive(Clone, Copy, Debug)]
pub struct FixedInput {
    positions: SliderPositions,
    reads: u64,
}

impl FixedInput {
    pub fn new(positions: SliderPositions) -> Self {
        Self {
            positions,
            reads: 0,
        }
    }

    pub fn reads(&self) -> u64 {
        self.reads
    }
}

impl ParameterInput for FixedInput {
    fn read_positions(&mut self) -> Result<SliderPositions> {
        self.reads += 1;
        Ok(self.positions)
    }
}

/// What a [`HeadlessPreview`] has been shown so far.
#[derive(Debug, Default)]
pub struct PreviewLog {
    pub renders: u64,
    pub quit_polls: u64,
    pub last_overlay: Option<Frame>,
    pub closed: bool,
}

/// Preview that records renders instead of opening windows.
///
/// Clones share one log, so a test can keep a handle after moving the preview
/// into the pipeline.
#[derive(Clone, Debug, Default)]
pub struct HeadlessPreview {
    log: Arc<Mutex<PreviewLog>>,
    quit_after: Option<u64>,
}

impl HeadlessPreview {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a quit request once `renders` frames have been shown.
    pub fn quit_after(mut self, renders: u64) -> Self {
        self.quit_after = Some(renders);
        self
    }

    pub fn log(&self) -> MutexGuard<'_, PreviewLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<M> PreviewSurface<M> for HeadlessPreview {
    fn render(&mut self, overlay: &Frame, _mask: &M) -> Result<()> {
        let mut log = self.log();
        log.renders += 1;
        log.last_overlay = Some(overlay.clone());
        Ok(())
    }

    fn quit_requested(&mut self) -> Result<bool> {
        let mut log = self.log();
        log.quit_polls += 1;
        Ok(self.quit_after.is_some_and(|n| log.renders >= n))
    }

    fn close(&mut self) -> Result<()> {
        self.log().closed = true;
        Ok(())
    }
}
