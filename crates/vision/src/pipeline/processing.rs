//! Consumer side: the per-frame detection sequence and the preview.
//!
//! Each dequeued frame goes through grayscale, threshold mask, edges, line
//! segments and overlay, in that order, using one parameter snapshot taken
//! after the grayscale conversion. A stage that fails only costs the current
//! frame; the loop ends on an operator quit, on a stop requested elsewhere or
//! when the producer hangs up.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use video_ingest::Frame;

use crate::{
    detection::{DetectionBackend, LineSegment},
    params::ThresholdBand,
    pipeline::{
        queue::FrameReceiver,
        shutdown::{ShutdownSignal, StopOnDrop, StopReason},
    },
    shared::SharedParameters,
    surface::PreviewSurface,
};

/// Counters reported by the processing loop when it exits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessingSummary {
    pub frames_processed: u64,
    pub frame_errors: u64,
    pub segments_drawn: u64,
}

/// Warns once when the operator drags the band into an inverted state.
#[derive(Default)]
struct BandWatch {
    inverted: bool,
}

impl BandWatch {
    fn observe(&mut self, band: ThresholdBand) {
        let inverted = band.is_inverted();
        if inverted && !self.inverted {
            warn!(
                "Threshold band inverted (min {} > max {}); masks will be empty",
                band.min, band.max
            );
        } else if !inverted && self.inverted {
            info!("Threshold band valid again ({}..={})", band.min, band.max);
        }
        self.inverted = inverted;
    }
}

/// Run the consumer until a stop is requested or the queue closes.
///
/// Stops the pipeline on the way out, whatever the exit path, so the producer
/// never keeps capturing for a consumer that is gone.
pub fn run_processing_loop<B, P>(
    mut backend: B,
    mut preview: P,
    queue: FrameReceiver,
    shared: Arc<SharedParameters>,
    signal: Arc<ShutdownSignal>,
    idle_wait: Duration,
) -> ProcessingSummary
where
    B: DetectionBackend,
    P: PreviewSurface<B::Mask>,
{
    let _stop_guard = StopOnDrop::new(signal.clone(), StopReason::ProcessorExited);
    let _span = tracing::info_span!("processing").entered();
    let mut summary = ProcessingSummary::default();
    let mut band_watch = BandWatch::default();

    while signal.is_running() {
        let frame = match queue.pop_timeout(idle_wait) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(_) => {
                debug!("frame queue closed by producer");
                break;
            }
        };
        metrics::gauge!("line_tuner_queue_depth").set(queue.len() as f64);

        let frame_number = summary.frames_processed + summary.frame_errors + 1;
        let frame_span = tracing::info_span!(
            "frame",
            frame = frame_number,
            width = frame.width,
            height = frame.height,
            timestamp = frame.timestamp_ms
        );
        let started = Instant::now();
        let outcome = frame_span.in_scope(|| {
            process_frame(&mut backend, &mut preview, frame, &shared, &mut band_watch)
        });
        metrics::histogram!("line_tuner_processing_seconds")
            .record(started.elapsed().as_secs_f64());

        match outcome {
            Ok(segments) => {
                summary.frames_processed += 1;
                summary.segments_drawn += segments as u64;
                metrics::counter!("line_tuner_frames_processed_total").increment(1);
                metrics::counter!("line_tuner_segments_detected_total").increment(segments as u64);
            }
            Err(err) => {
                summary.frame_errors += 1;
                metrics::counter!("line_tuner_frame_errors_total").increment(1);
                warn!("Skipping frame #{frame_number}: {err:#}");
            }
        }

        match preview.quit_requested() {
            Ok(true) => {
                info!("Quit requested from preview");
                signal.request_stop(StopReason::OperatorQuit);
                break;
            }
            Ok(false) => {}
            Err(err) => warn!("Failed to poll preview for quit: {err:#}"),
        }
    }

    if let Err(err) = preview.close() {
        warn!("Failed to close preview: {err:#}");
    }
    debug!(
        "processing loop exiting after {} frame(s), {} skipped, {} segment(s)",
        summary.frames_processed, summary.frame_errors, summary.segments_drawn
    );
    summary
}

/// One pass of the detection sequence. Returns the number of segments drawn.
fn process_frame<B, P>(
    backend: &mut B,
    preview: &mut P,
    mut frame: Frame,
    shared: &SharedParameters,
    band_watch: &mut BandWatch,
) -> Result<usize>
where
    B: DetectionBackend,
    P: PreviewSurface<B::Mask>,
{
    let gray = backend.grayscale(&frame).context("grayscale")?;
    let params = shared.read_snapshot();
    band_watch.observe(params.band);

    let mask = backend.threshold(&gray, params.band).context("threshold")?;
    let edges = backend.edges(&mask).context("edges")?;
    let segments: Vec<LineSegment> = match backend.segments(&edges, &params.hough_or_built_in()) {
        Ok(segments) => segments,
        Err(err) => {
            debug!("no segments for this frame: {err:#}");
            Vec::new()
        }
    };

    backend
        .draw_overlay(&mut frame, &segments)
        .context("overlay")?;
    preview.render(&frame, &mask).context("render")?;
    Ok(segments.len())
}
