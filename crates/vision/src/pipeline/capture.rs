//! Producer side: camera reads, queue pushes and operator input.

use std::time::Instant;

use tracing::{debug, error, info, warn};
use video_ingest::{CaptureError, FrameSource};

use crate::{
    params::{ParameterSet, PipelineVariant},
    pipeline::{
        queue::{FrameSender, PushOutcome},
        shutdown::{ShutdownSignal, StopReason},
    },
    shared::SharedParameters,
    surface::ParameterInput,
};

/// Counters reported by the capture loop when it exits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaptureSummary {
    pub frames_captured: u64,
    pub frames_dropped: u64,
}

/// Run the producer on the calling thread until the shutdown signal trips.
///
/// Camera failures end the loop; operator input failures only skip the
/// parameter update for that iteration.
pub fn run_capture_loop<S, I>(
    source: &mut S,
    input: &mut I,
    queue: &FrameSender,
    shared: &SharedParameters,
    variant: PipelineVariant,
    signal: &ShutdownSignal,
) -> CaptureSummary
where
    S: FrameSource + ?Sized,
    I: ParameterInput + ?Sized,
{
    let _span = tracing::info_span!("capture", source = %source.describe(), %variant).entered();
    let mut summary = CaptureSummary::default();
    let mut last_frame = Instant::now();

    while signal.is_running() {
        let frame = match source.read_frame() {
            Ok(frame) => frame,
            Err(CaptureError::EndOfStream) => {
                info!("{} reached end of stream", source.describe());
                signal.request_stop(StopReason::StreamEnded);
                break;
            }
            Err(err) => {
                error!("Capture error from {}: {err}", source.describe());
                signal.request_stop(StopReason::CaptureFailed);
                break;
            }
        };

        // The consumer may have quit while we were blocked on the camera.
        if !signal.is_running() {
            debug!("stop observed after read; discarding frame");
            break;
        }

        summary.frames_captured += 1;
        metrics::counter!("line_tuner_frames_captured_total").increment(1);
        metrics::histogram!("line_tuner_capture_interval_seconds")
            .record(last_frame.elapsed().as_secs_f64());
        last_frame = Instant::now();

        match queue.push(frame) {
            Ok(PushOutcome::Queued) => {}
            Ok(PushOutcome::EvictedOldest(evicted)) => {
                summary.frames_dropped += evicted as u64;
                metrics::counter!("line_tuner_frames_dropped_total").increment(evicted as u64);
                debug!(
                    "queue full; evicted {evicted} oldest frame(s), {} dropped so far",
                    summary.frames_dropped
                );
            }
            Err(err) => {
                warn!("Processing thread gone ({err}); stopping capture");
                signal.request_stop(StopReason::ProcessorExited);
                break;
            }
        }
        metrics::gauge!("line_tuner_queue_depth").set(queue.len() as f64);

        match input.read_positions() {
            Ok(positions) => shared.update(ParameterSet::from_positions(variant, &positions)),
            Err(err) => warn!("Failed to read operator input: {err:#}"),
        }

        if let Err(err) = input.pump_events() {
            warn!("Failed to pump operator events: {err:#}");
        }
    }

    debug!(
        "capture loop exiting after {} frame(s), {} dropped",
        summary.frames_captured, summary.frames_dropped
    );
    summary
}
