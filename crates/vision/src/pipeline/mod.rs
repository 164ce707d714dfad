//! Pipeline coordinator tying together the capture loop, the processing
//! thread, the shared parameters and the persisted configuration.
//!
//! The producer runs on the caller's thread and the consumer on a named
//! worker thread. Whichever side stops first trips the shared signal; the
//! coordinator then joins the consumer before it releases the camera and
//! writes the final parameters back to disk.

pub mod capture;
pub mod config;
pub mod processing;
pub mod queue;
pub mod shutdown;
pub mod telemetry;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use video_ingest::FrameSource;

use crate::{
    detection::DetectionBackend,
    params::ParameterSet,
    pipeline::{
        capture::run_capture_loop,
        config::PipelineOptions,
        processing::{ProcessingSummary, run_processing_loop},
        queue::frame_queue,
        shutdown::{ShutdownSignal, StopReason},
    },
    shared::SharedParameters,
    store::ConfigStore,
    surface::{ParameterInput, PreviewSurface},
};

/// Name of the consumer thread as it appears in logs.
pub const PROCESSOR_THREAD: &str = "line-processor";

/// The external pieces a run is wired from.
///
/// Source and input stay with the caller's thread; backend and preview move to
/// the processing thread.
pub struct Collaborators<'a, S: ?Sized, I: ?Sized, B, P> {
    pub source: &'a mut S,
    pub input: &'a mut I,
    pub backend: B,
    pub preview: P,
}

/// What happened during one run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunReport {
    pub frames_captured: u64,
    pub frames_processed: u64,
    pub frames_dropped: u64,
    pub frame_errors: u64,
    pub segments_drawn: u64,
    pub stop_reason: Option<StopReason>,
    /// Parameters in effect at shutdown, as written to the store.
    pub final_params: ParameterSet,
    pub saved: bool,
}

/// Run the pipeline to completion.
///
/// Returns an error only if the processing thread cannot be started; every
/// later failure is handled where it happens and shows up in the report.
pub fn run<S, I, B, P>(
    store: &ConfigStore,
    initial: ParameterSet,
    collaborators: Collaborators<'_, S, I, B, P>,
    options: &PipelineOptions,
    signal: Arc<ShutdownSignal>,
) -> Result<RunReport>
where
    S: FrameSource + ?Sized,
    I: ParameterInput + ?Sized,
    B: DetectionBackend + 'static,
    P: PreviewSurface<B::Mask> + 'static,
{
    let Collaborators {
        source,
        input,
        backend,
        preview,
    } = collaborators;

    let pipeline_span = tracing::info_span!(
        "pipeline",
        source = %source.describe(),
        variant = %options.variant,
        queue = tracing::field::Empty
    );
    let _pipeline_guard = pipeline_span.enter();
    match options.queue_capacity {
        Some(capacity) => pipeline_span.record("queue", capacity),
        None => pipeline_span.record("queue", "unbounded"),
    };

    let shared = Arc::new(SharedParameters::new(initial));
    let (tx, rx) = frame_queue(options.queue_capacity);

    let spawned = {
        let shared = shared.clone();
        let signal = signal.clone();
        let idle_wait = options.idle_wait;
        telemetry::spawn_thread(PROCESSOR_THREAD, move || {
            run_processing_loop(backend, preview, rx, shared, signal, idle_wait)
        })
    };
    let consumer = match spawned {
        Ok(handle) => handle,
        Err(err) => {
            release_collaborators(source, input);
            return Err(err).context("Failed to spawn processing thread");
        }
    };
    info!("Pipeline started");

    let capture = run_capture_loop(source, input, &tx, &shared, options.variant, &signal);
    drop(tx);

    let processing = match consumer.join() {
        Ok(summary) => summary,
        Err(_) => {
            error!("Processing thread panicked");
            ProcessingSummary::default()
        }
    };

    release_collaborators(source, input);

    let final_params = shared.read_snapshot();
    let saved = match store.save(&final_params) {
        Ok(()) => {
            info!("Saved parameters to {}", store.path().display());
            true
        }
        Err(err) => {
            error!(
                "Failed to save parameters to {}: {err}",
                store.path().display()
            );
            false
        }
    };

    let report = RunReport {
        frames_captured: capture.frames_captured,
        frames_processed: processing.frames_processed,
        frames_dropped: capture.frames_dropped,
        frame_errors: processing.frame_errors,
        segments_drawn: processing.segments_drawn,
        stop_reason: signal.reason(),
        final_params,
        saved,
    };
    info!(
        "Pipeline stopped ({}): {} captured, {} processed, {} dropped, {} skipped",
        report
            .stop_reason
            .map_or("no reason recorded", StopReason::label),
        report.frames_captured,
        report.frames_processed,
        report.frames_dropped,
        report.frame_errors
    );
    Ok(report)
}

/// Hand the camera and the operator input back, whatever state the run is in.
fn release_collaborators<S, I>(source: &mut S, input: &mut I)
where
    S: FrameSource + ?Sized,
    I: ParameterInput + ?Sized,
{
    source.release();
    if let Err(err) = input.close() {
        warn!("Failed to close operator input: {err:#}");
    }
}

#[cfg(test)]
mod tests {
    use anyhow::bail;
    use video_ingest::{Frame, ScriptedSource};

    use super::*;
    use crate::params::SliderPositions;

    /// Input that counts close calls and refuses the last one.
    #[derive(Default)]
    struct StubbornInput {
        closes: u32,
    }

    impl ParameterInput for StubbornInput {
        fn read_positions(&mut self) -> Result<SliderPositions> {
            Ok(SliderPositions::default())
        }

        fn close(&mut self) -> Result<()> {
            self.closes += 1;
            bail!("window already gone")
        }
    }

    #[test]
    fn releasing_collaborators_survives_a_failed_close() {
        let frame = Frame::filled(2, 2, [0, 0, 0]).unwrap();
        let mut source = ScriptedSource::new(vec![frame]);
        let mut input = StubbornInput::default();

        release_collaborators(&mut source, &mut input);

        assert!(source.is_released());
        assert_eq!(input.closes, 1);
    }
}
