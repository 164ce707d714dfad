//! Interactive session: camera, trackbars and preview windows around the
//! line pipeline.

use std::sync::Arc;

use anyhow::{Context, Result};
use opencv::highgui;
use tracing::{info, warn};
use video_ingest::OpenCvCamera;
use vision::{
    Collaborators, ConfigStore, RuntimeConfig, ShutdownSignal, StopReason,
    detection::opencv_backend::OpenCvBackend,
    highgui::{HighGuiPreview, HighGuiTrackbars},
    pipeline::telemetry,
};

pub fn run(config: RuntimeConfig) -> Result<()> {
    let store = ConfigStore::new(&config.config_path, config.variant);
    let initial = store.load();

    let mut camera = OpenCvCamera::open(config.camera_index)
        .with_context(|| format!("Camera #{} could not be opened", config.camera_index))?;
    info!(
        "Opened camera #{} ({} variant, parameters in {})",
        camera.device_index(),
        config.variant,
        store.path().display()
    );

    let mut trackbars =
        HighGuiTrackbars::create(&initial).context("Failed to create settings window")?;

    let signal = Arc::new(ShutdownSignal::new());
    install_interrupt_handler(signal.clone());

    let report = vision::run(
        &store,
        initial,
        Collaborators {
            source: &mut camera,
            input: &mut trackbars,
            backend: OpenCvBackend::new(),
            preview: HighGuiPreview::new(),
        },
        &config.pipeline_options(),
        signal,
    )?;

    info!(
        "Session finished: {} segment(s) drawn over {} frame(s), parameters {}",
        report.segments_drawn,
        report.frames_processed,
        if report.saved { "saved" } else { "not saved" }
    );
    telemetry::log_metrics_snapshot();

    if let Err(err) = highgui::destroy_all_windows() {
        warn!("Failed to destroy windows: {err}");
    }
    Ok(())
}

fn install_interrupt_handler(signal: Arc<ShutdownSignal>) {
    if let Err(err) = ctrlc::set_handler(move || {
        signal.request_stop(StopReason::Interrupted);
    }) {
        warn!("Failed to install Ctrl+C handler: {err}");
    }
}
