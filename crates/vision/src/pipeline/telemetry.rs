//! Telemetry helpers: the tracing subscriber, the Prometheus recorder and
//! dispatcher-aware thread spawning.

use std::{io, sync::OnceLock, thread};

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{debug, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, prelude::*};

static PROM_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the global subscriber: fmt output filtered by `RUST_LOG` (default
/// `info`) plus the span trace layer used by error reports.
///
/// Safe to call more than once; later calls keep the first subscriber.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let installed = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_names(true)
                .with_timer(fmt::time::uptime())
                .with_filter(env_filter),
        )
        .with(tracing_error::ErrorLayer::default())
        .try_init();
    if installed.is_err() {
        debug!("tracing subscriber already installed");
    }
}

/// Install the global metrics recorder once and return its handle.
///
/// Nothing is served over the network; the handle only renders snapshots.
/// Returns `None` when another recorder was installed first.
pub fn init_metrics_recorder() -> Option<&'static PrometheusHandle> {
    PROM_HANDLE
        .get_or_init(|| {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();
            match metrics::set_global_recorder(recorder) {
                Ok(()) => Some(handle),
                Err(err) => {
                    warn!("metrics recorder not installed: {err}");
                    None
                }
            }
        })
        .as_ref()
}

/// Access the Prometheus handle when already initialised.
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROM_HANDLE.get().and_then(Option::as_ref)
}

/// Log the rendered metrics at debug level.
pub fn log_metrics_snapshot() {
    if let Some(handle) = prometheus_handle() {
        handle.run_upkeep();
        debug!("metrics snapshot:\n{}", handle.render());
    }
}

/// Spawn a thread that inherits the current tracing dispatcher.
pub fn spawn_thread<F, T>(name: impl Into<String>, f: F) -> io::Result<thread::JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let dispatch = tracing::dispatcher::get_default(|current| current.clone());
    thread::Builder::new()
        .name(name.into())
        .spawn(move || tracing::dispatcher::with_default(&dispatch, f))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawned_thread_carries_its_name() {
        let handle = spawn_thread("line-processor", || {
            thread::current().name().map(str::to_owned)
        })
        .unwrap();
        assert_eq!(handle.join().unwrap().as_deref(), Some("line-processor"));
    }

    #[test]
    fn recorder_initialises_once() {
        let first = init_metrics_recorder().map(|h| h as *const PrometheusHandle);
        let second = init_metrics_recorder().map(|h| h as *const PrometheusHandle);
        assert_eq!(first, second);
        assert_eq!(prometheus_handle().is_some(), first.is_some());
    }
}
