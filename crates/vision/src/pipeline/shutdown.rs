//! Shared running flag for the capture and processing loops.
//!
//! Either loop (or the Ctrl+C handler) may request a stop at any time and any
//! number of times; only the first request flips the flag and records its
//! reason. Once stopped the flag never returns to running.

use std::{
    fmt,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use tracing::debug;

/// Why the pipeline stopped.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The camera reported the end of its stream.
    StreamEnded,
    /// The camera failed to deliver a frame.
    CaptureFailed,
    /// The operator pressed the quit key on a preview window.
    OperatorQuit,
    /// The process received an interrupt signal.
    Interrupted,
    /// The processing thread exited without a quit request.
    ProcessorExited,
}

impl StopReason {
    pub fn label(self) -> &'static str {
        match self {
            StopReason::StreamEnded => "stream ended",
            StopReason::CaptureFailed => "capture failed",
            StopReason::OperatorQuit => "operator quit",
            StopReason::Interrupted => "interrupted",
            StopReason::ProcessorExited => "processor exited",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub struct ShutdownSignal {
    running: AtomicBool,
    reason: Mutex<Option<StopReason>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            reason: Mutex::new(None),
        }
    }

    /// Read once per loop iteration by both threads.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop both loops. Returns `true` only for the call that actually stopped them.
    pub fn request_stop(&self, reason: StopReason) -> bool {
        // The reason lock serialises competing first requests.
        let mut guard = self.reason.lock().unwrap_or_else(PoisonError::into_inner);
        if self
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        *guard = Some(reason);
        debug!("Stop requested: {reason}");
        true
    }

    /// Reason recorded by the first stop request, if any.
    pub fn reason(&self) -> Option<StopReason> {
        *self.reason.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownSignal")
            .field("running", &self.is_running())
            .field("reason", &self.reason())
            .finish()
    }
}

/// Requests a stop when dropped, so a thread that unwinds still releases its peer.
pub(crate) struct StopOnDrop {
    signal: Arc<ShutdownSignal>,
    reason: StopReason,
}

impl StopOnDrop {
    pub(crate) fn new(signal: Arc<ShutdownSignal>, reason: StopReason) -> Self {
        Self { signal, reason }
    }
}

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.signal.request_stop(self.reason);
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn first_request_wins_and_later_ones_are_no_ops() {
        let signal = ShutdownSignal::new();
        assert!(signal.is_running());
        assert_eq!(signal.reason(), None);

        assert!(signal.request_stop(StopReason::OperatorQuit));
        assert!(!signal.request_stop(StopReason::StreamEnded));
        assert!(!signal.request_stop(StopReason::OperatorQuit));

        assert!(!signal.is_running());
        assert_eq!(signal.reason(), Some(StopReason::OperatorQuit));
    }

    #[test]
    fn racing_requests_record_exactly_one_reason() {
        let signal = Arc::new(ShutdownSignal::new());
        let handles = [StopReason::StreamEnded, StopReason::OperatorQuit]
            .into_iter()
            .map(|reason| {
                let signal = signal.clone();
                thread::spawn(move || signal.request_stop(reason))
            })
            .collect::<Vec<_>>();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        assert!(signal.reason().is_some());
        assert!(!signal.is_running());
    }

    #[test]
    fn guard_stops_on_unwind() {
        let signal = Arc::new(ShutdownSignal::new());
        let guarded = signal.clone();
        let result = thread::spawn(move || {
            let _guard = StopOnDrop::new(guarded, StopReason::ProcessorExited);
            panic!("processor blew up");
        })
        .join();

        assert!(result.is_err());
        assert_eq!(signal.reason(), Some(StopReason::ProcessorExited));
    }

    #[test]
    fn guard_keeps_earlier_reason() {
        let signal = Arc::new(ShutdownSignal::new());
        {
            let _guard = StopOnDrop::new(signal.clone(), StopReason::ProcessorExited);
            signal.request_stop(StopReason::OperatorQuit);
        }
        assert_eq!(signal.reason(), Some(StopReason::OperatorQuit));
    }
}
