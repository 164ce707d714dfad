use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::params::ParameterSet;

/// The parameter record behind one mutual-exclusion guard.
///
/// Reads copy the whole record out and writes replace the whole record, each
/// inside a single critical section, so a reader never sees a mix of two
/// updates.
#[derive(Debug)]
pub struct SharedParameters {
    inner: Mutex<ParameterSet>,
}

impl SharedParameters {
    pub fn new(initial: ParameterSet) -> Self {
        Self {
            inner: Mutex::new(initial.clamped()),
        }
    }

    /// Consistent copy of every field as of one instant.
    pub fn read_snapshot(&self) -> ParameterSet {
        *self.lock()
    }

    /// Overwrite all fields at once. Values are clamped into their declared ranges.
    pub fn update(&self, params: ParameterSet) {
        *self.lock() = params.clamped();
    }

    // A writer that panicked mid-section still left a whole record behind.
    fn lock(&self) -> MutexGuard<'_, ParameterSet> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;
    use crate::params::{HoughParams, PipelineVariant, ThresholdBand};

    fn numbered(i: u8) -> ParameterSet {
        ParameterSet {
            band: ThresholdBand::new(i, i),
            hough: Some(HoughParams {
                vote_threshold: i32::from(i),
                min_segment_length: i32::from(i) % 100,
                max_segment_gap: i32::from(i) % 50,
                rho: 1.0,
            }),
        }
    }

    #[test]
    fn update_replaces_whole_record() {
        let shared = SharedParameters::new(ParameterSet::defaults(PipelineVariant::Extended));
        shared.update(numbered(7));
        assert_eq!(shared.read_snapshot(), numbered(7));
    }

    #[test]
    fn update_clamps_out_of_range_fields() {
        let shared = SharedParameters::new(ParameterSet::defaults(PipelineVariant::Extended));
        let mut params = numbered(3);
        if let Some(hough) = params.hough.as_mut() {
            hough.max_segment_gap = 500;
            hough.rho = 0.0;
        }
        shared.update(params);
        let hough = shared.read_snapshot().hough.unwrap();
        assert_eq!(hough.max_segment_gap, 50);
        assert_eq!(hough.rho, 0.01);
    }

    #[test]
    fn concurrent_readers_never_observe_torn_updates() {
        let shared = Arc::new(SharedParameters::new(numbered(0)));
        let writer = {
            let shared = shared.clone();
            thread::spawn(move || {
                for _ in 0..20 {
                    for i in 0..=255u8 {
                        shared.update(numbered(i));
                    }
                }
            })
        };

        let readers = (0..4)
            .map(|_| {
                let shared = shared.clone();
                thread::spawn(move || {
                    for _ in 0..5_000 {
                        let snapshot = shared.read_snapshot();
                        let i = snapshot.band.min;
                        assert_eq!(snapshot, numbered(i), "torn snapshot {snapshot:?}");
                    }
                })
            })
            .collect::<Vec<_>>();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }

    #[test]
    fn poisoned_lock_still_serves_last_record() {
        let shared = Arc::new(SharedParameters::new(numbered(9)));
        let poisoner = shared.clone();
        let _ = thread::spawn(move || {
            let _guard = poisoner.inner.lock().unwrap();
            panic!("poison the guard");
        })
        .join();

        assert_eq!(shared.read_snapshot(), numbered(9));
        shared.update(numbered(10));
        assert_eq!(shared.read_snapshot(), numbered(10));
    }
}
