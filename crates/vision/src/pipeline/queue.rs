//! Frame hand-off between the capture and processing threads.
//!
//! FIFO over a crossbeam channel. Unbounded by default, so the queue itself
//! never drops a frame and a slow consumer lets frames pile up. With a
//! capacity the producer evicts the oldest queued frame to make room instead
//! of blocking.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use thiserror::Error;
use video_ingest::Frame;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("frame queue closed")]
pub struct QueueClosed;

/// Result of a successful push.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// The queue was full and this many of the oldest entries were discarded.
    EvictedOldest(usize),
}

/// Producer half; only the capture loop holds it.
pub struct FrameSender<T = Frame> {
    tx: Sender<T>,
    evict: Option<Receiver<T>>,
}

/// Consumer half; only the processing loop holds it.
pub struct FrameReceiver<T = Frame> {
    rx: Receiver<T>,
}

/// Build a hand-off queue, unbounded when `capacity` is `None`.
pub fn frame_queue<T>(capacity: Option<usize>) -> (FrameSender<T>, FrameReceiver<T>) {
    match capacity {
        None => {
            let (tx, rx) = crossbeam_channel::unbounded();
            (FrameSender { tx, evict: None }, FrameReceiver { rx })
        }
        Some(capacity) => {
            let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
            let evict = Some(rx.clone());
            (FrameSender { tx, evict }, FrameReceiver { rx })
        }
    }
}

impl<T> FrameSender<T> {
    /// Enqueue without blocking. Ownership of `item` moves into the queue.
    pub fn push(&self, item: T) -> Result<PushOutcome, QueueClosed> {
        let mut pending = item;
        let mut evicted = 0;
        loop {
            match self.tx.try_send(pending) {
                Ok(()) if evicted == 0 => return Ok(PushOutcome::Queued),
                Ok(()) => return Ok(PushOutcome::EvictedOldest(evicted)),
                Err(TrySendError::Disconnected(_)) => return Err(QueueClosed),
                Err(TrySendError::Full(back)) => {
                    pending = back;
                    // Unbounded channels never report Full.
                    let Some(evict) = &self.evict else {
                        return Err(QueueClosed);
                    };
                    if evict.try_recv().is_ok() {
                        evicted += 1;
                    }
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

impl<T> FrameReceiver<T> {
    /// Non-blocking pop; `Ok(None)` when nothing is queued.
    pub fn try_pop(&self) -> Result<Option<T>, QueueClosed> {
        match self.rx.try_recv() {
            Ok(item) => Ok(Some(item)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(QueueClosed),
        }
    }

    /// Pop, waiting at most `idle` for a frame to arrive.
    ///
    /// The consumer uses this as its "yield briefly when empty" step so it
    /// neither spins nor sleeps past a frame that is already queued.
    pub fn pop_timeout(&self, idle: Duration) -> Result<Option<T>, QueueClosed> {
        match self.rx.recv_timeout(idle) {
            Ok(item) => Ok(Some(item)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(QueueClosed),
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn pops_in_push_order() {
        let (tx, rx) = frame_queue::<u32>(None);
        for i in 1..=3 {
            assert_eq!(tx.push(i), Ok(PushOutcome::Queued));
        }
        assert_eq!(rx.len(), 3);
        assert_eq!(rx.try_pop(), Ok(Some(1)));
        assert_eq!(rx.try_pop(), Ok(Some(2)));
        assert_eq!(rx.try_pop(), Ok(Some(3)));
        assert_eq!(rx.try_pop(), Ok(None));
    }

    #[test]
    fn empty_pop_times_out_without_error() {
        let (_tx, rx) = frame_queue::<u32>(None);
        assert_eq!(rx.pop_timeout(Duration::from_millis(5)), Ok(None));
    }

    #[test]
    fn closed_queue_is_reported_on_both_ends() {
        let (tx, rx) = frame_queue::<u32>(None);
        drop(rx);
        assert_eq!(tx.push(1), Err(QueueClosed));

        let (tx, rx) = frame_queue::<u32>(None);
        tx.push(5).unwrap();
        drop(tx);
        assert_eq!(rx.try_pop(), Ok(Some(5)));
        assert_eq!(rx.try_pop(), Err(QueueClosed));
    }

    #[test]
    fn bounded_queue_evicts_oldest() {
        let (tx, rx) = frame_queue::<u32>(Some(2));
        tx.push(1).unwrap();
        tx.push(2).unwrap();
        assert_eq!(tx.push(3), Ok(PushOutcome::EvictedOldest(1)));
        assert_eq!(rx.try_pop(), Ok(Some(2)));
        assert_eq!(rx.try_pop(), Ok(Some(3)));
        assert_eq!(rx.try_pop(), Ok(None));
    }

    #[test]
    fn cross_thread_transfer_neither_loses_nor_reorders() {
        let (tx, rx) = frame_queue::<u32>(None);
        let producer = thread::spawn(move || {
            for i in 0..10_000 {
                tx.push(i).unwrap();
            }
        });

        let mut seen = Vec::with_capacity(10_000);
        loop {
            match rx.pop_timeout(Duration::from_millis(10)) {
                Ok(Some(value)) => seen.push(value),
                Ok(None) => continue,
                Err(QueueClosed) => break,
            }
        }
        producer.join().unwrap();

        assert_eq!(seen, (0..10_000).collect::<Vec<_>>());
    }
}
