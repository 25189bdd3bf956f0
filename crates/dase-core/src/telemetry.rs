//! Non-blocking telemetry handoff
//!
//! Two-slot double buffer between the single real-time producer and any
//! number of non-real-time consumers. The producer writes with
//! `try_lock` and overwrites the oldest slot, so it never blocks, never
//! allocates, and never waits on a slow consumer; a consumer that falls
//! behind simply misses frames. Frame types are plain data, so the
//! overwrite drop is allocation-free.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct Shared<T> {
    slots: [Mutex<Option<T>>; 2],
    /// Index of the most recently published slot
    latest: AtomicUsize,
    /// Bumped after every successful publish
    sequence: AtomicU64,
}

/// Real-time producer side; exactly one per channel
pub struct TelemetryPublisher<T> {
    shared: Arc<Shared<T>>,
}

/// Consumer side; clone freely, each clone tracks its own position
pub struct TelemetrySubscriber<T> {
    shared: Arc<Shared<T>>,
    last_seen: u64,
}

/// Create a telemetry channel for one frame type
pub fn telemetry_channel<T: Clone>() -> (TelemetryPublisher<T>, TelemetrySubscriber<T>) {
    let shared = Arc::new(Shared {
        slots: [Mutex::new(None), Mutex::new(None)],
        latest: AtomicUsize::new(0),
        sequence: AtomicU64::new(0),
    });
    (
        TelemetryPublisher {
            shared: Arc::clone(&shared),
        },
        TelemetrySubscriber {
            shared,
            last_seen: 0,
        },
    )
}

impl<T: Clone> TelemetryPublisher<T> {
    /// Publish a frame without blocking
    ///
    /// Writes into the slot the consumers are not reading; if both slots
    /// are momentarily locked the frame is dropped and `false` returned.
    /// Newest data always wins; there is no backlog.
    pub fn publish(&self, frame: T) -> bool {
        let latest = self.shared.latest.load(Ordering::Acquire);
        let next = 1 - latest;

        for idx in [next, latest] {
            if let Ok(mut slot) = self.shared.slots[idx].try_lock() {
                *slot = Some(frame);
                self.shared.latest.store(idx, Ordering::Release);
                self.shared.sequence.fetch_add(1, Ordering::AcqRel);
                return true;
            }
        }
        false
    }
}

impl<T: Clone> TelemetrySubscriber<T> {
    /// Pull the newest frame if one was published since the last take
    ///
    /// Non-blocking; returns `None` when nothing new exists or the
    /// producer is mid-write on the latest slot (the next poll gets it).
    pub fn try_take(&mut self) -> Option<T> {
        let sequence = self.shared.sequence.load(Ordering::Acquire);
        if sequence == self.last_seen {
            return None;
        }

        let latest = self.shared.latest.load(Ordering::Acquire);
        let slot = self.shared.slots[latest].try_lock().ok()?;
        let frame = slot.clone()?;
        self.last_seen = sequence;
        Some(frame)
    }
}

impl<T> Clone for TelemetrySubscriber<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            last_seen: self.last_seen,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_channel_returns_none() {
        let (_tx, mut rx) = telemetry_channel::<u64>();
        assert_eq!(rx.try_take(), None);
    }

    #[test]
    fn test_latest_frame_wins() {
        let (tx, mut rx) = telemetry_channel();
        assert!(tx.publish(1u64));
        assert!(tx.publish(2));
        assert!(tx.publish(3));
        // Intermediate frames were overwritten, only the newest survives
        assert_eq!(rx.try_take(), Some(3));
        assert_eq!(rx.try_take(), None);
    }

    #[test]
    fn test_each_subscriber_sees_independently() {
        let (tx, mut a) = telemetry_channel();
        let mut b = a.clone();
        tx.publish(10u64);
        assert_eq!(a.try_take(), Some(10));
        // b has its own cursor and still sees the frame
        assert_eq!(b.try_take(), Some(10));
        assert_eq!(b.try_take(), None);
    }

    #[test]
    fn test_publish_survives_locked_slot() {
        let (tx, mut rx) = telemetry_channel();
        tx.publish(1u64);

        // Hold the latest slot like a slow consumer mid-read
        let latest = tx.shared.latest.load(Ordering::Acquire);
        let _guard = tx.shared.slots[latest].lock().unwrap();

        // Producer lands in the other slot without blocking
        assert!(tx.publish(2));
        drop(_guard);
        assert_eq!(rx.try_take(), Some(2));
    }

    #[test]
    fn test_publish_drops_when_both_slots_held() {
        let (tx, _rx) = telemetry_channel::<u64>();
        let _g0 = tx.shared.slots[0].lock().unwrap();
        let _g1 = tx.shared.slots[1].lock().unwrap();
        assert!(!tx.publish(5));
    }

    #[test]
    fn test_cross_thread_stream() {
        let (tx, mut rx) = telemetry_channel();
        let producer = std::thread::spawn(move || {
            for i in 0..10_000u64 {
                tx.publish(i);
            }
        });

        let mut last = 0;
        while !producer.is_finished() {
            if let Some(v) = rx.try_take() {
                // Frames only ever move forward
                assert!(v >= last);
                last = v;
            }
        }
        producer.join().unwrap();
        if let Some(v) = rx.try_take() {
            assert!(v >= last);
        }
    }
}
