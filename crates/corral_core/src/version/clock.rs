//! Monotonic commit-timestamp source.

use crate::types::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};

/// A strictly monotonic millisecond clock.
///
/// Commit timestamps must be unique and ordered per node even when the wall
/// clock stalls or steps backwards; each tick returns
/// `max(wall, last + 1)`. Stamps observed from other nodes are folded in so
/// a node never issues a stamp behind one it has already seen.
#[derive(Debug, Default)]
pub struct LogicalClock {
    last: AtomicU64,
}

impl LogicalClock {
    /// Creates a clock starting at the current wall time.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next timestamp, strictly greater than all previous ones.
    pub fn now(&self) -> Timestamp {
        let wall = Timestamp::wall().as_millis();
        let mut last = self.last.load(Ordering::SeqCst);
        loop {
            let next = wall.max(last + 1);
            match self.last.compare_exchange(
                last,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Timestamp::from_millis(next),
                Err(actual) => last = actual,
            }
        }
    }

    /// Folds in a stamp seen from elsewhere (a remote commit, a stored row).
    pub fn observe(&self, stamp: Timestamp) {
        self.last.fetch_max(stamp.as_millis(), Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strictly_increasing() {
        let clock = LogicalClock::new();
        let a = clock.now();
        let b = clock.now();
        let c = clock.now();
        assert!(a < b && b < c);
    }

    #[test]
    fn observe_advances_past_remote_stamp() {
        let clock = LogicalClock::new();
        let far_future = Timestamp::from_millis(u64::MAX - 10);
        clock.observe(far_future);
        assert!(clock.now() > far_future);
    }

    proptest::proptest! {
        #[test]
        fn now_always_exceeds_observed_stamps(millis in 0u64..u64::MAX / 2) {
            let clock = LogicalClock::new();
            clock.observe(Timestamp::from_millis(millis));
            proptest::prop_assert!(clock.now() > Timestamp::from_millis(millis));
        }
    }

    #[test]
    fn concurrent_ticks_are_unique() {
        use std::collections::HashSet;
        use std::sync::Arc;
        use std::thread;

        let clock = Arc::new(LogicalClock::new());
        let mut handles = vec![];
        for _ in 0..4 {
            let c = Arc::clone(&clock);
            handles.push(thread::spawn(move || {
                (0..250).map(|_| c.now()).collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for h in handles {
            for ts in h.join().unwrap() {
                assert!(seen.insert(ts), "duplicate stamp {ts}");
            }
        }
    }
}
