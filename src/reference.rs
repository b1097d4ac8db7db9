//! In-flight call tracking for idle facade detection

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;

/// Counts concurrent calls on one facade and remembers when it went quiet
///
/// The idle check is advisory: a call starting concurrently with
/// [`ReferenceCounter::is_unused_for`] may not be observed.
///
/// # Examples
///
/// ```
/// use esox_connector_host::ReferenceCounter;
/// use std::time::Duration;
///
/// let counter = ReferenceCounter::new();
/// counter.acquire();
/// assert!(!counter.is_unused_for(Duration::ZERO));
/// counter.release();
/// std::thread::sleep(Duration::from_millis(2));
/// assert!(counter.is_unused_for(Duration::from_millis(1)));
/// ```
#[derive(Debug)]
pub struct ReferenceCounter {
    in_flight: AtomicUsize,
    /// Nanoseconds since `origin` at the last transition to zero
    last_used: AtomicU64,
    origin: Instant,
}

impl Default for ReferenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceCounter {
    pub fn new() -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            last_used: AtomicU64::new(0),
            origin: Instant::now(),
        }
    }

    pub fn acquire(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    /// Drop one in-flight reference; the last one out stamps "last used".
    pub fn release(&self) {
        match self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| count.checked_sub(1))
        {
            Ok(1) => self.touch(),
            Ok(_) => {}
            Err(_) => {
                warn!("Reference counter released more often than acquired");
                self.touch();
            }
        }
    }

    /// Acquire and hand back a guard that releases on drop
    pub fn guard(self: &Arc<Self>) -> ReferenceGuard {
        self.acquire();
        ReferenceGuard {
            counter: Arc::clone(self),
        }
    }

    /// True iff nothing is in flight and the last call ended more than
    /// `duration` ago
    pub fn is_unused_for(&self, duration: Duration) -> bool {
        if self.in_flight.load(Ordering::Acquire) != 0 {
            return false;
        }
        let last_used = Duration::from_nanos(self.last_used.load(Ordering::Acquire));
        self.origin.elapsed().saturating_sub(last_used) > duration
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    fn touch(&self) {
        let nanos = u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.last_used.store(nanos, Ordering::Release);
    }
}

/// Scoped in-flight reference; released on every exit path
#[derive(Debug)]
#[must_use = "the reference is released as soon as the guard is dropped"]
pub struct ReferenceGuard {
    counter: Arc<ReferenceCounter>,
}

impl Drop for ReferenceGuard {
    fn drop(&mut self) {
        self.counter.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_in_flight_blocks_idle() {
        let counter = Arc::new(ReferenceCounter::new());
        let guard = counter.guard();
        thread::sleep(Duration::from_millis(5));
        assert!(!counter.is_unused_for(Duration::ZERO));
        assert_eq!(counter.in_flight(), 1);
        drop(guard);
        assert_eq!(counter.in_flight(), 0);
        assert!(!counter.is_unused_for(Duration::from_secs(60)));
    }

    #[test]
    fn test_nested_calls_stamp_on_last_release() {
        let counter = ReferenceCounter::new();
        counter.acquire();
        counter.acquire();
        counter.release();
        thread::sleep(Duration::from_millis(20));
        assert!(!counter.is_unused_for(Duration::from_millis(10)));
        counter.release();
        assert!(!counter.is_unused_for(Duration::from_millis(10)));
        thread::sleep(Duration::from_millis(20));
        assert!(counter.is_unused_for(Duration::from_millis(10)));
    }

    #[test]
    fn test_guard_released_on_panic() {
        let counter = Arc::new(ReferenceCounter::new());
        let c = Arc::clone(&counter);
        let result = thread::spawn(move || {
            let _guard = c.guard();
            panic!("operation blew up");
        })
        .join();
        assert!(result.is_err());
        assert_eq!(counter.in_flight(), 0);
    }

    #[test]
    fn test_unbalanced_release_does_not_underflow() {
        let counter = ReferenceCounter::new();
        counter.release();
        assert_eq!(counter.in_flight(), 0);
    }
}
