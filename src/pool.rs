//! Bounded, health-checked object pool

use crate::config::PoolConfiguration;
use crate::errors::{HandlerError, PoolError, PoolResult};
use crate::eviction::{EvictionPolicy, EvictionReason};
use crate::health::PoolStatistics;
use crate::metrics::{MetricsTracker, PoolMetrics};

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::ptr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Lifecycle capabilities the pool delegates to
///
/// The pool knows nothing about what it stores; construction, liveness
/// checks and disposal all go through the handler.
pub trait PoolHandler<T>: Send + Sync {
    /// Copy and check the pool configuration before the pool is built.
    fn validate(&self, original: &PoolConfiguration) -> PoolResult<PoolConfiguration> {
        let config = original.clone();
        config.validate()?;
        Ok(config)
    }

    /// Build a new object. Called whenever the pool needs one.
    fn make_object(&self) -> Result<T, HandlerError>;

    /// Liveness check run on every object before it is handed out.
    fn test_object(&self, _object: &T) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Release an object dropped from the pool.
    fn dispose_object(&self, object: T) -> Result<(), HandlerError> {
        drop(object);
        Ok(())
    }

    /// Release anything shared by the objects this handler built.
    fn shutdown(&self) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// Token identifying one object tracked by a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Book-keeping the pool keeps for every object it tracks
#[derive(Debug, Clone, Copy)]
struct ObjectRecord {
    is_active: bool,
    /// Last change from active to idle or back
    last_state_change: Instant,
    /// Never been returned to the pool
    is_new: bool,
}

impl ObjectRecord {
    fn new() -> Self {
        Self {
            is_active: false,
            last_state_change: Instant::now(),
            is_new: true,
        }
    }

    fn set_active(&mut self, active: bool) {
        if self.is_active != active {
            self.last_state_change = Instant::now();
            self.is_active = active;
        }
    }
}

struct IdleEntry<T> {
    id: ObjectId,
    object: T,
    record: ObjectRecord,
}

struct PoolState<T> {
    active: HashMap<ObjectId, ObjectRecord>,
    /// Longest idle first
    idle: VecDeque<IdleEntry<T>>,
    /// Capacity reserved by borrowers constructing outside the lock
    constructing: usize,
    is_shutdown: bool,
    next_id: u64,
}

impl<T> PoolState<T> {
    fn allocate_id(&mut self) -> ObjectId {
        self.next_id += 1;
        ObjectId(self.next_id)
    }
}

struct Candidate<T> {
    id: ObjectId,
    object: T,
    is_new: bool,
}

struct PoolShared<T> {
    handler: Box<dyn PoolHandler<T>>,
    config: PoolConfiguration,
    eviction: EvictionPolicy,
    state: Mutex<PoolState<T>>,
    available: Condvar,
    metrics: MetricsTracker,
}

impl<T: Send + 'static> PoolShared<T> {
    fn return_object(&self, id: ObjectId, object: T) -> PoolResult<()> {
        let evicted = {
            let mut state = self.state.lock();
            let Some(mut record) = state.active.remove(&id) else {
                drop(state);
                self.dispose_quietly(id, object);
                return Err(PoolError::InvalidReturn);
            };

            // May be evicted right away if we are over the limit or shut down
            record.set_active(false);
            record.is_new = false;
            state.idle.push_back(IdleEntry { id, object, record });
            MetricsTracker::increment(&self.metrics.total_returned);

            let evicted = self.evict_idle(&mut state);
            self.available.notify_all();
            evicted
        };
        self.dispose_evicted(evicted);
        Ok(())
    }

    /// Pop idle objects until the eviction policy is satisfied.
    fn evict_idle(&self, state: &mut PoolState<T>) -> Vec<(IdleEntry<T>, EvictionReason)> {
        let now = Instant::now();
        let mut evicted = Vec::new();
        loop {
            let oldest_age = state
                .idle
                .front()
                .map(|entry| now.saturating_duration_since(entry.record.last_state_change));
            let Some(reason) =
                self.eviction
                    .should_evict(state.idle.len(), oldest_age, state.is_shutdown)
            else {
                break;
            };
            let Some(entry) = state.idle.pop_front() else {
                break;
            };
            evicted.push((entry, reason));
        }
        evicted
    }

    fn dispose_evicted(&self, evicted: Vec<(IdleEntry<T>, EvictionReason)>) {
        for (entry, reason) in evicted {
            debug!(object = %entry.id, %reason, "Evicting idle object");
            self.dispose_quietly(entry.id, entry.object);
        }
    }

    fn dispose_quietly(&self, id: ObjectId, object: T) {
        MetricsTracker::increment(&self.metrics.total_disposed);
        if let Err(e) = self.handler.dispose_object(object) {
            let error = PoolError::Disposal(e);
            warn!(object = %id, %error, "dispose_object() is not supposed to fail");
        }
    }
}

/// A borrowed object that goes back to its pool when dropped
///
/// Use [`PooledObject::release`] to return it explicitly and observe the
/// outcome.
pub struct PooledObject<T: Send + 'static> {
    id: ObjectId,
    object: ManuallyDrop<T>,
    pool: Arc<PoolShared<T>>,
}

impl<T: Send + 'static> PooledObject<T> {
    fn new(id: ObjectId, object: T, pool: Arc<PoolShared<T>>) -> Self {
        Self {
            id,
            object: ManuallyDrop::new(object),
            pool,
        }
    }

    /// Token of the borrowed object within its pool
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Return the object to its pool now
    pub fn release(self) -> PoolResult<()> {
        let mut guard = ManuallyDrop::new(self);
        // SAFETY: `guard` is never dropped, so both fields are moved out once
        let (object, pool) = unsafe {
            (
                ManuallyDrop::take(&mut guard.object),
                ptr::read(&guard.pool),
            )
        };
        pool.return_object(guard.id, object)
    }
}

impl<T: Send + 'static> Deref for PooledObject<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.object
    }
}

impl<T: Send + 'static> DerefMut for PooledObject<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.object
    }
}

impl<T: Send + 'static> Drop for PooledObject<T> {
    fn drop(&mut self) {
        // SAFETY: the object is not touched again after drop
        let object = unsafe { ManuallyDrop::take(&mut self.object) };
        if let Err(error) = self.pool.return_object(self.id, object) {
            warn!(object = %self.id, %error, "Failed to return pooled object");
        }
    }
}

impl<T: Send + 'static> fmt::Debug for PooledObject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledObject").field("id", &self.id).finish()
    }
}

/// Thread-safe pool of expensive, stateful objects
///
/// Objects are created on demand up to `max_objects`, checked with the
/// handler before every hand-out, and evicted when idle according to
/// [`EvictionPolicy`]. Borrowers block up to `max_wait` for capacity.
///
/// # Examples
///
/// ```
/// use esox_connector_host::{HandlerError, ObjectPool, PoolConfiguration, PoolHandler};
///
/// struct Sessions;
///
/// impl PoolHandler<String> for Sessions {
///     fn make_object(&self) -> Result<String, HandlerError> {
///         Ok("session".to_string())
///     }
/// }
///
/// let pool = ObjectPool::new(Sessions, PoolConfiguration::default()).unwrap();
/// {
///     let session = pool.borrow_object().unwrap();
///     assert_eq!(session.as_str(), "session");
/// }
/// assert_eq!(pool.statistics().idle, 1);
/// ```
pub struct ObjectPool<T: Send + 'static> {
    shared: Arc<PoolShared<T>>,
}

impl<T: Send + 'static> Clone for ObjectPool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static> ObjectPool<T> {
    /// Create a pool; the handler validates a private copy of `config`
    pub fn new<H>(handler: H, config: PoolConfiguration) -> PoolResult<Self>
    where
        H: PoolHandler<T> + 'static,
    {
        let config = handler.validate(&config)?;
        Ok(Self {
            shared: Arc::new(PoolShared {
                handler: Box::new(handler),
                eviction: EvictionPolicy::from_configuration(&config),
                config,
                state: Mutex::new(PoolState {
                    active: HashMap::new(),
                    idle: VecDeque::new(),
                    constructing: 0,
                    is_shutdown: false,
                    next_id: 0,
                }),
                available: Condvar::new(),
                metrics: MetricsTracker::new(),
            }),
        })
    }

    /// Borrow an object, blocking up to `max_wait` for one to become available
    ///
    /// Idle objects are reused oldest first; otherwise a new one is built if
    /// the pool is below `max_objects`. The health check runs outside the
    /// pool lock. A recycled object that fails it is disposed and the borrow
    /// retries; a freshly built one fails the borrow.
    pub fn borrow_object(&self) -> PoolResult<PooledObject<T>> {
        loop {
            let candidate = self.borrow_candidate()?;
            match self.shared.handler.test_object(&candidate.object) {
                Ok(()) => {
                    MetricsTracker::increment(&self.shared.metrics.total_borrowed);
                    return Ok(PooledObject::new(
                        candidate.id,
                        candidate.object,
                        Arc::clone(&self.shared),
                    ));
                }
                Err(e) => {
                    MetricsTracker::increment(&self.shared.metrics.health_check_failures);
                    {
                        let mut state = self.shared.state.lock();
                        state.active.remove(&candidate.id);
                        self.shared.available.notify_all();
                    }
                    self.shared.dispose_quietly(candidate.id, candidate.object);
                    if candidate.is_new {
                        return Err(PoolError::Construction(e));
                    }
                    let error = PoolError::Unhealthy(e);
                    warn!(object = %candidate.id, %error, "Discarding pooled object");
                }
            }
        }
    }

    /// Borrow without the health check; the caller tests outside the lock.
    fn borrow_candidate(&self) -> PoolResult<Candidate<T>> {
        let shared = &self.shared;
        let start = Instant::now();

        let mut state = shared.state.lock();
        let evicted = shared.evict_idle(&mut state);
        if !evicted.is_empty() {
            MutexGuard::unlocked(&mut state, || shared.dispose_evicted(evicted));
        }

        loop {
            if state.is_shutdown {
                return Err(PoolError::PoolShutdown);
            }

            if let Some(IdleEntry {
                id,
                object,
                mut record,
            }) = state.idle.pop_front()
            {
                record.set_active(true);
                state.active.insert(id, record);
                return Ok(Candidate {
                    id,
                    object,
                    is_new: false,
                });
            }

            if state.active.len() + state.constructing < shared.config.max_objects {
                state.constructing += 1;
                let made = MutexGuard::unlocked(&mut state, || shared.handler.make_object());
                state.constructing -= 1;

                let object = match made {
                    Ok(object) => object,
                    Err(e) => {
                        shared.available.notify_all();
                        return Err(PoolError::Construction(e));
                    }
                };
                MetricsTracker::increment(&shared.metrics.total_created);

                let id = state.allocate_id();
                if state.is_shutdown {
                    drop(state);
                    shared.dispose_quietly(id, object);
                    return Err(PoolError::PoolShutdown);
                }

                let mut record = ObjectRecord::new();
                record.set_active(true);
                state.active.insert(id, record);
                return Ok(Candidate {
                    id,
                    object,
                    is_new: record.is_new,
                });
            }

            let remaining = shared.config.max_wait.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                MetricsTracker::increment(&shared.metrics.exhausted_events);
                return Err(PoolError::PoolExhausted(shared.config.max_wait));
            }
            shared.available.wait_for(&mut state, remaining);
        }
    }

    /// Borrow on a blocking worker thread so async callers are not stalled
    pub async fn borrow_object_async(&self) -> PoolResult<PooledObject<T>> {
        let pool = self.clone();
        tokio::task::spawn_blocking(move || pool.borrow_object())
            .await
            .map_err(|_| PoolError::Cancelled)?
    }

    /// Return a borrowed object
    ///
    /// Fails with [`PoolError::InvalidReturn`] if `object` was borrowed from
    /// a different pool; that object then goes back to its own pool.
    pub fn return_object(&self, object: PooledObject<T>) -> PoolResult<()> {
        if !Arc::ptr_eq(&object.pool, &self.shared) {
            return Err(PoolError::InvalidReturn);
        }
        object.release()
    }

    /// Shut the pool down
    ///
    /// Idle objects are disposed at once; active ones are left alone and
    /// disposed when they come back. Waiting borrowers fail with
    /// [`PoolError::PoolShutdown`].
    pub fn shutdown(&self) -> PoolResult<()> {
        let evicted = {
            let mut state = self.shared.state.lock();
            if state.is_shutdown {
                return Ok(());
            }
            state.is_shutdown = true;
            let evicted = self.shared.evict_idle(&mut state);
            self.shared.available.notify_all();
            evicted
        };
        self.shared.dispose_evicted(evicted);
        debug!("Object pool shut down");
        self.shared
            .handler
            .shutdown()
            .map_err(PoolError::HandlerShutdown)
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.state.lock().is_shutdown
    }

    /// Snapshot of idle and active counts
    pub fn statistics(&self) -> PoolStatistics {
        let state = self.shared.state.lock();
        PoolStatistics {
            idle: state.idle.len(),
            active: state.active.len(),
        }
    }

    /// Validated configuration this pool runs with
    pub fn configuration(&self) -> &PoolConfiguration {
        &self.shared.config
    }

    pub fn metrics(&self) -> PoolMetrics {
        let stats = self.statistics();
        self.shared
            .metrics
            .get_metrics(stats.active, stats.idle, self.shared.config.max_objects)
    }

    /// Whether both handles refer to the same pool
    pub fn same_pool(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl<T: Send + 'static> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("config", &self.shared.config)
            .field("statistics", &self.statistics())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    /// Hands out increasing numbers and records what it disposed.
    #[derive(Default)]
    struct Counting {
        made: AtomicUsize,
        disposed: Mutex<Vec<usize>>,
        fail_test: AtomicBool,
        unhealthy: Mutex<Vec<usize>>,
        fail_make: AtomicBool,
        fail_dispose: AtomicBool,
        shutdown_calls: AtomicUsize,
    }

    impl PoolHandler<usize> for Arc<Counting> {
        fn make_object(&self) -> Result<usize, HandlerError> {
            if self.fail_make.load(Ordering::SeqCst) {
                return Err("cannot connect".into());
            }
            Ok(self.made.fetch_add(1, Ordering::SeqCst))
        }

        fn test_object(&self, object: &usize) -> Result<(), HandlerError> {
            if self.fail_test.load(Ordering::SeqCst) || self.unhealthy.lock().contains(object) {
                return Err("dead".into());
            }
            Ok(())
        }

        fn dispose_object(&self, object: usize) -> Result<(), HandlerError> {
            self.disposed.lock().push(object);
            if self.fail_dispose.load(Ordering::SeqCst) {
                return Err("dispose failed".into());
            }
            Ok(())
        }

        fn shutdown(&self) -> Result<(), HandlerError> {
            self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config(max_objects: usize, max_idle: usize, min_idle: usize) -> PoolConfiguration {
        PoolConfiguration::new()
            .with_max_objects(max_objects)
            .with_max_idle(max_idle)
            .with_min_idle(min_idle)
            .with_max_wait(Duration::from_millis(100))
            .with_min_evictable_idle(Duration::from_secs(1))
    }

    fn pool(config: PoolConfiguration) -> (Arc<Counting>, ObjectPool<usize>) {
        let handler = Arc::new(Counting::default());
        let pool = ObjectPool::new(Arc::clone(&handler), config).unwrap();
        (handler, pool)
    }

    #[test]
    fn test_guard_hands_back_mutated_object() {
        let (_, pool) = pool(config(1, 1, 0));
        {
            let mut object = pool.borrow_object().unwrap();
            *object += 40;
            assert_eq!(Arc::strong_count(&pool.shared), 2);
        }
        assert_eq!(Arc::strong_count(&pool.shared), 1);

        let mut object = pool.borrow_object().unwrap();
        assert_eq!(*object, 40);
        *object += 2;
        object.release().unwrap();
        assert_eq!(Arc::strong_count(&pool.shared), 1);
        assert_eq!(*pool.borrow_object().unwrap(), 42);
    }

    #[test]
    fn test_invalid_configuration_fails_creation() {
        let handler = Arc::new(Counting::default());
        let result = ObjectPool::new(handler, config(1, 2, 0));
        assert!(matches!(result, Err(PoolError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_reuses_idle_and_trims_to_max_idle() {
        let (handler, pool) = pool(config(2, 1, 0));

        let a = pool.borrow_object().unwrap();
        let b = pool.borrow_object().unwrap();
        let (a_value, b_value) = (*a, *b);
        assert_eq!(pool.statistics(), PoolStatistics { idle: 0, active: 2 });

        a.release().unwrap();
        assert_eq!(pool.statistics(), PoolStatistics { idle: 1, active: 1 });

        let again = pool.borrow_object().unwrap();
        assert_eq!(*again, a_value);
        assert_eq!(handler.made.load(Ordering::SeqCst), 2);

        again.release().unwrap();
        b.release().unwrap();

        assert_eq!(pool.statistics(), PoolStatistics { idle: 1, active: 0 });
        let disposed = handler.disposed.lock().clone();
        assert_eq!(disposed.len(), 1);
        assert!(disposed[0] == a_value || disposed[0] == b_value);
    }

    #[test]
    fn test_zero_capacity_waits_full_max_wait() {
        let (_, pool) = pool(config(0, 0, 0));
        let start = Instant::now();
        let err = pool.borrow_object().unwrap_err();
        assert!(matches!(err, PoolError::PoolExhausted(_)));
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert_eq!(pool.metrics().exhausted_events, 1);
    }

    #[test]
    fn test_new_object_failing_health_check_is_not_retried() {
        let (handler, pool) = pool(config(2, 2, 0));
        handler.fail_test.store(true, Ordering::SeqCst);

        let err = pool.borrow_object().unwrap_err();
        assert!(matches!(err, PoolError::Construction(_)));
        assert_eq!(handler.made.load(Ordering::SeqCst), 1);
        assert_eq!(handler.disposed.lock().as_slice(), &[0]);
        assert_eq!(pool.statistics(), PoolStatistics { idle: 0, active: 0 });
    }

    #[test]
    fn test_unhealthy_recycled_object_is_replaced() {
        let (handler, pool) = pool(config(2, 2, 0));
        pool.borrow_object().unwrap().release().unwrap();
        handler.unhealthy.lock().push(0);

        let obj = pool.borrow_object().unwrap();
        assert_eq!(*obj, 1);
        assert_eq!(handler.disposed.lock().as_slice(), &[0]);
        assert_eq!(pool.statistics(), PoolStatistics { idle: 0, active: 1 });
        assert_eq!(pool.metrics().health_check_failures, 1);
    }

    #[test]
    fn test_construction_failure_propagates() {
        let (handler, pool) = pool(config(1, 1, 0));
        handler.fail_make.store(true, Ordering::SeqCst);
        assert!(matches!(
            pool.borrow_object(),
            Err(PoolError::Construction(_))
        ));

        // Reservation released: the next borrow can build
        handler.fail_make.store(false, Ordering::SeqCst);
        assert!(pool.borrow_object().is_ok());
    }

    #[test]
    fn test_min_idle_protects_from_age_eviction() {
        let config = config(3, 3, 1).with_min_evictable_idle(Duration::ZERO);
        let (handler, pool) = pool(config);

        let a = pool.borrow_object().unwrap();
        let b = pool.borrow_object().unwrap();
        a.release().unwrap();
        b.release().unwrap();
        thread::sleep(Duration::from_millis(5));

        // Aged out down to min_idle, never below
        let c = pool.borrow_object().unwrap();
        assert_eq!(handler.disposed.lock().len(), 1);
        drop(c);
        thread::sleep(Duration::from_millis(5));
        assert_eq!(pool.statistics().idle, 1);
        let _ = pool.borrow_object().unwrap();
        assert_eq!(handler.disposed.lock().len(), 1);
    }

    #[test]
    fn test_shutdown_disposes_idle_and_rejects_borrows() {
        let (handler, pool) = pool(config(3, 3, 0));
        let held = pool.borrow_object().unwrap();
        let held_value = *held;
        pool.borrow_object().unwrap().release().unwrap();
        assert_eq!(pool.statistics().idle, 1);

        pool.shutdown().unwrap();
        assert_eq!(handler.disposed.lock().len(), 1);
        assert_eq!(handler.shutdown_calls.load(Ordering::SeqCst), 1);
        assert!(matches!(pool.borrow_object(), Err(PoolError::PoolShutdown)));

        // Late return is accepted and disposed straight away
        held.release().unwrap();
        assert_eq!(pool.statistics(), PoolStatistics::default());
        assert_eq!(handler.disposed.lock().last(), Some(&held_value));

        // Second shutdown is a no-op
        pool.shutdown().unwrap();
        assert_eq!(handler.shutdown_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disposal_failure_is_swallowed() {
        let (handler, pool) = pool(config(1, 0, 0));
        handler.fail_dispose.store(true, Ordering::SeqCst);
        pool.borrow_object().unwrap().release().unwrap();
        assert_eq!(handler.disposed.lock().len(), 1);
    }

    #[test]
    fn test_foreign_return_is_rejected() {
        let (_, first) = pool(config(1, 1, 0));
        let (_, second) = pool(config(1, 1, 0));
        let obj = second.borrow_object().unwrap();
        assert!(matches!(
            first.return_object(obj),
            Err(PoolError::InvalidReturn)
        ));
        // The object went home to its own pool
        assert_eq!(second.statistics(), PoolStatistics { idle: 1, active: 0 });
    }

    #[test]
    fn test_shutdown_wakes_waiters() {
        let (_, pool) = pool(config(1, 1, 0).with_max_wait(Duration::from_secs(10)));
        let held = pool.borrow_object().unwrap();

        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || pool.borrow_object().map(|_| ()))
        };
        thread::sleep(Duration::from_millis(50));
        let start = Instant::now();
        pool.shutdown().unwrap();
        assert!(matches!(waiter.join().unwrap(), Err(PoolError::PoolShutdown)));
        assert!(start.elapsed() < Duration::from_secs(5));
        drop(held);
    }

    #[test]
    fn test_active_never_exceeds_max_objects() {
        let (_, pool) = pool(config(3, 3, 0).with_max_wait(Duration::from_secs(5)));
        let in_use = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                let in_use = Arc::clone(&in_use);
                let peak = Arc::clone(&peak);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let obj = pool.borrow_object().unwrap();
                        let now = in_use.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        assert!(pool.statistics().active <= 3);
                        thread::yield_now();
                        in_use.fetch_sub(1, Ordering::SeqCst);
                        drop(obj);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        let metrics = pool.metrics();
        assert_eq!(metrics.total_borrowed, 400);
        assert_eq!(metrics.total_returned, 400);
        assert!(metrics.total_created <= 3);
    }

    #[tokio::test]
    async fn test_async_borrow() {
        let (_, pool) = pool(config(1, 1, 0));
        let obj = pool.borrow_object_async().await.unwrap();
        assert_eq!(*obj, 0);
    }
}
