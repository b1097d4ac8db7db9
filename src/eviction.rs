//! Idle eviction policy

use crate::config::PoolConfiguration;
use std::fmt;
use std::time::Duration;

/// Decides whether the oldest idle object of a pool must go
///
/// The pool asks repeatedly, evicting the oldest idle object each time the
/// answer is `Some`, until the policy is satisfied.
///
/// # Examples
///
/// ```
/// use esox_connector_host::{EvictionPolicy, EvictionReason, PoolConfiguration};
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new()
///     .with_max_objects(4)
///     .with_max_idle(2)
///     .with_min_idle(1)
///     .with_min_evictable_idle(Duration::from_secs(60));
/// let policy = EvictionPolicy::from_configuration(&config);
///
/// // Above max_idle
/// assert_eq!(policy.should_evict(3, Some(Duration::ZERO), false), Some(EvictionReason::TooManyIdle));
/// // At min_idle nothing is evicted for age
/// assert_eq!(policy.should_evict(1, Some(Duration::from_secs(3600)), false), None);
/// // Shut down pools drop every idle object
/// assert_eq!(policy.should_evict(1, Some(Duration::ZERO), true), Some(EvictionReason::Shutdown));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionPolicy {
    pub max_idle: usize,
    pub min_idle: usize,
    pub min_evictable_idle: Duration,
}

/// Why an idle object was evicted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// The pool is shut down
    Shutdown,

    /// More idle objects than `max_idle`
    TooManyIdle,

    /// Idle for longer than `min_evictable_idle` while above `min_idle`
    IdleTooLong,
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Shutdown => "shutdown",
            Self::TooManyIdle => "too many idle objects",
            Self::IdleTooLong => "idle too long",
        };
        f.write_str(s)
    }
}

impl EvictionPolicy {
    pub fn from_configuration(config: &PoolConfiguration) -> Self {
        Self {
            max_idle: config.max_idle,
            min_idle: config.min_idle,
            min_evictable_idle: config.min_evictable_idle,
        }
    }

    /// Check the oldest idle object against the policy.
    ///
    /// `oldest_idle_age` is `None` when there are no idle objects.
    pub fn should_evict(
        &self,
        idle_count: usize,
        oldest_idle_age: Option<Duration>,
        is_shutdown: bool,
    ) -> Option<EvictionReason> {
        let age = oldest_idle_age?;
        if idle_count == 0 {
            return None;
        }
        if is_shutdown {
            return Some(EvictionReason::Shutdown);
        }
        if idle_count > self.max_idle {
            return Some(EvictionReason::TooManyIdle);
        }
        if idle_count <= self.min_idle {
            return None;
        }
        (age > self.min_evictable_idle).then_some(EvictionReason::IdleTooLong)
    }
}
