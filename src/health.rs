//! Point-in-time pool statistics and derived health

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Snapshot of a pool taken under its lock
///
/// # Examples
///
/// ```
/// use esox_connector_host::PoolStatistics;
///
/// let stats = PoolStatistics { idle: 1, active: 9 };
/// let health = stats.health(10);
/// assert!(!health.is_healthy());
/// assert_eq!(health.active_objects, 9);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolStatistics {
    /// Objects waiting in the idle queue
    pub idle: usize,

    /// Objects currently borrowed
    pub active: usize,
}

impl PoolStatistics {
    /// Derive a health report against the pool's `max_objects`
    pub fn health(&self, max_objects: usize) -> HealthStatus {
        HealthStatus::new(self.idle, self.active, max_objects)
    }
}

/// Health status of an object pool
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Current pool utilization (0.0 to 1.0)
    pub utilization: f64,

    /// Idle objects count
    pub idle_objects: usize,

    /// Active objects count
    pub active_objects: usize,

    /// Maximum number of objects
    pub max_objects: usize,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    /// Create a new health status
    pub fn new(idle: usize, active: usize, max_objects: usize) -> Self {
        let utilization = if max_objects > 0 {
            active as f64 / max_objects as f64
        } else {
            0.0
        };

        let mut warnings = Vec::new();
        let mut is_healthy = true;

        if utilization > 0.9 {
            warnings.push(format!("High utilization: {:.1}%", utilization * 100.0));
            is_healthy = false;
        }

        if max_objects == 0 {
            warnings.push("Pool has no capacity".to_string());
            is_healthy = false;
        } else if idle == 0 && active >= max_objects {
            warnings.push("Pool is exhausted".to_string());
        }

        Self {
            is_healthy,
            utilization,
            idle_objects: idle,
            active_objects: active,
            max_objects,
            warnings,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_utilization_is_healthy() {
        let health = PoolStatistics { idle: 2, active: 1 }.health(10);
        assert!(health.is_healthy());
        assert!(health.warnings.is_empty());
        assert!((health.utilization - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_exhausted_pool_warns() {
        let health = PoolStatistics { idle: 0, active: 4 }.health(4);
        assert!(!health.is_healthy());
        assert_eq!(health.warnings.len(), 2);
    }

    #[test]
    fn test_zero_capacity_is_unhealthy() {
        let health = PoolStatistics::default().health(0);
        assert!(!health.is_healthy());
        assert_eq!(health.utilization, 0.0);
    }
}
