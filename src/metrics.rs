//! Metrics collection and export for object pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Metrics data for a pool
///
/// # Examples
///
/// ```
/// use esox_connector_host::{ObjectPool, PoolConfiguration, PoolHandler, HandlerError};
///
/// struct Numbers;
///
/// impl PoolHandler<u32> for Numbers {
///     fn make_object(&self) -> Result<u32, HandlerError> {
///         Ok(7)
///     }
/// }
///
/// let pool = ObjectPool::new(Numbers, PoolConfiguration::default()).unwrap();
/// {
///     let _obj = pool.borrow_object().unwrap();
///     let metrics = pool.metrics();
///     assert_eq!(metrics.total_borrowed, 1);
///     assert_eq!(metrics.active_objects, 1);
/// }
/// assert_eq!(pool.metrics().total_returned, 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolMetrics {
    /// Total successful borrows
    pub total_borrowed: u64,

    /// Total objects returned
    pub total_returned: u64,

    /// Objects constructed by the handler
    pub total_created: u64,

    /// Objects disposed (evicted or failed)
    pub total_disposed: u64,

    /// Health checks that failed
    pub health_check_failures: u64,

    /// Borrows that gave up waiting for capacity
    pub exhausted_events: u64,

    /// Currently active objects
    pub active_objects: usize,

    /// Currently idle objects
    pub idle_objects: usize,

    /// Pool utilization ratio (0.0 to 1.0)
    pub utilization: f64,

    /// Configured maximum number of objects
    pub max_objects: usize,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_borrowed".to_string(), self.total_borrowed.to_string());
        metrics.insert("total_returned".to_string(), self.total_returned.to_string());
        metrics.insert("total_created".to_string(), self.total_created.to_string());
        metrics.insert("total_disposed".to_string(), self.total_disposed.to_string());
        metrics.insert(
            "health_check_failures".to_string(),
            self.health_check_failures.to_string(),
        );
        metrics.insert("exhausted_events".to_string(), self.exhausted_events.to_string());
        metrics.insert("active_objects".to_string(), self.active_objects.to_string());
        metrics.insert("idle_objects".to_string(), self.idle_objects.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics.insert("max_objects".to_string(), self.max_objects.to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "metrics")]
pub struct MetricsExporter;

#[cfg(feature = "metrics")]
impl MetricsExporter {
    /// Render metrics in the Prometheus text exposition format
    ///
    /// Every sample carries a `pool` label plus the given tags.
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_connector_host::{MetricsExporter, PoolMetrics};
    /// use std::collections::HashMap;
    ///
    /// let metrics = PoolMetrics {
    ///     total_borrowed: 3,
    ///     total_returned: 2,
    ///     total_created: 1,
    ///     total_disposed: 0,
    ///     health_check_failures: 0,
    ///     exhausted_events: 0,
    ///     active_objects: 1,
    ///     idle_objects: 0,
    ///     utilization: 0.1,
    ///     max_objects: 10,
    /// };
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = MetricsExporter::export_prometheus(&metrics, "ldap", Some(&tags)).unwrap();
    /// assert!(output.contains("connector_pool_objects_active"));
    /// assert!(output.contains("service=\"api\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> Result<String, prometheus::Error> {
        use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Opts, Registry, TextEncoder};

        let mut labels = HashMap::new();
        labels.insert("pool".to_string(), pool_name.to_string());
        if let Some(tags) = tags {
            labels.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        let opts = |name: &str, help: &str| Opts::new(name, help).const_labels(labels.clone());

        let registry = Registry::new();

        let gauges = [
            (
                "connector_pool_objects_active",
                "Current active objects",
                metrics.active_objects,
            ),
            (
                "connector_pool_objects_idle",
                "Current idle objects",
                metrics.idle_objects,
            ),
            (
                "connector_pool_objects_max",
                "Configured maximum objects",
                metrics.max_objects,
            ),
        ];
        for (name, help, value) in gauges {
            let gauge = IntGauge::with_opts(opts(name, help))?;
            gauge.set(value as i64);
            registry.register(Box::new(gauge))?;
        }

        let utilization = Gauge::with_opts(opts(
            "connector_pool_utilization",
            "Pool utilization ratio",
        ))?;
        utilization.set(metrics.utilization);
        registry.register(Box::new(utilization))?;

        let counters = [
            (
                "connector_pool_borrowed_total",
                "Total objects borrowed",
                metrics.total_borrowed,
            ),
            (
                "connector_pool_returned_total",
                "Total objects returned",
                metrics.total_returned,
            ),
            (
                "connector_pool_created_total",
                "Total objects created",
                metrics.total_created,
            ),
            (
                "connector_pool_disposed_total",
                "Total objects disposed",
                metrics.total_disposed,
            ),
            (
                "connector_pool_health_check_failures_total",
                "Failed health checks",
                metrics.health_check_failures,
            ),
            (
                "connector_pool_exhausted_total",
                "Borrows that timed out waiting for capacity",
                metrics.exhausted_events,
            ),
        ];
        for (name, help, value) in counters {
            let counter = IntCounter::with_opts(opts(name, help))?;
            counter.inc_by(value);
            registry.register(Box::new(counter))?;
        }

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Internal metrics tracker
#[derive(Default)]
pub(crate) struct MetricsTracker {
    pub total_borrowed: AtomicU64,
    pub total_returned: AtomicU64,
    pub total_created: AtomicU64,
    pub total_disposed: AtomicU64,
    pub health_check_failures: AtomicU64,
    pub exhausted_events: AtomicU64,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_metrics(&self, active: usize, idle: usize, max_objects: usize) -> PoolMetrics {
        let utilization = if max_objects > 0 {
            active as f64 / max_objects as f64
        } else {
            0.0
        };

        PoolMetrics {
            total_borrowed: self.total_borrowed.load(Ordering::Relaxed),
            total_returned: self.total_returned.load(Ordering::Relaxed),
            total_created: self.total_created.load(Ordering::Relaxed),
            total_disposed: self.total_disposed.load(Ordering::Relaxed),
            health_check_failures: self.health_check_failures.load(Ordering::Relaxed),
            exhausted_events: self.exhausted_events.load(Ordering::Relaxed),
            active_objects: active,
            idle_objects: idle,
            utilization,
            max_objects,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_snapshot() {
        let tracker = MetricsTracker::new();
        MetricsTracker::increment(&tracker.total_borrowed);
        MetricsTracker::increment(&tracker.total_borrowed);
        MetricsTracker::increment(&tracker.total_created);

        let metrics = tracker.get_metrics(2, 1, 4);
        assert_eq!(metrics.total_borrowed, 2);
        assert_eq!(metrics.total_created, 1);
        assert_eq!(metrics.utilization, 0.5);

        let exported = metrics.export();
        assert_eq!(exported.get("active_objects").map(String::as_str), Some("2"));
        assert_eq!(exported.get("utilization").map(String::as_str), Some("0.50"));
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn test_prometheus_export_has_pool_label() {
        let metrics = MetricsTracker::new().get_metrics(1, 2, 3);
        let output = MetricsExporter::export_prometheus(&metrics, "crm", None).unwrap();
        assert!(output.contains("# TYPE connector_pool_objects_idle gauge"));
        assert!(output.contains("connector_pool_objects_idle{pool=\"crm\"} 2"));
        assert!(output.contains("connector_pool_borrowed_total{pool=\"crm\"} 0"));
    }
}
