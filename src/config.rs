//! Pool and facade configuration

use crate::connector::ConfigurationChangeListener;
use crate::errors::{PoolError, PoolResult};
use crate::operation::OperationKind;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Tuning parameters for an object pool
///
/// # Examples
///
/// ```
/// use esox_connector_host::PoolConfiguration;
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new()
///     .with_max_objects(20)
///     .with_max_idle(5)
///     .with_min_idle(1)
///     .with_max_wait(Duration::from_millis(500));
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.max_objects, 20);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolConfiguration {
    /// Maximum number of objects, active and idle, the pool hands out
    pub max_objects: usize,

    /// Maximum number of idle objects kept around
    pub max_idle: usize,

    /// Idle objects at or below this count are never evicted for age
    pub min_idle: usize,

    /// How long a borrow waits for capacity before giving up
    pub max_wait: Duration,

    /// Idle age after which an object above `min_idle` is evicted
    pub min_evictable_idle: Duration,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            max_objects: 10,
            max_idle: 10,
            min_idle: 1,
            max_wait: Duration::from_secs(150),
            min_evictable_idle: Duration::from_secs(120),
        }
    }
}

impl PoolConfiguration {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_objects(mut self, max_objects: usize) -> Self {
        self.max_objects = max_objects;
        self
    }

    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }

    pub fn with_min_idle(mut self, min_idle: usize) -> Self {
        self.min_idle = min_idle;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn with_min_evictable_idle(mut self, min_evictable_idle: Duration) -> Self {
        self.min_evictable_idle = min_evictable_idle;
        self
    }

    /// Check `min_idle <= max_idle <= max_objects`.
    ///
    /// Values are never clamped; anything out of order is rejected.
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_connector_host::PoolConfiguration;
    ///
    /// let config = PoolConfiguration::new().with_max_objects(2).with_max_idle(3);
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> PoolResult<()> {
        if self.min_idle > self.max_idle {
            return Err(PoolError::InvalidConfiguration(format!(
                "min_idle ({}) is greater than max_idle ({})",
                self.min_idle, self.max_idle
            )));
        }
        if self.max_idle > self.max_objects {
            return Err(PoolError::InvalidConfiguration(format!(
                "max_idle ({}) is greater than max_objects ({})",
                self.max_idle, self.max_objects
            )));
        }
        Ok(())
    }
}

/// Raw configuration properties of a connector, `name -> value`.
///
/// Ordered so that two property sets with the same content compare and hash
/// equally, which lets them take part in a pool key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConfigurationProperties {
    values: BTreeMap<String, String>,
}

impl ConfigurationProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ConfigurationProperties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Per-facade configuration: connector properties, pool tuning and
/// per-operation timeouts
///
/// # Examples
///
/// ```
/// use esox_connector_host::{ApiConfiguration, OperationKind, PoolConfiguration};
/// use std::time::Duration;
///
/// let config = ApiConfiguration::new()
///     .with_property("host", "ldap.example.com")
///     .with_pool_configuration(PoolConfiguration::new().with_max_objects(4).with_max_idle(4))
///     .with_timeout(OperationKind::Search, Duration::from_secs(30));
///
/// assert_eq!(config.timeout(OperationKind::Search), Some(Duration::from_secs(30)));
/// assert_eq!(config.timeout(OperationKind::Create), None);
/// ```
#[derive(Clone, Default)]
pub struct ApiConfiguration {
    /// Connector configuration properties
    pub properties: ConfigurationProperties,

    /// Tuning of the connector pool
    pub pool_configuration: PoolConfiguration,

    /// Per-operation deadlines; operations without an entry are unbounded
    pub timeouts: HashMap<OperationKind, Duration>,

    /// Notified when a live connector configuration drifts from `properties`
    pub change_listener: Option<Arc<dyn ConfigurationChangeListener>>,
}

impl ApiConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_properties(mut self, properties: ConfigurationProperties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.set(name, value);
        self
    }

    pub fn with_pool_configuration(mut self, config: PoolConfiguration) -> Self {
        self.pool_configuration = config;
        self
    }

    pub fn with_timeout(mut self, operation: OperationKind, timeout: Duration) -> Self {
        self.timeouts.insert(operation, timeout);
        self
    }

    pub fn with_change_listener(mut self, listener: Arc<dyn ConfigurationChangeListener>) -> Self {
        self.change_listener = Some(listener);
        self
    }

    /// Deadline configured for `operation`, if any
    pub fn timeout(&self, operation: OperationKind) -> Option<Duration> {
        self.timeouts.get(&operation).copied()
    }
}

impl fmt::Debug for ApiConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfiguration")
            .field("properties", &self.properties)
            .field("pool_configuration", &self.pool_configuration)
            .field("timeouts", &self.timeouts)
            .field("change_listener", &self.change_listener.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(PoolConfiguration::default().validate().is_ok());
    }

    #[test]
    fn test_min_idle_above_max_idle_rejected() {
        let config = PoolConfiguration::new().with_max_idle(2).with_min_idle(3);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfiguration(_)));
        assert!(err.to_string().contains("min_idle"));
    }

    #[test]
    fn test_zero_capacity_is_valid() {
        let config = PoolConfiguration::new()
            .with_max_objects(0)
            .with_max_idle(0)
            .with_min_idle(0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_properties_equality_ignores_insertion_order() {
        let a = ConfigurationProperties::new()
            .with_property("host", "h")
            .with_property("port", "1");
        let b: ConfigurationProperties = [("port", "1"), ("host", "h")].into_iter().collect();
        assert_eq!(a, b);
        assert_eq!(b.get("host"), Some("h"));
        assert_eq!(b.len(), 2);
    }
}
