//! Process-wide registry of connector pools

use crate::config::{ApiConfiguration, ConfigurationProperties, PoolConfiguration};
use crate::connector::{Configuration, Connector, ConnectorDescriptor, ConnectorKey};
use crate::context::OperationalContext;
use crate::errors::{ConnectorError, ConnectorResult, HandlerError};
use crate::pool::{ObjectPool, PoolHandler};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

/// Pool of connector instances
pub type ConnectorPool = ObjectPool<Box<dyn Connector>>;

/// Identity of a pool: connector, effective properties and pool tuning
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub connector: ConnectorKey,
    pub properties: ConfigurationProperties,
    pub pool_configuration: PoolConfiguration,
}

impl PoolKey {
    pub fn new(descriptor: &ConnectorDescriptor, configuration: &ApiConfiguration) -> Self {
        Self {
            connector: descriptor.key.clone(),
            properties: configuration.properties.clone(),
            pool_configuration: configuration.pool_configuration.clone(),
        }
    }
}

/// Lifecycle handler behind every connector pool
pub struct ConnectorPoolHandler {
    descriptor: Arc<ConnectorDescriptor>,
    api_configuration: Arc<ApiConfiguration>,
    /// Present for stateful configurations: one instance shared by every
    /// connector this handler builds
    context: Option<OperationalContext>,
}

impl ConnectorPoolHandler {
    pub fn new(descriptor: Arc<ConnectorDescriptor>, api_configuration: Arc<ApiConfiguration>) -> Self {
        let context = descriptor.stateful_configuration.then(|| {
            OperationalContext::new(Arc::clone(&descriptor), Arc::clone(&api_configuration))
        });
        Self {
            descriptor,
            api_configuration,
            context,
        }
    }

    fn configuration(&self) -> ConnectorResult<Arc<dyn Configuration>> {
        if let Some(context) = &self.context {
            return context.configuration();
        }
        let configuration = self
            .descriptor
            .binder
            .build(&self.api_configuration.properties)?;
        self.watch_changes(&configuration);
        Ok(configuration)
    }

    /// Forward drift between the live configuration and the facade's
    /// properties to the change listener, if there is one.
    fn watch_changes(&self, configuration: &Arc<dyn Configuration>) {
        let Some(listener) = self.api_configuration.change_listener.clone() else {
            return;
        };
        let live = Arc::downgrade(configuration);
        let binder = Arc::clone(&self.descriptor.binder);
        let prior = self.api_configuration.properties.clone();
        let connector = self.descriptor.key.clone();

        configuration.set_change_callback(Arc::new(move || {
            let Some(live) = live.upgrade() else {
                return;
            };
            match binder.diff(&prior, live.as_ref()) {
                Ok(changes) if !changes.is_empty() => listener.configuration_changed(&changes),
                Ok(_) => {}
                Err(error) => {
                    warn!(%connector, %error, "Configuration change notification failed");
                }
            }
        }));
    }
}

impl PoolHandler<Box<dyn Connector>> for ConnectorPoolHandler {
    fn make_object(&self) -> Result<Box<dyn Connector>, HandlerError> {
        if !self.descriptor.pooling_supported {
            return Err(ConnectorError::NotPoolable(self.descriptor.key.clone()).into());
        }
        let configuration = self.configuration()?;
        Ok(self.descriptor.new_connector(configuration)?)
    }

    fn test_object(&self, connector: &Box<dyn Connector>) -> Result<(), HandlerError> {
        Ok(connector.check_alive()?)
    }

    fn dispose_object(&self, mut connector: Box<dyn Connector>) -> Result<(), HandlerError> {
        Ok(connector.dispose()?)
    }

    fn shutdown(&self) -> Result<(), HandlerError> {
        if let Some(context) = &self.context {
            context.dispose();
        }
        Ok(())
    }
}

static GLOBAL: LazyLock<Arc<PoolRegistry>> = LazyLock::new(|| Arc::new(PoolRegistry::new()));

/// One pool per [`PoolKey`], created on first use
///
/// Pools outlive the facades that use them; several facades with the same
/// connector and configuration share a pool. Shut pools down through
/// [`PoolRegistry::dispose`] or [`PoolRegistry::dispose_all`].
#[derive(Default)]
pub struct PoolRegistry {
    pools: DashMap<PoolKey, ConnectorPool>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry shared by the whole process
    pub fn global() -> Arc<PoolRegistry> {
        Arc::clone(&GLOBAL)
    }

    /// Pool for a connector and configuration, created if missing
    ///
    /// Connectors without pooling get no pool; a key is still returned when
    /// their configuration is stateful so it can be tracked per
    /// configuration. Concurrent first users of a key share one pool.
    pub fn get_or_create(
        &self,
        descriptor: &Arc<ConnectorDescriptor>,
        configuration: &Arc<ApiConfiguration>,
    ) -> ConnectorResult<(Option<PoolKey>, Option<ConnectorPool>)> {
        if !descriptor.pooling_supported {
            let key = descriptor
                .stateful_configuration
                .then(|| PoolKey::new(descriptor, configuration));
            return Ok((key, None));
        }

        let key = PoolKey::new(descriptor, configuration);
        let pool = match self.pools.entry(key.clone()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                info!(connector = %descriptor.key, "Creating new pool");
                let handler =
                    ConnectorPoolHandler::new(Arc::clone(descriptor), Arc::clone(configuration));
                let pool = ObjectPool::new(handler, configuration.pool_configuration.clone())?;
                entry.insert(pool.clone());
                pool
            }
        };
        Ok((Some(key), Some(pool)))
    }

    pub fn get(&self, key: &PoolKey) -> Option<ConnectorPool> {
        self.pools.get(key).map(|pool| pool.clone())
    }

    /// Remove and shut down the pool for `key`; failures are logged
    pub fn dispose(&self, key: &PoolKey) {
        if let Some((key, pool)) = self.pools.remove(key) {
            debug!(connector = %key.connector, "Disposing pool");
            if let Err(error) = pool.shutdown() {
                warn!(connector = %key.connector, %error, "Failed to close pool");
            }
        }
    }

    /// Shut down and forget every pool
    pub fn dispose_all(&self) {
        let keys: Vec<PoolKey> = self.pools.iter().map(|entry| entry.key().clone()).collect();
        for key in keys {
            self.dispose(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Directory, descriptor};
    use std::thread;

    fn api(pool_size: usize) -> Arc<ApiConfiguration> {
        Arc::new(
            ApiConfiguration::new()
                .with_property("host", "directory.example.com")
                .with_pool_configuration(
                    PoolConfiguration::new()
                        .with_max_objects(pool_size)
                        .with_max_idle(pool_size),
                ),
        )
    }

    #[test]
    fn test_same_key_shares_pool() {
        let registry = PoolRegistry::new();
        let directory = Directory::new();
        let descriptor = Arc::new(descriptor(&directory).with_pooling(true));

        let (key_a, pool_a) = registry.get_or_create(&descriptor, &api(2)).unwrap();
        let (key_b, pool_b) = registry.get_or_create(&descriptor, &api(2)).unwrap();
        assert_eq!(key_a, key_b);
        assert!(pool_a.unwrap().same_pool(&pool_b.unwrap()));
        assert_eq!(registry.len(), 1);

        // Different tuning, different pool
        let (key_c, _) = registry.get_or_create(&descriptor, &api(3)).unwrap();
        assert_ne!(key_a, key_c);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_concurrent_first_use_creates_one_pool() {
        let registry = Arc::new(PoolRegistry::new());
        let directory = Directory::new();
        let descriptor = Arc::new(descriptor(&directory).with_pooling(true));
        let config = api(2);

        let pools: Vec<ConnectorPool> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let descriptor = Arc::clone(&descriptor);
                let config = Arc::clone(&config);
                thread::spawn(move || registry.get_or_create(&descriptor, &config).unwrap().1.unwrap())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();

        assert_eq!(registry.len(), 1);
        assert!(pools.iter().all(|pool| pool.same_pool(&pools[0])));
    }

    #[test]
    fn test_non_pooled_connectors_get_no_pool() {
        let registry = PoolRegistry::new();
        let directory = Directory::new();

        let stateless = Arc::new(descriptor(&directory));
        assert!(matches!(registry.get_or_create(&stateless, &api(1)), Ok((None, None))));

        let stateful = Arc::new(descriptor(&directory).with_stateful_configuration(true));
        let (key, pool) = registry.get_or_create(&stateful, &api(1)).unwrap();
        assert!(key.is_some());
        assert!(pool.is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_invalid_pool_configuration_fails_creation() {
        let registry = PoolRegistry::new();
        let directory = Directory::new();
        let descriptor = Arc::new(descriptor(&directory).with_pooling(true));
        let config = Arc::new(ApiConfiguration::new().with_pool_configuration(
            PoolConfiguration::new().with_max_objects(1).with_max_idle(5),
        ));

        let err = registry.get_or_create(&descriptor, &config).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::ConfigurationValidation);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_dispose_shuts_pool_down() {
        let registry = PoolRegistry::new();
        let directory = Directory::new();
        let descriptor = Arc::new(descriptor(&directory).with_pooling(true));

        let (key, pool) = registry.get_or_create(&descriptor, &api(2)).unwrap();
        let (key, pool) = (key.unwrap(), pool.unwrap());
        pool.borrow_object().unwrap().release().unwrap();
        assert_eq!(directory.live_connectors(), 1);

        registry.dispose(&key);
        assert!(pool.is_shutdown());
        assert!(registry.get(&key).is_none());
        assert_eq!(directory.live_connectors(), 0);

        // Unknown keys are ignored
        registry.dispose(&key);
    }

    #[test]
    fn test_dispose_all() {
        let registry = PoolRegistry::new();
        let directory = Directory::new();
        let descriptor = Arc::new(descriptor(&directory).with_pooling(true));
        let (_, first) = registry.get_or_create(&descriptor, &api(1)).unwrap();
        let (_, second) = registry.get_or_create(&descriptor, &api(2)).unwrap();

        registry.dispose_all();
        assert!(registry.is_empty());
        assert!(first.unwrap().is_shutdown());
        assert!(second.unwrap().is_shutdown());
    }

    #[test]
    fn test_stateful_configuration_shared_and_released() {
        let registry = PoolRegistry::new();
        let directory = Directory::new();
        let descriptor = Arc::new(
            descriptor(&directory)
                .with_pooling(true)
                .with_stateful_configuration(true),
        );
        let (key, pool) = registry.get_or_create(&descriptor, &api(2)).unwrap();
        let pool = pool.unwrap();

        let a = pool.borrow_object().unwrap();
        let b = pool.borrow_object().unwrap();
        assert_eq!(directory.configurations_built(), 1);
        drop((a, b));

        registry.dispose(&key.unwrap());
        assert_eq!(directory.configurations_released(), 1);
    }

    #[test]
    fn test_non_poolable_connector_cannot_be_built_by_pool() {
        let directory = Directory::new();
        let descriptor = Arc::new(descriptor(&directory));
        let handler = ConnectorPoolHandler::new(descriptor, api(1));
        assert!(handler.make_object().is_err());
    }
}
