//! Execution contexts shared by the calls of a facade

use crate::config::ApiConfiguration;
use crate::connector::{Configuration, Connector, ConnectorDescriptor};
use crate::errors::{ConnectorError, ConnectorResult};
use crate::registry::{ConnectorPool, PoolKey, PoolRegistry};

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Connector descriptor plus a lazily built configuration instance
pub struct OperationalContext {
    descriptor: Arc<ConnectorDescriptor>,
    api_configuration: Arc<ApiConfiguration>,
    configuration: Mutex<Option<Arc<dyn Configuration>>>,
}

impl OperationalContext {
    pub fn new(descriptor: Arc<ConnectorDescriptor>, api_configuration: Arc<ApiConfiguration>) -> Self {
        Self {
            descriptor,
            api_configuration,
            configuration: Mutex::new(None),
        }
    }

    pub fn descriptor(&self) -> &Arc<ConnectorDescriptor> {
        &self.descriptor
    }

    pub fn api_configuration(&self) -> &Arc<ApiConfiguration> {
        &self.api_configuration
    }

    /// Configuration instance of this context, built on first use
    pub fn configuration(&self) -> ConnectorResult<Arc<dyn Configuration>> {
        let mut slot = self.configuration.lock();
        if let Some(configuration) = slot.as_ref() {
            return Ok(Arc::clone(configuration));
        }
        let configuration = self
            .descriptor
            .binder
            .build(&self.api_configuration.properties)?;
        *slot = Some(Arc::clone(&configuration));
        Ok(configuration)
    }

    /// Build and initialise an unpooled connector on this context's configuration
    pub fn new_connector(&self) -> ConnectorResult<Box<dyn Connector>> {
        self.descriptor.new_connector(self.configuration()?)
    }

    /// Drop the configuration; stateful ones are released.
    pub fn dispose(&self) {
        let configuration = self.configuration.lock().take();
        if let Some(configuration) = configuration
            && self.descriptor.stateful_configuration
        {
            configuration.release();
        }
    }
}

impl fmt::Debug for OperationalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationalContext")
            .field("connector", &self.descriptor.key)
            .field("configured", &self.configuration.lock().is_some())
            .finish()
    }
}

/// Operational context that also knows the connector pool
pub struct ConnectorContext {
    operational: OperationalContext,
    registry: Arc<PoolRegistry>,
    pool: Mutex<Option<(Option<PoolKey>, Option<ConnectorPool>)>>,
}

impl ConnectorContext {
    pub fn new(
        descriptor: Arc<ConnectorDescriptor>,
        api_configuration: Arc<ApiConfiguration>,
        registry: Arc<PoolRegistry>,
    ) -> Self {
        Self {
            operational: OperationalContext::new(descriptor, api_configuration),
            registry,
            pool: Mutex::new(None),
        }
    }

    pub fn operational(&self) -> &OperationalContext {
        &self.operational
    }

    /// Pool for this connector and configuration, `None` if it is not pooled
    ///
    /// A pool disposed through the registry is looked up again, so the next
    /// call lands in a fresh one.
    pub fn pool(&self) -> ConnectorResult<Option<ConnectorPool>> {
        let mut cached = self.pool.lock();
        match cached.as_ref() {
            Some((_, None)) => return Ok(None),
            Some((_, Some(pool))) if !pool.is_shutdown() => return Ok(Some(pool.clone())),
            _ => {}
        }
        let (key, pool) = self.registry.get_or_create(
            self.operational.descriptor(),
            self.operational.api_configuration(),
        )?;
        *cached = Some((key, pool.clone()));
        Ok(pool)
    }

    /// Key of the pool resolved so far, if any
    pub fn pool_key(&self) -> Option<PoolKey> {
        self.pool.lock().as_ref().and_then(|(key, _)| key.clone())
    }

    /// Release the context; the pool itself lives on in the registry.
    pub fn dispose(&self) {
        self.operational.dispose();
        self.pool.lock().take();
    }
}

impl fmt::Debug for ConnectorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorContext")
            .field("operational", &self.operational)
            .field("pool_key", &self.pool_key())
            .finish()
    }
}

/// Hands out the context a call runs in
///
/// Facades over stateful or poolable connectors share one context, created
/// by the first call; others get a fresh context per call.
pub(crate) struct ContextProvider {
    descriptor: Arc<ConnectorDescriptor>,
    api_configuration: Arc<ApiConfiguration>,
    registry: Arc<PoolRegistry>,
    shared: Option<OnceLock<Arc<ConnectorContext>>>,
    disposed: AtomicBool,
}

impl ContextProvider {
    pub(crate) fn new(
        descriptor: Arc<ConnectorDescriptor>,
        api_configuration: Arc<ApiConfiguration>,
        registry: Arc<PoolRegistry>,
    ) -> Self {
        let shared = (descriptor.stateful_configuration || descriptor.pooling_supported)
            .then(OnceLock::new);
        Self {
            descriptor,
            api_configuration,
            registry,
            shared,
            disposed: AtomicBool::new(false),
        }
    }

    pub(crate) fn descriptor(&self) -> &Arc<ConnectorDescriptor> {
        &self.descriptor
    }

    pub(crate) fn api_configuration(&self) -> &Arc<ApiConfiguration> {
        &self.api_configuration
    }

    pub(crate) fn context(&self) -> ConnectorResult<Arc<ConnectorContext>> {
        if self.is_disposed() {
            return Err(ConnectorError::Disposed);
        }
        Ok(match &self.shared {
            Some(cell) => Arc::clone(cell.get_or_init(|| Arc::new(self.new_context()))),
            None => Arc::new(self.new_context()),
        })
    }

    /// Shared context, if one was created already
    pub(crate) fn shared_context(&self) -> Option<Arc<ConnectorContext>> {
        self.shared.as_ref().and_then(OnceLock::get).cloned()
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(context) = self.shared_context() {
            context.dispose();
        }
    }

    fn new_context(&self) -> ConnectorContext {
        ConnectorContext::new(
            Arc::clone(&self.descriptor),
            Arc::clone(&self.api_configuration),
            Arc::clone(&self.registry),
        )
    }
}
