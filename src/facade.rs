//! Caller-facing entry point: resolves, wraps and caches operation chains

use crate::config::ApiConfiguration;
use crate::connector::ConnectorDescriptor;
use crate::context::ContextProvider;
use crate::errors::{ConnectorError, ConnectorResult, PoolError};
use crate::impls::{self, ConnectorRunner, GetAdapter, SubscriptionRunner, ValidateOperation};
use crate::layers::{LoggingLayer, OperationHandler, ReferenceCountingLayer, TimeoutLayer};
use crate::operation::{
    Attribute, ConnectorObject, Filter, GuardedString, ObjectClass, OperationKind,
    OperationRequest, OperationResponse, Schema, ScriptContext, SyncResult, SyncToken, Uid,
};
use crate::reference::ReferenceCounter;
use crate::registry::{PoolKey, PoolRegistry};
use crate::subscription::Subscription;

use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Invokes operations on one connector with one configuration
///
/// Each operation is resolved into a chain once and cached:
///
/// ```text
/// reference counting -> logging -> [timeout] -> implementation
/// ```
///
/// `Validate` runs outside any pool, `Get` wraps a plain `Search` call in
/// its own layers and subscriptions are never bounded by a timeout.
///
/// # Example
///
/// ```rust,ignore
/// use esox_connector_host::{ApiConfiguration, ConnectorFacade, ObjectClass};
///
/// let facade = ConnectorFacade::new(descriptor, ApiConfiguration::new().with_property("host", "ldap"));
/// let accounts = facade.search(&ObjectClass::account(), None)?;
/// ```
pub struct ConnectorFacade {
    provider: Arc<ContextProvider>,
    counter: Arc<ReferenceCounter>,
    operations: DashMap<OperationKind, Arc<dyn OperationHandler>>,
}

impl ConnectorFacade {
    /// Facade whose pools live in [`PoolRegistry::global`]
    pub fn new(descriptor: ConnectorDescriptor, configuration: ApiConfiguration) -> Self {
        Self::with_registry(descriptor, configuration, PoolRegistry::global())
    }

    pub fn with_registry(
        descriptor: ConnectorDescriptor,
        configuration: ApiConfiguration,
        registry: Arc<PoolRegistry>,
    ) -> Self {
        Self {
            provider: Arc::new(ContextProvider::new(
                Arc::new(descriptor),
                Arc::new(configuration),
                registry,
            )),
            counter: Arc::new(ReferenceCounter::new()),
            operations: DashMap::new(),
        }
    }

    pub fn descriptor(&self) -> &ConnectorDescriptor {
        self.provider.descriptor()
    }

    pub fn configuration(&self) -> &ApiConfiguration {
        self.provider.api_configuration()
    }

    /// Whether the facade offers `operation` at all
    pub fn supports(&self, operation: OperationKind) -> bool {
        self.provider.descriptor().supports(operation)
    }

    /// Chain for `operation`, built on first request
    pub fn operation(&self, operation: OperationKind) -> ConnectorResult<Arc<dyn OperationHandler>> {
        if self.provider.is_disposed() {
            return Err(ConnectorError::Disposed);
        }
        if !self.supports(operation) {
            return Err(ConnectorError::UnsupportedOperation(operation));
        }
        if let Some(handler) = self.operations.get(&operation) {
            return Ok(Arc::clone(handler.value()));
        }
        let handler = self.build(operation)?;
        Ok(Arc::clone(
            self.operations.entry(operation).or_insert(handler).value(),
        ))
    }

    fn build(&self, operation: OperationKind) -> ConnectorResult<Arc<dyn OperationHandler>> {
        let core: Arc<dyn OperationHandler> = match operation {
            OperationKind::Validate => Arc::new(ValidateOperation::new(
                Arc::clone(self.provider.descriptor()),
                Arc::clone(self.provider.api_configuration()),
            )),
            OperationKind::Get => Arc::new(GetAdapter::new(self.runner(OperationKind::Search)?)),
            kind if kind.is_subscription() => Arc::new(SubscriptionRunner::new(
                Arc::clone(&self.provider),
                Arc::clone(&self.counter),
            )),
            kind => self.runner(kind)?,
        };
        Ok(self.wrap(operation, core))
    }

    fn runner(&self, operation: OperationKind) -> ConnectorResult<Arc<dyn OperationHandler>> {
        let implementation =
            impls::implementation(operation).ok_or(ConnectorError::UnsupportedOperation(operation))?;
        Ok(Arc::new(ConnectorRunner::new(Arc::clone(&self.provider), implementation)))
    }

    fn wrap(&self, operation: OperationKind, core: Arc<dyn OperationHandler>) -> Arc<dyn OperationHandler> {
        let mut handler = core;
        if !operation.is_subscription()
            && let Some(timeout) = self.provider.api_configuration().timeout(operation)
        {
            handler = Arc::new(TimeoutLayer::new(handler, operation, timeout));
        }
        let handler = Arc::new(LoggingLayer::new(
            handler,
            self.provider.descriptor().key.clone(),
            operation,
        ));
        Arc::new(ReferenceCountingLayer::new(handler, Arc::clone(&self.counter)))
    }

    /// Run a request through its operation chain
    pub fn invoke(&self, request: OperationRequest) -> ConnectorResult<OperationResponse> {
        self.operation(request.kind())?.invoke(request)
    }

    /// [`invoke`](Self::invoke) on tokio's blocking pool
    pub async fn invoke_async(&self, request: OperationRequest) -> ConnectorResult<OperationResponse> {
        let handler = self.operation(request.kind())?;
        tokio::task::spawn_blocking(move || handler.invoke(request))
            .await
            .map_err(|_| ConnectorError::from(PoolError::Cancelled))?
    }

    /// No call in flight and none started for at least `duration`
    pub fn is_unused_for(&self, duration: Duration) -> bool {
        self.counter.is_unused_for(duration)
    }

    /// Calls and subscriptions currently holding the facade
    pub fn in_flight(&self) -> usize {
        self.counter.in_flight()
    }

    /// Key of the pool this facade uses, once a call resolved it
    pub fn pool_key(&self) -> Option<PoolKey> {
        self.provider.shared_context().and_then(|context| context.pool_key())
    }

    pub fn is_disposed(&self) -> bool {
        self.provider.is_disposed()
    }

    /// Release the facade's context. Pools stay in their registry.
    pub fn dispose(&self) {
        self.provider.dispose();
        self.operations.clear();
    }

    pub fn create(&self, object_class: &ObjectClass, attributes: Vec<Attribute>) -> ConnectorResult<Uid> {
        let response = self.invoke(OperationRequest::Create {
            object_class: object_class.clone(),
            attributes,
        })?;
        response.into_uid().ok_or_else(|| unexpected(OperationKind::Create))
    }

    pub fn update(
        &self,
        object_class: &ObjectClass,
        uid: &Uid,
        attributes: Vec<Attribute>,
    ) -> ConnectorResult<Uid> {
        let response = self.invoke(OperationRequest::Update {
            object_class: object_class.clone(),
            uid: uid.clone(),
            attributes,
        })?;
        response.into_uid().ok_or_else(|| unexpected(OperationKind::Update))
    }

    pub fn delete(&self, object_class: &ObjectClass, uid: &Uid) -> ConnectorResult<()> {
        self.invoke(OperationRequest::Delete {
            object_class: object_class.clone(),
            uid: uid.clone(),
        })
        .map(|_| ())
    }

    pub fn search(
        &self,
        object_class: &ObjectClass,
        filter: Option<Filter>,
    ) -> ConnectorResult<Vec<ConnectorObject>> {
        let response = self.invoke(OperationRequest::Search {
            object_class: object_class.clone(),
            filter,
        })?;
        response
            .into_objects()
            .ok_or_else(|| unexpected(OperationKind::Search))
    }

    /// Single object by uid, `None` if there is none
    pub fn get(&self, object_class: &ObjectClass, uid: &Uid) -> ConnectorResult<Option<ConnectorObject>> {
        match self.invoke(OperationRequest::Get {
            object_class: object_class.clone(),
            uid: uid.clone(),
        })? {
            OperationResponse::Object(object) => Ok(object),
            _ => Err(unexpected(OperationKind::Get)),
        }
    }

    pub fn schema(&self) -> ConnectorResult<Schema> {
        self.invoke(OperationRequest::Schema)?
            .into_schema()
            .ok_or_else(|| unexpected(OperationKind::Schema))
    }

    pub fn authenticate(
        &self,
        object_class: &ObjectClass,
        username: &str,
        password: GuardedString,
    ) -> ConnectorResult<Uid> {
        let response = self.invoke(OperationRequest::Authenticate {
            object_class: object_class.clone(),
            username: username.to_string(),
            password,
        })?;
        response
            .into_uid()
            .ok_or_else(|| unexpected(OperationKind::Authenticate))
    }

    pub fn resolve_username(&self, object_class: &ObjectClass, username: &str) -> ConnectorResult<Uid> {
        let response = self.invoke(OperationRequest::ResolveUsername {
            object_class: object_class.clone(),
            username: username.to_string(),
        })?;
        response
            .into_uid()
            .ok_or_else(|| unexpected(OperationKind::ResolveUsername))
    }

    pub fn test(&self) -> ConnectorResult<()> {
        self.invoke(OperationRequest::Test).map(|_| ())
    }

    /// Validate the configuration without touching any pool
    pub fn validate(&self) -> ConnectorResult<()> {
        self.invoke(OperationRequest::Validate).map(|_| ())
    }

    pub fn run_script_on_connector(&self, script: ScriptContext) -> ConnectorResult<String> {
        self.invoke(OperationRequest::ScriptOnConnector(script))?
            .into_script_result()
            .ok_or_else(|| unexpected(OperationKind::ScriptOnConnector))
    }

    pub fn run_script_on_resource(&self, script: ScriptContext) -> ConnectorResult<String> {
        self.invoke(OperationRequest::ScriptOnResource(script))?
            .into_script_result()
            .ok_or_else(|| unexpected(OperationKind::ScriptOnResource))
    }

    pub fn sync(&self, object_class: &ObjectClass, token: Option<SyncToken>) -> ConnectorResult<SyncResult> {
        let response = self.invoke(OperationRequest::Sync {
            object_class: object_class.clone(),
            token,
        })?;
        response.into_sync().ok_or_else(|| unexpected(OperationKind::Sync))
    }

    pub fn subscribe_events(
        &self,
        object_class: &ObjectClass,
        filter: Option<Filter>,
    ) -> ConnectorResult<Subscription> {
        let response = self.invoke(OperationRequest::EventSubscription {
            object_class: object_class.clone(),
            filter,
        })?;
        response
            .into_subscription()
            .ok_or_else(|| unexpected(OperationKind::EventSubscription))
    }

    pub fn subscribe_sync(
        &self,
        object_class: &ObjectClass,
        token: Option<SyncToken>,
    ) -> ConnectorResult<Subscription> {
        let response = self.invoke(OperationRequest::SyncSubscription {
            object_class: object_class.clone(),
            token,
        })?;
        response
            .into_subscription()
            .ok_or_else(|| unexpected(OperationKind::SyncSubscription))
    }
}

fn unexpected(operation: OperationKind) -> ConnectorError {
    ConnectorError::connector(format!("unexpected response to {operation}"))
}

impl fmt::Debug for ConnectorFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorFacade")
            .field("connector", &self.provider.descriptor().key)
            .field("in_flight", &self.counter.in_flight())
            .field("cached_operations", &self.operations.len())
            .field("disposed", &self.provider.is_disposed())
            .finish()
    }
}
