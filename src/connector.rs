//! Connector-side contracts and the descriptor a connector registers with

use crate::config::ConfigurationProperties;
use crate::errors::{ConnectorError, ConnectorResult};
use crate::operation::{
    Attribute, ConnectorEvent, ConnectorObject, Filter, GuardedString, ObjectClass,
    OperationKind, Schema, ScriptContext, SubscriptionTopic, SyncResult, SyncToken, Uid,
};

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Identity of a connector implementation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectorKey {
    pub bundle_name: String,
    pub bundle_version: String,
    pub connector_name: String,
}

impl ConnectorKey {
    pub fn new(
        bundle_name: impl Into<String>,
        bundle_version: impl Into<String>,
        connector_name: impl Into<String>,
    ) -> Self {
        Self {
            bundle_name: bundle_name.into(),
            bundle_version: bundle_version.into(),
            connector_name: connector_name.into(),
        }
    }
}

impl fmt::Display for ConnectorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.bundle_name, self.bundle_version, self.connector_name
        )
    }
}

/// Invoked by a configuration whenever its live values change
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// A bound connector configuration instance
pub trait Configuration: Send + Sync {
    /// Check the configuration values; used by the `Validate` operation.
    fn validate(&self) -> ConnectorResult<()>;

    /// Release shared state held by a stateful configuration.
    fn release(&self) {}

    /// Register interest in changes the connector makes to this instance.
    fn set_change_callback(&self, _callback: ChangeCallback) {}

    /// Lets connectors recover their concrete configuration type.
    fn as_any(&self) -> &dyn Any;
}

/// Turns raw properties into configuration instances and back
pub trait ConfigurationBinder: Send + Sync {
    fn build(&self, properties: &ConfigurationProperties) -> ConnectorResult<Arc<dyn Configuration>>;

    /// Properties whose live value differs from `prior`
    fn diff(
        &self,
        _prior: &ConfigurationProperties,
        _live: &dyn Configuration,
    ) -> ConnectorResult<ConfigurationProperties> {
        Ok(ConfigurationProperties::new())
    }
}

/// Receives configuration drift detected on pooled connectors
pub trait ConfigurationChangeListener: Send + Sync {
    fn configuration_changed(&self, changes: &ConfigurationProperties);
}

impl<F> ConfigurationChangeListener for F
where
    F: Fn(&ConfigurationProperties) + Send + Sync,
{
    fn configuration_changed(&self, changes: &ConfigurationProperties) {
        self(changes)
    }
}

/// Where subscription events go
pub type EventSink = crossbeam::channel::Sender<ConnectorEvent>;

/// Connector-side half of a live subscription
pub trait SubscriptionHandle: Send {
    /// Stop producing events. Called once.
    fn close(&mut self);
}

fn unsupported<T>(operation: OperationKind) -> ConnectorResult<T> {
    Err(ConnectorError::UnsupportedOperation(operation))
}

/// A live connection to a backend system
///
/// Operation methods default to [`ConnectorError::UnsupportedOperation`];
/// implement the ones the connector declares in its descriptor.
pub trait Connector: Send {
    fn init(&mut self, configuration: Arc<dyn Configuration>) -> ConnectorResult<()>;

    /// Liveness check before a pooled instance is reused.
    fn check_alive(&self) -> ConnectorResult<()> {
        Ok(())
    }

    fn dispose(&mut self) -> ConnectorResult<()> {
        Ok(())
    }

    fn create(
        &mut self,
        _object_class: &ObjectClass,
        _attributes: Vec<Attribute>,
    ) -> ConnectorResult<Uid> {
        unsupported(OperationKind::Create)
    }

    fn update(
        &mut self,
        _object_class: &ObjectClass,
        _uid: &Uid,
        _attributes: Vec<Attribute>,
    ) -> ConnectorResult<Uid> {
        unsupported(OperationKind::Update)
    }

    fn delete(&mut self, _object_class: &ObjectClass, _uid: &Uid) -> ConnectorResult<()> {
        unsupported(OperationKind::Delete)
    }

    fn search(
        &mut self,
        _object_class: &ObjectClass,
        _filter: Option<&Filter>,
    ) -> ConnectorResult<Vec<ConnectorObject>> {
        unsupported(OperationKind::Search)
    }

    fn schema(&mut self) -> ConnectorResult<Schema> {
        unsupported(OperationKind::Schema)
    }

    fn authenticate(
        &mut self,
        _object_class: &ObjectClass,
        _username: &str,
        _password: &GuardedString,
    ) -> ConnectorResult<Uid> {
        unsupported(OperationKind::Authenticate)
    }

    fn resolve_username(
        &mut self,
        _object_class: &ObjectClass,
        _username: &str,
    ) -> ConnectorResult<Uid> {
        unsupported(OperationKind::ResolveUsername)
    }

    /// Check connectivity to the backend.
    fn test(&mut self) -> ConnectorResult<()> {
        unsupported(OperationKind::Test)
    }

    fn run_script_on_connector(&mut self, _script: &ScriptContext) -> ConnectorResult<String> {
        unsupported(OperationKind::ScriptOnConnector)
    }

    fn run_script_on_resource(&mut self, _script: &ScriptContext) -> ConnectorResult<String> {
        unsupported(OperationKind::ScriptOnResource)
    }

    fn sync(
        &mut self,
        _object_class: &ObjectClass,
        _token: Option<&SyncToken>,
    ) -> ConnectorResult<SyncResult> {
        unsupported(OperationKind::Sync)
    }

    /// Start pushing events into `sink`; must not block until the
    /// subscription ends.
    fn subscribe(
        &mut self,
        _object_class: &ObjectClass,
        topic: &SubscriptionTopic,
        _sink: EventSink,
    ) -> ConnectorResult<Box<dyn SubscriptionHandle>> {
        match topic {
            SubscriptionTopic::Events { .. } => unsupported(OperationKind::EventSubscription),
            SubscriptionTopic::Sync { .. } => unsupported(OperationKind::SyncSubscription),
        }
    }
}

/// Builds connector instances
pub trait ConnectorFactory: Send + Sync {
    fn new_connector(&self) -> Box<dyn Connector>;
}

impl<F> ConnectorFactory for F
where
    F: Fn() -> Box<dyn Connector> + Send + Sync,
{
    fn new_connector(&self) -> Box<dyn Connector> {
        self()
    }
}

/// Everything the runtime needs to know about a connector
///
/// Produced by whatever discovers connectors; the runtime never inspects
/// connector types itself.
#[derive(Clone)]
pub struct ConnectorDescriptor {
    pub key: ConnectorKey,
    pub factory: Arc<dyn ConnectorFactory>,
    pub binder: Arc<dyn ConfigurationBinder>,
    pub supported_operations: BTreeSet<OperationKind>,
    /// Instances may be pooled and reused across calls
    pub pooling_supported: bool,
    /// One configuration instance is shared by every call of a facade
    pub stateful_configuration: bool,
}

impl ConnectorDescriptor {
    pub fn new(
        key: ConnectorKey,
        factory: Arc<dyn ConnectorFactory>,
        binder: Arc<dyn ConfigurationBinder>,
    ) -> Self {
        Self {
            key,
            factory,
            binder,
            supported_operations: BTreeSet::new(),
            pooling_supported: false,
            stateful_configuration: false,
        }
    }

    pub fn with_operations<I>(mut self, operations: I) -> Self
    where
        I: IntoIterator<Item = OperationKind>,
    {
        self.supported_operations.extend(operations);
        self
    }

    pub fn with_pooling(mut self, pooling_supported: bool) -> Self {
        self.pooling_supported = pooling_supported;
        self
    }

    pub fn with_stateful_configuration(mut self, stateful: bool) -> Self {
        self.stateful_configuration = stateful;
        self
    }

    /// Whether a facade over this connector offers `operation`
    ///
    /// `Validate` is always offered; `Get` comes with `Search`.
    pub fn supports(&self, operation: OperationKind) -> bool {
        match operation {
            OperationKind::Validate => true,
            OperationKind::Get => self.supported_operations.contains(&OperationKind::Search),
            other => self.supported_operations.contains(&other),
        }
    }

    /// Build and initialise a fresh, unpooled connector
    pub(crate) fn new_connector(
        &self,
        configuration: Arc<dyn Configuration>,
    ) -> ConnectorResult<Box<dyn Connector>> {
        let mut connector = self.factory.new_connector();
        connector.init(configuration)?;
        Ok(connector)
    }
}

impl fmt::Debug for ConnectorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorDescriptor")
            .field("key", &self.key)
            .field("supported_operations", &self.supported_operations)
            .field("pooling_supported", &self.pooling_supported)
            .field("stateful_configuration", &self.stateful_configuration)
            .finish()
    }
}
