//! Operation implementations and the innermost handlers of every chain

use crate::config::ApiConfiguration;
use crate::connector::{Connector, ConnectorDescriptor};
use crate::context::{ConnectorContext, ContextProvider, OperationalContext};
use crate::errors::{ConnectorError, ConnectorResult};
use crate::layers::OperationHandler;
use crate::operation::{
    Attribute, Filter, ObjectClass, OperationKind, OperationRequest, OperationResponse,
    SubscriptionTopic, Uid,
};
use crate::pool::PooledObject;
use crate::reference::ReferenceCounter;
use crate::subscription::Subscription;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};
use tracing::warn;

/// Runs one request against a connector instance
pub(crate) type OperationFn = fn(&mut dyn Connector, OperationRequest) -> ConnectorResult<OperationResponse>;

/// Operations served by a plain connector call. Filled once, read-only after.
static IMPLEMENTATIONS: LazyLock<HashMap<OperationKind, OperationFn>> = LazyLock::new(|| {
    let table: [(OperationKind, OperationFn); 11] = [
        (OperationKind::Create, create),
        (OperationKind::Update, update),
        (OperationKind::Delete, delete),
        (OperationKind::Search, search),
        (OperationKind::Schema, schema),
        (OperationKind::Authenticate, authenticate),
        (OperationKind::ResolveUsername, resolve_username),
        (OperationKind::Test, test_connection),
        (OperationKind::ScriptOnConnector, script_on_connector),
        (OperationKind::ScriptOnResource, script_on_resource),
        (OperationKind::Sync, sync),
    ];
    table.into_iter().collect()
});

pub(crate) fn implementation(operation: OperationKind) -> Option<OperationFn> {
    IMPLEMENTATIONS.get(&operation).copied()
}

fn mismatched(expected: OperationKind, request: &OperationRequest) -> ConnectorError {
    ConnectorError::invalid_argument(format!(
        "{expected} implementation received a {} request",
        request.kind()
    ))
}

fn check_object_class(object_class: &ObjectClass) -> ConnectorResult<()> {
    if object_class.as_str().is_empty() {
        return Err(ConnectorError::invalid_argument("object class must not be empty"));
    }
    Ok(())
}

fn check_uid(uid: &Uid) -> ConnectorResult<()> {
    if uid.as_str().is_empty() {
        return Err(ConnectorError::invalid_argument("uid must not be empty"));
    }
    Ok(())
}

fn check_attributes(attributes: &[Attribute]) -> ConnectorResult<()> {
    if attributes.is_empty() {
        return Err(ConnectorError::invalid_argument("attributes must not be empty"));
    }
    let mut seen = HashSet::new();
    for attribute in attributes {
        if !seen.insert(attribute.name.to_ascii_lowercase()) {
            return Err(ConnectorError::invalid_argument(format!(
                "duplicate attribute {}",
                attribute.name
            )));
        }
    }
    Ok(())
}

fn check_username(username: &str) -> ConnectorResult<()> {
    if username.is_empty() {
        return Err(ConnectorError::invalid_argument("username must not be empty"));
    }
    Ok(())
}

fn create(connector: &mut dyn Connector, request: OperationRequest) -> ConnectorResult<OperationResponse> {
    let OperationRequest::Create { object_class, attributes } = request else {
        return Err(mismatched(OperationKind::Create, &request));
    };
    check_object_class(&object_class)?;
    check_attributes(&attributes)?;
    connector.create(&object_class, attributes).map(OperationResponse::Uid)
}

fn update(connector: &mut dyn Connector, request: OperationRequest) -> ConnectorResult<OperationResponse> {
    let OperationRequest::Update { object_class, uid, attributes } = request else {
        return Err(mismatched(OperationKind::Update, &request));
    };
    check_object_class(&object_class)?;
    check_uid(&uid)?;
    check_attributes(&attributes)?;
    connector.update(&object_class, &uid, attributes).map(OperationResponse::Uid)
}

fn delete(connector: &mut dyn Connector, request: OperationRequest) -> ConnectorResult<OperationResponse> {
    let OperationRequest::Delete { object_class, uid } = request else {
        return Err(mismatched(OperationKind::Delete, &request));
    };
    check_object_class(&object_class)?;
    check_uid(&uid)?;
    connector.delete(&object_class, &uid)?;
    Ok(OperationResponse::Empty)
}

fn search(connector: &mut dyn Connector, request: OperationRequest) -> ConnectorResult<OperationResponse> {
    let OperationRequest::Search { object_class, filter } = request else {
        return Err(mismatched(OperationKind::Search, &request));
    };
    check_object_class(&object_class)?;
    connector
        .search(&object_class, filter.as_ref())
        .map(OperationResponse::Objects)
}

fn schema(connector: &mut dyn Connector, request: OperationRequest) -> ConnectorResult<OperationResponse> {
    let OperationRequest::Schema = request else {
        return Err(mismatched(OperationKind::Schema, &request));
    };
    connector.schema().map(OperationResponse::Schema)
}

fn authenticate(connector: &mut dyn Connector, request: OperationRequest) -> ConnectorResult<OperationResponse> {
    let OperationRequest::Authenticate { object_class, username, password } = request else {
        return Err(mismatched(OperationKind::Authenticate, &request));
    };
    check_object_class(&object_class)?;
    check_username(&username)?;
    connector
        .authenticate(&object_class, &username, &password)
        .map(OperationResponse::Uid)
}

fn resolve_username(connector: &mut dyn Connector, request: OperationRequest) -> ConnectorResult<OperationResponse> {
    let OperationRequest::ResolveUsername { object_class, username } = request else {
        return Err(mismatched(OperationKind::ResolveUsername, &request));
    };
    check_object_class(&object_class)?;
    check_username(&username)?;
    connector
        .resolve_username(&object_class, &username)
        .map(OperationResponse::Uid)
}

fn test_connection(connector: &mut dyn Connector, request: OperationRequest) -> ConnectorResult<OperationResponse> {
    let OperationRequest::Test = request else {
        return Err(mismatched(OperationKind::Test, &request));
    };
    connector.test()?;
    Ok(OperationResponse::Empty)
}

fn script_on_connector(connector: &mut dyn Connector, request: OperationRequest) -> ConnectorResult<OperationResponse> {
    let OperationRequest::ScriptOnConnector(script) = request else {
        return Err(mismatched(OperationKind::ScriptOnConnector, &request));
    };
    connector
        .run_script_on_connector(&script)
        .map(OperationResponse::ScriptResult)
}

fn script_on_resource(connector: &mut dyn Connector, request: OperationRequest) -> ConnectorResult<OperationResponse> {
    let OperationRequest::ScriptOnResource(script) = request else {
        return Err(mismatched(OperationKind::ScriptOnResource, &request));
    };
    connector
        .run_script_on_resource(&script)
        .map(OperationResponse::ScriptResult)
}

fn sync(connector: &mut dyn Connector, request: OperationRequest) -> ConnectorResult<OperationResponse> {
    let OperationRequest::Sync { object_class, token } = request else {
        return Err(mismatched(OperationKind::Sync, &request));
    };
    check_object_class(&object_class)?;
    connector
        .sync(&object_class, token.as_ref())
        .map(OperationResponse::Sync)
}

/// A connector held for the length of a call or subscription
///
/// Pooled instances go back to their pool on drop; unpooled ones are
/// disposed.
pub(crate) enum ConnectorLease {
    Pooled(PooledObject<Box<dyn Connector>>),
    Owned(Box<dyn Connector>),
}

impl ConnectorLease {
    pub(crate) fn acquire(context: &ConnectorContext) -> ConnectorResult<Self> {
        match context.pool()? {
            Some(pool) => Ok(Self::Pooled(pool.borrow_object()?)),
            None => Ok(Self::Owned(context.operational().new_connector()?)),
        }
    }

    pub(crate) fn connector(&mut self) -> &mut dyn Connector {
        match self {
            Self::Pooled(pooled) => &mut ***pooled,
            Self::Owned(connector) => &mut **connector,
        }
    }
}

impl Drop for ConnectorLease {
    fn drop(&mut self) {
        if let Self::Owned(connector) = self
            && let Err(error) = connector.dispose()
        {
            warn!(%error, "Failed to dispose connector");
        }
    }
}

/// Innermost handler of a plain operation
pub(crate) struct ConnectorRunner {
    provider: Arc<ContextProvider>,
    operation: OperationFn,
}

impl ConnectorRunner {
    pub(crate) fn new(provider: Arc<ContextProvider>, operation: OperationFn) -> Self {
        Self { provider, operation }
    }
}

impl OperationHandler for ConnectorRunner {
    fn invoke(&self, request: OperationRequest) -> ConnectorResult<OperationResponse> {
        let context = self.provider.context()?;
        let mut lease = ConnectorLease::acquire(&context)?;
        (self.operation)(lease.connector(), request)
    }
}

/// Validates the configuration in a throwaway context, outside any pool
pub(crate) struct ValidateOperation {
    descriptor: Arc<ConnectorDescriptor>,
    api_configuration: Arc<ApiConfiguration>,
}

impl ValidateOperation {
    pub(crate) fn new(descriptor: Arc<ConnectorDescriptor>, api_configuration: Arc<ApiConfiguration>) -> Self {
        Self {
            descriptor,
            api_configuration,
        }
    }
}

impl OperationHandler for ValidateOperation {
    fn invoke(&self, request: OperationRequest) -> ConnectorResult<OperationResponse> {
        let OperationRequest::Validate = request else {
            return Err(mismatched(OperationKind::Validate, &request));
        };
        let context = OperationalContext::new(
            Arc::clone(&self.descriptor),
            Arc::clone(&self.api_configuration),
        );
        let result = context.configuration().and_then(|c| c.validate());
        context.dispose();
        result.map(|()| OperationResponse::Empty)
    }
}

/// Serves `Get` through a search by uid
pub(crate) struct GetAdapter {
    search: Arc<dyn OperationHandler>,
}

impl GetAdapter {
    pub(crate) fn new(search: Arc<dyn OperationHandler>) -> Self {
        Self { search }
    }
}

impl OperationHandler for GetAdapter {
    fn invoke(&self, request: OperationRequest) -> ConnectorResult<OperationResponse> {
        let OperationRequest::Get { object_class, uid } = request else {
            return Err(mismatched(OperationKind::Get, &request));
        };
        check_uid(&uid)?;
        let response = self.search.invoke(OperationRequest::Search {
            object_class,
            filter: Some(Filter::Uid(uid.clone())),
        })?;
        let mut objects = response
            .into_objects()
            .ok_or_else(|| ConnectorError::connector("search returned no object list"))?;
        match objects.len() {
            0 => Ok(OperationResponse::Object(None)),
            1 => Ok(OperationResponse::Object(objects.pop())),
            _ => Err(ConnectorError::MultipleResults(uid)),
        }
    }
}

/// Opens a subscription that keeps its facade in use until closed
pub(crate) struct SubscriptionRunner {
    provider: Arc<ContextProvider>,
    counter: Arc<ReferenceCounter>,
}

impl SubscriptionRunner {
    pub(crate) fn new(provider: Arc<ContextProvider>, counter: Arc<ReferenceCounter>) -> Self {
        Self { provider, counter }
    }
}

impl OperationHandler for SubscriptionRunner {
    fn invoke(&self, request: OperationRequest) -> ConnectorResult<OperationResponse> {
        let (object_class, topic) = match request {
            OperationRequest::EventSubscription { object_class, filter } => {
                (object_class, SubscriptionTopic::Events { filter })
            }
            OperationRequest::SyncSubscription { object_class, token } => {
                (object_class, SubscriptionTopic::Sync { token })
            }
            other => return Err(mismatched(OperationKind::EventSubscription, &other)),
        };
        check_object_class(&object_class)?;

        let reference = self.counter.guard();
        let context = self.provider.context()?;
        let mut lease = ConnectorLease::acquire(&context)?;
        let (sink, events) = crossbeam::channel::unbounded();
        let handle = lease.connector().subscribe(&object_class, &topic, sink)?;
        Ok(OperationResponse::Subscription(Subscription::new(
            events, handle, lease, reference,
        )))
    }
}
