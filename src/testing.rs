//! In-memory directory connector for unit tests

use crate::config::ConfigurationProperties;
use crate::connector::{
    ChangeCallback, Configuration, ConfigurationBinder, Connector, ConnectorDescriptor,
    ConnectorFactory, ConnectorKey, EventSink, SubscriptionHandle,
};
use crate::errors::{ConnectorError, ConnectorResult};
use crate::operation::{
    Attribute, ConnectorEvent, ConnectorObject, Filter, ObjectClass, OperationKind, Schema,
    ScriptContext, SubscriptionTopic, SyncDelta, SyncDeltaKind, SyncResult, SyncToken, Uid,
};

use parking_lot::Mutex;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

#[derive(Default)]
struct DirectoryState {
    objects: Mutex<BTreeMap<Uid, ConnectorObject>>,
    next_uid: AtomicU64,
    live: AtomicUsize,
    created: AtomicUsize,
    built: AtomicUsize,
    released: AtomicUsize,
    closed_subscriptions: AtomicUsize,
    delay: Mutex<Duration>,
    dead: AtomicBool,
}

/// Backend shared by every connector built from [`descriptor`]
#[derive(Clone, Default)]
pub(crate) struct Directory(Arc<DirectoryState>);

impl Directory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, uid: &str, name: &str) {
        let object = ConnectorObject {
            object_class: ObjectClass::account(),
            uid: Uid::new(uid),
            attributes: vec![Attribute::single("name", name)],
        };
        self.0.objects.lock().insert(Uid::new(uid), object);
    }

    /// Slow down search, sync, subscribe and configuration validation
    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.0.delay.lock() = delay;
    }

    pub(crate) fn set_alive(&self, alive: bool) {
        self.0.dead.store(!alive, Ordering::SeqCst);
    }

    pub(crate) fn live_connectors(&self) -> usize {
        self.0.live.load(Ordering::SeqCst)
    }

    pub(crate) fn connectors_created(&self) -> usize {
        self.0.created.load(Ordering::SeqCst)
    }

    pub(crate) fn configurations_built(&self) -> usize {
        self.0.built.load(Ordering::SeqCst)
    }

    pub(crate) fn configurations_released(&self) -> usize {
        self.0.released.load(Ordering::SeqCst)
    }

    pub(crate) fn closed_subscriptions(&self) -> usize {
        self.0.closed_subscriptions.load(Ordering::SeqCst)
    }

    fn pause(&self) {
        let delay = *self.0.delay.lock();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

pub(crate) struct DirectoryConfiguration {
    directory: Directory,
    host: Mutex<String>,
    callback: Mutex<Option<ChangeCallback>>,
}

impl DirectoryConfiguration {
    pub(crate) fn host(&self) -> String {
        self.host.lock().clone()
    }

    fn set_host(&self, host: &str) {
        *self.host.lock() = host.to_string();
        let callback = self.callback.lock().clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}

impl Configuration for DirectoryConfiguration {
    fn validate(&self) -> ConnectorResult<()> {
        self.directory.pause();
        if self.host.lock().is_empty() {
            return Err(ConnectorError::configuration("host is required"));
        }
        Ok(())
    }

    fn release(&self) {
        self.directory.0.released.fetch_add(1, Ordering::SeqCst);
    }

    fn set_change_callback(&self, callback: ChangeCallback) {
        *self.callback.lock() = Some(callback);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct DirectoryBinder(Directory);

impl ConfigurationBinder for DirectoryBinder {
    fn build(&self, properties: &ConfigurationProperties) -> ConnectorResult<Arc<dyn Configuration>> {
        self.0.0.built.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(DirectoryConfiguration {
            directory: self.0.clone(),
            host: Mutex::new(properties.get("host").unwrap_or_default().to_string()),
            callback: Mutex::new(None),
        }))
    }

    fn diff(
        &self,
        prior: &ConfigurationProperties,
        live: &dyn Configuration,
    ) -> ConnectorResult<ConfigurationProperties> {
        let live = live
            .as_any()
            .downcast_ref::<DirectoryConfiguration>()
            .ok_or_else(|| ConnectorError::configuration("unexpected configuration type"))?;
        let mut changes = ConfigurationProperties::new();
        let host = live.host();
        if prior.get("host") != Some(host.as_str()) {
            changes.set("host", host);
        }
        Ok(changes)
    }
}

struct DirectoryConnector {
    directory: Directory,
    configuration: Option<Arc<dyn Configuration>>,
}

impl DirectoryConnector {
    fn directory_configuration(&self) -> ConnectorResult<&DirectoryConfiguration> {
        self.configuration
            .as_ref()
            .and_then(|c| c.as_any().downcast_ref::<DirectoryConfiguration>())
            .ok_or_else(|| ConnectorError::connector("not initialised"))
    }
}

struct Listener {
    directory: Directory,
}

impl SubscriptionHandle for Listener {
    fn close(&mut self) {
        self.directory
            .0
            .closed_subscriptions
            .fetch_add(1, Ordering::SeqCst);
    }
}

impl Connector for DirectoryConnector {
    fn init(&mut self, configuration: Arc<dyn Configuration>) -> ConnectorResult<()> {
        self.configuration = Some(configuration);
        self.directory.0.live.fetch_add(1, Ordering::SeqCst);
        self.directory.0.created.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn check_alive(&self) -> ConnectorResult<()> {
        if self.directory.0.dead.load(Ordering::SeqCst) {
            return Err(ConnectorError::connector("connection lost"));
        }
        Ok(())
    }

    fn dispose(&mut self) -> ConnectorResult<()> {
        self.directory.0.live.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn create(&mut self, object_class: &ObjectClass, attributes: Vec<Attribute>) -> ConnectorResult<Uid> {
        let id = self.directory.0.next_uid.fetch_add(1, Ordering::SeqCst) + 100;
        let uid = Uid::new(id.to_string());
        let object = ConnectorObject {
            object_class: object_class.clone(),
            uid: uid.clone(),
            attributes,
        };
        self.directory.0.objects.lock().insert(uid.clone(), object);
        Ok(uid)
    }

    fn update(
        &mut self,
        _object_class: &ObjectClass,
        uid: &Uid,
        attributes: Vec<Attribute>,
    ) -> ConnectorResult<Uid> {
        let mut objects = self.directory.0.objects.lock();
        let object = objects
            .get_mut(uid)
            .ok_or_else(|| ConnectorError::connector(format!("unknown uid {uid}")))?;
        object.attributes = attributes;
        Ok(uid.clone())
    }

    fn delete(&mut self, _object_class: &ObjectClass, uid: &Uid) -> ConnectorResult<()> {
        match self.directory.0.objects.lock().remove(uid) {
            Some(_) => Ok(()),
            None => Err(ConnectorError::connector(format!("unknown uid {uid}"))),
        }
    }

    fn search(
        &mut self,
        object_class: &ObjectClass,
        filter: Option<&Filter>,
    ) -> ConnectorResult<Vec<ConnectorObject>> {
        self.directory.pause();
        Ok(self
            .directory
            .0
            .objects
            .lock()
            .values()
            .filter(|o| &o.object_class == object_class)
            .filter(|o| filter.is_none_or(|f| f.matches(o)))
            .cloned()
            .collect())
    }

    fn schema(&mut self) -> ConnectorResult<Schema> {
        Ok(Schema::default().with_object_class(ObjectClass::account(), ["name"]))
    }

    fn test(&mut self) -> ConnectorResult<()> {
        self.check_alive()
    }

    fn run_script_on_connector(&mut self, script: &ScriptContext) -> ConnectorResult<String> {
        match script.text.strip_prefix("set-host ") {
            Some(host) => {
                self.directory_configuration()?.set_host(host);
                Ok(host.to_string())
            }
            None => Ok(self.directory_configuration()?.host()),
        }
    }

    fn sync(&mut self, object_class: &ObjectClass, _token: Option<&SyncToken>) -> ConnectorResult<SyncResult> {
        let deltas: Vec<SyncDelta> = self
            .search(object_class, None)?
            .into_iter()
            .map(|object| SyncDelta {
                token: SyncToken(object.uid.to_string()),
                kind: SyncDeltaKind::CreateOrUpdate,
                uid: object.uid.clone(),
                object: Some(object),
            })
            .collect();
        let token = deltas.last().map(|delta| delta.token.clone());
        Ok(SyncResult { deltas, token })
    }

    fn subscribe(
        &mut self,
        object_class: &ObjectClass,
        topic: &SubscriptionTopic,
        sink: EventSink,
    ) -> ConnectorResult<Box<dyn SubscriptionHandle>> {
        self.directory.pause();
        match topic {
            SubscriptionTopic::Events { filter } => {
                for object in self.search(object_class, filter.as_ref())? {
                    let _ = sink.send(ConnectorEvent::Object(object));
                }
            }
            SubscriptionTopic::Sync { token } => {
                for delta in self.sync(object_class, token.as_ref())?.deltas {
                    let _ = sink.send(ConnectorEvent::Delta(delta));
                }
            }
        }
        Ok(Box::new(Listener {
            directory: self.directory.clone(),
        }))
    }
}

/// Descriptor of the in-memory connector; unpooled, stateless
pub(crate) fn descriptor(directory: &Directory) -> ConnectorDescriptor {
    let backend = directory.clone();
    let factory: Arc<dyn ConnectorFactory> = Arc::new(move || {
        Box::new(DirectoryConnector {
            directory: backend.clone(),
            configuration: None,
        }) as Box<dyn Connector>
    });
    ConnectorDescriptor::new(
        ConnectorKey::new("directory-bundle", "1.0", "DirectoryConnector"),
        factory,
        Arc::new(DirectoryBinder(directory.clone())),
    )
    .with_operations([
        OperationKind::Create,
        OperationKind::Update,
        OperationKind::Delete,
        OperationKind::Search,
        OperationKind::Schema,
        OperationKind::Test,
        OperationKind::ScriptOnConnector,
        OperationKind::Sync,
        OperationKind::EventSubscription,
        OperationKind::SyncSubscription,
    ])
}
