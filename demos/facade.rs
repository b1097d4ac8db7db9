//! Connector facade examples
//!
//! Run with `RUST_LOG=debug` to see the per-operation spans.

use esox_connector_host::{
    ApiConfiguration, Attribute, Configuration, ConfigurationBinder, ConfigurationProperties,
    Connector, ConnectorDescriptor, ConnectorError, ConnectorEvent, ConnectorFacade,
    ConnectorFactory, ConnectorKey, ConnectorObject, ConnectorResult, EventSink, Filter,
    ObjectClass, OperationKind, PoolConfiguration, PoolRegistry, SubscriptionHandle,
    SubscriptionTopic, Uid,
};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

type Store = Arc<Mutex<BTreeMap<String, ConnectorObject>>>;

struct InventoryConfiguration {
    location: String,
}

impl Configuration for InventoryConfiguration {
    fn validate(&self) -> ConnectorResult<()> {
        if self.location.is_empty() {
            return Err(ConnectorError::configuration("location is required"));
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct InventoryBinder;

impl ConfigurationBinder for InventoryBinder {
    fn build(&self, properties: &ConfigurationProperties) -> ConnectorResult<Arc<dyn Configuration>> {
        Ok(Arc::new(InventoryConfiguration {
            location: properties.get("location").unwrap_or_default().to_string(),
        }))
    }
}

/// Keeps objects in a shared in-memory map
struct InventoryConnector {
    store: Store,
    slow: bool,
}

struct Unsubscribe;

impl SubscriptionHandle for Unsubscribe {
    fn close(&mut self) {
        println!("   Subscription closed");
    }
}

impl Connector for InventoryConnector {
    fn init(&mut self, configuration: Arc<dyn Configuration>) -> ConnectorResult<()> {
        if let Some(config) = configuration.as_any().downcast_ref::<InventoryConfiguration>() {
            self.slow = config.location == "tape";
        }
        Ok(())
    }

    fn create(&mut self, object_class: &ObjectClass, attributes: Vec<Attribute>) -> ConnectorResult<Uid> {
        let mut store = self.store.lock();
        let uid = Uid::new((store.len() + 1).to_string());
        store.insert(
            uid.to_string(),
            ConnectorObject {
                object_class: object_class.clone(),
                uid: uid.clone(),
                attributes,
            },
        );
        Ok(uid)
    }

    fn search(
        &mut self,
        object_class: &ObjectClass,
        filter: Option<&Filter>,
    ) -> ConnectorResult<Vec<ConnectorObject>> {
        if self.slow {
            std::thread::sleep(Duration::from_millis(200));
        }
        let store = self.store.lock();
        Ok(store
            .values()
            .filter(|o| &o.object_class == object_class)
            .filter(|o| filter.is_none_or(|f| f.matches(o)))
            .cloned()
            .collect())
    }

    fn subscribe(
        &mut self,
        object_class: &ObjectClass,
        topic: &SubscriptionTopic,
        sink: EventSink,
    ) -> ConnectorResult<Box<dyn SubscriptionHandle>> {
        let SubscriptionTopic::Events { filter } = topic else {
            return Err(ConnectorError::UnsupportedOperation(OperationKind::SyncSubscription));
        };
        for object in self.search(object_class, filter.as_ref())? {
            let _ = sink.send(ConnectorEvent::Object(object));
        }
        Ok(Box::new(Unsubscribe))
    }
}

fn inventory(store: &Store) -> ConnectorDescriptor {
    let store = Arc::clone(store);
    let factory: Arc<dyn ConnectorFactory> = Arc::new(move || {
        Box::new(InventoryConnector {
            store: Arc::clone(&store),
            slow: false,
        }) as Box<dyn Connector>
    });
    ConnectorDescriptor::new(
        ConnectorKey::new("inventory-bundle", "1.0.0", "InventoryConnector"),
        factory,
        Arc::new(InventoryBinder),
    )
    .with_operations([
        OperationKind::Create,
        OperationKind::Search,
        OperationKind::EventSubscription,
    ])
    .with_pooling(true)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Esox Connector Host - Facade Examples ===\n");

    let store: Store = Arc::default();
    let registry = Arc::new(PoolRegistry::new());

    // Example 1: Pooled operations
    pooled_operations(&store, &registry);

    // Example 2: Timeouts
    timeouts(&store, &registry);

    // Example 3: Subscriptions
    subscriptions(&store, &registry);

    registry.dispose_all();
}

fn configuration(location: &str) -> ApiConfiguration {
    ApiConfiguration::new()
        .with_property("location", location)
        .with_pool_configuration(PoolConfiguration::new().with_max_objects(4).with_max_idle(2))
}

fn pooled_operations(store: &Store, registry: &Arc<PoolRegistry>) {
    println!("1. Pooled Operations:");
    let facade = ConnectorFacade::with_registry(inventory(store), configuration("warehouse"), Arc::clone(registry));
    let account = ObjectClass::account();

    facade.validate().unwrap();
    let uid = facade
        .create(&account, vec![Attribute::single("name", "pallet-jack")])
        .unwrap();
    println!("   Created uid {uid}");

    let found = facade.get(&account, &uid).unwrap();
    println!("   Get: {:?}", found.map(|o| o.attributes));

    match facade.test() {
        Ok(()) => println!("   Test passed"),
        Err(e) => println!("   Test refused: {e}"),
    }

    if let Some(key) = facade.pool_key()
        && let Some(pool) = registry.get(&key)
    {
        let stats = pool.statistics();
        println!("   Pool idle: {}, active: {}", stats.idle, stats.active);
    }
    println!();
}

fn timeouts(store: &Store, registry: &Arc<PoolRegistry>) {
    println!("2. Timeouts:");
    let configuration = configuration("tape").with_timeout(OperationKind::Search, Duration::from_millis(50));
    let facade = ConnectorFacade::with_registry(inventory(store), configuration, Arc::clone(registry));

    match facade.search(&ObjectClass::account(), None) {
        Ok(objects) => println!("   Found {} objects", objects.len()),
        Err(e) => println!("   Search failed ({:?}): {e}", e.kind()),
    }
    println!();
}

fn subscriptions(store: &Store, registry: &Arc<PoolRegistry>) {
    println!("3. Subscriptions:");
    let facade = ConnectorFacade::with_registry(inventory(store), configuration("warehouse"), Arc::clone(registry));

    let subscription = facade
        .subscribe_events(&ObjectClass::account(), None)
        .unwrap();
    println!("   In flight while subscribed: {}", facade.in_flight());
    while let Some(event) = subscription.next_timeout(Duration::from_millis(50)) {
        println!("   Event: {event:?}");
    }
    subscription.close();
    println!("   In flight after close: {}", facade.in_flight());
}
