//! # Esox Connector Host
//!
//! Runtime that hosts pluggable backend connectors: it pools connector
//! instances under concurrent load and exposes one operation surface in
//! front of all of them.
//!
//! ## Features
//!
//! - Bounded, thread-safe object pool with idle eviction, health checks
//!   and blocking borrow with a maximum wait
//! - Automatic return of borrowed objects via RAII (Drop trait)
//! - Pool registry keyed by connector, configuration and pool tuning
//! - Per-operation chains: reference counting, logging and timeouts
//! - Long-lived event and sync subscriptions
//! - Async invocation on tokio's blocking pool
//! - Pool metrics, health status and Prometheus export
//!
//! ## Quick Start
//!
//! ```rust
//! use esox_connector_host::{HandlerError, ObjectPool, PoolConfiguration, PoolHandler};
//!
//! struct Buffers;
//!
//! impl PoolHandler<Vec<u8>> for Buffers {
//!     fn make_object(&self) -> Result<Vec<u8>, HandlerError> {
//!         Ok(Vec::with_capacity(4096))
//!     }
//! }
//!
//! let pool = ObjectPool::new(Buffers, PoolConfiguration::default()).unwrap();
//! {
//!     let mut buffer = pool.borrow_object().unwrap();
//!     buffer.extend_from_slice(b"hello");
//!     // Buffer goes back to the pool when `buffer` goes out of scope
//! }
//! assert_eq!(pool.statistics().idle, 1);
//! ```

mod config;
mod connector;
mod context;
mod errors;
mod eviction;
mod facade;
mod health;
mod impls;
mod layers;
mod metrics;
mod operation;
mod pool;
mod reference;
mod registry;
mod subscription;

#[cfg(test)]
mod testing;

pub use config::{ApiConfiguration, ConfigurationProperties, PoolConfiguration};
pub use connector::{
    ChangeCallback, Configuration, ConfigurationBinder, ConfigurationChangeListener, Connector,
    ConnectorDescriptor, ConnectorFactory, ConnectorKey, EventSink, SubscriptionHandle,
};
pub use context::{ConnectorContext, OperationalContext};
pub use errors::{ConnectorError, ConnectorResult, ErrorKind, HandlerError, PoolError, PoolResult};
pub use eviction::{EvictionPolicy, EvictionReason};
pub use facade::ConnectorFacade;
pub use health::{HealthStatus, PoolStatistics};
pub use layers::{LoggingLayer, OperationHandler, ReferenceCountingLayer, TimeoutLayer};
#[cfg(feature = "metrics")]
pub use metrics::MetricsExporter;
pub use metrics::PoolMetrics;
pub use operation::{
    Attribute, ConnectorEvent, ConnectorObject, Filter, GuardedString, ObjectClass,
    OperationKind, OperationRequest, OperationResponse, Schema, ScriptContext,
    SubscriptionTopic, SyncDelta, SyncDeltaKind, SyncResult, SyncToken, Uid,
};
pub use pool::{ObjectId, ObjectPool, PoolHandler, PooledObject};
pub use reference::{ReferenceCounter, ReferenceGuard};
pub use registry::{ConnectorPool, ConnectorPoolHandler, PoolKey, PoolRegistry};
pub use subscription::Subscription;
