//! Cross-cutting layers wrapped around operation implementations

use crate::connector::ConnectorKey;
use crate::errors::{ConnectorError, ConnectorResult};
use crate::operation::{OperationKind, OperationRequest, OperationResponse};
use crate::reference::ReferenceCounter;

use crossbeam::channel::{self, RecvTimeoutError};
use std::io;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};
use tokio::runtime::{self, Runtime};
use tracing::{debug, debug_span, warn};

/// One link of an operation chain
pub trait OperationHandler: Send + Sync {
    fn invoke(&self, request: OperationRequest) -> ConnectorResult<OperationResponse>;
}

/// Blocking threads shared by every timed call
const MAX_OPERATION_THREADS: usize = 64;

static OPERATION_WORKERS: LazyLock<io::Result<Runtime>> = LazyLock::new(|| {
    runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .max_blocking_threads(MAX_OPERATION_THREADS)
        .thread_name("connector-operation")
        .build()
});

/// Bounds a call by a deadline
///
/// The inner call runs on a shared blocking pool. When the deadline passes
/// the caller gets [`ConnectorError::Timeout`]; the abandoned call keeps
/// running and hands its connector back to the pool when it finishes.
/// Calls queued behind a saturated pool count against their own deadline.
pub struct TimeoutLayer {
    inner: Arc<dyn OperationHandler>,
    operation: OperationKind,
    timeout: Duration,
}

impl TimeoutLayer {
    pub fn new(inner: Arc<dyn OperationHandler>, operation: OperationKind, timeout: Duration) -> Self {
        Self {
            inner,
            operation,
            timeout,
        }
    }
}

impl OperationHandler for TimeoutLayer {
    fn invoke(&self, request: OperationRequest) -> ConnectorResult<OperationResponse> {
        let workers = OPERATION_WORKERS
            .as_ref()
            .map_err(|e| ConnectorError::connector(format!("operation workers unavailable: {e}")))?;
        let (sender, receiver) = channel::bounded(1);
        let inner = Arc::clone(&self.inner);
        let span = tracing::Span::current();

        workers.spawn_blocking(move || {
            let _entered = span.enter();
            // Receiver may be gone after a timeout
            let _ = sender.send(inner.invoke(request));
        });

        match receiver.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(ConnectorError::Timeout {
                operation: self.operation,
                timeout: self.timeout,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(ConnectorError::connector(format!(
                "{} operation terminated without a result",
                self.operation
            ))),
        }
    }
}

/// Records every call in a `connector_operation` span
pub struct LoggingLayer {
    inner: Arc<dyn OperationHandler>,
    connector: ConnectorKey,
    operation: OperationKind,
}

impl LoggingLayer {
    pub fn new(inner: Arc<dyn OperationHandler>, connector: ConnectorKey, operation: OperationKind) -> Self {
        Self {
            inner,
            connector,
            operation,
        }
    }
}

impl OperationHandler for LoggingLayer {
    fn invoke(&self, request: OperationRequest) -> ConnectorResult<OperationResponse> {
        let span = debug_span!(
            "connector_operation",
            connector = %self.connector,
            operation = %self.operation
        );
        let _entered = span.enter();
        debug!("Enter");

        let start = Instant::now();
        let result = self.inner.invoke(request);
        let elapsed = start.elapsed();
        match &result {
            Ok(_) => debug!(?elapsed, "Return"),
            Err(error) => warn!(?elapsed, %error, kind = ?error.kind(), "Operation failed"),
        }
        result
    }
}

/// Marks the facade in use for the duration of a call
pub struct ReferenceCountingLayer {
    inner: Arc<dyn OperationHandler>,
    counter: Arc<ReferenceCounter>,
}

impl ReferenceCountingLayer {
    pub fn new(inner: Arc<dyn OperationHandler>, counter: Arc<ReferenceCounter>) -> Self {
        Self { inner, counter }
    }
}

impl OperationHandler for ReferenceCountingLayer {
    fn invoke(&self, request: OperationRequest) -> ConnectorResult<OperationResponse> {
        let _guard = self.counter.guard();
        self.inner.invoke(request)
    }
}

/// Adapts a closure, mostly for tests and ad-hoc chains
impl<F> OperationHandler for F
where
    F: Fn(OperationRequest) -> ConnectorResult<OperationResponse> + Send + Sync,
{
    fn invoke(&self, request: OperationRequest) -> ConnectorResult<OperationResponse> {
        self(request)
    }
}
