//! Caller-side handle of a long-lived subscription

use crate::connector::SubscriptionHandle;
use crate::impls::ConnectorLease;
use crate::operation::ConnectorEvent;
use crate::reference::ReferenceGuard;

use crossbeam::channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::fmt;
use std::time::Duration;

/// Stream of events from a connector subscription
///
/// While a subscription is alive its facade counts as in use and the
/// connector serving it stays checked out. Dropping or closing it stops the
/// connector side, hands the connector back and releases the facade.
pub struct Subscription {
    events: Receiver<ConnectorEvent>,
    handle: Option<Box<dyn SubscriptionHandle>>,
    _lease: ConnectorLease,
    _reference: ReferenceGuard,
}

impl Subscription {
    pub(crate) fn new(
        events: Receiver<ConnectorEvent>,
        handle: Box<dyn SubscriptionHandle>,
        lease: ConnectorLease,
        reference: ReferenceGuard,
    ) -> Self {
        Self {
            events,
            handle: Some(handle),
            _lease: lease,
            _reference: reference,
        }
    }

    /// Wait up to `timeout` for the next event
    ///
    /// `None` on timeout or once the connector stopped producing.
    pub fn next_timeout(&self, timeout: Duration) -> Option<ConnectorEvent> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn try_next(&self) -> Option<ConnectorEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Raw receiver, e.g. for `crossbeam::select!`
    pub fn events(&self) -> &Receiver<ConnectorEvent> {
        &self.events
    }

    /// Stop the subscription and release the facade
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.close();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("pending", &self.events.len())
            .field("open", &self.handle.is_some())
            .finish()
    }
}
