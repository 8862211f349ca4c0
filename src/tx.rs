//! Transaction coordination.
//!
//! A compiled [`Statement`] runs either inside a caller-supplied
//! [`TransactionHandle`] or in a fresh auto-committed transaction opened
//! through the [`GraphDriver`]. Failures inside an ambient transaction roll it
//! back before the error reaches the caller, and notifications produced
//! inside one are parked in the handle's [`Outbox`] until whoever commits the
//! transaction flushes it.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{DriverError, OgmError, Result};
use crate::schema::{EventSink, ModelEvent};
use crate::statement::Statement;

/// The state of a transaction handle.
///
/// Handles progress from `Open` to exactly one terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// The handle accepts statements.
    Open,
    /// The transaction has been committed.
    Committed,
    /// The transaction has been rolled back.
    RolledBack,
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TxState::Open => "open",
            TxState::Committed => "committed",
            TxState::RolledBack => "rolled back",
        })
    }
}

/// Executes statements in auto-committed single-request transactions.
#[async_trait]
pub trait GraphDriver: Send + Sync {
    /// Runs `statements` in a transaction that commits when the request
    /// completes, returning the raw response envelope.
    async fn run_auto_commit(
        &self,
        statements: &[Statement],
    ) -> std::result::Result<Value, DriverError>;
}

/// Caller-owned multi-statement transaction.
///
/// The handle is borrowed exclusively for the duration of an operation, so
/// statement order on a handle is the order operations were awaited.
#[async_trait]
pub trait TransactionHandle: Send {
    /// Appends `statement` to the transaction and returns the raw response.
    async fn exec(&mut self, statement: &Statement) -> std::result::Result<Value, DriverError>;

    /// Rolls the transaction back.
    async fn remove(&mut self) -> std::result::Result<(), DriverError>;

    /// Current lifecycle state.
    fn state(&self) -> TxState;

    /// Notifications waiting for this transaction to commit.
    fn outbox_mut(&mut self) -> &mut Outbox;
}

/// Notification deferred until its transaction commits.
#[derive(Clone)]
pub struct PendingEvent {
    /// Receiver of the notification.
    pub sink: Arc<dyn EventSink>,
    /// Event to fire.
    pub event: ModelEvent,
    /// Event payload.
    pub args: Vec<Value>,
}

impl fmt::Debug for PendingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingEvent")
            .field("event", &self.event)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// Ordered, append-only queue of deferred notifications owned by a
/// transaction handle.
#[derive(Debug, Default)]
pub struct Outbox {
    pending: Vec<PendingEvent>,
}

impl Outbox {
    /// Empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a notification.
    pub fn push(&mut self, event: PendingEvent) {
        self.pending.push(event);
    }

    /// Queued notifications in append order.
    pub fn pending(&self) -> &[PendingEvent] {
        &self.pending
    }

    /// Number of queued notifications.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Fires every queued notification in order and empties the queue. Call
    /// after the owning transaction committed.
    pub fn flush(&mut self) -> usize {
        let fired = self.pending.len();
        for pending in self.pending.drain(..) {
            pending.sink.notify(pending.event, &pending.args);
        }
        debug!(fired, "ogm.outbox.flushed");
        fired
    }

    /// Drops every queued notification. Call after the owning transaction
    /// rolled back.
    pub fn discard(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        debug!(dropped, "ogm.outbox.discarded");
        dropped
    }
}

/// Policy for a rollback that fails while handling another error.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RollbackFailurePolicy {
    /// Log the rollback failure and return the original error unchanged.
    Discard,
    /// Return [`OgmError::RollbackFailed`] carrying both errors.
    Surface,
}

/// Runs `statement` inside `transaction` when given, otherwise through an
/// auto-commit request on `driver`.
///
/// Execution failures inside `transaction` roll it back exactly once before
/// returning. A handle that is no longer open is rejected without being
/// touched.
pub async fn execute<D>(
    driver: &D,
    transaction: Option<&mut (dyn TransactionHandle + '_)>,
    statement: &Statement,
    policy: RollbackFailurePolicy,
) -> Result<Value>
where
    D: GraphDriver + ?Sized,
{
    match transaction {
        Some(tx) => {
            ensure_open(tx)?;
            debug!(statement = statement.text(), "ogm.tx.exec");
            match tx.exec(statement).await {
                Ok(response) => Ok(response),
                Err(err) => Err(rollback(tx, OgmError::Driver(err), policy).await),
            }
        }
        None => {
            debug!(statement = statement.text(), "ogm.tx.auto_commit");
            driver
                .run_auto_commit(std::slice::from_ref(statement))
                .await
                .map_err(OgmError::Driver)
        }
    }
}

/// Fails with [`OgmError::InvalidTransactionState`] unless `tx` is open.
pub fn ensure_open(tx: &(dyn TransactionHandle + '_)) -> Result<()> {
    match tx.state() {
        TxState::Open => Ok(()),
        state => Err(OgmError::InvalidTransactionState(state)),
    }
}

/// Rolls `tx` back after `cause` and returns the error to surface.
///
/// Handles already in a terminal state are left alone. The outbox is
/// discarded on a successful rollback since none of its events will commit.
pub async fn rollback(
    tx: &mut (dyn TransactionHandle + '_),
    cause: OgmError,
    policy: RollbackFailurePolicy,
) -> OgmError {
    if tx.state() != TxState::Open {
        return cause;
    }
    debug!(error = %cause, "ogm.tx.rollback");
    match tx.remove().await {
        Ok(()) => {
            tx.outbox_mut().discard();
            cause
        }
        Err(rollback) => match policy {
            RollbackFailurePolicy::Discard => {
                warn!(error = %cause, rollback_error = %rollback, "ogm.tx.rollback_failed");
                cause
            }
            RollbackFailurePolicy::Surface => OgmError::RollbackFailed {
                cause: Box::new(cause),
                rollback,
            },
        },
    }
}

/// Delivers `event` to `sink`: queued on the ambient transaction's outbox, or
/// fired right away when the statement was auto-committed.
pub fn notify(
    sink: Arc<dyn EventSink>,
    transaction: Option<&mut (dyn TransactionHandle + '_)>,
    event: ModelEvent,
    args: Vec<Value>,
) {
    match transaction {
        Some(tx) => {
            debug!(event = event.as_str(), "ogm.tx.event_deferred");
            tx.outbox_mut().push(PendingEvent { sink, event, args });
        }
        None => {
            debug!(event = event.as_str(), "ogm.tx.event_fired");
            sink.notify(event, &args);
        }
    }
}
