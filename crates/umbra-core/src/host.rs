//! Host debugger capabilities.
//!
//! The bridge never talks to a concrete debugger. It implements
//! [`LifecycleObserver`], gets subscribed to a [`LifecycleEventSource`], and
//! asks a [`ProcessSnapshot`] which processes exist when a notification is
//! not scoped to one.
//!
//! [`SyntheticHost`] provides all three in memory. Tests and `umbra replay`
//! drive the bridge through it.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::trace;

use crate::events::{DebugEvent, EventKind};
use crate::types::{ProcessId, TrackedProcess};

/// Receives host lifecycle notifications.
///
/// Implementations must not panic and should return quickly: they run on
/// whatever thread the host raises notifications from.
pub trait LifecycleObserver: Send + Sync
{
    /// The host debugger engine started.
    fn on_start(&self);

    /// One lifecycle notification.
    fn on_event(&self, event: &DebugEvent);
}

/// A stream of lifecycle notifications observers can subscribe to.
pub trait LifecycleEventSource
{
    /// Register `observer`; it receives every later notification.
    fn subscribe(&self, observer: Arc<dyn LifecycleObserver>);
}

/// Queryable list of processes the host currently tracks.
pub trait ProcessSnapshot: Send + Sync
{
    /// Processes known right now.
    fn processes(&self) -> Vec<TrackedProcess>;
}

/// Process table shared between [`SyntheticHost`] and its consumers.
#[derive(Debug, Default)]
pub struct ProcessTable
{
    entries: RwLock<BTreeMap<ProcessId, TrackedProcess>>,
}

impl ProcessTable
{
    /// Add or update a process.
    pub fn insert(&self, process: TrackedProcess)
    {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(process.pid, process);
    }

    /// Remove a process. Returns whether it was present.
    pub fn remove(&self, pid: ProcessId) -> bool
    {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&pid)
            .is_some()
    }

    /// Number of tracked processes.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no process is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }
}

impl ProcessSnapshot for ProcessTable
{
    fn processes(&self) -> Vec<TrackedProcess>
    {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .copied()
            .collect()
    }
}

/// In-memory host debugger.
///
/// Keeps its process table in step with the events it emits: a process is
/// listed before its created event is delivered and unlisted after its exit
/// event is delivered.
#[derive(Default)]
pub struct SyntheticHost
{
    table: Arc<ProcessTable>,
    observers: Mutex<Vec<Arc<dyn LifecycleObserver>>>,
}

impl SyntheticHost
{
    /// Host with no processes and no observers.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// The host's process table, for handing to the bridge.
    #[must_use]
    pub fn snapshot(&self) -> Arc<ProcessTable>
    {
        Arc::clone(&self.table)
    }

    /// Track a process without emitting an event.
    pub fn track(&self, process: TrackedProcess)
    {
        self.table.insert(process);
    }

    /// Invoke every observer's start hook.
    pub fn start(&self)
    {
        for observer in self.observers() {
            observer.on_start();
        }
    }

    /// Deliver `event` to every observer, in subscription order.
    pub fn emit(&self, event: &DebugEvent)
    {
        if let (EventKind::ProcessCreated, Some(pid)) = (event.kind, event.process) {
            self.table.insert(TrackedProcess::new(pid, event.pointer_width));
        }

        let observers = self.observers();
        trace!(kind = ?event.kind, pid = ?event.process, observers = observers.len(), "emitting host event");
        for observer in observers {
            observer.on_event(event);
        }

        if let (EventKind::ProcessExited, Some(pid)) = (event.kind, event.process) {
            self.table.remove(pid);
        }
    }

    fn observers(&self) -> Vec<Arc<dyn LifecycleObserver>>
    {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl LifecycleEventSource for SyntheticHost
{
    fn subscribe(&self, observer: Arc<dyn LifecycleObserver>)
    {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner).push(observer);
    }
}
