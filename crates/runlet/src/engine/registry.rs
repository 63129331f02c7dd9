//! Process-wide table of live sessions
//!
//! Maps session identifier to that session's outbound channel, execution
//! lock, and currently registered execution. All mutation goes through
//! per-key operations on a concurrent map; two sessions can never observe
//! or mutate each other's entries.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use tokio::process::ChildStdin;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::debug;

use crate::engine::message::{Envelope, Outbound};
use crate::types::SessionId;

/// Capacity of one session's outbound channel. Bounded so a slow consumer
/// applies backpressure to the gobblers instead of output being dropped.
pub(crate) const OUTBOUND_CAPACITY: usize = 256;

/// Handles to the currently running execution.
///
/// Registered under the *session* identifier, never an execution identifier,
/// so a `stop` or `input` racing with process exit always targets the
/// execution that is actually registered.
#[derive(Debug)]
pub(crate) struct ExecutionSlot {
    /// Writer to the child's stdin, shared with the input handler
    pub stdin: Arc<Mutex<Option<ChildStdin>>>,

    /// Signals the lifecycle task to kill the process and the gobblers to
    /// stop and drain
    pub stop: watch::Sender<bool>,

    /// Cleared by the lifecycle task once the process has exited
    pub alive: Arc<AtomicBool>,
}

impl ExecutionSlot {
    /// Ask the lifecycle task to terminate this execution.
    ///
    /// Returns whether anything was listening; a no-op for an execution that
    /// already finished.
    pub fn signal_stop(&self) -> bool {
        self.stop.send(true).is_ok()
    }
}

/// One live session's state.
#[derive(Debug)]
pub(crate) struct SessionEntry {
    outbound: mpsc::Sender<Envelope>,

    /// One-execution-at-a-time guard; held from an accepted `execute` until
    /// that execution's cleanup finishes. Guards only the execution slot,
    /// not arbitrary session state.
    exec_lock: AtomicBool,

    /// Set when the idle heuristic has fired; cleared by new output or
    /// delivered input
    pub input_requested: Arc<AtomicBool>,

    /// Currently registered execution, if any
    pub execution: Mutex<Option<ExecutionSlot>>,
}

impl SessionEntry {
    /// Try to take the execution lock. Fails if an execution is in flight.
    pub fn try_acquire_exec(&self) -> bool {
        self.exec_lock
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Release the execution lock.
    pub fn release_exec(&self) {
        self.exec_lock.store(false, Ordering::Release);
    }

    /// Signal the registered execution, if any, to terminate.
    ///
    /// Returns whether a live execution received the signal.
    pub async fn signal_stop(&self) -> bool {
        let slot = self.execution.lock().await;
        slot.as_ref()
            .map(ExecutionSlot::signal_stop)
            .unwrap_or(false)
    }

    /// Clone of the outbound sender, for gobblers and room membership.
    pub fn outbound(&self) -> mpsc::Sender<Envelope> {
        self.outbound.clone()
    }

    /// Send one event to this session.
    ///
    /// Returns false when the session's channel is gone (consumer dropped);
    /// the session is then considered degraded and the event is discarded.
    pub async fn send(&self, payload: Outbound) -> bool {
        let delivered = self.outbound.send(Envelope::new(payload)).await.is_ok();
        if !delivered {
            debug!("outbound channel closed, dropping event");
        }
        delivered
    }
}

/// Registry of all live sessions, keyed by session identifier.
#[derive(Debug, Default)]
pub(crate) struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<SessionEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session and hand back the receiving half of its outbound
    /// channel. Re-opening an existing id replaces the previous entry.
    pub fn open(&self, id: SessionId) -> mpsc::Receiver<Envelope> {
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let entry = Arc::new(SessionEntry {
            outbound: tx,
            exec_lock: AtomicBool::new(false),
            input_requested: Arc::new(AtomicBool::new(false)),
            execution: Mutex::new(None),
        });
        self.sessions.insert(id.clone(), entry);
        debug!(session = %id, "session opened");
        rx
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<SessionEntry>> {
        self.sessions.get(id).map(|entry| Arc::clone(&entry))
    }

    /// Purge a session's entry, returning it for final cleanup.
    pub fn remove(&self, id: &SessionId) -> Option<Arc<SessionEntry>> {
        let removed = self.sessions.remove(id).map(|(_, entry)| entry);
        if removed.is_some() {
            debug!(session = %id, "session purged");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}
