//! Execution engine
//!
//! The boundary between the transport substrate and everything else in this
//! crate. A caller opens a session (receiving that session's outbound event
//! channel), feeds decoded [`Inbound`] messages in, and closes the session
//! when the connection goes away. All failures inside an execution are
//! translated into `error`/`execution_complete` events here; nothing
//! propagates far enough to take down a session or the process.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::instrument;

use crate::collab::CollabHub;
use crate::config::Config;
use crate::pool::SandboxPool;
use crate::types::SessionId;

mod controller;
mod gobbler;
mod message;
mod registry;

pub use message::{Envelope, Inbound, Outbound};

use controller::Controller;
use registry::SessionRegistry;

/// Failure taxonomy for the execution engine.
///
/// The `Display` forms are the user-facing `error` event payloads.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad input; user-facing, no retry
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// The caller must `stop` (or wait) first
    #[error("You already have an execution in progress.")]
    AlreadyExecuting,

    /// Carries captured compiler diagnostics; not fatal to the session
    #[error("{diagnostics}")]
    Compile { diagnostics: String },

    /// The process was force-killed at the hard wall-clock ceiling
    #[error("Execution timed out after {0} seconds.")]
    RuntimeTimeout(u64),

    /// Pipe or process failure
    #[error("Execution failed (IO): {0}")]
    Io(#[from] std::io::Error),

    /// Scratch-directory failure
    #[error("Execution failed (IO): {0}")]
    Scratch(#[from] crate::scratch::ScratchError),
}

/// The execution engine.
///
/// Multiplexes any number of concurrent sessions; per-session state never
/// leaks across session boundaries.
pub struct Engine {
    config: Arc<Config>,
    registry: Arc<SessionRegistry>,
    controller: Controller,
    collab: CollabHub,
    pool: Arc<SandboxPool>,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(SessionRegistry::new());
        let controller = Controller::new(Arc::clone(&config), Arc::clone(&registry));
        let pool = Arc::new(SandboxPool::new(&config));
        Self {
            config,
            registry,
            controller,
            collab: CollabHub::new(),
            pool,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Per-language sandbox pools. Provisioned independently of the process
    /// lifecycle; see [`SandboxPool::prewarm`].
    pub fn pool(&self) -> &Arc<SandboxPool> {
        &self.pool
    }

    /// Register a session and hand back its outbound event channel.
    ///
    /// The single receiver serializes delivery, so events reach the client
    /// in submission order even with several producers behind it.
    pub fn open_session(&self, id: impl Into<SessionId>) -> mpsc::Receiver<Envelope> {
        self.registry.open(id.into())
    }

    /// Route one decoded client message.
    #[instrument(skip(self, message), fields(session = %session))]
    pub async fn handle_message(&self, session: &SessionId, message: Inbound) {
        match message {
            Inbound::Execute { language, code } => {
                self.controller.execute(session, &language, code).await;
            }
            Inbound::Input { data } => self.controller.input(session, &data).await,
            Inbound::Stop => self.controller.stop(session).await,
            Inbound::Ping => {
                if let Some(entry) = self.registry.get(session) {
                    entry.send(Outbound::pong()).await;
                }
            }
            Inbound::CreateCollabSession {
                session_id,
                code,
                language,
                host_id,
            } => {
                if let Some(entry) = self.registry.get(session) {
                    self.collab
                        .create(session, entry.outbound(), session_id, code, language, host_id)
                        .await;
                }
            }
            Inbound::JoinCollabSession {
                session_id,
                display_name,
            } => {
                if let Some(entry) = self.registry.get(session) {
                    self.collab
                        .join(session, entry.outbound(), session_id, display_name)
                        .await;
                }
            }
            Inbound::SyncCode { code, language } => {
                if let Some(entry) = self.registry.get(session) {
                    self.collab
                        .sync_code(session, entry.outbound(), code, language)
                        .await;
                }
            }
            Inbound::ChatMessage { data } => self.collab.chat(session, data).await,
        }
    }

    /// Tear down a session on connection close: force-terminate its running
    /// execution, leave its collaboration room, and purge every registry
    /// entry keyed by the session.
    #[instrument(skip(self), fields(session = %session))]
    pub async fn close_session(&self, session: &SessionId) {
        if let Some(entry) = self.registry.remove(session) {
            entry.signal_stop().await;
        }
        self.collab.leave(session).await;
    }

    /// Number of live sessions, for observability.
    pub fn session_count(&self) -> usize {
        self.registry.len()
    }
}
