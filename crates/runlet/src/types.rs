use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one client session.
///
/// Opaque and unique per connection; minted by the transport substrate, not
/// by this library. Every process-wide registry is keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// How one execution ended.
///
/// The `Display` form is the wire payload of the `execution_complete` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The process terminated on its own with this exit code.
    Exited(i32),

    /// The client (or session close) stopped the execution.
    Stopped,

    /// The hard wall-clock ceiling expired and the process was killed.
    TimedOut,

    /// The execution never reached a usable exit status (spawn or pipe
    /// failure, compile error).
    Failed,
}

impl ExitReason {
    /// Sentinel exit code reported for timed-out executions.
    pub const TIMEOUT_CODE: i32 = 124;
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Exited(code) => write!(f, "Exit code: {code}"),
            ExitReason::Stopped => write!(f, "Execution stopped"),
            ExitReason::TimedOut => write!(f, "Exit code: {} (Timeout)", Self::TIMEOUT_CODE),
            ExitReason::Failed => write!(f, "Exit code: 1"),
        }
    }
}
