//! Wire protocol between the transport substrate and the engine
//!
//! One JSON object per message in both directions. Inbound messages are
//! discriminated by a `type` field; outbound messages are a
//! `{type, data, timestamp}` envelope.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::ExitReason;

/// Message from a client session.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    /// Start an execution, superseding any prior one
    Execute { language: String, code: String },

    /// Forward one line to the running process's stdin
    Input { data: String },

    /// Force-terminate the running process
    Stop,

    /// Liveness check
    Ping,

    /// Create a collaboration room
    #[serde(rename_all = "camelCase")]
    CreateCollabSession {
        session_id: String,
        code: String,
        language: String,
        host_id: String,
    },

    /// Join an existing collaboration room
    #[serde(rename_all = "camelCase")]
    JoinCollabSession {
        session_id: String,
        #[serde(default)]
        display_name: Option<String>,
    },

    /// Update the room's shared code, broadcast to other members
    SyncCode { code: String, language: String },

    /// Broadcast verbatim to all room members
    ChatMessage { data: Value },
}

/// Event delivered to a client session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Outbound {
    ExecutionStarted(String),
    Output(String),
    InputRequest(String),
    ExecutionComplete(String),
    Error(String),
    Pong(String),
    CollabSessionCreated(String),
    InitialCodeSync(Value),
    CodeSync(Value),
    CollabUpdate(String),
    ChatMessage(Value),
}

impl Outbound {
    pub fn execution_started() -> Self {
        Outbound::ExecutionStarted(String::new())
    }

    pub fn input_request() -> Self {
        Outbound::InputRequest(String::new())
    }

    pub fn pong() -> Self {
        Outbound::Pong("Server alive".to_owned())
    }

    pub fn complete(reason: ExitReason) -> Self {
        Outbound::ExecutionComplete(reason.to_string())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Outbound::Error(message.into())
    }
}

/// Outbound event plus its emission timestamp (milliseconds since epoch).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub payload: Outbound,
    pub timestamp: u64,
}

impl Envelope {
    pub fn new(payload: Outbound) -> Self {
        Self {
            payload,
            timestamp: now_millis(),
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
