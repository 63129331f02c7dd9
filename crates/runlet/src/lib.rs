//! A library for streaming sandboxed code execution.
//!
//! Runlet lets a remote client submit source code in one of several
//! languages, executes it in an isolated, resource-bounded environment, and
//! streams stdout/stderr and interactive input back over the session's
//! event channel in real time.
//!
//! # Features
//!
//! - **Session engine** — per-session process lifecycle with supersession,
//!   hard timeouts, and guaranteed cleanup, multiplexed across any number of
//!   concurrent sessions.
//! - **Streaming I/O** — one concurrent reader per output stream, plus a
//!   heuristic that detects a program blocked on stdin.
//! - **Multi-language** — data-driven TOML recipes for compiled and
//!   interpreted languages, with pluggable entry-point detection and input
//!   harness hooks.
//! - **Sandbox pools** — pre-warmed per-language environments leased and
//!   released around executions.
//! - **Collaboration rooms** — room-scoped code-sync and chat fan-out,
//!   independent of execution state.

pub use config::{Config, ConfigError, EXAMPLE_CONFIG, Language};
pub use engine::{Engine, EngineError, Envelope, Inbound, Outbound};
pub use pool::{PoolError, SandboxHandle, SandboxPool};
pub use scratch::{Scratch, ScratchError};
pub use types::{ExitReason, SessionId};

pub mod collab;
pub mod config;
pub mod engine;
pub mod pool;
pub mod scratch;
pub mod toolchain;
pub mod types;
