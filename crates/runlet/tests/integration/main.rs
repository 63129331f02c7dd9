//! Integration tests for runlet
//!
//! These tests drive the engine end to end with shell-backed recipes so
//! they run without any language toolchains installed. Scenarios that need
//! a real interpreter are `#[ignore]`d and run with
//! `cargo test --features toolchain-tests -- --include-ignored`.

mod collab_rooms;
mod execution;
mod supersession;

use std::time::Duration;

use runlet::{Config, Engine, Envelope, Outbound};
use tokio::sync::mpsc;

/// Engine config with shell-backed test languages.
pub fn test_config() -> Config {
    Config::parse_toml(
        r#"
[engine]
hard_timeout_secs = 300

[engine.env]
TERM = "dumb"

[languages.shell]
name = "Shell"
extension = "sh"
idle_timeout_ms = 150

[languages.shell.run]
command = ["sh", "{source}"]

[languages.badcompile]
name = "Bad Compile"
extension = "src"

[languages.badcompile.compile]
command = ["sh", "-c", "echo 'boom: expected failure' >&2; exit 1"]
timeout_secs = 10

[languages.badcompile.run]
command = ["true"]

[languages.compiled]
name = "Copy Compiled"
extension = "src"

[languages.compiled.compile]
command = ["sh", "-c", "cp main.src main && chmod +x main"]
timeout_secs = 10

[languages.compiled.run]
command = ["./main"]

[languages.python]
name = "Python 3"
extension = "py"
idle_timeout_ms = 350

[languages.python.run]
command = ["python3", "-u", "{source}"]
"#,
    )
    .expect("test config should be valid")
}

pub fn test_engine() -> Engine {
    Engine::new(test_config())
}

/// Collect event payloads until (and including) the first
/// `execution_complete`.
pub async fn collect_run(rx: &mut mpsc::Receiver<Envelope>, budget: Duration) -> Vec<Outbound> {
    let deadline = tokio::time::Instant::now() + budget;
    let mut events = Vec::new();
    loop {
        let envelope = tokio::time::timeout_at(deadline, rx.recv())
            .await
            .expect("timed out waiting for execution events")
            .expect("event channel closed");
        let done = matches!(envelope.payload, Outbound::ExecutionComplete(_));
        events.push(envelope.payload);
        if done {
            return events;
        }
    }
}

/// Collect event payloads until the first one matching `pred`, inclusive.
pub async fn collect_until(
    rx: &mut mpsc::Receiver<Envelope>,
    budget: Duration,
    pred: impl Fn(&Outbound) -> bool,
) -> Vec<Outbound> {
    let deadline = tokio::time::Instant::now() + budget;
    let mut events = Vec::new();
    loop {
        let envelope = tokio::time::timeout_at(deadline, rx.recv())
            .await
            .expect("timed out waiting for matching event")
            .expect("event channel closed");
        let done = pred(&envelope.payload);
        events.push(envelope.payload);
        if done {
            return events;
        }
    }
}

/// All `output` chunks concatenated in delivery order.
pub fn combined_output(events: &[Outbound]) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            Outbound::Output(chunk) => Some(chunk.as_str()),
            _ => None,
        })
        .collect()
}
