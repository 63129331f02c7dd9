//! Session execution control
//!
//! Owns the one-execution-at-a-time invariant per session, the process
//! lifecycle from compile to exit, input forwarding, the hard wall-clock
//! ceiling, and cleanup on every exit path.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, Command};
use tokio::sync::{Mutex, watch};
use tracing::{debug, instrument, warn};

use crate::config::{CompileConfig, Config, Language};
use crate::engine::EngineError;
use crate::engine::gobbler;
use crate::engine::message::Outbound;
use crate::engine::registry::{ExecutionSlot, SessionEntry, SessionRegistry};
use crate::scratch::Scratch;
use crate::toolchain::{self, PreparedJob};
use crate::types::{ExitReason, SessionId};

/// Grace given to gobbler tasks for their final drain before the completion
/// event is emitted, so completion stays the execution's last event.
const GOBBLER_JOIN_GRACE: Duration = Duration::from_millis(500);

/// Cap on forwarded compiler diagnostics.
const MAX_DIAGNOSTIC_LINES: usize = 100;

/// Handles threaded from `execute` acceptance into the lifecycle task.
struct ExecHandles {
    stop_rx: watch::Receiver<bool>,
    alive: Arc<AtomicBool>,
    stdin_slot: Arc<Mutex<Option<ChildStdin>>>,
}

pub(crate) struct Controller {
    config: Arc<Config>,
    registry: Arc<SessionRegistry>,
}

impl Controller {
    pub fn new(config: Arc<Config>, registry: Arc<SessionRegistry>) -> Self {
        Self { config, registry }
    }

    /// Accept or reject an `execute` message.
    ///
    /// On acceptance the execution's stop/stdin handles are registered
    /// *before* the lifecycle task starts, so a `stop` racing with the
    /// compile phase still targets this execution. The lifecycle then runs
    /// on its own task.
    #[instrument(skip(self, code), fields(session = %session))]
    pub async fn execute(&self, session: &SessionId, language_id: &str, code: String) {
        let Some(entry) = self.registry.get(session) else {
            warn!("execute for unknown session");
            return;
        };

        if !entry.try_acquire_exec() {
            entry
                .send(Outbound::error(EngineError::AlreadyExecuting.to_string()))
                .await;
            return;
        }

        // Supersession: a stale registration is terminated, never queued
        // behind. With the lock held this is normally a no-op.
        entry.signal_stop().await;

        let language = match self.config.get_language(language_id) {
            Ok(language) => language.clone(),
            Err(_) => {
                entry
                    .send(Outbound::error(
                        EngineError::UnsupportedLanguage(language_id.to_owned()).to_string(),
                    ))
                    .await;
                entry.release_exec();
                return;
            }
        };

        debug!(language = %language.name, "execution accepted");

        // Register the execution's handles before announcing it, so a stop
        // arriving right behind the accept already has a target.
        let (stop_tx, stop_rx) = watch::channel(false);
        let alive = Arc::new(AtomicBool::new(true));
        let stdin_slot: Arc<Mutex<Option<ChildStdin>>> = Arc::new(Mutex::new(None));
        {
            let mut slot = entry.execution.lock().await;
            *slot = Some(ExecutionSlot {
                stdin: Arc::clone(&stdin_slot),
                stop: stop_tx,
                alive: Arc::clone(&alive),
            });
        }

        entry.input_requested.store(false, Ordering::Release);
        entry.send(Outbound::execution_started()).await;

        let handles = ExecHandles {
            stop_rx,
            alive,
            stdin_slot,
        };
        let config = Arc::clone(&self.config);
        let session = session.clone();
        tokio::spawn(run_lifecycle(config, entry, session, language, code, handles));
    }

    /// Force-terminate the session's current execution, if any.
    ///
    /// When an execution is registered, only the signal is sent here; its
    /// lifecycle task kills the process and emits the completion event, so
    /// every execution completes exactly once. With nothing running this
    /// answers directly and is otherwise a no-op.
    #[instrument(skip(self), fields(session = %session))]
    pub async fn stop(&self, session: &SessionId) {
        let Some(entry) = self.registry.get(session) else {
            return;
        };

        let signaled = {
            let slot = entry.execution.lock().await;
            slot.as_ref().map(ExecutionSlot::signal_stop)
        };

        match signaled {
            Some(true) => debug!("stop signaled to running execution"),
            // Teardown already underway; its completion event is coming.
            Some(false) => debug!("stop raced with execution teardown"),
            None => {
                entry.release_exec();
                entry.send(Outbound::complete(ExitReason::Stopped)).await;
            }
        }
    }

    /// Forward one line of client input to the running process's stdin.
    ///
    /// Input is never queued for a future execution: without a live process
    /// the call produces an `error` event.
    #[instrument(skip(self, data), fields(session = %session))]
    pub async fn input(&self, session: &SessionId, data: &str) {
        let Some(entry) = self.registry.get(session) else {
            return;
        };

        let registered = {
            let slot = entry.execution.lock().await;
            slot.as_ref()
                .map(|slot| (Arc::clone(&slot.stdin), Arc::clone(&slot.alive)))
        };

        let Some((stdin, alive)) = registered else {
            entry
                .send(Outbound::error(
                    "Cannot send input: No active process found for your session.",
                ))
                .await;
            return;
        };

        if !alive.load(Ordering::Acquire) {
            entry
                .send(Outbound::error("Cannot send input: Process is not running."))
                .await;
            return;
        }

        let write_result = {
            let mut guard = stdin.lock().await;
            match guard.as_mut() {
                Some(writer) => {
                    let mut line = data.as_bytes().to_vec();
                    line.push(b'\n');
                    async {
                        writer.write_all(&line).await?;
                        writer.flush().await
                    }
                    .await
                    .map(Some)
                }
                None => Ok(None),
            }
        };

        match write_result {
            Ok(Some(())) => {
                entry.input_requested.store(false, Ordering::Release);
                debug!(len = data.len(), "forwarded input line");
            }
            Ok(None) => {
                entry
                    .send(Outbound::error("Cannot send input: Process is not running."))
                    .await;
            }
            Err(e) => {
                entry
                    .send(Outbound::error(format!("Failed to send input: {e}")))
                    .await;
            }
        }
    }
}

/// Drive one execution to completion and clean up on every exit path:
/// success, compile failure, runtime error, timeout, or stop. The lock is
/// released and the registration cleared last, so a new `execute` can only
/// be accepted once this execution has fully wound down.
async fn run_lifecycle(
    config: Arc<Config>,
    entry: Arc<SessionEntry>,
    session: SessionId,
    language: Language,
    code: String,
    handles: ExecHandles,
) {
    let reason = match drive(&config, &entry, &session, &language, &code, handles).await {
        Ok(reason) => reason,
        Err(err) => {
            warn!(session = %session, error = %err, "execution failed");
            entry.send(Outbound::error(err.to_string())).await;
            ExitReason::Failed
        }
    };

    if reason == ExitReason::TimedOut {
        entry
            .send(Outbound::error(
                EngineError::RuntimeTimeout(config.engine.hard_timeout_secs).to_string(),
            ))
            .await;
    }

    entry.send(Outbound::complete(reason)).await;

    {
        let mut slot = entry.execution.lock().await;
        *slot = None;
    }
    entry.input_requested.store(false, Ordering::Release);
    entry.release_exec();
    debug!(session = %session, ?reason, "execution finished, lock released");
}

async fn drive(
    config: &Config,
    entry: &Arc<SessionEntry>,
    session: &SessionId,
    language: &Language,
    code: &str,
    handles: ExecHandles,
) -> Result<ExitReason, EngineError> {
    let job = toolchain::prepare(language, code);
    let scratch = Scratch::create(session)?;
    let result = drive_in_scratch(config, entry, language, &job, &scratch, handles).await;
    scratch.dispose();
    result
}

async fn drive_in_scratch(
    config: &Config,
    entry: &Arc<SessionEntry>,
    language: &Language,
    job: &PreparedJob,
    scratch: &Scratch,
    handles: ExecHandles,
) -> Result<ExitReason, EngineError> {
    let ExecHandles {
        mut stop_rx,
        alive,
        stdin_slot,
    } = handles;

    scratch.write_file(&job.source_name, &job.source).await?;

    if let (Some(compile_command), Some(compile_cfg)) = (&job.compile_command, &language.compile) {
        tokio::select! {
            result = run_compile_step(config, language, compile_cfg, compile_command, scratch) => result?,
            _ = stop_rx.changed() => {
                debug!("stopped during compile phase");
                alive.store(false, Ordering::Release);
                return Ok(ExitReason::Stopped);
            }
        }
    }

    let Some((program, args)) = job.run_command.split_first() else {
        return Err(EngineError::Io(std::io::Error::other("empty run command")));
    };

    debug!(command = ?job.run_command, "launching program");

    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(scratch.path())
        .envs(&config.engine.env)
        .envs(&language.run.env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn()?;

    {
        let mut guard = stdin_slot.lock().await;
        *guard = child.stdin.take();
    }

    let mut gobblers = Vec::with_capacity(2);
    let idle_timeout = language.idle_timeout();
    if let Some(stdout) = child.stdout.take() {
        gobblers.push(tokio::spawn(gobbler::gobble(
            stdout,
            entry.outbound(),
            Arc::clone(&entry.input_requested),
            Arc::clone(&alive),
            idle_timeout,
            stop_rx.clone(),
        )));
    }
    if let Some(stderr) = child.stderr.take() {
        gobblers.push(tokio::spawn(gobbler::gobble(
            stderr,
            entry.outbound(),
            Arc::clone(&entry.input_requested),
            Arc::clone(&alive),
            idle_timeout,
            stop_rx.clone(),
        )));
    }

    // Resolve the wait outcome first; the child is killed only after the
    // select's futures have released their borrow of it.
    enum WaitOutcome {
        Exited(std::io::Result<std::process::ExitStatus>),
        TimedOut,
        Stopped,
    }

    let waited = tokio::select! {
        result = tokio::time::timeout(config.hard_timeout(), child.wait()) => match result {
            Ok(wait_result) => WaitOutcome::Exited(wait_result),
            Err(_) => WaitOutcome::TimedOut,
        },
        _ = stop_rx.changed() => WaitOutcome::Stopped,
    };

    let outcome: Result<ExitReason, EngineError> = match waited {
        WaitOutcome::Exited(Ok(status)) => Ok(ExitReason::Exited(status.code().unwrap_or(1))),
        WaitOutcome::Exited(Err(e)) => Err(EngineError::Io(e)),
        WaitOutcome::TimedOut => {
            debug!("hard ceiling expired, killing process");
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill timed-out process");
            }
            Ok(ExitReason::TimedOut)
        }
        WaitOutcome::Stopped => {
            debug!("stop requested, killing process");
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill stopped process");
            }
            Ok(ExitReason::Stopped)
        }
    };

    // Shared teardown on every path out of the wait: mark the process dead,
    // close our half of stdin, signal the gobblers, and give them a bounded
    // window to drain. Already-finished gobblers make the join a no-op, so
    // this cannot deadlock.
    alive.store(false, Ordering::Release);
    {
        let mut guard = stdin_slot.lock().await;
        *guard = None;
    }
    entry.signal_stop().await;
    for handle in gobblers {
        if tokio::time::timeout(GOBBLER_JOIN_GRACE, handle).await.is_err() {
            warn!("gobbler did not finish within the join grace period");
        }
    }

    outcome
}

async fn run_compile_step(
    config: &Config,
    language: &Language,
    compile_cfg: &CompileConfig,
    compile_command: &[String],
    scratch: &Scratch,
) -> Result<(), EngineError> {
    let Some((program, args)) = compile_command.split_first() else {
        return Err(EngineError::Io(std::io::Error::other(
            "empty compile command",
        )));
    };

    debug!(command = ?compile_command, "compiling");

    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(scratch.path())
        .envs(&config.engine.env)
        .envs(&compile_cfg.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(compile_cfg.timeout(), command.output()).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(EngineError::Compile {
                diagnostics: format!(
                    "{} compilation timed out after {} seconds",
                    language.name, compile_cfg.timeout_secs
                ),
            });
        }
    };

    if !output.status.success() {
        return Err(EngineError::Compile {
            diagnostics: format!(
                "{} compilation failed:\n{}",
                language.name,
                truncate_diagnostics(&output.stderr)
            ),
        });
    }

    debug!("compilation succeeded");
    Ok(())
}

/// Cap compiler output so a pathological error dump cannot flood the client.
fn truncate_diagnostics(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().take(MAX_DIAGNOSTIC_LINES).collect();
    lines.join("\n")
}
