use std::time::Duration;

use runlet::{Engine, ExitReason, Inbound, Outbound, SessionId};

use super::{collect_run, combined_output, test_config, test_engine};

fn execute(language: &str, code: &str) -> Inbound {
    Inbound::Execute {
        language: language.to_owned(),
        code: code.to_owned(),
    }
}

#[tokio::test]
async fn shell_hello_world() {
    let engine = test_engine();
    let session = SessionId::new("exec-hello");
    let mut rx = engine.open_session(session.clone());

    engine
        .handle_message(&session, execute("shell", "echo hi"))
        .await;
    let events = collect_run(&mut rx, Duration::from_secs(10)).await;

    assert_eq!(
        events.first(),
        Some(&Outbound::ExecutionStarted(String::new()))
    );
    assert!(combined_output(&events).contains("hi"));
    assert_eq!(
        events.last(),
        Some(&Outbound::complete(ExitReason::Exited(0)))
    );
}

#[tokio::test]
async fn exit_code_is_reported() {
    let engine = test_engine();
    let session = SessionId::new("exec-code");
    let mut rx = engine.open_session(session.clone());

    engine
        .handle_message(&session, execute("shell", "exit 3"))
        .await;
    let events = collect_run(&mut rx, Duration::from_secs(10)).await;

    assert_eq!(
        events.last(),
        Some(&Outbound::complete(ExitReason::Exited(3)))
    );
}

#[tokio::test]
async fn stderr_is_streamed() {
    let engine = test_engine();
    let session = SessionId::new("exec-stderr");
    let mut rx = engine.open_session(session.clone());

    engine
        .handle_message(&session, execute("shell", "echo oops >&2"))
        .await;
    let events = collect_run(&mut rx, Duration::from_secs(10)).await;

    assert!(combined_output(&events).contains("oops"));
    assert_eq!(
        events.last(),
        Some(&Outbound::complete(ExitReason::Exited(0)))
    );
}

#[tokio::test]
async fn completion_is_emitted_exactly_once_and_last() {
    let engine = test_engine();
    let session = SessionId::new("exec-once");
    let mut rx = engine.open_session(session.clone());

    engine
        .handle_message(&session, execute("shell", "echo one; echo two"))
        .await;
    let events = collect_run(&mut rx, Duration::from_secs(10)).await;

    let completions = events
        .iter()
        .filter(|event| matches!(event, Outbound::ExecutionComplete(_)))
        .count();
    assert_eq!(completions, 1);

    // Nothing trails the completion event.
    let trailing = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
    assert!(trailing.is_err(), "events arrived after execution_complete");
}

#[tokio::test]
async fn compile_failure_reports_diagnostics_without_output() {
    let engine = test_engine();
    let session = SessionId::new("exec-badcompile");
    let mut rx = engine.open_session(session.clone());

    engine
        .handle_message(&session, execute("badcompile", "whatever"))
        .await;
    let events = collect_run(&mut rx, Duration::from_secs(15)).await;

    let diagnostics = events.iter().find_map(|event| match event {
        Outbound::Error(message) => Some(message.clone()),
        _ => None,
    });
    let diagnostics = diagnostics.expect("expected a compile error event");
    assert!(diagnostics.contains("compilation failed"));
    assert!(diagnostics.contains("boom"));

    assert!(
        !events
            .iter()
            .any(|event| matches!(event, Outbound::Output(_))),
        "compile failure must not produce output events"
    );
    assert_eq!(events.last(), Some(&Outbound::complete(ExitReason::Failed)));
}

#[tokio::test]
async fn compiled_language_builds_then_runs() {
    let engine = test_engine();
    let session = SessionId::new("exec-compiled");
    let mut rx = engine.open_session(session.clone());

    engine
        .handle_message(
            &session,
            execute("compiled", "#!/bin/sh\necho built-output\n"),
        )
        .await;
    let events = collect_run(&mut rx, Duration::from_secs(15)).await;

    assert!(combined_output(&events).contains("built-output"));
    assert_eq!(
        events.last(),
        Some(&Outbound::complete(ExitReason::Exited(0)))
    );
}

#[tokio::test]
async fn hard_ceiling_kills_and_reports_timeout_sentinel() {
    let mut config = test_config();
    config.engine.hard_timeout_secs = 1;
    let engine = Engine::new(config);
    let session = SessionId::new("exec-timeout");
    let mut rx = engine.open_session(session.clone());

    engine
        .handle_message(&session, execute("shell", "sleep 30"))
        .await;
    let events = collect_run(&mut rx, Duration::from_secs(10)).await;

    let timeout_error = events.iter().any(|event| match event {
        Outbound::Error(message) => message.contains("timed out"),
        _ => false,
    });
    assert!(timeout_error, "expected a timeout error event");
    assert_eq!(
        events.last(),
        Some(&Outbound::complete(ExitReason::TimedOut))
    );
}

#[tokio::test]
async fn missing_interpreter_fails_without_hanging() {
    let mut config = test_config();
    config
        .languages
        .get_mut("shell")
        .unwrap()
        .run
        .command = vec!["definitely-not-a-real-binary".to_owned(), "{source}".to_owned()];
    let engine = Engine::new(config);
    let session = SessionId::new("exec-noexec");
    let mut rx = engine.open_session(session.clone());

    engine
        .handle_message(&session, execute("shell", "echo hi"))
        .await;
    let events = collect_run(&mut rx, Duration::from_secs(10)).await;

    let io_error = events.iter().any(|event| match event {
        Outbound::Error(message) => message.contains("Execution failed (IO)"),
        _ => false,
    });
    assert!(io_error, "expected an IO error event");
    assert_eq!(events.last(), Some(&Outbound::complete(ExitReason::Failed)));
}

#[tokio::test]
#[cfg(feature = "toolchain-tests")]
#[ignore = "requires python3"]
async fn python_hello_world() {
    let engine = test_engine();
    let session = SessionId::new("exec-python");
    let mut rx = engine.open_session(session.clone());

    engine
        .handle_message(&session, execute("python", "print('hi')"))
        .await;
    let events = collect_run(&mut rx, Duration::from_secs(15)).await;

    assert_eq!(
        events.first(),
        Some(&Outbound::ExecutionStarted(String::new()))
    );
    assert!(combined_output(&events).contains("hi"));
    assert_eq!(
        events.last(),
        Some(&Outbound::complete(ExitReason::Exited(0)))
    );
}
