use std::time::Duration;

use runlet::{ExitReason, Inbound, Outbound, SessionId};

use super::{collect_run, collect_until, combined_output, test_engine};

fn execute(code: &str) -> Inbound {
    Inbound::Execute {
        language: "shell".to_owned(),
        code: code.to_owned(),
    }
}

#[tokio::test]
async fn stop_kills_a_long_running_execution() {
    let engine = test_engine();
    let session = SessionId::new("super-stop");
    let mut rx = engine.open_session(session.clone());

    engine.handle_message(&session, execute("sleep 30")).await;
    let _ = collect_until(&mut rx, Duration::from_secs(5), |event| {
        matches!(event, Outbound::ExecutionStarted(_))
    })
    .await;

    engine.handle_message(&session, Inbound::Stop).await;
    let events = collect_run(&mut rx, Duration::from_secs(5)).await;

    assert_eq!(
        events.last(),
        Some(&Outbound::complete(ExitReason::Stopped))
    );
}

#[tokio::test]
async fn second_execute_while_running_is_rejected() {
    let engine = test_engine();
    let session = SessionId::new("super-busy");
    let mut rx = engine.open_session(session.clone());

    engine.handle_message(&session, execute("sleep 10")).await;
    let _ = collect_until(&mut rx, Duration::from_secs(5), |event| {
        matches!(event, Outbound::ExecutionStarted(_))
    })
    .await;

    engine.handle_message(&session, execute("echo nope")).await;
    let events = collect_until(&mut rx, Duration::from_secs(5), |event| {
        matches!(event, Outbound::Error(_))
    })
    .await;
    match events.last() {
        Some(Outbound::Error(message)) => {
            assert!(message.contains("already have an execution"));
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // The first execution is still the one that completes.
    engine.handle_message(&session, Inbound::Stop).await;
    let events = collect_run(&mut rx, Duration::from_secs(5)).await;
    assert_eq!(
        events.last(),
        Some(&Outbound::complete(ExitReason::Stopped))
    );
    assert!(!combined_output(&events).contains("nope"));
}

#[tokio::test]
async fn stopped_execution_never_leaks_into_the_next() {
    let engine = test_engine();
    let session = SessionId::new("super-leak");
    let mut rx = engine.open_session(session.clone());

    engine
        .handle_message(
            &session,
            execute("while true; do echo LEAK-A; sleep 1; done"),
        )
        .await;
    let _ = collect_until(&mut rx, Duration::from_secs(10), |event| {
        matches!(event, Outbound::Output(chunk) if chunk.contains("LEAK-A"))
    })
    .await;

    engine.handle_message(&session, Inbound::Stop).await;
    let first = collect_run(&mut rx, Duration::from_secs(5)).await;
    assert_eq!(
        first.last(),
        Some(&Outbound::complete(ExitReason::Stopped))
    );

    // The finished lifecycle releases the execution lock just after its
    // completion event; give it a beat so the next execute is accepted.
    tokio::time::sleep(Duration::from_millis(200)).await;

    engine.handle_message(&session, execute("echo B-OK")).await;
    let second = collect_run(&mut rx, Duration::from_secs(10)).await;

    assert!(combined_output(&second).contains("B-OK"));
    assert!(
        !combined_output(&second).contains("LEAK-A"),
        "output from the stopped execution leaked into the new one"
    );
}

#[tokio::test]
async fn concurrent_sessions_do_not_cross_talk() {
    let engine = test_engine();
    let session_a = SessionId::new("iso-a");
    let session_b = SessionId::new("iso-b");
    let mut rx_a = engine.open_session(session_a.clone());
    let mut rx_b = engine.open_session(session_b.clone());

    tokio::join!(
        engine.handle_message(&session_a, execute("echo ONLY-A")),
        engine.handle_message(&session_b, execute("echo ONLY-B")),
    );

    let events_a = collect_run(&mut rx_a, Duration::from_secs(10)).await;
    let events_b = collect_run(&mut rx_b, Duration::from_secs(10)).await;

    assert!(combined_output(&events_a).contains("ONLY-A"));
    assert!(!combined_output(&events_a).contains("ONLY-B"));
    assert!(combined_output(&events_b).contains("ONLY-B"));
    assert!(!combined_output(&events_b).contains("ONLY-A"));

    assert_eq!(
        events_a.last(),
        Some(&Outbound::complete(ExitReason::Exited(0)))
    );
    assert_eq!(
        events_b.last(),
        Some(&Outbound::complete(ExitReason::Exited(0)))
    );
}

#[tokio::test]
async fn close_session_tears_down_a_running_execution() {
    let engine = test_engine();
    let session = SessionId::new("super-close");
    let mut rx = engine.open_session(session.clone());

    engine.handle_message(&session, execute("sleep 30")).await;
    let _ = collect_until(&mut rx, Duration::from_secs(5), |event| {
        matches!(event, Outbound::ExecutionStarted(_))
    })
    .await;

    engine.close_session(&session).await;
    assert_eq!(engine.session_count(), 0);

    // The lifecycle still winds down: the channel delivers the stop
    // completion and then closes.
    let events = collect_run(&mut rx, Duration::from_secs(5)).await;
    assert_eq!(
        events.last(),
        Some(&Outbound::complete(ExitReason::Stopped))
    );
}
