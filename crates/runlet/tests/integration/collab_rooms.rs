use std::time::Duration;

use runlet::{Inbound, Outbound, SessionId};
use serde_json::json;

use super::{collect_until, test_engine};

fn create_room(room: &str, code: &str, host: &str) -> Inbound {
    Inbound::CreateCollabSession {
        session_id: room.to_owned(),
        code: code.to_owned(),
        language: "shell".to_owned(),
        host_id: host.to_owned(),
    }
}

fn join_room(room: &str, name: Option<&str>) -> Inbound {
    Inbound::JoinCollabSession {
        session_id: room.to_owned(),
        display_name: name.map(str::to_owned),
    }
}

#[tokio::test]
async fn room_lifecycle_create_join_sync_chat() {
    let engine = test_engine();
    let host = SessionId::new("collab-host");
    let guest = SessionId::new("collab-guest");
    let mut host_rx = engine.open_session(host.clone());
    let mut guest_rx = engine.open_session(guest.clone());

    engine
        .handle_message(&host, create_room("room-1", "echo shared", "alice"))
        .await;
    let created = collect_until(&mut host_rx, Duration::from_secs(5), |event| {
        matches!(event, Outbound::CollabSessionCreated(_))
    })
    .await;
    assert_eq!(
        created.last(),
        Some(&Outbound::CollabSessionCreated("room-1".to_owned()))
    );

    engine
        .handle_message(&guest, join_room("room-1", Some("Bob")))
        .await;

    let initial = collect_until(&mut guest_rx, Duration::from_secs(5), |event| {
        matches!(event, Outbound::InitialCodeSync(_))
    })
    .await;
    match initial.last() {
        Some(Outbound::InitialCodeSync(state)) => {
            assert_eq!(state["code"], "echo shared");
            assert_eq!(state["language"], "shell");
            assert_eq!(state["hostId"], "alice");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let update = collect_until(&mut host_rx, Duration::from_secs(5), |event| {
        matches!(event, Outbound::CollabUpdate(_))
    })
    .await;
    assert_eq!(
        update.last(),
        Some(&Outbound::CollabUpdate("Bob has joined the session.".to_owned()))
    );

    // Code sync from the host reaches the guest only.
    engine
        .handle_message(
            &host,
            Inbound::SyncCode {
                code: "echo updated".to_owned(),
                language: "shell".to_owned(),
            },
        )
        .await;
    let synced = collect_until(&mut guest_rx, Duration::from_secs(5), |event| {
        matches!(event, Outbound::CodeSync(_))
    })
    .await;
    match synced.last() {
        Some(Outbound::CodeSync(payload)) => assert_eq!(payload["code"], "echo updated"),
        other => panic!("unexpected event: {other:?}"),
    }

    // Chat reaches everyone, including the sender.
    let chat = json!({"from": "Bob", "text": "hello"});
    engine
        .handle_message(&guest, Inbound::ChatMessage { data: chat.clone() })
        .await;
    let host_chat = collect_until(&mut host_rx, Duration::from_secs(5), |event| {
        matches!(event, Outbound::ChatMessage(_))
    })
    .await;
    assert_eq!(host_chat.last(), Some(&Outbound::ChatMessage(chat.clone())));
    let guest_chat = collect_until(&mut guest_rx, Duration::from_secs(5), |event| {
        matches!(event, Outbound::ChatMessage(_))
    })
    .await;
    assert_eq!(guest_chat.last(), Some(&Outbound::ChatMessage(chat)));
}

#[tokio::test]
async fn joining_a_missing_room_fails() {
    let engine = test_engine();
    let session = SessionId::new("collab-lost");
    let mut rx = engine.open_session(session.clone());

    engine
        .handle_message(&session, join_room("no-such-room", None))
        .await;
    let events = collect_until(&mut rx, Duration::from_secs(5), |event| {
        matches!(event, Outbound::Error(_))
    })
    .await;
    match events.last() {
        Some(Outbound::Error(message)) => {
            assert!(message.contains("not found or expired"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn disconnect_notifies_the_room_and_purges_when_empty() {
    let engine = test_engine();
    let host = SessionId::new("collab-bye-host");
    let guest = SessionId::new("collab-bye-guest");
    let mut host_rx = engine.open_session(host.clone());
    let mut guest_rx = engine.open_session(guest.clone());

    engine
        .handle_message(&host, create_room("room-2", "x", "alice"))
        .await;
    engine.handle_message(&guest, join_room("room-2", None)).await;
    let _ = collect_until(&mut guest_rx, Duration::from_secs(5), |event| {
        matches!(event, Outbound::InitialCodeSync(_))
    })
    .await;

    engine.close_session(&host).await;
    let farewell = collect_until(&mut guest_rx, Duration::from_secs(5), |event| {
        matches!(event, Outbound::CollabUpdate(msg) if msg.contains("left"))
    })
    .await;
    assert_eq!(
        farewell.last(),
        Some(&Outbound::CollabUpdate("A user has left the session.".to_owned()))
    );
    drop(host_rx);

    // Last member out: the room is purged, so the id no longer joins.
    engine.close_session(&guest).await;
    let late = SessionId::new("collab-bye-late");
    let mut late_rx = engine.open_session(late.clone());
    engine.handle_message(&late, join_room("room-2", None)).await;
    let events = collect_until(&mut late_rx, Duration::from_secs(5), |event| {
        matches!(event, Outbound::Error(_))
    })
    .await;
    assert!(matches!(events.last(), Some(Outbound::Error(_))));
}
