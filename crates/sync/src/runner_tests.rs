// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use super::*;
use crate::config::ClientConfig;
use crate::events::{EventSink, SyncEvent};
use crate::persistence::{MemorySnapshotStore, PersistenceGateway, SnapshotStore};
use crate::transport::tests::{MockRemote, MockTransport};
use mesa_core::{EntityKind, MessageType, Payload};
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

const URL: &str = "ws://mesa.test/session";

fn payload(value: serde_json::Value) -> Payload {
    mesa_core::entity::payload_from_value(value).unwrap()
}

struct Session {
    handle: RunnerHandle,
    remote: MockRemote,
    events: UnboundedReceiver<SyncEvent>,
    snapshots: MemorySnapshotStore,
    task: JoinHandle<StateSynchronizer>,
}

fn start() -> Session {
    let (transport, remote) = MockTransport::pair();
    let (sink, events) = EventSink::channel();
    let snapshots = MemorySnapshotStore::new();
    let engine = StateSynchronizer::new(
        &ClientConfig::default(),
        SystemClock,
        PersistenceGateway::new(snapshots.clone()),
        sink,
    );
    let (runner, handle) = Runner::new(engine, transport);
    let task = tokio::spawn(runner.run());
    Session {
        handle,
        remote,
        events,
        snapshots,
        task,
    }
}

/// Waits for the first event matching `pred`.
async fn expect_event(
    events: &mut UnboundedReceiver<SyncEvent>,
    pred: impl Fn(&SyncEvent) -> bool,
) -> SyncEvent {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = events.recv().await.unwrap();
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .unwrap()
}

/// Waits until the client has sent a message of `kind`.
async fn expect_sent(remote: &MockRemote, kind: &str) -> Envelope {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Some(envelope) = remote.sent_of_type(kind).pop() {
                return envelope;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap()
}

async fn join(session: &mut Session) {
    session.handle.connect(URL).await.unwrap();
    expect_sent(&session.remote, "create_session").await;
    session.remote.push(
        Envelope::new(MessageType::SessionJoined, 0)
            .with_payload(payload(json!({"sessionId": "s-1"}))),
    );
    expect_event(&mut session.events, |e| {
        matches!(
            e,
            SyncEvent::ConnectionChanged {
                state: ConnectionState::Connected,
                ..
            }
        )
    })
    .await;
}

#[tokio::test]
async fn handshake_mutation_and_ack() {
    let mut session = start();
    join(&mut session).await;

    let status = session
        .handle
        .mutate(
            "thorin",
            Change::Create {
                kind: EntityKind::Character,
                payload: payload(json!({"name": "Thorin", "hp": 45})),
            },
        )
        .await
        .unwrap();
    assert_eq!(status, SyncStatus::Syncing);

    let sent = expect_sent(&session.remote, "character_update").await;
    let operation_id = sent.payload["operationId"].as_str().unwrap().to_string();
    session
        .remote
        .push(Envelope::ack("thorin", &operation_id, 1, 0));
    expect_event(&mut session.events, |e| {
        *e == SyncEvent::EntityStatus {
            entity_id: "thorin".into(),
            status: SyncStatus::Synced,
        }
    })
    .await;

    session.handle.shutdown();
    let engine = session.task.await.unwrap();
    assert_eq!(engine.connection_state(), ConnectionState::Disconnected);
    assert_eq!(engine.entity("thorin").unwrap().version, 1);

    let snapshot = session.snapshots.load().unwrap().unwrap();
    assert_eq!(snapshot.session_id.as_deref(), Some("s-1"));
    assert!(snapshot.entity("thorin").is_some());
}

#[tokio::test]
async fn refused_connection_reports_failure() {
    let mut session = start();
    session.remote.fail_connects(true);
    session.handle.connect(URL).await.unwrap();

    expect_event(&mut session.events, |e| {
        *e == SyncEvent::Error("Connection failed: refused".into())
    })
    .await;
    expect_event(&mut session.events, |e| {
        matches!(
            e,
            SyncEvent::ConnectionChanged {
                state: ConnectionState::Errored,
                error: Some(msg),
            } if msg == "Connection failed: refused"
        )
    })
    .await;
    assert_eq!(
        session.handle.connection_state().await.unwrap(),
        ConnectionState::Errored
    );
    session.handle.shutdown();
    session.task.await.unwrap();
}

#[tokio::test]
async fn bad_frames_do_not_drop_the_link() {
    let mut session = start();
    join(&mut session).await;

    session.remote.push(Envelope {
        message_type: "dice_roll".into(),
        payload: Payload::new(),
        timestamp: 0,
        entity_id: None,
        version: None,
    });
    session.remote.push(
        Envelope::new(MessageType::CharacterUpdate, 5)
            .with_payload(payload(json!({"characterId": "goblin", "hp": 7})))
            .with_version(1),
    );
    expect_event(&mut session.events, |e| {
        matches!(e, SyncEvent::EntityStatus { entity_id, .. } if entity_id == "goblin")
    })
    .await;

    assert_eq!(
        session.handle.connection_state().await.unwrap(),
        ConnectionState::Connected
    );
    let goblin = session.handle.entity("goblin").await.unwrap().unwrap();
    assert_eq!(goblin.field("hp"), Some(&json!(7)));

    session.handle.shutdown();
    session.task.await.unwrap();
}

#[tokio::test]
async fn errors_come_back_through_the_handle() {
    let mut session = start();
    join(&mut session).await;

    let err = session.handle.discard("nobody").await.unwrap_err();
    assert!(matches!(err, SyncError::Core(_)));
    let err = session.handle.continue_offline().await.unwrap_err();
    assert!(matches!(err, SyncError::NotOffline(ConnectionState::Connected)));

    session.handle.shutdown();
    session.task.await.unwrap();
}

#[tokio::test]
async fn handle_reports_stopped_runner() {
    let session = start();
    session.handle.shutdown();
    session.task.await.unwrap();

    let err = session
        .handle
        .mutate("thorin", Change::Delete)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::RunnerStopped));
    assert!(session.handle.set_turn(TurnState::new(1, 1)).is_err());
}

#[tokio::test]
async fn explicit_disconnect_closes_transport() {
    let mut session = start();
    join(&mut session).await;

    session.handle.set_turn(TurnState::new(3, 1)).unwrap();
    session.handle.disconnect().await.unwrap();
    expect_event(&mut session.events, |e| {
        matches!(e, SyncEvent::SnapshotSaved { turn: Some(t), .. } if t.round == 3)
    })
    .await;
    assert_eq!(
        session.handle.connection_state().await.unwrap(),
        ConnectionState::Disconnected
    );

    session.handle.shutdown();
    session.task.await.unwrap();
}
