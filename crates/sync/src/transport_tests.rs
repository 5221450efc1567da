// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Channel-backed transport for tests.
pub struct MockTransport {
    connected: bool,
    incoming: mpsc::UnboundedReceiver<Envelope>,
    sent: Arc<Mutex<Vec<Envelope>>>,
    fail_connect: Arc<AtomicBool>,
}

/// The server side of a [`MockTransport`].
#[derive(Clone)]
pub struct MockRemote {
    tx: mpsc::UnboundedSender<Envelope>,
    sent: Arc<Mutex<Vec<Envelope>>>,
    fail_connect: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn pair() -> (MockTransport, MockRemote) {
        let (tx, incoming) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let fail_connect = Arc::new(AtomicBool::new(false));
        (
            MockTransport {
                connected: false,
                incoming,
                sent: Arc::clone(&sent),
                fail_connect: Arc::clone(&fail_connect),
            },
            MockRemote {
                tx,
                sent,
                fail_connect,
            },
        )
    }
}

impl MockRemote {
    /// Delivers an envelope to the client.
    pub fn push(&self, envelope: Envelope) {
        self.tx.send(envelope).unwrap();
    }

    /// Everything the client has sent so far.
    pub fn sent(&self) -> Vec<Envelope> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_of_type(&self, kind: &str) -> Vec<Envelope> {
        self.sent()
            .into_iter()
            .filter(|e| e.message_type == kind)
            .collect()
    }

    pub fn fail_connects(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }
}

impl Transport for MockTransport {
    fn connect(&mut self, _url: &str) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async move {
            if self.fail_connect.load(Ordering::SeqCst) {
                return Err(TransportError::ConnectionFailed("refused".into()));
            }
            self.connected = true;
            Ok(())
        })
    }

    fn disconnect(&mut self) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async move {
            self.connected = false;
            Ok(())
        })
    }

    fn send(&mut self, envelope: Envelope) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async move {
            if !self.connected {
                return Err(TransportError::ConnectionClosed);
            }
            self.sent.lock().unwrap().push(envelope);
            Ok(())
        })
    }

    fn recv(&mut self) -> BoxFuture<'_, TransportResult<Option<Envelope>>> {
        Box::pin(async move {
            let next = self.incoming.recv().await;
            if next.is_none() {
                self.connected = false;
            }
            Ok(next)
        })
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[tokio::test]
async fn mock_transport_connect_and_disconnect() {
    let (mut transport, _remote) = MockTransport::pair();
    assert!(!transport.is_connected());

    transport.connect("ws://localhost:7890").await.unwrap();
    assert!(transport.is_connected());

    transport.disconnect().await.unwrap();
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn mock_transport_send_and_recv() {
    let (mut transport, remote) = MockTransport::pair();
    transport.connect("ws://localhost:7890").await.unwrap();

    transport.send(Envelope::heartbeat(1)).await.unwrap();
    assert_eq!(remote.sent_of_type("heartbeat").len(), 1);

    remote.push(Envelope::heartbeat(2));
    let received = transport.recv().await.unwrap().unwrap();
    assert_eq!(received.timestamp, 2);
}

#[tokio::test]
async fn mock_transport_reports_close_when_remote_drops() {
    let (mut transport, remote) = MockTransport::pair();
    transport.connect("ws://localhost:7890").await.unwrap();
    drop(remote);

    assert!(transport.recv().await.unwrap().is_none());
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn mock_transport_connect_failure() {
    let (mut transport, remote) = MockTransport::pair();
    remote.fail_connects(true);

    let err = transport.connect("ws://localhost:7890").await.unwrap_err();
    assert_eq!(err.to_string(), "refused");
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn websocket_send_without_connection_fails() {
    let mut transport = WebSocketTransport::new();
    assert!(!transport.is_connected());
    assert!(matches!(
        transport.send(Envelope::heartbeat(0)).await.unwrap_err(),
        TransportError::ConnectionClosed
    ));
}

#[tokio::test]
async fn websocket_connect_refused_is_reported() {
    // Bind then drop a listener so the port is known to be closed.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut transport = WebSocketTransport::new();
    let err = transport
        .connect(&format!("ws://{addr}"))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::ConnectionFailed(_)));
}

#[test]
fn malformed_frames_are_not_fatal() {
    assert!(!TransportError::Malformed("x".into()).is_fatal());
    assert!(TransportError::ConnectionClosed.is_fatal());
}
