//! TLS session integration tests: trust store gating, handshake
//! outcomes, and call behavior over an encrypted session.

mod support;

use std::time::Duration;

use support::{EchoServer, TestCa};
use tether_client::{
    CallOutcome, Client, ClientConfig, ClientError, ConnectionState, SessionEvent, TransportKind,
};
use tokio::{sync::mpsc, time::timeout};

const WAIT: Duration = Duration::from_secs(5);

fn tls_client() -> Client {
    Client::init(ClientConfig {
        transport: TransportKind::Tls,
        server_name: Some("localhost".to_string()),
        ..ClientConfig::default()
    })
    .unwrap()
}

/// Attach a handler that forwards every lifecycle event to a channel.
fn watch_events(client: &Client) -> mpsc::UnboundedReceiver<SessionEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    client.add_event_handler(move |event| {
        let _ = tx.send(event.clone());
    })
    .unwrap();
    rx
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    timeout(WAIT, rx.recv()).await.expect("event within timeout").expect("event channel open")
}

#[tokio::test]
async fn tls_session_with_trusted_ca() {
    let ca = TestCa::generate();
    let server = EchoServer::start_tls(&ca.server_identity(&["localhost"])).await;

    let client = tls_client();
    let mut events = watch_events(&client);

    client.set_ca_file(ca.path()).unwrap();
    client.connect(&server.host(), server.port()).unwrap();
    assert_eq!(next_event(&mut events).await, SessionEvent::Connected);
    assert_eq!(client.state(), ConnectionState::Connected);

    client.disconnect().unwrap();
    assert_eq!(next_event(&mut events).await, SessionEvent::Disconnect { reason: None });

    // Exactly one Connected and one Disconnect; nothing trailing.
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn request_and_notify_roundtrip_over_tls() {
    let ca = TestCa::generate();
    let server = EchoServer::start_tls(&ca.server_identity(&["localhost"])).await;

    let client = tls_client();
    let mut events = watch_events(&client);
    client.set_ca_file(ca.path()).unwrap();
    client.connect(&server.host(), server.port()).unwrap();
    assert_eq!(next_event(&mut events).await, SessionEvent::Connected);

    let (tx, rx) = tokio::sync::oneshot::channel();
    client
        .request("connector.echo", &b"hello"[..], Some(Duration::from_secs(2)), move |info, outcome| {
            assert_eq!(info.route, "connector.echo");
            assert_eq!(info.timeout, Duration::from_secs(2));
            let _ = tx.send(outcome);
        })
        .unwrap();
    let outcome = timeout(WAIT, rx).await.unwrap().unwrap();
    assert_eq!(outcome, CallOutcome::Ok(bytes::Bytes::from_static(b"hello")));

    let (tx, rx) = tokio::sync::oneshot::channel();
    client
        .notify("chat.send", &b"hi"[..], None, move |info, outcome| {
            assert_eq!(info.route, "chat.send");
            assert_eq!(info.payload, bytes::Bytes::from_static(b"hi"));
            assert_eq!(info.timeout, Duration::from_secs(10));
            let _ = tx.send(outcome);
        })
        .unwrap();
    let outcome = timeout(WAIT, rx).await.unwrap().unwrap();
    assert!(outcome.is_ok());
}

#[tokio::test]
async fn handshake_fails_without_trust_anchors() {
    let ca = TestCa::generate();
    let server = EchoServer::start_tls(&ca.server_identity(&["localhost"])).await;

    // No set_ca_file: the client trusts nothing.
    let client = tls_client();
    let mut events = watch_events(&client);
    client.connect(&server.host(), server.port()).unwrap();

    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::ConnectFailed { reason: "TLS Handshake Error".to_string() }
    );
    assert_eq!(client.state(), ConnectionState::Disconnected);

    // The failed attempt never established a session to disconnect.
    assert!(matches!(
        client.disconnect(),
        Err(ClientError::InvalidState { state: ConnectionState::Disconnected, .. })
    ));
}

#[tokio::test]
async fn handshake_fails_with_wrong_ca() {
    let server_ca = TestCa::generate();
    let other_ca = TestCa::generate();
    let server = EchoServer::start_tls(&server_ca.server_identity(&["localhost"])).await;

    let client = tls_client();
    let mut events = watch_events(&client);

    // Loading a valid-but-wrong CA succeeds; the handshake is where it fails.
    client.set_ca_file(other_ca.path()).unwrap();
    client.connect(&server.host(), server.port()).unwrap();

    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::ConnectFailed { reason: "TLS Handshake Error".to_string() }
    );
}

#[tokio::test]
async fn missing_ca_file_is_rejected_and_anchors_unchanged() {
    let ca = TestCa::generate();
    let server = EchoServer::start_tls(&ca.server_identity(&["localhost"])).await;

    let client = tls_client();
    let mut events = watch_events(&client);
    client.set_ca_file(ca.path()).unwrap();

    // The failed load leaves the working anchors in place.
    assert!(matches!(client.set_ca_file("/nonexistent/ca.pem"), Err(ClientError::Config(_))));

    client.connect(&server.host(), server.port()).unwrap();
    assert_eq!(next_event(&mut events).await, SessionEvent::Connected);
}

#[tokio::test]
async fn reconnect_after_handshake_failure() {
    let ca = TestCa::generate();
    let server = EchoServer::start_tls(&ca.server_identity(&["localhost"])).await;

    let client = tls_client();
    let mut events = watch_events(&client);

    client.connect(&server.host(), server.port()).unwrap();
    assert!(matches!(next_event(&mut events).await, SessionEvent::ConnectFailed { .. }));

    // Fixing the trust store makes the next attempt succeed.
    client.set_ca_file(ca.path()).unwrap();
    client.connect(&server.host(), server.port()).unwrap();
    assert_eq!(next_event(&mut events).await, SessionEvent::Connected);
}
