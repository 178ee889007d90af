//! Integration tests for connection management
//!
//! These tests drive the client through a recording transport and verify the
//! state transitions the delegate observes.

mod common;

use channels::{ConnectionState, TransportEvent, NORMAL_CLOSURE};
use common::{Harness, SOCKET_ID};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_connection_full_lifecycle() {
    verbose_println!("Testing full connection lifecycle...");

    let h = Harness::new();
    assert_eq!(h.client.connection_state(), ConnectionState::Disconnected);

    h.client.connect();
    assert_eq!(h.client.connection_state(), ConnectionState::Connecting);
    assert_eq!(h.transport.connect_count(), 1);
    verbose_println!("  State: Connecting");

    h.open();
    assert_eq!(h.client.connection_state(), ConnectionState::Connected);
    assert_eq!(h.client.socket_id().as_deref(), Some(SOCKET_ID));
    verbose_println!("  State: Connected ({})", SOCKET_ID);

    h.client.disconnect();
    assert_eq!(h.client.connection_state(), ConnectionState::Disconnecting);
    assert_eq!(*h.transport.disconnects.lock(), vec![NORMAL_CLOSURE]);

    h.close(Some(NORMAL_CLOSURE));
    assert_eq!(h.client.connection_state(), ConnectionState::Disconnected);
    assert_eq!(h.client.socket_id(), None);
    verbose_println!("  State: Disconnected (complete)");

    assert_eq!(
        *h.delegate.states.lock(),
        vec![
            (ConnectionState::Disconnected, ConnectionState::Connecting),
            (ConnectionState::Connecting, ConnectionState::Connected),
            (ConnectionState::Connected, ConnectionState::Disconnecting),
            (ConnectionState::Disconnecting, ConnectionState::Disconnected),
        ]
    );

    // Intentional disconnects never reconnect
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.transport.connect_count(), 1);
}

#[tokio::test]
async fn test_connected_needs_open_and_greeting() {
    let h = Harness::new();
    h.client.connect();

    h.client.handle_transport_event(TransportEvent::Opened);
    assert_eq!(h.client.connection_state(), ConnectionState::Connecting);

    h.server_sends(json!({
        "event": "pusher:connection_established",
        "data": json!({"socket_id": "9.9"}).to_string(),
    }));
    assert_eq!(h.client.connection_state(), ConnectionState::Connected);
    assert_eq!(h.client.socket_id().as_deref(), Some("9.9"));
}

#[tokio::test]
async fn test_connect_is_noop_when_connected_or_connecting() {
    let h = Harness::new();
    h.client.connect();
    h.client.connect();
    assert_eq!(h.transport.connect_count(), 1);

    h.open();
    h.client.connect();
    assert_eq!(h.transport.connect_count(), 1);
    assert_eq!(h.delegate.new_states().len(), 2);
}

#[tokio::test]
async fn test_disconnect_when_disconnected_is_noop() {
    let h = Harness::new();
    h.client.disconnect();
    assert!(h.transport.disconnects.lock().is_empty());
    assert!(h.delegate.states.lock().is_empty());
}

#[tokio::test]
async fn test_stray_close_is_ignored_when_disconnected() {
    let h = Harness::new();
    h.close(Some(1006));
    assert_eq!(h.client.connection_state(), ConnectionState::Disconnected);
    assert!(h.delegate.states.lock().is_empty());
}

#[tokio::test]
async fn test_server_ping_gets_pong() {
    let h = Harness::new();
    h.connect();

    h.server_sends(json!({"event": "pusher:ping", "data": {}}));

    let pongs = h.transport.sent_events("pusher:pong");
    assert_eq!(pongs.len(), 1);
    assert_eq!(pongs[0]["data"], json!({}));
}

#[tokio::test]
async fn test_protocol_error_reaches_delegate() {
    let h = Harness::new();
    h.connect();

    h.server_sends(json!({
        "event": "pusher:error",
        "data": {"code": 4301, "message": "Client event rejected"},
    }));

    let errors = h.delegate.errors.lock();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, Some(4301));
    assert_eq!(errors[0].message, "Client event rejected");
}

#[tokio::test]
async fn test_malformed_frames_are_ignored() {
    let h = Harness::new();
    h.connect();

    h.client
        .handle_transport_event(TransportEvent::Text("not json".to_string()));
    h.client
        .handle_transport_event(TransportEvent::Text("[1,2,3]".to_string()));
    h.server_sends(json!({"data": "no event name"}));

    assert_eq!(h.client.connection_state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_activity_timeout_sends_ping_and_pong_keeps_connection() {
    let h = Harness::with(|b| b.activity_timeout(Duration::from_secs(10)).pong_timeout(Duration::from_secs(5)));
    h.connect();

    tokio::time::sleep(Duration::from_secs(9)).await;
    assert_eq!(h.transport.ping_count(), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.transport.ping_count(), 1);
    verbose_println!("  Activity ping sent");

    h.client.handle_transport_event(TransportEvent::Pong);
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(h.transport.disconnects.lock().is_empty());
    assert_eq!(h.client.connection_state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_incoming_frames_reset_activity_timer() {
    let h = Harness::with(|b| b.activity_timeout(Duration::from_secs(10)));
    h.connect();

    for _ in 0..3 {
        tokio::time::sleep(Duration::from_secs(8)).await;
        h.server_sends(json!({"event": "pusher:pong", "data": {}}));
    }
    assert_eq!(h.transport.ping_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_pong_timeout_closes_connection() {
    let h = Harness::with(|b| b.activity_timeout(Duration::from_secs(10)).pong_timeout(Duration::from_secs(5)));
    h.connect();

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(h.transport.ping_count(), 1);

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(*h.transport.disconnects.lock(), vec![NORMAL_CLOSURE]);

    // The transport reports the close; the client goes through the closed path
    h.close(Some(NORMAL_CLOSURE));
    assert_eq!(h.client.connection_state(), ConnectionState::Reconnecting);
}

#[tokio::test]
async fn test_server_activity_timeout_is_used() {
    let h = Harness::new();
    h.client.connect();
    h.client.handle_transport_event(TransportEvent::Opened);
    h.server_sends(json!({
        "event": "pusher:connection_established",
        "data": json!({"socket_id": "1.2", "activity_timeout": 30}).to_string(),
    }));
    assert!(h.client.is_connected());
}

#[tokio::test]
async fn test_reachability_loss_drops_connection() {
    let h = Harness::new();
    h.connect();

    h.client.set_network_reachable(false);
    assert_eq!(*h.transport.disconnects.lock(), vec![NORMAL_CLOSURE]);

    h.close(Some(NORMAL_CLOSURE));
    assert_eq!(h.client.connection_state(), ConnectionState::Reconnecting);
}

#[tokio::test(start_paused = true)]
async fn test_reachability_regained_reconnects_immediately() {
    let h = Harness::new();
    h.connect();

    // First retry is immediate; make it wait by failing it once
    h.client.set_network_reachable(false);
    h.close(Some(NORMAL_CLOSURE));
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(h.transport.connect_count(), 2);
    h.close(None);
    assert_eq!(h.client.connection_state(), ConnectionState::Reconnecting);

    h.client.set_network_reachable(true);
    assert_eq!(h.client.connection_state(), ConnectionState::Connecting);
    assert_eq!(h.transport.connect_count(), 3);
}

#[tokio::test]
async fn test_reachability_ignored_when_monitoring_disabled() {
    let h = Harness::with(|b| b.monitor_reachability(false));
    h.connect();

    h.client.set_network_reachable(false);
    assert!(h.transport.disconnects.lock().is_empty());
    assert!(h.client.is_connected());
}

#[tokio::test]
async fn test_reconnect_suggested_drops_connection() {
    let h = Harness::new();
    h.connect();

    h.client
        .handle_transport_event(TransportEvent::ReconnectSuggested(false));
    assert!(h.transport.disconnects.lock().is_empty());

    h.client
        .handle_transport_event(TransportEvent::ReconnectSuggested(true));
    assert_eq!(*h.transport.disconnects.lock(), vec![NORMAL_CLOSURE]);
}

#[test]
fn test_build_requires_runtime() {
    let result = channels::builder().key("app-key").build();
    assert!(matches!(result, Err(channels::ChannelsError::NoRuntime(_))));
}

#[tokio::test]
async fn test_build_rejects_empty_key() {
    let result = channels::builder().key("  ").build();
    assert!(matches!(result, Err(channels::ChannelsError::Configuration(_))));
}
