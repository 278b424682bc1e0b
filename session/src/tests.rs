//! Integration tests for the session core, driven through a channel-backed
//! fake transport with paused tokio time.

use super::*;
use crate::transport::{Dial, Transport, TransportEvent};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

struct FakeTransport {
    subscriptions: Mutex<Vec<String>>,
    published: Mutex<Vec<(String, Vec<u8>)>>,
    fail_subscribe: Vec<String>,
    live: AtomicBool,
    ended: AtomicBool,
}

impl FakeTransport {
    fn new(fail_subscribe: Vec<String>) -> Self {
        Self {
            subscriptions: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            fail_subscribe,
            live: AtomicBool::new(true),
            ended: AtomicBool::new(false),
        }
    }

    fn publish_count(&self, topic: &str) -> usize {
        self.published
            .lock()
            .iter()
            .filter(|(t, _)| t == topic)
            .count()
    }

    fn subscribed_topics(&self) -> Vec<String> {
        self.subscriptions.lock().clone()
    }

    fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        self.published
            .lock()
            .push((topic.to_string(), payload.to_vec()));
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<()> {
        if self.fail_subscribe.iter().any(|t| t == topic) {
            return Err(Error::Subscribe {
                topic: topic.to_string(),
                reason: "refused by test".to_string(),
            });
        }
        self.subscriptions.lock().push(topic.to_string());
        Ok(())
    }

    async fn end(&self) -> Result<()> {
        self.ended.store(true, Ordering::SeqCst);
        self.live.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
struct FakeConn {
    transport: Arc<FakeTransport>,
    events: mpsc::Sender<TransportEvent>,
}

impl FakeConn {
    async fn emit(&self, event: TransportEvent) {
        self.events.send(event).await.expect("event loop alive");
    }

    async fn message(&self, topic: &str, payload: &str) {
        self.emit(TransportEvent::Message {
            topic: topic.to_string(),
            payload: Bytes::copy_from_slice(payload.as_bytes()),
        })
        .await;
    }
}

#[derive(Default)]
struct FakeDialer {
    conns: Mutex<Vec<FakeConn>>,
    fail_subscribe: Mutex<Vec<String>>,
    fail_dial: Mutex<Option<String>>,
}

impl FakeDialer {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn last(&self) -> FakeConn {
        self.conns.lock().last().expect("a dial happened").clone()
    }

    fn dial_count(&self) -> usize {
        self.conns.lock().len()
    }
}

#[async_trait]
impl Dial for FakeDialer {
    async fn dial(
        &self,
        _opts: &ConnectOptions,
        _cfg: &SessionConfig,
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>)> {
        if let Some(reason) = self.fail_dial.lock().clone() {
            return Err(Error::Connect(reason));
        }
        let transport = Arc::new(FakeTransport::new(self.fail_subscribe.lock().clone()));
        let (events_tx, events_rx) = mpsc::channel(32);
        self.conns.lock().push(FakeConn {
            transport: transport.clone(),
            events: events_tx,
        });
        Ok((transport, events_rx))
    }
}

fn new_session(dialer: Arc<FakeDialer>) -> (Session, mpsc::Receiver<Notice>) {
    let session = Session::new(SessionConfig::default(), dialer);
    let notices = session.take_notices().expect("first taker");
    (session, notices)
}

/// Lets spawned session tasks run to completion under the paused clock.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

fn drain(notices: &mut mpsc::Receiver<Notice>) -> Vec<Notice> {
    let mut out = Vec::new();
    while let Ok(notice) = notices.try_recv() {
        out.push(notice);
    }
    out
}

async fn connect_and_ack(session: &Session, dialer: &FakeDialer) -> FakeConn {
    session
        .connect(ConnectOptions::new("mqtt://broker.local:1883"))
        .await
        .expect("dial succeeds");
    let conn = dialer.last();
    conn.emit(TransportEvent::Connected).await;
    settle().await;
    conn
}

#[tokio::test(start_paused = true)]
async fn test_connected_side_effects() {
    let dialer = FakeDialer::new();
    let (session, mut notices) = new_session(dialer.clone());

    session
        .connect(ConnectOptions::new("mqtt://broker.local:1883"))
        .await
        .unwrap();
    assert_eq!(session.status(), ConnectionStatus::Connecting);

    let conn = dialer.last();
    conn.emit(TransportEvent::Connected).await;
    settle().await;

    assert_eq!(session.status(), ConnectionStatus::Connected);

    // One subscribe per response topic, in order
    let expected: Vec<String> = session
        .topics()
        .response_topics()
        .iter()
        .map(|t| t.to_string())
        .collect();
    assert_eq!(conn.transport.subscribed_topics(), expected);

    // Initial burst: 4 metadata requests plus the immediate telemetry poll
    for topic in [
        "/CPU/Request",
        "/TFT/NAME/Request",
        "/ERR/Request",
        "/EPD1/Request",
        "/TFT/Request",
    ] {
        assert_eq!(conn.transport.publish_count(topic), 1, "{topic}");
    }

    let messages: Vec<String> = drain(&mut notices).into_iter().map(|n| n.message).collect();
    assert!(messages.iter().any(|m| m.contains("Connected to")));

    // The timer is armed for the poll interval, not firing early
    tokio::time::sleep(Duration::from_secs(59)).await;
    assert_eq!(conn.transport.publish_count("/TFT/Request"), 1);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(conn.transport.publish_count("/TFT/Request"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_polling_repeats_every_interval() {
    let dialer = FakeDialer::new();
    let (session, _notices) = new_session(dialer.clone());
    let conn = connect_and_ack(&session, &dialer).await;

    tokio::time::sleep(Duration::from_secs(181)).await;
    // Immediate poll plus ticks at 60, 120, 180 seconds
    assert_eq!(conn.transport.publish_count("/TFT/Request"), 4);
}

#[tokio::test(start_paused = true)]
async fn test_history_capped_at_200_most_recent() {
    let dialer = FakeDialer::new();
    let (session, _notices) = new_session(dialer.clone());
    let conn = connect_and_ack(&session, &dialer).await;

    for i in 0..210 {
        conn.message(
            "/TFT/Response",
            &format!(r#"{{"device_serial":"A1","tftvalue":{{"S1_L1":"{i}"}}}}"#),
        )
        .await;
    }
    settle().await;

    let history = session.history("A1");
    assert_eq!(history.len(), 200);
    // Exactly the 200 most recent points, in arrival order
    assert_eq!(history[0].values["S1_L1"], 10.0);
    assert_eq!(history[199].values["S1_L1"], 209.0);
}

#[tokio::test(start_paused = true)]
async fn test_telemetry_coercion_drops_bad_entries() {
    let dialer = FakeDialer::new();
    let (session, _notices) = new_session(dialer.clone());
    let conn = connect_and_ack(&session, &dialer).await;

    conn.message(
        "/TFT/Response",
        r#"{"device_serial":"A1","tftvalue":{"S1_L1":"12.5","bad":"x"}}"#,
    )
    .await;
    settle().await;

    let point = session.latest_point("A1").expect("one point appended");
    assert_eq!(point.values.len(), 1);
    assert_eq!(point.values["S1_L1"], 12.5);
    assert!(!point.timestamp.is_zero());
}

#[tokio::test(start_paused = true)]
async fn test_malformed_payloads_leave_state_unchanged() {
    let dialer = FakeDialer::new();
    let (session, _notices) = new_session(dialer.clone());
    let conn = connect_and_ack(&session, &dialer).await;

    let topics: Vec<String> = session
        .topics()
        .response_topics()
        .iter()
        .map(|t| t.to_string())
        .collect();
    for topic in &topics {
        conn.message(topic, "{definitely not json").await;
        conn.message(topic, r#"{"missing":"serial"}"#).await;
    }
    settle().await;

    assert!(session.device_serials().is_empty());
    assert_eq!(session.status(), ConnectionStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_status_flags_decoded() {
    let dialer = FakeDialer::new();
    let (session, _notices) = new_session(dialer.clone());
    let conn = connect_and_ack(&session, &dialer).await;

    conn.message(
        "/ERR/Response",
        r#"{"device_serial":"A1","errorFlags":"1","warningFlags":"0"}"#,
    )
    .await;
    settle().await;

    let status = session.device_status("A1").expect("status stored");
    assert_eq!(status.error_flags, 1);
    assert_eq!(status.warning_flags, 0);
    assert!(!status.last_update.is_zero());
    assert_eq!(status.errors(), vec!["CAN_ERROR_INIT_FAILED"]);
}

#[tokio::test(start_paused = true)]
async fn test_min_value_key_casings_decode_identically() {
    let dialer = FakeDialer::new();
    let (session, _notices) = new_session(dialer.clone());
    let conn = connect_and_ack(&session, &dialer).await;

    conn.message(
        "/MIN/Response",
        r#"{"device_serial":"A1","minValue":{"S1_L1":"1.5"}}"#,
    )
    .await;
    conn.message(
        "/MIN/Response",
        r#"{"device_serial":"B2","minvalue":{"S1_L1":"1.5"}}"#,
    )
    .await;
    settle().await;

    assert_eq!(session.min_values("A1"), session.min_values("B2"));
    assert_eq!(session.min_values("A1").unwrap()["S1_L1"], 1.5);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_then_connect_never_doubles_the_timer() {
    let dialer = FakeDialer::new();
    let (session, _notices) = new_session(dialer.clone());
    let first = connect_and_ack(&session, &dialer).await;

    tokio::time::sleep(Duration::from_secs(61)).await;
    let first_count = first.transport.publish_count("/TFT/Request");
    assert_eq!(first_count, 2);

    session.disconnect().await;
    assert!(first.transport.is_ended());

    let second = connect_and_ack(&session, &dialer).await;
    assert_eq!(dialer.dial_count(), 2);
    assert_eq!(session.status(), ConnectionStatus::Connected);

    tokio::time::sleep(Duration::from_secs(121)).await;

    // The old session's transport saw nothing after the disconnect
    assert_eq!(first.transport.publish_count("/TFT/Request"), first_count);
    // Exactly one timer drives the new transport: immediate poll plus
    // ticks at 60 and 120 seconds
    assert_eq!(second.transport.publish_count("/TFT/Request"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_offline_is_soft_and_pauses_polling() {
    let dialer = FakeDialer::new();
    let (session, mut notices) = new_session(dialer.clone());
    let conn = connect_and_ack(&session, &dialer).await;
    drain(&mut notices);

    conn.emit(TransportEvent::Offline).await;
    settle().await;

    assert_eq!(session.status(), ConnectionStatus::Disconnected);
    let count = conn.transport.publish_count("/TFT/Request");
    tokio::time::sleep(Duration::from_secs(181)).await;
    assert_eq!(conn.transport.publish_count("/TFT/Request"), count);

    let messages: Vec<String> = drain(&mut notices).into_iter().map(|n| n.message).collect();
    assert!(messages.iter().any(|m| m.contains("offline")));
}

#[tokio::test(start_paused = true)]
async fn test_error_event_stops_polling_and_sets_error() {
    let dialer = FakeDialer::new();
    let (session, mut notices) = new_session(dialer.clone());
    let conn = connect_and_ack(&session, &dialer).await;
    drain(&mut notices);

    conn.emit(TransportEvent::Error("connection reset by peer".to_string()))
        .await;
    settle().await;

    assert_eq!(session.status(), ConnectionStatus::Error);
    let count = conn.transport.publish_count("/TFT/Request");
    tokio::time::sleep(Duration::from_secs(121)).await;
    assert_eq!(conn.transport.publish_count("/TFT/Request"), count);

    let notices = drain(&mut notices);
    assert!(notices.iter().any(|n| n.severity == Severity::Error
        && n.message.contains("connection reset by peer")));
}

#[tokio::test(start_paused = true)]
async fn test_auth_error_gets_dedicated_message() {
    let dialer = FakeDialer::new();
    let (session, mut notices) = new_session(dialer.clone());
    let conn = connect_and_ack(&session, &dialer).await;
    drain(&mut notices);

    conn.emit(TransportEvent::Error(
        "connection refused: not authorized".to_string(),
    ))
    .await;
    settle().await;

    assert_eq!(session.status(), ConnectionStatus::Error);
    let messages: Vec<String> = drain(&mut notices).into_iter().map(|n| n.message).collect();
    assert!(messages.iter().any(|m| m.contains("Authorization failed")));
}

#[tokio::test(start_paused = true)]
async fn test_telemetry_subscribe_failure_is_fatal() {
    let dialer = FakeDialer::new();
    dialer.fail_subscribe.lock().push("/TFT/Response".to_string());
    let (session, mut notices) = new_session(dialer.clone());
    let conn = connect_and_ack(&session, &dialer).await;

    assert_eq!(session.status(), ConnectionStatus::Error);
    assert!(conn.transport.is_ended());
    let messages: Vec<String> = drain(&mut notices).into_iter().map(|n| n.message).collect();
    assert!(messages.iter().any(|m| m.contains("Failed to subscribe")));
}

#[tokio::test(start_paused = true)]
async fn test_secondary_subscribe_failure_is_reported_not_fatal() {
    let dialer = FakeDialer::new();
    dialer.fail_subscribe.lock().push("/MAX/Response".to_string());
    let (session, mut notices) = new_session(dialer.clone());
    let conn = connect_and_ack(&session, &dialer).await;

    assert_eq!(session.status(), ConnectionStatus::Connected);
    assert!(!conn.transport.is_ended());
    // The session still polls
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(conn.transport.publish_count("/TFT/Request"), 2);

    let messages: Vec<String> = drain(&mut notices).into_iter().map(|n| n.message).collect();
    assert!(
        messages
            .iter()
            .any(|m| m.contains("Failed to subscribe to /MAX/Response"))
    );
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_requires_connection() {
    let dialer = FakeDialer::new();
    let (session, mut notices) = new_session(dialer.clone());

    session.request_all_device_info().await;
    session.send_flag_reset().await;

    assert_eq!(dialer.dial_count(), 0);
    let notices = drain(&mut notices);
    assert_eq!(notices.len(), 2);
    assert!(
        notices
            .iter()
            .all(|n| n.severity == Severity::Warning && n.message.contains("Not connected"))
    );
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_publishes_when_connected() {
    let dialer = FakeDialer::new();
    let (session, mut notices) = new_session(dialer.clone());
    let conn = connect_and_ack(&session, &dialer).await;
    drain(&mut notices);

    session.request_device_max_values("A1").await;
    assert_eq!(conn.transport.publish_count("/MAX/Request"), 1);
    let (_, payload) = conn
        .transport
        .published
        .lock()
        .iter()
        .find(|(t, _)| t == "/MAX/Request")
        .cloned()
        .expect("max request published");
    let body: serde_json::Value = serde_json::from_slice(&payload).unwrap();
    assert_eq!(body["device_serial"], "A1");
    assert_eq!(body["get_max_values"], true);
    // Targeted reads have no success notice
    assert!(drain(&mut notices).is_empty());

    session.request_all_sensor_names().await;
    assert_eq!(conn.transport.publish_count("/TFT/NAME/Request"), 2);
    let acks = drain(&mut notices);
    assert_eq!(acks.len(), 1);
    assert!(acks[0].message.contains("sensor names"));
}

#[tokio::test(start_paused = true)]
async fn test_connect_while_connected_reconnects_fresh() {
    let dialer = FakeDialer::new();
    let (session, mut notices) = new_session(dialer.clone());
    let first = connect_and_ack(&session, &dialer).await;

    first
        .message(
            "/TFT/Response",
            r#"{"device_serial":"A1","tftvalue":{"S1_L1":"1"}}"#,
        )
        .await;
    settle().await;
    assert_eq!(session.device_serials(), vec!["A1"]);
    drain(&mut notices);

    // Second connect tears the first session down quietly
    connect_and_ack(&session, &dialer).await;
    assert_eq!(dialer.dial_count(), 2);
    assert!(first.transport.is_ended());
    assert!(session.device_serials().is_empty());
    assert_eq!(session.status(), ConnectionStatus::Connected);

    let messages: Vec<String> = drain(&mut notices).into_iter().map(|n| n.message).collect();
    assert!(!messages.iter().any(|m| m.contains("Disconnected by user")));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_resets_state_and_notifies() {
    let dialer = FakeDialer::new();
    let (session, mut notices) = new_session(dialer.clone());
    let conn = connect_and_ack(&session, &dialer).await;

    conn.message(
        "/CPU/Response",
        r#"{"device_serial":"A1","device_fw_version":"1.0"}"#,
    )
    .await;
    settle().await;
    assert!(session.device_info("A1").is_some());
    drain(&mut notices);

    session.disconnect().await;

    assert_eq!(session.status(), ConnectionStatus::Disconnected);
    assert!(session.device_serials().is_empty());
    assert!(conn.transport.is_ended());
    let messages: Vec<String> = drain(&mut notices).into_iter().map(|n| n.message).collect();
    assert!(messages.iter().any(|m| m.contains("Disconnected by user")));
}

#[tokio::test(start_paused = true)]
async fn test_dial_failure_sets_error_status() {
    let dialer = FakeDialer::new();
    *dialer.fail_dial.lock() = Some("broker exploded".to_string());
    let (session, mut notices) = new_session(dialer.clone());

    let result = session
        .connect(ConnectOptions::new("mqtt://broker.local:1883"))
        .await;
    assert!(result.is_err());
    assert_eq!(session.status(), ConnectionStatus::Error);

    let notices = drain(&mut notices);
    assert!(notices.iter().any(|n| n.severity == Severity::Error
        && n.message.contains("Connection failed")));
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_event_moves_to_connecting() {
    let dialer = FakeDialer::new();
    let (session, _notices) = new_session(dialer.clone());
    let conn = connect_and_ack(&session, &dialer).await;

    conn.emit(TransportEvent::Closed).await;
    settle().await;
    assert_eq!(session.status(), ConnectionStatus::Disconnected);

    conn.emit(TransportEvent::Reconnecting).await;
    settle().await;
    assert_eq!(session.status(), ConnectionStatus::Connecting);

    // The broker comes back; the session re-subscribes and polls again
    conn.emit(TransportEvent::Connected).await;
    settle().await;
    assert_eq!(session.status(), ConnectionStatus::Connected);
    assert_eq!(conn.transport.publish_count("/TFT/Request"), 2);
}
