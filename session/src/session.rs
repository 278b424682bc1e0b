//! Session controller.
//!
//! Owns the transport handle, the connection status, the polling timer, and
//! the per-device store. A single event-loop task consumes the transport's
//! event stream: messages go to the router, everything else through the
//! [`fsm`](crate::fsm) transition table. Each connect bumps a session epoch;
//! tasks from a previous connection check the epoch (and their cancellation
//! token) before touching anything, so a dangling timer or late transport
//! event can never reach the new session.

use crate::config::{ConnectOptions, SessionConfig};
use crate::error::{self, Result};
use crate::fsm::{self, ConnectionStatus, Effect};
use crate::request::Request;
use crate::router;
use crate::status::DeviceStatus;
use crate::store::{DataPoint, DeviceInfo, DeviceStore, EpdInfo, SensorNames};
use crate::topic::TopicSet;
use crate::transport::{Dial, Transport, TransportEvent};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Capacity of the user-facing notice channel.
const NOTICE_CHANNEL_CAPACITY: usize = 64;

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A user-facing notification (the UI renders these as toasts).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub severity: Severity,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }
}

/// Connection-scoped resources. Present between a successful dial and the
/// next disconnect.
#[derive(Default)]
struct ConnState {
    transport: Option<Arc<dyn Transport>>,
    /// Cancels the event loop and everything spawned under it.
    live: Option<CancellationToken>,
    /// Cancels the polling timer alone; child of `live`.
    poll: Option<CancellationToken>,
    broker_url: String,
}

struct Shared {
    cfg: SessionConfig,
    topics: TopicSet,
    dialer: Arc<dyn Dial>,
    store: RwLock<DeviceStore>,
    status_tx: watch::Sender<ConnectionStatus>,
    notice_tx: mpsc::Sender<Notice>,
    notice_rx: Mutex<Option<mpsc::Receiver<Notice>>>,
    manual_disconnect: AtomicBool,
    epoch: AtomicU64,
    conn: Mutex<ConnState>,
}

/// The connection/session core. Cheap to clone; all clones share one
/// underlying session.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    /// Creates a disconnected session.
    pub fn new(cfg: SessionConfig, dialer: Arc<dyn Dial>) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        let (notice_tx, notice_rx) = mpsc::channel(NOTICE_CHANNEL_CAPACITY);
        let topics = TopicSet::new(&cfg.topic_prefix);
        Self {
            shared: Arc::new(Shared {
                cfg,
                topics,
                dialer,
                store: RwLock::new(DeviceStore::new()),
                status_tx,
                notice_tx,
                notice_rx: Mutex::new(Some(notice_rx)),
                manual_disconnect: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
                conn: Mutex::new(ConnState::default()),
            }),
        }
    }

    /// Returns the current connection status.
    pub fn status(&self) -> ConnectionStatus {
        *self.shared.status_tx.borrow()
    }

    /// Returns a watch receiver that observes every status change.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Takes the notice stream. Only the first caller receives it.
    pub fn take_notices(&self) -> Option<mpsc::Receiver<Notice>> {
        self.shared.notice_rx.lock().take()
    }

    /// Returns the topic set this session subscribes and publishes under.
    pub fn topics(&self) -> &TopicSet {
        &self.shared.topics
    }

    /// Connects to the broker. An existing connection is torn down first
    /// (quietly), then the dial proceeds fresh. On dial failure the status
    /// moves to `Error` and the error is also returned.
    pub async fn connect(&self, opts: ConnectOptions) -> Result<()> {
        let shared = &self.shared;
        if shared.conn.lock().transport.is_some() {
            self.disconnect_inner(false).await;
        }

        shared.set_status(ConnectionStatus::Connecting);
        shared.store.write().clear();
        shared.manual_disconnect.store(false, Ordering::SeqCst);
        let epoch = shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        info!(broker = %opts.broker_url, "connecting");
        match shared.dialer.dial(&opts, &shared.cfg).await {
            Ok((transport, events)) => {
                let live = CancellationToken::new();
                {
                    let mut conn = shared.conn.lock();
                    conn.transport = Some(transport.clone());
                    conn.live = Some(live.clone());
                    conn.broker_url = opts.broker_url.clone();
                }
                tokio::spawn(run_event_loop(
                    shared.clone(),
                    events,
                    transport,
                    live,
                    epoch,
                ));
                Ok(())
            }
            Err(err) => {
                shared.set_status(ConnectionStatus::Error);
                if error::is_auth_failure(&err.to_string()) {
                    shared.notify(Notice::error(
                        "Authorization failed. Check the MQTT username and password.",
                    ));
                } else {
                    shared.notify(Notice::error(format!("Connection failed: {err}")));
                }
                Err(err)
            }
        }
    }

    /// Disconnects from the broker: stops polling, forcibly ends the
    /// transport, waits for it to wind down, then resets all session state.
    pub async fn disconnect(&self) {
        self.disconnect_inner(true).await;
    }

    async fn disconnect_inner(&self, announce: bool) {
        let shared = &self.shared;
        shared.manual_disconnect.store(true, Ordering::SeqCst);
        shared.stop_polling();

        let (transport, live) = {
            let mut conn = shared.conn.lock();
            conn.broker_url.clear();
            (conn.transport.take(), conn.live.take())
        };

        let had_transport = transport.is_some();
        if let Some(transport) = transport {
            if let Err(err) = transport.end().await {
                debug!(%err, "transport end reported an error");
            }
        }
        if let Some(live) = live {
            live.cancel();
        }

        if announce {
            shared.set_status(ConnectionStatus::Disconnected);
            if had_transport {
                shared.notify(Notice::info("Disconnected by user."));
            }
        }
        shared.store.write().clear();
        shared.manual_disconnect.store(false, Ordering::SeqCst);
        shared.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Publishes a request. When not connected this is a no-op apart from a
    /// warning notice; publish failures are reported but never change the
    /// connection status.
    pub async fn dispatch(&self, request: Request) {
        let shared = &self.shared;
        if self.status() != ConnectionStatus::Connected {
            shared.notify(Notice::warning(format!(
                "Not connected. Cannot {}.",
                request.describe()
            )));
            return;
        }
        let Some(transport) = shared.conn.lock().transport.clone() else {
            shared.notify(Notice::warning(format!(
                "Not connected. Cannot {}.",
                request.describe()
            )));
            return;
        };

        let topic = request.topic(&shared.topics).to_string();
        match transport.publish(&topic, &request.payload()).await {
            Ok(()) => {
                if let Some(ack) = request.ack() {
                    shared.notify(Notice::info(ack));
                }
            }
            Err(err) => {
                shared.notify(Notice::error(format!(
                    "Failed to {}: {err}",
                    request.describe()
                )));
            }
        }
    }

    /// Asks one device for its per-sensor maxima.
    pub async fn request_device_max_values(&self, device_serial: &str) {
        self.dispatch(Request::MaxValues {
            device_serial: device_serial.to_string(),
        })
        .await;
    }

    /// Asks one device for its per-sensor minima.
    pub async fn request_device_min_values(&self, device_serial: &str) {
        self.dispatch(Request::MinValues {
            device_serial: device_serial.to_string(),
        })
        .await;
    }

    /// Asks every device for its info record.
    pub async fn request_all_device_info(&self) {
        self.dispatch(Request::AllDeviceInfo).await;
    }

    /// Asks every device for its sensor display names.
    pub async fn request_all_sensor_names(&self) {
        self.dispatch(Request::AllSensorNames).await;
    }

    /// Asks every device for its error/warning flags.
    pub async fn request_all_status_flags(&self) {
        self.dispatch(Request::AllStatusFlags).await;
    }

    /// Asks every device for its secondary-display info.
    pub async fn request_all_epd_info(&self) {
        self.dispatch(Request::AllEpdInfo).await;
    }

    /// Commands every device to reset its error/warning flags.
    pub async fn send_flag_reset(&self) {
        self.dispatch(Request::FlagReset).await;
    }

    /// Commands every device to start a firmware update.
    pub async fn send_fota_update(&self) {
        self.dispatch(Request::FotaUpdate).await;
    }

    /// Commands every device to switch its secondary-display mode.
    pub async fn send_epd_mode(&self) {
        self.dispatch(Request::EpdMode).await;
    }

    /// Returns every device serial seen this session, sorted.
    pub fn device_serials(&self) -> Vec<String> {
        self.shared.store.read().device_serials()
    }

    /// Returns the telemetry history for one device, oldest first.
    pub fn history(&self, serial: &str) -> Vec<DataPoint> {
        self.shared
            .store
            .read()
            .history(serial)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the newest telemetry point for one device.
    pub fn latest_point(&self, serial: &str) -> Option<DataPoint> {
        self.shared.store.read().latest_point(serial).cloned()
    }

    pub fn device_info(&self, serial: &str) -> Option<DeviceInfo> {
        self.shared.store.read().info(serial).cloned()
    }

    pub fn max_values(&self, serial: &str) -> Option<HashMap<String, f64>> {
        self.shared.store.read().max_values(serial).cloned()
    }

    pub fn min_values(&self, serial: &str) -> Option<HashMap<String, f64>> {
        self.shared.store.read().min_values(serial).cloned()
    }

    pub fn sensor_names(&self, serial: &str) -> Option<SensorNames> {
        self.shared.store.read().names(serial).cloned()
    }

    pub fn device_status(&self, serial: &str) -> Option<DeviceStatus> {
        self.shared.store.read().status(serial).cloned()
    }

    pub fn epd_info(&self, serial: &str) -> Option<EpdInfo> {
        self.shared.store.read().epd_info(serial).cloned()
    }
}

impl Shared {
    /// Moves to the given status, swallowing transitions to the current
    /// value so repeated transport events produce no duplicate notices.
    /// Returns whether the status changed.
    fn set_status(&self, next: ConnectionStatus) -> bool {
        let changed = self.status_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            info!(status = %next, "connection status changed");
        }
        changed
    }

    fn notify(&self, notice: Notice) {
        if let Err(err) = self.notice_tx.try_send(notice) {
            warn!(message = %err.into_inner().message, "notice channel full, dropping notice");
        }
    }

    fn stop_polling(&self) {
        if let Some(poll) = self.conn.lock().poll.take() {
            poll.cancel();
        }
    }

    fn broker_url(&self) -> String {
        self.conn.lock().broker_url.clone()
    }
}

/// Consumes the transport event stream for one connection.
async fn run_event_loop(
    shared: Arc<Shared>,
    mut events: mpsc::Receiver<TransportEvent>,
    transport: Arc<dyn Transport>,
    live: CancellationToken,
    epoch: u64,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = live.cancelled() => break,
            event = events.recv() => event,
        };
        // A dropped pump without an explicit close still counts as one
        let (event, pump_gone) = match event {
            Some(event) => (event, false),
            None => (TransportEvent::Closed, true),
        };

        if shared.epoch.load(Ordering::SeqCst) != epoch {
            debug!("discarding transport event from a stale session");
            break;
        }

        match event {
            TransportEvent::Message { topic, payload } => {
                router::route(&shared.store, &shared.topics, &topic, &payload);
            }
            event => {
                let current = *shared.status_tx.borrow();
                let manual = shared.manual_disconnect.load(Ordering::SeqCst);
                let step = fsm::transition(current, manual, &event);
                apply_step(&shared, step, &transport, &live, epoch);
            }
        }

        if pump_gone {
            break;
        }
    }
    debug!("event loop finished");
}

fn apply_step(
    shared: &Arc<Shared>,
    step: fsm::Step,
    transport: &Arc<dyn Transport>,
    live: &CancellationToken,
    epoch: u64,
) {
    if let Some(next) = step.status {
        shared.set_status(next);
    }
    for effect in step.effects {
        match effect {
            Effect::BeginSession => {
                tokio::spawn(begin_session(
                    shared.clone(),
                    transport.clone(),
                    live.clone(),
                    epoch,
                ));
            }
            Effect::StopPolling => shared.stop_polling(),
            Effect::NotifyConnected => {
                shared.notify(Notice::info(format!("Connected to {}", shared.broker_url())));
            }
            Effect::NotifyClosed => shared.notify(Notice::warning("Connection closed.")),
            Effect::NotifyOffline => {
                shared.notify(Notice::warning("Broker is offline. Polling paused."));
            }
            Effect::NotifyError(message) => {
                if error::is_auth_failure(&message) {
                    shared.notify(Notice::error(
                        "Authorization failed. Check the MQTT username and password.",
                    ));
                } else {
                    shared.notify(Notice::error(message));
                }
            }
        }
    }
}

/// Connected side effects: subscribe to the response topics, publish the
/// initial request burst, and arm the polling timer. Failure to subscribe
/// to the telemetry response topic is fatal for the session; any other
/// subscribe failure is reported and skipped.
async fn begin_session(
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    live: CancellationToken,
    epoch: u64,
) {
    let topics = shared.topics.clone();
    for topic in topics.response_topics() {
        if live.is_cancelled() || shared.epoch.load(Ordering::SeqCst) != epoch {
            return;
        }
        if let Err(err) = transport.subscribe(topic).await {
            shared.notify(Notice::error(format!("Failed to subscribe to {topic}: {err}")));
            if topic == topics.telemetry_response {
                warn!(topic, %err, "telemetry subscription failed, ending session");
                shared.stop_polling();
                shared.set_status(ConnectionStatus::Error);
                if let Err(err) = transport.end().await {
                    debug!(%err, "transport end reported an error");
                }
                return;
            }
            warn!(topic, %err, "subscription failed, continuing without it");
        }
    }

    // Initial burst: metadata requests, then the first telemetry poll.
    // Publish failures here are logged only; the poll loop retries anyway.
    let burst = [
        Request::AllDeviceInfo,
        Request::AllSensorNames,
        Request::AllStatusFlags,
        Request::AllEpdInfo,
        Request::Telemetry,
    ];
    for request in burst {
        if live.is_cancelled() || shared.epoch.load(Ordering::SeqCst) != epoch {
            return;
        }
        let topic = request.topic(&topics);
        if let Err(err) = transport.publish(topic, &request.payload()).await {
            warn!(topic, %err, "initial request publish failed");
        }
    }

    if live.is_cancelled() || shared.epoch.load(Ordering::SeqCst) != epoch {
        return;
    }
    start_polling(&shared, transport, &live, epoch);
}

/// Arms the telemetry polling timer, replacing (and cancelling) any timer
/// from an earlier connected transition.
fn start_polling(
    shared: &Arc<Shared>,
    transport: Arc<dyn Transport>,
    live: &CancellationToken,
    epoch: u64,
) {
    let token = live.child_token();
    {
        let mut conn = shared.conn.lock();
        if let Some(old) = conn.poll.replace(token.clone()) {
            old.cancel();
        }
    }

    let shared = shared.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(shared.cfg.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; the connected burst already
        // published the initial request
        interval.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
            }
            // The timer must never touch a transport that is no longer
            // this session's live connection
            if shared.epoch.load(Ordering::SeqCst) != epoch || !transport.is_live() {
                break;
            }
            let request = Request::Telemetry;
            let topic = request.topic(&shared.topics);
            if let Err(err) = transport.publish(topic, &request.payload()).await {
                warn!(topic, %err, "telemetry poll publish failed");
            }
        }
        debug!("polling timer stopped");
    });
}
