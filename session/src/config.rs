//! Session configuration.

use std::time::Duration;

/// Fixed behaviour of a [`Session`](crate::Session), set once at construction.
///
/// Per-connection values (broker address, credentials) live in
/// [`ConnectOptions`] instead, mirroring what the operator enters in the
/// connect form.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Topic prefix prepended to every request/response topic. Empty by
    /// default, which yields the absolute names (`/TFT/Request`, ...).
    pub topic_prefix: String,
    /// Interval between telemetry polls while connected. Default: 60 s.
    pub poll_interval: Duration,
    /// MQTT keep-alive interval. Default: 60 s.
    pub keep_alive: Duration,
    /// Delay before the transport retries after a broken connection.
    /// Default: 1 s.
    pub reconnect_period: Duration,
    /// Time allowed for a single connect attempt to produce a ConnAck.
    /// Default: 20 s.
    pub connect_timeout: Duration,
    /// Request a clean session on connect. Default: true.
    pub clean_session: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            topic_prefix: String::new(),
            poll_interval: Duration::from_millis(60_000),
            keep_alive: Duration::from_secs(60),
            reconnect_period: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(20),
            clean_session: true,
        }
    }
}

impl SessionConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the topic prefix.
    pub fn with_topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = prefix.into();
        self
    }

    /// Sets the telemetry poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the keep-alive interval.
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Sets the reconnect period.
    pub fn with_reconnect_period(mut self, period: Duration) -> Self {
        self.reconnect_period = period;
        self
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Per-connection options, supplied to [`Session::connect`](crate::Session::connect).
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Broker address, `mqtt://host:port` or `host:port`.
    pub broker_url: String,
    /// Username for the transport handshake.
    pub username: Option<String>,
    /// Password for the transport handshake.
    pub password: Option<String>,
    /// MQTT client id. Generated (`tftdash_<hex>`) when not supplied.
    pub client_id: Option<String>,
}

impl ConnectOptions {
    /// Creates options for the given broker address.
    pub fn new(broker_url: impl Into<String>) -> Self {
        Self {
            broker_url: broker_url.into(),
            ..Default::default()
        }
    }

    /// Sets the handshake credentials.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Sets the client id.
    pub fn with_client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }
}
