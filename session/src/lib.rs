//! Connection/session core for the tftdash telemetry dashboard.
//!
//! The session owns the broker connection lifecycle, multiplexes inbound
//! messages by topic into typed per-device state, issues periodic and
//! on-demand request/response exchanges, and recovers from disconnects
//! without leaking timers or stale state:
//!
//! - [`Session`]: connection lifecycle, status state machine, polling timer,
//!   request dispatch
//! - [`ConnectionStatus`] and [`fsm::transition`]: the explicit transition
//!   table the event loop runs on
//! - [`DeviceStore`] and the record types: per-device decoded state
//! - [`TopicSet`] and the router: inbound topic → decode → store update
//! - [`Transport`] / [`Dial`]: the MQTT boundary, with a rumqttc
//!   implementation in [`transport`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tftdash_session::{ConnectOptions, MqttDialer, Result, Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let session = Session::new(SessionConfig::default(), Arc::new(MqttDialer::new()));
//!     let mut notices = session.take_notices().expect("first taker");
//!     session
//!         .connect(ConnectOptions::new("mqtt://127.0.0.1:1883"))
//!         .await?;
//!     while let Some(notice) = notices.recv().await {
//!         println!("{}", notice.message);
//!     }
//!     Ok(())
//! }
//! ```

mod config;
mod error;
pub mod fsm;
mod payload;
mod request;
mod router;
mod session;
mod status;
mod store;
mod time;
mod topic;
pub mod transport;

pub use config::*;
pub use error::{Error, Result, is_auth_failure};
pub use fsm::ConnectionStatus;
pub use request::Request;
pub use router::route;
pub use session::{Notice, Session, Severity};
pub use status::*;
pub use store::*;
pub use time::Milli;
pub use topic::{Inbound, TopicSet};
pub use transport::{Dial, MqttDialer, Transport, TransportEvent};

#[cfg(test)]
mod tests;
