//! Error types for the session core.

use thiserror::Error;

/// Error type for session operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Broker address could not be parsed.
    #[error("session: invalid broker address: {0}")]
    InvalidAddress(String),

    /// Transport setup failed before any event fired.
    #[error("session: connect failed: {0}")]
    Connect(String),

    /// Subscribe request failed.
    #[error("session: subscribe failed on {topic}: {reason}")]
    Subscribe { topic: String, reason: String },

    /// Publish request failed.
    #[error("session: publish failed on {topic}: {reason}")]
    Publish { topic: String, reason: String },
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reports whether a transport error message describes an authorization
/// failure. Brokers word this differently ("not authorized", "bad user name
/// or password", "connection refused: not authorized"), so match loosely.
pub fn is_auth_failure(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("not authorized")
        || lower.contains("auth")
        || lower.contains("credentials")
        || lower.contains("bad user name")
}
