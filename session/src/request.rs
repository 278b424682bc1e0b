//! Outbound request messages.
//!
//! Each request is a thin builder: a fixed topic plus a small JSON command
//! object (the telemetry poll is a literal `1`). Targeted requests carry a
//! device serial; broadcast requests are answered by every device on the
//! broker independently.

use crate::topic::TopicSet;
use serde_json::json;

/// A publishable request or command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Poll every device for a telemetry sample.
    Telemetry,
    /// Ask every device for its info record.
    AllDeviceInfo,
    /// Ask every device for its sensor display names.
    AllSensorNames,
    /// Ask every device for its error/warning flags.
    AllStatusFlags,
    /// Ask every device for its secondary-display info.
    AllEpdInfo,
    /// Ask one device for its per-sensor maxima.
    MaxValues { device_serial: String },
    /// Ask one device for its per-sensor minima.
    MinValues { device_serial: String },
    /// Command every device to reset its error/warning flags.
    FlagReset,
    /// Command every device to start a firmware update.
    FotaUpdate,
    /// Command every device to switch its secondary-display mode.
    EpdMode,
}

impl Request {
    /// Returns the request topic within the given set.
    pub fn topic<'a>(&self, topics: &'a TopicSet) -> &'a str {
        match self {
            Request::Telemetry => &topics.telemetry_request,
            Request::AllDeviceInfo => &topics.device_info_request,
            Request::AllSensorNames => &topics.sensor_names_request,
            Request::AllStatusFlags => &topics.status_request,
            Request::AllEpdInfo => &topics.epd_info_request,
            Request::MaxValues { .. } => &topics.max_values_request,
            Request::MinValues { .. } => &topics.min_values_request,
            Request::FlagReset => &topics.flag_reset_request,
            Request::FotaUpdate => &topics.fota_request,
            Request::EpdMode => &topics.epd_mode_request,
        }
    }

    /// Builds the wire payload.
    pub fn payload(&self) -> Vec<u8> {
        let value = match self {
            Request::Telemetry => return b"1".to_vec(),
            Request::AllDeviceInfo => json!({ "get_info": true }),
            Request::AllSensorNames => json!({ "get_tft_names": true }),
            Request::AllStatusFlags => json!({ "get_status": true }),
            Request::AllEpdInfo => json!({ "get_epd_info": true }),
            Request::MaxValues { device_serial } => {
                json!({ "get_max_values": true, "device_serial": device_serial })
            }
            Request::MinValues { device_serial } => {
                json!({ "get_min_values": true, "device_serial": device_serial })
            }
            Request::FlagReset => json!({ "command": "reset_device_flags" }),
            Request::FotaUpdate => json!({ "command": "start_fota_update" }),
            Request::EpdMode => json!({ "command": "set_epd_mode" }),
        };
        value.to_string().into_bytes()
    }

    /// Short description used in failure notices.
    pub fn describe(&self) -> String {
        match self {
            Request::Telemetry => "request telemetry".to_string(),
            Request::AllDeviceInfo => "request device info".to_string(),
            Request::AllSensorNames => "request sensor names".to_string(),
            Request::AllStatusFlags => "request error/warning flags".to_string(),
            Request::AllEpdInfo => "request EPD info".to_string(),
            Request::MaxValues { device_serial } => {
                format!("request max values for {device_serial}")
            }
            Request::MinValues { device_serial } => {
                format!("request min values for {device_serial}")
            }
            Request::FlagReset => "send the flag reset command".to_string(),
            Request::FotaUpdate => "send the software update command".to_string(),
            Request::EpdMode => "send the EPD mode setting command".to_string(),
        }
    }

    /// Confirmation notice emitted after a successful publish, for the
    /// operator-facing broadcast operations. Polls and targeted reads stay
    /// silent.
    pub fn ack(&self) -> Option<&'static str> {
        match self {
            Request::AllDeviceInfo => Some("Requesting updated device info for all devices."),
            Request::AllSensorNames => Some("Requesting updated sensor names for all devices."),
            Request::AllStatusFlags => {
                Some("Requesting updated error/warning flags for all devices.")
            }
            Request::AllEpdInfo => Some("Requesting updated EPD info for all devices."),
            Request::FlagReset => Some("Reset command sent to all devices."),
            Request::FotaUpdate => Some("Software update command sent to all devices."),
            Request::EpdMode => Some("EPD mode setting command sent to all devices."),
            Request::Telemetry | Request::MaxValues { .. } | Request::MinValues { .. } => None,
        }
    }
}
