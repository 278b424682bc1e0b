//! Typed wire payloads for the device response topics.
//!
//! Devices stringify most numeric fields, so the response structs keep raw
//! [`Value`]s where coercion is needed and expose helpers that apply the
//! drop-what-does-not-parse policy. Decoding never panics; a payload that
//! fails `serde_json::from_slice` is dropped by the router.

use serde::{Deserialize, Deserializer, de};
use serde_json::Value;
use std::collections::HashMap;

/// Coerces a raw JSON value into an f64. Accepts numbers and stringified
/// numbers; everything else (bool, null, nested objects) yields None.
pub fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Coerces a raw JSON value into a u32 flag word. Accepts non-negative
/// integers and stringified base-10 integers.
pub fn coerce_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    }
}

/// Keeps the entries of a raw map that coerce to f64, dropping the rest
/// individually.
pub fn coerce_numeric_map(raw: &HashMap<String, Value>) -> HashMap<String, f64> {
    raw.iter()
        .filter_map(|(k, v)| coerce_f64(v).map(|n| (k.clone(), n)))
        .collect()
}

/// Telemetry response: one sample of every sensor channel on one device.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryResponse {
    pub device_serial: String,
    #[serde(default)]
    pub tftvalue: HashMap<String, Value>,
}

impl TelemetryResponse {
    /// Returns the sensor values that coerced to numbers.
    pub fn numeric_values(&self) -> HashMap<String, f64> {
        coerce_numeric_map(&self.tftvalue)
    }
}

/// Device info response. All fields other than the serial are optional;
/// devices omit what they do not track.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceInfoResponse {
    pub device_serial: String,
    pub mqtt_user: Option<String>,
    pub device_fw_version: Option<String>,
    pub device_time_active: Option<String>,
    pub device_reset_reason: Option<String>,
    pub rtc_temperature: Option<String>,
    pub device_restart: Option<String>,
    pub device_ram_available: Option<String>,
}

/// Max-values response.
#[derive(Debug, Clone, Deserialize)]
pub struct MaxValuesResponse {
    pub device_serial: String,
    #[serde(default)]
    pub maxvalue: HashMap<String, Value>,
}

impl MaxValuesResponse {
    pub fn numeric_values(&self) -> HashMap<String, f64> {
        coerce_numeric_map(&self.maxvalue)
    }
}

/// Min-values response.
///
/// Some firmware revisions publish the value map under `minValue`, others
/// under `minvalue`; both decode identically (any casing of the key is
/// accepted).
#[derive(Debug, Clone)]
pub struct MinValuesResponse {
    pub device_serial: String,
    pub minvalue: HashMap<String, Value>,
}

impl MinValuesResponse {
    pub fn numeric_values(&self) -> HashMap<String, f64> {
        coerce_numeric_map(&self.minvalue)
    }
}

impl<'de> Deserialize<'de> for MinValuesResponse {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = serde_json::Map::deserialize(deserializer)?;
        let device_serial = map
            .get("device_serial")
            .and_then(Value::as_str)
            .ok_or_else(|| de::Error::missing_field("device_serial"))?
            .to_string();
        let minvalue = map
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("minvalue"))
            .and_then(|(_, v)| v.as_object())
            .ok_or_else(|| de::Error::missing_field("minvalue"))?
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(Self {
            device_serial,
            minvalue,
        })
    }
}

/// Sensor display-name response.
#[derive(Debug, Clone, Deserialize)]
pub struct SensorNamesResponse {
    pub device_serial: String,
    pub tft_names: HashMap<String, Value>,
}

impl SensorNamesResponse {
    /// Returns the entries whose values are strings, dropping the rest
    /// individually.
    pub fn string_values(&self) -> HashMap<String, String> {
        self.tft_names
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect()
    }
}

/// Error/warning status response. Flags arrive as stringified integers.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub device_serial: String,
    #[serde(rename = "errorFlags")]
    pub error_flags: Value,
    #[serde(rename = "warningFlags")]
    pub warning_flags: Value,
}

impl StatusResponse {
    /// Returns (error_flags, warning_flags) if both coerce to integers.
    /// A message where either fails to parse is dropped entirely.
    pub fn flags(&self) -> Option<(u32, u32)> {
        Some((coerce_u32(&self.error_flags)?, coerce_u32(&self.warning_flags)?))
    }
}

/// Secondary-display (EPD) info response.
#[derive(Debug, Clone, Deserialize)]
pub struct EpdInfoResponse {
    pub device_serial: String,
    pub epd_1_restart: Option<String>,
    pub epd_1_reset_reason: Option<String>,
    pub epd_1_sw_reset_reason: Option<String>,
    pub epd_1_time_active: Option<String>,
}
