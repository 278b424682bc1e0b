//! Per-device state, keyed by serial.
//!
//! One map per data category. Keys are created lazily on the first message
//! from a device and removed only by [`DeviceStore::clear`], which the
//! session runs on every fresh connect and on disconnect. Telemetry history
//! is the only bounded category.

use crate::status::DeviceStatus;
use crate::time::Milli;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, VecDeque};

/// Maximum telemetry points retained per device. Oldest points drop first.
pub const MAX_HISTORY_POINTS: usize = 200;

/// One decoded telemetry sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPoint {
    pub timestamp: Milli,
    pub values: HashMap<String, f64>,
}

/// Scalar device metadata, replaced wholesale on each response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DeviceInfo {
    pub mqtt_user: Option<String>,
    pub firmware_version: Option<String>,
    pub time_active: Option<String>,
    pub reset_reason: Option<String>,
    pub rtc_temperature: Option<String>,
    pub restarts: Option<String>,
    pub ram_available: Option<String>,
    pub last_update: Milli,
}

/// Sensor-key to display-name mapping for one device.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SensorNames {
    pub names: HashMap<String, String>,
    pub last_update: Milli,
}

/// Secondary-display (EPD) metadata for one device.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct EpdInfo {
    pub restarts: Option<String>,
    pub reset_reason: Option<String>,
    pub sw_reset_reason: Option<String>,
    pub time_active: Option<String>,
    pub last_update: Milli,
}

/// All decoded per-device state for one session.
#[derive(Debug, Default)]
pub struct DeviceStore {
    history: HashMap<String, VecDeque<DataPoint>>,
    info: HashMap<String, DeviceInfo>,
    max_values: HashMap<String, HashMap<String, f64>>,
    min_values: HashMap<String, HashMap<String, f64>>,
    names: HashMap<String, SensorNames>,
    status: HashMap<String, DeviceStatus>,
    epd: HashMap<String, EpdInfo>,
}

impl DeviceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a telemetry point to the device's history, trimming the
    /// oldest points beyond [`MAX_HISTORY_POINTS`].
    pub fn push_point(&mut self, serial: &str, point: DataPoint) {
        let history = self.history.entry(serial.to_string()).or_default();
        history.push_back(point);
        while history.len() > MAX_HISTORY_POINTS {
            history.pop_front();
        }
    }

    pub fn set_info(&mut self, serial: &str, info: DeviceInfo) {
        self.info.insert(serial.to_string(), info);
    }

    pub fn set_max_values(&mut self, serial: &str, values: HashMap<String, f64>) {
        self.max_values.insert(serial.to_string(), values);
    }

    pub fn set_min_values(&mut self, serial: &str, values: HashMap<String, f64>) {
        self.min_values.insert(serial.to_string(), values);
    }

    pub fn set_names(&mut self, serial: &str, names: SensorNames) {
        self.names.insert(serial.to_string(), names);
    }

    pub fn set_status(&mut self, serial: &str, status: DeviceStatus) {
        self.status.insert(serial.to_string(), status);
    }

    pub fn set_epd_info(&mut self, serial: &str, info: EpdInfo) {
        self.epd.insert(serial.to_string(), info);
    }

    /// Drops all per-device state. Run on fresh connect and on disconnect.
    pub fn clear(&mut self) {
        self.history.clear();
        self.info.clear();
        self.max_values.clear();
        self.min_values.clear();
        self.names.clear();
        self.status.clear();
        self.epd.clear();
    }

    /// Returns every serial seen in any category, sorted.
    pub fn device_serials(&self) -> Vec<String> {
        let mut serials = BTreeSet::new();
        serials.extend(self.history.keys().cloned());
        serials.extend(self.info.keys().cloned());
        serials.extend(self.max_values.keys().cloned());
        serials.extend(self.min_values.keys().cloned());
        serials.extend(self.names.keys().cloned());
        serials.extend(self.status.keys().cloned());
        serials.extend(self.epd.keys().cloned());
        serials.into_iter().collect()
    }

    pub fn history(&self, serial: &str) -> Option<&VecDeque<DataPoint>> {
        self.history.get(serial)
    }

    /// Returns the newest telemetry point for the device, if any.
    pub fn latest_point(&self, serial: &str) -> Option<&DataPoint> {
        self.history.get(serial).and_then(|h| h.back())
    }

    pub fn info(&self, serial: &str) -> Option<&DeviceInfo> {
        self.info.get(serial)
    }

    pub fn max_values(&self, serial: &str) -> Option<&HashMap<String, f64>> {
        self.max_values.get(serial)
    }

    pub fn min_values(&self, serial: &str) -> Option<&HashMap<String, f64>> {
        self.min_values.get(serial)
    }

    pub fn names(&self, serial: &str) -> Option<&SensorNames> {
        self.names.get(serial)
    }

    pub fn status(&self, serial: &str) -> Option<&DeviceStatus> {
        self.status.get(serial)
    }

    pub fn epd_info(&self, serial: &str) -> Option<&EpdInfo> {
        self.epd.get(serial)
    }

    /// Reports whether no device has produced any state yet.
    pub fn is_empty(&self) -> bool {
        self.device_serials().is_empty()
    }
}
