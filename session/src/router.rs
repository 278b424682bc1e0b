//! Routes inbound messages into the device store.
//!
//! Each response topic maps to one decode step and one store update. A
//! payload that fails to decode is logged and dropped; it never affects
//! other topics or the connection. Malformed messages are expected at high
//! frequency, so drops log at debug level only.

use crate::payload::{
    DeviceInfoResponse, EpdInfoResponse, MaxValuesResponse, MinValuesResponse,
    SensorNamesResponse, StatusResponse, TelemetryResponse,
};
use crate::status::DeviceStatus;
use crate::store::{DataPoint, DeviceInfo, DeviceStore, EpdInfo, SensorNames};
use crate::time::Milli;
use crate::topic::{Inbound, TopicSet};
use parking_lot::RwLock;
use tracing::debug;

/// Decodes one inbound message and applies it to the store. Unknown topics
/// and invalid payloads are dropped.
pub fn route(store: &RwLock<DeviceStore>, topics: &TopicSet, topic: &str, payload: &[u8]) {
    let Some(inbound) = topics.classify(topic) else {
        debug!(topic, "dropping message on unhandled topic");
        return;
    };

    match inbound {
        Inbound::Telemetry => route_telemetry(store, topic, payload),
        Inbound::DeviceInfo => route_device_info(store, topic, payload),
        Inbound::MaxValues => route_max_values(store, topic, payload),
        Inbound::MinValues => route_min_values(store, topic, payload),
        Inbound::SensorNames => route_sensor_names(store, topic, payload),
        Inbound::StatusFlags => route_status(store, topic, payload),
        Inbound::EpdInfo => route_epd_info(store, topic, payload),
    }
}

fn decode<T: serde::de::DeserializeOwned>(topic: &str, payload: &[u8]) -> Option<T> {
    match serde_json::from_slice(payload) {
        Ok(msg) => Some(msg),
        Err(err) => {
            debug!(topic, %err, "dropping undecodable payload");
            None
        }
    }
}

fn route_telemetry(store: &RwLock<DeviceStore>, topic: &str, payload: &[u8]) {
    let Some(msg) = decode::<TelemetryResponse>(topic, payload) else {
        return;
    };
    let values = msg.numeric_values();
    // A point is appended only when at least one value coerced
    if values.is_empty() {
        debug!(topic, serial = %msg.device_serial, "telemetry carried no numeric values");
        return;
    }
    store.write().push_point(
        &msg.device_serial,
        DataPoint {
            timestamp: Milli::now(),
            values,
        },
    );
}

fn route_device_info(store: &RwLock<DeviceStore>, topic: &str, payload: &[u8]) {
    let Some(msg) = decode::<DeviceInfoResponse>(topic, payload) else {
        return;
    };
    store.write().set_info(
        &msg.device_serial,
        DeviceInfo {
            mqtt_user: msg.mqtt_user,
            firmware_version: msg.device_fw_version,
            time_active: msg.device_time_active,
            reset_reason: msg.device_reset_reason,
            rtc_temperature: msg.rtc_temperature,
            restarts: msg.device_restart,
            ram_available: msg.device_ram_available,
            last_update: Milli::now(),
        },
    );
}

fn route_max_values(store: &RwLock<DeviceStore>, topic: &str, payload: &[u8]) {
    let Some(msg) = decode::<MaxValuesResponse>(topic, payload) else {
        return;
    };
    store
        .write()
        .set_max_values(&msg.device_serial, msg.numeric_values());
}

fn route_min_values(store: &RwLock<DeviceStore>, topic: &str, payload: &[u8]) {
    let Some(msg) = decode::<MinValuesResponse>(topic, payload) else {
        return;
    };
    store
        .write()
        .set_min_values(&msg.device_serial, msg.numeric_values());
}

fn route_sensor_names(store: &RwLock<DeviceStore>, topic: &str, payload: &[u8]) {
    let Some(msg) = decode::<SensorNamesResponse>(topic, payload) else {
        return;
    };
    store.write().set_names(
        &msg.device_serial,
        SensorNames {
            names: msg.string_values(),
            last_update: Milli::now(),
        },
    );
}

fn route_status(store: &RwLock<DeviceStore>, topic: &str, payload: &[u8]) {
    let Some(msg) = decode::<StatusResponse>(topic, payload) else {
        return;
    };
    let Some((error_flags, warning_flags)) = msg.flags() else {
        debug!(topic, serial = %msg.device_serial, "dropping status with unparseable flags");
        return;
    };
    store.write().set_status(
        &msg.device_serial,
        DeviceStatus {
            error_flags,
            warning_flags,
            last_update: Milli::now(),
        },
    );
}

fn route_epd_info(store: &RwLock<DeviceStore>, topic: &str, payload: &[u8]) {
    let Some(msg) = decode::<EpdInfoResponse>(topic, payload) else {
        return;
    };
    store.write().set_epd_info(
        &msg.device_serial,
        EpdInfo {
            restarts: msg.epd_1_restart,
            reset_reason: msg.epd_1_reset_reason,
            sw_reset_reason: msg.epd_1_sw_reset_reason,
            time_active: msg.epd_1_time_active,
            last_update: Milli::now(),
        },
    );
}
