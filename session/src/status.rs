//! Per-device error/warning flag words and their condition tables.

use crate::time::Milli;
use serde::Serialize;

/// Error conditions by bit value, in table order.
pub const ERROR_CONDITIONS: &[(u32, &str)] = &[
    (0x0001, "CAN_ERROR_INIT_FAILED"),
    (0x0002, "CAN_ERROR_NULL_BUFFER"),
    (0x0004, "CAN_ERROR_READ_FAILED"),
    (0x0008, "CAN_ERROR_GENERIC"),
    (0x0010, "I2C_ERROR_COMMUNICATION"),
    (0x0020, "I2C_ERROR_TIMEOUT"),
    (0x0040, "I2C_ERROR_RESET_FAILED"),
    (0x0100, "WDG_ERROR_TIMEOUT"),
    (0x0200, "WDG_ERROR_RESET"),
    (0x1000, "SFT_ERROR_LOW_MEMORY"),
    (0x2000, "SFT_ERROR_OVERLOAD"),
    (0x4000, "SFT_ERROR_SEMAPHORE"),
    (0x0001_0000, "ASW_ERROR_OVERLOAD"),
    (0x0002_0000, "ASW_ERROR_TASK_TIMEOUT"),
    (0x0010_0000, "NVM_ERROR_INIT"),
    (0x0100_0000, "MQTT_ERROR_SEND"),
    (0x0200_0000, "MQTT_ERROR_CONNECT"),
    (0x0400_0000, "MQTT_ERROR_WIFI"),
    (0x0800_0000, "MQTT_ERROR_STATE"),
    (0x1000_0000, "MQTT_ERROR_AUTH"),
];

/// Warning conditions by bit value, in table order.
pub const WARNING_CONDITIONS: &[(u32, &str)] = &[
    (0x0001, "I2C_WARN_RETRY"),
    (0x0010, "MQTT_WARN_SEND_RETRY"),
    (0x0020, "MQTT_WARN_WIFI"),
    (0x0040, "MQTT_WARN_INTERNET"),
    (0x0100, "CAN_WARN_OVERFLOW"),
    (0x0200, "CAN_WARN_READ"),
    (0x1000, "ASW_WARN_HIGH_LOAD"),
    (0x2000, "ASW_WARN_TASK_DELAY"),
];

fn decode(flags: u32, table: &[(u32, &'static str)]) -> Vec<&'static str> {
    table
        .iter()
        .filter(|(bit, _)| flags & bit == *bit)
        .map(|(_, name)| *name)
        .collect()
}

/// Returns the names of the set error bits, in table order. Bits without a
/// table entry are ignored.
pub fn decode_error_flags(flags: u32) -> Vec<&'static str> {
    decode(flags, ERROR_CONDITIONS)
}

/// Returns the names of the set warning bits, in table order.
pub fn decode_warning_flags(flags: u32) -> Vec<&'static str> {
    decode(flags, WARNING_CONDITIONS)
}

/// Latest error/warning flag words reported by one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DeviceStatus {
    pub error_flags: u32,
    pub warning_flags: u32,
    pub last_update: Milli,
}

impl DeviceStatus {
    /// Returns the active error condition names.
    pub fn errors(&self) -> Vec<&'static str> {
        decode_error_flags(self.error_flags)
    }

    /// Returns the active warning condition names.
    pub fn warnings(&self) -> Vec<&'static str> {
        decode_warning_flags(self.warning_flags)
    }

    /// Reports whether any flag is set.
    pub fn is_clear(&self) -> bool {
        self.error_flags == 0 && self.warning_flags == 0
    }
}
