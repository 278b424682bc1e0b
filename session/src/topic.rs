//! Topic names for the device request/response exchanges.
//!
//! Every exchange uses a fixed pair of topics, `<prefix>/<NAME>/Request` and
//! `<prefix>/<NAME>/Response`. The prefix is empty by default, which yields
//! the absolute names the devices publish under (`/TFT/Request`, ...).

/// The full set of request and response topics for one broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet {
    pub telemetry_request: String,
    pub telemetry_response: String,
    pub device_info_request: String,
    pub device_info_response: String,
    pub max_values_request: String,
    pub max_values_response: String,
    pub min_values_request: String,
    pub min_values_response: String,
    pub sensor_names_request: String,
    pub sensor_names_response: String,
    pub status_request: String,
    pub status_response: String,
    pub flag_reset_request: String,
    pub fota_request: String,
    pub epd_mode_request: String,
    pub epd_info_request: String,
    pub epd_info_response: String,
}

/// Classification of an inbound response topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Inbound {
    Telemetry,
    DeviceInfo,
    MaxValues,
    MinValues,
    SensorNames,
    StatusFlags,
    EpdInfo,
}

impl TopicSet {
    /// Builds the topic set for the given prefix. A trailing slash on the
    /// prefix is ignored.
    pub fn new(prefix: &str) -> Self {
        let p = prefix.trim_end_matches('/');
        Self {
            telemetry_request: format!("{p}/TFT/Request"),
            telemetry_response: format!("{p}/TFT/Response"),
            device_info_request: format!("{p}/CPU/Request"),
            device_info_response: format!("{p}/CPU/Response"),
            max_values_request: format!("{p}/MAX/Request"),
            max_values_response: format!("{p}/MAX/Response"),
            min_values_request: format!("{p}/MIN/Request"),
            min_values_response: format!("{p}/MIN/Response"),
            sensor_names_request: format!("{p}/TFT/NAME/Request"),
            sensor_names_response: format!("{p}/TFT/NAME/Response"),
            status_request: format!("{p}/ERR/Request"),
            status_response: format!("{p}/ERR/Response"),
            flag_reset_request: format!("{p}/CLR/Request"),
            fota_request: format!("{p}/FOTA/Request"),
            epd_mode_request: format!("{p}/EPDSSM/Request"),
            epd_info_request: format!("{p}/EPD1/Request"),
            epd_info_response: format!("{p}/EPD1/Response"),
        }
    }

    /// Returns all response topics, in subscription order.
    pub fn response_topics(&self) -> [&str; 7] {
        [
            &self.telemetry_response,
            &self.device_info_response,
            &self.sensor_names_response,
            &self.max_values_response,
            &self.min_values_response,
            &self.status_response,
            &self.epd_info_response,
        ]
    }

    /// Classifies an inbound topic. Returns None for topics this session
    /// does not consume.
    pub fn classify(&self, topic: &str) -> Option<Inbound> {
        if topic == self.telemetry_response {
            Some(Inbound::Telemetry)
        } else if topic == self.device_info_response {
            Some(Inbound::DeviceInfo)
        } else if topic == self.max_values_response {
            Some(Inbound::MaxValues)
        } else if topic == self.min_values_response {
            Some(Inbound::MinValues)
        } else if topic == self.sensor_names_response {
            Some(Inbound::SensorNames)
        } else if topic == self.status_response {
            Some(Inbound::StatusFlags)
        } else if topic == self.epd_info_response {
            Some(Inbound::EpdInfo)
        } else {
            None
        }
    }
}

impl Default for TopicSet {
    fn default() -> Self {
        Self::new("")
    }
}
