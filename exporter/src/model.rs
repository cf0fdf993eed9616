use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Raw telemetry snapshot embedded in a device record.
///
/// Most fields are loosely formatted strings straight from the device
/// (`"62/100"`, `"2.7M/4.2M"`, `"66%"`); see [`crate::convert`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceLog {
    #[serde(rename = "linkquality")]
    pub link_quality: String,
    #[serde(rename = "diskUsage")]
    pub disk_usage: String,
    #[serde(rename = "memUsage")]
    pub memory_usage: String,
    #[serde(rename = "cpuUsage")]
    pub cpu_usage: String,
    pub ssid: String,
    #[serde(rename = "signallevel")]
    pub signal_level: i64,
    #[serde(rename = "vBattPer")]
    pub battery_percent: f64,
    #[serde(rename = "onboardTemp")]
    pub onboard_temperature: f64,
    pub version: String,
    pub model: String,
}

/// Last drive (blower) log of a device.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveLog {
    #[serde(rename = "modetype")]
    pub mode_type: String,
    #[serde(rename = "tiedchannel")]
    pub tied_channel: i64,
    /// Drive engagement in `[0, 1]`.
    #[serde(rename = "driveper")]
    pub drive_percent: f64,
    /// Setpoint temperature, in `degree_type` units.
    #[serde(rename = "setpoint")]
    pub set_point: f64,
    #[serde(rename = "degreetype")]
    pub degree_type: i64,
    #[serde(rename = "lidpaused")]
    pub lid_paused: bool,
}

/// Most recent reading of one temperature channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LatestTemperature {
    pub channel: i64,
    pub temp: f64,
    #[serde(rename = "degreetype")]
    pub degree_type: i64,
}

/// A device as returned by the device endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Device {
    pub id: i64,
    #[serde(rename = "UUID")]
    pub uuid: String,
    pub title: String,
    pub hardware_id: String,
    pub channel_count: i64,
    pub model: String,
    pub active: bool,
    /// Unit of the device's own temperatures, e.g. `onboardTemp`.
    #[serde(rename = "degreetype")]
    pub degree_type: i64,
    #[serde(rename = "last_drivelog", deserialize_with = "null_as_default")]
    pub last_drive_log: DriveLog,
    #[serde(deserialize_with = "null_as_default")]
    pub device_log: DeviceLog,
    pub last_battery_reading: Option<f64>,
    /// Only filled in by the realtime temperature endpoint.
    #[serde(deserialize_with = "null_as_default")]
    pub latest_temps: Vec<LatestTemperature>,
}

/// One entry of the session list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub device_ids: Vec<String>,
}

impl SessionSummary {
    /// A session is active while its end time lies after `now - window`.
    /// Sessions without an end time are treated as ended long ago.
    pub fn is_active(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        self.end_time.is_some_and(|end| end > now - window)
    }

    /// Chart data is pulled only for sessions that ended after the cutoff.
    pub fn ends_after(&self, cutoff: DateTime<Utc>) -> bool {
        self.end_time.is_some_and(|end| end > cutoff)
    }
}

/// Full session record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDetail {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub last_active: Option<DateTime<Utc>>,
    #[serde(default)]
    pub drive: bool,
    #[serde(default)]
    pub device_ids: Vec<String>,
    #[serde(default)]
    pub devices: Vec<Device>,
}

/// Channel identifier in chart data: an integer for temperature channels,
/// `<type>_<uuid>` for everything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelId {
    Number(i64),
    Text(String),
}

impl Default for ChannelId {
    fn default() -> Self {
        ChannelId::Text(String::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelKind {
    Temperature,
    Other(String),
}

impl ChannelKind {
    pub fn is_temperature(&self) -> bool {
        matches!(self, ChannelKind::Temperature)
    }

    pub fn name(&self) -> &str {
        match self {
            ChannelKind::Temperature => "temperature",
            ChannelKind::Other(kind) => kind,
        }
    }
}

/// Per-channel time series from a session chart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSeries {
    pub channel_id: ChannelId,
    #[serde(rename = "degreetype")]
    pub degree_type: i64,
    #[serde(deserialize_with = "label_as_string")]
    pub label: String,
    pub device: String,
    /// Sample timestamps, epoch seconds.
    pub x: Vec<i64>,
    pub y: Vec<f64>,
}

impl ChannelSeries {
    pub fn kind(&self) -> ChannelKind {
        match &self.channel_id {
            ChannelId::Number(_) => ChannelKind::Temperature,
            ChannelId::Text(id) if id.trim().parse::<i64>().is_ok() => ChannelKind::Temperature,
            ChannelId::Text(id) => {
                ChannelKind::Other(id.split('_').next().unwrap_or_default().to_string())
            }
        }
    }

    /// `(timestamp, value)` pairs. Extra entries in the longer array are
    /// ignored.
    pub fn samples(&self) -> impl Iterator<Item = (i64, f64)> + '_ {
        self.x.iter().copied().zip(self.y.iter().copied())
    }

    pub fn is_consistent(&self) -> bool {
        self.x.len() == self.y.len()
    }
}

#[derive(Debug, Serialize)]
pub struct AuthRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub key: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Labels show up both as numbers and strings depending on the channel.
fn label_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(String::new()),
        serde_json::Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}
