#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use fireboard_exporter::model::{
    ChannelId, ChannelSeries, Device, DeviceLog, DriveLog, LatestTemperature, SessionDetail,
    SessionSummary,
};
use fireboard_exporter::{Call, Error, RemoteDataSource, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration as StdDuration;

/// Failure modes the fake source can be told to produce.
#[derive(Debug, Clone, Copy)]
pub enum Failure {
    RateLimited,
    Server,
    Decode,
    Unauthorized,
}

impl Failure {
    fn into_error(self, call: Call, resource: Option<String>) -> Error {
        match self {
            Failure::RateLimited => Error::RateLimited { call },
            Failure::Server => Error::Remote {
                call,
                resource,
                status: Some(500),
                message: "internal server error".to_string(),
            },
            Failure::Decode => Error::Decode {
                call,
                resource,
                source: serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
            },
            Failure::Unauthorized => Error::Unauthorized { call },
        }
    }
}

/// In-memory stand-in for the Fireboard API.
#[derive(Default)]
pub struct FakeSource {
    pub devices: Vec<Device>,
    pub sessions: Vec<SessionSummary>,
    pub charts: HashMap<i64, Vec<ChannelSeries>>,
    pub drive: HashMap<String, Device>,
    pub temperatures: HashMap<String, Device>,
    pub token: Option<String>,
    /// Every call of this kind fails.
    pub failing_calls: HashMap<Call, Failure>,
    /// Chart fetches for these sessions fail.
    pub failing_charts: HashMap<i64, Failure>,
    calls: Mutex<Vec<(Call, Option<String>, StdDuration)>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(Call, Option<String>)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(call, resource, _)| (*call, resource.clone()))
            .collect()
    }

    pub fn calls_of(&self, call: Call) -> Vec<Option<String>> {
        self.calls()
            .into_iter()
            .filter(|(c, _)| *c == call)
            .map(|(_, resource)| resource)
            .collect()
    }

    pub fn timeouts(&self) -> Vec<StdDuration> {
        self.calls.lock().unwrap().iter().map(|(_, _, t)| *t).collect()
    }

    fn record(&self, call: Call, resource: Option<String>, timeout: StdDuration) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((call, resource.clone(), timeout));
        match self.failing_calls.get(&call) {
            Some(failure) => Err(failure.into_error(call, resource)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteDataSource for FakeSource {
    async fn authenticate(&self, _username: &str, _password: &str, timeout: StdDuration) -> Result<String> {
        self.record(Call::Authenticate, None, timeout)?;
        self.token
            .clone()
            .ok_or_else(|| Error::Auth("invalid credentials".to_string()))
    }

    async fn list_devices(&self, timeout: StdDuration) -> Result<Vec<Device>> {
        self.record(Call::DevicesList, None, timeout)?;
        Ok(self.devices.clone())
    }

    async fn get_device(&self, uuid: &str, timeout: StdDuration) -> Result<Device> {
        self.record(Call::DevicesGet, Some(uuid.to_string()), timeout)?;
        self.devices
            .iter()
            .find(|d| d.uuid == uuid)
            .cloned()
            .ok_or_else(|| Failure::Server.into_error(Call::DevicesGet, Some(uuid.to_string())))
    }

    async fn get_device_realtime_temperature(&self, uuid: &str, timeout: StdDuration) -> Result<Device> {
        self.record(Call::DevicesGetRealtimeTemperature, Some(uuid.to_string()), timeout)?;
        self.temperatures.get(uuid).cloned().ok_or_else(|| {
            Failure::Server.into_error(Call::DevicesGetRealtimeTemperature, Some(uuid.to_string()))
        })
    }

    async fn get_device_realtime_drive(&self, uuid: &str, timeout: StdDuration) -> Result<Device> {
        self.record(Call::DevicesGetRealtimeDriveData, Some(uuid.to_string()), timeout)?;
        self.drive.get(uuid).cloned().ok_or_else(|| {
            Failure::Server.into_error(Call::DevicesGetRealtimeDriveData, Some(uuid.to_string()))
        })
    }

    async fn list_sessions(&self, timeout: StdDuration) -> Result<Vec<SessionSummary>> {
        self.record(Call::SessionsList, None, timeout)?;
        Ok(self.sessions.clone())
    }

    async fn get_session(&self, id: i64, timeout: StdDuration) -> Result<SessionDetail> {
        self.record(Call::SessionsGet, Some(id.to_string()), timeout)?;
        let summary = self
            .sessions
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| Failure::Server.into_error(Call::SessionsGet, Some(id.to_string())))?;
        Ok(SessionDetail {
            id,
            title: summary.title.clone(),
            description: String::new(),
            start_time: summary.start_time,
            end_time: summary.end_time,
            last_active: summary.end_time,
            drive: false,
            device_ids: summary.device_ids.clone(),
            devices: vec![],
        })
    }

    async fn get_session_chart(&self, id: i64, timeout: StdDuration) -> Result<Vec<ChannelSeries>> {
        self.record(Call::SessionsGetChartData, Some(id.to_string()), timeout)?;
        if let Some(failure) = self.failing_charts.get(&id) {
            return Err(failure.into_error(Call::SessionsGetChartData, Some(id.to_string())));
        }
        Ok(self.charts.get(&id).cloned().unwrap_or_default())
    }
}

/// Fixed pass start used by all deterministic tests.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 18, 30, 0).unwrap()
}

pub fn active_device(uuid: &str, link_quality: &str, ssid: &str) -> Device {
    Device {
        id: 1,
        uuid: uuid.to_string(),
        title: format!("FireBoard {uuid}"),
        active: true,
        device_log: DeviceLog {
            link_quality: link_quality.to_string(),
            disk_usage: "0.8M/4.0M".to_string(),
            memory_usage: "2.7M/4.2M".to_string(),
            cpu_usage: "66%".to_string(),
            ssid: ssid.to_string(),
            signal_level: -48,
            battery_percent: 87.0,
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn inactive_device(uuid: &str) -> Device {
    Device {
        uuid: uuid.to_string(),
        active: false,
        ..Default::default()
    }
}

pub fn drive_device(uuid: &str, drive_percent: f64, set_point: f64, degree_type: i64) -> Device {
    Device {
        uuid: uuid.to_string(),
        active: true,
        last_drive_log: DriveLog {
            mode_type: "On".to_string(),
            drive_percent,
            set_point,
            degree_type,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Realtime temperature snapshot: onboard reading plus one channel reading per entry.
pub fn temperature_device(uuid: &str, degree_type: i64, onboard: f64, readings: &[(i64, f64, i64)]) -> Device {
    Device {
        uuid: uuid.to_string(),
        active: true,
        degree_type,
        device_log: DeviceLog {
            onboard_temperature: onboard,
            ..Default::default()
        },
        latest_temps: readings
            .iter()
            .map(|&(channel, temp, degree_type)| LatestTemperature {
                channel,
                temp,
                degree_type,
            })
            .collect(),
        ..Default::default()
    }
}

/// A session that ended `ended_ago` before [`now`].
pub fn session(id: i64, ended_ago: Duration) -> SessionSummary {
    SessionSummary {
        id,
        title: format!("Cook {id}"),
        start_time: Some(now() - ended_ago - Duration::hours(4)),
        end_time: Some(now() - ended_ago),
        device_ids: vec!["dev-1".to_string()],
    }
}

pub fn temperature_channel(label: &str, degree_type: i64, samples: &[(DateTime<Utc>, f64)]) -> ChannelSeries {
    ChannelSeries {
        channel_id: ChannelId::Number(label.parse().unwrap_or(1)),
        degree_type,
        label: label.to_string(),
        device: "dev-1".to_string(),
        x: samples.iter().map(|(t, _)| t.timestamp()).collect(),
        y: samples.iter().map(|(_, v)| *v).collect(),
    }
}
