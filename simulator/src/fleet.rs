use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

const CHART_STEP_SECS: i64 = 60;
const CHART_SPAN_MINUTES: i64 = 45;

#[derive(Debug, Clone, Serialize)]
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

#[derive(Debug, Clone, Serialize)]
pub struct DriveLog {
    #[serde(rename = "modetype")]
    pub mode_type: String,
    #[serde(rename = "tiedchannel")]
    pub tied_channel: i64,
    #[serde(rename = "driveper")]
    pub drive_percent: f64,
    #[serde(rename = "setpoint")]
    pub set_point: f64,
    #[serde(rename = "degreetype")]
    pub degree_type: i64,
    #[serde(rename = "lidpaused")]
    pub lid_paused: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatestTemp {
    pub channel: i64,
    pub temp: f64,
    #[serde(rename = "degreetype")]
    pub degree_type: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Device {
    pub id: i64,
    #[serde(rename = "UUID")]
    pub uuid: String,
    pub title: String,
    pub hardware_id: String,
    pub channel_count: i64,
    pub model: String,
    pub active: bool,
    #[serde(rename = "degreetype")]
    pub degree_type: i64,
    pub latest_temps: Vec<LatestTemp>,
    #[serde(rename = "last_drivelog")]
    pub last_drive_log: Option<DriveLog>,
    pub device_log: DeviceLog,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: i64,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub device_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelSeries {
    pub channel_id: serde_json::Value,
    #[serde(rename = "degreetype")]
    pub degree_type: i64,
    pub label: serde_json::Value,
    pub device: String,
    pub x: Vec<i64>,
    pub y: Vec<f64>,
}

/// Static description of one simulated device.
#[derive(Debug, Clone)]
struct SimDevice {
    id: i64,
    uuid: String,
    title: String,
    ssid: String,
    channel_count: i64,
    active: bool,
    has_drive: bool,
}

/// Static description of one simulated session. Times are offsets from the
/// moment a request is served, so sessions keep looking fresh.
#[derive(Debug, Clone)]
struct SimSession {
    id: i64,
    title: String,
    device: usize,
    ended_ago: Duration,
    length: Duration,
}

/// A randomly generated account: devices plus cooking sessions.
pub struct Fleet {
    devices: Vec<SimDevice>,
    sessions: Vec<SimSession>,
}

impl Fleet {
    pub fn generate(rng: &mut impl Rng, num_devices: usize, num_sessions: usize) -> Self {
        let num_devices = num_devices.max(1);
        let devices = (0..num_devices)
            .map(|i| SimDevice {
                id: i as i64 + 1,
                uuid: Uuid::new_v4().to_string(),
                title: format!("FireBoard {}", i + 1),
                ssid: format!("pit-{}", rng.gen_range(1..=3)),
                channel_count: rng.gen_range(2..=6),
                // Roughly one in five devices is offline.
                active: rng.gen_bool(0.8),
                has_drive: rng.gen_bool(0.5),
            })
            .collect();

        let sessions = (0..num_sessions)
            .map(|i| {
                // Half of the sessions are still running, the rest ended
                // anywhere in the last six hours.
                let ended_ago = if i % 2 == 0 {
                    Duration::seconds(rng.gen_range(0..120))
                } else {
                    Duration::minutes(rng.gen_range(15..360))
                };
                SimSession {
                    id: 1000 + i as i64,
                    title: format!("Cook {}", i + 1),
                    device: rng.gen_range(0..num_devices),
                    ended_ago,
                    length: Duration::hours(rng.gen_range(2..14)),
                }
            })
            .collect();

        Self { devices, sessions }
    }

    pub fn devices(&self, rng: &mut impl Rng) -> Vec<Device> {
        self.devices.iter().map(|sim| device(rng, sim)).collect()
    }

    pub fn device(&self, rng: &mut impl Rng, uuid: &str) -> Option<Device> {
        self.devices
            .iter()
            .find(|sim| sim.uuid == uuid)
            .map(|sim| device(rng, sim))
    }

    pub fn sessions(&self, now: DateTime<Utc>) -> Vec<Session> {
        self.sessions.iter().map(|sim| self.session_at(sim, now)).collect()
    }

    pub fn session(&self, id: i64, now: DateTime<Utc>) -> Option<Session> {
        self.sessions
            .iter()
            .find(|sim| sim.id == id)
            .map(|sim| self.session_at(sim, now))
    }

    /// Chart data covering the last stretch of a session, one sample per
    /// minute per channel.
    pub fn chart(&self, rng: &mut impl Rng, id: i64, now: DateTime<Utc>) -> Option<Vec<ChannelSeries>> {
        let sim = self.sessions.iter().find(|sim| sim.id == id)?;
        let device = &self.devices[sim.device];
        let end = (now - sim.ended_ago).timestamp();
        let x: Vec<i64> = (0..=CHART_SPAN_MINUTES)
            .map(|i| end - (CHART_SPAN_MINUTES - i) * CHART_STEP_SECS)
            .collect();

        let mut channels: Vec<ChannelSeries> = (1..=device.channel_count)
            .map(|channel| ChannelSeries {
                channel_id: channel.into(),
                degree_type: 2,
                label: channel.into(),
                device: device.uuid.clone(),
                y: temperature_walk(rng, x.len()),
                x: x.clone(),
            })
            .collect();

        if device.has_drive {
            channels.push(ChannelSeries {
                channel_id: format!("drive_{}", device.uuid).into(),
                degree_type: 2,
                label: "Blower".into(),
                device: device.uuid.clone(),
                y: (0..x.len()).map(|_| rng.gen_range(0.0..100.0)).collect(),
                x,
            });
        }
        Some(channels)
    }

    fn session_at(&self, sim: &SimSession, now: DateTime<Utc>) -> Session {
        let end_time = now - sim.ended_ago;
        Session {
            id: sim.id,
            title: sim.title.clone(),
            start_time: end_time - sim.length,
            end_time,
            device_ids: vec![self.devices[sim.device].uuid.clone()],
        }
    }
}

fn device(rng: &mut impl Rng, sim: &SimDevice) -> Device {
    // 5% of reports carry a garbled link quality, like real hardware does.
    let link_quality = if rng.gen_bool(0.05) {
        "N/A".to_string()
    } else {
        format!("{}/100", rng.gen_range(20..=100))
    };

    let last_drive_log = sim.has_drive.then(|| DriveLog {
        mode_type: "On".to_string(),
        tied_channel: 1,
        drive_percent: rng.gen_range(0.0..1.0),
        set_point: 225.0,
        degree_type: 2,
        lid_paused: rng.gen_bool(0.05),
    });

    let latest_temps = (1..=sim.channel_count)
        .map(|channel| LatestTemp {
            channel,
            temp: (rng.gen_range(180.0..260.0_f64) * 10.0).round() / 10.0,
            degree_type: 2,
        })
        .collect();

    Device {
        id: sim.id,
        uuid: sim.uuid.clone(),
        title: sim.title.clone(),
        hardware_id: format!("FB{:06}", sim.id),
        channel_count: sim.channel_count,
        model: "FBX2".to_string(),
        active: sim.active,
        degree_type: 1,
        latest_temps,
        last_drive_log,
        device_log: DeviceLog {
            link_quality,
            disk_usage: format!("{:.1}M/4.0M", rng.gen_range(0.2..3.8)),
            memory_usage: format!("{:.1}M/4.2M", rng.gen_range(1.0..4.0)),
            cpu_usage: format!("{}%", rng.gen_range(5..95)),
            ssid: sim.ssid.clone(),
            signal_level: rng.gen_range(-85..-30),
            // 2% of devices report a nearly flat battery.
            battery_percent: if rng.gen_bool(0.02) {
                rng.gen_range(0.0..0.2)
            } else {
                rng.gen_range(0.2..1.0)
            },
            onboard_temperature: rng.gen_range(20.0..45.0),
            version: "2.1.4".to_string(),
            model: "FBX2".to_string(),
        },
    }
}

/// Smoker temperatures in Fahrenheit, drifting around a 225F setpoint.
fn temperature_walk(rng: &mut impl Rng, len: usize) -> Vec<f64> {
    let mut value = rng.gen_range(200.0..250.0);
    (0..len)
        .map(|_| {
            value += rng.gen_range(-1.5..1.5);
            (value * 10.0_f64).round() / 10.0
        })
        .collect()
}
