//! One collection pass over the Fireboard account.
//!
//! A pass lists devices and sessions, pulls chart data for sessions that
//! ended after the caller's cutoff, and forwards everything to a
//! [`MetricsSink`]. The instant the pass starts is captured once and used
//! for every window comparison, so the same input always yields the same
//! emissions.

use crate::convert::{self, Conversion, DegreeUnit};
use crate::errors::{Call, Error, Result};
use crate::model::{ChannelSeries, Device, SessionSummary};
use crate::sink::{MetricDef, MetricKind, MetricsSink};
use crate::source::RemoteDataSource;
use crate::tags::TagSet;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const DEFAULT_STALENESS_WINDOW_SECS: i64 = 30 * 60;
pub const DEFAULT_ACTIVITY_WINDOW_SECS: i64 = 10 * 60;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

const SAMPLE_RATE: f64 = 1.0;

const DEVICE_GAUGE_LABELS: &[&str] = &["uuid", "ssid"];

const fn def(name: &'static str, kind: MetricKind, labels: &'static [&'static str]) -> MetricDef {
    MetricDef { name, kind, labels }
}

/// Every metric a pass emits, with the tag keys it carries. The device and
/// session totals are levels, not increments.
pub const COLLECTED_METRICS: &[MetricDef] = &[
    def("fireboard.devices", MetricKind::Gauge, &[]),
    def("fireboard.devices.errors", MetricKind::Counter, &["uuid", "func"]),
    def("fireboard.devices.active", MetricKind::Counter, &["uuid"]),
    def("fireboard.devices.link_quality", MetricKind::Gauge, DEVICE_GAUGE_LABELS),
    def("fireboard.devices.disk_usage", MetricKind::Gauge, DEVICE_GAUGE_LABELS),
    def("fireboard.devices.memory_usage", MetricKind::Gauge, DEVICE_GAUGE_LABELS),
    def("fireboard.devices.cpu_usage", MetricKind::Gauge, DEVICE_GAUGE_LABELS),
    def("fireboard.devices.battery_percent", MetricKind::Gauge, DEVICE_GAUGE_LABELS),
    def("fireboard.devices.signal_level", MetricKind::Gauge, DEVICE_GAUGE_LABELS),
    def("fireboard.devices.drive_percent", MetricKind::Gauge, &["uuid", "mode"]),
    def("fireboard.devices.drive_setpoint", MetricKind::Gauge, &["uuid", "mode"]),
    def("fireboard.devices.onboard_temperature", MetricKind::Gauge, &["uuid"]),
    def("fireboard.devices.channel_temperature", MetricKind::Gauge, &["uuid", "channel"]),
    def("fireboard.sessions", MetricKind::Gauge, &[]),
    def("fireboard.sessions.errors", MetricKind::Counter, &["sessionID", "func"]),
    def("fireboard.sessions.active", MetricKind::Counter, &["sessionID"]),
    def(
        "fireboard.sessions.channel",
        MetricKind::Gauge,
        &["sessionID", "channel", "device", "type"],
    ),
];

/// What a failing chart (or realtime device data) fetch does to the rest of the pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChartFailurePolicy {
    /// Abort the pass with the first error.
    #[default]
    FailFast,
    /// Record the error and carry on with the next resource.
    Isolate,
}

impl std::str::FromStr for ChartFailurePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail-fast" | "failfast" | "fail_fast" => Ok(ChartFailurePolicy::FailFast),
            "isolate" => Ok(ChartFailurePolicy::Isolate),
            other => Err(Error::Config(format!("unknown chart failure policy '{other}'"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CollectionPolicy {
    pub staleness_window: Duration,
    pub activity_window: Duration,
    pub request_timeout: std::time::Duration,
    pub chart_failures: ChartFailurePolicy,
    pub fetch_drive_data: bool,
    pub fetch_realtime_temperatures: bool,
}

impl Default for CollectionPolicy {
    fn default() -> Self {
        Self {
            staleness_window: Duration::seconds(DEFAULT_STALENESS_WINDOW_SECS),
            activity_window: Duration::seconds(DEFAULT_ACTIVITY_WINDOW_SECS),
            request_timeout: std::time::Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            chart_failures: ChartFailurePolicy::FailFast,
            fetch_drive_data: false,
            fetch_realtime_temperatures: false,
        }
    }
}

/// A resource whose fetch failed during an isolating pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFailure {
    pub call: Call,
    pub resource: String,
    pub message: String,
}

/// Totals for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub devices: usize,
    pub active_devices: usize,
    pub sessions: usize,
    pub active_sessions: usize,
    pub charts_fetched: usize,
    pub samples_emitted: usize,
    pub failures: Vec<ResourceFailure>,
}

impl PassReport {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

pub struct Collector {
    source: Arc<dyn RemoteDataSource>,
    sink: Arc<dyn MetricsSink>,
    tags: TagSet,
    policy: CollectionPolicy,
}

impl Collector {
    pub fn new(
        source: Arc<dyn RemoteDataSource>,
        sink: Arc<dyn MetricsSink>,
        tags: TagSet,
        policy: CollectionPolicy,
    ) -> Self {
        Self {
            source,
            sink,
            tags,
            policy,
        }
    }

    pub fn policy(&self) -> &CollectionPolicy {
        &self.policy
    }

    pub async fn collect(&self, cutoff: DateTime<Utc>) -> Result<PassReport> {
        self.collect_at(cutoff, Utc::now()).await
    }

    /// Runs a pass as if it started at `now`.
    pub async fn collect_at(&self, cutoff: DateTime<Utc>, now: DateTime<Utc>) -> Result<PassReport> {
        info!("Starting collection pass, cutoff {}", cutoff.to_rfc3339());
        let mut report = PassReport::default();

        self.collect_devices(&mut report).await?;
        self.collect_sessions(cutoff, now, &mut report).await?;

        info!(
            "Pass complete: {}/{} devices active, {}/{} sessions active, {} charts, {} samples, {} failures",
            report.active_devices,
            report.devices,
            report.active_sessions,
            report.sessions,
            report.charts_fetched,
            report.samples_emitted,
            report.failures.len()
        );
        Ok(report)
    }

    async fn collect_devices(&self, report: &mut PassReport) -> Result<()> {
        let timeout = self.policy.request_timeout;
        let devices = match self.source.list_devices(timeout).await {
            Ok(devices) => devices,
            Err(e) => {
                error!("Failed to list devices: {}", e);
                self.sink.incr(
                    "fireboard.devices.errors",
                    &self.tags.with(Call::DevicesList.tag()),
                    SAMPLE_RATE,
                );
                return Err(e);
            }
        };

        report.devices = devices.len();
        self.sink
            .count("fireboard.devices", devices.len() as i64, &self.tags, SAMPLE_RATE);

        for device in devices.iter().filter(|d| d.active) {
            report.active_devices += 1;
            self.emit_device(device);

            if self.policy.fetch_drive_data {
                if let Err(e) = self.collect_drive_data(device).await {
                    self.handle_resource_failure(
                        e,
                        Call::DevicesGetRealtimeDriveData,
                        &device.uuid,
                        report,
                    )?;
                }
            }

            if self.policy.fetch_realtime_temperatures {
                if let Err(e) = self.collect_realtime_temperatures(device).await {
                    self.handle_resource_failure(
                        e,
                        Call::DevicesGetRealtimeTemperature,
                        &device.uuid,
                        report,
                    )?;
                }
            }
        }
        Ok(())
    }

    fn emit_device(&self, device: &Device) {
        let uuid_tag = format!("uuid:{}", device.uuid);
        self.sink.incr(
            "fireboard.devices.active",
            &self.tags.with(uuid_tag.as_str()),
            SAMPLE_RATE,
        );

        let log = &device.device_log;
        let tags = self.tags.extend([uuid_tag, format!("ssid:{}", log.ssid)]);

        let usage: [(&str, &String, fn(&str) -> Option<f64>); 4] = [
            ("fireboard.devices.link_quality", &log.link_quality, convert::try_ratio_percent),
            ("fireboard.devices.disk_usage", &log.disk_usage, convert::try_ratio_percent),
            ("fireboard.devices.memory_usage", &log.memory_usage, convert::try_ratio_percent),
            ("fireboard.devices.cpu_usage", &log.cpu_usage, convert::try_percent),
        ];
        for (name, raw, parse) in usage {
            let value = parse(raw).unwrap_or_else(|| {
                warn!("Device {} reported malformed {} '{}', emitting 0", device.uuid, name, raw);
                0.0
            });
            self.sink.gauge(name, value, &tags, SAMPLE_RATE);
        }

        self.sink.gauge(
            "fireboard.devices.battery_percent",
            log.battery_percent,
            &tags,
            SAMPLE_RATE,
        );
        self.sink.gauge(
            "fireboard.devices.signal_level",
            log.signal_level as f64,
            &tags,
            SAMPLE_RATE,
        );
    }

    async fn collect_drive_data(&self, device: &Device) -> Result<()> {
        let uuid_tag = format!("uuid:{}", device.uuid);
        let realtime = match self
            .source
            .get_device_realtime_drive(&device.uuid, self.policy.request_timeout)
            .await
        {
            Ok(realtime) => realtime,
            Err(e) => {
                error!("Failed to fetch drive data for device {}: {}", device.uuid, e);
                self.sink.incr(
                    "fireboard.devices.errors",
                    &self
                        .tags
                        .extend([uuid_tag, Call::DevicesGetRealtimeDriveData.tag()]),
                    SAMPLE_RATE,
                );
                return Err(e);
            }
        };

        let drive = &realtime.last_drive_log;
        let tags = self.tags.extend([uuid_tag, format!("mode:{}", drive.mode_type)]);
        let set_point = Conversion::for_channel(true, DegreeUnit::from_degree_type(drive.degree_type))
            .apply(drive.set_point);

        self.sink.gauge(
            "fireboard.devices.drive_percent",
            drive.drive_percent * 100.0,
            &tags,
            SAMPLE_RATE,
        );
        self.sink
            .gauge("fireboard.devices.drive_setpoint", set_point, &tags, SAMPLE_RATE);
        Ok(())
    }

    async fn collect_realtime_temperatures(&self, device: &Device) -> Result<()> {
        let uuid_tag = format!("uuid:{}", device.uuid);
        let realtime = match self
            .source
            .get_device_realtime_temperature(&device.uuid, self.policy.request_timeout)
            .await
        {
            Ok(realtime) => realtime,
            Err(e) => {
                error!("Failed to fetch temperatures for device {}: {}", device.uuid, e);
                self.sink.incr(
                    "fireboard.devices.errors",
                    &self
                        .tags
                        .extend([uuid_tag, Call::DevicesGetRealtimeTemperature.tag()]),
                    SAMPLE_RATE,
                );
                return Err(e);
            }
        };

        let tags = self.tags.with(uuid_tag);
        let onboard = Conversion::for_channel(true, DegreeUnit::from_degree_type(realtime.degree_type))
            .apply(realtime.device_log.onboard_temperature);
        self.sink.gauge(
            "fireboard.devices.onboard_temperature",
            onboard,
            &tags,
            SAMPLE_RATE,
        );

        for reading in &realtime.latest_temps {
            let value = Conversion::for_channel(true, DegreeUnit::from_degree_type(reading.degree_type))
                .apply(reading.temp);
            self.sink.gauge(
                "fireboard.devices.channel_temperature",
                value,
                &tags.with(format!("channel:{}", reading.channel)),
                SAMPLE_RATE,
            );
        }
        Ok(())
    }

    async fn collect_sessions(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
        report: &mut PassReport,
    ) -> Result<()> {
        let sessions = match self.source.list_sessions(self.policy.request_timeout).await {
            Ok(sessions) => sessions,
            Err(e) => {
                error!("Failed to list sessions: {}", e);
                self.sink.incr(
                    "fireboard.sessions.errors",
                    &self.tags.with(Call::SessionsList.tag()),
                    SAMPLE_RATE,
                );
                return Err(e);
            }
        };

        report.sessions = sessions.len();
        self.sink
            .count("fireboard.sessions", sessions.len() as i64, &self.tags, SAMPLE_RATE);

        for session in &sessions {
            let session_tag = format!("sessionID:{}", session.id);

            if session.is_active(now, self.policy.activity_window) {
                report.active_sessions += 1;
                self.sink.incr(
                    "fireboard.sessions.active",
                    &self.tags.with(session_tag.as_str()),
                    SAMPLE_RATE,
                );
            }

            if !session.ends_after(cutoff) {
                debug!("Session {} ended before cutoff, skipping chart", session.id);
                continue;
            }

            match self.collect_chart(session, &session_tag, now).await {
                Ok(samples) => {
                    report.charts_fetched += 1;
                    report.samples_emitted += samples;
                }
                Err(e) => self.handle_resource_failure(
                    e,
                    Call::SessionsGetChartData,
                    &session.id.to_string(),
                    report,
                )?,
            }
        }
        Ok(())
    }

    /// Fetches and emits one session's chart, returning the number of
    /// samples emitted.
    async fn collect_chart(
        &self,
        session: &SessionSummary,
        session_tag: &str,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let chart = match self
            .source
            .get_session_chart(session.id, self.policy.request_timeout)
            .await
        {
            Ok(chart) => chart,
            Err(e) => {
                error!("Failed to fetch chart for session {}: {}", session.id, e);
                self.sink.incr(
                    "fireboard.sessions.errors",
                    &self
                        .tags
                        .extend([session_tag.to_string(), Call::SessionsGetChartData.tag()]),
                    SAMPLE_RATE,
                );
                return Err(e);
            }
        };

        let tags = self.tags.with(session_tag);
        Ok(chart
            .iter()
            .map(|channel| self.emit_channel(channel, &tags, now))
            .sum())
    }

    fn emit_channel(&self, channel: &ChannelSeries, session_tags: &TagSet, now: DateTime<Utc>) -> usize {
        if !channel.is_consistent() {
            warn!(
                "Channel {} of device {} has {} timestamps but {} values",
                channel.label,
                channel.device,
                channel.x.len(),
                channel.y.len()
            );
        }

        let kind = channel.kind();
        let conversion = Conversion::for_channel(
            kind.is_temperature(),
            DegreeUnit::from_degree_type(channel.degree_type),
        );
        let tags = session_tags.extend([
            format!("channel:{}", channel.label),
            format!("device:{}", channel.device),
            format!("type:{}", kind.name()),
        ]);
        let oldest = (now - self.policy.staleness_window).timestamp();

        let mut emitted = 0;
        for (timestamp, value) in channel.samples() {
            if timestamp <= oldest {
                continue;
            }
            self.sink.gauge(
                "fireboard.sessions.channel",
                conversion.apply(value),
                &tags,
                SAMPLE_RATE,
            );
            emitted += 1;
        }
        emitted
    }

    /// Applies the failure policy to a per-resource error: propagate it, or
    /// note it in the report and continue.
    /// Rate limiting and credential errors would hit every following call
    /// as well, so they abort the pass under either policy.
    fn handle_resource_failure(
        &self,
        e: Error,
        call: Call,
        resource: &str,
        report: &mut PassReport,
    ) -> Result<()> {
        match self.policy.chart_failures {
            ChartFailurePolicy::FailFast => Err(e),
            ChartFailurePolicy::Isolate if e.is_rate_limited() || e.needs_renewal() => Err(e),
            ChartFailurePolicy::Isolate => {
                warn!("Continuing pass after {} failure for {}", call, resource);
                report.failures.push(ResourceFailure {
                    call,
                    resource: resource.to_string(),
                    message: e.to_string(),
                });
                Ok(())
            }
        }
    }
}
