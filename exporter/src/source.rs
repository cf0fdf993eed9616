use crate::errors::Result;
use crate::model::{ChannelSeries, Device, SessionDetail, SessionSummary};
use async_trait::async_trait;
use std::time::Duration;

/// The remote side of a collection pass.
///
/// Every call takes its own timeout, which implementations must apply to
/// the underlying request. Authenticated calls fail with
/// [`Error::NoValidToken`](crate::errors::Error::NoValidToken),
/// [`Error::ExpiredToken`](crate::errors::Error::ExpiredToken) or
/// [`Error::Unauthorized`](crate::errors::Error::Unauthorized) when the
/// credential is unusable, and with
/// [`Error::RateLimited`](crate::errors::Error::RateLimited) on HTTP 429.
#[async_trait]
pub trait RemoteDataSource: Send + Sync {
    /// Exchanges credentials for a fresh token.
    async fn authenticate(&self, username: &str, password: &str, timeout: Duration) -> Result<String>;

    async fn list_devices(&self, timeout: Duration) -> Result<Vec<Device>>;

    async fn get_device(&self, uuid: &str, timeout: Duration) -> Result<Device>;

    /// Current temperatures. Only meaningful for devices in an active session.
    async fn get_device_realtime_temperature(&self, uuid: &str, timeout: Duration) -> Result<Device>;

    /// Current drive data. Only meaningful for devices in an active session.
    async fn get_device_realtime_drive(&self, uuid: &str, timeout: Duration) -> Result<Device>;

    async fn list_sessions(&self, timeout: Duration) -> Result<Vec<SessionSummary>>;

    async fn get_session(&self, id: i64, timeout: Duration) -> Result<SessionDetail>;

    async fn get_session_chart(&self, id: i64, timeout: Duration) -> Result<Vec<ChannelSeries>>;
}
