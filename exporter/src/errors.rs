use std::fmt;
use thiserror::Error;

/// Remote operations exposed by the Fireboard API.
///
/// `Display` renders the name used in the `func:` tag of error counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    Authenticate,
    DevicesList,
    DevicesGet,
    DevicesGetRealtimeTemperature,
    DevicesGetRealtimeDriveData,
    SessionsList,
    SessionsGet,
    SessionsGetChartData,
}

impl Call {
    pub fn name(&self) -> &'static str {
        match self {
            Call::Authenticate => "authenticate",
            Call::DevicesList => "devicesList",
            Call::DevicesGet => "devicesGet",
            Call::DevicesGetRealtimeTemperature => "devicesGetRealtimeTemperatureData",
            Call::DevicesGetRealtimeDriveData => "devicesGetRealtimeDeviceDriveData",
            Call::SessionsList => "sessionsList",
            Call::SessionsGet => "sessionsGet",
            Call::SessionsGetChartData => "sessionsGetChartData",
        }
    }

    /// The `func:<name>` tag attached to error counters for this call.
    pub fn tag(&self) -> String {
        format!("func:{}", self.name())
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("no valid token")]
    NoValidToken,

    #[error("token is expired, please renew")]
    ExpiredToken,

    #[error("rate limited response from {call}, please back off")]
    RateLimited { call: Call },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("credential rejected by {call}")]
    Unauthorized { call: Call },

    #[error("{call}{} failed{}: {message}", fmt_resource(.resource), fmt_status(.status))]
    Remote {
        call: Call,
        resource: Option<String>,
        status: Option<u16>,
        message: String,
    },

    #[error("unable to decode {call}{} response: {source}", fmt_resource(.resource))]
    Decode {
        call: Call,
        resource: Option<String>,
        #[source]
        source: serde_json::Error,
    },

    #[error("pass exceeded its deadline of {0:?}")]
    Timeout(std::time::Duration),

    #[error("configuration error: {0}")]
    Config(String),
}

fn fmt_resource(resource: &Option<String>) -> String {
    resource
        .as_ref()
        .map(|r| format!(" ({r})"))
        .unwrap_or_default()
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" with status {s}")).unwrap_or_default()
}

impl Error {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::RateLimited { .. })
    }

    /// True when the cached credential is missing, expired or was rejected,
    /// i.e. when renewing the token before the next pass is meaningful.
    pub fn needs_renewal(&self) -> bool {
        matches!(
            self,
            Error::NoValidToken | Error::ExpiredToken | Error::Unauthorized { .. }
        )
    }

    /// The remote operation this error originated from, if any.
    pub fn call(&self) -> Option<Call> {
        match self {
            Error::RateLimited { call }
            | Error::Unauthorized { call }
            | Error::Remote { call, .. }
            | Error::Decode { call, .. } => Some(*call),
            Error::Auth(_) => Some(Call::Authenticate),
            _ => None,
        }
    }

    /// The device UUID or session ID the failing call was about, if any.
    pub fn resource(&self) -> Option<&str> {
        match self {
            Error::Remote { resource, .. } | Error::Decode { resource, .. } => resource.as_deref(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
