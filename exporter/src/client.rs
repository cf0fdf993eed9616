use crate::errors::{Call, Error, Result};
use crate::model::{AuthRequest, AuthResponse, ChannelSeries, Device, SessionDetail, SessionSummary};
use crate::source::RemoteDataSource;
use crate::token::TokenCache;
use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://fireboard.io";

const AUTH_LOGIN_PATH: &str = "/api/rest-auth/login";
const CONTENT_TYPE: &str = "application/json";

/// HTTP client for the Fireboard cloud API.
///
/// Authenticated requests read the token from the shared [`TokenCache`];
/// the client never renews it on its own.
#[derive(Debug, Clone)]
pub struct FireboardClient {
    http: Client,
    base_url: String,
    tokens: Arc<TokenCache>,
}

impl FireboardClient {
    pub fn new(base_url: impl Into<String>, tokens: Arc<TokenCache>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("fireboard-exporter/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("unable to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.tokens.get_current_token()?;
        Ok(builder
            .header(header::ACCEPT, CONTENT_TYPE)
            .header(header::AUTHORIZATION, format!("Token {token}")))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        call: Call,
        resource: Option<String>,
        path: &str,
        timeout: Duration,
    ) -> Result<T> {
        let url = self.url(path);
        debug!("GET {}", url);
        let request = self.authorized(self.http.get(&url).timeout(timeout))?;
        let body = send(request, call, resource.as_deref(), true).await?;
        decode(&body, call, resource)
    }
}

/// Sends a request and maps the response status onto the error taxonomy.
async fn send(
    request: RequestBuilder,
    call: Call,
    resource: Option<&str>,
    authenticated: bool,
) -> Result<Vec<u8>> {
    let remote = |status: Option<u16>, message: String| Error::Remote {
        call,
        resource: resource.map(str::to_string),
        status,
        message,
    };

    let response = request
        .send()
        .await
        .map_err(|e| remote(None, e.to_string()))?;
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| remote(Some(status.as_u16()), e.to_string()))?;

    match status {
        StatusCode::TOO_MANY_REQUESTS => Err(Error::RateLimited { call }),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN if authenticated => {
            Err(Error::Unauthorized { call })
        }
        s if s.is_success() => Ok(body.to_vec()),
        s => Err(remote(
            Some(s.as_u16()),
            String::from_utf8_lossy(&body).trim().to_string(),
        )),
    }
}

fn decode<T: DeserializeOwned>(body: &[u8], call: Call, resource: Option<String>) -> Result<T> {
    serde_json::from_slice(body).map_err(|source| Error::Decode {
        call,
        resource,
        source,
    })
}

#[async_trait]
impl RemoteDataSource for FireboardClient {
    async fn authenticate(&self, username: &str, password: &str, timeout: Duration) -> Result<String> {
        let request = self
            .http
            .post(self.url(AUTH_LOGIN_PATH))
            .timeout(timeout)
            .header(header::ACCEPT, CONTENT_TYPE)
            .json(&AuthRequest { username, password });

        let body = match send(request, Call::Authenticate, None, false).await {
            Ok(body) => body,
            Err(Error::Remote { message, status, .. }) => {
                return Err(Error::Auth(match status {
                    Some(status) => format!("status {status}: {message}"),
                    None => message,
                }));
            }
            Err(e) => return Err(e),
        };
        let response: AuthResponse = decode(&body, Call::Authenticate, None)?;
        if response.key.is_empty() {
            return Err(Error::Auth("login response carried no key".to_string()));
        }
        Ok(response.key)
    }

    async fn list_devices(&self, timeout: Duration) -> Result<Vec<Device>> {
        self.get_json(Call::DevicesList, None, "/api/v1/devices.json", timeout)
            .await
    }

    async fn get_device(&self, uuid: &str, timeout: Duration) -> Result<Device> {
        let path = format!("/api/v1/devices/{uuid}.json");
        self.get_json(Call::DevicesGet, Some(uuid.to_string()), &path, timeout)
            .await
    }

    async fn get_device_realtime_temperature(&self, uuid: &str, timeout: Duration) -> Result<Device> {
        let path = format!("/api/v1/devices/{uuid}/temps.json");
        self.get_json(
            Call::DevicesGetRealtimeTemperature,
            Some(uuid.to_string()),
            &path,
            timeout,
        )
        .await
    }

    async fn get_device_realtime_drive(&self, uuid: &str, timeout: Duration) -> Result<Device> {
        let path = format!("/api/v1/devices/{uuid}/drivelog.json");
        self.get_json(
            Call::DevicesGetRealtimeDriveData,
            Some(uuid.to_string()),
            &path,
            timeout,
        )
        .await
    }

    async fn list_sessions(&self, timeout: Duration) -> Result<Vec<SessionSummary>> {
        self.get_json(Call::SessionsList, None, "/api/v1/sessions.json", timeout)
            .await
    }

    async fn get_session(&self, id: i64, timeout: Duration) -> Result<SessionDetail> {
        let path = format!("/api/v1/sessions/{id}.json?drive=1");
        self.get_json(Call::SessionsGet, Some(id.to_string()), &path, timeout)
            .await
    }

    async fn get_session_chart(&self, id: i64, timeout: Duration) -> Result<Vec<ChannelSeries>> {
        let path = format!("/api/v1/sessions/{id}/chart.json?drive=1");
        self.get_json(Call::SessionsGetChartData, Some(id.to_string()), &path, timeout)
            .await
    }
}
