use crate::errors::{Error, Result};
use crate::source::RemoteDataSource;
use chrono::{DateTime, Duration, Utc};
use std::sync::RwLock;
use tracing::{debug, info, warn};

/// How long a freshly issued token is trusted, in seconds.
pub const TOKEN_VALIDITY_SECS: i64 = 3600;

/// A bearer token and the instant it stops being usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub expiry: DateTime<Utc>,
}

/// In-memory cache for the API token.
///
/// Reads are frequent (every authenticated request) and writes rare
/// (renewal), hence the `RwLock`. Token and expiry live in one value so a
/// reader always sees a consistent pair.
#[derive(Debug, Default)]
pub struct TokenCache {
    current: RwLock<Option<Credential>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_current_token(&self) -> Result<String> {
        self.get_current_token_at(Utc::now())
    }

    /// Returns the cached token if it is still valid at `now`.
    pub fn get_current_token_at(&self, now: DateTime<Utc>) -> Result<String> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            None => Err(Error::NoValidToken),
            Some(credential) if credential.token.is_empty() => Err(Error::NoValidToken),
            Some(credential) if credential.expiry <= now => Err(Error::ExpiredToken),
            Some(credential) => Ok(credential.token.clone()),
        }
    }

    /// Replaces the cached credential. An empty token is ignored so a bad
    /// authentication response cannot wipe a good credential.
    pub fn store(&self, token: impl Into<String>, expiry: DateTime<Utc>) {
        let token = token.into();
        if token.is_empty() {
            debug!("Ignoring empty token");
            return;
        }
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(Credential { token, expiry });
    }

    /// Drops the cached credential, e.g. after the API rejected it.
    pub fn invalidate(&self) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|c| c.expiry)
    }

    /// Authenticates against `source` and caches the new token for
    /// [`TOKEN_VALIDITY_SECS`]. On failure the previous credential is kept.
    pub async fn renew<S>(
        &self,
        source: &S,
        username: &str,
        password: &str,
        timeout: std::time::Duration,
    ) -> Result<()>
    where
        S: RemoteDataSource + ?Sized,
    {
        let token = match source.authenticate(username, password, timeout).await {
            Ok(token) => token,
            Err(e) => {
                warn!("Token renewal failed: {}", e);
                return Err(e);
            }
        };
        if token.is_empty() {
            return Err(Error::Auth("authentication returned an empty token".to_string()));
        }

        let expiry = Utc::now() + Duration::seconds(TOKEN_VALIDITY_SECS);
        self.store(token, expiry);
        info!("Token renewed, valid until {}", expiry.to_rfc3339());
        Ok(())
    }
}
