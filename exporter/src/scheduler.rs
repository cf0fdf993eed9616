use crate::collector::{Collector, PassReport};
use crate::errors::{Error, Result};
use crate::metrics::{
    LAST_PASS_SAMPLES, PASSES_TOTAL, PASS_DURATION_SECONDS, PASS_FAILURES_TOTAL,
    RATE_LIMITED_TOTAL, TOKEN_RENEWALS_TOTAL, TOKEN_RENEWAL_FAILURES_TOTAL,
};
use crate::source::RemoteDataSource;
use crate::token::TokenCache;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const MAX_BACKOFF_FACTOR: u32 = 16;

/// Account credentials used to renew the API token.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Schedule {
    pub interval: Duration,
    pub cutoff_lookback: chrono::Duration,
    pub pass_timeout: Duration,
}

/// Outcome of one scheduled pass, deciding how long to wait for the next.
#[derive(Debug, PartialEq, Eq)]
pub enum PassOutcome {
    Completed(PassReport),
    RateLimited,
    Failed,
}

/// Drives repeated collection passes, renewing the token and backing off
/// on rate limits between them.
pub struct Scheduler {
    collector: Collector,
    source: Arc<dyn RemoteDataSource>,
    tokens: Arc<TokenCache>,
    credentials: Credentials,
    schedule: Schedule,
}

impl Scheduler {
    pub fn new(
        collector: Collector,
        source: Arc<dyn RemoteDataSource>,
        tokens: Arc<TokenCache>,
        credentials: Credentials,
        schedule: Schedule,
    ) -> Self {
        Self {
            collector,
            source,
            tokens,
            credentials,
            schedule,
        }
    }

    /// Runs passes until `shutdown` is cancelled. A pass in flight is
    /// dropped as soon as cancellation is requested.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            "Starting scheduler, interval {:?}, lookback {} minutes",
            self.schedule.interval,
            self.schedule.cutoff_lookback.num_minutes()
        );
        let mut backoff_factor = 1u32;

        loop {
            let outcome = tokio::select! {
                _ = shutdown.cancelled() => break,
                outcome = self.run_pass() => outcome,
            };

            backoff_factor = match outcome {
                PassOutcome::RateLimited => (backoff_factor * 2).min(MAX_BACKOFF_FACTOR),
                _ => 1,
            };
            let wait = self.schedule.interval * backoff_factor;
            if backoff_factor > 1 {
                warn!("Rate limited, next pass in {:?}", wait);
            } else {
                debug!("Next pass in {:?}", wait);
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        info!("Scheduler stopped");
    }

    /// Runs a single pass, renewing the token first when needed.
    pub async fn run_pass(&self) -> PassOutcome {
        PASSES_TOTAL.inc();

        if let Err(e) = self.ensure_token().await {
            PASS_FAILURES_TOTAL.inc();
            return self.classify(e);
        }

        let cutoff = Utc::now() - self.schedule.cutoff_lookback;
        let start = Instant::now();
        let pass = tokio::time::timeout(self.schedule.pass_timeout, self.collector.collect(cutoff));
        let result = match pass.await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(self.schedule.pass_timeout)),
        };
        PASS_DURATION_SECONDS.observe(start.elapsed().as_secs_f64());

        match result {
            Ok(report) => {
                LAST_PASS_SAMPLES.set(report.samples_emitted as f64);
                if report.is_partial() {
                    warn!("Pass finished with {} failed resources", report.failures.len());
                }
                PassOutcome::Completed(report)
            }
            Err(e) => {
                PASS_FAILURES_TOTAL.inc();
                if e.needs_renewal() {
                    self.tokens.invalidate();
                }
                self.classify(e)
            }
        }
    }

    async fn ensure_token(&self) -> Result<()> {
        match self.tokens.get_current_token() {
            Ok(_) => Ok(()),
            Err(e) if e.needs_renewal() => {
                debug!("Renewing token: {}", e);
                let renewed = self
                    .tokens
                    .renew(
                        self.source.as_ref(),
                        &self.credentials.username,
                        &self.credentials.password,
                        self.collector.policy().request_timeout,
                    )
                    .await;
                if renewed.is_ok() {
                    TOKEN_RENEWALS_TOTAL.inc();
                } else {
                    TOKEN_RENEWAL_FAILURES_TOTAL.inc();
                }
                renewed
            }
            Err(e) => Err(e),
        }
    }

    fn classify(&self, e: Error) -> PassOutcome {
        if e.is_rate_limited() {
            RATE_LIMITED_TOTAL.inc();
            warn!("Pass aborted: {}", e);
            PassOutcome::RateLimited
        } else {
            error!("Pass failed: {}", e);
            PassOutcome::Failed
        }
    }
}
