use axum::{routing::get, Router};
use fireboard_exporter::client::FireboardClient;
use fireboard_exporter::config::Config;
use fireboard_exporter::metrics::{self, PrometheusSink};
use fireboard_exporter::scheduler::{Credentials, Schedule, Scheduler};
use fireboard_exporter::{Collector, RemoteDataSource, TokenCache};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    info!("Starting Fireboard exporter");
    info!("API: {}", config.api_url);
    info!("HTTP server: {}", config.http_addr);
    info!(
        "Poll interval: {:?}, chart failure policy: {:?}",
        config.poll_interval, config.policy.chart_failures
    );
    info!("Base tags: [{}]", config.tags);

    // Initialize metrics
    metrics::init_metrics()?;

    let tokens = Arc::new(TokenCache::new());
    let client: Arc<dyn RemoteDataSource> =
        Arc::new(FireboardClient::new(config.api_url.clone(), Arc::clone(&tokens))?);
    let collector = Collector::new(
        Arc::clone(&client),
        Arc::new(PrometheusSink::global(&config.tags)?),
        config.tags.clone(),
        config.policy.clone(),
    );
    let scheduler = Scheduler::new(
        collector,
        client,
        tokens,
        Credentials {
            username: config.username.clone(),
            password: config.password.clone(),
        },
        Schedule {
            interval: config.poll_interval,
            cutoff_lookback: config.cutoff_lookback,
            pass_timeout: config.pass_timeout,
        },
    );

    let app = Router::new().route("/metrics", get(metrics_handler));
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!("HTTP server listening on {}", config.http_addr);

    let shutdown = CancellationToken::new();

    let server_shutdown = shutdown.clone();
    let mut server_handle = tokio::spawn(async move {
        let serve = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await });
        if let Err(e) = serve.await {
            error!("HTTP server error: {}", e);
        }
    });

    let scheduler_shutdown = shutdown.clone();
    let scheduler_handle = tokio::spawn(async move {
        scheduler.run(scheduler_shutdown).await;
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        _ = &mut server_handle => {
            error!("HTTP server terminated");
        }
    }

    shutdown.cancel();
    if let Err(e) = scheduler_handle.await {
        error!("Scheduler task failed: {}", e);
    }

    info!("Shutting down");
    Ok(())
}

async fn metrics_handler() -> String {
    metrics::gather_metrics()
}
