mod fleet;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use clap::Parser;
use fleet::Fleet;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Stand-in for the Fireboard cloud API, serving a random fleet of devices
/// and sessions for local runs of the exporter.
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(version)]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "SIM_ADDR", default_value = "127.0.0.1:8000")]
    addr: String,

    /// Number of simulated devices
    #[arg(long, env = "DEVICES", default_value_t = 3)]
    devices: usize,

    /// Number of simulated sessions
    #[arg(long, env = "SESSIONS", default_value_t = 4)]
    sessions: usize,

    /// Accepted login
    #[arg(long, env = "FIREBOARD_USERNAME", default_value = "pit@example.com")]
    username: String,

    /// Accepted password
    #[arg(long, env = "FIREBOARD_PASSWORD", default_value = "secret")]
    password: String,

    /// Answer every Nth authenticated request with 429 (0 disables)
    #[arg(long, env = "RATE_LIMIT_EVERY", default_value_t = 0)]
    rate_limit_every: u64,

    /// Seed for the generated fleet
    #[arg(long, env = "SEED")]
    seed: Option<u64>,
}

struct AppState {
    fleet: Fleet,
    rng: Mutex<StdRng>,
    username: String,
    password: String,
    token: String,
    requests: AtomicU64,
    rate_limit_every: u64,
}

type SharedState = Arc<AppState>;

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let fleet = Fleet::generate(&mut rng, cli.devices, cli.sessions);

    info!("Starting Fireboard simulator");
    info!(
        "Devices: {}, Sessions: {}, Rate limit every: {}",
        cli.devices, cli.sessions, cli.rate_limit_every
    );

    let state = Arc::new(AppState {
        fleet,
        rng: Mutex::new(rng),
        username: cli.username,
        password: cli.password,
        token: Uuid::new_v4().simple().to_string(),
        requests: AtomicU64::new(0),
        rate_limit_every: cli.rate_limit_every,
    });

    let app = Router::new()
        .route("/api/rest-auth/login", post(login))
        .route("/api/v1/devices.json", get(list_devices))
        .route("/api/v1/devices/:id", get(get_device))
        .route("/api/v1/devices/:id/temps.json", get(get_device))
        .route("/api/v1/devices/:id/drivelog.json", get(get_device))
        .route("/api/v1/sessions.json", get(list_sessions))
        .route("/api/v1/sessions/:id", get(get_session))
        .route("/api/v1/sessions/:id/chart.json", get(get_chart))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&cli.addr).await?;
    info!("Simulator listening on {}", cli.addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("Shutting down");
    Ok(())
}

async fn login(State(state): State<SharedState>, Json(req): Json<LoginRequest>) -> Response {
    if req.username != state.username || req.password != state.password {
        warn!("Rejected login for {}", req.username);
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "non_field_errors": ["Unable to log in with provided credentials."] })),
        )
            .into_response();
    }
    info!("Issued token for {}", req.username);
    Json(serde_json::json!({ "key": state.token })).into_response()
}

/// Token check and simulated rate limiting shared by every API route.
fn guard(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let expected = format!("Token {}", state.token);
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    if !authorized {
        return Err((StatusCode::UNAUTHORIZED, "Invalid token.").into_response());
    }

    let count = state.requests.fetch_add(1, Ordering::Relaxed) + 1;
    if state.rate_limit_every > 0 && count % state.rate_limit_every == 0 {
        debug!("Rate limiting request {}", count);
        return Err((StatusCode::TOO_MANY_REQUESTS, "Request was throttled.").into_response());
    }
    Ok(())
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not found.").into_response()
}

/// `/devices/<uuid>.json` and `/sessions/<id>.json` arrive as one segment.
fn strip_json(segment: &str) -> &str {
    segment.strip_suffix(".json").unwrap_or(segment)
}

async fn list_devices(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    if let Err(response) = guard(&state, &headers) {
        return response;
    }
    let mut rng = state.rng.lock().unwrap_or_else(|e| e.into_inner());
    Json(state.fleet.devices(&mut *rng)).into_response()
}

async fn get_device(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = guard(&state, &headers) {
        return response;
    }
    let mut rng = state.rng.lock().unwrap_or_else(|e| e.into_inner());
    match state.fleet.device(&mut *rng, strip_json(&id)) {
        Some(device) => Json(device).into_response(),
        None => not_found(),
    }
}

async fn list_sessions(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    if let Err(response) = guard(&state, &headers) {
        return response;
    }
    Json(state.fleet.sessions(Utc::now())).into_response()
}

async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = guard(&state, &headers) {
        return response;
    }
    let session = strip_json(&id)
        .parse()
        .ok()
        .and_then(|id| state.fleet.session(id, Utc::now()));
    match session {
        Some(session) => Json(session).into_response(),
        None => not_found(),
    }
}

async fn get_chart(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = guard(&state, &headers) {
        return response;
    }
    let mut rng = state.rng.lock().unwrap_or_else(|e| e.into_inner());
    match state.fleet.chart(&mut *rng, id, Utc::now()) {
        Some(chart) => Json(chart).into_response(),
        None => not_found(),
    }
}
