use crate::collectors::TelemetryProvider;
use crate::config::Config;
use crate::control::{ControlAction, ServerController};
use crate::error::{apply_error_policy, ApiError, ErrorPolicy};
use crate::metrics::Metrics;
use crate::models::{ControlResult, HealthState, HealthStatus, StatsSnapshot, UptimeStats};
use crate::uptime::humanize_uptime;
use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, FromRequest, Request, State};
use axum::handler::HandlerWithoutStateExt;
use axum::http::header::{HeaderMap, HeaderName, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{serve, Json, Router};
use chrono::Utc;
use std::any::Any;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{self, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn, Level};

const HARDENING_HEADERS: [(&str, &str); 7] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("x-xss-protection", "0"),
    ("referrer-policy", "no-referrer"),
    ("x-dns-prefetch-control", "off"),
    ("x-download-options", "noopen"),
    ("x-permitted-cross-domain-policies", "none"),
];

#[derive(Clone)]
pub struct AppState {
    pub started_at: Instant,
    pub telemetry: Arc<dyn TelemetryProvider>,
    pub controller: Arc<dyn ServerController>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        telemetry: Arc<dyn TelemetryProvider>,
        controller: Arc<dyn ServerController>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            started_at: Instant::now(),
            telemetry,
            controller,
            metrics,
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub public_dir: PathBuf,
    pub body_limit_bytes: usize,
    pub error_policy: ErrorPolicy,
}

impl HttpOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            public_dir: cfg.public_dir.clone(),
            body_limit_bytes: cfg.body_limit_bytes,
            error_policy: ErrorPolicy::new(cfg.production),
        }
    }
}

pub fn build_router(state: AppState, options: &HttpOptions) -> Router {
    let policy = options.error_policy;
    let static_files = ServeDir::new(&options.public_dir)
        .append_index_html_on_directories(true)
        .call_fallback_on_method_not_allowed(true)
        .not_found_service(not_found.into_service());

    let router = Router::new()
        .route("/api/health", get(health).fallback(not_found))
        .route("/api/stats", get(stats).fallback(not_found))
        .route("/api/control/start", post(control_start).fallback(not_found))
        .route("/api/control/stop", post(control_stop).fallback(not_found))
        .route(
            "/api/control/restart",
            post(control_restart).fallback(not_found),
        )
        .route("/metrics", get(metrics_handler).fallback(not_found))
        .fallback_service(static_files)
        .layer(middleware::map_response_with_state(
            policy,
            apply_error_policy,
        ))
        .layer(DefaultBodyLimit::max(options.body_limit_bytes))
        .layer(CatchPanicLayer::custom(
            move |panic: Box<dyn Any + Send + 'static>| policy.panic_response(panic),
        ))
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            track_requests,
        ))
        .layer(CompressionLayer::new());

    // Preflights are answered by the CORS layer, so the headers go outside it.
    let router = router.layer(
        CorsLayer::new()
            .allow_origin(cors::Any)
            .allow_methods(cors::Any)
            .allow_headers(cors::Any),
    );

    with_hardening_headers(router)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(LatencyUnit::Millis),
                ),
        )
        .with_state(state)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every in-flight request finished inside the grace period.
    Drained,
    /// The grace period ran out and remaining connections were dropped.
    GraceElapsed,
}

/// Serves `app` until `shutdown` resolves, then stops accepting connections
/// and gives in-flight requests up to `grace` to finish. An error means the
/// server stopped on its own before `shutdown` fired.
pub async fn serve_until<F>(
    listener: TcpListener,
    app: Router,
    shutdown: F,
    grace: Duration,
) -> io::Result<ShutdownOutcome>
where
    F: Future<Output = ()> + Send,
{
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let mut server = tokio::spawn(async move {
        serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            })
            .await
    });

    tokio::select! {
        _ = shutdown => {}
        result = &mut server => {
            return Err(match result {
                Ok(Ok(())) => io::Error::other("HTTP server stopped unexpectedly"),
                Ok(Err(err)) => err,
                Err(err) => io::Error::other(err),
            });
        }
    }

    let _ = shutdown_tx.send(true);
    match tokio::time::timeout(grace, &mut server).await {
        Ok(Ok(result)) => result.map(|()| ShutdownOutcome::Drained),
        Ok(Err(err)) => Err(io::Error::other(err)),
        Err(_) => {
            warn!(
                grace = %humantime::format_duration(grace),
                "in-flight requests did not finish in time"
            );
            server.abort();
            Ok(ShutdownOutcome::GraceElapsed)
        }
    }
}

fn with_hardening_headers(router: Router<AppState>) -> Router<AppState> {
    HARDENING_HEADERS
        .iter()
        .fold(router, |router, &(name, value)| {
            router.layer(SetResponseHeaderLayer::overriding(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            ))
        })
}

async fn track_requests(
    State(metrics): State<Arc<Metrics>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let started = Instant::now();
    let response = next.run(request).await;
    metrics.observe_request(&method, response.status().as_u16(), started.elapsed());
    response
}

async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: HealthState::Ok,
        timestamp: Utc::now(),
        uptime: state.uptime().as_secs_f64(),
    })
}

async fn stats(State(state): State<AppState>) -> Result<Json<StatsSnapshot>, ApiError> {
    let sample = state.telemetry.sample().await?;
    Ok(Json(StatsSnapshot {
        cpu: sample.cpu,
        memory: sample.memory,
        disk: sample.disk,
        network: sample.network,
        uptime: UptimeStats {
            server: humanize_uptime(state.uptime().as_secs_f64()),
            system: humanize_uptime(sample.system_uptime_secs),
        },
    }))
}

async fn control_start(
    State(state): State<AppState>,
    request: ControlRequest,
) -> Result<Json<ControlResult>, ApiError> {
    run_control(&state, ControlAction::Start, request).await
}

async fn control_stop(
    State(state): State<AppState>,
    request: ControlRequest,
) -> Result<Json<ControlResult>, ApiError> {
    run_control(&state, ControlAction::Stop, request).await
}

async fn control_restart(
    State(state): State<AppState>,
    request: ControlRequest,
) -> Result<Json<ControlResult>, ApiError> {
    run_control(&state, ControlAction::Restart, request).await
}

async fn run_control(
    state: &AppState,
    action: ControlAction,
    request: ControlRequest,
) -> Result<Json<ControlResult>, ApiError> {
    debug!(%action, payload = ?request.payload, "control request accepted");
    state.controller.perform(action).await?;
    state.metrics.inc_control_action(action);
    info!(%action, "control action completed");

    Ok(Json(ControlResult {
        success: true,
        message: action.success_message().to_string(),
        timestamp: Utc::now(),
    }))
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    state.metrics.set_uptime(state.uptime());
    match state.metrics.encode_metrics() {
        Ok(encoded) => {
            let mut response = Response::new(Body::from(encoded));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {err}"),
        )
            .into_response(),
    }
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(uri.path().to_string())
}

/// Optional JSON body of a control request. Non-JSON content types are
/// accepted and ignored; a JSON body that fails to parse is rejected.
#[derive(Debug, Default)]
pub struct ControlRequest {
    pub payload: Option<serde_json::Value>,
}

#[async_trait]
impl<S> FromRequest<S> for ControlRequest
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = has_json_content_type(req.headers());
        let body = Bytes::from_request(req, state).await?;
        if !is_json || body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }

        serde_json::from_slice(&body)
            .map(|payload| Self {
                payload: Some(payload),
            })
            .map_err(|err| ApiError::MalformedBody(err.to_string()))
    }
}

fn has_json_content_type(headers: &HeaderMap) -> bool {
    let Some(value) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let essence = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}
