use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use movers_core::dispatch::{DispatchOutcome, DispatchPhase, SendWindow};
use movers_core::domain::{AlertDigest, FilterCriteria, QuoteDetail};
use movers_core::pipeline::{CycleReport, CycleRequest, Pipeline};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = movers_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();
    settings.log_warnings();

    let pipeline = match Pipeline::from_settings(&settings) {
        Ok(p) => Arc::new(p),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "failed to build pipeline");
            return Err(e);
        }
    };

    // The timer and the HTTP "send now" trigger share one pipeline, so they share the daily gate.
    if settings.poll_enabled {
        let interval = Duration::from_secs(settings.poll_interval_secs);
        tokio::spawn(movers_core::pipeline::run_polling(
            pipeline.clone(),
            interval,
            shutdown_signal(),
        ));
    } else {
        tracing::info!("POLL_ENABLED=false; alerts are sent only via POST /dispatch");
    }

    let state = AppState { pipeline };
    let app = router(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/snapshots", get(get_snapshots))
        .route("/digest", get(get_digest))
        .route("/dispatch", post(post_dispatch))
        .route("/dispatch/state", get(get_dispatch_state))
        .route("/quotes/:symbol", get(get_quote))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
}

#[derive(Debug, Default, Deserialize)]
struct CycleParams {
    min_price: Option<Decimal>,
    max_price: Option<Decimal>,
    api_key: Option<String>,
}

impl CycleParams {
    fn apply(self, mut request: CycleRequest, defaults: FilterCriteria) -> CycleRequest {
        if self.min_price.is_some() || self.max_price.is_some() {
            request = request.with_criteria(FilterCriteria::new(
                self.min_price.unwrap_or(defaults.min_price),
                self.max_price.unwrap_or(defaults.max_price),
            ));
        }
        if let Some(key) = self.api_key {
            request = request.with_api_key(key);
        }
        request
    }
}

// Page refreshes are display-only: they never touch the daily gate.
async fn get_snapshots(
    State(state): State<AppState>,
    Query(params): Query<CycleParams>,
) -> Json<CycleReport> {
    let defaults = state.pipeline.options().criteria;
    let request = params.apply(CycleRequest::display(), defaults);
    Json(state.pipeline.run_cycle(request).await)
}

#[derive(Debug, Serialize)]
struct ApiDigest {
    digest: Option<AlertDigest>,
    text: Option<String>,
    diagnostics: Vec<String>,
}

async fn get_digest(
    State(state): State<AppState>,
    Query(params): Query<CycleParams>,
) -> Json<ApiDigest> {
    let defaults = state.pipeline.options().criteria;
    let request = params.apply(CycleRequest::display(), defaults);
    let report = state.pipeline.run_cycle(request).await;
    Json(ApiDigest {
        text: report.digest.as_ref().map(AlertDigest::render),
        digest: report.digest,
        diagnostics: report.diagnostics,
    })
}

async fn post_dispatch(
    State(state): State<AppState>,
    Query(params): Query<CycleParams>,
) -> (StatusCode, Json<CycleReport>) {
    let defaults = state.pipeline.options().criteria;
    let request = params.apply(CycleRequest::manual(), defaults);
    let report = state.pipeline.run_cycle(request).await;
    (dispatch_status(report.dispatch), Json(report))
}

fn dispatch_status(outcome: Option<DispatchOutcome>) -> StatusCode {
    match outcome {
        Some(DispatchOutcome::Sent { .. }) | None => StatusCode::OK,
        Some(DispatchOutcome::AlreadySent) => StatusCode::CONFLICT,
        // Manual dispatch skips the window check; kept for completeness.
        Some(DispatchOutcome::OutsideWindow) => StatusCode::CONFLICT,
        Some(DispatchOutcome::DeliveryFailed) => StatusCode::BAD_GATEWAY,
        Some(DispatchOutcome::Disabled) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[derive(Debug, Serialize)]
struct ApiDispatchState {
    last_sent_date: Option<NaiveDate>,
    phase: DispatchPhase,
    window: SendWindow,
    may_dispatch_now: bool,
}

async fn get_dispatch_state(State(state): State<AppState>) -> Json<ApiDispatchState> {
    let scheduler = state.pipeline.scheduler();
    let now = scheduler.now();
    let current = scheduler.state().await;
    Json(ApiDispatchState {
        last_sent_date: current.last_sent_date,
        phase: current.phase(now.date()),
        window: scheduler.window(),
        may_dispatch_now: scheduler.may_dispatch(now).await,
    })
}

#[derive(Debug, Default, Deserialize)]
struct QuoteParams {
    api_key: Option<String>,
}

async fn get_quote(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(params): Query<QuoteParams>,
) -> Result<Json<QuoteDetail>, StatusCode> {
    state
        .pipeline
        .lookup_quote(params.api_key.as_deref(), &symbol)
        .await
        .map_err(|e| {
            tracing::warn!(%symbol, error = %format!("{e:#}"), "quote lookup failed");
            StatusCode::BAD_GATEWAY
        })?
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &movers_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
