use std::{net::SocketAddr, time::Instant};

use async_graphql::http::GraphiQLSource;
use axum::{
    extract::{MatchedPath, State},
    http::{header, HeaderValue, Method, Request, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    graph::FinanceSchema,
    storage::{ExpenseReader, SharedStore},
};

/// Label used for requests that matched no route.
const UNMATCHED_ROUTE: &str = "unmatched";

/// Metric label for a request method; extension methods share one label.
fn method_label(method: &Method) -> &'static str {
    match *method {
        Method::GET => "GET",
        Method::POST => "POST",
        Method::OPTIONS => "OPTIONS",
        Method::HEAD => "HEAD",
        Method::PUT => "PUT",
        Method::DELETE => "DELETE",
        Method::PATCH => "PATCH",
        _ => "OTHER",
    }
}

#[derive(Clone)]
pub struct AppState {
    pub schema: FinanceSchema,
    pub store: SharedStore,
    pub metrics: Option<PrometheusHandle>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(graphiql))
        .route("/query", post(graphql_handler))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn(log_request))
        .layer(middleware::from_fn(cors))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let to_io = |e| std::io::Error::new(std::io::ErrorKind::Other, e);
    let server = axum::Server::try_bind(&addr).map_err(to_io)?;
    tracing::info!(%addr, "API listening");
    server
        .serve(router(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(to_io)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

async fn graphql_handler(
    State(state): State<AppState>,
    Json(request): Json<async_graphql::BatchRequest>,
) -> Json<async_graphql::BatchResponse> {
    Json(state.schema.execute_batch(request).await)
}

async fn graphiql() -> impl IntoResponse {
    Html(GraphiQLSource::build().endpoint("/query").finish())
}

async fn health(State(state): State<AppState>) -> Response {
    let store = state.store.clone();
    match tokio::task::spawn_blocking(move || store.ping()).await {
        Ok(Ok(())) => Json(json!({ "status": "ok" })).into_response(),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "error": e.to_string() })),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Health check task failed");
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "unavailable" }))).into_response()
        }
    }
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Open CORS for the single-page frontend: any origin, `POST` queries plus preflight.
pub async fn cors<B>(req: Request<B>, next: Next<B>) -> Response {
    let mut response = if req.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(req).await
    };

    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("OPTIONS, POST"));
    headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("Origin, Content-Type"));
    response
}

pub async fn log_request<B>(req: Request<B>, next: Next<B>) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map_or(UNMATCHED_ROUTE, |matched| matched.as_str())
        .to_string();
    let span = tracing::info_span!("request", id = %Uuid::new_v4(), %method, %path);

    async move {
        let started = Instant::now();
        let response = next.run(req).await;
        let elapsed = started.elapsed();

        tracing::info!(status = response.status().as_u16(), elapsed_ms = elapsed.as_millis() as u64, "Request handled");
        metrics::histogram!(
            "financeview_http_request_duration_seconds",
            elapsed.as_secs_f64(),
            "method" => method_label(&method),
            "path" => route
        );
        response
    }
    .instrument(span)
    .await
}
