//! Request telemetry middleware.
//! One server span, one request-count increment and one correlated
//! `tracing` span per request.

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::Request,
    middleware::Next,
    response::Response,
};
use tracing::Instrument;

use crate::http::server::AppState;
use crate::observability::metrics;
use crate::telemetry::record::SpanStatus;

pub async fn request_telemetry(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string());
    let target = route
        .clone()
        .unwrap_or_else(|| request.uri().path().to_string());

    let mut span = state.tracer.start(format!("{} {}", method, target));
    span.set_attribute("http.method", method.clone());
    span.set_attribute("http.target", request.uri().path().to_string());
    if let Some(route) = &route {
        span.set_attribute("http.route", route.clone());
    }

    let log_span = tracing::info_span!(
        "request",
        method = %method,
        path = %target,
        trace_id = %span.trace_id(),
        span_id = %span.span_id(),
    );

    if let Some(route) = &route {
        match state.registry.request_count() {
            Ok(counter) => counter.add(1, &[("endpoint", route), ("method", &method)]),
            Err(e) => tracing::warn!(error = %e, "Request counter unavailable"),
        }
    }

    let response = next.run(request).instrument(log_span).await;

    let status = response.status();
    span.set_attribute("http.status_code", status.as_u16().to_string());
    if status.is_server_error() {
        span.set_status(SpanStatus::Error(status.to_string()));
    } else {
        span.set_status(SpanStatus::Ok);
    }
    span.end();

    metrics::record_request(route.as_deref().unwrap_or("unmatched"), &method, status.as_u16());
    response
}
