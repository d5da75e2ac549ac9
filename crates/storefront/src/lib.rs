//! Sole storefront library.
//!
//! Catalog, session cart with shared stock, the checkout state machine and
//! the order ledger, served as a JSON API. The binary wires this up against
//! `PostgreSQL` and Stripe; tests build the same router over in-memory stores.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod routes;
pub mod services;
pub mod state;

use axum::{Router, middleware::from_fn};
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tower_sessions::{SessionManagerLayer, SessionStore};
use tracing::Span;

use crate::db::RepositoryError;
use crate::state::AppState;

/// Build the storefront router with its middleware stack.
pub fn app<S>(state: AppState, sessions: SessionManagerLayer<S>) -> Router
where
    S: SessionStore + Clone,
{
    routes::routes()
        .layer(sessions)
        .layer(from_fn(middleware::request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        user_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

/// Seed the catalog and its mock reviews if they are empty.
///
/// # Errors
///
/// Propagates store failures.
pub async fn seed(state: &AppState) -> Result<(usize, usize), RepositoryError> {
    let products = state.catalog().seed_if_empty(&db::seed::catalog()).await?;
    let reviews = state.reviews().seed_if_empty(&db::seed::reviews()).await?;

    if products > 0 || reviews > 0 {
        tracing::info!(products, reviews, "Seeded catalog");
    }
    Ok((products, reviews))
}
