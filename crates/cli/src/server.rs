use std::net::SocketAddr;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use strand_telemetry::{Handle, Telemetry};
use strand_web::{RequestHandle, instrument};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::info;

use crate::{error::CliError, settings::WebServerConfig};

// Orders above this total are declined by the fake payment step
const PAYMENT_LIMIT_CENTS: u64 = 100_000;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub user_id: u64,
    pub items: Vec<CheckoutItem>,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutItem {
    pub sku: String,
    pub quantity: u32,
    pub unit_price_cents: u64,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub total_cents: u64,
    pub status: &'static str,
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,
    #[error("payment of {0} cents declined")]
    PaymentDeclined(u64),
}

/// The demo service: every route runs inside the telemetry middleware.
pub fn router(telemetry: Telemetry, name: &str) -> Router {
    let routes = Router::new()
        .route("/health", get(health))
        .route("/checkout", post(checkout))
        .route("/panic", get(panic_handler));
    instrument(routes, telemetry, name)
}

pub async fn serve(config: &WebServerConfig, telemetry: Telemetry) -> Result<(), CliError> {
    let ip = config.host.parse().map_err(|e| {
        CliError::ServerError(format!("webserver.host {} is not an IP address: {}", config.host, e))
    })?;
    let listener = TcpListener::bind(SocketAddr::new(ip, config.port))
        .await
        .map_err(|e| CliError::ServerError(format!("Failed to bind webserver address: {}", e)))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| CliError::ServerError(e.to_string()))?;
    info!("Starting webserver on {}", local_addr);

    let app = router(telemetry, "http");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| CliError::ServerError(e.to_string()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn checkout(RequestHandle(log): RequestHandle, Json(request): Json<CheckoutRequest>) -> Response {
    let mut log = log.lock();
    log.with_field("user_id", request.user_id)
        .with_field("cart_size", request.items.len());

    let result = place_order(&log, &request);
    log.with_result(&result);

    match result {
        Ok(total_cents) => {
            log.info("checkout completed");
            (
                StatusCode::OK,
                Json(CheckoutResponse {
                    total_cents,
                    status: "paid",
                }),
            )
                .into_response()
        }
        Err(e) => {
            log.warn("checkout failed");
            (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

fn place_order(log: &Handle, request: &CheckoutRequest) -> Result<u64, CheckoutError> {
    if request.items.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    let total_cents = log.with_span("price_cart", |_| {
        request
            .items
            .iter()
            .map(|item| u64::from(item.quantity) * item.unit_price_cents)
            .sum::<u64>()
    });

    let mut payment = log.child("payment");
    payment
        .with_field("amount_cents", total_cents)
        .with_field("skus", request.items.iter().map(|i| i.sku.clone()).collect::<Vec<_>>());
    let timer = payment.start_timer("payment.authorize");

    if total_cents > PAYMENT_LIMIT_CENTS {
        let err = CheckoutError::PaymentDeclined(total_cents);
        payment.with_error(&err).error("payment declined");
        return Err(err);
    }

    timer.stop(&mut payment);
    payment.info("payment authorized");
    Ok(total_cents)
}

async fn panic_handler() -> &'static str {
    panic!("handler panicked on purpose")
}
