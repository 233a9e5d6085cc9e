//! Purpose: Provide the HTTP/JSON mock ledger server for ledgerbatch.
//! Exports: `ServeConfig`, `serve`.
//! Role: Axum-based loopback server exposing `POST /v1/batch` over an in-memory ledger.
//! Invariants: The response array has exactly one record per request item, in order.
//! Invariants: Whole-call failures use the `{"error":{kind,message,hint}}` envelope.
//! Invariants: Loopback-only unless explicitly allowed.

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{Value, json};
use std::future::IntoFuture;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use tokio::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::ledger::Ledger;
use ledgerbatch::api::{Error, ErrorKind};

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub token: Option<String>,
    pub max_batch_items: usize,
    pub max_body_bytes: u64,
    pub allow_non_loopback: bool,
}

struct AppState {
    ledger: Mutex<Ledger>,
    token: Option<String>,
    max_batch_items: usize,
}

pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    validate_config(&config)?;

    init_tracing();

    let max_body_bytes: usize = config
        .max_body_bytes
        .try_into()
        .map_err(|_| Error::new(ErrorKind::Usage).with_message("--max-body-bytes is too large"))?;

    let state = Arc::new(AppState {
        ledger: Mutex::new(Ledger::new()),
        token: config.token,
        max_batch_items: config.max_batch_items,
    });

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/batch", post(submit_batch))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Transport)
                .with_message("failed to bind server")
                .with_source(err)
        })?;
    info!(bind = %config.bind, "mock ledger listening");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| {
                Error::new(ErrorKind::Transport)
                    .with_message("server failed")
                    .with_source(err)
            })?;
        }
        _ = shutdown_signal() => {
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(Duration::from_secs(10), &mut server).await {
                Ok(result) => result.map_err(|err| {
                    Error::new(ErrorKind::Transport)
                        .with_message("server failed")
                        .with_source(err)
                })?,
                Err(_) => {
                    return Err(Error::new(ErrorKind::Internal).with_message("server shutdown timed out"));
                }
            }
        }
    };
    Ok(())
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => addr.is_loopback(),
        IpAddr::V6(addr) => addr.is_loopback(),
    }
}

fn validate_config(config: &ServeConfig) -> Result<(), Error> {
    let is_loopback_bind = is_loopback(config.bind.ip());
    if !is_loopback_bind && !config.allow_non_loopback {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("non-loopback bind requires explicit opt-in")
            .with_hint("Re-run with --allow-non-loopback or use a loopback address."));
    }

    if !is_loopback_bind && config.token.is_none() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("non-loopback bind requires a bearer token")
            .with_hint("Use --token-file to protect the ledger."));
    }

    if config.max_batch_items == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-batch-items must be greater than zero")
            .with_hint("Use a positive value like 1000."));
    }

    if config.max_body_bytes == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-body-bytes must be greater than zero")
            .with_hint("Use a positive value like 1048576."));
    }

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}

fn authorize(headers: &HeaderMap, state: &AppState) -> Result<(), Error> {
    let Some(token) = state.token.as_ref() else {
        return Ok(());
    };
    let Some(value) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Err(Error::new(ErrorKind::Permission)
            .with_message("missing bearer token")
            .with_hint("Pass --token or --token-file to the client."));
    };
    let value = value.to_str().unwrap_or_default();
    let expected = format!("Bearer {token}");
    if value != expected {
        return Err(Error::new(ErrorKind::Permission).with_message("invalid bearer token"));
    }
    Ok(())
}

async fn healthz() -> Response {
    json_response(json!({ "ok": true }))
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

async fn submit_batch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    if let Err(err) = authorize(&headers, &state) {
        return error_response(err);
    }
    let items = match parse_batch(&body, state.max_batch_items) {
        Ok(items) => items,
        Err(err) => return error_response(err),
    };
    let outcomes = {
        let Ok(mut ledger) = state.ledger.lock() else {
            return error_response(
                Error::new(ErrorKind::Internal).with_message("ledger state is poisoned"),
            );
        };
        ledger.apply_batch(&items)
    };
    let failed = outcomes.iter().filter(|outcome| outcome.is_error()).count();
    info!(items = items.len(), failed, "applied batch");
    match serde_json::to_value(&outcomes) {
        Ok(payload) => json_response(payload),
        Err(err) => error_response(
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode batch response")
                .with_source(err),
        ),
    }
}

fn parse_batch(body: &str, max_batch_items: usize) -> Result<Vec<Value>, Error> {
    let value: Value = serde_json::from_str(body).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("batch body is not valid JSON")
            .with_source(err)
    })?;
    let Value::Array(items) = value else {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("batch body must be a JSON array")
            .with_hint("Send [{\"op\": ...}, ...]."));
    };
    if items.len() > max_batch_items {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!(
                "batch of {} items exceeds the limit of {max_batch_items}",
                items.len()
            ))
            .with_hint("Split the batch into smaller requests."));
    }
    Ok(items)
}

fn json_response(payload: Value) -> Response {
    let mut response = Json(payload).into_response();
    response
        .headers_mut()
        .insert("ledgerbatch-version", HeaderValue::from_static("1"));
    response
}

fn error_response(err: Error) -> Response {
    let status = match err.kind() {
        ErrorKind::Usage | ErrorKind::Encode => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Permission => StatusCode::UNAUTHORIZED,
        ErrorKind::OutOfRange => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Internal
        | ErrorKind::Protocol
        | ErrorKind::Transport
        | ErrorKind::Rejected => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!(error = %err, "batch request failed");
    }
    let body = ErrorEnvelope {
        error: ErrorBody {
            kind: format!("{:?}", err.kind()),
            message: err.message().unwrap_or("error").to_string(),
            hint: err.hint().map(str::to_string),
        },
    };
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert("ledgerbatch-version", HeaderValue::from_static("1"));
    response
}
