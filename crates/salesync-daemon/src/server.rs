//! Inbound webhook endpoint
//!
//! | Route            | Response                                              |
//! |------------------|-------------------------------------------------------|
//! | `POST /webhooks` | 200 `{"metrics_changed": bool}`, 400 bad request, 500 |
//! | `GET /health`    | 200 `{"status": "ok"}`                                |
//!
//! A 500 tells the platform the event was not applied so it redelivers.
//! The event type is read from the `X-Event-Type` header, falling back to
//! the payload's `event` (or `type`) field.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use salesync_core::config::WebhookConfig;
use salesync_sync::WebhookProcessor;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const EVENT_TYPE_HEADER: &str = "x-event-type";

/// HTTP server feeding inbound events to a [`WebhookProcessor`]
pub struct WebhookServer {
    processor: Arc<WebhookProcessor>,
    addr: SocketAddr,
    max_body_bytes: usize,
}

impl WebhookServer {
    pub fn new(processor: Arc<WebhookProcessor>, config: &WebhookConfig) -> anyhow::Result<Self> {
        let addr: SocketAddr = config
            .bind
            .parse()
            .with_context(|| format!("Invalid webhook bind address {:?}", config.bind))?;
        Ok(Self {
            processor,
            addr,
            max_body_bytes: config.max_body_bytes,
        })
    }

    /// Accepts connections until `shutdown` is cancelled
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.addr))?;
        self.serve(listener, shutdown).await
    }

    /// Serves on an already bound listener
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        info!(addr = %listener.local_addr()?, "Webhook server listening");

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, peer) = match result {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!(error = %e, "Failed to accept connection");
                            continue;
                        }
                    };
                    let io = TokioIo::new(stream);
                    let processor = Arc::clone(&self.processor);
                    let max_body = self.max_body_bytes;

                    tokio::spawn(async move {
                        let service = service_fn(move |req| {
                            let processor = Arc::clone(&processor);
                            async move { handle_request(req, &processor, max_body).await }
                        });

                        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                            debug!(%peer, error = %e, "Webhook connection error");
                        }
                    });
                }
                _ = shutdown.cancelled() => {
                    info!("Webhook server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

async fn handle_request(
    req: Request<Incoming>,
    processor: &WebhookProcessor,
    max_body: usize,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();

    let body = match Limited::new(body, max_body).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(error = %e, limit = max_body, "Rejecting webhook body");
            return Ok(json_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                json!({"error": "request body too large or unreadable"}),
            ));
        }
    };

    Ok(respond(&parts.method, parts.uri.path(), &parts.headers, &body, processor).await)
}

/// Routes one fully read request
pub async fn respond(
    method: &Method,
    path: &str,
    headers: &HeaderMap,
    body: &[u8],
    processor: &WebhookProcessor,
) -> Response<Full<Bytes>> {
    match (method, path.trim_end_matches('/')) {
        (&Method::GET, "/health") => json_response(StatusCode::OK, json!({"status": "ok"})),
        (&Method::POST, "/webhooks") => deliver(headers, body, processor).await,
        (_, "/webhooks") | (_, "/health") => json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            json!({"error": "method not allowed"}),
        ),
        _ => json_response(StatusCode::NOT_FOUND, json!({"error": "not found"})),
    }
}

async fn deliver(
    headers: &HeaderMap,
    body: &[u8],
    processor: &WebhookProcessor,
) -> Response<Full<Bytes>> {
    let payload: Value = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Webhook body is not JSON");
            return json_response(
                StatusCode::BAD_REQUEST,
                json!({"error": format!("invalid JSON: {e}")}),
            );
        }
    };

    let Some(event_type) = event_type(headers, &payload) else {
        return json_response(
            StatusCode::BAD_REQUEST,
            json!({"error": "missing event type"}),
        );
    };

    let raw = String::from_utf8_lossy(body);
    match processor.process(&event_type, &payload, &raw).await {
        Ok(outcome) => {
            info!(
                event_type = %event_type,
                entity = ?outcome.entity,
                entity_id = outcome.entity_id.as_deref(),
                metrics_changed = outcome.metrics_changed,
                "Webhook applied"
            );
            json_response(
                StatusCode::OK,
                json!({"metrics_changed": outcome.metrics_changed}),
            )
        }
        Err(e) => {
            error!(event_type = %event_type, error = %e, "Webhook processing failed");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": e.to_string()}),
            )
        }
    }
}

/// Event type from the header, else from the payload
pub fn event_type(headers: &HeaderMap, payload: &Value) -> Option<String> {
    headers
        .get(EVENT_TYPE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| {
            ["event", "type", "event_type"]
                .iter()
                .find_map(|key| payload.get(key).and_then(Value::as_str))
                .map(str::to_string)
        })
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn json_response(status: StatusCode, body: Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
