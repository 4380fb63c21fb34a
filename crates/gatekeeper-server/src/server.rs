//! Gatekeeper HTTP server implementation.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use gatekeeper_config::GatekeeperConfig;
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::error::{ErrorResponse, ServerError, ServerResult};
use crate::service::DecisionService;
use crate::shutdown::ConnectionTracker;

/// Decision endpoint.
pub const IS_ALLOWED_PATH: &str = "/authz/v1/is-allowed";
/// Fact refresh trigger endpoint.
pub const GROUPS_UPDATE_PATH: &str = "/authz/v1/groups-update";
/// Liveness endpoint.
pub const STATUS_PATH: &str = "/status";

/// HTTP-level settings derived from configuration.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Address to bind.
    pub http_addr: String,
    /// Header carrying the caller's session token.
    pub session_header: String,
    /// How long to wait for open connections on shutdown.
    pub shutdown_timeout: Duration,
    /// Per-request handling budget.
    pub request_timeout: Duration,
}

impl HttpSettings {
    /// Extract HTTP settings from the service configuration.
    pub fn from_config(config: &GatekeeperConfig) -> Self {
        Self {
            http_addr: config.server.http_addr.clone(),
            session_header: config.auth.session_header.to_ascii_lowercase(),
            shutdown_timeout: Duration::from_secs(config.server.shutdown_timeout_secs),
            request_timeout: Duration::from_millis(config.server.request_timeout_ms),
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self::from_config(&GatekeeperConfig::default())
    }
}

#[derive(Debug, Serialize)]
struct StatusBody {
    status: &'static str,
    version: &'static str,
}

/// Gatekeeper HTTP server.
pub struct GatekeeperServer {
    service: Arc<DecisionService>,
    settings: Arc<HttpSettings>,
    connections: ConnectionTracker,
}

impl GatekeeperServer {
    /// Create a new server around a decision service.
    pub fn new(service: Arc<DecisionService>, settings: HttpSettings) -> Self {
        Self {
            service,
            settings: Arc::new(settings),
            connections: ConnectionTracker::new(),
        }
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(self) -> ServerResult<()> {
        let addr: SocketAddr = self
            .settings
            .http_addr
            .parse()
            .map_err(|e| ServerError::server(format!("invalid listen address: {e}")))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::server(format!("failed to bind {addr}: {e}")))?;

        self.serve(listener).await
    }

    /// Serve on an already-bound listener until shutdown.
    pub async fn serve(self, listener: TcpListener) -> ServerResult<()> {
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "gatekeeper listening");

        let shutdown = self.service.shutdown_signal().clone();

        loop {
            let (stream, peer_addr) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!(error = %e, "failed to accept connection");
                        continue;
                    }
                },
                () = shutdown.recv() => break,
            };

            let service = Arc::clone(&self.service);
            let settings = Arc::clone(&self.settings);
            let token = self.connections.acquire();
            let shutdown = shutdown.clone();

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let handler = service_fn(move |req| {
                    let service = Arc::clone(&service);
                    let settings = Arc::clone(&settings);
                    async move { handle_request(req, service, settings, peer_addr).await }
                });

                let conn = http1::Builder::new().serve_connection(io, handler);
                tokio::pin!(conn);

                let result = tokio::select! {
                    result = conn.as_mut() => result,
                    () = shutdown.recv() => {
                        conn.as_mut().graceful_shutdown();
                        conn.as_mut().await
                    }
                };
                if let Err(e) = result {
                    debug!(error = %e, peer = %peer_addr, "connection error");
                }
                drop(token);
            });
        }

        info!(
            active = self.connections.active_connections(),
            "stopped accepting, draining connections"
        );
        if tokio::time::timeout(
            self.settings.shutdown_timeout,
            self.connections.wait_for_shutdown(),
        )
        .await
        .is_err()
        {
            warn!(
                active = self.connections.active_connections(),
                "shutdown timeout elapsed with open connections"
            );
        }

        Ok(())
    }
}

async fn handle_request(
    req: Request<Incoming>,
    service: Arc<DecisionService>,
    settings: Arc<HttpSettings>,
    peer_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %path,
        peer = %peer_addr,
    );

    async move {
        let response = match tokio::time::timeout(
            settings.request_timeout,
            route(req, &service, &settings.session_header, &request_id),
        )
        .await
        {
            Ok(response) => response,
            Err(_) => {
                warn!("request timed out");
                text_response(StatusCode::SERVICE_UNAVAILABLE, "Request Timeout")
            }
        };

        let status = response.status();
        metrics::counter!(
            "gatekeeper_http_requests_total",
            "status" => status.as_u16().to_string()
        )
        .increment(1);
        info!(
            status = status.as_u16(),
            duration_ms = %start.elapsed().as_millis(),
            "request completed"
        );

        Ok(with_request_id(response, &request_id))
    }
    .instrument(span)
    .await
}

async fn route(
    req: Request<Incoming>,
    service: &DecisionService,
    session_header: &str,
    request_id: &str,
) -> Response<Full<Bytes>> {
    let token = req
        .headers()
        .get(session_header)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match (&method, path.as_str()) {
        (&Method::PUT, IS_ALLOWED_PATH) => {
            let body = match req.into_body().collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    warn!(error = %e, "failed to read request body");
                    return text_response(StatusCode::BAD_REQUEST, "Bad Request");
                }
            };

            match service.evaluate_access(&token, &body) {
                Ok(result) => {
                    let status = if result.allow {
                        StatusCode::OK
                    } else {
                        StatusCode::UNAUTHORIZED
                    };
                    json_response(status, &result)
                }
                Err(e) => error_response(&ServerError::from(e), request_id),
            }
        }
        (&Method::POST, GROUPS_UPDATE_PATH) => match service.request_groups_refresh(&token) {
            Ok(_handle) => text_response(StatusCode::ACCEPTED, "Accepted"),
            Err(e) => error_response(&ServerError::from(e), request_id),
        },
        (&Method::GET, STATUS_PATH) => json_response(
            StatusCode::OK,
            &StatusBody {
                status: "OK",
                version: crate::VERSION,
            },
        ),
        _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(body) {
        Ok(json) => build_response(status, "application/json", Bytes::from(json)),
        Err(e) => {
            error!(error = %e, "failed to serialize response");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

fn text_response(status: StatusCode, message: &'static str) -> Response<Full<Bytes>> {
    build_response(status, "text/plain; charset=utf-8", Bytes::from_static(message.as_bytes()))
}

fn error_response(err: &ServerError, request_id: &str) -> Response<Full<Bytes>> {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::FORBIDDEN);
    json_response(status, &ErrorResponse::from(err).with_request_id(request_id))
}

fn build_response(status: StatusCode, content_type: &'static str, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn with_request_id(mut response: Response<Full<Bytes>>, request_id: &str) -> Response<Full<Bytes>> {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeeper_authz::AuthzError;

    #[test]
    fn test_settings_from_config() {
        let mut config = GatekeeperConfig::default();
        config.auth.session_header = "X-Custom-Token".to_string();
        config.server.request_timeout_ms = 1500;

        let settings = HttpSettings::from_config(&config);
        assert_eq!(settings.session_header, "x-custom-token");
        assert_eq!(settings.request_timeout, Duration::from_millis(1500));
        assert_eq!(settings.http_addr, "0.0.0.0:9123");
    }

    #[test]
    fn test_error_response_status() {
        let response = error_response(&ServerError::from(AuthzError::Forbidden), "req-1");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = error_response(
            &ServerError::from(AuthzError::bad_request("missing field `request`")),
            "req-1",
        );
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_json_response() {
        let response = json_response(StatusCode::OK, &serde_json::json!({"allow": true}));

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_request_id_header() {
        let response = with_request_id(text_response(StatusCode::NOT_FOUND, "Not Found"), "abc");
        assert_eq!(response.headers().get("x-request-id").unwrap(), "abc");
    }
}
