//! HTTP transport.
//!
//! Accepts connections with hyper, converts requests for the dispatcher and
//! writes its outcomes back as JSON responses.

use crate::access_log::{AccessLog, AccessRecord};
use crate::dispatcher::{Dispatcher, MockRequest, MockResponse};
use crate::error::DispatchError;
use crate::matcher::parse_query_string;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{
    HeaderName, HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

const CORS_ALLOW_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, OPTIONS";
const CORS_ALLOW_HEADERS: &str = "Authorization, Content-Type";

/// Pause after a failed accept so a persistent error (EMFILE) does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Transport settings resolved at startup.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Port reported on the server info page
    pub port: u16,
    /// Add CORS headers and answer preflight requests
    pub cors: bool,
}

/// HTTP front end for a [`Dispatcher`].
pub struct MockServer {
    dispatcher: Arc<Dispatcher>,
    access_log: AccessLog,
    options: ServerOptions,
}

impl MockServer {
    pub fn new(dispatcher: Arc<Dispatcher>, access_log: AccessLog, options: ServerOptions) -> Self {
        Self {
            dispatcher,
            access_log,
            options,
        }
    }

    /// Bind `addr` and serve until Ctrl-C.
    pub async fn run(self, addr: SocketAddr) -> Result<(), anyhow::Error> {
        let listener = TcpListener::bind(addr).await?;
        info!("Stub server listening on http://{}", listener.local_addr()?);

        self.serve_with_shutdown(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
        })
        .await
    }

    /// Serve connections from `listener` until `shutdown` completes.
    ///
    /// In-flight connections keep running on their own tasks.
    pub async fn serve_with_shutdown<F>(
        self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<(), anyhow::Error>
    where
        F: Future<Output = ()>,
    {
        let server = Arc::new(self);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, remote_addr) = match result {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            error!("Accept error: {}", e);
                            tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                            continue;
                        }
                    };
                    let io = TokioIo::new(stream);
                    let server = Arc::clone(&server);

                    tokio::spawn(async move {
                        let service = service_fn(move |req| {
                            let server = Arc::clone(&server);
                            async move { server.handle(req).await }
                        });

                        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                            debug!("Connection error from {}: {}", remote_addr, e);
                        }
                    });
                }
                _ = &mut shutdown => {
                    info!("Stub server shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// Handle one hyper request.
    pub async fn handle(
        &self,
        req: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, Infallible> {
        let started = Instant::now();
        let request = into_mock_request(req).await;
        let response = self.respond(&request).await;

        let record = AccessRecord::new(
            &request.method,
            &request.path,
            &request.query,
            response.status().as_u16(),
            started.elapsed(),
        );
        self.access_log.record(&record).await;

        Ok(response)
    }

    /// Produce the HTTP response for a transport-independent request.
    ///
    /// Preflight and the status page are answered here, only when no rule
    /// covers them, and never reach the dispatcher's counters.
    pub async fn respond(&self, request: &MockRequest) -> Response<Full<Bytes>> {
        let configured = self
            .dispatcher
            .find_match(&request.method, &request.path)
            .is_some();

        if !configured && self.options.cors && request.method.eq_ignore_ascii_case("OPTIONS") {
            return self.preflight_response();
        }

        let response = if !configured
            && request.method.eq_ignore_ascii_case("GET")
            && request.path == "/"
        {
            MockResponse {
                status: 200,
                headers: HashMap::new(),
                body: self.server_info(),
            }
        } else {
            self.dispatcher.handle(request).await.into_response()
        };

        match self.build_response(&response) {
            Ok(built) => built,
            Err(e) => {
                error!(
                    method = %request.method,
                    path = %request.path,
                    error = %e,
                    "Failed to build response"
                );
                self.internal_error_response(&e)
            }
        }
    }

    fn build_response(
        &self,
        response: &MockResponse,
    ) -> Result<Response<Full<Bytes>>, DispatchError> {
        let body = serde_json::to_vec(&response.body)?;

        let mut builder = Response::builder()
            .status(response.status)
            .header(CONTENT_TYPE, "application/json");
        if self.options.cors {
            builder = builder.header(ACCESS_CONTROL_ALLOW_ORIGIN, "*");
        }
        let mut built = builder.body(Full::new(Bytes::from(body)))?;

        // Configured headers override the defaults
        for (name, value) in &response.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    built.headers_mut().insert(name, value);
                }
                _ => warn!(header = %name, "Skipping invalid response header"),
            }
        }

        Ok(built)
    }

    fn preflight_response(&self) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(Bytes::new()));
        *response.status_mut() = StatusCode::NO_CONTENT;
        let headers = response.headers_mut();
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(CORS_ALLOW_METHODS),
        );
        headers.insert(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(CORS_ALLOW_HEADERS),
        );
        response
    }

    fn internal_error_response(&self, err: &DispatchError) -> Response<Full<Bytes>> {
        let body = json!({
            "error": "Internal server error",
            "message": err.to_string(),
        });
        let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if self.options.cors {
            response
                .headers_mut()
                .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        }
        response
    }

    /// Body of the `GET /` status page.
    fn server_info(&self) -> Value {
        let endpoints: Vec<String> = self
            .dispatcher
            .registry()
            .endpoints()
            .iter()
            .map(|e| format!("{} {}", e.method, e.pattern.as_str()))
            .collect();

        json!({
            "message": "HTTP Stub Server",
            "status": "running",
            "port": self.options.port,
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": endpoints,
        })
    }
}

/// Convert a hyper request, collecting its body.
async fn into_mock_request(req: Request<Incoming>) -> MockRequest {
    let method = req.method().clone();
    let uri = req.uri().clone();

    let headers: HashMap<String, String> = req
        .headers()
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
        .collect();

    let path = match urlencoding::decode(uri.path()) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => uri.path().to_string(),
    };
    let query = parse_query_string(uri.query().unwrap_or(""));

    let body = match req.into_body().collect().await {
        Ok(collected) => Some(collected.to_bytes()),
        Err(e) => {
            debug!(error = %e, "Failed to read request body");
            None
        }
    };

    MockRequest {
        method: method.as_str().to_string(),
        path,
        query,
        headers,
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MockServerConfig;
    use crate::registry::EndpointRegistry;

    fn server(json: &str, cors: bool) -> MockServer {
        let config = MockServerConfig::from_json_str(json).unwrap();
        let registry = EndpointRegistry::from_config(config).unwrap();
        MockServer::new(
            Arc::new(Dispatcher::new(Arc::new(registry))),
            AccessLog::disabled(),
            ServerOptions { port: 5600, cors },
        )
    }

    const CONFIG: &str = r#"{"endpoints": [
        {
            "method": "GET",
            "path": "/cart",
            "status": 200,
            "headers": { "X-Mock-Server": "stub", "Content-Type": "application/vnd.api+json" },
            "response": { "items": [] }
        },
        {
            "method": "DELETE",
            "path": "/cart/:itemId",
            "status": 202,
            "headers": { "Bad Header": "x" },
            "response": { "removed": "{{params.itemId}}" }
        }
    ]}"#;

    fn request(method: &str, path: &str) -> MockRequest {
        MockRequest {
            method: method.to_string(),
            path: path.to_string(),
            ..Default::default()
        }
    }

    async fn body_json(response: Response<Full<Bytes>>) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_configured_headers_override_defaults() {
        let server = server(CONFIG, true);
        let response = server.respond(&request("GET", "/cart")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-mock-server"], "stub");
        assert_eq!(response.headers()[CONTENT_TYPE], "application/vnd.api+json");
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn test_invalid_header_is_skipped() {
        let server = server(CONFIG, false);
        let response = server.respond(&request("DELETE", "/cart/42")).await;

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert!(response.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
        assert_eq!(body_json(response).await["removed"], "42");
    }

    #[tokio::test]
    async fn test_not_found_body() {
        let server = server(CONFIG, true);
        let response = server.respond(&request("POST", "/cart")).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["path"], "/cart");
        assert_eq!(body["method"], "POST");
        assert_eq!(body["error"], "Endpoint not found in current configuration");
    }

    #[tokio::test]
    async fn test_server_info_page() {
        let server = server(CONFIG, true);
        let response = server.respond(&request("GET", "/")).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "running");
        assert_eq!(body["port"], 5600);
        assert_eq!(body["endpoints"][0], "GET /cart");
        assert_eq!(body["endpoints"][1], "DELETE /cart/:itemId");
    }

    #[tokio::test]
    async fn test_root_rule_takes_precedence_over_info_page() {
        let server = server(
            r#"{"endpoints": [{"method": "GET", "path": "/", "status": 200, "response": {"home": true}}]}"#,
            true,
        );
        let body = body_json(server.respond(&request("GET", "/")).await).await;
        assert_eq!(body, json!({"home": true}));
    }

    #[tokio::test]
    async fn test_preflight() {
        let with_cors = server(CONFIG, true);
        let response = with_cors.respond(&request("OPTIONS", "/cart")).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_METHODS], CORS_ALLOW_METHODS);

        let without_cors = server(CONFIG, false);
        let response = without_cors.respond(&request("OPTIONS", "/cart")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_builtin_routes_are_not_counted_as_unmatched() {
        let server = server(CONFIG, true);
        server.respond(&request("GET", "/")).await;
        server.respond(&request("OPTIONS", "/cart")).await;

        assert_eq!(server.dispatcher.total_requests(), 0);
        assert_eq!(server.dispatcher.total_unmatched(), 0);

        server.respond(&request("GET", "/nope")).await;
        assert_eq!(server.dispatcher.total_unmatched(), 1);
    }

    #[test]
    fn test_accept_backoff_is_bounded() {
        assert!(ACCEPT_ERROR_BACKOFF > Duration::ZERO);
        assert!(ACCEPT_ERROR_BACKOFF <= Duration::from_secs(1));
    }

    #[test]
    fn test_internal_error_response() {
        let server = server(CONFIG, true);
        let err = DispatchError::Serialize(serde_json::from_str::<Value>("{").unwrap_err());
        let response = server.internal_error_response(&err);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
    }
}
