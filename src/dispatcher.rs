//! Request dispatcher.
//!
//! Finds the first endpoint rule matching an incoming request, applies its
//! simulated latency, and renders its response template.

use crate::auth;
use crate::registry::{CompiledEndpoint, EndpointRegistry};
use crate::template::{TemplateContext, TemplateEngine};
use bytes::Bytes;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// An incoming request, detached from the transport.
#[derive(Debug, Clone, Default)]
pub struct MockRequest {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
}

/// A response ready to be written by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct MockResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Value,
}

/// Result of dispatching a request.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// A rule matched and its template was rendered
    Matched(MockResponse),
    /// A rule matched but requires a token the request did not carry
    Unauthorized(MockResponse),
    /// No rule matched method and path
    NotFound { method: String, path: String },
}

impl DispatchOutcome {
    /// HTTP status this outcome maps to.
    pub fn status(&self) -> u16 {
        match self {
            DispatchOutcome::Matched(response) | DispatchOutcome::Unauthorized(response) => {
                response.status
            }
            DispatchOutcome::NotFound { .. } => 404,
        }
    }

    /// Convert into a response, building the 404 body for unmatched requests.
    pub fn into_response(self) -> MockResponse {
        match self {
            DispatchOutcome::Matched(response) | DispatchOutcome::Unauthorized(response) => {
                response
            }
            DispatchOutcome::NotFound { method, path } => MockResponse {
                status: 404,
                headers: HashMap::new(),
                body: not_found_body(&method, &path),
            },
        }
    }
}

/// A matched endpoint with the parameters captured from the path.
#[derive(Debug)]
pub struct EndpointMatch<'a> {
    pub endpoint: &'a CompiledEndpoint,
    pub params: HashMap<String, String>,
}

/// Request dispatcher.
///
/// Shares the registry read-only; safe to use from many tasks at once.
pub struct Dispatcher {
    registry: Arc<EndpointRegistry>,
    template_engine: TemplateEngine,
    /// Total requests processed.
    requests_total: AtomicU64,
    /// Total requests matched to endpoints.
    requests_matched: AtomicU64,
    /// Total requests unmatched.
    requests_unmatched: AtomicU64,
}

impl Dispatcher {
    /// Create a dispatcher over the given registry.
    pub fn new(registry: Arc<EndpointRegistry>) -> Self {
        info!(
            endpoints = registry.len(),
            cors = registry.settings().cors,
            "Dispatcher initialized"
        );

        Self {
            registry,
            template_engine: TemplateEngine::new(),
            requests_total: AtomicU64::new(0),
            requests_matched: AtomicU64::new(0),
            requests_unmatched: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    /// Get total requests processed.
    pub fn total_requests(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    /// Get total requests matched.
    pub fn total_matched(&self) -> u64 {
        self.requests_matched.load(Ordering::Relaxed)
    }

    /// Get total requests unmatched.
    pub fn total_unmatched(&self) -> u64 {
        self.requests_unmatched.load(Ordering::Relaxed)
    }

    /// Find the first endpoint, in declaration order, matching method and path.
    pub fn find_match(&self, method: &str, path: &str) -> Option<EndpointMatch<'_>> {
        self.registry.rules_for(method).find_map(|endpoint| {
            endpoint
                .pattern
                .matches(path)
                .map(|params| EndpointMatch { endpoint, params })
        })
    }

    /// Dispatch a request.
    pub async fn handle(&self, request: &MockRequest) -> DispatchOutcome {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        let settings = self.registry.settings();
        let method = request.method.to_uppercase();

        let Some(found) = self.find_match(&method, &request.path) else {
            self.requests_unmatched.fetch_add(1, Ordering::Relaxed);
            if settings.log_unmatched {
                warn!(method = %method, path = %request.path, "No matching endpoint found");
            }
            return DispatchOutcome::NotFound {
                method,
                path: request.path.clone(),
            };
        };

        let rule = &found.endpoint.rule;

        if rule.require_auth && auth::extract_token(&request.headers, &request.query).is_none() {
            debug!(method = %method, path = %request.path, "Missing token for protected endpoint");
            return DispatchOutcome::Unauthorized(MockResponse {
                status: 401,
                headers: HashMap::new(),
                body: auth::unauthorized_body(),
            });
        }

        self.requests_matched.fetch_add(1, Ordering::Relaxed);
        if settings.log_matches {
            info!(
                method = %method,
                path = %request.path,
                pattern = %found.endpoint.pattern.as_str(),
                status = rule.status,
                "Request matched endpoint"
            );
        }

        if let Some(delay) = rule.delay_duration() {
            debug!(pattern = %rule.path, delay_ms = rule.delay, "Applying delay");
            tokio::time::sleep(delay).await;
        }

        let ctx = TemplateContext {
            query: request.query.clone(),
            body: parse_body(&method, request.body.as_deref()),
            params: found.params,
        };
        debug!(?ctx, "Rendering response template");

        DispatchOutcome::Matched(MockResponse {
            status: rule.status,
            headers: rule.headers.clone(),
            body: self.template_engine.render(&rule.response, &ctx),
        })
    }
}

/// Methods whose payload is parsed for `{{body.*}}` placeholders.
const BODY_METHODS: [&str; 3] = ["POST", "PUT", "PATCH"];

/// Parse a request payload into a JSON object.
///
/// Other methods, empty payloads, invalid JSON and non-object JSON all yield an
/// empty map.
pub fn parse_body(method: &str, body: Option<&[u8]>) -> Map<String, Value> {
    if !BODY_METHODS.iter().any(|m| m.eq_ignore_ascii_case(method)) {
        return Map::new();
    }

    let Some(bytes) = body.filter(|b| !b.is_empty()) else {
        return Map::new();
    };

    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            debug!("Request body is not a JSON object, using empty body");
            Map::new()
        }
        Err(e) => {
            debug!(error = %e, "Failed to parse request body, using empty body");
            Map::new()
        }
    }
}

/// Body returned when no endpoint matches.
pub fn not_found_body(method: &str, path: &str) -> Value {
    json!({
        "error": "Endpoint not found in current configuration",
        "path": path,
        "method": method,
    })
}
