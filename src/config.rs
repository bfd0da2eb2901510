//! Configuration for the stub server.
//!
//! Defines endpoint rules, response templates, and global settings.

use crate::error::ConfigError;
use crate::matcher::PathPattern;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Port used when neither the CLI, the environment nor the config names one.
pub const DEFAULT_PORT: u16 = 5600;

/// Main configuration for the stub server.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MockServerConfig {
    /// Default listening port
    #[serde(default)]
    pub port: Option<u16>,

    /// Endpoint rules, in match order
    #[serde(default)]
    pub endpoints: Vec<EndpointRule>,

    /// Global settings
    #[serde(default)]
    pub settings: GlobalSettings,
}

impl MockServerConfig {
    /// Load configuration from a file.
    ///
    /// `.yaml` and `.yml` files are parsed as YAML, everything else as JSON.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
            .unwrap_or(false);

        if is_yaml {
            Self::from_yaml_str(&content)
        } else {
            Self::from_json_str(&content)
        }
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a YAML configuration document.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (index, endpoint) in self.endpoints.iter().enumerate() {
            endpoint
                .validate()
                .map_err(|reason| ConfigError::InvalidEndpoint {
                    index,
                    method: endpoint.method.clone(),
                    path: endpoint.path.clone(),
                    reason,
                })?;
        }
        Ok(())
    }
}

/// A single configured mock endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointRule {
    /// HTTP method, compared case-insensitively
    pub method: String,

    /// Path pattern; segments starting with `:` capture a parameter
    pub path: String,

    /// HTTP status code
    #[serde(default = "default_status")]
    pub status: u16,

    /// Simulated latency in milliseconds; fractions are honoured
    #[serde(default)]
    pub delay: f64,

    /// Response template
    #[serde(default)]
    pub response: serde_json::Value,

    /// Extra response headers
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Require a token in the Authorization header or `token` query parameter
    #[serde(default)]
    pub require_auth: bool,
}

fn default_status() -> u16 {
    200
}

impl EndpointRule {
    /// The configured delay, or `None` when the rule responds immediately.
    pub fn delay_duration(&self) -> Option<Duration> {
        (self.delay > 0.0).then(|| Duration::from_secs_f64(self.delay / 1000.0))
    }

    /// Validate the endpoint rule, returning a human readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.method.trim().is_empty() {
            return Err("method cannot be empty".to_string());
        }
        if !(100..=599).contains(&self.status) {
            return Err(format!("invalid status code: {}", self.status));
        }
        if !self.delay.is_finite() || self.delay < 0.0 {
            return Err(format!("invalid delay: {}", self.delay));
        }
        PathPattern::compile(&self.path).map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    /// Add permissive CORS headers and answer preflight requests
    #[serde(default = "default_true")]
    pub cors: bool,

    /// Log all matched endpoints
    #[serde(default = "default_true")]
    pub log_matches: bool,

    /// Log unmatched requests
    #[serde(default = "default_true")]
    pub log_unmatched: bool,

    /// Append one JSON line per request to this file
    #[serde(default)]
    pub access_log: Option<PathBuf>,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            cors: true,
            log_matches: true,
            log_unmatched: true,
            access_log: None,
        }
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_simple_endpoint() {
        let json = r#"
{
  "port": 5600,
  "endpoints": [
    {
      "method": "GET",
      "path": "/hello",
      "status": 200,
      "response": { "message": "Hello, World!" }
    }
  ]
}
"#;
        let config = MockServerConfig::from_json_str(json).unwrap();
        assert_eq!(config.port, Some(5600));
        assert_eq!(config.endpoints.len(), 1);
        assert_eq!(config.endpoints[0].path, "/hello");
        assert_eq!(config.endpoints[0].delay_duration(), None);
        assert!(config.endpoints[0].headers.is_empty());
        assert!(!config.endpoints[0].require_auth);
        assert_eq!(config.endpoints[0].response["message"], "Hello, World!");
    }

    #[test]
    fn test_parse_full_endpoint() {
        let json = r#"
{
  "endpoints": [
    {
      "method": "post",
      "path": "/order/place",
      "status": 201,
      "delay": 800,
      "requireAuth": true,
      "headers": { "X-Mock": "yes" },
      "response": { "orderId": "ORD{{randomId}}" }
    }
  ]
}
"#;
        let config = MockServerConfig::from_json_str(json).unwrap();
        let endpoint = &config.endpoints[0];
        assert_eq!(endpoint.status, 201);
        assert_eq!(endpoint.delay_duration(), Some(Duration::from_millis(800)));
        assert!(endpoint.require_auth);
        assert_eq!(endpoint.headers.get("X-Mock"), Some(&"yes".to_string()));
        assert_eq!(config.port, None);
    }

    #[test]
    fn test_parse_yaml_config() {
        let yaml = r#"
port: 8080
settings:
  cors: false
  accessLog: logs/requests.log
endpoints:
  - method: GET
    path: /order/:orderId
    status: 200
    response:
      id: "{{params.orderId}}"
"#;
        let config = MockServerConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.port, Some(8080));
        assert!(!config.settings.cors);
        assert_eq!(
            config.settings.access_log.as_deref(),
            Some(Path::new("logs/requests.log"))
        );
        assert_eq!(config.endpoints[0].path, "/order/:orderId");
    }

    #[test]
    fn test_default_settings() {
        let config = MockServerConfig::from_json_str(r#"{"endpoints": []}"#).unwrap();
        assert!(config.settings.cors);
        assert!(config.settings.log_matches);
        assert!(config.settings.log_unmatched);
        assert!(config.settings.access_log.is_none());
    }

    #[test]
    fn test_invalid_status_rejected() {
        let json = r#"{"endpoints": [{"method": "GET", "path": "/x", "status": 42}]}"#;
        let err = MockServerConfig::from_json_str(json).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint { index: 0, .. }));
        assert!(err.to_string().contains("invalid status code"));
    }

    #[test]
    fn test_fractional_delay_accepted() {
        let json = r#"{"endpoints": [{"method": "GET", "path": "/x", "delay": 1.5}]}"#;
        let config = MockServerConfig::from_json_str(json).unwrap();
        assert_eq!(
            config.endpoints[0].delay_duration(),
            Some(Duration::from_micros(1500))
        );
    }

    #[test]
    fn test_negative_delay_rejected() {
        let json = r#"{"endpoints": [{"method": "GET", "path": "/x", "delay": -5}]}"#;
        let err = MockServerConfig::from_json_str(json).unwrap_err();
        assert!(err.to_string().contains("invalid delay"));
    }

    #[test]
    fn test_duplicate_path_parameter_rejected() {
        let json = r#"{"endpoints": [
            {"method": "GET", "path": "/ok", "status": 200},
            {"method": "GET", "path": "/a/:id/b/:id", "status": 200}
        ]}"#;
        let err = MockServerConfig::from_json_str(json).unwrap_err();
        match err {
            ConfigError::InvalidEndpoint { index, reason, .. } => {
                assert_eq!(index, 1);
                assert!(reason.contains("'id'"));
            }
            other => panic!("Expected InvalidEndpoint, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_json_rejected() {
        let err = MockServerConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn test_from_file_picks_format_by_extension() {
        let mut json_file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            json_file,
            r#"{{"endpoints": [{{"method": "GET", "path": "/a", "status": 200}}]}}"#
        )
        .unwrap();
        let config = MockServerConfig::from_file(json_file.path()).unwrap();
        assert_eq!(config.endpoints.len(), 1);

        let mut yaml_file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        write!(
            yaml_file,
            "endpoints:\n  - method: GET\n    path: /b\n    status: 204\n"
        )
        .unwrap();
        let config = MockServerConfig::from_file(yaml_file.path()).unwrap();
        assert_eq!(config.endpoints[0].status, 204);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = MockServerConfig::from_file(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
