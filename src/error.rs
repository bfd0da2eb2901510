//! Error types for configuration loading, pattern compilation and dispatch.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while compiling a path pattern.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("path parameter '{name}' appears more than once in '{pattern}'")]
    DuplicateParameter { pattern: String, name: String },

    #[error("path parameter without a name in '{pattern}'")]
    EmptyParameterName { pattern: String },
}

/// Errors that prevent the server from starting.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("endpoint {index} ({method} {path}): {reason}")]
    InvalidEndpoint {
        index: usize,
        method: String,
        path: String,
        reason: String,
    },
}

/// Errors produced while turning a matched endpoint into an HTTP response.
///
/// These surface to clients as a 500 JSON body and never take the server down.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to serialize response body: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to build response: {0}")]
    Response(#[from] hyper::http::Error),
}
