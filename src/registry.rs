//! Endpoint registry.
//!
//! Holds the configured endpoint rules with their compiled path patterns, in
//! declaration order. The registry is built once at startup and shared
//! read-only between request handlers.

use crate::config::{EndpointRule, GlobalSettings, MockServerConfig};
use crate::error::ConfigError;
use crate::matcher::PathPattern;
use std::path::Path;

/// An endpoint rule with its compiled path pattern.
#[derive(Debug, Clone)]
pub struct CompiledEndpoint {
    /// The configured rule
    pub rule: EndpointRule,
    /// Compiled path pattern
    pub pattern: PathPattern,
    /// Uppercased method used for comparison
    pub method: String,
}

/// Immutable, ordered list of endpoint rules.
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    endpoints: Vec<CompiledEndpoint>,
    port: Option<u16>,
    settings: GlobalSettings,
}

impl EndpointRegistry {
    /// Load and compile the registry from a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = MockServerConfig::from_file(path)?;
        Self::from_config(config)
    }

    /// Compile the registry from an already parsed configuration.
    pub fn from_config(config: MockServerConfig) -> Result<Self, ConfigError> {
        let endpoints = config
            .endpoints
            .into_iter()
            .enumerate()
            .map(|(index, rule)| {
                let pattern =
                    PathPattern::compile(&rule.path).map_err(|e| ConfigError::InvalidEndpoint {
                        index,
                        method: rule.method.clone(),
                        path: rule.path.clone(),
                        reason: e.to_string(),
                    })?;
                Ok(CompiledEndpoint {
                    method: rule.method.trim().to_uppercase(),
                    pattern,
                    rule,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            endpoints,
            port: config.port,
            settings: config.settings,
        })
    }

    /// Endpoints in declaration order.
    pub fn endpoints(&self) -> &[CompiledEndpoint] {
        &self.endpoints
    }

    /// Endpoints whose method matches, in declaration order.
    pub fn rules_for<'a>(&'a self, method: &str) -> impl Iterator<Item = &'a CompiledEndpoint> {
        let method = method.to_uppercase();
        self.endpoints.iter().filter(move |e| e.method == method)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Port named in the configuration, if any.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn settings(&self) -> &GlobalSettings {
        &self.settings
    }
}
