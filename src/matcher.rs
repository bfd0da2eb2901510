//! Path pattern matching.
//!
//! Compiles declarative path patterns such as `/order/:orderId` into a list of
//! segment descriptors and extracts parameter values from request paths.

use crate::error::PatternError;
use std::collections::HashMap;

/// Marks a pattern segment as a named capture.
pub const PARAM_PREFIX: char = ':';

/// A compiled path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    source: String,
    segments: Vec<PatternSegment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternSegment {
    Literal(String),
    Param(String),
}

impl PathPattern {
    /// Compile a pattern, rejecting unnamed or repeated parameters.
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        let mut segments = Vec::new();

        for raw in pattern.split('/') {
            match raw.strip_prefix(PARAM_PREFIX) {
                Some("") => {
                    return Err(PatternError::EmptyParameterName {
                        pattern: pattern.to_string(),
                    });
                }
                Some(name) => {
                    let duplicate = segments
                        .iter()
                        .any(|s| matches!(s, PatternSegment::Param(existing) if existing == name));
                    if duplicate {
                        return Err(PatternError::DuplicateParameter {
                            pattern: pattern.to_string(),
                            name: name.to_string(),
                        });
                    }
                    segments.push(PatternSegment::Param(name.to_string()));
                }
                None => segments.push(PatternSegment::Literal(raw.to_string())),
            }
        }

        Ok(Self {
            source: pattern.to_string(),
            segments,
        })
    }

    /// The pattern text this matcher was compiled from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Names of the parameters in declaration order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            PatternSegment::Param(name) => Some(name.as_str()),
            PatternSegment::Literal(_) => None,
        })
    }

    /// Match a request path, returning the captured parameters on success.
    ///
    /// Each parameter binds exactly one non-empty segment and the whole path
    /// must be consumed.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let mut params = HashMap::new();
        let mut parts = path.split('/');

        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                PatternSegment::Literal(lit) => {
                    if part != lit {
                        return None;
                    }
                }
                PatternSegment::Param(name) => {
                    if part.is_empty() {
                        return None;
                    }
                    params.insert(name.clone(), part.to_string());
                }
            }
        }

        // Must consume entire path
        if parts.next().is_some() {
            return None;
        }

        Some(params)
    }

    /// Match a request path in `(matched, params)` form; params are empty on failure.
    pub fn match_path(&self, path: &str) -> (bool, HashMap<String, String>) {
        match self.matches(path) {
            Some(params) => (true, params),
            None => (false, HashMap::new()),
        }
    }
}

/// Parse a query string into key-value pairs. Later duplicates win.
pub fn parse_query_string(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    for part in query.split('&') {
        if part.is_empty() {
            continue;
        }
        let (key, value) = part.split_once('=').unwrap_or((part, ""));
        params.insert(decode_component(key), decode_component(value));
    }

    params
}

fn decode_component(s: &str) -> String {
    let spaced = s.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}
