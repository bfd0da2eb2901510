//! Token presence check for endpoints marked `requireAuth`.
//!
//! Only checks that a token was supplied; no signature or expiry validation.

use crate::template::format_timestamp;
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;

/// Query parameter accepted as a token fallback.
pub const TOKEN_QUERY_PARAM: &str = "token";

/// Where clients without a token are sent to sign up.
pub const REGISTER_PATH: &str = "/register";

/// Find the request token. The `Authorization` header wins over the query parameter.
pub fn extract_token<'a>(
    headers: &'a HashMap<String, String>,
    query: &'a HashMap<String, String>,
) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("authorization"))
        .map(|(_, v)| v.as_str())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            query
                .get(TOKEN_QUERY_PARAM)
                .map(String::as_str)
                .filter(|v| !v.is_empty())
        })
}

/// Body returned with a 401 when no token is present.
pub fn unauthorized_body() -> serde_json::Value {
    json!({
        "success": false,
        "error": "Unauthorized",
        "message": "Authentication token required: send an Authorization header or a token query parameter",
        "redirectTo": REGISTER_PATH,
        "timestamp": format_timestamp(Utc::now()),
    })
}
