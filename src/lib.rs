//! HTTP Stub Server
//!
//! A configuration-driven mock API server. Requests are matched against an
//! ordered list of endpoint rules and answered with templated JSON responses,
//! without touching a real database or business logic.
//!
//! # Features
//!
//! - **Path Parameters**: Patterns like `/order/:orderId` capture one segment each
//! - **First Match Wins**: Rules are tried in declaration order
//! - **Dynamic Templates**: `{{timestamp}}`, `{{randomId}}`, `{{query.*}}`,
//!   `{{body.*}}` and `{{params.*}}` placeholders in response strings
//! - **Latency Simulation**: Per-endpoint delays that never block other requests
//! - **Token Gate**: Optional presence-only token check per endpoint
//!
//! # Example Configuration
//!
//! ```json
//! {
//!   "port": 5600,
//!   "endpoints": [
//!     {
//!       "method": "POST",
//!       "path": "/order/place",
//!       "status": 201,
//!       "delay": 500,
//!       "response": {
//!         "orderId": "ORD{{randomId}}",
//!         "productId": "{{body.productId}}",
//!         "placedAt": "{{timestamp}}"
//!       }
//!     }
//!   ]
//! }
//! ```

pub mod access_log;
pub mod auth;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod matcher;
pub mod registry;
pub mod server;
pub mod template;

pub use config::MockServerConfig;
pub use dispatcher::Dispatcher;
pub use registry::EndpointRegistry;
pub use server::{MockServer, ServerOptions};
