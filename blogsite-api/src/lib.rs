//! HTTP surface of the blogsite account layer
//!
//! Serves the OAuth2 login routes under `/oauth/` and a health check.

pub mod http;

pub use http::{create_router, AppState};
