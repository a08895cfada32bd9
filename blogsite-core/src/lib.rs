//! Core of the blogsite account layer: OAuth2 login with Gitee, GitHub and
//! Google, identity reconciliation against local accounts, and the deferred
//! email-confirmation flow for providers that do not disclose an email.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod oauth2;
pub mod repository;
pub mod resilience;
pub mod service;
pub mod validation;

pub use config::Config;
pub use error::{Error, Result};
