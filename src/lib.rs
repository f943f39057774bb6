//! SaaS adapter layer
//!
//! Uniform tool surface over two REST backends: an error monitoring service
//! and a test management service.
//!
//! # Features
//!
//! - **Project context**: organization/project resolution, memoized with a TTL
//! - **One list contract**: filters, sorting and cursors over Link-header and
//!   offset pagination alike
//! - **Verified writes**: an acknowledged update with an unreadable body is
//!   checked against a fresh read instead of being retried
//! - **Stability metrics**: user/session stability on every release
//! - **Endpoint resolution**: hub and default domains chosen from the key

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod app;
pub mod bugsnag;
pub mod cache;
pub mod cli;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod pagination;
pub mod stability;
pub mod tools;
pub mod transport;
pub mod verify;
pub mod zephyr;

pub use error::{Error, ErrorKind, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging. Logs go to stderr; stdout carries tool output.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let initialized = match format {
        Some("json") => subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        _ => subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };

    initialized.map_err(|e| Error::Internal(format!("tracing init: {e}")))
}
