//! CoCDB Library
//!
//! Read-only HTTP API serving game entity definitions (buildings, troops)
//! from a tree of JSON documents.
//!
//! # Features
//!
//! - **TTL cache**: concurrent, self-expiring document cache with lazy expiry
//!   on read and a background reclamation task
//! - **Traversal-safe loader**: request paths never leave the data directory
//! - **Production ready**: structured logging, request ids, CORS, graceful shutdown

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// `RUST_LOG` overrides `level` when set.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| Error::Config(format!("Invalid log level {level:?}: {e}")))?;

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    };
    installed.map_err(|e| Error::Internal(format!("Failed to install subscriber: {e}")))
}
