//! A [`metrics_flush`] driver exposing metric registries over HTTP.
//!
//! The driver keeps the last batch of bindings the manager sent it and answers:
//!
//! - `GET /sections`: the identifiers of the exposed bindings, as a JSON array
//! - `GET /sections/metrics`: every binding, as a JSON object keyed by binding identifier, or in
//!   the Prometheus text exposition format when the `Accept` header is `application/prometheus`
//! - `GET /section/:name`: one binding, looked up by identifier first, then by name
//!
//! Bindings that were not part of the last batch are no longer exposed.
//!
//! # Usage
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use metrics_exporter_http::HttpExporterBuilder;
//! # use metrics_flush::ManagerBuilder;
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (driver, exporter) =
//!     HttpExporterBuilder::new().with_listen_address(([127, 0, 0, 1], 9000)).build()?;
//! tokio::spawn(exporter);
//!
//! let manager = ManagerBuilder::new().with_driver("http", Arc::new(driver)).build();
//! manager.spawn();
//! # Ok(())
//! # }
//! ```
use std::{future::Future, net::SocketAddr, pin::Pin};

use thiserror::Error;

mod builder;
pub use builder::{HttpExporterBuilder, DEFAULT_LISTEN_ADDRESS};

mod driver;
pub use driver::HttpDriver;

mod listener;
mod render;

/// Errors that could occur while building the exporter.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The listen address could not be bound.
    #[error("failed to create HTTP listener on {address}: {reason}")]
    FailedToCreateHttpListener { address: SocketAddr, reason: String },

    /// The background runtime could not be created.
    #[error("failed to create runtime: {reason}")]
    FailedToCreateRuntime { reason: String },
}

/// Errors that could stop a running exporter.
#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("listener failed: {reason}")]
    Listener { reason: String },
}

/// Convenience type for the future running the listener.
pub type ExporterFuture = Pin<Box<dyn Future<Output = Result<(), ExporterError>> + Send + 'static>>;
