//! A [`metrics_flush`] driver pushing metric registries to [Warp 10].
//!
//! Every batch is expanded into series named `<prefix>.<binding>.<metric>.<field>` (for example
//! `acme.api.http.latency.99-percentile`), labelled with the binding tags, and `POST`ed in the
//! Warp 10 input format with the configured write token.
//!
//! # Configuration
//!
//! The driver is configured either explicitly with a [`Warp10Config`], or through the
//! `WARP10_METRICS` environment variable holding the same configuration as JSON:
//!
//! ```json
//! {"address": "https://warp10.example.com/api/v0/update", "token": "WRITE", "prefix": "acme"}
//! ```
//!
//! When neither is present, the driver is disabled. The series prefix is the configured prefix
//! followed by the application name, or just the application name without a configured prefix.
//!
//! # Delivery
//!
//! Unreachable backends are retried up to three times, one second apart, after which the batch
//! is dropped: the next flush sends fresh values anyway. Responses with an error status are logged
//! and never retried.
//!
//! [Warp 10]: https://www.warp10.io/
use thiserror::Error;

mod builder;
pub use builder::{Warp10ExporterBuilder, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_BACKOFF};

mod config;
pub use config::{ConfigError, Warp10Config, CONFIG_ENV_VAR};

mod driver;
pub use driver::Warp10Driver;

mod encode;

/// Errors that could occur while building the driver.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("invalid token: {reason}")]
    InvalidToken { reason: String },
}
