//! Periodic export of metric registries to pluggable backends.
//!
//! Application code binds [`Registry`] instances to a metric-group name and a set of tags, and a
//! [`Manager`] periodically sends every binding to each of its [`Driver`]s: an HTTP exposition
//! endpoint, a structured log, a remote time-series database, and so on.
//!
//! # Managers
//!
//! A [`Manager`] is built explicitly, handed its drivers, and run on a Tokio runtime:
//!
//! ```no_run
//! # use std::{sync::Arc, time::Duration};
//! # use metrics_flush::{Driver, ManagerBuilder, Tags};
//! # use metrics_registry::RegistryBuilder;
//! # async fn example(driver: Arc<dyn Driver>) -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ManagerBuilder::new()
//!     .with_flush_interval(Duration::from_secs(10))?
//!     .with_driver("http", driver)
//!     .build();
//! manager.spawn();
//!
//! let mut builder = RegistryBuilder::new();
//! let requests = builder.add_counter("requests");
//! manager.register("server", builder.build()?, Tags::new());
//!
//! requests.inc(1);
//! manager.flush();
//! # Ok(())
//! # }
//! ```
//!
//! Each driver gets its own flush loop, ticking at the flush interval. A tick, or a call to
//! [`Manager::flush`], takes a snapshot of the bindings and hands it to the driver as a task of its
//! own, so that a slow driver never delays its loop. Empty snapshots are never sent.
//!
//! # Drivers
//!
//! Drivers are usually created at startup from a [`DriverFactories`] table: each factory is given
//! the application name and either returns a driver, reports that it is disabled, or fails
//! startup.
//!
//! # Global manager
//!
//! For applications that only need one manager, a process-wide instance is available through
//! [`global`] and the free functions of this crate ([`init`], [`register`], [`flush`], ...).
mod binding;
pub use binding::{binding_id, binding_name, Binding, Tags};

mod driver;
pub use driver::{Driver, SendError, SendFuture};

pub mod expand;
pub use expand::{ExpandError, Expander, NamingStyle, Sample, Value};

mod factory;
pub use factory::{DriverFactories, FactoryError, InitError};

mod gts;
pub use gts::Gts;

mod manager;
pub use manager::{
    Manager, ManagerBuilder, ManagerError, SendPolicy, UnregisterError, DEFAULT_FLUSH_INTERVAL,
};

pub use metrics_registry::Registry;

use std::{thread, time::Duration};

use metrics_registry::{BuildError, MetricGroup};
use once_cell::sync::Lazy;
use tracing::error;

static GLOBAL: Lazy<Manager> = Lazy::new(Manager::new);

/// Gets the process-wide manager.
pub fn global() -> &'static Manager {
    &GLOBAL
}

/// Installs the drivers enabled for `application` on the global manager and starts it.
///
/// If called from within a Tokio runtime, the manager runs on it. Otherwise, a background thread
/// running its own runtime is spawned.
///
/// # Errors
///
/// If a driver factory fails, no driver is installed and the manager is not started.
pub fn init(application: &str, factories: &DriverFactories) -> Result<(), InitError> {
    let manager = global();
    manager.init(application, factories)?;

    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        let manager = manager.clone();
        handle.spawn(async move { log_run_error(manager.run().await) });
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| InitError::Runtime { reason: e.to_string() })?;

    let manager = manager.clone();
    thread::Builder::new()
        .name("metrics-flush".to_string())
        .spawn(move || runtime.block_on(async move { log_run_error(manager.run().await) }))
        .map_err(|e| InitError::Runtime { reason: e.to_string() })?;

    Ok(())
}

fn log_run_error(result: Result<(), ManagerError>) {
    if let Err(e) = result {
        error!(error = %e, "failed to run global metrics manager");
    }
}

/// Binds `registry` to `name` and `tags` on the global manager.
pub fn register(name: impl Into<String>, registry: Registry, tags: Tags) {
    global().register(name, registry, tags);
}

/// Builds a metric group and binds its registry to `name` and `tags` on the global manager.
pub fn register_group<G: MetricGroup>(
    name: impl Into<String>,
    tags: Tags,
) -> Result<(G, Registry), BuildError> {
    global().register_group(name, tags)
}

/// Removes the binding of `name` and `tags` from the global manager.
pub fn unregister(name: &str, tags: &Tags) -> Result<(), UnregisterError> {
    global().unregister(name, tags)
}

/// Sets the flush interval of the global manager.
///
/// Must be called before [`init`] to have any effect.
pub fn set_flush_interval(interval: Duration) -> Result<(), ManagerError> {
    global().set_flush_interval(interval)
}

/// Requests an immediate send from every driver of the global manager.
pub fn flush() {
    global().flush();
}

/// Stops the global manager.
pub fn stop() {
    global().stop();
}
