use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    thread,
    time::Duration,
};

use metrics_flush::{Driver, Expander, FactoryError, NamingStyle};
use tokio::runtime;
use tracing::error;

use crate::{listener, BuildError, ExporterFuture, HttpDriver};

/// Address the exporter listens on unless configured otherwise.
pub const DEFAULT_LISTEN_ADDRESS: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), 9000);

/// Builder for creating an HTTP driver and the listener serving it.
#[derive(Clone, Debug)]
pub struct HttpExporterBuilder {
    listen_address: SocketAddr,
    duration_unit: Duration,
}

impl HttpExporterBuilder {
    /// Creates a new [`HttpExporterBuilder`].
    pub fn new() -> Self {
        Self { listen_address: DEFAULT_LISTEN_ADDRESS, duration_unit: Duration::from_nanos(1) }
    }

    /// Sets the address the listener binds.
    ///
    /// Defaults to `0.0.0.0:9000`.
    #[must_use]
    pub fn with_listen_address(mut self, addr: impl Into<SocketAddr>) -> Self {
        self.listen_address = addr.into();
        self
    }

    /// Sets the unit in which timer durations are reported.
    ///
    /// Defaults to nanoseconds.
    #[must_use]
    pub fn with_duration_unit(mut self, unit: Duration) -> Self {
        self.duration_unit = unit;
        self
    }

    /// Builds the driver without any listener, for applications serving it on their own server
    /// through [`HttpDriver::handle`].
    pub fn build_driver(&self) -> HttpDriver {
        let expander =
            Expander::new(NamingStyle::Underscored).with_duration_unit(self.duration_unit);
        HttpDriver::new(expander)
    }

    /// Builds the driver and the future serving it.
    ///
    /// The future must be polled for requests to be answered.
    ///
    /// ## Errors
    ///
    /// If the listen address cannot be bound, an error is returned.
    pub fn build(self) -> Result<(HttpDriver, ExporterFuture), BuildError> {
        let driver = self.build_driver();
        let exporter = listener::new_http_listener(driver.clone(), self.listen_address)?;
        Ok((driver, exporter))
    }

    /// Builds the driver and spawns its listener.
    ///
    /// If called from within a Tokio runtime, the listener runs on it. Otherwise, a background
    /// thread running its own runtime is spawned.
    ///
    /// ## Errors
    ///
    /// If the listen address cannot be bound, or the runtime cannot be created, an error is
    /// returned.
    pub fn spawn(self) -> Result<HttpDriver, BuildError> {
        if let Ok(handle) = runtime::Handle::try_current() {
            let (driver, exporter) = {
                let _g = handle.enter();
                self.build()?
            };
            handle.spawn(log_exporter_error(exporter));
            return Ok(driver);
        }

        let runtime = runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| BuildError::FailedToCreateRuntime { reason: e.to_string() })?;

        let (driver, exporter) = {
            let _g = runtime.enter();
            self.build()?
        };

        thread::Builder::new()
            .name("metrics-exporter-http".to_string())
            .spawn(move || runtime.block_on(log_exporter_error(exporter)))
            .map_err(|e| BuildError::FailedToCreateRuntime { reason: e.to_string() })?;

        Ok(driver)
    }

    /// Returns a driver factory spawning the listener when called.
    ///
    /// The driver is always enabled.
    pub fn factory(
        self,
    ) -> impl Fn(&str) -> Result<Option<Arc<dyn Driver>>, FactoryError> + Send + Sync + 'static
    {
        move |_application| {
            let driver = self
                .clone()
                .spawn()
                .map_err(|e| FactoryError::Setup { reason: e.to_string() })?;
            Ok(Some(Arc::new(driver) as Arc<dyn Driver>))
        }
    }
}

impl Default for HttpExporterBuilder {
    fn default() -> Self {
        HttpExporterBuilder::new()
    }
}

async fn log_exporter_error(exporter: ExporterFuture) {
    if let Err(e) = exporter.await {
        error!(error = %e, "metrics http exporter stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddr, TcpListener};

    use super::{HttpExporterBuilder, DEFAULT_LISTEN_ADDRESS};
    use crate::BuildError;

    #[test]
    fn default_listen_address() {
        assert_eq!(DEFAULT_LISTEN_ADDRESS.to_string(), "0.0.0.0:9000");
    }

    #[test]
    fn build_fails_on_bound_address() {
        let taken = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let address: SocketAddr = taken.local_addr().unwrap();

        let result = HttpExporterBuilder::new().with_listen_address(address).build();
        match result {
            Err(BuildError::FailedToCreateHttpListener { address: failed, .. }) => {
                assert_eq!(failed, address);
            }
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("bound an address already in use"),
        }
    }
}
