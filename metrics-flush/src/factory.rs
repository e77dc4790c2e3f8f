use std::{fmt, sync::Arc};

use thiserror::Error;
use tracing::debug;

use crate::Driver;

/// Errors that a driver factory could return.
#[derive(Debug, Error)]
pub enum FactoryError {
    /// The driver configuration was found but is malformed.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    /// The driver could not be set up.
    #[error("failed to set up driver: {reason}")]
    Setup { reason: String },
}

/// Errors that could occur while initializing a manager.
#[derive(Debug, Error)]
pub enum InitError {
    /// A driver factory failed.
    #[error("failed to init metrics driver {name}: {source}")]
    Driver {
        name: String,
        #[source]
        source: FactoryError,
    },

    /// Drivers were already installed on this manager.
    #[error("drivers are already installed")]
    AlreadyInitialized,

    /// The background runtime could not be created.
    #[error("failed to create runtime: {reason}")]
    Runtime { reason: String },
}

type Factory =
    Box<dyn Fn(&str) -> Result<Option<Arc<dyn Driver>>, FactoryError> + Send + Sync + 'static>;

/// An ordered table of driver factories.
///
/// Each factory is given the application name. It returns `Ok(Some(driver))` when the driver is
/// ready, `Ok(None)` when the driver is disabled (for example, because it is not configured) and
/// an error when it is misconfigured.
#[derive(Default)]
pub struct DriverFactories {
    factories: Vec<(String, Factory)>,
}

impl DriverFactories {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a factory under the given name.
    #[must_use]
    pub fn with_factory<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&str) -> Result<Option<Arc<dyn Driver>>, FactoryError> + Send + Sync + 'static,
    {
        self.factories.push((name.into(), Box::new(factory)));
        self
    }

    /// Names of the registered factories, in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.iter().map(|(name, _)| name.as_str())
    }

    /// Runs every factory, in order, and collects the enabled drivers.
    ///
    /// # Errors
    ///
    /// The first factory error aborts resolution.
    pub fn resolve(&self, application: &str) -> Result<Vec<(String, Arc<dyn Driver>)>, InitError> {
        let mut drivers = Vec::with_capacity(self.factories.len());
        for (name, factory) in &self.factories {
            match factory(application) {
                Ok(Some(driver)) => {
                    debug!(driver = %name, "driver initialized");
                    drivers.push((name.clone(), driver));
                }
                Ok(None) => debug!(driver = %name, "driver disabled"),
                Err(source) => return Err(InitError::Driver { name: name.clone(), source }),
            }
        }
        Ok(drivers)
    }
}

impl fmt::Debug for DriverFactories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverFactories").field("names", &self.names().collect::<Vec<_>>()).finish()
    }
}
