use std::{sync::Arc, time::Duration};

use hyper::{header::HeaderValue, Uri};
use metrics_flush::{Driver, Expander, FactoryError, NamingStyle};
use tracing::debug;

use crate::{
    driver::{Settings, Warp10Driver},
    BuildError, Warp10Config, CONFIG_ENV_VAR,
};

/// Number of attempts made to reach the backend before a batch is dropped.
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Delay between two attempts.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Builder for creating a [`Warp10Driver`].
#[derive(Clone, Debug)]
pub struct Warp10ExporterBuilder {
    config: Option<Warp10Config>,
    max_attempts: usize,
    retry_backoff: Duration,
    duration_unit: Duration,
}

impl Warp10ExporterBuilder {
    /// Creates a new [`Warp10ExporterBuilder`].
    ///
    /// Unless [`with_config`](Self::with_config) is called, the configuration is read from the
    /// `WARP10_METRICS` environment variable.
    pub fn new() -> Self {
        Self {
            config: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            duration_unit: Duration::from_nanos(1),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: Warp10Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets how many times a batch is tried before it is dropped.
    ///
    /// Defaults to 3. Zero is treated as one.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the delay between two attempts.
    ///
    /// Defaults to one second.
    #[must_use]
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
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

    /// Builds the driver for `application`.
    ///
    /// Returns `Ok(None)` when no configuration was given and none is set in the environment.
    ///
    /// ## Errors
    ///
    /// If the configuration is malformed or incomplete, an error is returned.
    pub fn build(self, application: &str) -> Result<Option<Warp10Driver>, BuildError> {
        let config = match self.config.clone() {
            Some(config) => {
                config.validate()?;
                config
            }
            None => match Warp10Config::from_env()? {
                Some(config) => config,
                None => return Ok(None),
            },
        };

        let endpoint = config.address.parse::<Uri>().map_err(|e| BuildError::InvalidAddress {
            address: config.address.clone(),
            reason: e.to_string(),
        })?;
        let mut token = HeaderValue::from_str(&config.token)
            .map_err(|e| BuildError::InvalidToken { reason: e.to_string() })?;
        token.set_sensitive(true);

        let settings = Settings {
            endpoint,
            token,
            prefix: config.prefix_for(application),
            expander: Expander::new(NamingStyle::Dotted).with_duration_unit(self.duration_unit),
            max_attempts: self.max_attempts,
            retry_backoff: self.retry_backoff,
        };
        Ok(Some(Warp10Driver::new(settings)))
    }

    /// Returns a driver factory building the driver.
    ///
    /// The driver is disabled when it is not configured.
    pub fn factory(
        self,
    ) -> impl Fn(&str) -> Result<Option<Arc<dyn Driver>>, FactoryError> + Send + Sync + 'static
    {
        move |application| match self.clone().build(application) {
            Ok(Some(driver)) => Ok(Some(Arc::new(driver) as Arc<dyn Driver>)),
            Ok(None) => {
                debug!(variable = CONFIG_ENV_VAR, "warp10 metrics are not configured");
                Ok(None)
            }
            Err(e) => Err(FactoryError::InvalidConfiguration { reason: e.to_string() }),
        }
    }
}

impl Default for Warp10ExporterBuilder {
    fn default() -> Self {
        Warp10ExporterBuilder::new()
    }
}
