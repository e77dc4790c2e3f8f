use std::{
    fmt,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use http_body_util::{BodyExt, Full};
use hyper::{
    body::Bytes,
    header::{HeaderValue, CONTENT_TYPE},
    Method, Request, Uri,
};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use metrics_flush::{Binding, Driver, Expander, Gts, SendError, SendFuture};
use tracing::{debug, error, warn};

use crate::encode;

const TOKEN_HEADER: &str = "X-Warp10-Token";

pub(crate) struct Settings {
    pub(crate) endpoint: Uri,
    pub(crate) token: HeaderValue,
    pub(crate) prefix: String,
    pub(crate) expander: Expander,
    pub(crate) max_attempts: usize,
    pub(crate) retry_backoff: Duration,
}

struct Inner {
    settings: Settings,
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

/// Driver pushing every batch it is sent to Warp 10.
///
/// Each metric is expanded into series named `<prefix>.<binding>.<metric>.<field>`, labelled with
/// the binding tags and timestamped in microseconds. The whole batch is sent in one request.
#[derive(Clone)]
pub struct Warp10Driver {
    inner: Arc<Inner>,
}

impl Warp10Driver {
    pub(crate) fn new(settings: Settings) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(30))
            .retry_canceled_requests(false)
            .build(connector());
        Self { inner: Arc::new(Inner { settings, client }) }
    }

    /// Prefix of every series name.
    pub fn prefix(&self) -> &str {
        &self.inner.settings.prefix
    }

    /// Expands a batch into series timestamped at `timestamp`.
    pub fn series(&self, batch: &[Binding], timestamp: i64) -> Vec<Gts> {
        let settings = &self.inner.settings;
        let mut series = Vec::new();
        for binding in batch {
            binding.registry().each(|name, metric| {
                let name = format!("{}.{name}", binding.name());
                match settings.expander.expand(&name, metric) {
                    Ok(samples) => series.extend(samples.into_iter().map(|sample| {
                        Gts::from_sample(sample, binding.tags(), Some(timestamp))
                            .with_prefix(&settings.prefix)
                    })),
                    Err(e) => warn!(registry = %binding.id(), error = %e, "skipping metric"),
                }
            });
        }
        series
    }
}

impl fmt::Debug for Warp10Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let settings = &self.inner.settings;
        f.debug_struct("Warp10Driver")
            .field("endpoint", &settings.endpoint)
            .field("prefix", &settings.prefix)
            .field("max_attempts", &settings.max_attempts)
            .field("retry_backoff", &settings.retry_backoff)
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn request(&self, body: Bytes) -> Result<Request<Full<Bytes>>, SendError> {
        Request::builder()
            .method(Method::POST)
            .uri(self.settings.endpoint.clone())
            .header(CONTENT_TYPE, "text/plain")
            .header(TOKEN_HEADER, self.settings.token.clone())
            .body(Full::new(body))
            .map_err(|e| SendError::InvalidRequest { reason: e.to_string() })
    }

    // Only transport errors are retried: a response, whatever its status, means the backend was
    // reached.
    async fn push(&self, body: Bytes) -> Result<(), SendError> {
        let max_attempts = self.settings.max_attempts.max(1);
        let mut reason = String::new();

        for attempt in 1..=max_attempts {
            match self.client.request(self.request(body.clone())?).await {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        let body = response
                            .into_body()
                            .collect()
                            .await
                            .map(|collected| collected.to_bytes())
                            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                            .unwrap_or_else(|_| String::from("<failed to read response body>"));
                        warn!(%status, %body, "warp10 backend rejected metrics");
                    }
                    return Ok(());
                }
                Err(e) => {
                    error!(attempt, error = %e, "can't reach the warp10 backend");
                    reason = e.to_string();
                    if attempt < max_attempts {
                        tokio::time::sleep(self.settings.retry_backoff).await;
                    }
                }
            }
        }

        Err(SendError::Unreachable { attempts: max_attempts, reason })
    }
}

impl Driver for Warp10Driver {
    fn send(&self, batch: Vec<Binding>) -> SendFuture {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        let timestamp = i64::try_from(now.as_micros()).unwrap_or(i64::MAX);

        let driver = self.clone();
        Box::pin(async move {
            let series = driver.series(&batch, timestamp);
            if series.is_empty() {
                debug!("no series to push");
                return Ok(());
            }
            driver.inner.push(Bytes::from(encode::encode(&series))).await
        })
    }
}

fn connector() -> HttpsConnector<HttpConnector> {
    let builder = match HttpsConnectorBuilder::new().with_native_roots() {
        Ok(builder) => builder,
        Err(e) => {
            debug!(error = %e, "no native root CA certificates found, using webpki roots");
            HttpsConnectorBuilder::new().with_webpki_roots()
        }
    };
    builder.https_or_http().enable_http1().build()
}
