use std::{
    collections::{BTreeMap, HashSet},
    sync::{Arc, PoisonError, RwLock},
    time::{SystemTime, UNIX_EPOCH},
};

use http_body_util::Full;
use hyper::{
    body::Bytes,
    header::{HeaderValue, ACCEPT, CONTENT_TYPE},
    HeaderMap, Method, Request, Response, StatusCode,
};
use metrics_flush::{binding_name, Binding, Driver, Expander, SendFuture};
use serde_json::{Map, Value as Json};
use tracing::debug;

use crate::render;

const PROMETHEUS_ACCEPT: &str = "application/prometheus";
const JSON_CONTENT_TYPE: &str = "application/json";
const TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

struct Inner {
    // Keyed by binding identifier.
    sections: RwLock<BTreeMap<String, Binding>>,
    expander: Expander,
}

/// Driver exposing the last batch it was sent over HTTP.
///
/// Each binding is exposed as a section, identified by its binding identifier. The driver
/// answers:
///
/// - `GET /sections`: JSON array of section identifiers
/// - `GET /sections/metrics`: JSON object mapping each section to its metrics or, if the request
///   accepts `application/prometheus`, every metric in the text exposition format
/// - `GET /section/:name`: JSON metrics of one section, looked up by identifier, then by name
///
/// `HttpDriver` is a cheap handle. Clones share the exposed sections, so one clone can be
/// installed on a manager while another serves requests.
#[derive(Clone)]
pub struct HttpDriver {
    inner: Arc<Inner>,
}

impl HttpDriver {
    pub(crate) fn new(expander: Expander) -> Self {
        Self { inner: Arc::new(Inner { sections: RwLock::new(BTreeMap::new()), expander }) }
    }

    /// Identifiers of the sections currently exposed, sorted.
    pub fn sections(&self) -> Vec<String> {
        let sections = self.inner.sections.read().unwrap_or_else(PoisonError::into_inner);
        sections.keys().cloned().collect()
    }

    /// Replaces the exposed sections with the given batch.
    ///
    /// Sections absent from the batch are removed.
    pub fn expose(&self, batch: Vec<Binding>) {
        let mut sections = self.inner.sections.write().unwrap_or_else(PoisonError::into_inner);

        let mut sent = HashSet::with_capacity(batch.len());
        for binding in batch {
            let id = binding.id();
            sent.insert(id.clone());
            sections.insert(id, binding);
        }

        sections.retain(|id, _| {
            let keep = sent.contains(id);
            if !keep {
                debug!(section = %id, "removing stale section");
            }
            keep
        });
    }

    /// Answers a request.
    ///
    /// Only the method, path and headers of the request are used, so the driver can be mounted on
    /// any server.
    pub fn handle<B>(&self, req: &Request<B>) -> Response<Full<Bytes>> {
        if req.method() != Method::GET {
            return error_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
        }

        match req.uri().path() {
            "/sections" => self.list_sections(),
            "/sections/metrics" => self.expand_sections(req.headers()),
            path => match path.strip_prefix("/section/") {
                Some(name) if !name.is_empty() && !name.contains('/') => {
                    match urlencoding::decode(name) {
                        Ok(name) => self.show_section(&name),
                        Err(_) => error_response(StatusCode::NOT_FOUND, "section not found"),
                    }
                }
                _ => error_response(StatusCode::NOT_FOUND, "not found"),
            },
        }
    }

    fn list_sections(&self) -> Response<Full<Bytes>> {
        json_response(&Json::from(self.sections()))
    }

    fn expand_sections(&self, headers: &HeaderMap) -> Response<Full<Bytes>> {
        let sections = self.snapshot();

        if accepts_prometheus(headers) {
            let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
            let timestamp = i64::try_from(now.as_millis()).unwrap_or(i64::MAX);

            let points = sections
                .iter()
                .flat_map(|(_, binding)| {
                    render::binding_points(binding, &self.inner.expander, timestamp)
                })
                .collect();
            return text_response(render::text(points));
        }

        let mut result = Map::new();
        for (id, binding) in &sections {
            result.insert(id.clone(), render::binding_json(binding, &self.inner.expander));
        }
        json_response(&Json::Object(result))
    }

    fn show_section(&self, name: &str) -> Response<Full<Bytes>> {
        let sections = self.snapshot();
        let section = sections
            .iter()
            .find(|(id, _)| id.as_str() == name)
            .or_else(|| sections.iter().find(|(id, _)| binding_name(id) == name));

        match section {
            Some((_, binding)) => {
                json_response(&render::binding_json(binding, &self.inner.expander))
            }
            None => error_response(StatusCode::NOT_FOUND, "section not found"),
        }
    }

    // Rendering happens outside of the lock.
    fn snapshot(&self) -> Vec<(String, Binding)> {
        let sections = self.inner.sections.read().unwrap_or_else(PoisonError::into_inner);
        sections.iter().map(|(id, binding)| (id.clone(), binding.clone())).collect()
    }
}

impl Driver for HttpDriver {
    fn send(&self, batch: Vec<Binding>) -> SendFuture {
        let driver = self.clone();
        Box::pin(async move {
            driver.expose(batch);
            Ok(())
        })
    }
}

fn accepts_prometheus(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.trim().eq_ignore_ascii_case(PROMETHEUS_ACCEPT))
}

fn response(status: StatusCode, content_type: &'static str, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn json_response(value: &Json) -> Response<Full<Bytes>> {
    let mut body = value.to_string();
    body.push('\n');
    response(StatusCode::OK, JSON_CONTENT_TYPE, Bytes::from(body))
}

fn text_response(body: String) -> Response<Full<Bytes>> {
    response(StatusCode::OK, TEXT_CONTENT_TYPE, Bytes::from(body))
}

fn error_response(status: StatusCode, message: &'static str) -> Response<Full<Bytes>> {
    response(status, "text/plain; charset=utf-8", Bytes::from_static(message.as_bytes()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use http_body_util::Full;
    use hyper::{body::Bytes, header::ACCEPT, Method, Request, Response, StatusCode};
    use metrics_flush::{Binding, Expander, NamingStyle, Tags};
    use metrics_registry::{Counter, Registry};

    use super::HttpDriver;

    fn driver() -> HttpDriver {
        HttpDriver::new(Expander::new(NamingStyle::Underscored))
    }

    fn get(driver: &HttpDriver, path: &str, accept: Option<&str>) -> Response<Full<Bytes>> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(accept) = accept {
            builder = builder.header(ACCEPT, accept);
        }
        driver.handle(&builder.body(()).unwrap())
    }

    fn body(response: Response<Full<Bytes>>) -> String {
        use http_body_util::BodyExt;

        let collected = block_on(response.into_body().collect()).unwrap();
        String::from_utf8(collected.to_bytes().to_vec()).unwrap()
    }

    // `Full` is always ready, so a single poll completes it.
    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(future)
    }

    fn binding(name: &str, tags: &[(&str, &str)], hits: i64) -> Binding {
        let registry = Registry::new();
        let counter = Arc::new(Counter::new());
        counter.inc(hits);
        registry.register("hits", counter).unwrap();
        let tags: Tags = tags.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Binding::new(name, registry, tags)
    }

    #[test]
    fn empty_driver() {
        let driver = driver();
        assert_eq!(body(get(&driver, "/sections", None)), "[]\n");
        assert_eq!(body(get(&driver, "/sections/metrics", None)), "{}\n");
        assert_eq!(body(get(&driver, "/sections/metrics", Some("application/prometheus"))), "");
    }

    #[test]
    fn expose_removes_stale_sections() {
        let driver = driver();
        driver.expose(vec![binding("a", &[], 1), binding("b", &[("k", "v")], 2)]);
        assert_eq!(driver.sections(), vec!["a[]", "b[k=v]"]);

        driver.expose(vec![binding("b", &[("k", "v")], 3), binding("c", &[], 4)]);
        assert_eq!(driver.sections(), vec!["b[k=v]", "c[]"]);
        assert_eq!(body(get(&driver, "/sections", None)), "[\"b[k=v]\",\"c[]\"]\n");
    }

    #[test]
    fn show_section_by_id_or_name() {
        let driver = driver();
        driver.expose(vec![binding("server", &[("zone", "a")], 5)]);

        let by_name = body(get(&driver, "/section/server", None));
        assert_eq!(by_name, "{\"hits\":{\"count\":5}}\n");

        let by_id = body(get(&driver, "/section/server%5Bzone=a%5D", None));
        assert_eq!(by_id, by_name);

        let missing = get(&driver, "/section/unknown", None);
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(body(missing), "section not found");
    }

    #[test]
    fn prometheus_negotiation_is_case_insensitive() {
        let driver = driver();
        driver.expose(vec![binding("server", &[("zone", "a")], 5)]);

        let response = get(&driver, "/sections/metrics", Some("Application/Prometheus"));
        let text = body(response);
        assert!(text.starts_with("server_hits_count{zone=\"a\"} 5 "), "{text}");
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn unknown_routes() {
        let driver = driver();
        assert_eq!(get(&driver, "/", None).status(), StatusCode::NOT_FOUND);
        assert_eq!(get(&driver, "/section/", None).status(), StatusCode::NOT_FOUND);
        assert_eq!(get(&driver, "/section/%FF", None).status(), StatusCode::NOT_FOUND);

        let post = Request::builder().method(Method::POST).uri("/sections").body(()).unwrap();
        assert_eq!(driver.handle(&post).status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
