use std::fmt::Write as _;

use metrics_flush::{Binding, Expander, Gts, Value};
use metrics_registry::{HistogramSnapshot, MeterSnapshot, Metric};
use serde_json::{json, Map, Value as Json};
use tracing::warn;

/// Renders the metrics of a binding as a JSON object, keyed by metric name.
pub(crate) fn binding_json(binding: &Binding, expander: &Expander) -> Json {
    let unit = expander.duration_unit().as_nanos().max(1) as f64;

    let mut metrics = Map::new();
    binding.registry().each(|name, metric| {
        metrics.insert(name.to_string(), metric_json(metric, unit));
    });
    Json::Object(metrics)
}

fn metric_json(metric: &Metric, unit: f64) -> Json {
    match metric {
        Metric::Counter(counter) => json!({ "count": counter.count() }),
        Metric::Gauge(gauge) => json!({ "value": gauge.value() }),
        Metric::GaugeF64(gauge) => json!({ "value": gauge.value() }),
        Metric::Histogram(histogram) => Json::Object(histogram_fields(&histogram.snapshot(), 1.0)),
        Metric::Meter(meter) => Json::Object(meter_fields(&meter.snapshot())),
        Metric::Timer(timer) => {
            let snapshot = timer.snapshot();
            let mut fields = histogram_fields(snapshot.histogram(), unit);
            fields.extend(meter_fields(snapshot.meter()));
            Json::Object(fields)
        }
        Metric::Ewma(ewma) => json!({ "rate": ewma.rate() }),
    }
}

fn histogram_fields(h: &HistogramSnapshot, unit: f64) -> Map<String, Json> {
    let ps = h.percentiles(&[0.5, 0.75, 0.95, 0.99, 0.999]);
    let mut fields = Map::new();
    fields.insert("count".into(), json!(h.count()));
    fields.insert("min".into(), json!((h.min() as f64 / unit) as i64));
    fields.insert("max".into(), json!((h.max() as f64 / unit) as i64));
    fields.insert("mean".into(), json!(h.mean() / unit));
    fields.insert("stddev".into(), json!(h.std_dev() / unit));
    for (key, p) in ["median", "75%", "95%", "99%", "99.9%"].into_iter().zip(ps) {
        fields.insert(key.into(), json!(p / unit));
    }
    fields
}

fn meter_fields(m: &MeterSnapshot) -> Map<String, Json> {
    let mut fields = Map::new();
    fields.insert("count".into(), json!(m.count));
    fields.insert("1m.rate".into(), json!(m.rate1));
    fields.insert("5m.rate".into(), json!(m.rate5));
    fields.insert("15m.rate".into(), json!(m.rate15));
    fields.insert("mean.rate".into(), json!(m.rate_mean));
    fields
}

/// Expands the metrics of a binding into points named `<binding>_<metric>_<field>`.
///
/// Metrics that cannot be expanded are skipped.
pub(crate) fn binding_points(binding: &Binding, expander: &Expander, timestamp: i64) -> Vec<Gts> {
    let mut points = Vec::new();
    binding.registry().each(|name, metric| {
        let name = format!("{}_{name}", binding.name());
        match expander.expand(&name, metric) {
            Ok(samples) => points.extend(
                samples.into_iter().map(|s| Gts::from_sample(s, binding.tags(), Some(timestamp))),
            ),
            Err(e) => warn!(section = %binding.id(), error = %e, "skipping metric"),
        }
    });
    points
}

/// Renders points in the text exposition format, one `name{label="value",...} value timestamp`
/// line per point, sorted by name.
pub(crate) fn text(mut points: Vec<Gts>) -> String {
    points.sort_by(|a, b| a.name.cmp(&b.name));

    let mut out = String::new();
    for point in &points {
        write_point(&mut out, point);
    }
    out
}

fn write_point(out: &mut String, point: &Gts) {
    out.push_str(&point.name);
    if !point.labels.is_empty() {
        out.push('{');
        for (i, (key, value)) in point.labels.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            let _ = write!(out, "{key}=\"{}\"", escape_label_value(value));
        }
        out.push('}');
    }

    out.push(' ');
    match &point.value {
        Value::Bool(b) => out.push(if *b { 'T' } else { 'F' }),
        Value::Int(i) => {
            let _ = write!(out, "{i}");
        }
        Value::Float(f) if f.is_nan() => out.push_str("NaN"),
        Value::Float(f) if f.is_infinite() => {
            out.push_str(if f.is_sign_positive() { "+Inf" } else { "-Inf" });
        }
        Value::Float(f) => {
            let _ = write!(out, "{f:.6}");
        }
        Value::Str(s) => {
            let _ = write!(out, "'{}'", escape_label_value(s));
        }
    }

    if let Some(ts) = point.timestamp.filter(|ts| *ts > 0) {
        let _ = write!(out, " {ts}");
    }
    out.push('\n');
}

fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}
