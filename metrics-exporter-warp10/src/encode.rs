use std::fmt::Write as _;

use metrics_flush::{Gts, Value};
use url::form_urlencoded::byte_serialize;

/// Appends `gts` to `out` in the Warp 10 input format:
/// `TS// NAME{LABELS} VALUE\r\n`, with name, labels and strings form-urlencoded.
pub(crate) fn write_gts(out: &mut String, gts: &Gts) {
    let mut ints = itoa::Buffer::new();

    if let Some(ts) = gts.timestamp {
        out.push_str(ints.format(ts));
    }

    out.push_str("// ");
    out.extend(byte_serialize(gts.name.as_bytes()));
    out.push('{');
    for (i, (key, value)) in gts.labels.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.extend(byte_serialize(key.as_bytes()));
        out.push('=');
        out.extend(byte_serialize(value.as_bytes()));
    }
    out.push_str("} ");

    match &gts.value {
        Value::Bool(b) => out.push(if *b { 'T' } else { 'F' }),
        Value::Int(i) => out.push_str(ints.format(*i)),
        Value::Float(f) => {
            let _ = write!(out, "{f:.6}");
        }
        Value::Str(s) => {
            out.push('\'');
            out.extend(byte_serialize(s.as_bytes()));
            out.push('\'');
        }
    }
    out.push_str("\r\n");
}

/// Encodes a batch of points into a request body.
pub(crate) fn encode(points: &[Gts]) -> String {
    let mut out = String::with_capacity(points.len() * 64);
    for gts in points {
        write_gts(&mut out, gts);
    }
    out
}
