// InfluxDB line protocol encoding for metric points

use crate::models::{FieldValue, MetricPoint};
use std::fmt::Write;

// Line breaks end a line, so they are written as spaces.
fn escape_into(out: &mut String, s: &str, special: &[char]) {
    for c in s.chars() {
        let c = if c == '\n' || c == '\r' { ' ' } else { c };
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

fn push_measurement(out: &mut String, s: &str) {
    escape_into(out, s, &[',', ' ']);
}

/// Tag keys, tag values and field keys share one escaping rule.
fn push_key(out: &mut String, s: &str) {
    escape_into(out, s, &[',', '=', ' ']);
}

fn push_field_value(out: &mut String, value: &FieldValue) {
    match value {
        FieldValue::Int(i) => {
            let _ = write!(out, "{i}i");
        }
        FieldValue::Float(f) => {
            let _ = write!(out, "{f}");
        }
        FieldValue::Str(s) => {
            out.push('"');
            escape_into(out, s, &['"', '\\']);
            out.push('"');
        }
    }
}

/// Encodes one point as a line (no trailing newline).
///
/// Non-finite floats cannot be written, so those fields are left out; `None`
/// when nothing writable remains. Tags with empty values are dropped.
pub fn encode_point(point: &MetricPoint) -> Option<String> {
    let fields: Vec<(&String, &FieldValue)> = point
        .fields
        .iter()
        .filter(|(_, v)| !matches!(v, FieldValue::Float(f) if !f.is_finite()))
        .collect();
    if fields.is_empty() {
        return None;
    }

    let mut line = String::with_capacity(128);
    push_measurement(&mut line, point.measurement);
    for (k, v) in point.tags.iter().filter(|(_, v)| !v.is_empty()) {
        line.push(',');
        push_key(&mut line, k);
        line.push('=');
        push_key(&mut line, v);
    }
    for (i, (k, v)) in fields.into_iter().enumerate() {
        line.push(if i == 0 { ' ' } else { ',' });
        push_key(&mut line, k);
        line.push('=');
        push_field_value(&mut line, v);
    }
    if let Some(ns) = point.timestamp.timestamp_nanos_opt() {
        let _ = write!(line, " {ns}");
    }
    Some(line)
}
