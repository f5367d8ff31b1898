use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::value::{display_value, lookup, number_repr, truthy};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Provenance {
    pub fingerprint: String,
    pub generated_at: String,
    pub sources: Vec<String>,
}

pub fn stamp(assumptions: &Value) -> Provenance {
    build_provenance(assumptions, Utc::now())
}

pub fn build_provenance(assumptions: &Value, now: DateTime<Utc>) -> Provenance {
    Provenance {
        fingerprint: fingerprint(assumptions),
        generated_at: now.format(TIMESTAMP_FORMAT).to_string(),
        sources: collect_sources(assumptions),
    }
}

/// SHA-256 over the canonical text of the assumptions. Missing or empty
/// input hashes as `{}`.
pub fn fingerprint(assumptions: &Value) -> String {
    let empty = Value::Object(serde_json::Map::new());
    let subject = if truthy(assumptions) { assumptions } else { &empty };
    let digest = Sha256::digest(canonical_json(subject).as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn collect_sources(assumptions: &Value) -> Vec<String> {
    let mut sources = Vec::new();

    if let Some(source) = lookup(assumptions, &["lifeTable", "source"])
        .value()
        .filter(|v| truthy(v))
    {
        sources.push(format!(
            "Life table: {} [{}]",
            display_value(source),
            population_label(assumptions)
        ));
    }
    if let Some(notes) = lookup(assumptions, &["meta", "wageSourceNotes"])
        .value()
        .filter(|v| truthy(v))
    {
        sources.push(format!("Wage/growth documentation: {}", display_value(notes)));
    }
    if let Some(notes) = lookup(assumptions, &["meta", "benefitSourceNotes"])
        .value()
        .filter(|v| truthy(v))
    {
        sources.push(format!("Fringe/benefit documentation: {}", display_value(notes)));
    }

    sources
}

pub fn population_label(assumptions: &Value) -> String {
    let population = lookup(assumptions, &["lifeTable", "population"])
        .value()
        .map(display_value)
        .unwrap_or_else(|| "combined".to_string());
    title_case(&population)
}

/// Uppercases the first letter of every alphabetic run and lowercases the rest.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_alpha = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if previous_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            previous_alpha = true;
        } else {
            out.push(c);
            previous_alpha = false;
        }
    }
    out
}

/// Deterministic JSON text: keys sorted at every depth, `", "` and `": "`
/// separators, non-ASCII escaped, floats in shortest round-trip form.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&number_repr(n)),
        Value::String(s) => write_escaped(s, out),
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (idx, (key, item)) in entries.into_iter().enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                write_escaped(key, out);
                out.push_str(": ");
                write_canonical(item, out);
            }
            out.push('}');
        }
    }
}

fn write_escaped(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            ' '..='~' => out.push(c),
            other => {
                let mut units = [0u16; 2];
                for unit in other.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{:04x}", unit));
                }
            }
        }
    }
    out.push('"');
}
