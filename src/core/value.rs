use serde_json::Value;

/// Result of walking a key path through nested JSON objects.
///
/// `Absent` covers both a missing key and an intermediate node that is not an
/// object; `Null` is a key that is present with an explicit JSON null.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Lookup<'a> {
    Absent,
    Null,
    Present(&'a Value),
}

impl<'a> Lookup<'a> {
    pub fn value(self) -> Option<&'a Value> {
        match self {
            Lookup::Present(value) => Some(value),
            Lookup::Absent | Lookup::Null => None,
        }
    }

    pub fn is_absent(self) -> bool {
        matches!(self, Lookup::Absent)
    }

    pub fn as_str(self) -> Option<&'a str> {
        self.value().and_then(Value::as_str)
    }

    pub fn as_object(self) -> Option<&'a serde_json::Map<String, Value>> {
        self.value().and_then(Value::as_object)
    }

    pub fn number(self) -> Option<f64> {
        self.value().and_then(coerce_number)
    }

    /// Truthiness with a fallback used only when the key is missing.
    pub fn truthy_or(self, default: bool) -> bool {
        match self {
            Lookup::Absent => default,
            Lookup::Null => false,
            Lookup::Present(value) => truthy(value),
        }
    }
}

pub fn lookup<'a>(root: &'a Value, path: &[&str]) -> Lookup<'a> {
    let mut cursor = root;
    for key in path {
        let Some(map) = cursor.as_object() else {
            return Lookup::Absent;
        };
        match map.get(*key) {
            Some(next) => cursor = next,
            None => return Lookup::Absent,
        }
    }
    if cursor.is_null() {
        Lookup::Null
    } else {
        Lookup::Present(cursor)
    }
}

/// Numeric coercion with float() semantics: numbers, booleans, and strings
/// that parse as a float once surrounding whitespace is trimmed.
pub fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => parse_float(s),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Like [`coerce_number`], but also accepts currency-formatted strings such
/// as `"$1,234.50"`. Blank strings are treated as absent.
pub fn coerce_money(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => {
            if s.trim().is_empty() {
                return None;
            }
            let cleaned: String = s.chars().filter(|c| *c != '$' && *c != ',').collect();
            parse_float(&cleaned)
        }
        other => coerce_number(other),
    }
}

fn parse_float(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Plain display of a scalar the way a report cell prints it: strings are
/// unquoted, everything else uses its literal form.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => py_repr(other),
    }
}

/// Literal representation matching the conventions used in violation
/// messages: single-quoted strings, `True`/`False`/`None`, shortest floats.
pub fn py_repr(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => number_repr(n),
        Value::String(s) => quote_str(s),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(py_repr).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Object(map) => {
            let inner: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", quote_str(k), py_repr(v)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
    }
}

pub fn number_repr(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    n.as_f64().map(float_repr).unwrap_or_else(|| n.to_string())
}

/// Shortest round-trip float text, switching to exponent notation outside
/// `1e-4 <= |x| < 1e16` and always keeping a fractional part otherwise.
pub fn float_repr(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if x == 0.0 {
        return if x.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }

    let sci = format!("{:e}", x);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };
    let negative = mantissa.starts_with('-');
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();

    let body = if (-4..16).contains(&exp) {
        let point = exp + 1;
        if point <= 0 {
            format!("0.{}{}", "0".repeat((-point) as usize), digits)
        } else if point as usize >= digits.len() {
            format!("{}{}.0", digits, "0".repeat(point as usize - digits.len()))
        } else {
            let (int_part, frac_part) = digits.split_at(point as usize);
            format!("{int_part}.{frac_part}")
        }
    } else {
        let (lead, rest) = digits.split_at(1);
        let mantissa = if rest.is_empty() {
            lead.to_string()
        } else {
            format!("{lead}.{rest}")
        };
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exp.abs())
    };

    if negative { format!("-{body}") } else { body }
}

fn quote_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_distinguishes_absent_from_null() {
        let root = json!({"discount": {"rate": null, "ndr": 0.02}, "aef": 5});
        assert_eq!(lookup(&root, &["discount", "rate"]), Lookup::Null);
        assert_eq!(lookup(&root, &["discount", "method"]), Lookup::Absent);
        assert_eq!(lookup(&root, &["aef", "ufEff"]), Lookup::Absent);
        assert_eq!(lookup(&root, &["discount", "ndr"]).number(), Some(0.02));
        assert_eq!(lookup(&json!([1, 2]), &["x"]), Lookup::Absent);
    }

    #[test]
    fn coerce_number_follows_float_semantics() {
        assert_eq!(coerce_number(&json!(3)), Some(3.0));
        assert_eq!(coerce_number(&json!(true)), Some(1.0));
        assert_eq!(coerce_number(&json!(" 0.25 ")), Some(0.25));
        assert_eq!(coerce_number(&json!("1e-3")), Some(0.001));
        assert_eq!(coerce_number(&json!("abc")), None);
        assert_eq!(coerce_number(&json!("")), None);
        assert_eq!(coerce_number(&json!([0.1])), None);
        assert_eq!(coerce_number(&json!({"v": 1})), None);
        assert!(coerce_number(&json!("inf")).is_some_and(f64::is_infinite));
    }

    #[test]
    fn coerce_money_strips_currency_formatting() {
        assert_eq!(coerce_money(&json!("$1,234.50")), Some(1234.5));
        assert_eq!(coerce_money(&json!("   ")), None);
        assert_eq!(coerce_money(&json!(-2.5)), Some(-2.5));
        assert_eq!(coerce_money(&json!("n/a")), None);
    }

    #[test]
    fn truthy_or_uses_default_only_when_missing() {
        let root = json!({"options": {"includeDiscounting": null, "includeLegals": false}});
        assert!(lookup(&root, &["options", "includeAEF"]).truthy_or(true));
        assert!(!lookup(&root, &["options", "includeDiscounting"]).truthy_or(true));
        assert!(!lookup(&root, &["options", "includeLegals"]).truthy_or(true));
    }

    #[test]
    fn float_repr_matches_shortest_round_trip_text() {
        assert_eq!(float_repr(0.1), "0.1");
        assert_eq!(float_repr(100.0), "100.0");
        assert_eq!(float_repr(1e-5), "1e-05");
        assert_eq!(float_repr(0.0001), "0.0001");
        assert_eq!(float_repr(1e16), "1e+16");
        assert_eq!(float_repr(1.5e16), "1.5e+16");
        assert_eq!(float_repr(-0.05), "-0.05");
        assert_eq!(float_repr(123456.789), "123456.789");
        assert_eq!(float_repr(f64::NAN), "nan");
    }

    #[test]
    fn py_repr_quotes_strings_and_nests_collections() {
        assert_eq!(py_repr(&json!("abc")), "'abc'");
        assert_eq!(py_repr(&json!("it's")), "\"it's\"");
        assert_eq!(py_repr(&json!(["a", 1, null])), "['a', 1, None]");
        assert_eq!(py_repr(&json!({"k": true})), "{'k': True}");
        assert_eq!(display_value(&json!("2024")), "2024");
        assert_eq!(display_value(&json!(42.5)), "42.5");
    }
}
