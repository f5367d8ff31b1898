use serde_json::Value;

use super::value::{Lookup, coerce_number, lookup, py_repr};

#[derive(Debug, Clone, Copy)]
pub struct RangeRule {
    pub label: &'static str,
    pub path: &'static [&'static str],
    pub min: f64,
    pub max: f64,
    pub description: &'static str,
}

pub const RANGE_RULES: &[RangeRule] = &[
    RangeRule {
        label: "Growth rate",
        path: &["butFor", "growth"],
        min: -0.05,
        max: 0.15,
        description: "Expected to fall between -5% (contraction) and 15% (aggressive growth).",
    },
    RangeRule {
        label: "Discount rate",
        path: &["discount", "rate"],
        min: -0.05,
        max: 0.2,
        description: "Net discount rates should typically remain within -5% and 20%.",
    },
    RangeRule {
        label: "Net discount rate",
        path: &["discount", "ndr"],
        min: -0.05,
        max: 0.2,
        description: "Net discount rates should typically remain within -5% and 20%.",
    },
    RangeRule {
        label: "Unemployment factor",
        path: &["aef", "ufEff"],
        min: 0.0,
        max: 0.35,
        description: "Unemployment factors above 35% or below 0 are flagged as implausible.",
    },
    RangeRule {
        label: "Tax load",
        path: &["aef", "tlEff"],
        min: 0.0,
        max: 0.65,
        description: "Combined effective tax loads rarely exceed 65% of wages.",
    },
    RangeRule {
        label: "Fringe/benefit percentage",
        path: &["aef", "fringePct"],
        min: 0.0,
        max: 0.75,
        description: "Fringe loads above 75% of wages should be reviewed before use.",
    },
];

impl RangeRule {
    fn check(&self, assumptions: &Value) -> Option<String> {
        let raw = match lookup(assumptions, self.path) {
            Lookup::Absent | Lookup::Null => return None,
            Lookup::Present(raw) => raw,
        };

        let Some(value) = coerce_number(raw) else {
            return Some(format!(
                "{}: expected a numeric value but received {}.",
                self.label,
                py_repr(raw)
            ));
        };

        if self.min <= value && value <= self.max {
            return None;
        }
        Some(format!(
            "{} {} is outside the expected range [{}, {}]. {}",
            self.label,
            format_general(value, 4),
            self.min,
            self.max,
            self.description
        ))
    }
}

/// Checks every monitored assumption against its plausibility band.
/// Returns violations in rule order; empty means every present value passed.
pub fn validate_assumption_ranges(assumptions: &Value) -> Vec<String> {
    RANGE_RULES
        .iter()
        .filter_map(|rule| rule.check(assumptions))
        .collect()
}

/// The assumptions inside a posted body: its `assumptions` object when it
/// has one, otherwise the body itself.
pub fn assumptions_of(body: &Value) -> &Value {
    match body.get("assumptions") {
        Some(inner @ Value::Object(_)) => inner,
        _ => body,
    }
}

/// `%g`-style formatting with `precision` significant digits.
pub fn format_general(value: f64, precision: usize) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    let precision = precision.max(1);
    let sci = format!("{:.*e}", precision - 1, value);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m.to_string(), e.parse::<i32>().unwrap_or(0)),
        None => (sci.clone(), 0),
    };

    if exp < -4 || exp >= precision as i32 {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_fraction(&mantissa), exp.abs())
    } else {
        let decimals = (precision as i32 - 1 - exp).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, value))
    }
}

fn trim_fraction(text: &str) -> String {
    if !text.contains('.') {
        return text.to_string();
    }
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};
    use serde_json::json;

    #[test]
    fn assumptions_of_unwraps_a_wrapped_body() {
        let wrapped = json!({"assumptions": {"discount": {"rate": 0.04}}});
        assert_eq!(assumptions_of(&wrapped), &json!({"discount": {"rate": 0.04}}));
        let bare = json!({"discount": {"rate": 0.04}});
        assert_eq!(assumptions_of(&bare), &bare);
    }

    #[test]
    fn out_of_range_growth_is_reported_with_bounds_and_description() {
        let assumptions = json!({
            "butFor": {"growth": 0.5},
            "discount": {"rate": 0.03},
            "aef": {"ufEff": 0.05}
        });
        let violations = validate_assumption_ranges(&assumptions);
        assert_eq!(
            violations,
            vec![
                "Growth rate 0.5 is outside the expected range [-0.05, 0.15]. \
                 Expected to fall between -5% (contraction) and 15% (aggressive growth)."
                    .to_string()
            ]
        );
    }

    #[test]
    fn plausible_assumptions_produce_no_violations() {
        let assumptions = json!({
            "butFor": {"growth": 0.02},
            "discount": {"rate": 0.04},
            "aef": {"ufEff": 0.08, "tlEff": 0.25, "fringePct": 0.22}
        });
        assert!(validate_assumption_ranges(&assumptions).is_empty());
    }

    #[test]
    fn missing_sections_and_nulls_are_skipped() {
        assert!(validate_assumption_ranges(&json!({})).is_empty());
        assert!(validate_assumption_ranges(&json!(null)).is_empty());
        assert!(validate_assumption_ranges(&json!({"aef": "off", "discount": {"rate": null}})).is_empty());
    }

    #[test]
    fn non_numeric_value_yields_single_message_with_received_value() {
        let violations = validate_assumption_ranges(&json!({"aef": {"tlEff": "high"}}));
        assert_eq!(
            violations,
            vec!["Tax load: expected a numeric value but received 'high'.".to_string()]
        );
    }

    #[test]
    fn numeric_strings_and_booleans_are_coerced() {
        assert!(validate_assumption_ranges(&json!({"discount": {"ndr": "0.03"}})).is_empty());
        let violations = validate_assumption_ranges(&json!({"aef": {"ufEff": true}}));
        assert_eq!(violations.len(), 1);
        assert!(violations[0].starts_with("Unemployment factor 1 is outside the expected range [0, 0.35]."));
    }

    #[test]
    fn violations_follow_rule_declaration_order() {
        let assumptions = json!({
            "aef": {"fringePct": 0.9, "ufEff": -0.1},
            "butFor": {"growth": "fast"}
        });
        let violations = validate_assumption_ranges(&assumptions);
        assert_eq!(violations.len(), 3);
        assert!(violations[0].starts_with("Growth rate:"));
        assert!(violations[1].starts_with("Unemployment factor -0.1 "));
        assert!(violations[2].starts_with("Fringe/benefit percentage 0.9 "));
    }

    #[test]
    fn format_general_matches_four_significant_digits() {
        assert_eq!(format_general(0.5, 4), "0.5");
        assert_eq!(format_general(0.123456, 4), "0.1235");
        assert_eq!(format_general(12346.0, 4), "1.235e+04");
        assert_eq!(format_general(0.00001234, 4), "1.234e-05");
        assert_eq!(format_general(-0.0600, 4), "-0.06");
        assert_eq!(format_general(1.0, 4), "1");
        assert_eq!(format_general(f64::NAN, 4), "nan");
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_bounds_are_inclusive(rule_idx in 0usize..6, pick_max in proptest::bool::ANY) {
            let rule = RANGE_RULES[rule_idx];
            let edge = if pick_max { rule.max } else { rule.min };
            let mut assumptions = json!({});
            assumptions[rule.path[0]][rule.path[1]] = json!(edge);
            prop_assert!(validate_assumption_ranges(&assumptions).is_empty());

            let outside = if pick_max { rule.max + 1e-6 } else { rule.min - 1e-6 };
            assumptions[rule.path[0]][rule.path[1]] = json!(outside);
            let violations = validate_assumption_ranges(&assumptions);
            prop_assert_eq!(violations.len(), 1);
            prop_assert!(violations[0].starts_with(rule.label));
        }
    }
}
