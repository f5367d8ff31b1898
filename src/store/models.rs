use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::core::value::truthy;
use crate::core::coerce_number;

use super::StoreError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluee {
    pub id: i64,
    pub profile_name: String,
    pub created_at: String,
    pub updated_at: String,
    pub case_count: i64,
}

/// A case record. `assumptions` and `latest_calculation` are `None` in
/// summary listings; `calculation_history` is only filled on request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Case {
    pub id: i64,
    pub evaluee_id: i64,
    pub case_name: String,
    pub case_type: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub incident_date: Option<NaiveDate>,
    pub valuation_date: Option<NaiveDate>,
    pub wle_years: Option<f64>,
    pub yfs_years: Option<f64>,
    pub le_years: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assumptions: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_calculation: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calculation_history: Option<Vec<Calculation>>,
}

impl Case {
    pub fn summary(mut self) -> Self {
        self.assumptions = None;
        self.latest_calculation = None;
        self.calculation_history = None;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Calculation {
    pub id: i64,
    pub case_id: i64,
    pub calculated_at: String,
    pub description: Option<String>,
    pub total_damages_pv: Option<f64>,
    pub past_damages: Option<f64>,
    pub future_damages_pv: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assumptions: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Value>,
}

impl Calculation {
    pub fn summary(mut self) -> Self {
        self.assumptions = None;
        self.results = None;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResults {
    pub evaluees: Vec<Evaluee>,
    pub cases: Vec<Case>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub evaluees: i64,
    pub cases: i64,
    pub calculations: i64,
}

/// Parses an ISO date (or the date part of an ISO timestamp). Empty and
/// falsy values clear the field.
pub fn parse_date(value: Option<&Value>, field: &'static str) -> Result<Option<NaiveDate>, StoreError> {
    let Some(value) = value.filter(|v| truthy(v)) else {
        return Ok(None);
    };
    let invalid = || StoreError::InvalidDate(field);
    let text = value.as_str().ok_or_else(invalid)?.trim();
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Ok(Some(date));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|dt| Some(dt.date()))
        .map_err(|_| invalid())
}

fn years(value: Option<&Value>) -> Option<f64> {
    value.and_then(coerce_number).filter(|v| v.is_finite())
}

/// Field set for a new case, with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCase {
    pub case_name: String,
    pub case_type: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub incident_date: Option<NaiveDate>,
    pub valuation_date: Option<NaiveDate>,
    pub wle_years: Option<f64>,
    pub yfs_years: Option<f64>,
    pub le_years: Option<f64>,
    pub assumptions: Value,
}

impl NewCase {
    pub fn from_json(body: &Map<String, Value>) -> Result<Self, StoreError> {
        let case_name = body
            .get("case_name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or("Untitled Case")
            .to_string();
        let case_type = match body.get("case_type") {
            None => Some("pi".to_string()),
            Some(Value::String(kind)) => Some(kind.clone()),
            Some(_) => None,
        };
        Ok(Self {
            case_name,
            case_type,
            date_of_birth: parse_date(body.get("date_of_birth"), "date_of_birth")?,
            incident_date: parse_date(body.get("incident_date"), "incident_date")?,
            valuation_date: parse_date(body.get("valuation_date"), "valuation_date")?,
            wle_years: years(body.get("wle_years")),
            yfs_years: years(body.get("yfs_years")),
            le_years: years(body.get("le_years")),
            assumptions: body
                .get("assumptions")
                .filter(|v| truthy(v))
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new())),
        })
    }
}

/// Applies the keys present in an update body to an existing case.
pub fn apply_case_patch(case: &mut Case, body: &Map<String, Value>) -> Result<(), StoreError> {
    if let Some(name) = body.get("case_name").and_then(Value::as_str) {
        let name = name.trim();
        if !name.is_empty() {
            case.case_name = name.to_string();
        }
    }
    if let Some(kind) = body.get("case_type") {
        case.case_type = kind.as_str().map(str::to_string);
    }
    if body.contains_key("date_of_birth") {
        case.date_of_birth = parse_date(body.get("date_of_birth"), "date_of_birth")?;
    }
    if body.contains_key("incident_date") {
        case.incident_date = parse_date(body.get("incident_date"), "incident_date")?;
    }
    if body.contains_key("valuation_date") {
        case.valuation_date = parse_date(body.get("valuation_date"), "valuation_date")?;
    }
    if body.contains_key("wle_years") {
        case.wle_years = years(body.get("wle_years"));
    }
    if body.contains_key("yfs_years") {
        case.yfs_years = years(body.get("yfs_years"));
    }
    if body.contains_key("le_years") {
        case.le_years = years(body.get("le_years"));
    }
    if let Some(assumptions) = body.get("assumptions").filter(|v| v.is_object()) {
        case.assumptions = Some(assumptions.clone());
    }
    if let Some(latest) = body.get("latest_calculation").filter(|v| v.is_object()) {
        case.latest_calculation = Some(latest.clone());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn parse_date_accepts_dates_and_timestamps() {
        let date = NaiveDate::from_ymd_opt(2020, 5, 17);
        assert_eq!(parse_date(Some(&json!("2020-05-17")), "dob").unwrap(), date);
        assert_eq!(
            parse_date(Some(&json!("2020-05-17T08:30:00")), "dob").unwrap(),
            date
        );
        assert_eq!(parse_date(Some(&json!("")), "dob").unwrap(), None);
        assert_eq!(parse_date(None, "dob").unwrap(), None);
    }

    #[test]
    fn parse_date_rejects_garbage_with_field_name() {
        let err = parse_date(Some(&json!("05/17/2020")), "incident_date").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid date format for 'incident_date'. Use ISO format YYYY-MM-DD."
        );
        assert!(parse_date(Some(&json!(20200517)), "incident_date").is_err());
    }

    #[test]
    fn new_case_applies_defaults() {
        let case = NewCase::from_json(&object(json!({"case_name": "   "}))).unwrap();
        assert_eq!(case.case_name, "Untitled Case");
        assert_eq!(case.case_type.as_deref(), Some("pi"));
        assert_eq!(case.assumptions, json!({}));

        let case = NewCase::from_json(&object(json!({
            "case_name": " Doe v. Acme ",
            "case_type": "wd",
            "wle_years": "12.5",
            "assumptions": {"discount": {"rate": 0.03}}
        })))
        .unwrap();
        assert_eq!(case.case_name, "Doe v. Acme");
        assert_eq!(case.case_type.as_deref(), Some("wd"));
        assert_eq!(case.wle_years, Some(12.5));
        assert_eq!(case.assumptions["discount"]["rate"], json!(0.03));
    }
}
