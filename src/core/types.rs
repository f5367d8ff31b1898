use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

use super::value::{Lookup, coerce_money, coerce_number, display_value, lookup, truthy};

#[derive(Debug, Error, PartialEq)]
pub enum PayloadError {
    #[error("No data provided")]
    Empty,
    #[error("Missing required field '{0}'")]
    Missing(&'static str),
    #[error("Field '{0}' must be an object")]
    NotAnObject(&'static str),
}

fn amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(coerce_money(&raw).unwrap_or(0.0))
}

fn optional_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(coerce_money(&raw))
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

fn object_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let raw = Value::deserialize(deserializer)?;
    let Value::Array(items) = raw else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

fn object_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned + Default,
{
    let raw = Value::deserialize(deserializer)?;
    if !raw.is_object() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(raw).unwrap_or_default())
}

fn object_only<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(raw.is_object().then_some(raw))
}

static NULL: Value = Value::Null;

/// One year (or partial year) of the damages schedule.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Row {
    pub year: Value,
    pub age: Value,
    #[serde(deserialize_with = "present")]
    pub portion: Option<Value>,
    #[serde(deserialize_with = "amount")]
    pub bf_gross: f64,
    #[serde(deserialize_with = "amount")]
    pub bf_adj: f64,
    #[serde(rename = "bfHW", deserialize_with = "amount")]
    pub bf_hw: f64,
    #[serde(deserialize_with = "amount")]
    pub bf_pension: f64,
    #[serde(deserialize_with = "amount")]
    pub bf_fringe: f64,
    #[serde(deserialize_with = "amount")]
    pub bf_legals: f64,
    #[serde(deserialize_with = "amount")]
    pub act_e: f64,
    #[serde(deserialize_with = "amount")]
    pub act_fringe: f64,
    #[serde(deserialize_with = "amount")]
    pub act_legals: f64,
    #[serde(deserialize_with = "amount")]
    pub loss: f64,
    #[serde(deserialize_with = "amount")]
    pub past_part: f64,
    #[serde(deserialize_with = "amount")]
    pub future_part: f64,
    #[serde(deserialize_with = "optional_amount")]
    pub survival_weighted_future: Option<f64>,
    #[serde(deserialize_with = "optional_amount")]
    pub pv_future: Option<f64>,
    #[serde(deserialize_with = "optional_amount")]
    pub survival_prob: Option<f64>,
}

impl Row {
    pub fn year_text(&self) -> String {
        if self.year.is_null() {
            String::new()
        } else {
            display_value(&self.year)
        }
    }

    pub fn age_text(&self) -> String {
        if self.age.is_null() {
            String::new()
        } else {
            display_value(&self.age)
        }
    }

    pub fn year_number(&self) -> Option<i32> {
        match &self.year {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
                .and_then(|y| i32::try_from(y).ok()),
            Value::String(s) => s.trim().parse::<i32>().ok(),
            _ => None,
        }
    }

    pub fn portion(&self) -> &Value {
        self.portion.as_ref().unwrap_or(&NULL)
    }

    /// Portion counted toward years of loss: a missing portion counts as a
    /// full year, falsy values as none, and unparseable values as one.
    pub fn portion_years(&self) -> f64 {
        match &self.portion {
            None => 1.0,
            Some(v) if !truthy(v) => 0.0,
            Some(v) => coerce_number(v).unwrap_or(1.0),
        }
    }

    pub fn pv_future_or_zero(&self) -> f64 {
        self.pv_future.unwrap_or(0.0)
    }

    /// PV when the row carries one, the raw future portion otherwise.
    pub fn pv_future_or_raw(&self) -> f64 {
        self.pv_future.unwrap_or(self.future_part)
    }

    pub fn survival_weighted(&self) -> f64 {
        self.survival_weighted_future.unwrap_or(self.future_part)
    }

    pub fn survival_probability(&self) -> f64 {
        match self.survival_prob {
            Some(p) if p != 0.0 && !p.is_nan() => p,
            _ => 1.0,
        }
    }

    pub fn but_for_total(&self) -> f64 {
        self.bf_adj + self.bf_fringe + self.bf_legals
    }

    pub fn actual_total(&self) -> f64 {
        self.act_e + self.act_fringe + self.act_legals
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Totals {
    #[serde(rename = "pastDam", deserialize_with = "optional_amount")]
    pub past_dam: Option<f64>,
    #[serde(rename = "futurePV", deserialize_with = "optional_amount")]
    pub future_pv: Option<f64>,
    #[serde(rename = "totalPV", deserialize_with = "optional_amount")]
    pub total_pv: Option<f64>,
}

impl Totals {
    pub fn past(&self) -> f64 {
        self.past_dam.unwrap_or(0.0)
    }

    pub fn future(&self) -> f64 {
        self.future_pv.unwrap_or(0.0)
    }

    pub fn total(&self) -> f64 {
        self.total_pv.unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Schedule {
    #[serde(deserialize_with = "object_list")]
    pub rows: Vec<Row>,
    #[serde(deserialize_with = "object_list")]
    pub rows_pre: Vec<Row>,
    #[serde(deserialize_with = "object_list")]
    pub rows_post: Vec<Row>,
    #[serde(deserialize_with = "object_or_default")]
    pub totals: Totals,
}

impl Schedule {
    pub fn nominal_future(&self) -> f64 {
        self.rows.iter().map(|r| r.future_part).sum()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetirementScenario {
    pub name: Value,
    pub retire_age: Value,
    pub retire_date: Value,
    #[serde(deserialize_with = "object_or_default")]
    pub schedule: Schedule,
    #[serde(deserialize_with = "object_or_default")]
    pub totals: Totals,
    #[serde(deserialize_with = "object_only")]
    pub assumptions: Option<Value>,
}

impl RetirementScenario {
    pub fn display_name(&self, index: usize) -> String {
        match &self.name {
            Value::Null => format!("Scenario {}", index + 1),
            other => display_value(other),
        }
    }

    pub fn retire_age_text(&self) -> String {
        if self.retire_age.is_null() {
            String::new()
        } else {
            display_value(&self.retire_age)
        }
    }

    /// Date portion (`YYYY-MM-DD`) of the retirement date when it is a
    /// timestamp string.
    pub fn retire_date_text(&self) -> String {
        match &self.retire_date {
            Value::Null => String::new(),
            Value::String(s) if s.len() >= 10 => s.chars().take(10).collect(),
            other => display_value(other),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SensitivityCell {
    #[serde(rename = "totalPV", deserialize_with = "optional_amount")]
    pub total_pv: Option<f64>,
    #[serde(deserialize_with = "optional_amount")]
    pub past_dam: Option<f64>,
    #[serde(rename = "futurePV", deserialize_with = "optional_amount")]
    pub future_pv: Option<f64>,
    #[serde(deserialize_with = "object_or_default")]
    pub schedule: Schedule,
    #[serde(deserialize_with = "object_only")]
    pub assumptions: Option<Value>,
}

impl SensitivityCell {
    pub fn total(&self) -> f64 {
        self.total_pv.unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SensitivityGrid {
    pub discount_range: Value,
    pub growth_range: Value,
    pub range: Value,
    #[serde(deserialize_with = "amount")]
    pub base_discount_rate: f64,
    #[serde(deserialize_with = "amount")]
    pub base_growth_rate: f64,
    pub method: Value,
    pub results: Value,
}

#[derive(Debug, Error, PartialEq)]
pub enum GridError {
    #[error("sensitivity {axis} range is not a list")]
    NotAList { axis: &'static str },
    #[error("sensitivity {axis} delta at position {index} is not numeric")]
    NonNumericDelta { axis: &'static str, index: usize },
    #[error("sensitivity results have {rows} rows but {expected} discount deltas")]
    RowCount { rows: usize, expected: usize },
    #[error("sensitivity results row {row} has {cells} cells but {expected} growth deltas")]
    CellCount {
        row: usize,
        cells: usize,
        expected: usize,
    },
}

/// A sensitivity grid whose rows line up with the discount deltas and whose
/// cells line up with the growth deltas.
#[derive(Debug, Clone)]
pub struct AlignedGrid {
    pub discount_deltas: Vec<f64>,
    pub growth_deltas: Vec<f64>,
    pub base_discount_rate: f64,
    pub base_growth_rate: f64,
    pub net_method: bool,
    pub method_label: String,
    pub cells: Vec<Vec<Option<SensitivityCell>>>,
}

impl SensitivityGrid {
    pub fn has_results(&self) -> bool {
        truthy(&self.results)
    }

    /// Deltas for one axis, falling back to `range` when the axis list is
    /// absent or null.
    fn deltas(&self, primary: &Value, axis: &'static str) -> Result<Vec<f64>, GridError> {
        let raw = if primary.is_null() { &self.range } else { primary };
        match raw {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, v)| coerce_number(v).ok_or(GridError::NonNumericDelta { axis, index }))
                .collect(),
            _ => Err(GridError::NotAList { axis }),
        }
    }

    pub fn align(&self) -> Result<AlignedGrid, GridError> {
        let discount_deltas = self.deltas(&self.discount_range, "discount")?;
        let growth_deltas = self.deltas(&self.growth_range, "growth")?;

        let rows: &[Value] = self.results.as_array().map(Vec::as_slice).unwrap_or(&[]);
        if rows.len() != discount_deltas.len() {
            return Err(GridError::RowCount {
                rows: rows.len(),
                expected: discount_deltas.len(),
            });
        }

        let mut cells = Vec::with_capacity(rows.len());
        for (row_idx, row) in rows.iter().enumerate() {
            let items: &[Value] = row.as_array().map(Vec::as_slice).unwrap_or(&[]);
            if items.len() != growth_deltas.len() {
                return Err(GridError::CellCount {
                    row: row_idx,
                    cells: items.len(),
                    expected: growth_deltas.len(),
                });
            }
            cells.push(
                items
                    .iter()
                    .map(|cell| {
                        cell.is_object()
                            .then(|| serde_json::from_value(cell.clone()).ok())
                            .flatten()
                    })
                    .collect(),
            );
        }

        let method_label = match &self.method {
            Value::Null => String::new(),
            other => display_value(other),
        };
        Ok(AlignedGrid {
            discount_deltas,
            growth_deltas,
            base_discount_rate: self.base_discount_rate,
            base_growth_rate: self.base_growth_rate,
            net_method: self.method.as_str() == Some("ndr"),
            method_label,
            cells,
        })
    }
}

impl AlignedGrid {
    pub fn discount_rate(&self, i: usize) -> f64 {
        self.base_discount_rate + self.discount_deltas[i]
    }

    pub fn growth_rate(&self, j: usize) -> f64 {
        self.base_growth_rate + self.growth_deltas[j]
    }

    pub fn growth_disabled(&self) -> bool {
        self.growth_deltas.len() == 1 && self.growth_deltas[0] == 0.0
    }
}

/// The complete request body shared by the export endpoints.
#[derive(Debug, Clone)]
pub struct ExportPayload {
    pub assumptions: Value,
    pub schedule: Schedule,
    pub retirement_scenarios: Vec<RetirementScenario>,
    pub sensitivity: Option<SensitivityGrid>,
    pub active_scenario: Option<String>,
}

impl ExportPayload {
    pub fn from_json(body: &Value) -> Result<Self, PayloadError> {
        let Some(root) = body.as_object().filter(|m| !m.is_empty()) else {
            return Err(PayloadError::Empty);
        };

        let assumptions = match root.get("assumptions") {
            None | Some(Value::Null) => Value::Object(serde_json::Map::new()),
            Some(v @ Value::Object(_)) => v.clone(),
            Some(_) => return Err(PayloadError::NotAnObject("assumptions")),
        };

        let schedule = match root.get("schedule") {
            None | Some(Value::Null) => return Err(PayloadError::Missing("schedule")),
            Some(v @ Value::Object(_)) => {
                serde_json::from_value(v.clone()).unwrap_or_default()
            }
            Some(_) => return Err(PayloadError::NotAnObject("schedule")),
        };

        let retirement_scenarios = match root.get("retirementScenarios") {
            Some(Value::Array(items)) => items
                .iter()
                .filter(|v| v.is_object())
                .filter_map(|v| serde_json::from_value(v.clone()).ok())
                .collect(),
            _ => Vec::new(),
        };

        let sensitivity = root
            .get("sensitivityAnalysis")
            .filter(|v| v.is_object())
            .and_then(|v| serde_json::from_value(v.clone()).ok());

        let active_scenario = root
            .get("activeScenario")
            .and_then(|v| lookup(v, &["name"]).value())
            .filter(|v| truthy(v))
            .map(display_value);

        Ok(Self {
            assumptions,
            schedule,
            retirement_scenarios,
            sensitivity,
            active_scenario,
        })
    }

    pub fn view(&self) -> AssumptionView<'_> {
        AssumptionView::new(&self.assumptions)
    }
}

/// Read access to an assumptions tree, optionally overlaid with a
/// scenario's own assumptions. A section present in the overlay replaces the
/// base section as a whole.
#[derive(Debug, Clone, Copy)]
pub struct AssumptionView<'a> {
    base: &'a Value,
    overlay: Option<&'a Value>,
}

impl<'a> AssumptionView<'a> {
    pub fn new(base: &'a Value) -> Self {
        Self {
            base,
            overlay: None,
        }
    }

    pub fn layered(self, overlay: Option<&'a Value>) -> Self {
        Self {
            base: self.base,
            overlay,
        }
    }

    pub fn base(&self) -> &'a Value {
        self.base
    }

    pub fn get(&self, section: &str, key: &str) -> Lookup<'a> {
        let overlaid = self
            .overlay
            .and_then(|overlay| lookup(overlay, &[section]).value())
            .filter(|sec| sec.is_object());
        match overlaid {
            Some(sec) => lookup(sec, &[key]),
            None => lookup(self.base, &[section, key]),
        }
    }

    pub fn number(&self, section: &str, key: &str) -> Option<f64> {
        self.get(section, key).number()
    }

    pub fn aef_on(&self) -> bool {
        self.get("options", "includeAEF").truthy_or(false)
            && self.get("aef", "mode").as_str() == Some("on")
    }

    pub fn include_discounting(&self) -> bool {
        self.get("options", "includeDiscounting").truthy_or(true)
    }

    pub fn include_legals(&self) -> bool {
        self.get("options", "includeLegals").truthy_or(true)
    }

    pub fn use_ups_fringe(&self) -> bool {
        self.get("butFor", "fringeMethod").as_str() == Some("ups")
    }

    pub fn is_wrongful_death(&self) -> bool {
        self.get("meta", "caseType").as_str() == Some("wd")
    }

    pub fn case_name(&self) -> String {
        self.get("meta", "caseName")
            .value()
            .map(display_value)
            .unwrap_or_else(|| "Unnamed Case".to_string())
    }

    pub fn discount_rate(&self) -> f64 {
        let key = if self.get("discount", "method").as_str() == Some("ndr") {
            "ndr"
        } else {
            "rate"
        };
        self.number("discount", key).unwrap_or(0.0)
    }

    pub fn growth_label(&self) -> String {
        match self.get("butFor", "growthMethod").as_str() {
            Some("fixed") => {
                let growth = self.number("butFor", "growth").unwrap_or(0.0);
                format!("{:.2}% growth", growth * 100.0)
            }
            Some("ups") => "UPS contract growth (varies)".to_string(),
            Some("series") => "Series growth (varies)".to_string(),
            _ => String::new(),
        }
    }

    /// Valuation date from `dates.valuation`; accepts a plain date or a
    /// timestamp whose first ten characters are a date.
    pub fn valuation_date(&self) -> Option<NaiveDate> {
        let raw = self.get("dates", "valuation").as_str()?;
        let head = raw.get(..10).unwrap_or(raw);
        NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
    }

    /// Stored total-PV override carried on the assumptions themselves.
    pub fn total_pv_override(&self) -> Option<f64> {
        self.number("totals", "totalPV")
    }
}
