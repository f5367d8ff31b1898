use crate::core::{AlignedGrid, AssumptionView, RetirementScenario, Row};

use super::format::{money_whole, percent};
use super::tables::aggregate;
use super::{FutureBasis, ReportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Bar,
    ClusteredBar,
    Line,
    StackedArea,
    Pie,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    /// RGB hex without the leading `#`.
    pub color: &'static str,
    pub values: Vec<f64>,
}

impl Series {
    pub fn new(name: impl Into<String>, color: &'static str, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            color,
            values,
        }
    }
}

/// A native chart with literal category and value data.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    pub title: String,
    pub kind: ChartKind,
    pub categories: Vec<String>,
    pub series: Vec<Series>,
    /// Per-point colors for single-series pies and bars.
    pub point_colors: Vec<&'static str>,
    /// Excel-style number format for the value axis and labels.
    pub number_format: &'static str,
    pub show_values: bool,
}

impl ChartSpec {
    pub fn new(title: impl Into<String>, kind: ChartKind, categories: Vec<String>) -> Self {
        Self {
            title: title.into(),
            kind,
            categories,
            series: Vec::new(),
            point_colors: Vec::new(),
            number_format: CURRENCY_FORMAT,
            show_values: false,
        }
    }

    /// Label each point with its value using `format`.
    pub fn labelled(mut self, format: &'static str) -> Self {
        self.number_format = format;
        self.show_values = true;
        self
    }

    pub fn with_series(mut self, series: Series) -> Self {
        self.series.push(series);
        self
    }

    pub fn with_point_colors(mut self, colors: Vec<&'static str>) -> Self {
        self.point_colors = colors;
        self
    }

    fn invalid(&self, reason: String) -> ReportError {
        ReportError::Chart {
            title: self.title.clone(),
            reason,
        }
    }

    /// Every series must line up with the categories and carry finite values.
    pub fn validate(&self) -> Result<(), ReportError> {
        if self.categories.is_empty() {
            return Err(self.invalid("no categories".to_string()));
        }
        if self.series.is_empty() {
            return Err(self.invalid("no series".to_string()));
        }
        for series in &self.series {
            if series.values.len() != self.categories.len() {
                return Err(self.invalid(format!(
                    "series '{}' has {} values for {} categories",
                    series.name,
                    series.values.len(),
                    self.categories.len()
                )));
            }
            if let Some(idx) = series.values.iter().position(|v| !v.is_finite()) {
                return Err(self.invalid(format!(
                    "series '{}' value {} is not finite",
                    series.name, idx
                )));
            }
        }
        Ok(())
    }
}

/// Shaded grid of values, rendered as a colored table.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapSpec {
    pub title: String,
    pub corner: String,
    pub column_labels: Vec<String>,
    pub row_labels: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl HeatmapSpec {
    fn bounds(&self) -> Option<(f64, f64)> {
        let mut iter = self.values.iter().flatten().copied().filter(|v| v.is_finite());
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
    }

    /// Red at the minimum, yellow at the midpoint, green at the maximum.
    pub fn shade(&self, value: f64) -> String {
        let Some((lo, hi)) = self.bounds() else {
            return YELLOW.hex();
        };
        let t = if hi > lo { ((value - lo) / (hi - lo)).clamp(0.0, 1.0) } else { 0.5 };
        if t < 0.5 {
            RED.mix(YELLOW, t * 2.0).hex()
        } else {
            YELLOW.mix(GREEN, (t - 0.5) * 2.0).hex()
        }
    }

    pub fn label(value: f64) -> String {
        money_whole(value)
    }
}

#[derive(Clone, Copy)]
struct Rgb(u8, u8, u8);

const RED: Rgb = Rgb(0xF8, 0x69, 0x6B);
const YELLOW: Rgb = Rgb(0xFF, 0xEB, 0x84);
const GREEN: Rgb = Rgb(0x63, 0xBE, 0x7B);

impl Rgb {
    fn mix(self, other: Rgb, t: f64) -> Rgb {
        let lerp = |a: u8, b: u8| (f64::from(a) + (f64::from(b) - f64::from(a)) * t).round() as u8;
        Rgb(lerp(self.0, other.0), lerp(self.1, other.1), lerp(self.2, other.2))
    }

    fn hex(self) -> String {
        format!("{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }
}

pub const CURRENCY_FORMAT: &str = "$#,##0";

const PAST_COLOR: &str = "FF9999";
const FUTURE_COLOR: &str = "66B3FF";
const GAIN_COLOR: &str = "2CA02C";
const LOSS_COLOR: &str = "D62728";

fn years(rows: &[Row]) -> Vec<String> {
    rows.iter().map(Row::year_text).collect()
}

fn future_damages_label(basis: FutureBasis) -> &'static str {
    match basis {
        FutureBasis::PresentValue => "Future Damages (PV)",
        FutureBasis::Nominal => "Future Damages (Nominal)",
    }
}

pub fn annual_loss(rows: &[Row], title: &str) -> Option<ChartSpec> {
    if rows.is_empty() {
        return None;
    }
    let losses: Vec<f64> = rows.iter().map(|r| r.loss).collect();
    let colors = losses
        .iter()
        .map(|l| if *l < 0.0 { LOSS_COLOR } else { GAIN_COLOR })
        .collect();
    Some(
        ChartSpec::new(title, ChartKind::Bar, years(rows))
            .with_series(Series::new("Annual Loss", LOSS_COLOR, losses))
            .with_point_colors(colors),
    )
}

pub fn earnings_comparison(rows: &[Row], title: &str) -> Option<ChartSpec> {
    if rows.is_empty() {
        return None;
    }
    Some(
        ChartSpec::new(title, ChartKind::Line, years(rows))
            .with_series(Series::new(
                "But-For Earnings",
                GAIN_COLOR,
                rows.iter().map(|r| r.bf_gross).collect(),
            ))
            .with_series(Series::new(
                "Actual Earnings",
                LOSS_COLOR,
                rows.iter().map(|r| r.act_e).collect(),
            )),
    )
}

/// Past versus future share of damages; `None` when neither is positive.
pub fn damages_pie(past: f64, future: f64, basis: FutureBasis, title: &str) -> Option<ChartSpec> {
    if past <= 0.0 && future <= 0.0 {
        return None;
    }
    Some(
        ChartSpec::new(
            title,
            ChartKind::Pie,
            vec!["Past Damages".to_string(), future_damages_label(basis).to_string()],
        )
        .with_series(Series::new("Damages", PAST_COLOR, vec![past, future]))
        .with_point_colors(vec![PAST_COLOR, FUTURE_COLOR]),
    )
}

pub fn scenario_comparison(
    scenarios: &[RetirementScenario],
    basis: FutureBasis,
    title: &str,
) -> Option<ChartSpec> {
    if scenarios.is_empty() {
        return None;
    }
    let aggregates: Vec<_> = scenarios
        .iter()
        .map(|s| aggregate(&s.schedule.rows, &s.totals, basis))
        .collect();
    let names = scenarios
        .iter()
        .enumerate()
        .map(|(idx, s)| s.display_name(idx))
        .collect();
    Some(
        ChartSpec::new(title, ChartKind::ClusteredBar, names)
            .with_series(Series::new(
                "Past Damages",
                PAST_COLOR,
                aggregates.iter().map(|a| a.past).collect(),
            ))
            .with_series(Series::new(
                future_damages_label(basis),
                FUTURE_COLOR,
                aggregates.iter().map(|a| a.future).collect(),
            )),
    )
}

/// Compensation comparison (top) and annual loss (bottom) for one scenario.
pub fn scenario_timeline(scenario: &RetirementScenario, name: &str) -> Option<[ChartSpec; 2]> {
    let rows = &scenario.schedule.rows;
    if rows.is_empty() {
        return None;
    }
    let compensation = ChartSpec::new(
        format!("{name} - Compensation Comparison"),
        ChartKind::Line,
        years(rows),
    )
    .with_series(Series::new(
        "But-For Total",
        GAIN_COLOR,
        rows.iter().map(Row::but_for_total).collect(),
    ))
    .with_series(Series::new(
        "Actual Total",
        LOSS_COLOR,
        rows.iter().map(Row::actual_total).collect(),
    ));
    let losses = ChartSpec::new(format!("{name} - Annual Loss"), ChartKind::Bar, years(rows))
        .with_series(Series::new(
            "Annual Loss",
            LOSS_COLOR,
            rows.iter().map(|r| r.loss).collect(),
        ));
    Some([compensation, losses])
}

/// Running past and future damages, stacked.
pub fn cumulative(rows: &[Row], basis: FutureBasis, title: &str) -> Option<ChartSpec> {
    if rows.is_empty() {
        return None;
    }
    let mut past = Vec::with_capacity(rows.len());
    let mut future = Vec::with_capacity(rows.len());
    let (mut running_past, mut running_future) = (0.0, 0.0);
    for row in rows {
        running_past += row.past_part;
        running_future += match basis {
            FutureBasis::PresentValue => row.pv_future_or_zero(),
            FutureBasis::Nominal => row.future_part,
        };
        past.push(running_past);
        future.push(running_future);
    }
    let future_label = match basis {
        FutureBasis::PresentValue => "Cumulative Future (PV)",
        FutureBasis::Nominal => "Cumulative Future (Nominal)",
    };
    Some(
        ChartSpec::new(title, ChartKind::StackedArea, years(rows))
            .with_series(Series::new("Cumulative Past", PAST_COLOR, past))
            .with_series(Series::new(future_label, FUTURE_COLOR, future)),
    )
}

pub fn ups_fringe(rows: &[Row], title: &str) -> Option<ChartSpec> {
    if rows.is_empty() {
        return None;
    }
    Some(
        ChartSpec::new(title, ChartKind::ClusteredBar, years(rows))
            .with_series(Series::new(
                "Health & Welfare",
                "8C564B",
                rows.iter().map(|r| r.bf_hw).collect(),
            ))
            .with_series(Series::new(
                "Pension",
                "E377C2",
                rows.iter().map(|r| r.bf_pension).collect(),
            )),
    )
}

/// Total PV over the discount/growth grid; missing cells count as zero.
pub fn heatmap(grid: &AlignedGrid) -> Option<HeatmapSpec> {
    if grid.cells.is_empty() {
        return None;
    }
    Some(HeatmapSpec {
        title: "Sensitivity Analysis: Total Present Value".to_string(),
        corner: "Discount \\ Growth".to_string(),
        column_labels: (0..grid.growth_deltas.len())
            .map(|j| percent(grid.growth_rate(j), 1))
            .collect(),
        row_labels: (0..grid.discount_deltas.len())
            .map(|i| percent(grid.discount_rate(i), 1))
            .collect(),
        values: grid
            .cells
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| cell.as_ref().map(|c| c.total()).unwrap_or(0.0))
                    .collect()
            })
            .collect(),
    })
}

pub fn jury_items(past: f64, future: f64, basis: FutureBasis) -> Option<ChartSpec> {
    if past <= 0.0 && future <= 0.0 {
        return None;
    }
    Some(
        ChartSpec::new(
            "What Was Lost",
            ChartKind::Bar,
            vec!["Past Damages".to_string(), future_damages_label(basis).to_string()],
        )
        .with_series(Series::new("Damages", PAST_COLOR, vec![past, future]))
        .with_point_colors(vec![PAST_COLOR, FUTURE_COLOR])
        .labelled(CURRENCY_FORMAT),
    )
}

/// Years of loss as the sum of row portions, falling back to the row count
/// when the portions add up to nothing.
pub fn years_of_loss(rows: &[Row]) -> f64 {
    let total: f64 = rows.iter().map(Row::portion_years).sum();
    if total <= 0.0 { rows.len() as f64 } else { total }
}

pub fn jury_years(rows: &[Row]) -> Option<ChartSpec> {
    if rows.is_empty() {
        return None;
    }
    Some(
        ChartSpec::new(
            "How Long The Loss Lasts",
            ChartKind::Bar,
            vec!["Years with Loss".to_string()],
        )
        .with_series(Series::new("Years", "8DD3C7", vec![years_of_loss(rows)]))
        .labelled("0.0\" years\""),
    )
}

pub fn growth_caption(view: &AssumptionView<'_>) -> String {
    let growth = view.number("butFor", "growth").unwrap_or(0.0);
    match view.get("butFor", "growthMethod").as_str() {
        Some("fixed") => format!("{} fixed growth", percent(growth, 2)),
        Some("ups") => "UPS contract growth (varies by year)".to_string(),
        Some("series") => "Growth varies by series".to_string(),
        _ => format!("{} growth", percent(growth, 2)),
    }
}

pub fn jury_growth(view: &AssumptionView<'_>) -> ChartSpec {
    let growth = view.number("butFor", "growth").unwrap_or(0.0);
    ChartSpec::new(
        "Growth / Inflation Factor Used",
        ChartKind::Bar,
        vec![growth_caption(view)],
    )
    .with_series(Series::new("Growth / Inflation (%)", "80B1D3", vec![growth * 100.0]))
    .labelled("0.00\"%\"")
}

pub fn jury_total(total: f64, basis: FutureBasis) -> Option<ChartSpec> {
    if total <= 0.0 {
        return None;
    }
    let (title, label) = match basis {
        FutureBasis::PresentValue => ("Total Economic Loss (PV)", "Total Present Value"),
        FutureBasis::Nominal => ("Total Economic Loss (Nominal)", "Total Nominal Value"),
    };
    Some(
        ChartSpec::new(title, ChartKind::Bar, vec![label.to_string()])
            .with_series(Series::new(label, "FDB462", vec![total]))
            .labelled(CURRENCY_FORMAT),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Schedule, SensitivityGrid};
    use serde_json::json;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn rows() -> Vec<Row> {
        let schedule: Schedule = serde_json::from_value(json!({"rows": [
            {"year": 2023, "portion": 0.5, "bfGross": 100, "actE": 40, "loss": 60, "pastPart": 60},
            {"year": 2024, "bfGross": 110, "actE": 40, "loss": -5, "futurePart": 70, "pvFuture": 65}
        ]}))
        .unwrap();
        schedule.rows
    }

    #[test]
    fn validate_rejects_mismatched_and_non_finite_series() {
        let chart = ChartSpec::new("Loss", ChartKind::Bar, vec!["2024".into()])
            .with_series(Series::new("a", "000000", vec![1.0, 2.0]));
        assert!(matches!(chart.validate(), Err(ReportError::Chart { .. })));

        let chart = ChartSpec::new("Loss", ChartKind::Bar, vec!["2024".into()])
            .with_series(Series::new("a", "000000", vec![f64::NAN]));
        let err = chart.validate().unwrap_err();
        assert_eq!(err.to_string(), "chart 'Loss': series 'a' value 0 is not finite");

        assert!(annual_loss(&rows(), "Annual").unwrap().validate().is_ok());
    }

    #[test]
    fn annual_loss_colors_negative_years() {
        let chart = annual_loss(&rows(), "Annual Economic Loss by Year").unwrap();
        assert_eq!(chart.categories, vec!["2023", "2024"]);
        assert_eq!(chart.point_colors, vec![GAIN_COLOR, LOSS_COLOR]);
        assert!(annual_loss(&[], "x").is_none());
    }

    #[test]
    fn cumulative_runs_past_and_future() {
        let chart = cumulative(&rows(), FutureBasis::PresentValue, "Cumulative").unwrap();
        assert_eq!(chart.series[0].values, vec![60.0, 60.0]);
        assert_eq!(chart.series[1].values, vec![0.0, 65.0]);
        let nominal = cumulative(&rows(), FutureBasis::Nominal, "Cumulative").unwrap();
        assert_eq!(nominal.series[1].values, vec![0.0, 70.0]);
        assert_eq!(nominal.series[1].name, "Cumulative Future (Nominal)");
    }

    #[test]
    fn pie_and_jury_skip_empty_damages() {
        assert!(damages_pie(0.0, 0.0, FutureBasis::PresentValue, "Pie").is_none());
        assert!(damages_pie(0.0, 5.0, FutureBasis::PresentValue, "Pie").is_some());
        assert!(jury_items(-1.0, 0.0, FutureBasis::Nominal).is_none());
        assert!(jury_total(0.0, FutureBasis::PresentValue).is_none());
        assert_eq!(
            jury_total(10.0, FutureBasis::Nominal).unwrap().title,
            "Total Economic Loss (Nominal)"
        );
    }

    #[test]
    fn years_of_loss_sums_portions() {
        assert_approx(years_of_loss(&rows()), 1.5);
        let zero: Schedule = serde_json::from_value(json!({"rows": [{"portion": 0}, {"portion": null}]})).unwrap();
        assert_approx(years_of_loss(&zero.rows), 2.0);
    }

    #[test]
    fn growth_caption_by_method() {
        let fixed = json!({"butFor": {"growthMethod": "fixed", "growth": 0.03}});
        assert_eq!(growth_caption(&AssumptionView::new(&fixed)), "3.00% fixed growth");
        let ups = json!({"butFor": {"growthMethod": "ups"}});
        assert_eq!(growth_caption(&AssumptionView::new(&ups)), "UPS contract growth (varies by year)");
        let other = json!({"butFor": {"growth": 0.015}});
        assert_eq!(growth_caption(&AssumptionView::new(&other)), "1.50% growth");
        let chart = jury_growth(&AssumptionView::new(&fixed));
        assert_approx(chart.series[0].values[0], 3.0);
    }

    #[test]
    fn heatmap_labels_and_shading() {
        let grid: SensitivityGrid = serde_json::from_value(json!({
            "discountRange": [0.0, 0.01],
            "growthRange": [0.0, 0.01],
            "baseDiscountRate": 0.03,
            "baseGrowthRate": 0.02,
            "results": [[{"totalPV": 100}, {"totalPV": 200}], [{"totalPV": 50}, null]]
        }))
        .unwrap();
        let map = heatmap(&grid.align().unwrap()).unwrap();
        assert_eq!(map.row_labels, vec!["3.0%", "4.0%"]);
        assert_eq!(map.column_labels, vec!["2.0%", "3.0%"]);
        assert_eq!(map.values[1][1], 0.0);
        assert_eq!(map.shade(0.0), "F8696B");
        assert_eq!(map.shade(200.0), "63BE7B");
        assert_eq!(map.shade(100.0), "FFEB84");
    }

    #[test]
    fn timeline_has_two_panels() {
        let scenario: RetirementScenario = serde_json::from_value(json!({
            "name": "Retire 65",
            "schedule": {"rows": [{"year": 2030, "bfAdj": 10, "bfFringe": 2, "actE": 4, "loss": 8}]}
        }))
        .unwrap();
        let [top, bottom] = scenario_timeline(&scenario, "Retire 65").unwrap();
        assert_eq!(top.series[0].values, vec![12.0]);
        assert_eq!(top.series[1].values, vec![4.0]);
        assert_eq!(bottom.series[0].values, vec![8.0]);
    }
}
