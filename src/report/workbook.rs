use chrono::{DateTime, NaiveDate, Utc};
use rust_xlsxwriter::{ConditionalFormat3ColorScale, Format, Formula, Workbook, Worksheet};
use serde_json::Value;
use tracing::{debug, info};

use crate::core::{
    AssumptionView, ExportPayload, Row, Schedule, SensitivityGrid, build_provenance,
    validate_assumption_ranges,
};

use super::tables::{discount_header, growth_header};
use super::{FutureBasis, RenderContext, RenderedReport, ReportError, XLSX_CONTENT_TYPE, XLSX_FILENAME};

const BASE_SHEET: &str = "Tinari Base";
const SENSITIVITY_SHEET: &str = "Sensitivity";
const PROVENANCE_SHEET: &str = "Provenance";

const AEF_INPUTS: [(&str, &str); 6] = [
    ("AEF (Adjusted Earnings Factor)", "factor"),
    ("GE (Gross Earnings Base)", "grossEarningsBase"),
    ("WLE (Worklife Adjusted Earnings Base)", "wle"),
    ("UF (Unemployment Factor)", "ufEff"),
    ("TR (Combined Effective Tax Rate)", "tlEff"),
    ("FB (Fringe Benefits Loading)", "fringePct"),
];

// Zero-based grid positions of the fixed Tinari sheet header block.
const DISCOUNT_ROW: u32 = 6;
const HEADER_ROW: u32 = 8;
const AUDIT_ROW: u32 = 9;
const YEARS_COL: u16 = 6;

struct Formats {
    bold: Format,
    italic: Format,
    money: Format,
    money_bold: Format,
    portion: Format,
    rate: Format,
    years: Format,
}

impl Formats {
    fn new() -> Self {
        let money = "$#,##0.00";
        Self {
            bold: Format::new().set_bold(),
            italic: Format::new().set_italic(),
            money: Format::new().set_num_format(money),
            money_bold: Format::new().set_num_format(money).set_bold(),
            portion: Format::new().set_num_format("0.000"),
            rate: Format::new().set_num_format("0.00%"),
            years: Format::new().set_num_format("0.0000"),
        }
    }
}

/// Renders the formula-bearing workbook. Each sheet is built on its own and
/// only attached when it succeeds.
pub fn render_workbook(
    payload: &ExportPayload,
    now: DateTime<Utc>,
) -> Result<RenderedReport, ReportError> {
    let view = payload.view();
    let basis = FutureBasis::from_view(&view);
    let formats = Formats::new();
    let mut ctx = RenderContext::new();
    let mut workbook = Workbook::new();

    attach(&mut workbook, &mut ctx, "tinari_base_sheet", || {
        tinari_sheet(BASE_SHEET, &payload.schedule, &view, basis, &formats)
    });
    for (idx, scenario) in payload.retirement_scenarios.iter().enumerate() {
        let scenario_view = view.layered(scenario.assumptions.as_ref());
        let name = format!("Retire {}", idx + 1);
        let section = format!("retire_{}_sheet", idx + 1);
        attach(&mut workbook, &mut ctx, &section, || {
            tinari_sheet(&name, &scenario.schedule, &scenario_view, basis, &formats)
        });
    }
    if basis.is_discounted() {
        if let Some(grid) = payload.sensitivity.as_ref().filter(|g| g.has_results()) {
            attach(&mut workbook, &mut ctx, "sensitivity_sheet", || {
                sensitivity_sheet(grid, &formats)
            });
        }
    }
    attach(&mut workbook, &mut ctx, "provenance_sheet", || {
        provenance_sheet(payload, now, &formats)
    });

    let bytes = save(&mut workbook)?;
    let warnings = ctx.into_warnings();
    info!(
        bytes = bytes.len(),
        failed_sections = warnings.len(),
        "rendered damages workbook"
    );
    Ok(RenderedReport {
        bytes,
        filename: XLSX_FILENAME.to_string(),
        content_type: XLSX_CONTENT_TYPE,
        warnings,
    })
}

fn attach(
    workbook: &mut Workbook,
    ctx: &mut RenderContext,
    section: &str,
    build: impl FnOnce() -> Result<Worksheet, ReportError>,
) {
    match build() {
        Ok(sheet) => {
            workbook.push_worksheet(sheet);
            debug!(section, "workbook sheet rendered");
        }
        Err(err) => ctx.record(section, &err),
    }
}

/// Saves through a temp file that is removed once the bytes are read back.
fn save(workbook: &mut Workbook) -> Result<Vec<u8>, ReportError> {
    let file = tempfile::Builder::new()
        .prefix("damages_report")
        .suffix(".xlsx")
        .tempfile()?;
    workbook.save(file.path())?;
    Ok(std::fs::read(file.path())?)
}

fn write_value(ws: &mut Worksheet, row: u32, col: u16, value: &Value) -> Result<(), ReportError> {
    match value {
        Value::Number(n) => {
            if let Some(n) = n.as_f64() {
                ws.write_number(row, col, n)?;
            }
        }
        Value::String(s) => {
            ws.write_string(row, col, s)?;
        }
        Value::Bool(b) => {
            ws.write_boolean(row, col, *b)?;
        }
        _ => {}
    }
    Ok(())
}

fn formula(text: String, result: f64) -> Formula {
    Formula::new(text).set_result(result.to_string())
}

/// Fractional years from the valuation date to July 1 of `year`, never
/// negative; zero without a valuation date or a numeric year.
pub fn years_from_valuation(year: Option<i32>, valuation: Option<NaiveDate>) -> f64 {
    let (Some(year), Some(valuation)) = (year, valuation) else {
        return 0.0;
    };
    let Some(mid_year) = NaiveDate::from_ymd_opt(year, 7, 1) else {
        return 0.0;
    };
    let days = (mid_year - valuation).num_days() as f64;
    (days / 365.25).max(0.0)
}

struct TinariLayout {
    factor: Option<f64>,
    rate: f64,
    valuation: Option<NaiveDate>,
    basis: FutureBasis,
}

struct TinariLine {
    adjusted: f64,
    value: f64,
    years: f64,
}

impl TinariLayout {
    fn line(&self, row: &Row) -> TinariLine {
        let adjusted = match self.factor {
            Some(factor) => row.bf_gross * factor,
            None => row.bf_adj,
        };
        let value = match self.basis {
            FutureBasis::PresentValue => row.past_part + row.pv_future_or_zero(),
            FutureBasis::Nominal => row.past_part + row.future_part,
        };
        TinariLine {
            adjusted,
            value,
            years: years_from_valuation(row.year_number(), self.valuation),
        }
    }

    fn write_row(
        &self,
        ws: &mut Worksheet,
        idx: u32,
        row: &Row,
        formats: &Formats,
    ) -> Result<TinariLine, ReportError> {
        let line = self.line(row);
        let excel = idx + 1;
        write_value(ws, idx, 0, &row.year)?;
        write_value(ws, idx, 1, &row.age)?;
        match &row.portion {
            Some(Value::Number(n)) => {
                ws.write_number_with_format(idx, 2, n.as_f64().unwrap_or(0.0), &formats.portion)?;
            }
            Some(other) => write_value(ws, idx, 2, other)?,
            None => {
                ws.write_number_with_format(idx, 2, 0.0, &formats.portion)?;
            }
        }
        ws.write_number_with_format(idx, 3, row.bf_gross, &formats.money)?;
        if self.factor.is_some() {
            ws.write_formula_with_format(
                idx,
                4,
                formula(format!("=D{excel}*$B$1"), line.adjusted),
                &formats.money,
            )?;
        } else {
            ws.write_number_with_format(idx, 4, line.adjusted, &formats.money)?;
        }
        ws.write_number_with_format(idx, 5, line.value, &formats.money)?;
        ws.write_number_with_format(idx, YEARS_COL, line.years, &formats.years)?;
        if self.basis.is_discounted() {
            let check = line.adjusted / (1.0 + self.rate).powf(line.years);
            ws.write_formula_with_format(
                idx,
                7,
                formula(
                    format!("=E{excel}/(1+$B${})^G{excel}", DISCOUNT_ROW + 1),
                    check,
                ),
                &formats.money,
            )?;
        }
        Ok(line)
    }
}

fn tinari_sheet(
    name: &str,
    schedule: &Schedule,
    view: &AssumptionView<'_>,
    basis: FutureBasis,
    formats: &Formats,
) -> Result<Worksheet, ReportError> {
    let mut ws = Worksheet::new();
    ws.set_name(name)?;

    for (idx, (label, key)) in AEF_INPUTS.iter().enumerate() {
        let idx = idx as u32;
        ws.write_string(idx, 0, *label)?;
        if let Some(value) = view.get("aef", key).value() {
            write_value(&mut ws, idx, 1, value)?;
        }
    }
    let layout = TinariLayout {
        factor: view.number("aef", "factor").filter(|f| *f != 0.0),
        rate: view.discount_rate(),
        valuation: view.valuation_date(),
        basis,
    };
    ws.write_string(DISCOUNT_ROW, 0, "Discount Rate")?;
    ws.write_number_with_format(DISCOUNT_ROW, 1, layout.rate, &formats.rate)?;
    ws.write_string(DISCOUNT_ROW, 2, view.growth_label())?;

    let mut headers = vec![
        "Year",
        "Age",
        "Portion of Year",
        "Base Earnings",
        "Adjusted Income",
        match basis {
            FutureBasis::PresentValue => "Present Value",
            FutureBasis::Nominal => "Nominal Value",
        },
        "Years From Valuation",
    ];
    if basis.is_discounted() {
        headers.push("PV Check");
    }
    for (col, header) in headers.iter().enumerate() {
        ws.write_string_with_format(HEADER_ROW, col as u16, *header, &formats.bold)?;
    }
    ws.write_string_with_format(AUDIT_ROW, 3, "Adjusted = Base * AEF", &formats.italic)?;
    ws.write_string_with_format(
        AUDIT_ROW,
        4,
        "PV = Adjusted / (1 + r)^years_from_val",
        &formats.italic,
    )?;

    let mut idx = AUDIT_ROW + 1;
    let mut subtotals: Vec<(u32, f64, f64)> = Vec::new();
    for (section, total_label, rows) in [
        ("Past Years", "Past Totals", &schedule.rows_pre),
        ("Future Years", "Future Totals", &schedule.rows_post),
    ] {
        ws.write_string_with_format(idx, 0, section, &formats.bold)?;
        idx += 1;
        if rows.is_empty() {
            continue;
        }
        let first = idx + 1;
        let (mut adjusted, mut value) = (0.0, 0.0);
        for row in rows {
            let line = layout.write_row(&mut ws, idx, row, formats)?;
            adjusted += line.adjusted;
            value += line.value;
            idx += 1;
        }
        let last = idx;
        ws.write_string_with_format(idx, 3, total_label, &formats.bold)?;
        ws.write_formula_with_format(
            idx,
            4,
            formula(format!("=SUM(E{first}:E{last})"), adjusted),
            &formats.money_bold,
        )?;
        ws.write_formula_with_format(
            idx,
            5,
            formula(format!("=SUM(F{first}:F{last})"), value),
            &formats.money_bold,
        )?;
        subtotals.push((idx + 1, adjusted, value));
        idx += 1;
    }

    if !subtotals.is_empty() {
        let refs = |col: char| {
            subtotals
                .iter()
                .map(|(row, _, _)| format!("{col}{row}"))
                .collect::<Vec<_>>()
                .join(",")
        };
        let adjusted: f64 = subtotals.iter().map(|(_, a, _)| a).sum();
        let value: f64 = subtotals.iter().map(|(_, _, v)| v).sum();
        ws.write_string_with_format(idx, 3, "Total", &formats.bold)?;
        ws.write_formula_with_format(
            idx,
            4,
            formula(format!("=SUM({})", refs('E')), adjusted),
            &formats.money_bold,
        )?;
        ws.write_formula_with_format(
            idx,
            5,
            formula(format!("=SUM({})", refs('F')), value),
            &formats.money_bold,
        )?;
    }

    for col in 0..headers.len() {
        ws.set_column_width(col as u16, 18)?;
    }
    ws.set_column_hidden(YEARS_COL)?;
    Ok(ws)
}

fn sensitivity_sheet(grid: &SensitivityGrid, formats: &Formats) -> Result<Worksheet, ReportError> {
    let aligned = grid.align()?;
    let mut ws = Worksheet::new();
    ws.set_name(SENSITIVITY_SHEET)?;

    for (col, header) in ["Discount Δ", "Growth Δ", "Total PV", "Past", "Future PV"]
        .iter()
        .enumerate()
    {
        ws.write_string_with_format(0, col as u16, *header, &formats.bold)?;
    }
    let mut idx = 1;
    for (i, cells) in aligned.cells.iter().enumerate() {
        for (j, cell) in cells.iter().enumerate() {
            let Some(cell) = cell else {
                continue;
            };
            ws.write_number(idx, 0, aligned.discount_deltas[i])?;
            ws.write_number(idx, 1, aligned.growth_deltas[j])?;
            ws.write_number_with_format(idx, 2, cell.total(), &formats.money)?;
            ws.write_number_with_format(idx, 3, cell.past_dam.unwrap_or(0.0), &formats.money)?;
            ws.write_number_with_format(idx, 4, cell.future_pv.unwrap_or(0.0), &formats.money)?;
            idx += 1;
        }
    }

    let corner = idx + 1;
    ws.write_string_with_format(corner, 0, "Disc\\Growth", &formats.bold)?;
    for j in 0..aligned.growth_deltas.len() {
        ws.write_string_with_format(corner, j as u16 + 1, growth_header(&aligned, j), &formats.bold)?;
    }
    for (i, cells) in aligned.cells.iter().enumerate() {
        let row = corner + 1 + i as u32;
        ws.write_string_with_format(row, 0, discount_header(&aligned, i), &formats.bold)?;
        for (j, cell) in cells.iter().enumerate() {
            if let Some(cell) = cell {
                ws.write_number_with_format(row, j as u16 + 1, cell.total(), &formats.money)?;
            }
        }
    }
    if !aligned.cells.is_empty() && !aligned.growth_deltas.is_empty() {
        ws.add_conditional_format(
            corner + 1,
            1,
            corner + aligned.cells.len() as u32,
            aligned.growth_deltas.len() as u16,
            &ConditionalFormat3ColorScale::new(),
        )?;
    }
    for col in 0..=aligned.growth_deltas.len().max(4) {
        ws.set_column_width(col as u16, 16)?;
    }
    Ok(ws)
}

fn provenance_sheet(
    payload: &ExportPayload,
    now: DateTime<Utc>,
    formats: &Formats,
) -> Result<Worksheet, ReportError> {
    let provenance = build_provenance(&payload.assumptions, now);
    let violations = validate_assumption_ranges(&payload.assumptions);
    let mut ws = Worksheet::new();
    ws.set_name(PROVENANCE_SHEET)?;

    ws.write_string_with_format(0, 0, "Generated (UTC)", &formats.bold)?;
    ws.write_string(0, 1, &provenance.generated_at)?;
    ws.write_string_with_format(1, 0, "Assumptions fingerprint (SHA-256)", &formats.bold)?;
    ws.write_string(1, 1, &provenance.fingerprint)?;

    let mut idx = 3;
    ws.write_string_with_format(idx, 0, "Sources", &formats.bold)?;
    idx += 1;
    if provenance.sources.is_empty() {
        ws.write_string(idx, 1, "No explicit sources provided.")?;
        idx += 1;
    }
    for source in &provenance.sources {
        ws.write_string(idx, 1, source)?;
        idx += 1;
    }

    idx += 1;
    ws.write_string_with_format(idx, 0, "Validation", &formats.bold)?;
    idx += 1;
    if violations.is_empty() {
        ws.write_string(idx, 1, "All monitored inputs fall within configured ranges.")?;
    }
    for violation in &violations {
        ws.write_string(idx, 1, violation)?;
        idx += 1;
    }

    ws.set_column_width(0, 36)?;
    ws.set_column_width(1, 120)?;
    Ok(ws)
}
