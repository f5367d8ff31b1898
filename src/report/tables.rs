use serde_json::Value;

use crate::core::value::{Lookup, display_value};
use crate::core::{AlignedGrid, AssumptionView, RetirementScenario, Row, Totals};

use super::FutureBasis;
use super::columns::{self, ColumnSpec, Schema};
use super::format::{fixed, money, money_whole, percent, portion_detail, portion_percent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Data,
    Section,
    Subtotal,
    Total,
    Note,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub kind: RowKind,
    pub cells: Vec<String>,
}

/// Renderer-neutral table: a header row plus typed body rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<TableRow>,
}

impl Table {
    pub fn new<S: Into<String>>(headers: impl IntoIterator<Item = S>) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, kind: RowKind, cells: Vec<String>) {
        let mut cells = cells;
        cells.resize(self.headers.len(), String::new());
        self.rows.push(TableRow { kind, cells });
    }

    pub fn push_data(&mut self, cells: Vec<String>) {
        self.push(RowKind::Data, cells);
    }

    pub fn push_label(&mut self, kind: RowKind, label: &str) {
        self.push(kind, vec![label.to_string()]);
    }

    pub fn column(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }

    pub fn data_rows(&self) -> impl Iterator<Item = &TableRow> {
        self.rows.iter().filter(|r| r.kind == RowKind::Data)
    }
}

/// Column-selection inputs shared by every component table.
#[derive(Debug, Clone, Copy)]
pub struct TableOptions {
    pub aef_on: bool,
    pub use_ups_fringe: bool,
    pub include_legals: bool,
    pub basis: FutureBasis,
}

impl TableOptions {
    pub fn from_view(view: &AssumptionView<'_>, basis: FutureBasis) -> Self {
        Self {
            aef_on: view.aef_on(),
            use_ups_fringe: view.use_ups_fringe(),
            include_legals: view.include_legals(),
            basis,
        }
    }

    fn show_fringe(&self) -> bool {
        !self.aef_on
    }
}

/// Header wording for the year-by-year detail table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailLabels {
    Schedule,
    SensitivityCell,
}

struct DetailHeaders {
    adjusted: &'static str,
    fringe_total: &'static str,
    legals: &'static str,
    future_raw: &'static str,
    future_survival: &'static str,
    pv_future: &'static str,
    survival: &'static str,
}

impl DetailLabels {
    fn headers(self) -> DetailHeaders {
        match self {
            DetailLabels::Schedule => DetailHeaders {
                adjusted: "BF After-Tax",
                fringe_total: "Tot Fringe",
                legals: "BF Legals",
                future_raw: "Future Raw",
                future_survival: "Future Surv",
                pv_future: "PV Future",
                survival: "Surv Prob",
            },
            DetailLabels::SensitivityCell => DetailHeaders {
                adjusted: "BF After-Tax / AEF",
                fringe_total: "Total Fringe",
                legals: "BF Legally Req",
                future_raw: "Future (Raw)",
                future_survival: "Future (Survival)",
                pv_future: "PV(Future)",
                survival: "Survival Prob",
            },
        }
    }
}

fn fringe_columns(opts: &TableOptions, total_header: &'static str) -> Vec<ColumnSpec> {
    let show = opts.show_fringe();
    if opts.use_ups_fringe {
        vec![
            ColumnSpec::money("bfHW", "H&W", |r| r.bf_hw).when(show).if_nonzero(),
            ColumnSpec::money("bfPension", "Pension", |r| r.bf_pension)
                .when(show)
                .if_nonzero(),
            ColumnSpec::money("bfFringe", total_header, |r| r.bf_fringe)
                .when(show)
                .if_nonzero(),
        ]
    } else {
        vec![ColumnSpec::money("bfFringe", "BF Fringe", |r| r.bf_fringe)
            .when(show)
            .if_nonzero()]
    }
}

fn actual_columns(opts: &TableOptions) -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::money("actE", "ACT Earn", |r| r.act_e),
        ColumnSpec::money("actFringe", "ACT Fringe", |r| r.act_fringe).if_nonzero(),
        ColumnSpec::money("actLegals", "ACT Legals", |r| r.act_legals)
            .when(opts.include_legals)
            .if_nonzero(),
    ]
}

/// Full year-by-year component table for a schedule.
pub fn detail_table(rows: &[Row], opts: &TableOptions, labels: DetailLabels) -> Table {
    let h = labels.headers();
    let mut candidates = vec![
        ColumnSpec::text("year", "Year", columns::year),
        ColumnSpec::text("age", "Age", columns::age),
        ColumnSpec::text("portion", "Portion", columns::portion),
        ColumnSpec::money("bfGross", "BF Gross", |r| r.bf_gross),
        ColumnSpec::money("bfAdj", h.adjusted, |r| r.bf_adj),
    ];
    candidates.extend(fringe_columns(opts, h.fringe_total));
    candidates.push(
        ColumnSpec::money("bfLegals", h.legals, |r| r.bf_legals)
            .when(opts.include_legals)
            .if_nonzero(),
    );
    candidates.extend(actual_columns(opts));
    candidates.push(ColumnSpec::money("loss", "Loss", |r| r.loss));
    candidates.push(ColumnSpec::money("pastPart", "Past", |r| r.past_part));
    match opts.basis {
        FutureBasis::PresentValue => candidates.extend([
            ColumnSpec::money("futurePart", h.future_raw, |r| r.future_part),
            ColumnSpec::money("survivalWeightedFuture", h.future_survival, Row::survival_weighted),
            ColumnSpec::money("pvFuture", h.pv_future, Row::pv_future_or_zero),
            ColumnSpec::fixed("survivalProb", h.survival, Row::survival_probability, 3),
        ]),
        FutureBasis::Nominal => {
            candidates.push(ColumnSpec::money("futurePart", "Future", |r| r.future_part))
        }
    }

    let schema = Schema::realize(candidates, rows);
    let mut table = Table::new(schema.headers());
    for row in rows {
        table.push_data(schema.cells(row));
    }
    table
}

/// Outcome of reconciling the row-level future values against a stored
/// future total.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QaOutcome {
    pub row_sum: f64,
    pub expected: f64,
    pub stored: Option<f64>,
}

impl QaOutcome {
    pub const TOLERANCE: f64 = 1.0;

    pub fn difference(&self) -> f64 {
        (self.row_sum - self.expected).abs()
    }

    pub fn passed(&self) -> bool {
        self.difference() <= Self::TOLERANCE
    }

    pub fn message(&self) -> String {
        if self.passed() {
            "QA ✓ Year-over-year PV matches scenario Future PV".to_string()
        } else {
            format!(
                "QA Warning: Sum of YOY PV ({}) differs from scenario Future PV ({}).",
                money(self.row_sum),
                money(self.stored.unwrap_or(0.0))
            )
        }
    }
}

/// Sums each row's PV of future loss (raw future portion when no PV is
/// present) and compares it with the stored future PV. A missing stored
/// total reconciles trivially.
pub fn reconcile(rows: &[Row], totals: &Totals) -> QaOutcome {
    let row_sum: f64 = rows.iter().map(Row::pv_future_or_raw).sum();
    QaOutcome {
        row_sum,
        expected: totals.future_pv.unwrap_or(row_sum),
        stored: totals.future_pv,
    }
}

/// Condensed year-over-year summary with a TOTAL row and QA reconciliation.
pub fn yoy_summary(rows: &[Row], totals: &Totals, opts: &TableOptions) -> (Table, QaOutcome) {
    let mut candidates = vec![
        ColumnSpec::text("year", "Year", columns::year),
        ColumnSpec::text("age", "Age", columns::age),
        ColumnSpec::money("bfGross", "BF Gross", |r| r.bf_gross),
    ];
    candidates.extend(fringe_columns(opts, "Fringe Total"));
    candidates.push(
        ColumnSpec::money("bfLegals", "BF Legals", |r| r.bf_legals)
            .when(opts.include_legals)
            .if_nonzero(),
    );
    candidates.extend(actual_columns(opts));
    candidates.push(ColumnSpec::money("loss", "Loss", |r| r.loss));
    candidates.push(ColumnSpec::money("pastPart", "Past", |r| r.past_part));
    candidates.push(match opts.basis {
        FutureBasis::PresentValue => {
            ColumnSpec::money("future", "Future PV", Row::pv_future_or_zero)
        }
        FutureBasis::Nominal => ColumnSpec::money("future", "Future (Nominal)", |r| r.future_part),
    });

    let schema = Schema::realize(candidates, rows);
    let mut table = Table::new(schema.headers());
    for row in rows {
        table.push_data(schema.cells(row));
    }

    let future_total = match opts.basis {
        FutureBasis::PresentValue => totals.future(),
        FutureBasis::Nominal => rows.iter().map(|r| r.future_part).sum(),
    };
    let mut total = vec![String::new(); schema.len()];
    total[0] = "TOTAL".to_string();
    if let Some(idx) = schema.position("pastPart") {
        total[idx] = money(totals.past());
    }
    if let Some(idx) = schema.position("future") {
        total[idx] = money(future_total);
    }
    table.push(RowKind::Total, total);

    (table, reconcile(rows, totals))
}

/// Past, future, and total figures for a schedule under the active basis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregate {
    pub past: f64,
    pub future: f64,
    pub total: f64,
}

pub fn aggregate(rows: &[Row], totals: &Totals, basis: FutureBasis) -> Aggregate {
    let past = totals.past();
    match basis {
        FutureBasis::PresentValue => Aggregate {
            past,
            future: totals.future(),
            total: totals.total(),
        },
        FutureBasis::Nominal => {
            let future: f64 = rows.iter().map(|r| r.future_part).sum();
            Aggregate {
                past,
                future,
                total: past + future,
            }
        }
    }
}

fn numeric(lookup: Lookup<'_>) -> Option<f64> {
    lookup.value().filter(|v| v.is_number()).and_then(Value::as_f64)
}

fn formula_part(value: Option<f64>, with_value: impl Fn(f64) -> String, bare: &str) -> String {
    value.map(with_value).unwrap_or_else(|| bare.to_string())
}

/// AEF formula with each component's value, ending in the factor when one is
/// present.
pub fn aef_formula(view: &AssumptionView<'_>) -> String {
    let mut parts = vec![
        formula_part(
            numeric(view.get("aef", "wle")),
            |v| format!("(WLE/YFS {v:.5})"),
            "(WLE/YFS)",
        ),
        formula_part(
            numeric(view.get("aef", "ufEff")),
            |v| format!("× (1 - UR×(1-URF) {v:.5})"),
            "× (1 - UR×(1-URF))",
        ),
        formula_part(
            numeric(view.get("aef", "tlEff")),
            |v| format!("× (1 - TL_eff {v:.5})"),
            "× (1 - TL_eff)",
        ),
        formula_part(
            numeric(view.get("aef", "fringePct")),
            |v| format!("× (1 + FB {v:.5})"),
            "× (1 + FB)",
        ),
    ];
    if view.is_wrongful_death() {
        for (key, label) in [("PC", "PC"), ("PM", "PM")] {
            let lookup = view.get("aef", key);
            let value = if lookup.is_absent() { Some(0.0) } else { numeric(lookup) };
            parts.push(formula_part(
                value,
                |v| format!("× (1 - {label} {v:.5})"),
                &format!("× (1 - {label})"),
            ));
        }
    }
    if let Some(factor) = numeric(view.get("aef", "factor")) {
        parts.push(format!("= {factor:.5}"));
    }
    parts.join(" ")
}

/// Condensed Tinari-style schedule: Past and Future sections with
/// per-section totals and a grand total.
pub fn tinari_table(
    rows_pre: &[Row],
    rows_post: &[Row],
    view: &AssumptionView<'_>,
    basis: FutureBasis,
    total_override: Option<f64>,
) -> Table {
    let value_header = match basis {
        FutureBasis::PresentValue => "Present Value",
        FutureBasis::Nominal => "Nominal Value",
    };
    let mut table = Table::new([
        "Year",
        "Age",
        "Portion of Year",
        "Base Earnings",
        "Adjusted Income",
        value_header,
    ]);

    let (rate_note, value_equation) = match basis {
        FutureBasis::PresentValue => (
            format!("{} discount", percent(view.discount_rate(), 2)),
            "Present Value = Adjusted / (1 + r)^{years from valuation}".to_string(),
        ),
        FutureBasis::Nominal => (
            "Discounting off".to_string(),
            "Nominal Value = Past + Future (undiscounted)".to_string(),
        ),
    };
    table.push(
        RowKind::Note,
        vec![
            String::new(),
            String::new(),
            view.growth_label(),
            aef_formula(view),
            rate_note,
        ],
    );
    table.push(
        RowKind::Note,
        vec![
            String::new(),
            String::new(),
            String::new(),
            "Adjusted Income = Base × AEF".to_string(),
            value_equation,
        ],
    );

    let row_value = |row: &Row| match basis {
        FutureBasis::PresentValue => row.past_part + row.pv_future_or_zero(),
        FutureBasis::Nominal => row.past_part + row.future_part,
    };

    let mut adjusted_total = 0.0;
    let mut value_total = 0.0;
    for (section, label, rows) in [("Past Years", "Past", rows_pre), ("Future Years", "Future", rows_post)] {
        table.push_label(RowKind::Section, section);
        let mut section_adjusted = 0.0;
        let mut section_value = 0.0;
        for row in rows {
            let value = row_value(row);
            section_adjusted += row.bf_adj;
            section_value += value;
            table.push_data(vec![
                row.year_text(),
                row.age_text(),
                portion_percent(row.portion()),
                money(row.bf_gross),
                money(row.bf_adj),
                money(value),
            ]);
        }
        if !rows.is_empty() {
            table.push(
                RowKind::Subtotal,
                vec![
                    format!("{label} Totals"),
                    String::new(),
                    String::new(),
                    String::new(),
                    money(section_adjusted),
                    money(section_value),
                ],
            );
        }
        adjusted_total += section_adjusted;
        value_total += section_value;
    }

    let grand_total = match basis {
        FutureBasis::PresentValue => total_override.unwrap_or(value_total),
        FutureBasis::Nominal => value_total,
    };
    table.push(
        RowKind::Total,
        vec![
            "Total".to_string(),
            String::new(),
            String::new(),
            String::new(),
            money(adjusted_total),
            money(grand_total),
        ],
    );
    table
}

fn raw_or(lookup: Lookup<'_>, default: &str) -> String {
    match lookup {
        Lookup::Absent => default.to_string(),
        Lookup::Null => "None".to_string(),
        Lookup::Present(v) => display_value(v),
    }
}

/// Component-by-component breakdown of the adjusted earnings factor.
pub fn aef_breakdown(view: &AssumptionView<'_>) -> Table {
    let aef_on = view.aef_on();
    let wd = view.is_wrongful_death();
    let num = |key: &str, default: f64| view.number("aef", key).unwrap_or(default);
    let pct = |key: &str| percent(num(key, 0.0), 2);

    let gross_base = view
        .number("aef", "grossEarningsBase")
        .or_else(|| view.number("butFor", "salary"))
        .unwrap_or(0.0);
    let ur = num("UR", 0.0);
    let urf = num("URF", 0.0);
    let fringe = num("fringePct", 0.0);

    let section = |name: &'static str| (RowKind::Section, name, String::new(), String::new());
    let item = |name: &'static str, value: String, description: String| {
        (RowKind::Data, name, value, description)
    };

    let mut rows = vec![
        section("Base Components"),
        item(
            "Gross Earnings Base (GE)",
            money(gross_base),
            "Base annual but-for salary".to_string(),
        ),
        section("Work-Life & Unemployment Components"),
        item(
            "Worklife Adjusted Earnings Base (WLE)",
            fixed(num("wle", 1.0), 5),
            format!(
                "WLE / YFS = {} / {}",
                raw_or(view.get("horizon", "wleYears"), "0"),
                raw_or(view.get("horizon", "yfsYears"), "0")
            ),
        ),
        item("Unemployment Rate (UR)", pct("UR"), "Probability of unemployment".to_string()),
        item(
            "Unemployment Reimbursement (URF)",
            pct("URF"),
            "Portion of unemployment offset by benefits".to_string(),
        ),
        item(
            "Effective Unemployment",
            pct("ufEff"),
            format!("UR × (1 - URF) = {} × {}", percent(ur, 2), fixed(1.0 - urf, 3)),
        ),
        section("Tax Components"),
        item("Federal Tax (TLF)", pct("TLF"), "Federal income tax rate".to_string()),
        item("State Tax (TLS)", pct("TLS"), "State income tax rate".to_string()),
        item(
            "Combined Tax (Simple Add)",
            pct("tlCombined"),
            "TLF + TLS (for reference only)".to_string(),
        ),
        item(
            "Effective Tax Rate",
            pct("tlEff"),
            "1 - (1 - TLF) × (1 - TLS) = Multiplicative method".to_string(),
        ),
    ];
    if wd {
        rows.extend([
            section("Wrongful Death Components"),
            item(
                "Personal Consumption (PC)",
                pct("PC"),
                "Decedent's personal consumption".to_string(),
            ),
            item(
                "Personal Maintenance (PM)",
                pct("PM"),
                "Decedent's personal maintenance".to_string(),
            ),
        ]);
    }

    let wd_suffix = if wd { " × (1 - PC) × (1 - PM)" } else { "" };
    rows.extend([
        section("Fringe Benefit Load"),
        item(
            "Fringe Benefit %",
            percent(fringe, 2),
            "Fringe benefits as % of wages".to_string(),
        ),
        item(
            "Fringe Load Factor",
            fixed(1.0 + fringe, 5),
            "(1 + Fringe %) - multiplier applied in AEF".to_string(),
        ),
        section("Adjusted Earnings Factor (AEF)"),
        item(
            "AEF Factor",
            if aef_on {
                fixed(num("factor", 1.0), 5)
            } else {
                "1.00000 (OFF)".to_string()
            },
            format!("WLE × (1 - UF) × (1 - TR) × (1 + FB){wd_suffix}"),
        ),
        item(
            "AEF (Adjusted Annual Earnings)",
            if aef_on {
                money(num("value", 0.0))
            } else {
                "N/A (OFF)".to_string()
            },
            format!("GE × WLE × (1 - UF) × (1 - TR) × (1 + FB){wd_suffix}"),
        ),
        item(
            "AEF Applied To",
            if aef_on { "Gross Wages" } else { "N/A" }.to_string(),
            if aef_on {
                "Result = Wages × AEF Factor (includes wage + fringe adjustment)"
            } else {
                "AEF is turned off"
            }
            .to_string(),
        ),
        item(
            "Fringe Treatment",
            if aef_on { "Built into AEF" } else { "Added separately" }.to_string(),
            if aef_on {
                "Fringe benefits included via (1 + FB) multiplier in AEF"
            } else {
                "Fringes calculated and added separately when AEF is off"
            }
            .to_string(),
        ),
    ]);

    let mut table = Table::new(["Component", "Value", "Description"]);
    for (kind, component, value, description) in rows {
        table.push(kind, vec![component.to_string(), value, description]);
    }
    table
}

/// One row per retirement scenario with its aggregate figures.
pub fn scenario_summary(scenarios: &[RetirementScenario], basis: FutureBasis) -> Table {
    let mut table = Table::new([
        "Scenario",
        "Retire Age",
        "Retire Date",
        "Past Damages",
        basis.future_label(),
        basis.total_label(),
    ]);
    for (idx, scenario) in scenarios.iter().enumerate() {
        let agg = aggregate(&scenario.schedule.rows, &scenario.totals, basis);
        table.push_data(vec![
            scenario.display_name(idx),
            scenario.retire_age_text(),
            scenario.retire_date_text(),
            money(agg.past),
            money(agg.future),
            money(agg.total),
        ]);
    }
    table
}

pub fn growth_header(grid: &AlignedGrid, j: usize) -> String {
    if grid.growth_disabled() {
        "Growth disabled".to_string()
    } else {
        percent(grid.growth_rate(j), 1)
    }
}

pub fn discount_header(grid: &AlignedGrid, i: usize) -> String {
    let label = percent(grid.discount_rate(i), 1);
    if grid.net_method {
        format!("Net {label}")
    } else {
        label
    }
}

/// Discount-delta rows by growth-delta columns of total PV.
pub fn sensitivity_matrix(grid: &AlignedGrid) -> Table {
    let mut headers = vec!["Disc\\Growth".to_string()];
    headers.extend((0..grid.growth_deltas.len()).map(|j| growth_header(grid, j)));
    let mut table = Table::new(headers);
    for (i, cells) in grid.cells.iter().enumerate() {
        let mut row = vec![discount_header(grid, i)];
        row.extend(cells.iter().map(|cell| {
            cell.as_ref()
                .map(|c| money_whole(c.total()))
                .unwrap_or_default()
        }));
        table.push_data(row);
    }
    table
}

/// But-for earnings components with the total package per year.
pub fn but_for_components(rows: &[Row], opts: &TableOptions) -> Table {
    let mut candidates = vec![
        ColumnSpec::text("year", "Year", columns::year),
        ColumnSpec::text("age", "Age", columns::age),
        ColumnSpec::money("bfGross", "BF Gross", |r| r.bf_gross),
        ColumnSpec::money("bfAdj", "BF After-Tax/AEF", |r| r.bf_adj),
    ];
    candidates.extend(fringe_columns(opts, "Total Fringe"));
    candidates.push(
        ColumnSpec::money("bfLegals", "BF Legally Req", |r| r.bf_legals)
            .when(opts.include_legals)
            .if_nonzero(),
    );
    let schema = Schema::realize(candidates, rows);
    let legals_used = schema.contains("bfLegals");

    let mut headers = schema.headers();
    headers.extend(["Total BF Package".to_string(), "Portion".to_string()]);
    let mut table = Table::new(headers);
    for row in rows {
        let mut package = row.bf_adj;
        if opts.show_fringe() {
            package += row.bf_fringe;
        }
        if legals_used {
            package += row.bf_legals;
        }
        let mut cells = schema.cells(row);
        cells.push(money(package));
        cells.push(portion_detail(row.portion()));
        table.push_data(cells);
    }
    table
}

/// Actual (post-incident) earnings components with the total package.
pub fn actual_components(rows: &[Row], opts: &TableOptions) -> Table {
    let candidates = vec![
        ColumnSpec::text("year", "Year", columns::year),
        ColumnSpec::text("age", "Age", columns::age),
        ColumnSpec::money("actE", "Actual Earnings", |r| r.act_e),
        ColumnSpec::money("actFringe", "Actual Fringe", |r| r.act_fringe).if_nonzero(),
        ColumnSpec::money("actLegals", "Actual Legally Req", |r| r.act_legals)
            .when(opts.include_legals)
            .if_nonzero(),
    ];
    let schema = Schema::realize(candidates, rows);
    let fringe_used = schema.contains("actFringe");
    let legals_used = schema.contains("actLegals");

    let mut headers = schema.headers();
    headers.push("Total Actual Package".to_string());
    let mut table = Table::new(headers);
    for row in rows {
        let mut package = row.act_e;
        if fringe_used {
            package += row.act_fringe;
        }
        if legals_used {
            package += row.act_legals;
        }
        let mut cells = schema.cells(row);
        cells.push(money(package));
        table.push_data(cells);
    }
    table
}

/// Discounting and survival effects on each year's future loss.
pub fn pv_survival(rows: &[Row]) -> Table {
    let mut table = Table::new([
        "Year",
        "Age",
        "Annual Loss",
        "Survival Prob",
        "Future (Raw)",
        "Future (Survival)",
        "PV(Future)",
    ]);
    for row in rows {
        table.push_data(vec![
            row.year_text(),
            row.age_text(),
            money(row.loss),
            fixed(row.survival_probability(), 4),
            money(row.future_part),
            money(row.survival_weighted()),
            money(row.pv_future_or_zero()),
        ]);
    }
    table
}

/// But-for versus actual total compensation and the loss share.
pub fn loss_comparison(rows: &[Row]) -> Table {
    let mut table = Table::new([
        "Year",
        "Age",
        "But-For Total",
        "Actual Total",
        "Annual Loss",
        "Loss %",
    ]);
    for row in rows {
        let but_for = row.but_for_total();
        let share = if but_for > 0.0 {
            row.loss / but_for * 100.0
        } else {
            0.0
        };
        table.push_data(vec![
            row.year_text(),
            row.age_text(),
            money(but_for),
            money(row.actual_total()),
            money(row.loss),
            format!("{share:.1}%"),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Schedule, SensitivityGrid};
    use proptest::prelude::{prop_assert, proptest};
    use serde_json::json;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn schedule(value: serde_json::Value) -> Schedule {
        serde_json::from_value(value).unwrap()
    }

    fn opts(basis: FutureBasis) -> TableOptions {
        TableOptions {
            aef_on: false,
            use_ups_fringe: false,
            include_legals: true,
            basis,
        }
    }

    fn sample() -> Schedule {
        schedule(json!({
            "rows": [
                {"year": 2023, "age": 45, "portion": 0.5, "bfGross": 50000, "bfAdj": 40000,
                 "bfFringe": 0, "actE": 10000, "loss": 30000, "pastPart": 30000, "futurePart": 0,
                 "pvFuture": 0},
                {"year": 2024, "age": 46, "portion": 1, "bfGross": 52000, "bfAdj": 41600,
                 "bfFringe": 0, "actE": 10000, "loss": 31600, "pastPart": 0, "futurePart": 31600,
                 "survivalWeightedFuture": 31000, "pvFuture": 30000, "survivalProb": 0.98}
            ],
            "totals": {"pastDam": 30000, "futurePV": 30000, "totalPV": 60000}
        }))
    }

    #[test]
    fn detail_table_drops_unused_components_and_shows_pv_columns() {
        let s = sample();
        let table = detail_table(&s.rows, &opts(FutureBasis::PresentValue), DetailLabels::Schedule);
        assert_eq!(
            table.headers,
            vec![
                "Year", "Age", "Portion", "BF Gross", "BF After-Tax", "ACT Earn", "Loss", "Past",
                "Future Raw", "Future Surv", "PV Future", "Surv Prob"
            ]
        );
        assert_eq!(table.rows[0].cells[2], "0.500");
        assert_eq!(table.rows[1].cells[9], "$31,000.00");
        assert_eq!(table.rows[1].cells[11], "0.980");
        assert_eq!(table.rows[0].cells[11], "1.000");
    }

    #[test]
    fn nominal_detail_table_has_single_future_column() {
        let s = sample();
        let table = detail_table(&s.rows, &opts(FutureBasis::Nominal), DetailLabels::Schedule);
        assert_eq!(table.headers.last().map(String::as_str), Some("Future"));
        assert!(table.column("PV Future").is_none());
        assert!(table.column("Surv Prob").is_none());
    }

    #[test]
    fn ups_fringe_split_and_aef_suppression() {
        let s = schedule(json!({"rows": [
            {"year": 2024, "bfHW": 1200, "bfPension": 0, "bfFringe": 1200, "bfLegals": 300, "actLegals": 50}
        ]}));
        let mut o = opts(FutureBasis::PresentValue);
        o.use_ups_fringe = true;
        let table = detail_table(&s.rows, &o, DetailLabels::SensitivityCell);
        assert!(table.column("H&W").is_some());
        assert!(table.column("Pension").is_none());
        assert!(table.column("Total Fringe").is_some());
        assert!(table.column("BF Legally Req").is_some());
        assert!(table.column("ACT Legals").is_some());

        o.aef_on = true;
        o.include_legals = false;
        let table = detail_table(&s.rows, &o, DetailLabels::Schedule);
        assert!(table.column("H&W").is_none());
        assert!(table.column("Tot Fringe").is_none());
        assert!(table.column("BF Legals").is_none());
        assert!(table.column("ACT Legals").is_none());
    }

    #[test]
    fn yoy_summary_totals_and_qa_pass() {
        let s = sample();
        let (table, qa) = yoy_summary(&s.rows, &s.totals, &opts(FutureBasis::PresentValue));
        let total = table.rows.last().unwrap();
        assert_eq!(total.kind, RowKind::Total);
        assert_eq!(total.cells[0], "TOTAL");
        assert_eq!(total.cells[table.column("Past").unwrap()], "$30,000.00");
        assert_eq!(total.cells[table.column("Future PV").unwrap()], "$30,000.00");
        assert!(qa.passed());
        assert_eq!(qa.message(), "QA ✓ Year-over-year PV matches scenario Future PV");
    }

    #[test]
    fn yoy_summary_nominal_total_is_sum_of_future_parts() {
        let s = sample();
        let (table, _) = yoy_summary(&s.rows, &s.totals, &opts(FutureBasis::Nominal));
        let idx = table.column("Future (Nominal)").unwrap();
        assert_eq!(table.rows.last().unwrap().cells[idx], "$31,600.00");
        assert!(table.column("Future PV").is_none());
    }

    #[test]
    fn qa_flags_drift_beyond_one_unit() {
        let mut s = sample();
        s.rows[1].pv_future = Some(30001.5);
        let qa = reconcile(&s.rows, &s.totals);
        assert!(!qa.passed());
        assert_eq!(
            qa.message(),
            "QA Warning: Sum of YOY PV ($30,001.50) differs from scenario Future PV ($30,000.00)."
        );
        let qa = reconcile(&s.rows, &Totals::default());
        assert!(qa.passed());
    }

    #[test]
    fn tinari_sections_and_override() {
        let pre = sample().rows[..1].to_vec();
        let post = sample().rows[1..].to_vec();
        let assumptions = json!({
            "aef": {"wle": 0.9, "ufEff": 0.05, "tlEff": 0.2, "fringePct": 0.1, "factor": 0.7524},
            "discount": {"method": "ndr", "ndr": 0.02, "rate": 0.05},
            "butFor": {"growthMethod": "fixed", "growth": 0.03}
        });
        let view = AssumptionView::new(&assumptions);
        let table = tinari_table(&pre, &post, &view, FutureBasis::PresentValue, Some(61000.0));

        assert_eq!(table.rows[0].cells[2], "3.00% growth");
        assert_eq!(
            table.rows[0].cells[3],
            "(WLE/YFS 0.90000) × (1 - UR×(1-URF) 0.05000) × (1 - TL_eff 0.20000) × (1 + FB 0.10000) = 0.75240"
        );
        assert_eq!(table.rows[0].cells[4], "2.00% discount");
        assert_eq!(table.rows[2].cells[0], "Past Years");
        assert_eq!(table.rows[3].cells[2], "50%");
        assert_eq!(table.rows[4].cells[0], "Past Totals");
        assert_eq!(table.rows[4].cells[5], "$30,000.00");
        let total = table.rows.last().unwrap();
        assert_eq!(total.cells[4], "$81,600.00");
        assert_eq!(total.cells[5], "$61,000.00");

        let nominal = tinari_table(&pre, &post, &view, FutureBasis::Nominal, Some(61000.0));
        assert_eq!(nominal.headers[5], "Nominal Value");
        assert_eq!(nominal.rows.last().unwrap().cells[5], "$61,600.00");
    }

    #[test]
    fn tinari_skips_empty_section_totals() {
        let assumptions = json!({});
        let view = AssumptionView::new(&assumptions);
        let table = tinari_table(&[], &sample().rows, &view, FutureBasis::PresentValue, None);
        assert!(table.rows.iter().all(|r| r.cells[0] != "Past Totals"));
        assert_eq!(table.rows[0].cells[3], "(WLE/YFS) × (1 - UR×(1-URF)) × (1 - TL_eff) × (1 + FB)");
        assert_eq!(table.rows.last().unwrap().cells[5], "$60,000.00");
    }

    #[test]
    fn wrongful_death_formula_defaults_missing_pc_to_zero() {
        let assumptions = json!({"meta": {"caseType": "wd"}, "aef": {"PM": null}});
        let view = AssumptionView::new(&assumptions);
        let formula = aef_formula(&view);
        assert!(formula.ends_with("× (1 - PC 0.00000) × (1 - PM)"));
    }

    #[test]
    fn aef_breakdown_marks_section_rows_and_off_values() {
        let assumptions = json!({
            "butFor": {"salary": 65000},
            "aef": {"UR": 0.05, "URF": 0.2, "ufEff": 0.04, "fringePct": 0.25},
            "horizon": {"wleYears": 30.5, "yfsYears": 35}
        });
        let view = AssumptionView::new(&assumptions);
        let table = aef_breakdown(&view);
        assert_eq!(table.headers, vec!["Component", "Value", "Description"]);
        assert_eq!(table.rows[0].kind, RowKind::Section);
        assert_eq!(table.rows[1].cells[1], "$65,000.00");
        assert_eq!(table.rows[3].cells[2], "WLE / YFS = 30.5 / 35");
        let effective = table.rows.iter().find(|r| r.cells[0] == "Effective Unemployment").unwrap();
        assert_eq!(effective.cells[2], "UR × (1 - URF) = 5.00% × 0.800");
        let factor = table.rows.iter().find(|r| r.cells[0] == "AEF Factor").unwrap();
        assert_eq!(factor.cells[1], "1.00000 (OFF)");
        let load = table.rows.iter().find(|r| r.cells[0] == "Fringe Load Factor").unwrap();
        assert_eq!(load.cells[1], "1.25000");
        assert!(table.rows.iter().all(|r| r.cells[0] != "Wrongful Death Components"));
    }

    #[test]
    fn sensitivity_matrix_labels() {
        let grid: SensitivityGrid = serde_json::from_value(json!({
            "discountRange": [-0.01, 0.0],
            "growthRange": [0.0],
            "baseDiscountRate": 0.03,
            "baseGrowthRate": 0.02,
            "method": "ndr",
            "results": [[{"totalPV": 123456.7}], ["bad"]]
        }))
        .unwrap();
        let aligned = grid.align().unwrap();
        let table = sensitivity_matrix(&aligned);
        assert_eq!(table.headers, vec!["Disc\\Growth", "Growth disabled"]);
        assert_eq!(table.rows[0].cells, vec!["Net 2.0%", "$123,457"]);
        assert_eq!(table.rows[1].cells, vec!["Net 3.0%", ""]);
    }

    #[test]
    fn supplementary_tables_compute_packages() {
        let s = schedule(json!({"rows": [
            {"year": 2024, "age": 50, "portion": 1, "bfAdj": 1000, "bfFringe": 200, "bfLegals": 50,
             "actE": 400, "actFringe": 0, "actLegals": 10, "loss": 840}
        ]}));
        let o = opts(FutureBasis::PresentValue);
        let bf = but_for_components(&s.rows, &o);
        assert_eq!(bf.headers.last().map(String::as_str), Some("Portion"));
        assert_eq!(bf.rows[0].cells[bf.column("Total BF Package").unwrap()], "$1,250.00");
        let act = actual_components(&s.rows, &o);
        assert!(act.column("Actual Fringe").is_none());
        assert_eq!(act.rows[0].cells[act.column("Total Actual Package").unwrap()], "$410.00");
        let loss = loss_comparison(&s.rows);
        assert_eq!(loss.rows[0].cells[5], "67.2%");
        let pv = pv_survival(&s.rows);
        assert_eq!(pv.rows[0].cells[3], "1.0000");
    }

    #[test]
    fn aggregate_nominal_uses_future_parts() {
        let s = sample();
        let agg = aggregate(&s.rows, &s.totals, FutureBasis::Nominal);
        assert_approx(agg.future, 31600.0);
        assert_approx(agg.total, 61600.0);
        let agg = aggregate(&s.rows, &s.totals, FutureBasis::PresentValue);
        assert_approx(agg.total, 60000.0);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_qa_detects_single_row_perturbation(
            values in proptest::collection::vec(0.0f64..100_000.0, 1..12),
            pick in 0usize..12,
            bump in 1.5f64..10_000.0
        ) {
            let rows: Vec<Row> = values
                .iter()
                .map(|v| Row { pv_future: Some(*v), ..Row::default() })
                .collect();
            let totals = Totals {
                future_pv: Some(rows.iter().map(Row::pv_future_or_raw).sum()),
                ..Totals::default()
            };
            prop_assert!(reconcile(&rows, &totals).passed());

            let mut perturbed = rows.clone();
            let idx = pick % perturbed.len();
            perturbed[idx].pv_future = perturbed[idx].pv_future.map(|v| v + bump);
            prop_assert!(!reconcile(&perturbed, &totals).passed());
        }
    }
}
