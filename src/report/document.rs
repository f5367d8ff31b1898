use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::core::value::{display_value, lookup, truthy};
use crate::core::{
    AlignedGrid, AssumptionView, ExportPayload, RetirementScenario, Row, SensitivityGrid,
    build_provenance, validate_assumption_ranges,
};

use super::charts::{self, ChartSpec};
use super::docx::{Docx, Run};
use super::format::{filename_fragment, money, percent};
use super::tables::{self, DetailLabels, TableOptions, aggregate};
use super::{DOCX_CONTENT_TYPE, FutureBasis, RenderContext, RenderedReport, ReportError};

const REPORT_TITLE: &str = "But-For Damages Analysis Report";
const DEFAULT_LIFE_TABLE: &str = "CDC United States Life Tables (default)";
const ALERT_RED: &str = "B01E1E";
const PASS_GREEN: &str = "228B22";

const SCHEDULE_FORMULA: &str = "Loss = BF After-Tax (+Fringe if shown) (+Legals if shown) - (ACT Earn + ACT Fringe (+ACT Legals if shown)); Past shown in 'Past' column; Future columns include PV only when discounting is on.";
const SCENARIO_FORMULA: &str = "Loss = BF After-Tax (+Fringe if shown) (+Legals if shown) - (ACT Earn + ACT Fringe (+ACT Legals if shown)); Past column is past portion; Future columns are precomputed per year.";
const CELL_FORMULA: &str = "Loss = BF After-Tax/AEF (+Fringe if shown) (+Legals if shown) - (ACT Earn + ACT Fringe (+ACT Legals if shown)); Past column shows past portion; PV(Future) and Survival-weighted values already computed for each cell.";
const YOY_FORMULA: &str = "Loss = BF After-Tax (+Fringe if shown) (+Legals if shown) - (ACT Earn + ACT Fringe (+ACT Legals if shown)); Future values reflect PV only when discounting is enabled.";

/// Renders the paginated report. Sections that fail are left out and
/// reported as warnings; only packaging failures abort the export.
pub fn render_document(
    payload: &ExportPayload,
    now: DateTime<Utc>,
) -> Result<RenderedReport, ReportError> {
    let builder = ReportBuilder::assemble(payload, now);
    let filename = document_filename(&builder.view.case_name(), now);
    let ReportBuilder { doc, ctx, .. } = builder;
    let bytes = doc.into_bytes()?;
    let warnings = ctx.into_warnings();
    info!(
        file = %filename,
        bytes = bytes.len(),
        failed_sections = warnings.len(),
        "rendered damages report"
    );
    Ok(RenderedReport {
        bytes,
        filename,
        content_type: DOCX_CONTENT_TYPE,
        warnings,
    })
}

pub fn document_filename(case_name: &str, now: DateTime<Utc>) -> String {
    format!(
        "damages_report_{}_{}.docx",
        filename_fragment(case_name),
        now.format("%Y%m%d")
    )
}

struct ReportBuilder<'a> {
    payload: &'a ExportPayload,
    view: AssumptionView<'a>,
    basis: FutureBasis,
    opts: TableOptions,
    now: DateTime<Utc>,
    doc: Docx,
    ctx: RenderContext,
}

impl<'a> ReportBuilder<'a> {
    fn assemble(payload: &'a ExportPayload, now: DateTime<Utc>) -> Self {
        let view = payload.view();
        let basis = FutureBasis::from_view(&view);
        let mut builder = Self {
            payload,
            view,
            basis,
            opts: TableOptions::from_view(&view, basis),
            now,
            doc: Docx::new(),
            ctx: RenderContext::new(),
        };

        builder.title_block();
        builder.section("assumptions_overview", Self::assumptions_overview);
        builder.section("provenance", Self::provenance_panel);
        builder.section("aef_breakdown", Self::aef_breakdown);
        builder.section("damages_schedule", Self::damages_schedule);
        if !payload.retirement_scenarios.is_empty() {
            builder.section("scenario_summary", Self::scenario_summary);
            builder.section("scenario_comparison_chart", Self::scenario_comparison);
            builder.section("scenario_timelines", Self::scenario_timelines);
            builder.section("scenario_tables", Self::scenario_tables);
        }
        builder.section("sensitivity", Self::sensitivity);
        if !payload.schedule.rows.is_empty() {
            builder.section("yoy_summary", Self::yoy_summary);
        }
        builder.supplementary();
        builder.doc.page_break();
        builder.executive_visuals();
        builder.jury_visuals();
        builder
    }

    /// Runs one section; on failure its partial output is discarded and the
    /// error is recorded.
    fn section(&mut self, name: &str, build: impl FnOnce(&mut Self) -> Result<(), ReportError>) {
        let mark = self.doc.mark();
        let tables = self.ctx.table_count();
        match build(self) {
            Ok(()) => debug!(section = name, "report section rendered"),
            Err(err) => {
                self.doc.rollback(mark);
                self.ctx.rewind_tables(tables);
                self.ctx.record(name, &err);
            }
        }
    }

    fn numbered(&mut self, title: &str) -> String {
        format!("TABLE {}: {title}", self.ctx.next_table())
    }

    fn rows(&self) -> &'a [Row] {
        &self.payload.schedule.rows
    }

    fn chart_with_text(&mut self, heading: &str, text: Option<&str>, chart: Option<ChartSpec>) -> Result<(), ReportError> {
        let Some(chart) = chart else {
            return Ok(());
        };
        chart.validate()?;
        self.doc.heading(heading, 2);
        if let Some(text) = text {
            self.doc.paragraph(text);
        }
        self.doc.chart(&chart)
    }

    fn title_block(&mut self) {
        let payload = self.payload;
        let schedule = &payload.schedule;
        let totals = &schedule.totals;
        self.doc.heading(REPORT_TITLE, 0);
        self.doc.paragraph(format!("Case: {}", self.view.case_name()));
        self.doc
            .paragraph(format!("Report Date: {}", self.now.format("%B %d, %Y")));
        self.doc.blank();

        self.doc.runs(vec![Run::plain("Summary Totals").bold()]);
        match self.basis {
            FutureBasis::PresentValue => {
                self.doc
                    .paragraph(format!("Total Present Value: {}", money(totals.total())));
                self.doc
                    .paragraph(format!("Past Damages: {}", money(totals.past())));
                self.doc
                    .paragraph(format!("Future PV: {}", money(totals.future())));
            }
            FutureBasis::Nominal => {
                let future = schedule.nominal_future();
                self.doc.paragraph(format!(
                    "Total (Nominal): {}",
                    money(totals.past() + future)
                ));
                self.doc
                    .paragraph(format!("Past Damages: {}", money(totals.past())));
                self.doc
                    .paragraph(format!("Future (Nominal): {}", money(future)));
            }
        }
        if let Some(name) = &payload.active_scenario {
            self.doc.paragraph(format!("Scenario: {name}"));
        }
        self.doc.blank();
    }

    fn assumptions_overview(&mut self) -> Result<(), ReportError> {
        let payload = self.payload;
        let assumptions = &payload.assumptions;
        self.doc.heading("Assumptions Overview", 1);

        let mut notes = Vec::new();
        if lookup(assumptions, &["lifeTable"]).value().is_some_and(truthy) {
            let source = lookup(assumptions, &["lifeTable", "source"])
                .value()
                .filter(|v| truthy(v))
                .map(display_value)
                .unwrap_or_else(|| DEFAULT_LIFE_TABLE.to_string());
            notes.push(format!(
                "Life table: {source} [{}]",
                crate::core::provenance::population_label(assumptions)
            ));
        }
        for (key, label) in [
            ("wageSourceNotes", "Wage/growth documentation"),
            ("benefitSourceNotes", "Fringe/benefit documentation"),
        ] {
            if let Some(note) = self.view.get("meta", key).value().filter(|v| truthy(v)) {
                notes.push(format!("{label}: {}", display_value(note)));
            }
        }
        let any = !notes.is_empty();
        for note in notes {
            self.doc.paragraph(note);
        }
        if any {
            self.doc.blank();
        }
        Ok(())
    }

    fn provenance_panel(&mut self) -> Result<(), ReportError> {
        let provenance = build_provenance(&self.payload.assumptions, self.now);
        let violations = validate_assumption_ranges(&self.payload.assumptions);

        self.doc.heading("Provenance & Validation", 2);
        self.doc
            .paragraph(format!("Generated (UTC): {}", provenance.generated_at));
        self.doc.paragraph(format!(
            "Assumptions fingerprint (SHA-256): {}",
            provenance.fingerprint
        ));
        if !provenance.sources.is_empty() {
            self.doc.paragraph("Sources:");
            for source in provenance.sources {
                self.doc.bullet(source);
            }
        }
        if violations.is_empty() {
            self.doc.runs(vec![
                Run::plain("Validation status: ").bold(),
                Run::plain("All monitored inputs fall within configured ranges.").color(PASS_GREEN),
            ]);
        } else {
            self.doc.runs(vec![
                Run::plain("Validation status: ").bold(),
                Run::plain("Attention required").color(ALERT_RED),
            ]);
            for violation in violations {
                self.doc.bullet(violation);
            }
        }
        self.doc.blank();
        Ok(())
    }

    fn aef_breakdown(&mut self) -> Result<(), ReportError> {
        let wd_suffix = if self.view.is_wrongful_death() {
            " × (1 - PC) × (1 - PM)"
        } else {
            ""
        };
        self.doc
            .heading("Adjusted Earnings Factor (AEF) Breakdown", 1);
        self.doc
            .paragraph("This table shows how the AEF is calculated from its component parts.");
        self.doc.paragraph(format!(
            "Formula: AEF = (WLE/YFS) × (1 - UR×(1-URF)) × (1 - TL_eff) × (1 + FB){wd_suffix}; Adjusted Earnings = GE × AEF."
        ));
        self.doc.blank();
        self.doc.table(&tables::aef_breakdown(&self.view));
        self.doc.blank();
        Ok(())
    }

    fn damages_schedule(&mut self) -> Result<(), ReportError> {
        let payload = self.payload;
        let schedule = &payload.schedule;
        self.doc.heading("Tinari Tables", 1);
        if self.opts.aef_on {
            self.doc.heading("TINARI-STYLE SUMMARY (AEF ON)", 2);
            self.doc.italic(
                "Formatted to match Tinari presentation (Year, Age, Portion, Base Earnings, Adjusted Income, Present Value).",
            );
            let total_override = schedule
                .totals
                .total_pv
                .or_else(|| self.view.total_pv_override());
            self.doc.table(&tables::tinari_table(
                &schedule.rows_pre,
                &schedule.rows_post,
                &self.view,
                self.basis,
                total_override,
            ));
        } else {
            self.doc.paragraph(
                "Tinari layout tables appear when AEF is ON. Enable AEF to view the Tinari summary tables.",
            );
            if !schedule.rows.is_empty() {
                let heading = self.numbered("Year-by-Year Damages Schedule");
                self.doc.heading(heading, 2);
                self.doc
                    .italic("Complete annual schedule with every earnings component that carries a value");
                self.doc.formula_note(SCHEDULE_FORMULA);
                self.doc.table(&tables::detail_table(
                    &schedule.rows,
                    &self.opts,
                    DetailLabels::Schedule,
                ));
            }
        }
        self.doc.blank();
        Ok(())
    }

    fn scenarios(&self) -> Vec<(String, &'a RetirementScenario)> {
        self.payload
            .retirement_scenarios
            .iter()
            .enumerate()
            .map(|(idx, s)| (s.display_name(idx), s))
            .collect()
    }

    fn scenario_summary(&mut self) -> Result<(), ReportError> {
        let basis = self.basis;
        if self.opts.aef_on {
            self.doc
                .heading("Retirement Age Scenarios (Tinari Visuals)", 2);
            self.doc.italic(
                "Tinari mode shows chart-driven retirement scenarios. Totals by age are summarized below; detailed tables follow later.",
            );
            self.doc.formula_note(
                "Total PV = Past Damages + Future PV; Future PV is computed by discounting and survival-weighting the year-by-year losses under each scenario.",
            );
            for (name, scenario) in self.scenarios() {
                let agg = aggregate(&scenario.schedule.rows, &scenario.totals, basis);
                self.doc.runs(vec![
                    Run::plain(format!("{name} (Age {}): ", scenario.retire_age_text())).bold(),
                    Run::plain(format!(
                        "Past {} | {} {} | {} {}",
                        money(agg.past),
                        basis.future_label(),
                        money(agg.future),
                        basis.total_label(),
                        money(agg.total)
                    )),
                ]);
            }
        } else {
            let heading = self.numbered("Retirement Age Scenarios Summary");
            self.doc.heading(heading, 2);
            self.doc
                .italic("Comparison of total damages under different retirement age assumptions");
            self.doc.formula_note(
                "Total PV = Past Damages + Future PV; each component is built from the year-by-year loss schedule for that retirement age.",
            );
            self.doc.table(&tables::scenario_summary(
                &self.payload.retirement_scenarios,
                basis,
            ));
        }
        self.doc.blank();
        Ok(())
    }

    fn scenario_comparison(&mut self) -> Result<(), ReportError> {
        let chart = charts::scenario_comparison(
            &self.payload.retirement_scenarios,
            self.basis,
            "Retirement Age Scenarios Comparison",
        );
        self.chart_with_text(
            "Retirement Scenarios Visual Comparison",
            Some("This chart compares past damages and future damages (PV) across different retirement age scenarios."),
            chart,
        )
    }

    fn scenario_timelines(&mut self) -> Result<(), ReportError> {
        self.doc
            .heading("Individual Retirement Scenario Analyses", 2);
        self.doc
            .paragraph("Charts for each retirement age scenario; detailed tables follow below.");
        for (name, scenario) in self.scenarios() {
            let Some(panels) = charts::scenario_timeline(scenario, &name) else {
                continue;
            };
            for panel in &panels {
                panel.validate()?;
            }
            self.doc.heading(format!("{name} - Visual Timeline"), 3);
            self.doc.paragraph(format!(
                "Timeline visualization for retirement at age {}. Top chart shows compensation comparison, bottom chart shows annual losses.",
                scenario.retire_age_text()
            ));
            for panel in &panels {
                self.doc.chart(panel)?;
            }
        }
        Ok(())
    }

    fn scenario_tables(&mut self) -> Result<(), ReportError> {
        let basis = self.basis;
        self.doc
            .heading("Retirement Scenario Year-Over-Year Tables", 2);
        self.doc.italic(
            "Line-by-line loss tables for every retirement age scenario so jurors can follow how the totals are built.",
        );
        self.doc.blank();
        for (name, scenario) in self.scenarios() {
            let rows = &scenario.schedule.rows;
            if rows.is_empty() {
                continue;
            }
            let view = self.view.layered(scenario.assumptions.as_ref());
            let opts = TableOptions::from_view(&view, basis);
            let agg = aggregate(rows, &scenario.totals, basis);

            self.doc.heading(
                format!(
                    "Scenario: {name} (Retire at Age {})",
                    scenario.retire_age_text()
                ),
                3,
            );
            self.doc.paragraph(format!(
                "Retirement Date: {}  |  {}: {}  |  Past: {}  |  {}: {}",
                scenario.retire_date_text(),
                basis.total_label(),
                money(agg.total),
                money(agg.past),
                basis.future_label(),
                money(agg.future)
            ));
            if !opts.aef_on {
                self.doc.formula_note(SCENARIO_FORMULA);
                self.doc
                    .table(&tables::detail_table(rows, &opts, DetailLabels::Schedule));
                self.doc.blank();
            }
            self.write_yoy(
                format!("Year-Over-Year Summary: {name}"),
                "Condensed summary of this retirement scenario with unused columns hidden.",
                rows,
                &scenario.totals,
                &opts,
            );
        }
        Ok(())
    }

    fn write_yoy(
        &mut self,
        heading: String,
        description: &str,
        rows: &[Row],
        totals: &crate::core::Totals,
        opts: &TableOptions,
    ) {
        let (table, qa) = tables::yoy_summary(rows, totals, opts);
        self.doc.heading(heading, 2);
        self.doc.italic(description);
        self.doc.formula_note(YOY_FORMULA);
        self.doc.table(&table);
        if qa.passed() {
            self.doc.runs(vec![Run::plain(qa.message()).bold()]);
        } else {
            self.doc.runs(vec![Run::plain(qa.message()).italic()]);
        }
        self.doc.blank();
    }

    fn sensitivity_grid(&self) -> Option<&'a SensitivityGrid> {
        self.payload
            .sensitivity
            .as_ref()
            .filter(|grid| grid.has_results())
    }

    fn sensitivity(&mut self) -> Result<(), ReportError> {
        if !self.basis.is_discounted() {
            self.doc.heading("Sensitivity Analysis", 2);
            self.doc.italic(
                "Present value discounting is OFF, so sensitivity to discount rates is skipped.",
            );
            return Ok(());
        }
        let Some(grid) = self.sensitivity_grid() else {
            return Ok(());
        };
        let aligned = grid.align()?;
        let tinari = self.opts.aef_on;

        self.doc.heading("Sensitivity Analysis", 2);
        self.doc
            .paragraph(format!("Discount Method: {}", aligned.method_label));
        self.doc.paragraph(format!(
            "Base Discount Rate: {}",
            percent(aligned.base_discount_rate, 2)
        ));
        self.doc.paragraph(format!(
            "Base Growth Rate: {}",
            percent(aligned.base_growth_rate, 2)
        ));
        self.doc.formula_note(
            "Each cell = Total PV computed with discount/growth deltas; PV = Σ[ (Future Loss × Survival Prob) / (1 + r)^t ] with growth applied per scenario.",
        );
        if tinari {
            self.doc.italic(
                "Tinari mode uses the full sensitivity grid; detailed per-cell tables are suppressed for a chart-first export.",
            );
            if !aligned.discount_deltas.is_empty() {
                let labels: Vec<String> = (0..aligned.discount_deltas.len())
                    .map(|i| percent(aligned.discount_rate(i), 1))
                    .collect();
                self.doc
                    .paragraph(format!("Discount grid: {}", labels.join(", ")));
            }
            if !aligned.growth_deltas.is_empty() {
                let labels: Vec<String> = (0..aligned.growth_deltas.len())
                    .map(|j| percent(aligned.growth_rate(j), 1))
                    .collect();
                self.doc
                    .paragraph(format!("Growth grid: {}", labels.join(", ")));
            }
        }
        self.doc.blank();
        if !aligned.discount_deltas.is_empty() {
            self.doc.table(&tables::sensitivity_matrix(&aligned));
        }
        self.doc.blank();

        if tinari {
            self.doc
                .heading("Tinari Mode: Sensitivity Tables Omitted", 3);
            self.doc.italic(
                "Full discount/growth coverage is captured in the matrix and heatmap above; per-scenario column grids are hidden for Tinari exports.",
            );
        } else {
            self.sensitivity_cells(&aligned);
        }
        Ok(())
    }

    fn sensitivity_cells(&mut self, grid: &AlignedGrid) {
        let heading = self.numbered("Detailed Sensitivity Scenarios (Year-by-Year)");
        self.doc.heading(heading, 2);
        self.doc.italic(
            "Complete year-by-year breakdown for each discount rate and growth rate combination showing full impact on damages",
        );
        self.doc.blank();

        for (i, row) in grid.cells.iter().enumerate() {
            for (j, cell) in row.iter().enumerate() {
                let Some(cell) = cell else {
                    continue;
                };
                if cell.schedule.rows.is_empty() {
                    continue;
                }
                self.doc.heading(
                    format!(
                        "Scenario: {:.1}% Discount, {:.1}% Growth",
                        grid.discount_rate(i) * 100.0,
                        grid.growth_rate(j) * 100.0
                    ),
                    3,
                );
                self.doc.paragraph(format!(
                    "Total PV: {}  |  Past: {}  |  Future PV: {}",
                    money(cell.total()),
                    money(cell.past_dam.unwrap_or(0.0)),
                    money(cell.future_pv.unwrap_or(0.0))
                ));
                let view = self.view.layered(cell.assumptions.as_ref());
                let opts = TableOptions::from_view(&view, self.basis);
                if opts.aef_on {
                    continue;
                }
                self.doc.formula_note(CELL_FORMULA);
                self.doc.table(&tables::detail_table(
                    &cell.schedule.rows,
                    &opts,
                    DetailLabels::SensitivityCell,
                ));
                self.doc.blank();
            }
        }
    }

    fn yoy_summary(&mut self) -> Result<(), ReportError> {
        let payload = self.payload;
        let heading = self.numbered("Year-Over-Year Loss Summary");
        let opts = self.opts;
        self.write_yoy(
            heading,
            "Condensed annual summary showing key earnings and loss figures for each year",
            &payload.schedule.rows,
            &payload.schedule.totals,
            &opts,
        );
        Ok(())
    }

    fn supplementary(&mut self) {
        self.doc.heading("SUPPLEMENTARY ANALYSIS TABLES", 1);
        self.doc
            .paragraph("Additional detailed breakdowns for comprehensive damages documentation");
        self.doc.blank();
        if self.opts.aef_on || self.rows().is_empty() {
            return;
        }
        self.section("but_for_components", |b| {
            let heading = b.numbered("But-For Earnings Components Breakdown");
            b.doc.heading(heading, 2);
            b.doc
                .italic("Detailed breakdown of all but-for earning components by year");
            b.doc.formula_note(
                "Total BF Package = BF After-Tax/AEF (+Fringe if shown) (+Legally Required if shown); Portion = fraction of the year included.",
            );
            b.doc
                .table(&tables::but_for_components(b.rows(), &b.opts));
            b.doc.blank();
            Ok(())
        });
        self.section("actual_components", |b| {
            let heading = b.numbered("Actual Earnings Components Breakdown");
            b.doc.heading(heading, 2);
            b.doc
                .italic("Detailed breakdown of all actual/post-injury earning components by year");
            b.doc.formula_note(
                "Total Actual Package = Actual Earnings + Actual Fringe (+ Legally Required if shown).",
            );
            b.doc
                .table(&tables::actual_components(b.rows(), &b.opts));
            b.doc.blank();
            Ok(())
        });
        self.section("pv_survival", |b| {
            let heading = b.numbered("Present Value and Survival Probability Analysis");
            b.doc.heading(heading, 2);
            if !b.basis.is_discounted() {
                b.doc
                    .italic("Present value discounting is OFF, so this table is omitted.");
                return Ok(());
            }
            b.doc.italic(
                "Shows the impact of present value discounting and survival probabilities on future damages",
            );
            b.doc.formula_note(
                "Future (Survival) = Future (Raw) × Survival Prob; PV(Future) = Future (Survival) discounted to valuation date.",
            );
            b.doc.table(&tables::pv_survival(b.rows()));
            b.doc.blank();
            Ok(())
        });
        self.section("loss_comparison", |b| {
            let heading = b.numbered("Annual Loss Components Comparison");
            b.doc.heading(heading, 2);
            b.doc.italic(
                "Compares but-for total compensation to actual total compensation to show annual loss",
            );
            b.doc.formula_note(
                "Annual Loss = But-For Total Compensation - Actual Total Compensation; Loss % = Annual Loss / But-For Total Compensation.",
            );
            b.doc.table(&tables::loss_comparison(b.rows()));
            b.doc.blank();
            Ok(())
        });
    }

    fn executive_visuals(&mut self) {
        let rows = self.rows();
        let basis = self.basis;
        let agg = aggregate(rows, &self.payload.schedule.totals, basis);

        self.doc.heading("Executive Visual Summary", 1);
        self.doc
            .italic("Charts and graphs appear after all tables for a simpler, story-first read.");

        self.section("damages_pie", |b| {
            let chart = charts::damages_pie(
                agg.past,
                agg.future,
                basis,
                "Total Economic Damages Breakdown",
            );
            b.chart_with_text("Total Damages Summary", None, chart)
        });
        self.section("annual_loss_chart", |b| {
            b.chart_with_text(
                "Annual Economic Losses",
                Some("This chart shows the economic loss for each year. Red bars indicate losses (but-for scenario exceeds actual earnings)."),
                charts::annual_loss(rows, "Annual Economic Loss by Year"),
            )
        });
        self.section("earnings_chart", |b| {
            b.chart_with_text(
                "Earnings Trajectory Comparison",
                Some("Green line shows projected but-for earnings. Red line shows actual/post-injury earnings. Shaded area represents the economic loss."),
                charts::earnings_comparison(rows, "But-For vs Actual Earnings Comparison"),
            )
        });
        self.section("cumulative_chart", |b| {
            b.chart_with_text(
                "Cumulative Damages Over Time",
                Some("This area chart shows how damages accumulate over time. Pink area represents past damages; blue area represents future damages (present value)."),
                charts::cumulative(rows, basis, "Cumulative Economic Damages Over Time"),
            )
        });
        if basis.is_discounted() {
            if let Some(grid) = self.sensitivity_grid() {
                self.section("sensitivity_heatmap", |b| {
                    let aligned = grid.align()?;
                    let Some(map) = charts::heatmap(&aligned) else {
                        return Ok(());
                    };
                    b.doc.heading("Sensitivity Analysis Visual Heatmap", 2);
                    b.doc.paragraph(
                        "Total present value across the discount/growth grid; brighter green = higher damages, red = lower.",
                    );
                    b.doc.heatmap(&map);
                    Ok(())
                });
            }
        }
        if self.opts.use_ups_fringe {
            self.section("ups_fringe_chart", |b| {
                b.chart_with_text(
                    "UPS-Specific Fringe Benefits Breakdown",
                    Some("Detailed side-by-side comparison of UPS Health & Welfare contributions and Pension contributions by year."),
                    charts::ups_fringe(rows, "UPS Fringe Benefits: Health & Welfare vs Pension"),
                )
            });
        }
    }

    fn jury_visuals(&mut self) {
        let rows = self.rows();
        let basis = self.basis;
        let agg = aggregate(rows, &self.payload.schedule.totals, basis);

        self.doc.heading("Plain-English Jury Visuals", 1);
        self.doc.italic(
            "Simple one-frame charts: what was lost, how long it lasts, the growth/inflation factor, and total loss.",
        );
        self.section("jury_items", |b| {
            b.chart_with_text(
                "What Was Lost",
                None,
                charts::jury_items(agg.past, agg.future, basis),
            )
        });
        self.section("jury_years", |b| {
            b.chart_with_text("How Long The Loss Lasts", None, charts::jury_years(rows))
        });
        self.section("jury_growth", |b| {
            let chart = charts::jury_growth(&b.view);
            b.chart_with_text("Growth / Inflation Factor Used", None, Some(chart))
        });
        self.section("jury_total", |b| {
            b.chart_with_text(
                "Total Economic Loss",
                None,
                charts::jury_total(agg.total, basis),
            )
        });
    }
}
