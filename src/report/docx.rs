//! Minimal WordprocessingML package writer.
//!
//! Content is collected as a flat list of blocks and serialized on
//! [`Docx::into_bytes`]. Charts become native DrawingML chart parts that
//! carry their data as literals, so the package has no embedded workbooks.

use std::io::{Cursor, Write};

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::ReportError;
use super::charts::{ChartKind, ChartSpec, HeatmapSpec};
use super::tables::{RowKind, Table};

const NS_W: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_WP: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const NS_C: &str = "http://schemas.openxmlformats.org/drawingml/2006/chart";
const NS_PKG_RELS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const NS_TYPES: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

const REL_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
const REL_STYLES: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
const REL_CHART: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/chart";

const CT_RELS: &str = "application/vnd.openxmlformats-package.relationships+xml";
const CT_DOCUMENT: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml";
const CT_STYLES: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml";
const CT_CHART: &str = "application/vnd.openxmlformats-officedocument.drawingml.chart+xml";

/// Landscape US Letter in twentieths of a point, with half-inch margins.
const PAGE_WIDTH: &str = "15840";
const PAGE_HEIGHT: &str = "12240";
const MARGIN: &str = "720";

const EMU_PER_INCH: u64 = 914_400;

const HEADER_FILL: &str = "D9E2F3";
const SECTION_FILL: &str = "F2F2F2";
const TOTAL_FILL: &str = "E2EFDA";

/// Thin wrapper over the quick-xml writer with the handful of shapes the
/// package parts need.
struct Xml {
    writer: Writer<Vec<u8>>,
}

fn xml_err(err: impl std::fmt::Display) -> ReportError {
    ReportError::Xml(err.to_string())
}

impl Xml {
    fn new() -> Result<Self, ReportError> {
        let mut writer = Writer::new(Vec::new());
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
            .map_err(xml_err)?;
        Ok(Self { writer })
    }

    fn open(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), ReportError> {
        let start = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.writer.write_event(Event::Start(start)).map_err(xml_err)
    }

    fn close(&mut self, name: &str) -> Result<(), ReportError> {
        self.writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(xml_err)
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), ReportError> {
        let start = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.writer.write_event(Event::Empty(start)).map_err(xml_err)
    }

    fn text(&mut self, text: &str) -> Result<(), ReportError> {
        self.writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(xml_err)
    }

    fn leaf(&mut self, name: &str, attrs: &[(&str, &str)], text: &str) -> Result<(), ReportError> {
        self.open(name, attrs)?;
        self.text(text)?;
        self.close(name)
    }

    /// `<name val="value"/>`, the common shape of DrawingML properties.
    fn val(&mut self, name: &str, value: &str) -> Result<(), ReportError> {
        self.empty(name, &[("val", value)])
    }

    fn finish(self) -> Vec<u8> {
        self.writer.into_inner()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Run {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
    /// Point size; the paragraph style's size when unset.
    pub size: Option<u32>,
    pub color: Option<&'static str>,
}

impl Run {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    pub fn italic(mut self) -> Self {
        self.italic = true;
        self
    }

    pub fn size(mut self, points: u32) -> Self {
        self.size = Some(points);
        self
    }

    pub fn color(mut self, hex: &'static str) -> Self {
        self.color = Some(hex);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParagraphStyle {
    Title,
    Heading(u8),
    Normal,
    Bullet,
}

impl ParagraphStyle {
    fn style_id(self) -> Option<String> {
        match self {
            ParagraphStyle::Title => Some("Title".to_string()),
            ParagraphStyle::Heading(level) => Some(format!("Heading{}", level.clamp(1, 3))),
            ParagraphStyle::Normal | ParagraphStyle::Bullet => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Paragraph {
    pub style: ParagraphStyle,
    pub runs: Vec<Run>,
}

#[derive(Debug, Clone, PartialEq)]
enum Block {
    Paragraph(Paragraph),
    Table {
        table: Table,
        /// Per-body-cell fill overrides, row-major.
        fills: Vec<Vec<Option<String>>>,
    },
    Chart {
        index: usize,
        kind: ChartKind,
    },
    PageBreak,
}

/// Position in the block list that a failed section can be rolled back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark {
    blocks: usize,
    charts: usize,
}

#[derive(Debug, Default)]
pub struct Docx {
    blocks: Vec<Block>,
    charts: Vec<ChartSpec>,
}

impl Docx {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_paragraph(&mut self, style: ParagraphStyle, runs: Vec<Run>) {
        self.blocks.push(Block::Paragraph(Paragraph { style, runs }));
    }

    /// Level 0 is the document title.
    pub fn heading(&mut self, text: impl Into<String>, level: u8) {
        let style = if level == 0 {
            ParagraphStyle::Title
        } else {
            ParagraphStyle::Heading(level)
        };
        self.push_paragraph(style, vec![Run::plain(text)]);
    }

    pub fn paragraph(&mut self, text: impl Into<String>) {
        self.push_paragraph(ParagraphStyle::Normal, vec![Run::plain(text)]);
    }

    pub fn italic(&mut self, text: impl Into<String>) {
        self.push_paragraph(ParagraphStyle::Normal, vec![Run::plain(text).italic()]);
    }

    pub fn formula_note(&mut self, text: &str) {
        self.push_paragraph(
            ParagraphStyle::Normal,
            vec![Run::plain(format!("Formula: {text}")).italic().size(9)],
        );
    }

    pub fn bullet(&mut self, text: impl Into<String>) {
        self.push_paragraph(ParagraphStyle::Bullet, vec![Run::plain(text)]);
    }

    pub fn runs(&mut self, runs: Vec<Run>) {
        self.push_paragraph(ParagraphStyle::Normal, runs);
    }

    pub fn blank(&mut self) {
        self.push_paragraph(ParagraphStyle::Normal, Vec::new());
    }

    pub fn table(&mut self, table: &Table) {
        self.blocks.push(Block::Table {
            table: table.clone(),
            fills: Vec::new(),
        });
    }

    pub fn chart(&mut self, chart: &ChartSpec) -> Result<(), ReportError> {
        chart.validate()?;
        self.charts.push(chart.clone());
        self.blocks.push(Block::Chart {
            index: self.charts.len(),
            kind: chart.kind,
        });
        Ok(())
    }

    /// A heatmap becomes a table whose value cells are shaded by magnitude.
    pub fn heatmap(&mut self, map: &HeatmapSpec) {
        let mut headers = vec![map.corner.clone()];
        headers.extend(map.column_labels.iter().cloned());
        let mut table = Table::new(headers);
        let mut fills = Vec::with_capacity(map.values.len());
        for (label, values) in map.row_labels.iter().zip(&map.values) {
            let mut cells = vec![label.clone()];
            cells.extend(values.iter().map(|v| HeatmapSpec::label(*v)));
            table.push_data(cells);
            let mut row_fills = vec![None];
            row_fills.extend(values.iter().map(|v| Some(map.shade(*v))));
            fills.push(row_fills);
        }
        self.blocks.push(Block::Table { table, fills });
    }

    pub fn page_break(&mut self) {
        self.blocks.push(Block::PageBreak);
    }

    pub fn mark(&self) -> Mark {
        Mark {
            blocks: self.blocks.len(),
            charts: self.charts.len(),
        }
    }

    /// Drop everything added after `mark`.
    pub fn rollback(&mut self, mark: Mark) {
        self.blocks.truncate(mark.blocks);
        self.charts.truncate(mark.charts);
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn chart_count(&self) -> usize {
        self.charts.len()
    }

    /// All visible text, paragraph by paragraph and cell by cell.
    pub fn plain_text(&self) -> Vec<String> {
        let mut out = Vec::new();
        for block in &self.blocks {
            match block {
                Block::Paragraph(p) => {
                    out.push(p.runs.iter().map(|r| r.text.as_str()).collect());
                }
                Block::Table { table, .. } => {
                    out.extend(table.headers.iter().cloned());
                    for row in &table.rows {
                        out.extend(row.cells.iter().cloned());
                    }
                }
                Block::Chart { index, .. } => {
                    if let Some(chart) = self.charts.get(index - 1) {
                        out.push(chart.title.clone());
                    }
                }
                Block::PageBreak => {}
            }
        }
        out
    }

    pub fn into_bytes(self) -> Result<Vec<u8>, ReportError> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default());

        let parts: Vec<(String, Vec<u8>)> = {
            let mut parts = vec![
                ("[Content_Types].xml".to_string(), self.content_types()?),
                ("_rels/.rels".to_string(), package_rels()?),
                ("word/document.xml".to_string(), self.document_xml()?),
                ("word/styles.xml".to_string(), styles_xml()?),
                ("word/_rels/document.xml.rels".to_string(), self.document_rels()?),
            ];
            for (idx, chart) in self.charts.iter().enumerate() {
                parts.push((format!("word/charts/chart{}.xml", idx + 1), chart_xml(chart)?));
            }
            parts
        };

        for (name, bytes) in parts {
            zip.start_file(name, options)?;
            zip.write_all(&bytes)?;
        }
        Ok(zip.finish()?.into_inner())
    }

    fn content_types(&self) -> Result<Vec<u8>, ReportError> {
        let mut xml = Xml::new()?;
        xml.open("Types", &[("xmlns", NS_TYPES)])?;
        xml.empty("Default", &[("Extension", "rels"), ("ContentType", CT_RELS)])?;
        xml.empty("Default", &[("Extension", "xml"), ("ContentType", "application/xml")])?;
        xml.empty(
            "Override",
            &[("PartName", "/word/document.xml"), ("ContentType", CT_DOCUMENT)],
        )?;
        xml.empty(
            "Override",
            &[("PartName", "/word/styles.xml"), ("ContentType", CT_STYLES)],
        )?;
        for idx in 1..=self.charts.len() {
            let part = format!("/word/charts/chart{idx}.xml");
            xml.empty("Override", &[("PartName", &part), ("ContentType", CT_CHART)])?;
        }
        xml.close("Types")?;
        Ok(xml.finish())
    }

    fn document_rels(&self) -> Result<Vec<u8>, ReportError> {
        let mut xml = Xml::new()?;
        xml.open("Relationships", &[("xmlns", NS_PKG_RELS)])?;
        xml.empty(
            "Relationship",
            &[("Id", "rIdStyles"), ("Type", REL_STYLES), ("Target", "styles.xml")],
        )?;
        for idx in 1..=self.charts.len() {
            let id = chart_rel_id(idx);
            let target = format!("charts/chart{idx}.xml");
            xml.empty(
                "Relationship",
                &[("Id", &id), ("Type", REL_CHART), ("Target", &target)],
            )?;
        }
        xml.close("Relationships")?;
        Ok(xml.finish())
    }

    fn document_xml(&self) -> Result<Vec<u8>, ReportError> {
        let mut xml = Xml::new()?;
        xml.open(
            "w:document",
            &[
                ("xmlns:w", NS_W),
                ("xmlns:r", NS_R),
                ("xmlns:wp", NS_WP),
                ("xmlns:a", NS_A),
                ("xmlns:c", NS_C),
            ],
        )?;
        xml.open("w:body", &[])?;
        for block in &self.blocks {
            match block {
                Block::Paragraph(p) => write_paragraph(&mut xml, p)?,
                Block::Table { table, fills } => write_table(&mut xml, table, fills)?,
                Block::Chart { index, kind } => write_chart_anchor(&mut xml, *index, *kind)?,
                Block::PageBreak => {
                    xml.open("w:p", &[])?;
                    xml.open("w:r", &[])?;
                    xml.empty("w:br", &[("w:type", "page")])?;
                    xml.close("w:r")?;
                    xml.close("w:p")?;
                }
            }
        }
        xml.open("w:sectPr", &[])?;
        xml.empty(
            "w:pgSz",
            &[("w:w", PAGE_WIDTH), ("w:h", PAGE_HEIGHT), ("w:orient", "landscape")],
        )?;
        xml.empty(
            "w:pgMar",
            &[
                ("w:top", MARGIN),
                ("w:right", MARGIN),
                ("w:bottom", MARGIN),
                ("w:left", MARGIN),
                ("w:header", MARGIN),
                ("w:footer", MARGIN),
                ("w:gutter", "0"),
            ],
        )?;
        xml.close("w:sectPr")?;
        xml.close("w:body")?;
        xml.close("w:document")?;
        Ok(xml.finish())
    }
}

fn chart_rel_id(index: usize) -> String {
    format!("rIdChart{index}")
}

fn package_rels() -> Result<Vec<u8>, ReportError> {
    let mut xml = Xml::new()?;
    xml.open("Relationships", &[("xmlns", NS_PKG_RELS)])?;
    xml.empty(
        "Relationship",
        &[("Id", "rId1"), ("Type", REL_DOCUMENT), ("Target", "word/document.xml")],
    )?;
    xml.close("Relationships")?;
    Ok(xml.finish())
}

fn write_run(xml: &mut Xml, run: &Run) -> Result<(), ReportError> {
    xml.open("w:r", &[])?;
    if run.bold || run.italic || run.size.is_some() || run.color.is_some() {
        xml.open("w:rPr", &[])?;
        if run.bold {
            xml.empty("w:b", &[])?;
        }
        if run.italic {
            xml.empty("w:i", &[])?;
        }
        if let Some(color) = run.color {
            xml.empty("w:color", &[("w:val", color)])?;
        }
        if let Some(points) = run.size {
            let half_points = (points * 2).to_string();
            xml.empty("w:sz", &[("w:val", &half_points)])?;
        }
        xml.close("w:rPr")?;
    }
    xml.leaf("w:t", &[("xml:space", "preserve")], &run.text)?;
    xml.close("w:r")
}

fn write_paragraph(xml: &mut Xml, paragraph: &Paragraph) -> Result<(), ReportError> {
    xml.open("w:p", &[])?;
    match paragraph.style {
        ParagraphStyle::Bullet => {
            xml.open("w:pPr", &[])?;
            xml.empty("w:ind", &[("w:left", "360"), ("w:hanging", "240")])?;
            xml.close("w:pPr")?;
            write_run(xml, &Run::plain("• "))?;
        }
        style => {
            if let Some(id) = style.style_id() {
                xml.open("w:pPr", &[])?;
                xml.empty("w:pStyle", &[("w:val", &id)])?;
                xml.close("w:pPr")?;
            }
        }
    }
    for run in &paragraph.runs {
        write_run(xml, run)?;
    }
    xml.close("w:p")
}

fn looks_numeric(text: &str) -> bool {
    text.starts_with('$') || text.ends_with('%') || text.parse::<f64>().is_ok()
}

fn write_cell(
    xml: &mut Xml,
    text: &str,
    fill: Option<&str>,
    bold: bool,
    italic: bool,
) -> Result<(), ReportError> {
    xml.open("w:tc", &[])?;
    if let Some(fill) = fill {
        xml.open("w:tcPr", &[])?;
        xml.empty("w:shd", &[("w:val", "clear"), ("w:color", "auto"), ("w:fill", fill)])?;
        xml.close("w:tcPr")?;
    }
    xml.open("w:p", &[])?;
    xml.open("w:pPr", &[])?;
    xml.empty("w:spacing", &[("w:before", "0"), ("w:after", "0")])?;
    if looks_numeric(text) {
        xml.empty("w:jc", &[("w:val", "right")])?;
    }
    xml.close("w:pPr")?;
    let mut run = Run::plain(text).size(8);
    run.bold = bold;
    run.italic = italic;
    write_run(xml, &run)?;
    xml.close("w:p")?;
    xml.close("w:tc")
}

fn write_table(
    xml: &mut Xml,
    table: &Table,
    fills: &[Vec<Option<String>>],
) -> Result<(), ReportError> {
    xml.open("w:tbl", &[])?;
    xml.open("w:tblPr", &[])?;
    xml.empty("w:tblStyle", &[("w:val", "TableGrid")])?;
    xml.empty("w:tblW", &[("w:w", "0"), ("w:type", "auto")])?;
    xml.close("w:tblPr")?;
    xml.open("w:tblGrid", &[])?;
    for _ in &table.headers {
        xml.empty("w:gridCol", &[])?;
    }
    xml.close("w:tblGrid")?;

    xml.open("w:tr", &[])?;
    xml.open("w:trPr", &[])?;
    xml.empty("w:tblHeader", &[])?;
    xml.close("w:trPr")?;
    for header in &table.headers {
        write_cell(xml, header, Some(HEADER_FILL), true, false)?;
    }
    xml.close("w:tr")?;

    for (row_idx, row) in table.rows.iter().enumerate() {
        let (row_fill, bold, italic) = match row.kind {
            RowKind::Data => (None, false, false),
            RowKind::Section => (Some(SECTION_FILL), true, false),
            RowKind::Subtotal => (None, true, false),
            RowKind::Total => (Some(TOTAL_FILL), true, false),
            RowKind::Note => (None, false, true),
        };
        xml.open("w:tr", &[])?;
        for (col_idx, cell) in row.cells.iter().enumerate() {
            let fill = fills
                .get(row_idx)
                .and_then(|r| r.get(col_idx))
                .and_then(|f| f.as_deref())
                .or(row_fill);
            write_cell(xml, cell, fill, bold, italic)?;
        }
        xml.close("w:tr")?;
    }
    xml.close("w:tbl")?;

    // Adjacent tables merge in Word without a paragraph between them.
    xml.empty("w:p", &[])
}

fn chart_extent(kind: ChartKind) -> (u64, u64) {
    match kind {
        ChartKind::Pie => (6 * EMU_PER_INCH, 4 * EMU_PER_INCH),
        _ => (9 * EMU_PER_INCH, EMU_PER_INCH * 9 / 2),
    }
}

fn write_chart_anchor(xml: &mut Xml, index: usize, kind: ChartKind) -> Result<(), ReportError> {
    let (cx, cy) = chart_extent(kind);
    let (cx, cy) = (cx.to_string(), cy.to_string());
    let id = index.to_string();
    let name = format!("Chart {index}");
    let rel = chart_rel_id(index);

    xml.open("w:p", &[])?;
    xml.open("w:r", &[])?;
    xml.open("w:drawing", &[])?;
    xml.open(
        "wp:inline",
        &[("distT", "0"), ("distB", "0"), ("distL", "0"), ("distR", "0")],
    )?;
    xml.empty("wp:extent", &[("cx", &cx), ("cy", &cy)])?;
    xml.empty("wp:effectExtent", &[("l", "0"), ("t", "0"), ("r", "0"), ("b", "0")])?;
    xml.empty("wp:docPr", &[("id", &id), ("name", &name)])?;
    xml.empty("wp:cNvGraphicFramePr", &[])?;
    xml.open("a:graphic", &[])?;
    xml.open("a:graphicData", &[("uri", NS_C)])?;
    xml.empty("c:chart", &[("r:id", &rel)])?;
    xml.close("a:graphicData")?;
    xml.close("a:graphic")?;
    xml.close("wp:inline")?;
    xml.close("w:drawing")?;
    xml.close("w:r")?;
    xml.close("w:p")
}

fn solid_fill(xml: &mut Xml, color: &str) -> Result<(), ReportError> {
    xml.open("a:solidFill", &[])?;
    xml.val("a:srgbClr", color)?;
    xml.close("a:solidFill")
}

fn series_shape(xml: &mut Xml, kind: ChartKind, color: &str) -> Result<(), ReportError> {
    xml.open("c:spPr", &[])?;
    if kind == ChartKind::Line {
        xml.open("a:ln", &[("w", "28575")])?;
        solid_fill(xml, color)?;
        xml.close("a:ln")?;
    } else {
        solid_fill(xml, color)?;
    }
    xml.close("c:spPr")
}

fn write_literal_strings(xml: &mut Xml, values: &[String]) -> Result<(), ReportError> {
    xml.open("c:strLit", &[])?;
    xml.val("c:ptCount", &values.len().to_string())?;
    for (idx, value) in values.iter().enumerate() {
        xml.open("c:pt", &[("idx", &idx.to_string())])?;
        xml.leaf("c:v", &[], value)?;
        xml.close("c:pt")?;
    }
    xml.close("c:strLit")
}

fn write_literal_numbers(xml: &mut Xml, values: &[f64], format: &str) -> Result<(), ReportError> {
    xml.open("c:numLit", &[])?;
    xml.leaf("c:formatCode", &[], format)?;
    xml.val("c:ptCount", &values.len().to_string())?;
    for (idx, value) in values.iter().enumerate() {
        xml.open("c:pt", &[("idx", &idx.to_string())])?;
        xml.leaf("c:v", &[], &value.to_string())?;
        xml.close("c:pt")?;
    }
    xml.close("c:numLit")
}

fn write_data_labels(xml: &mut Xml, chart: &ChartSpec) -> Result<(), ReportError> {
    let pie = chart.kind == ChartKind::Pie;
    if !pie && !chart.show_values {
        return Ok(());
    }
    xml.open("c:dLbls", &[])?;
    if !pie {
        xml.empty(
            "c:numFmt",
            &[("formatCode", chart.number_format), ("sourceLinked", "0")],
        )?;
    }
    xml.val("c:showLegendKey", "0")?;
    xml.val("c:showVal", if pie { "0" } else { "1" })?;
    xml.val("c:showCatName", "0")?;
    xml.val("c:showSerName", "0")?;
    xml.val("c:showPercent", if pie { "1" } else { "0" })?;
    xml.val("c:showBubbleSize", "0")?;
    xml.close("c:dLbls")
}

fn write_series(xml: &mut Xml, chart: &ChartSpec) -> Result<(), ReportError> {
    for (idx, series) in chart.series.iter().enumerate() {
        let idx = idx.to_string();
        xml.open("c:ser", &[])?;
        xml.val("c:idx", &idx)?;
        xml.val("c:order", &idx)?;
        xml.open("c:tx", &[])?;
        xml.leaf("c:v", &[], &series.name)?;
        xml.close("c:tx")?;
        series_shape(xml, chart.kind, series.color)?;
        match chart.kind {
            ChartKind::Bar | ChartKind::ClusteredBar => xml.val("c:invertIfNegative", "0")?,
            ChartKind::Line => {
                xml.open("c:marker", &[])?;
                xml.val("c:symbol", "circle")?;
                xml.val("c:size", "5")?;
                xml.close("c:marker")?;
            }
            ChartKind::StackedArea | ChartKind::Pie => {}
        }
        for (point, color) in chart.point_colors.iter().enumerate() {
            xml.open("c:dPt", &[])?;
            xml.val("c:idx", &point.to_string())?;
            match chart.kind {
                ChartKind::Pie => xml.val("c:bubble3D", "0")?,
                ChartKind::Bar | ChartKind::ClusteredBar => xml.val("c:invertIfNegative", "0")?,
                _ => {}
            }
            xml.open("c:spPr", &[])?;
            solid_fill(xml, color)?;
            xml.close("c:spPr")?;
            xml.close("c:dPt")?;
        }
        write_data_labels(xml, chart)?;
        xml.open("c:cat", &[])?;
        write_literal_strings(xml, &chart.categories)?;
        xml.close("c:cat")?;
        xml.open("c:val", &[])?;
        write_literal_numbers(xml, &series.values, chart.number_format)?;
        xml.close("c:val")?;
        if chart.kind == ChartKind::Line {
            xml.val("c:smooth", "0")?;
        }
        xml.close("c:ser")?;
    }
    Ok(())
}

const CAT_AXIS: &str = "500000001";
const VAL_AXIS: &str = "500000002";

fn write_axes(xml: &mut Xml, chart: &ChartSpec) -> Result<(), ReportError> {
    xml.open("c:catAx", &[])?;
    xml.val("c:axId", CAT_AXIS)?;
    xml.open("c:scaling", &[])?;
    xml.val("c:orientation", "minMax")?;
    xml.close("c:scaling")?;
    xml.val("c:delete", "0")?;
    xml.val("c:axPos", "b")?;
    xml.empty("c:numFmt", &[("formatCode", "General"), ("sourceLinked", "0")])?;
    xml.val("c:tickLblPos", "low")?;
    xml.val("c:crossAx", VAL_AXIS)?;
    xml.val("c:crosses", "autoZero")?;
    xml.val("c:auto", "1")?;
    xml.val("c:lblAlgn", "ctr")?;
    xml.val("c:lblOffset", "100")?;
    xml.close("c:catAx")?;

    xml.open("c:valAx", &[])?;
    xml.val("c:axId", VAL_AXIS)?;
    xml.open("c:scaling", &[])?;
    xml.val("c:orientation", "minMax")?;
    xml.close("c:scaling")?;
    xml.val("c:delete", "0")?;
    xml.val("c:axPos", "l")?;
    xml.empty("c:majorGridlines", &[])?;
    xml.empty(
        "c:numFmt",
        &[("formatCode", chart.number_format), ("sourceLinked", "0")],
    )?;
    xml.val("c:tickLblPos", "nextTo")?;
    xml.val("c:crossAx", CAT_AXIS)?;
    xml.val("c:crosses", "autoZero")?;
    xml.val("c:crossBetween", "between")?;
    xml.close("c:valAx")
}

fn chart_xml(chart: &ChartSpec) -> Result<Vec<u8>, ReportError> {
    let mut xml = Xml::new()?;
    xml.open(
        "c:chartSpace",
        &[("xmlns:c", NS_C), ("xmlns:a", NS_A), ("xmlns:r", NS_R)],
    )?;
    xml.val("c:roundedCorners", "0")?;
    xml.open("c:chart", &[])?;

    xml.open("c:title", &[])?;
    xml.open("c:tx", &[])?;
    xml.open("c:rich", &[])?;
    xml.empty("a:bodyPr", &[])?;
    xml.open("a:p", &[])?;
    xml.open("a:r", &[])?;
    xml.empty("a:rPr", &[("lang", "en-US"), ("b", "1")])?;
    xml.leaf("a:t", &[], &chart.title)?;
    xml.close("a:r")?;
    xml.close("a:p")?;
    xml.close("c:rich")?;
    xml.close("c:tx")?;
    xml.val("c:overlay", "0")?;
    xml.close("c:title")?;
    xml.val("c:autoTitleDeleted", "0")?;

    xml.open("c:plotArea", &[])?;
    xml.empty("c:layout", &[])?;
    let (element, axes) = match chart.kind {
        ChartKind::Bar | ChartKind::ClusteredBar => ("c:barChart", true),
        ChartKind::Line => ("c:lineChart", true),
        ChartKind::StackedArea => ("c:areaChart", true),
        ChartKind::Pie => ("c:pieChart", false),
    };
    xml.open(element, &[])?;
    match chart.kind {
        ChartKind::Bar | ChartKind::ClusteredBar => {
            xml.val("c:barDir", "col")?;
            xml.val("c:grouping", "clustered")?;
        }
        ChartKind::Line => xml.val("c:grouping", "standard")?,
        ChartKind::StackedArea => xml.val("c:grouping", "stacked")?,
        ChartKind::Pie => {}
    }
    xml.val("c:varyColors", if chart.kind == ChartKind::Pie { "1" } else { "0" })?;
    write_series(&mut xml, chart)?;
    match chart.kind {
        ChartKind::Bar | ChartKind::ClusteredBar => xml.val("c:gapWidth", "80")?,
        ChartKind::Line => xml.val("c:marker", "1")?,
        ChartKind::Pie => xml.val("c:firstSliceAng", "90")?,
        ChartKind::StackedArea => {}
    }
    if axes {
        xml.val("c:axId", CAT_AXIS)?;
        xml.val("c:axId", VAL_AXIS)?;
    }
    xml.close(element)?;
    if axes {
        write_axes(&mut xml, chart)?;
    }
    xml.close("c:plotArea")?;

    if chart.series.len() > 1 || chart.kind == ChartKind::Pie {
        xml.open("c:legend", &[])?;
        xml.val("c:legendPos", "b")?;
        xml.val("c:overlay", "0")?;
        xml.close("c:legend")?;
    }
    xml.val("c:plotVisOnly", "1")?;
    xml.close("c:chart")?;
    xml.close("c:chartSpace")?;
    Ok(xml.finish())
}

fn style(
    xml: &mut Xml,
    id: &str,
    name: &str,
    half_points: &str,
    bold: bool,
    color: Option<&str>,
) -> Result<(), ReportError> {
    xml.open("w:style", &[("w:type", "paragraph"), ("w:styleId", id)])?;
    xml.empty("w:name", &[("w:val", name)])?;
    if id != "Normal" {
        xml.empty("w:basedOn", &[("w:val", "Normal")])?;
        xml.empty("w:next", &[("w:val", "Normal")])?;
        xml.open("w:pPr", &[])?;
        xml.empty("w:keepNext", &[])?;
        xml.empty("w:spacing", &[("w:before", "240"), ("w:after", "120")])?;
        xml.close("w:pPr")?;
    }
    xml.open("w:rPr", &[])?;
    if bold {
        xml.empty("w:b", &[])?;
    }
    if let Some(color) = color {
        xml.empty("w:color", &[("w:val", color)])?;
    }
    xml.empty("w:sz", &[("w:val", half_points)])?;
    xml.close("w:rPr")?;
    xml.close("w:style")
}

fn styles_xml() -> Result<Vec<u8>, ReportError> {
    let mut xml = Xml::new()?;
    xml.open("w:styles", &[("xmlns:w", NS_W)])?;
    xml.open("w:docDefaults", &[])?;
    xml.open("w:rPrDefault", &[])?;
    xml.open("w:rPr", &[])?;
    xml.empty(
        "w:rFonts",
        &[("w:ascii", "Calibri"), ("w:hAnsi", "Calibri"), ("w:cs", "Calibri")],
    )?;
    xml.empty("w:sz", &[("w:val", "20")])?;
    xml.close("w:rPr")?;
    xml.close("w:rPrDefault")?;
    xml.open("w:pPrDefault", &[])?;
    xml.open("w:pPr", &[])?;
    xml.empty("w:spacing", &[("w:after", "80")])?;
    xml.close("w:pPr")?;
    xml.close("w:pPrDefault")?;
    xml.close("w:docDefaults")?;

    style(&mut xml, "Normal", "Normal", "20", false, None)?;
    style(&mut xml, "Title", "Title", "40", true, Some("1F3864"))?;
    style(&mut xml, "Heading1", "heading 1", "30", true, Some("1F3864"))?;
    style(&mut xml, "Heading2", "heading 2", "26", true, Some("2F5496"))?;
    style(&mut xml, "Heading3", "heading 3", "22", true, Some("2F5496"))?;

    xml.open("w:style", &[("w:type", "table"), ("w:styleId", "TableGrid")])?;
    xml.empty("w:name", &[("w:val", "Table Grid")])?;
    xml.open("w:tblPr", &[])?;
    xml.open("w:tblBorders", &[])?;
    for edge in ["w:top", "w:left", "w:bottom", "w:right", "w:insideH", "w:insideV"] {
        xml.empty(
            edge,
            &[("w:val", "single"), ("w:sz", "4"), ("w:space", "0"), ("w:color", "808080")],
        )?;
    }
    xml.close("w:tblBorders")?;
    xml.open("w:tblCellMar", &[])?;
    xml.empty("w:left", &[("w:w", "60"), ("w:type", "dxa")])?;
    xml.empty("w:right", &[("w:w", "60"), ("w:type", "dxa")])?;
    xml.close("w:tblCellMar")?;
    xml.close("w:tblPr")?;
    xml.close("w:style")?;

    xml.close("w:styles")?;
    Ok(xml.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::charts::Series;
    use quick_xml::Reader;
    use std::io::Read;

    fn part(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = archive.by_name(name).unwrap();
        let mut content = String::new();
        file.read_to_string(&mut content).unwrap();
        content
    }

    fn texts(xml: &str, element: &[u8]) -> Vec<String> {
        let mut reader = Reader::from_str(xml);
        let mut out = Vec::new();
        let mut inside = false;
        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) if e.name().as_ref() == element => inside = true,
                Ok(Event::End(e)) if e.name().as_ref() == element => inside = false,
                Ok(Event::Text(t)) if inside => {
                    out.push(String::from_utf8_lossy(t.as_ref()).to_string())
                }
                Ok(Event::Eof) => break,
                Err(e) => panic!("bad xml: {e}"),
                _ => {}
            }
        }
        out
    }

    fn chart() -> ChartSpec {
        ChartSpec::new("Annual Loss", ChartKind::Bar, vec!["2024".into(), "2025".into()])
            .with_series(Series::new("Loss", "D62728", vec![100.0, 250.5]))
    }

    #[test]
    fn package_contains_document_styles_and_chart_parts() {
        let mut doc = Docx::new();
        doc.heading("But-For Damages Analysis Report", 0);
        doc.paragraph("Case: Smith");
        doc.chart(&chart()).unwrap();
        let bytes = doc.into_bytes().unwrap();

        let archive = zip::ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        for expected in [
            "[Content_Types].xml",
            "_rels/.rels",
            "word/document.xml",
            "word/styles.xml",
            "word/_rels/document.xml.rels",
            "word/charts/chart1.xml",
        ] {
            assert!(names.contains(&expected), "missing {expected}");
        }

        let document = part(&bytes, "word/document.xml");
        assert_eq!(
            texts(&document, b"w:t"),
            vec!["But-For Damages Analysis Report", "Case: Smith"]
        );
        assert!(document.contains("w:orient=\"landscape\""));
        assert!(document.contains("r:id=\"rIdChart1\""));

        let rels = part(&bytes, "word/_rels/document.xml.rels");
        assert!(rels.contains("charts/chart1.xml"));
        let types = part(&bytes, "[Content_Types].xml");
        assert!(types.contains("/word/charts/chart1.xml"));

        let chart_xml = part(&bytes, "word/charts/chart1.xml");
        assert_eq!(texts(&chart_xml, b"a:t"), vec!["Annual Loss"]);
        assert_eq!(texts(&chart_xml, b"c:v"), vec!["Loss", "2024", "2025", "100", "250.5"]);
    }

    #[test]
    fn tables_render_header_and_cells() {
        let mut table = Table::new(["Year", "Loss"]);
        table.push_data(vec!["2024".into(), "$1,000.00".into()]);
        table.push(RowKind::Total, vec!["TOTAL".into(), "$1,000.00".into()]);
        let mut doc = Docx::new();
        doc.table(&table);
        let bytes = doc.into_bytes().unwrap();
        let document = part(&bytes, "word/document.xml");
        assert_eq!(
            texts(&document, b"w:t"),
            vec!["Year", "Loss", "2024", "$1,000.00", "TOTAL", "$1,000.00"]
        );
        assert!(document.contains("w:tblHeader"));
        assert!(document.contains(TOTAL_FILL));
    }

    #[test]
    fn rollback_discards_blocks_and_charts() {
        let mut doc = Docx::new();
        doc.paragraph("kept");
        let mark = doc.mark();
        doc.paragraph("dropped");
        doc.chart(&chart()).unwrap();
        assert_eq!(doc.chart_count(), 1);
        doc.rollback(mark);
        assert_eq!(doc.chart_count(), 0);
        assert_eq!(doc.plain_text(), vec!["kept"]);
    }

    #[test]
    fn invalid_chart_is_rejected_without_side_effects() {
        let mut doc = Docx::new();
        let bad = ChartSpec::new("Bad", ChartKind::Line, vec!["2024".into()])
            .with_series(Series::new("x", "000000", vec![f64::INFINITY]));
        assert!(doc.chart(&bad).is_err());
        assert!(doc.is_empty());
        assert_eq!(doc.chart_count(), 0);
    }

    #[test]
    fn heatmap_cells_are_shaded() {
        let map = HeatmapSpec {
            title: "Heat".into(),
            corner: "Discount \\ Growth".into(),
            column_labels: vec!["2.0%".into(), "3.0%".into()],
            row_labels: vec!["4.0%".into()],
            values: vec![vec![10.0, 20.0]],
        };
        let mut doc = Docx::new();
        doc.heatmap(&map);
        let text = doc.plain_text();
        assert!(text.contains(&"$20".to_string()));
        let document = part(&doc.into_bytes().unwrap(), "word/document.xml");
        assert!(document.contains("F8696B"));
        assert!(document.contains("63BE7B"));
    }

    #[test]
    fn runs_carry_formatting() {
        let mut doc = Docx::new();
        doc.runs(vec![
            Run::plain("Validation status: ").bold(),
            Run::plain("Attention required").bold().color("B01E1E"),
        ]);
        doc.formula_note("Loss = BF - ACT");
        let document = part(&doc.into_bytes().unwrap(), "word/document.xml");
        assert!(document.contains("w:val=\"B01E1E\""));
        assert!(document.contains("w:sz w:val=\"18\""));
        assert_eq!(
            texts(&document, b"w:t"),
            vec!["Validation status: ", "Attention required", "Formula: Loss = BF - ACT"]
        );
    }
}
