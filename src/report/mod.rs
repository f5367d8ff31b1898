pub mod charts;
pub mod columns;
pub mod document;
pub mod docx;
pub mod format;
pub mod tables;
pub mod workbook;

use serde::Serialize;
use thiserror::Error;

use crate::core::{AssumptionView, GridError};

pub use document::render_document;
pub use workbook::render_workbook;

pub const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const XLSX_FILENAME: &str = "damages_report.xlsx";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("xml write failed: {0}")]
    Xml(String),
    #[error("zip write failed: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("spreadsheet write failed: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("chart '{title}': {reason}")]
    Chart { title: String, reason: String },
    #[error(transparent)]
    Grid(#[from] GridError),
}

/// A section that failed to render and was left out of the artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderWarning {
    pub section: String,
    pub error: String,
}

/// Whether future losses are shown discounted to present value or at
/// nominal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureBasis {
    PresentValue,
    Nominal,
}

impl FutureBasis {
    pub fn from_view(view: &AssumptionView<'_>) -> Self {
        if view.include_discounting() {
            FutureBasis::PresentValue
        } else {
            FutureBasis::Nominal
        }
    }

    pub fn is_discounted(self) -> bool {
        self == FutureBasis::PresentValue
    }

    pub fn future_label(self) -> &'static str {
        match self {
            FutureBasis::PresentValue => "Future PV",
            FutureBasis::Nominal => "Future (Nominal)",
        }
    }

    pub fn total_label(self) -> &'static str {
        match self {
            FutureBasis::PresentValue => "Total PV",
            FutureBasis::Nominal => "Total (Nominal)",
        }
    }
}

/// Per-export state threaded through every section builder.
#[derive(Debug, Default)]
pub struct RenderContext {
    tables: usize,
    warnings: Vec<RenderWarning>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_table(&mut self) -> usize {
        self.tables += 1;
        self.tables
    }

    pub fn table_count(&self) -> usize {
        self.tables
    }

    pub fn rewind_tables(&mut self, count: usize) {
        self.tables = count;
    }

    pub fn record(&mut self, section: &str, error: &ReportError) {
        tracing::warn!(section, %error, "report section failed; omitted from export");
        self.warnings.push(RenderWarning {
            section: section.to_string(),
            error: error.to_string(),
        });
    }

    pub fn warnings(&self) -> &[RenderWarning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<RenderWarning> {
        self.warnings
    }
}

/// A finished export artifact.
#[derive(Debug)]
pub struct RenderedReport {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: &'static str,
    pub warnings: Vec<RenderWarning>,
}

impl RenderedReport {
    pub fn failed_sections(&self) -> Vec<&str> {
        self.warnings.iter().map(|w| w.section.as_str()).collect()
    }
}
