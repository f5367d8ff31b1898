use crate::core::Row;

use super::format::{fixed, money, portion_detail};

/// Values at or below this magnitude count as zero for column inclusion.
pub const NONZERO_THRESHOLD: f64 = 1e-9;

pub type Amount = fn(&Row) -> f64;
pub type Text = fn(&Row) -> String;

#[derive(Clone, Copy)]
enum Render {
    Text(Text),
    Money(Amount),
    Fixed(Amount, usize),
}

/// A candidate column: how to render a cell, and whether the column belongs
/// in a given table.
#[derive(Clone, Copy)]
pub struct ColumnSpec {
    pub key: &'static str,
    pub header: &'static str,
    render: Render,
    enabled: bool,
    require_nonzero: bool,
}

impl ColumnSpec {
    pub fn text(key: &'static str, header: &'static str, cell: Text) -> Self {
        Self::new(key, header, Render::Text(cell))
    }

    pub fn money(key: &'static str, header: &'static str, amount: Amount) -> Self {
        Self::new(key, header, Render::Money(amount))
    }

    pub fn fixed(key: &'static str, header: &'static str, amount: Amount, decimals: usize) -> Self {
        Self::new(key, header, Render::Fixed(amount, decimals))
    }

    fn new(key: &'static str, header: &'static str, render: Render) -> Self {
        Self {
            key,
            header,
            render,
            enabled: true,
            require_nonzero: false,
        }
    }

    /// Keep the column only when `condition` holds.
    pub fn when(mut self, condition: bool) -> Self {
        self.enabled = self.enabled && condition;
        self
    }

    /// Keep the column only when some row carries a non-zero amount.
    pub fn if_nonzero(mut self) -> Self {
        self.require_nonzero = true;
        self
    }

    fn amount(&self) -> Option<Amount> {
        match self.render {
            Render::Money(amount) | Render::Fixed(amount, _) => Some(amount),
            Render::Text(_) => None,
        }
    }

    fn included(&self, rows: &[Row]) -> bool {
        if !self.enabled {
            return false;
        }
        if !self.require_nonzero {
            return true;
        }
        self.amount().is_some_and(|amount| has_nonzero(rows, amount))
    }

    pub fn cell(&self, row: &Row) -> String {
        match self.render {
            Render::Text(text) => text(row),
            Render::Money(amount) => money(amount(row)),
            Render::Fixed(amount, decimals) => fixed(amount(row), decimals),
        }
    }
}

pub fn has_nonzero(rows: &[Row], amount: Amount) -> bool {
    rows.iter().any(|row| amount(row).abs() > NONZERO_THRESHOLD)
}

/// The realized column list for one table's row set.
pub struct Schema {
    columns: Vec<ColumnSpec>,
}

impl Schema {
    pub fn realize(candidates: Vec<ColumnSpec>, rows: &[Row]) -> Self {
        Self {
            columns: candidates.into_iter().filter(|c| c.included(rows)).collect(),
        }
    }

    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.header.to_string()).collect()
    }

    pub fn cells(&self, row: &Row) -> Vec<String> {
        self.columns.iter().map(|c| c.cell(row)).collect()
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.key == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

pub fn year(row: &Row) -> String {
    row.year_text()
}

pub fn age(row: &Row) -> String {
    row.age_text()
}

pub fn portion(row: &Row) -> String {
    portion_detail(row.portion())
}
