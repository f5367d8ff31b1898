//! SQLite persistence for evaluees, their cases, and saved calculations.

mod models;

pub use models::{
    Calculation, Case, Evaluee, NewCase, SearchResults, Stats, apply_case_patch, parse_date,
};

use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::core::value::truthy;
use crate::core::{coerce_number, validate_assumption_ranges};

const SCHEMA: &str = include_str!("schema.sql");
const SEARCH_LIMIT: i64 = 25;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Resource not found")]
    NotFound,
    #[error("Profile name is required")]
    NameRequired,
    #[error("Profile name already exists")]
    DuplicateName,
    #[error("Invalid date format for '{0}'. Use ISO format YYYY-MM-DD.")]
    InvalidDate(&'static str),
    #[error("Assumptions validation failed")]
    Validation(Vec<String>),
    #[error("Data integrity error: {0}")]
    Integrity(String),
    #[error("database error: {0}")]
    Sqlite(rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
            rusqlite::Error::SqliteFailure(code, message)
                if code.code == ErrorCode::ConstraintViolation =>
            {
                StoreError::Integrity(message.unwrap_or_else(|| code.to_string()))
            }
            other => StoreError::Sqlite(other),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

fn timestamp() -> String {
    Utc::now()
        .naive_utc()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

const EVALUEE_SELECT: &str = "SELECT e.id, e.profile_name, e.created_at, e.updated_at,
        (SELECT COUNT(*) FROM cases c WHERE c.evaluee_id = e.id)
     FROM evaluees e";

const CASE_SELECT: &str = "SELECT id, evaluee_id, case_name, case_type, date_of_birth,
        incident_date, valuation_date, wle_years, yfs_years, le_years, assumptions,
        latest_calculation, created_at, updated_at
     FROM cases";

const CALCULATION_SELECT: &str = "SELECT id, case_id, calculated_at, description,
        total_damages_pv, past_damages, future_damages_pv, assumptions, results
     FROM calculations";

fn evaluee_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Evaluee> {
    Ok(Evaluee {
        id: row.get(0)?,
        profile_name: row.get(1)?,
        created_at: row.get(2)?,
        updated_at: row.get(3)?,
        case_count: row.get(4)?,
    })
}

fn case_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Case> {
    Ok(Case {
        id: row.get(0)?,
        evaluee_id: row.get(1)?,
        case_name: row.get(2)?,
        case_type: row.get(3)?,
        date_of_birth: row.get(4)?,
        incident_date: row.get(5)?,
        valuation_date: row.get(6)?,
        wle_years: row.get(7)?,
        yfs_years: row.get(8)?,
        le_years: row.get(9)?,
        assumptions: Some(row.get::<_, Option<Value>>(10)?.unwrap_or(Value::Null)),
        latest_calculation: Some(row.get::<_, Option<Value>>(11)?.unwrap_or(Value::Null)),
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
        calculation_history: None,
    })
}

fn calculation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Calculation> {
    Ok(Calculation {
        id: row.get(0)?,
        case_id: row.get(1)?,
        calculated_at: row.get(2)?,
        description: row.get(3)?,
        total_damages_pv: row.get(4)?,
        past_damages: row.get(5)?,
        future_damages_pv: row.get(6)?,
        assumptions: Some(row.get::<_, Option<Value>>(7)?.unwrap_or(Value::Null)),
        results: Some(row.get::<_, Option<Value>>(8)?.unwrap_or(Value::Null)),
    })
}

/// Body value for a JSON column: falsy input becomes an empty object.
fn object_or_empty(value: Option<&Value>) -> Value {
    value
        .filter(|v| truthy(v))
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()))
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") {
            warn!(path = %path.display(), mode = %mode, "database did not switch to WAL journaling");
        }
        Self::init(conn)
    }

    /// In-memory database for the testing profile.
    pub fn in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    // ── Evaluees ───────────────────────────────────────────────

    pub fn list_evaluees(&self) -> StoreResult<Vec<Evaluee>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{EVALUEE_SELECT} ORDER BY e.profile_name ASC"))?;
        let evaluees = stmt
            .query_map([], evaluee_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(evaluees)
    }

    pub fn get_evaluee(&self, id: i64) -> StoreResult<Evaluee> {
        Ok(self
            .conn
            .query_row(&format!("{EVALUEE_SELECT} WHERE e.id = ?1"), [id], evaluee_row)?)
    }

    fn name_taken(&self, name: &str, except: Option<i64>) -> StoreResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM evaluees WHERE profile_name = ?1 AND id != ?2",
                params![name, except.unwrap_or(-1)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn create_evaluee(&self, profile_name: &str) -> StoreResult<Evaluee> {
        let name = profile_name.trim();
        if name.is_empty() {
            return Err(StoreError::NameRequired);
        }
        if self.name_taken(name, None)? {
            return Err(StoreError::DuplicateName);
        }
        let now = timestamp();
        self.conn.execute(
            "INSERT INTO evaluees (profile_name, created_at, updated_at) VALUES (?1, ?2, ?2)",
            params![name, now],
        )?;
        let id = self.conn.last_insert_rowid();
        info!(evaluee_id = id, "created evaluee");
        self.get_evaluee(id)
    }

    /// Renames when a non-blank name is given; always bumps `updated_at`.
    pub fn update_evaluee(&self, id: i64, profile_name: &str) -> StoreResult<Evaluee> {
        self.get_evaluee(id)?;
        let name = profile_name.trim();
        let now = timestamp();
        if name.is_empty() {
            self.conn.execute(
                "UPDATE evaluees SET updated_at = ?1 WHERE id = ?2",
                params![now, id],
            )?;
        } else {
            if self.name_taken(name, Some(id))? {
                return Err(StoreError::DuplicateName);
            }
            self.conn.execute(
                "UPDATE evaluees SET profile_name = ?1, updated_at = ?2 WHERE id = ?3",
                params![name, now, id],
            )?;
        }
        self.get_evaluee(id)
    }

    /// Deletes the evaluee with all of its cases and calculations.
    pub fn delete_evaluee(&self, id: i64) -> StoreResult<Evaluee> {
        let evaluee = self.get_evaluee(id)?;
        self.conn
            .execute("DELETE FROM evaluees WHERE id = ?1", [id])?;
        info!(evaluee_id = id, "deleted evaluee");
        Ok(evaluee)
    }

    // ── Cases ──────────────────────────────────────────────────

    /// Case summaries in creation order.
    pub fn evaluee_cases(&self, evaluee_id: i64) -> StoreResult<Vec<Case>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CASE_SELECT} WHERE evaluee_id = ?1 ORDER BY id ASC"))?;
        let cases = stmt
            .query_map([evaluee_id], case_row)?
            .map(|case| case.map(Case::summary))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(cases)
    }

    /// Full cases for an evaluee, most recently updated first.
    pub fn list_cases(&self, evaluee_id: i64) -> StoreResult<Vec<Case>> {
        self.get_evaluee(evaluee_id)?;
        let mut stmt = self.conn.prepare(&format!(
            "{CASE_SELECT} WHERE evaluee_id = ?1 ORDER BY updated_at DESC, id DESC"
        ))?;
        let cases = stmt
            .query_map([evaluee_id], case_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(cases)
    }

    pub fn get_case(&self, id: i64, include_history: bool) -> StoreResult<Case> {
        let mut case = self
            .conn
            .query_row(&format!("{CASE_SELECT} WHERE id = ?1"), [id], case_row)?;
        if include_history {
            let mut stmt = self.conn.prepare(&format!(
                "{CALCULATION_SELECT} WHERE case_id = ?1 ORDER BY id ASC"
            ))?;
            let history = stmt
                .query_map([id], calculation_row)?
                .map(|calc| calc.map(Calculation::summary))
                .collect::<Result<Vec<_>, _>>()?;
            case.calculation_history = Some(history);
        }
        Ok(case)
    }

    pub fn create_case(&self, evaluee_id: i64, body: &Map<String, Value>) -> StoreResult<Case> {
        self.get_evaluee(evaluee_id)?;
        let new = NewCase::from_json(body)?;
        let now = timestamp();
        self.conn.execute(
            "INSERT INTO cases (evaluee_id, case_name, case_type, date_of_birth, incident_date,
                valuation_date, wle_years, yfs_years, le_years, assumptions, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
            params![
                evaluee_id,
                new.case_name,
                new.case_type,
                new.date_of_birth,
                new.incident_date,
                new.valuation_date,
                new.wle_years,
                new.yfs_years,
                new.le_years,
                new.assumptions,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        info!(evaluee_id, case_id = id, "created case");
        self.get_case(id, false)
    }

    pub fn update_case(&self, id: i64, body: &Map<String, Value>) -> StoreResult<Case> {
        let mut case = self.get_case(id, false)?;
        apply_case_patch(&mut case, body)?;
        case.updated_at = timestamp();
        self.conn.execute(
            "UPDATE cases SET case_name = ?1, case_type = ?2, date_of_birth = ?3,
                incident_date = ?4, valuation_date = ?5, wle_years = ?6, yfs_years = ?7,
                le_years = ?8, assumptions = ?9, latest_calculation = ?10, updated_at = ?11
             WHERE id = ?12",
            params![
                case.case_name,
                case.case_type,
                case.date_of_birth,
                case.incident_date,
                case.valuation_date,
                case.wle_years,
                case.yfs_years,
                case.le_years,
                case.assumptions.as_ref().filter(|v| !v.is_null()),
                case.latest_calculation.as_ref().filter(|v| !v.is_null()),
                case.updated_at,
                id,
            ],
        )?;
        Ok(case)
    }

    pub fn delete_case(&self, id: i64) -> StoreResult<Case> {
        let case = self.get_case(id, false)?;
        self.conn.execute("DELETE FROM cases WHERE id = ?1", [id])?;
        info!(case_id = id, "deleted case");
        Ok(case)
    }

    // ── Calculations ───────────────────────────────────────────

    /// Calculation summaries for a case, newest first.
    pub fn list_calculations(&self, case_id: i64) -> StoreResult<Vec<Calculation>> {
        self.get_case(case_id, false)?;
        let mut stmt = self.conn.prepare(&format!(
            "{CALCULATION_SELECT} WHERE case_id = ?1 ORDER BY calculated_at DESC, id DESC"
        ))?;
        let calculations = stmt
            .query_map([case_id], calculation_row)?
            .map(|calc| calc.map(Calculation::summary))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(calculations)
    }

    pub fn get_calculation(&self, id: i64) -> StoreResult<Calculation> {
        Ok(self.conn.query_row(
            &format!("{CALCULATION_SELECT} WHERE id = ?1"),
            [id],
            calculation_row,
        )?)
    }

    /// Range-checks the assumptions, then records the calculation and makes
    /// its results the case's latest calculation in one transaction.
    pub fn save_calculation(&mut self, case_id: i64, body: &Map<String, Value>) -> StoreResult<Calculation> {
        self.get_case(case_id, false)?;

        let assumptions = object_or_empty(body.get("assumptions"));
        let violations = validate_assumption_ranges(&assumptions);
        if !violations.is_empty() {
            warn!(case_id, violations = violations.len(), "rejected calculation save");
            return Err(StoreError::Validation(violations));
        }
        let results = object_or_empty(body.get("results"));
        let description = body
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);
        let number = |key: &str| body.get(key).and_then(coerce_number);
        let now = timestamp();

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO calculations (case_id, calculated_at, description, assumptions, results,
                total_damages_pv, past_damages, future_damages_pv)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                case_id,
                now,
                description,
                assumptions,
                results,
                number("total_damages_pv"),
                number("past_damages"),
                number("future_damages_pv"),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "UPDATE cases SET latest_calculation = ?1, updated_at = ?2 WHERE id = ?3",
            params![results, now, case_id],
        )?;
        tx.commit()?;

        info!(case_id, calculation_id = id, "saved calculation");
        self.get_calculation(id)
    }

    pub fn delete_calculation(&self, id: i64) -> StoreResult<()> {
        self.get_calculation(id)?;
        self.conn
            .execute("DELETE FROM calculations WHERE id = ?1", [id])?;
        Ok(())
    }

    // ── Utility ────────────────────────────────────────────────

    /// Case-insensitive substring match over profile and case names.
    pub fn search(&self, query: &str) -> StoreResult<SearchResults> {
        let pattern = format!("%{query}%");
        let mut stmt = self.conn.prepare(&format!(
            "{EVALUEE_SELECT} WHERE e.profile_name LIKE ?1 ORDER BY e.profile_name ASC LIMIT ?2"
        ))?;
        let evaluees = stmt
            .query_map(params![pattern, SEARCH_LIMIT], evaluee_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self.conn.prepare(&format!(
            "{CASE_SELECT} WHERE case_name LIKE ?1 ORDER BY updated_at DESC, id DESC LIMIT ?2"
        ))?;
        let cases = stmt
            .query_map(params![pattern, SEARCH_LIMIT], case_row)?
            .map(|case| case.map(Case::summary))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SearchResults { evaluees, cases })
    }

    pub fn stats(&self) -> StoreResult<Stats> {
        let count = |table: &str| -> StoreResult<i64> {
            Ok(self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?)
        };
        Ok(Stats {
            evaluees: count("evaluees")?,
            cases: count("cases")?,
            calculations: count("calculations")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn store_with_case() -> (Store, Evaluee, Case) {
        let store = Store::in_memory().unwrap();
        let evaluee = store.create_evaluee("  Jane Roe ").unwrap();
        let case = store
            .create_case(evaluee.id, &body(json!({"case_name": "Roe v. Acme"})))
            .unwrap();
        (store, evaluee, case)
    }

    #[test]
    fn evaluee_names_are_trimmed_required_and_unique() {
        let store = Store::in_memory().unwrap();
        let jane = store.create_evaluee(" Jane ").unwrap();
        assert_eq!(jane.profile_name, "Jane");
        assert_eq!(jane.case_count, 0);
        assert!(matches!(store.create_evaluee("   "), Err(StoreError::NameRequired)));
        assert!(matches!(store.create_evaluee("Jane"), Err(StoreError::DuplicateName)));

        let john = store.create_evaluee("John").unwrap();
        assert!(matches!(
            store.update_evaluee(john.id, "Jane"),
            Err(StoreError::DuplicateName)
        ));
        assert_eq!(store.update_evaluee(john.id, "").unwrap().profile_name, "John");
        assert_eq!(store.update_evaluee(john.id, "Johnny").unwrap().profile_name, "Johnny");

        let names: Vec<_> = store
            .list_evaluees()
            .unwrap()
            .into_iter()
            .map(|e| e.profile_name)
            .collect();
        assert_eq!(names, vec!["Jane", "Johnny"]);
    }

    #[test]
    fn cases_round_trip_and_patch() {
        let (store, evaluee, case) = store_with_case();
        assert_eq!(case.case_type.as_deref(), Some("pi"));
        assert_eq!(case.assumptions, Some(json!({})));
        assert_eq!(store.get_evaluee(evaluee.id).unwrap().case_count, 1);

        let updated = store
            .update_case(
                case.id,
                &body(json!({
                    "case_name": "",
                    "valuation_date": "2024-06-30",
                    "wle_years": 21.4,
                    "assumptions": {"discount": {"rate": 0.04}},
                    "latest_calculation": "ignored"
                })),
            )
            .unwrap();
        assert_eq!(updated.case_name, "Roe v. Acme");
        assert_eq!(
            updated.valuation_date,
            chrono::NaiveDate::from_ymd_opt(2024, 6, 30)
        );
        let reloaded = store.get_case(case.id, false).unwrap();
        assert_eq!(reloaded.wle_years, Some(21.4));
        assert_eq!(reloaded.assumptions, Some(json!({"discount": {"rate": 0.04}})));
        assert_eq!(reloaded.latest_calculation, Some(Value::Null));

        let err = store
            .update_case(case.id, &body(json!({"incident_date": "yesterday"})))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidDate("incident_date")));

        let summaries = store.evaluee_cases(evaluee.id).unwrap();
        assert_eq!(summaries.len(), 1);
        assert!(summaries[0].assumptions.is_none());
    }

    #[test]
    fn save_calculation_gates_on_ranges_and_updates_latest() {
        let (mut store, _, case) = store_with_case();
        let rejected = store.save_calculation(
            case.id,
            &body(json!({
                "assumptions": {"butFor": {"growth": 0.5}, "discount": {"rate": 0.03}, "aef": {"ufEff": 0.05}},
                "results": {"totalPV": 1}
            })),
        );
        match rejected {
            Err(StoreError::Validation(violations)) => {
                assert_eq!(violations.len(), 1);
                assert!(violations[0].starts_with("Growth rate"));
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
        assert_eq!(store.stats().unwrap().calculations, 0);

        let saved = store
            .save_calculation(
                case.id,
                &body(json!({
                    "description": "baseline",
                    "assumptions": {"butFor": {"growth": 0.02}, "discount": {"rate": 0.04},
                                    "aef": {"ufEff": 0.08, "tlEff": 0.25, "fringePct": 0.22}},
                    "results": {"totalPV": 123456.78},
                    "total_damages_pv": 123456.78
                })),
            )
            .unwrap();
        assert_eq!(saved.assumptions.as_ref().unwrap()["butFor"]["growth"], json!(0.02));
        assert_eq!(saved.total_damages_pv, Some(123456.78));

        let case = store.get_case(case.id, true).unwrap();
        assert_eq!(case.latest_calculation, Some(json!({"totalPV": 123456.78})));
        let history = case.calculation_history.unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].results.is_none());

        store.delete_calculation(saved.id).unwrap();
        assert!(matches!(store.get_calculation(saved.id), Err(StoreError::NotFound)));
    }

    #[test]
    fn deleting_an_evaluee_cascades() {
        let (mut store, evaluee, case) = store_with_case();
        store
            .save_calculation(case.id, &body(json!({"results": {"a": 1}})))
            .unwrap();
        store.delete_evaluee(evaluee.id).unwrap();
        assert_eq!(
            store.stats().unwrap(),
            Stats {
                evaluees: 0,
                cases: 0,
                calculations: 0
            }
        );
        assert!(matches!(store.get_case(case.id, false), Err(StoreError::NotFound)));
    }

    #[test]
    fn search_is_case_insensitive_over_both_names() {
        let (store, _, _) = store_with_case();
        store.create_evaluee("Mark Acmeson").unwrap();
        let results = store.search("acme").unwrap();
        assert_eq!(results.evaluees.len(), 1);
        assert_eq!(results.cases.len(), 1);
        assert!(results.cases[0].assumptions.is_none());
        assert!(store.search("zzz").unwrap().evaluees.is_empty());
    }

    #[test]
    fn file_store_opens_in_wal_mode_and_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("bfda.db");
        let store = Store::open(&path).unwrap();
        let mode: String = store
            .conn
            .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");
        store.create_evaluee("Jane").unwrap();
        drop(store);
        assert_eq!(Store::open(&path).unwrap().stats().unwrap().evaluees, 1);
    }

    #[test]
    fn missing_records_are_not_found() {
        let mut store = Store::in_memory().unwrap();
        assert!(matches!(store.get_evaluee(9), Err(StoreError::NotFound)));
        assert!(matches!(store.list_cases(9), Err(StoreError::NotFound)));
        assert!(matches!(
            store.save_calculation(9, &Map::new()),
            Err(StoreError::NotFound)
        ));
    }
}
