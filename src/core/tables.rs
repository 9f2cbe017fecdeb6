use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::types::{BracketTable, FilingBrackets, FilingStatus, PlanLimits, StandardDeductions};

pub const BRACKETS_FILE: &str = "tax_brackets_2025.json";
pub const STD_DEDUCTION_FILE: &str = "std_deduction_2025.json";
pub const PLAN_LIMITS_FILE: &str = "plan_limits_2025.json";

const EMBEDDED_BRACKETS: &str = include_str!("../../data/tax_brackets_2025.json");
const EMBEDDED_STD_DEDUCTION: &str = include_str!("../../data/std_deduction_2025.json");
const EMBEDDED_PLAN_LIMITS: &str = include_str!("../../data/plan_limits_2025.json");

#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {name}: {source}")]
    Parse {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{name} has no entries for a known filing status")]
    Empty { name: String },
}

/// The external data the optimizer consumes but never computes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxTables {
    pub brackets: BracketTable,
    pub standard_deductions: StandardDeductions,
    pub plan_limits: PlanLimits,
}

impl TaxTables {
    /// Tables compiled into the binary.
    pub fn embedded() -> Result<Self, TableError> {
        Self::from_json_strs(
            EMBEDDED_BRACKETS,
            EMBEDDED_STD_DEDUCTION,
            EMBEDDED_PLAN_LIMITS,
        )
    }

    pub fn load_dir(dir: &Path) -> Result<Self, TableError> {
        debug!(dir = %dir.display(), "loading tax tables");
        let brackets = read_file(&dir.join(BRACKETS_FILE))?;
        let std_deduction = read_file(&dir.join(STD_DEDUCTION_FILE))?;
        let plan_limits = read_file(&dir.join(PLAN_LIMITS_FILE))?;
        Self::from_json_strs(&brackets, &std_deduction, &plan_limits)
    }

    /// Loads from `dir` when given, otherwise falls back to the embedded tables.
    pub fn load(dir: Option<&Path>) -> Result<Self, TableError> {
        match dir {
            Some(dir) => Self::load_dir(dir),
            None => Self::embedded(),
        }
    }

    pub fn from_json_strs(
        brackets: &str,
        std_deduction: &str,
        plan_limits: &str,
    ) -> Result<Self, TableError> {
        let raw_brackets: BTreeMap<String, FilingBrackets> = parse_json(BRACKETS_FILE, brackets)?;
        let raw_deductions: BTreeMap<String, f64> = parse_json(STD_DEDUCTION_FILE, std_deduction)?;
        let plan_limits: PlanLimits = parse_json(PLAN_LIMITS_FILE, plan_limits)?;

        let brackets = BracketTable {
            by_status: keyed_by_status(BRACKETS_FILE, raw_brackets)?,
        };
        let standard_deductions = StandardDeductions {
            by_status: keyed_by_status(STD_DEDUCTION_FILE, raw_deductions)?,
        };

        Ok(Self {
            brackets,
            standard_deductions,
            plan_limits,
        })
    }
}

fn read_file(path: &Path) -> Result<String, TableError> {
    fs::read_to_string(path).map_err(|source| TableError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_json<T: serde::de::DeserializeOwned>(name: &str, raw: &str) -> Result<T, TableError> {
    serde_json::from_str(raw).map_err(|source| TableError::Parse {
        name: name.to_string(),
        source,
    })
}

fn keyed_by_status<V>(
    name: &str,
    raw: BTreeMap<String, V>,
) -> Result<BTreeMap<FilingStatus, V>, TableError> {
    let mut out = BTreeMap::new();
    for (key, value) in raw {
        match FilingStatus::from_key(&key) {
            Some(status) => {
                out.insert(status, value);
            }
            None => warn!(table = name, key = %key, "ignoring unknown filing status"),
        }
    }
    if out.is_empty() {
        return Err(TableError::Empty {
            name: name.to_string(),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_tables_cover_both_filing_statuses() {
        let tables = TaxTables::embedded().expect("embedded tables parse");
        for status in [FilingStatus::Single, FilingStatus::MarriedFilingJointly] {
            let brackets = tables.brackets.for_status(status).expect("brackets present");
            assert_eq!(brackets.ordinary.len(), 7);
            assert!(brackets.ordinary.last().expect("top bracket").top.is_none());
            assert!(brackets.capgains.is_some());
            assert!(tables.standard_deductions.for_status(status) > 0.0);
        }
        assert!(tables.plan_limits.employee_deferral > 0.0);
    }

    #[test]
    fn table_keys_resolve_back_to_their_status() {
        for status in [FilingStatus::Single, FilingStatus::MarriedFilingJointly] {
            assert_eq!(FilingStatus::from_key(status.table_key()), Some(status));
        }
        let tables = TaxTables::embedded().expect("embedded tables parse");
        let keys: Vec<&str> = tables
            .brackets
            .by_status
            .keys()
            .map(|s| s.table_key())
            .collect();
        assert_eq!(keys, ["Single", "MFJ"]);
    }

    #[test]
    fn embedded_brackets_are_contiguous_from_zero() {
        let tables = TaxTables::embedded().expect("embedded tables parse");
        for brackets in tables.brackets.by_status.values() {
            assert_eq!(brackets.ordinary[0].bottom, 0.0);
            for pair in brackets.ordinary.windows(2) {
                assert_eq!(pair[0].top, Some(pair[1].bottom));
                assert!(pair[0].rate <= pair[1].rate);
            }
        }
    }

    #[test]
    fn unknown_filing_keys_are_skipped() {
        let tables = TaxTables::from_json_strs(
            r#"{"Single": {"ordinary": [{"bottom": 0, "top": null, "rate": 0.1}]}, "HOH": {}}"#,
            r#"{"Single": 100, "Widow": 5}"#,
            r#"{"employee_deferral": 1000}"#,
        )
        .expect("valid tables");
        assert_eq!(tables.brackets.by_status.len(), 1);
        assert_eq!(tables.standard_deductions.by_status.len(), 1);
        assert!(
            tables
                .brackets
                .for_status(FilingStatus::Single)
                .expect("single")
                .capgains
                .is_none()
        );
    }

    #[test]
    fn table_without_known_statuses_is_rejected() {
        let err = TaxTables::from_json_strs(
            r#"{"HOH": {}}"#,
            r#"{"Single": 100}"#,
            r#"{"employee_deferral": 1000}"#,
        )
        .expect_err("must reject");
        assert!(matches!(err, TableError::Empty { .. }));
    }

    #[test]
    fn malformed_json_reports_the_file() {
        let err = TaxTables::from_json_strs("{", "{}", "{}").expect_err("must reject");
        assert!(err.to_string().contains(BRACKETS_FILE));
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let err = TaxTables::load_dir(Path::new("/definitely/not/here")).expect_err("must fail");
        assert!(matches!(err, TableError::Io { .. }));
    }
}
