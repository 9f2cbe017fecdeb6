use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum FilingStatus {
    #[default]
    Single,
    #[serde(rename = "MFJ", alias = "MarriedFilingJointly", alias = "married-filing-jointly")]
    MarriedFilingJointly,
}

impl FilingStatus {
    /// Key used by the tax data tables.
    pub fn table_key(self) -> &'static str {
        match self {
            FilingStatus::Single => "Single",
            FilingStatus::MarriedFilingJointly => "MFJ",
        }
    }

    /// Accepts the table keys plus a few spellings seen in form posts.
    pub fn from_key(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "single" | "s" => Some(FilingStatus::Single),
            "mfj" | "marriedfilingjointly" | "married-filing-jointly" | "married_filing_jointly"
            | "married" | "joint" => Some(FilingStatus::MarriedFilingJointly),
            _ => None,
        }
    }

    /// Unknown or missing values fall back to `Single`.
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        raw.and_then(Self::from_key).unwrap_or_default()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrdinaryBracket {
    pub bottom: f64,
    /// `None` marks the open-ended top bracket.
    pub top: Option<f64>,
    pub rate: f64,
}

impl OrdinaryBracket {
    pub fn upper(&self) -> f64 {
        self.top.unwrap_or(f64::INFINITY)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapitalGainsBands {
    pub zero_top: f64,
    pub fifteen_top: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FilingBrackets {
    #[serde(default)]
    pub ordinary: Vec<OrdinaryBracket>,
    #[serde(default)]
    pub capgains: Option<CapitalGainsBands>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BracketTable {
    pub by_status: BTreeMap<FilingStatus, FilingBrackets>,
}

impl BracketTable {
    pub fn for_status(&self, status: FilingStatus) -> Option<&FilingBrackets> {
        self.by_status.get(&status)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StandardDeductions {
    pub by_status: BTreeMap<FilingStatus, f64>,
}

impl StandardDeductions {
    /// Missing entries deduct nothing.
    pub fn for_status(&self, status: FilingStatus) -> f64 {
        self.by_status
            .get(&status)
            .copied()
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
            .max(0.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanLimits {
    pub employee_deferral: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catch_up_50: Option<f64>,
}

/// Two-tier employer match, all values as fractions (1.0 = 100%).
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchPolicy {
    pub tier1_rate: f64,
    pub tier1_cap: f64,
    pub tier2_rate: f64,
    pub tier2_cap: f64,
}

/// Normalized parameters for one optimization run.
#[derive(Debug, Clone)]
pub struct ScenarioInput {
    pub filing_status: FilingStatus,
    pub age: u32,
    pub years_to_retirement: u32,
    pub wages: f64,
    pub other_ordinary_income: f64,
    pub qualified_dividends: f64,
    pub long_term_capital_gains: f64,
    pub annual_savings_budget: f64,
    pub employer_match_policy: String,
    pub match_policy: MatchPolicy,
    pub nominal_return_rate: f64,
    pub dividend_yield: f64,
    pub retirement_ordinary_tax_rate: f64,
    pub retirement_cap_gains_tax_rate: f64,
    pub employee_deferral_limit: f64,
    pub standard_deductions: StandardDeductions,
    pub brackets: BracketTable,
}

impl ScenarioInput {
    pub fn max_deferral(&self) -> f64 {
        self.annual_savings_budget.min(self.employee_deferral_limit).max(0.0)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentYearTax {
    pub adjusted_gross_income: f64,
    pub taxable_ordinary_income: f64,
    pub ordinary_tax: f64,
    pub capital_gains_tax: f64,
    pub total: f64,
}

/// Dollars going into each bucket this year.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Contributions {
    pub traditional: f64,
    pub roth: f64,
    pub brokerage: f64,
    pub employer_match: f64,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Projection {
    pub current_year_tax: CurrentYearTax,
    pub traditional_after_tax: f64,
    pub roth_after_tax: f64,
    pub brokerage_after_tax: f64,
    pub total_after_tax: f64,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationCandidate {
    pub employee_deferral_total: f64,
    pub traditional_portion: f64,
    pub roth_portion: f64,
    pub brokerage_portion: f64,
    pub employer_match: f64,
    pub after_tax_future_value: f64,
    pub current_year_tax: f64,
}

#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub best: AllocationCandidate,
    pub all_brokerage: AllocationCandidate,
    pub all_traditional: AllocationCandidate,
    pub all_roth: AllocationCandidate,
    /// Every evaluated candidate, best first.
    pub candidates: Vec<AllocationCandidate>,
}
