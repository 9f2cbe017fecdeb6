use super::tables::TaxTables;
use super::types::{FilingStatus, MatchPolicy, ScenarioInput};

/// $95k single filer saving $10k a year under the default match.
pub(crate) fn sample_scenario() -> ScenarioInput {
    let tables = TaxTables::embedded().expect("embedded tables");
    let policy_text = "100% up to 3%; 50% of next 2%".to_string();
    ScenarioInput {
        filing_status: FilingStatus::Single,
        age: 35,
        years_to_retirement: 25,
        wages: 95_000.0,
        other_ordinary_income: 0.0,
        qualified_dividends: 0.0,
        long_term_capital_gains: 0.0,
        annual_savings_budget: 10_000.0,
        match_policy: MatchPolicy::parse(&policy_text),
        employer_match_policy: policy_text,
        nominal_return_rate: 0.07,
        dividend_yield: 0.0,
        retirement_ordinary_tax_rate: 0.15,
        retirement_cap_gains_tax_rate: 0.15,
        employee_deferral_limit: 23_000.0,
        standard_deductions: tables.standard_deductions,
        brackets: tables.brackets,
    }
}
