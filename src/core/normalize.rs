use serde::Serialize;

use super::tables::TaxTables;
use super::types::{FilingStatus, MatchPolicy, ScenarioInput};

pub const MIN_AGE: u32 = 18;
pub const MAX_AGE: u32 = 100;
pub const MAX_YEARS_TO_RETIREMENT: u32 = 70;
pub const MIN_NOMINAL_RETURN: f64 = -0.5;
pub const MAX_RATE: f64 = 1.0;
/// Ceiling for any dollar amount; keeps compounding far from overflow.
pub const MAX_CURRENCY: f64 = 1e12;

/// Form values as entered. Rates are percentages (7 means 7%); `None`
/// stands for a missing or unparsable field.
#[derive(Debug, Clone, Default)]
pub struct RawScenario {
    pub filing_status: Option<String>,
    pub age: Option<f64>,
    pub wages: Option<f64>,
    pub other_ordinary_income: Option<f64>,
    pub qualified_dividends: Option<f64>,
    pub long_term_capital_gains: Option<f64>,
    pub match_policy: Option<String>,
    /// Explicit tier percentages; when any is given they override the text.
    pub match_tiers: [Option<f64>; 4],
    pub savings_budget: Option<f64>,
    pub nominal_return_pct: Option<f64>,
    pub dividend_yield_pct: Option<f64>,
    pub years_to_retirement: Option<f64>,
    pub retirement_ordinary_rate_pct: Option<f64>,
    pub retirement_cap_gains_rate_pct: Option<f64>,
    pub deferral_limit: Option<f64>,
}

/// Echo of the normalized inputs for API responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioSummary {
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
    pub standard_deduction: f64,
}

impl From<&ScenarioInput> for ScenarioSummary {
    fn from(s: &ScenarioInput) -> Self {
        Self {
            filing_status: s.filing_status,
            age: s.age,
            years_to_retirement: s.years_to_retirement,
            wages: s.wages,
            other_ordinary_income: s.other_ordinary_income,
            qualified_dividends: s.qualified_dividends,
            long_term_capital_gains: s.long_term_capital_gains,
            annual_savings_budget: s.annual_savings_budget,
            employer_match_policy: s.employer_match_policy.clone(),
            match_policy: s.match_policy,
            nominal_return_rate: s.nominal_return_rate,
            dividend_yield: s.dividend_yield,
            retirement_ordinary_tax_rate: s.retirement_ordinary_tax_rate,
            retirement_cap_gains_tax_rate: s.retirement_cap_gains_tax_rate,
            employee_deferral_limit: s.employee_deferral_limit,
            standard_deduction: s.standard_deductions.for_status(s.filing_status),
        }
    }
}

pub(crate) fn finite_or_zero(v: Option<f64>) -> f64 {
    v.filter(|x| x.is_finite()).unwrap_or(0.0)
}

pub(crate) fn currency(v: Option<f64>) -> f64 {
    finite_or_zero(v).clamp(0.0, MAX_CURRENCY)
}

fn rate_pct(v: Option<f64>, min: f64, max: f64) -> f64 {
    (finite_or_zero(v) / 100.0).clamp(min, max)
}

fn whole(v: Option<f64>, min: u32, max: u32) -> u32 {
    let v = finite_or_zero(v).round();
    v.clamp(f64::from(min), f64::from(max)) as u32
}

/// Turns raw form values into a bounded `ScenarioInput`. Never fails.
pub fn normalize_scenario(raw: &RawScenario, tables: &TaxTables) -> ScenarioInput {
    let employer_match_policy = raw.match_policy.clone().unwrap_or_default();
    let match_policy = if raw.match_tiers.iter().any(Option::is_some) {
        let defaults = MatchPolicy::default();
        let [r1, c1, r2, c2] = raw.match_tiers;
        let pct = |v: Option<f64>, fallback: f64| v.unwrap_or(fallback * 100.0);
        MatchPolicy::from_percentages(
            pct(r1, defaults.tier1_rate),
            pct(c1, defaults.tier1_cap),
            pct(r2, defaults.tier2_rate),
            pct(c2, defaults.tier2_cap),
        )
    } else {
        MatchPolicy::parse(&employer_match_policy)
    };

    let employee_deferral_limit = match raw.deferral_limit.filter(|v| v.is_finite()) {
        Some(limit) => currency(Some(limit)),
        None => currency(Some(tables.plan_limits.employee_deferral)),
    };

    ScenarioInput {
        filing_status: FilingStatus::parse_lenient(raw.filing_status.as_deref()),
        age: whole(raw.age, MIN_AGE, MAX_AGE),
        years_to_retirement: whole(raw.years_to_retirement, 0, MAX_YEARS_TO_RETIREMENT),
        wages: currency(raw.wages),
        other_ordinary_income: currency(raw.other_ordinary_income),
        qualified_dividends: currency(raw.qualified_dividends),
        long_term_capital_gains: currency(raw.long_term_capital_gains),
        annual_savings_budget: currency(raw.savings_budget),
        employer_match_policy,
        match_policy,
        nominal_return_rate: rate_pct(raw.nominal_return_pct, MIN_NOMINAL_RETURN, MAX_RATE),
        dividend_yield: rate_pct(raw.dividend_yield_pct, 0.0, MAX_RATE),
        retirement_ordinary_tax_rate: rate_pct(raw.retirement_ordinary_rate_pct, 0.0, MAX_RATE),
        retirement_cap_gains_tax_rate: rate_pct(raw.retirement_cap_gains_rate_pct, 0.0, MAX_RATE),
        employee_deferral_limit,
        standard_deductions: tables.standard_deductions.clone(),
        brackets: tables.brackets.clone(),
    }
}

/// Lenient number parsing for form text: trims, drops `$`, `,`, `%` and
/// spaces. Returns `None` for anything that still isn't a finite number.
pub fn parse_number(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '%' | ' ' | '_'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{any, prop_assert, proptest};

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn tables() -> TaxTables {
        TaxTables::embedded().expect("embedded tables")
    }

    #[test]
    fn empty_form_normalizes_to_safe_defaults() {
        let s = normalize_scenario(&RawScenario::default(), &tables());
        assert_eq!(s.filing_status, FilingStatus::Single);
        assert_eq!(s.age, MIN_AGE);
        assert_eq!(s.years_to_retirement, 0);
        assert_approx(s.wages, 0.0);
        assert_approx(s.annual_savings_budget, 0.0);
        assert_approx(s.nominal_return_rate, 0.0);
        assert_eq!(s.match_policy, MatchPolicy::default());
        assert_approx(s.employee_deferral_limit, 23_500.0);
    }

    #[test]
    fn percentages_become_fractions() {
        let raw = RawScenario {
            nominal_return_pct: Some(7.0),
            dividend_yield_pct: Some(1.5),
            retirement_ordinary_rate_pct: Some(15.0),
            retirement_cap_gains_rate_pct: Some(20.0),
            ..RawScenario::default()
        };
        let s = normalize_scenario(&raw, &tables());
        assert_approx(s.nominal_return_rate, 0.07);
        assert_approx(s.dividend_yield, 0.015);
        assert_approx(s.retirement_ordinary_tax_rate, 0.15);
        assert_approx(s.retirement_cap_gains_tax_rate, 0.20);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let raw = RawScenario {
            filing_status: Some("head of household".to_string()),
            age: Some(3.0),
            years_to_retirement: Some(400.0),
            wages: Some(-10.0),
            nominal_return_pct: Some(-90.0),
            retirement_ordinary_rate_pct: Some(250.0),
            dividend_yield_pct: Some(-3.0),
            deferral_limit: Some(-5.0),
            ..RawScenario::default()
        };
        let s = normalize_scenario(&raw, &tables());
        assert_eq!(s.filing_status, FilingStatus::Single);
        assert_eq!(s.age, MIN_AGE);
        assert_eq!(s.years_to_retirement, MAX_YEARS_TO_RETIREMENT);
        assert_approx(s.wages, 0.0);
        assert_approx(s.nominal_return_rate, MIN_NOMINAL_RETURN);
        assert_approx(s.retirement_ordinary_tax_rate, 1.0);
        assert_approx(s.dividend_yield, 0.0);
        assert_approx(s.employee_deferral_limit, 0.0);
    }

    #[test]
    fn non_finite_values_become_zero() {
        let raw = RawScenario {
            wages: Some(f64::NAN),
            savings_budget: Some(f64::INFINITY),
            age: Some(f64::NEG_INFINITY),
            ..RawScenario::default()
        };
        let s = normalize_scenario(&raw, &tables());
        assert_approx(s.wages, 0.0);
        assert_approx(s.annual_savings_budget, 0.0);
        assert_eq!(s.age, MIN_AGE);
    }

    #[test]
    fn huge_amounts_are_capped_and_keep_every_candidate_finite() {
        let raw = RawScenario {
            wages: Some(1e308),
            savings_budget: Some(1e308),
            deferral_limit: Some(1e300),
            nominal_return_pct: Some(100.0),
            years_to_retirement: Some(70.0),
            retirement_ordinary_rate_pct: Some(100.0),
            ..RawScenario::default()
        };
        let s = normalize_scenario(&raw, &tables());
        assert_approx(s.wages, MAX_CURRENCY);
        assert_approx(s.annual_savings_budget, MAX_CURRENCY);
        assert_approx(s.employee_deferral_limit, MAX_CURRENCY);

        let result = crate::core::optimize(&s);
        assert!(
            result
                .candidates
                .iter()
                .all(|c| c.after_tax_future_value.is_finite())
        );
        assert!(
            result
                .candidates
                .iter()
                .all(|c| c.after_tax_future_value <= result.best.after_tax_future_value)
        );
    }

    #[test]
    fn explicit_tiers_override_text() {
        let raw = RawScenario {
            match_policy: Some("100% up to 3%; 50% of next 2%".to_string()),
            match_tiers: [Some(50.0), Some(6.0), None, Some(0.0)],
            ..RawScenario::default()
        };
        let s = normalize_scenario(&raw, &tables());
        assert_approx(s.match_policy.tier1_rate, 0.5);
        assert_approx(s.match_policy.tier1_cap, 0.06);
        assert_approx(s.match_policy.tier2_rate, 0.5);
        assert_approx(s.match_policy.tier2_cap, 0.0);
        assert_eq!(s.employer_match_policy, "100% up to 3%; 50% of next 2%");
    }

    #[test]
    fn married_filing_uses_its_deduction() {
        let raw = RawScenario {
            filing_status: Some("MFJ".to_string()),
            ..RawScenario::default()
        };
        let s = normalize_scenario(&raw, &tables());
        assert_eq!(s.filing_status, FilingStatus::MarriedFilingJointly);
        assert_approx(ScenarioSummary::from(&s).standard_deduction, 30_000.0);
    }

    #[test]
    fn parse_number_accepts_form_text() {
        assert_eq!(parse_number(" $95,000 "), Some(95_000.0));
        assert_eq!(parse_number("7%"), Some(7.0));
        assert_eq!(parse_number("-2.5"), Some(-2.5));
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number("inf"), None);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_normalized_fields_are_finite_and_bounded(
            age in any::<f64>(),
            wages in any::<f64>(),
            budget in any::<f64>(),
            r in any::<f64>(),
            y in any::<f64>(),
            years in any::<f64>()
        ) {
            let raw = RawScenario {
                age: Some(age),
                wages: Some(wages),
                savings_budget: Some(budget),
                nominal_return_pct: Some(r),
                dividend_yield_pct: Some(y),
                years_to_retirement: Some(years),
                ..RawScenario::default()
            };
            let s = normalize_scenario(&raw, &tables());
            prop_assert!((MIN_AGE..=MAX_AGE).contains(&s.age));
            prop_assert!(s.years_to_retirement <= MAX_YEARS_TO_RETIREMENT);
            prop_assert!(s.wages.is_finite() && s.wages >= 0.0);
            prop_assert!(s.annual_savings_budget.is_finite() && s.annual_savings_budget >= 0.0);
            prop_assert!((MIN_NOMINAL_RETURN..=MAX_RATE).contains(&s.nominal_return_rate));
            prop_assert!((0.0..=MAX_RATE).contains(&s.dividend_yield));
        }
    }
}
