use super::tax::current_year_tax;
use super::types::{Contributions, Projection, ScenarioInput};

/// Share of the dividend yield lost to tax each year in a taxable account.
/// A flat approximation, not bracket-aware.
pub const DIVIDEND_DRAG_TAX_RATE: f64 = 0.15;

fn compound(amount: f64, rate: f64, years: u32) -> f64 {
    amount * (1.0 + rate).powi(years as i32)
}

/// Grows one year's contributions to retirement and applies each bucket's
/// retirement-time tax treatment.
pub fn project(scenario: &ScenarioInput, contributions: &Contributions) -> Projection {
    let tax_now = current_year_tax(scenario, contributions.traditional);

    let years = scenario.years_to_retirement;
    let rate = scenario.nominal_return_rate;

    let traditional_now = contributions.traditional + contributions.employer_match;
    let traditional_fv = compound(traditional_now, rate, years);
    let traditional_after_tax = traditional_fv * (1.0 - scenario.retirement_ordinary_tax_rate);

    let roth_after_tax = compound(contributions.roth, rate, years);

    let brokerage_rate = rate - scenario.dividend_yield * DIVIDEND_DRAG_TAX_RATE;
    let brokerage_fv = compound(contributions.brokerage, brokerage_rate, years);
    let gains = (brokerage_fv - contributions.brokerage).max(0.0);
    let brokerage_after_tax =
        contributions.brokerage + gains * (1.0 - scenario.retirement_cap_gains_tax_rate);

    Projection {
        current_year_tax: tax_now,
        traditional_after_tax,
        roth_after_tax,
        brokerage_after_tax,
        total_after_tax: traditional_after_tax + roth_after_tax + brokerage_after_tax,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::sample_scenario;
    use proptest::prelude::{prop_assert, proptest};

    fn assert_approx_tol(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    #[test]
    fn zero_contributions_project_to_zero() {
        let scenario = sample_scenario();
        let p = project(&scenario, &Contributions::default());
        assert_eq!(p.total_after_tax, 0.0);
        assert!(p.current_year_tax.total > 0.0);
    }

    #[test]
    fn traditional_is_taxed_on_the_whole_withdrawal() {
        let scenario = sample_scenario();
        let p = project(
            &scenario,
            &Contributions {
                traditional: 1_000.0,
                employer_match: 500.0,
                ..Contributions::default()
            },
        );
        let fv = 1_500.0 * 1.07_f64.powi(25);
        assert_approx_tol(p.traditional_after_tax, fv * 0.85, 1e-6);
        assert_approx_tol(p.total_after_tax, p.traditional_after_tax, 1e-9);
    }

    #[test]
    fn roth_grows_tax_free() {
        let scenario = sample_scenario();
        let p = project(
            &scenario,
            &Contributions {
                roth: 1_000.0,
                ..Contributions::default()
            },
        );
        assert_approx_tol(p.roth_after_tax, 1_000.0 * 1.07_f64.powi(25), 1e-6);
    }

    #[test]
    fn brokerage_pays_drag_and_tax_on_gains_only() {
        let mut scenario = sample_scenario();
        scenario.dividend_yield = 0.02;
        let p = project(
            &scenario,
            &Contributions {
                brokerage: 1_000.0,
                ..Contributions::default()
            },
        );
        let fv = 1_000.0 * (1.0 + 0.07 - 0.02 * 0.15_f64).powi(25);
        assert_approx_tol(p.brokerage_after_tax, 1_000.0 + (fv - 1_000.0) * 0.85, 1e-6);
    }

    #[test]
    fn brokerage_losses_return_the_market_value() {
        let mut scenario = sample_scenario();
        scenario.nominal_return_rate = -0.10;
        let p = project(
            &scenario,
            &Contributions {
                brokerage: 1_000.0,
                ..Contributions::default()
            },
        );
        // No gain, so nothing is taxed and the basis is returned in full.
        assert_approx_tol(p.brokerage_after_tax, 1_000.0, 1e-9);
    }

    #[test]
    fn zero_years_returns_contributions_less_traditional_haircut() {
        let mut scenario = sample_scenario();
        scenario.years_to_retirement = 0;
        let p = project(
            &scenario,
            &Contributions {
                traditional: 100.0,
                roth: 100.0,
                brokerage: 100.0,
                employer_match: 0.0,
            },
        );
        assert_approx_tol(p.total_after_tax, 85.0 + 100.0 + 100.0, 1e-9);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(48))]

        #[test]
        fn prop_roth_beats_traditional_at_equal_rates(
            amount in 1u32..50_000,
            years in 1u32..50,
            rate_bp in 0u32..1_200
        ) {
            let mut scenario = sample_scenario();
            scenario.years_to_retirement = years;
            scenario.nominal_return_rate = rate_bp as f64 / 10_000.0;
            let amount = amount as f64;
            let trad = project(&scenario, &Contributions { traditional: amount, ..Contributions::default() });
            let roth = project(&scenario, &Contributions { roth: amount, ..Contributions::default() });
            prop_assert!(roth.total_after_tax > trad.total_after_tax);
        }
    }
}
