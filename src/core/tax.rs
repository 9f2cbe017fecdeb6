use super::types::{CapitalGainsBands, CurrentYearTax, FilingBrackets, ScenarioInput};

const CAP_GAINS_MID_RATE: f64 = 0.15;
const CAP_GAINS_TOP_RATE: f64 = 0.20;

fn non_negative(x: f64) -> f64 {
    if x.is_finite() { x.max(0.0) } else { 0.0 }
}

/// Progressive tax on ordinary taxable income. Absent tables tax nothing.
pub fn ordinary_tax(taxable: f64, brackets: Option<&FilingBrackets>) -> f64 {
    let Some(brackets) = brackets else {
        return 0.0;
    };
    let taxable = non_negative(taxable);

    let mut tax = 0.0;
    for bracket in &brackets.ordinary {
        if taxable <= bracket.bottom {
            break;
        }
        let in_band = (taxable.min(bracket.upper()) - bracket.bottom).max(0.0);
        tax += in_band * bracket.rate.max(0.0);
    }
    tax
}

/// Qualified dividends and long-term gains stacked on top of ordinary
/// taxable income across the 0/15/20% bands.
pub fn capital_gains_tax(
    taxable_ordinary: f64,
    gains: f64,
    bands: Option<&CapitalGainsBands>,
) -> f64 {
    let gains = non_negative(gains);
    let Some(bands) = bands else {
        return 0.0;
    };
    if gains <= 0.0 {
        return 0.0;
    }
    let ordinary = non_negative(taxable_ordinary);

    let room_at_zero = (bands.zero_top - ordinary).max(0.0);
    let at_zero = gains.min(room_at_zero);
    let mut remaining = gains - at_zero;
    if remaining <= 0.0 {
        return 0.0;
    }

    let room_at_mid = (bands.fifteen_top - (ordinary + at_zero)).max(0.0);
    let at_mid = remaining.min(room_at_mid);
    remaining -= at_mid;

    at_mid * CAP_GAINS_MID_RATE + remaining.max(0.0) * CAP_GAINS_TOP_RATE
}

/// Tax owed this year given the pre-tax (traditional) employee deferral.
pub fn current_year_tax(scenario: &ScenarioInput, pre_tax_deferral: f64) -> CurrentYearTax {
    let wages_after_deferral = (non_negative(scenario.wages) - non_negative(pre_tax_deferral)).max(0.0);
    let ordinary_income = wages_after_deferral + non_negative(scenario.other_ordinary_income);
    let gains =
        non_negative(scenario.qualified_dividends) + non_negative(scenario.long_term_capital_gains);

    let deduction = scenario.standard_deductions.for_status(scenario.filing_status);
    let taxable_ordinary_income = (ordinary_income - deduction).max(0.0);

    let brackets = scenario.brackets.for_status(scenario.filing_status);
    let ordinary = ordinary_tax(taxable_ordinary_income, brackets);
    let cap_gains = capital_gains_tax(
        taxable_ordinary_income,
        gains,
        brackets.and_then(|b| b.capgains.as_ref()),
    );

    CurrentYearTax {
        adjusted_gross_income: ordinary_income + gains,
        taxable_ordinary_income,
        ordinary_tax: ordinary,
        capital_gains_tax: cap_gains,
        total: ordinary + cap_gains,
    }
}
