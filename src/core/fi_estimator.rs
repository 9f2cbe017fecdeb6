use serde::Serialize;

use super::normalize::{currency, finite_or_zero};

pub const MIN_HORIZON_MONTHS: u32 = 12;
pub const MAX_HORIZON_MONTHS: u32 = 70 * 12;
pub const DEFAULT_HORIZON_YEARS: f64 = 50.0;
pub const DEFAULT_WITHDRAWAL_PCT: f64 = 4.0;
pub const FI_CSV_HEADER: &str = "Year,End Balance,Total Contributions";
pub const FI_CSV_FILE_NAME: &str = "early-retirement-estimator.csv";

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReturnBasis {
    #[default]
    Nominal,
    /// Nominal return deflated by inflation.
    Real,
}

impl ReturnBasis {
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()) {
            Some(s) if s == "real" => ReturnBasis::Real,
            _ => ReturnBasis::Nominal,
        }
    }
}

/// Accumulation plan. Rates are annual fractions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FiInputs {
    pub start_balance: f64,
    pub monthly_contribution: f64,
    /// Added to the monthly contribution from `bump_year` on.
    pub contribution_bump: f64,
    pub bump_year: f64,
    pub annual_return: f64,
    pub inflation: f64,
    pub basis: ReturnBasis,
    pub annual_spending: f64,
    pub withdrawal_rate: f64,
    pub horizon_months: u32,
    pub current_age: Option<f64>,
    /// Extra monthly saving for the side-by-side run; 0 disables it.
    pub comparison_extra: f64,
}

/// Form values as entered; rates are percentages.
#[derive(Debug, Clone, Default)]
pub struct RawFi {
    pub start_balance: Option<f64>,
    pub monthly_contribution: Option<f64>,
    pub contribution_bump: Option<f64>,
    pub bump_year: Option<f64>,
    pub return_pct: Option<f64>,
    pub inflation_pct: Option<f64>,
    pub basis: Option<String>,
    pub annual_spending: Option<f64>,
    pub withdrawal_pct: Option<f64>,
    pub horizon_years: Option<f64>,
    pub current_age: Option<f64>,
    pub comparison_extra: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FiYear {
    pub year: u32,
    pub end_balance: f64,
    pub total_contributions: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FiProjection {
    pub monthly_contribution: f64,
    pub fi_month: Option<u32>,
    pub half_fi_month: Option<u32>,
    /// First month from which growth alone reaches FI by the horizon.
    pub coast_month: Option<u32>,
    pub years_to_fi: Option<f64>,
    pub age_at_fi: Option<f64>,
    pub yearly: Vec<FiYear>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FiEstimate {
    pub fi_number: f64,
    pub monthly_return: f64,
    pub horizon_months: u32,
    pub base: FiProjection,
    pub comparison: Option<FiProjection>,
    /// Months the comparison run reaches FI ahead of the base run.
    pub months_saved: Option<u32>,
}

pub fn normalize_fi(raw: &RawFi) -> FiInputs {
    let withdrawal_pct = finite_or_zero(raw.withdrawal_pct);
    let withdrawal_pct = if withdrawal_pct > 0.0 {
        withdrawal_pct.min(100.0)
    } else {
        DEFAULT_WITHDRAWAL_PCT
    };
    let horizon_years = finite_or_zero(raw.horizon_years);
    let horizon_years = if horizon_years > 0.0 {
        horizon_years
    } else {
        DEFAULT_HORIZON_YEARS
    };
    let horizon_months = (horizon_years * 12.0)
        .floor()
        .clamp(f64::from(MIN_HORIZON_MONTHS), f64::from(MAX_HORIZON_MONTHS))
        as u32;

    FiInputs {
        start_balance: currency(raw.start_balance),
        monthly_contribution: currency(raw.monthly_contribution),
        contribution_bump: currency(raw.contribution_bump),
        bump_year: finite_or_zero(raw.bump_year).clamp(0.0, 70.0),
        annual_return: (finite_or_zero(raw.return_pct) / 100.0).clamp(-0.5, 1.0),
        inflation: (finite_or_zero(raw.inflation_pct) / 100.0).clamp(-0.5, 1.0),
        basis: ReturnBasis::parse_lenient(raw.basis.as_deref()),
        annual_spending: currency(raw.annual_spending),
        withdrawal_rate: withdrawal_pct / 100.0,
        horizon_months,
        current_age: raw
            .current_age
            .filter(|a| a.is_finite() && *a > 0.0)
            .map(|a| a.min(120.0)),
        comparison_extra: currency(raw.comparison_extra),
    }
}

/// Monthly rate that compounds to `annual` over twelve months.
pub fn monthly_rate(annual: f64) -> f64 {
    (1.0 + annual).powf(1.0 / 12.0) - 1.0
}

fn effective_monthly_rate(inputs: &FiInputs) -> f64 {
    let nominal = monthly_rate(inputs.annual_return);
    match inputs.basis {
        ReturnBasis::Nominal => nominal,
        ReturnBasis::Real => (1.0 + nominal) / (1.0 + monthly_rate(inputs.inflation)) - 1.0,
    }
}

fn first_month_at(balances: &[f64], target: f64) -> Option<u32> {
    balances
        .iter()
        .position(|b| *b >= target)
        .map(|m| m as u32)
}

fn simulate(inputs: &FiInputs, monthly_contribution: f64, rate: f64, fi_number: f64) -> FiProjection {
    let months = inputs.horizon_months as usize;
    let bump_month = (inputs.bump_year * 12.0).floor() as usize;

    let mut balances = Vec::with_capacity(months + 1);
    let mut contributed = Vec::with_capacity(months + 1);
    balances.push(inputs.start_balance);
    contributed.push(0.0);
    for m in 1..=months {
        let add = monthly_contribution
            + if m >= bump_month {
                inputs.contribution_bump
            } else {
                0.0
            };
        contributed.push(contributed[m - 1] + add);
        balances.push(balances[m - 1] * (1.0 + rate) + add);
    }

    let fi_month = first_month_at(&balances, fi_number);
    let half_fi_month = first_month_at(&balances, fi_number / 2.0);
    let coast_month = balances
        .iter()
        .enumerate()
        .position(|(m, b)| b * (1.0 + rate).powi((months - m) as i32) >= fi_number)
        .map(|m| m as u32);

    let years_to_fi = fi_month.map(|m| f64::from(m) / 12.0);
    let yearly = (1..=months.div_ceil(12))
        .map(|y| {
            let idx = (y * 12).min(months);
            FiYear {
                year: y as u32,
                end_balance: balances[idx],
                total_contributions: contributed[idx],
            }
        })
        .collect();

    FiProjection {
        monthly_contribution,
        fi_month,
        half_fi_month,
        coast_month,
        years_to_fi,
        age_at_fi: inputs
            .current_age
            .zip(years_to_fi)
            .map(|(age, years)| age + years),
        yearly,
    }
}

/// Month-by-month accumulation toward `spending / withdrawal_rate`.
pub fn estimate_fi(inputs: &FiInputs) -> FiEstimate {
    let rate = effective_monthly_rate(inputs);
    let fi_number = if inputs.withdrawal_rate > 0.0 {
        inputs.annual_spending / inputs.withdrawal_rate
    } else {
        inputs.annual_spending / (DEFAULT_WITHDRAWAL_PCT / 100.0)
    };

    let base = simulate(inputs, inputs.monthly_contribution, rate, fi_number);
    let comparison = (inputs.comparison_extra > 0.0).then(|| {
        simulate(
            inputs,
            inputs.monthly_contribution + inputs.comparison_extra,
            rate,
            fi_number,
        )
    });
    let months_saved = match (&comparison, base.fi_month) {
        (Some(c), Some(base_month)) => c.fi_month.map(|m| base_month.saturating_sub(m)),
        _ => None,
    };

    FiEstimate {
        fi_number,
        monthly_return: rate,
        horizon_months: inputs.horizon_months,
        base,
        comparison,
        months_saved,
    }
}

/// Year-end rows of the base run, no trailing newline.
pub fn fi_years_to_csv(years: &[FiYear]) -> String {
    let mut out = String::from(FI_CSV_HEADER);
    for y in years {
        out.push_str(&format!(
            "\n{},{},{}",
            y.year, y.end_balance, y.total_contributions
        ));
    }
    out
}
