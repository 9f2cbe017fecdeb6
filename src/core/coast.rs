use serde::Serialize;

use super::normalize::{currency, finite_or_zero};

pub const MAX_AGE: u32 = 120;
pub const MAX_PROGRESS_PCT: f64 = 999.0;

/// CoastFI inputs. Rates are fractions.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoastInputs {
    pub current_age: u32,
    pub retirement_age: u32,
    pub current_portfolio: f64,
    pub retirement_spending: f64,
    pub passive_income: f64,
    pub real_return_rate: f64,
    pub safe_withdrawal_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoastResult {
    pub years: u32,
    pub needed_from_portfolio: f64,
    /// `None` when the withdrawal rate is zero and no portfolio is ever enough.
    pub required_at_retirement: Option<f64>,
    pub required_today: Option<f64>,
    pub progress_pct: f64,
    pub portfolio_at_retirement: f64,
    pub reached: bool,
    /// Portfolio value at the start of each year with no new contributions.
    pub growth_path: Vec<f64>,
}

/// CoastFI form values as entered; rates are percentages.
#[derive(Debug, Clone, Default)]
pub struct RawCoast {
    pub current_age: Option<f64>,
    pub retirement_age: Option<f64>,
    pub current_portfolio: Option<f64>,
    pub retirement_spending: Option<f64>,
    pub passive_income: Option<f64>,
    pub real_return_pct: Option<f64>,
    pub safe_withdrawal_pct: Option<f64>,
}

pub fn normalize_coast(raw: &RawCoast) -> CoastInputs {
    let age = |v: Option<f64>| finite_or_zero(v).round().clamp(0.0, f64::from(MAX_AGE)) as u32;
    CoastInputs {
        current_age: age(raw.current_age),
        retirement_age: age(raw.retirement_age),
        current_portfolio: currency(raw.current_portfolio),
        retirement_spending: currency(raw.retirement_spending),
        passive_income: currency(raw.passive_income),
        real_return_rate: (finite_or_zero(raw.real_return_pct) / 100.0).clamp(-0.5, 1.0),
        safe_withdrawal_rate: (finite_or_zero(raw.safe_withdrawal_pct) / 100.0).clamp(0.0, 1.0),
    }
}

/// Portfolio needed today so that growth alone covers retirement spending.
pub fn compute_coast(inputs: &CoastInputs) -> CoastResult {
    let years = inputs.retirement_age.saturating_sub(inputs.current_age);
    let r = inputs.real_return_rate;
    let current = inputs.current_portfolio.max(0.0);

    let needed_from_portfolio = (inputs.retirement_spending - inputs.passive_income).max(0.0);
    let growth = (1.0 + r).powi(years as i32);

    let required_at_retirement = if inputs.safe_withdrawal_rate > 0.0 {
        Some(needed_from_portfolio / inputs.safe_withdrawal_rate)
    } else {
        None
    };
    let required_today = required_at_retirement.map(|req| if growth > 0.0 { req / growth } else { req });

    let (progress_pct, reached) = match required_today {
        Some(req) if req <= 0.0 => (100.0, true),
        Some(req) => (
            (current / req * 100.0).clamp(0.0, MAX_PROGRESS_PCT),
            current >= req,
        ),
        None => (0.0, false),
    };

    let growth_path = (0..=years)
        .map(|year| current * (1.0 + r).powi(year as i32))
        .collect();

    CoastResult {
        years,
        needed_from_portfolio,
        required_at_retirement,
        required_today,
        progress_pct,
        portfolio_at_retirement: current * growth,
        reached,
        growth_path,
    }
}
