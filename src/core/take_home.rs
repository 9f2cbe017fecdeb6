use serde::Serialize;

use super::normalize::{MAX_CURRENCY, currency, finite_or_zero};
use super::tables::TaxTables;
use super::tax::ordinary_tax;
use super::types::FilingStatus;

/// 2025 Social Security wage base.
pub const SOCIAL_SECURITY_WAGE_BASE: f64 = 176_100.0;
pub const SOCIAL_SECURITY_RATE: f64 = 0.062;
pub const MEDICARE_RATE: f64 = 0.0145;
pub const MAX_INCOME_STREAMS: usize = 8;

/// One earner's paycheck. `traditional_401k_rate` is a fraction of gross.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IncomeStream {
    pub gross: f64,
    pub traditional_401k_rate: f64,
    pub hsa: f64,
}

#[derive(Debug, Clone, Default)]
pub struct TakeHomeInputs {
    pub filing_status: FilingStatus,
    pub streams: Vec<IncomeStream>,
    /// Household health premiums per year, deducted before tax.
    pub health_premiums: f64,
    /// Flat state rate applied to gross less pre-tax items.
    pub state_rate: f64,
}

/// Form values as entered; the 401k and state rates are percentages.
#[derive(Debug, Clone, Default)]
pub struct RawIncomeStream {
    pub gross: Option<f64>,
    pub traditional_401k_pct: Option<f64>,
    pub hsa: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct RawTakeHome {
    pub filing_status: Option<String>,
    pub streams: Vec<RawIncomeStream>,
    pub health_premiums: Option<f64>,
    pub state_rate_pct: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayPeriods {
    pub annual: f64,
    pub monthly: f64,
    pub biweekly: f64,
    pub weekly: f64,
}

impl PayPeriods {
    pub fn from_annual(annual: f64) -> Self {
        Self {
            annual,
            monthly: annual / 12.0,
            biweekly: annual / 26.0,
            weekly: annual / 52.0,
        }
    }
}

/// Per-earner view. Household income tax and premiums are split by share of gross.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamBreakdown {
    pub gross: f64,
    pub traditional_401k: f64,
    pub hsa: f64,
    pub pre_tax: f64,
    pub fica: f64,
    pub federal_share: f64,
    pub state_share: f64,
    pub health_share: f64,
    pub net: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TakeHomeResult {
    pub filing_status: FilingStatus,
    pub streams: Vec<StreamBreakdown>,
    pub gross: f64,
    pub pre_tax: f64,
    pub health_premiums: f64,
    pub standard_deduction: f64,
    pub federal_taxable: f64,
    pub federal_tax: f64,
    pub state_rate: f64,
    pub state_tax_base: f64,
    pub state_tax: f64,
    pub fica: f64,
    pub take_home: f64,
    pub take_home_per_period: PayPeriods,
}

pub fn normalize_take_home(raw: &RawTakeHome) -> TakeHomeInputs {
    let streams = raw
        .streams
        .iter()
        .take(MAX_INCOME_STREAMS)
        .map(|s| IncomeStream {
            gross: currency(s.gross),
            traditional_401k_rate: (finite_or_zero(s.traditional_401k_pct) / 100.0).clamp(0.0, 1.0),
            hsa: currency(s.hsa),
        })
        .collect();
    TakeHomeInputs {
        filing_status: FilingStatus::parse_lenient(raw.filing_status.as_deref()),
        streams,
        health_premiums: currency(raw.health_premiums),
        state_rate: (finite_or_zero(raw.state_rate_pct) / 100.0).clamp(0.0, 1.0),
    }
}

/// Social Security up to the wage base plus uncapped Medicare. HSA payroll
/// deductions escape FICA; 401k deferrals do not.
pub fn fica_tax(gross: f64, hsa: f64) -> f64 {
    let wages = (gross - hsa).clamp(0.0, MAX_CURRENCY);
    wages.min(SOCIAL_SECURITY_WAGE_BASE) * SOCIAL_SECURITY_RATE + wages * MEDICARE_RATE
}

pub fn compute_take_home(inputs: &TakeHomeInputs, tables: &TaxTables) -> TakeHomeResult {
    let status = inputs.filing_status;
    let per_stream: Vec<(IncomeStream, f64, f64)> = inputs
        .streams
        .iter()
        .map(|s| {
            let traditional = s.gross * s.traditional_401k_rate;
            (*s, traditional, fica_tax(s.gross, s.hsa))
        })
        .collect();

    let gross: f64 = per_stream.iter().map(|(s, _, _)| s.gross).sum();
    let pre_tax: f64 = per_stream.iter().map(|(s, k, _)| k + s.hsa).sum();
    let fica: f64 = per_stream.iter().map(|(_, _, f)| f).sum();
    let health = inputs.health_premiums;

    let adjusted = (gross - pre_tax - health).max(0.0);
    let standard_deduction = tables.standard_deductions.for_status(status);
    let federal_taxable = (adjusted - standard_deduction).max(0.0);
    let federal_tax = ordinary_tax(federal_taxable, tables.brackets.for_status(status));

    let state_tax_base = adjusted;
    let state_tax = state_tax_base * inputs.state_rate;

    let take_home = (gross - pre_tax - health - federal_tax - state_tax - fica).max(0.0);

    let streams = per_stream
        .iter()
        .map(|(s, traditional, stream_fica)| {
            let share = if gross > 0.0 { s.gross / gross } else { 0.0 };
            let federal_share = federal_tax * share;
            let state_share = state_tax * share;
            let health_share = health * share;
            let stream_pre_tax = traditional + s.hsa;
            StreamBreakdown {
                gross: s.gross,
                traditional_401k: *traditional,
                hsa: s.hsa,
                pre_tax: stream_pre_tax,
                fica: *stream_fica,
                federal_share,
                state_share,
                health_share,
                net: s.gross - stream_pre_tax - stream_fica - federal_share - state_share - health_share,
            }
        })
        .collect();

    TakeHomeResult {
        filing_status: status,
        streams,
        gross,
        pre_tax,
        health_premiums: health,
        standard_deduction,
        federal_taxable,
        federal_tax,
        state_rate: inputs.state_rate,
        state_tax_base,
        state_tax,
        fica,
        take_home,
        take_home_per_period: PayPeriods::from_annual(take_home),
    }
}
