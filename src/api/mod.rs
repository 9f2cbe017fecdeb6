use axum::{
    Router,
    extract::{
        Json, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize, de::IgnoredAny};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::core::{
    AllocationCandidate, CSV_FILE_NAME, CoastResult, DIVIDEND_DRAG_TAX_RATE, FI_CSV_FILE_NAME,
    FilingStatus, GridConfig, OptimizationResult, RawCoast, RawFi, RawIncomeStream, RawScenario,
    RawTakeHome, ScenarioSummary, TaxTables, candidates_to_csv, compute_coast, compute_take_home,
    estimate_fi, fi_years_to_csv, normalize_coast, normalize_fi, normalize_scenario,
    normalize_take_home, optimize_with_grid, parse_candidates_csv, parse_number,
};

const INDEX_HTML: &str = include_str!("../../web/index.html");
const COAST_HTML: &str = include_str!("../../web/coast.html");
const STYLES_CSS: &str = include_str!("../../web/styles.css");
const APP_JS: &str = include_str!("../../web/app.js");
const COAST_JS: &str = include_str!("../../web/coast.js");
const TAKE_HOME_HTML: &str = include_str!("../../web/take-home.html");
const TAKE_HOME_JS: &str = include_str!("../../web/take-home.js");
const EARLY_RETIREMENT_HTML: &str = include_str!("../../web/early-retirement.html");
const EARLY_RETIREMENT_JS: &str = include_str!("../../web/early-retirement.js");

const DEFAULT_TOP: usize = 10;
const MAX_TOP: usize = 500;
const DATA_DIR_ENV: &str = "FINPLAN_DATA_DIR";
const DEFAULT_COMPARISON_EXTRA: f64 = 200.0;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliFilingStatus {
    Single,
    Mfj,
}

impl From<CliFilingStatus> for FilingStatus {
    fn from(status: CliFilingStatus) -> Self {
        match status {
            CliFilingStatus::Single => FilingStatus::Single,
            CliFilingStatus::Mfj => FilingStatus::MarriedFilingJointly,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Summary,
    Json,
    Csv,
}

/// A form value as posted. Anything that is not a number, flag or text is
/// kept as `Other` and reads as missing.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum FieldValue {
    Number(f64),
    Flag(bool),
    Text(String),
    Other(IgnoredAny),
}

impl FieldValue {
    fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(v) => Some(*v).filter(|v| v.is_finite()),
            FieldValue::Text(s) => parse_number(s),
            FieldValue::Flag(_) | FieldValue::Other(_) => None,
        }
    }

    fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::Number(v) => Some(v.to_string()),
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Flag(_) | FieldValue::Other(_) => None,
        }
    }

    fn as_flag(&self) -> bool {
        match self {
            FieldValue::Flag(b) => *b,
            FieldValue::Number(v) => *v != 0.0,
            FieldValue::Text(s) => matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "true" | "on" | "yes" | "1"
            ),
            FieldValue::Other(_) => false,
        }
    }
}

fn num(v: &Option<FieldValue>) -> Option<f64> {
    v.as_ref().and_then(FieldValue::as_f64)
}

fn text(v: &Option<FieldValue>) -> Option<String> {
    v.as_ref().and_then(FieldValue::as_text)
}

fn flag(v: &Option<FieldValue>) -> bool {
    v.as_ref().is_some_and(FieldValue::as_flag)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct OptimizePayload {
    filing_status: Option<FieldValue>,
    age: Option<FieldValue>,
    wages: Option<FieldValue>,
    other_ord: Option<FieldValue>,
    qdiv: Option<FieldValue>,
    ltcg: Option<FieldValue>,
    match_policy: Option<FieldValue>,
    tier1_rate: Option<FieldValue>,
    tier1_cap: Option<FieldValue>,
    tier2_rate: Option<FieldValue>,
    tier2_cap: Option<FieldValue>,
    savings: Option<FieldValue>,
    r_nom: Option<FieldValue>,
    div_yield: Option<FieldValue>,
    years_to_ret: Option<FieldValue>,
    ret_ord_rate: Option<FieldValue>,
    #[serde(alias = "retCGRate")]
    ret_cg_rate: Option<FieldValue>,
    deferral_limit: Option<FieldValue>,
    top: Option<FieldValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CoastPayload {
    current_age: Option<FieldValue>,
    retire_age: Option<FieldValue>,
    current_portfolio: Option<FieldValue>,
    retire_spend: Option<FieldValue>,
    passive_income: Option<FieldValue>,
    #[serde(alias = "realReturn")]
    real_return_pct: Option<FieldValue>,
    #[serde(alias = "swr")]
    swr_pct: Option<FieldValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct StreamPayload {
    gross: Option<FieldValue>,
    #[serde(alias = "k401Pct")]
    k401: Option<FieldValue>,
    hsa: Option<FieldValue>,
}

/// `streams` as posted; a non-list reads as no streams.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StreamList {
    List(Vec<StreamPayload>),
    Other(IgnoredAny),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TakeHomePayload {
    #[serde(alias = "filing")]
    filing_status: Option<FieldValue>,
    #[serde(alias = "health")]
    health_premiums: Option<FieldValue>,
    #[serde(alias = "stateRate")]
    state_rate_pct: Option<FieldValue>,
    streams: Option<StreamList>,
    // Single-earner shorthand for query strings.
    gross: Option<FieldValue>,
    k401: Option<FieldValue>,
    hsa: Option<FieldValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct EarlyRetirementPayload {
    current_balance: Option<FieldValue>,
    contribution_monthly: Option<FieldValue>,
    contribution_bump: Option<FieldValue>,
    bump_year: Option<FieldValue>,
    return_pct: Option<FieldValue>,
    inflation_pct: Option<FieldValue>,
    use_real: Option<FieldValue>,
    annual_spend: Option<FieldValue>,
    withdrawal_rate: Option<FieldValue>,
    max_years: Option<FieldValue>,
    current_age: Option<FieldValue>,
    compare200: Option<FieldValue>,
    compare_extra: Option<FieldValue>,
}

#[derive(Parser, Debug)]
#[command(
    name = "finplan",
    about = "Split a yearly savings budget across Traditional 401k, Roth 401k and a brokerage account"
)]
struct Cli {
    #[arg(long, value_enum, default_value_t = CliFilingStatus::Single)]
    filing_status: CliFilingStatus,
    #[arg(long, default_value_t = 35)]
    age: u32,
    #[arg(long, help = "Annual W-2 wages")]
    wages: Option<f64>,
    #[arg(long, default_value_t = 0.0)]
    other_ordinary_income: f64,
    #[arg(long, default_value_t = 0.0)]
    qualified_dividends: f64,
    #[arg(long, default_value_t = 0.0)]
    long_term_capital_gains: f64,
    #[arg(
        long,
        default_value = "100% up to 3%; 50% of next 2%",
        help = "Employer match policy, e.g. \"100% up to 3%; 50% of next 2%\""
    )]
    match_policy: String,
    #[arg(long, help = "Total dollars available to save this year")]
    savings_budget: Option<f64>,
    #[arg(
        long,
        default_value_t = 7.0,
        help = "Expected nominal annual return in percent"
    )]
    nominal_return: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Brokerage dividend yield in percent"
    )]
    dividend_yield: f64,
    #[arg(long, default_value_t = 25)]
    years_to_retirement: u32,
    #[arg(
        long,
        default_value_t = 15.0,
        help = "Ordinary income tax rate in retirement in percent"
    )]
    retirement_ordinary_rate: f64,
    #[arg(
        long,
        default_value_t = 15.0,
        help = "Capital gains tax rate in retirement in percent"
    )]
    retirement_cap_gains_rate: f64,
    #[arg(
        long,
        help = "Employee deferral ceiling; defaults to the plan limits table"
    )]
    deferral_limit: Option<f64>,
    #[arg(
        long,
        default_value_t = 5,
        help = "Roth/Brokerage split step in percentage points"
    )]
    split_step: u32,
    #[arg(long, default_value_t = 500.0, help = "Smallest deferral step in dollars")]
    min_deferral_step: f64,
    #[arg(long, help = "Directory holding the tax table JSON files")]
    data_dir: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Summary)]
    format: OutputFormat,
    #[arg(long, default_value_t = DEFAULT_TOP, help = "Ranked candidates to print")]
    top: usize,
    #[arg(long, help = "Re-rank a previously exported CSV instead of optimizing")]
    import: Option<PathBuf>,
}

#[derive(Debug, Clone)]
struct CliRequest {
    raw: RawScenario,
    grid: GridConfig,
}

#[derive(Clone)]
struct AppState {
    tables: Arc<TaxTables>,
    last_result: Arc<RwLock<Option<Arc<OptimizationResult>>>>,
}

impl AppState {
    fn new(tables: TaxTables) -> Self {
        Self {
            tables: Arc::new(tables),
            last_result: Arc::new(RwLock::new(None)),
        }
    }

    fn store(&self, result: Arc<OptimizationResult>) {
        let mut slot = self.last_result.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(result);
    }

    fn last(&self) -> Option<Arc<OptimizationResult>> {
        self.last_result
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Comparisons {
    all_brokerage: AllocationCandidate,
    all_traditional: AllocationCandidate,
    all_roth: AllocationCandidate,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Assumptions {
    dividend_drag_tax_rate: f64,
    split_step_pct: u32,
    deferral_step: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OptimizeResponse {
    scenario: ScenarioSummary,
    best: AllocationCandidate,
    comparisons: Comparisons,
    top_candidates: Vec<AllocationCandidate>,
    candidate_count: usize,
    assumptions: Assumptions,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_raw_scenario(cli: &Cli) -> Result<CliRequest, String> {
    let Some(wages) = cli.wages else {
        return Err("--wages is required".to_string());
    };
    let Some(savings_budget) = cli.savings_budget else {
        return Err("--savings-budget is required".to_string());
    };

    for (name, value) in [
        ("--wages", wages),
        ("--savings-budget", savings_budget),
        ("--other-ordinary-income", cli.other_ordinary_income),
        ("--qualified-dividends", cli.qualified_dividends),
        ("--long-term-capital-gains", cli.long_term_capital_gains),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(format!("{name} must be >= 0"));
        }
    }

    if !(18..=100).contains(&cli.age) {
        return Err("--age must be between 18 and 100".to_string());
    }

    if cli.years_to_retirement > 70 {
        return Err("--years-to-retirement must be <= 70".to_string());
    }

    if !cli.nominal_return.is_finite() || !(-50.0..=100.0).contains(&cli.nominal_return) {
        return Err("--nominal-return must be between -50 and 100".to_string());
    }

    for (name, rate) in [
        ("--dividend-yield", cli.dividend_yield),
        ("--retirement-ordinary-rate", cli.retirement_ordinary_rate),
        ("--retirement-cap-gains-rate", cli.retirement_cap_gains_rate),
    ] {
        if !(0.0..=100.0).contains(&rate) {
            return Err(format!("{name} must be between 0 and 100"));
        }
    }

    if let Some(limit) = cli.deferral_limit {
        if !limit.is_finite() || limit < 0.0 {
            return Err("--deferral-limit must be >= 0".to_string());
        }
    }

    if !(1..=100).contains(&cli.split_step) {
        return Err("--split-step must be between 1 and 100".to_string());
    }

    if !cli.min_deferral_step.is_finite() || cli.min_deferral_step < 1.0 {
        return Err("--min-deferral-step must be >= 1".to_string());
    }

    let raw = RawScenario {
        filing_status: Some(FilingStatus::from(cli.filing_status).table_key().to_string()),
        age: Some(f64::from(cli.age)),
        wages: Some(wages),
        other_ordinary_income: Some(cli.other_ordinary_income),
        qualified_dividends: Some(cli.qualified_dividends),
        long_term_capital_gains: Some(cli.long_term_capital_gains),
        match_policy: Some(cli.match_policy.clone()),
        match_tiers: [None; 4],
        savings_budget: Some(savings_budget),
        nominal_return_pct: Some(cli.nominal_return),
        dividend_yield_pct: Some(cli.dividend_yield),
        years_to_retirement: Some(f64::from(cli.years_to_retirement)),
        retirement_ordinary_rate_pct: Some(cli.retirement_ordinary_rate),
        retirement_cap_gains_rate_pct: Some(cli.retirement_cap_gains_rate),
        deferral_limit: cli.deferral_limit,
    };
    let grid = GridConfig {
        split_step_pct: cli.split_step,
        min_deferral_step: cli.min_deferral_step,
        ..GridConfig::default()
    };

    Ok(CliRequest { raw, grid })
}

fn raw_scenario_from_payload(payload: &OptimizePayload) -> RawScenario {
    RawScenario {
        filing_status: text(&payload.filing_status),
        age: num(&payload.age),
        wages: num(&payload.wages),
        other_ordinary_income: num(&payload.other_ord),
        qualified_dividends: num(&payload.qdiv),
        long_term_capital_gains: num(&payload.ltcg),
        match_policy: text(&payload.match_policy),
        match_tiers: [
            num(&payload.tier1_rate),
            num(&payload.tier1_cap),
            num(&payload.tier2_rate),
            num(&payload.tier2_cap),
        ],
        savings_budget: num(&payload.savings),
        nominal_return_pct: num(&payload.r_nom),
        dividend_yield_pct: num(&payload.div_yield),
        years_to_retirement: num(&payload.years_to_ret),
        retirement_ordinary_rate_pct: num(&payload.ret_ord_rate),
        retirement_cap_gains_rate_pct: num(&payload.ret_cg_rate),
        deferral_limit: num(&payload.deferral_limit),
    }
}

fn raw_coast_from_payload(payload: &CoastPayload) -> RawCoast {
    RawCoast {
        current_age: num(&payload.current_age),
        retirement_age: num(&payload.retire_age),
        current_portfolio: num(&payload.current_portfolio),
        retirement_spending: num(&payload.retire_spend),
        passive_income: num(&payload.passive_income),
        real_return_pct: num(&payload.real_return_pct),
        safe_withdrawal_pct: num(&payload.swr_pct),
    }
}

fn stream_from_payload(s: &StreamPayload) -> RawIncomeStream {
    RawIncomeStream {
        gross: num(&s.gross),
        traditional_401k_pct: num(&s.k401),
        hsa: num(&s.hsa),
    }
}

fn raw_take_home_from_payload(payload: &TakeHomePayload) -> RawTakeHome {
    let streams = match &payload.streams {
        Some(StreamList::List(list)) => list.iter().map(stream_from_payload).collect(),
        _ if payload.gross.is_some() => vec![RawIncomeStream {
            gross: num(&payload.gross),
            traditional_401k_pct: num(&payload.k401),
            hsa: num(&payload.hsa),
        }],
        _ => Vec::new(),
    };
    RawTakeHome {
        filing_status: text(&payload.filing_status),
        streams,
        health_premiums: num(&payload.health_premiums),
        state_rate_pct: num(&payload.state_rate_pct),
    }
}

fn raw_fi_from_payload(payload: &EarlyRetirementPayload) -> RawFi {
    let comparison_extra = num(&payload.compare_extra)
        .or_else(|| flag(&payload.compare200).then_some(DEFAULT_COMPARISON_EXTRA));
    RawFi {
        start_balance: num(&payload.current_balance),
        monthly_contribution: num(&payload.contribution_monthly),
        contribution_bump: num(&payload.contribution_bump),
        bump_year: num(&payload.bump_year),
        return_pct: num(&payload.return_pct),
        inflation_pct: num(&payload.inflation_pct),
        basis: if flag(&payload.use_real) {
            Some("real".to_string())
        } else {
            text(&payload.use_real)
        },
        annual_spending: num(&payload.annual_spend),
        withdrawal_pct: num(&payload.withdrawal_rate),
        horizon_years: num(&payload.max_years),
        current_age: num(&payload.current_age),
        comparison_extra,
    }
}

fn requested_top(payload: &OptimizePayload) -> usize {
    num(&payload.top)
        .map(|v| v.round().clamp(1.0, MAX_TOP as f64) as usize)
        .unwrap_or(DEFAULT_TOP)
}

fn build_optimize_response(
    scenario: ScenarioSummary,
    result: &OptimizationResult,
    grid: GridConfig,
    top: usize,
) -> OptimizeResponse {
    let deferral_step = grid.deferral_step(scenario.annual_savings_budget);
    OptimizeResponse {
        scenario,
        best: result.best,
        comparisons: Comparisons {
            all_brokerage: result.all_brokerage,
            all_traditional: result.all_traditional,
            all_roth: result.all_roth,
        },
        top_candidates: result.candidates.iter().take(top).copied().collect(),
        candidate_count: result.candidates.len(),
        assumptions: Assumptions {
            dividend_drag_tax_rate: DIVIDEND_DRAG_TAX_RATE,
            split_step_pct: grid.split_step_pct,
            deferral_step,
        },
    }
}

fn run_optimization(
    raw: &RawScenario,
    tables: &TaxTables,
    grid: GridConfig,
) -> (ScenarioSummary, OptimizationResult) {
    let scenario = normalize_scenario(raw, tables);
    let result = optimize_with_grid(&scenario, grid);
    (ScenarioSummary::from(&scenario), result)
}

fn load_tables(dir: Option<&Path>) -> Result<TaxTables, String> {
    TaxTables::load(dir).map_err(|e| format!("Failed to load tax tables: {e}"))
}

/// One-shot command line run: optimize (or re-rank an export) and print.
pub fn run_cli<I, T>(args: I) -> Result<(), String>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = Cli::try_parse_from(args).map_err(|e| e.to_string())?;

    if let Some(path) = &cli.import {
        let output = render_import(path, cli.format, cli.top)?;
        println!("{output}");
        return Ok(());
    }

    let request = build_raw_scenario(&cli)?;
    let tables = load_tables(cli.data_dir.as_deref())?;
    let (summary, result) = run_optimization(&request.raw, &tables, request.grid);

    let output = match cli.format {
        OutputFormat::Summary => render_summary(&summary, &result),
        OutputFormat::Csv => candidates_to_csv(&result.candidates),
        OutputFormat::Json => {
            let response = build_optimize_response(summary, &result, request.grid, cli.top);
            serde_json::to_string_pretty(&response)
                .map_err(|e| format!("Failed to serialize result: {e}"))?
        }
    };
    println!("{output}");
    Ok(())
}

fn render_import(path: &Path, format: OutputFormat, top: usize) -> Result<String, String> {
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    let mut candidates = parse_candidates_csv(&raw)
        .map_err(|e| format!("Invalid export {}: {e}", path.display()))?;
    if candidates.is_empty() {
        return Err(format!("{} contains no candidates", path.display()));
    }
    candidates.sort_by(|a, b| b.after_tax_future_value.total_cmp(&a.after_tax_future_value));
    candidates.truncate(top.max(1));

    match format {
        OutputFormat::Csv => Ok(candidates_to_csv(&candidates)),
        OutputFormat::Json => serde_json::to_string_pretty(&candidates)
            .map_err(|e| format!("Failed to serialize candidates: {e}")),
        OutputFormat::Summary => {
            let mut out = String::new();
            for (rank, c) in candidates.iter().enumerate() {
                out.push_str(&format!("#{:<3} {}\n", rank + 1, candidate_line(c)));
            }
            Ok(out.trim_end().to_string())
        }
    }
}

fn fmt_dollars(x: f64) -> String {
    if !x.is_finite() {
        return "-".to_string();
    }
    let rounded = x.round().abs() as u64;
    let digits = rounded.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if x.round() < 0.0 {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}

fn candidate_line(c: &AllocationCandidate) -> String {
    format!(
        "401k {} (Trad {}, Roth {}) | Brokerage {} | Match {} | After-tax FV {}",
        fmt_dollars(c.employee_deferral_total),
        fmt_dollars(c.traditional_portion),
        fmt_dollars(c.roth_portion),
        fmt_dollars(c.brokerage_portion),
        fmt_dollars(c.employer_match),
        fmt_dollars(c.after_tax_future_value),
    )
}

fn render_summary(summary: &ScenarioSummary, result: &OptimizationResult) -> String {
    let best = &result.best;
    let rows = [
        ("All Brokerage", result.all_brokerage.after_tax_future_value),
        (
            "All Traditional 401k to limit",
            result.all_traditional.after_tax_future_value,
        ),
        ("All Roth 401k to limit", result.all_roth.after_tax_future_value),
        ("Optimal", best.after_tax_future_value),
    ];

    let mut out = String::new();
    out.push_str("Recommended split\n");
    out.push_str(&format!(
        "  Employee 401k: {} -> Trad {}, Roth {}\n",
        fmt_dollars(best.employee_deferral_total),
        fmt_dollars(best.traditional_portion),
        fmt_dollars(best.roth_portion)
    ));
    out.push_str(&format!(
        "  Brokerage: {}\n  Employer match (est): {}\n",
        fmt_dollars(best.brokerage_portion),
        fmt_dollars(best.employer_match)
    ));
    out.push_str(&format!(
        "  Projected after-tax value in {} years: {}\n  Tax this year: {}\n\n",
        summary.years_to_retirement,
        fmt_dollars(best.after_tax_future_value),
        fmt_dollars(best.current_year_tax)
    ));
    out.push_str(&format!("{:<32}{:>16}\n", "Strategy", "After-tax FV"));
    for (label, value) in rows {
        out.push_str(&format!("{label:<32}{:>16}\n", fmt_dollars(value)));
    }
    out.push_str(&format!(
        "\n{} candidates evaluated; dividend drag assumes {}% of yield.",
        result.candidates.len(),
        DIVIDEND_DRAG_TAX_RATE * 100.0
    ));
    out
}

fn data_dir_from_env() -> Option<PathBuf> {
    std::env::var_os(DATA_DIR_ENV).map(PathBuf::from)
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/index.html", get(index_handler))
        .route("/coast.html", get(coast_page_handler))
        .route("/styles.css", get(styles_handler))
        .route("/app.js", get(app_js_handler))
        .route("/coast.js", get(coast_js_handler))
        .route("/take-home.html", get(take_home_page_handler))
        .route("/take-home.js", get(take_home_js_handler))
        .route("/early-retirement.html", get(early_retirement_page_handler))
        .route("/early-retirement.js", get(early_retirement_js_handler))
        .route(
            "/api/optimize",
            get(optimize_get_handler).post(optimize_post_handler),
        )
        .route(
            "/api/optimize.csv",
            get(optimize_csv_get_handler).post(optimize_csv_post_handler),
        )
        .route("/api/optimize/last.csv", get(last_csv_handler))
        .route("/api/coast", get(coast_get_handler).post(coast_post_handler))
        .route(
            "/api/take-home",
            get(take_home_get_handler).post(take_home_post_handler),
        )
        .route(
            "/api/early-retirement",
            get(early_retirement_get_handler).post(early_retirement_post_handler),
        )
        .route(
            "/api/early-retirement.csv",
            get(early_retirement_csv_get_handler).post(early_retirement_csv_post_handler),
        )
        .route("/api/tables", get(tables_handler))
        .fallback(not_found_handler)
        .with_state(state)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let data_dir = data_dir_from_env();
    let tables = TaxTables::load(data_dir.as_deref())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    info!(
        data_dir = ?data_dir,
        deferral_limit = tables.plan_limits.employee_deferral,
        "tax tables loaded"
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = build_router(AppState::new(tables));

    let listener = TcpListener::bind(addr).await?;
    info!("contribution optimizer listening on http://{addr}");
    info!("local access: http://127.0.0.1:{port}/");

    axum::serve(listener, app).await
}

async fn index_handler() -> impl IntoResponse {
    with_cache_control(Html(INDEX_HTML))
}

async fn coast_page_handler() -> impl IntoResponse {
    with_cache_control(Html(COAST_HTML))
}

async fn styles_handler() -> impl IntoResponse {
    with_cache_control((
        [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
        STYLES_CSS,
    ))
}

async fn app_js_handler() -> impl IntoResponse {
    javascript(APP_JS)
}

async fn coast_js_handler() -> impl IntoResponse {
    javascript(COAST_JS)
}

async fn take_home_page_handler() -> impl IntoResponse {
    with_cache_control(Html(TAKE_HOME_HTML))
}

async fn take_home_js_handler() -> impl IntoResponse {
    javascript(TAKE_HOME_JS)
}

async fn early_retirement_page_handler() -> impl IntoResponse {
    with_cache_control(Html(EARLY_RETIREMENT_HTML))
}

async fn early_retirement_js_handler() -> impl IntoResponse {
    javascript(EARLY_RETIREMENT_JS)
}

fn javascript(body: &'static str) -> Response {
    with_cache_control((
        [(
            header::CONTENT_TYPE,
            "application/javascript; charset=utf-8",
        )],
        body,
    ))
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

type JsonBody<T> = Result<Json<T>, JsonRejection>;
type QueryParams<T> = Result<Query<T>, QueryRejection>;

fn json_payload<T>(payload: JsonBody<T>) -> Result<T, Response> {
    payload.map(|Json(p)| p).map_err(|rejection| {
        let msg = rejection.body_text();
        warn!(status = %rejection.status(), error = %msg, "rejected JSON body");
        error_response(rejection.status(), &msg)
    })
}

fn query_payload<T>(payload: QueryParams<T>) -> Result<T, Response> {
    payload.map(|Query(p)| p).map_err(|rejection| {
        let msg = rejection.body_text();
        warn!(status = %rejection.status(), error = %msg, "rejected query string");
        error_response(rejection.status(), &msg)
    })
}

async fn optimize_get_handler(
    State(state): State<AppState>,
    payload: QueryParams<OptimizePayload>,
) -> Response {
    match query_payload(payload) {
        Ok(payload) => optimize_handler_impl(&state, payload),
        Err(response) => response,
    }
}

async fn optimize_post_handler(
    State(state): State<AppState>,
    payload: JsonBody<OptimizePayload>,
) -> Response {
    match json_payload(payload) {
        Ok(payload) => optimize_handler_impl(&state, payload),
        Err(response) => response,
    }
}

fn optimize_handler_impl(state: &AppState, payload: OptimizePayload) -> Response {
    let grid = GridConfig::default();
    let raw = raw_scenario_from_payload(&payload);
    let (summary, result) = run_optimization(&raw, &state.tables, grid);
    debug!(
        candidates = result.candidates.len(),
        best_after_tax = result.best.after_tax_future_value,
        "optimize request served"
    );

    let response = build_optimize_response(summary, &result, grid, requested_top(&payload));
    state.store(Arc::new(result));
    json_response(StatusCode::OK, response)
}

async fn optimize_csv_get_handler(
    State(state): State<AppState>,
    payload: QueryParams<OptimizePayload>,
) -> Response {
    match query_payload(payload) {
        Ok(payload) => optimize_csv_impl(&state, payload),
        Err(response) => response,
    }
}

async fn optimize_csv_post_handler(
    State(state): State<AppState>,
    payload: JsonBody<OptimizePayload>,
) -> Response {
    match json_payload(payload) {
        Ok(payload) => optimize_csv_impl(&state, payload),
        Err(response) => response,
    }
}

fn optimize_csv_impl(state: &AppState, payload: OptimizePayload) -> Response {
    let raw = raw_scenario_from_payload(&payload);
    let (_, result) = run_optimization(&raw, &state.tables, GridConfig::default());
    csv_response(candidates_to_csv(&result.candidates), CSV_FILE_NAME)
}

async fn last_csv_handler(State(state): State<AppState>) -> Response {
    match state.last() {
        Some(result) => csv_response(candidates_to_csv(&result.candidates), CSV_FILE_NAME),
        None => {
            warn!("CSV export requested before any optimization run");
            error_response(StatusCode::NOT_FOUND, "No optimization has been run yet")
        }
    }
}

async fn coast_get_handler(payload: QueryParams<CoastPayload>) -> Response {
    query_payload(payload).map_or_else(|response| response, coast_handler_impl)
}

async fn coast_post_handler(payload: JsonBody<CoastPayload>) -> Response {
    json_payload(payload).map_or_else(|response| response, coast_handler_impl)
}

fn coast_handler_impl(payload: CoastPayload) -> Response {
    let inputs = normalize_coast(&raw_coast_from_payload(&payload));
    let result: CoastResult = compute_coast(&inputs);
    json_response(StatusCode::OK, result)
}

async fn take_home_get_handler(
    State(state): State<AppState>,
    payload: QueryParams<TakeHomePayload>,
) -> Response {
    match query_payload(payload) {
        Ok(payload) => take_home_handler_impl(&state, payload),
        Err(response) => response,
    }
}

async fn take_home_post_handler(
    State(state): State<AppState>,
    payload: JsonBody<TakeHomePayload>,
) -> Response {
    match json_payload(payload) {
        Ok(payload) => take_home_handler_impl(&state, payload),
        Err(response) => response,
    }
}

fn take_home_handler_impl(state: &AppState, payload: TakeHomePayload) -> Response {
    let inputs = normalize_take_home(&raw_take_home_from_payload(&payload));
    if inputs.streams.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Add at least one income stream");
    }
    let result = compute_take_home(&inputs, &state.tables);
    debug!(
        streams = result.streams.len(),
        take_home = result.take_home,
        "take-home request served"
    );
    json_response(StatusCode::OK, result)
}

async fn early_retirement_get_handler(payload: QueryParams<EarlyRetirementPayload>) -> Response {
    query_payload(payload).map_or_else(|response| response, early_retirement_handler_impl)
}

async fn early_retirement_post_handler(payload: JsonBody<EarlyRetirementPayload>) -> Response {
    json_payload(payload).map_or_else(|response| response, early_retirement_handler_impl)
}

fn early_retirement_handler_impl(payload: EarlyRetirementPayload) -> Response {
    let inputs = normalize_fi(&raw_fi_from_payload(&payload));
    json_response(StatusCode::OK, estimate_fi(&inputs))
}

async fn early_retirement_csv_get_handler(
    payload: QueryParams<EarlyRetirementPayload>,
) -> Response {
    query_payload(payload).map_or_else(|response| response, early_retirement_csv_impl)
}

async fn early_retirement_csv_post_handler(
    payload: JsonBody<EarlyRetirementPayload>,
) -> Response {
    json_payload(payload).map_or_else(|response| response, early_retirement_csv_impl)
}

fn early_retirement_csv_impl(payload: EarlyRetirementPayload) -> Response {
    let estimate = estimate_fi(&normalize_fi(&raw_fi_from_payload(&payload)));
    csv_response(fi_years_to_csv(&estimate.base.yearly), FI_CSV_FILE_NAME)
}

async fn tables_handler(State(state): State<AppState>) -> Response {
    json_response(StatusCode::OK, &*state.tables)
}

fn with_cache_control<R: IntoResponse>(response: R) -> Response {
    let mut response = response.into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    with_cache_control((status, Json(body)))
}

fn csv_response(body: String, file_name: &str) -> Response {
    let disposition = format!("attachment; filename=\"{file_name}\"");
    let mut response = with_cache_control((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
        body,
    ));
    if let Ok(value) = header::HeaderValue::from_str(&disposition) {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, value);
    }
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn raw_scenario_from_json(json: &str) -> Result<RawScenario, String> {
    let payload = serde_json::from_str::<OptimizePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    Ok(raw_scenario_from_payload(&payload))
}
