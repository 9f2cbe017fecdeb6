mod coast;
mod export;
mod fi_estimator;
mod growth;
mod matching;
mod normalize;
mod optimizer;
mod tables;
mod take_home;
mod tax;
mod types;

#[cfg(test)]
mod test_support;

pub use coast::{CoastInputs, CoastResult, RawCoast, compute_coast, normalize_coast};
pub use export::{CSV_FILE_NAME, CSV_HEADER, CsvError, candidates_to_csv, parse_candidates_csv};
pub use fi_estimator::{
    FI_CSV_FILE_NAME, FI_CSV_HEADER, FiEstimate, FiInputs, FiProjection, FiYear, RawFi,
    ReturnBasis, estimate_fi, fi_years_to_csv, monthly_rate, normalize_fi,
};
pub use growth::{DIVIDEND_DRAG_TAX_RATE, project};
pub use matching::employer_match;
pub use normalize::{MAX_CURRENCY, RawScenario, ScenarioSummary, normalize_scenario, parse_number};
pub use optimizer::{GridConfig, enumerate_candidates, evaluate_candidate, optimize, optimize_with_grid};
pub use tables::{TableError, TaxTables};
pub use take_home::{
    IncomeStream, PayPeriods, RawIncomeStream, RawTakeHome, StreamBreakdown, TakeHomeInputs,
    TakeHomeResult, compute_take_home, fica_tax, normalize_take_home,
};
pub use tax::{capital_gains_tax, current_year_tax, ordinary_tax};
pub use types::{
    AllocationCandidate, BracketTable, CapitalGainsBands, Contributions, CurrentYearTax,
    FilingBrackets, FilingStatus, MatchPolicy, OptimizationResult, OrdinaryBracket, PlanLimits,
    Projection, ScenarioInput, StandardDeductions,
};
