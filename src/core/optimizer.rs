use tracing::debug;

use super::growth::project;
use super::matching::employer_match;
use super::types::{AllocationCandidate, Contributions, OptimizationResult, ScenarioInput};

/// Resolution of the allocation grid.
#[derive(Debug, Clone, Copy)]
pub struct GridConfig {
    /// Percentage step for the Roth and Brokerage splits.
    pub split_step_pct: u32,
    /// Deferral step as a fraction of the savings budget.
    pub deferral_step_fraction: f64,
    /// Smallest deferral step in dollars.
    pub min_deferral_step: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            split_step_pct: 5,
            deferral_step_fraction: 0.05,
            min_deferral_step: 500.0,
        }
    }
}

impl GridConfig {
    pub fn deferral_step(&self, budget: f64) -> f64 {
        (budget * self.deferral_step_fraction)
            .round()
            .max(self.min_deferral_step)
            .max(1.0)
    }

    /// Deferral amounts from 0 up to and including `max_deferral`.
    pub fn deferral_points(&self, budget: f64, max_deferral: f64) -> Vec<f64> {
        let step = self.deferral_step(budget);
        let max_deferral = max_deferral.max(0.0);
        let mut points = Vec::new();
        let mut k = 0u32;
        loop {
            let amount = f64::from(k) * step;
            if amount > max_deferral {
                break;
            }
            points.push(amount);
            k += 1;
        }
        if points.last().is_some_and(|last| *last < max_deferral) {
            points.push(max_deferral);
        }
        points
    }

    fn split_points(&self, upper: u32) -> impl Iterator<Item = u32> {
        let step = self.split_step_pct.clamp(1, 100) as usize;
        (0..=upper).step_by(step)
    }
}

/// Evaluates one allocation: `traditional` and `roth` make up the employee
/// deferral, `brokerage` comes out of what is left of the budget.
pub fn evaluate_candidate(
    scenario: &ScenarioInput,
    traditional: f64,
    roth: f64,
    brokerage: f64,
    match_amount: f64,
) -> AllocationCandidate {
    let projection = project(
        scenario,
        &Contributions {
            traditional,
            roth,
            brokerage,
            employer_match: match_amount,
        },
    );
    AllocationCandidate {
        employee_deferral_total: traditional + roth,
        traditional_portion: traditional,
        roth_portion: roth,
        brokerage_portion: brokerage,
        employer_match: match_amount,
        after_tax_future_value: projection.total_after_tax,
        current_year_tax: projection.current_year_tax.total,
    }
}

fn all_brokerage(scenario: &ScenarioInput) -> AllocationCandidate {
    evaluate_candidate(scenario, 0.0, 0.0, scenario.annual_savings_budget, 0.0)
}

fn all_traditional(scenario: &ScenarioInput) -> AllocationCandidate {
    let deferral = scenario.max_deferral();
    let m = employer_match(scenario.wages, deferral, &scenario.match_policy);
    let rest = (scenario.annual_savings_budget - deferral).max(0.0);
    evaluate_candidate(scenario, deferral, 0.0, rest, m)
}

fn all_roth(scenario: &ScenarioInput) -> AllocationCandidate {
    let deferral = scenario.max_deferral();
    let m = employer_match(scenario.wages, deferral, &scenario.match_policy);
    let rest = (scenario.annual_savings_budget - deferral).max(0.0);
    evaluate_candidate(scenario, 0.0, deferral, rest, m)
}

fn same_allocation(a: &AllocationCandidate, b: &AllocationCandidate) -> bool {
    const TOL: f64 = 1e-6;
    (a.traditional_portion - b.traditional_portion).abs() <= TOL
        && (a.roth_portion - b.roth_portion).abs() <= TOL
        && (a.brokerage_portion - b.brokerage_portion).abs() <= TOL
}

/// Every grid point, in sweep order.
pub fn enumerate_candidates(scenario: &ScenarioInput, grid: GridConfig) -> Vec<AllocationCandidate> {
    let budget = scenario.annual_savings_budget;
    let mut out = Vec::new();

    for deferral in grid.deferral_points(budget, scenario.max_deferral()) {
        let m = employer_match(scenario.wages, deferral, &scenario.match_policy);
        let remainder = (budget - deferral).max(0.0);

        for roth_pct in grid.split_points(100) {
            let roth = deferral * f64::from(roth_pct) / 100.0;
            let traditional = deferral - roth;
            for brokerage_pct in grid.split_points(100 - roth_pct) {
                let brokerage = remainder * f64::from(brokerage_pct) / 100.0;
                out.push(evaluate_candidate(scenario, traditional, roth, brokerage, m));
            }
        }
    }
    out
}

pub fn optimize(scenario: &ScenarioInput) -> OptimizationResult {
    optimize_with_grid(scenario, GridConfig::default())
}

/// Exhaustive grid search for the allocation with the highest after-tax
/// future value. The three fixed policies are always part of the candidate
/// set, so the result is never empty and the best candidate dominates them.
pub fn optimize_with_grid(scenario: &ScenarioInput, grid: GridConfig) -> OptimizationResult {
    let all_brokerage = all_brokerage(scenario);
    let all_traditional = all_traditional(scenario);
    let all_roth = all_roth(scenario);

    let mut candidates = enumerate_candidates(scenario, grid);
    let grid_len = candidates.len();
    for policy in [all_brokerage, all_traditional, all_roth] {
        if !candidates.iter().any(|c| same_allocation(c, &policy)) {
            candidates.push(policy);
        }
    }

    // Stable: among equal values the earliest swept candidate stays first.
    candidates.sort_by(|a, b| b.after_tax_future_value.total_cmp(&a.after_tax_future_value));
    let best = candidates[0];

    debug!(
        grid_candidates = grid_len,
        total_candidates = candidates.len(),
        best_after_tax = best.after_tax_future_value,
        best_deferral = best.employee_deferral_total,
        "allocation search finished"
    );

    OptimizationResult {
        best,
        all_brokerage,
        all_traditional,
        all_roth,
        candidates,
    }
}
