use super::types::MatchPolicy;

const DEFAULT_TIER1_RATE_PCT: f64 = 100.0;
const DEFAULT_TIER1_CAP_PCT: f64 = 3.0;
const DEFAULT_TIER2_RATE_PCT: f64 = 50.0;
const DEFAULT_TIER2_CAP_PCT: f64 = 2.0;

impl Default for MatchPolicy {
    fn default() -> Self {
        Self::from_percentages(
            DEFAULT_TIER1_RATE_PCT,
            DEFAULT_TIER1_CAP_PCT,
            DEFAULT_TIER2_RATE_PCT,
            DEFAULT_TIER2_CAP_PCT,
        )
    }
}

impl MatchPolicy {
    /// Builds a policy from percentages as written ("100% up to 3%" → 100, 3).
    /// Negative or non-finite values become 0.
    pub fn from_percentages(tier1_rate: f64, tier1_cap: f64, tier2_rate: f64, tier2_cap: f64) -> Self {
        let frac = |pct: f64| if pct.is_finite() { pct.max(0.0) / 100.0 } else { 0.0 };
        Self {
            tier1_rate: frac(tier1_rate),
            tier1_cap: frac(tier1_cap),
            tier2_rate: frac(tier2_rate),
            tier2_cap: frac(tier2_cap),
        }
    }

    /// Reads up to four numbers from text like "100% up to 3%; 50% of next 2%"
    /// in order of appearance: tier-1 rate, tier-1 cap, tier-2 rate, tier-2 cap.
    /// Anything not present keeps its default.
    pub fn parse(text: &str) -> Self {
        let nums = numeric_tokens(text);
        let pick = |idx: usize, default: f64| nums.get(idx).copied().unwrap_or(default);
        Self::from_percentages(
            pick(0, DEFAULT_TIER1_RATE_PCT),
            pick(1, DEFAULT_TIER1_CAP_PCT),
            pick(2, DEFAULT_TIER2_RATE_PCT),
            pick(3, DEFAULT_TIER2_CAP_PCT),
        )
    }

    /// Largest share of salary the employer will ever match.
    pub fn max_matched_fraction(&self) -> f64 {
        self.tier1_cap + self.tier2_cap
    }
}

/// Unsigned decimal numbers (`12`, `3.5`) in order of appearance.
fn numeric_tokens(text: &str) -> Vec<f64> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i + 1 < bytes.len() && bytes[i] == b'.' && bytes[i + 1].is_ascii_digit() {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
        }
        if let Ok(v) = text[start..i].parse::<f64>() {
            out.push(v);
        }
    }
    out
}

/// Employer dollars for a given employee contribution.
pub fn employer_match(salary: f64, employee_contribution: f64, policy: &MatchPolicy) -> f64 {
    let salary = if salary.is_finite() { salary.max(0.0) } else { 0.0 };
    let contribution = if employee_contribution.is_finite() {
        employee_contribution.max(0.0)
    } else {
        0.0
    };

    let contribution_pct = (contribution / salary.max(1.0)).min(1.0);
    let tier1 = contribution_pct.min(policy.tier1_cap) * salary * policy.tier1_rate;
    let tier2_base = (contribution_pct - policy.tier1_cap)
        .min(policy.tier2_cap)
        .max(0.0);
    let tier2 = tier2_base * salary * policy.tier2_rate;

    (tier1 + tier2).min(salary * policy.max_matched_fraction())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn parses_standard_two_tier_text() {
        let p = MatchPolicy::parse("100% up to 3%; 50% of next 2%");
        assert_approx(p.tier1_rate, 1.0);
        assert_approx(p.tier1_cap, 0.03);
        assert_approx(p.tier2_rate, 0.5);
        assert_approx(p.tier2_cap, 0.02);
    }

    #[test]
    fn parses_decimals_and_ignores_extra_numbers() {
        let p = MatchPolicy::parse("50% up to 6.5% then 25% of next 1.5% (vesting 3 years)");
        assert_approx(p.tier1_rate, 0.5);
        assert_approx(p.tier1_cap, 0.065);
        assert_approx(p.tier2_rate, 0.25);
        assert_approx(p.tier2_cap, 0.015);
    }

    #[test]
    fn missing_numbers_fall_back_to_defaults() {
        assert_eq!(MatchPolicy::parse(""), MatchPolicy::default());
        assert_eq!(MatchPolicy::parse("no match info"), MatchPolicy::default());

        let p = MatchPolicy::parse("75% up to 4%");
        assert_approx(p.tier1_rate, 0.75);
        assert_approx(p.tier1_cap, 0.04);
        assert_approx(p.tier2_rate, 0.5);
        assert_approx(p.tier2_cap, 0.02);
    }

    #[test]
    fn trailing_dot_is_not_part_of_the_number() {
        assert_eq!(numeric_tokens("match 6. then 2.5"), vec![6.0, 2.5]);
    }

    #[test]
    fn default_policy_on_95k_salary() {
        let p = MatchPolicy::default();
        // 3% fully matched, next 2% at half.
        assert_approx(employer_match(95_000.0, 2_850.0, &p), 2_850.0);
        assert_approx(employer_match(95_000.0, 4_750.0, &p), 2_850.0 + 950.0);
        assert_approx(employer_match(95_000.0, 10_000.0, &p), 3_800.0);
    }

    #[test]
    fn zero_salary_uses_unit_denominator() {
        let p = MatchPolicy::default();
        assert_approx(employer_match(0.0, 1_000.0, &p), 0.0);
    }

    #[test]
    fn generous_rates_are_capped_by_matched_fraction() {
        let p = MatchPolicy::from_percentages(200.0, 3.0, 150.0, 2.0);
        assert_approx(employer_match(100_000.0, 50_000.0, &p), 5_000.0);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_zero_contribution_gets_no_match(
            salary in 0u32..1_000_000,
            r1 in 0u32..300, c1 in 0u32..20, r2 in 0u32..300, c2 in 0u32..20
        ) {
            let p = MatchPolicy::from_percentages(r1 as f64, c1 as f64, r2 as f64, c2 as f64);
            prop_assert!(employer_match(salary as f64, 0.0, &p) == 0.0);
        }

        #[test]
        fn prop_match_is_monotone_and_capped(
            salary in 1_000u32..500_000,
            a in 0u32..100_000,
            delta in 0u32..50_000,
            r1 in 0u32..200, c1 in 0u32..10, r2 in 0u32..200, c2 in 0u32..10
        ) {
            let p = MatchPolicy::from_percentages(r1 as f64, c1 as f64, r2 as f64, c2 as f64);
            let salary = salary as f64;
            let lo = employer_match(salary, a as f64, &p);
            let hi = employer_match(salary, a as f64 + delta as f64, &p);
            prop_assert!(hi + 1e-9 >= lo);
            prop_assert!(hi <= salary * p.max_matched_fraction() + 1e-9);

            let at_cap = employer_match(salary, salary * p.max_matched_fraction(), &p);
            let beyond = employer_match(salary, salary * p.max_matched_fraction() + delta as f64, &p);
            prop_assert!((beyond - at_cap).abs() <= 1e-6);
        }
    }
}
